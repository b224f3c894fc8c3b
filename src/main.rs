use tokio::net::TcpListener;

use studyhall_server::auth;
use studyhall_server::chat::access::CourseRoomPolicy;
use studyhall_server::chat::history::MAX_HISTORY_LIMIT;
use studyhall_server::chat::{presence, typing};
use studyhall_server::config::{generate_config_template, Config};
use studyhall_server::{db, routes, state, ws};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "studyhall_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "studyhall_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("Studyhall chat server v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite database
    let db = db::init_db(&config.data_dir)?;

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    let course_policy = CourseRoomPolicy::from_config(&config.course_room_policy);
    tracing::info!(policy = ?course_policy, "Course room admission policy");

    // Build application state
    let app_state = state::AppState {
        db,
        jwt_secret,
        connections: ws::new_connection_registry(),
        rooms: ws::new_room_registry(),
        presence: presence::new_presence_registry(),
        typing: typing::new_typing_tracker(),
        course_policy,
        history_limit: config.history_limit.min(MAX_HISTORY_LIMIT),
    };

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
