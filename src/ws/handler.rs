//! WebSocket upgrade endpoint and connection authentication.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth::jwt;
use crate::db::models::Role;
use crate::db::DbPool;
use crate::state::AppState;
use crate::ws::actor::{self, AuthenticatedUser};

/// Query parameters for WebSocket connection.
/// Auth is via query param ?token=JWT — browsers cannot set headers on a
/// WebSocket upgrade.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

/// WebSocket close codes:
/// 4001 = token expired
/// 4002 = token invalid
/// 4003 = account unknown or deactivated
const CLOSE_TOKEN_EXPIRED: u16 = 4001;
const CLOSE_TOKEN_INVALID: u16 = 4002;
const CLOSE_ACCOUNT_DISABLED: u16 = 4003;

/// GET /ws?token=JWT
/// WebSocket upgrade endpoint. Verifies the token AND loads the user
/// record — the user must still exist and be active. On failure, upgrades
/// then immediately closes with the appropriate close code; there is no
/// anonymous or degraded session. On success, spawns an actor for the
/// connection.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match jwt::validate_access_token(&state.jwt_secret, &params.token) {
        Ok(claims) => claims,
        Err(err) => {
            let (close_code, reason) = match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    (CLOSE_TOKEN_EXPIRED, "Token expired")
                }
                _ => (CLOSE_TOKEN_INVALID, "Token invalid"),
            };
            return reject(ws, close_code, reason);
        }
    };

    let user = match load_active_user(&state.db, &claims.sub).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return reject(ws, CLOSE_ACCOUNT_DISABLED, "Account unknown or deactivated");
        }
        Err(e) => {
            tracing::error!(
                user_id = %claims.sub,
                error = %e,
                "User lookup failed during WebSocket auth"
            );
            return reject(ws, CLOSE_ACCOUNT_DISABLED, "Account lookup failed");
        }
    };

    tracing::info!(
        user_id = %user.user_id,
        role = user.role.as_str(),
        "WebSocket connection authenticated"
    );
    ws.on_upgrade(move |socket| actor::run_connection(socket, state, user))
}

/// Upgrade the connection, then immediately close with the error code.
fn reject(ws: WebSocketUpgrade, close_code: u16, reason: &'static str) -> Response {
    tracing::warn!(
        close_code = close_code,
        reason = reason,
        "WebSocket auth failed"
    );

    ws.on_upgrade(move |mut socket| async move {
        let close_frame = CloseFrame {
            code: close_code,
            reason: reason.into(),
        };
        let _ = socket.send(Message::Close(Some(close_frame))).await;
    })
}

/// Load the identified user if it exists and is active. The store copy of
/// display name and role wins over whatever the token was minted with.
async fn load_active_user(
    db: &DbPool,
    user_id: &str,
) -> Result<Option<AuthenticatedUser>, Box<dyn std::error::Error + Send + Sync>> {
    let db = db.clone();
    let uid = user_id.to_string();

    let row = tokio::task::spawn_blocking(move || {
        use rusqlite::OptionalExtension;

        let conn = db
            .lock()
            .map_err(|e| format!("DB lock error: {}", e))?;
        conn.query_row(
            "SELECT id, display_name, role, is_active FROM users WHERE id = ?1",
            rusqlite::params![uid],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)? != 0,
                ))
            },
        )
        .optional()
        .map_err(|e| format!("user query: {}", e))
    })
    .await??;

    Ok(row.and_then(|(user_id, display_name, role, is_active)| {
        is_active.then(|| AuthenticatedUser {
            user_id,
            display_name,
            role: Role::from_db(&role),
        })
    }))
}
