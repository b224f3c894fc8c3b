pub mod access;
pub mod history;
pub mod presence;
pub mod room;
pub mod typing;
