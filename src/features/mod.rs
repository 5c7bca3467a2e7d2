pub mod auth;
pub mod pacing;
pub mod session_store;
