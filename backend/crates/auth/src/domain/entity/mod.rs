pub mod auth_event;
pub mod user;
