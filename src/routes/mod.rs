mod auth;
mod health_check;

pub use auth::{current_principal, login, refresh};
pub use health_check::health_check;
