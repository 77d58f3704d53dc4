pub mod auth;
pub mod error;
pub mod health;
pub mod identity;
pub mod middleware;
pub mod oauth;
pub mod routes;
pub mod session;
pub mod state;
pub mod token;

#[cfg(test)]
pub(crate) mod testing;

pub use routes::router;
pub use state::{AppState, AppStateInner};
