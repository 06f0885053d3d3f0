pub mod auth;
pub mod error;
pub mod middleware;
pub mod photos;
pub mod routes;
pub mod stats;
pub mod stories;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;
pub use routes::router;
