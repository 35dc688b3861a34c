pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod routes;

pub use routes::{app, AppState};
