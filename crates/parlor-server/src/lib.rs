pub mod admin;
pub mod api;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod http_sig;
pub mod hub;
pub mod registry;

pub use api::AppState;
pub use config::ServerConfig;
pub use error::ServerError;
