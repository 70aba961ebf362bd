pub mod attachments;
pub mod blocked;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod rooms;

mod error;

pub use database::Store;
pub use error::StoreError;
pub use models::*;
