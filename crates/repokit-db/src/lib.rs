pub mod connection;
pub mod error;
pub mod models;
pub mod repository;
pub mod schema;

pub use connection::PrimaryDb;
pub use error::{DbError, Result};
pub use models::PrimaryPackage;
