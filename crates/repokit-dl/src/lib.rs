pub mod compression;
pub mod download;
pub mod error;
pub mod http_client;
pub mod transport;
pub mod types;
