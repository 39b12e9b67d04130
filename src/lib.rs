pub mod aggregate;
pub mod client;
pub mod collect;
pub mod config;
pub mod error;
pub mod metrics;
pub mod server;
pub mod types;

pub use error::Error;
