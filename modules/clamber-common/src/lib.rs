pub mod config;
pub mod error;
pub mod types;

pub use config::{BackendKind, Config};
pub use error::ClamberError;
pub use types::*;
