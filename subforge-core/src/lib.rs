pub mod cache;
pub mod config;
pub mod error;
pub mod error_utils;
pub mod retry;
pub mod types;

pub use cache::*;
pub use config::*;
pub use error::*;
pub use error_utils::*;
pub use retry::*;
pub use types::*;
