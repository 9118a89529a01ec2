pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod tools;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{Error, Result};
