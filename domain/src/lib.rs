pub mod error;
pub mod models;
pub mod ports;

pub use error::{RagError, Result};
