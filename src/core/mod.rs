pub mod error;
pub mod utils;

pub use error::{UnsafeCategory, ValidationError};
