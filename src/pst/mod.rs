//! Core archive reader module.

pub mod codec;
pub mod format;
pub mod iter;
pub mod ltp;
pub mod messaging;
pub mod reader;
pub mod types;
pub mod utils;

pub use reader::{OpenOptions, PstFile};
pub use types::error::{PstError, Result};
