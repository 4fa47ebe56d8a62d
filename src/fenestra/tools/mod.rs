pub mod config;
pub mod consolidate;
pub mod error;
pub mod guard;
pub mod hooks;
pub mod io;
pub mod model;
pub mod sync;

pub use error::{Result, ToolError};
