pub mod aggregate;
pub mod chart;
pub mod config;
pub mod emissions;
pub mod error;
pub mod impact;
pub mod io;
pub mod model;
pub mod pipeline;
pub mod query;
pub mod shock;
pub mod units;

pub use error::{Result, ToolError};
