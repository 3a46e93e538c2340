//! Core library for the eeio-tools command line application.
//!
//! The library loads a multi-regional, environmentally extended supply-use
//! database, runs a policy shock against it and reports the greenhouse-gas
//! consequences. Workbook and HTML adapters live under [`eeio::tools::io`],
//! the table representation inside [`eeio::tools::model`], the IO engine in
//! [`eeio::tools::aggregate`] and [`eeio::tools::shock`], and the end-to-end
//! orchestration under [`eeio::tools::pipeline`].

pub mod eeio;

pub use eeio::tools::{
    Result, ToolError, aggregate, chart, config, emissions, error, impact, io, model, pipeline,
    query, shock, units,
};
