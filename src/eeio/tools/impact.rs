//! Scenario versus baseline comparison of the extension accounts.

use std::fmt;

use tracing::{debug, instrument};

use crate::eeio::tools::error::Result;
use crate::eeio::tools::model::{Database, Frame};

/// Row axis name given to impact frames.
pub const ACCOUNT_AXIS: &str = "Account";

/// Extension matrices that can be compared between scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionMatrix {
    /// Accounts of production, by sector.
    E,
    /// Accounts of final demand, by consumption category.
    EY,
}

impl fmt::Display for ExtensionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionMatrix::E => f.write_str("E"),
            ExtensionMatrix::EY => f.write_str("EY"),
        }
    }
}

/// Difference between one scenario and the base scenario for one matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Impact {
    /// Scenario compared against the base.
    pub scenario: String,
    /// Extension matrix that was compared.
    pub matrix: ExtensionMatrix,
    /// Cell-wise difference, rows on the `Account` axis.
    pub frame: Frame,
}

fn extension(database: &Database, matrix: ExtensionMatrix, scenario: &str) -> Result<Frame> {
    match matrix {
        ExtensionMatrix::E => database.extension_frame(scenario),
        ExtensionMatrix::EY => database.demand_extension_frame(scenario),
    }
}

/// `scenario - base` for every requested matrix and scenario.
#[instrument(level = "info", skip(database), fields(database = %database.name()))]
pub fn impact(
    database: &Database,
    matrices: &[ExtensionMatrix],
    base: &str,
    scenarios: &[&str],
) -> Result<Vec<Impact>> {
    let mut impacts = Vec::with_capacity(matrices.len() * scenarios.len());
    for matrix in matrices {
        let base_frame = extension(database, *matrix, base)?;
        for scenario in scenarios {
            let mut frame = extension(database, *matrix, scenario)?.difference(&base_frame)?;
            frame.rename_axis(ACCOUNT_AXIS);
            debug!(%matrix, scenario, delta = frame.total(), "impact computed");
            impacts.push(Impact {
                scenario: scenario.to_string(),
                matrix: *matrix,
                frame,
            });
        }
    }
    Ok(impacts)
}
