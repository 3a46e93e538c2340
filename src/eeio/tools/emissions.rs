//! GWP-weighted greenhouse-gas emissions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::eeio::tools::error::{Result, ToolError};
use crate::eeio::tools::model::Frame;
use crate::eeio::tools::units::Quantity;

/// Global-warming potentials keyed by substance name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gwp {
    factors: BTreeMap<String, f64>,
}

impl Default for Gwp {
    /// IPCC AR4 100-year values for the EXIOBASE GHG accounts.
    fn default() -> Self {
        Gwp::new([
            ("N2O", 298.0),
            ("CH4", 25.0),
            ("CO2 - fossil", 1.0),
            ("CO2 - biogenic", 1.0),
        ])
    }
}

impl Gwp {
    /// Builds the map from substance/factor pairs.
    pub fn new<S: Into<String>>(factors: impl IntoIterator<Item = (S, f64)>) -> Self {
        Self {
            factors: factors
                .into_iter()
                .map(|(substance, factor)| (substance.into(), factor))
                .collect(),
        }
    }

    /// Substances in name order.
    pub fn substances(&self) -> impl Iterator<Item = &str> {
        self.factors.keys().map(String::as_str)
    }

    /// Potential of `substance`, if weighted.
    pub fn factor(&self, substance: &str) -> Option<f64> {
        self.factors.get(substance).copied()
    }

    /// Number of weighted substances.
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

/// Selects the GHG rows of `frame` and multiplies each by its potential.
pub fn weighted(frame: &Frame, gwp: &Gwp) -> Result<Frame> {
    let substances: Vec<&str> = gwp.substances().collect();
    let selected = frame.select_rows(&substances)?;
    selected.scale_rows(|substance| {
        gwp.factor(substance).ok_or_else(|| ToolError::UnknownLabel {
            kind: "GHG".into(),
            label: substance.to_string(),
        })
    })
}

/// Weighted emissions with their regional and global totals.
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionsSummary {
    /// GHG rows multiplied by their potentials.
    pub weighted: Frame,
    /// Totals per region, in table order.
    pub by_region: Vec<(String, f64)>,
    /// Global total in the database unit.
    pub total: Quantity,
    /// Global total in the reporting unit.
    pub total_reported: Quantity,
}

/// Weights the GHG rows of an extension frame and totals them.
#[instrument(level = "debug", skip(frame, gwp), fields(substances = gwp.len()))]
pub fn summarize(
    frame: &Frame,
    gwp: &Gwp,
    emission_unit: &str,
    report_unit: &str,
) -> Result<EmissionsSummary> {
    let weighted = weighted(frame, gwp)?;
    let by_region = weighted.by_region();
    let total = Quantity::new(weighted.total(), emission_unit)?;
    let total_reported = total.to(report_unit)?;
    debug!(regions = by_region.len(), total = %total_reported, "weighted emissions");
    Ok(EmissionsSummary {
        weighted,
        by_region,
        total,
        total_reported,
    })
}
