//! Counterfactual shocks and their propagation through the Leontief model.
//!
//! Shocks edit the technical coefficients `z`, the final demand `Y` or the
//! extension intensities `e` of the baseline. Gross output is then solved
//! again as `X = (I - z)^-1 · Y·1`, and the flow matrices are rebuilt from the
//! shocked coefficients. The result is stored as a new scenario layer of the
//! database.

use std::collections::HashMap;
use std::str::FromStr;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, info, instrument, warn};

use crate::eeio::tools::error::{Result, ToolError};
use crate::eeio::tools::model::{Classification, Database, Label, Matrices};

/// How a shock value combines with the current cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShockKind {
    /// Replace the cell.
    Update,
    /// Add the value to the cell.
    Absolute,
    /// Scale the cell by `1 + value`.
    Percentage,
}

impl ShockKind {
    /// Combines a shock value with the current cell.
    pub fn apply(&self, current: f64, value: f64) -> f64 {
        match self {
            ShockKind::Update => value,
            ShockKind::Absolute => current + value,
            ShockKind::Percentage => current * (1.0 + value),
        }
    }
}

impl FromStr for ShockKind {
    type Err = ToolError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "update" => Ok(ShockKind::Update),
            "absolute" => Ok(ShockKind::Absolute),
            "percentage" => Ok(ShockKind::Percentage),
            other => Err(ToolError::InvalidWorkbook(format!(
                "unknown shock type '{other}'"
            ))),
        }
    }
}

/// Matrices a shock workbook is allowed to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShockTargets {
    pub z: bool,
    pub y: bool,
    pub e: bool,
}

impl ShockTargets {
    /// Transaction coefficients only.
    pub const Z: ShockTargets = ShockTargets {
        z: true,
        y: false,
        e: false,
    };
}

/// A shock on a `z` or `Y` cell.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorShock {
    pub row: Label,
    pub column: Label,
    pub kind: ShockKind,
    pub value: f64,
}

/// A shock on an `e` cell.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountShock {
    pub account: String,
    pub column: Label,
    pub kind: ShockKind,
    pub value: f64,
}

/// All shocks of a scenario.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShockSpec {
    pub z: Vec<SectorShock>,
    pub y: Vec<SectorShock>,
    pub e: Vec<AccountShock>,
}

impl Database {
    /// Applies `spec` to the baseline and stores the outcome as `scenario`.
    #[instrument(level = "info", skip(self, spec), fields(database = %self.name()))]
    pub fn apply_shock(&mut self, spec: &ShockSpec, scenario: &str) -> Result<()> {
        let shocked = propagate(self.classification(), self.baseline(), spec, scenario)?;
        if self.insert_scenario(scenario, shocked)? {
            warn!(scenario, "replaced existing scenario layer");
        }
        info!(scenario, "scenario added");
        Ok(())
    }
}

/// Solves the shocked system against `baseline`.
pub fn propagate(
    classification: &Classification,
    baseline: &Matrices,
    spec: &ShockSpec,
    scenario: &str,
) -> Result<Matrices> {
    let sectors = classification.sector_positions();
    let demand = classification.demand_positions();

    let mut z = baseline.technical_coefficients();
    let mut e = baseline.intensities();
    let mut y = baseline.y.clone();

    for shock in &spec.z {
        let cell = (position(&sectors, &shock.row)?, position(&sectors, &shock.column)?);
        z[cell] = shock.kind.apply(z[cell], shock.value);
    }
    for shock in &spec.y {
        let cell = (position(&sectors, &shock.row)?, position(&demand, &shock.column)?);
        y[cell] = shock.kind.apply(y[cell], shock.value);
    }
    for shock in &spec.e {
        let cell = (
            classification.account_position(&shock.account)?,
            position(&sectors, &shock.column)?,
        );
        e[cell] = shock.kind.apply(e[cell], shock.value);
    }
    debug!(
        z = spec.z.len(),
        y = spec.y.len(),
        e = spec.e.len(),
        "applied shocks"
    );

    let n = z.nrows();
    let leontief = (DMatrix::identity(n, n) - &z)
        .try_inverse()
        .ok_or_else(|| ToolError::Singular(scenario.to_string()))?;
    let final_demand = DVector::from_fn(n, |row, _| y.row(row).sum());
    let output = &leontief * final_demand;
    let diagonal = DMatrix::from_diagonal(&output);

    Ok(Matrices {
        z: &z * &diagonal,
        y,
        e: &e * &diagonal,
        ey: baseline.ey.clone(),
    })
}

fn position(positions: &HashMap<Label, usize>, label: &Label) -> Result<usize> {
    positions
        .get(label)
        .copied()
        .ok_or_else(|| ToolError::UnknownLabel {
            kind: "label".into(),
            label: label.to_string(),
        })
}
