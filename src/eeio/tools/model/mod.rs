use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use nalgebra::{DMatrix, DVector};

use crate::eeio::tools::error::{Result, ToolError};

mod frame;

pub use frame::{Frame, Observation};
pub(crate) use frame::group_ordered;

/// Name of the scenario every database starts with.
pub const BASELINE: &str = "baseline";

/// Classification level of a row or column label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    /// Industries producing commodities.
    Activity,
    /// Goods and services supplied by activities.
    Commodity,
    /// Final demand categories such as households or government.
    ConsumptionCategory,
}

impl Level {
    /// Levels making up the square transaction matrix, in index order.
    pub const SECTORS: [Level; 2] = [Level::Activity, Level::Commodity];

    /// Name used in workbooks and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Activity => "Activity",
            Level::Commodity => "Commodity",
            Level::ConsumptionCategory => "Consumption category",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ToolError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "Activity" => Ok(Level::Activity),
            "Commodity" => Ok(Level::Commodity),
            "Consumption category" => Ok(Level::ConsumptionCategory),
            other => Err(ToolError::UnknownLabel {
                kind: "level".into(),
                label: other.to_string(),
            }),
        }
    }
}

/// Three-part index used for every row and column of the table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    pub region: String,
    pub level: Level,
    pub item: String,
}

impl Label {
    /// Builds a label from its three parts.
    pub fn new(region: impl Into<String>, level: Level, item: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            level,
            item: item.into(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {} / {}", self.region, self.level, self.item)
    }
}

/// The label sets shared by every scenario of a database.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Classification {
    /// Regions in table order.
    pub regions: Vec<String>,
    pub activities: Vec<String>,
    pub commodities: Vec<String>,
    /// Final demand categories.
    pub categories: Vec<String>,
    /// Satellite accounts loaded from the requested extensions.
    pub accounts: Vec<String>,
    /// Unit of every activity and commodity.
    pub item_units: BTreeMap<(Level, String), String>,
    /// Unit of every satellite account.
    pub account_units: BTreeMap<String, String>,
    /// Extension group (resource, land, emissions, ...) of every account.
    pub account_extensions: BTreeMap<String, String>,
}

impl Classification {
    /// Items declared for a level.
    pub fn items(&self, level: Level) -> &[String] {
        match level {
            Level::Activity => &self.activities,
            Level::Commodity => &self.commodities,
            Level::ConsumptionCategory => &self.categories,
        }
    }

    /// Row/column labels of the transaction matrix.
    pub fn sector_labels(&self) -> Vec<Label> {
        let mut labels = Vec::with_capacity(self.regions.len() * self.sector_count());
        for region in &self.regions {
            for level in Level::SECTORS {
                for item in self.items(level) {
                    labels.push(Label::new(region.clone(), level, item.clone()));
                }
            }
        }
        labels
    }

    /// Column labels of the final-demand matrix.
    pub fn demand_labels(&self) -> Vec<Label> {
        let mut labels = Vec::with_capacity(self.regions.len() * self.categories.len());
        for region in &self.regions {
            for category in &self.categories {
                labels.push(Label::new(
                    region.clone(),
                    Level::ConsumptionCategory,
                    category.clone(),
                ));
            }
        }
        labels
    }

    fn sector_count(&self) -> usize {
        self.activities.len() + self.commodities.len()
    }

    /// Position lookup for transaction-matrix labels.
    pub fn sector_positions(&self) -> HashMap<Label, usize> {
        positions(self.sector_labels())
    }

    /// Position lookup for final-demand labels.
    pub fn demand_positions(&self) -> HashMap<Label, usize> {
        positions(self.demand_labels())
    }

    /// Position of an account row in the extension matrices.
    pub fn account_position(&self, account: &str) -> Result<usize> {
        self.accounts
            .iter()
            .position(|candidate| candidate == account)
            .ok_or_else(|| ToolError::UnknownLabel {
                kind: "satellite account".into(),
                label: account.to_string(),
            })
    }

    /// Unit declared for an activity or commodity.
    pub fn item_unit(&self, level: Level, item: &str) -> Option<&str> {
        self.item_units
            .get(&(level, item.to_string()))
            .map(String::as_str)
    }
}

fn positions(labels: Vec<Label>) -> HashMap<Label, usize> {
    labels
        .into_iter()
        .enumerate()
        .map(|(idx, label)| (label, idx))
        .collect()
}

/// Flow matrices of a single scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrices {
    /// Intermediate transactions, sectors × sectors.
    pub z: DMatrix<f64>,
    /// Final demand, sectors × demand columns.
    pub y: DMatrix<f64>,
    /// Satellite accounts of production, accounts × sectors.
    pub e: DMatrix<f64>,
    /// Satellite accounts of final demand, accounts × demand columns.
    pub ey: DMatrix<f64>,
}

impl Matrices {
    /// Zero-filled matrices for the given dimensions.
    pub fn zeros(sectors: usize, demand: usize, accounts: usize) -> Self {
        Self {
            z: DMatrix::zeros(sectors, sectors),
            y: DMatrix::zeros(sectors, demand),
            e: DMatrix::zeros(accounts, sectors),
            ey: DMatrix::zeros(accounts, demand),
        }
    }

    /// Gross output: intermediate plus final use of every row.
    pub fn output(&self) -> DVector<f64> {
        let mut x = DVector::zeros(self.z.nrows());
        for row in 0..self.z.nrows() {
            x[row] = self.z.row(row).sum() + self.y.row(row).sum();
        }
        x
    }

    /// Technical coefficients `z = Z diag(X)^-1`.
    pub fn technical_coefficients(&self) -> DMatrix<f64> {
        per_unit_of_output(&self.z, &self.output())
    }

    /// Extension intensities `e = E diag(X)^-1`.
    pub fn intensities(&self) -> DMatrix<f64> {
        per_unit_of_output(&self.e, &self.output())
    }

    fn check_shape(&self, sectors: usize, demand: usize, accounts: usize) -> bool {
        self.z.shape() == (sectors, sectors)
            && self.y.shape() == (sectors, demand)
            && self.e.shape() == (accounts, sectors)
            && self.ey.shape() == (accounts, demand)
    }
}

/// Divides every column by the output of its sector; zero output yields zero.
fn per_unit_of_output(flows: &DMatrix<f64>, output: &DVector<f64>) -> DMatrix<f64> {
    let mut coefficients = flows.clone();
    for (col, mut column) in coefficients.column_iter_mut().enumerate() {
        let x = output[col];
        if x == 0.0 {
            column.fill(0.0);
        } else {
            column /= x;
        }
    }
    coefficients
}

/// A multi-regional supply-use table with one or more scenario layers.
#[derive(Debug, Clone, PartialEq)]
pub struct Database {
    name: String,
    classification: Classification,
    scenarios: BTreeMap<String, Matrices>,
}

impl Database {
    /// Creates a database whose only scenario is the baseline.
    pub fn new(
        name: impl Into<String>,
        classification: Classification,
        baseline: Matrices,
    ) -> Result<Self> {
        let mut database = Self {
            name: name.into(),
            classification,
            scenarios: BTreeMap::new(),
        };
        database.insert_scenario(BASELINE, baseline)?;
        Ok(database)
    }

    /// Name of the source workbook.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Labels shared by every scenario.
    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    /// Scenario names, baseline included.
    pub fn scenario_names(&self) -> impl Iterator<Item = &str> {
        self.scenarios.keys().map(String::as_str)
    }

    /// Matrices of a named scenario layer.
    pub fn scenario(&self, name: &str) -> Result<&Matrices> {
        self.scenarios
            .get(name)
            .ok_or_else(|| ToolError::UnknownScenario(name.to_string()))
    }

    /// Matrices of the baseline scenario.
    pub fn baseline(&self) -> &Matrices {
        // `new` and `replace` never leave the database without a baseline.
        &self.scenarios[BASELINE]
    }

    /// Adds or replaces a scenario layer. Returns `true` when an existing
    /// layer was overwritten.
    pub fn insert_scenario(&mut self, name: &str, matrices: Matrices) -> Result<bool> {
        let sectors = self.classification.regions.len() * self.classification.sector_count();
        let demand = self.classification.regions.len() * self.classification.categories.len();
        let accounts = self.classification.accounts.len();
        if !matrices.check_shape(sectors, demand, accounts) {
            return Err(ToolError::InvalidWorkbook(format!(
                "scenario '{name}' does not match the {sectors}×{demand}×{accounts} classification"
            )));
        }
        Ok(self.scenarios.insert(name.to_string(), matrices).is_some())
    }

    /// Swaps in a new classification together with matching scenario layers.
    pub(crate) fn replace(
        &mut self,
        classification: Classification,
        scenarios: BTreeMap<String, Matrices>,
    ) {
        self.classification = classification;
        self.scenarios = scenarios;
    }

    pub(crate) fn scenarios(&self) -> &BTreeMap<String, Matrices> {
        &self.scenarios
    }

    /// Extension matrix `E` of a scenario as a labeled frame.
    pub fn extension_frame(&self, scenario: &str) -> Result<Frame> {
        let matrices = self.scenario(scenario)?;
        Ok(Frame::new(
            self.classification.accounts.clone(),
            self.classification.sector_labels(),
            matrices.e.clone(),
        ))
    }

    /// Final-demand extension matrix `EY` of a scenario as a labeled frame.
    pub fn demand_extension_frame(&self, scenario: &str) -> Result<Frame> {
        let matrices = self.scenario(scenario)?;
        Ok(Frame::new(
            self.classification.accounts.clone(),
            self.classification.demand_labels(),
            matrices.ey.clone(),
        ))
    }

    /// Extension intensities `e` of a scenario as a labeled frame.
    pub fn intensity_frame(&self, scenario: &str) -> Result<Frame> {
        let matrices = self.scenario(scenario)?;
        Ok(Frame::new(
            self.classification.accounts.clone(),
            self.classification.sector_labels(),
            matrices.intensities(),
        ))
    }
}

/// Two regions, two activities, two commodities, two demand categories and
/// five satellite accounts with productive, deterministic flows.
#[cfg(test)]
pub(crate) fn sample_database() -> Database {
    let classification = Classification {
        regions: vec!["EU".into(), "RoW".into()],
        activities: vec![
            "Production of electricity by coal".into(),
            "Production of electricity by wind".into(),
        ],
        commodities: vec!["Electricity".into(), "Natural gas".into()],
        categories: vec!["Households".into(), "Government".into()],
        accounts: vec![
            "N2O".into(),
            "CH4".into(),
            "CO2 - fossil".into(),
            "CO2 - biogenic".into(),
            "Cropland".into(),
        ],
        item_units: [
            (Level::Activity, "Production of electricity by coal", "M.EUR"),
            (Level::Activity, "Production of electricity by wind", "M.EUR"),
            (Level::Commodity, "Electricity", "TJ"),
            (Level::Commodity, "Natural gas", "TJ"),
        ]
        .into_iter()
        .map(|(level, item, unit)| ((level, item.to_string()), unit.to_string()))
        .collect(),
        account_units: [
            ("N2O", "t"),
            ("CH4", "t"),
            ("CO2 - fossil", "t"),
            ("CO2 - biogenic", "t"),
            ("Cropland", "km^2"),
        ]
        .into_iter()
        .map(|(account, unit)| (account.to_string(), unit.to_string()))
        .collect(),
        account_extensions: [
            ("N2O", "Emiss"),
            ("CH4", "Emiss"),
            ("CO2 - fossil", "Emiss"),
            ("CO2 - biogenic", "Emiss"),
            ("Cropland", "Land"),
        ]
        .into_iter()
        .map(|(account, group)| (account.to_string(), group.to_string()))
        .collect(),
    };

    let sectors = 8;
    let demand = 4;
    let accounts = 5;
    let matrices = Matrices {
        z: DMatrix::from_fn(sectors, sectors, |i, j| 1.0 + ((i * 3 + j * 5) % 7) as f64),
        y: DMatrix::from_fn(sectors, demand, |i, c| 50.0 + 10.0 * i as f64 + c as f64),
        e: DMatrix::from_fn(accounts, sectors, |a, j| ((a + 1) * (j + 1)) as f64),
        ey: DMatrix::from_fn(accounts, demand, |a, _| ((a + 1) * 10) as f64),
    };
    match Database::new("sample", classification, matrices) {
        Ok(database) => database,
        Err(error) => panic!("sample database is consistent: {error}"),
    }
}
