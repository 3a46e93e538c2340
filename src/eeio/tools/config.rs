//! Project path records and analysis settings.
//!
//! The project paths file maps logical dataset names to their location:
//!
//! ```json
//! { "exio_H": { "path": "data/hybrid_database.xlsx" } }
//! ```
//!
//! Every other knob of the analysis lives in [`AnalysisSettings`], whose
//! defaults reproduce the EU low-carbon power study.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::eeio::tools::emissions::Gwp;
use crate::eeio::tools::error::{Result, ToolError};
use crate::eeio::tools::model::Level;

/// Default file name of the project paths record.
pub const DEFAULT_PROJECT_PATHS: &str = "Project paths.json";

/// One dataset entry of the project paths record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntry {
    /// Location of the dataset workbook.
    pub path: PathBuf,
    /// Additional keys are kept but not interpreted.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Mapping from logical dataset names to filesystem locations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectPaths {
    entries: HashMap<String, DatasetEntry>,
}

impl ProjectPaths {
    /// Reads the record from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Location of a named dataset.
    pub fn dataset(&self, name: &str) -> Result<&Path> {
        self.entries
            .get(name)
            .map(|entry| entry.path.as_path())
            .ok_or_else(|| ToolError::MissingDataset(name.to_string()))
    }
}

/// Parameters of the commodity diagnostic printout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Region whose production is reported.
    pub region: String,
    /// Level searched for matching items.
    pub level: LevelSetting,
    /// Substring selecting the reported items.
    pub search: String,
    pub case_sensitive: bool,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            region: "EU".into(),
            level: LevelSetting::Commodity,
            search: "Natural gas".into(),
            case_sensitive: true,
        }
    }
}

/// Levels that can be searched from the settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelSetting {
    Activity,
    Commodity,
}

impl From<LevelSetting> for Level {
    fn from(level: LevelSetting) -> Self {
        match level {
            LevelSetting::Activity => Level::Activity,
            LevelSetting::Commodity => Level::Commodity,
        }
    }
}

/// Parameters of the emission-factor spot check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotCheckSettings {
    /// Satellite account whose intensity is checked.
    pub account: String,
    /// Substring selecting the candidate activities.
    pub activity_search: String,
    /// Whether `activity_search` matches case-sensitively.
    pub case_sensitive: bool,
    /// Position among the matching intensities, regions first.
    pub index: usize,
    /// Unit of the intensities in the database.
    pub from_unit: String,
    /// Unit the picked intensity is reported in.
    pub to_unit: String,
}

impl Default for SpotCheckSettings {
    fn default() -> Self {
        Self {
            account: "CO2 - fossil".into(),
            activity_search: "Production of electricity".into(),
            case_sensitive: false,
            index: 0,
            from_unit: "t/TJ".into(),
            to_unit: "kg/MWh".into(),
        }
    }
}

/// Everything the pipeline needs besides the project paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Project paths key of the hybrid database.
    pub database: String,
    /// Extension groups loaded alongside the monetary/physical flows.
    pub extensions: Vec<String>,
    /// Aggregation applied right after loading.
    pub region_aggregation: PathBuf,
    /// Aggregation used for reporting the scenario results.
    pub results_aggregation: PathBuf,
    /// Where the aggregation template of the full table is written.
    pub aggregation_template: PathBuf,
    /// Shock workbook of the scenario.
    pub shock: PathBuf,
    /// Name of the scenario layer the shock creates.
    pub scenario: String,
    /// Commodity diagnostic printed before the shock.
    pub report: ReportSettings,
    /// Global-warming potentials used for every GHG total.
    pub gwp: Gwp,
    /// Unit of the emission accounts in the database.
    pub emission_unit: String,
    /// Unit the headline totals are reported in.
    pub report_unit: String,
    /// Directory receiving the HTML charts. Must exist.
    pub output_dir: PathBuf,
    /// File name of the global emissions sunburst.
    pub sunburst_file: String,
    /// File name of the saved emissions bar chart.
    pub bar_file: String,
    pub spot_check: SpotCheckSettings,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            database: "exio_H".into(),
            extensions: vec!["resource".into(), "Land".into(), "Emiss".into()],
            region_aggregation: PathBuf::from("Aggregation/Aggregation EU RoW.xlsx"),
            results_aggregation: PathBuf::from("Aggregation/Aggregation for results analysis.xlsx"),
            aggregation_template: PathBuf::from("Aggregation/Aggregation_template.xlsx"),
            shock: PathBuf::from("Shock/Shock - EU power to low carbon.xlsx"),
            scenario: "EU power to low carbon".into(),
            report: ReportSettings::default(),
            gwp: Gwp::default(),
            emission_unit: "t".into(),
            report_unit: "Gt".into(),
            output_dir: PathBuf::from("Plot"),
            sunburst_file: "Global emissions.html".into(),
            bar_file: "Saved GHG emissions.html".into(),
            spot_check: SpotCheckSettings::default(),
        }
    }
}

impl AnalysisSettings {
    /// Reads settings from JSON; absent keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Resolves every relative input/output path against `root`.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        for path in [
            &mut self.region_aggregation,
            &mut self.results_aggregation,
            &mut self.aggregation_template,
            &mut self.shock,
            &mut self.output_dir,
        ] {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
        self
    }
}
