//! Regional and sectoral aggregation of a database.
//!
//! An aggregation maps every label of a classification level onto a coarser
//! group. Flows of all scenario layers are summed into the groups; groups are
//! ordered by first appearance so an identity mapping reproduces the table.

use std::collections::{BTreeMap, HashMap};

use nalgebra::DMatrix;
use tracing::{debug, info, instrument, warn};

use crate::eeio::tools::error::{Result, ToolError};
use crate::eeio::tools::model::{Classification, Database, Label, Level, Matrices};

/// Classification levels an aggregation workbook can remap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationLevel {
    Region,
    Activity,
    Commodity,
    ConsumptionCategory,
    SatelliteAccount,
}

impl AggregationLevel {
    /// Every level, in workbook sheet order.
    pub const ALL: [AggregationLevel; 5] = [
        AggregationLevel::Region,
        AggregationLevel::Activity,
        AggregationLevel::Commodity,
        AggregationLevel::ConsumptionCategory,
        AggregationLevel::SatelliteAccount,
    ];

    /// Worksheet holding the mapping of this level.
    pub fn sheet_name(&self) -> &'static str {
        match self {
            AggregationLevel::Region => "Region",
            AggregationLevel::Activity => "Activity",
            AggregationLevel::Commodity => "Commodity",
            AggregationLevel::ConsumptionCategory => "Consumption category",
            AggregationLevel::SatelliteAccount => "Satellite account",
        }
    }

    /// Labels of this level in the classification.
    pub fn labels<'a>(&self, classification: &'a Classification) -> &'a [String] {
        match self {
            AggregationLevel::Region => &classification.regions,
            AggregationLevel::Activity => &classification.activities,
            AggregationLevel::Commodity => &classification.commodities,
            AggregationLevel::ConsumptionCategory => &classification.categories,
            AggregationLevel::SatelliteAccount => &classification.accounts,
        }
    }
}

/// Label → group mappings per level. Levels without a mapping are kept as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationSpec {
    mappings: HashMap<AggregationLevel, HashMap<String, String>>,
}

impl AggregationSpec {
    /// Replaces the mapping of a level.
    pub fn set(
        &mut self,
        level: AggregationLevel,
        mapping: impl IntoIterator<Item = (String, String)>,
    ) {
        self.mappings.insert(level, mapping.into_iter().collect());
    }

    /// Builder-style variant of [`AggregationSpec::set`].
    pub fn with<L: Into<String>, G: Into<String>>(
        mut self,
        level: AggregationLevel,
        mapping: impl IntoIterator<Item = (L, G)>,
    ) -> Self {
        self.set(
            level,
            mapping
                .into_iter()
                .map(|(label, group)| (label.into(), group.into())),
        );
        self
    }

    fn grouping(&self, level: AggregationLevel, labels: &[String]) -> Result<Grouping> {
        let Some(mapping) = self.mappings.get(&level) else {
            return Ok(Grouping::identity(labels));
        };

        let mut grouping = Grouping::default();
        for label in labels {
            let group = mapping
                .get(label)
                .filter(|group| !group.is_empty())
                .ok_or_else(|| ToolError::Unmapped {
                    level: level.sheet_name().to_string(),
                    label: label.clone(),
                })?;
            grouping.assign(label, group);
        }

        let unused = mapping.keys().filter(|label| !labels.contains(label)).count();
        if unused > 0 {
            debug!(sheet = level.sheet_name(), unused, "aggregation labels not in table");
        }
        Ok(grouping)
    }
}

#[derive(Debug, Default)]
struct Grouping {
    groups: Vec<String>,
    assignment: HashMap<String, String>,
}

impl Grouping {
    fn identity(labels: &[String]) -> Self {
        let mut grouping = Grouping::default();
        for label in labels {
            grouping.assign(label, label);
        }
        grouping
    }

    fn assign(&mut self, label: &str, group: &str) {
        if !self.groups.iter().any(|existing| existing == group) {
            self.groups.push(group.to_string());
        }
        self.assignment.insert(label.to_string(), group.to_string());
    }

    fn group_of<'a>(&'a self, label: &'a str) -> &'a str {
        self.assignment
            .get(label)
            .map(String::as_str)
            .unwrap_or(label)
    }
}

impl Database {
    /// Aggregates every scenario layer in place.
    #[instrument(level = "info", skip_all, fields(database = %self.name()))]
    pub fn aggregate(&mut self, spec: &AggregationSpec) -> Result<()> {
        let (classification, scenarios) = aggregate_layers(self, spec)?;
        info!(
            regions = classification.regions.len(),
            activities = classification.activities.len(),
            commodities = classification.commodities.len(),
            "aggregated database"
        );
        self.replace(classification, scenarios);
        Ok(())
    }

    /// Returns an aggregated copy, leaving `self` untouched.
    pub fn aggregated(&self, spec: &AggregationSpec) -> Result<Database> {
        let mut copy = self.clone();
        copy.aggregate(spec)?;
        Ok(copy)
    }
}

fn aggregate_layers(
    database: &Database,
    spec: &AggregationSpec,
) -> Result<(Classification, BTreeMap<String, Matrices>)> {
    let source = database.classification();
    let regions = spec.grouping(AggregationLevel::Region, &source.regions)?;
    let activities = spec.grouping(AggregationLevel::Activity, &source.activities)?;
    let commodities = spec.grouping(AggregationLevel::Commodity, &source.commodities)?;
    let categories = spec.grouping(AggregationLevel::ConsumptionCategory, &source.categories)?;
    let accounts = spec.grouping(AggregationLevel::SatelliteAccount, &source.accounts)?;

    let item_grouping = |level: Level| match level {
        Level::Activity => &activities,
        Level::Commodity => &commodities,
        Level::ConsumptionCategory => &categories,
    };

    let mut target = Classification {
        regions: regions.groups.clone(),
        activities: activities.groups.clone(),
        commodities: commodities.groups.clone(),
        categories: categories.groups.clone(),
        accounts: accounts.groups.clone(),
        ..Classification::default()
    };

    for level in Level::SECTORS {
        for item in source.items(level) {
            if let Some(unit) = source.item_unit(level, item) {
                let group = item_grouping(level).group_of(item).to_string();
                merge_unit(&mut target.item_units, (level, group), unit, "unit");
            }
        }
    }
    for account in &source.accounts {
        let group = accounts.group_of(account).to_string();
        if let Some(unit) = source.account_units.get(account) {
            merge_unit(&mut target.account_units, group.clone(), unit, "unit");
        }
        if let Some(extension) = source.account_extensions.get(account) {
            merge_unit(&mut target.account_extensions, group, extension, "extension");
        }
    }

    let regroup = |label: &Label| {
        Label::new(
            regions.group_of(&label.region),
            label.level,
            item_grouping(label.level).group_of(&label.item),
        )
    };
    let sector_map = index_map(&source.sector_labels(), &target.sector_positions(), regroup)?;
    let demand_map = index_map(&source.demand_labels(), &target.demand_positions(), regroup)?;
    let account_positions: HashMap<&str, usize> = target
        .accounts
        .iter()
        .enumerate()
        .map(|(idx, account)| (account.as_str(), idx))
        .collect();
    let account_map: Vec<usize> = source
        .accounts
        .iter()
        .map(|account| account_positions[accounts.group_of(account)])
        .collect();

    let sectors = target.regions.len() * (target.activities.len() + target.commodities.len());
    let demand = target.regions.len() * target.categories.len();
    let rows = target.accounts.len();

    let mut scenarios = BTreeMap::new();
    for (name, matrices) in database.scenarios() {
        let aggregated = Matrices {
            z: sum_into(&matrices.z, &sector_map, &sector_map, (sectors, sectors)),
            y: sum_into(&matrices.y, &sector_map, &demand_map, (sectors, demand)),
            e: sum_into(&matrices.e, &account_map, &sector_map, (rows, sectors)),
            ey: sum_into(&matrices.ey, &account_map, &demand_map, (rows, demand)),
        };
        scenarios.insert(name.clone(), aggregated);
    }

    Ok((target, scenarios))
}

/// First member's value wins; disagreeing members are reported.
fn merge_unit<K: Ord + std::fmt::Debug>(
    target: &mut BTreeMap<K, String>,
    key: K,
    value: &str,
    what: &str,
) {
    match target.get(&key) {
        Some(existing) if existing != value => {
            warn!(group = ?key, kept = %existing, dropped = %value, "aggregated labels disagree on {what}");
        }
        Some(_) => {}
        None => {
            target.insert(key, value.to_string());
        }
    }
}

fn index_map(
    source: &[Label],
    target: &HashMap<Label, usize>,
    regroup: impl Fn(&Label) -> Label,
) -> Result<Vec<usize>> {
    source
        .iter()
        .map(|label| {
            let grouped = regroup(label);
            target
                .get(&grouped)
                .copied()
                .ok_or_else(|| ToolError::UnknownLabel {
                    kind: "aggregated label".into(),
                    label: grouped.to_string(),
                })
        })
        .collect()
}

fn sum_into(
    source: &DMatrix<f64>,
    row_map: &[usize],
    col_map: &[usize],
    shape: (usize, usize),
) -> DMatrix<f64> {
    let mut target = DMatrix::zeros(shape.0, shape.1);
    for (row, new_row) in row_map.iter().enumerate() {
        for (col, new_col) in col_map.iter().enumerate() {
            target[(*new_row, *new_col)] += source[(row, col)];
        }
    }
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eeio::tools::model::{BASELINE, sample_database};

    fn eu_row_to_world() -> AggregationSpec {
        AggregationSpec::default().with(
            AggregationLevel::Region,
            [("EU", "World"), ("RoW", "World")],
        )
    }

    #[test]
    fn identity_aggregation_preserves_values() {
        let database = sample_database();
        let aggregated = database.aggregated(&AggregationSpec::default()).expect("identity aggregation");
        assert_eq!(aggregated, database);

        let explicit = AggregationSpec::default().with(
            AggregationLevel::Commodity,
            [("Electricity", "Electricity"), ("Natural gas", "Natural gas")],
        );
        let aggregated = database.aggregated(&explicit).expect("explicit identity aggregation");
        assert_eq!(aggregated.baseline(), database.baseline());
    }

    #[test]
    fn non_destructive_aggregation_leaves_source_untouched() {
        let database = sample_database();
        let before = database.clone();
        let aggregated = database.aggregated(&eu_row_to_world()).expect("regions merge");
        assert_eq!(database, before);
        assert_eq!(aggregated.classification().regions, vec!["World".to_string()]);
    }

    #[test]
    fn in_place_aggregation_sums_flows() {
        let mut database = sample_database();
        let total_z = database.baseline().z.sum();
        let total_e = database.baseline().e.sum();
        let total_ey = database.baseline().ey.sum();
        database.aggregate(&eu_row_to_world()).expect("regions merge");

        let baseline = database.scenario(BASELINE).expect("baseline kept");
        assert_eq!(baseline.z.shape(), (4, 4));
        assert_eq!(baseline.y.shape(), (4, 2));
        assert!((baseline.z.sum() - total_z).abs() < 1e-9);
        assert!((baseline.e.sum() - total_e).abs() < 1e-9);
        assert!((baseline.ey.sum() - total_ey).abs() < 1e-9);
    }

    #[test]
    fn sectors_merge_into_groups() {
        let database = sample_database();
        let spec = AggregationSpec::default().with(
            AggregationLevel::Activity,
            [
                ("Production of electricity by coal", "Power"),
                ("Production of electricity by wind", "Power"),
            ],
        );
        let aggregated = database.aggregated(&spec).expect("activities merge");
        let classification = aggregated.classification();
        assert_eq!(classification.activities, vec!["Power".to_string()]);
        assert_eq!(
            classification.item_unit(Level::Activity, "Power"),
            Some("M.EUR")
        );

        // EU coal (0) and EU wind (1) collapse onto EU Power (0).
        let source = &database.baseline().e;
        let target = &aggregated.baseline().e;
        assert_eq!(target[(2, 0)], source[(2, 0)] + source[(2, 1)]);
    }

    #[test]
    fn incomplete_mapping_is_rejected() {
        let database = sample_database();
        let spec = AggregationSpec::default()
            .with(AggregationLevel::Region, [("EU", "Europe"), ("RoW", "")]);
        let error = database.aggregated(&spec).unwrap_err();
        assert!(matches!(
            error,
            ToolError::Unmapped { label, .. } if label == "RoW"
        ));
    }
}
