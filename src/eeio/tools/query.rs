//! Read-only lookups used by the commodity diagnostic.

use std::fmt;

use crate::eeio::tools::error::{Result, ToolError};
use crate::eeio::tools::model::{Database, Label, Level};

impl Database {
    /// Items of `level` whose name contains `term`.
    pub fn search(&self, level: Level, term: &str, case_sensitive: bool) -> Vec<String> {
        let needle = if case_sensitive {
            term.to_string()
        } else {
            term.to_lowercase()
        };
        self.classification()
            .items(level)
            .iter()
            .filter(|item| {
                if case_sensitive {
                    item.contains(&needle)
                } else {
                    item.to_lowercase().contains(&needle)
                }
            })
            .cloned()
            .collect()
    }

    /// Gross output of `items` in `region`.
    pub fn production(
        &self,
        scenario: &str,
        region: &str,
        level: Level,
        items: &[String],
    ) -> Result<Vec<(String, f64)>> {
        let output = self.scenario(scenario)?.output();
        let labels = self.classification().sector_labels();
        items
            .iter()
            .map(|item| {
                labels
                    .iter()
                    .position(|label| {
                        label.region == region && label.level == level && &label.item == item
                    })
                    .map(|idx| (item.clone(), output[idx]))
                    .ok_or_else(|| ToolError::UnknownLabel {
                        kind: "label".into(),
                        label: format!("{region} / {level} / {item}"),
                    })
            })
            .collect()
    }

    /// Units of `items`; items without a declared unit map to an empty string.
    pub fn units(&self, level: Level, items: &[String]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|item| {
                let unit = self
                    .classification()
                    .item_unit(level, item)
                    .unwrap_or_default()
                    .to_string();
                (item.clone(), unit)
            })
            .collect()
    }

    /// Intermediate plus final use of `items`, from every source region, by
    /// the sectors and consumers of `region`.
    pub fn consumption(
        &self,
        scenario: &str,
        region: &str,
        level: Level,
        items: &[String],
    ) -> Result<f64> {
        if !self.classification().regions.iter().any(|r| r == region) {
            return Err(ToolError::UnknownLabel {
                kind: "region".into(),
                label: region.to_string(),
            });
        }
        let matrices = self.scenario(scenario)?;
        let rows: Vec<usize> = self
            .classification()
            .sector_labels()
            .iter()
            .enumerate()
            .filter(|(_, label)| label.level == level && items.contains(&label.item))
            .map(|(idx, _)| idx)
            .collect();
        let sector_columns = region_columns(self.classification().sector_labels(), region);
        let demand_columns = region_columns(self.classification().demand_labels(), region);

        let mut total = 0.0;
        for row in rows {
            total += sector_columns
                .iter()
                .map(|col| matrices.z[(row, *col)])
                .sum::<f64>();
            total += demand_columns
                .iter()
                .map(|col| matrices.y[(row, *col)])
                .sum::<f64>();
        }
        Ok(total)
    }

    /// Production, shares, units and consumption of the items matching
    /// `term` in `region`.
    pub fn commodity_report(
        &self,
        scenario: &str,
        region: &str,
        level: Level,
        term: &str,
        case_sensitive: bool,
    ) -> Result<CommodityReport> {
        let items = self.search(level, term, case_sensitive);
        let production = self.production(scenario, region, level, &items)?;
        let total: f64 = production.iter().map(|(_, value)| value).sum();
        let shares = production
            .iter()
            .map(|(item, value)| {
                let share = if total == 0.0 { 0.0 } else { value / total };
                (item.clone(), share)
            })
            .collect();
        Ok(CommodityReport {
            region: region.to_string(),
            level,
            units: self.units(level, &items),
            consumption: self.consumption(scenario, region, level, &items)?,
            items,
            production,
            shares,
        })
    }
}

fn region_columns(labels: Vec<Label>, region: &str) -> Vec<usize> {
    labels
        .iter()
        .enumerate()
        .filter(|(_, label)| label.region == region)
        .map(|(idx, _)| idx)
        .collect()
}

/// Console diagnostic for a group of commodities or activities.
#[derive(Debug, Clone, PartialEq)]
pub struct CommodityReport {
    pub region: String,
    pub level: Level,
    pub items: Vec<String>,
    pub production: Vec<(String, f64)>,
    pub shares: Vec<(String, f64)>,
    pub units: Vec<(String, String)>,
    pub consumption: f64,
}

impl fmt::Display for CommodityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Production ({} / {})", self.region, self.level)?;
        for (item, value) in &self.production {
            writeln!(f, "  {item:<48} {value:>18.4}")?;
        }
        writeln!(f, "Production share")?;
        for (item, share) in &self.shares {
            writeln!(f, "  {item:<48} {share:>18.6}")?;
        }
        writeln!(f, "Units")?;
        for (item, unit) in &self.units {
            writeln!(f, "  {item:<48} {unit:>18}")?;
        }
        write!(f, "Consumption in {}: {:.4}", self.region, self.consumption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eeio::tools::model::{BASELINE, sample_database};

    #[test]
    fn search_respects_case_flag() {
        let database = sample_database();
        assert_eq!(
            database.search(Level::Commodity, "Natural gas", true),
            vec!["Natural gas".to_string()]
        );
        assert!(database.search(Level::Commodity, "natural GAS", true).is_empty());
        assert_eq!(
            database.search(Level::Commodity, "natural GAS", false),
            vec!["Natural gas".to_string()]
        );
        assert_eq!(
            database
                .search(Level::Activity, "Production of electricity", true)
                .len(),
            2
        );
    }

    #[test]
    fn consumption_sums_intermediate_and_final_use_into_region() {
        let database = sample_database();
        let items = vec!["Natural gas".to_string()];
        let consumption = database
            .consumption(BASELINE, "EU", Level::Commodity, &items)
            .expect("natural gas consumption");

        // Natural gas rows: EU (3) and RoW (7); EU columns: sectors 0..4, demand 0..2.
        let baseline = database.baseline();
        let mut expected = 0.0;
        for row in [3, 7] {
            for col in 0..4 {
                expected += baseline.z[(row, col)];
            }
            for col in 0..2 {
                expected += baseline.y[(row, col)];
            }
        }
        assert_eq!(consumption, expected);
    }

    #[test]
    fn report_shares_sum_to_one() {
        let database = sample_database();
        let report = database
            .commodity_report(BASELINE, "EU", Level::Activity, "electricity", false)
            .expect("electricity report");
        assert_eq!(report.items.len(), 2);
        let total: f64 = report.shares.iter().map(|(_, share)| share).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(report.units[0].1, "M.EUR");
        assert!(report.to_string().contains("Production share"));
    }

    #[test]
    fn unknown_region_is_rejected() {
        let database = sample_database();
        let items = vec!["Electricity".to_string()];
        assert!(database
            .production(BASELINE, "Mars", Level::Commodity, &items)
            .is_err());
        assert!(database
            .consumption(BASELINE, "Mars", Level::Commodity, &items)
            .is_err());
    }
}
