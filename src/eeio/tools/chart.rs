//! Tidy tables and Plotly figures for the emission charts.
//!
//! Figures are plain serde_json payloads in the Plotly schema; the HTML
//! wrapper lives in [`crate::io::html`].

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{Value, json};

use crate::eeio::tools::emissions::{Gwp, weighted};
use crate::eeio::tools::error::Result;
use crate::eeio::tools::model::{Database, Frame, Level, group_ordered};
use crate::eeio::tools::units::Unit;

/// Plotly's default qualitative sequence, used for labels without a colour.
const FALLBACK_COLORS: [&str; 10] = [
    "#636EFA", "#EF553B", "#00CC96", "#AB63FA", "#FFA15A", "#19D3F3", "#FF6692", "#B6E880",
    "#FF97FF", "#FECB52",
];

/// Bar fill patterns handed out per region; the first region is solid.
const PATTERN_SHAPES: [&str; 8] = ["", "/", "\\", "x", "-", "|", "+", "."];

const PARENT_COLOR: &str = "#EBF0F8";
const FONT_FAMILY: &str = "Trebuchet MS";

/// Sector label → display colour.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    colors: BTreeMap<String, String>,
}

impl Default for Palette {
    fn default() -> Self {
        Palette::new([
            ("Non-Renewable Electricity", "#A48806"),
            ("Services", "#00CC66"),
            ("Other manufacturing", "#F7921C"),
            ("Transport", "#7DBFEC"),
            ("Primary", "#808080"),
            ("Metal products", "#FBBE75"),
            ("Gas and heating", "#FA4F46"),
            ("Households", "#E59FEF"),
            ("Petroleum and chemicals", "#000000"),
            ("Renewable Electricity", "#F9DC5C"),
            ("Transport and electrical equipment", "#3DA0E2"),
            ("Construction", "#844A04"),
        ])
    }
}

impl Palette {
    /// Builds a palette from label/colour pairs.
    pub fn new<L: Into<String>, C: Into<String>>(colors: impl IntoIterator<Item = (L, C)>) -> Self {
        Self {
            colors: colors
                .into_iter()
                .map(|(label, color)| (label.into(), color.into()))
                .collect(),
        }
    }

    /// Fixed colour of `label`, if any.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.colors.get(label).map(String::as_str)
    }

    /// Colours for `labels`; unknown labels draw from the fallback sequence
    /// in order of first appearance.
    pub fn assign<'a>(&self, labels: impl IntoIterator<Item = &'a str>) -> HashMap<String, String> {
        let mut assigned = HashMap::new();
        let mut next_fallback = 0;
        for label in labels {
            if assigned.contains_key(label) {
                continue;
            }
            let color = match self.get(label) {
                Some(color) => color.to_string(),
                None => {
                    let color = FALLBACK_COLORS[next_fallback % FALLBACK_COLORS.len()];
                    next_fallback += 1;
                    color.to_string()
                }
            };
            assigned.insert(label.to_string(), color);
        }
        assigned
    }
}

/// One bar segment: GWP-weighted impact of a gas in one sector and region.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImpactRow {
    /// Greenhouse gas (x axis).
    pub ghg: String,
    pub region: String,
    /// Classification level of the sector.
    pub level: String,
    /// Aggregated activity.
    pub sector: String,
    pub value: f64,
}

/// One sunburst leaf: emissions of a sector or consumer in a region.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GlobalRow {
    pub region: String,
    pub item: String,
    pub value: f64,
}

/// Long-form GWP-weighted impact of the activities.
pub fn impact_rows(impact: &Frame, gwp: &Gwp) -> Result<Vec<ImpactRow>> {
    let activities = impact.filter_columns(|label| label.level == Level::Activity);
    Ok(weighted(&activities, gwp)?
        .to_observations()
        .into_iter()
        .map(|observation| ImpactRow {
            ghg: observation.row,
            region: observation.region,
            level: observation.level.to_string(),
            sector: observation.item,
            value: observation.value,
        })
        .collect())
}

/// GWP-weighted emissions of final demand and of activities, per region and
/// item, converted from `from_unit` to `to_unit`. Rows sharing a region and
/// item are summed into one.
pub fn global_emissions(
    database: &Database,
    scenario: &str,
    gwp: &Gwp,
    from_unit: &str,
    to_unit: &str,
) -> Result<Vec<GlobalRow>> {
    let factor = Unit::parse(from_unit)?.conversion_factor(&Unit::parse(to_unit)?)?;

    let households = weighted(&database.demand_extension_frame(scenario)?, gwp)?;
    let activities = database
        .extension_frame(scenario)?
        .filter_columns(|label| label.level == Level::Activity);
    let industries = weighted(&activities, gwp)?;

    // A consumer and an activity aggregated into the same group share a leaf.
    let merged = group_ordered(
        households
            .by_region_item()
            .into_iter()
            .chain(industries.by_region_item()),
    );
    Ok(merged
        .into_iter()
        .map(|((region, item), value)| GlobalRow {
            region,
            item,
            value: factor.apply(value),
        })
        .collect())
}

/// A Plotly figure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    /// Trace objects.
    pub data: Vec<Value>,
    /// Layout object.
    pub layout: Value,
}

fn layout(title: &str) -> Value {
    json!({
        "title": { "text": title },
        "font": { "family": FONT_FAMILY },
        "paper_bgcolor": "white",
        "plot_bgcolor": "white",
        "xaxis": { "gridcolor": PARENT_COLOR, "zerolinecolor": PARENT_COLOR },
        "yaxis": { "gridcolor": PARENT_COLOR, "zerolinecolor": PARENT_COLOR },
        "legend": { "tracegroupgap": 0 },
    })
}

/// Region → item sunburst, leaves coloured by item.
pub fn sunburst(rows: &[GlobalRow], palette: &Palette, title: &str) -> Figure {
    let colors = palette.assign(rows.iter().map(|row| row.item.as_str()));

    let mut region_totals: Vec<(String, f64)> = Vec::new();
    for row in rows {
        match region_totals.iter_mut().find(|(region, _)| *region == row.region) {
            Some((_, total)) => *total += row.value,
            None => region_totals.push((row.region.clone(), row.value)),
        }
    }

    let mut ids = Vec::new();
    let mut labels = Vec::new();
    let mut parents = Vec::new();
    let mut values = Vec::new();
    let mut marker_colors = Vec::new();

    for row in rows {
        ids.push(format!("{}/{}", row.region, row.item));
        labels.push(row.item.clone());
        parents.push(row.region.clone());
        values.push(row.value);
        marker_colors.push(colors[&row.item].clone());
    }
    for (region, total) in region_totals {
        ids.push(region.clone());
        labels.push(region);
        parents.push(String::new());
        values.push(total);
        marker_colors.push(PARENT_COLOR.to_string());
    }

    Figure {
        data: vec![json!({
            "type": "sunburst",
            "ids": ids,
            "labels": labels,
            "parents": parents,
            "values": values,
            "branchvalues": "total",
            "marker": { "colors": marker_colors },
            "hovertemplate": "%{id}<br>%{value:.3f}<extra></extra>",
        })],
        layout: layout(title),
    }
}

/// Stacked bars per gas, coloured by sector and patterned by region.
pub fn grouped_bar(rows: &[ImpactRow], palette: &Palette, title: &str, legend_title: &str) -> Figure {
    let colors = palette.assign(rows.iter().map(|row| row.sector.as_str()));

    let mut regions: Vec<&str> = Vec::new();
    let mut traces: Vec<((&str, &str), Vec<&ImpactRow>)> = Vec::new();
    for row in rows {
        if !regions.contains(&row.region.as_str()) {
            regions.push(&row.region);
        }
        let key = (row.sector.as_str(), row.region.as_str());
        match traces.iter_mut().find(|(candidate, _)| *candidate == key) {
            Some((_, members)) => members.push(row),
            None => traces.push((key, vec![row])),
        }
    }

    let data = traces
        .into_iter()
        .map(|((sector, region), members)| {
            let name = format!("{sector}, {region}");
            let pattern = regions
                .iter()
                .position(|candidate| *candidate == region)
                .map(|idx| PATTERN_SHAPES[idx % PATTERN_SHAPES.len()])
                .unwrap_or_default();
            json!({
                "type": "bar",
                "name": name,
                "legendgroup": name,
                "x": members.iter().map(|row| row.ghg.as_str()).collect::<Vec<_>>(),
                "y": members.iter().map(|row| row.value).collect::<Vec<_>>(),
                "marker": {
                    "color": colors[sector],
                    "pattern": { "shape": pattern },
                },
                "orientation": "v",
                "showlegend": true,
            })
        })
        .collect();

    let mut layout = layout(title);
    layout["barmode"] = json!("relative");
    layout["legend"]["title"] = json!({ "text": legend_title });
    layout["xaxis"]["title"] = json!({ "text": "GHG" });
    layout["yaxis"]["title"] = json!({ "text": "Value" });

    Figure { data, layout }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eeio::tools::aggregate::{AggregationLevel, AggregationSpec};
    use crate::eeio::tools::model::{BASELINE, Label, sample_database};
    use nalgebra::DMatrix;

    #[test]
    fn palette_falls_back_in_order_of_appearance() {
        let palette = Palette::default();
        let colors = palette.assign(["Services", "Mining", "Fishing", "Mining"]);
        assert_eq!(colors["Services"], "#00CC66");
        assert_eq!(colors["Mining"], FALLBACK_COLORS[0]);
        assert_eq!(colors["Fishing"], FALLBACK_COLORS[1]);
    }

    #[test]
    fn impact_rows_keep_activities_and_weight_gases() {
        let frame = Frame::new(
            vec!["CH4".into(), "N2O".into()],
            vec![
                Label::new("EU", Level::Activity, "Power"),
                Label::new("EU", Level::Commodity, "Electricity"),
            ],
            DMatrix::from_row_slice(2, 2, &[-2.0, 7.0, -1.0, 9.0]),
        );
        let gwp = Gwp::new([("CH4", 25.0), ("N2O", 298.0)]);
        let rows = impact_rows(&frame, &gwp).expect("activity rows weighted");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ghg, "CH4");
        assert_eq!(rows[0].value, -50.0);
        assert_eq!(rows[1].ghg, "N2O");
        assert_eq!(rows[1].value, -298.0);
        assert!(rows.iter().all(|row| row.level == "Activity"));
    }

    #[test]
    fn global_emissions_cover_households_and_activities() {
        let database = sample_database();
        let gwp = Gwp::default();
        let rows = global_emissions(&database, BASELINE, &gwp, "t", "Gt").expect("global emissions computed");
        // 2 regions × (2 categories + 2 activities)
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0].item, "Households");

        let households = weighted(&database.demand_extension_frame(BASELINE).expect("EY frame"), &gwp)
            .expect("EY weighted")
            .total();
        let first_two: f64 = rows
            .iter()
            .filter(|row| row.item == "Households" || row.item == "Government")
            .map(|row| row.value)
            .sum();
        assert!((first_two - households / 1e9).abs() < 1e-18);
    }

    #[test]
    fn consumers_and_activities_in_one_group_share_a_leaf() {
        let database = sample_database()
            .aggregated(
                &AggregationSpec::default()
                    .with(
                        AggregationLevel::Activity,
                        [
                            ("Production of electricity by coal", "Households"),
                            ("Production of electricity by wind", "Power"),
                        ],
                    )
                    .with(
                        AggregationLevel::ConsumptionCategory,
                        [("Households", "Households"), ("Government", "Government")],
                    ),
            )
            .expect("aggregation succeeds");
        let gwp = Gwp::default();
        let rows = global_emissions(&database, BASELINE, &gwp, "t", "Gt")
            .expect("global emissions computed");
        // 2 regions × {Households, Government, Power}
        assert_eq!(rows.len(), 6);

        let figure = sunburst(&rows, &Palette::default(), "Global GHG emissions");
        let ids = figure.data[0]["ids"].as_array().expect("ids array").clone();
        let unique: std::collections::HashSet<_> =
            ids.iter().filter_map(|id| id.as_str()).collect();
        assert_eq!(unique.len(), ids.len());

        let eu_households = rows
            .iter()
            .find(|row| row.region == "EU" && row.item == "Households")
            .expect("merged leaf present");
        let weighted_e = weighted(&database.extension_frame(BASELINE).expect("E frame"), &gwp)
            .expect("E weighted");
        let weighted_ey =
            weighted(&database.demand_extension_frame(BASELINE).expect("EY frame"), &gwp)
                .expect("EY weighted");
        let eu = |frame: &Frame, item: &str| -> f64 {
            frame
                .by_region_item()
                .into_iter()
                .filter(|((region, candidate), _)| region == "EU" && candidate == item)
                .map(|(_, value)| value)
                .sum()
        };
        let expected = (eu(&weighted_ey, "Households") + eu(&weighted_e, "Households")) / 1e9;
        assert!((eu_households.value - expected).abs() < 1e-18);
    }

    #[test]
    fn sunburst_nests_items_under_regions() {
        let rows = vec![
            GlobalRow {
                region: "EU".into(),
                item: "Services".into(),
                value: 1.0,
            },
            GlobalRow {
                region: "EU".into(),
                item: "Households".into(),
                value: 2.0,
            },
        ];
        let figure = sunburst(&rows, &Palette::default(), "Global GHG emissions 3.00 Gton");
        let trace = &figure.data[0];
        assert_eq!(trace["parents"], json!(["EU", "EU", ""]));
        assert_eq!(trace["values"], json!([1.0, 2.0, 3.0]));
        assert_eq!(trace["marker"]["colors"][1], json!("#E59FEF"));
        assert_eq!(figure.layout["font"]["family"], json!(FONT_FAMILY));
    }

    #[test]
    fn bars_get_one_trace_per_sector_and_region() {
        let row = |ghg: &str, region: &str, sector: &str, value: f64| ImpactRow {
            ghg: ghg.into(),
            region: region.into(),
            level: "Activity".into(),
            sector: sector.into(),
            value,
        };
        let rows = vec![
            row("CH4", "EU", "Services", -1.0),
            row("CH4", "RoW", "Services", 0.5),
            row("N2O", "EU", "Services", -2.0),
        ];
        let figure = grouped_bar(&rows, &Palette::default(), "Saved", "Sector, Region");
        assert_eq!(figure.data.len(), 2);
        assert_eq!(figure.data[0]["x"], json!(["CH4", "N2O"]));
        assert_eq!(figure.data[0]["marker"]["pattern"]["shape"], json!(""));
        assert_eq!(figure.data[1]["marker"]["pattern"]["shape"], json!("/"));
        assert_eq!(figure.layout["barmode"], json!("relative"));
    }
}
