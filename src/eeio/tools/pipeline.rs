use std::path::PathBuf;

use tracing::{info, instrument};

use crate::eeio::tools::chart::{self, GlobalRow, ImpactRow, Palette};
use crate::eeio::tools::config::{AnalysisSettings, ProjectPaths, SpotCheckSettings};
use crate::eeio::tools::emissions::{self, EmissionsSummary};
use crate::eeio::tools::error::{Result, ToolError};
use crate::eeio::tools::impact::{self, ExtensionMatrix};
use crate::eeio::tools::io::{excel_read, excel_write, html};
use crate::eeio::tools::model::{BASELINE, Database, Frame, Label, Level};
use crate::eeio::tools::query::CommodityReport;
use crate::eeio::tools::shock::ShockTargets;
use crate::eeio::tools::units::Quantity;

/// Legend title of the saved-emissions bar chart.
pub const BAR_LEGEND_TITLE: &str = "Sector, Region (hatched fill is RoW)";

/// Emission intensity picked for the spot check, before and after conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotCheck {
    pub label: Label,
    pub intensity: Quantity,
    pub converted: Quantity,
}

/// Everything the analysis computes, in pipeline order.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// Commodity diagnostic of the baseline.
    pub commodity: CommodityReport,
    /// Baseline GHG emissions.
    pub emissions: EmissionsSummary,
    /// Scenario minus baseline of `E`, after results aggregation.
    pub impact: Frame,
    pub impact_rows: Vec<ImpactRow>,
    pub global: Vec<GlobalRow>,
    /// Sum of the sunburst leaves.
    pub global_total: Quantity,
    /// Net GWP-weighted change of the activities. Negative means saved.
    pub saved: Quantity,
    pub spot_check: SpotCheck,
    /// Written HTML files, sunburst first.
    pub charts: Vec<PathBuf>,
}

/// Runs the full analysis: load, aggregate, report, shock, compare, plot.
#[instrument(level = "info", skip_all, fields(scenario = %settings.scenario))]
pub fn run(paths: &ProjectPaths, settings: &AnalysisSettings) -> Result<AnalysisReport> {
    let database_path = paths.dataset(&settings.database)?;
    let mut world = excel_read::read_database(database_path, &settings.extensions)?;
    world.aggregate(&excel_read::read_aggregation(&settings.region_aggregation)?)?;

    let report = &settings.report;
    let commodity = world.commodity_report(
        BASELINE,
        &report.region,
        report.level.into(),
        &report.search,
        report.case_sensitive,
    )?;
    info!(items = commodity.items.len(), "commodity report ready");

    let emissions = emissions::summarize(
        &world.extension_frame(BASELINE)?,
        &settings.gwp,
        &settings.emission_unit,
        &settings.report_unit,
    )?;
    info!(total = %emissions.total_reported, "baseline GHG emissions");

    let shock = excel_read::read_shock(&settings.shock, ShockTargets::Z)?;
    world.apply_shock(&shock, &settings.scenario)?;

    excel_write::write_aggregation_template(&settings.aggregation_template, world.classification())?;
    let world_agg =
        world.aggregated(&excel_read::read_aggregation(&settings.results_aggregation)?)?;

    let impact = impact::impact(
        &world_agg,
        &[ExtensionMatrix::E],
        BASELINE,
        &[settings.scenario.as_str()],
    )?
    .into_iter()
    .next()
    .map(|impact| impact.frame)
    .ok_or_else(|| ToolError::UnknownScenario(settings.scenario.clone()))?;

    let impact_rows = chart::impact_rows(&impact, &settings.gwp)?;
    let global = chart::global_emissions(
        &world_agg,
        BASELINE,
        &settings.gwp,
        &settings.emission_unit,
        &settings.report_unit,
    )?;
    let global_total = Quantity::new(
        global.iter().map(|row| row.value).sum(),
        &settings.report_unit,
    )?;
    let saved = Quantity::new(
        impact_rows.iter().map(|row| row.value).sum(),
        &settings.emission_unit,
    )?
    .to(&settings.report_unit)?;

    let charts = render_charts(settings, &global, &global_total, &impact_rows, &saved)?;
    let spot_check = spot_check(&world, &settings.spot_check)?;

    Ok(AnalysisReport {
        commodity,
        emissions,
        impact,
        impact_rows,
        global,
        global_total,
        saved,
        spot_check,
        charts,
    })
}

fn render_charts(
    settings: &AnalysisSettings,
    global: &[GlobalRow],
    global_total: &Quantity,
    impact_rows: &[ImpactRow],
    saved: &Quantity,
) -> Result<Vec<PathBuf>> {
    let palette = Palette::default();

    let sunburst = chart::sunburst(
        global,
        &palette,
        &format!("Global GHG emissions {:.2} Gton", global_total.value()),
    );
    let sunburst_path = settings.output_dir.join(&settings.sunburst_file);
    html::write_html(&sunburst_path, &sunburst)?;

    let bar = chart::grouped_bar(
        impact_rows,
        &palette,
        &format!(
            "Saved GHG emissions: {:.2} {}",
            -saved.value(),
            saved.unit()
        ),
        BAR_LEGEND_TITLE,
    );
    let bar_path = settings.output_dir.join(&settings.bar_file);
    html::write_html(&bar_path, &bar)?;

    Ok(vec![sunburst_path, bar_path])
}

/// Converts one emission intensity of the matching activities as a sanity
/// check of the database units.
#[instrument(level = "debug", skip_all, fields(account = %settings.account, index = settings.index))]
pub fn spot_check(database: &Database, settings: &SpotCheckSettings) -> Result<SpotCheck> {
    let activities = database.search(
        Level::Activity,
        &settings.activity_search,
        settings.case_sensitive,
    );
    let intensities = database
        .intensity_frame(BASELINE)?
        .select_rows(&[settings.account.as_str()])?
        .filter_columns(|label| label.level == Level::Activity && activities.contains(&label.item));

    let len = intensities.columns().len();
    if settings.index >= len {
        return Err(ToolError::IndexOutOfRange {
            index: settings.index,
            len,
        });
    }

    let label = intensities.columns()[settings.index].clone();
    let intensity = Quantity::new(
        intensities.values()[(0, settings.index)],
        &settings.from_unit,
    )?;
    let converted = intensity.to(&settings.to_unit)?;
    info!(%label, %converted, "emission factor");
    Ok(SpotCheck {
        label,
        intensity,
        converted,
    })
}
