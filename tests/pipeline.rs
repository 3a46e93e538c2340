use std::fs;
use std::path::{Path, PathBuf};

use eeio_tools::config::{AnalysisSettings, ProjectPaths};
use eeio_tools::io::{excel_read, excel_write};
use eeio_tools::model::{BASELINE, Label, Level};
use eeio_tools::pipeline;
use eeio_tools::shock::{ShockKind, ShockTargets};
use eeio_tools::ToolError;
use rust_xlsxwriter::Workbook;
use tempfile::tempdir;

const REGIONS: [&str; 3] = ["IT", "DE", "US"];
const ACTIVITIES: [&str; 3] = [
    "Production of electricity by coal",
    "Production of electricity by wind",
    "Extraction of natural gas",
];
const COMMODITIES: [&str; 2] = ["Electricity", "Natural gas"];
const HOUSEHOLDS: &str = "Final consumption expenditure by households";
const ACCOUNTS: [(&str, &str, &str); 6] = [
    ("N2O", "Emiss", "t"),
    ("CH4", "Emiss", "t"),
    ("CO2 - fossil", "Emiss", "t"),
    ("CO2 - biogenic", "Emiss", "t"),
    ("Cropland", "Land", "km^2"),
    ("Water consumption", "Water", "Mm^3"),
];
const SCENARIO: &str = "EU power to low carbon";

enum Cell<'a> {
    Text(&'a str),
    Number(f64),
}

fn write_sheet(workbook: &mut Workbook, name: &str, header: &[&str], rows: &[Vec<Cell<'_>>]) {
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(name).expect("sheet name");
    for (col, title) in header.iter().enumerate() {
        worksheet.write_string(0, col as u16, *title).expect("header");
    }
    for (row_idx, row) in rows.iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            let row_num = (row_idx + 1) as u32;
            match cell {
                Cell::Text(value) => {
                    worksheet.write_string(row_num, col as u16, *value).expect("text");
                }
                Cell::Number(value) => {
                    worksheet.write_number(row_num, col as u16, *value).expect("number");
                }
            }
        }
    }
}

fn sectors() -> Vec<(&'static str, &'static str, &'static str)> {
    let mut sectors = Vec::new();
    for region in REGIONS {
        for activity in ACTIVITIES {
            sectors.push((region, "Activity", activity));
        }
        for commodity in COMMODITIES {
            sectors.push((region, "Commodity", commodity));
        }
    }
    sectors
}

fn write_database(path: &Path) {
    let mut workbook = Workbook::new();

    let mut units = Vec::new();
    for activity in ACTIVITIES {
        units.push(vec![Cell::Text("Activity"), Cell::Text(activity), Cell::Text("TJ")]);
    }
    for commodity in COMMODITIES {
        units.push(vec![Cell::Text("Commodity"), Cell::Text(commodity), Cell::Text("TJ")]);
    }
    write_sheet(&mut workbook, "Units", &["Level", "Item", "Unit"], &units);

    let accounts: Vec<Vec<Cell>> = ACCOUNTS
        .iter()
        .map(|(account, extension, unit)| {
            vec![Cell::Text(account), Cell::Text(extension), Cell::Text(unit)]
        })
        .collect();
    write_sheet(&mut workbook, "Accounts", &["Account", "Extension", "Unit"], &accounts);

    let sectors = sectors();
    let mut z = Vec::new();
    for (i, (region, level, item)) in sectors.iter().enumerate() {
        for (j, (region_to, level_to, item_to)) in sectors.iter().enumerate() {
            z.push(vec![
                Cell::Text(region),
                Cell::Text(level),
                Cell::Text(item),
                Cell::Text(region_to),
                Cell::Text(level_to),
                Cell::Text(item_to),
                Cell::Number(1.0 + ((i * 3 + j * 5) % 7) as f64),
            ]);
        }
    }
    write_sheet(
        &mut workbook,
        "Z",
        &["Region", "Level", "Item", "Region to", "Level to", "Item to", "Value"],
        &z,
    );

    let mut y = Vec::new();
    for (i, (region, level, item)) in sectors.iter().enumerate() {
        for region_to in REGIONS {
            y.push(vec![
                Cell::Text(region),
                Cell::Text(level),
                Cell::Text(item),
                Cell::Text(region_to),
                Cell::Text(HOUSEHOLDS),
                Cell::Number(50.0 + i as f64),
            ]);
        }
    }
    write_sheet(
        &mut workbook,
        "Y",
        &["Region", "Level", "Item", "Region to", "Category", "Value"],
        &y,
    );

    let mut e = Vec::new();
    let mut ey = Vec::new();
    for (a, (account, _, _)) in ACCOUNTS.iter().enumerate() {
        for (j, (region, level, item)) in sectors.iter().enumerate() {
            e.push(vec![
                Cell::Text(account),
                Cell::Text(region),
                Cell::Text(level),
                Cell::Text(item),
                Cell::Number(((a + 1) * (j + 1)) as f64),
            ]);
        }
        for region in REGIONS {
            ey.push(vec![
                Cell::Text(account),
                Cell::Text(region),
                Cell::Text(HOUSEHOLDS),
                Cell::Number(((a + 1) * 10) as f64),
            ]);
        }
    }
    write_sheet(
        &mut workbook,
        "E",
        &["Account", "Region", "Level", "Item", "Value"],
        &e,
    );
    write_sheet(
        &mut workbook,
        "EY",
        &["Account", "Region", "Category", "Value"],
        &ey,
    );

    workbook.save(path).expect("database written");
}

fn write_mapping(path: &Path, sheets: &[(&str, Vec<(&str, &str)>)]) {
    let mut workbook = Workbook::new();
    for (sheet, mapping) in sheets {
        let rows: Vec<Vec<Cell>> = mapping
            .iter()
            .map(|(label, group)| vec![Cell::Text(label), Cell::Text(group)])
            .collect();
        write_sheet(&mut workbook, sheet, &[sheet, "Aggregation"], &rows);
    }
    workbook.save(path).expect("aggregation written");
}

fn write_shock(path: &Path) {
    let mut workbook = Workbook::new();
    let rows: Vec<Vec<Cell>> = ["EU"]
        .iter()
        .map(|region| {
            vec![
                Cell::Text(region),
                Cell::Text("Activity"),
                Cell::Text(ACTIVITIES[0]),
                Cell::Text(region),
                Cell::Text("Commodity"),
                Cell::Text("Electricity"),
                Cell::Text("Update"),
                Cell::Number(0.0),
            ]
        })
        .collect();
    write_sheet(
        &mut workbook,
        "z",
        &[
            "row Region",
            "row Level",
            "row Sector",
            "column Region",
            "column Level",
            "column Sector",
            "type",
            "value",
        ],
        &rows,
    );
    workbook.save(path).expect("shock written");
}

fn write_demand_and_intensity_shock(path: &Path) {
    let mut workbook = Workbook::new();
    write_sheet(
        &mut workbook,
        "Y",
        &[
            "row Region",
            "row Level",
            "row Sector",
            "column Region",
            "Demand category",
            "type",
            "value",
        ],
        &[vec![
            Cell::Text("IT"),
            Cell::Text("Commodity"),
            Cell::Text("Electricity"),
            Cell::Text("IT"),
            Cell::Text(HOUSEHOLDS),
            Cell::Text("Percentage"),
            Cell::Number(0.5),
        ]],
    );
    write_sheet(
        &mut workbook,
        "e",
        &[
            "row Account",
            "column Region",
            "column Level",
            "column Sector",
            "type",
            "value",
        ],
        &[vec![
            Cell::Text("CO2 - fossil"),
            Cell::Text("IT"),
            Cell::Text("Activity"),
            Cell::Text(ACTIVITIES[0]),
            Cell::Text("Update"),
            Cell::Number(0.0),
        ]],
    );
    workbook.save(path).expect("shock written");
}

struct Project {
    _dir: tempfile::TempDir,
    root: PathBuf,
    paths: ProjectPaths,
    settings: AnalysisSettings,
}

fn project() -> Project {
    let dir = tempdir().expect("temporary directory");
    let root = dir.path().to_path_buf();
    fs::create_dir_all(root.join("Aggregation")).expect("aggregation dir");
    fs::create_dir_all(root.join("Shock")).expect("shock dir");
    fs::create_dir_all(root.join("Plot")).expect("plot dir");

    let database = root.join("hybrid.xlsx");
    write_database(&database);

    let settings = AnalysisSettings::default().rooted_at(&root);
    write_mapping(
        &settings.region_aggregation,
        &[(
            "Region",
            vec![("IT", "EU"), ("DE", "EU"), ("US", "RoW")],
        )],
    );
    write_mapping(
        &settings.results_aggregation,
        &[
            ("Region", vec![("EU", "EU"), ("RoW", "RoW")]),
            (
                "Activity",
                vec![
                    (ACTIVITIES[0], "Non-Renewable Electricity"),
                    (ACTIVITIES[1], "Renewable Electricity"),
                    (ACTIVITIES[2], "Gas and heating"),
                ],
            ),
            (
                "Commodity",
                vec![("Electricity", "Electricity"), ("Natural gas", "Natural gas")],
            ),
            ("Consumption category", vec![(HOUSEHOLDS, "Households")]),
        ],
    );
    write_shock(&settings.shock);

    let paths_file = root.join("Project paths.json");
    fs::write(
        &paths_file,
        serde_json::to_string(&serde_json::json!({ "exio_H": { "path": database } }))
            .expect("paths serialised"),
    )
    .expect("paths written");
    let paths = ProjectPaths::load(&paths_file).expect("paths loaded");

    Project {
        _dir: dir,
        root,
        paths,
        settings,
    }
}

#[test]
fn database_loads_only_requested_extensions() {
    let project = project();
    let database = excel_read::read_database(
        project.paths.dataset("exio_H").expect("dataset"),
        &project.settings.extensions,
    )
    .expect("database loaded");

    let classification = database.classification();
    assert_eq!(classification.regions, vec!["IT", "DE", "US"]);
    assert_eq!(classification.accounts.len(), 5);
    assert!(!classification.accounts.contains(&"Water consumption".to_string()));
    assert_eq!(classification.categories, vec![HOUSEHOLDS]);

    let baseline = database.scenario(BASELINE).expect("baseline");
    assert_eq!(baseline.z.shape(), (15, 15));
    assert_eq!(baseline.y.shape(), (15, 3));
    // CO2 - fossil (a = 2) on IT coal (j = 0)
    assert_eq!(baseline.e[(2, 0)], 3.0);
}

#[test]
fn full_analysis_writes_charts_and_reports_savings() {
    let project = project();
    let report = pipeline::run(&project.paths, &project.settings).expect("analysis ran");

    assert_eq!(report.commodity.items, vec!["Natural gas".to_string()]);
    assert_eq!(report.commodity.units[0].1, "TJ");
    assert!(report.commodity.production[0].1 > 0.0);
    assert!(report.commodity.consumption > 0.0);

    let regional: f64 = report.emissions.by_region.iter().map(|(_, value)| value).sum();
    assert!((regional - report.emissions.total.value()).abs() < 1e-6);
    assert_eq!(
        report.emissions.total_reported.value(),
        report.emissions.total.value() / 1e9
    );

    assert_eq!(report.impact.axis(), "Account");
    assert!(report.impact.total() < 0.0);
    assert!(report.saved.value() < 0.0);
    assert!(report
        .impact_rows
        .iter()
        .any(|row| row.sector == "Non-Renewable Electricity" && row.region == "EU"));

    assert_eq!(report.charts.len(), 2);
    let sunburst = fs::read_to_string(&report.charts[0]).expect("sunburst written");
    assert!(sunburst.contains("Plotly.newPlot"));
    assert!(sunburst.contains("Global GHG emissions"));
    let bar = fs::read_to_string(&report.charts[1]).expect("bar chart written");
    assert!(bar.contains("Saved GHG emissions"));
    assert!(bar.contains("#A48806"));

    assert!(project.settings.aggregation_template.exists());
    assert_eq!(report.spot_check.label.level, Level::Activity);
    assert!(
        (report.spot_check.converted.value() - report.spot_check.intensity.value() * 3.6).abs()
            < 1e-12
    );
}

#[test]
fn aggregation_template_lists_labels_without_groups() {
    let project = project();
    let database = excel_read::read_database(
        project.paths.dataset("exio_H").expect("dataset"),
        &project.settings.extensions,
    )
    .expect("database loaded");
    let template = project.root.join("template.xlsx");
    excel_write::write_aggregation_template(&template, database.classification())
        .expect("template written");

    let spec = excel_read::read_aggregation(&template).expect("template read");
    let error = database.aggregated(&spec).unwrap_err();
    assert!(matches!(error, ToolError::Unmapped { level, label } if level == "Region" && label == "IT"));
}

#[test]
fn missing_output_directory_is_fatal() {
    let mut project = project();
    project.settings.output_dir = project.root.join("does-not-exist");
    let error = pipeline::run(&project.paths, &project.settings).unwrap_err();
    assert!(matches!(error, ToolError::MissingOutputDirectory(_)));
}

#[test]
fn missing_project_paths_file_is_reported() {
    let dir = tempdir().expect("temporary directory");
    let error = ProjectPaths::load(&dir.path().join("Project paths.json")).unwrap_err();
    assert!(matches!(error, ToolError::MissingInput(_)));
}

#[test]
fn demand_and_intensity_shocks_propagate() {
    let project = project();
    let mut database = excel_read::read_database(
        project.paths.dataset("exio_H").expect("dataset"),
        &project.settings.extensions,
    )
    .expect("database loaded");

    let shock_path = project.root.join("Shock").join("demand and intensity.xlsx");
    write_demand_and_intensity_shock(&shock_path);
    let targets = ShockTargets {
        y: true,
        e: true,
        ..ShockTargets::default()
    };
    let spec = excel_read::read_shock(&shock_path, targets).expect("shock read");

    assert!(spec.z.is_empty());
    assert_eq!(spec.y.len(), 1);
    assert_eq!(spec.y[0].row, Label::new("IT", Level::Commodity, "Electricity"));
    assert_eq!(
        spec.y[0].column,
        Label::new("IT", Level::ConsumptionCategory, HOUSEHOLDS)
    );
    assert_eq!(spec.y[0].kind, ShockKind::Percentage);
    assert_eq!(spec.y[0].value, 0.5);
    assert_eq!(spec.e.len(), 1);
    assert_eq!(spec.e[0].account, "CO2 - fossil");
    assert_eq!(spec.e[0].column, Label::new("IT", Level::Activity, ACTIVITIES[0]));
    assert_eq!(spec.e[0].kind, ShockKind::Update);
    assert_eq!(spec.e[0].value, 0.0);

    database.apply_shock(&spec, SCENARIO).expect("shock applied");
    let baseline = database.scenario(BASELINE).expect("baseline");
    let scenario = database.scenario(SCENARIO).expect("scenario");

    // IT electricity is sector 3; IT households is demand column 0.
    assert_eq!(scenario.y[(3, 0)], baseline.y[(3, 0)] * 1.5);
    assert!(scenario.output()[3] > baseline.output()[3]);

    // CO2 - fossil is account 2; IT coal is sector 0.
    assert_eq!(scenario.e[(2, 0)], 0.0);
    let intensity = baseline.intensities()[(2, 1)];
    let expected = intensity * scenario.output()[1];
    assert!((scenario.e[(2, 1)] - expected).abs() <= 1e-9 * expected.abs());
}

#[test]
fn selected_shock_sheet_must_exist() {
    let project = project();
    let targets = ShockTargets {
        y: true,
        ..ShockTargets::default()
    };
    let error = excel_read::read_shock(&project.settings.shock, targets).unwrap_err();
    assert!(matches!(error, ToolError::InvalidWorkbook(message) if message.contains("'Y'")));
}
