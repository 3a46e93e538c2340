use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};
use tracing::{debug, info, instrument};

use crate::eeio::tools::aggregate::{AggregationLevel, AggregationSpec};
use crate::eeio::tools::error::{Result, ToolError};
use crate::eeio::tools::model::{Classification, Database, Label, Level, Matrices};
use crate::eeio::tools::shock::{AccountShock, SectorShock, ShockKind, ShockSpec, ShockTargets};

/// Sheet declaring every activity and commodity with its unit.
pub const UNITS_SHEET: &str = "Units";
/// Sheet declaring every satellite account with its extension group and unit.
pub const ACCOUNTS_SHEET: &str = "Accounts";
/// Intermediate transactions in long form.
pub const Z_SHEET: &str = "Z";
/// Final demand in long form.
pub const Y_SHEET: &str = "Y";
/// Satellite accounts of production in long form.
pub const E_SHEET: &str = "E";
/// Optional satellite accounts of final demand.
pub const EY_SHEET: &str = "EY";

/// Shock sheets addressed by the `z`, `Y` and `e` targets.
pub const SHOCK_Z_SHEET: &str = "z";
pub const SHOCK_Y_SHEET: &str = "Y";
pub const SHOCK_E_SHEET: &str = "e";

type Range = calamine::Range<DataType>;

/// Loads a hybrid supply-use database workbook keeping only the satellite
/// accounts that belong to one of `extensions`.
#[instrument(level = "info", skip_all, fields(path = %path.display(), ?extensions))]
pub fn read_database(path: &Path, extensions: &[String]) -> Result<Database> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    let mut workbook: Xlsx<_> = open_workbook(path)?;

    let units_range = read_required_sheet(&mut workbook, UNITS_SHEET)?;
    let accounts_range = read_required_sheet(&mut workbook, ACCOUNTS_SHEET)?;
    let z_range = read_required_sheet(&mut workbook, Z_SHEET)?;
    let y_range = read_required_sheet(&mut workbook, Y_SHEET)?;
    let e_range = read_required_sheet(&mut workbook, E_SHEET)?;
    let ey_range = read_optional_sheet(&mut workbook, EY_SHEET)?;

    let mut classification = Classification::default();
    parse_units(&units_range, &mut classification)?;
    let declared_accounts = parse_accounts(&accounts_range, extensions, &mut classification)?;
    collect_regions(&z_range, &y_range, &mut classification);

    let sector_positions = classification.sector_positions();
    let demand_positions = classification.demand_positions();
    let mut matrices = Matrices::zeros(
        sector_positions.len(),
        demand_positions.len(),
        classification.accounts.len(),
    );

    for row in data_rows(&z_range) {
        let from = label_at(row, 0, &sector_positions)?;
        let to = label_at(row, 3, &sector_positions)?;
        matrices.z[(from, to)] += cell_to_f64(row.get(6), Z_SHEET)?;
    }

    for row in data_rows(&y_range) {
        let from = label_at(row, 0, &sector_positions)?;
        let to = demand_at(row, 3, &demand_positions)?;
        matrices.y[(from, to)] += cell_to_f64(row.get(5), Y_SHEET)?;
    }

    for row in data_rows(&e_range) {
        let Some(account) = account_row(row, &classification, &declared_accounts)? else {
            continue;
        };
        let to = label_at(row, 1, &sector_positions)?;
        matrices.e[(account, to)] += cell_to_f64(row.get(4), E_SHEET)?;
    }

    if let Some(ey_range) = ey_range {
        for row in data_rows(&ey_range) {
            let Some(account) = account_row(row, &classification, &declared_accounts)? else {
                continue;
            };
            let to = demand_at(row, 1, &demand_positions)?;
            matrices.ey[(account, to)] += cell_to_f64(row.get(3), EY_SHEET)?;
        }
    }

    info!(
        regions = classification.regions.len(),
        activities = classification.activities.len(),
        commodities = classification.commodities.len(),
        accounts = classification.accounts.len(),
        "loaded database"
    );

    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    Database::new(name, classification, matrices)
}

/// Reads an aggregation workbook. Sheets that are absent leave their level
/// untouched; a blank aggregation cell is kept as an empty group name.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn read_aggregation(path: &Path) -> Result<AggregationSpec> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let mut spec = AggregationSpec::default();

    for level in AggregationLevel::ALL {
        let Some(range) = read_optional_sheet(&mut workbook, level.sheet_name())? else {
            continue;
        };
        let mapping: Vec<(String, String)> = data_rows(&range)
            .map(|row| (cell_to_string(row.first()), cell_to_string(row.get(1))))
            .collect();
        debug!(sheet = level.sheet_name(), labels = mapping.len(), "aggregation sheet");
        spec.set(level, mapping);
    }

    Ok(spec)
}

/// Reads the shock sheets selected by `targets`.
#[instrument(level = "debug", skip_all, fields(path = %path.display(), ?targets))]
pub fn read_shock(path: &Path, targets: ShockTargets) -> Result<ShockSpec> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let mut spec = ShockSpec::default();

    if targets.z {
        let range = read_required_sheet(&mut workbook, SHOCK_Z_SHEET)?;
        for row in data_rows(&range) {
            spec.z.push(SectorShock {
                row: label_cells(row, 0)?,
                column: label_cells(row, 3)?,
                kind: cell_to_string(row.get(6)).parse()?,
                value: cell_to_f64(row.get(7), SHOCK_Z_SHEET)?,
            });
        }
    }

    if targets.y {
        let range = read_required_sheet(&mut workbook, SHOCK_Y_SHEET)?;
        for row in data_rows(&range) {
            spec.y.push(SectorShock {
                row: label_cells(row, 0)?,
                column: Label::new(
                    cell_to_string(row.get(3)),
                    Level::ConsumptionCategory,
                    cell_to_string(row.get(4)),
                ),
                kind: cell_to_string(row.get(5)).parse()?,
                value: cell_to_f64(row.get(6), SHOCK_Y_SHEET)?,
            });
        }
    }

    if targets.e {
        let range = read_required_sheet(&mut workbook, SHOCK_E_SHEET)?;
        for row in data_rows(&range) {
            spec.e.push(AccountShock {
                account: cell_to_string(row.first()),
                column: label_cells(row, 1)?,
                kind: cell_to_string(row.get(4)).parse::<ShockKind>()?,
                value: cell_to_f64(row.get(5), SHOCK_E_SHEET)?,
            });
        }
    }

    debug!(z = spec.z.len(), y = spec.y.len(), e = spec.e.len(), "shock rows");
    Ok(spec)
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<Range> {
    read_optional_sheet(workbook, name)?
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("missing sheet '{name}'")))
}

fn read_optional_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<Option<Range>> {
    match workbook.worksheet_range(name) {
        Some(range) => Ok(Some(range.map_err(ToolError::from)?)),
        None => Ok(None),
    }
}

/// Rows after the header whose first cell is not blank.
fn data_rows(range: &Range) -> impl Iterator<Item = &[DataType]> {
    range
        .rows()
        .skip(1)
        .filter(|row| !cell_to_string(row.first()).is_empty())
}

fn parse_units(range: &Range, classification: &mut Classification) -> Result<()> {
    let mut seen = BTreeSet::new();
    for row in data_rows(range) {
        let level: Level = cell_to_string(row.first()).parse()?;
        let item = cell_to_string(row.get(1));
        let unit = cell_to_string(row.get(2));
        if item.is_empty() {
            continue;
        }
        if !seen.insert((level, item.clone())) {
            return Err(ToolError::InvalidWorkbook(format!(
                "{level} '{item}' is declared twice in sheet '{UNITS_SHEET}'"
            )));
        }
        match level {
            Level::Activity => classification.activities.push(item.clone()),
            Level::Commodity => classification.commodities.push(item.clone()),
            Level::ConsumptionCategory => {
                return Err(ToolError::InvalidWorkbook(format!(
                    "consumption category '{item}' cannot carry a unit"
                )));
            }
        }
        classification.item_units.insert((level, item), unit);
    }
    Ok(())
}

/// Registers the accounts of the requested extension groups and returns every
/// declared account name.
fn parse_accounts(
    range: &Range,
    extensions: &[String],
    classification: &mut Classification,
) -> Result<BTreeSet<String>> {
    let mut declared = BTreeSet::new();
    for row in data_rows(range) {
        let account = cell_to_string(row.first());
        let extension = cell_to_string(row.get(1));
        let unit = cell_to_string(row.get(2));
        if !declared.insert(account.clone()) {
            return Err(ToolError::InvalidWorkbook(format!(
                "account '{account}' is declared twice in sheet '{ACCOUNTS_SHEET}'"
            )));
        }
        let requested = extensions
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(&extension));
        if !requested {
            continue;
        }
        classification.accounts.push(account.clone());
        classification.account_units.insert(account.clone(), unit);
        classification.account_extensions.insert(account, extension);
    }
    Ok(declared)
}

fn push_unique(values: &mut Vec<String>, value: String) {
    if !value.is_empty() && !values.contains(&value) {
        values.push(value);
    }
}

fn collect_regions(z_range: &Range, y_range: &Range, classification: &mut Classification) {
    for row in data_rows(z_range) {
        push_unique(&mut classification.regions, cell_to_string(row.first()));
        push_unique(&mut classification.regions, cell_to_string(row.get(3)));
    }
    for row in data_rows(y_range) {
        push_unique(&mut classification.regions, cell_to_string(row.first()));
        push_unique(&mut classification.regions, cell_to_string(row.get(3)));
        push_unique(&mut classification.categories, cell_to_string(row.get(4)));
    }
}

fn label_cells(row: &[DataType], offset: usize) -> Result<Label> {
    Ok(Label::new(
        cell_to_string(row.get(offset)),
        cell_to_string(row.get(offset + 1)).parse()?,
        cell_to_string(row.get(offset + 2)),
    ))
}

fn label_at(row: &[DataType], offset: usize, positions: &HashMap<Label, usize>) -> Result<usize> {
    let label = label_cells(row, offset)?;
    lookup(label, positions)
}

fn demand_at(row: &[DataType], offset: usize, positions: &HashMap<Label, usize>) -> Result<usize> {
    let label = Label::new(
        cell_to_string(row.get(offset)),
        Level::ConsumptionCategory,
        cell_to_string(row.get(offset + 1)),
    );
    lookup(label, positions)
}

fn lookup(label: Label, positions: &HashMap<Label, usize>) -> Result<usize> {
    positions
        .get(&label)
        .copied()
        .ok_or_else(|| ToolError::UnknownLabel {
            kind: "label".into(),
            label: label.to_string(),
        })
}

/// Position of the account named in the first cell, `None` for accounts of
/// extension groups that were not requested.
fn account_row(
    row: &[DataType],
    classification: &Classification,
    declared: &BTreeSet<String>,
) -> Result<Option<usize>> {
    let account = cell_to_string(row.first());
    if !declared.contains(&account) {
        return Err(ToolError::UnknownLabel {
            kind: "satellite account".into(),
            label: account,
        });
    }
    match classification.account_position(&account) {
        Ok(position) => Ok(Some(position)),
        Err(_) => Ok(None),
    }
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.trim().to_string(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn cell_to_f64(cell: Option<&DataType>, sheet: &str) -> Result<f64> {
    match cell {
        Some(DataType::Float(value)) => Ok(*value),
        Some(DataType::Int(value)) => Ok(*value as f64),
        Some(DataType::Empty) | None => Ok(0.0),
        Some(DataType::String(value)) => value.trim().parse::<f64>().map_err(|_| {
            ToolError::InvalidWorkbook(format!("invalid number '{value}' in sheet '{sheet}'"))
        }),
        Some(other) => Err(ToolError::InvalidWorkbook(format!(
            "invalid number '{other}' in sheet '{sheet}'"
        ))),
    }
}
