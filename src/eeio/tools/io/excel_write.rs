use std::path::Path;

use rust_xlsxwriter::Workbook;
use tracing::instrument;

use crate::eeio::tools::aggregate::AggregationLevel;
use crate::eeio::tools::error::Result;
use crate::eeio::tools::model::Classification;

/// Header of the group column in aggregation workbooks.
pub const AGGREGATION_COLUMN: &str = "Aggregation";

/// Writes an aggregation workbook listing every label of `classification`
/// with an empty group column, one sheet per level.
#[instrument(level = "info", skip(classification), fields(path = %path.display()))]
pub fn write_aggregation_template(path: &Path, classification: &Classification) -> Result<()> {
    let mut workbook = Workbook::new();

    for level in AggregationLevel::ALL {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(level.sheet_name())?;
        worksheet.write_string(0, 0, level.sheet_name())?;
        worksheet.write_string(0, 1, AGGREGATION_COLUMN)?;

        for (row_idx, label) in level.labels(classification).iter().enumerate() {
            worksheet.write_string((row_idx + 1) as u32, 0, label)?;
        }
        worksheet.set_column_width(0, 48)?;
        worksheet.set_column_width(1, 24)?;
    }

    workbook.save(path)?;
    Ok(())
}
