use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::error::{Result, ScrapeError};
use crate::model::{GrowthKind, GrowthPanel};
use crate::parser::table::text_of;

static RANGES_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.ranges-table").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// Decode the four ranges tables by position: table i is `GrowthKind::ALL[i]`,
/// and within a table data row j is horizon j. Labels are never consulted.
pub fn extract(doc: &Html, consolidated: bool) -> Result<Vec<GrowthPanel>> {
    let tables: Vec<ElementRef<'_>> = doc.select(&RANGES_TABLE).collect();
    if tables.len() < GrowthKind::ALL.len() {
        return Err(ScrapeError::parse(format!(
            "expected {} growth panels, found {}",
            GrowthKind::ALL.len(),
            tables.len()
        )));
    }

    GrowthKind::ALL
        .iter()
        .zip(tables)
        .map(|(&kind, table)| decode_panel(kind, table, consolidated))
        .collect()
}

fn decode_panel(kind: GrowthKind, table: ElementRef<'_>, consolidated: bool) -> Result<GrowthPanel> {
    let values: Vec<String> = table
        .select(&ROW)
        .filter(|tr| tr.select(&TD).next().is_some())
        .map(|tr| tr.select(&TD).nth(1).map(text_of).unwrap_or_default())
        .collect();

    let [ten_years, five_years, three_years, recent]: [String; 4] =
        values.try_into().map_err(|v: Vec<String>| {
            ScrapeError::parse(format!("{} panel has {} rows, expected 4", kind.table(), v.len()))
        })?;

    Ok(GrowthPanel {
        kind,
        consolidated,
        ten_years,
        five_years,
        three_years,
        recent,
    })
}
