use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Selector};
use tracing::warn;

use crate::error::{Result, ScrapeError};

static HEAD_ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("thead tr").unwrap());
static ANY_ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static BODY_ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tbody > tr").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static TRIGGER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("button[onclick]").unwrap());

/// Marker the site appends to labels of expandable rows.
const EXPAND_MARKER: char = '+';

/// A markup table flattened to text, before any expansion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Header labels, including the (usually empty) label column.
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    /// First cell is the row label.
    pub cells: Vec<String>,
    /// Inline command of an expansion button, if the row has one.
    pub trigger: Option<String>,
}

impl RawRow {
    pub fn new<S: Into<String>>(cells: impl IntoIterator<Item = S>) -> Self {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
            trigger: None,
        }
    }

    pub fn label(&self) -> &str {
        self.cells.first().map(String::as_str).unwrap_or("")
    }
}

/// All descendant text, whitespace runs (including nbsp) collapsed, trimmed.
pub fn text_of(el: ElementRef<'_>) -> String {
    normalize_ws(&el.text().collect::<String>())
}

pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop the trailing expand marker from a row label.
pub fn strip_marker(label: &str) -> String {
    let trimmed = label.trim();
    trimmed
        .strip_suffix(EXPAND_MARKER)
        .unwrap_or(trimmed)
        .trim_end()
        .to_string()
}

pub fn read_table(table: ElementRef<'_>) -> Result<RawTable> {
    let header_row = table
        .select(&HEAD_ROW)
        .next()
        .or_else(|| table.select(&ANY_ROW).find(|tr| tr.select(&TD).next().is_none()))
        .ok_or_else(|| ScrapeError::parse("table has no header row"))?;

    let headers = header_row.select(&CELL).map(text_of).collect();

    let rows = table
        .select(&BODY_ROW)
        .filter(|tr| tr.select(&TD).next().is_some())
        .map(|tr| RawRow {
            cells: tr.select(&CELL).map(text_of).collect(),
            trigger: tr
                .select(&TRIGGER)
                .next()
                .and_then(|b| b.value().attr("onclick"))
                .map(str::to_string),
        })
        .collect();

    Ok(RawTable { headers, rows })
}

/// Row label × column label → cell text. Labels are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    periods: Vec<String>,
    line_items: Vec<String>,
    values: Vec<Vec<Option<String>>>,
}

impl Grid {
    pub fn periods(&self) -> &[String] {
        &self.periods
    }

    pub fn line_items(&self) -> &[String] {
        &self.line_items
    }

    pub fn get(&self, line_item: &str, period: &str) -> Option<&str> {
        let row = self.line_items.iter().position(|l| l == line_item)?;
        let col = self.periods.iter().position(|p| p == period)?;
        self.values[row][col].as_deref()
    }

    /// Present cells as `(line_item, period, value)`, row-major.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &str, &str)> + '_ {
        self.line_items
            .iter()
            .zip(&self.values)
            .flat_map(move |(item, row)| {
                self.periods
                    .iter()
                    .zip(row)
                    .filter_map(move |(period, v)| {
                        v.as_deref().map(|v| (item.as_str(), period.as_str(), v))
                    })
            })
    }

    pub fn cell_count(&self) -> usize {
        self.values.iter().flatten().filter(|v| v.is_some()).count()
    }
}

/// Build the labeled grid. Empty cells are missing; with `fill_missing`
/// they become `"0"`, otherwise they produce no cell.
pub fn extract_grid(table: &RawTable, fill_missing: bool) -> Grid {
    let mut periods = Vec::new();
    let mut columns = Vec::new();
    let mut seen = HashSet::new();
    for (pos, header) in table.headers.iter().enumerate().skip(1) {
        let label = normalize_ws(header);
        if label.is_empty() {
            warn!("Dropping unlabeled column {}", pos);
            continue;
        }
        if !seen.insert(label.clone()) {
            warn!("Dropping duplicate column {:?}", label);
            continue;
        }
        periods.push(label);
        columns.push(pos);
    }

    let mut line_items = Vec::new();
    let mut values = Vec::new();
    let mut seen = HashSet::new();
    for row in &table.rows {
        let label = strip_marker(row.label());
        if label.is_empty() {
            continue;
        }
        if !seen.insert(label.clone()) {
            warn!("Dropping duplicate row {:?}", label);
            continue;
        }
        let cells = columns
            .iter()
            .map(|&pos| {
                row.cells
                    .get(pos)
                    .filter(|v| !v.is_empty())
                    .cloned()
                    .or_else(|| fill_missing.then(|| "0".to_string()))
            })
            .collect();
        line_items.push(label);
        values.push(cells);
    }

    Grid {
        periods,
        line_items,
        values,
    }
}
