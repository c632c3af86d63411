//! Row expansion: sub-rows hidden behind `+` buttons are fetched from the
//! schedules (or shareholders) endpoint and spliced in after their parent row.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use super::table::{normalize_ws, RawRow, RawTable};
use crate::config::Endpoints;
use crate::error::{Result, ScrapeError};
use crate::fetch::Fetch;

static TRIGGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[A-Za-z_$][\w$.]*\s*\((.*)\)\s*;?\s*$").unwrap());

/// Key the site attaches to schedule payload rows for its own UI.
const METADATA_KEY: &str = "setAttributes";

/// Value written for a known column the payload does not mention.
const ABSENT: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionKey {
    pub parent: String,
    /// `None` routes to the shareholders endpoint.
    pub section: Option<String>,
}

/// Parse `func(parent[, section][, this])`.
pub fn parse_trigger(command: &str) -> Result<ExpansionKey> {
    let malformed = || ScrapeError::MalformedTrigger(command.to_string());
    let caps = TRIGGER_RE.captures(command).ok_or_else(malformed)?;
    let args: Vec<String> = caps[1]
        .split(',')
        .map(|a| a.trim().trim_matches(|c| c == '\'' || c == '"').trim().to_string())
        .filter(|a| a.as_str() != "this")
        .collect();

    match args.as_slice() {
        [parent] if !parent.is_empty() => Ok(ExpansionKey {
            parent: parent.clone(),
            section: None,
        }),
        [parent, section] if !parent.is_empty() && !section.is_empty() => Ok(ExpansionKey {
            parent: parent.clone(),
            section: Some(section.clone()),
        }),
        _ => Err(malformed()),
    }
}

/// One sub-row from a schedules payload. `None` values were JSON `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRow {
    pub label: String,
    pub values: Vec<(String, Option<String>)>,
}

/// Validate a payload of `{label: {column: value, ...}, ...}`.
pub fn decode_payload(url: &str, payload: Value) -> Result<Vec<ScheduleRow>> {
    let malformed = |reason: String| ScrapeError::MalformedPayload {
        url: url.to_string(),
        reason,
    };

    let Value::Object(rows) = payload else {
        return Err(malformed("top level is not an object".into()));
    };

    let mut out = Vec::with_capacity(rows.len());
    for (label, columns) in rows {
        if label == METADATA_KEY {
            continue;
        }
        let Value::Object(columns) = columns else {
            return Err(malformed(format!("row {:?} is not an object", label)));
        };
        let mut values = Vec::with_capacity(columns.len());
        for (column, value) in columns {
            if column == METADATA_KEY {
                continue;
            }
            let value = match value {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                Value::Null => None,
                Value::Array(_) | Value::Object(_) => {
                    return Err(malformed(format!("nested value at {:?}/{:?}", label, column)));
                }
            };
            values.push((normalize_ws(&column), value));
        }
        out.push(ScheduleRow {
            label: normalize_ws(&label),
            values,
        });
    }
    Ok(out)
}

/// Align a payload row to the table's columns. Unknown payload columns are
/// dropped; known columns absent from the payload get `"0"`.
pub fn synthesize_row(headers: &[String], row: &ScheduleRow) -> RawRow {
    let mut cells = Vec::with_capacity(headers.len().max(1));
    cells.push(row.label.clone());
    for header in headers.iter().skip(1) {
        let header = normalize_ws(header);
        let cell = match row.values.iter().find(|(col, _)| *col == header) {
            Some((_, value)) => value.clone().unwrap_or_default(),
            None => ABSENT.to_string(),
        };
        cells.push(cell);
    }
    RawRow::new(cells)
}

pub struct RowExpander<'a, F> {
    fetch: &'a F,
    endpoints: &'a Endpoints,
    company_id: &'a str,
    consolidated: bool,
}

impl<'a, F: Fetch> RowExpander<'a, F> {
    pub fn new(fetch: &'a F, endpoints: &'a Endpoints, company_id: &'a str, consolidated: bool) -> Self {
        Self {
            fetch,
            endpoints,
            company_id,
            consolidated,
        }
    }

    fn url_for(&self, key: &ExpansionKey) -> String {
        match &key.section {
            Some(section) => {
                self.endpoints
                    .schedules(self.company_id, &key.parent, section, self.consolidated)
            }
            None => self.endpoints.shareholders(self.company_id, &key.parent),
        }
    }

    /// Splice fetched sub-rows in after each trigger row. Headers are read
    /// once and used as the column domain for every synthesized row.
    pub async fn expand(&self, table: RawTable) -> Result<RawTable> {
        let RawTable { headers, rows } = table;
        let mut expanded = Vec::with_capacity(rows.len());

        for row in rows {
            let trigger = row.trigger.clone();
            expanded.push(row);

            let Some(command) = trigger else { continue };
            match self.fetch_rows(&command).await {
                Ok(sub_rows) => {
                    debug!("Expanded {:?} into {} rows", command, sub_rows.len());
                    expanded.extend(sub_rows.iter().map(|r| synthesize_row(&headers, r)));
                }
                Err(e) if e.is_recoverable() => warn!("Skipping expansion: {}", e),
                Err(e) => return Err(e),
            }
        }

        Ok(RawTable {
            headers,
            rows: expanded,
        })
    }

    async fn fetch_rows(&self, command: &str) -> Result<Vec<ScheduleRow>> {
        let key = parse_trigger(command)?;
        let url = self.url_for(&key);
        let body = self.fetch.get_text(&url).await?;
        let payload = serde_json::from_str(&body).map_err(|e| ScrapeError::MalformedPayload {
            url: url.clone(),
            reason: format!("not JSON: {}", e),
        })?;
        decode_payload(&url, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StaticFetcher;
    use serde_json::json;

    const BASE: &str = "https://screener.test";

    fn headers(cols: &[&str]) -> Vec<String> {
        std::iter::once("")
            .chain(cols.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn trigger_with_section() {
        let key = parse_trigger("fetchRows('42','cash')").unwrap();
        assert_eq!(key.parent, "42");
        assert_eq!(key.section.as_deref(), Some("cash"));
    }

    #[test]
    fn trigger_site_shapes() {
        let key = parse_trigger("Company.showSchedule('Other Income', 'profit-loss', this)").unwrap();
        assert_eq!(key.parent, "Other Income");
        assert_eq!(key.section.as_deref(), Some("profit-loss"));

        let key = parse_trigger("Company.showShareholders('promoters', this)").unwrap();
        assert_eq!(key.parent, "promoters");
        assert_eq!(key.section, None);
    }

    #[test]
    fn malformed_triggers() {
        for cmd in ["", "no parens here", "f()", "f(this)", "f('a', 'b', 'c')", "f('', 'x')"] {
            assert!(
                matches!(parse_trigger(cmd), Err(ScrapeError::MalformedTrigger(_))),
                "accepted {:?}",
                cmd
            );
        }
    }

    #[test]
    fn synthesized_row_aligns_to_columns() {
        let rows = decode_payload(
            "u",
            json!({"New Row": {"Mar 2023": "100", "Mar 2024": "150"}}),
        )
        .unwrap();
        let row = synthesize_row(&headers(&["Mar 2022", "Mar 2023", "Mar 2024"]), &rows[0]);
        assert_eq!(row.cells, vec!["New Row", "0", "100", "150"]);
    }

    #[test]
    fn unknown_columns_and_metadata_dropped() {
        let rows = decode_payload(
            "u",
            json!({
                "Material Cost %": {"Mar 2023": 55, "Dec 2099": "9", "setAttributes": {"data-x": "1"}},
                "setAttributes": {"a": 1}
            }),
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        let row = synthesize_row(&headers(&["Mar 2023"]), &rows[0]);
        assert_eq!(row.cells, vec!["Material Cost %", "55"]);
    }

    #[test]
    fn null_value_is_missing_not_zero() {
        let rows = decode_payload("u", json!({"X": {"A": null}})).unwrap();
        let row = synthesize_row(&headers(&["A", "B"]), &rows[0]);
        assert_eq!(row.cells, vec!["X", "", "0"]);
    }

    #[test]
    fn payload_shape_is_validated() {
        assert!(matches!(
            decode_payload("u", json!([1, 2])),
            Err(ScrapeError::MalformedPayload { .. })
        ));
        assert!(matches!(
            decode_payload("u", json!({"X": 5})),
            Err(ScrapeError::MalformedPayload { .. })
        ));
        assert!(matches!(
            decode_payload("u", json!({"X": {"A": [1]}})),
            Err(ScrapeError::MalformedPayload { .. })
        ));
    }

    fn table() -> RawTable {
        let mut sales = RawRow::new(["Sales +", "10", "20"]);
        sales.trigger = Some("Company.showSchedule('Sales', 'quarters', this)".into());
        let mut broken = RawRow::new(["Other +", "1", "2"]);
        broken.trigger = Some("javascript:void(0".into());
        RawTable {
            headers: headers(&["Mar 2023", "Jun 2023"]),
            rows: vec![sales, broken, RawRow::new(["Net Profit", "3", "4"])],
        }
    }

    #[tokio::test]
    async fn expands_after_trigger_row_and_skips_malformed() {
        let endpoints = Endpoints::new(BASE);
        let fetch = StaticFetcher::new().with(
            endpoints.schedules("7", "Sales", "quarters", false),
            r#"{"Sales Growth %": {"Mar 2023": "5%", "Jun 2023": "6%"}, "Export %": {"Jun 2023": "1%"}}"#,
        );
        let expander = RowExpander::new(&fetch, &endpoints, "7", false);
        let out = expander.expand(table()).await.unwrap();

        let labels: Vec<&str> = out.rows.iter().map(|r| r.label()).collect();
        assert_eq!(
            labels,
            vec!["Sales +", "Sales Growth %", "Export %", "Other +", "Net Profit"]
        );
        assert_eq!(out.rows[2].cells, vec!["Export %", "0", "1%"]);
        assert_eq!(fetch.requests().len(), 1);
    }

    #[tokio::test]
    async fn consolidated_and_shareholder_routes() {
        let endpoints = Endpoints::new(BASE);
        let mut promoters = RawRow::new(["Promoters +", "50%"]);
        promoters.trigger = Some("Company.showShareholders('promoters', this)".into());
        let mut sales = RawRow::new(["Sales +", "1"]);
        sales.trigger = Some("Company.showSchedule('Sales', 'quarters', this)".into());
        let table = RawTable {
            headers: headers(&["Jun 2023"]),
            rows: vec![promoters, sales],
        };

        let fetch = StaticFetcher::new()
            .with(endpoints.shareholders("7", "promoters"), r#"{"A Holder": {"Jun 2023": "4%"}}"#)
            .with(endpoints.schedules("7", "Sales", "quarters", true), r#"{"Growth": {}}"#);
        let out = RowExpander::new(&fetch, &endpoints, "7", true)
            .expand(table)
            .await
            .unwrap();

        assert_eq!(out.rows.len(), 4);
        assert_eq!(out.rows[1].cells, vec!["A Holder", "4%"]);
        assert_eq!(out.rows[3].cells, vec!["Growth", "0"]);
        assert!(fetch.requests()[1].ends_with("&consolidated="));
    }

    #[tokio::test]
    async fn non_json_body_skips_only_that_row() {
        let endpoints = Endpoints::new(BASE);
        let fetch = StaticFetcher::new().with(
            endpoints.schedules("7", "Sales", "quarters", false),
            "<html>Too many requests</html>",
        );
        let out = RowExpander::new(&fetch, &endpoints, "7", false)
            .expand(table())
            .await
            .unwrap();
        let labels: Vec<&str> = out.rows.iter().map(|r| r.label()).collect();
        assert_eq!(labels, vec!["Sales +", "Other +", "Net Profit"]);
    }

    #[tokio::test]
    async fn fetch_failure_aborts() {
        let endpoints = Endpoints::new(BASE);
        let fetch = StaticFetcher::new();
        let res = RowExpander::new(&fetch, &endpoints, "7", false)
            .expand(table())
            .await;
        assert!(res.is_err());
    }
}
