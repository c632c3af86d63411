use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::error::{Result, ScrapeError};
use crate::model::PeerRow;
use crate::parser::table::text_of;

static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// Parse the peers fragment. Columns are positional:
/// S.No., Name, CMP, P/E, Mar Cap, Div Yld, NP Qtr, Qtr Profit Var,
/// Sales Qtr, Qtr Sales Var, ROCE.
pub fn extract(html: &str) -> Result<Vec<PeerRow>> {
    let doc = Html::parse_document(html);
    let table = doc
        .select(&TABLE)
        .next()
        .ok_or_else(|| ScrapeError::parse("peers response has no table"))?;

    let peers = table
        .select(&ROW)
        .filter_map(|tr| {
            let cells: Vec<String> = tr.select(&TD).map(text_of).collect();
            if cells.is_empty() {
                return None;
            }
            let num = |i: usize| cells.get(i).map_or(0.0, |c| coerce(c));
            Some(PeerRow {
                s_no: num(0) as i64,
                name: cells.get(1).cloned().unwrap_or_default(),
                current_price: num(2),
                price_to_earning: num(3),
                market_cap: num(4),
                dividend_yield: num(5),
                net_profit: num(6),
                yoy_profit_growth: num(7),
                sales: num(8),
                yoy_sales_growth: num(9),
                roce: num(10),
            })
        })
        .collect();

    Ok(peers)
}

/// Thousands separators dropped; anything unparsable (or NaN) is 0.
fn coerce(s: &str) -> f64 {
    s.replace(',', "")
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}
