use chrono::{DateTime, Utc};

use crate::parser::sections::ReportFamily;
use crate::parser::table::Grid;

/// Everything one build produces for one company; persisted as a unit.
#[derive(Debug, Clone)]
pub struct CompanyRecord {
    /// Exchange ticker the build was asked for; the replace key.
    pub ticker: String,
    /// Opaque id from the search endpoint.
    pub site_id: String,
    pub warehouse_id: String,
    pub info: CompanyInfo,
    pub peers: Vec<PeerRow>,
    pub reports: Vec<Report>,
    pub growth: Vec<GrowthPanel>,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyInfo {
    pub name: String,
    pub website: Option<String>,
    pub bse: Option<String>,
    pub nse: Option<String>,
    pub about: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub ratios: TopRatios,
}

/// Snapshot metrics as displayed, e.g. `"₹ 2,87,000 Cr."`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopRatios {
    pub market_cap: Option<String>,
    pub current_price: Option<String>,
    pub high_low: Option<String>,
    pub stock_pe: Option<String>,
    pub book_value: Option<String>,
    pub dividend_yield: Option<String>,
    pub roce: Option<String>,
    pub roe: Option<String>,
    pub face_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeerRow {
    pub s_no: i64,
    pub name: String,
    pub current_price: f64,
    pub price_to_earning: f64,
    pub market_cap: f64,
    pub dividend_yield: f64,
    pub net_profit: f64,
    pub yoy_profit_growth: f64,
    pub sales: f64,
    pub yoy_sales_growth: f64,
    pub roce: f64,
}

/// One fact table: a family's grid for one variant.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub family: ReportFamily,
    pub consolidated: bool,
    pub grid: Grid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrowthKind {
    SalesGrowth,
    ProfitGrowth,
    StockPriceCagr,
    ReturnOnEquity,
}

impl GrowthKind {
    /// Page order of the ranges tables.
    pub const ALL: [Self; 4] = [
        Self::SalesGrowth,
        Self::ProfitGrowth,
        Self::StockPriceCagr,
        Self::ReturnOnEquity,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Self::SalesGrowth => "compounded_sales_growth",
            Self::ProfitGrowth => "compounded_profit_growth",
            Self::StockPriceCagr => "stock_price_cagr",
            Self::ReturnOnEquity => "return_on_equity",
        }
    }

    /// Column name of the fourth (shortest) horizon.
    pub fn recent_column(self) -> &'static str {
        match self {
            Self::SalesGrowth | Self::ProfitGrowth => "ttm",
            Self::StockPriceCagr => "one_year",
            Self::ReturnOnEquity => "last_year",
        }
    }
}

/// Four fixed horizons, longest first.
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthPanel {
    pub kind: GrowthKind,
    pub consolidated: bool,
    pub ten_years: String,
    pub five_years: String,
    pub three_years: String,
    /// TTM, one year or last year depending on `kind`.
    pub recent: String,
}
