use std::fmt;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::debug;

use super::table::{read_table, RawTable};
use crate::error::{Result, ScrapeError};

/// The six cell-based report kinds on a company page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReportFamily {
    Quarters,
    ProfitLoss,
    BalanceSheet,
    CashFlow,
    Ratios,
    Shareholding,
}

impl ReportFamily {
    pub const ALL: [Self; 6] = [
        Self::Quarters,
        Self::ProfitLoss,
        Self::BalanceSheet,
        Self::CashFlow,
        Self::Ratios,
        Self::Shareholding,
    ];

    /// Section id on the page, also the `section=` key of schedule calls.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Quarters => "quarters",
            Self::ProfitLoss => "profit-loss",
            Self::BalanceSheet => "balance-sheet",
            Self::CashFlow => "cash-flow",
            Self::Ratios => "ratios",
            Self::Shareholding => "shareholding",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.slug() == slug)
    }

    /// Prefix of this family's four SQL tables.
    pub fn table_prefix(self) -> &'static str {
        match self {
            Self::Quarters => "quarterly",
            Self::ProfitLoss => "profit_loss",
            Self::BalanceSheet => "balance_sheet",
            Self::CashFlow => "cash_flow",
            Self::Ratios => "ratios",
            Self::Shareholding => "shareholding",
        }
    }

    fn selector(self) -> &'static Selector {
        static QUARTERS: LazyLock<Selector> =
            LazyLock::new(|| Selector::parse("section#quarters table").unwrap());
        static PROFIT_LOSS: LazyLock<Selector> = LazyLock::new(|| {
            Selector::parse("section#profit-loss > div[data-result-table] > table").unwrap()
        });
        static BALANCE_SHEET: LazyLock<Selector> =
            LazyLock::new(|| Selector::parse("section#balance-sheet table").unwrap());
        static CASH_FLOW: LazyLock<Selector> =
            LazyLock::new(|| Selector::parse("section#cash-flow table").unwrap());
        static RATIOS: LazyLock<Selector> =
            LazyLock::new(|| Selector::parse("section#ratios table").unwrap());
        static SHAREHOLDING: LazyLock<Selector> =
            LazyLock::new(|| Selector::parse("section#shareholding table").unwrap());

        match self {
            Self::Quarters => &*QUARTERS,
            Self::ProfitLoss => &*PROFIT_LOSS,
            Self::BalanceSheet => &*BALANCE_SHEET,
            Self::CashFlow => &*CASH_FLOW,
            Self::Ratios => &*RATIOS,
            Self::Shareholding => &*SHAREHOLDING,
        }
    }

    /// Quarters keep sparse cells absent; every other family fills with "0".
    pub fn fills_missing(self) -> bool {
        !matches!(self, Self::Quarters)
    }

    /// The quarters table ends in a legend row of PDF links, not data.
    pub fn drops_footer_row(self) -> bool {
        matches!(self, Self::Quarters)
    }

    pub fn has_consolidated(self) -> bool {
        !matches!(self, Self::Shareholding)
    }

    /// Some listings carry no shareholding pattern at all.
    pub fn is_optional(self) -> bool {
        matches!(self, Self::Shareholding)
    }
}

impl fmt::Display for ReportFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Locate and read every family table present for this variant.
pub fn read_family_tables(doc: &Html, consolidated: bool) -> Result<Vec<(ReportFamily, RawTable)>> {
    let mut tables = Vec::new();
    for family in ReportFamily::ALL {
        if consolidated && !family.has_consolidated() {
            continue;
        }
        let Some(el) = doc.select(family.selector()).next() else {
            if family.is_optional() {
                debug!("No {} table on page", family);
                continue;
            }
            return Err(ScrapeError::parse(format!("missing {} table", family)));
        };
        let mut table = read_table(el)?;
        if family.drops_footer_row() {
            table.rows.pop();
        }
        tables.push((family, table));
    }
    Ok(tables)
}
