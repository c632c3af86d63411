//! One company build: search, fetch, parse, expand, assemble. Storing the
//! result is a separate step so a failed build never touches the database.

use std::fmt;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::config::Endpoints;
use crate::db;
use crate::error::Result;
use crate::fetch::Fetch;
use crate::model::{CompanyRecord, Report};
use crate::parser::expand::RowExpander;
use crate::parser::extract::peers;
use crate::parser::sections::ReportFamily;
use crate::parser::table::{extract_grid, RawTable};
use crate::parser::{parse_consolidated_page, parse_main_page};
use crate::search::resolve_company;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    FetchedMain,
    BuiltStandalone,
    BuiltConsolidated,
    Persisted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::FetchedMain => "fetched main page",
            Self::BuiltStandalone => "built standalone sections",
            Self::BuiltConsolidated => "built consolidated sections",
            Self::Persisted => "persisted",
        })
    }
}

fn enter(ticker: &str, stage: Stage) {
    info!("{}: {}", ticker, stage);
}

pub struct CompanyBuilder<'a, F> {
    fetch: &'a F,
    endpoints: &'a Endpoints,
}

impl<'a, F: Fetch> CompanyBuilder<'a, F> {
    pub fn new(fetch: &'a F, endpoints: &'a Endpoints) -> Self {
        Self { fetch, endpoints }
    }

    /// Build the full aggregate in memory. Every request is awaited before
    /// the next one is issued.
    pub async fn build(&self, ticker: &str) -> Result<CompanyRecord> {
        enter(ticker, Stage::Init);
        let (site_id, _) = resolve_company(self.fetch, self.endpoints, ticker).await?;

        let html = self.fetch.get_text(&self.endpoints.main_page(ticker, false)).await?;
        let main = parse_main_page(&html)?;
        enter(ticker, Stage::FetchedMain);

        let peers_html = self.fetch.get_text(&self.endpoints.peers(&main.warehouse_id)).await?;
        let peers = peers::extract(&peers_html)?;
        debug!("{}: {} peer rows", ticker, peers.len());

        let mut reports = self.build_reports(&site_id, main.sections.tables, false).await?;
        let mut growth = main.sections.growth;
        enter(ticker, Stage::BuiltStandalone);

        if main.has_consolidated {
            let html = self.fetch.get_text(&self.endpoints.main_page(ticker, true)).await?;
            let page = parse_consolidated_page(&html)?;
            reports.extend(self.build_reports(&site_id, page.tables, true).await?);
            growth.extend(page.growth);
            enter(ticker, Stage::BuiltConsolidated);
        } else {
            info!("{}: no consolidated variant", ticker);
        }

        Ok(CompanyRecord {
            ticker: ticker.to_string(),
            site_id,
            warehouse_id: main.warehouse_id,
            info: main.info,
            peers,
            reports,
            growth,
            scraped_at: Utc::now(),
        })
    }

    async fn build_reports(
        &self,
        company_id: &str,
        tables: Vec<(ReportFamily, RawTable)>,
        consolidated: bool,
    ) -> Result<Vec<Report>> {
        let expander = RowExpander::new(self.fetch, self.endpoints, company_id, consolidated);
        let mut reports = Vec::with_capacity(tables.len());
        for (family, table) in tables {
            let expanded = expander.expand(table).await?;
            let grid = extract_grid(&expanded, family.fills_missing());
            debug!(
                "{} ({}): {} rows x {} periods, {} cells",
                family,
                if consolidated { "consolidated" } else { "standalone" },
                grid.line_items().len(),
                grid.periods().len(),
                grid.cell_count()
            );
            reports.push(Report {
                family,
                consolidated,
                grid,
            });
        }
        Ok(reports)
    }
}

/// Build `ticker` and replace whatever is stored for it.
pub async fn scrape_company<F: Fetch>(
    fetch: &F,
    endpoints: &Endpoints,
    conn: &Connection,
    ticker: &str,
) -> Result<i64> {
    let record = CompanyBuilder::new(fetch, endpoints).build(ticker).await?;
    let id = db::save_company(conn, &record)?;
    enter(ticker, Stage::Persisted);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;
    use crate::fetch::testing::StaticFetcher;
    use crate::model::GrowthKind;

    const BASE: &str = "https://screener.test";
    const TICKER: &str = "ASIANPAINT";

    fn page() -> String {
        std::fs::read_to_string("tests/fixtures/company.html").unwrap()
    }

    fn fetcher(page: &str) -> StaticFetcher {
        let ep = Endpoints::new(BASE);
        let mut f = StaticFetcher::new()
            .with(
                ep.search(TICKER),
                r#"[{"id": 123, "name": "Asian Paints Ltd", "url": "/company/ASIANPAINT/"}]"#,
            )
            .with(ep.main_page(TICKER, false), page)
            .with(ep.main_page(TICKER, true), page)
            .with(ep.peers("6595"), std::fs::read_to_string("tests/fixtures/peers.html").unwrap())
            .with(
                ep.shareholders("123", "promoters"),
                r#"{"Foreign Holder": {"Jun 2023": "1.50%", "Sep 2023": "1.60%"}, "setAttributes": {"data-person-name": "x"}}"#,
            );
        for consolidated in [false, true] {
            f = f
                .with(
                    ep.schedules("123", "Sales", "quarters", consolidated),
                    r#"{"YOY Sales Growth %": {"Mar 2023": "10%", "Jun 2023": "12%", "Sep 2023": "9%"}}"#,
                )
                .with(
                    ep.schedules("123", "Expenses", "quarters", consolidated),
                    r#"{"Material Cost %": {"Jun 2023": "50%"}}"#,
                )
                .with(
                    ep.schedules("123", "Sales", "profit-loss", consolidated),
                    r#"{"Sales Growth %": {"Mar 2023": "18%", "TTM": "9%"}}"#,
                );
        }
        f
    }

    fn report(rec: &CompanyRecord, family: ReportFamily, consolidated: bool) -> &Report {
        rec.reports
            .iter()
            .find(|r| r.family == family && r.consolidated == consolidated)
            .unwrap()
    }

    async fn build(fetch: &StaticFetcher) -> Result<CompanyRecord> {
        let ep = Endpoints::new(BASE);
        CompanyBuilder::new(fetch, &ep).build(TICKER).await
    }

    #[tokio::test]
    async fn assembles_every_section() {
        let rec = build(&fetcher(&page())).await.unwrap();
        assert_eq!(rec.site_id, "123");
        assert_eq!(rec.warehouse_id, "6595");
        assert_eq!(rec.info.name, "Asian Paints Ltd");
        assert_eq!(rec.peers.len(), 3);
        assert_eq!(rec.reports.iter().filter(|r| !r.consolidated).count(), 6);
        assert_eq!(rec.reports.iter().filter(|r| r.consolidated).count(), 5);
        assert_eq!(rec.growth.len(), 8);
        assert!(rec
            .reports
            .iter()
            .all(|r| !(r.consolidated && r.family == ReportFamily::Shareholding)));
    }

    #[tokio::test]
    async fn quarters_are_sparse_and_footer_free() {
        let rec = build(&fetcher(&page())).await.unwrap();
        let grid = &report(&rec, ReportFamily::Quarters, false).grid;
        assert_eq!(
            grid.line_items(),
            &[
                "Sales",
                "YOY Sales Growth %",
                "Expenses",
                "Material Cost %",
                "Operating Profit",
                "OPM %",
                "Net Profit"
            ]
        );
        assert_eq!(grid.get("OPM %", "Sep 2023"), None);
        assert_eq!(grid.get("Material Cost %", "Mar 2023"), Some("0"));
        assert_eq!(grid.get("Material Cost %", "Jun 2023"), Some("50%"));
        assert_eq!(grid.cell_count(), 20);
    }

    #[tokio::test]
    async fn filled_families_have_no_gaps() {
        let rec = build(&fetcher(&page())).await.unwrap();
        let pl = &report(&rec, ReportFamily::ProfitLoss, false).grid;
        assert_eq!(pl.get("Expenses", "TTM"), Some("0"));
        assert_eq!(pl.get("Sales Growth %", "Mar 2022"), Some("0"));
        assert_eq!(pl.get("Sales Growth %", "TTM"), Some("9%"));
        assert_eq!(pl.cell_count(), pl.line_items().len() * pl.periods().len());

        let sh = &report(&rec, ReportFamily::Shareholding, false).grid;
        assert_eq!(sh.get("Foreign Holder", "Sep 2023"), Some("1.60%"));
        assert_eq!(sh.get("Public", "Sep 2023"), Some("0"));
    }

    #[tokio::test]
    async fn consolidated_calls_carry_the_flag() {
        let fetch = fetcher(&page());
        let rec = build(&fetch).await.unwrap();
        let requests = fetch.requests();
        assert!(requests.iter().any(|u| u.ends_with("/company/ASIANPAINT/consolidated/")));
        assert_eq!(
            requests.iter().filter(|u| u.ends_with("&consolidated=")).count(),
            3
        );
        let growth: Vec<_> = rec.growth.iter().filter(|g| g.consolidated).collect();
        assert_eq!(growth.len(), 4);
        assert_eq!(growth[3].kind, GrowthKind::ReturnOnEquity);
    }

    #[tokio::test]
    async fn no_consolidated_link_means_no_consolidated_reports() {
        let standalone = page().replace("consolidated", "standalone");
        let fetch = fetcher(&standalone);
        let rec = build(&fetch).await.unwrap();
        assert!(rec.reports.iter().all(|r| !r.consolidated));
        assert!(rec.growth.iter().all(|g| !g.consolidated));
        assert!(fetch.requests().iter().all(|u| !u.contains("consolidated")));
    }

    #[tokio::test]
    async fn malformed_payload_only_skips_that_row() {
        let ep = Endpoints::new(BASE);
        let fetch = fetcher(&page()).with(ep.shareholders("123", "promoters"), "[1, 2]");
        let rec = build(&fetch).await.unwrap();
        let sh = &report(&rec, ReportFamily::Shareholding, false).grid;
        assert_eq!(sh.line_items(), &["Promoters", "Public", "No. of Shareholders"]);
    }

    #[tokio::test]
    async fn html_schedule_body_keeps_other_sections() {
        let ep = Endpoints::new(BASE);
        let fetch = fetcher(&page()).with(
            ep.schedules("123", "Sales", "quarters", false),
            "<html>Too many requests</html>",
        );
        let rec = build(&fetch).await.unwrap();
        let quarters = &report(&rec, ReportFamily::Quarters, false).grid;
        assert!(!quarters.line_items().iter().any(|l| l == "YOY Sales Growth %"));
        assert!(quarters.line_items().iter().any(|l| l == "Material Cost %"));
        assert_eq!(rec.reports.len(), 11);
    }

    #[tokio::test]
    async fn unknown_ticker_is_not_found() {
        let ep = Endpoints::new(BASE);
        let fetch = StaticFetcher::new().with(ep.search("NOPE"), "[]");
        let err = CompanyBuilder::new(&fetch, &ep).build("NOPE").await.unwrap_err();
        assert!(matches!(err, ScrapeError::NotFound(_)));
        assert_eq!(fetch.requests().len(), 1);
    }

    #[tokio::test]
    async fn rebuild_is_idempotent() {
        let conn = db::open_in_memory().unwrap();
        let ep = Endpoints::new(BASE);
        let fetch = fetcher(&page());
        scrape_company(&fetch, &ep, &conn, TICKER).await.unwrap();
        scrape_company(&fetch, &ep, &conn, TICKER).await.unwrap();

        let stats = db::get_stats(&conn).unwrap();
        assert_eq!(stats.companies, 1);
        assert_eq!(stats.peers, 3);
        let quarters = &stats.families[0];
        assert_eq!(quarters.reports, 2);
        assert_eq!(quarters.cells, 40);
        assert_eq!(quarters.line_items, 7);

        let cells = db::fetch_report_cells(&conn, TICKER, ReportFamily::Quarters, false).unwrap();
        assert!(cells.iter().all(|(item, _, _)| item != "Raw PDF"));
    }

    #[tokio::test]
    async fn failed_build_keeps_previous_record() {
        let conn = db::open_in_memory().unwrap();
        let ep = Endpoints::new(BASE);
        let id = scrape_company(&fetcher(&page()), &ep, &conn, TICKER).await.unwrap();

        // peers endpoint missing: the build aborts after the main page
        let broken = StaticFetcher::new()
            .with(ep.search(TICKER), r#"[{"id": 123}]"#)
            .with(ep.main_page(TICKER, false), page());
        assert!(scrape_company(&broken, &ep, &conn, TICKER).await.is_err());

        let summary = db::fetch_company_summary(&conn, TICKER).unwrap().unwrap();
        assert_eq!(summary.id, id);
        assert_eq!(summary.peers, 3);
        assert_eq!(summary.reports.len(), 11);
    }
}
