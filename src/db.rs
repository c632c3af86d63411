use std::fs;
use std::path::Path;

use anyhow::Context;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Result, ScrapeError};
use crate::facts::{build_facts, DimId, Dimensions};
use crate::model::{CompanyRecord, GrowthKind};
use crate::parser::sections::ReportFamily;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;";

pub fn connect(path: &Path) -> anyhow::Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("opening {}", path.display()))?;
    conn.execute_batch(PRAGMAS)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS companies (
            id             INTEGER PRIMARY KEY,
            ticker         TEXT UNIQUE NOT NULL,
            site_id        TEXT NOT NULL,
            warehouse_id   TEXT NOT NULL,
            name           TEXT NOT NULL,
            website        TEXT,
            bse            TEXT,
            nse            TEXT,
            about          TEXT,
            sector         TEXT,
            industry       TEXT,
            market_cap     TEXT,
            current_price  TEXT,
            high_low       TEXT,
            stock_pe       TEXT,
            book_value     TEXT,
            dividend_yield TEXT,
            roce           TEXT,
            roe            TEXT,
            face_value     TEXT,
            scraped_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS peers (
            id                INTEGER PRIMARY KEY,
            company_id        INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
            s_no              INTEGER NOT NULL,
            name              TEXT NOT NULL,
            current_price     REAL NOT NULL,
            price_to_earning  REAL NOT NULL,
            market_cap        REAL NOT NULL,
            dividend_yield    REAL NOT NULL,
            net_profit        REAL NOT NULL,
            yoy_profit_growth REAL NOT NULL,
            sales             REAL NOT NULL,
            yoy_sales_growth  REAL NOT NULL,
            roce              REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_peers_company ON peers(company_id);
        ",
    )?;

    for kind in GrowthKind::ALL {
        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {table} (
                id           INTEGER PRIMARY KEY,
                company_id   INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
                consolidated BOOLEAN NOT NULL,
                ten_years    TEXT NOT NULL,
                five_years   TEXT NOT NULL,
                three_years  TEXT NOT NULL,
                {recent}     TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_company ON {table}(company_id);
            ",
            table = kind.table(),
            recent = kind.recent_column(),
        ))?;
    }

    for family in ReportFamily::ALL {
        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {p}_periods (
                id    INTEGER PRIMARY KEY,
                label TEXT UNIQUE NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {p}_line_items (
                id   INTEGER PRIMARY KEY,
                name TEXT UNIQUE NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {p}_reports (
                id           INTEGER PRIMARY KEY,
                company_id   INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
                consolidated BOOLEAN NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{p}_reports_company ON {p}_reports(company_id);
            CREATE TABLE IF NOT EXISTS {p}_cells (
                id           INTEGER PRIMARY KEY,
                report_id    INTEGER NOT NULL REFERENCES {p}_reports(id) ON DELETE CASCADE,
                period_id    INTEGER NOT NULL REFERENCES {p}_periods(id),
                line_item_id INTEGER NOT NULL REFERENCES {p}_line_items(id),
                value        TEXT NOT NULL,
                UNIQUE (report_id, period_id, line_item_id)
            );
            ",
            p = family.table_prefix(),
        ))?;
    }
    Ok(())
}

// ── Dimensions ──

/// Interns into the `{family}_periods` / `{family}_line_items` tables of
/// whatever connection (or open transaction) it is given. A created row is
/// visible to later statements on the same connection straight away.
pub struct SqliteDimensions<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteDimensions<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn intern(&self, table: String, column: &str, label: &str) -> Result<DimId> {
        let existing = self
            .conn
            .prepare_cached(&format!("SELECT id FROM {} WHERE {} = ?1", table, column))?
            .query_row([label], |r| r.get(0))
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        let inserted = self
            .conn
            .prepare_cached(&format!("INSERT INTO {} ({}) VALUES (?1)", table, column))?
            .execute([label]);
        match inserted {
            Ok(_) => {
                debug!("New {} row {:?}", table, label);
                Ok(self.conn.last_insert_rowid())
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(ScrapeError::PersistenceConflict {
                    table,
                    label: label.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Dimensions for SqliteDimensions<'_> {
    fn intern_period(&mut self, family: ReportFamily, label: &str) -> Result<DimId> {
        self.intern(format!("{}_periods", family.table_prefix()), "label", label)
    }

    fn intern_line_item(&mut self, family: ReportFamily, label: &str) -> Result<DimId> {
        self.intern(format!("{}_line_items", family.table_prefix()), "name", label)
    }
}

// ── Company aggregate ──

/// Replace the stored record for `rec.ticker` with `rec`. One transaction:
/// an error anywhere leaves the previous record untouched.
pub fn save_company(conn: &Connection, rec: &CompanyRecord) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;

    let removed = tx.execute("DELETE FROM companies WHERE ticker = ?1", [&rec.ticker])?;
    if removed > 0 {
        info!("Replacing stored record for {}", rec.ticker);
    }

    let info = &rec.info;
    let r = &info.ratios;
    tx.execute(
        "INSERT INTO companies
         (ticker, site_id, warehouse_id, name, website, bse, nse, about, sector, industry,
          market_cap, current_price, high_low, stock_pe, book_value, dividend_yield,
          roce, roe, face_value, scraped_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                 ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        params![
            rec.ticker,
            rec.site_id,
            rec.warehouse_id,
            info.name,
            info.website,
            info.bse,
            info.nse,
            info.about,
            info.sector,
            info.industry,
            r.market_cap,
            r.current_price,
            r.high_low,
            r.stock_pe,
            r.book_value,
            r.dividend_yield,
            r.roce,
            r.roe,
            r.face_value,
            rec.scraped_at.to_rfc3339(),
        ],
    )?;
    let company_id = tx.last_insert_rowid();

    {
        let mut stmt = tx.prepare(
            "INSERT INTO peers
             (company_id, s_no, name, current_price, price_to_earning, market_cap,
              dividend_yield, net_profit, yoy_profit_growth, sales, yoy_sales_growth, roce)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        for p in &rec.peers {
            stmt.execute(params![
                company_id,
                p.s_no,
                p.name,
                p.current_price,
                p.price_to_earning,
                p.market_cap,
                p.dividend_yield,
                p.net_profit,
                p.yoy_profit_growth,
                p.sales,
                p.yoy_sales_growth,
                p.roce,
            ])?;
        }
    }

    for g in &rec.growth {
        tx.execute(
            &format!(
                "INSERT INTO {} (company_id, consolidated, ten_years, five_years, three_years, {})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                g.kind.table(),
                g.kind.recent_column()
            ),
            params![company_id, g.consolidated, g.ten_years, g.five_years, g.three_years, g.recent],
        )?;
    }

    let mut dims = SqliteDimensions::new(&tx);
    for report in &rec.reports {
        let prefix = report.family.table_prefix();
        tx.execute(
            &format!("INSERT INTO {}_reports (company_id, consolidated) VALUES (?1, ?2)", prefix),
            params![company_id, report.consolidated],
        )?;
        let report_id = tx.last_insert_rowid();

        let cells = build_facts(&mut dims, report.family, &report.grid)?;
        let mut stmt = tx.prepare_cached(&format!(
            "INSERT INTO {}_cells (report_id, period_id, line_item_id, value) VALUES (?1, ?2, ?3, ?4)",
            prefix
        ))?;
        for c in &cells {
            stmt.execute(params![report_id, c.period_id, c.line_item_id, c.value])?;
        }
        debug!(
            "Stored {} {} report: {} cells",
            report.family,
            if report.consolidated { "consolidated" } else { "standalone" },
            cells.len()
        );
    }

    tx.commit()?;
    Ok(company_id)
}

// ── Reads ──

pub struct FamilyStats {
    pub family: ReportFamily,
    pub reports: usize,
    pub cells: usize,
    pub periods: usize,
    pub line_items: usize,
}

pub struct Stats {
    pub companies: usize,
    pub peers: usize,
    pub families: Vec<FamilyStats>,
}

fn count(conn: &Connection, table: &str) -> Result<usize> {
    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let mut families = Vec::with_capacity(ReportFamily::ALL.len());
    for family in ReportFamily::ALL {
        let p = family.table_prefix();
        families.push(FamilyStats {
            family,
            reports: count(conn, &format!("{}_reports", p))?,
            cells: count(conn, &format!("{}_cells", p))?,
            periods: count(conn, &format!("{}_periods", p))?,
            line_items: count(conn, &format!("{}_line_items", p))?,
        });
    }
    Ok(Stats {
        companies: count(conn, "companies")?,
        peers: count(conn, "peers")?,
        families,
    })
}

pub struct ReportSummary {
    pub family: ReportFamily,
    pub consolidated: bool,
    pub cells: usize,
}

pub struct GrowthSummary {
    pub kind: GrowthKind,
    pub consolidated: bool,
    /// Longest horizon first.
    pub values: [String; 4],
}

pub struct CompanySummary {
    pub id: i64,
    pub ticker: String,
    pub name: String,
    pub website: Option<String>,
    pub bse: Option<String>,
    pub nse: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<String>,
    pub current_price: Option<String>,
    pub stock_pe: Option<String>,
    pub scraped_at: String,
    pub peers: usize,
    pub reports: Vec<ReportSummary>,
    pub growth: Vec<GrowthSummary>,
}

pub fn fetch_company_summary(conn: &Connection, ticker: &str) -> Result<Option<CompanySummary>> {
    let summary = conn
        .query_row(
            "SELECT id, ticker, name, website, bse, nse, sector, industry,
                    market_cap, current_price, stock_pe, scraped_at
             FROM companies WHERE ticker = ?1",
            [ticker],
            |row| {
                Ok(CompanySummary {
                    id: row.get(0)?,
                    ticker: row.get(1)?,
                    name: row.get(2)?,
                    website: row.get(3)?,
                    bse: row.get(4)?,
                    nse: row.get(5)?,
                    sector: row.get(6)?,
                    industry: row.get(7)?,
                    market_cap: row.get(8)?,
                    current_price: row.get(9)?,
                    stock_pe: row.get(10)?,
                    scraped_at: row.get(11)?,
                    peers: 0,
                    reports: Vec::new(),
                    growth: Vec::new(),
                })
            },
        )
        .optional()?;
    let Some(mut summary) = summary else {
        return Ok(None);
    };

    summary.peers = conn.query_row(
        "SELECT COUNT(*) FROM peers WHERE company_id = ?1",
        [summary.id],
        |r| r.get(0),
    )?;

    for family in ReportFamily::ALL {
        let p = family.table_prefix();
        let mut stmt = conn.prepare(&format!(
            "SELECT r.consolidated, COUNT(c.id)
             FROM {p}_reports r LEFT JOIN {p}_cells c ON c.report_id = r.id
             WHERE r.company_id = ?1
             GROUP BY r.id ORDER BY r.consolidated",
            p = p
        ))?;
        let rows = stmt
            .query_map([summary.id], |row| {
                Ok(ReportSummary {
                    family,
                    consolidated: row.get(0)?,
                    cells: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        summary.reports.extend(rows);
    }

    for kind in GrowthKind::ALL {
        let mut stmt = conn.prepare(&format!(
            "SELECT consolidated, ten_years, five_years, three_years, {}
             FROM {} WHERE company_id = ?1 ORDER BY consolidated",
            kind.recent_column(),
            kind.table()
        ))?;
        let rows = stmt
            .query_map([summary.id], |row| {
                Ok(GrowthSummary {
                    kind,
                    consolidated: row.get(0)?,
                    values: [row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?],
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        summary.growth.extend(rows);
    }

    Ok(Some(summary))
}

/// `(line_item, period, value)` for one stored report, in insertion order.
pub fn fetch_report_cells(
    conn: &Connection,
    ticker: &str,
    family: ReportFamily,
    consolidated: bool,
) -> Result<Vec<(String, String, String)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT li.name, pe.label, c.value
         FROM {p}_cells c
         JOIN {p}_reports r ON r.id = c.report_id
         JOIN companies co ON co.id = r.company_id
         JOIN {p}_periods pe ON pe.id = c.period_id
         JOIN {p}_line_items li ON li.id = c.line_item_id
         WHERE co.ticker = ?1 AND r.consolidated = ?2
         ORDER BY c.id",
        p = family.table_prefix()
    ))?;
    let rows = stmt
        .query_map(params![ticker, consolidated], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
