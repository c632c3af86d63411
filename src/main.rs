mod builder;
mod config;
mod db;
mod error;
mod facts;
mod fetch;
mod model;
mod parser;
mod search;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use config::Config;
use fetch::HttpFetcher;
use parser::sections::ReportFamily;

#[derive(Parser)]
#[command(name = "screener_etl", about = "Company financials scraper into SQLite")]
struct Cli {
    /// SQLite database path (overrides SCREENER_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape one company and replace its stored record
    Scrape {
        /// Exchange ticker, e.g. ASIANPAINT
        ticker: String,
    },
    /// Scrape many companies in sequence; failures are logged and skipped
    Batch {
        tickers: Vec<String>,
        /// File with one ticker per line ('#' starts a comment)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Show row counts per table family
    Stats,
    /// Summarise one stored company
    Show {
        ticker: String,
        /// Also print the cells of one family (e.g. quarters, profit-loss)
        #[arg(short, long)]
        family: Option<String>,
        /// With --family, print the consolidated report
        #[arg(long)]
        consolidated: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut cfg = Config::from_env().context("reading configuration")?;
    if let Some(path) = cli.db {
        cfg.db_path = path;
    }

    let conn = db::connect(&cfg.db_path)?;
    db::init_schema(&conn)?;

    let result = match cli.command {
        Commands::Scrape { ticker } => {
            let fetch = HttpFetcher::new(&cfg)?;
            let id = builder::scrape_company(&fetch, &cfg.endpoints(), &conn, &ticker)
                .await
                .with_context(|| format!("scraping {}", ticker))?;
            println!("Stored {} as company #{}", ticker, id);
            Ok(())
        }
        Commands::Batch { mut tickers, file } => {
            if let Some(path) = file {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                tickers.extend(parse_ticker_list(&text));
            }
            if tickers.is_empty() {
                bail!("no tickers given");
            }
            run_batch(&cfg, &conn, &tickers).await
        }
        Commands::Stats => {
            let s = db::get_stats(&conn)?;
            println!("Companies: {}", s.companies);
            println!("Peers:     {}", s.peers);
            println!();
            println!(
                "{:<14} {:>8} {:>10} {:>8} {:>11}",
                "family", "reports", "cells", "periods", "line items"
            );
            for f in &s.families {
                println!(
                    "{:<14} {:>8} {:>10} {:>8} {:>11}",
                    f.family.slug(),
                    f.reports,
                    f.cells,
                    f.periods,
                    f.line_items
                );
            }
            Ok(())
        }
        Commands::Show {
            ticker,
            family,
            consolidated,
        } => show(&conn, &ticker, family.as_deref(), consolidated),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run_batch(cfg: &Config, conn: &rusqlite::Connection, tickers: &[String]) -> anyhow::Result<()> {
    let fetch = HttpFetcher::new(cfg)?;
    let endpoints = cfg.endpoints();

    let pb = ProgressBar::new(tickers.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let (mut ok, mut failed) = (0usize, Vec::new());
    for ticker in tickers {
        pb.set_message(ticker.clone());
        match builder::scrape_company(&fetch, &endpoints, conn, ticker).await {
            Ok(_) => ok += 1,
            Err(e) => {
                pb.suspend(|| warn!("{}: {}", ticker, e));
                failed.push(ticker.as_str());
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!("{} ok, {} failed", ok, failed.len());
    if !failed.is_empty() {
        println!("Failed: {}", failed.join(", "));
    }
    Ok(())
}

fn show(conn: &rusqlite::Connection, ticker: &str, family: Option<&str>, consolidated: bool) -> anyhow::Result<()> {
    let Some(s) = db::fetch_company_summary(conn, ticker)? else {
        bail!("{} is not stored; run 'scrape {}' first", ticker, ticker);
    };

    let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
    println!("{} ({})", s.name, s.ticker);
    println!("  Website:  {}", opt(&s.website));
    println!("  BSE/NSE:  {} / {}", opt(&s.bse), opt(&s.nse));
    println!("  Sector:   {} / {}", opt(&s.sector), opt(&s.industry));
    println!(
        "  Mcap: {}  Price: {}  P/E: {}",
        opt(&s.market_cap),
        opt(&s.current_price),
        opt(&s.stock_pe)
    );
    println!("  Scraped:  {}", s.scraped_at);
    println!("  Peers:    {}", s.peers);

    println!("\nReports:");
    for r in &s.reports {
        let variant = if r.consolidated { "consolidated" } else { "standalone" };
        println!("  {:<14} {:<13} {:>6} cells", r.family.slug(), variant, r.cells);
    }

    println!("\nGrowth (10y / 5y / 3y / recent):");
    for g in &s.growth {
        let variant = if g.consolidated { "consolidated" } else { "standalone" };
        println!("  {:<26} {:<13} {}", g.kind.table(), variant, g.values.join(" / "));
    }

    if let Some(slug) = family {
        let Some(family) = ReportFamily::from_slug(slug) else {
            bail!("unknown family {:?}", slug);
        };
        println!("\n{} ({}):", family, if consolidated { "consolidated" } else { "standalone" });
        for (item, period, value) in db::fetch_report_cells(conn, ticker, family, consolidated)? {
            println!("  {:<32} {:<10} {}", item, period, value);
        }
    }
    Ok(())
}

/// One ticker per line; blank lines and `#` comments ignored.
fn parse_ticker_list(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| l.split('#').next().unwrap_or("").trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
