use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::warn;

use crate::error::{Result, ScrapeError};
use crate::model::{CompanyInfo, TopRatios};
use crate::parser::table::text_of;

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div#top h1").unwrap());
static LINK_SPANS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div#top > div:nth-of-type(2) a > span").unwrap());
static TOP_RATIOS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("ul#top-ratios > li span.nowrap.value").unwrap());
static ABOUT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.about").unwrap());
static PEERS_NOTE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("section#peers p").unwrap());
static COMPANY_INFO: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div#company-info[data-warehouse-id]").unwrap());
static CONSOLIDATED_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*='consolidated']").unwrap());

static SECTOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Sector:\s*(.+?)\s+Industry:\s*(.+)$").unwrap());

pub fn extract(doc: &Html) -> Result<CompanyInfo> {
    let name = doc
        .select(&TITLE)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ScrapeError::parse("company title missing"))?;

    let (website, bse, nse) = classify_links(doc.select(&LINK_SPANS).map(text_of));
    let ratios = top_ratios(doc)?;

    let about = doc.select(&ABOUT).next().map(text_of).filter(|t| !t.is_empty());
    let (sector, industry) = doc
        .select(&PEERS_NOTE)
        .next()
        .map(text_of)
        .and_then(|t| {
            SECTOR_RE
                .captures(&t)
                .map(|c| (c[1].to_string(), c[2].to_string()))
        })
        .unzip();

    Ok(CompanyInfo {
        name,
        website,
        bse,
        nse,
        about,
        sector,
        industry,
        ratios,
    })
}

pub fn warehouse_id(doc: &Html) -> Result<String> {
    doc.select(&COMPANY_INFO)
        .next()
        .and_then(|el| el.value().attr("data-warehouse-id"))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ScrapeError::parse("data-warehouse-id missing"))
}

/// The consolidated variant exists only when the page links to it.
pub fn has_consolidated(doc: &Html) -> bool {
    doc.select(&CONSOLIDATED_LINK).next().is_some()
}

/// `"BSE: 500820"` and `"NSE: ASIANPAINT"` by prefix; the first other span
/// is the website.
fn classify_links(spans: impl Iterator<Item = String>) -> (Option<String>, Option<String>, Option<String>) {
    let (mut website, mut bse, mut nse) = (None, None, None);
    for span in spans {
        let compact: String = span.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            continue;
        }
        if let Some(code) = compact.strip_prefix("BSE:") {
            bse.get_or_insert_with(|| code.to_string());
        } else if let Some(code) = compact.strip_prefix("NSE:") {
            nse.get_or_insert_with(|| code.to_string());
        } else {
            website.get_or_insert(compact);
        }
    }
    (website, bse, nse)
}

fn top_ratios(doc: &Html) -> Result<TopRatios> {
    let values: Vec<String> = doc.select(&TOP_RATIOS).map(text_of).collect();
    let found = values.len();
    if found == 0 {
        return Err(ScrapeError::parse("ul#top-ratios missing"));
    }
    if found < 9 {
        warn!("Only {} of 9 top ratios present", found);
    }
    let mut values = values.into_iter();
    let mut next = || values.next().filter(|v| !v.is_empty());
    Ok(TopRatios {
        market_cap: next(),
        current_price: next(),
        high_low: next(),
        stock_pe: next(),
        book_value: next(),
        dividend_yield: next(),
        roce: next(),
        roe: next(),
        face_value: next(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Html {
        Html::parse_document(&std::fs::read_to_string("tests/fixtures/company.html").unwrap())
    }

    #[test]
    fn identity() {
        let info = extract(&fixture()).unwrap();
        assert_eq!(info.name, "Asian Paints Ltd");
        assert_eq!(info.website.as_deref(), Some("asianpaints.com"));
        assert_eq!(info.bse.as_deref(), Some("500820"));
        assert_eq!(info.nse.as_deref(), Some("ASIANPAINT"));
        assert_eq!(info.sector.as_deref(), Some("Paints/Varnishes"));
        assert_eq!(info.industry.as_deref(), Some("Paints / Varnishes"));
        assert!(info.about.unwrap().starts_with("Asian Paints"));
    }

    #[test]
    fn ratios_in_page_order() {
        let r = extract(&fixture()).unwrap().ratios;
        assert_eq!(r.market_cap.as_deref(), Some("₹ 2,87,000 Cr."));
        assert_eq!(r.current_price.as_deref(), Some("₹ 2,990"));
        assert_eq!(r.high_low.as_deref(), Some("₹ 3,568 / 2,670"));
        assert_eq!(r.face_value.as_deref(), Some("₹ 1.00"));
    }

    #[test]
    fn links_are_optional_per_field() {
        let (website, bse, nse) = classify_links(vec!["NSE: TCS".to_string()].into_iter());
        assert_eq!(website, None);
        assert_eq!(bse, None);
        assert_eq!(nse.as_deref(), Some("TCS"));
    }

    #[test]
    fn short_ratio_list_leaves_tail_empty() {
        let doc = Html::parse_document(
            r#"<div id="top"><div><h1>X</h1></div></div>
               <ul id="top-ratios"><li><span class="nowrap value">₹ 10 Cr.</span></li></ul>"#,
        );
        let info = extract(&doc).unwrap();
        assert_eq!(info.ratios.market_cap.as_deref(), Some("₹ 10 Cr."));
        assert_eq!(info.ratios.face_value, None);
        assert_eq!(info.website, None);
    }

    #[test]
    fn warehouse_and_consolidated_marker() {
        let doc = fixture();
        assert_eq!(warehouse_id(&doc).unwrap(), "6595");
        assert!(has_consolidated(&doc));

        let bare = Html::parse_document("<a href='/company/X/'>standalone</a>");
        assert!(!has_consolidated(&bare));
        assert!(warehouse_id(&bare).is_err());
    }
}
