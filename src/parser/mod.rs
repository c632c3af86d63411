pub mod expand;
pub mod extract;
pub mod sections;
pub mod table;

use scraper::Html;

use crate::error::Result;
use crate::model::{CompanyInfo, GrowthPanel};
use sections::ReportFamily;
use table::RawTable;

/// Section tables (unexpanded) and growth panels of one page variant.
#[derive(Debug, Clone)]
pub struct PageSections {
    pub tables: Vec<(ReportFamily, RawTable)>,
    pub growth: Vec<GrowthPanel>,
}

/// The standalone company page.
#[derive(Debug, Clone)]
pub struct MainPage {
    pub info: CompanyInfo,
    pub warehouse_id: String,
    pub has_consolidated: bool,
    pub sections: PageSections,
}

/// Everything is pulled out of the DOM here so no parsed document has to
/// live across a network call.
pub fn parse_main_page(html: &str) -> Result<MainPage> {
    let doc = Html::parse_document(html);
    Ok(MainPage {
        info: extract::company::extract(&doc)?,
        warehouse_id: extract::company::warehouse_id(&doc)?,
        has_consolidated: extract::company::has_consolidated(&doc),
        sections: read_sections(&doc, false)?,
    })
}

pub fn parse_consolidated_page(html: &str) -> Result<PageSections> {
    read_sections(&Html::parse_document(html), true)
}

fn read_sections(doc: &Html, consolidated: bool) -> Result<PageSections> {
    Ok(PageSections {
        tables: sections::read_family_tables(doc, consolidated)?,
        growth: extract::growth::extract(doc, consolidated)?,
    })
}
