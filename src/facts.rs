use crate::error::Result;
use crate::parser::sections::ReportFamily;
use crate::parser::table::Grid;

pub type DimId = i64;

/// Lookup-or-create store for period and line-item labels, one namespace per
/// family. Identity is the exact label; rows are shared by every company.
pub trait Dimensions {
    fn intern_period(&mut self, family: ReportFamily, label: &str) -> Result<DimId>;
    fn intern_line_item(&mut self, family: ReportFamily, label: &str) -> Result<DimId>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactCell {
    pub period_id: DimId,
    pub line_item_id: DimId,
    pub value: String,
}

/// Intern every label of the grid, then emit one cell per present value.
/// Values pass through untouched.
pub fn build_facts<D: Dimensions>(dims: &mut D, family: ReportFamily, grid: &Grid) -> Result<Vec<FactCell>> {
    let mut periods = Vec::with_capacity(grid.periods().len());
    for label in grid.periods() {
        periods.push((label.as_str(), dims.intern_period(family, label)?));
    }
    let mut line_items = Vec::with_capacity(grid.line_items().len());
    for label in grid.line_items() {
        line_items.push((label.as_str(), dims.intern_line_item(family, label)?));
    }

    Ok(grid
        .cells()
        .filter_map(|(item, period, value)| {
            Some(FactCell {
                period_id: lookup(&periods, period)?,
                line_item_id: lookup(&line_items, item)?,
                value: value.to_string(),
            })
        })
        .collect())
}

fn lookup(ids: &[(&str, DimId)], label: &str) -> Option<DimId> {
    ids.iter().find(|(l, _)| *l == label).map(|(_, id)| *id)
}
