use std::fmt;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::Endpoints;
use crate::error::{Result, ScrapeError};
use crate::fetch::Fetch;

/// Ids come back as numbers today; strings are accepted too.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OpaqueId {
    Num(i64),
    Text(String),
}

impl fmt::Display for OpaqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub id: Option<OpaqueId>,
    #[serde(default)]
    pub name: String,
}

/// Resolve a ticker to the site's company id. The first hit carrying an id
/// wins; no hits at all is `NotFound`.
pub async fn resolve_company<F: Fetch>(
    fetch: &F,
    endpoints: &Endpoints,
    ticker: &str,
) -> Result<(String, String)> {
    let body = fetch.get_text(&endpoints.search(ticker)).await?;
    let hits: Vec<SearchHit> = serde_json::from_str(&body)?;
    debug!("Search {:?}: {} hits", ticker, hits.len());

    let hit = hits
        .into_iter()
        .find_map(|h| h.id.map(|id| (id.to_string(), h.name)))
        .ok_or_else(|| ScrapeError::NotFound(ticker.to_string()))?;

    info!("Resolved {} -> id {} ({})", ticker, hit.0, hit.1);
    Ok(hit)
}
