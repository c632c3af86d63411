use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://www.screener.in";
const DEFAULT_DB_PATH: &str = "data/screener.sqlite";
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub db_path: PathBuf,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Defaults, overridden by `SCREENER_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Unset and empty variables both keep the default.
    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();
        if let Some(url) = var("SCREENER_BASE_URL") {
            cfg.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(p) = var("SCREENER_DB_PATH") {
            cfg.db_path = PathBuf::from(p);
        }
        if let Some(ua) = var("SCREENER_USER_AGENT") {
            cfg.user_agent = ua;
        }
        if let Some(secs) = var("SCREENER_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| anyhow::anyhow!("SCREENER_TIMEOUT_SECS={:?}: {}", secs, e))?;
            cfg.timeout = Duration::from_secs(secs);
        }
        Ok(cfg)
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(&self.base_url)
    }
}

/// Remote URL shapes, all rooted at one base.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn search(&self, ticker: &str) -> String {
        format!("{}/api/company/search/?q={}", self.base, encode(ticker))
    }

    pub fn main_page(&self, ticker: &str, consolidated: bool) -> String {
        if consolidated {
            format!("{}/company/{}/consolidated/", self.base, ticker)
        } else {
            format!("{}/company/{}/", self.base, ticker)
        }
    }

    pub fn schedules(&self, company_id: &str, parent: &str, section: &str, consolidated: bool) -> String {
        let mut url = format!(
            "{}/api/company/{}/schedules/?parent={}&section={}",
            self.base,
            company_id,
            encode(parent),
            encode(section)
        );
        if consolidated {
            url.push_str("&consolidated=");
        }
        url
    }

    pub fn shareholders(&self, company_id: &str, parent: &str) -> String {
        format!("{}/api/{}/investors/{}/", self.base, company_id, encode(parent))
    }

    pub fn peers(&self, warehouse_id: &str) -> String {
        format!("{}/api/company/{}/peers/", self.base, warehouse_id)
    }
}

fn encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
