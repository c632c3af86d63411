use std::time::Instant;

use tracing::debug;

use crate::config::Config;
use crate::error::Result;

/// HTTP GET collaborator. A build awaits every call before its next step.
pub trait Fetch {
    async fn get_text(&self, url: &str) -> Result<String>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .timeout(cfg.timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    async fn get_text(&self, url: &str) -> Result<String> {
        let start = Instant::now();
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        debug!("GET {} ({} bytes, {}ms)", url, body.len(), start.elapsed().as_millis());
        Ok(body)
    }
}
