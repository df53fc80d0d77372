use super::AdminApiHosts;
use crate::error::{Error, Result};

#[derive(Clone, Debug, Default)]
pub struct Builder {
    urls: Vec<String>,
    timeout_ms: Option<u64>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(self) -> Result<AdminApiHosts> {
        if self.urls.is_empty() {
            return Err(Error::ArgError(String::from("no admin api urls given")));
        }
        let mut client = reqwest::Client::builder();
        if let Some(timeout_ms) = self.timeout_ms {
            client = client.timeout(std::time::Duration::from_millis(timeout_ms));
        }
        let client = client
            .build()
            .map_err(|err| Error::ArgError(err.to_string()))?;
        Ok(AdminApiHosts {
            client,
            urls: self.urls,
        })
    }

    pub fn urls(&mut self, urls: Vec<String>) -> Self {
        self.urls = urls;
        self.clone()
    }

    pub fn timeout_ms(&mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self.clone()
    }
}
