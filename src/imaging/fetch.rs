use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{ImageError, ImageFetcher};

pub struct HttpImageFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpImageFetcher {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| ImageError::Fetch(format!("{url}: {err}")))?;

        if !response.status().is_success() {
            return Err(ImageError::Fetch(format!("{} for {url}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| ImageError::Fetch(format!("{url}: {err}")))?;
        Ok(bytes.to_vec())
    }
}
