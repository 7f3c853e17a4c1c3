use async_trait::async_trait;
use std::io::Cursor;
use tokio_util::sync::CancellationToken;

use crate::settings::Settings;
use crate::{Error, Result};

/// Network access used by the cache and the preloader.
///
/// `fetch_json` takes a site-relative path; the binary and image calls take
/// absolute URLs. The two cancellable calls must return `Error::Cancelled`
/// promptly once their token fires.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_json(&self, path: &str) -> Result<serde_json::Value>;

    async fn fetch_binary(&self, url: &str, cancel: CancellationToken) -> Result<Vec<u8>>;

    async fn decode_image(&self, url: &str, cancel: CancellationToken) -> Result<()>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_json(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn fetch_binary(&self, url: &str, cancel: CancellationToken) -> Result<Vec<u8>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            bytes = self.get_bytes(url) => bytes,
        }
    }

    async fn decode_image(&self, url: &str, cancel: CancellationToken) -> Result<()> {
        let bytes = self.fetch_binary(url, cancel.clone()).await?;

        let decode = tokio::task::spawn_blocking(move || -> Result<()> {
            image::ImageReader::new(Cursor::new(bytes))
                .with_guessed_format()?
                .decode()?;
            Ok(())
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            decoded = decode => decoded?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let settings = Settings {
            base_url: "https://host.test/".to_string(),
            ..Settings::default()
        };

        let transport = HttpTransport::new(&settings).unwrap();
        assert_eq!(transport.base_url, "https://host.test");
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let transport = HttpTransport::new(&Settings::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = transport
            .fetch_binary("http://127.0.0.1:9/never", cancel)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
