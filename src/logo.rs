//! Company logos fetched by web domain and embedded as data URIs.
//!
//! Fetching is an optional enrichment. Any failure yields the placeholder so
//! the holdings table and its views never depend on the network.

use crate::error::LogoError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_ENDPOINT: &str = "https://www.google.com/s2/favicons?domain={domain}&sz=64";

/// Grey rounded square shown when no logo could be fetched.
pub const PLACEHOLDER_DATA_URI: &str = "data:image/svg+xml;base64,PHN2ZyB4bWxucz0iaHR0cDovL3d3dy53My5vcmcvMjAwMC9zdmciIHdpZHRoPSI2NCIgaGVpZ2h0PSI2NCI+PHJlY3Qgd2lkdGg9IjY0IiBoZWlnaHQ9IjY0IiByeD0iMTIiIGZpbGw9IiNkZGQiLz48L3N2Zz4=";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Logo {
    Embedded { domain: String, data_uri: String },
    Placeholder,
}

impl Logo {
    pub fn data_uri(&self) -> &str {
        match self {
            Logo::Embedded { data_uri, .. } => data_uri.as_str(),
            Logo::Placeholder => PLACEHOLDER_DATA_URI,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Logo::Placeholder)
    }
}

fn is_image(content_type: &str) -> bool {
    content_type
        .trim_start()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
}

pub fn to_data_uri(content_type: &str, bytes: &[u8]) -> String {
    format!("data:{content_type};base64,{}", STANDARD.encode(bytes))
}

#[derive(Debug, Clone)]
pub struct LogoFetcher {
    client: reqwest::Client,
    endpoint: String,
}

impl LogoFetcher {
    /// `endpoint` is a URL template containing `{domain}`.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<LogoFetcher, LogoError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(LogoFetcher {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn icon_url(&self, domain: &str) -> String {
        self.endpoint.replace("{domain}", domain)
    }

    /// Fetches the logo for `domain`, substituting the placeholder on failure.
    pub async fn fetch(&self, domain: Option<&str>) -> Logo {
        match self.try_fetch(domain).await {
            Ok(logo) => logo,
            Err(LogoError::NoDomain) => Logo::Placeholder,
            Err(e) => {
                warn!(domain = domain.unwrap_or_default(), error = %e, "logo fetch failed, using placeholder");
                Logo::Placeholder
            }
        }
    }

    async fn try_fetch(&self, domain: Option<&str>) -> Result<Logo, LogoError> {
        let domain = domain.ok_or(LogoError::NoDomain)?;
        let url = self.icon_url(domain);
        debug!(%url, "fetching logo");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LogoError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        if !is_image(&content_type) {
            return Err(LogoError::NotAnImage(content_type));
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(LogoError::EmptyBody);
        }

        Ok(Logo::Embedded {
            domain: domain.to_string(),
            data_uri: to_data_uri(&content_type, &bytes),
        })
    }

    /// Fetches every `(ticker, domain)` pair concurrently, keeping input order.
    pub async fn fetch_all(&self, targets: &[(String, Option<String>)]) -> Vec<(String, Logo)> {
        let tasks = targets.iter().map(|(_, domain)| self.fetch(domain.as_deref()));
        let logos = join_all(tasks).await;

        targets
            .iter()
            .map(|(ticker, _)| ticker.clone())
            .zip(logos)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icon_url() {
        let fetcher = LogoFetcher::new(DEFAULT_ENDPOINT, Duration::from_secs(1)).unwrap();
        assert_eq!(
            fetcher.icon_url("apple.com"),
            "https://www.google.com/s2/favicons?domain=apple.com&sz=64"
        );
    }

    #[test]
    fn test_to_data_uri() {
        assert_eq!(to_data_uri("image/png", b"abc"), "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_is_image() {
        assert!(is_image("image/png"));
        assert!(is_image("Image/x-icon"));
        assert!(!is_image("text/html; charset=utf-8"));
        assert!(!is_image("application/json"));
        assert!(!is_image("img"));
    }

    #[test]
    fn test_placeholder_decodes_to_svg() {
        let encoded = PLACEHOLDER_DATA_URI
            .strip_prefix("data:image/svg+xml;base64,")
            .unwrap();
        let svg = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(svg.starts_with("<svg"));
        assert_eq!(Logo::Placeholder.data_uri(), PLACEHOLDER_DATA_URI);
    }

    #[tokio::test]
    async fn test_missing_domain_is_placeholder() {
        let fetcher = LogoFetcher::new(DEFAULT_ENDPOINT, Duration::from_secs(1)).unwrap();
        assert!(fetcher.fetch(None).await.is_placeholder());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_placeholder() {
        let fetcher =
            LogoFetcher::new("http://127.0.0.1:1/{domain}.png", Duration::from_millis(500)).unwrap();
        let logos = fetcher
            .fetch_all(&[
                ("KO".to_string(), Some("coca-colacompany.com".to_string())),
                ("ZZZZ".to_string(), None),
            ])
            .await;

        assert_eq!(logos.len(), 2);
        assert_eq!(logos[0].0, "KO");
        assert_eq!(logos[1].0, "ZZZZ");
        assert!(logos.iter().all(|(_, logo)| logo.is_placeholder()));
    }
}
