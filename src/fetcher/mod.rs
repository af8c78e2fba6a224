//! Paginated billboard endpoint client.
//!
//! Calls `${API_BASE}/view/billboard?id=${ID}&index=${cursor}`, returning the
//! ordered asset URLs for that page and the cursor to use next. Detects
//! cursor *wrap* (next < queried), which signals the end of one full cycle
//! of the content schedule.

use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::auth::AuthSigner;
use crate::errors::{AppError, AppResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub urls: Vec<String>,
    pub next_cursor: u64,
    pub wrapped: bool,
}

#[derive(Debug, Deserialize)]
struct BillboardResponse {
    response: BillboardBody,
}

#[derive(Debug, Deserialize, Default)]
struct BillboardBody {
    #[serde(default)]
    data: Vec<BillboardAsset>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BillboardAsset {
    #[serde(default)]
    url: Option<String>,
}

pub struct BatchFetcher {
    client: reqwest::Client,
    api_base: String,
    id: String,
    signer: AuthSigner,
    auth_header: Option<String>,
}

impl BatchFetcher {
    pub fn new(
        api_base: String,
        id: String,
        signer: AuthSigner,
        auth_header: Option<String>,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(TOTAL_TIMEOUT)
            .user_agent("signage-player/1.0")
            .build()
            .map_err(AppError::Network)?;
        Ok(Self {
            client,
            api_base,
            id,
            signer,
            auth_header,
        })
    }

    pub async fn fetch(&self, cursor: u64) -> AppResult<Batch> {
        let url = format!(
            "{}/view/billboard?id={}&index={}",
            self.api_base.trim_end_matches('/'),
            self.id,
            cursor
        );

        let mut request = self.client.get(&url);
        request = match &self.auth_header {
            Some(header) => request.header("authorization", header),
            None => {
                let headers = self.signer.sign(b"");
                let mut req = request;
                for (name, value) in headers.as_pairs() {
                    req = req.header(name, value);
                }
                req
            }
        };

        let response = request.send().await?;
        let response = response.error_for_status()?;
        let body: BillboardResponse = response.json().await?;

        let urls = normalize_urls(body.response.data);
        if urls.is_empty() {
            return Err(AppError::protocol("billboard response contained no asset URLs"));
        }

        let next_cursor = body
            .response
            .message
            .as_deref()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or_else(|| {
                warn!(cursor, "missing or malformed next cursor, holding position");
                cursor
            });

        let wrapped = next_cursor < cursor;

        Ok(Batch {
            urls,
            next_cursor,
            wrapped,
        })
    }
}

fn normalize_urls(assets: Vec<BillboardAsset>) -> Vec<String> {
    assets
        .into_iter()
        .filter_map(|asset| asset.url)
        .map(|url| {
            url.trim_end_matches(|c: char| c.is_whitespace() || c == ',')
                .to_string()
        })
        .filter(|url| !url.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceIdentity;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_signer() -> AuthSigner {
        AuthSigner::new(&DeviceIdentity {
            device_id: "dev-1".to_string(),
            device_secret: b"secret".to_vec(),
        })
    }

    #[test]
    fn normalize_urls_strips_cr_whitespace_and_trailing_commas() {
        let assets = vec![
            BillboardAsset {
                url: Some("https://x/a.png \r\n".to_string()),
            },
            BillboardAsset {
                url: Some("https://x/b.png,".to_string()),
            },
            BillboardAsset { url: Some("".to_string()) },
            BillboardAsset { url: None },
        ];
        let urls = normalize_urls(assets);
        assert_eq!(urls, vec!["https://x/a.png", "https://x/b.png"]);
    }

    #[test]
    fn normalize_urls_handles_interleaved_trailing_noise() {
        let assets = vec![
            BillboardAsset {
                url: Some("https://x/a.png ,".to_string()),
            },
            BillboardAsset {
                url: Some("https://x/a.png".to_string()),
            },
        ];
        let urls = normalize_urls(assets);
        assert_eq!(urls[0], urls[1]);
    }

    #[tokio::test]
    async fn fetch_returns_urls_and_next_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/view/billboard"))
            .and(query_param("id", "dev-1"))
            .and(query_param("index", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": {
                    "data": [{"url": "https://x/y/a.png"}],
                    "message": "1"
                }
            })))
            .mount(&server)
            .await;

        let fetcher = BatchFetcher::new(server.uri(), "dev-1".to_string(), test_signer(), None)
            .unwrap();
        let batch = fetcher.fetch(0).await.unwrap();
        assert_eq!(batch.urls, vec!["https://x/y/a.png"]);
        assert_eq!(batch.next_cursor, 1);
        assert!(!batch.wrapped);
    }

    #[tokio::test]
    async fn fetch_detects_wrap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/view/billboard"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": {
                    "data": [{"url": "https://x/y/a.png"}],
                    "message": "0"
                }
            })))
            .mount(&server)
            .await;

        let fetcher = BatchFetcher::new(server.uri(), "dev-1".to_string(), test_signer(), None)
            .unwrap();
        let batch = fetcher.fetch(7).await.unwrap();
        assert_eq!(batch.next_cursor, 0);
        assert!(batch.wrapped);
    }

    #[tokio::test]
    async fn fetch_fails_on_empty_url_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/view/billboard"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": { "data": [], "message": "1" }
            })))
            .mount(&server)
            .await;

        let fetcher = BatchFetcher::new(server.uri(), "dev-1".to_string(), test_signer(), None)
            .unwrap();
        let err = fetcher.fetch(0).await.unwrap_err();
        assert!(matches!(err, AppError::Protocol { .. }));
    }

    #[tokio::test]
    async fn fetch_defaults_malformed_cursor_to_queried_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/view/billboard"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": { "data": [{"url": "https://x/a.png"}], "message": "not-a-number" }
            })))
            .mount(&server)
            .await;

        let fetcher = BatchFetcher::new(server.uri(), "dev-1".to_string(), test_signer(), None)
            .unwrap();
        let batch = fetcher.fetch(3).await.unwrap();
        assert_eq!(batch.next_cursor, 3);
        assert!(!batch.wrapped);
    }
}
