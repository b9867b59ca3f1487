use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Url;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;

static USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:124.0) Gecko/20100101 Firefox/124.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    ]
});

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(DEFAULT_USER_AGENT)
}

/// Trims the raw website cell and adds `https://` when no scheme is given.
pub fn normalize_url(raw: &str) -> Result<Url, FetchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FetchError::InvalidUrl(raw.to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&candidate).map_err(|_| FetchError::InvalidUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(FetchError::InvalidUrl(raw.to_string()));
    }
    Ok(url)
}

/// Raw result of a static fetch.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub status: u16,
    pub html: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Plain HTTP GET without script execution.
///
/// Certificate validation is off: many club sites run expired or
/// self-signed certificates.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(timeout)
            .build()?;
        Ok(Self { client, timeout })
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Network(err)
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let target = normalize_url(url)?;
        let user_agent = random_user_agent();
        debug!(url = %target, user_agent, "static fetch");

        let resp = self
            .client
            .get(target)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let final_url = resp.url().to_string();
        let html = resp.text().await.map_err(|e| self.classify(e))?;
        debug!(final_url = %final_url, bytes = html.len(), "static fetch complete");

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            html,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn normalize_adds_scheme() {
        let url = normalize_url("  www.balmybeach.ca ").unwrap();
        assert_eq!(url.as_str(), "https://www.balmybeach.ca/");

        let url = normalize_url("http://club.ca/tennis").unwrap();
        assert_eq!(url.scheme(), "http");
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(matches!(normalize_url(""), Err(FetchError::InvalidUrl(_))));
        assert!(matches!(normalize_url("   "), Err(FetchError::InvalidUrl(_))));
        assert!(matches!(normalize_url("ftp://club.ca"), Err(FetchError::InvalidUrl(_))));
        assert!(matches!(normalize_url("http://"), Err(FetchError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn fetches_html_body() {
        let base = serve(Router::new().route("/", get(|| async { "<p>8 courts</p>" }))).await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

        let page = fetcher.fetch(&base).await.unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.html, "<p>8 courts</p>");
    }

    #[tokio::test]
    async fn error_status_is_failure() {
        let base = serve(Router::new().route(
            "/",
            get(|| async { (StatusCode::NOT_FOUND, "gone") }),
        ))
        .await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

        let err = fetcher.fetch(&base).await.unwrap_err();
        assert!(matches!(err, FetchError::Status(404)));
    }

    #[tokio::test]
    async fn slow_site_times_out() {
        let base = serve(Router::new().route(
            "/",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        ))
        .await;
        let fetcher = HttpFetcher::new(Duration::from_millis(200)).unwrap();

        let err = fetcher.fetch(&base).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
    }
}
