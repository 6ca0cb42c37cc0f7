use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::phase::PageCheck;
use crate::{Result, RunnerError};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Asserts that a served page renders the expected content.
///
/// Called by the watcher while a readiness-defined phase is still running.
/// The checker may poll, but must return within `budget`.
#[async_trait]
pub trait PageChecker: Send + Sync {
    async fn check(&self, check: &PageCheck, budget: Duration) -> std::result::Result<(), String>;
}

/// Fetches the page over HTTP and looks for the expected text in the body.
pub struct HttpPageChecker {
    client: reqwest::Client,
    poll_interval: Duration,
}

impl HttpPageChecker {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RunnerError::PageClient(e.to_string()))?;
        Ok(Self {
            client,
            poll_interval: POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn fetch(&self, url: &str) -> std::result::Result<String, String> {
        let resp = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }
        resp.text().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl PageChecker for HttpPageChecker {
    async fn check(&self, check: &PageCheck, budget: Duration) -> std::result::Result<(), String> {
        let give_up = Instant::now() + budget;

        loop {
            let last = match self.fetch(&check.url).await {
                Ok(body) if body.contains(&check.expected_text) => return Ok(()),
                Ok(_) => "expected text not found".to_string(),
                Err(e) => e,
            };
            debug!(url = %check.url, reason = %last, "page not ready");

            if Instant::now() + self.poll_interval >= give_up {
                return Err(format!(
                    "page {} never showed {:?}: {last}",
                    check.url, check.expected_text
                ));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot-per-connection HTTP server answering every request with `body`.
    async fn serve(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = sock.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn passes_when_text_present() {
        let url = serve("<div id=\"app\"><div>My Awesome Cycle.js app</div></div>").await;
        let checker = HttpPageChecker::new().unwrap();
        let check = PageCheck {
            url,
            expected_text: "My Awesome Cycle.js app".into(),
        };
        assert!(checker.check(&check, Duration::from_secs(5)).await.is_ok());
    }

    #[tokio::test]
    async fn fails_within_budget_when_text_missing() {
        let url = serve("<div id=\"app\"></div>").await;
        let checker = HttpPageChecker::new()
            .unwrap()
            .with_poll_interval(Duration::from_millis(50));
        let check = PageCheck {
            url,
            expected_text: "My Awesome Cycle.js app".into(),
        };
        let err = checker
            .check(&check, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(err.contains("expected text not found"), "{err}");
    }

    #[tokio::test]
    async fn unreachable_page_reports_last_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let checker = HttpPageChecker::new()
            .unwrap()
            .with_poll_interval(Duration::from_millis(50));
        let check = PageCheck {
            url: format!("http://{addr}/"),
            expected_text: "My Awesome Cycle.js app".into(),
        };
        let err = checker
            .check(&check, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.starts_with(&format!("page http://{addr}/ never showed")), "{err}");
        assert!(!err.contains("expected text not found"), "{err}");
    }
}
