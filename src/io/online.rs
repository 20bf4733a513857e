//! Online receipt verification client
//!
//! Looks a receipt up in the external registry by fiscal sign and amount.
//! The registry answers with an HTML page; a configured marker substring in
//! the body confirms the receipt exists. Absence of the marker means the
//! registry does not know the receipt.
//!
//! The call blocks the pipeline for its full round trip; the only bound is
//! the client-wide timeout. A transport error propagates to the worker and
//! is resolved by the watchdog restart.

use anyhow::Context;
use std::time::Duration;

pub struct OnlineVerifier {
    client: reqwest::Client,
    url: String,
    found_marker: String,
}

impl OnlineVerifier {
    pub fn new(url: &str, found_marker: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .http1_only()
            .build()
            .context("Failed to build verification HTTP client")?;
        Ok(Self { client, url: url.to_string(), found_marker: found_marker.to_string() })
    }

    /// True when the registry confirms the receipt.
    pub async fn confirm(&self, fiscal_sign: &str, amount: &str) -> anyhow::Result<bool> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("fp", fiscal_sign), ("s", amount)])
            .send()
            .await
            .with_context(|| format!("Receipt lookup request to {} failed", self.url))?;
        let body = response.text().await.context("Receipt lookup response unreadable")?;
        Ok(body.contains(&self.found_marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn verifier_for(server: &MockServer) -> OnlineVerifier {
        OnlineVerifier::new(
            &format!("{}/v01/show", server.uri()),
            "receipt found",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_confirm_when_marker_present() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v01/show"))
            .and(query_param("fp", "999"))
            .and(query_param("s", "1.00"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html>receipt found: 1.00</html>"),
            )
            .mount(&server)
            .await;

        let verifier = verifier_for(&server).await;
        assert!(verifier.confirm("999", "1.00").await.unwrap());
    }

    #[tokio::test]
    async fn test_reject_when_marker_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v01/show"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nothing here</html>"))
            .mount(&server)
            .await;

        let verifier = verifier_for(&server).await;
        assert!(!verifier.confirm("999", "1.00").await.unwrap());
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        // Port 1 on localhost refuses connections
        let verifier =
            OnlineVerifier::new("http://127.0.0.1:1/v01/show", "x", Duration::from_millis(500))
                .unwrap();
        assert!(verifier.confirm("999", "1.00").await.is_err());
    }
}
