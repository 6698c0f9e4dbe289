//! Shared HTTP plumbing for the REST adapters

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::FetchError;

/// Longest body excerpt kept in error messages
const BODY_EXCERPT: usize = 256;

/// Thin wrapper over one pooled `reqwest::Client`, shared by all adapters
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    timeout: Duration,
}

impl RestClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cex-arb-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, timeout })
    }

    /// GET `url` and decode the JSON body into `T`
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        exchange: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(exchange, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(exchange, e))?;

        debug!("{} {} -> {} ({} bytes)", exchange, url, status, body.len());

        if !status.is_success() {
            return Err(FetchError::Status {
                exchange: exchange.to_string(),
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| FetchError::Parse {
            exchange: exchange.to_string(),
            reason: format!("{}. Body: {}", e, excerpt(&body)),
        })
    }

    fn transport_error(&self, exchange: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                exchange: exchange.to_string(),
                timeout: self.timeout,
            }
        } else {
            FetchError::Http {
                exchange: exchange.to_string(),
                source: err,
            }
        }
    }
}

fn excerpt(body: &str) -> String {
    if body.len() <= BODY_EXCERPT {
        return body.to_string();
    }
    let mut end = BODY_EXCERPT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let short = "{\"code\":\"400\"}";
        assert_eq!(excerpt(short), short);

        let long = "é".repeat(200);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= BODY_EXCERPT + 3);
    }
}
