//! The enrichment client: one authenticated lookup per call against the
//! Live Persona Card endpoint.

use crate::config::Config;
use crate::error::{AppError, Result};
use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONNECTION};
use reqwest::{Client, Response};
use std::time::Duration;
use uuid::Uuid;

const ENRICH_URL: &str = "https://eur.loki.delve.office.com/api/v1/linkedin/profiles/full";

/// The endpoint expects a desktop browser; anything else gets throttled
/// much more aggressively.
const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:57.0) Gecko/20100101 Firefox/57.0";

/// Response bodies are read up to this cap; anything beyond is ignored.
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// Raw result of one lookup. Transport failures surface as `Err` from
/// [`EnrichmentClient::query`]; every HTTP status lands here.
#[derive(Debug, Clone)]
pub struct QueryReply {
    pub status: u16,
    /// Substring test for `"displayName"`; cheap pre-check before parsing.
    pub has_profile: bool,
    /// Response body, only read on HTTP 200, capped at [`MAX_BODY_BYTES`].
    pub body: String,
}

/// Issues authenticated profile lookups. One instance per batch; the
/// underlying connection pool is sized to the configured concurrency.
pub struct EnrichmentClient {
    http: Client,
    request_timeout: Duration,
}

impl EnrichmentClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .user_agent(DESKTOP_USER_AGENT)
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.max_concurrency)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Initialization(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            request_timeout: config.request_timeout,
        })
    }

    /// One `GET` against the enrichment endpoint with the given bearer
    /// credential. Statuses 200/401/424/429/500 are the recognized
    /// vocabulary; anything else is treated generically by the caller.
    pub async fn query(&self, email: &str, credential: &str) -> Result<QueryReply> {
        let root_correlation_id = Uuid::new_v4().to_string();
        let correlation_id = Uuid::new_v4().to_string();
        let client_correlation_id = Uuid::new_v4().to_string();

        let response = self
            .http
            .get(ENRICH_URL)
            .query(&[
                ("Smtp", email),
                ("RootCorrelationId", root_correlation_id.as_str()),
                ("CorrelationId", correlation_id.as_str()),
                ("ClientCorrelationId", client_correlation_id.as_str()),
                ("UserLocale", "en-US"),
                ("ExternalPageInstance", "0000-0000-0000-0000-0000"),
                ("PersonaType", "User"),
            ])
            .header(AUTHORIZATION, format!("Bearer {}", credential))
            .header("X-ClientFeature", "LivePersonaCard")
            .header(ACCEPT, "text/plain, application/json, text/json")
            .header("X-ClientType", "OwaMail")
            .header("X-HostAppCapabilities", "{}")
            .header("X-LPCVersion", "1.20210418.1.0")
            .header(CONNECTION, "keep-alive")
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            return Ok(QueryReply {
                status,
                has_profile: false,
                body: String::new(),
            });
        }

        let body = read_capped(response).await?;
        Ok(QueryReply {
            status,
            has_profile: body.contains("displayName"),
            body,
        })
    }
}

/// Reads at most [`MAX_BODY_BYTES`] of the response body; a larger body is
/// truncated, not an error.
async fn read_capped(response: Response) -> Result<String> {
    let mut buffer: Vec<u8> = Vec::with_capacity(8 * 1024);
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        if !append_capped(&mut buffer, &chunk?) {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Appends `chunk` up to the cap. Returns false once the cap is reached.
fn append_capped(buffer: &mut Vec<u8>, chunk: &[u8]) -> bool {
    let remaining = MAX_BODY_BYTES - buffer.len();
    if chunk.len() >= remaining {
        buffer.extend_from_slice(&chunk[..remaining]);
        return false;
    }
    buffer.extend_from_slice(chunk);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_body_is_truncated_to_the_cap() {
        // 2 MiB body with the profile marker at byte 0: only the first
        // 1 MiB survives, and the marker is still there.
        let mut body = b"displayName".to_vec();
        body.resize(2 * MAX_BODY_BYTES, b' ');

        let mut buffer = Vec::new();
        let keep_going = append_capped(&mut buffer, &body);
        assert!(!keep_going);
        assert_eq!(buffer.len(), MAX_BODY_BYTES);
        assert!(String::from_utf8_lossy(&buffer).contains("displayName"));
    }

    #[test]
    fn small_chunks_accumulate_until_the_cap() {
        let mut buffer = Vec::new();
        assert!(append_capped(&mut buffer, &[0u8; 1024]));
        assert!(append_capped(&mut buffer, &[0u8; 1024]));
        assert_eq!(buffer.len(), 2048);

        // A chunk that lands exactly on the cap stops the read.
        let rest = MAX_BODY_BYTES - buffer.len();
        assert!(!append_capped(&mut buffer, &vec![0u8; rest]));
        assert_eq!(buffer.len(), MAX_BODY_BYTES);
    }
}
