//! Registry liveness probing and ranking.

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::config::RegistryConfig;
use crate::http::{base_url, HttpClients};

/// Per-run probe outcome for one registry. Configuration stays immutable;
/// this record carries all transient state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResult {
    /// True when the registry answered `/v2/` with 200 or 401.
    pub available: bool,
    /// Wall time from request issue to first response.
    pub response_time: Option<Duration>,
}

/// Probes a single registry's `/v2/` endpoint.
///
/// A 200 or 401 both mean the registry speaks the distribution protocol; any
/// other status, transport error, or timeout marks it unavailable.
pub async fn probe(client: &Client, registry: &RegistryConfig) -> ProbeResult {
    let url = format!("{}/v2/", base_url(&registry.host));
    let start = Instant::now();

    let response = client
        .get(&url)
        .timeout(Duration::from_secs(registry.timeout_secs))
        .send()
        .await;

    match response {
        Ok(response) => {
            let elapsed = start.elapsed();
            let status = response.status();
            let available = status == StatusCode::OK || status == StatusCode::UNAUTHORIZED;
            if available {
                debug!(
                    registry = %registry.name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "registry available"
                );
            } else {
                warn!(registry = %registry.name, status = status.as_u16(), "registry unavailable");
            }
            ProbeResult {
                available,
                response_time: Some(elapsed),
            }
        }
        Err(err) => {
            warn!(registry = %registry.name, error = %err, "registry probe failed");
            ProbeResult::default()
        }
    }
}

/// Probes every registry concurrently, at most `max_concurrent` in flight.
pub async fn probe_all(
    clients: &HttpClients,
    registries: &[RegistryConfig],
    max_concurrent: usize,
) -> Vec<(RegistryConfig, ProbeResult)> {
    stream::iter(registries.iter().cloned())
        .map(|registry| async move {
            let result = probe(clients.for_registry(&registry), &registry).await;
            (registry, result)
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await
}

/// Keeps the available candidates and orders them by ascending priority,
/// then ascending measured latency. Candidates without a measured time sort
/// last within their priority class.
#[must_use]
pub fn rank(
    mut candidates: Vec<(RegistryConfig, ProbeResult)>,
) -> Vec<(RegistryConfig, ProbeResult)> {
    candidates.retain(|(_, result)| result.available);
    candidates.sort_by(|(a, ra), (b, rb)| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| match (ra.response_time, rb.response_time) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(name: &str, priority: u32) -> RegistryConfig {
        RegistryConfig {
            name: name.to_string(),
            host: format!("{name}.example.com"),
            priority,
            ..RegistryConfig::default()
        }
    }

    fn available(ms: Option<u64>) -> ProbeResult {
        ProbeResult {
            available: true,
            response_time: ms.map(Duration::from_millis),
        }
    }

    #[test]
    fn test_rank_drops_unavailable() {
        let ranked = rank(vec![
            (registry("down", 1), ProbeResult::default()),
            (registry("up", 2), available(Some(10))),
        ]);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0.name, "up");
    }

    #[test]
    fn test_rank_priority_before_latency() {
        let ranked = rank(vec![
            (registry("slow-primary", 1), available(Some(900))),
            (registry("fast-secondary", 2), available(Some(5))),
        ]);
        assert_eq!(ranked[0].0.name, "slow-primary");
    }

    #[test]
    fn test_rank_latency_breaks_ties() {
        let ranked = rank(vec![
            (registry("b", 1), available(Some(50))),
            (registry("a", 1), available(Some(10))),
        ]);
        assert_eq!(ranked[0].0.name, "a");
    }

    #[test]
    fn test_rank_unmeasured_sorts_last_in_class() {
        let ranked = rank(vec![
            (registry("unmeasured", 1), available(None)),
            (registry("measured", 1), available(Some(400))),
        ]);
        assert_eq!(ranked[0].0.name, "measured");
        assert_eq!(ranked[1].0.name, "unmeasured");
    }

    #[test]
    fn test_rank_deterministic() {
        let input = vec![
            (registry("c", 2), available(Some(30))),
            (registry("a", 1), available(Some(20))),
            (registry("b", 1), available(Some(10))),
        ];
        let first: Vec<String> = rank(input.clone()).iter().map(|(r, _)| r.name.clone()).collect();
        let second: Vec<String> = rank(input).iter().map(|(r, _)| r.name.clone()).collect();
        assert_eq!(first, vec!["b", "a", "c"]);
        assert_eq!(first, second);
    }
}
