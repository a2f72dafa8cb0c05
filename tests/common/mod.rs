//! Common test utilities for seqfetch HTTP integration tests

use std::sync::Arc;
use std::time::Duration;

use seqfetch::{Chain, Config, HttpFetcher, SequencerConfig};
use tokio::io::AsyncWrite;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Handoff wait short enough that buffering kicks in during every test
pub const TEST_HANDOFF_WAIT_MS: u64 = 50;

/// Serve `body` at `route` after `delay`
pub async fn mount_body(server: &MockServer, route: &str, delay: Duration, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.to_vec())
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Answer `route` with `status` and no body after `delay`
pub async fn mount_status(server: &MockServer, route: &str, delay: Duration, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_delay(delay))
        .mount(server)
        .await;
}

/// Test configuration with a short handoff wait
pub fn test_config() -> Config {
    Config {
        sequencer: SequencerConfig {
            handoff_wait_ms: TEST_HANDOFF_WAIT_MS,
        },
        ..Config::default()
    }
}

/// Build an HTTP-backed chain writing into `sink`
pub fn http_chain<W>(sink: W) -> Chain<W, HttpFetcher>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let config = test_config();
    let fetcher = HttpFetcher::new(&config.http).expect("failed to build HTTP client");
    Chain::new(sink, Arc::new(fetcher), &config.sequencer)
}

/// Deterministic, position-tagged payload of `len` bytes
pub fn payload(tag: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| tag.wrapping_add((i % 251) as u8)).collect()
}
