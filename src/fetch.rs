//! Task runner - opens a task's byte stream and drives it into its sequencer node.
//!
//! The network side sits behind the [`Fetcher`] trait so the chain can be
//! exercised with scripted producers; [`HttpFetcher`] is the production
//! implementation.

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::io::AsyncWrite;

use crate::config::HttpConfig;
use crate::error::{Error, FetchError, Result};
use crate::sequencer::SequencerNode;
use crate::types::Task;

/// Stream of body chunks produced by one task, in order.
pub type ChunkStream = BoxStream<'static, std::result::Result<Vec<u8>, FetchError>>;

/// Abstraction over the producer side of a task, enabling testability.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Start producing `task`'s bytes.
    ///
    /// Failing here (bad identifier, unreachable host, rejected status) means
    /// the task produced nothing.
    async fn open(&self, task: &Task) -> std::result::Result<ChunkStream, FetchError>;
}

/// Production [`Fetcher`] issuing HTTP GET requests over one shared client.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build the shared client from configuration
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone());
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| Error::Config {
            message: format!("failed to create HTTP client: {}", e),
            key: Some("http".to_string()),
        })?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn open(&self, task: &Task) -> std::result::Result<ChunkStream, FetchError> {
        let url = url::Url::parse(&task.url)?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status });
        }

        tracing::debug!(
            index = task.index,
            url = %task.url,
            content_length = ?response.content_length(),
            "response accepted, streaming body"
        );

        let body = stream::try_unfold(response, |mut response| async move {
            Ok::<_, FetchError>(
                response
                    .chunk()
                    .await?
                    .map(|chunk| (chunk.to_vec(), response)),
            )
        });
        Ok(body.boxed())
    }
}

/// Fetch `task` and write everything it produces into `node`, chunk by chunk.
///
/// Opening the stream and every chunk read race the chain's cancellation
/// token, so a cancelled chain does not sit on a slow connection. Returns the
/// number of bytes the producer handed over. Does not close the node; that is
/// the orchestrator's job on every exit path.
pub async fn run_task<F, W>(fetcher: &F, task: &Task, node: &mut SequencerNode<W>) -> Result<u64>
where
    F: Fetcher + ?Sized,
    W: AsyncWrite + Unpin + Send,
{
    let cancel = node.cancellation_token();

    let mut body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        opened = fetcher.open(task) => opened?,
    };

    let mut produced = 0u64;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            next = body.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;
        produced += chunk.len() as u64;
        node.write(&chunk).await?;
    }

    Ok(produced)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::handoff;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn head_node() -> (
        SequencerNode<Vec<u8>>,
        handoff::HandoffReceiver<Vec<u8>>,
    ) {
        let (tx, rx) = handoff::channel();
        let node = SequencerNode::new(
            0,
            handoff::seeded(Vec::new()),
            tx,
            CancellationToken::new(),
            Duration::from_millis(50),
        );
        (node, rx)
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&HttpConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn run_task_streams_body_into_node() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payload"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"body bytes".to_vec()))
            .mount(&server)
            .await;

        let (mut node, downstream) = head_node();
        let task = Task::new(0, format!("{}/payload", server.uri()));

        let produced = run_task(&fetcher(), &task, &mut node).await.unwrap();
        node.close().await.unwrap();

        assert_eq!(produced, 10);
        assert_eq!(downstream.await.unwrap(), b"body bytes".to_vec());
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (mut node, _downstream) = head_node();
        let task = Task::new(0, format!("{}/missing", server.uri()));

        match run_task(&fetcher(), &task, &mut node).await {
            Err(Error::Fetch(FetchError::Status { status })) => {
                assert_eq!(status, reqwest::StatusCode::NOT_FOUND)
            }
            other => panic!("expected status error, got {other:?}"),
        }
        assert_eq!(node.bytes_written(), 0);
    }

    #[tokio::test]
    async fn invalid_identifier_fails_before_any_request() {
        let (mut node, _downstream) = head_node();
        let task = Task::new(0, "not a url");

        assert!(matches!(
            run_task(&fetcher(), &task, &mut node).await,
            Err(Error::Fetch(FetchError::InvalidUrl(_)))
        ));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        // Port 9 (discard) on localhost is reliably closed in test environments.
        let task = Task::new(0, "http://127.0.0.1:9/");
        let (mut node, _downstream) = head_node();

        assert!(matches!(
            run_task(&fetcher(), &task, &mut node).await,
            Err(Error::Fetch(FetchError::Transport(_)))
        ));
    }

    #[tokio::test]
    async fn empty_body_produces_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let (mut node, downstream) = head_node();
        let task = Task::new(0, server.uri());

        assert_eq!(run_task(&fetcher(), &task, &mut node).await.unwrap(), 0);
        node.close().await.unwrap();
        assert!(downstream.await.unwrap().is_empty());
    }
}
