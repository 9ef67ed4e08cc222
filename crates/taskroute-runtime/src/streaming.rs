//! Streaming execution.
//!
//! A streaming task is routed once and forwarded chunk by chunk. There is
//! no fallback mid-stream: a failure ends the stream with a single
//! `"Error: ..."` chunk so consumers always see a terminated stream.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::pin::Pin;

use taskroute_core::{ProviderId, Task};

use crate::providers::ProviderError;
use crate::router::TaskRouter;

/// A provider streaming session.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Opens provider-specific streaming sessions.
#[async_trait]
pub trait StreamingBackend: Send + Sync {
    async fn open(&self, provider: &ProviderId, task: &Task) -> Result<ChunkStream, ProviderError>;
}

fn error_chunk(error: &ProviderError) -> String {
    format!("Error: {error}")
}

/// Forward non-empty chunks of `session`, ending with an error chunk on failure.
fn forward(provider: ProviderId, session: ChunkStream) -> BoxStream<'static, String> {
    stream::unfold(Some(session), move |state| {
        let provider = provider.clone();
        async move {
            let mut session = state?;
            loop {
                match session.next().await {
                    Some(Ok(chunk)) if chunk.is_empty() => continue,
                    Some(Ok(chunk)) => return Some((chunk, Some(session))),
                    Some(Err(e)) => {
                        tracing::error!(
                            provider = %provider,
                            error = %e,
                            "Streaming session failed"
                        );
                        return Some((error_chunk(&e), None));
                    }
                    None => return None,
                }
            }
        }
    })
    .boxed()
}

impl TaskRouter {
    /// Route `task` and stream its output.
    pub async fn stream(
        &self,
        task: &Task,
        backend: &dyn StreamingBackend,
    ) -> BoxStream<'static, String> {
        let provider = self.route(task);
        tracing::info!(provider = %provider, kind = %task.kind(), "Opening streaming session");

        match backend.open(&provider, task).await {
            Ok(session) => forward(provider, session),
            Err(e) => {
                tracing::error!(
                    provider = %provider,
                    error = %e,
                    "Failed to open streaming session"
                );
                stream::once(futures::future::ready(error_chunk(&e))).boxed()
            }
        }
    }
}
