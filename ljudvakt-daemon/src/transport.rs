//! Adapter interface to the underlying media server.
//!
//! The real transport lives outside this repository; the daemon only
//! depends on this trait. A channel-backed implementation is provided for
//! embedders and tests.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use ljudvakt_core::event::Event;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("media server unavailable: {0}")]
    Unavailable(String),
}

/// Publishes discovered media-graph objects as dispatcher events.
#[async_trait]
pub trait MediaTransport: Send {
    /// Name of the remote endpoint, for logs.
    fn endpoint(&self) -> &str;

    /// Establishes the connection; called once at startup.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// The next published event, or `None` once the server goes away.
    async fn next_event(&mut self) -> Option<Event>;
}

/// Channel-backed transport: events sent on the handle come out of
/// [`MediaTransport::next_event`]; dropping every handle reads as a
/// disconnect.
pub struct ChannelTransport {
    endpoint: String,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl ChannelTransport {
    pub fn pair(endpoint: impl Into<String>) -> (mpsc::UnboundedSender<Event>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                endpoint: endpoint.into(),
                rx,
            },
        )
    }
}

#[async_trait]
impl MediaTransport for ChannelTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
