//! Mock realtime transport.

use super::lock;
use crate::error::ChannelError;
use crate::providers::{EventTransport, FrameStream};
use crate::realtime::{ChannelIdentity, Frame};
use futures::StreamExt;
use futures::channel::mpsc;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};

type FrameSender = mpsc::UnboundedSender<Result<Frame, ChannelError>>;

#[derive(Debug, Default)]
struct Connections {
    opened: usize,
    refuse: usize,
    current: Option<FrameSender>,
    identities: Vec<ChannelIdentity>,
}

/// In-memory [`EventTransport`].
///
/// Each `open` creates a fresh connection; tests push frames into the live
/// one and can drop it to simulate a network loss.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    connections: Arc<Mutex<Connections>>,
}

impl MockTransport {
    /// Create a transport that accepts every connection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `count` connection attempts.
    pub fn refuse_next(&self, count: usize) {
        lock(&self.connections).refuse = count;
    }

    /// Deliver a frame on the live connection; `false` if there is none.
    pub fn push(&self, frame: Frame) -> bool {
        lock(&self.connections)
            .current
            .as_ref()
            .is_some_and(|sender| sender.unbounded_send(Ok(frame)).is_ok())
    }

    /// Fail the live connection with an error frame.
    pub fn fail_connection(&self, error: ChannelError) -> bool {
        lock(&self.connections)
            .current
            .take()
            .is_some_and(|sender| sender.unbounded_send(Err(error)).is_ok())
    }

    /// Close the live connection.
    pub fn drop_connection(&self) {
        lock(&self.connections).current = None;
    }

    /// Connection attempts so far, refused ones included.
    #[must_use]
    pub fn open_count(&self) -> usize {
        lock(&self.connections).opened
    }

    /// Identities used for each attempt.
    #[must_use]
    pub fn identities(&self) -> Vec<ChannelIdentity> {
        lock(&self.connections).identities.clone()
    }
}

impl EventTransport for MockTransport {
    fn open(&self, identity: &ChannelIdentity) -> BoxFuture<'_, Result<FrameStream, ChannelError>> {
        let result = {
            let mut connections = lock(&self.connections);
            connections.opened += 1;
            connections.identities.push(identity.clone());

            if connections.refuse > 0 {
                connections.refuse -= 1;
                Err(ChannelError::Connect("connection refused".to_string()))
            } else {
                let (sender, receiver) = mpsc::unbounded();
                connections.current = Some(sender);
                Ok(receiver.boxed())
            }
        };

        Box::pin(async move { result })
    }
}
