//! Reconnecting realtime channel with per-kind listeners.
//!
//! # Lifecycle
//!
//! 1. [`RealtimeChannel::on`] registers interest in an event kind and returns a
//!    receiver. Receivers registered before `connect` see every event.
//! 2. [`RealtimeChannel::connect`] spawns the connection task. When a
//!    connection drops, the task reconnects with exponential backoff and keeps
//!    dispatching to the same listeners. No error reaches the listeners.
//! 3. [`RealtimeChannel::disconnect`] stops the task and drops every listener,
//!    so receivers observe the end of the stream and nothing leaks.
//!
//! Events may be redelivered after a reconnect; consumers must be idempotent.

use super::{ChannelEvent, ChannelIdentity, ConnectionStatus, EventKind};
use crate::providers::EventTransport;
use futures::StreamExt;
use futures::stream::BoxStream;
use ridesync_runtime::retry::RetryPolicy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Listener queue depth per event kind.
const LISTENER_CAPACITY: usize = 64;

type Listeners = Arc<Mutex<HashMap<EventKind, broadcast::Sender<ChannelEvent>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Realtime event channel.
pub struct RealtimeChannel {
    transport: Arc<dyn EventTransport>,
    policy: RetryPolicy,
    listeners: Listeners,
    task: Mutex<Option<JoinHandle<()>>>,
    status: watch::Sender<ConnectionStatus>,
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("status", &*self.status.borrow())
            .field("listeners", &lock(&self.listeners).len())
            .finish_non_exhaustive()
    }
}

impl RealtimeChannel {
    /// Create a disconnected channel.
    #[must_use]
    pub fn new(transport: Arc<dyn EventTransport>, policy: RetryPolicy) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            transport,
            policy,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            task: Mutex::new(None),
            status,
        }
    }

    /// Subscribe to one event kind.
    #[must_use]
    pub fn on(&self, kind: EventKind) -> broadcast::Receiver<ChannelEvent> {
        lock(&self.listeners)
            .entry(kind)
            .or_insert_with(|| broadcast::channel(LISTENER_CAPACITY).0)
            .subscribe()
    }

    /// Drop every listener of one kind; their receivers end.
    pub fn off(&self, kind: EventKind) {
        lock(&self.listeners).remove(&kind);
    }

    /// Number of kinds with listeners registered
    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Subscribe to every event kind as one stream.
    ///
    /// The stream ends once every kind has been released by [`Self::off`] or
    /// [`Self::disconnect`].
    #[must_use]
    pub fn events(&self) -> BoxStream<'static, ChannelEvent> {
        let streams: Vec<_> = EventKind::ALL
            .into_iter()
            .map(|kind| receiver_stream(kind, self.on(kind)))
            .collect();
        futures::stream::select_all(streams).boxed()
    }

    /// Connection status updates.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Start (or restart) the connection task for `identity`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, identity: ChannelIdentity) {
        let task = tokio::spawn(run_connection(
            Arc::clone(&self.transport),
            identity,
            self.policy.clone(),
            Arc::clone(&self.listeners),
            self.status.clone(),
        ));

        if let Some(previous) = lock(&self.task).replace(task) {
            previous.abort();
        }
    }

    /// Stop the connection task and release every listener.
    pub fn disconnect(&self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
        lock(&self.listeners).clear();
        self.status.send_replace(ConnectionStatus::Disconnected);
        tracing::info!("Realtime channel disconnected");
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

fn receiver_stream(
    kind: EventKind,
    mut receiver: broadcast::Receiver<ChannelEvent>,
) -> BoxStream<'static, ChannelEvent> {
    async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(event) => yield event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(%kind, skipped, "Realtime listener lagged");
                },
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    .boxed()
}

fn dispatch(listeners: &Listeners, event: ChannelEvent) {
    let kind = event.kind();
    let sender = lock(listeners).get(&kind).cloned();
    match sender {
        Some(sender) => {
            if sender.send(event).is_err() {
                tracing::debug!(%kind, "No live receivers for event");
            }
        },
        None => tracing::debug!(%kind, "No listener registered for event"),
    }
}

async fn run_connection(
    transport: Arc<dyn EventTransport>,
    identity: ChannelIdentity,
    policy: RetryPolicy,
    listeners: Listeners,
    status: watch::Sender<ConnectionStatus>,
) {
    let mut attempt = 0usize;
    status.send_replace(ConnectionStatus::Connecting);

    loop {
        match transport.open(&identity).await {
            Ok(mut frames) => {
                attempt = 0;
                status.send_replace(ConnectionStatus::Connected);
                tracing::info!(user = %identity.user_id, "Realtime channel connected");

                while let Some(frame) = frames.next().await {
                    match frame {
                        Ok(frame) => match ChannelEvent::decode(frame) {
                            Ok(Some(event)) => dispatch(&listeners, event),
                            Ok(None) => {},
                            Err(error) => tracing::warn!(%error, "Dropped malformed event"),
                        },
                        Err(error) => {
                            tracing::warn!(%error, "Realtime connection failed");
                            break;
                        },
                    }
                }
                tracing::info!("Realtime connection lost");
            },
            Err(error) => {
                tracing::warn!(attempt, %error, "Realtime connect failed");
            },
        }

        if !policy.should_retry(attempt) {
            tracing::error!(attempt, "Realtime channel giving up");
            status.send_replace(ConnectionStatus::Disconnected);
            return;
        }

        let delay = policy.delay_for_attempt(attempt);
        attempt += 1;
        metrics::counter!("realtime.reconnects").increment(1);
        status.send_replace(ConnectionStatus::Reconnecting { attempt });
        tracing::debug!(attempt, delay_ms = delay.as_millis(), "Realtime reconnect scheduled");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::MockTransport;
    use crate::realtime::{Frame, VehicleUpdates};
    use crate::types::UserId;
    use std::time::Duration;

    fn identity() -> ChannelIdentity {
        ChannelIdentity {
            user_id: UserId::new("u1"),
            token: "t".into(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::builder()
            .unbounded()
            .initial_delay(Duration::from_millis(5))
            .max_delay(Duration::from_millis(20))
            .build()
    }

    async fn wait_for_status(channel: &RealtimeChannel, wanted: ConnectionStatus) {
        let mut status = channel.status();
        tokio::time::timeout(Duration::from_secs(2), status.wait_for(|s| *s == wanted))
            .await
            .unwrap()
            .unwrap();
    }

    fn vehicle_frame() -> Frame {
        Frame::new(EventKind::VehicleUpdates, &VehicleUpdates::default()).unwrap()
    }

    #[tokio::test]
    async fn dispatches_to_matching_listener_only() {
        let transport = Arc::new(MockTransport::new());
        let channel = RealtimeChannel::new(transport.clone(), fast_policy());
        let mut vehicles = channel.on(EventKind::VehicleUpdates);
        let mut assigned = channel.on(EventKind::DriverAssigned);

        channel.connect(identity());
        wait_for_status(&channel, ConnectionStatus::Connected).await;
        assert!(transport.push(vehicle_frame()));

        let event = tokio::time::timeout(Duration::from_secs(1), vehicles.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind(), EventKind::VehicleUpdates);
        assert!(assigned.try_recv().is_err());
        channel.disconnect();
    }

    #[tokio::test]
    async fn reconnects_after_drop_and_keeps_listeners() {
        let transport = Arc::new(MockTransport::new());
        transport.refuse_next(2);
        let channel = RealtimeChannel::new(transport.clone(), fast_policy());
        let mut vehicles = channel.on(EventKind::VehicleUpdates);

        channel.connect(identity());
        wait_for_status(&channel, ConnectionStatus::Connected).await;
        assert_eq!(transport.open_count(), 3);

        transport.drop_connection();
        tokio::time::timeout(Duration::from_secs(2), async {
            while transport.open_count() < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(transport.push(vehicle_frame()));
        let event = tokio::time::timeout(Duration::from_secs(1), vehicles.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind(), EventKind::VehicleUpdates);
        channel.disconnect();
    }

    #[tokio::test]
    async fn disconnect_releases_listeners() {
        let transport = Arc::new(MockTransport::new());
        let channel = RealtimeChannel::new(transport, fast_policy());
        let mut events = channel.events();
        assert_eq!(channel.listener_count(), 4);

        channel.connect(identity());
        channel.disconnect();

        assert_eq!(channel.listener_count(), 0);
        assert_eq!(*channel.status().borrow(), ConnectionStatus::Disconnected);
        let next = tokio::time::timeout(Duration::from_secs(1), events.next())
            .await
            .unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn off_ends_only_that_kind() {
        let transport = Arc::new(MockTransport::new());
        let channel = RealtimeChannel::new(transport, fast_policy());
        let mut location = channel.on(EventKind::DriverLocation);
        let _status = channel.on(EventKind::RideStatusUpdate);

        channel.off(EventKind::DriverLocation);

        assert!(matches!(
            location.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert_eq!(channel.listener_count(), 1);
    }
}
