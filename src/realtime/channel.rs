//! Process-wide push channel.
//!
//! One background task owns the transport: it connects, reads frames,
//! dispatches them to listeners and reconnects with backoff when the
//! connection drops. Listeners run synchronously on that task and must not
//! block.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use dashmap::DashMap;
use futures::StreamExt;
use metrics::counter;
use serde_json::Value;
use tds_api_types::{EventName, SocketEnvelope};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::SocketSettings;
use crate::util::lock::mutex_lock;

use super::backoff::{ReconnectPolicy, clock_entropy};
use super::connector::{Connector, WsConnector};
use super::metrics::{EVENT_TOTAL, FRAME_DROPPED_TOTAL, RECONNECT_TOTAL};

const SOURCE: &str = "realtime::channel";

/// A decoded push event. The payload stays opaque.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketEvent {
    pub name: EventName,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        }
    }
}

type Handler = Arc<dyn Fn(&SocketEvent) + Send + Sync>;

struct Listener {
    id: u64,
    handler: Handler,
}

/// The connection task plus its closing flag. Abort only lands at the task's
/// next yield point, so the flag stops a run that is mid-poll elsewhere.
struct RunHandle {
    handle: JoinHandle<()>,
    closing: Arc<AtomicBool>,
}

struct Shared {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    listeners: DashMap<EventName, Vec<Listener>>,
    next_listener_id: AtomicU64,
    state: watch::Sender<ConnectionState>,
    task: Mutex<Option<RunHandle>>,
}

/// Cloneable handle to the push channel.
#[derive(Clone)]
pub struct SocketChannel {
    shared: Arc<Shared>,
}

impl SocketChannel {
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            shared: Arc::new(Shared {
                connector,
                policy,
                listeners: DashMap::new(),
                next_listener_id: AtomicU64::new(1),
                state,
                task: Mutex::new(None),
            }),
        }
    }

    /// Channel backed by the WebSocket connector.
    pub fn from_settings(settings: &SocketSettings, token: Option<String>) -> Self {
        let connector = WsConnector::new(settings.url.clone(), token);
        Self::new(
            Arc::new(connector),
            ReconnectPolicy::from(&settings.reconnect),
        )
    }

    /// Start the connection task. No-op while it is already connecting or open.
    pub fn connect(&self) {
        let mut task = mutex_lock(&self.shared.task, SOURCE, "connect");
        if task.as_ref().is_some_and(|run| !run.handle.is_finished()) {
            debug!(
                state = self.state().as_str(),
                "Socket connect ignored: already running"
            );
            return;
        }

        self.shared.set_state(ConnectionState::Connecting);
        let closing = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run(Arc::downgrade(&self.shared), Arc::clone(&closing)));
        *task = Some(RunHandle { handle, closing });
    }

    /// Register `handler` for `event`. Handlers for one event run in
    /// registration order; the returned handle unregisters on drop.
    pub fn on<F>(&self, event: EventName, handler: F) -> Subscription
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        let id = self.shared.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.shared
            .listeners
            .entry(event)
            .or_default()
            .push(Listener {
                id,
                handler: Arc::new(handler),
            });
        trace!(event = %event, listener_id = id, "Socket listener registered");

        Subscription {
            shared: Arc::downgrade(&self.shared),
            event,
            id,
        }
    }

    /// Close the transport and drop every listener. Meant for process teardown.
    pub fn disconnect(&self) {
        if let Some(run) = mutex_lock(&self.shared.task, SOURCE, "disconnect").take() {
            run.closing.store(true, Ordering::SeqCst);
            run.handle.abort();
        }
        self.shared.listeners.clear();
        self.shared.set_state(ConnectionState::Closed);
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn listener_count(&self, event: EventName) -> usize {
        self.shared
            .listeners
            .get(&event)
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn dispatch(&self, frame: &str) {
        self.shared.dispatch(frame, &AtomicBool::new(false));
    }
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        self.transition(next, None);
    }

    /// Move to `next` unless `closing` is set. The flag is read under the
    /// state lock, so a closed channel stays closed. Returns false once closing.
    fn transition(&self, next: ConnectionState, closing: Option<&AtomicBool>) -> bool {
        let mut previous = next;
        let mut live = true;
        let changed = self.state.send_if_modified(|state| {
            if closing.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                live = false;
                return false;
            }
            previous = *state;
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        if changed {
            info!(
                from = previous.as_str(),
                to = next.as_str(),
                "Socket connection state changed"
            );
        }
        live
    }

    /// Decode one frame and invoke its listeners. Bad frames are dropped.
    fn dispatch(&self, frame: &str, closing: &AtomicBool) {
        let envelope: SocketEnvelope = match serde_json::from_str(frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                counter!(FRAME_DROPPED_TOTAL, "reason" => "malformed").increment(1);
                warn!(error = %err, "Dropping malformed socket frame");
                return;
            }
        };

        let name = match envelope.event.parse::<EventName>() {
            Ok(name) => name,
            Err(err) => {
                counter!(FRAME_DROPPED_TOTAL, "reason" => "unknown_event").increment(1);
                debug!(error = %err, "Ignoring socket frame");
                return;
            }
        };

        // Snapshot the handlers so listeners may (un)subscribe while running.
        let handlers: Vec<Handler> = self
            .listeners
            .get(&name)
            .map(|listeners| {
                listeners
                    .iter()
                    .map(|listener| Arc::clone(&listener.handler))
                    .collect()
            })
            .unwrap_or_default();

        counter!(EVENT_TOTAL, "event" => name.as_str()).increment(1);
        trace!(event = %name, listeners = handlers.len(), "Dispatching socket event");

        let event = SocketEvent {
            name,
            data: envelope.data,
        };
        for handler in handlers {
            if closing.load(Ordering::SeqCst) {
                trace!(event = %event.name, "Socket closing, skipping remaining listeners");
                return;
            }
            handler(&event);
        }
    }
}

async fn run(weak: Weak<Shared>, closing: Arc<AtomicBool>) {
    let mut attempt: u32 = 0;

    loop {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        if !shared.transition(ConnectionState::Connecting, Some(&closing)) {
            return;
        }
        let connector = Arc::clone(&shared.connector);
        let policy = shared.policy.clone();
        drop(shared);

        match connector.connect().await {
            Ok(mut frames) => {
                attempt = 0;
                match weak.upgrade() {
                    Some(shared) if shared.transition(ConnectionState::Open, Some(&closing)) => {}
                    _ => return,
                }

                while let Some(frame) = frames.next().await {
                    let Some(shared) = weak.upgrade() else {
                        return;
                    };
                    if closing.load(Ordering::SeqCst) {
                        return;
                    }
                    match frame {
                        Ok(text) => shared.dispatch(&text, &closing),
                        Err(err) => {
                            warn!(error = %err, "Socket transport error");
                            break;
                        }
                    }
                }
                info!("Socket connection lost");
            }
            Err(err) => {
                warn!(error = %err, attempt, "Socket connect failed");
            }
        }

        match weak.upgrade() {
            Some(shared) if shared.transition(ConnectionState::Connecting, Some(&closing)) => {}
            _ => return,
        }

        let delay = policy.delay(attempt, clock_entropy());
        counter!(RECONNECT_TOTAL).increment(1);
        info!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "Socket reconnect scheduled"
        );
        attempt = attempt.saturating_add(1);
        tokio::time::sleep(delay).await;
    }
}

/// Registration handle returned by [`SocketChannel::on`].
#[must_use = "dropping a Subscription unregisters the listener"]
pub struct Subscription {
    shared: Weak<Shared>,
    event: EventName,
    id: u64,
}

impl Subscription {
    pub fn event(&self) -> EventName {
        self.event
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if let Some(mut listeners) = shared.listeners.get_mut(&self.event) {
            listeners.retain(|listener| listener.id != self.id);
        }
        shared
            .listeners
            .remove_if(&self.event, |_, listeners| listeners.is_empty());
        trace!(event = %self.event, listener_id = self.id, "Socket listener removed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::channel::mpsc;

    use super::super::connector::FrameStream;
    use super::super::error::SocketError;
    use super::*;

    struct IdleConnector;

    #[async_trait]
    impl Connector for IdleConnector {
        async fn connect(&self) -> Result<FrameStream, SocketError> {
            futures::future::pending().await
        }
    }

    struct ScriptedConnector {
        connections: tokio::sync::Mutex<mpsc::UnboundedReceiver<mpsc::UnboundedReceiver<String>>>,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self) -> Result<FrameStream, SocketError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let next = self.connections.lock().await.next().await;
            match next {
                Some(frames) => Ok(frames.map(Ok).boxed()),
                None => Err(SocketError::closed("no more scripted connections")),
            }
        }
    }

    fn scripted() -> (
        Arc<ScriptedConnector>,
        mpsc::UnboundedSender<mpsc::UnboundedReceiver<String>>,
    ) {
        let (accept, connections) = mpsc::unbounded();
        let connector = Arc::new(ScriptedConnector {
            connections: tokio::sync::Mutex::new(connections),
            attempts: AtomicUsize::new(0),
        });
        (connector, accept)
    }

    fn idle_channel() -> SocketChannel {
        SocketChannel::new(Arc::new(IdleConnector), ReconnectPolicy::default())
    }

    fn recorder(
        channel: &SocketChannel,
        event: EventName,
        label: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Subscription {
        let log = Arc::clone(log);
        channel.on(event, move |_| {
            log.lock().expect("log lock").push(label);
        })
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let channel = idle_channel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _first = recorder(&channel, EventName::AlertCreated, "first", &log);
        let _second = recorder(&channel, EventName::AlertCreated, "second", &log);
        let _other = recorder(&channel, EventName::QueueUpdated, "other", &log);

        channel.dispatch(r#"{"event":"alert_created","data":{"id":1}}"#);

        assert_eq!(*log.lock().expect("log lock"), vec!["first", "second"]);
    }

    #[test]
    fn dropping_subscription_removes_only_that_listener() {
        let channel = idle_channel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = recorder(&channel, EventName::HealthChanged, "first", &log);
        let _second = recorder(&channel, EventName::HealthChanged, "second", &log);

        drop(first);
        channel.dispatch(r#"{"event":"health_changed","data":null}"#);

        assert_eq!(*log.lock().expect("log lock"), vec!["second"]);
        assert_eq!(channel.listener_count(EventName::HealthChanged), 1);
    }

    #[test]
    fn bad_frames_are_dropped_without_unsubscribing() {
        let channel = idle_channel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _sub = recorder(&channel, EventName::SyncCompleted, "sync", &log);

        channel.dispatch("not json at all");
        channel.dispatch(r#"{"data":{"id":4}}"#);
        channel.dispatch(r#"{"event":"totally_unknown","data":{}}"#);
        channel.dispatch(r#"{"event":"sync_completed"}"#);

        assert_eq!(*log.lock().expect("log lock"), vec!["sync"]);
        assert_eq!(channel.listener_count(EventName::SyncCompleted), 1);
    }

    #[test]
    fn handler_can_subscribe_during_dispatch() {
        let channel = idle_channel();
        let nested = Arc::new(Mutex::new(Vec::new()));
        let inner_channel = channel.clone();
        let store = Arc::clone(&nested);
        let _sub = channel.on(EventName::WebhookReceived, move |_| {
            let sub = inner_channel.on(EventName::WebhookReceived, |_| {});
            store.lock().expect("nested lock").push(sub);
        });

        channel.dispatch(r#"{"event":"webhook_received","data":{}}"#);

        assert_eq!(channel.listener_count(EventName::WebhookReceived), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_idempotent_and_delivers_frames() {
        let (connector, accept) = scripted();
        let channel = SocketChannel::new(connector.clone(), ReconnectPolicy::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _sub = channel.on(EventName::QueueUpdated, move |event| {
            let _ = tx.send(event.data.clone());
        });

        let (frames, connection) = mpsc::unbounded();
        accept.unbounded_send(connection).expect("accept");

        channel.connect();
        channel.connect();

        frames
            .unbounded_send(r#"{"event":"queue_updated","data":{"depth":3}}"#.to_string())
            .expect("frame");
        let data = rx.recv().await.expect("event delivered");

        assert_eq!(data["depth"], 3);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(channel.state(), ConnectionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_connection_is_reestablished() {
        let (connector, accept) = scripted();
        let channel = SocketChannel::new(connector.clone(), ReconnectPolicy::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _sub = channel.on(EventName::CircuitBreakerStateChanged, move |event| {
            let _ = tx.send(event.name);
        });
        let mut states = channel.state_changes();

        let (first, connection) = mpsc::unbounded();
        accept.unbounded_send(connection).expect("accept");
        channel.connect();
        states
            .wait_for(|state| *state == ConnectionState::Open)
            .await
            .expect("open");

        drop(first);
        states
            .wait_for(|state| *state == ConnectionState::Connecting)
            .await
            .expect("reconnecting");

        let (second, connection) = mpsc::unbounded();
        accept.unbounded_send(connection).expect("accept");
        second
            .unbounded_send(
                r#"{"event":"circuit_breaker_state_changed","data":{"name":"erp"}}"#.to_string(),
            )
            .expect("frame");

        let name = tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("delivered before timeout")
            .expect("event");
        assert_eq!(name, EventName::CircuitBreakerStateChanged);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_clears_listeners_and_closes() {
        let (connector, accept) = scripted();
        let channel = SocketChannel::new(connector, ReconnectPolicy::default());
        let sub = channel.on(EventName::AlertCreated, |_| {});

        let (_frames, connection) = mpsc::unbounded();
        accept.unbounded_send(connection).expect("accept");
        channel.connect();
        let mut states = channel.state_changes();
        states
            .wait_for(|state| *state == ConnectionState::Open)
            .await
            .expect("open");

        channel.disconnect();

        assert_eq!(channel.state(), ConnectionState::Closed);
        assert_eq!(channel.listener_count(EventName::AlertCreated), 0);
        drop(sub);
    }

    #[test]
    fn closing_run_cannot_reopen_or_dispatch() {
        let channel = idle_channel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _sub = recorder(&channel, EventName::QueueUpdated, "late", &log);
        let closing = AtomicBool::new(true);

        assert!(
            !channel
                .shared
                .transition(ConnectionState::Open, Some(&closing))
        );
        channel
            .shared
            .dispatch(r#"{"event":"queue_updated","data":{}}"#, &closing);

        assert_eq!(channel.state(), ConnectionState::Closed);
        assert!(log.lock().expect("log lock").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_from_a_listener_stops_the_dispatch() {
        let (connector, accept) = scripted();
        let channel = SocketChannel::new(connector, ReconnectPolicy::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let closer = channel.clone();
        let _first = channel.on(EventName::AlertCreated, move |_| {
            closer.disconnect();
            let _ = tx.send(());
        });
        let _second = recorder(&channel, EventName::AlertCreated, "second", &log);

        let (frames, connection) = mpsc::unbounded();
        accept.unbounded_send(connection).expect("accept");
        channel.connect();
        frames
            .unbounded_send(r#"{"event":"alert_created","data":{}}"#.to_string())
            .expect("frame");
        rx.recv().await.expect("first listener ran");
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(log.lock().expect("log lock").is_empty());
        assert_eq!(channel.state(), ConnectionState::Closed);
        assert_eq!(channel.listener_count(EventName::AlertCreated), 0);
    }
}
