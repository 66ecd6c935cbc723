//! Application side of the exec bridge.
//!
//! [`ExecBridge`] turns [`NativeBridge`] calls into request frames and runs a
//! reader task that settles pending deferred calls and routes pushed events
//! to per-handle sinks. The reader is the only task that ever calls a sink,
//! so events for a handle are delivered one at a time and in order. Once a
//! subscription's `cancel` returns, its sink is never called again.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, ThreadId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::host::HostConnection;
use super::protocol::{self, ExecRequest, HostMessage, ResultStatus};
use crate::bridge::{
    settled, BridgeError, Deferred, EventSink, Invocation, NativeBridge, NativeEvent, NativeHandle,
    Subscription, Target,
};

/// Events kept for a handle nobody has subscribed to yet.
const BACKLOG_LIMIT: usize = 256;

type PendingReply = oneshot::Sender<Result<serde_json::Value, BridgeError>>;

/// Closes a sink so that no call into it is in flight, or can start, once
/// `close` returns.
#[derive(Default)]
struct DeliveryGate {
    open: AtomicBool,
    lock: Mutex<()>,
    /// Thread currently inside the sink, if any.
    delivering: Mutex<Option<ThreadId>>,
}

impl DeliveryGate {
    fn opened() -> Arc<Self> {
        let gate = Self::default();
        gate.open.store(true, Ordering::SeqCst);
        Arc::new(gate)
    }

    /// Call `sink` with each event while the gate stays open.
    fn pass(&self, sink: &EventSink, batch: Vec<NativeEvent>) {
        for event in batch {
            let Ok(_guard) = self.lock.lock() else {
                return;
            };
            if !self.open.load(Ordering::SeqCst) {
                return;
            }
            self.mark(Some(thread::current().id()));
            sink(event);
            self.mark(None);
        }
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        let inside_sink = self
            .delivering
            .lock()
            .map(|owner| *owner == Some(thread::current().id()))
            .unwrap_or(false);
        // Cancelled from within the sink: the gate lock is ours already.
        if !inside_sink {
            let _wait = self.lock.lock();
        }
    }

    fn mark(&self, owner: Option<ThreadId>) {
        if let Ok(mut delivering) = self.delivering.lock() {
            *delivering = owner;
        }
    }
}

#[derive(Default)]
struct SinkSlot {
    sink: Option<(EventSink, Arc<DeliveryGate>)>,
    backlog: Vec<NativeEvent>,
}

struct ClientInner {
    outbound: mpsc::UnboundedSender<String>,
    /// Asks the reader to flush a freshly attached sink's backlog.
    flush: mpsc::UnboundedSender<Uuid>,
    connected: AtomicBool,
    next_callback: AtomicU64,
    pending: Mutex<HashMap<u64, PendingReply>>,
    sinks: Mutex<HashMap<Uuid, SinkSlot>>,
}

impl ClientInner {
    fn send(&self, request: &ExecRequest) -> Result<(), BridgeError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BridgeError::Disconnected);
        }
        let frame = protocol::encode(request)?;
        self.outbound
            .send(frame)
            .map_err(|_| BridgeError::Disconnected)
    }

    fn settle(&self, callback_id: u64, result: Result<serde_json::Value, BridgeError>) {
        let reply = match self.pending.lock() {
            Ok(mut pending) => pending.remove(&callback_id),
            Err(_) => None,
        };
        match reply {
            Some(tx) => {
                // The caller may have stopped waiting; nothing to do then.
                let _ = tx.send(result);
            }
            // Abandoned calls are pruned before the host answers them.
            None => tracing::debug!("Exec bridge: result for unknown callback {}", callback_id),
        }
    }

    /// Deliver `event` (if any) to the handle's sink, backlog first.
    fn deliver(&self, handle: Uuid, event: Option<NativeEvent>) {
        let (sink, gate, batch) = {
            let Ok(mut sinks) = self.sinks.lock() else {
                return;
            };
            let Some(slot) = sinks.get_mut(&handle) else {
                if let Some(event) = event {
                    tracing::debug!("Exec bridge: dropping {:?} for detached handle {}", event, handle);
                }
                return;
            };
            match slot.sink.clone() {
                Some((sink, gate)) => {
                    let mut batch: Vec<NativeEvent> = slot.backlog.drain(..).collect();
                    batch.extend(event);
                    (sink, gate, batch)
                }
                None => {
                    if let Some(event) = event {
                        if slot.backlog.len() >= BACKLOG_LIMIT {
                            tracing::warn!("Exec bridge: backlog full for handle {}, dropping event", handle);
                        } else {
                            slot.backlog.push(event);
                        }
                    }
                    return;
                }
            }
        };

        gate.pass(&sink, batch);
    }

    /// Drop entries whose caller stopped waiting (timed out or gave up).
    fn prune_abandoned(pending: &mut HashMap<u64, PendingReply>) {
        let before = pending.len();
        pending.retain(|_, tx| !tx.is_closed());
        let pruned = before - pending.len();
        if pruned > 0 {
            tracing::debug!("Exec bridge: pruned {} abandoned call(s)", pruned);
        }
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let drained: Vec<PendingReply> = match self.pending.lock() {
            Ok(mut pending) => pending.drain().map(|(_, tx)| tx).collect(),
            Err(_) => Vec::new(),
        };
        if !drained.is_empty() {
            tracing::warn!("Exec bridge: failing {} pending call(s), host disconnected", drained.len());
        }
        for tx in drained {
            let _ = tx.send(Err(BridgeError::Disconnected));
        }
    }
}

/// [`NativeBridge`] over a [`NativeHost`](super::NativeHost) connection
pub struct ExecBridge {
    inner: Arc<ClientInner>,
    services: HashSet<String>,
    reader: JoinHandle<()>,
    host: JoinHandle<()>,
}

impl ExecBridge {
    /// Attach to a running host. Must be called inside a tokio runtime.
    pub fn connect(connection: HostConnection) -> Self {
        let HostConnection {
            services,
            to_host,
            mut from_host,
            task,
        } = connection;

        let (flush_tx, mut flush_rx) = mpsc::unbounded_channel::<Uuid>();
        let inner = Arc::new(ClientInner {
            outbound: to_host,
            flush: flush_tx,
            connected: AtomicBool::new(true),
            next_callback: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            sinks: Mutex::new(HashMap::new()),
        });

        let reader_inner = inner.clone();
        let reader = tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = from_host.recv() => {
                        let Some(frame) = frame else { break };
                        match protocol::decode_host_message(&frame) {
                            Ok(HostMessage::Result { callback_id, status, payload }) => {
                                let result = match status {
                                    ResultStatus::Ok => Ok(payload),
                                    ResultStatus::Error => Err(BridgeError::Rejected(payload)),
                                };
                                reader_inner.settle(callback_id, result);
                            }
                            Ok(HostMessage::Event { handle, event }) => {
                                reader_inner.deliver(handle, Some(event));
                            }
                            Err(e) => tracing::warn!("Exec bridge: dropping frame: {}", e),
                        }
                    }
                    Some(handle) = flush_rx.recv() => {
                        reader_inner.deliver(handle, None);
                    }
                }
            }
            reader_inner.disconnect();
            tracing::info!("Exec bridge: host connection closed");
        });

        tracing::info!("Exec bridge: connected, services {:?}", services);

        Self {
            inner,
            services: services.into_iter().collect(),
            reader,
            host: task,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Number of deferred calls still waiting for the host. Calls whose
    /// caller has stopped waiting are not counted.
    pub fn pending_calls(&self) -> usize {
        match self.inner.pending.lock() {
            Ok(mut pending) => {
                ClientInner::prune_abandoned(&mut pending);
                pending.len()
            }
            Err(_) => 0,
        }
    }

    fn request(&self, target: Target<'_>, call: Invocation, callback_id: Option<u64>) -> ExecRequest {
        ExecRequest {
            callback_id,
            service: target.service().to_string(),
            handle: target.handle_id(),
            action: call.action,
            args: call.args,
        }
    }
}

impl Drop for ExecBridge {
    fn drop(&mut self) {
        self.reader.abort();
        self.host.abort();
    }
}

impl NativeBridge for ExecBridge {
    fn is_available(&self, service: &str) -> bool {
        self.is_connected() && self.services.contains(service)
    }

    fn create(&self, service: &str, locator: &str) -> Result<NativeHandle, BridgeError> {
        if !self.is_available(service) {
            return Err(BridgeError::Unavailable(service.to_string()));
        }

        let handle = NativeHandle {
            service: service.to_string(),
            id: Uuid::new_v4(),
        };

        if let Ok(mut sinks) = self.inner.sinks.lock() {
            sinks.insert(handle.id, SinkSlot::default());
        }

        let request = self.request(
            Target::Handle(&handle),
            Invocation::new("create", serde_json::json!({ "src": locator })),
            None,
        );
        if let Err(e) = self.inner.send(&request) {
            if let Ok(mut sinks) = self.inner.sinks.lock() {
                sinks.remove(&handle.id);
            }
            return Err(e);
        }

        tracing::debug!("Exec bridge: created {} for {}", handle, locator);
        Ok(handle)
    }

    fn invoke_sync(&self, target: Target<'_>, call: Invocation) -> Result<(), BridgeError> {
        let request = self.request(target, call, None);
        self.inner.send(&request)
    }

    fn invoke_async(&self, target: Target<'_>, call: Invocation) -> Deferred {
        let callback_id = self.inner.next_callback.fetch_add(1, Ordering::SeqCst);
        let request = self.request(target, call, Some(callback_id));

        let (tx, rx) = oneshot::channel();
        match self.inner.pending.lock() {
            Ok(mut pending) => {
                ClientInner::prune_abandoned(&mut pending);
                pending.insert(callback_id, tx);
            }
            Err(_) => return settled(Err(BridgeError::Protocol("pending table poisoned".to_string()))),
        }

        if let Err(e) = self.inner.send(&request) {
            let tx = self
                .inner
                .pending
                .lock()
                .ok()
                .and_then(|mut pending| pending.remove(&callback_id));
            // The reader may already have failed it on disconnect.
            if let Some(tx) = tx {
                let _ = tx.send(Err(e));
            }
        }

        rx
    }

    fn on_event(&self, handle: &NativeHandle, sink: EventSink) -> Subscription {
        let gate = DeliveryGate::opened();
        let has_backlog = match self.inner.sinks.lock() {
            Ok(mut sinks) => {
                let slot = sinks.entry(handle.id).or_default();
                if let Some((_, previous)) = slot.sink.replace((sink, gate.clone())) {
                    previous.open.store(false, Ordering::SeqCst);
                }
                !slot.backlog.is_empty()
            }
            Err(_) => return Subscription::detached(),
        };

        if has_backlog {
            let _ = self.inner.flush.send(handle.id);
        }

        let weak: Weak<ClientInner> = Arc::downgrade(&self.inner);
        let id = handle.id;
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Ok(mut sinks) = inner.sinks.lock() {
                    sinks.remove(&id);
                }
            }
            gate.close();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::exec::{EventQueue, NativeHost, NativePlugin, PluginCall, PluginResult};
    use crate::bridge::MediaStatus;
    use serde_json::json;
    use tokio::time::{timeout, Duration};

    const TIMEOUT: Duration = Duration::from_secs(2);

    struct CounterPlugin {
        count: u64,
    }

    impl NativePlugin for CounterPlugin {
        fn service(&self) -> &str {
            "Counter"
        }

        fn execute(&mut self, call: PluginCall, events: &mut EventQueue) -> PluginResult {
            match call.action.as_str() {
                "create" => {
                    if let Some(id) = call.handle {
                        events.emit(id, NativeEvent::Status { code: MediaStatus::Starting });
                    }
                    PluginResult::NoResult
                }
                "bump" => {
                    self.count += 1;
                    if let Some(id) = call.handle {
                        events.emit(id, NativeEvent::Position { seconds: self.count as f64 });
                    }
                    PluginResult::NoResult
                }
                "read" => PluginResult::Ok(json!(self.count)),
                _ => PluginResult::Error(json!({"message": "unsupported", "code": 4})),
            }
        }
    }

    fn connect() -> ExecBridge {
        ExecBridge::connect(NativeHost::new().with_plugin(CounterPlugin { count: 0 }).spawn())
    }

    #[tokio::test]
    async fn test_availability_probe() {
        let bridge = connect();
        assert!(bridge.is_available("Counter"));
        assert!(!bridge.is_available("Media"));
        assert!(matches!(
            bridge.create("Media", "a.mp3"),
            Err(BridgeError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_calls_reach_host_in_order() {
        let bridge = connect();
        for _ in 0..5 {
            bridge
                .invoke_sync(Target::Service("Counter"), Invocation::bare("bump"))
                .unwrap();
        }
        let value = timeout(TIMEOUT, bridge.invoke_async(Target::Service("Counter"), Invocation::bare("read")))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(value, json!(5));
        assert_eq!(bridge.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejection_carries_payload() {
        let bridge = connect();
        let result = timeout(TIMEOUT, bridge.invoke_async(Target::Service("Counter"), Invocation::bare("nope")))
            .await
            .unwrap()
            .unwrap();
        match result {
            Err(BridgeError::Rejected(payload)) => assert_eq!(payload["code"], 4),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backlog_flushed_in_order_on_subscribe() {
        let bridge = connect();
        let handle = bridge.create("Counter", "x").unwrap();
        bridge.invoke_sync(Target::Handle(&handle), Invocation::bare("bump")).unwrap();
        bridge.invoke_sync(Target::Handle(&handle), Invocation::bare("bump")).unwrap();
        // Round trip so the host has pushed everything before we subscribe.
        timeout(TIMEOUT, bridge.invoke_async(Target::Service("Counter"), Invocation::bare("read")))
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = bridge.on_event(
            &handle,
            Arc::new(move |event: NativeEvent| {
                let _ = tx.send(event);
            }),
        );

        let first = timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, NativeEvent::Status { code: MediaStatus::Starting });
        let second = timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(second, NativeEvent::Position { seconds: 1.0 });
        let third = timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(third, NativeEvent::Position { seconds: 2.0 });
    }

    #[tokio::test]
    async fn test_cancelled_subscription_stops_delivery() {
        let bridge = connect();
        let handle = bridge.create("Counter", "x").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = bridge.on_event(
            &handle,
            Arc::new(move |event: NativeEvent| {
                let _ = tx.send(event);
            }),
        );
        // Starting status from create.
        timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();

        sub.cancel();
        bridge.invoke_sync(Target::Handle(&handle), Invocation::bare("bump")).unwrap();
        timeout(TIMEOUT, bridge.invoke_async(Target::Service("Counter"), Invocation::bare("read")))
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert!(rx.try_recv().is_err());
    }

    fn silent_connection() -> HostConnection {
        let (to_host, requests) = mpsc::unbounded_channel::<String>();
        let (replies, from_host) = mpsc::unbounded_channel::<String>();
        HostConnection {
            services: vec!["Counter".to_string()],
            to_host,
            from_host,
            task: tokio::spawn(async move {
                let _keep = (requests, replies);
                std::future::pending::<()>().await;
            }),
        }
    }

    #[tokio::test]
    async fn test_abandoned_calls_are_pruned() {
        let bridge = ExecBridge::connect(silent_connection());
        for _ in 0..10 {
            drop(bridge.invoke_async(Target::Service("Counter"), Invocation::bare("read")));
        }
        let waiting = bridge.invoke_async(Target::Service("Counter"), Invocation::bare("read"));
        assert_eq!(bridge.pending_calls(), 1);

        drop(waiting);
        assert_eq!(bridge.pending_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_waits_for_in_flight_callback() {
        let bridge = connect();
        let handle = bridge.create("Counter", "x").unwrap();

        let calls = Arc::new(AtomicU64::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let (c, f) = (calls.clone(), finished.clone());
        let sub = bridge.on_event(
            &handle,
            Arc::new(move |_event: NativeEvent| {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    let _ = entered_tx.lock().unwrap().send(());
                    std::thread::sleep(std::time::Duration::from_millis(200));
                    f.store(true, Ordering::SeqCst);
                }
            }),
        );
        bridge.invoke_sync(Target::Handle(&handle), Invocation::bare("bump")).unwrap();

        tokio::task::spawn_blocking(move || {
            entered_rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap();
            sub.cancel();
        })
        .await
        .unwrap();
        assert!(finished.load(Ordering::SeqCst));

        timeout(TIMEOUT, bridge.invoke_async(Target::Service("Counter"), Invocation::bare("read")))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sink_may_cancel_its_own_subscription() {
        let bridge = connect();
        let handle = bridge.create("Counter", "x").unwrap();

        let calls = Arc::new(AtomicU64::new(0));
        let holder: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let (c, h) = (calls.clone(), holder.clone());
        let sub = bridge.on_event(
            &handle,
            Arc::new(move |_event: NativeEvent| {
                c.fetch_add(1, Ordering::SeqCst);
                let sub = h.lock().unwrap().take();
                if let Some(sub) = sub {
                    sub.cancel();
                }
            }),
        );
        *holder.lock().unwrap() = Some(sub);

        bridge.invoke_sync(Target::Handle(&handle), Invocation::bare("bump")).unwrap();
        bridge.invoke_sync(Target::Handle(&handle), Invocation::bare("bump")).unwrap();
        timeout(TIMEOUT, bridge.invoke_async(Target::Service("Counter"), Invocation::bare("read")))
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(holder.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pending_calls_fail_when_host_stops() {
        let connection = NativeHost::new().with_plugin(CounterPlugin { count: 0 }).spawn();
        connection.task.abort();
        let bridge = ExecBridge::connect(connection);

        let result = timeout(TIMEOUT, bridge.invoke_async(Target::Service("Counter"), Invocation::bare("read")))
            .await
            .unwrap();
        // Either the send failed or the reader drained it; both settle once.
        match result {
            Ok(Err(BridgeError::Disconnected)) | Err(_) => {}
            other => panic!("expected disconnect, got {:?}", other),
        }
    }
}
