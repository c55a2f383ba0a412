//! Publish/subscribe dispatcher built on the [`EventLog`].
//!
//! `publish` appends to the log synchronously and then enqueues the event
//! on a bounded channel. A single consumer, running on the blocking pool of
//! a small Tokio runtime owned by the bus, pulls events in publish order and
//! invokes the handlers registered for that event type, in registration
//! order.
//!
//! Dispatch is best-effort: a handler returning `Err` or panicking is
//! logged and counted, and the remaining handlers and events still run.
//! Because the log write happens before enqueueing, replaying the log
//! reproduces publish order no matter how far behind the consumer is.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::base_event::{Event, EventType};
use super::event_log::{EventLog, EventLogError};

// ---------------------------------------------------------------------------
// Handler interface
// ---------------------------------------------------------------------------

/// Error type handlers may return; it is logged and counted, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A subscriber on the bus.
pub trait EventHandler: Send + Sync {
    /// Handle one event. Errors are counted in the bus statistics.
    fn handle(&self, event: &Event) -> Result<(), HandlerError>;

    /// Human-readable name used in logs.
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Adapter turning a closure into an [`EventHandler`].
pub struct FnHandler<F> {
    name: String,
    func: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        (self.func)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Unique identifier for a subscription, used to unsubscribe.
#[derive(Clone)]
pub struct HandlerId {
    /// Human-readable name.
    pub name: String,
    /// Unique numeric ID (monotonically increasing).
    id: u64,
}

impl fmt::Debug for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerId({}:{})", self.id, self.name)
    }
}

impl PartialEq for HandlerId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for HandlerId {}

static HANDLER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

impl HandlerId {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: HANDLER_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }
}

#[derive(Clone)]
struct HandlerEntry {
    id: HandlerId,
    handler: Arc<dyn EventHandler>,
}

// ---------------------------------------------------------------------------
// Config / stats / errors
// ---------------------------------------------------------------------------

/// Event bus tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of the dispatch queue.
    pub queue_capacity: usize,
    /// How long `stop` waits for the consumer to drain, in milliseconds.
    pub shutdown_timeout_ms: u64,
    /// Record published events in an [`EventLog`].
    pub enable_logging: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            shutdown_timeout_ms: 2000,
            enable_logging: true,
        }
    }
}

/// Point-in-time bus statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    pub published: u64,
    pub processed: u64,
    pub errors: u64,
    /// Events logged but never dispatched (queue full, bus stopped, or
    /// abandoned at shutdown).
    pub dropped: u64,
    pub queue_size: usize,
    pub subscriber_types: usize,
    pub event_log_size: usize,
}

/// Errors raised by bus lifecycle operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The dispatch runtime could not be created.
    #[error("failed to start event bus runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct BusShared {
    subscribers: RwLock<HashMap<EventType, Vec<HandlerEntry>>>,
    log: Option<EventLog>,
    published: AtomicU64,
    processed: AtomicU64,
    errors: AtomicU64,
    dropped: AtomicU64,
    /// Enqueued events not yet fully dispatched.
    queued: AtomicUsize,
    running: AtomicBool,
}

impl BusShared {
    fn dispatch(&self, event: &Event) {
        // Snapshot the handler list so handlers may (un)subscribe freely.
        let entries: Vec<HandlerEntry> = match self.subscribers.read().get(&event.event_type()) {
            Some(v) => v.clone(),
            None => {
                log::debug!(
                    "[EventBus] No subscribers for event type: {}",
                    event.event_type()
                );
                return;
            }
        };

        for entry in entries {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                entry.handler.handle(event)
            }));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::error!(
                        "[EventBus] Error in event handler {} for event {}: {}",
                        entry.handler.name(),
                        event.event_type(),
                        e
                    );
                    self.errors.fetch_add(1, Ordering::Relaxed);
                }
                Err(panic) => {
                    log::error!(
                        "[EventBus] Handler {} panicked on event {}: {:?}",
                        entry.handler.name(),
                        event.event_type(),
                        panic
                    );
                    self.errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

/// Consumer loop. Once `abandoned` is set, remaining events are discarded
/// and counted as dropped instead of dispatched.
fn consume(shared: Arc<BusShared>, mut rx: mpsc::Receiver<Event>, abandoned: Arc<AtomicBool>) {
    log::info!("[EventBus] Event processing loop started");
    while let Some(event) = rx.blocking_recv() {
        if abandoned.load(Ordering::Acquire) {
            shared.dropped.fetch_add(1, Ordering::Relaxed);
        } else {
            shared.dispatch(&event);
            shared.processed.fetch_add(1, Ordering::Relaxed);
        }
        shared.queued.fetch_sub(1, Ordering::AcqRel);
    }
    log::info!("[EventBus] Event processing loop stopped");
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Kernel event bus: log-first publish, single background consumer.
///
/// The bus owns its dispatch runtime, so [`start`](Self::start) and
/// [`stop`](Self::stop) are meant to be called from synchronous code.
pub struct EventBus {
    shared: Arc<BusShared>,
    config: BusConfig,
    sender: Mutex<Option<mpsc::Sender<Event>>>,
    receiver: Mutex<Option<mpsc::Receiver<Event>>>,
    runtime: Mutex<Option<Runtime>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Abandon flag of the current consumer.
    abandoned: Mutex<Arc<AtomicBool>>,
}

impl EventBus {
    /// Create a stopped bus. Events published before [`start`](Self::start)
    /// are queued (up to capacity) and dispatched once the consumer runs.
    pub fn new(config: BusConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let shared = Arc::new(BusShared {
            subscribers: RwLock::new(HashMap::new()),
            log: config.enable_logging.then(EventLog::new),
            published: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            queued: AtomicUsize::new(0),
            running: AtomicBool::new(false),
        });
        Self {
            shared,
            config,
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            runtime: Mutex::new(None),
            worker: Mutex::new(None),
            abandoned: Mutex::new(Arc::new(AtomicBool::new(false))),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start the background consumer.
    pub fn start(&self) -> Result<(), BusError> {
        if self.shared.running.load(Ordering::Acquire) {
            log::warn!("[EventBus] Already running");
            return Ok(());
        }

        let rx = match self.receiver.lock().take() {
            Some(rx) => rx,
            None => {
                let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
                *self.sender.lock() = Some(tx);
                rx
            }
        };

        // Handlers run on the blocking pool so the worker thread stays free
        // to drive the shutdown timer.
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(1)
            .thread_name("persona-events")
            .enable_time()
            .build()?;
        let abandoned = Arc::new(AtomicBool::new(false));
        *self.abandoned.lock() = Arc::clone(&abandoned);
        let shared = Arc::clone(&self.shared);
        let handle = runtime.spawn_blocking(move || consume(shared, rx, abandoned));

        *self.worker.lock() = Some(handle);
        *self.runtime.lock() = Some(runtime);
        self.shared.running.store(true, Ordering::Release);
        log::info!("[EventBus] Started");
        Ok(())
    }

    /// Stop the consumer.
    ///
    /// Closes the queue and waits up to `shutdown_timeout_ms` for the
    /// consumer to drain what is already queued, then returns regardless.
    /// After a timeout the in-flight handler is left to finish on its own
    /// thread and every event still queued is discarded and counted as
    /// dropped. Log entries are never affected.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }

        // Closing the sender ends the consumer loop once the queue is empty.
        drop(self.sender.lock().take());

        let worker = self.worker.lock().take();
        let runtime = self.runtime.lock().take();
        if let (Some(worker), Some(runtime)) = (worker, runtime) {
            let timeout = Duration::from_millis(self.config.shutdown_timeout_ms);
            let drained = if tokio::runtime::Handle::try_current().is_ok() {
                log::warn!("[EventBus] stop() called inside an async context; not waiting for drain");
                false
            } else {
                runtime
                    .block_on(async { tokio::time::timeout(timeout, worker).await })
                    .is_ok()
            };
            if !drained {
                log::warn!(
                    "[EventBus] Consumer did not exit within {:?}; abandoning queue",
                    timeout
                );
                self.abandoned.lock().store(true, Ordering::Release);
            }
            runtime.shutdown_background();
        }

        // Re-arm so the bus can be started again.
        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        *self.sender.lock() = Some(tx);
        *self.receiver.lock() = Some(rx);

        log::info!("[EventBus] Stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Block until every enqueued event has been dispatched, or `timeout`
    /// elapses. Returns `true` when the queue is idle.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.shared.queued.load(Ordering::Acquire) > 0 {
            if !self.is_running() || Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    // -----------------------------------------------------------------------
    // Subscription
    // -----------------------------------------------------------------------

    /// Register a handler for `event_type`. Handlers run in registration order.
    pub fn subscribe(&self, event_type: EventType, handler: Arc<dyn EventHandler>) -> HandlerId {
        let id = HandlerId::new(handler.name());
        log::debug!("[EventBus] Subscribed to {}: {}", event_type, handler.name());
        self.shared
            .subscribers
            .write()
            .entry(event_type)
            .or_default()
            .push(HandlerEntry {
                id: id.clone(),
                handler,
            });
        id
    }

    /// Remove the subscription identified by `handler_id`.
    ///
    /// Returns `false` when no such subscription exists.
    pub fn unsubscribe(&self, event_type: EventType, handler_id: &HandlerId) -> bool {
        let mut map = self.shared.subscribers.write();
        let Some(entries) = map.get_mut(&event_type) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != *handler_id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            map.remove(&event_type);
        }
        if removed {
            log::debug!("[EventBus] Unsubscribed {:?} from {}", handler_id, event_type);
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    /// Publish an event: append to the log, then enqueue for dispatch.
    ///
    /// Never blocks. When the queue is full (or the bus was stopped) the
    /// event stays in the log but is not dispatched, and `dropped` grows.
    pub fn publish(&self, event: Event) {
        log::debug!(
            "[EventBus] Event published: {} from {} (id={})",
            event.event_type(),
            event.source(),
            event.id()
        );

        // The sender lock serializes publishers, so log order == queue order.
        let sender = self.sender.lock();
        if let Some(log) = &self.shared.log {
            log.append(event.clone());
        }
        self.shared.published.fetch_add(1, Ordering::Relaxed);

        let Some(tx) = sender.as_ref() else {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        self.shared.queued.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = tx.try_send(event) {
            self.shared.queued.fetch_sub(1, Ordering::AcqRel);
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            log::warn!("[EventBus] Event not enqueued for dispatch: {}", e);
        }
    }

    // -----------------------------------------------------------------------
    // Introspection / persistence
    // -----------------------------------------------------------------------

    pub fn get_stats(&self) -> BusStats {
        let subscriber_types = self
            .shared
            .subscribers
            .read()
            .values()
            .filter(|v| !v.is_empty())
            .count();
        BusStats {
            published: self.shared.published.load(Ordering::Relaxed),
            processed: self.shared.processed.load(Ordering::Relaxed),
            errors: self.shared.errors.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            queue_size: self.shared.queued.load(Ordering::Acquire),
            subscriber_types,
            event_log_size: self.shared.log.as_ref().map_or(0, EventLog::len),
        }
    }

    /// The replay log, if logging is enabled.
    pub fn event_log(&self) -> Option<&EventLog> {
        self.shared.log.as_ref()
    }

    pub fn save_event_log(&self, path: &Path) -> Result<usize, EventLogError> {
        match &self.shared.log {
            Some(log) => log.save_to_file(path),
            None => {
                log::warn!("[EventBus] EventLog not enabled, cannot save");
                Ok(0)
            }
        }
    }

    pub fn load_event_log(&self, path: &Path) -> Result<usize, EventLogError> {
        match &self.shared.log {
            Some(log) => log.load_from_file(path),
            None => {
                log::warn!("[EventBus] EventLog not enabled, cannot load");
                Ok(0)
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.config)
            .field("stats", &self.get_stats())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
