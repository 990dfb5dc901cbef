#![allow(dead_code)]

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use znode_mirror::BackoffPolicy;
use znode_mirror::Event;
use znode_mirror::Listener;
use znode_mirror::MemoryNamespace;
use znode_mirror::MemorySession;
use znode_mirror::MirrorConfig;
use znode_mirror::MirrorEngine;
use znode_mirror::Result;
use znode_mirror::RetryPolicies;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(3);

// Long enough for the dispatcher to drain anything still queued
pub const QUIET_WINDOW: Duration = Duration::from_millis(150);

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

pub fn test_config() -> MirrorConfig {
    let policy = BackoffPolicy {
        max_retries: 20,
        timeout_ms: 1000,
        base_delay_ms: 1,
        max_delay_ms: 20,
    };
    MirrorConfig {
        retry: RetryPolicies {
            rearm: policy,
            initial_load: policy,
        },
    }
}

/// Listener recording every event for later assertions.
pub struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
    expirations: AtomicUsize,
}

impl Listener for Recorder {
    fn process(
        &self,
        event: &Event,
    ) {
        let _ = self.tx.send(event.clone());
    }

    fn session_expired(&self) {
        self.expirations.fetch_add(1, Ordering::SeqCst);
    }
}

/// One engine watching a namespace, with its event stream.
pub struct TestMirror {
    pub engine: MirrorEngine<MemorySession>,
    pub recorder: Arc<Recorder>,
    events: mpsc::UnboundedReceiver<Event>,
}

impl TestMirror {
    /// Connects a new session, registers the recorder and engages the watch.
    ///
    /// The initial-load events are left in the stream.
    pub async fn start(namespace: &MemoryNamespace) -> Result<Self> {
        enable_logger();
        let (session, notifications) = namespace.connect();
        let engine = MirrorEngine::new(Arc::new(session), notifications, test_config());

        let (tx, events) = mpsc::unbounded_channel();
        let recorder = Arc::new(Recorder {
            tx,
            expirations: AtomicUsize::new(0),
        });
        engine.add_listener(recorder.clone());
        engine.watch().await?;

        Ok(Self {
            engine,
            recorder,
            events,
        })
    }

    /// Starts a mirror and discards the events of the initial load.
    pub async fn started(namespace: &MemoryNamespace) -> Result<Self> {
        let mut mirror = Self::start(namespace).await?;
        let loaded = mirror.engine.get_nodes().len();
        mirror.expect(loaded).await;
        Ok(mirror)
    }

    /// Waits for exactly `n` events.
    pub async fn expect(
        &mut self,
        n: usize,
    ) -> Vec<Event> {
        let mut events = Vec::with_capacity(n);
        while events.len() < n {
            match timeout(EVENT_TIMEOUT, self.events.recv()).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => panic!("event stream closed after {events:?}"),
                Err(_) => panic!("expected {n} events, got {events:?}"),
            }
        }
        events
    }

    /// Asserts that nothing else is delivered.
    pub async fn expect_quiet(&mut self) {
        if let Ok(Some(event)) = timeout(QUIET_WINDOW, self.events.recv()).await {
            panic!("unexpected event {event:?}");
        }
    }

    pub fn expirations(&self) -> usize {
        self.recorder.expirations.load(Ordering::SeqCst)
    }

    pub fn session_id(&self) -> i64 {
        self.engine.session_id()
    }
}

pub fn adds(paths: &[&str]) -> Vec<Event> {
    paths.iter().map(|p| Event::add(*p)).collect()
}

pub fn deletes(paths: &[&str]) -> Vec<Event> {
    paths.iter().map(|p| Event::delete(*p)).collect()
}
