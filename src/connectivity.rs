use crate::events::EventBus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Probe used to determine liveness — typically "call the remote transport's
/// trivial endpoint". Abstracted so the monitor can be unit-tested without a
/// live network dependency.
#[async_trait]
pub trait LivenessCheck: Send + Sync {
    async fn check(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

#[derive(Debug, Clone)]
pub struct ConnectivityStatus {
    pub is_online: bool,
    pub last_successful_at: Option<DateTime<Utc>>,
}

impl ConnectivityStatus {
    pub fn time_since_last_success(&self) -> Option<chrono::Duration> {
        self.last_successful_at.map(|t| Utc::now() - t)
    }
}

/// Periodic liveness probe emitting edge events only — successive probes of
/// the same polarity are coalesced. Starts optimistically online so a fresh
/// engine doesn't treat startup as an offline transition.
pub struct ConnectivityMonitor {
    is_online: AtomicBool,
    last_successful_at: RwLock<Option<DateTime<Utc>>>,
    events: EventBus<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        Self {
            is_online: AtomicBool::new(true),
            last_successful_at: RwLock::new(None),
            events: EventBus::new(),
        }
    }

    pub async fn status(&self) -> ConnectivityStatus {
        ConnectivityStatus {
            is_online: self.is_online.load(Ordering::SeqCst),
            last_successful_at: *self.last_successful_at.read().await,
        }
    }

    pub fn is_online(&self) -> bool {
        self.is_online.load(Ordering::SeqCst)
    }

    /// Manual override — used in tests and by the sync engine when it
    /// observes an unrecoverable transport failure.
    pub fn set_online(&self, online: bool) {
        let previous = self.is_online.swap(online, Ordering::SeqCst);
        if previous != online {
            self.events.emit(if online { ConnectivityEvent::Online } else { ConnectivityEvent::Offline });
        }
    }

    async fn record_probe(&self, succeeded: bool) {
        if succeeded {
            *self.last_successful_at.write().await = Some(Utc::now());
        }
        self.set_online(succeeded);
    }

    pub fn subscribe(&self, listener: impl Fn(ConnectivityEvent) + Send + Sync + 'static) {
        self.events.subscribe(listener);
    }

    /// Spawn the periodic probe loop. The returned handle should be aborted
    /// on shutdown.
    pub fn spawn_probe_loop(self: Arc<Self>, check: Arc<dyn LivenessCheck>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let succeeded = check.check().await;
                debug!(succeeded, "connectivity probe completed");
                self.record_probe(succeeded).await;
                if !succeeded {
                    warn!("connectivity probe failed, monitor reports offline");
                }
            }
        })
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Liveness check backed by the remote transport: any successful response
/// (even an error status handled upstream) counts, so this issues a cheap
/// read against the board list endpoint.
pub struct TransportLivenessCheck {
    transport: Arc<dyn crate::transport::Transport>,
    probe_path: String,
}

impl TransportLivenessCheck {
    pub fn new(transport: Arc<dyn crate::transport::Transport>, probe_path: impl Into<String>) -> Self {
        Self {
            transport,
            probe_path: probe_path.into(),
        }
    }
}

#[async_trait]
impl LivenessCheck for TransportLivenessCheck {
    async fn check(&self) -> bool {
        self.transport
            .send(crate::transport::RemoteRequest::get(self.probe_path.clone()))
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct AlwaysUp;
    #[async_trait]
    impl LivenessCheck for AlwaysUp {
        async fn check(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_starts_online() {
        let monitor = ConnectivityMonitor::new();
        assert!(monitor.status().await.is_online);
    }

    #[tokio::test]
    async fn test_set_online_emits_only_on_transition() {
        let monitor = ConnectivityMonitor::new();
        let transitions = Arc::new(AtomicUsize::new(0));
        let transitions_clone = transitions.clone();
        monitor.subscribe(move |_| {
            transitions_clone.fetch_add(1, AtomicOrdering::SeqCst);
        });

        monitor.set_online(true);
        assert_eq!(transitions.load(AtomicOrdering::SeqCst), 0);

        monitor.set_online(false);
        monitor.set_online(false);
        assert_eq!(transitions.load(AtomicOrdering::SeqCst), 1);

        monitor.set_online(true);
        assert_eq!(transitions.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_record_probe_stamps_last_successful_at() {
        let monitor = ConnectivityMonitor::new();
        monitor.record_probe(true).await;
        assert!(monitor.status().await.last_successful_at.is_some());
    }
}
