//! Connection slot accounting and the idle-connection reaper
//!
//! reqwest keeps the actual sockets. This module bounds how many exchanges
//! may be in flight at once (globally and per destination host) and hands
//! out a [`ConnectionSlot`] guard for each one. Dropping the guard is the
//! only way a slot is released, so every exit path of a fetch gives its
//! slot back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

/// Per-host slot bookkeeping
#[derive(Debug)]
struct HostSlots {
    slots: Arc<Semaphore>,
    last_checkout: Instant,
}

/// Bounded set of connection slots shared by all fetches of one fetcher
#[derive(Debug)]
pub struct ConnectionPool {
    /// Global limit on checked-out slots
    total: Arc<Semaphore>,

    /// Limit on checked-out slots per destination host
    per_host_limit: usize,

    /// Per-host semaphores, keyed by `host:port`
    hosts: Mutex<HashMap<String, HostSlots>>,

    /// Number of slots currently checked out
    active: Arc<AtomicUsize>,

    /// How long an unused host entry survives
    idle_timeout: Duration,
}

/// A checked-out connection slot; released on drop
#[derive(Debug)]
pub struct ConnectionSlot {
    host: String,
    active: Arc<AtomicUsize>,
    _host_permit: OwnedSemaphorePermit,
    _total_permit: OwnedSemaphorePermit,
}

impl ConnectionSlot {
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!("Released connection slot for {}", self.host);
    }
}

impl ConnectionPool {
    pub fn new(max_total: usize, max_per_host: usize, idle_timeout: Duration) -> Self {
        Self {
            total: Arc::new(Semaphore::new(max_total)),
            per_host_limit: max_per_host,
            hosts: Mutex::new(HashMap::new()),
            active: Arc::new(AtomicUsize::new(0)),
            idle_timeout,
        }
    }

    /// Waits for a free slot towards `host`
    ///
    /// The per-host slot is taken before the global one so that callers
    /// queued on a busy host do not hold global capacity while they wait.
    ///
    /// # Returns
    ///
    /// * `Some(ConnectionSlot)` - A slot that stays reserved until dropped
    /// * `None` - The pool has been closed
    pub async fn checkout(&self, host: &str) -> Option<ConnectionSlot> {
        let host_slots = self.host_slots(host)?;
        let host_permit = host_slots.acquire_owned().await.ok()?;
        let total_permit = Arc::clone(&self.total).acquire_owned().await.ok()?;

        self.active.fetch_add(1, Ordering::SeqCst);

        Some(ConnectionSlot {
            host: host.to_string(),
            active: Arc::clone(&self.active),
            _host_permit: host_permit,
            _total_permit: total_permit,
        })
    }

    /// Returns the semaphore for `host`, creating it on first use
    fn host_slots(&self, host: &str) -> Option<Arc<Semaphore>> {
        let mut hosts = self.hosts.lock().ok()?;
        let entry = hosts.entry(host.to_string()).or_insert_with(|| HostSlots {
            slots: Arc::new(Semaphore::new(self.per_host_limit)),
            last_checkout: Instant::now(),
        });
        entry.last_checkout = Instant::now();
        Some(Arc::clone(&entry.slots))
    }

    /// Number of slots currently checked out
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of hosts with a live slot entry
    pub fn tracked_hosts(&self) -> usize {
        self.hosts.lock().map(|hosts| hosts.len()).unwrap_or(0)
    }

    /// Drops host entries that have no slot in use and have not been used
    /// for longer than the idle timeout. Returns how many were removed.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let Ok(mut hosts) = self.hosts.lock() else {
            return 0;
        };

        let before = hosts.len();
        hosts.retain(|_, entry| {
            let in_use = entry.slots.available_permits() < self.per_host_limit;
            in_use || now.saturating_duration_since(entry.last_checkout) < self.idle_timeout
        });
        before - hosts.len()
    }

    /// Closes the pool; pending and future checkouts return `None`
    pub fn close(&self) {
        self.total.close();
        if let Ok(hosts) = self.hosts.lock() {
            for entry in hosts.values() {
                entry.slots.close();
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.total.is_closed()
    }
}

/// Background task that periodically evicts idle host entries
#[derive(Debug)]
pub struct IdleReaper {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl IdleReaper {
    /// Spawns the reaper on the current tokio runtime
    pub fn spawn(pool: Arc<ConnectionPool>, interval: Duration) -> Self {
        let (stop, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = pool.evict_idle(Instant::now());
                        if evicted > 0 {
                            tracing::debug!("Evicted {} idle host entries", evicted);
                        }
                    }
                    changed = stop_rx.changed() => {
                        // A dropped sender means the owning fetcher is gone
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("Idle connection reaper stopped");
        });

        Self { stop, handle }
    }

    /// Signals the reaper to stop and waits for it to finish
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!("Idle connection reaper ended abnormally: {}", e);
        }
    }
}
