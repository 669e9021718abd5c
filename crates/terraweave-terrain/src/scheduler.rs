//! Debounced background regeneration.
//!
//! Every request bumps a per-tile generation token and is handed to a single
//! worker thread, which waits out the debounce delay and then runs the handler
//! only if the token is still the latest one. A burst of edits therefore
//! collapses into one regeneration, and a tile forgotten while its request is
//! pending is simply skipped.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use dashmap::DashMap;
use tracing::debug;

/// Default delay between the last request and the regeneration.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug)]
struct TileSlot {
    token: u64,
    in_progress: bool,
}

struct Request<K> {
    key: K,
    token: u64,
    due: Instant,
}

/// Coalesces regeneration requests per tile and runs them off-thread.
pub struct RegenerationScheduler<K>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
{
    request_sender: Option<Sender<Request<K>>>,
    completed_receiver: Receiver<K>,
    slots: Arc<DashMap<K, TileSlot>>,
    next_token: AtomicU64,
    debounce: Duration,
    worker: Option<JoinHandle<()>>,
}

impl<K> RegenerationScheduler<K>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
{
    /// Start the worker thread. `handler` runs once per settled request.
    pub fn new<F>(debounce: Duration, mut handler: F) -> std::io::Result<Self>
    where
        F: FnMut(K) + Send + 'static,
    {
        let (request_sender, request_receiver) = unbounded::<Request<K>>();
        let (completed_sender, completed_receiver) = unbounded::<K>();
        let slots: Arc<DashMap<K, TileSlot>> = Arc::new(DashMap::new());
        let worker_slots = Arc::clone(&slots);

        let worker = std::thread::Builder::new()
            .name("terrain-regen".into())
            .spawn(move || {
                while let Ok(request) = request_receiver.recv() {
                    let now = Instant::now();
                    if request.due > now {
                        std::thread::sleep(request.due - now);
                    }

                    let current = worker_slots
                        .get(&request.key)
                        .is_some_and(|slot| slot.token == request.token);
                    if !current {
                        debug!(tile = ?request.key, token = request.token, "stale request dropped");
                        continue;
                    }

                    handler(request.key);

                    if let Some(mut slot) = worker_slots.get_mut(&request.key)
                        && slot.token == request.token
                    {
                        slot.in_progress = false;
                    }
                    let _ = completed_sender.send(request.key);
                }
            })?;

        Ok(Self {
            request_sender: Some(request_sender),
            completed_receiver,
            slots,
            next_token: AtomicU64::new(1),
            debounce,
            worker: Some(worker),
        })
    }

    /// Scheduler with [`DEFAULT_DEBOUNCE`].
    pub fn with_default_debounce<F>(handler: F) -> std::io::Result<Self>
    where
        F: FnMut(K) + Send + 'static,
    {
        Self::new(DEFAULT_DEBOUNCE, handler)
    }

    /// Ask for `key` to be regenerated after the debounce delay.
    ///
    /// Returns the request's token; earlier pending tokens for the same tile
    /// become stale.
    pub fn request(&self, key: K) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.slots.insert(
            key,
            TileSlot {
                token,
                in_progress: true,
            },
        );
        if let Some(sender) = &self.request_sender {
            let _ = sender.send(Request {
                key,
                token,
                due: Instant::now() + self.debounce,
            });
        }
        token
    }

    /// Abandon any pending request for `key` (the tile is gone).
    pub fn forget(&self, key: &K) {
        self.slots.remove(key);
    }

    /// `true` from a request until its handler has finished.
    pub fn is_in_progress(&self, key: &K) -> bool {
        self.slots.get(key).is_some_and(|slot| slot.in_progress)
    }

    /// Latest token issued for `key`.
    pub fn current_token(&self, key: &K) -> Option<u64> {
        self.slots.get(key).map(|slot| slot.token)
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Tiles whose handler finished since the last call.
    pub fn drain_completed(&self) -> Vec<K> {
        self.completed_receiver.try_iter().collect()
    }

    /// Wait up to `timeout` for the next finished tile.
    pub fn wait_completed(&self, timeout: Duration) -> Option<K> {
        match self.completed_receiver.recv_timeout(timeout) {
            Ok(key) => Some(key),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl<K> Drop for RegenerationScheduler<K>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.request_sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
