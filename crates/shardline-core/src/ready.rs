//! Readiness barrier.
//!
//! After READY the gateway streams a shard's guilds as GUILD_CREATE events
//! with no end marker. A shard counts as ready once no guild has arrived for
//! the quiescence timeout. The client as a whole is ready once every shard
//! has connected and guild arrivals across all shards have gone quiet.

use crate::bus::EventBus;
use crate::events::Event;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info};

/// Default quiescence timeout.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(2);

struct ShardSlot {
    arrivals: Arc<Notify>,
    generation: u64,
    ready: bool,
}

/// Two-level "no new guilds for a while" barrier.
pub struct ReadyBarrier {
    bus: Arc<EventBus>,
    timeout: Duration,
    shards: DashMap<u32, ShardSlot>,
    generation: AtomicU64,
    reset_epoch: AtomicU64,
    client_arrivals: Arc<Notify>,
    client_started: AtomicBool,
    shards_connected: watch::Sender<bool>,
    ready: watch::Sender<bool>,
}

impl ReadyBarrier {
    #[must_use]
    pub fn new(bus: Arc<EventBus>, timeout: Duration) -> Self {
        Self {
            bus,
            timeout,
            shards: DashMap::new(),
            generation: AtomicU64::new(0),
            reset_epoch: AtomicU64::new(0),
            client_arrivals: Arc::new(Notify::new()),
            client_started: AtomicBool::new(false),
            shards_connected: watch::channel(false).0,
            ready: watch::channel(false).0,
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start waiting for a shard's guilds after its READY.
    ///
    /// The first call after construction or [`reset`](Self::reset) also
    /// starts the client-wide wait.
    pub fn start_shard(self: &Arc<Self>, shard: u32) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let arrivals = Arc::new(Notify::new());
        self.shards.insert(
            shard,
            ShardSlot {
                arrivals: Arc::clone(&arrivals),
                generation,
                ready: false,
            },
        );

        let barrier = Arc::clone(self);
        tokio::spawn(async move {
            quiesce(&arrivals, barrier.timeout).await;
            barrier.finish_shard(shard, generation);
        });

        if !self.client_started.swap(true, Ordering::AcqRel) {
            let barrier = Arc::clone(self);
            let epoch = generation;
            tokio::spawn(async move {
                let mut connected = barrier.shards_connected.subscribe();
                let open = connected.wait_for(|connected| *connected).await.is_ok();
                if !open {
                    return;
                }
                quiesce(&barrier.client_arrivals, barrier.timeout).await;
                barrier.finish_client(epoch);
            });
        }
    }

    /// Record a guild arriving on a shard.
    pub fn guild_arrived(&self, shard: u32) {
        if let Some(slot) = self.shards.get(&shard) {
            slot.arrivals.notify_one();
        }
        self.client_arrivals.notify_one();
    }

    /// Abandon a shard's pending wait, e.g. when its session was invalidated
    /// before it became ready.
    pub fn cancel_shard(&self, shard: u32) {
        if self.shards.remove(&shard).is_some() {
            debug!(shard, "Cancelled pending ready wait");
        }
    }

    /// Open the client-wide wait once every shard has connected.
    pub fn notify_shards_connected(&self) {
        self.shards_connected.send_replace(true);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    #[must_use]
    pub fn is_shard_ready(&self, shard: u32) -> bool {
        self.shards.get(&shard).is_some_and(|slot| slot.ready)
    }

    /// Wait until the client-wide ready event has fired.
    pub async fn wait_until_ready(&self) {
        let mut ready = self.ready.subscribe();
        let _ = ready.wait_for(|ready| *ready).await;
    }

    /// Forget all progress. Waits still in flight are discarded.
    pub fn reset(&self) {
        // Everything started before this point carries an older generation.
        self.generation.fetch_add(1, Ordering::Relaxed);
        self.reset_epoch
            .store(self.generation.load(Ordering::Relaxed), Ordering::Relaxed);
        self.shards.clear();
        self.client_started.store(false, Ordering::Release);
        self.shards_connected.send_replace(false);
        self.ready.send_replace(false);
    }

    fn finish_shard(&self, shard: u32, generation: u64) {
        let Some(mut slot) = self.shards.get_mut(&shard) else {
            return;
        };
        if slot.generation != generation || slot.ready {
            return;
        }
        slot.ready = true;
        drop(slot);

        info!(shard, "Shard ready");
        self.bus.invoke(Event::ShardReady { shard });
    }

    fn finish_client(&self, epoch: u64) {
        if epoch <= self.reset_epoch.load(Ordering::Relaxed) {
            return;
        }
        if self.ready.send_replace(true) {
            return;
        }
        info!("All shards ready");
        self.bus.invoke(Event::Ready);
    }
}

impl std::fmt::Debug for ReadyBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyBarrier")
            .field("timeout", &self.timeout)
            .field("shards", &self.shards.len())
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Wait until `arrivals` stays silent for `timeout`.
async fn quiesce(arrivals: &Notify, timeout: Duration) {
    while tokio::time::timeout(timeout, arrivals.notified())
        .await
        .is_ok()
    {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::{sleep, Instant};

    fn barrier() -> (Arc<ReadyBarrier>, tokio::sync::broadcast::Receiver<Arc<Event>>) {
        let bus = Arc::new(EventBus::new());
        let events = bus.subscribe();
        (
            Arc::new(ReadyBarrier::new(bus, DEFAULT_READY_TIMEOUT)),
            events,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_shard_ready_after_guilds_quiesce() {
        let (barrier, mut events) = barrier();
        barrier.start_shard(0);

        for _ in 0..3 {
            sleep(Duration::from_secs(1)).await;
            assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
            barrier.guild_arrived(0);
        }
        let last_guild = Instant::now();
        assert!(!barrier.is_shard_ready(0));

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind(), EventKind::ShardReady);
        assert_eq!(event.shard(), Some(0));
        assert!(last_guild.elapsed() >= DEFAULT_READY_TIMEOUT);
        assert!(barrier.is_shard_ready(0));

        sleep(Duration::from_secs(10)).await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        // Shards never reported as connected.
        assert!(!barrier.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_ready_fires_once() {
        let (barrier, mut events) = barrier();
        barrier.start_shard(0);
        barrier.start_shard(1);
        barrier.guild_arrived(0);
        barrier.guild_arrived(1);
        barrier.notify_shards_connected();

        barrier.wait_until_ready().await;
        assert!(barrier.is_ready());

        sleep(Duration::from_secs(10)).await;
        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(event.kind());
        }
        assert_eq!(
            kinds.iter().filter(|k| **k == EventKind::Ready).count(),
            1
        );
        assert_eq!(
            kinds.iter().filter(|k| **k == EventKind::ShardReady).count(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_shard_never_ready() {
        let (barrier, mut events) = barrier();
        barrier.start_shard(0);
        barrier.cancel_shard(0);

        sleep(Duration::from_secs(10)).await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert!(!barrier.is_shard_ready(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_discards_pending_waits() {
        let (barrier, mut events) = barrier();
        barrier.start_shard(0);
        barrier.notify_shards_connected();
        barrier.reset();

        sleep(Duration::from_secs(10)).await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert!(!barrier.is_ready());

        barrier.start_shard(0);
        barrier.notify_shards_connected();
        barrier.wait_until_ready().await;
        sleep(Duration::from_secs(1)).await;
        assert!(barrier.is_shard_ready(0));
    }
}
