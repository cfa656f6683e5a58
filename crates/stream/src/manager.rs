use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use streamer_common::{EntityId, LiveHandle, ObserverId};

use crate::category::{PickupPayload, VehiclePayload};
use crate::config::{ConfigError, StreamConfig};
use crate::entity::{EntityPayload, Lifecycle, StoredEntity};
use crate::grid::GridIndex;
use crate::index::{IndexId, SpatialIndex};
use crate::platform::{LivePlatform, StreamListener};
use crate::respawn::RespawnQueue;
use crate::streamer::{EntityStreamer, StreamHits, StreamRequest};

/// A record produced by every visibility or lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamEvent {
    Entered { observer: ObserverId, entity: EntityId },
    Left { observer: ObserverId, entity: EntityId },
    Consumed { entity: EntityId, respawn_at: Duration },
    Respawned { entity: EntityId },
    Disposed { entity: EntityId },
}

/// Per-pass streaming statistics for instrumentation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassStats {
    pub entered: usize,
    pub left: usize,
    /// Newcomers the platform refused to create.
    pub refused: usize,
    /// Index hits whose entity was deleted while the query was in flight.
    pub stale: usize,
    /// Live instances held by the observer after the pass.
    pub live: usize,
    pub elapsed: Duration,
}

impl PassStats {
    fn merge(&mut self, other: &PassStats) {
        self.entered += other.entered;
        self.left += other.left;
        self.refused += other.refused;
        self.stale += other.stale;
        self.live += other.live;
        self.elapsed += other.elapsed;
    }
}

/// Entities currently materialised for one observer.
#[derive(Debug, Clone, Default)]
pub struct VisibleSet {
    live: BTreeMap<IndexId, LiveHandle>,
}

impl VisibleSet {
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn contains(&self, handle: IndexId) -> bool {
        self.live.contains_key(&handle)
    }

    pub fn live_handle(&self, handle: IndexId) -> Option<LiveHandle> {
        self.live.get(&handle).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IndexId, LiveHandle)> + '_ {
        self.live.iter().map(|(h, l)| (*h, *l))
    }
}

/// A reconciliation pass whose index query is still outstanding.
pub struct PendingPass {
    observer: ObserverId,
    request: StreamRequest,
}

impl PendingPass {
    pub fn observer(&self) -> ObserverId {
        self.observer
    }
}

impl Future for PendingPass {
    type Output = PassHits;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<PassHits> {
        let this = self.get_mut();
        let observer = this.observer;
        Pin::new(&mut this.request)
            .poll(cx)
            .map(|hits| PassHits { observer, hits })
    }
}

/// Completed query of a [`PendingPass`], ready for [`StreamingManager::finish_pass`].
pub struct PassHits {
    observer: ObserverId,
    hits: StreamHits,
}

/// Streams one category of entities to observers.
///
/// Each pass queries the streamer around an observer, diffs the answer against
/// what the observer already has, destroys dropouts and creates newcomers on
/// the host platform. The cap on live instances per observer is enforced here
/// and nowhere else; collaborators never create live instances themselves.
///
/// Consumable entities (see [`EntityPayload::respawn_delay`]) leave every
/// observer when consumed and come back after their delay. The respawn timer
/// is never cancelled; it checks on wake that the entity still exists.
pub struct StreamingManager<P, H, L = (), I = GridIndex> {
    streamer: EntityStreamer<P, I>,
    platform: H,
    listener: L,
    observers: BTreeMap<ObserverId, VisibleSet>,
    /// How many observers hold a live instance of each entity.
    viewers: HashMap<IndexId, usize>,
    respawns: RespawnQueue,
    events: Vec<StreamEvent>,
    stats: PassStats,
}

pub type PickupManager<H, L = ()> = StreamingManager<PickupPayload, H, L>;
pub type VehicleManager<H, L = ()> = StreamingManager<VehiclePayload, H, L>;

impl<P, H> StreamingManager<P, H>
where
    P: EntityPayload,
    H: LivePlatform<P>,
{
    pub fn new(config: StreamConfig, platform: H) -> Result<Self, ConfigError> {
        Ok(Self::with_parts(EntityStreamer::new(config)?, platform, ()))
    }
}

impl<P, H, L, I> StreamingManager<P, H, L, I>
where
    P: EntityPayload,
    H: LivePlatform<P>,
    L: StreamListener<P>,
    I: SpatialIndex,
{
    pub fn with_parts(streamer: EntityStreamer<P, I>, platform: H, listener: L) -> Self {
        Self {
            streamer,
            platform,
            listener,
            observers: BTreeMap::new(),
            viewers: HashMap::new(),
            respawns: RespawnQueue::new(),
            events: Vec::new(),
            stats: PassStats::default(),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        self.streamer.config()
    }

    /// Start streaming an entity. Returns false on a duplicate.
    pub fn add(&mut self, entity: StoredEntity<P>) -> bool {
        self.streamer.add(entity)
    }

    /// Permanently remove an entity, destroying its live instances first.
    pub fn delete(&mut self, id: EntityId) -> bool {
        let Some(handle) = self.streamer.handle_of(id) else {
            return false;
        };
        self.hide_everywhere(handle);
        self.viewers.remove(&handle);
        let removed = self.streamer.delete(id);
        if removed {
            tracing::debug!(category = P::CATEGORY, entity = %id, "entity disposed");
            self.events.push(StreamEvent::Disposed { entity: id });
        }
        removed
    }

    /// Issue the index query for one observer's pass.
    ///
    /// The observer is registered if it is new. The query asks for extra hits
    /// to make up for consumed entities, which are filtered out afterwards.
    pub fn begin_pass(&mut self, observer: ObserverId, position: Vec3) -> PendingPass {
        self.observers.entry(observer).or_default();
        let cap = self.streamer.config().max_visible;
        let request = self
            .streamer
            .stream_for_player(position, Some(cap.saturating_add(self.respawns.len())));
        PendingPass { observer, request }
    }

    /// Reconcile an observer's live set against a completed query.
    pub fn finish_pass(&mut self, done: PassHits) -> PassStats {
        let PassHits { observer, hits } = done;
        let _span =
            tracing::info_span!("stream_pass", category = P::CATEGORY, %observer).entered();
        let start = Instant::now();

        if !self.observers.contains_key(&observer) {
            tracing::debug!("observer removed while pass was in flight");
            self.streamer.settle();
            return PassStats::default();
        }

        let resolved = self.streamer.resolve(hits);
        let cap = self.streamer.config().max_visible;
        let desired: Vec<IndexId> = resolved
            .handles
            .into_iter()
            .filter(|h| self.streamer.get(*h).is_some_and(|e| !e.is_consumed()))
            .take(cap)
            .collect();
        let wanted: BTreeSet<IndexId> = desired.iter().copied().collect();

        let mut stats = PassStats {
            stale: resolved.stale,
            ..PassStats::default()
        };

        // Dropouts first so their platform slots are free for newcomers.
        let dropouts: Vec<IndexId> = self.observers[&observer]
            .live
            .keys()
            .filter(|h| !wanted.contains(h))
            .copied()
            .collect();
        for handle in dropouts {
            if self.hide(observer, handle) {
                stats.left += 1;
            }
        }

        for handle in desired {
            if self.observers[&observer].contains(handle) {
                continue;
            }
            if self.show(observer, handle) {
                stats.entered += 1;
            } else {
                stats.refused += 1;
            }
        }

        stats.live = self.observers[&observer].len();
        debug_assert!(stats.live <= cap, "live set exceeds cap");
        stats.elapsed = start.elapsed();

        tracing::trace!(
            entered = stats.entered,
            left = stats.left,
            refused = stats.refused,
            stale = stats.stale,
            live = stats.live,
            "pass complete"
        );
        self.stats = stats.clone();
        stats
    }

    /// Run one full pass for an observer.
    pub async fn stream_observer(&mut self, observer: ObserverId, position: Vec3) -> PassStats {
        let pending = self.begin_pass(observer, position);
        let done = pending.await;
        self.finish_pass(done)
    }

    /// Wake due respawns, then run a pass for every observer.
    ///
    /// All queries are issued before any is awaited. Returns the summed stats.
    pub async fn update(&mut self, observers: &[(ObserverId, Vec3)], now: Duration) -> PassStats {
        self.tick_respawns(now);
        let pending: Vec<PendingPass> = observers
            .iter()
            .map(|(observer, position)| self.begin_pass(*observer, *position))
            .collect();
        let mut total = PassStats::default();
        for pass in pending {
            let done = pass.await;
            total.merge(&self.finish_pass(done));
        }
        total
    }

    /// Return consumed entities whose delay has elapsed to `Indexed`.
    pub fn tick_respawns(&mut self, now: Duration) -> usize {
        let mut woken = 0;
        for handle in self.respawns.due(now) {
            let Some(entity) = self.streamer.get_mut(handle) else {
                tracing::debug!(?handle, "respawn timer fired for disposed entity");
                continue;
            };
            match entity.lifecycle() {
                Lifecycle::Consumed { respawn_at } if respawn_at <= now => {
                    entity.set_lifecycle(Lifecycle::Indexed);
                    let id = entity.id();
                    tracing::debug!(category = P::CATEGORY, entity = %id, "respawned");
                    self.events.push(StreamEvent::Respawned { entity: id });
                    woken += 1;
                }
                state => tracing::debug!(?handle, ?state, "stale respawn timer"),
            }
        }
        woken
    }

    /// Consume a live entity. Returns false if it is unknown, not consumable
    /// or not live for anyone.
    pub fn consume(&mut self, id: EntityId, now: Duration) -> bool {
        match self.streamer.handle_of(id) {
            Some(handle) => self.consume_handle(handle, now),
            None => false,
        }
    }

    /// Consume the entity behind a live instance the platform reported.
    pub fn consume_live(&mut self, observer: ObserverId, live: LiveHandle, now: Duration) -> bool {
        let handle = self
            .observers
            .get(&observer)
            .and_then(|set| set.iter().find(|(_, l)| *l == live).map(|(h, _)| h));
        match handle {
            Some(handle) => self.consume_handle(handle, now),
            None => false,
        }
    }

    /// Destroy everything an observer holds and forget the observer.
    pub fn remove_observer(&mut self, observer: ObserverId) -> usize {
        let Some(set) = self.observers.get(&observer) else {
            return 0;
        };
        let handles: Vec<IndexId> = set.live.keys().copied().collect();
        let count = handles.len();
        for handle in handles {
            self.hide(observer, handle);
        }
        self.observers.remove(&observer);
        count
    }

    /// Destroy every live instance and forget every entity.
    pub fn clear(&mut self) {
        let observers: Vec<ObserverId> = self.observers.keys().copied().collect();
        for observer in observers {
            self.remove_observer(observer);
        }
        let ids: Vec<EntityId> = self.streamer.iter().map(|(_, e)| e.id()).collect();
        self.events
            .extend(ids.into_iter().map(|entity| StreamEvent::Disposed { entity }));
        self.viewers.clear();
        self.respawns.clear();
        self.streamer.clear();
    }

    /// Clear and close the underlying streamer for good.
    pub fn dispose(&mut self) {
        self.clear();
        self.streamer.dispose();
    }

    /// Compact the index; see [`EntityStreamer::optimise`].
    pub fn optimise(&mut self) -> bool {
        self.streamer.optimise()
    }

    pub fn visible(&self, observer: ObserverId) -> Option<&VisibleSet> {
        self.observers.get(&observer)
    }

    pub fn is_live_for(&self, observer: ObserverId, id: EntityId) -> bool {
        match (self.observers.get(&observer), self.streamer.handle_of(id)) {
            (Some(set), Some(handle)) => set.contains(handle),
            _ => false,
        }
    }

    pub fn lifecycle(&self, id: EntityId) -> Option<Lifecycle> {
        self.streamer.entity(id).map(StoredEntity::lifecycle)
    }

    pub fn observers(&self) -> impl Iterator<Item = ObserverId> + '_ {
        self.observers.keys().copied()
    }

    pub fn streamer(&self) -> &EntityStreamer<P, I> {
        &self.streamer
    }

    pub fn platform(&self) -> &H {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut H {
        &mut self.platform
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// Statistics of the most recent pass.
    pub fn stats(&self) -> &PassStats {
        &self.stats
    }

    /// Pending respawn timers, stale ones included.
    pub fn pending_respawns(&self) -> usize {
        self.respawns.len()
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[StreamEvent] {
        &self.events
    }

    fn consume_handle(&mut self, handle: IndexId, now: Duration) -> bool {
        let Some(entity) = self.streamer.get(handle) else {
            return false;
        };
        let id = entity.id();
        let Some(delay) = entity.payload().respawn_delay() else {
            tracing::debug!(category = P::CATEGORY, entity = %id, "entity is not consumable");
            return false;
        };
        if entity.lifecycle() != Lifecycle::Live {
            tracing::debug!(entity = %id, state = ?entity.lifecycle(), "only live entities can be consumed");
            return false;
        }

        self.hide_everywhere(handle);
        let respawn_at = now + delay;
        if let Some(entity) = self.streamer.get_mut(handle) {
            entity.set_lifecycle(Lifecycle::Consumed { respawn_at });
        }
        self.respawns.schedule(respawn_at, handle);
        tracing::debug!(category = P::CATEGORY, entity = %id, ?respawn_at, "consumed");
        self.events.push(StreamEvent::Consumed {
            entity: id,
            respawn_at,
        });
        true
    }

    fn hide_everywhere(&mut self, handle: IndexId) -> usize {
        let holders: Vec<ObserverId> = self
            .observers
            .iter()
            .filter(|(_, set)| set.contains(handle))
            .map(|(o, _)| *o)
            .collect();
        let count = holders.len();
        for observer in holders {
            self.hide(observer, handle);
        }
        count
    }

    /// Destroy `observer`'s instance of `handle` and fire the leave callback.
    fn hide(&mut self, observer: ObserverId, handle: IndexId) -> bool {
        let Some(live) = self
            .observers
            .get_mut(&observer)
            .and_then(|set| set.live.remove(&handle))
        else {
            return false;
        };
        self.platform.destroy(observer, live);

        let remaining = match self.viewers.get_mut(&handle) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            self.viewers.remove(&handle);
            if let Some(entity) = self.streamer.get_mut(handle) {
                if entity.lifecycle() == Lifecycle::Live {
                    entity.set_lifecycle(Lifecycle::NotVisible);
                }
            }
        }

        if let Some(entity) = self.streamer.get(handle) {
            if entity.wants_callbacks() {
                self.listener.on_leave(observer, entity);
            }
            tracing::debug!(category = P::CATEGORY, entity = %entity.id(), "left");
            self.events.push(StreamEvent::Left {
                observer,
                entity: entity.id(),
            });
        }
        true
    }

    /// Create `observer`'s instance of `handle` and fire the enter callback.
    fn show(&mut self, observer: ObserverId, handle: IndexId) -> bool {
        let Some(entity) = self.streamer.get(handle) else {
            return false;
        };
        let Some(live) = self.platform.create(observer, entity) else {
            tracing::warn!(category = P::CATEGORY, entity = %entity.id(), "platform refused live instance");
            return false;
        };
        if entity.wants_callbacks() {
            self.listener.on_enter(observer, entity);
        }
        let id = entity.id();
        tracing::debug!(category = P::CATEGORY, entity = %id, "entered");
        self.events.push(StreamEvent::Entered {
            observer,
            entity: id,
        });

        if let Some(set) = self.observers.get_mut(&observer) {
            set.live.insert(handle, live);
        }
        *self.viewers.entry(handle).or_insert(0) += 1;
        if let Some(entity) = self.streamer.get_mut(handle) {
            entity.set_lifecycle(Lifecycle::Live);
        }
        true
    }
}
