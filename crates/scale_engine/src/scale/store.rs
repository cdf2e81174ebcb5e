use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ScaleConfig;
use crate::identifier::Identifier;
use crate::lock::{lock_recover, read_recover, write_recover};
use crate::registry::{ScaleKind, ScaleRegistries};

use super::data::{ScaleData, ScaleOwner};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulationSide {
    Authoritative,
    Replica,
}

type SlotCache = Box<[OnceLock<Arc<ScaleData>>]>;

/// Per-entity map from scale kind to its lazily constructed state.
///
/// Lookups go through a dense slot cache, then the kind map. A miss on both
/// takes the per-store construction mutex, so each (entity, kind) pair gets
/// at most one state for the lifetime of the store.
pub struct EntityScales {
    this: Weak<EntityScales>,
    entity: EntityId,
    side: SimulationSide,
    registries: Arc<ScaleRegistries>,
    caching_enabled: bool,
    /// `None` marks a state under construction.
    scales: RwLock<HashMap<Identifier, Option<Arc<ScaleData>>>>,
    construction: Mutex<()>,
    cache: OnceLock<SlotCache>,
    constructed: AtomicUsize,
    ignore_document: AtomicBool,
}

impl EntityScales {
    pub fn new(
        entity: EntityId,
        side: SimulationSide,
        registries: Arc<ScaleRegistries>,
        config: ScaleConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            entity,
            side,
            registries,
            caching_enabled: config.caching_enabled,
            scales: RwLock::new(HashMap::new()),
            construction: Mutex::new(()),
            cache: OnceLock::new(),
            constructed: AtomicUsize::new(0),
            ignore_document: AtomicBool::new(false),
        })
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn side(&self) -> SimulationSide {
        self.side
    }

    pub fn registries(&self) -> &Arc<ScaleRegistries> {
        &self.registries
    }

    pub fn get(&self, kind: &Arc<ScaleKind>) -> Arc<ScaleData> {
        if let Some(data) = self.cached(kind) {
            return data;
        }
        if let Some(data) = self.lookup(kind.id()) {
            self.fill_cache(kind, &data);
            return data;
        }

        let _guard = lock_recover(&self.construction);
        if let Some(data) = self.lookup(kind.id()) {
            self.fill_cache(kind, &data);
            return data;
        }

        write_recover(&self.scales).insert(kind.id().clone(), None);
        let data = Arc::new(self.construct(kind));
        write_recover(&self.scales).insert(kind.id().clone(), Some(Arc::clone(&data)));
        self.fill_cache(kind, &data);
        self.constructed.fetch_add(1, Ordering::Relaxed);
        debug!(
            entity = self.entity.0,
            kind = %kind.id(),
            mutable = data.is_mutable(),
            "scale_data_constructed"
        );
        data
    }

    pub fn get_by_id(&self, id: &Identifier) -> Arc<ScaleData> {
        let kind = Arc::clone(self.registries.kinds().kind_or_invalid(id));
        self.get(&kind)
    }

    pub fn get_all(&self) -> Vec<Arc<ScaleData>> {
        self.registries
            .kinds()
            .iter()
            .map(|kind| self.get(kind))
            .collect()
    }

    pub fn constructed(&self) -> Vec<Arc<ScaleData>> {
        let mut states: Vec<Arc<ScaleData>> = read_recover(&self.scales)
            .values()
            .flatten()
            .cloned()
            .collect();
        states.sort_by_key(|data| data.kind().slot());
        states
    }

    pub fn construction_count(&self) -> usize {
        self.constructed.load(Ordering::Relaxed)
    }

    pub fn tick_all(&self) {
        for kind in self.registries.kinds().iter_valid() {
            let data = self.get(kind);
            kind.events().fire_pre_tick(&data);
            data.tick();
            kind.events().fire_post_tick(&data);
        }
    }

    pub fn set_ignore_document(&self, ignore: bool) {
        self.ignore_document.store(ignore, Ordering::Relaxed);
    }

    pub fn ignores_document(&self) -> bool {
        self.ignore_document.load(Ordering::Relaxed)
    }

    fn lookup(&self, id: &Identifier) -> Option<Arc<ScaleData>> {
        read_recover(&self.scales).get(id).cloned().flatten()
    }

    fn slots(&self) -> Option<&[OnceLock<Arc<ScaleData>>]> {
        if !self.caching_enabled {
            return None;
        }
        let slots = self.cache.get_or_init(|| {
            (0..self.registries.kinds().len())
                .map(|_| OnceLock::new())
                .collect()
        });
        Some(slots)
    }

    fn cached(&self, kind: &Arc<ScaleKind>) -> Option<Arc<ScaleData>> {
        let data = self.slots()?.get(kind.slot())?.get()?;
        // A kind from another registry may share the slot number.
        Arc::ptr_eq(data.kind(), kind).then(|| Arc::clone(data))
    }

    fn fill_cache(&self, kind: &Arc<ScaleKind>, data: &Arc<ScaleData>) {
        if !Arc::ptr_eq(data.kind(), kind) {
            return;
        }
        if let Some(slot) = self.slots().and_then(|slots| slots.get(kind.slot())) {
            let _ = slot.set(Arc::clone(data));
        }
    }

    fn construct(&self, kind: &Arc<ScaleKind>) -> ScaleData {
        if kind.is_invalid() {
            return ScaleData::immutable(Arc::clone(kind), kind.default_base_scale());
        }
        ScaleData::owned(
            Arc::clone(kind),
            ScaleOwner::new(self.entity, self.side, self.this.clone()),
        )
    }
}

impl fmt::Debug for EntityScales {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityScales")
            .field("entity", &self.entity)
            .field("side", &self.side)
            .field("caching_enabled", &self.caching_enabled)
            .field("constructed", &self.construction_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use super::*;
    use crate::registry::kinds;

    fn store(side: SimulationSide, config: ScaleConfig) -> Arc<EntityScales> {
        EntityScales::new(
            EntityId(7),
            side,
            Arc::new(ScaleRegistries::with_builtins()),
            config,
        )
    }

    #[test]
    fn concurrent_first_access_constructs_once() {
        for caching_enabled in [true, false] {
            let store = store(
                SimulationSide::Authoritative,
                ScaleConfig { caching_enabled },
            );
            let base = Identifier::scaling(kinds::BASE);
            let barrier = Barrier::new(8);
            let results = thread::scope(|scope| {
                let handles = (0..8)
                    .map(|_| {
                        scope.spawn(|| {
                            barrier.wait();
                            store.get_by_id(&base)
                        })
                    })
                    .collect::<Vec<_>>();
                handles
                    .into_iter()
                    .map(|handle| handle.join().expect("worker thread"))
                    .collect::<Vec<_>>()
            });
            assert!(results.iter().all(|data| Arc::ptr_eq(data, &results[0])));
            assert_eq!(store.construction_count(), 1);
        }
    }

    #[test]
    fn repeated_get_returns_same_instance() {
        let store = store(SimulationSide::Authoritative, ScaleConfig::default());
        let kind = Arc::clone(
            store
                .registries()
                .kinds()
                .get(&Identifier::scaling(kinds::WIDTH))
                .expect("width"),
        );
        let first = store.get(&kind);
        let second = store.get(&kind);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.entity(), Some(EntityId(7)));
    }

    #[test]
    fn unknown_kind_resolves_to_immutable_identity() {
        let store = store(SimulationSide::Authoritative, ScaleConfig::default());
        let data = store.get_by_id(&Identifier::scaling("not_registered"));
        assert!(data.kind().is_invalid());
        assert!(!data.is_mutable());
        data.set_scale(4.0);
        assert_eq!(data.scale(), 1.0);
        assert!(data.is_reset());
    }

    #[test]
    fn get_all_constructs_every_kind_in_slot_order() {
        let store = store(SimulationSide::Authoritative, ScaleConfig::default());
        let all = store.get_all();
        assert_eq!(all.len(), 10);
        assert_eq!(store.construction_count(), 10);
        let slots = all.iter().map(|data| data.kind().slot()).collect::<Vec<_>>();
        assert_eq!(slots, (0..10).collect::<Vec<_>>());
        assert_eq!(store.constructed().len(), 10);
        store.get_all();
        assert_eq!(store.construction_count(), 10);
    }

    #[test]
    fn dirty_tracking_depends_on_side() {
        let authoritative = store(SimulationSide::Authoritative, ScaleConfig::default());
        let replica = store(SimulationSide::Replica, ScaleConfig::default());
        let base = Identifier::scaling(kinds::BASE);
        authoritative.get_by_id(&base).set_target_scale(2.0);
        replica.get_by_id(&base).set_target_scale(2.0);
        assert!(authoritative.get_by_id(&base).should_sync());
        assert!(!replica.get_by_id(&base).should_sync());
    }

    #[test]
    fn kind_multipliers_read_sibling_states() {
        let store = store(SimulationSide::Authoritative, ScaleConfig::default());
        store
            .get_by_id(&Identifier::scaling(kinds::BASE))
            .set_scale(2.0);
        let width = store.get_by_id(&Identifier::scaling(kinds::WIDTH));
        width.set_scale(3.0);
        assert_eq!(width.scale(), 6.0);
        let hitbox = store.get_by_id(&Identifier::scaling(kinds::HITBOX_WIDTH));
        assert_eq!(hitbox.scale(), 12.0);
    }

    #[test]
    fn tick_all_advances_and_fires_tick_events() {
        let registries = Arc::new(ScaleRegistries::with_builtins());
        let base_kind = Arc::clone(
            registries
                .kinds()
                .get(&Identifier::scaling(kinds::BASE))
                .expect("base"),
        );
        let order = Arc::new(Mutex::new(Vec::new()));
        let pre = Arc::clone(&order);
        base_kind.events().on_pre_tick(move |data| {
            pre.lock().expect("order").push(("pre", data.base_scale()));
        });
        let post = Arc::clone(&order);
        base_kind.events().on_post_tick(move |data| {
            post.lock().expect("order").push(("post", data.base_scale()));
        });

        let store = EntityScales::new(
            EntityId(1),
            SimulationSide::Authoritative,
            registries,
            ScaleConfig::default(),
        );
        let base = store.get(&base_kind);
        base.set_scale_tick_delay(2);
        base.set_target_scale(3.0);
        store.tick_all();
        assert_eq!(base.base_scale(), 2.0);
        assert_eq!(
            *order.lock().expect("order"),
            vec![("pre", 1.0), ("post", 2.0)]
        );
        // Every valid kind was touched; the invalid kind was not.
        assert_eq!(store.construction_count(), 9);
    }

    #[test]
    fn dropping_store_detaches_states() {
        let store = store(SimulationSide::Authoritative, ScaleConfig::default());
        let width = store.get_by_id(&Identifier::scaling(kinds::WIDTH));
        store
            .get_by_id(&Identifier::scaling(kinds::BASE))
            .set_scale(2.0);
        drop(store);
        assert!(width.entity_scales().is_none());
        assert_eq!(width.scale(), 1.0);
    }
}
