use std::collections::BTreeMap;
use std::sync::Arc;

use scale_engine::{EntityId, EntityScales, ScaleConfig, ScaleRegistries, ScaleTargets, SimulationSide};
use tracing::debug;

/// Entity table for one side of the simulation.
pub(crate) struct World {
    side: SimulationSide,
    registries: Arc<ScaleRegistries>,
    config: ScaleConfig,
    entities: BTreeMap<EntityId, Arc<EntityScales>>,
    next_id: u32,
}

impl World {
    pub(crate) fn new(
        side: SimulationSide,
        registries: Arc<ScaleRegistries>,
        config: ScaleConfig,
    ) -> Self {
        Self {
            side,
            registries,
            config,
            entities: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub(crate) fn spawn(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.insert(id);
        id
    }

    /// Returns the existing store when `id` is already present.
    pub(crate) fn insert(&mut self, id: EntityId) -> Arc<EntityScales> {
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        let store = self.entities.entry(id).or_insert_with(|| {
            debug!(entity = id.0, side = ?self.side, "entity_spawned");
            EntityScales::new(id, self.side, Arc::clone(&self.registries), self.config)
        });
        Arc::clone(store)
    }

    pub(crate) fn get(&self, id: EntityId) -> Option<Arc<EntityScales>> {
        self.entities.get(&id).cloned()
    }

    pub(crate) fn ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub(crate) fn stores(&self) -> impl Iterator<Item = &Arc<EntityScales>> {
        self.entities.values()
    }

    pub(crate) fn next_id(&self) -> u32 {
        self.next_id
    }

    pub(crate) fn set_next_id(&mut self, next_id: u32) {
        self.next_id = next_id;
    }

    pub(crate) fn len(&self) -> usize {
        self.entities.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entities.clear();
        self.next_id = 1;
    }

    pub(crate) fn tick(&self) {
        for store in self.entities.values() {
            store.tick_all();
        }
    }
}

impl ScaleTargets for World {
    fn entity_scales(&self, id: EntityId) -> Option<Arc<EntityScales>> {
        self.get(id)
    }

    fn entity_ids(&self) -> Vec<EntityId> {
        self.ids()
    }
}
