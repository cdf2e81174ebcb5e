use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::identifier::Identifier;
use crate::lock::{read_recover, write_recover};
use crate::registry::{Modifier, ModifierSet, ScaleKind};

use super::store::{EntityId, EntityScales, SimulationSide};

#[derive(Debug, Clone, Copy)]
pub struct ScaleValues {
    pub base_scale: f32,
    pub prev_base_scale: f32,
    pub initial_scale: f32,
    pub target_scale: f32,
    pub scale_ticks: u32,
    pub total_scale_ticks: u32,
}

impl ScaleValues {
    pub fn uniform(value: f32, total_scale_ticks: u32) -> Self {
        Self {
            base_scale: value,
            prev_base_scale: value,
            initial_scale: value,
            target_scale: value,
            scale_ticks: 0,
            total_scale_ticks,
        }
    }

    pub fn defaults(kind: &ScaleKind) -> Self {
        Self::uniform(kind.default_base_scale(), kind.default_tick_delay())
    }

    pub fn is_at_target(&self) -> bool {
        self.base_scale == self.target_scale
    }

    pub fn base_scale_at(&self, delta: f32) -> f32 {
        if delta == 1.0 {
            self.base_scale
        } else {
            self.prev_base_scale + delta * (self.base_scale - self.prev_base_scale)
        }
    }

    /// One simulation step. Returns whether `base_scale` changed.
    pub fn advance(&mut self) -> bool {
        let current = self.base_scale;
        let target = self.target_scale;

        if current != target {
            self.prev_base_scale = current;
            if self.scale_ticks >= self.total_scale_ticks {
                self.complete();
            } else {
                self.scale_ticks += 1;
                let step = (target - self.initial_scale) / self.total_scale_ticks as f32;
                let next = current + step;
                // The final step lands on the target exactly instead of on the
                // accumulated float sum.
                if self.scale_ticks >= self.total_scale_ticks || reaches(current, next, target) {
                    self.complete();
                } else {
                    self.base_scale = next;
                }
            }
            true
        } else {
            if self.prev_base_scale != current {
                self.prev_base_scale = current;
            }
            false
        }
    }

    fn complete(&mut self) {
        self.initial_scale = self.target_scale;
        self.scale_ticks = 0;
        self.base_scale = self.target_scale;
    }

    fn bits(&self) -> [u32; 6] {
        [
            self.base_scale.to_bits(),
            self.prev_base_scale.to_bits(),
            self.initial_scale.to_bits(),
            self.target_scale.to_bits(),
            self.scale_ticks,
            self.total_scale_ticks,
        ]
    }
}

fn reaches(current: f32, next: f32, target: f32) -> bool {
    (target - current) * (target - next) <= 0.0
}

impl PartialEq for ScaleValues {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for ScaleValues {}

impl Hash for ScaleValues {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

#[derive(Debug, Clone)]
pub struct ScaleOwner {
    pub entity: EntityId,
    pub side: SimulationSide,
    store: Weak<EntityScales>,
}

impl ScaleOwner {
    pub(crate) fn new(entity: EntityId, side: SimulationSide, store: Weak<EntityScales>) -> Self {
        Self {
            entity,
            side,
            store,
        }
    }
}

#[derive(Debug, Clone)]
struct ScaleInner {
    values: ScaleValues,
    modifiers: ModifierSet,
}

#[derive(Debug)]
enum ScaleState {
    Mutable(RwLock<ScaleInner>),
    Immutable(ScaleValues),
}

pub struct ScaleData {
    kind: Arc<ScaleKind>,
    owner: Option<ScaleOwner>,
    state: ScaleState,
    dirty: AtomicBool,
}

impl ScaleData {
    pub fn new(kind: Arc<ScaleKind>) -> Self {
        Self::build(kind, None)
    }

    pub(crate) fn owned(kind: Arc<ScaleKind>, owner: ScaleOwner) -> Self {
        Self::build(kind, Some(owner))
    }

    fn build(kind: Arc<ScaleKind>, owner: Option<ScaleOwner>) -> Self {
        let inner = ScaleInner {
            values: ScaleValues::defaults(&kind),
            modifiers: kind.default_modifiers().clone(),
        };
        Self {
            kind,
            owner,
            state: ScaleState::Mutable(RwLock::new(inner)),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn immutable(kind: Arc<ScaleKind>, value: f32) -> Self {
        let values = ScaleValues::uniform(value, kind.default_tick_delay());
        Self {
            kind,
            owner: None,
            state: ScaleState::Immutable(values),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> &Arc<ScaleKind> {
        &self.kind
    }

    pub fn owner(&self) -> Option<&ScaleOwner> {
        self.owner.as_ref()
    }

    pub fn entity(&self) -> Option<EntityId> {
        self.owner.as_ref().map(|owner| owner.entity)
    }

    pub fn entity_scales(&self) -> Option<Arc<EntityScales>> {
        self.owner.as_ref().and_then(|owner| owner.store.upgrade())
    }

    pub fn is_mutable(&self) -> bool {
        matches!(self.state, ScaleState::Mutable(_))
    }

    pub fn values(&self) -> ScaleValues {
        match &self.state {
            ScaleState::Mutable(lock) => read_recover(lock).values,
            ScaleState::Immutable(values) => *values,
        }
    }

    pub fn base_scale(&self) -> f32 {
        self.values().base_scale
    }

    pub fn base_scale_at(&self, delta: f32) -> f32 {
        self.values().base_scale_at(delta)
    }

    pub fn prev_base_scale(&self) -> f32 {
        self.values().prev_base_scale
    }

    pub fn initial_scale(&self) -> f32 {
        self.values().initial_scale
    }

    pub fn target_scale(&self) -> f32 {
        self.values().target_scale
    }

    pub fn scale_ticks(&self) -> u32 {
        self.values().scale_ticks
    }

    pub fn scale_tick_delay(&self) -> u32 {
        self.values().total_scale_ticks
    }

    pub fn scale(&self) -> f32 {
        self.scale_at(1.0)
    }

    pub fn scale_at(&self, delta: f32) -> f32 {
        match &self.state {
            ScaleState::Immutable(values) => values.base_scale_at(delta),
            ScaleState::Mutable(lock) => {
                let (base, modifiers) = {
                    let inner = read_recover(lock);
                    (inner.values.base_scale_at(delta), inner.modifiers.to_vec())
                };
                self.compute_scale(base, &modifiers, delta)
            }
        }
    }

    pub fn prev_scale(&self) -> f32 {
        match &self.state {
            ScaleState::Immutable(values) => values.prev_base_scale,
            ScaleState::Mutable(lock) => {
                let (prev, modifiers) = {
                    let inner = read_recover(lock);
                    (inner.values.prev_base_scale, inner.modifiers.to_vec())
                };
                self.compute_scale(prev, &modifiers, 1.0)
            }
        }
    }

    fn compute_scale(&self, value: f32, modifiers: &[Arc<Modifier>], delta: f32) -> f32 {
        modifiers
            .iter()
            .fold(value, |acc, modifier| modifier.modify_scale(self, acc, delta))
    }

    pub fn modifiers(&self) -> Vec<Arc<Modifier>> {
        match &self.state {
            ScaleState::Mutable(lock) => read_recover(lock).modifiers.to_vec(),
            ScaleState::Immutable(_) => Vec::new(),
        }
    }

    pub fn modifier_ids(&self) -> Vec<Identifier> {
        match &self.state {
            ScaleState::Mutable(lock) => read_recover(lock).modifiers.ids(),
            ScaleState::Immutable(_) => Vec::new(),
        }
    }

    pub fn has_modifier(&self, id: &Identifier) -> bool {
        match &self.state {
            ScaleState::Mutable(lock) => read_recover(lock).modifiers.contains(id),
            ScaleState::Immutable(_) => false,
        }
    }

    pub(crate) fn modifier_set(&self) -> ModifierSet {
        match &self.state {
            ScaleState::Mutable(lock) => read_recover(lock).modifiers.clone(),
            ScaleState::Immutable(_) => ModifierSet::new(),
        }
    }

    fn update<R>(&self, f: impl FnOnce(&mut ScaleInner) -> R) -> Option<R> {
        match &self.state {
            ScaleState::Mutable(lock) => Some(f(&mut write_recover(lock))),
            ScaleState::Immutable(_) => None,
        }
    }

    pub fn tick(&self) {
        let changed = self
            .update(|inner| inner.values.advance())
            .unwrap_or(false);
        if changed {
            self.on_update();
        }
    }

    pub fn set_base_scale(&self, scale: f32) {
        let updated = self.update(|inner| {
            inner.values.prev_base_scale = inner.values.base_scale;
            inner.values.base_scale = scale;
        });
        if updated.is_some() {
            self.on_update();
        }
    }

    pub fn set_scale(&self, scale: f32) {
        self.set_base_scale(scale);
        self.set_target_scale(scale);
    }

    pub fn set_target_scale(&self, target: f32) {
        let updated = self.update(|inner| {
            inner.values.initial_scale = inner.values.base_scale;
            inner.values.target_scale = target;
            inner.values.scale_ticks = 0;
        });
        if updated.is_some() {
            self.mark_for_sync(true);
        }
    }

    pub fn set_scale_tick_delay(&self, ticks: u32) {
        if self
            .update(|inner| inner.values.total_scale_ticks = ticks)
            .is_some()
        {
            self.mark_for_sync(true);
        }
    }

    pub fn add_modifier(&self, modifier: Arc<Modifier>) -> bool {
        let added = self
            .update(|inner| inner.modifiers.insert(modifier))
            .unwrap_or(false);
        if added {
            self.mark_for_sync(true);
        }
        added
    }

    pub fn remove_modifier(&self, id: &Identifier) -> bool {
        let removed = self
            .update(|inner| inner.modifiers.remove(id))
            .unwrap_or(false);
        if removed {
            self.mark_for_sync(true);
        }
        removed
    }

    pub(crate) fn replace_state(&self, values: ScaleValues, modifiers: ModifierSet) -> bool {
        self.update(|inner| {
            inner.values = values;
            inner.modifiers = modifiers;
        })
        .is_some()
    }

    /// Sets the pending-sync latch. Only states owned by an authoritative
    /// entity ever become dirty.
    pub fn mark_for_sync(&self, sync: bool) {
        if self.is_authoritative() {
            self.dirty.store(sync, Ordering::Release);
        }
    }

    pub fn should_sync(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn take_sync(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    fn is_authoritative(&self) -> bool {
        self.is_mutable()
            && self
                .owner
                .as_ref()
                .is_some_and(|owner| owner.side == SimulationSide::Authoritative)
    }

    pub(crate) fn on_update(&self) {
        self.mark_for_sync(true);
        self.kind.events().fire_changed(self);
    }

    pub fn reset(&self) -> bool {
        self.reset_with(true)
    }

    pub fn reset_with(&self, notify: bool) -> bool {
        let was_reset = self.is_reset();
        let kind = &self.kind;
        let updated = self.update(|inner| {
            inner.values = ScaleValues::defaults(kind);
            inner.modifiers = kind.default_modifiers().clone();
        });
        if updated.is_some() && notify {
            self.on_update();
        }
        was_reset
    }

    pub fn is_reset(&self) -> bool {
        match &self.state {
            ScaleState::Immutable(_) => true,
            ScaleState::Mutable(lock) => {
                let inner = read_recover(lock);
                inner.values == ScaleValues::defaults(&self.kind)
                    && inner.modifiers == *self.kind.default_modifiers()
            }
        }
    }

    pub fn from_scale(&self, other: &ScaleData) {
        self.from_scale_with(other, true);
    }

    pub fn from_scale_with(&self, other: &ScaleData, notify: bool) {
        // Snapshot first: `other` may be `self`.
        let source = other.values();
        if self.update(|inner| inner.values = source).is_some() && notify {
            self.on_update();
        }
    }

    pub fn average_from(&self, first: &ScaleData, rest: &[&ScaleData]) {
        let mut sum = first.values();
        let mut scale_ticks = u64::from(sum.scale_ticks);
        let mut total_scale_ticks = u64::from(sum.total_scale_ticks);
        for data in rest {
            let values = data.values();
            sum.base_scale += values.base_scale;
            sum.prev_base_scale += values.prev_base_scale;
            sum.initial_scale += values.initial_scale;
            sum.target_scale += values.target_scale;
            scale_ticks += u64::from(values.scale_ticks);
            total_scale_ticks += u64::from(values.total_scale_ticks);
        }

        let count = (rest.len() + 1) as f32;
        let averaged = ScaleValues {
            base_scale: sum.base_scale / count,
            prev_base_scale: sum.prev_base_scale / count,
            initial_scale: sum.initial_scale / count,
            target_scale: sum.target_scale / count,
            scale_ticks: round_mean(scale_ticks, count),
            total_scale_ticks: round_mean(total_scale_ticks, count),
        };
        if self.update(|inner| inner.values = averaged).is_some() {
            self.on_update();
        }
    }
}

fn round_mean(sum: u64, count: f32) -> u32 {
    (sum as f64 / f64::from(count)).round() as u32
}

impl PartialEq for ScaleData {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.values() == other.values()
    }
}

impl Eq for ScaleData {}

impl Hash for ScaleData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.values().hash(state);
    }
}

impl fmt::Debug for ScaleData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScaleData")
            .field("kind", self.kind.id())
            .field("entity", &self.entity())
            .field("mutable", &self.is_mutable())
            .field("values", &self.values())
            .field("modifiers", &self.modifier_ids())
            .finish()
    }
}
