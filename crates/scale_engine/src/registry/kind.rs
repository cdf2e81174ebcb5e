use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::identifier::Identifier;
use crate::lock::{read_recover, write_recover};
use crate::scale::ScaleData;

use super::modifier::{ModifierRegistry, ModifierSet};
use super::RegistryError;

pub const DEFAULT_BASE_SCALE: f32 = 1.0;
pub const DEFAULT_TICK_DELAY: u32 = 20;

pub type ScaleListener = Arc<dyn Fn(&ScaleData) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleKindDef {
    pub id: Identifier,
    pub default_base_scale: f32,
    pub default_tick_delay: u32,
    pub default_modifiers: Vec<Identifier>,
}

impl ScaleKindDef {
    pub fn new(id: Identifier) -> Self {
        Self {
            id,
            default_base_scale: DEFAULT_BASE_SCALE,
            default_tick_delay: DEFAULT_TICK_DELAY,
            default_modifiers: Vec::new(),
        }
    }

    pub fn with_default_base_scale(mut self, value: f32) -> Self {
        self.default_base_scale = value;
        self
    }

    pub fn with_default_tick_delay(mut self, ticks: u32) -> Self {
        self.default_tick_delay = ticks;
        self
    }

    pub fn with_modifier(mut self, id: Identifier) -> Self {
        self.default_modifiers.push(id);
        self
    }
}

#[derive(Default)]
pub struct ScaleEvents {
    changed: RwLock<Vec<ScaleListener>>,
    pre_tick: RwLock<Vec<ScaleListener>>,
    post_tick: RwLock<Vec<ScaleListener>>,
}

impl ScaleEvents {
    pub fn on_change(&self, listener: impl Fn(&ScaleData) + Send + Sync + 'static) {
        write_recover(&self.changed).push(Arc::new(listener));
    }

    pub fn on_pre_tick(&self, listener: impl Fn(&ScaleData) + Send + Sync + 'static) {
        write_recover(&self.pre_tick).push(Arc::new(listener));
    }

    pub fn on_post_tick(&self, listener: impl Fn(&ScaleData) + Send + Sync + 'static) {
        write_recover(&self.post_tick).push(Arc::new(listener));
    }

    pub(crate) fn fire_changed(&self, data: &ScaleData) {
        fire(&self.changed, data);
    }

    pub(crate) fn fire_pre_tick(&self, data: &ScaleData) {
        fire(&self.pre_tick, data);
    }

    pub(crate) fn fire_post_tick(&self, data: &ScaleData) {
        fire(&self.post_tick, data);
    }
}

fn fire(listeners: &RwLock<Vec<ScaleListener>>, data: &ScaleData) {
    // Snapshot so a listener may register further listeners.
    let snapshot = read_recover(listeners).clone();
    for listener in snapshot {
        listener(data);
    }
}

impl fmt::Debug for ScaleEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScaleEvents")
            .field("changed", &read_recover(&self.changed).len())
            .field("pre_tick", &read_recover(&self.pre_tick).len())
            .field("post_tick", &read_recover(&self.post_tick).len())
            .finish()
    }
}

#[derive(Debug)]
pub struct ScaleKind {
    id: Identifier,
    slot: usize,
    default_base_scale: f32,
    default_tick_delay: u32,
    default_modifiers: ModifierSet,
    events: ScaleEvents,
    invalid: bool,
}

impl ScaleKind {
    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn default_base_scale(&self) -> f32 {
        self.default_base_scale
    }

    pub fn default_tick_delay(&self) -> u32 {
        self.default_tick_delay
    }

    pub fn default_modifiers(&self) -> &ModifierSet {
        &self.default_modifiers
    }

    pub fn events(&self) -> &ScaleEvents {
        &self.events
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid
    }
}

pub struct KindRegistry {
    kinds: Vec<Arc<ScaleKind>>,
    by_id: HashMap<Identifier, usize>,
    identity: Arc<ScaleData>,
}

impl KindRegistry {
    pub const INVALID_PATH: &'static str = "invalid";

    pub fn new() -> Self {
        let invalid = Arc::new(ScaleKind {
            id: Identifier::scaling(Self::INVALID_PATH),
            slot: 0,
            default_base_scale: DEFAULT_BASE_SCALE,
            default_tick_delay: DEFAULT_TICK_DELAY,
            default_modifiers: ModifierSet::new(),
            events: ScaleEvents::default(),
            invalid: true,
        });
        let identity = Arc::new(ScaleData::immutable(Arc::clone(&invalid), 1.0));
        let mut by_id = HashMap::new();
        by_id.insert(invalid.id.clone(), 0);
        Self {
            kinds: vec![invalid],
            by_id,
            identity,
        }
    }

    pub fn register(
        &mut self,
        def: ScaleKindDef,
        modifiers: &ModifierRegistry,
    ) -> Result<Arc<ScaleKind>, RegistryError> {
        if self.by_id.contains_key(&def.id) {
            return Err(RegistryError::DuplicateKind { id: def.id });
        }

        let mut default_modifiers = ModifierSet::new();
        for modifier_id in &def.default_modifiers {
            let Some(modifier) = modifiers.get(modifier_id) else {
                return Err(RegistryError::UnknownModifier {
                    kind: def.id.clone(),
                    modifier: modifier_id.clone(),
                });
            };
            default_modifiers.insert(Arc::clone(modifier));
        }

        let slot = self.kinds.len();
        let kind = Arc::new(ScaleKind {
            id: def.id,
            slot,
            default_base_scale: def.default_base_scale,
            default_tick_delay: def.default_tick_delay,
            default_modifiers,
            events: ScaleEvents::default(),
            invalid: false,
        });
        debug!(kind = %kind.id, slot, "scale_kind_registered");
        self.by_id.insert(kind.id.clone(), slot);
        self.kinds.push(Arc::clone(&kind));
        Ok(kind)
    }

    pub fn get(&self, id: &Identifier) -> Option<&Arc<ScaleKind>> {
        let slot = self.by_id.get(id)?;
        self.kinds.get(*slot)
    }

    pub fn kind_or_invalid(&self, id: &Identifier) -> &Arc<ScaleKind> {
        match self.get(id) {
            Some(kind) => kind,
            None => {
                debug!(kind = %id, "unknown_scale_kind");
                self.invalid()
            }
        }
    }

    pub fn invalid(&self) -> &Arc<ScaleKind> {
        &self.kinds[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ScaleKind>> {
        self.kinds.iter()
    }

    pub fn iter_valid(&self) -> impl Iterator<Item = &Arc<ScaleKind>> {
        self.kinds.iter().filter(|kind| !kind.invalid)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn identity(&self) -> &Arc<ScaleData> {
        &self.identity
    }
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.kinds.iter().map(|kind| kind.id.to_string()))
            .finish()
    }
}
