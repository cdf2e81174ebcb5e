mod builtin;
mod kind;
mod modifier;

use std::sync::Arc;

use thiserror::Error;

use crate::identifier::Identifier;

pub use builtin::{kinds, modifiers, KindMultiplier};
pub use kind::{
    KindRegistry, ScaleEvents, ScaleKind, ScaleKindDef, ScaleListener, DEFAULT_BASE_SCALE,
    DEFAULT_TICK_DELAY,
};
pub use modifier::{Modifier, ModifierRegistry, ModifierSet, ScaleModifier};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate scale kind registration: {id}")]
    DuplicateKind { id: Identifier },
    #[error("duplicate modifier registration: {id}")]
    DuplicateModifier { id: Identifier },
    #[error("scale kind {kind} references unknown modifier {modifier}")]
    UnknownModifier {
        kind: Identifier,
        modifier: Identifier,
    },
}

#[derive(Debug, Default)]
pub struct ScaleRegistries {
    kinds: KindRegistry,
    modifiers: ModifierRegistry,
}

impl ScaleRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registries = Self::new();
        builtin::register_builtins(&mut registries)
            .expect("built-in scale registration should not fail");
        registries
    }

    pub fn register_modifier(&mut self, modifier: Modifier) -> Result<Arc<Modifier>, RegistryError> {
        self.modifiers.register(modifier)
    }

    pub fn register_kind(&mut self, def: ScaleKindDef) -> Result<Arc<ScaleKind>, RegistryError> {
        self.kinds.register(def, &self.modifiers)
    }

    pub fn register_kind_defs(
        &mut self,
        defs: impl IntoIterator<Item = ScaleKindDef>,
    ) -> Result<Vec<Arc<ScaleKind>>, RegistryError> {
        defs.into_iter().map(|def| self.register_kind(def)).collect()
    }

    pub fn kinds(&self) -> &KindRegistry {
        &self.kinds
    }

    pub fn modifiers(&self) -> &ModifierRegistry {
        &self.modifiers
    }
}
