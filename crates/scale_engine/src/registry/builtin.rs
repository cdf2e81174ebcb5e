use crate::identifier::Identifier;
use crate::scale::ScaleData;

use super::kind::ScaleKindDef;
use super::modifier::{Modifier, ScaleModifier};
use super::{RegistryError, ScaleRegistries};

pub mod kinds {
    pub const BASE: &str = "base";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const EYE_HEIGHT: &str = "eye_height";
    pub const HITBOX_WIDTH: &str = "hitbox_width";
    pub const HITBOX_HEIGHT: &str = "hitbox_height";
    pub const MOTION: &str = "motion";
    pub const REACH: &str = "reach";
    pub const DROPS: &str = "drops";
}

pub mod modifiers {
    pub const BASE_MULTIPLIER: &str = "base_multiplier";
    pub const WIDTH_MULTIPLIER: &str = "width_multiplier";
    pub const HEIGHT_MULTIPLIER: &str = "height_multiplier";
}

#[derive(Debug, Clone)]
pub struct KindMultiplier {
    kind: Identifier,
}

impl KindMultiplier {
    pub fn new(kind: Identifier) -> Self {
        Self { kind }
    }
}

impl ScaleModifier for KindMultiplier {
    fn modify_scale(&self, data: &ScaleData, value: f32, delta: f32) -> f32 {
        match data.entity_scales() {
            Some(store) => value * store.get_by_id(&self.kind).scale_at(delta),
            None => value,
        }
    }
}

pub(super) fn register_builtins(registries: &mut ScaleRegistries) -> Result<(), RegistryError> {
    for (modifier, kind) in [
        (modifiers::BASE_MULTIPLIER, kinds::BASE),
        (modifiers::WIDTH_MULTIPLIER, kinds::WIDTH),
        (modifiers::HEIGHT_MULTIPLIER, kinds::HEIGHT),
    ] {
        registries.register_modifier(Modifier::new(
            Identifier::scaling(modifier),
            0.0,
            KindMultiplier::new(Identifier::scaling(kind)),
        ))?;
    }

    let base = Identifier::scaling(modifiers::BASE_MULTIPLIER);
    let width = Identifier::scaling(modifiers::WIDTH_MULTIPLIER);
    let height = Identifier::scaling(modifiers::HEIGHT_MULTIPLIER);

    registries.register_kind(ScaleKindDef::new(Identifier::scaling(kinds::BASE)))?;
    for path in [
        kinds::WIDTH,
        kinds::HEIGHT,
        kinds::MOTION,
        kinds::REACH,
        kinds::DROPS,
    ] {
        registries.register_kind(
            ScaleKindDef::new(Identifier::scaling(path)).with_modifier(base.clone()),
        )?;
    }
    registries.register_kind(
        ScaleKindDef::new(Identifier::scaling(kinds::EYE_HEIGHT))
            .with_modifier(base.clone())
            .with_modifier(height.clone()),
    )?;
    registries.register_kind(
        ScaleKindDef::new(Identifier::scaling(kinds::HITBOX_WIDTH))
            .with_modifier(base.clone())
            .with_modifier(width),
    )?;
    registries.register_kind(
        ScaleKindDef::new(Identifier::scaling(kinds::HITBOX_HEIGHT))
            .with_modifier(base)
            .with_modifier(height),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_register_every_kind_after_invalid() {
        let registries = ScaleRegistries::with_builtins();
        assert_eq!(registries.kinds().len(), 10);
        assert_eq!(registries.modifiers().len(), 3);
        let base = registries
            .kinds()
            .get(&Identifier::scaling(kinds::BASE))
            .expect("base");
        assert_eq!(base.slot(), 1);
        assert!(base.default_modifiers().is_empty());
        let hitbox = registries
            .kinds()
            .get(&Identifier::scaling(kinds::HITBOX_WIDTH))
            .expect("hitbox width");
        assert_eq!(hitbox.default_modifiers().len(), 2);
    }

    #[test]
    fn detached_state_ignores_kind_multiplier() {
        let registries = ScaleRegistries::with_builtins();
        let width = registries
            .kinds()
            .get(&Identifier::scaling(kinds::WIDTH))
            .expect("width");
        let data = ScaleData::new(width.clone());
        data.set_scale(3.0);
        assert_eq!(data.scale(), 3.0);
    }
}
