use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::identifier::Identifier;
use crate::registry::{kinds, ScaleKind, ScaleRegistries};
use crate::scale::{EntityId, EntityScales};

use super::parser::{CommandParseError, CommandRegistry, ScaleCommand, TargetSelector};

pub trait ScaleTargets {
    fn entity_scales(&self, id: EntityId) -> Option<Arc<EntityScales>>;
    fn entity_ids(&self) -> Vec<EntityId>;
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown scale kind {id}")]
    UnknownKind { id: Identifier },
    #[error("unknown entity {id}")]
    UnknownEntity { id: EntityId },
    #[error("command requires a source entity")]
    NoSourceEntity,
    #[error("selector matched no entity")]
    NoMatchingEntity,
    #[error("selector matched {count} entities; expected exactly one")]
    AmbiguousTarget { count: usize },
    #[error("resulting scale {value} is not finite")]
    NonFiniteScale { value: f32 },
    #[error(transparent)]
    Parse(#[from] CommandParseError),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutcome {
    pub feedback: Vec<String>,
    pub affected: usize,
}

pub struct CommandProcessor {
    registry: CommandRegistry,
    registries: Arc<ScaleRegistries>,
}

impl CommandProcessor {
    pub fn new(registries: Arc<ScaleRegistries>) -> Self {
        Self {
            registry: CommandRegistry::with_builtins(),
            registries,
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    pub fn run_line(
        &self,
        line: &str,
        source: Option<EntityId>,
        world: &dyn ScaleTargets,
    ) -> Result<CommandOutcome, CommandError> {
        match self.registry.parse_line(line)? {
            Some(command) => self.execute(&command, source, world),
            None => Ok(CommandOutcome::default()),
        }
    }

    pub fn execute(
        &self,
        command: &ScaleCommand,
        source: Option<EntityId>,
        world: &dyn ScaleTargets,
    ) -> Result<CommandOutcome, CommandError> {
        let mut outcome = CommandOutcome::default();
        match command {
            ScaleCommand::Help => {
                outcome.feedback = self.registry.help_lines();
            }
            ScaleCommand::Modify {
                operation,
                kind,
                value,
                targets,
            } => {
                let kind = self.resolve_kind(kind.as_ref())?;
                let mut updates = Vec::new();
                for store in resolve_targets(targets, source, world)? {
                    let data = store.get(&kind);
                    let new_target = operation.apply(data.scale(), *value);
                    if !new_target.is_finite() {
                        return Err(CommandError::NonFiniteScale { value: new_target });
                    }
                    updates.push((store, data, new_target));
                }
                for (store, data, new_target) in updates {
                    data.set_target_scale(new_target);
                    data.mark_for_sync(true);
                    info!(
                        entity = store.entity().0,
                        kind = %kind.id(),
                        new_target,
                        "scale_target_set"
                    );
                    outcome.affected += 1;
                }
            }
            ScaleCommand::Get { kind, target } => {
                let kind = self.resolve_kind(kind.as_ref())?;
                let store = resolve_single(*target, source, world)?;
                let scale = store.get(&kind).scale();
                outcome.feedback.push(format!("Scale: {scale:?}"));
            }
            ScaleCommand::Reset { kind, targets } => {
                let kinds = match kind {
                    Some(id) => vec![self.resolve_kind(Some(id))?],
                    None => self.registries.kinds().iter_valid().cloned().collect(),
                };
                let identity = self.registries.kinds().identity();
                for store in resolve_targets(targets, source, world)? {
                    for kind in &kinds {
                        let data = store.get(kind);
                        data.from_scale(identity);
                        data.mark_for_sync(true);
                    }
                    info!(
                        entity = store.entity().0,
                        kinds = kinds.len(),
                        "scale_reset"
                    );
                    outcome.affected += 1;
                }
            }
            ScaleCommand::SetDelay {
                kind,
                ticks,
                targets,
            } => {
                let kind = self.resolve_kind(kind.as_ref())?;
                for store in resolve_targets(targets, source, world)? {
                    let data = store.get(&kind);
                    data.set_scale_tick_delay(*ticks);
                    data.mark_for_sync(true);
                    outcome.affected += 1;
                }
            }
            ScaleCommand::GetDelay { kind, target } => {
                let kind = self.resolve_kind(kind.as_ref())?;
                let store = resolve_single(*target, source, world)?;
                let ticks = store.get(&kind).scale_tick_delay();
                outcome.feedback.push(format!("Delay: {ticks} ticks"));
            }
        }
        Ok(outcome)
    }

    fn resolve_kind(&self, id: Option<&Identifier>) -> Result<Arc<ScaleKind>, CommandError> {
        let id = match id {
            Some(id) => id.clone(),
            None => Identifier::scaling(kinds::BASE),
        };
        match self.registries.kinds().get(&id) {
            Some(kind) if !kind.is_invalid() => Ok(Arc::clone(kind)),
            _ => Err(CommandError::UnknownKind { id }),
        }
    }
}

fn resolve_selector(
    selector: TargetSelector,
    source: Option<EntityId>,
    world: &dyn ScaleTargets,
) -> Result<Vec<EntityId>, CommandError> {
    match selector {
        TargetSelector::Source => Ok(vec![source.ok_or(CommandError::NoSourceEntity)?]),
        TargetSelector::All => Ok(world.entity_ids()),
        TargetSelector::Entity(id) => Ok(vec![id]),
    }
}

fn resolve_targets(
    selectors: &[TargetSelector],
    source: Option<EntityId>,
    world: &dyn ScaleTargets,
) -> Result<Vec<Arc<EntityScales>>, CommandError> {
    let mut seen = HashSet::new();
    let mut stores = Vec::new();
    for selector in selectors {
        for id in resolve_selector(*selector, source, world)? {
            if !seen.insert(id) {
                continue;
            }
            let store = world
                .entity_scales(id)
                .ok_or(CommandError::UnknownEntity { id })?;
            stores.push(store);
        }
    }
    Ok(stores)
}

fn resolve_single(
    selector: TargetSelector,
    source: Option<EntityId>,
    world: &dyn ScaleTargets,
) -> Result<Arc<EntityScales>, CommandError> {
    let mut stores = resolve_targets(&[selector], source, world)?;
    match stores.len() {
        0 => Err(CommandError::NoMatchingEntity),
        1 => Ok(stores.remove(0)),
        count => Err(CommandError::AmbiguousTarget { count }),
    }
}
