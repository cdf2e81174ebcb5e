pub mod command;
pub mod config;
pub mod content;
pub mod identifier;
mod lock;
pub mod registry;
pub mod scale;
pub mod sync;

pub use command::{
    CommandError, CommandOutcome, CommandParseError, CommandProcessor, CommandRegistry,
    ScaleCommand, ScaleOperation, ScaleTargets, TargetSelector,
};
pub use config::{ScaleConfig, CACHING_ENV_VAR};
pub use content::{
    compile_scale_kind_defs, save_json_atomic, ContentCompileError, ContentErrorCode,
    PersistError, SourceLocation,
};
pub use identifier::{Identifier, IdentifierError, DEFAULT_NAMESPACE};
pub use registry::{
    KindRegistry, Modifier, ModifierRegistry, ModifierSet, RegistryError, ScaleKind, ScaleKindDef,
    ScaleModifier, ScaleRegistries,
};
pub use scale::{EntityId, EntityScales, ScaleData, ScaleValues, SimulationSide};
pub use sync::{
    apply_sync_message, decode_batch, encode_batch, flush_dirty, tracking_snapshot, Document,
    ScalePayload, ScaleSyncMessage, WireError, DOCUMENT_KEY,
};
