mod compiler;
mod persist;

pub use compiler::{
    compile_scale_kind_defs, parse_defs_document, ContentCompileError, ContentErrorCode,
    SourceLocation,
};
pub use persist::{save_json_atomic, PersistError};
