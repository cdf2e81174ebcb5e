mod exec;
mod parser;

pub use exec::{CommandError, CommandOutcome, CommandProcessor, ScaleTargets};
pub use parser::{
    tokenize_line, CommandParseError, CommandRegistry, CommandSpec, ScaleCommand, ScaleOperation,
    TargetSelector,
};
