use std::collections::HashMap;

use thiserror::Error;

use crate::identifier::Identifier;
use crate::scale::EntityId;

const SCALE_USAGE: &str = "scale <set|add|subtract|multiply|divide> [kind] <value> [targets...] \
     | scale get [kind] [entity] | scale reset [kind] [targets...] \
     | scale delay <set [kind] <ticks> [targets...] | get [kind] [entity]>";
const MODIFY_USAGE: &str = "scale <set|add|subtract|multiply|divide> [kind] <value> [targets...]";
const GET_USAGE: &str = "scale get [kind] [entity]";
const RESET_USAGE: &str = "scale reset [kind] [targets...]";
const DELAY_SET_USAGE: &str = "scale delay set [kind] <ticks> [targets...]";
const DELAY_GET_USAGE: &str = "scale delay get [kind] [entity]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleOperation {
    Set,
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ScaleOperation {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "set" => Some(Self::Set),
            "add" => Some(Self::Add),
            "subtract" => Some(Self::Subtract),
            "multiply" => Some(Self::Multiply),
            "divide" => Some(Self::Divide),
            _ => None,
        }
    }

    pub fn apply(self, current: f32, value: f32) -> f32 {
        match self {
            Self::Set => value,
            Self::Add => current + value,
            Self::Subtract => current - value,
            Self::Multiply => current * value,
            Self::Divide => current / value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSelector {
    Source,
    All,
    Entity(EntityId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScaleCommand {
    Modify {
        operation: ScaleOperation,
        kind: Option<Identifier>,
        value: f32,
        targets: Vec<TargetSelector>,
    },
    Get {
        kind: Option<Identifier>,
        target: TargetSelector,
    },
    Reset {
        kind: Option<Identifier>,
        targets: Vec<TargetSelector>,
    },
    SetDelay {
        kind: Option<Identifier>,
        ticks: u32,
        targets: Vec<TargetSelector>,
    },
    GetDelay {
        kind: Option<Identifier>,
        target: TargetSelector,
    },
    Help,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{reason}. usage: {usage}")]
pub struct CommandParseError {
    pub reason: String,
    pub usage: String,
}

impl CommandParseError {
    fn new(reason: impl Into<String>, usage: &str) -> Self {
        Self {
            reason: reason.into(),
            usage: usage.to_string(),
        }
    }
}

type ParseFn = dyn Fn(&[String]) -> Result<ScaleCommand, CommandParseError> + Send + Sync;

pub struct CommandSpec {
    name: String,
    help: String,
    arg_schema: String,
    parse: Box<ParseFn>,
}

impl CommandSpec {
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct CommandRegistry {
    specs: Vec<CommandSpec>,
    lookup_by_lower_name: HashMap<String, usize>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            specs: Vec::new(),
            lookup_by_lower_name: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("help", "List commands", "", parse_help_command)
            .expect("built-in command registration should not fail");
        registry
            .register(
                "scale",
                "Get, change or reset entity scales",
                "<set|add|subtract|multiply|divide|get|reset|delay> ...",
                parse_scale_command,
            )
            .expect("built-in command registration should not fail");
        registry
    }

    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        help: impl Into<String>,
        arg_schema: impl Into<String>,
        parse: F,
    ) -> Result<(), String>
    where
        F: Fn(&[String]) -> Result<ScaleCommand, CommandParseError> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("command name cannot be empty".to_string());
        }
        let lower = name.to_ascii_lowercase();
        if self.lookup_by_lower_name.contains_key(&lower) {
            return Err(format!("duplicate command registration: {name}"));
        }

        self.specs.push(CommandSpec {
            name,
            help: help.into(),
            arg_schema: arg_schema.into(),
            parse: Box::new(parse),
        });
        self.lookup_by_lower_name
            .insert(lower, self.specs.len() - 1);
        Ok(())
    }

    pub fn lookup(&self, input_name: &str) -> Option<&CommandSpec> {
        let lower = input_name.to_ascii_lowercase();
        let index = self.lookup_by_lower_name.get(&lower)?;
        self.specs.get(*index)
    }

    pub fn iter_specs_in_order(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.specs.iter().map(|spec| {
            (
                spec.name.as_str(),
                spec.help.as_str(),
                spec.arg_schema.as_str(),
            )
        })
    }

    pub fn help_lines(&self) -> Vec<String> {
        self.iter_specs_in_order()
            .map(|(name, help, arg_schema)| {
                if arg_schema.is_empty() {
                    format!("{name} - {help}")
                } else {
                    format!("{name} {arg_schema} - {help}")
                }
            })
            .collect()
    }

    pub fn parse_line(&self, raw_line: &str) -> Result<Option<ScaleCommand>, CommandParseError> {
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let tokens = tokenize_line(trimmed).map_err(|reason| CommandParseError::new(reason, "help"))?;
        let Some((command_name, args)) = tokens.split_first() else {
            return Ok(None);
        };
        let Some(spec) = self.lookup(command_name) else {
            return Err(CommandParseError::new(
                format!("unknown command '{command_name}'"),
                "help",
            ));
        };
        (spec.parse)(args).map(Some)
    }
}

pub fn tokenize_line(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut seen_token_content = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                seen_token_content = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if seen_token_content {
                    tokens.push(std::mem::take(&mut current));
                    seen_token_content = false;
                }
            }
            _ => {
                current.push(ch);
                seen_token_content = true;
            }
        }
    }

    if in_quotes {
        return Err("unterminated quoted string".to_string());
    }
    if seen_token_content {
        tokens.push(current);
    }
    Ok(tokens)
}

fn parse_help_command(args: &[String]) -> Result<ScaleCommand, CommandParseError> {
    if !args.is_empty() {
        return Err(CommandParseError::new("unexpected extra arguments", "help"));
    }
    Ok(ScaleCommand::Help)
}

fn parse_scale_command(args: &[String]) -> Result<ScaleCommand, CommandParseError> {
    let Some((subcommand, rest)) = args.split_first() else {
        return Err(CommandParseError::new("missing subcommand", SCALE_USAGE));
    };
    if let Some(operation) = ScaleOperation::parse(subcommand) {
        return parse_modify(operation, rest);
    }
    match subcommand.to_ascii_lowercase().as_str() {
        "get" => {
            let (kind, rest) = split_kind(rest, GET_USAGE)?;
            let target = single_target(rest, GET_USAGE)?;
            Ok(ScaleCommand::Get { kind, target })
        }
        "reset" => {
            let (kind, rest) = split_kind(rest, RESET_USAGE)?;
            Ok(ScaleCommand::Reset {
                kind,
                targets: parse_targets(rest, RESET_USAGE)?,
            })
        }
        "delay" => parse_delay(rest),
        other => Err(CommandParseError::new(
            format!("unknown subcommand '{other}'"),
            SCALE_USAGE,
        )),
    }
}

fn parse_modify(operation: ScaleOperation, args: &[String]) -> Result<ScaleCommand, CommandParseError> {
    let (kind, rest) = split_kind(args, MODIFY_USAGE)?;
    let Some((raw_value, rest)) = rest.split_first() else {
        return Err(CommandParseError::new(
            "missing required argument <value>",
            MODIFY_USAGE,
        ));
    };
    let value = raw_value
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| {
            CommandParseError::new(
                format!("invalid value '{raw_value}' (expected finite f32)"),
                MODIFY_USAGE,
            )
        })?;
    if operation == ScaleOperation::Divide && value == 0.0 {
        return Err(CommandParseError::new("cannot divide by zero", MODIFY_USAGE));
    }
    Ok(ScaleCommand::Modify {
        operation,
        kind,
        value,
        targets: parse_targets(rest, MODIFY_USAGE)?,
    })
}

fn parse_delay(args: &[String]) -> Result<ScaleCommand, CommandParseError> {
    let Some((mode, rest)) = args.split_first() else {
        return Err(CommandParseError::new(
            "missing delay mode (expected set|get)",
            DELAY_SET_USAGE,
        ));
    };
    match mode.to_ascii_lowercase().as_str() {
        "set" => {
            let (kind, rest) = split_kind(rest, DELAY_SET_USAGE)?;
            let Some((raw_ticks, rest)) = rest.split_first() else {
                return Err(CommandParseError::new(
                    "missing required argument <ticks>",
                    DELAY_SET_USAGE,
                ));
            };
            let ticks = raw_ticks.parse::<u32>().map_err(|_| {
                CommandParseError::new(
                    format!("invalid ticks '{raw_ticks}' (expected u32)"),
                    DELAY_SET_USAGE,
                )
            })?;
            Ok(ScaleCommand::SetDelay {
                kind,
                ticks,
                targets: parse_targets(rest, DELAY_SET_USAGE)?,
            })
        }
        "get" => {
            let (kind, rest) = split_kind(rest, DELAY_GET_USAGE)?;
            let target = single_target(rest, DELAY_GET_USAGE)?;
            Ok(ScaleCommand::GetDelay { kind, target })
        }
        other => Err(CommandParseError::new(
            format!("unknown delay mode '{other}' (expected set|get)"),
            DELAY_SET_USAGE,
        )),
    }
}

fn split_kind<'a>(
    args: &'a [String],
    usage: &str,
) -> Result<(Option<Identifier>, &'a [String]), CommandParseError> {
    let Some((first, rest)) = args.split_first() else {
        return Ok((None, args));
    };
    if first.starts_with('@') || first.parse::<f64>().is_ok() {
        return Ok((None, args));
    }
    let kind = Identifier::parse(first).map_err(|error| {
        CommandParseError::new(format!("invalid scale kind '{first}': {error}"), usage)
    })?;
    Ok((Some(kind), rest))
}

fn parse_target(raw: &str, usage: &str) -> Result<TargetSelector, CommandParseError> {
    match raw {
        "@s" => Ok(TargetSelector::Source),
        "@a" => Ok(TargetSelector::All),
        _ => raw
            .parse::<u32>()
            .map(|id| TargetSelector::Entity(EntityId(id)))
            .map_err(|_| {
                CommandParseError::new(
                    format!("invalid target '{raw}' (expected entity id, @s or @a)"),
                    usage,
                )
            }),
    }
}

fn parse_targets(args: &[String], usage: &str) -> Result<Vec<TargetSelector>, CommandParseError> {
    if args.is_empty() {
        return Ok(vec![TargetSelector::Source]);
    }
    args.iter().map(|raw| parse_target(raw, usage)).collect()
}

fn single_target(args: &[String], usage: &str) -> Result<TargetSelector, CommandParseError> {
    match args {
        [] => Ok(TargetSelector::Source),
        [raw] => match parse_target(raw, usage)? {
            TargetSelector::All => Err(CommandParseError::new(
                "query commands take a single entity",
                usage,
            )),
            target => Ok(target),
        },
        _ => Err(CommandParseError::new("unexpected extra arguments", usage)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Option<ScaleCommand>, CommandParseError> {
        CommandRegistry::with_builtins().parse_line(line)
    }

    #[test]
    fn help_lists_commands_in_registration_order() {
        let lines = CommandRegistry::with_builtins().help_lines();
        assert_eq!(lines[0], "help - List commands");
        assert_eq!(
            lines[1],
            "scale <set|add|subtract|multiply|divide|get|reset|delay> ... - Get, change or reset entity scales"
        );
    }

    #[test]
    fn modify_with_and_without_kind() {
        assert_eq!(
            parse("scale set 2").expect("parse"),
            Some(ScaleCommand::Modify {
                operation: ScaleOperation::Set,
                kind: None,
                value: 2.0,
                targets: vec![TargetSelector::Source],
            })
        );
        assert_eq!(
            parse("SCALE multiply width 0.5 3 @a").expect("parse"),
            Some(ScaleCommand::Modify {
                operation: ScaleOperation::Multiply,
                kind: Some(Identifier::scaling("width")),
                value: 0.5,
                targets: vec![TargetSelector::Entity(EntityId(3)), TargetSelector::All],
            })
        );
    }

    #[test]
    fn queries_accept_optional_kind_and_entity() {
        assert_eq!(
            parse("scale get").expect("parse"),
            Some(ScaleCommand::Get {
                kind: None,
                target: TargetSelector::Source,
            })
        );
        assert_eq!(
            parse("scale delay get scaling:reach 9").expect("parse"),
            Some(ScaleCommand::GetDelay {
                kind: Some(Identifier::scaling("reach")),
                target: TargetSelector::Entity(EntityId(9)),
            })
        );
        assert_eq!(
            parse("scale delay set 40 @s 2").expect("parse"),
            Some(ScaleCommand::SetDelay {
                kind: None,
                ticks: 40,
                targets: vec![TargetSelector::Source, TargetSelector::Entity(EntityId(2))],
            })
        );
        assert_eq!(
            parse("scale reset").expect("parse"),
            Some(ScaleCommand::Reset {
                kind: None,
                targets: vec![TargetSelector::Source],
            })
        );
    }

    #[test]
    fn bad_arguments_report_usage() {
        let err = parse("scale add").expect_err("missing value");
        assert_eq!(err.reason, "missing required argument <value>");
        assert_eq!(err.usage, MODIFY_USAGE);

        let err = parse("scale divide 0").expect_err("zero");
        assert_eq!(err.reason, "cannot divide by zero");

        let err = parse("scale set NaN").expect_err("nan");
        assert_eq!(err.reason, "invalid value 'NaN' (expected finite f32)");

        let err = parse("scale set Big 2").expect_err("kind");
        assert!(err.reason.starts_with("invalid scale kind 'Big'"), "{}", err.reason);

        let err = parse("scale get base @a").expect_err("all");
        assert_eq!(err.usage, GET_USAGE);

        let err = parse("scale delay set base -1").expect_err("ticks");
        assert_eq!(err.reason, "invalid ticks '-1' (expected u32)");

        let err = parse("scale shrink").expect_err("unknown");
        assert_eq!(
            err.to_string(),
            format!("unknown subcommand 'shrink'. usage: {SCALE_USAGE}")
        );
    }

    #[test]
    fn unknown_command_and_blank_lines() {
        assert_eq!(parse("   ").expect("blank"), None);
        assert_eq!(
            parse("grow").expect_err("unknown").to_string(),
            "unknown command 'grow'. usage: help"
        );
    }

    #[test]
    fn operations_apply_to_current_value() {
        assert_eq!(ScaleOperation::Set.apply(3.0, 2.0), 2.0);
        assert_eq!(ScaleOperation::Add.apply(3.0, 2.0), 5.0);
        assert_eq!(ScaleOperation::Subtract.apply(3.0, 2.0), 1.0);
        assert_eq!(ScaleOperation::Multiply.apply(3.0, 2.0), 6.0);
        assert_eq!(ScaleOperation::Divide.apply(3.0, 2.0), 1.5);
    }

    #[test]
    fn tokenizer_handles_quotes_and_errors() {
        assert_eq!(
            tokenize_line("scale get \"scaling:base\" 1").expect("tokens"),
            vec!["scale", "get", "scaling:base", "1"]
        );
        assert_eq!(tokenize_line("a \"\" b").expect("tokens"), vec!["a", "", "b"]);
        assert!(tokenize_line("scale \"oops").is_err());
    }

    #[test]
    fn registry_rejects_duplicate_names_case_insensitively() {
        let mut registry = CommandRegistry::with_builtins();
        let err = registry
            .register("Scale", "dup", "", |_: &[String]| Ok(ScaleCommand::Help))
            .expect_err("duplicate");
        assert_eq!(err, "duplicate command registration: Scale");
    }
}
