use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use scale_engine::command::tokenize_line;
use scale_engine::registry::kinds;
use scale_engine::{
    apply_sync_message, decode_batch, encode_batch, flush_dirty, tracking_snapshot,
    CommandProcessor, EntityId, Identifier, ScaleSyncMessage, SimulationSide, WireError,
};
use tracing::{debug, error, info, warn};

use super::bootstrap::AppWiring;
use super::save;
use super::world::World;

const HOST_HELP: &[&str] = &[
    "spawn - create an entity and select it",
    "select <id> - make <id> the command source",
    "track <id> / untrack <id> - start or stop replicating <id>",
    "tick [count] - advance both sides and deliver pending sync",
    "status - show authoritative and replica base scales",
    "save / load - write or read the save file",
    "quit - exit",
];

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut session = HostSession::new(app);
    match session.run(stdin.lock(), stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "host_loop_failed");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Authoritative world, its replica, and the in-process link between them.
pub(crate) struct HostSession {
    authoritative: World,
    replica: World,
    processor: CommandProcessor,
    save_path: PathBuf,
    tracked: BTreeSet<EntityId>,
    source: Option<EntityId>,
    tick_count: u64,
}

impl HostSession {
    pub(crate) fn new(app: AppWiring) -> Self {
        Self {
            authoritative: World::new(
                SimulationSide::Authoritative,
                Arc::clone(&app.registries),
                app.config,
            ),
            replica: World::new(SimulationSide::Replica, Arc::clone(&app.registries), app.config),
            processor: CommandProcessor::new(app.registries),
            save_path: app.save_path,
            tracked: BTreeSet::new(),
            source: None,
            tick_count: 0,
        }
    }

    pub(crate) fn run(&mut self, input: impl BufRead, mut output: impl Write) -> io::Result<()> {
        for line in input.lines() {
            let line = line?;
            let (lines, flow) = self.handle_line(&line);
            for text in lines {
                writeln!(output, "{text}")?;
            }
            output.flush()?;
            if flow == Flow::Quit {
                break;
            }
        }
        info!(
            ticks = self.tick_count,
            entities = self.authoritative.len(),
            "host_loop_finished"
        );
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> (Vec<String>, Flow) {
        let tokens = match tokenize_line(line.trim()) {
            Ok(tokens) => tokens,
            Err(err) => return (vec![format!("error: {err}")], Flow::Continue),
        };
        let Some((name, args)) = tokens.split_first() else {
            return (Vec::new(), Flow::Continue);
        };
        let result = match name.to_ascii_lowercase().as_str() {
            "quit" | "exit" => return (Vec::new(), Flow::Quit),
            "help" => Ok(self.help_lines()),
            "spawn" => Ok(self.spawn()),
            "select" => parse_entity(args).map(|id| self.select(id)),
            "track" => parse_entity(args).and_then(|id| self.track(id)),
            "untrack" => parse_entity(args).map(|id| self.untrack(id)),
            "tick" => parse_tick_count(args).and_then(|count| self.tick(count)),
            "status" => Ok(self.status()),
            "save" => save::save_to_path(&self.save_path, &self.authoritative)
                .map(|count| vec![format!("saved {count} entities")]),
            "load" => self.load(),
            _ => self.run_scale_command(line),
        };
        match result {
            Ok(lines) => (lines, Flow::Continue),
            Err(err) => (vec![format!("error: {err}")], Flow::Continue),
        }
    }

    fn help_lines(&self) -> Vec<String> {
        let mut lines = self.processor.registry().help_lines();
        lines.extend(HOST_HELP.iter().map(|line| (*line).to_string()));
        lines
    }

    fn spawn(&mut self) -> Vec<String> {
        let id = self.authoritative.spawn();
        self.source = Some(id);
        vec![format!("spawned entity {id}")]
    }

    fn select(&mut self, id: EntityId) -> Vec<String> {
        self.source = Some(id);
        vec![format!("selected entity {id}")]
    }

    /// Sends a full snapshot so the replica starts from the current state.
    fn track(&mut self, id: EntityId) -> Result<Vec<String>, String> {
        let store = self
            .authoritative
            .get(id)
            .ok_or_else(|| format!("unknown entity {id}"))?;
        let snapshot = tracking_snapshot(&store);
        let applied = self.deliver(&snapshot).map_err(|err| format!("sync: {err}"))?;
        self.tracked.insert(id);
        Ok(vec![format!("tracking entity {id} ({applied} scales)")])
    }

    fn untrack(&mut self, id: EntityId) -> Vec<String> {
        self.tracked.remove(&id);
        vec![format!("stopped tracking entity {id}")]
    }

    fn tick(&mut self, count: u32) -> Result<Vec<String>, String> {
        let mut synced = 0;
        for _ in 0..count {
            self.authoritative.tick();
            synced += self.sync_tracked().map_err(|err| format!("sync: {err}"))?;
            self.replica.tick();
            self.tick_count += 1;
        }
        Ok(vec![format!(
            "ticked {count} (total {}), synced {synced} messages",
            self.tick_count
        )])
    }

    fn sync_tracked(&mut self) -> Result<usize, WireError> {
        let mut outbox = Vec::new();
        for id in &self.tracked {
            let Some(store) = self.authoritative.get(*id) else {
                continue;
            };
            flush_dirty(&store, |message| {
                outbox.push(message);
                Ok::<(), WireError>(())
            })?;
        }
        if outbox.is_empty() {
            return Ok(0);
        }
        self.deliver(&outbox)
    }

    /// Round-trips `messages` through the wire format and applies them to
    /// the replica world.
    fn deliver(&mut self, messages: &[ScaleSyncMessage]) -> Result<usize, WireError> {
        let bytes = encode_batch(messages)?;
        debug!(messages = messages.len(), bytes = bytes.len(), "sync_batch_sent");
        let mut applied = 0;
        for message in decode_batch(&bytes)? {
            let store = self.replica.insert(message.entity);
            if apply_sync_message(&store, &message) {
                applied += 1;
            }
        }
        Ok(applied)
    }

    fn status(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for store in self.authoritative.stores() {
            let id = store.entity();
            let data = store.get_by_id(&base_id());
            let replica = match self.replica.get(id) {
                Some(replica) if self.tracked.contains(&id) => {
                    format!("{:?}", replica.get_by_id(&base_id()).base_scale())
                }
                _ => "-".to_string(),
            };
            lines.push(format!(
                "entity {id}: base={:?} target={:?} ticks={}/{} replica={replica}",
                data.base_scale(),
                data.target_scale(),
                data.scale_ticks(),
                data.scale_tick_delay(),
            ));
        }
        if lines.is_empty() {
            lines.push("no entities".to_string());
        }
        lines
    }

    /// Replaces the authoritative world and re-snapshots every tracked entity
    /// that still exists.
    fn load(&mut self) -> Result<Vec<String>, String> {
        let count = save::load_from_path(&self.save_path, &mut self.authoritative)?;
        self.replica.clear();
        let tracked: Vec<EntityId> = std::mem::take(&mut self.tracked).into_iter().collect();
        for id in tracked {
            if self.authoritative.get(id).is_some() {
                self.track(id)?;
            } else {
                warn!(entity = id.0, "tracked_entity_missing_after_load");
            }
        }
        if let Some(source) = self.source {
            if self.authoritative.get(source).is_none() {
                self.source = None;
            }
        }
        Ok(vec![format!("loaded {count} entities")])
    }

    fn run_scale_command(&mut self, line: &str) -> Result<Vec<String>, String> {
        let outcome = self
            .processor
            .run_line(line, self.source, &self.authoritative)
            .map_err(|err| err.to_string())?;
        let mut lines = outcome.feedback;
        if outcome.affected > 0 {
            lines.push(format!("updated {} entities", outcome.affected));
        }
        Ok(lines)
    }
}

fn base_id() -> Identifier {
    Identifier::scaling(kinds::BASE)
}

fn parse_entity(args: &[String]) -> Result<EntityId, String> {
    match args {
        [raw] => raw
            .parse::<u32>()
            .map(EntityId)
            .map_err(|_| format!("invalid entity id '{raw}'")),
        _ => Err("expected exactly one entity id".to_string()),
    }
}

fn parse_tick_count(args: &[String]) -> Result<u32, String> {
    match args {
        [] => Ok(1),
        [raw] => match raw.parse::<u32>() {
            Ok(count) if count > 0 => Ok(count),
            _ => Err(format!("invalid tick count '{raw}'")),
        },
        _ => Err("usage: tick [count]".to_string()),
    }
}
