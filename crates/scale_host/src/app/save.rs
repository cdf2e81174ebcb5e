use std::collections::HashSet;
use std::fs;
use std::path::Path;

use scale_engine::{save_json_atomic, Document, EntityId};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::world::World;

pub(crate) const SAVE_VERSION: u32 = 1;

type SaveLoadResult<T> = Result<T, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SaveFile {
    pub(crate) save_version: u32,
    pub(crate) next_entity_id: u32,
    pub(crate) entities: Vec<SavedEntity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SavedEntity {
    pub(crate) id: EntityId,
    #[serde(default)]
    pub(crate) document: Document,
}

pub(crate) fn capture(world: &World) -> SaveFile {
    let entities = world
        .stores()
        .map(|store| {
            let mut document = Document::new();
            store.write_document(&mut document);
            SavedEntity {
                id: store.entity(),
                document,
            }
        })
        .collect();
    SaveFile {
        save_version: SAVE_VERSION,
        next_entity_id: world.next_id(),
        entities,
    }
}

pub(crate) fn save_to_path(path: &Path, world: &World) -> SaveLoadResult<usize> {
    let save = capture(world);
    save_json_atomic(path, &save).map_err(|err| format!("write save: {err}"))?;
    info!(
        path = %path.display(),
        entities = save.entities.len(),
        "save_written"
    );
    Ok(save.entities.len())
}

/// Replaces `world`'s entities with the ones stored at `path`. The world is
/// left untouched when the file fails to parse or validate.
pub(crate) fn load_from_path(path: &Path, world: &mut World) -> SaveLoadResult<usize> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("read save {}: {err}", path.display()))?;
    let save = parse_save_json(&raw)?;
    validate_save(&save)?;
    apply_save(&save, world);
    info!(
        path = %path.display(),
        entities = save.entities.len(),
        "save_loaded"
    );
    Ok(save.entities.len())
}

pub(crate) fn apply_save(save: &SaveFile, world: &mut World) {
    world.clear();
    for entity in &save.entities {
        let store = world.insert(entity.id);
        store.read_document(&entity.document);
    }
    world.set_next_id(save.next_entity_id.max(world.next_id()));
}

pub(crate) fn parse_save_json(raw: &str) -> SaveLoadResult<SaveFile> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, SaveFile>(&mut deserializer) {
        Ok(save) => Ok(save),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse save json: {source}"))
            } else {
                Err(format!("parse save json at {path}: {source}"))
            }
        }
    }
}

pub(crate) fn validate_save(save: &SaveFile) -> SaveLoadResult<()> {
    if save.save_version != SAVE_VERSION {
        return Err(validation_err(
            "save_version",
            expected_actual(SAVE_VERSION, save.save_version),
        ));
    }
    if save.next_entity_id == 0 {
        return Err(validation_err("next_entity_id", "must be at least 1"));
    }
    let mut seen = HashSet::new();
    for (index, entity) in save.entities.iter().enumerate() {
        if !seen.insert(entity.id) {
            return Err(validation_err(
                &format!("entities[{index}].id"),
                format!("duplicate entity id {}", entity.id),
            ));
        }
    }
    Ok(())
}

fn validation_err(path: &str, message: impl std::fmt::Display) -> String {
    format!("invalid save at {path}: {message}")
}

fn expected_actual(expected: impl std::fmt::Display, actual: impl std::fmt::Display) -> String {
    format!("expected {expected}, got {actual}")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use scale_engine::{Identifier, ScaleConfig, ScaleRegistries, SimulationSide, DOCUMENT_KEY};

    use super::*;

    fn world() -> World {
        World::new(
            SimulationSide::Authoritative,
            Arc::new(ScaleRegistries::with_builtins()),
            ScaleConfig::default(),
        )
    }

    #[test]
    fn save_and_load_restore_scale_state() {
        let temp = tempfile::tempdir().expect("temp");
        let path = temp.path().join("save.json");

        let mut source = world();
        let a = source.spawn();
        let _b = source.spawn();
        let base = source
            .get(a)
            .expect("a")
            .get_by_id(&Identifier::scaling("base"));
        base.set_scale(2.5);
        assert_eq!(save_to_path(&path, &source).expect("save"), 2);

        let mut restored = world();
        restored.spawn();
        assert_eq!(load_from_path(&path, &mut restored).expect("load"), 2);
        assert_eq!(restored.len(), 2);
        let base = restored
            .get(a)
            .expect("a")
            .get_by_id(&Identifier::scaling("base"));
        assert_eq!(base.base_scale(), 2.5);
        assert_eq!(restored.spawn(), EntityId(3));
    }

    #[test]
    fn untouched_entities_save_empty_documents() {
        let mut source = world();
        source.spawn();
        let save = capture(&source);
        assert!(save.entities[0].document.get(DOCUMENT_KEY).is_none());
    }

    #[test]
    fn parse_errors_carry_json_path() {
        let raw = r#"{"save_version":1,"next_entity_id":2,"entities":[{"id":"x"}]}"#;
        let err = parse_save_json(raw).expect_err("bad id");
        assert!(err.starts_with("parse save json at entities[0].id:"), "{err}");

        let err = parse_save_json("not json").expect_err("garbage");
        assert!(err.starts_with("parse save json:"), "{err}");
    }

    #[test]
    fn validation_rejects_version_and_duplicates() {
        let mut save = capture(&world());
        save.save_version = 7;
        let err = validate_save(&save).expect_err("version");
        assert_eq!(err, "invalid save at save_version: expected 1, got 7");

        save.save_version = SAVE_VERSION;
        save.entities = vec![
            SavedEntity {
                id: EntityId(4),
                document: Document::new(),
            },
            SavedEntity {
                id: EntityId(4),
                document: Document::new(),
            },
        ];
        let err = validate_save(&save).expect_err("duplicate");
        assert!(err.contains("entities[1].id"), "{err}");
    }

    #[test]
    fn failed_load_keeps_world() {
        let temp = tempfile::tempdir().expect("temp");
        let path = temp.path().join("save.json");
        fs::write(&path, r#"{"save_version":99,"next_entity_id":1,"entities":[]}"#)
            .expect("write");

        let mut target = world();
        target.spawn();
        assert!(load_from_path(&path, &mut target).is_err());
        assert_eq!(target.len(), 1);
    }
}
