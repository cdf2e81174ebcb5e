use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use scale_engine::{compile_scale_kind_defs, ScaleConfig, ScaleRegistries};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub(crate) const CONTENT_DIR_ENV_VAR: &str = "SCALE_HOST_CONTENT_DIR";
pub(crate) const SAVE_PATH_ENV_VAR: &str = "SCALE_HOST_SAVE_PATH";
const DEFAULT_SAVE_PATH: &str = "scale_save.json";

pub(crate) struct AppWiring {
    pub(crate) registries: Arc<ScaleRegistries>,
    pub(crate) config: ScaleConfig,
    pub(crate) save_path: PathBuf,
}

pub(crate) fn build_app() -> Result<AppWiring, String> {
    init_tracing();
    info!("=== Scale Host Startup ===");

    let content_dir = env_path(CONTENT_DIR_ENV_VAR);
    let registries = build_registries(content_dir.as_deref())?;
    let config = ScaleConfig::from_env();
    let save_path =
        env_path(SAVE_PATH_ENV_VAR).unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_PATH));

    info!(
        kinds = registries.kinds().len(),
        modifiers = registries.modifiers().len(),
        caching = config.caching_enabled,
        save_path = %save_path.display(),
        "startup_wiring_ready"
    );

    Ok(AppWiring {
        registries: Arc::new(registries),
        config,
        save_path,
    })
}

/// Built-in kinds plus every kind def compiled from `content_dir`.
pub(crate) fn build_registries(content_dir: Option<&Path>) -> Result<ScaleRegistries, String> {
    let mut registries = ScaleRegistries::with_builtins();
    let Some(dir) = content_dir else {
        return Ok(registries);
    };
    if !dir.is_dir() {
        warn!(
            content_dir = %dir.display(),
            "content dir missing; using built-in kinds only"
        );
        return Ok(registries);
    }
    let defs = compile_scale_kind_defs(dir).map_err(|err| format!("compile kind defs: {err}"))?;
    registries
        .register_kind_defs(defs)
        .map_err(|err| format!("register kind defs: {err}"))?;
    Ok(registries)
}

fn env_path(var: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(PathBuf::from(value.trim())),
        Ok(_) | Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(env_var = var, error = %err, "unable to read env var; ignoring");
            None
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use std::fs;

    use scale_engine::Identifier;

    use super::*;

    #[test]
    fn registries_without_content_dir_hold_builtins() {
        let registries = build_registries(None).expect("builtins");
        assert!(registries.kinds().get(&Identifier::scaling("base")).is_some());
    }

    #[test]
    fn missing_content_dir_falls_back_to_builtins() {
        let temp = tempfile::tempdir().expect("temp");
        let missing = temp.path().join("absent");
        let registries = build_registries(Some(&missing)).expect("builtins");
        assert_eq!(
            registries.kinds().len(),
            ScaleRegistries::with_builtins().kinds().len()
        );
    }

    #[test]
    fn content_dir_kinds_are_registered() {
        let temp = tempfile::tempdir().expect("temp");
        fs::write(
            temp.path().join("kinds.xml"),
            r#"<Defs>
  <ScaleKindDef>
    <id>demo:tail</id>
    <defaultBaseScale>0.5</defaultBaseScale>
  </ScaleKindDef>
</Defs>"#,
        )
        .expect("write defs");

        let registries = build_registries(Some(temp.path())).expect("compile");
        let id = Identifier::parse("demo:tail").expect("identifier");
        let tail = registries.kinds().get(&id).expect("tail kind");
        assert_eq!(tail.default_base_scale(), 0.5);
    }

    #[test]
    fn broken_content_is_a_startup_error() {
        let temp = tempfile::tempdir().expect("temp");
        fs::write(temp.path().join("broken.xml"), "<Defs><ScaleKindDef>").expect("write");
        let err = build_registries(Some(temp.path())).expect_err("malformed xml");
        assert!(err.starts_with("compile kind defs:"), "{err}");
    }
}
