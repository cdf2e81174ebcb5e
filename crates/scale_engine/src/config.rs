use std::env;

use tracing::warn;

pub const CACHING_ENV_VAR: &str = "SCALE_ENGINE_CACHING";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleConfig {
    pub caching_enabled: bool,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            caching_enabled: true,
        }
    }
}

impl ScaleConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        match env::var(CACHING_ENV_VAR) {
            Ok(value) => match parse_switch(&value) {
                Some(enabled) => config.caching_enabled = enabled,
                None => {
                    warn!(
                        env_var = CACHING_ENV_VAR,
                        value = value.as_str(),
                        "invalid caching env var value; falling back to default"
                    );
                }
            },
            Err(env::VarError::NotPresent) => {}
            Err(err) => {
                warn!(
                    env_var = CACHING_ENV_VAR,
                    error = %err,
                    "unable to read caching env var; falling back to default"
                );
            }
        }
        config
    }
}

fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_accepts_common_spellings() {
        assert_eq!(parse_switch("OFF"), Some(false));
        assert_eq!(parse_switch(" 1 "), Some(true));
        assert_eq!(parse_switch("maybe"), None);
    }

    #[test]
    fn default_enables_caching() {
        assert!(ScaleConfig::default().caching_enabled);
    }
}
