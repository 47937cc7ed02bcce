use std::path::PathBuf;

const ENV_LOG: &str = "COURSEBOOKD_LOG";
const ENV_LOG_DIR: &str = "COURSEBOOKD_LOG_DIR";
const ENV_WORKSPACE: &str = "COURSEBOOKD_WORKSPACE";

/// Process-level settings. Workspace-level settings live in the `settings` store.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            log_level: non_empty(ENV_LOG).unwrap_or_else(|| "info".to_string()),
            log_dir: non_empty(ENV_LOG_DIR).map(PathBuf::from),
            workspace: non_empty(ENV_WORKSPACE).map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_unset_or_blank() {
        let env: HashMap<&str, &str> = [(ENV_LOG_DIR, "  ")].into_iter().collect();
        let cfg = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.log_dir.is_none());
        assert!(cfg.workspace.is_none());
    }

    #[test]
    fn reads_all_keys() {
        let env: HashMap<&str, &str> = [
            (ENV_LOG, "debug"),
            (ENV_LOG_DIR, "/tmp/logs"),
            (ENV_WORKSPACE, "/tmp/ws"),
        ]
        .into_iter()
        .collect();
        let cfg = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.log_dir, Some(PathBuf::from("/tmp/logs")));
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/ws")));
    }
}
