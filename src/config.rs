//! Adapter configuration, layered CLI flags > `yadap.toml` file >
//! compiled-in defaults, via `serde` + `toml` under a `clap` CLI.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::args::Args;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub trace_wire: bool,
    pub log_file: Option<PathBuf>,
    pub rust_log: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            trace_wire: false,
            log_file: None,
            rust_log: None,
        }
    }
}

/// Mirrors `Config` but with every field optional, so a partial
/// `yadap.toml` only overrides what it actually names.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    trace_wire: Option<bool>,
    log_file: Option<PathBuf>,
    rust_log: Option<String>,
}

impl Config {
    /// Resolves the effective configuration: start from defaults, layer
    /// in `yadap.toml` if present, then let CLI flags win last.
    pub fn resolve(args: &Args) -> anyhow::Result<Config> {
        let mut config = Config::default();

        let file_path = args
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from("yadap.toml"));
        if let Some(file_config) = Self::read_file(&file_path)? {
            if let Some(trace_wire) = file_config.trace_wire {
                config.trace_wire = trace_wire;
            }
            if let Some(log_file) = file_config.log_file {
                config.log_file = Some(log_file);
            }
            if let Some(rust_log) = file_config.rust_log {
                config.rust_log = Some(rust_log);
            }
        }

        if args.debug {
            config.trace_wire = true;
        }
        if let Some(log_file) = &args.log_file {
            config.log_file = Some(log_file.clone());
        }
        if config.trace_wire && config.log_file.is_none() {
            config.log_file = Some(PathBuf::from("yadap.debug.log"));
        }

        Ok(config)
    }

    /// Returns `Ok(None)` when `path` doesn't exist - a missing
    /// `yadap.toml` is not an error, only an absent override layer. An
    /// explicit `--config` path that is missing still surfaces the read
    /// error instead of silently falling through to defaults.
    fn read_file(path: &Path) -> anyhow::Result<Option<FileConfig>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let parsed: FileConfig = toml::from_str(&contents)?;
                Ok(Some(parsed))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_with_config(path: PathBuf) -> Args {
        Args {
            config: Some(path),
            ..Args::default()
        }
    }

    #[test]
    fn defaults_when_no_file_and_no_flags() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("yadap.toml");
        let config = Config::resolve(&args_with_config(missing)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yadap.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "trace_wire = true").unwrap();
        writeln!(file, "log_file = \"/tmp/from-file.log\"").unwrap();
        drop(file);

        let config = Config::resolve(&args_with_config(path)).unwrap();
        assert!(config.trace_wire);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/from-file.log")));
    }

    #[test]
    fn cli_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yadap.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "trace_wire = false").unwrap();
        writeln!(file, "log_file = \"/tmp/from-file.log\"").unwrap();
        drop(file);

        let mut args = args_with_config(path);
        args.debug = true;
        args.log_file = Some(PathBuf::from("/tmp/from-cli.log"));

        let config = Config::resolve(&args).unwrap();
        assert!(config.trace_wire);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/from-cli.log")));
    }

    #[test]
    fn file_can_set_rust_log_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yadap.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "rust_log = \"yadap=debug\"").unwrap();
        drop(file);

        let config = Config::resolve(&args_with_config(path)).unwrap();
        assert_eq!(config.rust_log.as_deref(), Some("yadap=debug"));
    }

    #[test]
    fn debug_flag_without_log_file_defaults_to_cwd_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("yadap.toml");
        let mut args = args_with_config(missing);
        args.debug = true;
        let config = Config::resolve(&args).unwrap();
        assert_eq!(config.log_file, Some(PathBuf::from("yadap.debug.log")));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yadap.toml");
        std::fs::write(&path, "this is not valid toml = = =").unwrap();
        assert!(Config::resolve(&args_with_config(path)).is_err());
    }
}
