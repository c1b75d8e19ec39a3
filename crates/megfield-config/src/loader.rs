// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support.
//!
//! Two-tier loading: the TOML file provides the base values, environment
//! variables override individual fields at runtime.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::MegfieldConfig;
use crate::{ConfigError, ConfigResult};

const CONFIG_FILE_NAME: &str = "megfield.toml";

/// Find the configuration file.
///
/// Search order:
/// 1. `MEGFIELD_CONFIG_PATH` environment variable
/// 2. Current working directory: `./megfield.toml`
/// 3. Parent directories (up to 5 levels, for workspace roots)
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("MEGFIELD_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "config file specified by MEGFIELD_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd;
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent.to_path_buf();
                }
                None => break,
            }
        }
    }
    for path in &search_paths {
        if path.is_file() {
            return Ok(path.clone());
        }
    }
    Err(ConfigError::FileNotFound(
        search_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    ))
}

/// Load configuration from `path`, or from the discovered file, or fall
/// back to defaults when no file exists anywhere. Environment overrides
/// are applied afterwards either way.
pub fn load_config(path: Option<&Path>) -> ConfigResult<MegfieldConfig> {
    let mut config = match path {
        Some(p) => parse_file(p)?,
        None => match find_config_file() {
            Ok(p) => parse_file(&p)?,
            Err(ConfigError::FileNotFound(_)) => MegfieldConfig::default(),
            Err(e) => return Err(e),
        },
    };
    apply_environment_overrides(&mut config)?;
    Ok(config)
}

fn parse_file(path: &Path) -> ConfigResult<MegfieldConfig> {
    let text = fs::read_to_string(path)?;
    toml::from_str(&text).map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
}

/// Apply `MEGFIELD_*` environment variable overrides.
///
/// Supported: `MEGFIELD_MODE`, `MEGFIELD_INT_RAD`, `MEGFIELD_MISS`,
/// `MEGFIELD_CACHE_DIR`, `MEGFIELD_N_INTERP`.
pub fn apply_environment_overrides(config: &mut MegfieldConfig) -> ConfigResult<()> {
    if let Ok(mode) = env::var("MEGFIELD_MODE") {
        config.mapping.mode = mode;
    }
    if let Ok(v) = env::var("MEGFIELD_INT_RAD") {
        config.mapping.int_rad = parse_env("MEGFIELD_INT_RAD", &v)?;
    }
    if let Ok(v) = env::var("MEGFIELD_MISS") {
        config.mapping.miss = parse_env("MEGFIELD_MISS", &v)?;
    }
    if let Ok(dir) = env::var("MEGFIELD_CACHE_DIR") {
        config.tables.cache_dir = Some(dir);
    }
    if let Ok(v) = env::var("MEGFIELD_N_INTERP") {
        config.tables.n_interp = parse_env("MEGFIELD_N_INTERP", &v)?;
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> ConfigResult<T> {
    value.parse().map_err(|_| {
        ConfigError::ValidationError(format!("{name}: cannot parse \"{value}\""))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("megfield.toml");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "[mapping]\nmode = \"accurate\"\nmiss = 1e-3").unwrap();
        drop(f);
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.mapping.mode, "accurate");
        assert_eq!(cfg.mapping.miss, 1e-3);
    }

    #[test]
    fn test_bad_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("megfield.toml");
        fs::write(&path, "not [valid toml").unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_io_error() {
        let err = load_config(Some(Path::new("/nonexistent/megfield.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
