// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

//! Typed configuration schema.
//!
//! String-valued fields (`mode`) are kept as strings here and parsed into
//! the closed enums of the core crates during validation; this is the one
//! place an "unknown mode"/"unknown channel type" error can originate.

use serde::{Deserialize, Serialize};

/// Top-level configuration, `megfield.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MegfieldConfig {
    pub mapping: MappingSettings,
    pub tables: TableSettings,
}

impl Default for MegfieldConfig {
    fn default() -> Self {
        Self {
            mapping: MappingSettings::default(),
            tables: TableSettings::default(),
        }
    }
}

/// `[mapping]` section: knobs of the mapping construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingSettings {
    /// "fast", "accurate" or "exact"
    pub mode: String,
    /// Expansion origin in head coordinates (m)
    pub origin: [f64; 3],
    /// Integration radius (m)
    pub int_rad: f64,
    /// Eigenvalue-truncation shortfall
    pub miss: f64,
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self {
            mode: "fast".to_string(),
            origin: [0.0, 0.0, 0.04],
            int_rad: 0.006,
            miss: 1e-4,
        }
    }
}

/// `[tables]` section: Legendre table cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSettings {
    /// Directory for persisted tables; memory-only when unset
    pub cache_dir: Option<String>,
    /// Cos-angle grid intervals (must be even)
    pub n_interp: usize,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            cache_dir: None,
            n_interp: 20_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_roundtrip_through_toml() {
        let cfg = MegfieldConfig::default();
        let text = toml::to_string(&cfg).unwrap();
        let back: MegfieldConfig = toml::from_str(&text).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let cfg: MegfieldConfig = toml::from_str("[mapping]\nmode = \"accurate\"\n").unwrap();
        assert_eq!(cfg.mapping.mode, "accurate");
        assert_eq!(cfg.mapping.int_rad, 0.006);
        assert_eq!(cfg.tables.n_interp, 20_000);
    }
}
