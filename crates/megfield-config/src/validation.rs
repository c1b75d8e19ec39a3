// Copyright 2025 Openfield Neuroimaging
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation and conversion into core parameter types.

use megfield_interp::{MappingConfig, MappingMode};

use crate::types::MegfieldConfig;
use crate::ConfigError;

/// Check all fields and convert the `[mapping]` section into the core
/// [`MappingConfig`]. Every failure names the offending field.
pub fn validate_config(cfg: &MegfieldConfig) -> Result<MappingConfig, ConfigError> {
    let mode: MappingMode = cfg
        .mapping
        .mode
        .parse()
        .map_err(|e| ConfigError::ValidationError(format!("mapping.mode: {e}")))?;
    if !(cfg.mapping.int_rad > 0.0) {
        return Err(ConfigError::ValidationError(format!(
            "mapping.int_rad must be positive, got {}",
            cfg.mapping.int_rad
        )));
    }
    if !(cfg.mapping.miss > 0.0 && cfg.mapping.miss < 1.0) {
        return Err(ConfigError::ValidationError(format!(
            "mapping.miss must be in (0, 1), got {}",
            cfg.mapping.miss
        )));
    }
    if !cfg.mapping.origin.iter().all(|v| v.is_finite()) {
        return Err(ConfigError::ValidationError(
            "mapping.origin must be finite".to_string(),
        ));
    }
    if cfg.tables.n_interp == 0 || cfg.tables.n_interp % 2 != 0 {
        return Err(ConfigError::ValidationError(format!(
            "tables.n_interp must be even and positive, got {}",
            cfg.tables.n_interp
        )));
    }
    Ok(MappingConfig {
        mode,
        origin: cfg.mapping.origin,
        int_rad: cfg.mapping.int_rad,
        miss: cfg.mapping.miss,
        ..MappingConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MegfieldConfig;

    #[test]
    fn test_defaults_validate() {
        let cfg = MegfieldConfig::default();
        let mc = validate_config(&cfg).unwrap();
        assert_eq!(mc.mode, MappingMode::Fast);
        assert_eq!(mc.origin, [0.0, 0.0, 0.04]);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let mut cfg = MegfieldConfig::default();
        cfg.mapping.mode = "foo".to_string();
        let err = validate_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("mapping.mode"));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let mut cfg = MegfieldConfig::default();
        cfg.mapping.miss = 1.5;
        assert!(validate_config(&cfg).is_err());

        let mut cfg = MegfieldConfig::default();
        cfg.mapping.int_rad = 0.0;
        assert!(validate_config(&cfg).is_err());

        let mut cfg = MegfieldConfig::default();
        cfg.tables.n_interp = 101;
        assert!(validate_config(&cfg).is_err());
    }
}
