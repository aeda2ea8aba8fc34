//! # World Configuration
//!
//! Storage tuning loaded once at world creation, from code or TOML:
//!
//! ```toml
//! chunk_bytes = 16384
//! row_tracking = true
//! initial_entities = 4096
//! zobrist_seed = 42
//! ```
//!
//! Missing keys take their defaults; unknown keys are rejected.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, EcsResult};

/// Default chunk byte budget (16 KiB).
pub const DEFAULT_CHUNK_BYTES: usize = 16 * 1024;

/// Default seed of the zobrist key generator.
pub const DEFAULT_ZOBRIST_SEED: u64 = 0x7E55_E8A0_C0DE_5EED;

/// Storage parameters of a world.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Byte budget of one chunk; rows per chunk derive from it.
    pub chunk_bytes: usize,
    /// Keep per-row change stamps in addition to chunk-wide ones.
    pub row_tracking: bool,
    /// Entities to pre-size the index and free list for.
    pub initial_entities: usize,
    /// Seed of the zobrist keys. Fixed seeds give reproducible archetype ids.
    pub zobrist_seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            row_tracking: true,
            initial_entities: 0,
            zobrist_seed: DEFAULT_ZOBRIST_SEED,
        }
    }
}

impl WorldConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] on syntax errors, unknown keys or
    /// invalid values.
    pub fn from_toml_str(source: &str) -> EcsResult<Self> {
        let config: Self = toml::from_str(source).map_err(|err| EcsError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        tracing::info!(
            chunk_bytes = config.chunk_bytes,
            row_tracking = config.row_tracking,
            initial_entities = config.initial_entities,
            "loaded world config"
        );
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] if the file cannot be read or is
    /// not a valid configuration.
    pub fn from_toml_file(path: impl AsRef<Path>) -> EcsResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|err| EcsError::InvalidConfig(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] naming the offending key.
    pub fn validate(&self) -> EcsResult<()> {
        if self.chunk_bytes == 0 {
            return Err(EcsError::InvalidConfig("chunk_bytes must be greater than zero".into()));
        }
        if self.initial_entities >= i32::MAX as usize {
            return Err(EcsError::InvalidConfig(format!(
                "initial_entities must be below {}",
                i32::MAX
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorldConfig::default();
        assert_eq!(config.chunk_bytes, 16384);
        assert!(config.row_tracking);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = WorldConfig::from_toml_str("row_tracking = false\ninitial_entities = 64\n").unwrap();
        assert!(!config.row_tracking);
        assert_eq!(config.initial_entities, 64);
        assert_eq!(config.chunk_bytes, DEFAULT_CHUNK_BYTES);
    }

    #[test]
    fn test_rejects_unknown_keys_and_zero_chunks() {
        assert!(matches!(
            WorldConfig::from_toml_str("chunk_size = 12"),
            Err(EcsError::InvalidConfig(_))
        ));
        assert!(matches!(
            WorldConfig::from_toml_str("chunk_bytes = 0"),
            Err(EcsError::InvalidConfig(message)) if message.contains("chunk_bytes")
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            WorldConfig::from_toml_file("/nonexistent/tessera.toml"),
            Err(EcsError::InvalidConfig(_))
        ));
    }
}
