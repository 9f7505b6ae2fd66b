use std::sync::Arc;

use serde::Deserialize;

use crate::{MemoryBackingStore, backends::FileBackingStore, r#trait::BackingStore};

/// Configuration for the spool backing store
///
/// File-backed spool in RON config (with `unwrap_variant_newtypes` enabled):
/// ```ron
/// spool: File(
///     path: "/var/spool/ballot",
/// ),
/// ```
///
/// Memory-backed spool (nothing survives a restart):
/// ```ron
/// spool: Memory,
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum SpoolConfig {
    /// File-based spool (production)
    File(FileBackingStore),
    /// Memory-based spool (testing/development)
    Memory,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self::File(FileBackingStore::default())
    }
}

impl SpoolConfig {
    /// Get the filesystem path for file-backed spools, if applicable
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File(store) => Some(store.path()),
            Self::Memory => None,
        }
    }

    /// Initialise and return the configured backing store
    ///
    /// # Errors
    /// If a file-backed spool directory cannot be prepared
    pub fn into_backing_store(self) -> crate::Result<Arc<dyn BackingStore>> {
        match self {
            Self::File(store) => {
                store.init()?;
                Ok(Arc::new(store))
            }
            Self::Memory => Ok(Arc::new(MemoryBackingStore::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ron::error::SpannedResult<SpoolConfig> {
        ron::from_str(&format!("#![enable(unwrap_variant_newtypes)]\n{source}"))
    }

    #[test]
    fn test_file_config_from_ron() {
        let config = parse(r#"File(path: "/var/spool/ballot-test")"#).expect("parse");
        assert_eq!(
            config.path(),
            Some(std::path::Path::new("/var/spool/ballot-test"))
        );
    }

    #[test]
    fn test_memory_config_from_ron() {
        let config = parse("Memory").expect("parse");
        assert!(config.path().is_none());
    }

    #[test]
    fn test_config_rejects_unsafe_paths() {
        assert!(parse(r#"File(path: "/etc/ballot")"#).is_err());
        assert!(parse(r#"File(path: "relative")"#).is_err());
    }
}
