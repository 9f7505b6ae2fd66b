use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ballot_common::{Envelope, internal};
use ballot_tracing::traced;
use serde::{Deserialize, Serialize};
use tokio::{fs, io::AsyncWriteExt};

use crate::{SerializationError, ValidationError, r#trait::BackingStore};

const SNAPSHOT_FILE: &str = "pending.bin";
const TEMP_PREFIX: &str = ".tmp_";
const CORRUPT_SUFFIX: &str = ".corrupt";
const SNAPSHOT_VERSION: u32 = 1;
/// Largest snapshot that will be decoded (1 GiB)
const MAX_SNAPSHOT_SIZE: usize = 1024 * 1024 * 1024;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    envelopes: &'a [Envelope],
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    envelopes: Vec<Envelope>,
}

/// File-based backing store
///
/// The whole pending set lives in a single bincode snapshot,
/// `{path}/pending.bin`, rewritten on every mutation.
///
/// # Atomicity
/// Each write goes to `.tmp_pending.bin`, is synced, and is then renamed over
/// the live snapshot. A crash mid-write leaves the previous snapshot intact;
/// the stray temp file is removed by `init()`.
///
/// # Recovery
/// A snapshot that fails to decode is moved aside to `pending.bin.corrupt`
/// for inspection and reported as an error. The spool then starts empty.
///
/// # Security
/// The configured path must be absolute, free of `..` components, and
/// outside well-known system directories.
#[derive(Debug, Clone)]
pub struct FileBackingStore {
    path: PathBuf,
}

impl Default for FileBackingStore {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/spool/ballot"),
        }
    }
}

// Custom Deserialize implementation with path validation
impl<'de> Deserialize<'de> for FileBackingStore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct FileBackingStoreHelper {
            path: PathBuf,
        }

        let helper = FileBackingStoreHelper::deserialize(deserializer)?;
        Self::validate_path(&helper.path).map_err(serde::de::Error::custom)?;

        Ok(Self { path: helper.path })
    }
}

impl FileBackingStore {
    /// Validate a spool path
    ///
    /// # Errors
    /// If the path is relative, contains `..`, or points into a system
    /// directory
    fn validate_path(path: &Path) -> Result<(), ValidationError> {
        if path
            .components()
            .any(|component| component == std::path::Component::ParentDir)
        {
            return Err(ValidationError::ParentComponent(path.display().to_string()));
        }

        if !path.is_absolute() {
            return Err(ValidationError::NotAbsolute(path.display().to_string()));
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        if let Some(prefix) = sensitive_prefixes
            .iter()
            .find(|prefix| path.starts_with(prefix))
        {
            return Err(ValidationError::SystemDirectory {
                prefix: (*prefix).to_string(),
                path: path.display().to_string(),
            });
        }

        Ok(())
    }

    #[must_use]
    pub fn builder() -> FileBackingStoreBuilder {
        FileBackingStoreBuilder::default()
    }

    /// Directory holding the snapshot
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn snapshot_path(&self) -> PathBuf {
        self.path.join(SNAPSHOT_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.path.join(format!("{TEMP_PREFIX}{SNAPSHOT_FILE}"))
    }

    fn corrupt_path(&self) -> PathBuf {
        self.path.join(format!("{SNAPSHOT_FILE}{CORRUPT_SUFFIX}"))
    }

    /// Prepare the spool directory
    ///
    /// Creates the directory if it doesn't exist, fails if the path is not a
    /// directory, and removes temp files left behind by a crash mid-write.
    ///
    /// # Errors
    /// If the directory cannot be created or read
    pub fn init(&self) -> crate::Result<()> {
        internal!("Initialising spool at {}", self.path.display());

        if !self.path.try_exists()? {
            internal!("{} does not exist, creating...", self.path.display());
            std::fs::create_dir_all(&self.path)?;
        } else if !self.path.is_dir() {
            return Err(ValidationError::NotDirectory(self.path.display().to_string()).into());
        }

        let mut cleaned = 0;
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                std::fs::remove_file(entry.path())?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} partial snapshot writes from spool"
            );
        }

        Ok(())
    }

    fn decode_snapshot(bytes: &[u8]) -> Result<Vec<Envelope>, SerializationError> {
        let (snapshot, read): (Snapshot, usize) =
            bincode::serde::decode_from_slice(
                bytes,
                bincode::config::legacy().with_limit::<MAX_SNAPSHOT_SIZE>(),
            )?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SerializationError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        if read != bytes.len() {
            return Err(SerializationError::Corrupted(format!(
                "{} unread bytes after snapshot",
                bytes.len() - read
            )));
        }

        Ok(snapshot.envelopes)
    }
}

#[async_trait]
impl BackingStore for FileBackingStore {
    async fn load(&self) -> crate::Result<Vec<Envelope>> {
        let path = self.snapshot_path();

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                internal!(level = DEBUG, "No snapshot at {}, spool is empty", path.display());
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        match Self::decode_snapshot(&bytes) {
            Ok(envelopes) => Ok(envelopes),
            Err(err) => {
                let quarantine = self.corrupt_path();
                fs::rename(&path, &quarantine).await?;
                internal!(
                    level = ERROR,
                    "Snapshot {} is unreadable, moved to {}: {err}",
                    path.display(),
                    quarantine.display()
                );
                Err(err.into())
            }
        }
    }

    async fn persist(&self, snapshot: &[Envelope]) -> crate::Result<()> {
        write_snapshot(&self.temp_path(), &self.snapshot_path(), snapshot).await
    }
}

#[traced(instrument(level = tracing::Level::DEBUG, skip(snapshot), fields(count = snapshot.len())), timing(precision = "us"))]
async fn write_snapshot(temp: &Path, live: &Path, snapshot: &[Envelope]) -> crate::Result<()> {
    let bytes = bincode::serde::encode_to_vec(
        SnapshotRef {
            version: SNAPSHOT_VERSION,
            envelopes: snapshot,
        },
        bincode::config::legacy().with_limit::<MAX_SNAPSHOT_SIZE>(),
    )?;

    let mut file = fs::File::create(temp).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(temp, live).await?;

    Ok(())
}

/// Builder for `FileBackingStore`
#[derive(Debug, Default)]
pub struct FileBackingStoreBuilder {
    path: PathBuf,
}

impl FileBackingStoreBuilder {
    /// Set the spool directory path
    #[must_use]
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Build the final `FileBackingStore`
    ///
    /// # Errors
    /// If the path is invalid or potentially dangerous
    pub fn build(self) -> Result<FileBackingStore, ValidationError> {
        FileBackingStore::validate_path(&self.path)?;
        Ok(FileBackingStore { path: self.path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> FileBackingStore {
        let store = FileBackingStore::builder()
            .path(dir.path().join("spool"))
            .build()
            .expect("valid path");
        store.init().expect("init");
        store
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        assert!(store.load().await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let envelopes = vec![
            Envelope::new(3, b"three".as_slice()),
            Envelope::new(7, vec![0u8, 1, 2, 255]),
        ];

        store_in(&dir).persist(&envelopes).await.expect("persist");

        let reopened = store_in(&dir).load().await.expect("load");
        assert_eq!(reopened.len(), 2);
        for (loaded, original) in reopened.iter().zip(&envelopes) {
            assert_eq!(loaded.id(), original.id());
            assert_eq!(loaded.sequence(), original.sequence());
            assert_eq!(loaded.state(), original.state());
            assert_eq!(loaded.payload(), original.payload());
        }
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_quarantined() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        std::fs::write(store.snapshot_path(), b"not a snapshot").expect("write");

        assert!(store.load().await.is_err());
        assert!(!store.snapshot_path().exists());
        assert!(store.corrupt_path().exists());

        // Once moved aside the store reads as empty
        assert!(store.load().await.expect("load").is_empty());
    }

    #[test]
    fn test_init_removes_partial_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        std::fs::write(store.temp_path(), b"half written").expect("write");

        store.init().expect("init");
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_init_rejects_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"").expect("write");

        let store = FileBackingStore::builder()
            .path(file)
            .build()
            .expect("valid path");
        assert!(matches!(
            store.init(),
            Err(crate::SpoolError::Validation(ValidationError::NotDirectory(_)))
        ));
    }
}
