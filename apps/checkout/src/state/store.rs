//! # Local Store
//!
//! Persistence port for client-held state (the cart and the attribution
//! session). A state holder loads once at startup and saves after every
//! mutation.
//!
//! ```text
//! CartState ──────────┐
//!                     ├──► LocalStore<T> ──► JsonFileStore  (cart.json)
//! AttributionState ───┘                  └─► MemoryStore    (tests)
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Local store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Stored state is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Load/save/clear for one value of client-held state.
pub trait LocalStore<T>: Send + Sync + fmt::Debug {
    /// Returns `None` when nothing has been saved.
    fn load(&self) -> StoreResult<Option<T>>;

    fn save(&self, value: &T) -> StoreResult<()>;

    /// Clearing an empty store is not an error.
    fn clear(&self) -> StoreResult<()>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// Keeps the value in process memory.
#[derive(Debug)]
pub struct MemoryStore<T> {
    value: Mutex<Option<T>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        MemoryStore {
            value: Mutex::new(None),
        }
    }

    /// A store that already holds `value`, as if saved by a previous run.
    pub fn with_value(value: T) -> Self {
        MemoryStore {
            value: Mutex::new(Some(value)),
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LocalStore<T> for MemoryStore<T>
where
    T: Clone + Send + fmt::Debug,
{
    fn load(&self) -> StoreResult<Option<T>> {
        let value = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(value.clone())
    }

    fn save(&self, value: &T) -> StoreResult<()> {
        let mut slot = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(value.clone());
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        let mut slot = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
        Ok(())
    }
}

// =============================================================================
// JSON file store
// =============================================================================

/// Stores the value as pretty JSON in a single file.
///
/// Writes go to `<file>.tmp` and are renamed into place, so a crash mid-write
/// leaves the previous state intact.
pub struct JsonFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl<T> fmt::Debug for JsonFileStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFileStore").field("path", &self.path).finish()
    }
}

impl<T> LocalStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> StoreResult<Option<T>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, value: &T) -> StoreResult<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_vec_pretty(value)?;
        let tmp = self.temp_path();
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
