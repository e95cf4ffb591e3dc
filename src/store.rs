//! Store Module
//!
//! The public CRUD surface over one blob file.
//!
//! ## Responsibilities
//! - Serialize every call through one mutex around the engine
//! - Convert engine errors into a structured `StoreResult` (the only place
//!   errors are caught)
//! - Publish created/updated/deleted events after the mutation is flushed

use std::path::Path;
use std::sync::Arc;

use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::allocator::FitPolicy;
use crate::config::Config;
use crate::engine::{Engine, StoreStats, UpdateMode};
use crate::error::{BlobError, ErrorCode, Result};
use crate::events::{EventBus, StoreEvent, StoreObserver};
use crate::stream::{ByteStream, FileStream};

// =============================================================================
// Structured Result
// =============================================================================

/// Outcome of a store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreResult<T> {
    /// Whether the call took effect
    pub success: bool,

    /// `ErrorCode::Ok` on success
    pub code: ErrorCode,

    /// Human-readable messages (the error text on failure)
    pub messages: Vec<String>,

    /// Returned value, present only on success
    pub value: Option<T>,
}

impl<T> StoreResult<T> {
    /// Create a successful result
    pub fn ok(value: T) -> Self {
        Self {
            success: true,
            code: ErrorCode::Ok,
            messages: Vec::new(),
            value: Some(value),
        }
    }

    /// Create a failed result from an engine error
    pub fn failure(error: &BlobError) -> Self {
        Self {
            success: false,
            code: error.code(),
            messages: vec![error.to_string()],
            value: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Numeric error code
    pub fn code(&self) -> u16 {
        self.code.as_u16()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }
}

impl<T> From<Result<T>> for StoreResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(e) => Self::failure(&e),
        }
    }
}

// =============================================================================
// Blob Store
// =============================================================================

/// A blob store over one byte stream (a file unless stated otherwise)
pub struct BlobStore<S: ByteStream = FileStream> {
    engine: Mutex<Engine<S>>,
    events: EventBus,
}

impl BlobStore<FileStream> {
    /// Open or create the blob file described by `config`
    pub fn open(config: Config) -> Result<Self> {
        let stream = FileStream::open(&config)?;
        info!(path = %config.path.display(), "Opening blob store");
        Self::with_stream(stream, config.fit_policy)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified file path
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().path(path).build())
    }
}

impl<S: ByteStream> BlobStore<S> {
    /// Open a store over an arbitrary stream
    pub fn with_stream(stream: S, fit_policy: FitPolicy) -> Result<Self> {
        let engine = Engine::open(stream, fit_policy)?;
        Ok(Self {
            engine: Mutex::new(engine),
            events: EventBus::default(),
        })
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Reserve a key for a later `create_with_key`
    pub fn reserve_next_key(&self) -> StoreResult<u32> {
        let result = self.engine.lock().reserve_key();
        self.finish("reserve_next_key", result, |_| None)
    }

    /// Store a new blob under a fresh key
    pub fn create(&self, payload: &[u8]) -> StoreResult<u32> {
        let result = self.engine.lock().insert(payload);
        self.finish("create", result, |&key| Some(StoreEvent::Created { key }))
    }

    /// Store a new blob under a reserved key; fails if the key is in use
    pub fn create_with_key(&self, key: u32, payload: &[u8]) -> StoreResult<()> {
        let result = self.engine.lock().insert_with_key(key, payload);
        self.finish("create_with_key", result, |_| Some(StoreEvent::Created { key }))
    }

    /// Read the blob stored under `key`
    pub fn read(&self, key: u32) -> StoreResult<Vec<u8>> {
        let result = self.engine.lock().read(key);
        self.finish("read", result, |_| None)
    }

    /// Replace the blob stored under `key`
    pub fn update(&self, key: u32, payload: &[u8]) -> StoreResult<()> {
        let result = self.engine.lock().update(key, payload);
        self.finish("update", result, |_| Some(StoreEvent::Updated { key }))
    }

    /// Replace the blob stored under `key` without checking that its
    /// record looks like a blob record
    pub fn update_unchecked(&self, key: u32, payload: &[u8]) -> StoreResult<()> {
        let result = self
            .engine
            .lock()
            .update_with(key, payload, UpdateMode::Unchecked);
        self.finish("update_unchecked", result, |_| Some(StoreEvent::Updated { key }))
    }

    /// Remove the blob stored under `key`
    pub fn delete(&self, key: u32) -> StoreResult<()> {
        let result = self.engine.lock().delete(key);
        self.finish("delete", result, |_| Some(StoreEvent::Deleted { key }))
    }

    pub fn exists(&self, key: u32) -> StoreResult<bool> {
        StoreResult::ok(self.engine.lock().contains(key))
    }

    /// All live keys, ascending
    pub fn list_keys(&self) -> StoreResult<Vec<u32>> {
        StoreResult::ok(self.engine.lock().keys())
    }

    pub fn flush(&self) -> StoreResult<()> {
        let result = self.engine.lock().flush();
        self.finish("flush", result, |_| None)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Space accounting from in-memory state
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let result = self.engine.lock().stats();
        self.finish("stats", result, |_| None)
    }

    /// Walk the file and check every allocator invariant
    pub fn verify(&self) -> StoreResult<StoreStats> {
        let result = self.engine.lock().verify();
        self.finish("verify", result, |_| None)
    }

    /// Flush and release the underlying stream
    pub fn close(self) -> Result<()> {
        self.engine.into_inner().close()
    }

    /// Flush and hand back the underlying stream
    pub fn into_stream(self) -> Result<S> {
        self.engine.into_inner().into_stream()
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Register a callback invoked after every successful mutation
    pub fn add_observer<O: StoreObserver + 'static>(&self, observer: O) {
        self.events.add_observer(Arc::new(observer));
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Convert an engine result and publish its event
    ///
    /// Called after the engine lock is released so observers may call back
    /// into the store.
    fn finish<T>(
        &self,
        operation: &'static str,
        result: Result<T>,
        event: impl FnOnce(&T) -> Option<StoreEvent>,
    ) -> StoreResult<T> {
        match result {
            Ok(value) => {
                if let Some(event) = event(&value) {
                    self.events.publish(event);
                }
                StoreResult::ok(value)
            }
            Err(e) => {
                warn!(operation, code = e.code().as_u16(), error = %e, "Store operation failed");
                StoreResult::failure(&e)
            }
        }
    }
}
