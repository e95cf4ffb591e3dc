//! Configuration for blobheap
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::allocator::FitPolicy;

/// Main configuration for a blobheap store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Path of the blob file. One store owns exactly one file.
    pub path: PathBuf,

    /// Create the file (as an empty store) if it does not exist
    pub create_if_missing: bool,

    /// Hold an exclusive advisory lock on the file while the store is open
    pub exclusive_lock: bool,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// What the flush at the end of every mutation does
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Allocator Configuration
    // -------------------------------------------------------------------------
    /// How find-space picks among qualifying free records
    pub fit_policy: FitPolicy,
}

/// Flush behaviour after each mutating call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Push buffered bytes to the OS only
    Flush,

    /// Flush and then fsync the file data (safest, slowest)
    EveryWrite,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./blobheap.dat"),
            create_if_missing: true,
            exclusive_lock: true,
            sync_strategy: SyncStrategy::Flush,
            fit_policy: FitPolicy::BestFit,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the blob file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Create the file on open if missing
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.config.create_if_missing = create;
        self
    }

    /// Enable or disable the exclusive file lock
    pub fn exclusive_lock(mut self, lock: bool) -> Self {
        self.config.exclusive_lock = lock;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the free-space fit policy
    pub fn fit_policy(mut self, policy: FitPolicy) -> Self {
        self.config.fit_policy = policy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
