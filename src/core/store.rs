//! Store abstraction for the shared world state.
//!
//! A world store is the directory holding the host document database
//! (`world.db`), the broker audit log and the optional `effectsync.toml`.
//! Every session connected to the same world opens the same store root.

use std::path::{Path, PathBuf};

/// Catalog partition discriminator.
///
/// - `Live`: the containers sessions browse, edit and apply from
/// - `Backup`: read-mostly copies taken when the catalog was first created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Live,
    Backup,
}

impl Partition {
    pub fn is_backup(self) -> bool {
        matches!(self, Partition::Backup)
    }
}

/// Store handle representing one shared world.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(crate::core::schemas::WORLD_DB_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(crate::core::config::CONFIG_FILE_NAME)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
