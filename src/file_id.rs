//! Stable file identity used to key checkpoint records.
//!
//! Identity is the device and inode pair from `stat`, so it survives
//! renames and rotations but changes when a path is deleted and
//! recreated.

use std::fs::Metadata;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A stable identifier for a physical file, independent of its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    /// Builds an identity from raw device and inode values.
    #[cfg(test)]
    pub fn new(dev: u64, ino: u64) -> Self {
        Self { dev, ino }
    }

    /// Derives the identity from file metadata.
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }
}

/// Formats as `dev-ino`, which doubles as the checkpoint record file
/// name inside the store directory.
impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.dev, self.ino)
    }
}
