//! Test utilities for creating temporary log files and tail options.

#[cfg(test)]
use std::fs::{File, OpenOptions};
#[cfg(test)]
use std::io::Write;
#[cfg(test)]
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::time::Duration;

#[cfg(test)]
use crate::config::TailOptions;

#[cfg(test)]
pub struct TempLogFile {
    pub path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

#[cfg(test)]
impl TempLogFile {
    /// Create a new temporary log file for testing
    pub fn new() -> std::io::Result<Self> {
        let temp_file = Self::missing()?;
        File::create(&temp_file.path)?;
        Ok(temp_file)
    }

    /// Create a temporary log file with initial content
    pub fn with_content(content: &str) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append_content(content)?;
        Ok(temp_file)
    }

    /// Create the handle without the file, for discovery tests
    pub fn missing() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("test.log");
        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    /// Append a line (newline added) to the temporary log file
    pub fn append_content(&self, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;

        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(())
    }

    /// Truncate the file (simulate in-place log rotation)
    pub fn truncate(&self) -> std::io::Result<()> {
        File::create(&self.path)?;
        Ok(())
    }

    /// Rename the file aside, as a copy-free log rotation would
    pub fn rotate_to(&self, suffix: &str) -> std::io::Result<PathBuf> {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.push('.');
        name.push_str(suffix);
        let rotated = self._temp_dir.path().join(name);
        std::fs::rename(&self.path, &rotated)?;
        Ok(rotated)
    }

    /// Path of a sibling file in the same temporary directory
    pub fn sibling_path(&self, name: &str) -> PathBuf {
        self._temp_dir.path().join(name)
    }

    /// Write a gzip archive next to the log file and return its path
    pub fn write_gzip(&self, name: &str, content: &str) -> std::io::Result<PathBuf> {
        let path = self.sibling_path(name);
        let file = File::create(&path)?;
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(content.as_bytes())?;
        encoder.finish()?.flush()?;
        Ok(path)
    }

    /// Get the path to the temporary file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Options pointed at a checkpoint directory private to this file,
    /// with a settle delay short enough for tests.
    pub fn options(&self) -> TailOptions {
        TailOptions {
            watch_delay: Duration::from_millis(50),
            checkpoint_dir: self._temp_dir.path().join("checkpoints"),
            ..TailOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_log_file_creation() {
        let temp_file = TempLogFile::new().unwrap();
        assert!(temp_file.path().exists());
    }

    #[tokio::test]
    async fn test_temp_log_file_with_content() {
        let content = "test line";
        let temp_file = TempLogFile::with_content(content).unwrap();

        let file_content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(file_content.contains(content));
    }

    #[tokio::test]
    async fn test_missing_file_not_created() {
        let temp_file = TempLogFile::missing().unwrap();
        assert!(!temp_file.path().exists());

        temp_file.append_content("first").unwrap();
        assert!(temp_file.path().exists());
    }

    #[tokio::test]
    async fn test_append_content() {
        let temp_file = TempLogFile::new().unwrap();
        temp_file.append_content("line 1").unwrap();
        temp_file.append_content("line 2").unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("line 1"));
        assert!(content.contains("line 2"));
    }

    #[tokio::test]
    async fn test_truncate() {
        let temp_file = TempLogFile::with_content("initial content").unwrap();
        temp_file.truncate().unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.is_empty());
    }

    #[tokio::test]
    async fn test_rotate_then_recreate() {
        let temp_file = TempLogFile::with_content("old").unwrap();

        let rotated = temp_file.rotate_to("1").unwrap();
        assert!(!temp_file.path().exists());
        assert!(rotated.ends_with("test.log.1"));
        assert!(rotated.exists());

        temp_file.append_content("new").unwrap();
        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "new\n");
    }

    #[tokio::test]
    async fn test_write_gzip() {
        let temp_file = TempLogFile::new().unwrap();
        let archive = temp_file.write_gzip("old.log.gz", "compressed\n").unwrap();

        let raw = std::fs::read(&archive).unwrap();
        // Gzip magic bytes, not the plain text.
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
    }

    #[tokio::test]
    async fn test_options_use_private_checkpoint_dir() {
        let temp_file = TempLogFile::new().unwrap();
        let options = temp_file.options();

        assert!(
            options
                .checkpoint_dir
                .starts_with(temp_file._temp_dir.path())
        );
        assert!(options.watch_delay < Duration::from_secs(1));
    }
}
