//! Line sources: decoded lines plus exact on-disk byte accounting.
//!
//! A source is bound to one open of a file and reads it through to end
//! of stream once. Plain files can start from a byte offset; gzip
//! archives are decoded on a blocking thread and streamed through a
//! bounded channel, with byte counts measured on the decompressed
//! stream.

use std::io::SeekFrom;
use std::path::Path;

use flate2::read::GzDecoder;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;

use crate::error::Result;

const ARCHIVE_CHANNEL_CAPACITY: usize = 64;

/// One decoded line and the number of source bytes it occupied,
/// terminator included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub text: String,
    pub consumed: u64,
}

/// A restartable-per-open sequence of decoded lines.
pub enum LineSource {
    Plain(PlainSource),
    Archive(ArchiveSource),
}

impl LineSource {
    /// Opens a plain text file, optionally seeking to a byte offset
    /// first.
    pub async fn open_plain(path: &Path, seek_to: Option<u64>) -> Result<Self> {
        Ok(Self::Plain(PlainSource::open(path, seek_to).await?))
    }

    /// Opens a gzip archive. Byte counts refer to the decompressed
    /// stream, not the archive file.
    pub async fn open_archive(path: &Path) -> Result<Self> {
        Ok(Self::Archive(ArchiveSource::open(path).await?))
    }

    /// Pulls the next line; `None` means this open reached its end.
    pub async fn next_line(&mut self) -> Result<Option<RawLine>> {
        match self {
            Self::Plain(source) => source.next_line().await,
            Self::Archive(source) => source.next_line().await,
        }
    }
}

/// Reader over an uncompressed file.
pub struct PlainSource {
    reader: BufReader<tokio::fs::File>,
    buf: Vec<u8>,
    done: bool,
}

impl PlainSource {
    async fn open(path: &Path, seek_to: Option<u64>) -> Result<Self> {
        let mut file = tokio::fs::File::open(path).await?;
        if let Some(offset) = seek_to {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(Self {
            reader: BufReader::new(file),
            buf: Vec::new(),
            done: false,
        })
    }

    async fn next_line(&mut self) -> Result<Option<RawLine>> {
        if self.done {
            return Ok(None);
        }

        self.buf.clear();
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 {
            self.done = true;
            return Ok(None);
        }

        // An unterminated tail means end of stream for this open; a
        // reopen decides how to continue.
        if self.buf.last() != Some(&b'\n') {
            self.done = true;
        }
        Ok(split_line(&self.buf))
    }
}

/// Reader over a gzip archive, decoded off the async runtime.
pub struct ArchiveSource {
    receiver: mpsc::Receiver<Result<RawLine>>,
}

impl ArchiveSource {
    async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path).await?.into_std().await;
        let (sender, receiver) = mpsc::channel(ARCHIVE_CHANNEL_CAPACITY);
        tokio::task::spawn_blocking(move || decode_archive(file, sender));
        Ok(Self { receiver })
    }

    async fn next_line(&mut self) -> Result<Option<RawLine>> {
        match self.receiver.recv().await {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }
}

fn decode_archive(file: std::fs::File, sender: mpsc::Sender<Result<RawLine>>) {
    use std::io::BufRead;

    let mut reader = std::io::BufReader::new(GzDecoder::new(file));
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let terminated = buf.last() == Some(&b'\n');
                if let Some(line) = split_line(&buf) {
                    if sender.blocking_send(Ok(line)).is_err() {
                        // Consumer went away mid-archive.
                        break;
                    }
                }
                if !terminated {
                    break;
                }
            }
            Err(err) => {
                let _ = sender.blocking_send(Err(err.into()));
                break;
            }
        }
    }
}

/// Turns one `read_until` buffer into an emitted line.
///
/// Terminated lines lose their `\n` (and a preceding `\r`) but keep
/// both in the consumed count. An unterminated tail is trimmed and
/// dropped entirely when nothing printable remains.
fn split_line(buf: &[u8]) -> Option<RawLine> {
    let consumed = buf.len() as u64;

    if buf.last() == Some(&b'\n') {
        let mut content = &buf[..buf.len() - 1];
        if content.last() == Some(&b'\r') {
            content = &content[..content.len() - 1];
        }
        return Some(RawLine {
            text: String::from_utf8_lossy(content).into_owned(),
            consumed,
        });
    }

    let text = String::from_utf8_lossy(buf);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(RawLine {
        text: trimmed.to_string(),
        consumed,
    })
}
