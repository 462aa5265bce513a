//! In-memory read position for the currently open file.

/// Line and byte counters for one open of a tailed file.
///
/// `start` is the number of already-confirmed lines that must be
/// consumed silently before emission resumes. `current` counts every
/// line pulled since this open, replayed or not, so line numbers keep
/// their historical values across restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    start: u64,
    current: u64,
    skip: u64,
    bytes: u64,
}

/// What to do with one line pulled from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The line replays one already confirmed; consume it silently.
    Skip,
    /// Deliver the line under this 1-based number. `finished_skip`
    /// carries the replay tally exactly once, on the first emitted
    /// line after a skip run.
    Emit { number: u64, finished_skip: Option<u64> },
}

impl Position {
    /// Fresh open: emit from the first line, optionally discarding
    /// `start` already-confirmed lines first.
    pub fn new(start: u64) -> Self {
        Self {
            start,
            current: 0,
            skip: 0,
            bytes: 0,
        }
    }

    /// Open resumed by byte seek: the first `lines` lines are behind
    /// the seek point, so numbering continues from there with nothing
    /// to discard.
    pub fn at_offset(lines: u64, bytes: u64) -> Self {
        Self {
            start: 0,
            current: lines,
            skip: 0,
            bytes,
        }
    }

    /// Accounts for one pulled line of `consumed` on-disk bytes
    /// (terminator included) and says whether to emit it.
    pub fn advance(&mut self, consumed: u64) -> Advance {
        self.current += 1;
        self.bytes += consumed;

        if self.start > 0 && self.current <= self.start {
            self.skip += 1;
            return Advance::Skip;
        }

        let finished_skip = match self.skip {
            0 => None,
            n => {
                self.skip = 0;
                Some(n)
            }
        };
        Advance::Emit {
            number: self.current,
            finished_skip,
        }
    }

    /// Lines pulled since this open (confirmed count for checkpoints).
    pub fn current_line(&self) -> u64 {
        self.current
    }

    /// Bytes consumed up to and including the last pulled line.
    pub fn byte_offset(&self) -> u64 {
        self.bytes
    }

    /// True while pulled lines are still being discarded as replays.
    #[cfg(test)]
    pub fn replaying(&self) -> bool {
        self.start > 0 && self.current < self.start
    }
}
