//! Per-game log files.
//!
//! Each game played in a slot gets its own file,
//! `{base}_{slot}_{run}_{game}.bin`, holding bincode-encoded [`LogEntry`]
//! values back to back. `run` is the engine's start time in milliseconds, so
//! runs sharing a base path never overwrite each other; an existing file is
//! never truncated.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::core::{GameResult, Termination};
use crate::error::RecordError;

use super::record::{GameRecord, LogEntry, MoveRecord};

/// Attempts at a free file name before recording is given up.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Run id for a new engine: wall-clock milliseconds since the epoch.
pub fn new_run_id() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Path of the log for game `game` in slot `slot` of run `run`.
pub fn log_path(base: &Path, slot: usize, run: u64, game: u64) -> PathBuf {
    numbered_path(base, slot, run, game, 0)
}

/// `log_path`, with a `-{attempt}` suffix once the plain name is taken.
fn numbered_path(base: &Path, slot: usize, run: u64, game: u64, attempt: u32) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    if attempt == 0 {
        name.push(format!("_{slot}_{run}_{game}.bin"));
    } else {
        name.push(format!("_{slot}_{run}_{game}-{attempt}.bin"));
    }
    PathBuf::from(name)
}

/// Create a log file that did not exist before.
fn create_fresh(base: &Path, slot: usize, run: u64, game: u64) -> (PathBuf, io::Result<File>) {
    let mut attempt = 0;
    loop {
        let path = numbered_path(base, slot, run, game, attempt);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                attempt += 1;
            }
            result => return (path, result),
        }
    }
}

/// Appends the records of one game to its log file.
///
/// Write failures are logged and disable the writer; they never reach the
/// engine.
#[derive(Debug)]
pub struct GameLogWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    moves: usize,
}

impl GameLogWriter {
    /// Create the log for game `game` in slot `slot` of run `run`.
    ///
    /// If the name is already taken the file gets a numbered suffix.
    pub fn create(base: &Path, slot: usize, run: u64, game: u64) -> Self {
        let (path, file) = create_fresh(base, slot, run, game);
        let out = match file {
            Ok(file) => Some(BufWriter::new(file)),
            Err(err) => {
                warn!(path = %path.display(), %err, "cannot create game log; recording disabled");
                None
            }
        };
        Self { path, out, moves: 0 }
    }

    /// File this writer appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether records are still being written.
    pub fn is_active(&self) -> bool {
        self.out.is_some()
    }

    /// Moves written so far.
    pub fn moves_written(&self) -> usize {
        self.moves
    }

    /// Append one played move.
    pub fn record_move(&mut self, record: MoveRecord) {
        if self.write(&LogEntry::Move(record)) {
            self.moves += 1;
        }
    }

    /// Append the outcome and flush.
    pub fn finish(&mut self, result: GameResult, termination: Termination) {
        self.write(&LogEntry::outcome(result, termination));
        if let Some(mut out) = self.out.take() {
            if let Err(err) = out.flush() {
                warn!(path = %self.path.display(), %err, "failed to flush game log");
            }
        }
    }

    fn write(&mut self, entry: &LogEntry) -> bool {
        let Some(out) = self.out.as_mut() else {
            return false;
        };
        match bincode::serialize_into(out, entry) {
            Ok(()) => true,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to write game log; recording disabled");
                self.out = None;
                false
            }
        }
    }
}

/// Read a game log written by [`GameLogWriter`].
pub fn read_game_log(path: &Path) -> Result<GameRecord, RecordError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut record = GameRecord::default();
    while !reader.fill_buf()?.is_empty() {
        let entry: LogEntry = bincode::deserialize_from(&mut reader)?;
        record.push(entry);
    }
    Ok(record)
}
