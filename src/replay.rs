//! Match log and replay.
//!
//! A match log is an append-only JSON-lines file:
//! - one `header` entry with the map, seats and unit types
//! - one `round` entry per round with the world after the round
//! - one `result` entry once the match finishes
//!
//! Each line is `{"entry": <kind>, "data": {...}}`. Entries are flushed as
//! they are written, so a log of an aborted match still holds every
//! completed round.

mod render;

pub use render::render_ascii;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinator::MatchResult;
use crate::game::{Map, Match, Player, UnitTemplate, WorldSnapshot};
use crate::round::RoundReport;

/// Failure reading or writing a match log.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// File access failed.
    #[error("match log I/O error: {0}")]
    Io(#[from] io::Error),
    /// An entry could not be encoded or decoded.
    #[error("bad match log entry on line {line}: {source}")]
    Entry {
        /// One-based line number (0 when writing).
        line: usize,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// The log does not start with a header.
    #[error("match log has no header")]
    MissingHeader,
    /// The header's map is unusable.
    #[error("match log map is invalid: {0}")]
    Map(#[from] crate::error::MapError),
}

/// One line of a match log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entry", content = "data", rename_all = "snake_case")]
pub enum LogEntry {
    /// Static match setup.
    Header {
        /// Terrain codes, column-major.
        map: Vec<Vec<u8>>,
        /// Seats with starting balances and spawn points.
        players: Vec<Player>,
        /// Unit types.
        units: BTreeMap<String, UnitTemplate>,
        /// Round limit.
        max_rounds: u32,
    },
    /// World after one round.
    Round {
        /// What happened during the round.
        report: RoundReport,
        /// World at the end of the round.
        state: WorldSnapshot,
    },
    /// Final outcome.
    Result {
        /// Winners and per-player statistics.
        result: MatchResult,
    },
}

impl LogEntry {
    /// Header entry describing `state` before its first round.
    #[must_use]
    pub fn header(state: &Match) -> Self {
        LogEntry::Header {
            map: state.map().to_columns(),
            players: state.players().to_vec(),
            units: state.templates().clone(),
            max_rounds: state.max_rounds(),
        }
    }
}

/// Append-only writer for a match log.
#[derive(Debug)]
pub struct MatchLog {
    writer: BufWriter<File>,
}

impl MatchLog {
    /// Create (or truncate) a log file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, ReplayError> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Write one entry and flush it.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn append(&mut self, entry: &LogEntry) -> Result<(), ReplayError> {
        serde_json::to_writer(&mut self.writer, entry)
            .map_err(|source| ReplayError::Entry { line: 0, source })?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// A match log read back into memory.
#[derive(Debug, Clone)]
pub struct Recording {
    /// The terrain grid.
    pub map: Map,
    /// Seats at match start.
    pub players: Vec<Player>,
    /// Unit types.
    pub units: BTreeMap<String, UnitTemplate>,
    /// Round limit.
    pub max_rounds: u32,
    /// Completed rounds, in order.
    pub rounds: Vec<(RoundReport, WorldSnapshot)>,
    /// Final outcome, if the match finished.
    pub result: Option<MatchResult>,
}

impl Recording {
    /// Load a match log.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a line is not a valid
    /// entry, or the header is missing.
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: LogEntry = serde_json::from_str(&line).map_err(|source| {
                ReplayError::Entry {
                    line: index + 1,
                    source,
                }
            })?;
            entries.push(entry);
        }
        Self::from_entries(entries)
    }

    /// Assemble a recording from decoded entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the first entry is not a usable header.
    pub fn from_entries(entries: Vec<LogEntry>) -> Result<Self, ReplayError> {
        let mut entries = entries.into_iter();
        let Some(LogEntry::Header {
            map,
            players,
            units,
            max_rounds,
        }) = entries.next()
        else {
            return Err(ReplayError::MissingHeader);
        };

        let mut recording = Self {
            map: Map::from_columns(&map)?,
            players,
            units,
            max_rounds,
            rounds: Vec::new(),
            result: None,
        };
        for entry in entries {
            match entry {
                LogEntry::Header { .. } => return Err(ReplayError::MissingHeader),
                LogEntry::Round { report, state } => recording.rounds.push((report, state)),
                LogEntry::Result { result } => recording.result = Some(result),
            }
        }
        Ok(recording)
    }

    /// World at the end of round `round` (1-based).
    #[must_use]
    pub fn snapshot(&self, round: u32) -> Option<&WorldSnapshot> {
        self.rounds
            .iter()
            .find(|(report, _)| report.round == round)
            .map(|(_, state)| state)
    }
}
