//! Syzygy WDL tables via `shakmaty-syzygy`.

use std::path::Path;
use std::sync::Mutex;

use shakmaty::Chess;
use shakmaty_syzygy::{AmbiguousWdl, Tablebase};
use tracing::{info, warn};

use super::{TablebaseOracle, Verdict};
use crate::core::Position;

/// Oracle backed by Syzygy tables loaded from disk.
pub struct SyzygyOracle {
    tables: Mutex<Tablebase<Chess>>,
    max_pieces: usize,
}

impl SyzygyOracle {
    /// Load every table under `paths`.
    ///
    /// Several directories may be given separated by `:` or `;`. Missing or
    /// unreadable directories are skipped with a warning.
    pub fn open(paths: &Path) -> Self {
        let mut tables = Tablebase::new();
        let mut total = 0usize;

        let joined = paths.to_string_lossy();
        for dir in joined.split([':', ';']).map(str::trim).filter(|d| !d.is_empty()) {
            if !Path::new(dir).is_dir() {
                warn!(dir, "tablebase directory not found");
                continue;
            }
            match tables.add_directory(dir) {
                Ok(count) => total += count,
                Err(err) => warn!(dir, %err, "failed to load tablebase directory"),
            }
        }

        let max_pieces = if total > 0 { tables.max_pieces() } else { 0 };
        if total > 0 {
            info!(files = total, max_pieces, "syzygy tablebases loaded");
        } else {
            warn!("no syzygy tables found, tablebase probes will return unknown");
        }

        Self {
            tables: Mutex::new(tables),
            max_pieces,
        }
    }
}

impl std::fmt::Debug for SyzygyOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyzygyOracle")
            .field("max_pieces", &self.max_pieces)
            .finish_non_exhaustive()
    }
}

impl TablebaseOracle for SyzygyOracle {
    fn max_pieces(&self) -> usize {
        self.max_pieces
    }

    fn probe(&self, pos: &Position) -> Verdict {
        let Ok(tables) = self.tables.lock() else {
            return Verdict::Unknown;
        };
        match tables.probe_wdl(pos.chess()) {
            Ok(AmbiguousWdl::Win | AmbiguousWdl::MaybeWin) => Verdict::Win,
            // Cursed wins and blessed losses are draws under the 50-move rule.
            Ok(AmbiguousWdl::CursedWin | AmbiguousWdl::Draw | AmbiguousWdl::BlessedLoss) => {
                Verdict::Draw
            }
            Ok(AmbiguousWdl::MaybeLoss | AmbiguousWdl::Loss) => Verdict::Loss,
            Err(_) => Verdict::Unknown,
        }
    }
}
