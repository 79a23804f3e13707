//! src/source.rs
//!
//! Source-list parsing and the shuffled iteration order.
//!
//! A source list is a plain-text file with one whitespace-separated tuple per
//! line: `<path> <start_or_count> <label>`. It is read fully at setup; the
//! resulting entries are immutable for the pipeline's whole lifetime. The
//! iteration order over entries lives in [`ShuffleCursor`], a permutation
//! that is only ever touched by the prefetch worker.

use anyhow::{ensure, Context, Result};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One line of the source list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Video file or frame directory.
    pub path: PathBuf,
    /// Start frame for video sources (negative = choose at random), total
    /// frame count for image-sequence sources.
    pub frame_field: i32,
    pub label: i32,
}

impl SourceEntry {
    /// Start frame for a video source; `None` requests a random window.
    pub fn start_frame(&self) -> Option<u32> {
        (self.frame_field >= 0).then(|| self.frame_field as u32)
    }

    /// Available frame count for an image-sequence source.
    pub fn frame_count(&self) -> Result<u32> {
        ensure!(
            self.frame_field >= 1,
            "{} declares {} frames; image sequences need at least one",
            self.path.display(),
            self.frame_field
        );
        Ok(self.frame_field as u32)
    }
}

/// Reads the whole source list. Blank lines are skipped; a malformed line is
/// a setup error, not a clip to be retried later.
pub fn read_source_list(path: &Path) -> Result<Vec<SourceEntry>> {
    info!("opening source list {}", path.display());
    let file = File::open(path)
        .with_context(|| format!("failed to open source list {}", path.display()))?;

    let mut entries = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split_whitespace();
        let (Some(entry_path), Some(frame_field), Some(label), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            anyhow::bail!(
                "malformed line {} in {}: expected `<path> <start_or_count> <label>`, got {:?}",
                line_no + 1,
                path.display(),
                line
            );
        };

        entries.push(SourceEntry {
            path: PathBuf::from(entry_path),
            frame_field: frame_field.parse().with_context(|| {
                format!("bad frame field on line {} of {}", line_no + 1, path.display())
            })?,
            label: label.parse().with_context(|| {
                format!("bad label on line {} of {}", line_no + 1, path.display())
            })?,
        });
    }

    info!("a total of {} clips", entries.len());
    Ok(entries)
}

/// A permutation over source-entry positions with a wrapping cursor.
///
/// The cursor advances once per fully-assembled clip. On wrap-around it
/// resets to the front and, when configured, reshuffles the permutation in
/// place. Reshuffling changes the order but always preserves the multiset of
/// positions.
#[derive(Debug, Clone)]
pub struct ShuffleCursor {
    order: Vec<usize>,
    cursor: usize,
    reshuffle: bool,
}

impl ShuffleCursor {
    pub fn new(len: usize, reshuffle: bool) -> Self {
        Self {
            order: (0..len).collect(),
            cursor: 0,
            reshuffle,
        }
    }

    /// Shuffles the whole permutation; used once at setup when shuffling is
    /// enabled (wrap-around reshuffles happen inside [`advance`](Self::advance)).
    pub fn shuffle(&mut self, rng: &mut StdRng) {
        self.order.shuffle(rng);
    }

    /// Pre-positions the cursor, skipping the first `skip` entries.
    pub fn skip(&mut self, skip: usize) -> Result<()> {
        ensure!(
            skip < self.order.len(),
            "not enough entries to skip: {} requested, {} available",
            skip,
            self.order.len()
        );
        self.cursor = skip;
        Ok(())
    }

    /// Entry position under the cursor.
    pub fn current(&self) -> usize {
        self.order[self.cursor]
    }

    /// Moves to the next position. Returns `true` when the cursor wrapped
    /// back to the front (reshuffling if configured).
    pub fn advance(&mut self, rng: &mut StdRng) -> bool {
        self.cursor += 1;
        if self.cursor >= self.order.len() {
            debug!("restarting prefetching from the start of the source list");
            self.cursor = 0;
            if self.reshuffle {
                self.order.shuffle(rng);
            }
            true
        } else {
            false
        }
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
