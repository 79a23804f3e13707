//! src/loader.rs
//!
//! The prefetch scheduler.
//!
//! `ClipLoader` owns exactly one background worker thread that assembles
//! batches ahead of consumption:
//!
//! ```text
//!   Idle ──spawn──▶ Decoding (worker) ──rendezvous send──▶ Ready
//!     ▲                                                      │
//!     └───────────────── handoff to consumer ◀───────────────┘
//! ```
//!
//! The worker owns all mutable decode state — source entries, shuffle order,
//! cursor, RNG, mean tensor — and the consumer never touches it. Completed
//! batches move across a rendezvous channel (capacity 0), so the worker
//! blocks after finishing a batch until the consumer pulls it; decode of
//! batch N+1 overlaps compute on batch N, and decode of N+2 cannot begin
//! until N+1 has been handed off. On teardown the channel is dropped and the
//! worker is joined; no detached work outlives the loader.
//!
//! # Failure policy
//!
//! An unreadable clip is skipped during training (the cursor advances and the
//! slot is retried); during testing the same condition is fatal, since
//! silently dropping examples would corrupt reported metrics. Setup errors —
//! bad configuration, an unreadable priming clip, a mean file of the wrong
//! shape — fail `ClipLoader::new` eagerly.

use anyhow::{bail, ensure, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use log::{debug, info};
use ndarray::Array5;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::thread::JoinHandle;

use crate::assemble::{assemble_clip, place_label, AssembleParams};
use crate::config::{ClipLoaderConfig, Phase, SamplingPolicy, SourceKind};
use crate::decode::{read_clip, DecodeParams};
use crate::sampler::SEGMENT_WHOLE;
use crate::snapshot;
use crate::source::{read_source_list, ShuffleCursor, SourceEntry};

/// One assembled batch, handed to the consumer by ownership transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipBatch {
    /// Shaped `(batch_size * seg_cnt, channels, length, out_h, out_w)`.
    pub data: Array5<f32>,
    /// Shaped `(batch_size * seg_cnt, 1, 1, 1, 1)`, or
    /// `(batch_size, 1, 1, 1, 1)` in pyramid mode. `None` when the loader
    /// was configured without labels.
    pub labels: Option<Array5<f32>>,
}

/// Asynchronous clip-batch pipeline. See the module docs for the protocol.
pub struct ClipLoader {
    batch_rx: Option<Receiver<Result<ClipBatch>>>,
    worker: Option<JoinHandle<()>>,
    clip_shape: (usize, usize, usize, usize),
    batch_shape: (usize, usize, usize, usize, usize),
}

impl ClipLoader {
    /// Validates the configuration, loads the source list, resolves the
    /// output shape from one priming clip, and launches the prefetch worker.
    ///
    /// The priming clip must decode successfully; the worker decodes the same
    /// entry again for the first batch.
    pub fn new(config: ClipLoaderConfig) -> Result<Self> {
        config.validate()?;

        let entries = read_source_list(&config.source)?;
        ensure!(
            !entries.is_empty(),
            "source list {} contains no entries",
            config.source.display()
        );

        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = StdRng::seed_from_u64(seed);

        let mut cursor = ShuffleCursor::new(entries.len(), config.shuffle);
        if config.shuffle {
            info!("shuffling data");
            cursor.shuffle(&mut rng);
        }
        if config.rand_skip > 0 {
            let skip = rng.random_range(0..config.rand_skip);
            info!("skipping first {} entries", skip);
            cursor.skip(skip)?;
        }

        let decode = DecodeParams {
            clip_length: config.new_length,
            new_height: config.new_height,
            new_width: config.new_width,
            sampling_rate: config.sampling_rate,
        };

        // Priming decode: the first readable shape defines the whole run.
        let probe = read_clip(
            config.source_kind,
            &entries[cursor.current()],
            &decode,
            SEGMENT_WHOLE,
            config.sampling.jitter(),
            &mut rng,
        )
        .context("failed to decode the priming clip while resolving the batch shape")?;
        let (channels, length, height, width) =
            (probe.channels, probe.length, probe.height, probe.width);

        if config.crop_size > 0 {
            ensure!(
                height > config.crop_size,
                "decoded height {} must exceed crop_size {}",
                height,
                config.crop_size
            );
            ensure!(
                width > config.crop_size,
                "decoded width {} must exceed crop_size {}",
                width,
                config.crop_size
            );
        }
        let (out_height, out_width) = if config.crop_size > 0 {
            (config.crop_size, config.crop_size)
        } else {
            (height, width)
        };

        let seg_cnt = config.sampling.segment_count();
        let batch_items = config.batch_size * seg_cnt;
        let batch_shape = (batch_items, channels, length, out_height, out_width);
        info!(
            "output data size: {},{},{},{},{}",
            batch_items, channels, length, out_height, out_width
        );

        let mean = load_mean(&config, (channels, length, height, width))?;

        let state = PrefetchState {
            entries,
            cursor,
            rng,
            mean,
            decode,
            assemble: AssembleParams {
                crop_size: config.crop_size,
                mirror: config.mirror,
                scale: config.scale,
                phase: config.phase,
            },
            source_kind: config.source_kind,
            sampling: config.sampling,
            pyramid_labels: config.pyramid_labels,
            with_labels: config.with_labels,
            batch_size: config.batch_size,
            phase: config.phase,
            batch_shape,
        };

        let (batch_tx, batch_rx) = crossbeam_channel::bounded(0);
        let worker = std::thread::Builder::new()
            .name("clip-prefetch".into())
            .spawn(move || run_prefetch(state, batch_tx))
            .context("failed to spawn the prefetch worker thread")?;
        debug!("prefetch initialized");

        Ok(Self {
            batch_rx: Some(batch_rx),
            worker: Some(worker),
            clip_shape: (channels, length, height, width),
            batch_shape,
        })
    }

    /// Blocks until the in-flight batch is complete and takes ownership of
    /// it; the worker immediately begins decoding the next batch.
    ///
    /// After a fatal worker error (test-mode decode failure, shape mismatch)
    /// every subsequent call returns an error.
    pub fn next_batch(&mut self) -> Result<ClipBatch> {
        let Some(batch_rx) = self.batch_rx.as_ref() else {
            bail!("the prefetch worker is no longer running");
        };
        match batch_rx.recv() {
            Ok(Ok(batch)) => Ok(batch),
            Ok(Err(error)) => {
                self.shutdown();
                Err(error)
            }
            Err(_) => {
                self.shutdown();
                bail!("the prefetch worker terminated unexpectedly")
            }
        }
    }

    /// `(channels, length, height, width)` of decoded records, resolved from
    /// the priming clip.
    pub fn clip_shape(&self) -> (usize, usize, usize, usize) {
        self.clip_shape
    }

    /// Shape of the data tensor of every batch.
    pub fn batch_shape(&self) -> (usize, usize, usize, usize, usize) {
        self.batch_shape
    }

    fn shutdown(&mut self) {
        // Dropping the receiver makes the worker's next send fail, which ends
        // its loop; joining then runs to completion.
        self.batch_rx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for ClipLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn load_mean(
    config: &ClipLoaderConfig,
    (channels, length, height, width): (usize, usize, usize, usize),
) -> Result<Array5<f32>> {
    if let Some(path) = &config.mean_file {
        info!("loading mean file from {}", path.display());
        let mean = snapshot::load_volume(path)?;
        ensure!(
            mean.dim() == (1, channels, length, height, width),
            "mean tensor shape {:?} does not match the clip shape (1, {}, {}, {}, {})",
            mean.dim(),
            channels,
            length,
            height,
            width
        );
        Ok(mean)
    } else {
        let mut mean = Array5::zeros((1, channels, length, height, width));
        if let Some(value) = config.mean_value {
            info!("using mean value of {}", value);
            mean.fill(value);
        }
        Ok(mean)
    }
}

/// Everything the worker owns. Nothing here is shared with the consumer.
struct PrefetchState {
    entries: Vec<SourceEntry>,
    cursor: ShuffleCursor,
    rng: StdRng,
    mean: Array5<f32>,
    decode: DecodeParams,
    assemble: AssembleParams,
    source_kind: SourceKind,
    sampling: SamplingPolicy,
    pyramid_labels: bool,
    with_labels: bool,
    batch_size: usize,
    phase: Phase,
    batch_shape: (usize, usize, usize, usize, usize),
}

fn run_prefetch(mut state: PrefetchState, batch_tx: Sender<Result<ClipBatch>>) {
    loop {
        let batch = state.fill_batch();
        let fatal = batch.is_err();
        // A send only fails when the loader dropped the receiver — shutdown.
        if batch_tx.send(batch).is_err() || fatal {
            break;
        }
    }
}

impl PrefetchState {
    /// Assembles one full batch. Slots are filled in order; an unreadable
    /// clip advances the cursor and retries the same slot (training) or
    /// aborts the run (testing).
    fn fill_batch(&mut self) -> Result<ClipBatch> {
        let seg_cnt = self.sampling.segment_count();
        let slots = self.batch_size * seg_cnt;
        let label_items = if self.pyramid_labels {
            self.batch_size
        } else {
            slots
        };

        let (_, channels, length, out_height, out_width) = self.batch_shape;
        let mut data = Array5::zeros((slots, channels, length, out_height, out_width));
        let mut labels = self
            .with_labels
            .then(|| Array5::zeros((label_items, 1, 1, 1, 1)));

        let mut slot = 0;
        while slot < slots {
            let segment = slot % seg_cnt;
            let entry = &self.entries[self.cursor.current()];

            let record = match read_clip(
                self.source_kind,
                entry,
                &self.decode,
                segment,
                self.sampling.jitter(),
                &mut self.rng,
            ) {
                Ok(record) => record,
                Err(error) => {
                    if self.phase == Phase::Test {
                        return Err(error.context("testing must not miss any example"));
                    }
                    debug!("skipping unreadable clip {}: {error:#}", entry.path.display());
                    self.cursor.advance(&mut self.rng);
                    continue;
                }
            };

            assemble_clip(
                &mut data,
                slot,
                &record,
                &self.mean,
                &self.assemble,
                &mut self.rng,
            )?;
            if let Some(labels) = labels.as_mut() {
                place_label(labels, slot, seg_cnt, self.pyramid_labels, record.label);
            }

            if (slot + 1) % seg_cnt == 0 {
                self.cursor.advance(&mut self.rng);
            }
            slot += 1;
        }

        Ok(ClipBatch { data, labels })
    }
}
