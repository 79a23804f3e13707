//! Asynchronous video-clip sampling and prefetch pipeline.
//!
//! `clip_loader` supplies fixed-size batches of decoded, augmented video
//! volumes (and optional labels) to a downstream consumer on a strict
//! one-batch-ahead schedule, overlapping disk/video decoding with consumer
//! compute.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌─────────────┐
//!                  │ Source list │ (path, start-or-count, label)
//!                  └──────┬──────┘
//!                         │ permuted by ShuffleCursor
//!                         ↓
//!                  ┌─────────────┐
//!                  │ ClipSampler │ (segment layout + frame indices)
//!                  └──────┬──────┘
//!                         │ one-based frame indices
//!                         ↓
//!                 ┌───────────────┐
//!                 │ Frame decoder │ (video or image sequence)
//!                 └───────┬───────┘
//!                         │ VolumeRecord (channel-major bytes)
//!                         ↓
//!                 ┌───────────────┐
//!                 │   Assembler   │ (crop / mirror / mean / scale)
//!                 └───────┬───────┘
//!                         │ in-flight batch tensor
//!                         ↓
//!                  ┌─────────────┐
//!                  │  ClipLoader │ ←─ rendezvous handoff to the consumer
//!                  └─────────────┘
//! ```
//!
//! The prefetch worker runs on a single background thread and owns all
//! mutable decode state (shuffle order, cursor, RNG). Completed batches move
//! to the consumer by ownership transfer over a rendezvous channel, so decode
//! of batch N+2 cannot begin until batch N+1 has been handed off.

pub mod assemble;
pub mod config;
pub mod decode;
pub mod loader;
pub mod sampler;
pub mod snapshot;
pub mod source;
pub mod volume;

pub use config::{ClipLoaderConfig, ClipLoaderConfigBuilder, Phase, SamplingPolicy, SourceKind};
pub use loader::{ClipBatch, ClipLoader};
pub use volume::{VolumePayload, VolumeRecord};
