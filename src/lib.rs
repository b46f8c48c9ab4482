//! # Retort
//!
//! Retort is a concurrent combinatorial reaction-application engine: it
//! applies a single compiled chemical transformation to one or two streams
//! of input structures, in parallel, while preserving deterministic output
//! ordering, bounding memory growth from native chemistry objects, and
//! tolerating per-item failures without aborting the batch.
//!
//! The name comes from the glass vessel in which alchemists ran their
//! reactions: reactants go in, products distill out, and the vessel survives
//! the occasional failed experiment.
//!
//! ## Features
//!
//! - Paired ("zip") and full cross-product ("matrix") combination of two
//!   reactant streams, with optional seed-reproducible random sub-sampling
//! - Bounded worker pool with backpressure and an ordered result sink, so
//!   output order never depends on thread scheduling
//! - Wave-scoped arenas releasing transient native objects per unit of work
//! - Per-item domain failures recorded as counted warnings, never aborting
//!   the batch; cooperative cancellation as a distinct outcome
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use retort::chem::template::TemplateChemistry;
//! use retort::chem::ReactionSource;
//! use retort::core::RunOptions;
//! use retort::plan::CombinationPolicy;
//! use retort::report::NullProgress;
//! use retort::stream::InMemoryStream;
//! use retort::ReactionBatchEngine;
//!
//! let chem = Arc::new(TemplateChemistry::new());
//! let primary = InMemoryStream::from_structures(vec![Some(chem.structure("CC"))]);
//!
//! let engine = ReactionBatchEngine::new(chem);
//! let summary = engine
//!     .run(
//!         &primary,
//!         None,
//!         &ReactionSource::Pattern("C>>{0}O".to_string()),
//!         &CombinationPolicy::paired(),
//!         &RunOptions::default(),
//!         &NullProgress,
//!         |_rows| {},
//!     )
//!     .unwrap();
//! assert!(summary.rows_emitted > 0);
//! ```

#![warn(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::new_without_default)]
#![allow(missing_docs)]

/// Reaction applicator computing one unit of work.
pub mod applicator;

/// Wave-scoped arena for transient native objects.
pub mod arena;

/// Chemistry engine boundary and the built-in template engine.
pub mod chem;

/// Core data structures of the engine.
pub mod core;

/// Batch engine orchestration.
pub mod engine;

/// Combination selector for pairing reactant streams.
pub mod plan;

/// Bounded worker pool with an ordered result sink.
pub mod pool;

/// Warnings, counters and the progress/cancellation port.
pub mod report;

/// Construct-once shared resources.
pub mod resource;

/// Input structure streams.
pub mod stream;

// Re-export the main entry points.
pub use crate::core::{ProductRow, RunOptions, RunOutcome, RunSummary};
pub use crate::engine::{ReactionBatchEngine, RunError};
