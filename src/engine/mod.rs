//! Reaction batch engine.
//!
//! [`ReactionBatchEngine::run`] drives a whole batch: it validates the
//! reaction up front, plans the reactant combinations, iterates the primary
//! stream into work items, dispatches them to the bounded worker pool, and
//! delivers product rows to the consumer strictly in primary-stream order.
//! Per-item domain conditions become warnings; unexpected failures abort the
//! run with the offending primary index.

use std::sync::Arc;

use thiserror::Error;

use crate::applicator::{self, ApplicatorContext};
use crate::arena::ObjectArena;
use crate::chem::{ChemistryEngine, ChemistryError, ReactionSource};
use crate::core::{Pairing, ProductRow, RunOptions, RunOutcome, RunSummary, WorkItem, WorkResult};
use crate::plan::{self, CombinationMode, CombinationPolicy, PlanError};
use crate::pool::{self, PoolConfig, PoolOutcome, SinkDirective};
use crate::report::{categories, ProgressPort, RunCounters, WarningSink};
use crate::resource::SharedResource;
use crate::stream::StructureStream;

/// Progress is reported every this many flushed work items.
const PROGRESS_INTERVAL: u64 = 20;

/// Fatal errors of a run. Domain conditions (missing inputs, products
/// failing sanitization, unmatched patterns) are warnings, never errors.
#[derive(Debug, Error)]
pub enum RunError {
    /// The reaction definition could not be resolved or compiled; detected
    /// before any parallel work starts.
    #[error("reaction could not be compiled: {0}")]
    InvalidReaction(#[source] ChemistryError),

    /// The compiled reaction's reactant count does not match the number of
    /// supplied input streams.
    #[error("reaction expects {expected} reactant(s) but {supplied} input stream(s) were supplied")]
    ArityMismatch { expected: usize, supplied: usize },

    #[error(transparent)]
    Plan(#[from] PlanError),

    /// An unexpected failure inside a worker; the whole batch is aborted.
    #[error("processing failed for primary row {index}: {source}")]
    Worker {
        index: u64,
        #[source]
        source: ChemistryError,
    },
}

/// The engine owning the chemistry collaborator, the pool sizing and the
/// object arena of its runs.
pub struct ReactionBatchEngine {
    chemistry: Arc<dyn ChemistryEngine>,
    pool: PoolConfig,
    arena: ObjectArena,
}

impl ReactionBatchEngine {
    pub fn new(chemistry: Arc<dyn ChemistryEngine>) -> Self {
        ReactionBatchEngine {
            chemistry,
            pool: PoolConfig::from_available_parallelism(),
            arena: ObjectArena::new(),
        }
    }

    /// Overrides the default pool sizing; mainly for tests, which assert
    /// that results do not depend on the worker count.
    pub fn with_pool_config(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// The arena tracking native objects of this engine's runs. After `run`
    /// returns, no wave is left open.
    pub fn arena(&self) -> &ObjectArena {
        &self.arena
    }

    /// Applies the reaction to the input stream(s) and feeds product-row
    /// batches to `consumer` in primary-stream order.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        primary: &dyn StructureStream,
        secondary: Option<&dyn StructureStream>,
        reaction: &ReactionSource,
        policy: &CombinationPolicy,
        options: &RunOptions,
        progress: &dyn ProgressPort,
        mut consumer: impl FnMut(&[ProductRow]) + Send,
    ) -> Result<RunSummary, RunError> {
        let arity = if secondary.is_some() { 2 } else { 1 };

        // Validate the reaction before any parallel work: resolve and
        // compile once, then discard. The run itself constructs the shared
        // resource lazily from the resolved pattern.
        let pattern = reaction.resolve().map_err(RunError::InvalidReaction)?;
        let compiled = self
            .chemistry
            .compile_reaction(&pattern, arity)
            .map_err(RunError::InvalidReaction)?;
        if compiled.arity() != arity {
            return Err(RunError::ArityMismatch { expected: compiled.arity(), supplied: arity });
        }
        drop(compiled);

        let warnings = WarningSink::new();
        let counters = RunCounters::new();

        let len1 = primary.len_hint();
        let len2 = secondary.and_then(|s| s.len_hint());

        let plan = plan::plan(arity, len1, len2, policy)?;

        if plan.is_empty_input() {
            warnings.record(categories::EMPTY_INPUT);
            log::info!("input stream is empty - there are no reactants to process");
            return Ok(RunSummary {
                outcome: RunOutcome::Completed,
                rows_emitted: 0,
                warnings: warnings.snapshot(),
            });
        }

        if plan.has_length_mismatch() {
            warnings.record_once(categories::LENGTH_MISMATCH);
            log::warn!("paired streams have unequal lengths; using the shorter stream");
        }

        let chemistry = Arc::clone(&self.chemistry);
        let shared_reaction = SharedResource::new(move || {
            chemistry.compile_reaction(&pattern, arity)
        });

        let ctx = ApplicatorContext {
            chemistry: self.chemistry.as_ref(),
            reaction: &shared_reaction,
            secondary,
            plan: &plan,
            arena: &self.arena,
            options,
            warnings: &warnings,
            counters: &counters,
        };

        // Paired iteration over two known lengths stops at the shorter
        // stream; everywhere else the primary stream's own end governs.
        let primary_limit = match (arity, policy.mode) {
            (2, CombinationMode::Paired) => plan.paired_len().or(len1),
            _ => len1,
        };
        let total = primary_limit.or(len1);

        let items = (0u64..).map_while(|i| {
            if let Some(limit) = primary_limit {
                if i >= limit {
                    return None;
                }
            }
            primary.get(i).map(|record| WorkItem {
                primary: record,
                pairing: match (arity, policy.mode) {
                    (1, _) => Pairing::None,
                    (_, CombinationMode::Paired) => Pairing::Indexed(i),
                    (_, CombinationMode::Matrix) => Pairing::CrossProduct,
                },
            })
        });

        let mut rows_emitted: u64 = 0;
        log::info!("starting reaction batch over {} primary row(s)", match total {
            Some(t) => t.to_string(),
            None => "an unknown number of".to_string(),
        });

        let pool_result = pool::run_ordered(
            &self.pool,
            items,
            progress,
            |_, item| applicator::compute(&ctx, item),
            |index, result| {
                let directive = match result {
                    WorkResult::Rows(rows) => {
                        if !rows.is_empty() {
                            consumer(&rows);
                            rows_emitted += rows.len() as u64;
                        }
                        SinkDirective::Continue
                    }
                    WorkResult::MissingInput => {
                        warnings.record(categories::MISSING_INPUT);
                        SinkDirective::Continue
                    }
                    WorkResult::Excluded => SinkDirective::Continue,
                    WorkResult::EndOfSecondaryStream => SinkDirective::Stop,
                };
                if index % PROGRESS_INTERVAL == 0 {
                    progress.report_progress(
                        index,
                        total,
                        &format!("calculated {} product(s)", counters.products_emitted()),
                    );
                }
                directive
            },
        );

        // Whatever happened, no wave may survive the run.
        let leaked = self.arena.close_all();
        if leaked > 0 {
            log::debug!("force-closed {} wave(s) left open by aborted work", leaked);
        }

        match pool_result {
            Ok(run) => {
                let outcome = match run.outcome {
                    PoolOutcome::Completed => RunOutcome::Completed,
                    PoolOutcome::Cancelled => RunOutcome::Cancelled,
                    PoolOutcome::EarlyEnd => {
                        // The secondary stream ran out before the primary
                        // one; same condition as a known length mismatch.
                        warnings.record_once(categories::LENGTH_MISMATCH);
                        RunOutcome::SecondaryStreamEnded
                    }
                };
                progress.report_progress(
                    run.submitted,
                    total,
                    &format!("finished, {} product(s)", counters.products_emitted()),
                );
                log::info!(
                    "reaction batch done: {:?}, {} row(s) emitted, {} item(s) submitted",
                    outcome,
                    rows_emitted,
                    run.submitted
                );
                Ok(RunSummary { outcome, rows_emitted, warnings: warnings.snapshot() })
            }
            Err(failure) => {
                log::error!(
                    "reaction batch aborted at primary row {}: {}",
                    failure.index,
                    failure.error
                );
                Err(RunError::Worker { index: failure.index, source: failure.error })
            }
        }
    }
}
