//! Reaction applicator.
//!
//! Computes one work item: resolves the reactant structures, applies the
//! shared compiled reaction through the chemistry engine, sanitizes each
//! product, optionally suppresses duplicates within the work item, and
//! builds the output rows. Every transient structure is registered with the
//! item's arena wave; in matrix mode a sub-wave covers the secondary pass so
//! peak memory stays bounded to one primary row's cross product.

use std::collections::HashSet;

use serde_json::Value;

use crate::arena::{ObjectArena, WaveGuard};
use crate::chem::{ChemistryEngine, ChemistryError, CompiledReaction, Structure};
use crate::core::{Pairing, ProductRow, RunOptions, StructureRecord, WorkItem, WorkResult};
use crate::plan::CombinationPlan;
use crate::report::{categories, RunCounters, WarningSink};
use crate::resource::SharedResource;
use crate::stream::StructureStream;

/// Everything a worker needs to compute work items. All fields are shared
/// read-only across the pool except the warning sink and counters, which are
/// internally synchronized.
pub struct ApplicatorContext<'a> {
    pub chemistry: &'a dyn ChemistryEngine,
    pub reaction: &'a SharedResource<CompiledReaction>,
    pub secondary: Option<&'a dyn StructureStream>,
    pub plan: &'a CombinationPlan,
    pub arena: &'a ObjectArena,
    pub options: &'a RunOptions,
    pub warnings: &'a WarningSink,
    pub counters: &'a RunCounters,
}

/// Computes one work item. Domain conditions (missing structures, products
/// failing sanitization) come back inside [`WorkResult`] or as warnings;
/// an `Err` is a fatal condition for the whole batch.
pub fn compute(ctx: &ApplicatorContext<'_>, item: WorkItem) -> Result<WorkResult, ChemistryError> {
    let wave = WaveGuard::open(ctx.arena);
    let index = item.primary.index;
    // Canonical forms emitted by this work item; uniqueness is scoped per
    // work item, not global.
    let mut seen = HashSet::new();

    match item.pairing {
        Pairing::None => {
            if !ctx.plan.is_included(index, None) {
                return Ok(WorkResult::Excluded);
            }
            let Some(primary) = item.primary.structure.clone() else {
                return Ok(WorkResult::MissingInput);
            };
            wave.track(Box::new(primary.clone()));

            let mut rows = Vec::new();
            apply_combination(
                ctx,
                &wave,
                &mut seen,
                &[primary],
                &[index],
                &[&item.primary],
                &mut rows,
            )?;
            Ok(WorkResult::Rows(rows))
        }

        Pairing::Indexed(secondary_index) => {
            if !ctx.plan.is_included(index, Some(secondary_index)) {
                return Ok(WorkResult::Excluded);
            }
            let Some(stream) = ctx.secondary else {
                return Err(ChemistryError::Engine(
                    "no secondary stream for a two-reactant work item".to_string(),
                ));
            };
            let Some(primary) = item.primary.structure.clone() else {
                return Ok(WorkResult::MissingInput);
            };
            wave.track(Box::new(primary.clone()));

            let Some(secondary_record) = stream.get(secondary_index) else {
                return Ok(WorkResult::EndOfSecondaryStream);
            };
            let Some(secondary) = secondary_record.structure.clone() else {
                return Ok(WorkResult::MissingInput);
            };
            wave.track(Box::new(secondary.clone()));

            let mut rows = Vec::new();
            apply_combination(
                ctx,
                &wave,
                &mut seen,
                &[primary, secondary],
                &[index, secondary_index],
                &[&item.primary, &secondary_record],
                &mut rows,
            )?;
            Ok(WorkResult::Rows(rows))
        }

        Pairing::CrossProduct => {
            let Some(stream) = ctx.secondary else {
                return Err(ChemistryError::Engine(
                    "no secondary stream for a matrix work item".to_string(),
                ));
            };

            // The primary structure is resolved lazily so rows whose every
            // combination is excluded never touch the chemistry engine.
            let mut primary: Option<Structure> = None;
            let mut found_included = false;
            let mut rows = Vec::new();

            // Sub-wave for the whole secondary pass: released when this row
            // is done, bounding memory to one row's cross product.
            let pass_wave = WaveGuard::open(ctx.arena);
            let bound = ctx.plan.secondary_len();

            let mut secondary_index: u64 = 0;
            loop {
                if let Some(limit) = bound {
                    if secondary_index >= limit {
                        break;
                    }
                }
                let Some(secondary_record) = stream.get(secondary_index) else {
                    break;
                };

                if ctx.plan.is_included(index, Some(secondary_index)) {
                    found_included = true;

                    let prim = match primary.as_ref() {
                        Some(p) => p.clone(),
                        None => match item.primary.structure.as_ref() {
                            Some(s) => {
                                wave.track(Box::new(s.clone()));
                                primary = Some(s.clone());
                                s.clone()
                            }
                            None => return Ok(WorkResult::MissingInput),
                        },
                    };

                    match secondary_record.structure.clone() {
                        Some(secondary) => {
                            pass_wave.track(Box::new(secondary.clone()));
                            apply_combination(
                                ctx,
                                &pass_wave,
                                &mut seen,
                                &[prim, secondary],
                                &[index, secondary_index],
                                &[&item.primary, &secondary_record],
                                &mut rows,
                            )?;
                        }
                        None => ctx.warnings.record(categories::MISSING_INPUT),
                    }
                }
                secondary_index += 1;
            }
            drop(pass_wave);

            if rows.is_empty() && !found_included {
                return Ok(WorkResult::Excluded);
            }
            Ok(WorkResult::Rows(rows))
        }
    }
}

/// Applies the reaction to one reactant combination and appends the
/// surviving products as rows, in product-set order then in-set order.
fn apply_combination(
    ctx: &ApplicatorContext<'_>,
    wave: &WaveGuard<'_>,
    seen: &mut HashSet<String>,
    reactants: &[Structure],
    indices: &[u64],
    records: &[&StructureRecord],
    rows: &mut Vec<ProductRow>,
) -> Result<(), ChemistryError> {
    let reaction = ctx.reaction.get()?;
    let product_sets = ctx.chemistry.run_reaction(reaction, reactants)?;

    for (set_index, product_set) in product_sets.iter().enumerate() {
        for (product_index, raw_product) in product_set.iter().enumerate() {
            wave.track(Box::new(raw_product.clone()));

            let product = match ctx.chemistry.sanitize(raw_product) {
                Ok(sanitized) => {
                    wave.track(Box::new(sanitized.clone()));
                    sanitized
                }
                Err(err) => {
                    ctx.warnings.record(categories::SANITIZE_FAILED);
                    log::warn!("product could not be sanitized and will be skipped: {}", err);
                    continue;
                }
            };

            if ctx.options.unique_products {
                match ctx.chemistry.canonical_form(&product) {
                    Ok(canonical) => {
                        if !seen.insert(canonical) {
                            continue;
                        }
                    }
                    Err(err) => {
                        ctx.warnings.record(categories::SANITIZE_FAILED);
                        log::warn!(
                            "no canonical form for a product, skipping uniqueness check: {}",
                            err
                        );
                        continue;
                    }
                }
            }

            ctx.counters.increment_products();
            rows.push(ProductRow {
                product_set_index: set_index as u32,
                product_index: product_index as u32,
                reactant_indices: indices.to_vec(),
                reactant_structures: reactants.to_vec(),
                product_structure: product,
                extra_columns: collect_passthrough(ctx.options, records),
            });
        }
    }

    Ok(())
}

/// Resolves the configured passthrough columns against the input records,
/// primary first; a name that no record carries becomes a null value.
fn collect_passthrough(options: &RunOptions, records: &[&StructureRecord]) -> Vec<Value> {
    options
        .passthrough_columns
        .iter()
        .map(|name| {
            records
                .iter()
                .find_map(|record| record.properties.get(name).cloned())
                .unwrap_or(Value::Null)
        })
        .collect()
}
