//! Core data structures of the reaction batch engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chem::Structure;

/// One record read from an input structure stream.
///
/// `structure` is `None` for a missing/empty input at that position; the
/// record is immutable once read from its source stream. `properties` holds
/// the source row's additional columns, available for passthrough into
/// product rows.
#[derive(Debug, Clone)]
pub struct StructureRecord {
    pub index: u64,
    pub structure: Option<Structure>,
    pub properties: HashMap<String, Value>,
}

impl StructureRecord {
    pub fn new(index: u64, structure: Option<Structure>) -> Self {
        StructureRecord { index, structure, properties: HashMap::new() }
    }

    pub fn with_properties(
        index: u64,
        structure: Option<Structure>,
        properties: HashMap<String, Value>,
    ) -> Self {
        StructureRecord { index, structure, properties }
    }
}

/// How a primary record pairs with the secondary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pairing {
    /// Single-reactant reaction, no secondary stream.
    None,
    /// Paired mode: combine with the secondary record at this index.
    Indexed(u64),
    /// Matrix mode: combine with every secondary record.
    CrossProduct,
}

/// One unit of work: a primary record plus the pairing decision made by the
/// combination selector for its row. Secondary records are fetched inside
/// the worker through the shared stream, so matrix-mode memory stays bounded
/// to one pass.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub primary: StructureRecord,
    pub pairing: Pairing,
}

/// One output row describing a single reaction product.
#[derive(Debug, Clone)]
pub struct ProductRow {
    /// Which product set (way the pattern matched) this product came from.
    pub product_set_index: u32,
    /// Position of the product within its set.
    pub product_index: u32,
    /// Original stream indices of the reactants, primary first.
    pub reactant_indices: Vec<u64>,
    /// The reactant structures, primary first.
    pub reactant_structures: Vec<Structure>,
    /// The sanitized product structure.
    pub product_structure: Structure,
    /// Passthrough column values resolved from the input records.
    pub extra_columns: Vec<Value>,
}

/// Outcome of computing one work item.
#[derive(Debug)]
pub enum WorkResult {
    /// Product rows, possibly empty (pattern did not match, or every
    /// product failed sanitization).
    Rows(Vec<ProductRow>),
    /// A required input structure was absent; recorded as a warning.
    MissingInput,
    /// Every combination of this work item was excluded by sampling.
    Excluded,
    /// The secondary stream had no record at the required index; normal
    /// termination of paired iteration, not an error.
    EndOfSecondaryStream,
}

/// User-facing options of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOptions {
    /// Suppress duplicate products (by canonical form) within one work item.
    pub unique_products: bool,
    /// Names of input-row properties copied into each product row.
    #[serde(default)]
    pub passthrough_columns: Vec<String>,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The cancellation port requested a stop; in-flight work finished.
    Cancelled,
    /// Paired iteration ran off the end of a secondary stream of unknown
    /// length; everything submitted before that point was delivered.
    SecondaryStreamEnded,
}

/// Summary returned by a successful (non-fatal) run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub rows_emitted: u64,
    /// Warning counts keyed by stable category (see [`crate::report::categories`]).
    pub warnings: HashMap<String, u64>,
}
