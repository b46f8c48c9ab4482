//! Chemistry engine boundary.
//!
//! The reaction core treats all chemistry as an external collaborator: a
//! [`ChemistryEngine`] compiles reaction patterns, applies a compiled
//! reaction to a set of reactant structures, sanitizes product structures
//! and computes canonical forms for product comparison. Structures and
//! compiled reactions are opaque handles; only the engine that created them
//! knows their representation.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub mod template;

/// Result type alias for chemistry operations.
pub type ChemResult<T> = Result<T, ChemistryError>;

/// Errors raised by a chemistry engine.
#[derive(Error, Debug, Clone)]
pub enum ChemistryError {
    /// The reaction pattern could not be parsed.
    #[error("Invalid reaction pattern: {0}")]
    InvalidPattern(String),

    /// The pattern has a different number of reactant slots than the caller supplied.
    #[error("Reaction has {found} reactant slot(s), expected {expected}")]
    ReactantCountMismatch { expected: usize, found: usize },

    /// A product structure failed sanitization.
    #[error("Sanitization failed: {0}")]
    Sanitization(String),

    /// Any other failure inside the engine.
    #[error("Chemistry engine error: {0}")]
    Engine(String),
}

/// An opaque, cheaply cloneable handle to an in-memory molecule.
///
/// The handle keeps the underlying native object alive for as long as any
/// clone exists; registering a clone with an arena wave ties the object's
/// lifetime to that wave.
#[derive(Clone)]
pub struct Structure {
    handle: Arc<dyn Any + Send + Sync>,
}

impl Structure {
    /// Wraps an engine-specific representation.
    pub fn from_handle(handle: Arc<dyn Any + Send + Sync>) -> Self {
        Structure { handle }
    }

    /// Downcasts to the engine-specific representation.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.handle.downcast_ref::<T>()
    }
}

impl fmt::Debug for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Structure")
    }
}

/// A compiled transformation with a fixed number of reactant slots.
///
/// Immutable after construction and shared by reference across worker
/// threads; all read operations on the underlying handle must be safe for
/// concurrent access.
pub struct CompiledReaction {
    arity: usize,
    handle: Arc<dyn Any + Send + Sync>,
}

impl CompiledReaction {
    /// Wraps an engine-specific compiled reaction.
    pub fn new(arity: usize, handle: Arc<dyn Any + Send + Sync>) -> Self {
        CompiledReaction { arity, handle }
    }

    /// Number of reactant slots of this reaction.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Downcasts to the engine-specific representation.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.handle.downcast_ref::<T>()
    }
}

impl fmt::Debug for CompiledReaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledReaction").field("arity", &self.arity).finish()
    }
}

/// Where the reaction definition comes from: a literal pattern string, or a
/// provider callback reading it from a second structured input.
pub enum ReactionSource {
    Pattern(String),
    Provider(Box<dyn Fn() -> ChemResult<String> + Send + Sync>),
}

impl ReactionSource {
    /// Resolves the textual reaction definition.
    pub fn resolve(&self) -> ChemResult<String> {
        match self {
            ReactionSource::Pattern(pattern) => Ok(pattern.clone()),
            ReactionSource::Provider(provider) => provider(),
        }
    }
}

impl fmt::Debug for ReactionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactionSource::Pattern(pattern) => write!(f, "ReactionSource::Pattern({:?})", pattern),
            ReactionSource::Provider(_) => f.write_str("ReactionSource::Provider(..)"),
        }
    }
}

/// The chemistry operations the reaction core relies on.
///
/// Implementations must be safe for concurrent use: `run_reaction` is called
/// from many worker threads against the same compiled reaction.
pub trait ChemistryEngine: Send + Sync {
    /// Compiles a textual reaction pattern into a reusable reaction.
    ///
    /// Fails if the pattern is invalid or if its number of reactant slots
    /// does not match `expected_reactants`.
    fn compile_reaction(
        &self,
        pattern: &str,
        expected_reactants: usize,
    ) -> ChemResult<CompiledReaction>;

    /// Applies the reaction to one reactant combination.
    ///
    /// Returns zero or more product sets, one per way the pattern matched
    /// the reactants; each set holds zero or more raw product structures.
    /// An empty vector means the pattern did not match, which is a normal
    /// outcome, not an error.
    fn run_reaction(
        &self,
        reaction: &CompiledReaction,
        reactants: &[Structure],
    ) -> ChemResult<Vec<Vec<Structure>>>;

    /// Sanitizes a raw product structure, returning the cleaned-up structure.
    fn sanitize(&self, product: &Structure) -> ChemResult<Structure>;

    /// Computes a canonical textual form used for product comparison.
    fn canonical_form(&self, structure: &Structure) -> ChemResult<String>;

    /// Renders a structure for display or export.
    fn render(&self, structure: &Structure) -> String;
}
