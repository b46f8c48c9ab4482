//! Construct-once shared resources.
//!
//! A [`SharedResource`] wraps an expensive-to-construct, read-mostly value
//! (the compiled reaction of a run). The first `get()` from any thread runs
//! the factory exactly once; the outcome, value or error, is stored and
//! every later caller observes the same outcome. After successful
//! construction reads are plain memory loads with no further
//! synchronization cost.

use std::sync::{Mutex, OnceLock};

use crate::chem::ChemistryError;

type Factory<T> = Box<dyn FnOnce() -> Result<T, ChemistryError> + Send>;

pub struct SharedResource<T> {
    cell: OnceLock<Result<T, ChemistryError>>,
    factory: Mutex<Option<Factory<T>>>,
}

impl<T> SharedResource<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: FnOnce() -> Result<T, ChemistryError> + Send + 'static,
    {
        SharedResource {
            cell: OnceLock::new(),
            factory: Mutex::new(Some(Box::new(factory))),
        }
    }

    /// Returns the resource, constructing it on first access. A
    /// construction error is replayed to every caller.
    pub fn get(&self) -> Result<&T, ChemistryError> {
        let outcome = self.cell.get_or_init(|| {
            let factory = self.factory.lock().unwrap().take();
            match factory {
                Some(build) => build(),
                // Unreachable under OnceLock's single-init guarantee.
                None => Err(ChemistryError::Engine("resource factory already consumed".to_string())),
            }
        });
        match outcome {
            Ok(value) => Ok(value),
            Err(err) => Err(err.clone()),
        }
    }

    /// True once the factory ran, whether it succeeded or failed.
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}
