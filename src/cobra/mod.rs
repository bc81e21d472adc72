//! Constraint-based model representation and the LP solver seam.
//!
//! `Model` is the opaque handle the session store owns: reactions,
//! metabolites, genes, compartments, a medium property with
//! close-all-then-open semantics, an objective, deep-copy (via `Clone`), and
//! `solver::optimize`. The orchestration layers never look past this API.

pub mod media;
pub mod model;
pub mod solver;

use thiserror::Error;

pub use media::{apply_media, builtin_media, AppliedMedia, Media, EXTRACELLULAR};
pub use model::{Gene, Metabolite, Model, ObjectiveSense, Reaction, MAX_FLUX};
pub use solver::{optimize, FluxSolution, SolverStatus};

/// Failures raised by the model layer and the solver backend.
#[derive(Debug, Error)]
pub enum CobraError {
    #[error("reaction '{0}' is not in the model")]
    UnknownReaction(String),

    #[error("duplicate reaction id '{0}'")]
    DuplicateReaction(String),

    #[error("metabolite '{0}' referenced by a reaction is not in the model")]
    UnknownMetabolite(String),

    #[error("solver failure: {0}")]
    Solver(String),
}
