//! Genome-scale metabolic modeling as MCP tools.
//!
//! The crate layers bottom-up: `biochem` (database index), `cobra`
//! (model/media/solver), `template` (reconstruction templates), `genome`
//! (protein inputs), `session` (in-memory catalogs), then the pipelines
//! (`builder`, `gapfill`, `fba`), the shared `ops` layer, and finally the
//! `mcp` façade that exposes everything over stdio JSON-RPC through the
//! `state` service locator.

pub mod biochem;
pub mod builder;
pub mod cobra;
pub mod config;
pub mod error;
pub mod fba;
pub mod gapfill;
pub mod genome;
pub mod mcp;
pub mod ops;
pub mod response;
pub mod session;
pub mod state;
pub mod template;
