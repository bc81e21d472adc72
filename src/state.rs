//! Process-scoped service locator.
//!
//! The MCP framework derives JSON schemas from tool signatures, so tool
//! parameters must stay JSON-serializable; the biochemistry index, template
//! registry, and session store cannot travel through them. The bootstrap
//! populates these statics before the first request is served, and the tool
//! wrappers in `mcp` resolve their dependencies through the getters below.
//! Core functions in `ops` never touch this module: they take dependencies
//! explicitly.

use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::biochem::BiochemIndex;
use crate::error::ToolError;
use crate::genome::Annotator;
use crate::session::SessionStore;
use crate::template::TemplateRegistry;

static BIOCHEM: OnceLock<BiochemIndex> = OnceLock::new();
static TEMPLATES: OnceLock<TemplateRegistry> = OnceLock::new();
static SESSIONS: OnceLock<Mutex<SessionStore>> = OnceLock::new();
static ANNOTATOR: OnceLock<Box<dyn Annotator>> = OnceLock::new();

/// Populate the locator. Must run exactly once, before serving begins.
pub fn init(biochem: BiochemIndex, templates: TemplateRegistry, sessions: SessionStore) {
    let _ = BIOCHEM.set(biochem);
    let _ = TEMPLATES.set(templates);
    let _ = SESSIONS.set(Mutex::new(sessions));
}

/// Install an external annotation service. Optional; without one, build
/// requests with `annotate: true` fail with a library error.
pub fn set_annotator(annotator: Box<dyn Annotator>) {
    let _ = ANNOTATOR.set(annotator);
}

pub fn biochem() -> Result<&'static BiochemIndex, ToolError> {
    BIOCHEM
        .get()
        .ok_or_else(|| ToolError::server("biochemistry index is not initialized"))
}

pub fn templates() -> Result<&'static TemplateRegistry, ToolError> {
    TEMPLATES
        .get()
        .ok_or_else(|| ToolError::server("template registry is not initialized"))
}

pub fn sessions() -> Result<MutexGuard<'static, SessionStore>, ToolError> {
    SESSIONS
        .get()
        .ok_or_else(|| ToolError::server("session store is not initialized"))?
        .lock()
        .map_err(|_| ToolError::server("session store lock is poisoned"))
}

pub fn annotator() -> Option<&'static dyn Annotator> {
    ANNOTATOR.get().map(|boxed| &**boxed)
}
