//! Typed error taxonomy for every core operation.
//!
//! Core functions raise `ToolError`; only the MCP façade converts errors into
//! JSON envelopes (see `response`). Each variant maps to a stable `error_kind`
//! string and numeric `error_code` so RPC clients can branch without parsing
//! messages, and carries `recovery_suggestions` an LLM can act on directly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    /// Malformed or inconsistent input: bad id pattern, invalid amino acids,
    /// both-or-neither input sources, unknown template or mode names.
    #[error("{message}")]
    Validation {
        message: String,
        recovery_suggestions: Vec<String>,
    },

    /// A referenced model/media/compound/reaction id is absent. Carries the
    /// currently available ids (capped) so the caller can self-correct.
    #[error("{message}")]
    NotFound {
        message: String,
        available_ids: Vec<String>,
        recovery_suggestions: Vec<String>,
    },

    /// The LP is infeasible or unbounded, or gapfilling cannot reach the
    /// requested growth rate.
    #[error("{message}")]
    Infeasible {
        message: String,
        growth_rate: f64,
        target_growth_rate: f64,
        recovery_suggestions: Vec<String>,
    },

    /// An error bubbled up from a collaborator (solver backend, annotation
    /// service, FASTA reader). The original message is preserved verbatim.
    #[error("{message}")]
    Library {
        message: String,
        recovery_suggestions: Vec<String>,
    },

    /// Biochemistry files missing, unreadable, or structurally unusable.
    #[error("{message}")]
    Database {
        message: String,
        recovery_suggestions: Vec<String>,
    },

    /// Session-store failures: exhausted id-collision retries.
    #[error("{message}")]
    Storage {
        message: String,
        recovery_suggestions: Vec<String>,
    },

    /// Unclassified internal inconsistency.
    #[error("{message}")]
    Server {
        message: String,
        recovery_suggestions: Vec<String>,
    },
}

/// Cap applied to `available_ids` lists embedded in not-found errors.
pub const AVAILABLE_IDS_CAP: usize = 25;

impl ToolError {
    pub fn validation(message: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self::Validation {
            message: message.into(),
            recovery_suggestions: suggestions,
        }
    }

    pub fn not_found(
        message: impl Into<String>,
        mut available_ids: Vec<String>,
        suggestions: Vec<String>,
    ) -> Self {
        available_ids.truncate(AVAILABLE_IDS_CAP);
        Self::NotFound {
            message: message.into(),
            available_ids,
            recovery_suggestions: suggestions,
        }
    }

    pub fn infeasible(
        message: impl Into<String>,
        growth_rate: f64,
        target_growth_rate: f64,
        suggestions: Vec<String>,
    ) -> Self {
        Self::Infeasible {
            message: message.into(),
            growth_rate,
            target_growth_rate,
            recovery_suggestions: suggestions,
        }
    }

    pub fn library(message: impl Into<String>) -> Self {
        Self::Library {
            message: message.into(),
            recovery_suggestions: vec![
                "Retry the call; transient collaborator failures are common".into(),
            ],
        }
    }

    pub fn database(message: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self::Database {
            message: message.into(),
            recovery_suggestions: suggestions,
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            recovery_suggestions: vec!["Delete unused models with delete_model and retry".into()],
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
            recovery_suggestions: vec![],
        }
    }

    /// Machine-readable kind string used in error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found_error",
            Self::Infeasible { .. } => "infeasibility_error",
            Self::Library { .. } => "library_error",
            Self::Database { .. } => "database_error",
            Self::Storage { .. } => "storage_error",
            Self::Server { .. } => "server_error",
        }
    }

    /// Stable numeric code for RPC clients.
    pub fn code(&self) -> u32 {
        match self {
            Self::Validation { .. } => 1001,
            Self::NotFound { .. } => 1002,
            Self::Infeasible { .. } => 1003,
            Self::Library { .. } => 1004,
            Self::Database { .. } => 1005,
            Self::Storage { .. } => 1006,
            Self::Server { .. } => 1500,
        }
    }

    pub fn recovery_suggestions(&self) -> &[String] {
        match self {
            Self::Validation {
                recovery_suggestions,
                ..
            }
            | Self::NotFound {
                recovery_suggestions,
                ..
            }
            | Self::Infeasible {
                recovery_suggestions,
                ..
            }
            | Self::Library {
                recovery_suggestions,
                ..
            }
            | Self::Database {
                recovery_suggestions,
                ..
            }
            | Self::Storage {
                recovery_suggestions,
                ..
            }
            | Self::Server {
                recovery_suggestions,
                ..
            } => recovery_suggestions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_and_codes_are_stable() {
        let err = ToolError::validation("bad id", vec![]);
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(err.code(), 1001);

        let err = ToolError::not_found("missing", vec!["a".into()], vec![]);
        assert_eq!(err.kind(), "not_found_error");
        assert_eq!(err.code(), 1002);

        let err = ToolError::infeasible("no growth", 0.0, 0.1, vec![]);
        assert_eq!(err.kind(), "infeasibility_error");
        assert_eq!(err.code(), 1003);
    }

    #[test]
    fn available_ids_are_capped() {
        let ids: Vec<String> = (0..100).map(|i| format!("model_{i}")).collect();
        let err = ToolError::not_found("missing", ids, vec![]);
        match err {
            ToolError::NotFound { available_ids, .. } => {
                assert_eq!(available_ids.len(), AVAILABLE_IDS_CAP);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn display_is_the_message() {
        let err = ToolError::library("solver exploded");
        assert_eq!(err.to_string(), "solver exploded");
    }
}
