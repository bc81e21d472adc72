//! Environment-variable configuration with working defaults.
//!
//! The server starts with no configuration at all: biochemistry files under
//! `data/biochem`, templates under `data/templates`, the built-in media
//! library, and `info`-level logging to stderr.

use std::env;
use std::path::PathBuf;

use crate::session::{DEFAULT_MAX_MEDIA, DEFAULT_MAX_MODELS};

pub const ENV_BIOCHEM_DIR: &str = "METAFLUX_BIOCHEM_DIR";
pub const ENV_TEMPLATE_DIR: &str = "METAFLUX_TEMPLATE_DIR";
pub const ENV_MEDIA_DIR: &str = "METAFLUX_MEDIA_DIR";
pub const ENV_LOG: &str = "METAFLUX_LOG";
pub const ENV_MAX_MODELS: &str = "METAFLUX_MAX_MODELS";
pub const ENV_MAX_MEDIA: &str = "METAFLUX_MAX_MEDIA";

/// File names expected inside the biochemistry directory.
pub const COMPOUNDS_FILE: &str = "compounds.tsv";
pub const REACTIONS_FILE: &str = "reactions.tsv";

#[derive(Debug, Clone)]
pub struct Config {
    pub biochem_dir: PathBuf,
    pub template_dir: PathBuf,
    pub media_dir: PathBuf,
    pub log_filter: String,
    pub max_models: usize,
    pub max_media: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            biochem_dir: path_var(ENV_BIOCHEM_DIR, "data/biochem"),
            template_dir: path_var(ENV_TEMPLATE_DIR, "data/templates"),
            media_dir: path_var(ENV_MEDIA_DIR, "data/media"),
            log_filter: env::var(ENV_LOG).unwrap_or_else(|_| "info".into()),
            max_models: usize_var(ENV_MAX_MODELS, DEFAULT_MAX_MODELS),
            max_media: usize_var(ENV_MAX_MEDIA, DEFAULT_MAX_MEDIA),
        }
    }

    pub fn compounds_file(&self) -> PathBuf {
        self.biochem_dir.join(COMPOUNDS_FILE)
    }

    pub fn reactions_file(&self) -> PathBuf {
        self.biochem_dir.join(REACTIONS_FILE)
    }
}

fn path_var(name: &str, default: &str) -> PathBuf {
    env::var(name).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

fn usize_var(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
