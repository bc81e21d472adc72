//! In-memory session catalogs for models and media.
//!
//! Model ids are a basename plus a state chain (`E_coli.draft.gf.gf`). The
//! chain is append-only: construction yields `.draft`, every gapfill pass
//! appends `.gf` verbatim. Re-gapfilling a model is valid history, so the
//! chain is never normalized or de-duplicated.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::cobra::{Media, Model};
use crate::error::ToolError;

pub const DEFAULT_MAX_MODELS: usize = 100;
pub const DEFAULT_MAX_MEDIA: usize = 50;

/// Id-collision retry budget for auto-minted ids.
const MINT_RETRIES: usize = 5;

// ── Model ids ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateToken {
    Draft,
    Gf,
}

impl StateToken {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "draft" => Some(Self::Draft),
            "gf" => Some(Self::Gf),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Gf => "gf",
        }
    }
}

/// Lifecycle state derived from the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    Draft,
    Gapfilled,
}

impl ModelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Gapfilled => "gapfilled",
        }
    }
}

/// A structured model id: basename + append-only state chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelId {
    basename: String,
    chain: Vec<StateToken>,
}

impl ModelId {
    pub fn draft(basename: impl Into<String>) -> Self {
        Self {
            basename: basename.into(),
            chain: vec![StateToken::Draft],
        }
    }

    /// Parse `basename.<chain>`. The chain is the longest run of trailing
    /// `draft`/`gf` tokens; everything before it (dots included) is the
    /// basename. Underscores in the basename are ordinary characters.
    pub fn parse(id: &str) -> Option<Self> {
        let parts: Vec<&str> = id.split('.').collect();
        let mut chain_start = parts.len();
        while chain_start > 1 && StateToken::parse(parts[chain_start - 1]).is_some() {
            chain_start -= 1;
        }
        if chain_start == parts.len() {
            return None; // no state suffix at all
        }
        let chain: Vec<StateToken> = parts[chain_start..]
            .iter()
            .map(|t| StateToken::parse(t).unwrap())
            .collect();
        let basename = parts[..chain_start].join(".");
        if basename.is_empty() {
            return None;
        }
        Some(Self { basename, chain })
    }

    /// The gapfill transition: append `gf`, never normalize.
    pub fn with_gf(&self) -> Self {
        let mut chain = self.chain.clone();
        chain.push(StateToken::Gf);
        Self {
            basename: self.basename.clone(),
            chain,
        }
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn state(&self) -> ModelState {
        if self.chain.contains(&StateToken::Gf) {
            ModelState::Gapfilled
        } else {
            ModelState::Draft
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.basename)?;
        for token in &self.chain {
            write!(f, ".{}", token.as_str())?;
        }
        Ok(())
    }
}

/// Replace characters outside `[A-Za-z0-9_-]` so user names cannot collide
/// with the `.` state delimiter.
pub fn sanitize_basename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "model".to_string()
    } else {
        cleaned
    }
}

// ── Side-channel metadata ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct AtpCorrectionStats {
    pub num_test_conditions: usize,
    pub num_passed: usize,
    pub num_failed: usize,
    pub num_reactions_added: usize,
    pub failed_media_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GapfillRecord {
    pub media_id: String,
    pub reactions_added: Vec<String>,
    pub growth_rate_before: f64,
    pub growth_rate_after: f64,
    pub target_growth_rate: f64,
    pub gapfilling_successful: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelMeta {
    pub template: String,
    pub created_at: String,
    pub is_draft: bool,
    pub gapfilled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atp_stats: Option<AtpCorrectionStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gapfill: Option<GapfillRecord>,
}

impl ModelMeta {
    pub fn draft(template: &str) -> Self {
        Self {
            template: template.to_string(),
            created_at: Utc::now().to_rfc3339(),
            is_draft: true,
            gapfilled: false,
            atp_stats: None,
            gapfill: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaMeta {
    pub created_at: String,
    pub predefined: bool,
    pub num_compounds: usize,
}

#[derive(Debug, Clone)]
pub struct StoredModel {
    pub model: Model,
    pub meta: ModelMeta,
}

#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub media: Media,
    pub meta: MediaMeta,
}

/// One row of `list_models`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelListEntry {
    pub model_id: String,
    pub state: ModelState,
    pub num_reactions: usize,
    pub num_metabolites: usize,
    pub num_genes: usize,
    #[serde(flatten)]
    pub meta: ModelMeta,
}

/// One row of `list_media`.
#[derive(Debug, Clone, Serialize)]
pub struct MediaListEntry {
    pub media_id: String,
    pub name: String,
    #[serde(flatten)]
    pub meta: MediaMeta,
}

// ── The store ───────────────────────────────────────────────────────────────

pub struct SessionStore {
    models: BTreeMap<String, StoredModel>,
    media: BTreeMap<String, StoredMedia>,
    max_models: usize,
    max_media: usize,
}

impl SessionStore {
    pub fn new(max_models: usize, max_media: usize) -> Self {
        Self {
            models: BTreeMap::new(),
            media: BTreeMap::new(),
            max_models,
            max_media,
        }
    }

    /// Install the predefined media library under its reserved ids.
    pub fn install_predefined_media(&mut self, library: Vec<Media>) {
        for media in library {
            let meta = MediaMeta {
                created_at: Utc::now().to_rfc3339(),
                predefined: true,
                num_compounds: media.num_compounds(),
            };
            self.media
                .insert(media.id.clone(), StoredMedia { media, meta });
        }
    }

    // ── Id minting ──────────────────────────────────────────────────────

    /// Auto id: `<prefix>_<yyyymmdd_hhmmss>_<rand4>`, collision-checked
    /// against the media catalog with a bounded retry budget.
    pub fn mint_media_id(&self, prefix: &str) -> Result<String, ToolError> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        for _ in 0..MINT_RETRIES {
            let suffix: String = rand::rng()
                .sample_iter(&Alphanumeric)
                .take(4)
                .map(char::from)
                .collect::<String>()
                .to_lowercase();
            let candidate = format!("{prefix}_{timestamp}_{suffix}");
            if !self.media.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(ToolError::storage(format!(
            "Could not mint a unique media id with prefix '{prefix}' after {MINT_RETRIES} attempts"
        )))
    }

    /// Model id for a draft: user basename (sanitized) or an auto token.
    /// User-name collisions are resolved by appending a timestamp, then
    /// microseconds.
    pub fn mint_model_id(&self, basename: Option<&str>) -> Result<ModelId, ToolError> {
        match basename {
            Some(name) => {
                let base = sanitize_basename(name);
                let candidate = ModelId::draft(base.clone());
                if !self.models.contains_key(&candidate.to_string()) {
                    return Ok(candidate);
                }
                let stamped = ModelId::draft(format!("{base}_{}", Utc::now().format("%H%M%S")));
                if !self.models.contains_key(&stamped.to_string()) {
                    return Ok(stamped);
                }
                let micro = ModelId::draft(format!("{base}_{}", Utc::now().format("%H%M%S_%6f")));
                if !self.models.contains_key(&micro.to_string()) {
                    return Ok(micro);
                }
                Err(ToolError::storage(format!(
                    "Could not mint a unique model id from basename '{name}'"
                )))
            }
            None => {
                let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
                for _ in 0..MINT_RETRIES {
                    let suffix: String = rand::rng()
                        .sample_iter(&Alphanumeric)
                        .take(4)
                        .map(char::from)
                        .collect::<String>()
                        .to_lowercase();
                    let candidate = ModelId::draft(format!("model_{timestamp}_{suffix}"));
                    if !self.models.contains_key(&candidate.to_string()) {
                        return Ok(candidate);
                    }
                }
                Err(ToolError::storage(format!(
                    "Could not mint a unique model id after {MINT_RETRIES} attempts"
                )))
            }
        }
    }

    // ── Models ──────────────────────────────────────────────────────────

    pub fn store_model(&mut self, id: &ModelId, stored: StoredModel) -> Result<(), ToolError> {
        let key = id.to_string();
        if self.models.contains_key(&key) {
            return Err(ToolError::storage(format!(
                "Model id '{key}' is already stored"
            )));
        }
        if self.models.len() >= self.max_models {
            warn!(
                limit = self.max_models,
                "model catalog exceeds its soft cap; consider deleting unused models"
            );
        }
        self.models.insert(key, stored);
        Ok(())
    }

    pub fn get_model(&self, id: &str) -> Result<&StoredModel, ToolError> {
        self.models.get(id).ok_or_else(|| {
            ToolError::not_found(
                format!("Model '{id}' is not in the session"),
                self.model_ids(),
                vec!["Use list_models to see available model ids".into()],
            )
        })
    }

    pub fn delete_model(&mut self, id: &str) -> Result<(), ToolError> {
        if self.models.remove(id).is_none() {
            return Err(ToolError::not_found(
                format!("Model '{id}' is not in the session"),
                self.model_ids(),
                vec!["Use list_models to see available model ids".into()],
            ));
        }
        Ok(())
    }

    pub fn model_ids(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn num_models(&self) -> usize {
        self.models.len()
    }

    pub fn list_models(&self) -> Vec<ModelListEntry> {
        self.models
            .iter()
            .map(|(id, stored)| ModelListEntry {
                model_id: id.clone(),
                state: Self::classify_state(id),
                num_reactions: stored.model.num_reactions(),
                num_metabolites: stored.model.num_metabolites(),
                num_genes: stored.model.num_genes(),
                meta: stored.meta.clone(),
            })
            .collect()
    }

    /// `gapfilled` when the chain contains `gf`, else `draft`. Unparseable
    /// ids (no state suffix) are treated as drafts.
    pub fn classify_state(id: &str) -> ModelState {
        ModelId::parse(id)
            .map(|m| m.state())
            .unwrap_or(ModelState::Draft)
    }

    // ── Media ───────────────────────────────────────────────────────────

    pub fn store_media(&mut self, media: Media) -> Result<(), ToolError> {
        let key = media.id.clone();
        if let Some(existing) = self.media.get(&key) {
            if existing.meta.predefined {
                return Err(ToolError::validation(
                    format!("Media id '{key}' is reserved for the predefined library"),
                    vec!["Pick a different media name".into()],
                ));
            }
            return Err(ToolError::storage(format!(
                "Media id '{key}' is already stored"
            )));
        }
        if self.media.len() >= self.max_media {
            warn!(
                limit = self.max_media,
                "media catalog exceeds its soft cap; consider deleting unused media"
            );
        }
        let meta = MediaMeta {
            created_at: Utc::now().to_rfc3339(),
            predefined: false,
            num_compounds: media.num_compounds(),
        };
        self.media.insert(key, StoredMedia { media, meta });
        Ok(())
    }

    pub fn get_media(&self, id: &str) -> Result<&StoredMedia, ToolError> {
        self.media.get(id).ok_or_else(|| {
            ToolError::not_found(
                format!("Media '{id}' is not in the session"),
                self.media_ids(),
                vec!["Use list_media to see available media ids".into()],
            )
        })
    }

    pub fn delete_media(&mut self, id: &str) -> Result<(), ToolError> {
        match self.media.get(id) {
            None => Err(ToolError::not_found(
                format!("Media '{id}' is not in the session"),
                self.media_ids(),
                vec!["Use list_media to see available media ids".into()],
            )),
            Some(stored) if stored.meta.predefined => Err(ToolError::validation(
                format!("Media '{id}' is predefined and cannot be deleted"),
                vec!["Predefined media persist for the whole session".into()],
            )),
            Some(_) => {
                self.media.remove(id);
                Ok(())
            }
        }
    }

    pub fn media_ids(&self) -> Vec<String> {
        self.media.keys().cloned().collect()
    }

    pub fn num_media(&self) -> usize {
        self.media.len()
    }

    pub fn list_media(&self) -> Vec<MediaListEntry> {
        self.media
            .iter()
            .map(|(id, stored)| MediaListEntry {
                media_id: id.clone(),
                name: stored.media.name.clone(),
                meta: stored.meta.clone(),
            })
            .collect()
    }

    /// Session teardown: drop both catalogs and log what was held.
    pub fn shutdown(&mut self) {
        info!(
            models = self.models.len(),
            media = self.media.len(),
            "clearing session store"
        );
        self.models.clear();
        self.media.clear();
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MODELS, DEFAULT_MAX_MEDIA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cobra::builtin_media;

    fn stored_model(id: &str) -> StoredModel {
        StoredModel {
            model: Model::new(id),
            meta: ModelMeta::draft("GramNegative"),
        }
    }

    #[test]
    fn model_id_parse_and_display_roundtrip() {
        for raw in ["E_coli.draft", "E_coli.draft.gf", "E_coli.draft.gf.gf", "my.strain.draft"] {
            let id = ModelId::parse(raw).unwrap();
            assert_eq!(id.to_string(), raw);
        }
        assert_eq!(ModelId::parse("my.strain.draft").unwrap().basename(), "my.strain");
    }

    #[test]
    fn model_id_without_state_suffix_is_invalid() {
        assert!(ModelId::parse("E_coli").is_none());
        assert!(ModelId::parse(".draft").is_none());
    }

    #[test]
    fn gf_appends_without_normalizing() {
        let id = ModelId::parse("E_coli.draft.gf").unwrap();
        let next = id.with_gf();
        assert_eq!(next.to_string(), "E_coli.draft.gf.gf");
        assert_eq!(id.to_string(), "E_coli.draft.gf");
    }

    #[test]
    fn state_classification() {
        assert_eq!(SessionStore::classify_state("x.draft"), ModelState::Draft);
        assert_eq!(SessionStore::classify_state("x.draft.gf"), ModelState::Gapfilled);
        assert_eq!(SessionStore::classify_state("x.draft.gf.gf"), ModelState::Gapfilled);
    }

    #[test]
    fn sanitize_replaces_delimiter_characters() {
        assert_eq!(sanitize_basename("E. coli K-12"), "E__coli_K-12");
        assert_eq!(sanitize_basename("   "), "model");
        assert_eq!(sanitize_basename("E_coli"), "E_coli");
    }

    #[test]
    fn user_basename_collision_gets_a_timestamp() {
        let mut store = SessionStore::default();
        let first = store.mint_model_id(Some("E_coli")).unwrap();
        store.store_model(&first, stored_model("m")).unwrap();
        assert_eq!(first.to_string(), "E_coli.draft");

        let second = store.mint_model_id(Some("E_coli")).unwrap();
        assert_ne!(second.to_string(), first.to_string());
        assert!(second.to_string().starts_with("E_coli_"));
        assert!(second.to_string().ends_with(".draft"));
    }

    #[test]
    fn auto_ids_are_unique() {
        let mut store = SessionStore::default();
        let a = store.mint_model_id(None).unwrap();
        store.store_model(&a, stored_model("a")).unwrap();
        let b = store.mint_model_id(None).unwrap();
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn retrieve_miss_lists_available_ids() {
        let mut store = SessionStore::default();
        let id = ModelId::draft("E_coli");
        store.store_model(&id, stored_model("m")).unwrap();
        let err = store.get_model("missing.draft").unwrap_err();
        match err {
            ToolError::NotFound { available_ids, .. } => {
                assert_eq!(available_ids, vec!["E_coli.draft".to_string()]);
            }
            other => panic!("expected not_found, got {other:?}"),
        }
    }

    #[test]
    fn predefined_media_cannot_be_deleted_or_overwritten() {
        let mut store = SessionStore::default();
        store.install_predefined_media(builtin_media());
        let err = store.delete_media("glucose_minimal_aerobic").unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let clash = Media::new("glucose_minimal_aerobic", "imposter");
        let err = store.store_media(clash).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn custom_media_lifecycle() {
        let mut store = SessionStore::default();
        let media = Media::new("my_medium", "My medium").with_compound("cpd00027");
        store.store_media(media).unwrap();
        assert!(store.get_media("my_medium").is_ok());
        store.delete_media("my_medium").unwrap();
        assert!(store.get_media("my_medium").is_err());
    }

    #[test]
    fn shutdown_clears_catalogs() {
        let mut store = SessionStore::default();
        store.install_predefined_media(builtin_media());
        store
            .store_model(&ModelId::draft("m"), stored_model("m"))
            .unwrap();
        store.shutdown();
        assert_eq!(store.num_models(), 0);
        assert_eq!(store.num_media(), 0);
    }
}
