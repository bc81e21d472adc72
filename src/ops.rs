//! Shared operation layer for every transport surface.
//!
//! Each `op_*` function implements one tool end to end: validation, core
//! pipeline, session mutation, payload assembly. Dependencies (index,
//! registry, store, annotator) are passed explicitly so the layer has no
//! dependency on rmcp or the service locator and is directly testable.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::biochem::{BiochemIndex, CompoundRecord, ReactionRecord, SearchOutcome};
use crate::builder::{build_draft_model, ModelStats};
use crate::cobra::Media;
use crate::error::ToolError;
use crate::fba::{run_fba, FbaOutcome, DEFAULT_FLUX_THRESHOLD};
use crate::gapfill::{run_gapfill, AddedReaction, GapfillMode, PathwaySummary};
use crate::genome::{Annotator, Genome};
use crate::session::{
    GapfillRecord, MediaListEntry, ModelId, ModelListEntry, ModelMeta, SessionStore, StoredModel,
};
use crate::template::TemplateRegistry;

/// Default biomass target for gapfilling, in 1/h.
pub const DEFAULT_TARGET_GROWTH: f64 = 0.01;

/// Search results are clamped to this window.
pub const MAX_SEARCH_LIMIT: usize = 100;

// ── build_media ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BuildMediaResult {
    pub media_id: String,
    pub name: String,
    pub num_compounds: usize,
    /// Compound id → (lower bound, upper bound).
    pub compounds: BTreeMap<String, (f64, f64)>,
    /// Compound id → human-readable name.
    pub compound_names: BTreeMap<String, String>,
    pub next_steps: Vec<String>,
}

pub fn op_build_media(
    biochem: &BiochemIndex,
    store: &mut SessionStore,
    compounds: &[String],
    name: Option<&str>,
    compound_bounds: Option<&BTreeMap<String, (f64, f64)>>,
) -> Result<BuildMediaResult, ToolError> {
    if compounds.is_empty() {
        return Err(ToolError::validation(
            "build_media needs at least one compound id",
            vec!["Pass compounds as a list of cpd##### ids".into()],
        ));
    }

    // Validate every compound before touching the store; enumerate all
    // offenders in one error.
    let mut invalid: Vec<&str> = compounds
        .iter()
        .filter(|c| biochem.get_compound(c).is_err())
        .map(String::as_str)
        .collect();
    if !invalid.is_empty() {
        invalid.sort_unstable();
        return Err(ToolError::validation(
            format!(
                "{} compound id(s) are malformed or not in the biochemistry database: {}",
                invalid.len(),
                invalid.join(", ")
            ),
            vec!["Use search_compounds to find valid compound ids by name".into()],
        ));
    }

    let media_id = match name {
        Some(name) => crate::session::sanitize_basename(name),
        None => store.mint_media_id("media")?,
    };

    let display_name = name.unwrap_or(&media_id).to_string();
    let mut media = Media::new(media_id.clone(), display_name.clone());
    for compound in compounds {
        media = match compound_bounds.and_then(|b| b.get(compound)) {
            Some(&(lower, upper)) => media.with_bounds(compound, lower, upper),
            None => media.with_compound(compound),
        };
    }

    let compounds_out = media.compounds.clone();
    let compound_names = compounds_out
        .keys()
        .map(|id| (id.clone(), biochem.compound_display_name(id)))
        .collect();

    store.store_media(media)?;

    Ok(BuildMediaResult {
        media_id: media_id.clone(),
        name: display_name,
        num_compounds: compounds_out.len(),
        compounds: compounds_out,
        compound_names,
        next_steps: vec![
            format!("Run run_fba with media_id '{media_id}'"),
            format!("Gapfill a model against media_id '{media_id}'"),
        ],
    })
}

// ── build_model ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BuildModelInterpretation {
    pub model_quality: String,
    pub annotation_status: String,
    pub readiness: String,
}

#[derive(Debug, Serialize)]
pub struct BuildModelResult {
    pub model_id: String,
    pub template: String,
    pub statistics: ModelStats,
    pub interpretation: BuildModelInterpretation,
    pub next_steps: Vec<String>,
}

pub struct BuildModelInput<'a> {
    pub fasta_path: Option<&'a str>,
    pub protein_sequences: Option<&'a BTreeMap<String, String>>,
    pub template: &'a str,
    pub model_name: Option<&'a str>,
    pub annotate: bool,
}

pub fn op_build_model(
    templates: &TemplateRegistry,
    store: &mut SessionStore,
    annotator: Option<&dyn Annotator>,
    input: BuildModelInput<'_>,
) -> Result<BuildModelResult, ToolError> {
    let template = templates.get(input.template)?;

    let model_id = store.mint_model_id(input.model_name)?;
    let mut genome = match (input.fasta_path, input.protein_sequences) {
        (Some(path), None) => Genome::from_fasta(model_id.basename(), std::path::Path::new(path))?,
        (None, Some(proteins)) => Genome::from_protein_map(model_id.basename(), proteins)?,
        (Some(_), Some(_)) => {
            return Err(ToolError::validation(
                "Pass exactly one of fasta_path or protein_sequences, not both",
                vec!["Drop one of the two input sources".into()],
            ));
        }
        (None, None) => {
            return Err(ToolError::validation(
                "Pass exactly one of fasta_path or protein_sequences",
                vec!["Supply fasta_path, or protein_sequences as {\"id\": \"sequence\"}".into()],
            ));
        }
    };

    if input.annotate {
        // Annotation failures are surfaced, never silently degraded.
        let annotator = annotator.ok_or_else(|| {
            ToolError::library(
                "Functional annotation was requested but no annotation service is configured",
            )
        })?;
        annotator
            .annotate(&mut genome)
            .map_err(|e| ToolError::library(format!("annotation service failed: {e}")))?;
    }

    let draft = build_draft_model(&genome, template, &model_id.to_string())?;
    let stats = draft.stats;

    let model_quality = if stats.num_reactions >= 500 {
        "genome-scale"
    } else if stats.num_reactions >= 100 {
        "intermediate"
    } else {
        "minimal"
    };
    let annotation_status = if draft.annotated_fraction >= 0.8 {
        "well annotated"
    } else if draft.annotated_fraction > 0.0 {
        "partially annotated"
    } else {
        "unannotated"
    };
    let readiness = if stats.biomass_reaction_id.is_some() && stats.num_exchanges > 0 {
        "ready for gapfilling"
    } else {
        "not ready: missing biomass reaction or exchanges"
    };

    store.store_model(
        &model_id,
        StoredModel {
            model: draft.model,
            meta: ModelMeta::draft(input.template),
        },
    )?;

    let id_string = model_id.to_string();
    Ok(BuildModelResult {
        model_id: id_string.clone(),
        template: input.template.to_string(),
        statistics: stats,
        interpretation: BuildModelInterpretation {
            model_quality: model_quality.to_string(),
            annotation_status: annotation_status.to_string(),
            readiness: readiness.to_string(),
        },
        next_steps: vec![
            format!(
                "Gapfill with gapfill_model(model_id='{id_string}', media_id='glucose_minimal_aerobic')"
            ),
            format!(
                "Inspect growth with run_fba(model_id='{id_string}', media_id='glucose_minimal_aerobic')"
            ),
        ],
    })
}

// ── gapfill_model ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct GapfillInterpretation {
    pub verdict: String,
    pub growth_improvement: String,
}

#[derive(Debug, Serialize)]
pub struct GapfillResult {
    pub model_id: String,
    pub source_model_id: String,
    pub media_id: String,
    pub mode: String,
    pub growth_rate_before: f64,
    pub growth_rate_after: f64,
    pub target_growth_rate: f64,
    pub gapfilling_successful: bool,
    pub num_reactions_added: usize,
    pub reactions_added: Vec<AddedReaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atp_correction: Option<crate::session::AtpCorrectionStats>,
    pub pathway_summary: PathwaySummary,
    pub interpretation: GapfillInterpretation,
    pub next_steps: Vec<String>,
}

pub fn op_gapfill_model(
    biochem: &BiochemIndex,
    templates: &TemplateRegistry,
    store: &mut SessionStore,
    model_id: &str,
    media_id: &str,
    target_growth_rate: f64,
    mode: &str,
) -> Result<GapfillResult, ToolError> {
    if target_growth_rate <= 0.0 {
        return Err(ToolError::validation(
            format!("target_growth_rate must be positive, got {target_growth_rate}"),
            vec!["Use a small positive target such as 0.01".into()],
        ));
    }
    let mode = GapfillMode::from_str(mode).ok_or_else(|| {
        ToolError::validation(
            format!("Unknown gapfill mode '{mode}'"),
            vec!["Use one of: atp_only, genomescale_only, full".into()],
        )
    })?;

    let stored = store.get_model(model_id)?;
    let template_name = stored.meta.template.clone();
    let full_template = templates.get(&template_name)?;
    let core_template = templates.get("Core")?;
    let media = store.get_media(media_id)?.media.clone();

    let outcome = run_gapfill(
        &stored.model,
        full_template,
        core_template,
        templates.atp_test_media(),
        &media,
        target_growth_rate,
        mode,
        biochem,
    )?;

    // Persist under the appended-chain id; a repeat gapfill of the same
    // source gets a timestamped basename instead of overwriting history.
    let parsed = ModelId::parse(model_id).ok_or_else(|| {
        ToolError::server(format!("stored model id '{model_id}' has no state chain"))
    })?;
    let mut new_id = parsed.with_gf();
    if store.get_model(&new_id.to_string()).is_ok() {
        let stamped = format!(
            "{}_{}",
            parsed.basename(),
            chrono::Utc::now().format("%H%M%S")
        );
        new_id = ModelId::parse(&new_id.to_string().replacen(parsed.basename(), &stamped, 1))
            .unwrap_or(new_id);
    }

    let meta = ModelMeta {
        template: template_name,
        created_at: chrono::Utc::now().to_rfc3339(),
        is_draft: false,
        gapfilled: true,
        atp_stats: outcome.atp_stats.clone(),
        gapfill: Some(GapfillRecord {
            media_id: media_id.to_string(),
            reactions_added: outcome
                .reactions_added
                .iter()
                .map(|r| r.id.clone())
                .collect(),
            growth_rate_before: outcome.growth_rate_before,
            growth_rate_after: outcome.growth_rate_after,
            target_growth_rate,
            gapfilling_successful: outcome.gapfilling_successful,
        }),
    };
    store.store_model(
        &new_id,
        StoredModel {
            model: outcome.model,
            meta,
        },
    )?;

    let verdict = if outcome.early_exit {
        format!(
            "Model already grew at {:.4} on '{media_id}'; stored an unchanged copy",
            outcome.growth_rate_before
        )
    } else if outcome.gapfilling_successful {
        format!(
            "Gapfilling added {} reaction(s); the model now grows on '{media_id}'",
            outcome.reactions_added.len()
        )
    } else {
        format!(
            "Gapfilling finished but growth {:.4} is below the target {target_growth_rate}",
            outcome.growth_rate_after
        )
    };
    let growth_improvement = format!(
        "{:.4} -> {:.4} (target {target_growth_rate})",
        outcome.growth_rate_before, outcome.growth_rate_after
    );

    let new_id_string = new_id.to_string();
    Ok(GapfillResult {
        model_id: new_id_string.clone(),
        source_model_id: model_id.to_string(),
        media_id: media_id.to_string(),
        mode: mode.as_str().to_string(),
        growth_rate_before: outcome.growth_rate_before,
        growth_rate_after: outcome.growth_rate_after,
        target_growth_rate,
        gapfilling_successful: outcome.gapfilling_successful,
        num_reactions_added: outcome.reactions_added.len(),
        reactions_added: outcome.reactions_added,
        atp_correction: outcome.atp_stats,
        pathway_summary: outcome.pathway_summary,
        interpretation: GapfillInterpretation {
            verdict,
            growth_improvement,
        },
        next_steps: vec![
            format!("Verify growth with run_fba(model_id='{new_id_string}', media_id='{media_id}')"),
            "Compare against the original model with list_models".into(),
        ],
    })
}

// ── run_fba ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct FbaResult {
    pub model_id: String,
    pub media_id: String,
    #[serde(flatten)]
    pub outcome: FbaOutcome,
    pub next_steps: Vec<String>,
}

pub fn op_run_fba(
    biochem: &BiochemIndex,
    store: &SessionStore,
    model_id: &str,
    media_id: &str,
    objective: Option<&str>,
    maximize: bool,
    flux_threshold: Option<f64>,
) -> Result<FbaResult, ToolError> {
    let stored = store.get_model(model_id)?;
    let media = &store.get_media(media_id)?.media;
    let threshold = flux_threshold.unwrap_or(DEFAULT_FLUX_THRESHOLD);
    if threshold < 0.0 {
        return Err(ToolError::validation(
            format!("flux_threshold must be non-negative, got {threshold}"),
            vec!["Omit flux_threshold to use the default".into()],
        ));
    }

    let outcome = run_fba(&stored.model, media, objective, maximize, threshold, biochem)?;

    let next_steps = if outcome.objective_value > threshold {
        vec![format!(
            "Inspect uptake_fluxes and secretion_fluxes to understand how '{model_id}' grows"
        )]
    } else {
        vec![format!(
            "Gapfill with gapfill_model(model_id='{model_id}', media_id='{media_id}') to enable growth"
        )]
    };

    Ok(FbaResult {
        model_id: model_id.to_string(),
        media_id: media_id.to_string(),
        outcome,
        next_steps,
    })
}

// ── biochemistry lookups ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CompoundResult {
    pub compound: CompoundRecord,
}

pub fn op_get_compound(
    biochem: &BiochemIndex,
    compound_id: &str,
) -> Result<CompoundResult, ToolError> {
    Ok(CompoundResult {
        compound: biochem.get_compound(compound_id)?.clone(),
    })
}

#[derive(Debug, Serialize)]
pub struct ReactionResult {
    pub reaction: ReactionRecord,
}

pub fn op_get_reaction(
    biochem: &BiochemIndex,
    reaction_id: &str,
) -> Result<ReactionResult, ToolError> {
    Ok(ReactionResult {
        reaction: biochem.get_reaction(reaction_id)?.clone(),
    })
}

pub fn op_search_compounds(
    biochem: &BiochemIndex,
    query: &str,
    limit: usize,
) -> Result<SearchOutcome<CompoundRecord>, ToolError> {
    Ok(biochem.search_compounds(query, clamp_limit(limit)))
}

pub fn op_search_reactions(
    biochem: &BiochemIndex,
    query: &str,
    limit: usize,
) -> Result<SearchOutcome<ReactionRecord>, ToolError> {
    Ok(biochem.search_reactions(query, clamp_limit(limit)))
}

fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_SEARCH_LIMIT)
}

// ── session enumeration and deletion ────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ListModelsResult {
    pub count: usize,
    pub models: Vec<ModelListEntry>,
}

pub fn op_list_models(store: &SessionStore) -> ListModelsResult {
    let models = store.list_models();
    ListModelsResult {
        count: models.len(),
        models,
    }
}

#[derive(Debug, Serialize)]
pub struct ListMediaResult {
    pub count: usize,
    pub media: Vec<MediaListEntry>,
}

pub fn op_list_media(store: &SessionStore) -> ListMediaResult {
    let media = store.list_media();
    ListMediaResult {
        count: media.len(),
        media,
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResult {
    pub deleted: String,
    pub remaining: usize,
}

pub fn op_delete_model(store: &mut SessionStore, model_id: &str) -> Result<DeleteResult, ToolError> {
    store.delete_model(model_id)?;
    Ok(DeleteResult {
        deleted: model_id.to_string(),
        remaining: store.num_models(),
    })
}

pub fn op_delete_media(store: &mut SessionStore, media_id: &str) -> Result<DeleteResult, ToolError> {
    store.delete_media(media_id)?;
    Ok(DeleteResult {
        deleted: media_id.to_string(),
        remaining: store.num_media(),
    })
}
