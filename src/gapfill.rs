//! Two-stage gapfilling pipeline.
//!
//! Stage 1 (ATP correction) probes ATP production across the test-media
//! bundle with the core template and repairs the failures. Stage 2 gapfills
//! to the biomass target against the requested medium with the full
//! template. The pipeline always operates on a deep copy; the stored model
//! is never touched.
//!
//! Solution integration discipline: entries whose id starts with `EX_` are
//! boundary reactions that do not exist in any template and MUST be skipped;
//! after integrating the template-backed entries, `Model::add_exchanges` is
//! called exactly once to generate whatever boundaries the new metabolites
//! need. Synthesizing `EX_` reactions by hand desynchronizes the model.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::biochem::{BiochemIndex, Direction};
use crate::builder::ATP_MAINTENANCE;
use crate::cobra::{
    apply_media, optimize, solver::solve_gapfill, CobraError, Media, Model, ObjectiveSense,
    Reaction, SolverStatus, MAX_FLUX,
};
use crate::error::ToolError;
use crate::session::AtpCorrectionStats;
use crate::template::{direction_bounds, template_key, Template, TemplateReaction};

/// Growth below this rate counts as no growth.
pub const GROWTH_TOL: f64 = 1e-6;

/// ATP flux a test condition must sustain to pass.
const ATP_TEST_TARGET: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapfillMode {
    AtpOnly,
    GenomescaleOnly,
    Full,
}

impl GapfillMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "atp_only" => Some(Self::AtpOnly),
            "genomescale_only" => Some(Self::GenomescaleOnly),
            "full" => Some(Self::Full),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AtpOnly => "atp_only",
            Self::GenomescaleOnly => "genomescale_only",
            Self::Full => "full",
        }
    }
}

/// A solved gapfill: reaction id → direction token.
pub type GapfillSolution = BTreeMap<String, Direction>;

/// One integrated reaction, enriched from the biochemistry index.
#[derive(Debug, Clone, Serialize)]
pub struct AddedReaction {
    pub id: String,
    pub direction: Direction,
    pub name: String,
    pub equation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pathway: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathwaySummary {
    /// Pathway name → number of added reactions in it.
    pub coverage: BTreeMap<String, usize>,
    pub num_without_pathway: usize,
}

#[derive(Debug)]
pub struct GapfillOutcome {
    /// The mutated deep copy, ready to be stored under a new id.
    pub model: Model,
    pub reactions_added: Vec<AddedReaction>,
    pub growth_rate_before: f64,
    pub growth_rate_after: f64,
    pub gapfilling_successful: bool,
    /// Baseline already met the target; nothing was changed.
    pub early_exit: bool,
    pub atp_stats: Option<AtpCorrectionStats>,
    pub pathway_summary: PathwaySummary,
}

/// Run the pipeline against a deep copy of `model`.
#[allow(clippy::too_many_arguments)]
pub fn run_gapfill(
    model: &Model,
    full_template: &Template,
    core_template: &Template,
    atp_media: &[Media],
    media: &Media,
    target_growth_rate: f64,
    mode: GapfillMode,
    biochem: &BiochemIndex,
) -> Result<GapfillOutcome, ToolError> {
    if mode != GapfillMode::AtpOnly && model.biomass_reaction().is_none() {
        return Err(ToolError::validation(
            format!(
                "Model '{}' has no biomass reaction; genome-scale gapfilling needs one",
                model.id
            ),
            vec!["Rebuild the model from a template that defines a biomass reaction".into()],
        ));
    }

    let mut working = model.clone();

    // Baseline. Failures here are recorded as zero growth, not raised.
    let biomass = biomass_id(&working);
    let growth_rate_before = probe_growth(&mut working, media, biomass.as_deref());
    if growth_rate_before >= target_growth_rate {
        info!(
            model = %model.id,
            growth = growth_rate_before,
            target = target_growth_rate,
            "baseline already meets target; storing unchanged copy"
        );
        return Ok(GapfillOutcome {
            model: working,
            reactions_added: Vec::new(),
            growth_rate_before,
            growth_rate_after: growth_rate_before,
            gapfilling_successful: true,
            early_exit: true,
            atp_stats: None,
            pathway_summary: PathwaySummary {
                coverage: BTreeMap::new(),
                num_without_pathway: 0,
            },
        });
    }

    // Stage 1: ATP correction. Exceptions are warnings, never fatal.
    let atp_stats = if mode == GapfillMode::GenomescaleOnly {
        None
    } else {
        match atp_correction(&mut working, core_template, atp_media) {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(%e, "ATP correction failed; continuing to genome-scale stage");
                Some(AtpCorrectionStats {
                    num_test_conditions: atp_media.len(),
                    num_passed: 0,
                    num_failed: 0,
                    num_reactions_added: 0,
                    failed_media_ids: Vec::new(),
                })
            }
        }
    };

    // Stage 2: genome-scale gapfill.
    let mut reactions_added: Vec<AddedReaction> = Vec::new();
    if mode != GapfillMode::AtpOnly {
        let biomass = biomass_id(&working)
            .ok_or_else(|| ToolError::server("biomass reaction disappeared from the working copy"))?;
        apply_media(&mut working, media).map_err(to_library)?;
        working
            .set_objective(&biomass, ObjectiveSense::Maximize)
            .map_err(to_library)?;

        let candidates = gapfill_candidates(&working, full_template, media);
        debug!(count = candidates.len(), "assembled gapfill candidates");

        let used = solve_gapfill(&working, &candidates, &biomass, target_growth_rate)
            .map_err(to_library)?;
        let Some(used) = used else {
            return Err(ToolError::infeasible(
                format!(
                    "Gapfilling cannot reach growth {target_growth_rate} on media '{}'",
                    media.id
                ),
                growth_rate_before,
                target_growth_rate,
                vec![
                    "Try a richer medium (e.g. rich_aerobic)".into(),
                    "Lower target_growth_rate".into(),
                    "Check that the model was built from the intended template".into(),
                ],
            ));
        };

        let solution: GapfillSolution = used
            .iter()
            .map(|(id, &flux)| {
                let direction = if flux >= 0.0 {
                    Direction::Forward
                } else {
                    Direction::Reverse
                };
                (id.clone(), direction)
            })
            .collect();

        let integrated = integrate_solution(&mut working, full_template, &solution)?;
        reactions_added = enrich_added(&integrated, &solution, biochem);
    }

    // Verification run.
    let biomass = biomass_id(&working);
    let growth_rate_after = probe_growth(&mut working, media, biomass.as_deref());
    let gapfilling_successful = growth_rate_after + GROWTH_TOL >= target_growth_rate;

    let pathway_summary = summarize_pathways(&reactions_added);
    Ok(GapfillOutcome {
        model: working,
        reactions_added,
        growth_rate_before,
        growth_rate_after,
        gapfilling_successful,
        early_exit: false,
        atp_stats,
        pathway_summary,
    })
}

fn biomass_id(model: &Model) -> Option<String> {
    model.biomass_reaction().map(|r| r.id.clone())
}

fn to_library(e: CobraError) -> ToolError {
    ToolError::library(e.to_string())
}

/// Apply the medium, set the objective, optimize. Any failure or non-optimal
/// status is reported as zero growth.
fn probe_growth(model: &mut Model, media: &Media, objective: Option<&str>) -> f64 {
    let Some(objective) = objective else {
        return 0.0;
    };
    if apply_media(model, media).is_err() {
        return 0.0;
    }
    if model.set_objective(objective, ObjectiveSense::Maximize).is_err() {
        return 0.0;
    }
    match optimize(model) {
        Ok(solution) if solution.status == SolverStatus::Optimal => solution.objective_value.max(0.0),
        Ok(_) | Err(_) => 0.0,
    }
}

/// Stage 1: probe every test medium for ATP production and repair failures
/// from the core template, then regenerate boundaries.
fn atp_correction(
    model: &mut Model,
    core_template: &Template,
    atp_media: &[Media],
) -> Result<AtpCorrectionStats, ToolError> {
    if !model.has_reaction(ATP_MAINTENANCE) {
        return Err(ToolError::library(format!(
            "model '{}' has no {ATP_MAINTENANCE} reaction",
            model.id
        )));
    }

    let mut failed_media_ids = Vec::new();
    let mut num_passed = 0usize;
    let mut num_reactions_added = 0usize;

    for media in atp_media {
        let atp_flux = probe_growth(model, media, Some(ATP_MAINTENANCE));
        if atp_flux >= ATP_TEST_TARGET {
            num_passed += 1;
            continue;
        }
        failed_media_ids.push(media.id.clone());

        // Repair this condition from the core template.
        apply_media(model, media).map_err(to_library)?;
        model
            .set_objective(ATP_MAINTENANCE, ObjectiveSense::Maximize)
            .map_err(to_library)?;
        let candidates = gapfill_candidates(model, core_template, media);
        match solve_gapfill(model, &candidates, ATP_MAINTENANCE, ATP_TEST_TARGET).map_err(to_library)? {
            Some(used) if !used.is_empty() => {
                let solution: GapfillSolution = used
                    .iter()
                    .map(|(id, &flux)| {
                        let direction = if flux >= 0.0 {
                            Direction::Forward
                        } else {
                            Direction::Reverse
                        };
                        (id.clone(), direction)
                    })
                    .collect();
                let integrated = integrate_solution(model, core_template, &solution)?;
                num_reactions_added += integrated.len();
            }
            Some(_) => {}
            None => debug!(media = %media.id, "ATP correction found no repair for condition"),
        }
    }

    info!(
        conditions = atp_media.len(),
        passed = num_passed,
        added = num_reactions_added,
        "ATP correction finished"
    );
    Ok(AtpCorrectionStats {
        num_test_conditions: atp_media.len(),
        num_passed,
        num_failed: failed_media_ids.len(),
        num_reactions_added,
        failed_media_ids,
    })
}

/// Materialize every template reaction absent from the model, plus boundary
/// candidates for extracellular template metabolites. Boundary candidates
/// admit uptake only for compounds present in the target medium.
fn gapfill_candidates(model: &Model, template: &Template, media: &Media) -> Vec<Reaction> {
    let mut candidates = Vec::new();
    for template_reaction in &template.reactions {
        let model_id = format!("{}0", template_reaction.id);
        if model.has_reaction(&model_id) {
            continue;
        }
        candidates.push(materialize_candidate(template_reaction, 0));
    }

    // Boundary candidates: the solver may propose EX_ entries, which the
    // integration step deliberately skips.
    for (compound, &(lower, _upper)) in &media.compounds {
        let met_id = format!("{compound}_e0");
        let exchange_id = format!("EX_{met_id}");
        if model.has_reaction(&exchange_id) {
            continue;
        }
        let mut stoichiometry = BTreeMap::new();
        stoichiometry.insert(met_id, -1.0);
        candidates.push(Reaction {
            id: exchange_id,
            name: String::new(),
            stoichiometry,
            lower_bound: -lower.abs(),
            upper_bound: MAX_FLUX,
            genes: Vec::new(),
        });
    }
    candidates
}

/// A template reaction as a standalone candidate (not added to any model).
fn materialize_candidate(template_reaction: &TemplateReaction, compartment_index: u32) -> Reaction {
    let stoichiometry = template_reaction
        .stoichiometry
        .iter()
        .map(|(met_key, &coeff)| (format!("{met_key}{compartment_index}"), coeff))
        .collect();
    let (lower_bound, upper_bound) = template_reaction.bounds();
    Reaction {
        id: format!("{}{}", template_reaction.id, compartment_index),
        name: template_reaction.name.clone(),
        stoichiometry,
        lower_bound,
        upper_bound,
        genes: Vec::new(),
    }
}

/// Integrate a gapfill solution into the model.
///
/// `EX_` entries are skipped (boundaries are not template reactions); the
/// rest are resolved to their template key by stripping the trailing
/// compartment digits, materialized through the template, and bounded by the
/// solution's direction token. Exchanges are generated once, afterwards, by
/// `Model::add_exchanges`.
pub fn integrate_solution(
    model: &mut Model,
    template: &Template,
    solution: &GapfillSolution,
) -> Result<Vec<String>, ToolError> {
    let mut integrated = Vec::new();
    for (reaction_id, &direction) in solution {
        if reaction_id.starts_with("EX_") {
            debug!(reaction = %reaction_id, "skipping boundary reaction in gapfill solution");
            continue;
        }
        let key = template_key(reaction_id);
        let Some(template_reaction) = template.reaction(key) else {
            warn!(
                reaction = %reaction_id,
                key,
                "gapfill solution names a reaction missing from the template; skipping"
            );
            continue;
        };
        if model.has_reaction(reaction_id) {
            continue;
        }
        let new_id = template
            .instantiate_reaction(model, template_reaction, 0, Vec::new())
            .map_err(to_library)?;
        let (lower_bound, upper_bound) = direction_bounds(direction);
        if let Some(reaction) = model.reaction_mut(&new_id) {
            reaction.lower_bound = lower_bound;
            reaction.upper_bound = upper_bound;
        }
        integrated.push(new_id);
    }

    model.add_exchanges();
    Ok(integrated)
}

fn enrich_added(
    integrated: &[String],
    solution: &GapfillSolution,
    biochem: &BiochemIndex,
) -> Vec<AddedReaction> {
    integrated
        .iter()
        .map(|id| {
            let (name, equation) = biochem.reaction_summary(id);
            let pathway = biochem.reaction_pathways(id).into_iter().next();
            AddedReaction {
                id: id.clone(),
                direction: solution.get(id).copied().unwrap_or(Direction::Both),
                name,
                equation,
                pathway,
            }
        })
        .collect()
}

fn summarize_pathways(added: &[AddedReaction]) -> PathwaySummary {
    let mut coverage: BTreeMap<String, usize> = BTreeMap::new();
    let mut num_without_pathway = 0usize;
    for reaction in added {
        match &reaction.pathway {
            Some(pathway) => *coverage.entry(pathway.clone()).or_insert(0) += 1,
            None => num_without_pathway += 1,
        }
    }
    PathwaySummary {
        coverage,
        num_without_pathway,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biochem::{BiochemIndex, Direction};

    fn empty_biochem() -> BiochemIndex {
        BiochemIndex::from_records(vec![], vec![])
    }

    fn toy_template() -> Template {
        let raw = serde_json::json!({
            "name": "Toy",
            "compartments": [
                {"id": "c", "name": "Cytosol"},
                {"id": "e", "name": "Extracellular"}
            ],
            "compounds": [
                {"id": "cpd00100", "name": "Substrate"},
                {"id": "cpd00101", "name": "Intermediate"}
            ],
            "reactions": [
                {
                    "id": "rxn90001_c",
                    "name": "Substrate transport",
                    "direction": "=",
                    "stoichiometry": {"cpd00100_e": -1.0, "cpd00100_c": 1.0},
                    "kind": "spontaneous"
                },
                {
                    "id": "rxn90002_c",
                    "name": "Substrate conversion",
                    "direction": ">",
                    "stoichiometry": {"cpd00100_c": -1.0, "cpd00101_c": 1.0},
                    "roles": ["Substrate kinase"]
                }
            ],
            "biomass": {"id": "bio1", "stoichiometry": {"cpd00101_c": -1.0}}
        });
        serde_json::from_value::<Template>(raw)
            .unwrap()
            .finalize()
            .unwrap()
    }

    /// A draft missing the conversion step: transport + biomass only.
    fn broken_model(template: &Template) -> Model {
        let mut model = Model::new("toy.draft");
        let transport = template.reaction("rxn90001_c").unwrap();
        template
            .instantiate_reaction(&mut model, transport, 0, vec![])
            .unwrap();
        template.instantiate_biomass(&mut model, 0).unwrap();
        model.add_exchanges();
        model
    }

    fn substrate_media() -> Media {
        Media::new("toy_minimal", "Toy minimal").with_bounds("cpd00100", -10.0, 100.0)
    }

    #[test]
    fn gapfill_repairs_the_broken_chain() {
        let template = toy_template();
        let model = broken_model(&template);
        let media = substrate_media();
        let outcome = run_gapfill(
            &model,
            &template,
            &template,
            &[],
            &media,
            0.01,
            GapfillMode::GenomescaleOnly,
            &empty_biochem(),
        )
        .unwrap();

        assert!(outcome.gapfilling_successful);
        assert!(!outcome.early_exit);
        assert!(outcome.growth_rate_before.abs() < 1e-9);
        assert!(outcome.growth_rate_after >= 0.01);
        let added_ids: Vec<&str> = outcome.reactions_added.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(added_ids, vec!["rxn90002_c0"]);
        // The stored original is untouched by construction: run_gapfill
        // receives an immutable reference.
        assert!(!model.has_reaction("rxn90002_c0"));
    }

    #[test]
    fn no_ex_reaction_enters_via_the_template_path() {
        let template = toy_template();
        let model = broken_model(&template);
        let media = substrate_media();
        let outcome = run_gapfill(
            &model,
            &template,
            &template,
            &[],
            &media,
            0.01,
            GapfillMode::GenomescaleOnly,
            &empty_biochem(),
        )
        .unwrap();
        assert!(outcome
            .reactions_added
            .iter()
            .all(|r| !r.id.starts_with("EX_")));
        // Every boundary in the result either pre-existed or came from
        // add_exchanges over extracellular metabolites.
        for exchange in outcome.model.exchanges() {
            let met = exchange.id.strip_prefix("EX_").unwrap();
            assert!(outcome.model.metabolite(met).is_some());
        }
    }

    #[test]
    fn baseline_at_target_early_exits_with_no_additions() {
        let template = toy_template();
        let mut model = broken_model(&template);
        let conversion = template.reaction("rxn90002_c").unwrap();
        template
            .instantiate_reaction(&mut model, conversion, 0, vec![])
            .unwrap();
        let media = substrate_media();
        let outcome = run_gapfill(
            &model,
            &template,
            &template,
            &[],
            &media,
            0.01,
            GapfillMode::Full,
            &empty_biochem(),
        )
        .unwrap();
        assert!(outcome.early_exit);
        assert!(outcome.reactions_added.is_empty());
        assert!(outcome.gapfilling_successful);
        assert_eq!(outcome.growth_rate_before, outcome.growth_rate_after);
    }

    #[test]
    fn unreachable_target_is_an_infeasibility_error() {
        let template = toy_template();
        let model = broken_model(&template);
        // No medium carbon source at all: biomass cannot flow.
        let media = Media::new("empty", "Empty");
        let err = run_gapfill(
            &model,
            &template,
            &template,
            &[],
            &media,
            0.5,
            GapfillMode::GenomescaleOnly,
            &empty_biochem(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "infeasibility_error");
    }

    #[test]
    fn integrate_skips_ex_and_unknown_entries() {
        let template = toy_template();
        let mut model = broken_model(&template);
        let mut solution = GapfillSolution::new();
        solution.insert("EX_cpd00100_e0".into(), Direction::Reverse);
        solution.insert("rxn90002_c0".into(), Direction::Forward);
        solution.insert("rxn99999_c0".into(), Direction::Forward);
        let integrated = integrate_solution(&mut model, &template, &solution).unwrap();
        assert_eq!(integrated, vec!["rxn90002_c0".to_string()]);
        assert!(model.has_reaction("rxn90002_c0"));
        assert!(!model.has_reaction("rxn99999_c0"));
    }

    #[test]
    fn integrated_direction_overrides_template_bounds() {
        let template = toy_template();
        let mut model = broken_model(&template);
        let mut solution = GapfillSolution::new();
        solution.insert("rxn90002_c0".into(), Direction::Both);
        integrate_solution(&mut model, &template, &solution).unwrap();
        let reaction = model.reaction("rxn90002_c0").unwrap();
        assert_eq!(
            (reaction.lower_bound, reaction.upper_bound),
            (-MAX_FLUX, MAX_FLUX)
        );
    }

    #[test]
    fn mode_tokens_roundtrip() {
        for mode in [GapfillMode::AtpOnly, GapfillMode::GenomescaleOnly, GapfillMode::Full] {
            assert_eq!(GapfillMode::from_str(mode.as_str()), Some(mode));
        }
        assert_eq!(GapfillMode::from_str("bogus"), None);
    }
}
