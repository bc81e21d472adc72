//! Flux balance analysis executor.
//!
//! FBA never mutates stored state: it deep-copies the model, applies the
//! medium through the canonical `apply_media` contract, sets the objective,
//! optimizes, and then filters, classifies, and enriches the flux vector.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::biochem::BiochemIndex;
use crate::cobra::{apply_media, optimize, Media, Model, ObjectiveSense, SolverStatus};
use crate::error::ToolError;

/// Default cutoff below which a flux is reported as zero.
pub const DEFAULT_FLUX_THRESHOLD: f64 = 1e-6;

/// Number of internal reactions in the top-flux summary.
const TOP_FLUXES: usize = 10;

// Growth-category thresholds, in 1/h.
const FAST_GROWTH: f64 = 0.5;
const MODERATE_GROWTH: f64 = 0.1;

#[derive(Debug, Clone, Serialize)]
pub struct ExchangeFlux {
    pub reaction_id: String,
    pub compound_id: String,
    pub compound_name: String,
    pub flux: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopFlux {
    pub reaction_id: String,
    pub name: String,
    pub flux: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FbaInterpretation {
    pub growth_rate: f64,
    pub growth_category: String,
    pub metabolism: String,
    pub carbon_source: String,
    pub model_status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FbaOutcome {
    pub status: String,
    pub objective_reaction: String,
    pub objective_value: f64,
    pub num_active_reactions: usize,
    /// Thresholded flux vector.
    pub fluxes: BTreeMap<String, f64>,
    pub uptake_fluxes: Vec<ExchangeFlux>,
    pub secretion_fluxes: Vec<ExchangeFlux>,
    pub top_fluxes: Vec<TopFlux>,
    pub interpretation: FbaInterpretation,
}

/// Run FBA on a deep copy of `model` under `media`.
pub fn run_fba(
    model: &Model,
    media: &Media,
    objective: Option<&str>,
    maximize: bool,
    flux_threshold: f64,
    biochem: &BiochemIndex,
) -> Result<FbaOutcome, ToolError> {
    let mut working = model.clone();

    apply_media(&mut working, media).map_err(|e| ToolError::library(e.to_string()))?;

    let objective_id = match objective {
        Some(id) => id.to_string(),
        None => working
            .biomass_reaction()
            .map(|r| r.id.clone())
            .ok_or_else(|| {
                ToolError::validation(
                    format!(
                        "Model '{}' has no biomass reaction; pass an explicit objective",
                        model.id
                    ),
                    vec!["Set objective to a reaction id present in the model".into()],
                )
            })?,
    };
    if !working.has_reaction(&objective_id) {
        return Err(ToolError::validation(
            format!("Objective '{objective_id}' is not a reaction in model '{}'", model.id),
            vec!["Pick a reaction id from the model, e.g. its biomass reaction".into()],
        ));
    }
    let sense = if maximize {
        ObjectiveSense::Maximize
    } else {
        ObjectiveSense::Minimize
    };
    working
        .set_objective(&objective_id, sense)
        .map_err(|e| ToolError::library(e.to_string()))?;

    let solution = optimize(&working).map_err(|e| ToolError::library(e.to_string()))?;
    match solution.status {
        SolverStatus::Optimal => {}
        SolverStatus::Infeasible => {
            return Err(ToolError::infeasible(
                format!(
                    "FBA is infeasible for model '{}' on media '{}' with objective '{objective_id}'",
                    model.id, media.id
                ),
                0.0,
                0.0,
                vec![
                    "Try a richer medium".into(),
                    "Check that the model has been gapfilled on this medium".into(),
                ],
            ));
        }
        SolverStatus::Unbounded => {
            return Err(ToolError::infeasible(
                format!(
                    "FBA is unbounded for model '{}' with objective '{objective_id}'; a flux loop is unconstrained",
                    model.id
                ),
                0.0,
                0.0,
                vec!["Use the default biomass objective".into()],
            ));
        }
        SolverStatus::Other(ref detail) => {
            return Err(ToolError::library(format!("solver returned status '{detail}'")));
        }
    }

    // Threshold, then classify.
    let fluxes: BTreeMap<String, f64> = solution
        .fluxes
        .iter()
        .filter(|(_, flux)| flux.abs() >= flux_threshold)
        .map(|(id, &flux)| (id.clone(), flux))
        .collect();

    let mut uptake_fluxes = Vec::new();
    let mut secretion_fluxes = Vec::new();
    for (reaction_id, &flux) in &fluxes {
        let Some(compound_id) = reaction_id.strip_prefix("EX_") else {
            continue;
        };
        let entry = ExchangeFlux {
            reaction_id: reaction_id.clone(),
            compound_id: compound_id.to_string(),
            compound_name: biochem.compound_display_name(compound_id),
            flux,
        };
        if flux < 0.0 {
            uptake_fluxes.push(entry);
        } else {
            secretion_fluxes.push(entry);
        }
    }
    uptake_fluxes.sort_by(|a, b| a.flux.partial_cmp(&b.flux).unwrap_or(std::cmp::Ordering::Equal));
    secretion_fluxes
        .sort_by(|a, b| b.flux.partial_cmp(&a.flux).unwrap_or(std::cmp::Ordering::Equal));

    let mut top_fluxes: Vec<TopFlux> = fluxes
        .iter()
        .filter(|(id, _)| !id.starts_with("EX_"))
        .map(|(id, &flux)| TopFlux {
            reaction_id: id.clone(),
            name: biochem.reaction_summary(id).0,
            flux,
        })
        .collect();
    top_fluxes.sort_by(|a, b| {
        b.flux
            .abs()
            .partial_cmp(&a.flux.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    top_fluxes.truncate(TOP_FLUXES);

    let interpretation = interpret(
        solution.objective_value,
        &uptake_fluxes,
        flux_threshold,
        biochem,
    );

    Ok(FbaOutcome {
        status: solution.status.as_str().to_string(),
        objective_reaction: objective_id,
        objective_value: solution.objective_value,
        num_active_reactions: fluxes.len(),
        fluxes,
        uptake_fluxes,
        secretion_fluxes,
        top_fluxes,
        interpretation,
    })
}

/// Deterministic interpretation rules over the flux vector.
fn interpret(
    objective_value: f64,
    uptake_fluxes: &[ExchangeFlux],
    flux_threshold: f64,
    biochem: &BiochemIndex,
) -> FbaInterpretation {
    let growth_category = if objective_value >= FAST_GROWTH {
        "fast"
    } else if objective_value >= MODERATE_GROWTH {
        "moderate"
    } else if objective_value > flux_threshold {
        "slow"
    } else {
        "no growth"
    };

    let oxygen_uptake = uptake_fluxes
        .iter()
        .any(|u| u.compound_id.starts_with("cpd00007") && u.flux.abs() > flux_threshold);
    let metabolism = if oxygen_uptake { "aerobic" } else { "anaerobic" };

    // Carbon source: the largest-magnitude carbon-containing uptake.
    let carbon_source = uptake_fluxes
        .iter()
        .filter(|u| {
            let bare = crate::biochem::strip_compartment_suffix(&u.compound_id);
            biochem
                .get_compound(bare)
                .map(|c| formula_has_carbon(&c.formula))
                .unwrap_or(false)
        })
        .min_by(|a, b| a.flux.partial_cmp(&b.flux).unwrap_or(std::cmp::Ordering::Equal))
        .map(|u| u.compound_name.clone())
        .unwrap_or_else(|| "none identified".to_string());

    let model_status = if objective_value > flux_threshold {
        "growing"
    } else {
        "no growth; consider gapfilling on this medium"
    };

    FbaInterpretation {
        growth_rate: objective_value,
        growth_category: growth_category.to_string(),
        metabolism: metabolism.to_string(),
        carbon_source,
        model_status: model_status.to_string(),
    }
}

/// True when a formula contains elemental carbon (`C` not part of Cl, Ca,
/// Co, Cu, Cd, Cr, Cs, Ce).
fn formula_has_carbon(formula: &str) -> bool {
    let bytes = formula.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'C' {
            match bytes.get(i + 1) {
                Some(next) if next.is_ascii_lowercase() => continue,
                _ => return true,
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biochem::{BiochemIndex, CompoundRecord};
    use crate::cobra::{Metabolite, Reaction, MAX_FLUX};
    use std::collections::BTreeMap;

    fn compound(id: &str, name: &str, formula: &str) -> CompoundRecord {
        CompoundRecord {
            id: id.into(),
            name: name.into(),
            abbreviation: String::new(),
            formula: formula.into(),
            mass: None,
            charge: None,
            inchikey: String::new(),
            smiles: String::new(),
            aliases: BTreeMap::new(),
        }
    }

    fn biochem() -> BiochemIndex {
        BiochemIndex::from_records(
            vec![
                compound("cpd00027", "D-Glucose", "C6H12O6"),
                compound("cpd00007", "O2", "O2"),
                compound("cpd00011", "CO2", "CO2"),
            ],
            vec![],
        )
    }

    fn met(id: &str, compartment: &str) -> Metabolite {
        Metabolite {
            id: id.into(),
            name: id.into(),
            compartment: compartment.into(),
        }
    }

    fn rxn(id: &str, stoich: &[(&str, f64)], lb: f64, ub: f64) -> Reaction {
        Reaction {
            id: id.into(),
            name: id.into(),
            stoichiometry: stoich.iter().map(|(m, c)| (m.to_string(), *c)).collect(),
            lower_bound: lb,
            upper_bound: ub,
            genes: vec![],
        }
    }

    /// Glucose in, biomass + CO2 out.
    fn growing_model() -> Model {
        let mut model = Model::new("m.draft.gf");
        model.add_metabolite(met("cpd00027_e0", "e0"));
        model.add_metabolite(met("cpd00027_c0", "c0"));
        model.add_metabolite(met("cpd00011_e0", "e0"));
        model
            .add_reaction(rxn(
                "rxn05573_c0",
                &[("cpd00027_e0", -1.0), ("cpd00027_c0", 1.0)],
                -MAX_FLUX,
                MAX_FLUX,
            ))
            .unwrap();
        model
            .add_reaction(rxn(
                "bio1",
                &[("cpd00027_c0", -1.0), ("cpd00011_e0", 1.0)],
                0.0,
                MAX_FLUX,
            ))
            .unwrap();
        model.add_exchanges();
        model
    }

    fn glucose_media() -> Media {
        Media::new("glc", "Glucose").with_bounds("cpd00027", -10.0, 100.0)
    }

    #[test]
    fn fba_classifies_uptake_and_secretion() {
        let model = growing_model();
        let outcome = run_fba(&model, &glucose_media(), None, true, DEFAULT_FLUX_THRESHOLD, &biochem())
            .unwrap();
        assert_eq!(outcome.status, "optimal");
        assert!((outcome.objective_value - 10.0).abs() < 1e-6);
        assert_eq!(outcome.uptake_fluxes.len(), 1);
        assert_eq!(outcome.uptake_fluxes[0].compound_name, "D-Glucose");
        assert!(outcome.uptake_fluxes[0].flux < 0.0);
        assert_eq!(outcome.secretion_fluxes.len(), 1);
        assert_eq!(outcome.secretion_fluxes[0].compound_name, "CO2");
    }

    #[test]
    fn fba_does_not_mutate_the_stored_model() {
        let model = growing_model();
        let bounds_before: Vec<(String, f64, f64)> = model
            .reactions()
            .map(|r| (r.id.clone(), r.lower_bound, r.upper_bound))
            .collect();
        let objective_before = model.objective().map(str::to_string);

        run_fba(&model, &glucose_media(), None, true, DEFAULT_FLUX_THRESHOLD, &biochem()).unwrap();

        let bounds_after: Vec<(String, f64, f64)> = model
            .reactions()
            .map(|r| (r.id.clone(), r.lower_bound, r.upper_bound))
            .collect();
        assert_eq!(bounds_before, bounds_after);
        assert_eq!(objective_before, model.objective().map(str::to_string));
    }

    #[test]
    fn unknown_objective_is_a_validation_error() {
        let model = growing_model();
        let err = run_fba(
            &model,
            &glucose_media(),
            Some("rxn99999_c0"),
            true,
            DEFAULT_FLUX_THRESHOLD,
            &biochem(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn interpretation_identifies_carbon_source_and_anaerobic() {
        let model = growing_model();
        let outcome = run_fba(&model, &glucose_media(), None, true, DEFAULT_FLUX_THRESHOLD, &biochem())
            .unwrap();
        assert_eq!(outcome.interpretation.carbon_source, "D-Glucose");
        assert_eq!(outcome.interpretation.metabolism, "anaerobic");
        assert_eq!(outcome.interpretation.growth_category, "fast");
        assert_eq!(outcome.interpretation.model_status, "growing");
    }

    #[test]
    fn infeasible_media_reports_structured_error() {
        let model = growing_model();
        // Force uptake of a compound with no exchange and demand growth: an
        // empty medium closes every input, so minimizing biomass at a fixed
        // positive lower bound is infeasible.
        let mut model = model;
        model.reaction_mut("bio1").unwrap().lower_bound = 1.0;
        let err = run_fba(
            &model,
            &Media::new("empty", "Empty"),
            None,
            true,
            DEFAULT_FLUX_THRESHOLD,
            &biochem(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "infeasibility_error");
    }

    #[test]
    fn formula_carbon_detection() {
        assert!(formula_has_carbon("C6H12O6"));
        assert!(formula_has_carbon("CO2"));
        assert!(!formula_has_carbon("H2O"));
        assert!(!formula_has_carbon("Cl2"));
        assert!(!formula_has_carbon("CaCl2"));
        assert!(formula_has_carbon("CH3Cl"));
    }
}
