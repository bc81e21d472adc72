//! LP backend.
//!
//! Flux balance analysis and the gapfill relaxation are both linear programs
//! over the stoichiometric steady-state constraint. The backend is
//! `good_lp` with the pure-Rust `microlp` simplex; nothing outside this
//! module touches solver types.

use std::collections::{BTreeMap, HashMap};

use good_lp::{constraint, default_solver, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable};

use super::model::{Model, ObjectiveSense, Reaction};
use super::CobraError;

/// Classified solver outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Other(String),
}

impl SolverStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Optimal => "optimal",
            Self::Infeasible => "infeasible",
            Self::Unbounded => "unbounded",
            Self::Other(_) => "other",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FluxSolution {
    pub status: SolverStatus,
    pub objective_value: f64,
    /// Reaction id → flux. Empty unless the status is optimal.
    pub fluxes: BTreeMap<String, f64>,
}

/// Maximize (or minimize) the model's objective subject to steady state.
pub fn optimize(model: &Model) -> Result<FluxSolution, CobraError> {
    let objective_id = model
        .objective()
        .ok_or_else(|| CobraError::Solver("no objective set on model".into()))?
        .to_string();
    if !model.has_reaction(&objective_id) {
        return Err(CobraError::UnknownReaction(objective_id));
    }

    let mut vars = ProblemVariables::new();
    let mut var_of: HashMap<String, Variable> = HashMap::new();
    for reaction in model.reactions() {
        let v = vars.add(variable().min(reaction.lower_bound).max(reaction.upper_bound));
        var_of.insert(reaction.id.clone(), v);
    }

    let objective_var = var_of[&objective_id];
    let objective_expr = Expression::from(objective_var);
    let mut problem = match model.objective_sense() {
        ObjectiveSense::Maximize => vars.maximise(objective_expr),
        ObjectiveSense::Minimize => vars.minimise(objective_expr),
    }
    .using(default_solver);

    for (_metabolite, expr) in mass_balance(model.reactions(), &var_of, &HashMap::new()) {
        problem = problem.with(constraint!(expr == 0.0));
    }

    match problem.solve() {
        Ok(solution) => {
            let fluxes = var_of
                .iter()
                .map(|(id, &v)| (id.clone(), solution.value(v)))
                .collect();
            Ok(FluxSolution {
                status: SolverStatus::Optimal,
                objective_value: solution.value(objective_var),
                fluxes,
            })
        }
        Err(ResolutionError::Infeasible) => Ok(FluxSolution {
            status: SolverStatus::Infeasible,
            objective_value: 0.0,
            fluxes: BTreeMap::new(),
        }),
        Err(ResolutionError::Unbounded) => Ok(FluxSolution {
            status: SolverStatus::Unbounded,
            objective_value: 0.0,
            fluxes: BTreeMap::new(),
        }),
        Err(other) => Err(CobraError::Solver(other.to_string())),
    }
}

/// Candidate fluxes below this magnitude are treated as unused.
pub const CANDIDATE_FLUX_TOL: f64 = 1e-6;

/// Minimize total candidate flux subject to the target objective rate.
///
/// Candidate reactions are split into forward/reverse non-negative halves so
/// the penalty is the absolute flux. Returns the used candidates (id → net
/// flux) or `None` when no combination of candidates reaches the target.
pub fn solve_gapfill(
    model: &Model,
    candidates: &[Reaction],
    objective_id: &str,
    target: f64,
) -> Result<Option<BTreeMap<String, f64>>, CobraError> {
    if !model.has_reaction(objective_id) {
        return Err(CobraError::UnknownReaction(objective_id.to_string()));
    }

    let mut vars = ProblemVariables::new();
    let mut var_of: HashMap<String, Variable> = HashMap::new();
    for reaction in model.reactions() {
        let v = vars.add(variable().min(reaction.lower_bound).max(reaction.upper_bound));
        var_of.insert(reaction.id.clone(), v);
    }

    // Forward/reverse split per candidate.
    let mut halves: HashMap<String, (Variable, Variable)> = HashMap::new();
    let mut penalty = Expression::from(0.0);
    for candidate in candidates {
        let forward = vars.add(variable().min(0.0).max(candidate.upper_bound.max(0.0)));
        let reverse = vars.add(variable().min(0.0).max((-candidate.lower_bound).max(0.0)));
        penalty += forward;
        penalty += reverse;
        halves.insert(candidate.id.clone(), (forward, reverse));
    }

    let mut problem = vars.minimise(penalty).using(default_solver);

    let objective_var = var_of[objective_id];
    let growth = Expression::from(objective_var);
    problem = problem.with(constraint!(growth >= target));

    for (_metabolite, expr) in mass_balance(model.reactions(), &var_of, &halves_by_candidate(candidates, &halves)) {
        problem = problem.with(constraint!(expr == 0.0));
    }

    match problem.solve() {
        Ok(solution) => {
            let mut used = BTreeMap::new();
            for candidate in candidates {
                let (forward, reverse) = halves[&candidate.id];
                let net = solution.value(forward) - solution.value(reverse);
                if net.abs() > CANDIDATE_FLUX_TOL {
                    used.insert(candidate.id.clone(), net);
                }
            }
            Ok(Some(used))
        }
        Err(ResolutionError::Infeasible) | Err(ResolutionError::Unbounded) => Ok(None),
        Err(other) => Err(CobraError::Solver(other.to_string())),
    }
}

/// Steady-state expressions: metabolite id → Σ coeff·flux over every
/// reaction and candidate touching it.
fn mass_balance<'a>(
    reactions: impl Iterator<Item = &'a Reaction>,
    var_of: &HashMap<String, Variable>,
    candidate_terms: &HashMap<&str, Vec<(f64, Variable, Variable)>>,
) -> BTreeMap<String, Expression> {
    let mut balance: BTreeMap<String, Expression> = BTreeMap::new();
    for reaction in reactions {
        let v = var_of[&reaction.id];
        for (metabolite, &coeff) in &reaction.stoichiometry {
            let expr = balance
                .entry(metabolite.clone())
                .or_insert_with(|| Expression::from(0.0));
            *expr += coeff * v;
        }
    }
    for (metabolite, terms) in candidate_terms {
        let expr = balance
            .entry((*metabolite).to_string())
            .or_insert_with(|| Expression::from(0.0));
        for &(coeff, forward, reverse) in terms {
            *expr += coeff * forward;
            *expr += (-coeff) * reverse;
        }
    }
    balance
}

fn halves_by_candidate<'a>(
    candidates: &'a [Reaction],
    halves: &HashMap<String, (Variable, Variable)>,
) -> HashMap<&'a str, Vec<(f64, Variable, Variable)>> {
    let mut terms: HashMap<&str, Vec<(f64, Variable, Variable)>> = HashMap::new();
    for candidate in candidates {
        let (forward, reverse) = halves[&candidate.id];
        for (metabolite, &coeff) in &candidate.stoichiometry {
            terms
                .entry(metabolite.as_str())
                .or_default()
                .push((coeff, forward, reverse));
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cobra::model::{Metabolite, MAX_FLUX};
    use std::collections::BTreeMap;

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

    /// Linear chain: EX_A ⇒ A_e0 ⇒ A_c0 ⇒ B_c0 ⇒ biomass.
    fn chain_model(with_conversion: bool) -> Model {
        let mut model = Model::new("chain");
        model.add_metabolite(met("cpd00100_e0", "e0"));
        model.add_metabolite(met("cpd00100_c0", "c0"));
        model.add_metabolite(met("cpd00101_c0", "c0"));
        model
            .add_reaction(rxn("EX_cpd00100_e0", &[("cpd00100_e0", -1.0)], -10.0, MAX_FLUX))
            .unwrap();
        model
            .add_reaction(rxn(
                "rxn90001_c0",
                &[("cpd00100_e0", -1.0), ("cpd00100_c0", 1.0)],
                -MAX_FLUX,
                MAX_FLUX,
            ))
            .unwrap();
        if with_conversion {
            model
                .add_reaction(rxn(
                    "rxn90002_c0",
                    &[("cpd00100_c0", -1.0), ("cpd00101_c0", 1.0)],
                    0.0,
                    MAX_FLUX,
                ))
                .unwrap();
        }
        model
            .add_reaction(rxn("bio1", &[("cpd00101_c0", -1.0)], 0.0, MAX_FLUX))
            .unwrap();
        model
    }

    #[test]
    fn optimize_saturates_uptake() {
        let mut model = chain_model(true);
        model.set_objective("bio1", ObjectiveSense::Maximize).unwrap();
        let solution = optimize(&model).unwrap();
        assert_eq!(solution.status, SolverStatus::Optimal);
        assert!((solution.objective_value - 10.0).abs() < 1e-6);
        assert!((solution.fluxes["EX_cpd00100_e0"] + 10.0).abs() < 1e-6);
    }

    #[test]
    fn optimize_without_objective_errors() {
        let model = chain_model(true);
        assert!(optimize(&model).is_err());
    }

    #[test]
    fn broken_chain_grows_nowhere() {
        let mut model = chain_model(false);
        model.set_objective("bio1", ObjectiveSense::Maximize).unwrap();
        let solution = optimize(&model).unwrap();
        assert_eq!(solution.status, SolverStatus::Optimal);
        assert!(solution.objective_value.abs() < 1e-9);
    }

    #[test]
    fn gapfill_finds_the_missing_conversion() {
        let model = chain_model(false);
        let candidate = rxn(
            "rxn90002_c0",
            &[("cpd00100_c0", -1.0), ("cpd00101_c0", 1.0)],
            0.0,
            MAX_FLUX,
        );
        let used = solve_gapfill(&model, &[candidate], "bio1", 0.5)
            .unwrap()
            .expect("feasible");
        assert!(used.contains_key("rxn90002_c0"));
        assert!(used["rxn90002_c0"] > 0.0);
    }

    #[test]
    fn gapfill_reports_infeasible_when_no_candidate_helps() {
        let model = chain_model(false);
        // A candidate that produces an unrelated metabolite cannot reach the
        // biomass target.
        let mut model_with_c = model.clone();
        model_with_c.add_metabolite(met("cpd00102_c0", "c0"));
        let candidate = rxn("rxn90003_c0", &[("cpd00102_c0", 1.0)], 0.0, MAX_FLUX);
        let outcome = solve_gapfill(&model_with_c, &[candidate], "bio1", 0.5).unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn gapfill_with_reachable_target_uses_minimal_flux() {
        let model = chain_model(true);
        // Nothing is missing: the solver should reach the target without any
        // candidate flux.
        let candidate = rxn("rxn90004_c0", &[("cpd00101_c0", 1.0)], 0.0, MAX_FLUX);
        let used = solve_gapfill(&model, &[candidate], "bio1", 5.0)
            .unwrap()
            .expect("feasible");
        assert!(used.is_empty());
    }
}
