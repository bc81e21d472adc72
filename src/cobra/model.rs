//! In-memory metabolic model.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use super::CobraError;

/// Finite sentinel used wherever a bound is conceptually unbounded.
pub const MAX_FLUX: f64 = 1000.0;

/// Prefix of boundary (exchange) reactions.
pub const EXCHANGE_PREFIX: &str = "EX_";

#[derive(Debug, Clone)]
pub struct Metabolite {
    /// Compartmentalized id, e.g. `cpd00027_c0`.
    pub id: String,
    pub name: String,
    /// Compartment token, e.g. `c0`, `e0`.
    pub compartment: String,
}

#[derive(Debug, Clone)]
pub struct Reaction {
    /// `rxn00216_c0`, `EX_cpd00027_e0`, or a biomass id like `bio1`.
    pub id: String,
    pub name: String,
    /// Metabolite id → stoichiometric coefficient (negative = consumed).
    pub stoichiometry: BTreeMap<String, f64>,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Ids of genes whose products catalyze this reaction.
    pub genes: Vec<String>,
}

impl Reaction {
    pub fn is_exchange(&self) -> bool {
        self.id.starts_with(EXCHANGE_PREFIX)
    }

    pub fn is_reversible(&self) -> bool {
        self.lower_bound < 0.0 && self.upper_bound > 0.0
    }

    /// Transport reactions move a compound between compartments without
    /// changing it: the same bare compound id appears on both sides.
    pub fn is_transport(&self) -> bool {
        let mut bare: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for met in self.stoichiometry.keys() {
            let (compound, compartment) = match met.rsplit_once('_') {
                Some(split) => split,
                None => (met.as_str(), ""),
            };
            bare.entry(compound).or_default().insert(compartment);
        }
        bare.values().any(|compartments| compartments.len() > 1)
    }
}

#[derive(Debug, Clone)]
pub struct Gene {
    pub id: String,
    pub function: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveSense {
    Maximize,
    Minimize,
}

/// A genome-scale metabolic model. Deep-copy is `Clone`; mutation paths in
/// the pipelines always operate on a clone, never on the stored handle.
#[derive(Debug, Clone)]
pub struct Model {
    pub id: String,
    reactions: Vec<Reaction>,
    reaction_index: HashMap<String, usize>,
    metabolites: Vec<Metabolite>,
    metabolite_index: HashMap<String, usize>,
    genes: Vec<Gene>,
    objective: Option<String>,
    objective_sense: ObjectiveSense,
}

impl Model {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reactions: Vec::new(),
            reaction_index: HashMap::new(),
            metabolites: Vec::new(),
            metabolite_index: HashMap::new(),
            genes: Vec::new(),
            objective: None,
            objective_sense: ObjectiveSense::Maximize,
        }
    }

    /// Insert a metabolite if absent; existing entries are kept as-is.
    pub fn add_metabolite(&mut self, metabolite: Metabolite) {
        if self.metabolite_index.contains_key(&metabolite.id) {
            return;
        }
        self.metabolite_index
            .insert(metabolite.id.clone(), self.metabolites.len());
        self.metabolites.push(metabolite);
    }

    /// Insert a reaction. Every metabolite it references must already exist.
    pub fn add_reaction(&mut self, reaction: Reaction) -> Result<(), CobraError> {
        if self.reaction_index.contains_key(&reaction.id) {
            return Err(CobraError::DuplicateReaction(reaction.id));
        }
        for met in reaction.stoichiometry.keys() {
            if !self.metabolite_index.contains_key(met) {
                return Err(CobraError::UnknownMetabolite(met.clone()));
            }
        }
        self.reaction_index
            .insert(reaction.id.clone(), self.reactions.len());
        self.reactions.push(reaction);
        Ok(())
    }

    pub fn add_gene(&mut self, gene: Gene) {
        if self.genes.iter().any(|g| g.id == gene.id) {
            return;
        }
        self.genes.push(gene);
    }

    pub fn reaction(&self, id: &str) -> Option<&Reaction> {
        self.reaction_index.get(id).map(|&i| &self.reactions[i])
    }

    pub fn reaction_mut(&mut self, id: &str) -> Option<&mut Reaction> {
        match self.reaction_index.get(id) {
            Some(&i) => Some(&mut self.reactions[i]),
            None => None,
        }
    }

    pub fn has_reaction(&self, id: &str) -> bool {
        self.reaction_index.contains_key(id)
    }

    pub fn metabolite(&self, id: &str) -> Option<&Metabolite> {
        self.metabolite_index.get(id).map(|&i| &self.metabolites[i])
    }

    pub fn reactions(&self) -> impl Iterator<Item = &Reaction> {
        self.reactions.iter()
    }

    pub fn metabolites(&self) -> impl Iterator<Item = &Metabolite> {
        self.metabolites.iter()
    }

    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    pub fn exchanges(&self) -> impl Iterator<Item = &Reaction> {
        self.reactions.iter().filter(|r| r.is_exchange())
    }

    pub fn compartments(&self) -> BTreeSet<String> {
        self.metabolites
            .iter()
            .map(|m| m.compartment.clone())
            .collect()
    }

    pub fn num_reactions(&self) -> usize {
        self.reactions.len()
    }

    pub fn num_metabolites(&self) -> usize {
        self.metabolites.len()
    }

    pub fn num_genes(&self) -> usize {
        self.genes.len()
    }

    /// Sorted reaction ids; the deep-copy and purity tests compare these.
    pub fn reaction_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.reactions.iter().map(|r| r.id.clone()).collect();
        ids.sort();
        ids
    }

    pub fn objective(&self) -> Option<&str> {
        self.objective.as_deref()
    }

    pub fn objective_sense(&self) -> ObjectiveSense {
        self.objective_sense
    }

    pub fn set_objective(&mut self, reaction_id: &str, sense: ObjectiveSense) -> Result<(), CobraError> {
        if !self.has_reaction(reaction_id) {
            return Err(CobraError::UnknownReaction(reaction_id.to_string()));
        }
        self.objective = Some(reaction_id.to_string());
        self.objective_sense = sense;
        Ok(())
    }

    /// First reaction whose id starts with `bio`, the reconstruction
    /// convention for biomass pseudo-reactions.
    pub fn biomass_reaction(&self) -> Option<&Reaction> {
        self.reactions
            .iter()
            .find(|r| r.id.starts_with("bio") && !r.is_exchange())
    }

    /// Current medium: exchange id → positive uptake magnitude, for every
    /// exchange whose lower bound admits uptake.
    pub fn medium(&self) -> BTreeMap<String, f64> {
        self.exchanges()
            .filter(|r| r.lower_bound < 0.0)
            .map(|r| (r.id.clone(), -r.lower_bound))
            .collect()
    }

    /// Replace the medium wholesale: close every exchange, then open only the
    /// listed ones at the given uptake magnitude. Partial mutation of
    /// exchange bounds is deliberately not exposed.
    pub fn set_medium(&mut self, medium: &BTreeMap<String, f64>) -> Result<(), CobraError> {
        for id in medium.keys() {
            match self.reaction(id) {
                Some(r) if r.is_exchange() => {}
                Some(_) => return Err(CobraError::UnknownReaction(format!("{id} (not an exchange)"))),
                None => return Err(CobraError::UnknownReaction(id.clone())),
            }
        }
        for reaction in self.reactions.iter_mut().filter(|r| r.is_exchange()) {
            reaction.lower_bound = 0.0;
        }
        for (id, uptake) in medium {
            if let Some(reaction) = self.reaction_mut(id) {
                reaction.lower_bound = -uptake.abs();
            }
        }
        Ok(())
    }

    /// Create boundary reactions for every extracellular metabolite that
    /// lacks one. This is the single sanctioned way to introduce `EX_`
    /// reactions; they are born closed to uptake and opened by `set_medium`.
    pub fn add_exchanges(&mut self) -> Vec<String> {
        let missing: Vec<Metabolite> = self
            .metabolites
            .iter()
            .filter(|m| m.compartment.starts_with('e'))
            .filter(|m| !self.reaction_index.contains_key(&format!("{EXCHANGE_PREFIX}{}", m.id)))
            .cloned()
            .collect();

        let mut added = Vec::with_capacity(missing.len());
        for met in missing {
            let id = format!("{EXCHANGE_PREFIX}{}", met.id);
            let mut stoichiometry = BTreeMap::new();
            stoichiometry.insert(met.id.clone(), -1.0);
            let reaction = Reaction {
                id: id.clone(),
                name: format!("{} exchange", met.name),
                stoichiometry,
                lower_bound: 0.0,
                upper_bound: MAX_FLUX,
                genes: Vec::new(),
            };
            // Cannot collide or dangle: the id was checked above and the
            // metabolite already exists.
            self.reaction_index.insert(id.clone(), self.reactions.len());
            self.reactions.push(reaction);
            added.push(id);
        }
        if !added.is_empty() {
            debug!(count = added.len(), model = %self.id, "generated exchange reactions");
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn met(id: &str, compartment: &str) -> Metabolite {
        Metabolite {
            id: id.into(),
            name: id.into(),
            compartment: compartment.into(),
        }
    }

    fn toy_model() -> Model {
        let mut model = Model::new("toy");
        model.add_metabolite(met("cpd00027_e0", "e0"));
        model.add_metabolite(met("cpd00027_c0", "c0"));
        model
            .add_reaction(Reaction {
                id: "rxn05573_c0".into(),
                name: "glucose transport".into(),
                stoichiometry: [("cpd00027_e0".into(), -1.0), ("cpd00027_c0".into(), 1.0)]
                    .into_iter()
                    .collect(),
                lower_bound: -MAX_FLUX,
                upper_bound: MAX_FLUX,
                genes: vec![],
            })
            .unwrap();
        model.add_exchanges();
        model
    }

    #[test]
    fn add_exchanges_covers_extracellular_only() {
        let model = toy_model();
        assert!(model.has_reaction("EX_cpd00027_e0"));
        assert!(!model.has_reaction("EX_cpd00027_c0"));
        // Idempotent.
        let mut model = model;
        assert!(model.add_exchanges().is_empty());
    }

    #[test]
    fn new_exchanges_are_closed_to_uptake() {
        let model = toy_model();
        let ex = model.reaction("EX_cpd00027_e0").unwrap();
        assert_eq!(ex.lower_bound, 0.0);
        assert_eq!(ex.upper_bound, MAX_FLUX);
    }

    #[test]
    fn set_medium_closes_all_then_opens_listed() {
        let mut model = toy_model();
        let mut first = BTreeMap::new();
        first.insert("EX_cpd00027_e0".to_string(), 10.0);
        model.set_medium(&first).unwrap();
        assert_eq!(model.reaction("EX_cpd00027_e0").unwrap().lower_bound, -10.0);

        // Applying a medium that omits the exchange closes it again.
        model.set_medium(&BTreeMap::new()).unwrap();
        assert_eq!(model.reaction("EX_cpd00027_e0").unwrap().lower_bound, 0.0);
    }

    #[test]
    fn set_medium_rejects_unknown_exchange() {
        let mut model = toy_model();
        let mut medium = BTreeMap::new();
        medium.insert("EX_cpd99999_e0".to_string(), 5.0);
        assert!(model.set_medium(&medium).is_err());
    }

    #[test]
    fn medium_roundtrip_is_idempotent() {
        let mut model = toy_model();
        let mut medium = BTreeMap::new();
        medium.insert("EX_cpd00027_e0".to_string(), 10.0);
        model.set_medium(&medium).unwrap();
        let first = model.medium();
        model.set_medium(&medium).unwrap();
        assert_eq!(first, model.medium());
        assert_eq!(first.get("EX_cpd00027_e0"), Some(&10.0));
    }

    #[test]
    fn duplicate_reaction_is_rejected() {
        let mut model = toy_model();
        let err = model.add_reaction(Reaction {
            id: "rxn05573_c0".into(),
            name: String::new(),
            stoichiometry: BTreeMap::new(),
            lower_bound: 0.0,
            upper_bound: MAX_FLUX,
            genes: vec![],
        });
        assert!(matches!(err, Err(CobraError::DuplicateReaction(_))));
    }

    #[test]
    fn transport_detection() {
        let model = toy_model();
        assert!(model.reaction("rxn05573_c0").unwrap().is_transport());
        assert!(!model.reaction("EX_cpd00027_e0").unwrap().is_transport());
    }
}
