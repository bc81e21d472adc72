//! Reconstruction templates.
//!
//! A template is a named reaction set with role annotations, a biomass
//! specification, and compartment definitions. Template reaction ids end in
//! a bare compartment letter (`rxn05459_c`); instantiating a reaction into a
//! model appends the compartment index (`rxn05459_c0`).

pub mod registry;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::biochem::Direction;
use crate::cobra::{Metabolite, Model, Reaction, MAX_FLUX};
use crate::error::ToolError;

pub use registry::TemplateRegistry;

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateCompartment {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateCompound {
    /// Bare compound id (`cpd00027`).
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub formula: String,
}

/// How a template reaction is gated during reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    /// Included only when the genome carries a matching role.
    Conditional,
    /// Always included.
    Universal,
    /// Included without gene evidence (non-enzymatic).
    Spontaneous,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateReaction {
    /// Compartment-lettered id, e.g. `rxn05459_c`.
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Direction token: `>`, `<`, or `=`.
    pub direction: String,
    /// Compartment-lettered metabolite ids → stoichiometric coefficients.
    pub stoichiometry: BTreeMap<String, f64>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default = "default_kind")]
    pub kind: ReactionKind,
}

fn default_kind() -> ReactionKind {
    ReactionKind::Conditional
}

impl TemplateReaction {
    pub fn direction(&self) -> Direction {
        Direction::from_symbol(&self.direction).unwrap_or(Direction::Both)
    }

    /// Bounds implied by the direction token, using the finite sentinel.
    pub fn bounds(&self) -> (f64, f64) {
        direction_bounds(self.direction())
    }
}

pub fn direction_bounds(direction: Direction) -> (f64, f64) {
    match direction {
        Direction::Forward => (0.0, MAX_FLUX),
        Direction::Reverse => (-MAX_FLUX, 0.0),
        Direction::Both => (-MAX_FLUX, MAX_FLUX),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BiomassSpec {
    pub id: String,
    /// Compartment-lettered metabolite ids → coefficients.
    pub stoichiometry: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    pub name: String,
    pub compartments: Vec<TemplateCompartment>,
    pub compounds: Vec<TemplateCompound>,
    pub reactions: Vec<TemplateReaction>,
    pub biomass: BiomassSpec,
    #[serde(skip)]
    reaction_index: HashMap<String, usize>,
    #[serde(skip)]
    compound_index: HashMap<String, usize>,
}

impl Template {
    /// Parse and validate a template JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ToolError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            ToolError::library(format!("cannot read template '{}': {e}", path.display()))
        })?;
        let template: Template = serde_json::from_str(&raw).map_err(|e| {
            ToolError::library(format!("cannot parse template '{}': {e}", path.display()))
        })?;
        template.finalize()
    }

    /// Validate and build the lookup indexes. Test fixtures enter here.
    pub fn finalize(mut self) -> Result<Self, ToolError> {
        if self.reactions.is_empty() || self.compounds.is_empty() || self.compartments.is_empty() {
            return Err(ToolError::library(format!(
                "template '{}' is unusable: it needs non-empty reaction, compound, and compartment sets",
                self.name
            )));
        }
        self.reaction_index = self
            .reactions
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        self.compound_index = self
            .compounds
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        Ok(self)
    }

    /// Lookup by template key (`rxn05459_c`).
    pub fn reaction(&self, key: &str) -> Option<&TemplateReaction> {
        self.reaction_index.get(key).map(|&i| &self.reactions[i])
    }

    pub fn has_reaction(&self, key: &str) -> bool {
        self.reaction_index.contains_key(key)
    }

    pub fn compound_name(&self, bare_id: &str) -> Option<&str> {
        self.compound_index
            .get(bare_id)
            .map(|&i| self.compounds[i].name.as_str())
    }

    /// Every distinct role named by a conditional reaction.
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.reactions
            .iter()
            .flat_map(|r| r.roles.iter().map(String::as_str))
    }

    /// Instantiate a template reaction into a model at the given compartment
    /// index, materializing any missing metabolites first.
    pub fn instantiate_reaction(
        &self,
        model: &mut Model,
        template_reaction: &TemplateReaction,
        compartment_index: u32,
        genes: Vec<String>,
    ) -> Result<String, crate::cobra::CobraError> {
        let model_id = format!("{}{}", template_reaction.id, compartment_index);
        let mut stoichiometry = BTreeMap::new();
        for (met_key, &coeff) in &template_reaction.stoichiometry {
            let met_id = format!("{met_key}{compartment_index}");
            self.materialize_metabolite(model, met_key, &met_id, compartment_index);
            stoichiometry.insert(met_id, coeff);
        }
        let (lower_bound, upper_bound) = template_reaction.bounds();
        model.add_reaction(Reaction {
            id: model_id.clone(),
            name: template_reaction.name.clone(),
            stoichiometry,
            lower_bound,
            upper_bound,
            genes,
        })?;
        Ok(model_id)
    }

    /// Instantiate the biomass pseudo-reaction (forward-only).
    pub fn instantiate_biomass(
        &self,
        model: &mut Model,
        compartment_index: u32,
    ) -> Result<String, crate::cobra::CobraError> {
        let mut stoichiometry = BTreeMap::new();
        for (met_key, &coeff) in &self.biomass.stoichiometry {
            let met_id = format!("{met_key}{compartment_index}");
            self.materialize_metabolite(model, met_key, &met_id, compartment_index);
            stoichiometry.insert(met_id, coeff);
        }
        model.add_reaction(Reaction {
            id: self.biomass.id.clone(),
            name: "Biomass".into(),
            stoichiometry,
            lower_bound: 0.0,
            upper_bound: MAX_FLUX,
            genes: Vec::new(),
        })?;
        Ok(self.biomass.id.clone())
    }

    fn materialize_metabolite(
        &self,
        model: &mut Model,
        met_key: &str,
        met_id: &str,
        compartment_index: u32,
    ) {
        let (bare, compartment_letter) = match met_key.rsplit_once('_') {
            Some((bare, letter)) => (bare, letter),
            None => (met_key, "c"),
        };
        let name = self
            .compound_name(bare)
            .filter(|n| !n.is_empty())
            .unwrap_or(bare)
            .to_string();
        model.add_metabolite(Metabolite {
            id: met_id.to_string(),
            name,
            compartment: format!("{compartment_letter}{compartment_index}"),
        });
    }
}

/// `rxn05459_c0` → `rxn05459_c`: drop the trailing compartment index digits
/// to recover the template key. Ids without a trailing digit pass through.
pub fn template_key(model_reaction_id: &str) -> &str {
    model_reaction_id.trim_end_matches(|c: char| c.is_ascii_digit())
}
