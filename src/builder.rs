//! Draft model construction.
//!
//! A draft is the template projected through the genome: conditional
//! reactions whose roles match a genome annotation, every universal and
//! spontaneous reaction, the biomass pseudo-reaction, an ATP-maintenance
//! reaction, and exchanges for the extracellular metabolites.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use crate::cobra::{Gene, Model};
use crate::error::ToolError;
use crate::genome::Genome;
use crate::template::{ReactionKind, Template};

/// Model id of the ATP-maintenance reaction; its template key is
/// `rxn00062_c`.
pub const ATP_MAINTENANCE: &str = "rxn00062_c0";

#[derive(Debug, Clone, Serialize)]
pub struct ModelStats {
    pub num_reactions: usize,
    pub num_metabolites: usize,
    pub num_genes: usize,
    pub compartments: Vec<String>,
    pub num_exchanges: usize,
    pub num_reversible: usize,
    pub num_transport: usize,
    pub biomass_reaction_id: Option<String>,
}

impl ModelStats {
    pub fn of(model: &Model) -> Self {
        Self {
            num_reactions: model.num_reactions(),
            num_metabolites: model.num_metabolites(),
            num_genes: model.num_genes(),
            compartments: model.compartments().into_iter().collect(),
            num_exchanges: model.exchanges().count(),
            num_reversible: model.reactions().filter(|r| r.is_reversible()).count(),
            num_transport: model
                .reactions()
                .filter(|r| !r.is_exchange() && r.is_transport())
                .count(),
            biomass_reaction_id: model.biomass_reaction().map(|r| r.id.clone()),
        }
    }
}

#[derive(Debug)]
pub struct DraftModel {
    pub model: Model,
    pub stats: ModelStats,
    /// Fraction of genome features carrying a functional annotation.
    pub annotated_fraction: f64,
}

/// Build a draft model from an (optionally annotated) genome and a template.
pub fn build_draft_model(
    genome: &Genome,
    template: &Template,
    model_id: &str,
) -> Result<DraftModel, ToolError> {
    let mut model = Model::new(model_id);

    // Genome roles, normalized once.
    let mut genes_by_role: HashMap<String, Vec<String>> = HashMap::new();
    for feature in &genome.features {
        let Some(function) = &feature.function else {
            continue;
        };
        for role in split_roles(function) {
            genes_by_role
                .entry(role)
                .or_default()
                .push(feature.id.clone());
        }
    }

    let mut matched_genes: BTreeMap<String, String> = BTreeMap::new();
    for template_reaction in &template.reactions {
        let genes: Vec<String> = match template_reaction.kind {
            ReactionKind::Universal | ReactionKind::Spontaneous => Vec::new(),
            ReactionKind::Conditional => {
                let mut genes: Vec<String> = template_reaction
                    .roles
                    .iter()
                    .filter_map(|role| genes_by_role.get(&normalize_role(role)))
                    .flatten()
                    .cloned()
                    .collect();
                if genes.is_empty() {
                    continue; // no evidence for this reaction
                }
                genes.sort();
                genes.dedup();
                genes
            }
        };
        for (gene, role) in genes.iter().zip(template_reaction.roles.iter().cycle()) {
            matched_genes.entry(gene.clone()).or_insert_with(|| role.clone());
        }
        template
            .instantiate_reaction(&mut model, template_reaction, 0, genes)
            .map_err(|e| ToolError::library(format!("template reaction instantiation failed: {e}")))?;
    }

    for (gene_id, function) in matched_genes {
        model.add_gene(Gene {
            id: gene_id,
            function,
        });
    }

    template
        .instantiate_biomass(&mut model, 0)
        .map_err(|e| ToolError::library(format!("biomass instantiation failed: {e}")))?;

    attach_atp_maintenance(&mut model, template);
    model.add_exchanges();

    let stats = ModelStats::of(&model);
    debug!(
        model = model_id,
        reactions = stats.num_reactions,
        genes = stats.num_genes,
        "built draft model"
    );

    let annotated_fraction = if genome.num_features() == 0 {
        0.0
    } else {
        genome.num_annotated() as f64 / genome.num_features() as f64
    };

    Ok(DraftModel {
        model,
        stats,
        annotated_fraction,
    })
}

/// Attach the ATP-maintenance reaction from the template when the draft does
/// not already carry one.
fn attach_atp_maintenance(model: &mut Model, template: &Template) {
    if model.has_reaction(ATP_MAINTENANCE) {
        return;
    }
    let key = crate::template::template_key(ATP_MAINTENANCE);
    match template.reaction(key) {
        Some(template_reaction) => {
            if let Err(e) = template.instantiate_reaction(model, template_reaction, 0, Vec::new()) {
                warn!(%e, "could not attach ATP-maintenance reaction");
            }
        }
        None => warn!(
            template = %template.name,
            "template has no ATP-maintenance reaction; ATP correction will be skipped for this model"
        ),
    }
}

/// Split a functional annotation into individual roles. Annotation services
/// join multifunctional roles with `/`, `;` or `@`.
fn split_roles(function: &str) -> Vec<String> {
    function
        .split(['/', ';', '@'])
        .map(normalize_role)
        .filter(|r| !r.is_empty())
        .collect()
}

/// Normalize a role for matching: drop parenthesized qualifiers (EC tags),
/// lowercase, collapse whitespace.
fn normalize_role(role: &str) -> String {
    let mut cleaned = String::with_capacity(role.len());
    let mut depth = 0usize;
    for c in role.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if depth == 0 => cleaned.push(c.to_ascii_lowercase()),
            _ => {}
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
