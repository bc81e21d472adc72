//! Priority-ranked search over the biochemistry index.
//!
//! Exact tiers resolve through the O(1) lowercase maps; partial tiers scan
//! the corpus in parallel. A record is reported once, at its best
//! (lowest-numbered) tier, and ties are broken alphabetically by id so the
//! ordering is deterministic across runs.

use rayon::prelude::*;
use serde::Serialize;

use super::{BiochemIndex, CompoundRecord, ReactionRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Partial,
}

/// One search result with match provenance attached.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit<T> {
    #[serde(flatten)]
    pub record: T,
    pub match_field: &'static str,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome<T> {
    pub query: String,
    pub hits: Vec<SearchHit<T>>,
    pub total_matches: usize,
    pub truncated: bool,
    /// Alternate-query hints, populated only when nothing matched.
    pub suggestions: Vec<String>,
}

// Compound tiers. Lower wins.
const C_EXACT_ID: u8 = 1;
const C_EXACT_NAME: u8 = 2;
const C_EXACT_ABBR: u8 = 3;
const C_PARTIAL_NAME: u8 = 4;
const C_EXACT_FORMULA: u8 = 5;
const C_ALIAS: u8 = 6;

// Reaction tiers.
const R_EXACT_ID: u8 = 1;
const R_EXACT_NAME: u8 = 2;
const R_EXACT_ABBR: u8 = 3;
const R_EXACT_EC: u8 = 4;
const R_PARTIAL_NAME: u8 = 5;
const R_ALIAS: u8 = 6;
const R_PATHWAY: u8 = 7;

type TierEntry = (usize, u8, &'static str, MatchType);

impl BiochemIndex {
    pub fn search_compounds(&self, query: &str, limit: usize) -> SearchOutcome<CompoundRecord> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return empty_outcome(query, compound_suggestions(query));
        }

        // Exact tiers through the maps.
        let mut seeds: Vec<TierEntry> = Vec::new();
        if let Some(&i) = self.compound_by_id.get(q.as_str()) {
            seeds.push((i, C_EXACT_ID, "id", MatchType::Exact));
        }
        if let Some(&i) = self.compound_by_name.get(q.as_str()) {
            seeds.push((i, C_EXACT_NAME, "name", MatchType::Exact));
        }
        if let Some(&i) = self.compound_by_abbr.get(q.as_str()) {
            seeds.push((i, C_EXACT_ABBR, "abbreviation", MatchType::Exact));
        }

        // Partial tiers scan the corpus.
        let scanned: Vec<TierEntry> = self
            .compounds
            .par_iter()
            .enumerate()
            .filter_map(|(i, c)| {
                if c.name.to_lowercase().contains(&q) {
                    return Some((i, C_PARTIAL_NAME, "name", MatchType::Partial));
                }
                if c.formula.to_lowercase() == q {
                    return Some((i, C_EXACT_FORMULA, "formula", MatchType::Exact));
                }
                let alias_hit = c
                    .aliases
                    .values()
                    .flatten()
                    .any(|a| a.to_lowercase().contains(&q));
                if alias_hit {
                    return Some((i, C_ALIAS, "aliases", MatchType::Partial));
                }
                None
            })
            .collect();

        let ranked = rank(seeds.into_iter().chain(scanned), |i| &self.compounds[i].id);
        finish(
            query,
            ranked,
            limit,
            |i| self.compounds[i].clone(),
            compound_suggestions(query),
        )
    }

    pub fn search_reactions(&self, query: &str, limit: usize) -> SearchOutcome<ReactionRecord> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return empty_outcome(query, reaction_suggestions(query));
        }

        let mut seeds: Vec<TierEntry> = Vec::new();
        if let Some(&i) = self.reaction_by_id.get(q.as_str()) {
            seeds.push((i, R_EXACT_ID, "id", MatchType::Exact));
        }
        if let Some(&i) = self.reaction_by_name.get(q.as_str()) {
            seeds.push((i, R_EXACT_NAME, "name", MatchType::Exact));
        }
        if let Some(&i) = self.reaction_by_abbr.get(q.as_str()) {
            seeds.push((i, R_EXACT_ABBR, "abbreviation", MatchType::Exact));
        }
        if let Some(indices) = self.reaction_by_ec.get(q.as_str()) {
            for &i in indices {
                seeds.push((i, R_EXACT_EC, "ec_numbers", MatchType::Exact));
            }
        }

        let scanned: Vec<TierEntry> = self
            .reactions
            .par_iter()
            .enumerate()
            .filter_map(|(i, r)| {
                if r.name.to_lowercase().contains(&q) {
                    return Some((i, R_PARTIAL_NAME, "name", MatchType::Partial));
                }
                let alias_hit = r
                    .aliases
                    .values()
                    .flatten()
                    .any(|a| a.to_lowercase().contains(&q));
                if alias_hit {
                    return Some((i, R_ALIAS, "aliases", MatchType::Partial));
                }
                if r.pathways.iter().any(|p| p.to_lowercase().contains(&q)) {
                    return Some((i, R_PATHWAY, "pathways", MatchType::Partial));
                }
                None
            })
            .collect();

        let ranked = rank(seeds.into_iter().chain(scanned), |i| &self.reactions[i].id);
        finish(
            query,
            ranked,
            limit,
            |i| self.reactions[i].clone(),
            reaction_suggestions(query),
        )
    }
}

/// Keep each record at its best tier, then order by (tier, id).
fn rank<'a, F>(entries: impl Iterator<Item = TierEntry>, id_of: F) -> Vec<TierEntry>
where
    F: Fn(usize) -> &'a String,
{
    let mut best: std::collections::HashMap<usize, TierEntry> = std::collections::HashMap::new();
    for entry in entries {
        best.entry(entry.0)
            .and_modify(|current| {
                if entry.1 < current.1 {
                    *current = entry;
                }
            })
            .or_insert(entry);
    }
    let mut ranked: Vec<TierEntry> = best.into_values().collect();
    ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| id_of(a.0).cmp(id_of(b.0))));
    ranked
}

fn finish<T, F>(
    query: &str,
    ranked: Vec<TierEntry>,
    limit: usize,
    record_of: F,
    suggestions_if_empty: Vec<String>,
) -> SearchOutcome<T>
where
    F: Fn(usize) -> T,
{
    let total_matches = ranked.len();
    let truncated = total_matches > limit;
    let hits: Vec<SearchHit<T>> = ranked
        .into_iter()
        .take(limit)
        .map(|(i, _, match_field, match_type)| SearchHit {
            record: record_of(i),
            match_field,
            match_type,
        })
        .collect();
    let suggestions = if hits.is_empty() {
        suggestions_if_empty
    } else {
        Vec::new()
    };
    SearchOutcome {
        query: query.to_string(),
        hits,
        total_matches,
        truncated,
        suggestions,
    }
}

fn empty_outcome<T>(query: &str, suggestions: Vec<String>) -> SearchOutcome<T> {
    SearchOutcome {
        query: query.to_string(),
        hits: Vec::new(),
        total_matches: 0,
        truncated: false,
        suggestions,
    }
}

fn shortened(query: &str) -> Option<String> {
    let trimmed = query.trim();
    (trimmed.len() > 4).then(|| trimmed[..4].to_string())
}

fn compound_suggestions(query: &str) -> Vec<String> {
    let mut out = vec![
        "Search by compound name fragment (e.g. 'glucose'), exact formula, or a foreign database id".into(),
    ];
    if let Some(short) = shortened(query) {
        out.push(format!("Try a shorter query like '{short}'"));
    }
    out.push("If you already know the cpd id, call get_compound_name instead".into());
    out
}

fn reaction_suggestions(query: &str) -> Vec<String> {
    let mut out = vec![
        "Search by enzyme name fragment (e.g. 'kinase'), an EC number, or a pathway name".into(),
    ];
    if let Some(short) = shortened(query) {
        out.push(format!("Try a shorter query like '{short}'"));
    }
    out.push("If you already know the rxn id, call get_reaction_name instead".into());
    out
}
