//! Biochemistry database index.
//!
//! Loads the compound and reaction TSVs once at startup and serves exact
//! lookups plus ranked search for the lifetime of the process. The index is
//! immutable after construction and safe to share by reference.

pub mod record;
pub mod search;

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::error::ToolError;

pub use record::{
    parse_aliases, parse_ec_numbers, parse_pathways, strip_compartment_tags, CompoundRecord,
    Direction, ReactionRecord, Reversibility,
};
pub use search::{MatchType, SearchHit, SearchOutcome};

const REQUIRED_COMPOUND_COLUMNS: &[&str] = &[
    "id",
    "name",
    "abbreviation",
    "formula",
    "mass",
    "charge",
    "inchikey",
    "smiles",
    "aliases",
];

const REQUIRED_REACTION_COLUMNS: &[&str] = &[
    "id",
    "name",
    "abbreviation",
    "equation",
    "definition",
    "reversibility",
    "direction",
    "ec_numbers",
    "pathways",
    "is_transport",
    "deltag",
    "deltagerr",
    "aliases",
];

/// Warn thresholds; a production database is well above both.
const EXPECTED_MIN_COMPOUNDS: usize = 30_000;
const EXPECTED_MIN_REACTIONS: usize = 35_000;

fn compound_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^cpd\d{5}$").unwrap())
}

fn reaction_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^rxn\d{5}$").unwrap())
}

/// `cpd00027_e0` → `cpd00027`; ids without a compartment suffix pass through.
pub fn strip_compartment_suffix(id: &str) -> &str {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"_[a-z]\d+$").unwrap());
    match re.find(id) {
        Some(m) => &id[..m.start()],
        None => id,
    }
}

pub fn is_compound_id(id: &str) -> bool {
    compound_id_re().is_match(id)
}

pub fn is_reaction_id(id: &str) -> bool {
    reaction_id_re().is_match(id)
}

/// Static, O(1)-lookup index over the full biochemistry corpus.
#[derive(Debug)]
pub struct BiochemIndex {
    compounds: Vec<CompoundRecord>,
    reactions: Vec<ReactionRecord>,
    compound_by_id: HashMap<String, usize>,
    reaction_by_id: HashMap<String, usize>,
    // Lowercased secondary keys for case-insensitive exact lookup.
    compound_by_name: HashMap<String, usize>,
    compound_by_abbr: HashMap<String, usize>,
    reaction_by_name: HashMap<String, usize>,
    reaction_by_abbr: HashMap<String, usize>,
    reaction_by_ec: HashMap<String, Vec<usize>>,
}

impl BiochemIndex {
    /// Load both TSVs and build every lookup map.
    pub fn load(compounds_tsv: &Path, reactions_tsv: &Path) -> Result<Self, ToolError> {
        let compounds = load_compounds(compounds_tsv)?;
        if compounds.len() < EXPECTED_MIN_COMPOUNDS {
            warn!(
                count = compounds.len(),
                "compound table is smaller than a full biochemistry database"
            );
        }

        // Reactions substitute compound names into id-equations, so the
        // compound map must exist first.
        let name_by_id: HashMap<&str, &str> = compounds
            .iter()
            .map(|c| (c.id.as_str(), c.name.as_str()))
            .collect();
        let reactions = load_reactions(reactions_tsv, &name_by_id)?;
        if reactions.len() < EXPECTED_MIN_REACTIONS {
            warn!(
                count = reactions.len(),
                "reaction table is smaller than a full biochemistry database"
            );
        }

        Ok(Self::from_records(compounds, reactions))
    }

    /// Build the index from already-parsed records. Test fixtures and the
    /// search bench enter here.
    pub fn from_records(compounds: Vec<CompoundRecord>, reactions: Vec<ReactionRecord>) -> Self {
        let mut index = Self {
            compounds,
            reactions,
            compound_by_id: HashMap::new(),
            reaction_by_id: HashMap::new(),
            compound_by_name: HashMap::new(),
            compound_by_abbr: HashMap::new(),
            reaction_by_name: HashMap::new(),
            reaction_by_abbr: HashMap::new(),
            reaction_by_ec: HashMap::new(),
        };

        for (i, c) in index.compounds.iter().enumerate() {
            index.compound_by_id.insert(c.id.clone(), i);
            if !c.name.is_empty() {
                index.compound_by_name.entry(c.name.to_lowercase()).or_insert(i);
            }
            if !c.abbreviation.is_empty() {
                index
                    .compound_by_abbr
                    .entry(c.abbreviation.to_lowercase())
                    .or_insert(i);
            }
        }
        for (i, r) in index.reactions.iter().enumerate() {
            index.reaction_by_id.insert(r.id.clone(), i);
            if !r.name.is_empty() {
                index.reaction_by_name.entry(r.name.to_lowercase()).or_insert(i);
            }
            if !r.abbreviation.is_empty() {
                index
                    .reaction_by_abbr
                    .entry(r.abbreviation.to_lowercase())
                    .or_insert(i);
            }
            for ec in &r.ec_numbers {
                index.reaction_by_ec.entry(ec.clone()).or_default().push(i);
            }
        }
        index
    }

    pub fn num_compounds(&self) -> usize {
        self.compounds.len()
    }

    pub fn num_reactions(&self) -> usize {
        self.reactions.len()
    }

    pub(crate) fn compounds(&self) -> &[CompoundRecord] {
        &self.compounds
    }

    pub(crate) fn reactions(&self) -> &[ReactionRecord] {
        &self.reactions
    }

    /// Exact compound lookup. Ids that do not match `cpd\d{5}` are a
    /// validation error, not a miss.
    pub fn get_compound(&self, id: &str) -> Result<&CompoundRecord, ToolError> {
        let id = id.trim();
        if !is_compound_id(id) {
            return Err(ToolError::validation(
                format!("'{id}' is not a valid compound id (expected the pattern cpd#####)"),
                vec!["Use search_compounds to find compound ids by name".into()],
            ));
        }
        self.compound_by_id
            .get(id)
            .map(|&i| &self.compounds[i])
            .ok_or_else(|| {
                ToolError::not_found(
                    format!("Compound '{id}' is not in the biochemistry database"),
                    vec![],
                    vec!["Use search_compounds to find compound ids by name".into()],
                )
            })
    }

    /// Exact reaction lookup, with the same pattern-first validation.
    pub fn get_reaction(&self, id: &str) -> Result<&ReactionRecord, ToolError> {
        let id = id.trim();
        if !is_reaction_id(id) {
            return Err(ToolError::validation(
                format!("'{id}' is not a valid reaction id (expected the pattern rxn#####)"),
                vec!["Use search_reactions to find reaction ids by name".into()],
            ));
        }
        self.reaction_by_id
            .get(id)
            .map(|&i| &self.reactions[i])
            .ok_or_else(|| {
                ToolError::not_found(
                    format!("Reaction '{id}' is not in the biochemistry database"),
                    vec![],
                    vec!["Use search_reactions to find reaction ids by name".into()],
                )
            })
    }

    /// Name of a compound, accepting compartment-suffixed ids
    /// (`cpd00027_e0`). Falls back to the id itself for unknown compounds.
    pub fn compound_display_name(&self, id: &str) -> String {
        let bare = strip_compartment_suffix(id);
        self.compound_by_id
            .get(bare)
            .map(|&i| self.compounds[i].name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Human-readable equation for a reaction id with a compartment suffix
    /// (`rxn05459_c0`), for gapfill/FBA enrichment.
    pub fn reaction_summary(&self, id: &str) -> (String, String) {
        let bare = strip_compartment_suffix(id);
        match self.reaction_by_id.get(bare) {
            Some(&i) => {
                let r = &self.reactions[i];
                (r.name.clone(), r.equation_with_names.clone())
            }
            None => (id.to_string(), String::new()),
        }
    }

    /// Pathways for a compartment-suffixed reaction id; empty when
    /// unannotated.
    pub fn reaction_pathways(&self, id: &str) -> Vec<String> {
        let bare = strip_compartment_suffix(id);
        self.reaction_by_id
            .get(bare)
            .map(|&i| self.reactions[i].pathways.clone())
            .unwrap_or_default()
    }

}

struct ColumnMap {
    indices: HashMap<String, usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord, required: &[&str], path: &Path) -> Result<Self, ToolError> {
        let indices: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_lowercase(), i))
            .collect();
        let missing: Vec<&str> = required
            .iter()
            .filter(|col| !indices.contains_key(**col))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(ToolError::database(
                format!(
                    "Biochemistry file '{}' is missing required columns: {}",
                    path.display(),
                    missing.join(", ")
                ),
                vec!["Re-download the biochemistry TSVs; the header row is incomplete".into()],
            ));
        }
        Ok(Self { indices })
    }

    fn get<'r>(&self, record: &'r csv::StringRecord, column: &str) -> &'r str {
        self.indices
            .get(column)
            .and_then(|&i| record.get(i))
            .unwrap_or("")
            .trim()
    }
}

fn open_tsv(path: &Path) -> Result<csv::Reader<std::fs::File>, ToolError> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)
        .map_err(|e| {
            ToolError::database(
                format!("Cannot open biochemistry file '{}': {e}", path.display()),
                vec![format!(
                    "Check that '{}' exists and is readable, or point the biochemistry directory elsewhere",
                    path.display()
                )],
            )
        })
}

fn load_compounds(path: &Path) -> Result<Vec<CompoundRecord>, ToolError> {
    let mut reader = open_tsv(path)?;
    let headers = reader
        .headers()
        .map_err(|e| {
            ToolError::database(
                format!("Cannot read header row of '{}': {e}", path.display()),
                vec!["The compounds TSV must start with a tab-separated header row".into()],
            )
        })?
        .clone();
    let columns = ColumnMap::from_headers(&headers, REQUIRED_COMPOUND_COLUMNS, path)?;

    let mut out = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(line = line + 2, %e, "skipping malformed compound row");
                continue;
            }
        };
        let id = columns.get(&record, "id");
        if !is_compound_id(id) {
            warn!(line = line + 2, id, "skipping compound row with malformed id");
            continue;
        }
        out.push(CompoundRecord {
            id: id.to_string(),
            name: columns.get(&record, "name").to_string(),
            abbreviation: columns.get(&record, "abbreviation").to_string(),
            formula: columns.get(&record, "formula").to_string(),
            mass: record::parse_optional_f64(columns.get(&record, "mass")),
            charge: record::parse_optional_i64(columns.get(&record, "charge")),
            inchikey: columns.get(&record, "inchikey").to_string(),
            smiles: columns.get(&record, "smiles").to_string(),
            aliases: parse_aliases(columns.get(&record, "aliases")),
        });
    }
    Ok(out)
}

fn load_reactions(
    path: &Path,
    compound_names: &HashMap<&str, &str>,
) -> Result<Vec<ReactionRecord>, ToolError> {
    let mut reader = open_tsv(path)?;
    let headers = reader
        .headers()
        .map_err(|e| {
            ToolError::database(
                format!("Cannot read header row of '{}': {e}", path.display()),
                vec!["The reactions TSV must start with a tab-separated header row".into()],
            )
        })?
        .clone();
    let columns = ColumnMap::from_headers(&headers, REQUIRED_REACTION_COLUMNS, path)?;

    let mut out = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(line = line + 2, %e, "skipping malformed reaction row");
                continue;
            }
        };
        let id = columns.get(&record, "id");
        if !is_reaction_id(id) {
            warn!(line = line + 2, id, "skipping reaction row with malformed id");
            continue;
        }

        let equation = columns.get(&record, "equation").to_string();
        let definition = columns.get(&record, "definition");
        let equation_with_names = humanize_equation(&equation, definition, compound_names);

        out.push(ReactionRecord {
            id: id.to_string(),
            name: columns.get(&record, "name").to_string(),
            abbreviation: columns.get(&record, "abbreviation").to_string(),
            equation_with_ids: equation,
            equation_with_names,
            reversibility: Reversibility::from_symbol(columns.get(&record, "reversibility")),
            direction: Direction::from_symbol(columns.get(&record, "direction"))
                .unwrap_or(Direction::Both),
            ec_numbers: parse_ec_numbers(columns.get(&record, "ec_numbers")),
            pathways: parse_pathways(columns.get(&record, "pathways")),
            is_transport: matches!(columns.get(&record, "is_transport"), "1" | "true" | "True"),
            deltag: record::parse_optional_f64(columns.get(&record, "deltag")),
            deltag_err: record::parse_optional_f64(columns.get(&record, "deltagerr")),
            aliases: parse_aliases(columns.get(&record, "aliases")),
        });
    }
    Ok(out)
}

/// Prefer the `definition` (names) column; otherwise substitute names into
/// the id-equation. Compartment tags are stripped either way.
pub fn humanize_equation(
    equation_with_ids: &str,
    definition: &str,
    compound_names: &HashMap<&str, &str>,
) -> String {
    if !definition.is_empty() {
        return strip_compartment_tags(definition);
    }
    static CPD: OnceLock<Regex> = OnceLock::new();
    let cpd = CPD.get_or_init(|| Regex::new(r"cpd\d{5}").unwrap());
    let substituted = cpd.replace_all(equation_with_ids, |caps: &regex::Captures<'_>| {
        let id = caps.get(0).unwrap().as_str();
        compound_names.get(id).copied().unwrap_or(id).to_string()
    });
    strip_compartment_tags(&substituted)
}
