//! Compound and reaction records plus the field parsers for the raw TSV
//! columns (aliases, pathways, EC numbers, reversibility, equations).

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// One compound row from the biochemistry database.
#[derive(Debug, Clone, Serialize)]
pub struct CompoundRecord {
    pub id: String,
    pub name: String,
    pub abbreviation: String,
    pub formula: String,
    pub mass: Option<f64>,
    pub charge: Option<i64>,
    pub inchikey: String,
    pub smiles: String,
    /// Foreign database ids, keyed by database name.
    pub aliases: BTreeMap<String, Vec<String>>,
}

/// One reaction row from the biochemistry database.
#[derive(Debug, Clone, Serialize)]
pub struct ReactionRecord {
    pub id: String,
    pub name: String,
    pub abbreviation: String,
    /// Equation over compound ids, as stored in the database.
    pub equation_with_ids: String,
    /// Human-readable equation over compound names, compartment tags removed.
    pub equation_with_names: String,
    pub reversibility: Reversibility,
    pub direction: Direction,
    pub ec_numbers: Vec<String>,
    pub pathways: Vec<String>,
    pub is_transport: bool,
    pub deltag: Option<f64>,
    pub deltag_err: Option<f64>,
    pub aliases: BTreeMap<String, Vec<String>>,
}

/// Thermodynamic reversibility as annotated in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reversibility {
    ForwardIrreversible,
    ReverseIrreversible,
    Reversible,
    Unknown,
}

impl Reversibility {
    pub fn from_symbol(s: &str) -> Self {
        match s.trim() {
            ">" => Self::ForwardIrreversible,
            "<" => Self::ReverseIrreversible,
            "=" => Self::Reversible,
            _ => Self::Unknown,
        }
    }
}

/// Flux direction token used by the database, templates, and gapfill
/// solutions alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    #[serde(rename = ">")]
    Forward,
    #[serde(rename = "<")]
    Reverse,
    #[serde(rename = "=")]
    Both,
}

impl Direction {
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s.trim() {
            ">" => Some(Self::Forward),
            "<" => Some(Self::Reverse),
            "=" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Forward => ">",
            Self::Reverse => "<",
            Self::Both => "=",
        }
    }
}

/// Parse an alias column: `DB1: id1;id2|DB2: id3`.
///
/// Splits on `|`, then `:`, then `;`, trimming whitespace at every level.
/// Malformed fragments (no colon, empty database name, no ids) are skipped
/// without failing the parse.
pub fn parse_aliases(raw: &str) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for fragment in raw.split('|') {
        let Some((db, ids)) = fragment.split_once(':') else {
            continue;
        };
        let db = db.trim();
        if db.is_empty() {
            continue;
        }
        let ids: Vec<String> = ids
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if ids.is_empty() {
            continue;
        }
        out.entry(db.to_string()).or_default().extend(ids);
    }
    out
}

/// Parse a pathway column into clean pathway names.
///
/// Fragments are separated by `|` or `;`. Database prefixes (`MetaCyc:`,
/// `KEGG:`) and parenthesized descriptions are removed.
pub fn parse_pathways(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    for fragment in raw.split(['|', ';']) {
        let mut name = fragment.trim();
        for prefix in ["MetaCyc:", "KEGG:"] {
            if let Some(rest) = name.strip_prefix(prefix) {
                name = rest.trim();
            }
        }
        if let Some(open) = name.find('(') {
            name = name[..open].trim_end();
        }
        if name.is_empty() || name.eq_ignore_ascii_case("null") {
            continue;
        }
        if !out.iter().any(|existing: &String| existing == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// Parse an EC-number column; entries are separated by `|`, `;`, or `,`.
pub fn parse_ec_numbers(raw: &str) -> Vec<String> {
    raw.split(['|', ';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "null")
        .map(String::from)
        .collect()
}

/// Strip compartment tags (`[c0]`, `[e0]`, `[p0]`, `[0]`, …) from an
/// equation string.
pub fn strip_compartment_tags(equation: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"\[[A-Za-z]{0,2}\d\]").unwrap());
    tag.replace_all(equation, "").into_owned()
}

/// Parse an optional numeric column; `null`, `none`, and blanks become None.
pub fn parse_optional_f64(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") || trimmed.eq_ignore_ascii_case("none") {
        return None;
    }
    trimmed.parse().ok()
}

pub fn parse_optional_i64(raw: &str) -> Option<i64> {
    parse_optional_f64(raw).map(|f| f as i64)
}
