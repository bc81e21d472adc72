//! Protein inputs for reconstruction.
//!
//! A genome is a flat set of protein features. It enters the system either
//! as a FASTA file (descriptions carry functional annotations when present)
//! or as an id → amino-acid-sequence mapping. External annotation services
//! implement `Annotator`.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::path::Path;

use crate::error::ToolError;

/// The twenty proteinogenic amino acids; sequences are validated
/// case-insensitively against this alphabet.
pub const AMINO_ACID_ALPHABET: &str = "ACDEFGHIKLMNPQRSTVWY";

#[derive(Debug, Clone)]
pub struct Feature {
    pub id: String,
    pub protein: String,
    /// Functional annotation (a role string), when known.
    pub function: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Genome {
    pub id: String,
    pub features: Vec<Feature>,
}

/// External functional-annotation collaborator. Failures are surfaced to the
/// caller as library errors; construction never degrades silently.
pub trait Annotator: Send + Sync {
    fn annotate(&self, genome: &mut Genome) -> Result<(), String>;
}

impl Genome {
    /// Build from an id → sequence mapping (ids are unique by construction).
    pub fn from_protein_map(id: &str, proteins: &BTreeMap<String, String>) -> Result<Self, ToolError> {
        if proteins.is_empty() {
            return Err(ToolError::validation(
                "The protein mapping is empty; supply at least one sequence",
                vec!["Pass protein_sequences as {\"protein_id\": \"MKT...\"}".into()],
            ));
        }
        let features: Vec<Feature> = proteins
            .iter()
            .map(|(id, seq)| Feature {
                id: id.clone(),
                protein: seq.trim().to_string(),
                function: None,
            })
            .collect();
        validate_sequences(&features)?;
        Ok(Self {
            id: id.to_string(),
            features,
        })
    }

    /// Parse a protein FASTA file. The record description, when present, is
    /// kept as the feature's functional annotation.
    pub fn from_fasta(id: &str, path: &Path) -> Result<Self, ToolError> {
        let file = File::open(path).map_err(|e| {
            ToolError::validation(
                format!("Cannot open FASTA file '{}': {e}", path.display()),
                vec!["Check the fasta_path; it must be readable by the server process".into()],
            )
        })?;
        let reader = bio::io::fasta::Reader::new(file);

        let mut features = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut duplicates: Vec<String> = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| {
                ToolError::library(format!("FASTA parse failure in '{}': {e}", path.display()))
            })?;
            let feature_id = record.id().to_string();
            if !seen.insert(feature_id.clone()) {
                duplicates.push(feature_id.clone());
            }
            features.push(Feature {
                id: feature_id,
                protein: String::from_utf8_lossy(record.seq()).trim().to_string(),
                function: record.desc().map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
            });
        }

        if features.is_empty() {
            return Err(ToolError::validation(
                format!("FASTA file '{}' contains no records", path.display()),
                vec!["Supply a protein FASTA with at least one sequence".into()],
            ));
        }
        if !duplicates.is_empty() {
            duplicates.sort();
            duplicates.dedup();
            return Err(ToolError::validation(
                format!("Duplicate protein ids in FASTA: {}", duplicates.join(", ")),
                vec!["Protein ids must be unique within the input".into()],
            ));
        }
        validate_sequences(&features)?;
        Ok(Self {
            id: id.to_string(),
            features,
        })
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// Distinct functional annotations present on the genome.
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.features
            .iter()
            .filter_map(|f| f.function.as_deref())
    }

    pub fn num_annotated(&self) -> usize {
        self.features.iter().filter(|f| f.function.is_some()).count()
    }
}

fn is_valid_protein(sequence: &str) -> bool {
    !sequence.is_empty()
        && sequence
            .chars()
            .all(|c| AMINO_ACID_ALPHABET.contains(c.to_ascii_uppercase()))
}

/// Enumerate every invalid sequence in a single error rather than bailing on
/// the first.
fn validate_sequences(features: &[Feature]) -> Result<(), ToolError> {
    let mut invalid: Vec<&str> = features
        .iter()
        .filter(|f| !is_valid_protein(&f.protein))
        .map(|f| f.id.as_str())
        .collect();
    if invalid.is_empty() {
        return Ok(());
    }
    invalid.sort_unstable();
    Err(ToolError::validation(
        format!(
            "{} protein sequence(s) are empty or contain characters outside the amino-acid alphabet {}: {}",
            invalid.len(),
            AMINO_ACID_ALPHABET,
            invalid.join(", ")
        ),
        vec!["Remove nucleotide sequences, stop codons (*), and gap characters before submitting".into()],
    ))
}
