//! Growth media and the media-application contract.
//!
//! Media are stored in construction semantics: bare compound ids with signed
//! flux bounds. The optimizer wants exchange-reaction ids with positive
//! uptake magnitudes. `apply_media` is the single translation point between
//! the two; both FBA and the gapfill baseline checks go through it.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::model::Model;
use super::CobraError;

/// The extracellular compartment media constraints are drawn from.
pub const EXTRACELLULAR: &str = "e0";

/// Default uptake magnitude for compounds without an explicit bound.
pub const DEFAULT_UPTAKE: f64 = 100.0;

/// A growth medium: compound id → (lower bound, upper bound).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub id: String,
    pub name: String,
    /// Bare compound ids (`cpd00027`), signed bounds. A negative lower bound
    /// admits uptake.
    pub compounds: BTreeMap<String, (f64, f64)>,
    #[serde(default = "default_uptake")]
    pub default_uptake: f64,
}

fn default_uptake() -> f64 {
    DEFAULT_UPTAKE
}

impl Media {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            compounds: BTreeMap::new(),
            default_uptake: DEFAULT_UPTAKE,
        }
    }

    /// Add a compound at the default uptake magnitude.
    pub fn with_compound(mut self, compound_id: &str) -> Self {
        self.compounds
            .insert(compound_id.to_string(), (-self.default_uptake, DEFAULT_UPTAKE));
        self
    }

    /// Add a compound with explicit bounds.
    pub fn with_bounds(mut self, compound_id: &str, lower: f64, upper: f64) -> Self {
        self.compounds
            .insert(compound_id.to_string(), (lower, upper));
        self
    }

    /// Per-compartment constraints: compartmentalized compound id → bounds.
    pub fn constraints_for(&self, compartment: &str) -> impl Iterator<Item = (String, (f64, f64))> + '_ {
        let compartment = compartment.to_string();
        self.compounds
            .iter()
            .map(move |(id, &bounds)| (format!("{id}_{compartment}"), bounds))
    }

    pub fn num_compounds(&self) -> usize {
        self.compounds.len()
    }

    /// Parse a media JSON file (`{name, compounds: [{id, lower_bound,
    /// upper_bound}], default_uptake}`); the file stem becomes the media id.
    pub fn from_json_file(path: &Path) -> Result<Self, String> {
        #[derive(Deserialize)]
        struct CompoundEntry {
            id: String,
            lower_bound: Option<f64>,
            upper_bound: Option<f64>,
        }
        #[derive(Deserialize)]
        struct MediaFile {
            name: String,
            compounds: Vec<CompoundEntry>,
            default_uptake: Option<f64>,
        }

        let raw = fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {e}", path.display()))?;
        let parsed: MediaFile =
            serde_json::from_str(&raw).map_err(|e| format!("cannot parse '{}': {e}", path.display()))?;

        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| parsed.name.clone());
        let default = parsed.default_uptake.unwrap_or(DEFAULT_UPTAKE);
        let mut media = Media::new(id, parsed.name);
        media.default_uptake = default;
        for entry in parsed.compounds {
            let lower = entry.lower_bound.unwrap_or(-default);
            let upper = entry.upper_bound.unwrap_or(DEFAULT_UPTAKE);
            media.compounds.insert(entry.id, (lower, upper));
        }
        Ok(media)
    }
}

/// Outcome of applying a medium to a model.
#[derive(Debug, Clone)]
pub struct AppliedMedia {
    /// The exchange-id → uptake mapping that was assigned.
    pub medium: BTreeMap<String, f64>,
    /// Media compounds whose exchange reaction is absent from the model.
    pub skipped: Vec<String>,
}

/// Translate a medium into optimizer terms and assign it in one shot.
///
/// `cpd00027` (with bounds `(lb, ub)`) becomes `EX_cpd00027_e0` with uptake
/// `|lb|`. Compounds whose exchange reaction does not exist in the model are
/// logged and skipped. The assignment itself goes through `Model::set_medium`,
/// which closes every exchange before opening the listed ones.
pub fn apply_media(model: &mut Model, media: &Media) -> Result<AppliedMedia, CobraError> {
    let mut medium = BTreeMap::new();
    let mut skipped = Vec::new();

    for (met_id, (lower, _upper)) in media.constraints_for(EXTRACELLULAR) {
        let exchange_id = format!("EX_{met_id}");
        if model.has_reaction(&exchange_id) {
            medium.insert(exchange_id, lower.abs());
        } else {
            debug!(media = %media.id, exchange = %exchange_id, "no exchange reaction in model; skipping");
            skipped.push(exchange_id);
        }
    }

    model.set_medium(&medium)?;
    Ok(AppliedMedia { medium, skipped })
}

/// The built-in predefined media library. These ids are reserved, present
/// from startup, and never deletable.
pub fn builtin_media() -> Vec<Media> {
    vec![
        minimal("glucose_minimal_aerobic", "Glucose minimal medium (aerobic)", "cpd00027", true),
        minimal(
            "glucose_minimal_anaerobic",
            "Glucose minimal medium (anaerobic)",
            "cpd00027",
            false,
        ),
        minimal("acetate_minimal_aerobic", "Acetate minimal medium (aerobic)", "cpd00029", true),
        rich_aerobic(),
    ]
}

/// Load predefined media from a directory of JSON files, falling back to the
/// built-ins when the directory is unreadable. Built-in ids stay present
/// either way.
pub fn load_media_dir(dir: &Path) -> Vec<Media> {
    let mut library = builtin_media();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), %e, "media directory unreadable; using built-in library");
            return library;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match Media::from_json_file(&path) {
            Ok(media) => {
                library.retain(|m| m.id != media.id);
                library.push(media);
            }
            Err(e) => warn!(%e, "skipping unparseable media file"),
        }
    }
    library
}

/// Mineral base shared by the minimal media: ions, water, phosphate,
/// ammonium, sulfate.
const MINERAL_BASE: &[&str] = &[
    "cpd00001", // H2O
    "cpd00009", // Phosphate
    "cpd00013", // NH3
    "cpd00030", // Mn2+
    "cpd00034", // Zn2+
    "cpd00048", // Sulfate
    "cpd00058", // Cu2+
    "cpd00063", // Ca2+
    "cpd00067", // H+
    "cpd00099", // Cl-
    "cpd00149", // Co2+
    "cpd00205", // K+
    "cpd00254", // Mg
    "cpd00971", // Na+
    "cpd10515", // Fe2+
];

fn minimal(id: &str, name: &str, carbon_source: &str, aerobic: bool) -> Media {
    let mut media = Media::new(id, name);
    for mineral in MINERAL_BASE {
        media = media.with_compound(mineral);
    }
    media = media.with_bounds(carbon_source, -10.0, 100.0);
    if aerobic {
        media = media.with_bounds("cpd00007", -20.0, 100.0); // O2
    }
    media
}

fn rich_aerobic() -> Media {
    let mut media = minimal("rich_aerobic", "Rich medium (aerobic)", "cpd00027", true);
    for carbon in ["cpd00029", "cpd00020", "cpd00036", "cpd00023", "cpd00041"] {
        // Acetate, pyruvate, succinate, L-glutamate, L-aspartate.
        media = media.with_bounds(carbon, -10.0, 100.0);
    }
    media
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cobra::model::Metabolite;

    fn model_with_exchange(compound: &str) -> Model {
        let mut model = Model::new("m");
        model.add_metabolite(Metabolite {
            id: format!("{compound}_e0"),
            name: compound.into(),
            compartment: "e0".into(),
        });
        model.add_exchanges();
        model
    }

    #[test]
    fn apply_media_translates_ids_and_magnitudes() {
        let mut model = model_with_exchange("cpd00027");
        let media = Media::new("test", "test").with_bounds("cpd00027", -10.0, 100.0);
        let applied = apply_media(&mut model, &media).unwrap();
        assert_eq!(applied.medium.get("EX_cpd00027_e0"), Some(&10.0));
        assert_eq!(model.reaction("EX_cpd00027_e0").unwrap().lower_bound, -10.0);
    }

    #[test]
    fn apply_media_skips_missing_exchanges() {
        let mut model = model_with_exchange("cpd00027");
        let media = Media::new("test", "test")
            .with_bounds("cpd00027", -10.0, 100.0)
            .with_compound("cpd00007");
        let applied = apply_media(&mut model, &media).unwrap();
        assert_eq!(applied.skipped, vec!["EX_cpd00007_e0".to_string()]);
        assert_eq!(applied.medium.len(), 1);
    }

    #[test]
    fn applying_b_after_a_equals_applying_b_directly() {
        let mut model = Model::new("m");
        for compound in ["cpd00027", "cpd00029"] {
            model.add_metabolite(Metabolite {
                id: format!("{compound}_e0"),
                name: compound.into(),
                compartment: "e0".into(),
            });
        }
        model.add_exchanges();

        let media_a = Media::new("a", "a").with_bounds("cpd00027", -10.0, 100.0);
        let media_b = Media::new("b", "b").with_bounds("cpd00029", -5.0, 100.0);

        let mut sequential = model.clone();
        apply_media(&mut sequential, &media_a).unwrap();
        apply_media(&mut sequential, &media_b).unwrap();

        let mut direct = model;
        apply_media(&mut direct, &media_b).unwrap();

        assert_eq!(sequential.medium(), direct.medium());
        assert_eq!(
            sequential.reaction("EX_cpd00027_e0").unwrap().lower_bound,
            0.0
        );
    }

    #[test]
    fn builtin_library_is_complete() {
        let library = builtin_media();
        let ids: Vec<&str> = library.iter().map(|m| m.id.as_str()).collect();
        assert!(ids.contains(&"glucose_minimal_aerobic"));
        assert!(ids.contains(&"glucose_minimal_anaerobic"));
        let aerobic = library
            .iter()
            .find(|m| m.id == "glucose_minimal_aerobic")
            .unwrap();
        assert!(aerobic.compounds.contains_key("cpd00007"));
        let anaerobic = library
            .iter()
            .find(|m| m.id == "glucose_minimal_anaerobic")
            .unwrap();
        assert!(!anaerobic.compounds.contains_key("cpd00007"));
        assert_eq!(aerobic.compounds["cpd00027"], (-10.0, 100.0));
    }

    #[test]
    fn media_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pyruvate_minimal.json");
        std::fs::write(
            &path,
            r#"{"name":"Pyruvate minimal","compounds":[{"id":"cpd00020","lower_bound":-10.0,"upper_bound":100.0},{"id":"cpd00001"}]}"#,
        )
        .unwrap();
        let media = Media::from_json_file(&path).unwrap();
        assert_eq!(media.id, "pyruvate_minimal");
        assert_eq!(media.compounds["cpd00020"], (-10.0, 100.0));
        assert_eq!(media.compounds["cpd00001"], (-100.0, 100.0));
    }
}
