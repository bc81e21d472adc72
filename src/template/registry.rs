//! Named template registry, loaded once at startup and read-only after.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use super::Template;
use crate::cobra::Media;
use crate::error::ToolError;

/// Templates the server cannot start without.
pub const CRITICAL_TEMPLATES: &[&str] = &["GramNegative", "Core"];

/// Templates loaded when present; absence is logged and tolerated.
pub const OPTIONAL_TEMPLATES: &[&str] = &["GramPositive"];

pub struct TemplateRegistry {
    templates: BTreeMap<String, Template>,
    atp_media: Vec<Media>,
}

impl TemplateRegistry {
    /// Load the configured template set from a directory of
    /// `<TemplateName>.json` files plus the optional `atp_media.json`
    /// test-media bundle.
    pub fn load(dir: &Path) -> Result<Self, ToolError> {
        let mut templates = BTreeMap::new();

        for name in CRITICAL_TEMPLATES {
            let path = dir.join(format!("{name}.json"));
            let template = Template::from_json_file(&path).map_err(|e| {
                ToolError::library(format!("critical template '{name}' failed to load: {e}"))
            })?;
            info!(template = name, reactions = template.reactions.len(), "loaded template");
            templates.insert((*name).to_string(), template);
        }

        for name in OPTIONAL_TEMPLATES {
            let path = dir.join(format!("{name}.json"));
            if !path.exists() {
                continue;
            }
            match Template::from_json_file(&path) {
                Ok(template) => {
                    info!(template = name, reactions = template.reactions.len(), "loaded template");
                    templates.insert((*name).to_string(), template);
                }
                Err(e) => warn!(template = name, %e, "skipping optional template"),
            }
        }

        let atp_media = load_atp_media(&dir.join("atp_media.json"));
        Ok(Self {
            templates,
            atp_media,
        })
    }

    /// Assemble a registry from parsed parts; test fixtures enter here.
    pub fn from_parts(templates: Vec<Template>, atp_media: Vec<Media>) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.name.clone(), t)).collect(),
            atp_media,
        }
    }

    pub fn get(&self, name: &str) -> Result<&Template, ToolError> {
        self.templates.get(name).ok_or_else(|| {
            ToolError::validation(
                format!(
                    "Unknown template '{name}'. Valid templates: {}",
                    self.names().join(", ")
                ),
                vec!["Pick one of the listed template names".into()],
            )
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    /// The fixed ATP test-media bundle used by gapfill stage 1.
    pub fn atp_test_media(&self) -> &[Media] {
        &self.atp_media
    }
}

fn load_atp_media(path: &Path) -> Vec<Media> {
    if !path.exists() {
        warn!(path = %path.display(), "no ATP test-media bundle; ATP correction will probe zero conditions");
        return Vec::new();
    }
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(%e, "cannot read ATP test-media bundle");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<Media>>(&raw) {
        Ok(media) => {
            info!(count = media.len(), "loaded ATP test-media bundle");
            media
        }
        Err(e) => {
            warn!(%e, "cannot parse ATP test-media bundle");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_template(name: &str) -> Template {
        let raw = serde_json::json!({
            "name": name,
            "compartments": [{"id": "c", "name": "Cytosol"}],
            "compounds": [{"id": "cpd00100", "name": "Substrate"}],
            "reactions": [{
                "id": "rxn90001_c",
                "direction": "=",
                "stoichiometry": {"cpd00100_c": -1.0}
            }],
            "biomass": {"id": "bio1", "stoichiometry": {"cpd00100_c": -1.0}}
        });
        serde_json::from_value::<Template>(raw)
            .unwrap()
            .finalize()
            .unwrap()
    }

    #[test]
    fn unknown_template_error_enumerates_valid_names() {
        let registry =
            TemplateRegistry::from_parts(vec![toy_template("GramNegative"), toy_template("Core")], vec![]);
        let err = registry.get("GramPositive").unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        let message = err.to_string();
        assert!(message.contains("GramNegative"));
        assert!(message.contains("Core"));
    }

    #[test]
    fn get_returns_loaded_template() {
        let registry = TemplateRegistry::from_parts(vec![toy_template("Core")], vec![]);
        assert_eq!(registry.get("Core").unwrap().name, "Core");
    }
}
