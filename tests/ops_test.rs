//! Black-box tests over the shared ops layer, driving the same fixtures the
//! MCP tests use: a small biochemistry TSV pair and two toy templates.

use std::collections::BTreeMap;
use std::path::PathBuf;

use metaflux::biochem::{BiochemIndex, MatchType};
use metaflux::cobra::builtin_media;
use metaflux::genome::{Annotator, Genome};
use metaflux::ops::{self, BuildModelInput};
use metaflux::session::SessionStore;
use metaflux::template::TemplateRegistry;

fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data")
}

fn biochem() -> BiochemIndex {
    BiochemIndex::load(
        &data_dir().join("biochem/compounds.tsv"),
        &data_dir().join("biochem/reactions.tsv"),
    )
    .expect("fixture TSVs load")
}

fn registry() -> TemplateRegistry {
    TemplateRegistry::load(&data_dir().join("templates")).expect("fixture templates load")
}

fn store() -> SessionStore {
    let mut store = SessionStore::default();
    store.install_predefined_media(builtin_media());
    store
}

fn proteins() -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    map.insert("p1".to_string(), "MKTAYIAKQR".to_string());
    map
}

// ── build_media ─────────────────────────────────────────────────────────────

#[test]
fn build_media_stores_and_reports() {
    let biochem = biochem();
    let mut store = store();
    let result = ops::op_build_media(
        &biochem,
        &mut store,
        &["cpd00027".into(), "cpd00001".into()],
        Some("my glucose medium"),
        None,
    )
    .unwrap();

    assert_eq!(result.media_id, "my_glucose_medium");
    assert_eq!(result.num_compounds, 2);
    assert_eq!(result.compound_names["cpd00027"], "D-Glucose");
    assert_eq!(result.compounds["cpd00027"], (-100.0, 100.0));
    assert!(store.get_media("my_glucose_medium").is_ok());
}

#[test]
fn build_media_enumerates_all_invalid_ids() {
    let biochem = biochem();
    let mut store = store();
    let before = store.num_media();

    let err = ops::op_build_media(
        &biochem,
        &mut store,
        &["cpd00027".into(), "cpd99999".into(), "notanid".into()],
        None,
        None,
    )
    .unwrap_err();

    assert_eq!(err.kind(), "validation_error");
    let message = err.to_string();
    assert!(message.contains("cpd99999"));
    assert!(message.contains("notanid"));
    assert!(err
        .recovery_suggestions()
        .iter()
        .any(|s| s.contains("search_compounds")));
    // Nothing was stored.
    assert_eq!(store.num_media(), before);
}

#[test]
fn build_media_honors_bound_overrides() {
    let biochem = biochem();
    let mut store = store();
    let mut bounds = BTreeMap::new();
    bounds.insert("cpd00027".to_string(), (-10.0, 100.0));
    let result = ops::op_build_media(
        &biochem,
        &mut store,
        &["cpd00027".into(), "cpd00001".into()],
        Some("bounded"),
        Some(&bounds),
    )
    .unwrap();
    assert_eq!(result.compounds["cpd00027"], (-10.0, 100.0));
    assert_eq!(result.compounds["cpd00001"], (-100.0, 100.0));
}

// ── build_model ─────────────────────────────────────────────────────────────

#[test]
fn build_model_requires_exactly_one_source() {
    let registry = registry();
    let mut store = store();

    let err = ops::op_build_model(
        &registry,
        &mut store,
        None,
        BuildModelInput {
            fasta_path: None,
            protein_sequences: None,
            template: "GramNegative",
            model_name: None,
            annotate: false,
        },
    )
    .unwrap_err();
    assert_eq!(err.kind(), "validation_error");

    let proteins = proteins();
    let err = ops::op_build_model(
        &registry,
        &mut store,
        None,
        BuildModelInput {
            fasta_path: Some("/tmp/genome.faa"),
            protein_sequences: Some(&proteins),
            template: "GramNegative",
            model_name: None,
            annotate: false,
        },
    )
    .unwrap_err();
    assert_eq!(err.kind(), "validation_error");
}

#[test]
fn build_model_rejects_unknown_template() {
    let registry = registry();
    let mut store = store();
    let proteins = proteins();
    let err = ops::op_build_model(
        &registry,
        &mut store,
        None,
        BuildModelInput {
            fasta_path: None,
            protein_sequences: Some(&proteins),
            template: "Archaea",
            model_name: None,
            annotate: false,
        },
    )
    .unwrap_err();
    assert_eq!(err.kind(), "validation_error");
    assert!(err.to_string().contains("GramNegative"));
    assert!(err.to_string().contains("Core"));
}

#[test]
fn build_model_from_unannotated_proteins() {
    let registry = registry();
    let mut store = store();
    let proteins = proteins();
    let result = ops::op_build_model(
        &registry,
        &mut store,
        None,
        BuildModelInput {
            fasta_path: None,
            protein_sequences: Some(&proteins),
            template: "GramNegative",
            model_name: Some("plain"),
            annotate: false,
        },
    )
    .unwrap();

    assert_eq!(result.model_id, "plain.draft");
    // Only spontaneous/universal reactions plus biomass and exchanges: no
    // role evidence, no genes.
    assert_eq!(result.statistics.num_genes, 0);
    assert_eq!(result.statistics.biomass_reaction_id.as_deref(), Some("bio1"));
    assert!(result.statistics.num_exchanges > 0);
    assert_eq!(result.interpretation.annotation_status, "unannotated");
    assert_eq!(result.interpretation.readiness, "ready for gapfilling");
    assert!(store.get_model("plain.draft").is_ok());
}

struct GlucokinaseAnnotator;

impl Annotator for GlucokinaseAnnotator {
    fn annotate(&self, genome: &mut Genome) -> Result<(), String> {
        for feature in &mut genome.features {
            feature.function = Some("Glucokinase (EC 2.7.1.2)".into());
        }
        Ok(())
    }
}

struct FailingAnnotator;

impl Annotator for FailingAnnotator {
    fn annotate(&self, _genome: &mut Genome) -> Result<(), String> {
        Err("connection refused".into())
    }
}

#[test]
fn annotate_without_service_is_a_library_error() {
    let registry = registry();
    let mut store = store();
    let proteins = proteins();
    let err = ops::op_build_model(
        &registry,
        &mut store,
        None,
        BuildModelInput {
            fasta_path: None,
            protein_sequences: Some(&proteins),
            template: "GramNegative",
            model_name: None,
            annotate: true,
        },
    )
    .unwrap_err();
    assert_eq!(err.kind(), "library_error");
}

#[test]
fn annotator_failure_is_surfaced_not_degraded() {
    let registry = registry();
    let mut store = store();
    let proteins = proteins();
    let before = store.num_models();
    let err = ops::op_build_model(
        &registry,
        &mut store,
        Some(&FailingAnnotator),
        BuildModelInput {
            fasta_path: None,
            protein_sequences: Some(&proteins),
            template: "GramNegative",
            model_name: None,
            annotate: true,
        },
    )
    .unwrap_err();
    assert_eq!(err.kind(), "library_error");
    assert!(err.to_string().contains("connection refused"));
    assert_eq!(store.num_models(), before);
}

#[test]
fn annotation_service_supplies_role_evidence() {
    let registry = registry();
    let mut store = store();
    let proteins = proteins();
    let result = ops::op_build_model(
        &registry,
        &mut store,
        Some(&GlucokinaseAnnotator),
        BuildModelInput {
            fasta_path: None,
            protein_sequences: Some(&proteins),
            template: "GramNegative",
            model_name: Some("annotated"),
            annotate: true,
        },
    )
    .unwrap();

    let stored = store.get_model(&result.model_id).unwrap();
    assert!(stored.model.has_reaction("rxn00216_c0"));
    assert_eq!(result.statistics.num_genes, 1);
    assert_eq!(result.interpretation.annotation_status, "well annotated");
}

// ── biochemistry lookups ────────────────────────────────────────────────────

#[test]
fn compound_and_reaction_lookups() {
    let biochem = biochem();
    let compound = ops::op_get_compound(&biochem, "cpd00027").unwrap();
    assert_eq!(compound.compound.name, "D-Glucose");
    assert_eq!(compound.compound.aliases["KEGG"], vec!["C00031", "C00293"]);

    let reaction = ops::op_get_reaction(&biochem, "rxn00216").unwrap();
    assert_eq!(reaction.reaction.name, "Glucokinase");
    assert_eq!(reaction.reaction.ec_numbers, vec!["2.7.1.2"]);
    assert!(reaction.reaction.equation_with_names.contains("D-Glucose"));
    assert!(!reaction.reaction.equation_with_names.contains("[c0]"));

    let err = ops::op_get_compound(&biochem, "glucose").unwrap_err();
    assert_eq!(err.kind(), "validation_error");
    let err = ops::op_get_compound(&biochem, "cpd99999").unwrap_err();
    assert_eq!(err.kind(), "not_found_error");
}

#[test]
fn search_glucose_ranks_exact_first() {
    let biochem = biochem();
    let outcome = ops::op_search_compounds(&biochem, "glucose", 5).unwrap();
    assert!(!outcome.hits.is_empty());
    assert!(outcome.hits.len() <= 5);
    assert_eq!(outcome.hits[0].record.id, "cpd00027");
    assert_eq!(outcome.hits[0].match_type, MatchType::Exact);
}

#[test]
fn search_reactions_by_ec_number() {
    let biochem = biochem();
    let outcome = ops::op_search_reactions(&biochem, "2.7.1.1", 10).unwrap();
    assert_eq!(outcome.hits[0].record.id, "rxn00548");
    assert_eq!(outcome.hits[0].match_field, "ec_numbers");
}

#[test]
fn search_empty_result_suggests_alternatives() {
    let biochem = biochem();
    let outcome = ops::op_search_compounds(&biochem, "completely-unknown-compound", 5).unwrap();
    assert!(outcome.hits.is_empty());
    assert!(!outcome.suggestions.is_empty());
}

// ── session enumeration and deletion ────────────────────────────────────────

#[test]
fn list_and_delete_models() {
    let registry = registry();
    let mut store = store();
    let proteins = proteins();
    ops::op_build_model(
        &registry,
        &mut store,
        None,
        BuildModelInput {
            fasta_path: None,
            protein_sequences: Some(&proteins),
            template: "GramNegative",
            model_name: Some("listed"),
            annotate: false,
        },
    )
    .unwrap();

    let listing = ops::op_list_models(&store);
    assert_eq!(listing.count, 1);
    assert_eq!(listing.models[0].model_id, "listed.draft");

    let deleted = ops::op_delete_model(&mut store, "listed.draft").unwrap();
    assert_eq!(deleted.remaining, 0);

    let err = ops::op_delete_model(&mut store, "listed.draft").unwrap_err();
    assert_eq!(err.kind(), "not_found_error");
}

#[test]
fn list_media_includes_predefined() {
    let store = store();
    let listing = ops::op_list_media(&store);
    assert!(listing
        .media
        .iter()
        .any(|m| m.media_id == "glucose_minimal_aerobic" && m.meta.predefined));
}

#[test]
fn predefined_media_survive_delete_attempts() {
    let mut store = store();
    let err = ops::op_delete_media(&mut store, "glucose_minimal_aerobic").unwrap_err();
    assert_eq!(err.kind(), "validation_error");
    assert!(store.get_media("glucose_minimal_aerobic").is_ok());
}
