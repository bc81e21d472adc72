//! Criterion benchmarks for the biochemistry index.
//!
//! Exact lookups must stay O(1) and a full-corpus search must finish well
//! under 100 ms; both are measured here over a synthetic corpus sized like
//! the production database.

use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use metaflux::biochem::{BiochemIndex, CompoundRecord, Direction, ReactionRecord, Reversibility};

fn synthetic_index(num_compounds: usize, num_reactions: usize) -> BiochemIndex {
    let compounds = (0..num_compounds)
        .map(|i| CompoundRecord {
            id: format!("cpd{i:05}"),
            name: format!("Synthetic compound {i}"),
            abbreviation: format!("syn{i}"),
            formula: format!("C{}H{}O{}", i % 20 + 1, i % 30 + 2, i % 10 + 1),
            mass: Some(100.0 + i as f64),
            charge: Some((i % 5) as i64 - 2),
            inchikey: String::new(),
            smiles: String::new(),
            aliases: BTreeMap::from([("KEGG".to_string(), vec![format!("C{i:05}")])]),
        })
        .collect();

    let reactions = (0..num_reactions)
        .map(|i| ReactionRecord {
            id: format!("rxn{i:05}"),
            name: format!("Synthetic reaction {i}"),
            abbreviation: format!("RXN{i}"),
            equation_with_ids: String::new(),
            equation_with_names: String::new(),
            reversibility: Reversibility::Reversible,
            direction: Direction::Both,
            ec_numbers: vec![format!("{}.{}.{}.{}", i % 6 + 1, i % 9 + 1, i % 9 + 1, i % 99 + 1)],
            pathways: vec![format!("Pathway {}", i % 200)],
            is_transport: i % 10 == 0,
            deltag: None,
            deltag_err: None,
            aliases: BTreeMap::new(),
        })
        .collect();

    BiochemIndex::from_records(compounds, reactions)
}

fn bench_index(c: &mut Criterion) {
    let index = synthetic_index(34_000, 44_000);

    c.bench_function("exact_compound_lookup", |b| {
        b.iter(|| index.get_compound(black_box("cpd12345")).unwrap())
    });

    c.bench_function("search_compounds_partial", |b| {
        b.iter(|| index.search_compounds(black_box("compound 123"), 10))
    });

    c.bench_function("search_reactions_by_ec", |b| {
        b.iter(|| index.search_reactions(black_box("2.3.4.5"), 10))
    });
}

criterion_group!(benches, bench_index);
criterion_main!(benches);
