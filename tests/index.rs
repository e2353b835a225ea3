use moth_catalog::domain::{Rank, Taxon};
use moth_catalog::index::{MAX_RESULTS, TaxonIndex};
use moth_catalog::normalize::normalize_taxa;

const SAMPLE: &str = include_str!("fixtures/taicol_sample.csv");

fn taxon(id: usize, genus: &str) -> Taxon {
    Taxon {
        taxon_id: format!("t{id}"),
        scientific_name: format!("{genus} sp{id}"),
        chinese_name: String::new(),
        rank: Rank::Species,
        family: "Geometridae".to_string(),
        genus: genus.to_string(),
        species: Some(format!("sp{id}")),
        subspecies: None,
    }
}

#[test]
fn matches_any_searchable_field_case_insensitively() {
    let index = TaxonIndex::new(normalize_taxa(SAMPLE));

    let by_name = index.search("ATTACUS");
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].taxon_id, "t0001");

    let by_chinese = index.search("水青");
    assert_eq!(by_chinese[0].taxon_id, "t0003");

    let by_family = index.search("saturn");
    assert_eq!(by_family.len(), 2);

    let by_rank = index.search("genus");
    assert_eq!(by_rank.len(), 1);
    assert_eq!(by_rank[0].taxon_id, "t0004");
}

#[test]
fn empty_query_or_index_returns_nothing() {
    let index = TaxonIndex::new(normalize_taxa(SAMPLE));
    assert!(index.search("").is_empty());
    assert!(TaxonIndex::default().search("attacus").is_empty());
}

#[test]
fn results_are_capped_in_index_order() {
    let index = TaxonIndex::new((0..120).map(|id| taxon(id, "Biston")).collect());
    let results = index.search("biston");
    assert_eq!(results.len(), MAX_RESULTS);
    assert_eq!(results[0].taxon_id, "t0");
    assert_eq!(results[MAX_RESULTS - 1].taxon_id, format!("t{}", MAX_RESULTS - 1));
}

#[test]
fn replace_swaps_the_whole_index() {
    let mut index = TaxonIndex::new(normalize_taxa(SAMPLE));
    assert!(index.get("t0001").is_some());
    index.replace(vec![taxon(1, "Biston")]);
    assert_eq!(index.len(), 1);
    assert!(index.get("t0001").is_none());
    assert!(index.search("attacus").is_empty());
}
