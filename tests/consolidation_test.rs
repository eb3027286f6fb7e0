mod helpers;

use helpers::{insert_pattern, set_state, similar_embedding, test_db, test_embedding};
use mnemos::config::ConsolidationConfig;
use mnemos::memory::consolidate::consolidate;
use mnemos::memory::links::{link, links_of};
use mnemos::memory::search::search_candidates;
use mnemos::memory::store::get_pattern;
use mnemos::memory::types::LinkType;

fn config() -> ConsolidationConfig {
    ConsolidationConfig {
        confidence_floor: 0.2,
        negligible_usage: 1,
        merge_threshold: 0.95,
    }
}

#[test]
fn prune_then_merge_in_one_pass() {
    let mut conn = test_db();

    // Prunable: weak and unused
    let weak = insert_pattern(&mut conn, "never worked", &test_embedding(10));
    set_state(&conn, &weak, 0.08, 1);

    // Mergeable pair
    let base = test_embedding(20);
    let keeper = insert_pattern(&mut conn, "flush buffers on close", &base);
    let clone = insert_pattern(&mut conn, "flush the buffers on close", &similar_embedding(&base));
    set_state(&conn, &keeper, 0.7, 8);
    set_state(&conn, &clone, 0.5, 2);

    // Untouched bystander
    let other = insert_pattern(&mut conn, "unrelated advice", &test_embedding(200));
    set_state(&conn, &other, 0.6, 3);

    let result = consolidate(&mut conn, "global", &config()).unwrap();
    assert_eq!(result.pruned, 1);
    assert_eq!(result.merged, 1);

    assert!(get_pattern(&conn, &weak).is_err());
    assert!(get_pattern(&conn, &clone).is_err());
    let survivor = get_pattern(&conn, &keeper).unwrap();
    assert_eq!(survivor.usage_count, 10);
    let expected = (0.7 * 8.0 + 0.5 * 2.0) / 10.0;
    assert!((survivor.confidence - expected).abs() < 1e-9);
    assert!(get_pattern(&conn, &other).is_ok());
}

#[test]
fn merged_pattern_stops_answering_searches() {
    let mut conn = test_db();
    let base = test_embedding(1);
    let keeper = insert_pattern(&mut conn, "keeper", &base);
    let clone = insert_pattern(&mut conn, "clone", &similar_embedding(&base));
    set_state(&conn, &keeper, 0.6, 5);
    set_state(&conn, &clone, 0.6, 1);

    consolidate(&mut conn, "global", &config()).unwrap();

    let hits = search_candidates(&conn, &base, "global", 10, 0.0).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].pattern.id, keeper);
}

#[test]
fn merge_inherits_links_without_self_loops() {
    let mut conn = test_db();
    let base = test_embedding(1);
    let keeper = insert_pattern(&mut conn, "keeper", &base);
    let clone = insert_pattern(&mut conn, "clone", &similar_embedding(&base));
    let other = insert_pattern(&mut conn, "other", &test_embedding(100));
    set_state(&conn, &keeper, 0.6, 5);
    set_state(&conn, &clone, 0.6, 1);

    // An edge into the pair and an edge between the pair
    link(&mut conn, &clone, &other, LinkType::Requires, 0.9).unwrap();
    link(&mut conn, &keeper, &clone, LinkType::Alternative, 0.5).unwrap();

    consolidate(&mut conn, "global", &config()).unwrap();

    let edges = links_of(&conn, &keeper).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source_id, keeper);
    assert_eq!(edges[0].target_id, other);
    assert_eq!(edges[0].link_type, LinkType::Requires);
}

#[test]
fn consolidation_is_audited() {
    let mut conn = test_db();
    let weak = insert_pattern(&mut conn, "weak", &test_embedding(1));
    set_state(&conn, &weak, 0.08, 0);

    consolidate(&mut conn, "global", &config()).unwrap();

    let pruned: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pattern_log WHERE operation = 'prune' AND pattern_id = ?1",
            [&weak],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(pruned, 1);
}

#[test]
fn stable_store_is_a_no_op() {
    let mut conn = test_db();
    let a = insert_pattern(&mut conn, "healthy a", &test_embedding(1));
    let b = insert_pattern(&mut conn, "healthy b", &test_embedding(2));
    set_state(&conn, &a, 0.7, 4);
    set_state(&conn, &b, 0.6, 4);

    let result = consolidate(&mut conn, "global", &config()).unwrap();
    assert_eq!(result.pruned, 0);
    assert_eq!(result.merged, 0);
}
