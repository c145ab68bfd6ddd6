//! Integration tests for the complete pipeline
//!
//! These tests drive the crates together:
//! - export directory / `.tar.gz` → ingest → graph
//! - graph → change list → plan
//!
//! Run with: cargo test --test integration_tests

use std::fs::{self, File};
use std::path::Path;

use metabase_serdes_changes::{
    parse_change_list, plan_changes, ChangeOperation, DependencySource, PlanConfig,
    PrecedenceClass,
};
use metabase_serdes_graph::{ExportGraph, GraphConfig, Resolution};
use metabase_serdes_ingest::{read_export, ReadOptions};
use metabase_serdes_model::{Diagnostic, EntityId, EntityKind};
use tempfile::tempdir;

const DOCUMENTS: &[(&str, &str)] = &[
    (
        "databases/Sample/Sample.yaml",
        "name: Sample\nengine: h2\nserdes/meta:\n- model: Database\n  id: Sample\n",
    ),
    (
        "databases/Sample/schemas/PUBLIC/tables/ORDERS/ORDERS.yaml",
        "name: ORDERS\ndb_id: Sample\nserdes/meta:\n- model: Database\n  id: Sample\n- model: Schema\n  id: PUBLIC\n- model: Table\n  id: ORDERS\n",
    ),
    (
        "databases/Sample/schemas/PUBLIC/tables/ORDERS/fields/TOTAL.yaml",
        "name: TOTAL\ntable_id: [Sample, PUBLIC, ORDERS]\nserdes/meta:\n- model: Database\n  id: Sample\n- model: Schema\n  id: PUBLIC\n- model: Table\n  id: ORDERS\n- model: Field\n  id: TOTAL\n",
    ),
    (
        "collections/root/root.yaml",
        "name: Root\nentity_id: root\nparent_id: null\nserdes/meta:\n- model: Collection\n  id: root\n",
    ),
    (
        "collections/root/cards/orders.yaml",
        r#"name: Orders
entity_id: orders
collection_id: root
database_id: Sample
table_id: [Sample, PUBLIC, ORDERS]
dataset_query:
  database: Sample
  type: query
  query:
    source-table: [Sample, PUBLIC, ORDERS]
result_metadata:
- name: TOTAL
  id: [Sample, PUBLIC, ORDERS, TOTAL]
  field_ref: [field, [Sample, PUBLIC, ORDERS, TOTAL], null]
serdes/meta:
- model: Card
  id: orders
"#,
    ),
    (
        "collections/root/cards/summary.yaml",
        r#"name: Summary
entity_id: summary
collection_id: root
database_id: Sample
dataset_query:
  database: Sample
  type: query
  query:
    source-table: orders
serdes/meta:
- model: Card
  id: summary
"#,
    ),
    (
        "collections/root/dashboards/overview.yaml",
        r#"name: Overview
entity_id: overview
collection_id: root
dashcards:
- entity_id: dc1
  card_id: summary
  parameter_mappings: []
- entity_id: dc2
  card_id: null
  visualization_settings:
    virtual_card: {display: text}
  parameter_mappings: []
serdes/meta:
- model: Dashboard
  id: overview
"#,
    ),
    ("settings.yaml", "site-name: Example\n"),
];

fn write_export_dir(root: &Path) {
    for (path, text) in DOCUMENTS {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }
}

fn write_export_tgz(path: &Path) {
    let file = File::create(path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (member, text) in DOCUMENTS {
        let mut header = tar::Header::new_gnu();
        header.set_size(text.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("export/{member}"), text.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

fn graph_from(path: &Path) -> ExportGraph {
    let members = read_export(path, &ReadOptions::default()).unwrap();
    ExportGraph::build(&members, &GraphConfig::default()).unwrap()
}

// ============================================================================
// ingest → graph
// ============================================================================

#[test]
fn test_directory_and_tarball_build_the_same_index() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("export");
    write_export_dir(&root);
    let tgz = dir.path().join("export.tgz");
    write_export_tgz(&tgz);

    let from_dir = graph_from(&root);
    let from_tgz = graph_from(&tgz);

    let ids = |g: &ExportGraph| g.index.registered().map(|r| r.id.clone()).collect::<Vec<_>>();
    let mut a = ids(&from_dir);
    let mut b = ids(&from_tgz);
    a.sort();
    b.sort();
    assert_eq!(a, b);
    assert_eq!(from_dir.stats.entities, 7);
    assert_eq!(from_dir.stats.references, from_tgz.stats.references);
    assert_eq!(from_dir.stats.dangling, 0);
}

#[test]
fn test_graph_resolves_paths_and_embedded_dashcards() {
    let dir = tempdir().unwrap();
    write_export_dir(dir.path());
    let graph = graph_from(dir.path());

    let orders_table = EntityId::path(["Sample", "PUBLIC", "ORDERS"]);
    let total = EntityId::path(["Sample", "PUBLIC", "ORDERS", "TOTAL"]);
    assert_eq!(graph.get(&orders_table).unwrap().kind, EntityKind::Table);
    assert_eq!(graph.get(&total).unwrap().kind, EntityKind::Field);

    let into_table: Vec<&str> = graph
        .incoming(&orders_table)
        .iter()
        .map(|r| r.label.as_str())
        .collect();
    assert!(into_table.contains(&"table_id"));
    assert!(into_table.contains(&"dataset_query.query.source-table"));

    // The virtual text card has no card_id; the real one points at `summary`.
    let summary_in: Vec<_> = graph.incoming(&EntityId::id("summary")).iter().collect();
    assert_eq!(summary_in.len(), 1);
    assert_eq!(summary_in[0].label, "dashboard.dashcards[0].card_id");

    assert_eq!(graph.resolve(&EntityId::id("dc1")), Resolution::External);
    assert_eq!(
        graph.resolve(&EntityId::path(["Sample", "PUBLIC"])),
        Resolution::External
    );
    assert!(!graph
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::NullReference { .. })));
}

// ============================================================================
// graph → plan
// ============================================================================

#[test]
fn test_change_list_plans_end_to_end() {
    let dir = tempdir().unwrap();
    write_export_dir(dir.path());
    let graph = graph_from(dir.path());

    let requests = parse_change_list(
        r#"
- operation: update
  target: overview
  payload:
    dashcards:
    - card_id: fresh
      parameter_mappings: []
- operation: create
  payload:
    collection_id: root
    database_id: Sample
    dataset_query:
      database: Sample
      query: {source-table: orders}
    serdes/meta: [{model: Card, id: fresh}]
- operation: archive
  target: orders
- operation: delete
  target: summary
"#,
    )
    .unwrap();

    let plan = plan_changes(&graph, &requests, &PlanConfig::default()).unwrap();

    assert!(plan.is_complete(), "{:?}", plan.rejected);
    let order: Vec<(usize, PrecedenceClass)> =
        plan.steps.iter().map(|s| (s.index, s.class)).collect();
    assert_eq!(
        order,
        vec![
            (3, PrecedenceClass::Delete),
            (2, PrecedenceClass::Archive),
            (1, PrecedenceClass::CreateAndLink),
            (0, PrecedenceClass::CreateAndLink),
        ]
    );

    let update = &plan.steps[3];
    assert_eq!(update.request.operation, ChangeOperation::Update);
    assert_eq!(update.after, vec![1]);
    assert_eq!(
        update.resolved_dependencies[0].source,
        DependencySource::Created { request: 1 }
    );

    let json = serde_json::to_value(&plan).unwrap();
    assert_eq!(json["steps"][0]["request"]["operation"], "delete");
}

#[test]
fn test_change_list_referencing_a_deleted_entity_is_rejected() {
    let dir = tempdir().unwrap();
    write_export_dir(dir.path());
    let graph = graph_from(dir.path());

    let requests = parse_change_list(
        r#"
- operation: delete
  target: orders
- operation: update
  target: summary
  payload:
    dataset_query: {query: {source-table: orders}}
"#,
    )
    .unwrap();
    let plan = plan_changes(&graph, &requests, &PlanConfig::default()).unwrap();

    assert_eq!(plan.steps.len(), 1);
    assert_eq!(plan.rejected[0].index, 1);
    assert_eq!(plan.summary().error_count, 1);
}
