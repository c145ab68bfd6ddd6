//! Graph build E2E tests

use metabase_serdes_graph::*;
use metabase_serdes_ingest::{read_export, ReadOptions};
use metabase_serdes_model::{ArchiveMember, Diagnostic, EntityId, EntityKind, MemberDocument};
use serde_json::{json, Value};
use std::fs;
use tempfile::tempdir;

fn parsed(path: &str, doc: Value) -> ArchiveMember {
    ArchiveMember::parsed(path, doc)
}

fn database(name: &str) -> ArchiveMember {
    parsed(
        &format!("databases/{name}/{name}.yaml"),
        json!({"name": name, "serdes/meta": [{"model": "Database", "id": name}]}),
    )
}

fn table(db: &str, schema: &str, name: &str) -> ArchiveMember {
    parsed(
        &format!("databases/{db}/schemas/{schema}/tables/{name}/{name}.yaml"),
        json!({
            "name": name,
            "db_id": db,
            "serdes/meta": [
                {"model": "Database", "id": db},
                {"model": "Schema", "id": schema},
                {"model": "Table", "id": name},
            ],
        }),
    )
}

fn collection(id: &str, parent: Option<&str>) -> ArchiveMember {
    parsed(
        &format!("collections/{id}/{id}.yaml"),
        json!({
            "name": id,
            "entity_id": id,
            "parent_id": parent,
            "serdes/meta": [{"model": "Collection", "id": id}],
        }),
    )
}

fn card(id: &str, collection: &str, source_table: Value) -> ArchiveMember {
    parsed(
        &format!("collections/{collection}/cards/{id}.yaml"),
        json!({
            "name": id,
            "entity_id": id,
            "collection_id": collection,
            "database_id": "Sample",
            "dataset_query": {"database": "Sample", "query": {"source-table": source_table}},
            "serdes/meta": [{"model": "Card", "id": id}],
        }),
    )
}

fn sample_export() -> Vec<ArchiveMember> {
    vec![
        ArchiveMember::directory("collections"),
        ArchiveMember::file("settings.yaml", MemberDocument::Parsed(json!({"a": 1}))),
        database("Sample"),
        table("Sample", "PUBLIC", "ORDERS"),
        collection("root", None),
        collection("sub", Some("root")),
        card("c1", "sub", json!(["Sample", "PUBLIC", "ORDERS"])),
        card("c2", "sub", json!("c1")),
    ]
}

fn build(members: &[ArchiveMember]) -> ExportGraph {
    ExportGraph::build(members, &GraphConfig::default()).unwrap()
}

// ============================================================================
// Build Tests
// ============================================================================

#[test]
fn test_build_indexes_every_entity() {
    let graph = build(&sample_export());

    assert_eq!(graph.stats.members, 8);
    assert_eq!(graph.stats.directories, 1);
    assert_eq!(graph.stats.skipped, 1);
    assert_eq!(graph.stats.entities, 6);
    assert_eq!(graph.stats.dangling, 0);
    assert!(graph.diagnostics.is_empty(), "{:?}", graph.diagnostics);

    let orders = graph
        .get(&EntityId::path(["Sample", "PUBLIC", "ORDERS"]))
        .unwrap();
    assert_eq!(orders.kind, EntityKind::Table);
    assert_eq!(orders.attributes.name.as_deref(), Some("ORDERS"));

    // The schema level has no document and is external, not dangling.
    assert_eq!(
        graph.resolve(&EntityId::path(["Sample", "PUBLIC"])),
        Resolution::External
    );
}

#[test]
fn test_source_table_routes_by_shape() {
    let graph = build(&sample_export());

    let c1 = graph.outgoing(&EntityId::id("c1"));
    let to_table = c1
        .iter()
        .find(|r| r.label == "dataset_query.query.source-table")
        .unwrap();
    assert!(to_table.target.is_path());
    assert_eq!(
        graph.index.get_by_path(to_table.target.as_path().unwrap()).unwrap().kind,
        EntityKind::Table
    );

    let c2 = graph.outgoing(&EntityId::id("c2"));
    let to_card = c2
        .iter()
        .find(|r| r.label == "dataset_query.query.source-table")
        .unwrap();
    assert_eq!(to_card.target, EntityId::id("c1"));
    assert_eq!(
        graph.index.get_by_id("c1").unwrap().kind,
        EntityKind::Card
    );
}

#[test]
fn test_inbound_reference_round_trip() {
    let graph = build(&sample_export());

    let incoming = graph.incoming(&EntityId::id("root"));
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].label, "parent_id");
    assert_eq!(incoming[0].source_id, EntityId::id("sub"));
    assert_eq!(incoming[0].source_path, "collections/sub/sub.yaml");
}

#[test]
fn test_dashboard_with_virtual_card_yields_two_references() {
    let dashboard = parsed(
        "collections/root/dashboards/d1.yaml",
        json!({
            "name": "Overview",
            "entity_id": "d1",
            "dashcards": [
                {
                    "card_id": null,
                    "visualization_settings": {"virtual_card": {"display": "text"}, "text": "# Hi"},
                    "parameter_mappings": [],
                },
                {
                    "card_id": "c1",
                    "visualization_settings": {},
                    "parameter_mappings": [{"parameter_id": "p1", "action_id": "a1"}],
                },
            ],
            "serdes/meta": [{"model": "Dashboard", "id": "d1"}],
        }),
    );
    let graph = build(&[dashboard]);

    let refs = graph.outgoing(&EntityId::id("d1"));
    let labels: Vec<&str> = refs.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "dashboard.dashcards[1].card_id",
            "dashboard.dashcards[1].parameter_mappings[0].action_id",
        ]
    );
    assert_eq!(refs[0].target, EntityId::id("c1"));
    assert_eq!(refs[1].target, EntityId::id("a1"));
}

#[test]
fn test_rebuild_is_identical() {
    let members = sample_export();
    let first = build(&members);
    let second = build(&members);

    let a: Vec<&EntityRecord> = first.index.records().collect();
    let b: Vec<&EntityRecord> = second.index.records().collect();
    assert_eq!(a, b);
    assert_eq!(first.diagnostics, second.diagnostics);
}

#[test]
fn test_serial_and_parallel_builds_agree() {
    let members = sample_export();
    let serial = ExportGraph::build(
        &members,
        &GraphConfig {
            parallel: false,
            ..GraphConfig::default()
        },
    )
    .unwrap();
    let parallel = build(&members);

    assert_eq!(
        serial.index.records().collect::<Vec<_>>(),
        parallel.index.records().collect::<Vec<_>>()
    );
}

// ============================================================================
// Diagnostics Tests
// ============================================================================

#[test]
fn test_duplicate_id_keeps_first_registration() {
    let mut members = sample_export();
    let mut clash = card("c1", "root", json!(["Sample", "PUBLIC", "ORDERS"]));
    clash.path = "collections/root/cards/c1-copy.yaml".to_string();
    members.push(clash);

    let graph = build(&members);
    assert_eq!(graph.stats.duplicates, 1);

    let dup = graph
        .diagnostics
        .iter()
        .find(|d| d.code() == "duplicate_entity_id")
        .unwrap();
    assert!(dup.is_error());
    assert_eq!(
        dup.paths(),
        vec!["collections/sub/cards/c1.yaml", "collections/root/cards/c1-copy.yaml"]
    );

    let c1 = graph.get(&EntityId::id("c1")).unwrap();
    assert_eq!(c1.source_path.as_deref(), Some("collections/sub/cards/c1.yaml"));
    // The losing document contributed no references.
    assert!(graph
        .incoming(&EntityId::id("root"))
        .iter()
        .all(|r| r.source_path != "collections/root/cards/c1-copy.yaml"));
}

#[test]
fn test_missing_target_is_dangling() {
    let members = vec![card("c9", "nowhere", json!(["Sample", "PUBLIC", "ORDERS"]))];
    let graph = build(&members);

    let dangling: Vec<&Diagnostic> = graph
        .diagnostics
        .iter()
        .filter(|d| d.code() == "dangling_reference")
        .collect();
    // collection_id, database_id, dataset_query.database, source-table
    assert_eq!(dangling.len(), 4);
    assert_eq!(graph.resolve(&EntityId::id("nowhere")), Resolution::Dangling);
    assert_eq!(graph.stats.dangling, 4);
}

#[test]
fn test_configured_external_ids_are_not_dangling() {
    let members = vec![card("c9", "nowhere", json!(["Sample", "PUBLIC", "ORDERS"]))];
    let config = GraphConfig {
        external_ids: vec![
            EntityId::id("nowhere"),
            EntityId::id("Sample"),
            EntityId::path(["Sample", "PUBLIC", "ORDERS"]),
        ],
        ..GraphConfig::default()
    };
    let graph = ExportGraph::build(&members, &config).unwrap();
    assert!(graph.diagnostics.is_empty(), "{:?}", graph.diagnostics);
    assert_eq!(graph.stats.external, 3);
}

#[test]
fn test_parse_failures_are_skipped_or_abort() {
    let mut members = sample_export();
    members.push(ArchiveMember::file(
        "collections/broken.yaml",
        MemberDocument::ParseError("did not find expected node content".into()),
    ));

    let graph = build(&members);
    assert_eq!(graph.skipped.len(), 1);
    assert_eq!(graph.skipped[0].path, "collections/broken.yaml");
    assert_eq!(graph.stats.entities, 6);
    assert!(graph
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::ParseFailure { .. })));

    let config = GraphConfig {
        fail_fast: true,
        ..GraphConfig::default()
    };
    let err = ExportGraph::build(&members, &config).unwrap_err();
    assert!(err.to_string().contains("collections/broken.yaml"));
}

#[test]
fn test_unknown_kind_is_still_resolvable() {
    let members = vec![
        parsed(
            "pulses/p1.yaml",
            json!({"serdes/meta": [{"model": "Pulse", "id": "p1"}]}),
        ),
        parsed(
            "collections/x.yaml",
            json!({"parent_id": "p1", "serdes/meta": [{"model": "Collection", "id": "x"}]}),
        ),
    ];
    let graph = build(&members);

    assert_eq!(graph.get(&EntityId::id("p1")).unwrap().kind, EntityKind::Unknown);
    assert_eq!(graph.resolve(&EntityId::id("p1")), Resolution::Registered);
    assert!(graph
        .diagnostics
        .iter()
        .all(|d| d.code() == "unknown_entity_kind"));
}

// ============================================================================
// Ingest Tests
// ============================================================================

#[test]
fn test_build_from_extracted_directory() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("export");
    fs::create_dir_all(root.join("collections/root")).unwrap();
    fs::write(root.join("settings.yaml"), "site-name: Metabase\n").unwrap();
    fs::write(
        root.join("collections/root/root.yaml"),
        "name: Root\nentity_id: root\nparent_id: null\nserdes/meta:\n- id: root\n  model: Collection\n",
    )
    .unwrap();
    fs::write(
        root.join("collections/root/timeline.yaml"),
        "name: Launches\ncollection_id: root\nserdes/meta:\n- id: tl1\n  model: Timeline\n",
    )
    .unwrap();

    let members = read_export(&root, &ReadOptions::default()).unwrap();
    let graph = build(&members);

    assert_eq!(graph.stats.entities, 2);
    let incoming = graph.incoming(&EntityId::id("root"));
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].source_kind, EntityKind::Timeline);
    assert_eq!(incoming[0].source_path, "collections/root/timeline.yaml");
}

#[test]
fn test_blank_documents_get_distinct_synthesized_ids() {
    let members = vec![
        ArchiveMember::file("a/empty.yaml", MemberDocument::Empty),
        ArchiveMember::file("b/empty.yaml", MemberDocument::Empty),
        ArchiveMember::file("settings.yaml", MemberDocument::Empty),
    ];
    let graph = build(&members);

    assert_eq!(graph.stats.entities, 2);
    assert_eq!(graph.stats.duplicates, 0);
    assert_eq!(graph.stats.skipped, 1);

    let records: Vec<&EntityRecord> = graph.index.registered().collect();
    assert_eq!(records.len(), 2);
    assert_ne!(records[0].id, records[1].id);
    assert!(records.iter().all(|r| r.synthesized_id && r.kind == EntityKind::Unknown));

    let missing: Vec<&str> = graph
        .diagnostics
        .iter()
        .filter_map(|d| match d {
            Diagnostic::MissingIdentity { path, .. } => Some(path.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(missing, vec!["a/empty.yaml", "b/empty.yaml"]);
}
