use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn metabase_serdes_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_metabase-serdes"))
}

fn run(args: &[&str]) -> Output {
    Command::new(metabase_serdes_bin())
        .args(args)
        .args(["--log-level", "error"])
        .output()
        .expect("run metabase-serdes")
}

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

/// A database with one table, a collection, a card over the table and a
/// dashboard showing the card plus one that no longer exists.
fn sample_export() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(
        root,
        "databases/Sample/Sample.yaml",
        "name: Sample\nserdes/meta:\n  - model: Database\n    id: Sample\n",
    );
    write(
        root,
        "databases/Sample/schemas/PUBLIC/tables/ORDERS/ORDERS.yaml",
        "name: ORDERS\ndb_id: Sample\nserdes/meta:\n  - model: Database\n    id: Sample\n  - model: Schema\n    id: PUBLIC\n  - model: Table\n    id: ORDERS\n",
    );
    write(
        root,
        "collections/root/root.yaml",
        "name: Root\nentity_id: root\nserdes/meta:\n  - model: Collection\n    id: root\n",
    );
    write(
        root,
        "collections/root/cards/c1.yaml",
        "name: Orders\nentity_id: c1\ncollection_id: root\ndatabase_id: Sample\ndataset_query:\n  database: Sample\n  query:\n    source-table: [Sample, PUBLIC, ORDERS]\nserdes/meta:\n  - model: Card\n    id: c1\n",
    );
    write(
        root,
        "collections/root/dashboards/d1.yaml",
        "name: Overview\nentity_id: d1\ncollection_id: root\ndashcards:\n  - card_id: c1\n    parameter_mappings: []\n  - card_id: gone\n    parameter_mappings: []\nserdes/meta:\n  - model: Dashboard\n    id: d1\n",
    );
    write(root, "settings.yaml", "site-name: Example\n");
    dir
}

// ============================================================================
// index
// ============================================================================

#[test]
fn test_index_json_reports_entities_and_dangling() {
    let export = sample_export();
    let out = run(&["index", export.path().to_str().unwrap(), "--format", "json"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["stats"]["entities"], 5);
    assert_eq!(report["stats"]["dangling"], 1);
    assert!(report["generated_at"].is_string());
    assert!(report["diagnostics"]
        .as_array()
        .unwrap()
        .iter()
        .any(|d| d.to_string().contains("gone")));
}

#[test]
fn test_index_writes_report_file() {
    let export = sample_export();
    let out_dir = tempfile::tempdir().unwrap();
    let out_file = out_dir.path().join("index.txt");
    let out = run(&[
        "index",
        export.path().to_str().unwrap(),
        "--out",
        out_file.to_str().unwrap(),
    ]);
    assert!(out.status.success());
    let text = fs::read_to_string(out_file).unwrap();
    assert!(text.contains("5 entities"));
    assert!(!text.contains('\u{1b}'));
}

#[test]
fn test_index_missing_export_fails() {
    let out = run(&["index", "/definitely/not/here"]);
    assert!(!out.status.success());
}

// ============================================================================
// refs
// ============================================================================

#[test]
fn test_refs_accepts_path_ids() {
    let export = sample_export();
    let out = run(&[
        "refs",
        export.path().to_str().unwrap(),
        r#"["Sample","PUBLIC","ORDERS"]"#,
        "--format",
        "json",
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["resolution"], "registered");
    assert_eq!(report["incoming"][0]["source_id"], "c1");
}

#[test]
fn test_refs_unknown_id_fails() {
    let export = sample_export();
    let out = run(&["refs", export.path().to_str().unwrap(), "nope"]);
    assert!(!out.status.success());
}

// ============================================================================
// plan
// ============================================================================

#[test]
fn test_plan_writes_change_plan_json() {
    let export = sample_export();
    let work = tempfile::tempdir().unwrap();
    let changes = work.path().join("changes.yaml");
    fs::write(
        &changes,
        "- operation: delete\n  target: c1\n- operation: delete\n  target: d1\n",
    )
    .unwrap();

    let out = run(&[
        "plan",
        export.path().to_str().unwrap(),
        changes.to_str().unwrap(),
        "--output-dir",
        work.path().to_str().unwrap(),
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let plan: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(work.path().join("change_plan.json")).unwrap())
            .unwrap();
    assert_eq!(plan["status"], "planned");
    let order: Vec<u64> = plan["plan"]["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["index"].as_u64().unwrap())
        .collect();
    assert_eq!(order, vec![1, 0]);
}

#[test]
fn test_plan_rejection_exits_non_zero() {
    let export = sample_export();
    let work = tempfile::tempdir().unwrap();
    let changes = work.path().join("changes.yaml");
    fs::write(
        &changes,
        r#"
- operation: create
  payload:
    database_id: Sample
    dataset_query: {query: {source-table: b}}
    serdes/meta: [{model: Card, id: a}]
- operation: create
  payload:
    database_id: Sample
    dataset_query: {query: {source-table: a}}
    serdes/meta: [{model: Card, id: b}]
"#,
    )
    .unwrap();

    let out = run(&[
        "plan",
        export.path().to_str().unwrap(),
        changes.to_str().unwrap(),
        "--output-dir",
        work.path().to_str().unwrap(),
    ]);
    assert!(!out.status.success());
    let plan: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(work.path().join("change_plan.json")).unwrap())
            .unwrap();
    assert_eq!(plan["status"], "rejected");
    assert_eq!(plan["rejection"]["requests"], serde_json::json!([0, 1]));
}

#[test]
fn test_plan_requires_existing_output_dir() {
    let export = sample_export();
    let work = tempfile::tempdir().unwrap();
    let changes = work.path().join("changes.yaml");
    fs::write(&changes, "[]").unwrap();
    let missing = work.path().join("missing");

    let out = run(&[
        "plan",
        export.path().to_str().unwrap(),
        changes.to_str().unwrap(),
        "--output-dir",
        missing.to_str().unwrap(),
    ]);
    assert!(!out.status.success());
    assert!(!missing.exists());
}

#[test]
fn test_plan_exclude_archived_flag() {
    let export = sample_export();
    write(
        export.path(),
        "collections/old/old.yaml",
        "name: Old\nentity_id: old\narchived: true\nserdes/meta:\n  - model: Collection\n    id: old\n",
    );
    let work = tempfile::tempdir().unwrap();
    let changes = work.path().join("changes.yaml");
    fs::write(
        &changes,
        "- operation: move\n  target: c1\n  payload:\n    collection_id: old\n",
    )
    .unwrap();
    let dir = work.path().to_str().unwrap();

    let out = run(&["plan", export.path().to_str().unwrap(), changes.to_str().unwrap(), "--output-dir", dir]);
    assert!(out.status.success());
    let plan: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(work.path().join("change_plan.json")).unwrap())
            .unwrap();
    assert_eq!(plan["plan"]["steps"].as_array().unwrap().len(), 1);

    let out = run(&[
        "plan",
        export.path().to_str().unwrap(),
        changes.to_str().unwrap(),
        "--output-dir",
        dir,
        "--exclude-archived",
    ]);
    assert!(out.status.success());
    let plan: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(work.path().join("change_plan.json")).unwrap())
            .unwrap();
    assert_eq!(plan["plan"]["rejected"][0]["index"], 0);
}
