use kvmigrate::{
    ApplyParams, LocalEngine, MigrateConfig, MigrateError, MigrationEngine, Target,
};
use kvmigrate_storage::{LocalBackend, LocalStorageConfig, Table, TableStore};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn write_unit(dir: &TempDir, id: &str, body: &str) {
    let migrations = dir.path().join("migrations");
    fs::create_dir_all(&migrations).unwrap();
    fs::write(migrations.join(format!("{}.json", id)), body).unwrap();
}

fn setup(dir: &TempDir) -> (Arc<dyn TableStore>, LocalEngine) {
    let store: Arc<dyn TableStore> = Arc::new(Table::new(LocalBackend::new(
        LocalStorageConfig::new()
            .with_root_path(dir.path().join("data"))
            .with_table("app"),
    )));
    let config = MigrateConfig::new().with_migrations_dir(dir.path().join("migrations"));
    (store.clone(), LocalEngine::new(config, store))
}

#[tokio::test]
async fn test_declarative_units_on_local_table() {
    let dir = TempDir::new().unwrap();
    write_unit(
        &dir,
        "1.0.0",
        r#"{
            "description": "Create admin role",
            "up": [ { "op": "create", "collection": "Role", "item": { "pk": "admin" }, "exists": false } ],
            "down": [ { "op": "remove", "collection": "Role", "key": "admin" } ]
        }"#,
    );
    write_unit(
        &dir,
        "1.1.0",
        r#"{
            "description": "Label admin role",
            "up": [ { "op": "update", "collection": "Role", "key": "admin", "set": { "label": "Administrator" } } ],
            "down": [ { "op": "update", "collection": "Role", "key": "admin", "set": { "label": null } } ]
        }"#,
    );
    write_unit(&dir, "2.0.0", r#"{ "description": "Not yet", "enable": false }"#);
    fs::write(dir.path().join("migrations/README.md"), "notes").unwrap();

    let (store, engine) = setup(&dir);
    engine.init().await.unwrap();
    assert_eq!(
        engine.get_outstanding_versions(None).await.unwrap(),
        vec!["1.0.0", "1.1.0"]
    );

    let report = engine.apply(&Target::All, &ApplyParams::new()).await.unwrap();
    assert_eq!(report.versions(), vec!["1.0.0", "1.1.0"]);
    assert_eq!(report.steps[0].description, "Create admin role");
    assert!(report.steps[0].path.ends_with("1.0.0.json"));

    let role = store.get("Role", "admin").await.unwrap().unwrap();
    assert_eq!(role["label"], "Administrator");

    // the ledger survives a fresh engine over the same files
    let (_, reopened) = setup(&dir);
    assert_eq!(reopened.get_current_version().await.unwrap(), "1.1.0");
    let past = reopened.get_past_migrations().await.unwrap();
    assert_eq!(past.len(), 2);
    assert_eq!(past[1].description, "Label admin role");

    reopened
        .apply(&Target::Version("0.0.0".to_string()), &ApplyParams::new())
        .await
        .unwrap();
    assert!(store.get("Role", "admin").await.unwrap().is_none());
    assert_eq!(reopened.get_current_version().await.unwrap(), "0.0.0");
}

#[tokio::test]
async fn test_malformed_unit_is_a_load_error() {
    let dir = TempDir::new().unwrap();
    write_unit(&dir, "1.0.0", "{ not json");

    let (_, engine) = setup(&dir);
    // still listed so the failure surfaces when it is applied
    assert_eq!(
        engine.get_outstanding_versions(None).await.unwrap(),
        vec!["1.0.0"]
    );
    let err = engine.apply(&Target::Up, &ApplyParams::new()).await.unwrap_err();
    assert!(matches!(err, MigrateError::Load { .. }));
    assert!(engine.get_past_migrations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_directory_is_a_filesystem_error() {
    let dir = TempDir::new().unwrap();
    let (_, engine) = setup(&dir);
    let err = engine.init().await.unwrap_err();
    assert!(matches!(err, MigrateError::Filesystem { .. }));
}
