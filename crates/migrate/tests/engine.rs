use async_trait::async_trait;
use kvmigrate::{
    Action, ApplyParams, LocalEngine, MigrateConfig, MigrateError, MigrationEngine,
    MigrationTask, NoopReason, RegistryLoader, Target,
};
use kvmigrate_storage::{item, MemoryBackend, TableStore, WriteOptions};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Journal = Arc<Mutex<Vec<String>>>;

/// Registry unit that journals its calls and can be switched to fail
struct Journaled {
    id: &'static str,
    journal: Journal,
    failing: Arc<AtomicBool>,
}

#[async_trait]
impl MigrationTask for Journaled {
    fn description(&self) -> &str {
        self.id
    }

    async fn up(
        &self,
        store: &dyn TableStore,
        _engine: &dyn MigrationEngine,
        params: &ApplyParams,
    ) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("{} exploded", self.id);
        }
        self.journal.lock().unwrap().push(format!("up {}", self.id));
        if !params.dry {
            store
                .create("Schema", item(json!({ "pk": self.id })), WriteOptions::new())
                .await?;
        }
        Ok(())
    }

    async fn down(
        &self,
        store: &dyn TableStore,
        _engine: &dyn MigrationEngine,
        params: &ApplyParams,
    ) -> anyhow::Result<()> {
        self.journal.lock().unwrap().push(format!("down {}", self.id));
        if !params.dry {
            store.remove("Schema", self.id).await?;
        }
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryBackend>,
    engine: LocalEngine,
    journal: Journal,
    switches: Vec<(&'static str, Arc<AtomicBool>)>,
}

impl Harness {
    fn new(ids: &[&'static str]) -> Self {
        let store = Arc::new(MemoryBackend::default());
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut switches = Vec::new();
        let mut loader = RegistryLoader::new();
        for id in ids {
            let failing = Arc::new(AtomicBool::new(false));
            switches.push((*id, failing.clone()));
            loader = loader.register(
                *id,
                Journaled {
                    id: *id,
                    journal: journal.clone(),
                    failing,
                },
            );
        }
        let engine = LocalEngine::new(MigrateConfig::default(), store.clone()).with_loader(loader);
        Self {
            store,
            engine,
            journal,
            switches,
        }
    }

    fn fail(&self, id: &str, failing: bool) {
        for (name, switch) in &self.switches {
            if *name == id {
                switch.store(failing, Ordering::SeqCst);
            }
        }
    }

    fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().drain(..).collect()
    }

    async fn apply(&self, target: &str, params: ApplyParams) -> Result<Vec<String>, MigrateError> {
        let report = self.engine.apply(&target.parse()?, &params).await?;
        Ok(report.versions().into_iter().map(str::to_string).collect())
    }

    async fn ledger(&self) -> Vec<(String, bool)> {
        self.engine
            .get_past_migrations()
            .await
            .unwrap()
            .into_iter()
            .map(|record| {
                let failed = record.is_failed();
                (record.version, failed)
            })
            .collect()
    }
}

const CATALOG: &[&str] = &["1.0.0", "1.1.0", "2.0.0"];

#[tokio::test]
async fn test_fresh_table_has_everything_outstanding() {
    let h = Harness::new(CATALOG);
    h.engine.init().await.unwrap();
    assert_eq!(h.engine.get_current_version().await.unwrap(), "0.0.0");
    assert_eq!(
        h.engine.get_outstanding_versions(None).await.unwrap(),
        vec!["1.0.0", "1.1.0", "2.0.0"]
    );
    assert_eq!(
        h.engine.get_outstanding_versions(Some(2)).await.unwrap(),
        vec!["1.0.0", "1.1.0"]
    );
}

#[tokio::test]
async fn test_upgrade_to_target_version() {
    let h = Harness::new(CATALOG);
    assert_eq!(h.apply("up", ApplyParams::new()).await.unwrap(), vec!["1.0.0"]);

    let applied = h.apply("2.0.0", ApplyParams::new()).await.unwrap();
    assert_eq!(applied, vec!["1.1.0", "2.0.0"]);
    assert_eq!(h.engine.get_current_version().await.unwrap(), "2.0.0");
    assert!(h.engine.get_outstanding_versions(None).await.unwrap().is_empty());
    assert_eq!(h.journal(), vec!["up 1.0.0", "up 1.1.0", "up 2.0.0"]);

    let report = h
        .engine
        .apply(&Target::Version("2.0.0".to_string()), &ApplyParams::new())
        .await
        .unwrap();
    assert!(report.steps.is_empty());
    assert_eq!(
        report.noop,
        Some(NoopReason::AlreadyApplied {
            version: "2.0.0".to_string()
        })
    );
}

#[tokio::test]
async fn test_failure_halts_and_is_recorded() {
    let h = Harness::new(CATALOG);
    h.fail("1.1.0", true);

    let err = h.apply("all", ApplyParams::new()).await.unwrap_err();
    match &err {
        MigrateError::Execution {
            version,
            action,
            applied,
            message,
        } => {
            assert_eq!(version, "1.1.0");
            assert_eq!(*action, Action::Up);
            assert_eq!(applied, &vec!["1.0.0".to_string()]);
            assert!(message.contains("1.1.0 exploded"));
        }
        other => panic!("unexpected error: {}", other),
    }

    // 2.0.0 never ran
    assert_eq!(h.journal(), vec!["up 1.0.0"]);
    assert_eq!(
        h.ledger().await,
        vec![("1.0.0".to_string(), false), ("1.1.0".to_string(), true)]
    );
    assert_eq!(h.engine.get_current_version().await.unwrap(), "1.0.0");
    assert_eq!(
        h.engine.get_outstanding_versions(None).await.unwrap(),
        vec!["2.0.0"]
    );
}

#[tokio::test]
async fn test_retry_failed_then_next_version() {
    let h = Harness::new(CATALOG);
    h.fail("1.1.0", true);
    h.apply("all", ApplyParams::new()).await.unwrap_err();
    h.fail("1.1.0", false);
    h.journal();

    let plan = h
        .engine
        .plan(&Target::Up, &ApplyParams::new().retry_failed())
        .await
        .unwrap();
    let steps: Vec<(&str, Action)> = plan
        .steps
        .iter()
        .map(|step| (step.version.as_str(), step.action))
        .collect();
    assert_eq!(steps, vec![("1.1.0", Action::Retry), ("2.0.0", Action::Up)]);

    let applied = h.apply("up", ApplyParams::new().retry_failed()).await.unwrap();
    assert_eq!(applied, vec!["1.1.0", "2.0.0"]);
    assert_eq!(h.journal(), vec!["up 1.1.0", "up 2.0.0"]);

    // retried record is overwritten in place
    assert_eq!(
        h.ledger().await,
        vec![
            ("1.0.0".to_string(), false),
            ("1.1.0".to_string(), false),
            ("2.0.0".to_string(), false)
        ]
    );
}

#[tokio::test]
async fn test_downgrade_reverts_newest_first() {
    let h = Harness::new(CATALOG);
    h.apply("all", ApplyParams::new()).await.unwrap();
    h.journal();

    let reverted = h.apply("1.0.0", ApplyParams::new()).await.unwrap();
    assert_eq!(reverted, vec!["2.0.0", "1.1.0"]);
    assert_eq!(h.journal(), vec!["down 2.0.0", "down 1.1.0"]);
    assert_eq!(h.ledger().await, vec![("1.0.0".to_string(), false)]);
    assert_eq!(h.engine.get_current_version().await.unwrap(), "1.0.0");

    let err = h.apply("0.9.0", ApplyParams::new()).await.unwrap_err();
    assert!(matches!(err, MigrateError::TargetNotFound { .. }));
}

#[tokio::test]
async fn test_up_down_round_trip() {
    let h = Harness::new(CATALOG);
    h.apply("1.0.0", ApplyParams::new()).await.unwrap();
    let ledger_before = h.ledger().await;
    let outstanding_before = h.engine.get_outstanding_versions(None).await.unwrap();

    assert_eq!(h.apply("up", ApplyParams::new()).await.unwrap(), vec!["1.1.0"]);
    assert!(h.store.get("Schema", "1.1.0").await.unwrap().is_some());
    assert_eq!(h.apply("down", ApplyParams::new()).await.unwrap(), vec!["1.1.0"]);

    assert_eq!(h.ledger().await, ledger_before);
    assert_eq!(
        h.engine.get_outstanding_versions(None).await.unwrap(),
        outstanding_before
    );
    assert!(h.store.get("Schema", "1.1.0").await.unwrap().is_none());
}

#[tokio::test]
async fn test_dry_run_resolves_without_recording() {
    let h = Harness::new(CATALOG);
    let report = h
        .engine
        .apply(&Target::All, &ApplyParams::new().dry())
        .await
        .unwrap();
    assert!(report.dry);
    assert_eq!(report.versions(), vec!["1.0.0", "1.1.0", "2.0.0"]);
    // units still ran with the dry flag
    assert_eq!(h.journal().len(), 3);
    assert!(h.ledger().await.is_empty());
    assert!(h.store.is_empty("Schema"));
}

#[tokio::test]
async fn test_repeat_reruns_latest_entry() {
    let h = Harness::new(CATALOG);
    h.apply("1.1.0", ApplyParams::new()).await.unwrap();
    h.journal();

    assert_eq!(h.apply("repeat", ApplyParams::new()).await.unwrap(), vec!["1.1.0"]);
    assert_eq!(h.journal(), vec!["up 1.1.0"]);
    assert_eq!(h.ledger().await.len(), 2);
}

#[tokio::test]
async fn test_named_migration_is_recorded_for_history() {
    let h = Harness::new(&["1.0.0", "2.0.0", "seed-users"]);
    assert_eq!(
        h.engine.get_named_migrations().await.unwrap(),
        vec!["seed-users"]
    );

    h.apply("2.0.0", ApplyParams::new()).await.unwrap();
    assert_eq!(
        h.apply("seed-users", ApplyParams::new()).await.unwrap(),
        vec!["seed-users"]
    );

    let ledger = h.ledger().await;
    assert_eq!(ledger.last(), Some(&("seed-users".to_string(), false)));
    // named entries never move the version
    assert_eq!(h.engine.get_current_version().await.unwrap(), "2.0.0");

    let err = h.apply("unknown-task", ApplyParams::new()).await.unwrap_err();
    assert!(matches!(err, MigrateError::TargetNotFound { .. }));
}

#[tokio::test]
async fn test_reset_through_reset_unit() {
    let h = Harness::new(&["1.0.0", "1.1.0", "2.0.0", "latest"]);
    h.apply("1.0.0", ApplyParams::new()).await.unwrap();
    h.journal();

    let report = h
        .engine
        .apply(&Target::Reset, &ApplyParams::new())
        .await
        .unwrap();
    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].action, Action::Reset);
    assert_eq!(report.current, "2.0.0");
    assert_eq!(h.journal(), vec!["up latest"]);
    assert_eq!(h.ledger().await, vec![("2.0.0".to_string(), false)]);
}

#[tokio::test]
async fn test_reset_replays_catalog_without_reset_unit() {
    let h = Harness::new(CATALOG);
    h.apply("1.1.0", ApplyParams::new()).await.unwrap();
    h.journal();

    let applied = h.apply("reset", ApplyParams::new()).await.unwrap();
    assert_eq!(applied, vec!["1.0.0", "1.1.0", "2.0.0"]);
    assert_eq!(h.journal(), vec!["up 1.0.0", "up 1.1.0", "up 2.0.0"]);
    assert_eq!(h.ledger().await.len(), 3);
    assert_eq!(h.engine.get_current_version().await.unwrap(), "2.0.0");
}

#[tokio::test]
async fn test_tie_break_by_order() {
    let h = Harness::new(CATALOG);
    let records = [("1.0.0+b", 2), ("1.0.0+a", 1)];
    for (version, order) in records {
        h.store
            .create(
                "_migrations",
                item(json!({
                    "pk": version,
                    "version": version,
                    "description": "tie",
                    "date": "2024-01-01T00:00:00Z",
                    "path": "tie.json",
                    "order": order
                })),
                WriteOptions::if_absent(),
            )
            .await
            .unwrap();
    }

    let past = h.engine.get_past_migrations().await.unwrap();
    let orders: Vec<Option<i64>> = past.iter().map(|record| record.order).collect();
    assert_eq!(orders, vec![Some(1), Some(2)]);
}
