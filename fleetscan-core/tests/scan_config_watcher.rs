mod support;

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use fleetscan_core::backend::{ListParams, MemoryBackend, ScanFilter, StateBackend};
use fleetscan_core::controllers::{ScanConfigReconcileEvent, ScanConfigWatcher};
use fleetscan_core::models::{
    Reference, RuntimeSchedule, Scan, ScanConfig, ScanConfigId, ScanState, ScanTemplate,
};
use fleetscan_core::orchestration::{ControllerConfig, ItemSource, Reconcile};

use support::eventually;

fn watcher(backend: &Arc<MemoryBackend>) -> Arc<ScanConfigWatcher> {
    Arc::new(ScanConfigWatcher::new(
        backend.clone(),
        ControllerConfig::default(),
    ))
}

fn event(id: &str) -> ScanConfigReconcileEvent {
    ScanConfigReconcileEvent {
        scan_config_id: ScanConfigId::from(id),
    }
}

fn nightly(operation_time: DateTime<Utc>, repeat_interval_secs: Option<u64>) -> ScanConfig {
    ScanConfig {
        name: Some("nightly".to_string()),
        scheduled: Some(RuntimeSchedule {
            operation_time: Some(operation_time),
            repeat_interval_secs,
        }),
        scan_template: Some(ScanTemplate {
            scope: Some("VMInfo".to_string()),
            timeout_seconds: Some(7_200),
        }),
        ..ScanConfig::default()
    }
}

async fn seed_config(backend: &MemoryBackend, id: &str, scan_config: ScanConfig) {
    backend
        .create_scan_config(&ScanConfig {
            id: Some(ScanConfigId::from(id)),
            ..scan_config
        })
        .await
        .unwrap();
}

async fn scans_of(backend: &MemoryBackend, id: &str) -> Vec<Scan> {
    backend
        .list_scans(&ListParams::filtered(ScanFilter::ForConfig(
            ScanConfigId::from(id),
        )))
        .await
        .unwrap()
}

async fn config(backend: &MemoryBackend, id: &str) -> ScanConfig {
    backend
        .get_scan_config(&ScanConfigId::from(id))
        .await
        .unwrap()
}

#[tokio::test]
async fn due_config_creates_pending_scan_from_template() {
    let backend = Arc::new(MemoryBackend::new());
    let operation_time = DateTime::parse_from_rfc3339("2024-03-01T02:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    seed_config(&backend, "cfg-1", nightly(operation_time, None)).await;

    watcher(&backend).reconcile(&event("cfg-1")).await.unwrap();

    let scans = scans_of(&backend, "cfg-1").await;
    assert_eq!(scans.len(), 1);
    let scan = &scans[0];
    assert!(scan.id.is_some());
    assert_eq!(scan.name.as_deref(), Some("nightly-20240301020000"));
    assert_eq!(scan.state, Some(ScanState::Pending));
    assert_eq!(scan.scope.as_deref(), Some("VMInfo"));
    assert_eq!(scan.timeout_seconds, Some(7_200));
}

#[tokio::test]
async fn one_shot_config_is_unscheduled_after_firing() {
    let backend = Arc::new(MemoryBackend::new());
    seed_config(
        &backend,
        "cfg-1",
        nightly(Utc::now() - TimeDelta::minutes(1), None),
    )
    .await;
    let watcher = watcher(&backend);

    watcher.reconcile(&event("cfg-1")).await.unwrap();

    assert_eq!(config(&backend, "cfg-1").await.operation_time(), None);
    assert!(watcher.get_items().await.unwrap().is_empty());

    // Rediscovered anyway: nothing is due, nothing is created.
    watcher.reconcile(&event("cfg-1")).await.unwrap();
    assert_eq!(scans_of(&backend, "cfg-1").await.len(), 1);
}

#[tokio::test]
async fn repeating_config_is_rescheduled_into_the_future() {
    let backend = Arc::new(MemoryBackend::new());
    let operation_time = Utc::now() - TimeDelta::seconds(90);
    seed_config(&backend, "cfg-1", nightly(operation_time, Some(3_600))).await;

    watcher(&backend).reconcile(&event("cfg-1")).await.unwrap();

    let next = config(&backend, "cfg-1").await.operation_time().unwrap();
    assert_eq!(next, operation_time + TimeDelta::seconds(3_600));
    assert!(next > Utc::now());
    assert_eq!(scans_of(&backend, "cfg-1").await.len(), 1);
}

#[tokio::test]
async fn out_of_range_interval_fails_without_touching_anything() {
    let backend = Arc::new(MemoryBackend::new());
    let operation_time = Utc::now() - TimeDelta::seconds(10);
    seed_config(
        &backend,
        "cfg-1",
        nightly(operation_time, Some(9_000_000_000_000)),
    )
    .await;

    let err = watcher(&backend)
        .reconcile(&event("cfg-1"))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("failed to reschedule scan config cfg-1"));
    assert!(scans_of(&backend, "cfg-1").await.is_empty());
    assert_eq!(
        config(&backend, "cfg-1").await.operation_time(),
        Some(operation_time)
    );
}

#[tokio::test]
async fn running_scan_blocks_a_new_one() {
    let backend = Arc::new(MemoryBackend::new());
    seed_config(
        &backend,
        "cfg-1",
        nightly(Utc::now() - TimeDelta::minutes(1), Some(86_400)),
    )
    .await;
    backend
        .create_scan(&Scan {
            name: Some("still-running".to_string()),
            scan_config: Some(Reference::new(ScanConfigId::from("cfg-1"))),
            state: Some(ScanState::InProgress),
            start_time: Some(Utc::now() - TimeDelta::hours(3)),
            ..Scan::default()
        })
        .await
        .unwrap();

    watcher(&backend).reconcile(&event("cfg-1")).await.unwrap();

    let scans = scans_of(&backend, "cfg-1").await;
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].name.as_deref(), Some("still-running"));
    assert!(config(&backend, "cfg-1").await.operation_time().unwrap() > Utc::now());
}

#[tokio::test]
async fn disabled_or_future_configs_are_left_alone() {
    let backend = Arc::new(MemoryBackend::new());
    let due = Utc::now() - TimeDelta::minutes(1);
    seed_config(
        &backend,
        "cfg-disabled",
        ScanConfig {
            disabled: Some(true),
            ..nightly(due, None)
        },
    )
    .await;
    let later = Utc::now() + TimeDelta::hours(1);
    seed_config(&backend, "cfg-later", nightly(later, None)).await;
    seed_config(
        &backend,
        "cfg-unscheduled",
        ScanConfig {
            scheduled: None,
            ..nightly(due, None)
        },
    )
    .await;
    let watcher = watcher(&backend);

    for id in ["cfg-disabled", "cfg-later", "cfg-unscheduled"] {
        watcher.reconcile(&event(id)).await.unwrap();
        assert!(scans_of(&backend, id).await.is_empty(), "{id}");
    }
    assert_eq!(config(&backend, "cfg-disabled").await.operation_time(), Some(due));
    assert_eq!(config(&backend, "cfg-later").await.operation_time(), Some(later));
}

#[tokio::test]
async fn discovery_returns_only_due_enabled_configs() {
    let backend = Arc::new(MemoryBackend::new());
    let due = Utc::now() - TimeDelta::minutes(1);
    seed_config(&backend, "cfg-due", nightly(due, None)).await;
    seed_config(
        &backend,
        "cfg-explicitly-enabled",
        ScanConfig {
            disabled: Some(false),
            ..nightly(due, None)
        },
    )
    .await;
    seed_config(
        &backend,
        "cfg-disabled",
        ScanConfig {
            disabled: Some(true),
            ..nightly(due, None)
        },
    )
    .await;
    seed_config(
        &backend,
        "cfg-later",
        nightly(Utc::now() + TimeDelta::hours(1), None),
    )
    .await;

    let mut items = watcher(&backend).get_items().await.unwrap();
    items.sort_by(|a, b| a.scan_config_id.cmp(&b.scan_config_id));
    assert_eq!(items, vec![event("cfg-due"), event("cfg-explicitly-enabled")]);
}

#[tokio::test]
async fn controller_starts_scan_for_due_config() {
    let backend = Arc::new(MemoryBackend::new());
    seed_config(
        &backend,
        "cfg-1",
        nightly(Utc::now() - TimeDelta::seconds(5), None),
    )
    .await;
    let watcher = Arc::new(ScanConfigWatcher::new(
        backend.clone(),
        support::fast_controller(),
    ));
    let shutdown = CancellationToken::new();
    let handle = watcher.start(shutdown.clone());

    let probe = backend.clone();
    eventually("a scan to be created for cfg-1", || {
        let probe = probe.clone();
        async move { scans_of(&probe, "cfg-1").await.len() == 1 }
    })
    .await;

    shutdown.cancel();
    handle.join(std::time::Duration::from_secs(1)).await;
    assert_eq!(scans_of(&backend, "cfg-1").await.len(), 1);
}
