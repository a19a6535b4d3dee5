//! End-to-end ingestion through the drop directory and the import gate.

mod common;

use serde_json::json;

use common::{events_body, roster_body, PrintEventBuilder, TestHarness};
use pagetally::cache::StatsCache;
use pagetally::config::{ImportToken, UnknownUserPolicy};
use pagetally::db::catalog_repo::{self, Table};
use pagetally::db::event_repo::{self, EventFilter};
use pagetally::db::{stats_repo, user_repo};
use pagetally::trigger::{respond, ImportGate};
use pagetally::watcher::FileOutcome;

fn processed_report(outcome: FileOutcome) -> pagetally::ImportReport {
    match outcome {
        FileOutcome::Processed { report, .. } => report,
        other => panic!("expected processed, got {:?}", other),
    }
}

#[test]
fn roster_then_event_populates_every_dimension() {
    let harness = TestHarness::new();

    let report = processed_report(harness.process("users.csv", &roster_body(&[("alice", "Alice A", "IT")])));
    assert_eq!(report.created, 1);
    assert!(report.is_clean());

    let event = json!({
        "Param3": "alice",
        "Param5": "HP-B1-IT-101-1",
        "JobID": "j1",
        "TimeCreated": "/Date(0)/",
        "Param1": "1",
        "Param2": "doc.pdf",
        "Param7": "100",
        "Param8": "1"
    });
    let report = processed_report(harness.process("events.json", &events_body(vec![event.clone()])));
    assert_eq!(report.created, 1);
    assert!(report.is_clean(), "{:?}", report.errors);

    for (table, expected) in [
        (Table::Users, 1),
        (Table::Departments, 1),
        (Table::Buildings, 1),
        (Table::PrinterModels, 1),
        (Table::Printers, 1),
        (Table::PrintEvents, 1),
    ] {
        assert_eq!(harness.count(table), expected, "{:?}", table);
    }

    harness
        .db
        .with_conn(|conn| {
            let it = catalog_repo::find_department(conn, "IT")?.unwrap();
            assert_eq!(it.name, "IT");
            let b1 = catalog_repo::find_building(conn, "B1")?.unwrap();
            assert_eq!(b1.code, "B1");
            assert!(catalog_repo::find_printer_model(conn, "HP")?.is_some());

            let stored = event_repo::find_by_job_id(conn, "j1")?.unwrap();
            assert_eq!(stored.pages, 1);
            assert_eq!(stored.timestamp, "1970-01-01T00:00:00.000Z");
            let alice = user_repo::find_by_username(conn, "alice")?.unwrap();
            assert_eq!(stored.user_id, alice.id);
            Ok(())
        })
        .unwrap();

    // Same content again, under a new name.
    let report = processed_report(harness.process("events_again.json", &events_body(vec![event])));
    assert_eq!(report.created, 0);
    assert!(report.is_clean());
    assert_eq!(harness.count(Table::PrintEvents), 1);

    assert_eq!(
        harness.files_in(&harness.processed_dir),
        vec!["events.json", "events_again.json", "users.csv"]
    );
    assert!(harness.files_in(&harness.watch_dir).is_empty());
}

#[test]
fn department_auto_creation_converges_across_case() {
    let harness = TestHarness::new();
    let reconciler = harness.reconciler();

    let body = events_body(vec![
        PrintEventBuilder::new("a1").printer("HP-B1-fin-201-1").build(),
        PrintEventBuilder::new("a2").printer("HP-b1-FIN-201-2").build(),
    ]);
    let report = reconciler.import_json(&body).unwrap();
    assert_eq!(report.created, 2);

    assert_eq!(harness.count(Table::Departments), 1);
    assert_eq!(harness.count(Table::Buildings), 1);
    harness
        .db
        .with_conn(|conn| {
            let fin = catalog_repo::find_department(conn, "fin")?.unwrap();
            assert_eq!(fin.code, "FIN");
            assert_eq!(fin.name, "FIN");
            Ok(())
        })
        .unwrap();
}

#[test]
fn synthetic_job_ids_are_stable() {
    let harness = TestHarness::new();
    let reconciler = harness.reconciler();

    let event = PrintEventBuilder::new("unused").without_job_id();
    let first = reconciler
        .import_json(&events_body(vec![event.clone().build()]))
        .unwrap();
    assert_eq!(first.created, 1);

    let second = reconciler
        .import_json(&events_body(vec![event.clone().build()]))
        .unwrap();
    assert_eq!(second.created, 0);
    assert!(second.is_clean());

    let changed = reconciler
        .import_json(&events_body(vec![event.document("other.pdf").build()]))
        .unwrap();
    assert_eq!(changed.created, 1);

    let (rows, total) = event_repo::query(&harness.db, &EventFilter::default()).unwrap();
    assert_eq!(total, 2);
    assert!(rows.iter().all(|row| row.job_id.starts_with("AUTO-")));
    assert!(rows.iter().all(|row| row.job_id.len() <= 64));
}

#[test]
fn computer_and_port_paths() {
    let harness = TestHarness::new();
    let body = events_body(vec![
        PrintEventBuilder::new("c1")
            .computer("B2-HR-310-4")
            .port("HP-B2-HR-310-1")
            .build(),
        PrintEventBuilder::new("c2")
            .computer("LEGACY-PC")
            .port("IP_10.0.0.7")
            .build(),
    ]);
    let report = harness.reconciler().import_json(&body).unwrap();
    assert_eq!(report.created, 2);

    harness
        .db
        .with_conn(|conn| {
            let decomposed = catalog_repo::find_computer(conn, "b2-hr-310-4")?.unwrap();
            assert_eq!(decomposed.room_number.as_deref(), Some("310"));
            assert_eq!(decomposed.index, Some(4));
            assert!(decomposed.building_id.is_some());

            let raw = catalog_repo::find_computer(conn, "legacy-pc")?.unwrap();
            assert_eq!(raw.building_id, None);
            assert_eq!(raw.index, None);

            let port = catalog_repo::find_port(conn, "ip_10.0.0.7")?.unwrap();
            assert_eq!(port.room_number, None);
            Ok(())
        })
        .unwrap();
    assert_eq!(harness.count(Table::Computers), 2);
    assert_eq!(harness.count(Table::Ports), 2);
}

#[test]
fn reject_policy_keeps_unknown_users_out() {
    let harness = TestHarness::new().with_policy(UnknownUserPolicy::Reject);
    harness
        .importer()
        .import_csv(&roster_body(&[("alice", "Alice A", "IT")]));

    let body = events_body(vec![
        PrintEventBuilder::new("r1").user("alice").build(),
        PrintEventBuilder::new("r2").user("mallory").build(),
    ]);
    let report = harness.reconciler().import_json(&body).unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(report.errors, vec!["User not found: mallory".to_string()]);
    assert_eq!(harness.count(Table::Users), 1);
}

#[test]
fn batches_larger_than_a_chunk() {
    let harness = TestHarness::new();
    let events: Vec<_> = (0..5)
        .map(|i| PrintEventBuilder::new(&format!("k{}", i)).pages(i + 1).build())
        .collect();
    let report = harness.reconciler().import_json(&events_body(events)).unwrap();
    assert_eq!(report.created, 5);

    // chunk_size = 2, so three committed chunks bumped the version.
    assert_eq!(harness.version.current().unwrap(), 4);

    let dashboard = stats_repo::dashboard(&harness.db, "1970-01-01T00:00:00.000Z").unwrap();
    assert_eq!(dashboard.total_pages, 15);
    assert_eq!(dashboard.total_documents, 5);
}

#[test]
fn stats_cache_follows_imports() {
    let harness = TestHarness::new();
    let cache = StatsCache::new(harness.db.clone(), harness.version.clone());
    let since = "2023-01-01T00:00:00.000Z";
    let mut invalidations = harness.version.subscribe();

    let before = cache.dashboard(since).unwrap();
    assert_eq!(before.total_pages, 0);

    harness
        .reconciler()
        .import_json(&events_body(vec![PrintEventBuilder::new("s1").pages(4).build()]))
        .unwrap();

    let event = invalidations.try_recv().unwrap();
    assert_eq!(event.created, 1);

    let after = cache.dashboard(since).unwrap();
    assert_eq!(after.total_pages, 4);
    assert_eq!(after.daily.len(), 1);
    assert_eq!(after.daily[0].date, "2023-09-29");
}

#[test]
fn import_gate_round_trip() {
    let mut harness = TestHarness::new();
    harness.import.token = Some(ImportToken::new("t0k3n"));
    let gate = ImportGate::new(&harness.import, harness.reconciler(), harness.importer());

    let body = events_body(vec![
        PrintEventBuilder::new("g1").build(),
        PrintEventBuilder::new("g2").printer("HP-B1-IT-101").build(),
    ]);

    let (status, _) = respond(gate.import_events(Some("nope"), &body));
    assert_eq!(status, 401);

    let (status, response) = respond(gate.import_events(Some("t0k3n"), &body));
    assert_eq!(status, 200);
    let report = response.data.unwrap();
    assert_eq!(report.created, 1);
    assert!(report
        .errors
        .contains(&"Invalid printer format: HP-B1-IT-101".to_string()));

    let (status, response) = respond(gate.import_users(
        Some("t0k3n"),
        "users.csv",
        &roster_body(&[("alice", "Alice Adams", "IT"), ("bob", "Bob", "")]),
    ));
    assert_eq!(status, 200);
    let report = response.data.unwrap();
    // alice was auto-created by the event import above.
    assert_eq!((report.created, report.updated), (0, 1));
    assert!(report.is_clean());
}
