//! Tests for engine module

use super::*;
use crate::catalog::Catalog;
use crate::config::SourceConfig;
use crate::error::Error;
use crate::gateway::fake::FakeGateway;
use crate::gateway::{Filter, QueryRequest};
use crate::schema::{FieldType, FlatValue};
use crate::state::State;
use crate::types::SyncMode;
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn ts(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, 0, 0, 0).unwrap()
}

fn config(overrides: serde_json::Value) -> SourceConfig {
    let mut value = json!({
        "sender_id": "sender",
        "sender_password": "secret",
        "company_id": "acme",
        "user_id": "etl",
        "user_password": "hunter2",
        "start_date": "2024-03-01T00:00:00Z",
        "lookback_days": 3,
        "slice_step_days": 7,
        "page_size": 2
    });
    if let (Some(base), Some(extra)) = (value.as_object_mut(), overrides.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    SourceConfig::from_value(value).unwrap()
}

fn customer(id: u32, modified: &str) -> serde_json::Value {
    json!({"RECORDNO": id.to_string(), "NAME": format!("Customer {id}"), "WHENMODIFIED": modified})
}

/// Window start of a cursor-filtered request
fn window_start(request: &QueryRequest) -> Option<String> {
    match request.filter.as_ref()? {
        Filter::And(inner) => inner.iter().find_map(|f| match f {
            Filter::GreaterThanOrEqual { value, .. } => Some(value.clone()),
            _ => None,
        }),
        _ => None,
    }
}

struct Harness {
    gateway: Arc<FakeGateway>,
    engine: SyncEngine,
    catalog: Catalog,
}

impl Harness {
    fn new(gateway: FakeGateway, config: SourceConfig) -> Self {
        Self::at(gateway, config, ts(3, 15))
    }

    fn at(gateway: FakeGateway, config: SourceConfig, now: DateTime<Utc>) -> Self {
        let gateway = Arc::new(gateway);
        let catalog = Catalog::from_config(&config);
        let engine = SyncEngine::new(gateway.clone(), config).with_now(now);
        Self {
            gateway,
            engine,
            catalog,
        }
    }

    async fn read(&self, streams: &[&str], state: State, mode: SyncMode) -> Vec<Message> {
        let names: Vec<String> = streams.iter().map(ToString::to_string).collect();
        let selection = self.catalog.select(&names).unwrap();
        self.engine
            .read(selection, state, mode)
            .map(|m| m.unwrap())
            .collect()
            .await
    }
}

fn records_of<'a>(messages: &'a [Message], stream: &str) -> Vec<&'a crate::schema::FlatRecord> {
    messages
        .iter()
        .filter_map(|m| match m {
            Message::Record { stream: s, data, .. } if s == stream => Some(data),
            _ => None,
        })
        .collect()
}

fn states_of<'a>(messages: &'a [Message], stream: &str) -> Vec<&'a serde_json::Value> {
    messages
        .iter()
        .filter_map(|m| match m {
            Message::State { stream: s, data } if s == stream => Some(data),
            _ => None,
        })
        .collect()
}

fn report(messages: &[Message]) -> &SyncReport {
    match messages.last() {
        Some(Message::Report(report)) => report,
        other => panic!("expected report last, got {other:?}"),
    }
}

// ============================================================================
// Message Tests
// ============================================================================

#[test]
fn test_message_kinds() {
    assert!(Message::schema("customers", "NAME", FieldType::String).is_schema());
    assert!(Message::record("customers", Default::default()).is_record());
    assert!(Message::state("customers", json!({})).is_state());
    assert!(Message::info("hello").is_log());
    assert!(Message::warn("careful").is_log());
    assert!(!Message::error("boom").is_record());
}

#[test]
fn test_summarize_statuses() {
    let ok = || {
        let mut r = StreamReport::pending("a");
        r.done();
        r
    };
    let failed = || {
        let mut r = StreamReport::pending("b");
        r.fail("boom");
        r
    };
    let cancelled = || {
        let mut r = StreamReport::pending("c");
        r.cancel();
        r
    };

    assert_eq!(SyncReport::summarize(vec![ok(), ok()], false, false).status, RunStatus::Succeeded);
    assert_eq!(
        SyncReport::summarize(vec![ok(), failed()], false, false).status,
        RunStatus::PartiallyFailed
    );
    assert_eq!(SyncReport::summarize(vec![failed()], false, false).status, RunStatus::Failed);
    assert_eq!(SyncReport::summarize(vec![ok(), failed()], true, false).status, RunStatus::Failed);
    assert_eq!(
        SyncReport::summarize(vec![ok(), cancelled()], false, true).status,
        RunStatus::Cancelled
    );
    assert_eq!(SyncReport::summarize(vec![ok()], false, true).status, RunStatus::Succeeded);
}

// ============================================================================
// Incremental Sync Tests
// ============================================================================

#[tokio::test]
async fn test_incremental_sync_commits_each_window() {
    let gateway = FakeGateway::new().with_records(
        "CUSTOMER",
        None,
        vec![
            customer(1, "03/02/2024 10:00:00"),
            customer(2, "03/03/2024 10:00:00"),
            customer(3, "03/04/2024 10:00:00"),
            customer(4, "03/09/2024 10:00:00"),
        ],
    );
    let harness = Harness::new(gateway, config(json!({})));

    let messages = harness
        .read(&["customers"], State::new(), SyncMode::Incremental)
        .await;

    let records = records_of(&messages, "customers");
    assert_eq!(records.len(), 4);
    assert_eq!(records[0]["RECORDNO"], FlatValue::Integer(1));
    assert_eq!(records[0]["entity_id"], FlatValue::Null);
    assert_eq!(
        records[0]["WHENMODIFIED"],
        FlatValue::Timestamp(Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap())
    );

    let states = states_of(&messages, "customers");
    assert_eq!(states.len(), 2);
    assert_eq!(
        states[0],
        &json!({"entities": {"_root": {"cursor": "2024-03-08T00:00:00Z"}}, "records_emitted": 3})
    );
    assert_eq!(
        states[1],
        &json!({"entities": {"_root": {"cursor": "2024-03-15T00:00:00Z"}}, "records_emitted": 4})
    );

    // 3 records with page size 2 take two calls, the second window one
    let starts: Vec<_> = harness
        .gateway
        .calls_for("CUSTOMER")
        .iter()
        .map(|c| (window_start(c).unwrap(), c.offset))
        .collect();
    assert_eq!(
        starts,
        vec![
            ("03/01/2024 00:00:00".to_string(), 0),
            ("03/01/2024 00:00:00".to_string(), 2),
            ("03/08/2024 00:00:00".to_string(), 0),
        ]
    );

    let report = report(&messages);
    assert_eq!(report.status, RunStatus::Succeeded);
    let stream = report.stream("customers").unwrap();
    assert_eq!(stream.windows_committed, 2);
    assert_eq!(stream.records_emitted, 4);
    assert_eq!(stream.last_phase, Phase::Done);
}

#[tokio::test]
async fn test_records_follow_their_state_order() {
    let gateway = FakeGateway::new().with_records(
        "CUSTOMER",
        None,
        vec![customer(1, "03/02/2024 10:00:00"), customer(2, "03/09/2024 10:00:00")],
    );
    let harness = Harness::new(gateway, config(json!({})));

    let messages = harness
        .read(&["customers"], State::new(), SyncMode::Incremental)
        .await;

    let kinds: Vec<&str> = messages
        .iter()
        .filter_map(|m| match m {
            Message::Record { .. } => Some("record"),
            Message::State { .. } => Some("state"),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, vec!["record", "state", "record", "state"]);
}

#[tokio::test]
async fn test_schema_messages_precede_records_and_widen() {
    let gateway = FakeGateway::new().with_records(
        "CUSTOMER",
        None,
        vec![
            json!({"RECORDNO": "1", "WHENMODIFIED": "03/02/2024 10:00:00", "CREDITLIMIT": "100"}),
            json!({"RECORDNO": "2", "WHENMODIFIED": "03/09/2024 10:00:00", "CREDITLIMIT": "99.5"}),
        ],
    );
    let harness = Harness::new(gateway, config(json!({})));

    let messages = harness
        .read(&["customers"], State::new(), SyncMode::Incremental)
        .await;

    let schema: Vec<(String, FieldType)> = messages
        .iter()
        .filter_map(|m| match m {
            Message::Schema { field, field_type, .. } => Some((field.clone(), *field_type)),
            _ => None,
        })
        .collect();
    assert_eq!(
        schema,
        vec![
            ("RECORDNO".to_string(), FieldType::Integer),
            ("WHENMODIFIED".to_string(), FieldType::Timestamp),
            ("entity_id".to_string(), FieldType::String),
            ("CREDITLIMIT".to_string(), FieldType::Integer),
            ("CREDITLIMIT".to_string(), FieldType::Number),
        ]
    );

    let first_schema = messages.iter().position(Message::is_schema).unwrap();
    let first_record = messages.iter().position(Message::is_record).unwrap();
    assert!(first_schema < first_record);

    let records = records_of(&messages, "customers");
    assert_eq!(records[1]["CREDITLIMIT"], FlatValue::Number(99.5));
}

#[tokio::test]
async fn test_null_only_field_reported_as_string_until_typed() {
    let gateway = FakeGateway::new().with_records(
        "CUSTOMER",
        None,
        vec![
            json!({"RECORDNO": "1", "WHENMODIFIED": "03/02/2024 10:00:00", "DISCOUNT": ""}),
            json!({"RECORDNO": "2", "WHENMODIFIED": "03/09/2024 10:00:00", "DISCOUNT": "5"}),
        ],
    );
    let harness = Harness::new(gateway, config(json!({})));

    let messages = harness
        .read(&["customers"], State::new(), SyncMode::Incremental)
        .await;

    let discount: Vec<FieldType> = messages
        .iter()
        .filter_map(|m| match m {
            Message::Schema { field, field_type, .. } if field == "DISCOUNT" => Some(*field_type),
            _ => None,
        })
        .collect();
    assert_eq!(discount, vec![FieldType::String, FieldType::Integer]);

    let records = records_of(&messages, "customers");
    assert_eq!(records[0]["DISCOUNT"], FlatValue::Null);
    assert_eq!(records[1]["DISCOUNT"], FlatValue::Integer(5));
}

#[tokio::test]
async fn test_resume_applies_lookback() {
    let harness = Harness::new(FakeGateway::new(), config(json!({})));
    let mut state = State::new();
    state.set_cursor("customers", "_root", ts(3, 10));

    let messages = harness
        .read(&["customers"], state, SyncMode::Incremental)
        .await;

    let starts: Vec<String> = harness
        .gateway
        .calls_for("CUSTOMER")
        .iter()
        .filter_map(window_start)
        .collect();
    assert_eq!(starts, vec!["03/07/2024 00:00:00", "03/14/2024 00:00:00"]);
    assert_eq!(report(&messages).status, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_full_refresh_ignores_cursor() {
    let harness = Harness::new(FakeGateway::new(), config(json!({})));
    let mut state = State::new();
    state.set_cursor("customers", "_root", ts(3, 14));

    harness
        .read(&["customers"], state, SyncMode::FullRefresh)
        .await;

    let first = harness.gateway.calls_for("CUSTOMER")[0].clone();
    assert_eq!(window_start(&first).unwrap(), "03/01/2024 00:00:00");
}

#[tokio::test]
async fn test_up_to_date_cursor_plans_nothing_new() {
    let harness = Harness::new(FakeGateway::new(), config(json!({"lookback_days": 0})));
    let mut state = State::new();
    state.set_cursor("customers", "_root", ts(3, 15));

    let messages = harness
        .read(&["customers"], state, SyncMode::Incremental)
        .await;

    assert!(harness.gateway.calls().is_empty());
    assert!(states_of(&messages, "customers").is_empty());
    assert_eq!(report(&messages).status, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_non_incremental_stream_single_window() {
    let gateway = FakeGateway::new().with_records(
        "GLJOURNAL",
        None,
        vec![
            json!({"RECORDNO": "1", "SYMBOL": "GJ"}),
            json!({"RECORDNO": "2", "SYMBOL": "AP"}),
            json!({"RECORDNO": "3", "SYMBOL": "AR"}),
        ],
    );
    let harness = Harness::new(gateway, config(json!({})));

    let messages = harness
        .read(&["gl_journals"], State::new(), SyncMode::Incremental)
        .await;

    assert_eq!(records_of(&messages, "gl_journals").len(), 3);
    assert!(harness
        .gateway
        .calls_for("GLJOURNAL")
        .iter()
        .all(|c| c.filter.is_none()));
    assert_eq!(
        states_of(&messages, "gl_journals"),
        vec![&json!({"entities": {}, "records_emitted": 3})]
    );
}

// ============================================================================
// Multi-entity Tests
// ============================================================================

#[tokio::test]
async fn test_cursors_tracked_per_entity() {
    let gateway = FakeGateway::new()
        .with_entities(&["E100", "E200"])
        .with_records("CUSTOMER", Some("E100"), vec![customer(1, "03/02/2024 10:00:00")])
        .with_records("CUSTOMER", Some("E200"), vec![customer(7, "03/10/2024 10:00:00")]);
    let harness = Harness::new(gateway, config(json!({})));
    let mut state = State::new();
    state.set_cursor("customers", "E200", ts(3, 11));

    let messages = harness
        .read(&["customers"], state, SyncMode::Incremental)
        .await;

    let records = records_of(&messages, "customers");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["entity_id"], FlatValue::String("E100".into()));
    assert_eq!(records[1]["entity_id"], FlatValue::String("E200".into()));

    let last = states_of(&messages, "customers").last().copied().unwrap().clone();
    assert_eq!(
        last["entities"],
        json!({
            "E100": {"cursor": "2024-03-15T00:00:00Z"},
            "E200": {"cursor": "2024-03-15T00:00:00Z"}
        })
    );

    let e200_starts: Vec<String> = harness
        .gateway
        .calls_for("CUSTOMER")
        .iter()
        .filter(|c| c.entity_id.as_deref() == Some("E200"))
        .filter_map(window_start)
        .collect();
    assert_eq!(e200_starts, vec!["03/08/2024 00:00:00"]);
}

#[tokio::test]
async fn test_selected_entities_skip_discovery() {
    let gateway = FakeGateway::new()
        .with_entities(&["E100", "E200"])
        .with_records("CUSTOMER", Some("E200"), vec![customer(7, "03/02/2024 10:00:00")]);
    let harness = Harness::new(
        gateway,
        config(json!({"entities_mode": "selected", "entity_ids": ["E200"]})),
    );

    let messages = harness
        .read(&["customers"], State::new(), SyncMode::Incremental)
        .await;

    assert!(harness
        .gateway
        .calls_for("CUSTOMER")
        .iter()
        .all(|c| c.entity_id.as_deref() == Some("E200")));
    assert_eq!(records_of(&messages, "customers").len(), 1);
}

// ============================================================================
// Child Stream Tests
// ============================================================================

#[tokio::test]
async fn test_child_records_follow_parent() {
    let gateway = FakeGateway::new()
        .with_records(
            "ARINVOICE",
            None,
            vec![
                json!({"RECORDNO": "10", "WHENMODIFIED": "03/02/2024 10:00:00"}),
                json!({"RECORDNO": "11", "WHENMODIFIED": "03/03/2024 10:00:00"}),
            ],
        )
        .with_records(
            "ARINVOICEITEM",
            None,
            vec![
                json!({"RECORDNO": "100", "RECORDKEY": "10", "AMOUNT": "5"}),
                json!({"RECORDNO": "101", "RECORDKEY": "11", "AMOUNT": "6"}),
                json!({"RECORDNO": "102", "RECORDKEY": "10", "AMOUNT": "7"}),
            ],
        );
    let harness = Harness::new(gateway, config(json!({})));

    let messages = harness
        .read(&["ar_invoices"], State::new(), SyncMode::Incremental)
        .await;

    let order: Vec<(String, i64)> = messages
        .iter()
        .filter_map(|m| match m {
            Message::Record { stream, data, .. } => match data["RECORDNO"] {
                FlatValue::Integer(n) => Some((stream.clone(), n)),
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(
        order,
        vec![
            ("ar_invoices".to_string(), 10),
            ("ar_invoice_items".to_string(), 100),
            ("ar_invoice_items".to_string(), 102),
            ("ar_invoices".to_string(), 11),
            ("ar_invoice_items".to_string(), 101),
        ]
    );

    // Items inherit the invoice's modification time
    let items = records_of(&messages, "ar_invoice_items");
    assert_eq!(
        items[0]["WHENMODIFIED"],
        FlatValue::Timestamp(Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap())
    );
    assert!(!states_of(&messages, "ar_invoices").is_empty());
}

#[tokio::test]
async fn test_selecting_only_child_emits_only_child() {
    let gateway = FakeGateway::new()
        .with_records(
            "ARINVOICE",
            None,
            vec![json!({"RECORDNO": "10", "WHENMODIFIED": "03/02/2024 10:00:00"})],
        )
        .with_records(
            "ARINVOICEITEM",
            None,
            vec![json!({"RECORDNO": "100", "RECORDKEY": "10"})],
        );
    let harness = Harness::new(gateway, config(json!({})));

    let messages = harness
        .read(&["ar_invoice_items"], State::new(), SyncMode::Incremental)
        .await;

    assert!(records_of(&messages, "ar_invoices").is_empty());
    assert_eq!(records_of(&messages, "ar_invoice_items").len(), 1);
    assert!(!states_of(&messages, "ar_invoices").is_empty());
}

// ============================================================================
// Failure Tests
// ============================================================================

#[tokio::test]
async fn test_transient_failure_keeps_last_committed_cursor() {
    let gateway = FakeGateway::new()
        .with_records("CUSTOMER", None, vec![customer(1, "03/02/2024 10:00:00")])
        .with_records("GLBATCH", None, vec![json!({"RECORDNO": "1", "WHENMODIFIED": "03/02/2024 10:00:00"})])
        .fail_when(|request, _| {
            (request.object == "CUSTOMER"
                && window_start(request).as_deref() == Some("03/08/2024 00:00:00"))
            .then(|| Error::MaxRetriesExceeded {
                max_retries: 3,
                last_error: "Transient gateway failure: busy".to_string(),
            })
        });
    // Four windows: 03/01, 03/08, 03/15, 03/22
    let harness = Harness::at(gateway, config(json!({})), ts(3, 29));

    let messages = harness
        .read(&["gl_batches", "customers"], State::new(), SyncMode::Incremental)
        .await;

    let states = states_of(&messages, "customers");
    assert_eq!(states.len(), 1);
    assert_eq!(states[0]["entities"]["_root"]["cursor"], "2024-03-08T00:00:00Z");

    // Windows 3 and 4 are never attempted
    let customer_starts: Vec<String> = harness
        .gateway
        .calls_for("CUSTOMER")
        .iter()
        .filter_map(window_start)
        .collect();
    assert_eq!(customer_starts, vec!["03/01/2024 00:00:00", "03/08/2024 00:00:00"]);

    let report = report(&messages);
    assert_eq!(report.status, RunStatus::PartiallyFailed);
    assert_eq!(report.failed_streams(), vec!["customers"]);
    let customers = report.stream("customers").unwrap();
    assert_eq!(customers.windows_committed, 1);
    assert!(customers
        .error
        .as_deref()
        .unwrap()
        .contains("Fetch failed for stream 'customers'"));
    assert_eq!(
        report.stream("gl_batches").unwrap().status,
        StreamStatus::Succeeded
    );
}

#[tokio::test]
async fn test_malformed_response_fails_stream() {
    let gateway = FakeGateway::new()
        .fail_when(|request, _| (request.object == "CUSTOMER").then(|| Error::malformed("no data element")));
    let harness = Harness::new(gateway, config(json!({})));

    let messages = harness
        .read(&["customers"], State::new(), SyncMode::Incremental)
        .await;

    assert!(states_of(&messages, "customers").is_empty());
    let report = report(&messages);
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.stream("customers").unwrap().last_phase, Phase::Failed);
}

#[tokio::test]
async fn test_auth_failure_aborts_run() {
    let gateway = FakeGateway::new()
        .fail_when(|request, _| (request.object == "CUSTOMER").then(|| Error::auth("Sign-in information is incorrect")));
    let harness = Harness::new(gateway, config(json!({})));

    // Catalog order runs customers before ar_invoices
    let messages = harness
        .read(&["ar_invoices", "customers"], State::new(), SyncMode::Incremental)
        .await;

    let report = report(&messages);
    assert_eq!(report.status, RunStatus::Failed);
    let customers = report.stream("customers").unwrap();
    assert!(customers.error.as_deref().unwrap().contains("Authentication failed"));
    // Streams after the failure never start fetching
    assert_eq!(
        report.stream("ar_invoices").unwrap().status,
        StreamStatus::Cancelled
    );
    assert!(harness.gateway.calls_for("ARINVOICE").is_empty());
}

#[tokio::test]
async fn test_panicking_run_still_ends_with_failed_report() {
    let gateway = FakeGateway::new().fail_when(|request, _| {
        assert_ne!(request.object, "CUSTOMER", "gateway blew up");
        None
    });
    let harness = Harness::new(gateway, config(json!({})));

    let messages = harness
        .read(&["customers"], State::new(), SyncMode::Incremental)
        .await;

    let report = report(&messages);
    assert_eq!(report.status, RunStatus::Failed);
    let customers = report.stream("customers").unwrap();
    assert_eq!(customers.status, StreamStatus::Failed);
    assert!(customers.error.as_deref().unwrap().contains("ended abnormally"));
}

// ============================================================================
// Cancellation and Concurrency Tests
// ============================================================================

#[tokio::test]
async fn test_cancelled_before_start() {
    let token = CancellationToken::new();
    token.cancel();
    let mut harness = Harness::new(
        FakeGateway::new().with_records("CUSTOMER", None, vec![customer(1, "03/02/2024 10:00:00")]),
        config(json!({})),
    );
    harness.engine = harness.engine.clone().with_cancellation(token);

    let messages = harness
        .read(&["customers"], State::new(), SyncMode::Incremental)
        .await;

    assert!(records_of(&messages, "customers").is_empty());
    assert!(harness.gateway.calls().is_empty());
    let report = report(&messages);
    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(
        report.stream("customers").unwrap().status,
        StreamStatus::Cancelled
    );
}

#[tokio::test]
async fn test_cancel_between_windows_keeps_committed_cursor() {
    let token = CancellationToken::new();
    let stop = token.clone();
    let gateway = FakeGateway::new()
        .with_records(
            "CUSTOMER",
            None,
            vec![
                customer(1, "03/02/2024 10:00:00"),
                customer(2, "03/09/2024 10:00:00"),
            ],
        )
        .fail_when(move |request, _| {
            // Stop once the first window is being read
            if window_start(request).as_deref() == Some("03/01/2024 00:00:00") {
                stop.cancel();
            }
            None
        });
    let mut harness = Harness::new(gateway, config(json!({})));
    harness.engine = harness.engine.clone().with_cancellation(token);

    let messages = harness
        .read(&["customers"], State::new(), SyncMode::Incremental)
        .await;

    let states = states_of(&messages, "customers");
    assert_eq!(states.len(), 1);
    assert_eq!(states[0]["entities"]["_root"]["cursor"], "2024-03-08T00:00:00Z");
    assert_eq!(records_of(&messages, "customers").len(), 1);

    let starts: Vec<String> = harness
        .gateway
        .calls_for("CUSTOMER")
        .iter()
        .filter_map(window_start)
        .collect();
    assert_eq!(starts, vec!["03/01/2024 00:00:00"]);

    let report = report(&messages);
    assert_eq!(report.status, RunStatus::Cancelled);
    let customers = report.stream("customers").unwrap();
    assert_eq!(customers.status, StreamStatus::Cancelled);
    assert_eq!(customers.windows_committed, 1);
}

#[tokio::test]
async fn test_cancel_mid_fetch_commits_nothing() {
    let token = CancellationToken::new();
    let stop = token.clone();
    let gateway = FakeGateway::new()
        .with_records("CUSTOMER", None, vec![customer(1, "03/02/2024 10:00:00")])
        .with_latency(std::time::Duration::from_secs(10))
        .fail_when(move |_, _| {
            stop.cancel();
            None
        });
    let mut harness = Harness::new(gateway, config(json!({})));
    harness.engine = harness.engine.clone().with_cancellation(token);

    let messages = harness
        .read(&["customers"], State::new(), SyncMode::Incremental)
        .await;

    assert!(states_of(&messages, "customers").is_empty());
    assert!(records_of(&messages, "customers").is_empty());
    assert_eq!(harness.gateway.calls_for("CUSTOMER").len(), 1);

    let report = report(&messages);
    assert_eq!(report.status, RunStatus::Cancelled);
    let customers = report.stream("customers").unwrap();
    assert_eq!(customers.status, StreamStatus::Cancelled);
    assert_eq!(customers.windows_committed, 0);
}

#[tokio::test]
async fn test_concurrent_streams_report_in_selection_order() {
    let gateway = FakeGateway::new()
        .with_records("CUSTOMER", None, vec![customer(1, "03/02/2024 10:00:00")])
        .with_records("GLBATCH", None, vec![json!({"RECORDNO": "1", "WHENMODIFIED": "03/02/2024 10:00:00"})])
        .with_records("GLENTRY", None, vec![json!({"RECORDNO": "1", "WHENMODIFIED": "03/02/2024 10:00:00"})]);
    let harness = Harness::new(gateway, config(json!({"max_concurrent_streams": 3})));

    let messages = harness
        .read(&[], State::new(), SyncMode::Incremental)
        .await;

    let report = report(&messages);
    assert_eq!(report.status, RunStatus::Succeeded);
    let names: Vec<&str> = report.streams.iter().map(|s| s.stream.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "gl_journals",
            "gl_batches",
            "gl_entries",
            "gl_detail",
            "customers",
            "ar_invoices",
            "oe_invoices",
            "oe_invoice_lines",
            "orders",
            "order_lines",
            "subtotals",
            "so_subtotals",
        ]
    );
    assert_eq!(report.records_emitted(), 3);
}
