//! Error handling and edge case tests.

use chrono::FixedOffset;
use systemview::{
    BusEvent, DashboardConfig, DisplayFields, Reconciler, Subscription, ViewError,
};

fn reconciler() -> Reconciler {
    Reconciler::new(FixedOffset::east_opt(0).unwrap(), "MassTransit")
}

fn description_of(diffs: &[systemview::ViewDiff]) -> Option<String> {
    diffs.iter().find_map(|d| match &d.fields {
        Some(DisplayFields::Subscription { description, .. }) => Some(description.clone()),
        _ => None,
    })
}

// --- Malformed Payloads ---

#[test]
fn test_unparseable_type_name_uses_raw_identifier() {
    let mut r = reconciler();

    let diffs = r.apply(BusEvent::AddSubscription {
        subscription: Subscription::new("loopback://a", "Broken.Namespace., Asm"),
    });

    // Should fall back, not fail
    assert_eq!(
        description_of(&diffs).as_deref(),
        Some("Broken.Namespace., Asm")
    );
    assert_eq!(r.subscriptions().len(), 1);
}

#[test]
fn test_empty_endpoint_still_grouped() {
    let mut r = reconciler();
    r.apply(BusEvent::AddSubscription {
        subscription: Subscription::new("", "App.Ping"),
    });
    assert!(r.endpoints().contains_key(""));
}

#[test]
fn test_duplicate_keys_in_refresh_batch() {
    let mut r = reconciler();
    let diffs = r.apply(BusEvent::SubscriptionRefresh {
        subscriptions: vec![
            Subscription::new("loopback://a", "App.Ping").with_correlation_id("1"),
            Subscription::new("loopback://a", "App.Ping").with_correlation_id("2"),
        ],
    });

    // Last write wins on the single node.
    assert_eq!(r.subscriptions().len(), 1);
    let node = r.subscriptions().iter().next().unwrap().1;
    assert_eq!(node.description, "Ping (2)");
    assert_eq!(r.endpoints().get("loopback://a").unwrap().subscriptions, 1);
    assert_eq!(description_of(&diffs).as_deref(), Some("Ping (1)"));
}

#[test]
fn test_bus_event_wire_errors() {
    let result: Result<BusEvent, _> = serde_json::from_str(r#"{"type":"timeout_expired"}"#);
    let error: ViewError = result.unwrap_err().into();
    assert!(matches!(error, ViewError::Serialization(_)));
}

// --- Configuration Errors ---

#[test]
fn test_out_of_range_offset() {
    let config = DashboardConfig {
        utc_offset_seconds: -90_000,
        ..Default::default()
    };
    assert!(matches!(
        Reconciler::from_config(&config),
        Err(ViewError::InvalidConfig(_))
    ));
}

#[test]
fn test_error_messages() {
    let error = ViewError::Registration {
        destination: "msmq://localhost/mt_subscriptions".into(),
        reason: "timeout".into(),
    };
    assert_eq!(
        error.to_string(),
        "Registration with msmq://localhost/mt_subscriptions failed: timeout"
    );
    assert_eq!(ViewError::QueueClosed.to_string(), "Dispatch queue is closed");
}
