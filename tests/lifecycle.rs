//! Lifecycle tests: registration, startup failures and shutdown ordering.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use systemview::{
    BusEvent, ClientRegistration, DashboardConfig, EntityKey, EventProducer, HealthRecord,
    LifecycleController, LoopbackBus, MessageKind, MirrorSink, Result, ServiceBus, Subscription,
    SubscriptionKey, ViewDiff, ViewError,
};

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_events_flow_from_bus_to_view() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let bus = LoopbackBus::new("loopback://dashboard");
    let view = MirrorSink::new();
    let mut dashboard = LifecycleController::new(DashboardConfig::default(), bus.clone());
    dashboard.start(view.clone()).unwrap();

    assert!(bus
        .publish(BusEvent::AddSubscription {
            subscription: Subscription::new(
                "loopback://orders",
                "MyApp.Messages.OrderPlaced, MyApp, Version=1.0",
            ),
        })
        .unwrap());
    bus.publish(BusEvent::HealthUpdate {
        information: vec![HealthRecord::new("loopback://orders", "Healthy")],
    })
    .unwrap();

    wait_until(|| view.len() == 3);
    assert!(view
        .get(&EntityKey::Subscription(SubscriptionKey {
            endpoint_uri: "loopback://orders".into(),
            message_name: "MyApp.Messages.OrderPlaced, MyApp, Version=1.0".into(),
        }))
        .is_some());

    dashboard.stop().unwrap();
    assert!(!bus.is_subscribed());
    assert_eq!(bus.unsubscribe_count(), 1);
    assert!(bus.is_closed());
}

#[test]
fn test_no_events_applied_after_stop() {
    let bus = LoopbackBus::new("loopback://dashboard");
    let view = MirrorSink::new();
    let mut dashboard = LifecycleController::new(DashboardConfig::default(), bus.clone());
    dashboard.start(view.clone()).unwrap();
    dashboard.stop().unwrap();

    let delivered = bus
        .publish(BusEvent::HealthUpdate {
            information: vec![HealthRecord::new("loopback://late", "Healthy")],
        })
        .unwrap();
    assert!(!delivered);
    assert!(view.is_empty());
}

#[test]
fn test_subscribe_failure_is_surfaced() {
    let bus = LoopbackBus::new("loopback://dashboard").failing_subscribe("queue missing");
    let mut dashboard = LifecycleController::new(DashboardConfig::default(), bus.clone());

    let result = dashboard.start(MirrorSink::new());
    assert!(matches!(result, Err(ViewError::Transport(ref reason)) if reason == "queue missing"));
    assert!(!dashboard.is_running());
    assert!(bus.registrations().is_empty());
}

#[test]
fn test_registration_failure_unsubscribes() {
    let bus = LoopbackBus::new("loopback://dashboard").failing_registration("service down");
    let mut dashboard = LifecycleController::new(DashboardConfig::default(), bus.clone());

    let result = dashboard.start(MirrorSink::new());
    assert!(matches!(result, Err(ViewError::Registration { .. })));
    assert!(!bus.is_subscribed());
    assert_eq!(bus.unsubscribe_count(), 1);
    assert!(!dashboard.is_running());
}

#[test]
fn test_drop_stops_running_dashboard() {
    let bus = LoopbackBus::new("loopback://dashboard");
    {
        let mut dashboard = LifecycleController::new(DashboardConfig::default(), bus.clone());
        dashboard.start(MirrorSink::new()).unwrap();
    }
    assert!(!bus.is_subscribed());
    assert!(bus.is_closed());
}

/// Bus that records the order of lifecycle calls.
#[derive(Clone, Default)]
struct RecordingBus {
    calls: Arc<Mutex<Vec<&'static str>>>,
    producer: Arc<Mutex<Option<EventProducer>>>,
}

impl ServiceBus for RecordingBus {
    fn endpoint_uri(&self) -> String {
        "loopback://recording".to_string()
    }

    fn subscribe(&mut self, kinds: &[MessageKind], producer: EventProducer) -> Result<()> {
        assert_eq!(kinds.len(), 7);
        *self.producer.lock() = Some(producer);
        self.calls.lock().push("subscribe");
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<()> {
        self.producer.lock().take();
        self.calls.lock().push("unsubscribe");
        Err(ViewError::Transport("already gone".into()))
    }

    fn send_registration(&mut self, _: &str, _: &ClientRegistration) -> Result<()> {
        self.calls.lock().push("register");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.calls.lock().push("close");
        Ok(())
    }
}

#[test]
fn test_stop_during_in_flight_event() {
    let bus = RecordingBus::default();
    let (entered_tx, entered_rx) = crossbeam_channel::bounded::<()>(1);
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    let applied = Arc::new(Mutex::new(0usize));
    let applied_in_sink = Arc::clone(&applied);

    let sink = move |_: &[ViewDiff]| {
        let _ = entered_tx.try_send(());
        let _ = release_rx.recv();
        *applied_in_sink.lock() += 1;
    };

    let dashboard = Arc::new(Mutex::new(LifecycleController::new(
        DashboardConfig::default(),
        bus.clone(),
    )));
    dashboard.lock().start(sink).unwrap();

    let producer = bus.producer.lock().clone().unwrap();
    for i in 0..3 {
        producer
            .enqueue(BusEvent::HealthUpdate {
                information: vec![HealthRecord::new(format!("loopback://h{}", i), "Healthy")],
            })
            .unwrap();
    }
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // Stop while the first event is still inside the sink.
    let stopper = {
        let dashboard = Arc::clone(&dashboard);
        thread::spawn(move || dashboard.lock().stop())
    };
    wait_until(|| bus.calls.lock().contains(&"unsubscribe"));
    drop(release_tx);

    let result = stopper.join().unwrap();
    // Unsubscribe's error is reported, but every step still ran.
    assert!(matches!(result, Err(ViewError::Transport(_))));
    assert_eq!(
        *bus.calls.lock(),
        vec!["subscribe", "register", "unsubscribe", "close"]
    );
    // The in-flight event completed; the queued ones were never applied.
    assert_eq!(*applied.lock(), 1);
    assert!(matches!(
        producer.enqueue(BusEvent::HealthUpdate { information: vec![] }),
        Err(ViewError::QueueClosed)
    ));
}
