//! The reconciler: owns the three entity stores and turns events into diffs.

use super::label::{describe_message, is_system_message};
use super::time::{display_time, to_local};
use crate::collection::{KeyedStore, Removal, Upsert};
use crate::config::DashboardConfig;
use crate::error::Result;
use crate::types::{
    BusEvent, DisplayFields, EndpointGroup, EntityKey, HealthRecord, Subscription,
    SubscriptionKey, SubscriptionNode, TimeoutEntry, TimeoutKey, ViewDiff,
};
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};
use uuid::Uuid;

/// Authoritative view state for subscriptions, health and timeouts.
///
/// Mutated only by the single dispatch consumer, so it carries no locks.
/// Every call to [`Reconciler::apply`] returns the diffs the renderer needs
/// to move from the previous state to the new one.
#[derive(Debug)]
pub struct Reconciler {
    /// Display zone for timeout times.
    offset: FixedOffset,

    /// Namespace prefix of infrastructure message types.
    system_namespace: String,

    subscriptions: KeyedStore<SubscriptionKey, SubscriptionNode>,

    /// Parent nodes of the subscription tree, one per endpoint.
    endpoints: KeyedStore<String, EndpointGroup>,

    health: KeyedStore<String, HealthRecord>,

    timeouts: KeyedStore<TimeoutKey, TimeoutEntry>,

    /// Events applied so far, no-ops included.
    applied: u64,
}

impl Reconciler {
    pub fn new(offset: FixedOffset, system_namespace: impl Into<String>) -> Self {
        Self {
            offset,
            system_namespace: system_namespace.into(),
            subscriptions: KeyedStore::new(),
            endpoints: KeyedStore::new(),
            health: KeyedStore::new(),
            timeouts: KeyedStore::new(),
            applied: 0,
        }
    }

    pub fn from_config(config: &DashboardConfig) -> Result<Self> {
        Ok(Self::new(config.local_offset()?, config.system_namespace.clone()))
    }

    /// Apply one event and return the resulting diff.
    pub fn apply(&mut self, event: BusEvent) -> Vec<ViewDiff> {
        let kind = event.kind();
        let mut diffs = Vec::new();

        match event {
            BusEvent::AddSubscription { subscription } => {
                self.upsert_subscription(subscription, &mut diffs);
                self.prune_endpoints(&mut diffs);
            }
            BusEvent::RemoveSubscription { subscription } => {
                self.remove_subscription(&subscription.key(), &mut diffs);
                self.prune_endpoints(&mut diffs);
            }
            BusEvent::SubscriptionRefresh { subscriptions } => {
                self.refresh_subscriptions(subscriptions, &mut diffs);
            }
            BusEvent::HealthUpdate { information } => {
                self.refresh_health(information, &mut diffs);
            }
            BusEvent::TimeoutScheduled {
                correlation_id,
                tag,
                timeout_at,
            }
            | BusEvent::TimeoutRescheduled {
                correlation_id,
                tag,
                timeout_at,
            } => {
                self.upsert_timeout(correlation_id, tag, timeout_at, &mut diffs);
            }
            BusEvent::TimeoutExpired { correlation_id, tag } => {
                self.remove_timeout(TimeoutKey::new(correlation_id, tag), &mut diffs);
            }
        }

        self.applied += 1;
        debug!(?kind, diffs = diffs.len(), applied = self.applied, "applied bus event");
        diffs
    }

    // --- Subscriptions ---

    fn upsert_subscription(&mut self, subscription: Subscription, diffs: &mut Vec<ViewDiff>) {
        let key = subscription.key();

        if !self.endpoints.contains_key(&key.endpoint_uri) {
            let group = EndpointGroup {
                endpoint_uri: key.endpoint_uri.clone(),
                subscriptions: 0,
            };
            diffs.push(ViewDiff::added(
                EntityKey::Endpoint(key.endpoint_uri.clone()),
                endpoint_fields(&group),
            ));
            self.endpoints.upsert(key.endpoint_uri.clone(), group);
        }

        let node = SubscriptionNode {
            description: describe_message(
                &subscription.message_name,
                subscription.correlation_id.as_deref(),
            ),
            system: is_system_message(&subscription.message_name, &self.system_namespace),
            subscription,
        };
        let fields = subscription_fields(&node);

        match self.subscriptions.upsert(key.clone(), node) {
            Upsert::Added => {
                if let Some(group) = self.endpoints.get_mut(&key.endpoint_uri) {
                    group.subscriptions += 1;
                }
                diffs.push(ViewDiff::added(EntityKey::Subscription(key), fields));
            }
            Upsert::Updated => {
                diffs.push(ViewDiff::updated(EntityKey::Subscription(key), fields));
            }
        }
    }

    fn remove_subscription(&mut self, key: &SubscriptionKey, diffs: &mut Vec<ViewDiff>) {
        match self.subscriptions.remove(key) {
            Removal::Removed(_) => {
                self.release_endpoint(&key.endpoint_uri);
                diffs.push(ViewDiff::removed(EntityKey::Subscription(key.clone())));
            }
            Removal::NoOp => trace!(%key, "remove for unknown subscription absorbed"),
        }
    }

    fn refresh_subscriptions(&mut self, batch: Vec<Subscription>, diffs: &mut Vec<ViewDiff>) {
        let live: HashSet<SubscriptionKey> = batch.iter().map(Subscription::key).collect();

        for (key, _) in self.subscriptions.reconcile_full_set(&live) {
            self.release_endpoint(&key.endpoint_uri);
            diffs.push(ViewDiff::removed(EntityKey::Subscription(key)));
        }

        for subscription in batch {
            self.upsert_subscription(subscription, diffs);
        }

        // Only after the whole batch, so an endpoint whose children were all
        // replaced keeps its node.
        self.prune_endpoints(diffs);
    }

    fn release_endpoint(&mut self, endpoint_uri: &str) {
        if let Some(group) = self.endpoints.get_mut(endpoint_uri) {
            group.subscriptions = group.subscriptions.saturating_sub(1);
        }
    }

    /// Drop endpoint groups left without children.
    fn prune_endpoints(&mut self, diffs: &mut Vec<ViewDiff>) {
        let empty: Vec<String> = self
            .endpoints
            .iter()
            .filter(|(_, group)| group.subscriptions == 0)
            .map(|(uri, _)| uri.clone())
            .collect();

        for uri in empty {
            if self.endpoints.remove(&uri).is_removed() {
                diffs.push(ViewDiff::removed(EntityKey::Endpoint(uri)));
            }
        }
    }

    // --- Health ---

    fn refresh_health(&mut self, batch: Vec<HealthRecord>, diffs: &mut Vec<ViewDiff>) {
        let live: HashSet<String> = batch.iter().map(|r| r.source_uri.clone()).collect();

        for (uri, _) in self.health.reconcile_full_set(&live) {
            diffs.push(ViewDiff::removed(EntityKey::Health(uri)));
        }

        for record in batch {
            let key = EntityKey::Health(record.source_uri.clone());
            let fields = health_fields(&record);
            match self.health.upsert(record.source_uri.clone(), record) {
                Upsert::Added => diffs.push(ViewDiff::added(key, fields)),
                Upsert::Updated => diffs.push(ViewDiff::updated(key, fields)),
            }
        }
    }

    // --- Timeouts ---

    fn upsert_timeout(
        &mut self,
        correlation_id: Uuid,
        tag: i32,
        timeout_at: DateTime<Utc>,
        diffs: &mut Vec<ViewDiff>,
    ) {
        let entry = TimeoutEntry {
            correlation_id,
            tag,
            timeout_at,
        };
        let key = entry.key();
        let fields = self.timeout_fields(&entry);

        match self.timeouts.upsert(key, entry) {
            Upsert::Added => diffs.push(ViewDiff::added(EntityKey::Timeout(key), fields)),
            Upsert::Updated => diffs.push(ViewDiff::updated(EntityKey::Timeout(key), fields)),
        }
    }

    fn remove_timeout(&mut self, key: TimeoutKey, diffs: &mut Vec<ViewDiff>) {
        match self.timeouts.remove(&key) {
            Removal::Removed(_) => diffs.push(ViewDiff::removed(EntityKey::Timeout(key))),
            Removal::NoOp => trace!(%key, "expiry for unknown timeout absorbed"),
        }
    }

    fn timeout_fields(&self, entry: &TimeoutEntry) -> DisplayFields {
        let local = to_local(entry.timeout_at, self.offset);
        DisplayFields::Timeout {
            correlation_id: entry.correlation_id,
            tag: entry.tag,
            display_time: display_time(&local),
            timeout_at: local,
        }
    }

    // --- Read Access ---

    pub fn subscriptions(&self) -> &KeyedStore<SubscriptionKey, SubscriptionNode> {
        &self.subscriptions
    }

    pub fn endpoints(&self) -> &KeyedStore<String, EndpointGroup> {
        &self.endpoints
    }

    pub fn health(&self) -> &KeyedStore<String, HealthRecord> {
        &self.health
    }

    pub fn timeouts(&self) -> &KeyedStore<TimeoutKey, TimeoutEntry> {
        &self.timeouts
    }

    /// Number of events applied to the stores, including those absorbed as
    /// no-ops.
    ///
    /// Counted whether or not the resulting diffs reached a sink, so it can
    /// run ahead of `DispatchHandle::applied_count` after a sink failure.
    pub fn applied_events(&self) -> u64 {
        self.applied
    }

    /// Every live entity as an `Added` diff, in view order: each endpoint
    /// followed by its subscriptions, then health, then timeouts.
    pub fn snapshot(&self) -> Vec<ViewDiff> {
        let mut diffs = Vec::with_capacity(
            self.endpoints.len() + self.subscriptions.len() + self.health.len() + self.timeouts.len(),
        );

        let mut children: HashMap<&str, Vec<ViewDiff>> =
            HashMap::with_capacity(self.endpoints.len());
        for (key, node) in self.subscriptions.iter() {
            children
                .entry(key.endpoint_uri.as_str())
                .or_default()
                .push(ViewDiff::added(
                    EntityKey::Subscription(key.clone()),
                    subscription_fields(node),
                ));
        }

        for (uri, group) in self.endpoints.iter() {
            diffs.push(ViewDiff::added(
                EntityKey::Endpoint(uri.clone()),
                endpoint_fields(group),
            ));
            if let Some(subscriptions) = children.remove(uri.as_str()) {
                diffs.extend(subscriptions);
            }
        }

        for (uri, record) in self.health.iter() {
            diffs.push(ViewDiff::added(EntityKey::Health(uri.clone()), health_fields(record)));
        }

        for (key, entry) in self.timeouts.iter() {
            diffs.push(ViewDiff::added(EntityKey::Timeout(*key), self.timeout_fields(entry)));
        }

        diffs
    }
}

fn endpoint_fields(group: &EndpointGroup) -> DisplayFields {
    DisplayFields::Endpoint {
        endpoint_uri: group.endpoint_uri.clone(),
    }
}

fn subscription_fields(node: &SubscriptionNode) -> DisplayFields {
    DisplayFields::Subscription {
        endpoint_uri: node.subscription.endpoint_uri.clone(),
        message_name: node.subscription.message_name.clone(),
        description: node.description.clone(),
        system: node.system,
    }
}

fn health_fields(record: &HealthRecord) -> DisplayFields {
    DisplayFields::Health {
        source_uri: record.source_uri.clone(),
        state: record.state.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiffKind, EntityType};
    use chrono::TimeZone;

    fn reconciler() -> Reconciler {
        Reconciler::new(FixedOffset::east_opt(0).unwrap(), "MassTransit")
    }

    fn add(endpoint: &str, message: &str) -> BusEvent {
        BusEvent::AddSubscription {
            subscription: Subscription::new(endpoint, message),
        }
    }

    fn remove(endpoint: &str, message: &str) -> BusEvent {
        BusEvent::RemoveSubscription {
            subscription: Subscription::new(endpoint, message),
        }
    }

    fn kinds(diffs: &[ViewDiff]) -> Vec<(DiffKind, EntityType)> {
        diffs.iter().map(|d| (d.kind, d.entity_type())).collect()
    }

    #[test]
    fn test_first_subscription_adds_endpoint() {
        let mut r = reconciler();
        let diffs = r.apply(add("loopback://a", "App.Ping"));

        assert_eq!(
            kinds(&diffs),
            vec![
                (DiffKind::Added, EntityType::Endpoint),
                (DiffKind::Added, EntityType::Subscription),
            ]
        );
        assert_eq!(r.endpoints().get("loopback://a").unwrap().subscriptions, 1);
    }

    #[test]
    fn test_last_subscription_removes_endpoint() {
        let mut r = reconciler();
        r.apply(add("loopback://a", "App.Ping"));
        r.apply(add("loopback://a", "App.Pong"));

        let diffs = r.apply(remove("loopback://a", "App.Ping"));
        assert_eq!(kinds(&diffs), vec![(DiffKind::Removed, EntityType::Subscription)]);

        let diffs = r.apply(remove("loopback://a", "App.Pong"));
        assert_eq!(
            kinds(&diffs),
            vec![
                (DiffKind::Removed, EntityType::Subscription),
                (DiffKind::Removed, EntityType::Endpoint),
            ]
        );
        assert!(r.endpoints().is_empty());
    }

    #[test]
    fn test_correlation_updates_label() {
        let mut r = reconciler();
        r.apply(add("loopback://a", "App.Ping"));
        let diffs = r.apply(BusEvent::AddSubscription {
            subscription: Subscription::new("loopback://a", "App.Ping").with_correlation_id("9"),
        });

        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DiffKind::Updated);
        match &diffs[0].fields {
            Some(DisplayFields::Subscription { description, .. }) => {
                assert_eq!(description, "Ping (9)")
            }
            other => panic!("unexpected fields {:?}", other),
        }
    }

    #[test]
    fn test_system_flag_not_in_label() {
        let mut r = reconciler();
        let diffs = r.apply(add(
            "loopback://a",
            "MassTransit.Services.Timeout.Messages.ScheduleTimeout, MassTransit",
        ));
        match &diffs[1].fields {
            Some(DisplayFields::Subscription {
                description,
                system,
                ..
            }) => {
                assert_eq!(description, "ScheduleTimeout");
                assert!(*system);
            }
            other => panic!("unexpected fields {:?}", other),
        }
    }

    #[test]
    fn test_refresh_keeps_endpoint_when_children_replaced() {
        let mut r = reconciler();
        r.apply(add("loopback://a", "App.Old"));

        let diffs = r.apply(BusEvent::SubscriptionRefresh {
            subscriptions: vec![Subscription::new("loopback://a", "App.New")],
        });

        assert_eq!(
            kinds(&diffs),
            vec![
                (DiffKind::Removed, EntityType::Subscription),
                (DiffKind::Added, EntityType::Subscription),
            ]
        );
        assert_eq!(r.endpoints().len(), 1);
    }

    #[test]
    fn test_refresh_drops_vanished_endpoint() {
        let mut r = reconciler();
        r.apply(add("loopback://a", "App.Ping"));
        r.apply(add("loopback://b", "App.Ping"));

        let diffs = r.apply(BusEvent::SubscriptionRefresh {
            subscriptions: vec![Subscription::new("loopback://b", "App.Ping")],
        });

        assert!(diffs.contains(&ViewDiff::removed(EntityKey::Endpoint("loopback://a".into()))));
        let endpoints: Vec<&String> = r.endpoints().keys().collect();
        assert_eq!(endpoints, vec!["loopback://b"]);
    }

    #[test]
    fn test_timeout_local_time() {
        let mut r = Reconciler::new(FixedOffset::east_opt(3600).unwrap(), "MassTransit");
        let id = Uuid::from_u128(7);
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let diffs = r.apply(BusEvent::TimeoutScheduled {
            correlation_id: id,
            tag: 1,
            timeout_at: at,
        });

        match &diffs[0].fields {
            Some(DisplayFields::Timeout {
                display_time,
                timeout_at,
                ..
            }) => {
                assert_eq!(display_time, "13:00:00");
                assert_eq!(timeout_at.with_timezone(&Utc), at);
            }
            other => panic!("unexpected fields {:?}", other),
        }
        // Stored in transport time.
        assert_eq!(r.timeouts().get(&TimeoutKey::new(id, 1)).unwrap().timeout_at, at);
    }

    #[test]
    fn test_applied_counts_noops() {
        let mut r = reconciler();
        r.apply(remove("loopback://a", "App.Ping"));
        r.apply(BusEvent::TimeoutExpired {
            correlation_id: Uuid::nil(),
            tag: 0,
        });
        assert_eq!(r.applied_events(), 2);
        assert!(r.subscriptions().is_empty());
    }

    #[test]
    fn test_snapshot_view_order() {
        let mut r = reconciler();
        r.apply(add("loopback://a", "App.One"));
        r.apply(add("loopback://b", "App.Two"));
        r.apply(add("loopback://a", "App.Three"));
        r.apply(BusEvent::HealthUpdate {
            information: vec![HealthRecord::new("loopback://a", "Healthy")],
        });

        let snapshot = r.snapshot();
        let keys: Vec<String> = snapshot.iter().map(|d| d.key.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "loopback://a",
                "loopback://a -> App.One",
                "loopback://a -> App.Three",
                "loopback://b",
                "loopback://b -> App.Two",
                "loopback://a",
            ]
        );
        assert!(snapshot.iter().all(|d| d.kind == DiffKind::Added));
    }

    #[test]
    fn test_snapshot_groups_under_readded_endpoint() {
        let mut r = reconciler();
        r.apply(add("loopback://a", "App.One"));
        r.apply(add("loopback://b", "App.Two"));
        r.apply(BusEvent::RemoveSubscription {
            subscription: Subscription::new("loopback://a", "App.One"),
        });
        r.apply(add("loopback://a", "App.Three"));
        r.apply(add("loopback://b", "App.Four"));

        let keys: Vec<String> = r.snapshot().iter().map(|d| d.key.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "loopback://b",
                "loopback://b -> App.Two",
                "loopback://b -> App.Four",
                "loopback://a",
                "loopback://a -> App.Three",
            ]
        );
    }
}
