//! Core types: entity models, bus messages and view diffs.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// --- Entity Models ---

/// A consumer's subscription to one message type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// The logical consumer holding the subscription.
    pub endpoint_uri: String,

    /// Fully-qualified (possibly assembly-qualified) message type name.
    pub message_name: String,

    /// Distinguishes several subscriptions of one type on one endpoint.
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl Subscription {
    pub fn new(endpoint_uri: impl Into<String>, message_name: impl Into<String>) -> Self {
        Self {
            endpoint_uri: endpoint_uri.into(),
            message_name: message_name.into(),
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey {
            endpoint_uri: self.endpoint_uri.clone(),
            message_name: self.message_name.clone(),
        }
    }
}

/// Identity of a subscription view node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub endpoint_uri: String,
    pub message_name: String,
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.endpoint_uri, self.message_name)
    }
}

/// Health status reported for one bus participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub source_uri: String,
    pub state: String,
}

impl HealthRecord {
    pub fn new(source_uri: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            source_uri: source_uri.into(),
            state: state.into(),
        }
    }
}

/// A scheduled timeout owned by a workflow instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutEntry {
    pub correlation_id: Uuid,
    pub tag: i32,
    /// Transport time, always UTC.
    pub timeout_at: DateTime<Utc>,
}

impl TimeoutEntry {
    pub fn key(&self) -> TimeoutKey {
        TimeoutKey {
            correlation_id: self.correlation_id,
            tag: self.tag,
        }
    }
}

/// Identity of a timeout entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeoutKey {
    pub correlation_id: Uuid,
    pub tag: i32,
}

impl TimeoutKey {
    pub fn new(correlation_id: Uuid, tag: i32) -> Self {
        Self {
            correlation_id,
            tag,
        }
    }
}

impl fmt::Display for TimeoutKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.correlation_id, self.tag)
    }
}

/// Stored form of a subscription: the latest message plus its derived label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionNode {
    pub subscription: Subscription,
    pub description: String,
    pub system: bool,
}

/// Parent grouping node for all subscriptions of one endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointGroup {
    pub endpoint_uri: String,
    /// Live child subscriptions.
    pub subscriptions: usize,
}

// --- Bus Messages ---

/// Every message the dashboard consumes from the bus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    /// Authoritative full set of subscriptions.
    SubscriptionRefresh { subscriptions: Vec<Subscription> },

    AddSubscription { subscription: Subscription },

    RemoveSubscription { subscription: Subscription },

    /// Authoritative full set of health records.
    HealthUpdate { information: Vec<HealthRecord> },

    TimeoutScheduled {
        correlation_id: Uuid,
        tag: i32,
        timeout_at: DateTime<Utc>,
    },

    TimeoutRescheduled {
        correlation_id: Uuid,
        tag: i32,
        timeout_at: DateTime<Utc>,
    },

    TimeoutExpired { correlation_id: Uuid, tag: i32 },
}

impl BusEvent {
    pub fn kind(&self) -> MessageKind {
        match self {
            BusEvent::SubscriptionRefresh { .. } => MessageKind::SubscriptionRefresh,
            BusEvent::AddSubscription { .. } => MessageKind::AddSubscription,
            BusEvent::RemoveSubscription { .. } => MessageKind::RemoveSubscription,
            BusEvent::HealthUpdate { .. } => MessageKind::HealthUpdate,
            BusEvent::TimeoutScheduled { .. } => MessageKind::TimeoutScheduled,
            BusEvent::TimeoutRescheduled { .. } => MessageKind::TimeoutRescheduled,
            BusEvent::TimeoutExpired { .. } => MessageKind::TimeoutExpired,
        }
    }
}

/// Message kinds the dashboard subscribes to on the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    SubscriptionRefresh,
    AddSubscription,
    RemoveSubscription,
    HealthUpdate,
    TimeoutScheduled,
    TimeoutRescheduled,
    TimeoutExpired,
}

impl MessageKind {
    pub const ALL: [MessageKind; 7] = [
        MessageKind::SubscriptionRefresh,
        MessageKind::AddSubscription,
        MessageKind::RemoveSubscription,
        MessageKind::HealthUpdate,
        MessageKind::TimeoutScheduled,
        MessageKind::TimeoutRescheduled,
        MessageKind::TimeoutExpired,
    ];
}

/// Announces this client to the subscription service so it starts receiving
/// refresh/add/remove broadcasts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistration {
    pub client_id: Uuid,
    pub control_uri: String,
    pub data_uri: String,
}

// --- View Diffs ---

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Added,
    Updated,
    Removed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Parent grouping node of the subscription tree.
    Endpoint,
    Subscription,
    Health,
    Timeout,
}

/// Key of any rendered entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "entity", content = "key", rename_all = "snake_case")]
pub enum EntityKey {
    Endpoint(String),
    Subscription(SubscriptionKey),
    Health(String),
    Timeout(TimeoutKey),
}

impl EntityKey {
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityKey::Endpoint(_) => EntityType::Endpoint,
            EntityKey::Subscription(_) => EntityType::Subscription,
            EntityKey::Health(_) => EntityType::Health,
            EntityKey::Timeout(_) => EntityType::Timeout,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Endpoint(uri) => write!(f, "{}", uri),
            EntityKey::Subscription(key) => write!(f, "{}", key),
            EntityKey::Health(uri) => write!(f, "{}", uri),
            EntityKey::Timeout(key) => write!(f, "{}", key),
        }
    }
}

/// What the renderer shows for an entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayFields {
    Endpoint {
        endpoint_uri: String,
    },
    Subscription {
        endpoint_uri: String,
        message_name: String,
        description: String,
        /// Infrastructure-owned subscription; the renderer decides how to de-emphasize it.
        system: bool,
    },
    Health {
        source_uri: String,
        state: String,
    },
    Timeout {
        correlation_id: Uuid,
        tag: i32,
        timeout_at: DateTime<FixedOffset>,
        /// Long-time rendering of `timeout_at`, e.g. `14:05:09`.
        display_time: String,
    },
}

/// One entity change handed to the view sink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDiff {
    pub kind: DiffKind,
    pub key: EntityKey,
    /// Present for `Added` and `Updated`, absent for `Removed`.
    pub fields: Option<DisplayFields>,
}

impl ViewDiff {
    pub fn added(key: EntityKey, fields: DisplayFields) -> Self {
        Self {
            kind: DiffKind::Added,
            key,
            fields: Some(fields),
        }
    }

    pub fn updated(key: EntityKey, fields: DisplayFields) -> Self {
        Self {
            kind: DiffKind::Updated,
            key,
            fields: Some(fields),
        }
    }

    pub fn removed(key: EntityKey) -> Self {
        Self {
            kind: DiffKind::Removed,
            key,
            fields: None,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.key.entity_type()
    }
}
