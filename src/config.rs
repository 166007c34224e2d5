//! Dashboard configuration.

use crate::error::{Result, ViewError};
use chrono::{FixedOffset, Local, Offset};
use serde::Deserialize;
use uuid::Uuid;

/// Dashboard configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Where the client registration is sent at startup.
    pub subscription_service_uri: String,

    /// Identity announced to the subscription service.
    pub client_id: Uuid,

    /// Offset of the display time zone, in seconds east of UTC.
    pub utc_offset_seconds: i32,

    /// Message types under this namespace are flagged as system subscriptions.
    pub system_namespace: String,

    /// Max queued events (None = unbounded). Overflow drops events.
    pub queue_capacity: Option<usize>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            subscription_service_uri: "msmq://localhost/mt_subscriptions".to_string(),
            client_id: Uuid::new_v4(),
            utc_offset_seconds: 0,
            system_namespace: "MassTransit".to_string(),
            queue_capacity: None,
        }
    }
}

impl DashboardConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: DashboardConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the dashboard cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.local_offset()?;
        if self.queue_capacity == Some(0) {
            return Err(ViewError::InvalidConfig(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Default configuration displaying times in the host's current zone.
    pub fn with_system_offset() -> Self {
        Self {
            utc_offset_seconds: Local::now().offset().fix().local_minus_utc(),
            ..Default::default()
        }
    }

    pub fn local_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_seconds).ok_or_else(|| {
            ViewError::InvalidConfig(format!(
                "utc offset out of range: {}s",
                self.utc_offset_seconds
            ))
        })
    }
}
