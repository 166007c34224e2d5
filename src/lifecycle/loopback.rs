//! In-process bus for headless runs and tests.

use super::controller::ServiceBus;
use crate::dispatch::EventProducer;
use crate::error::{Result, ViewError};
use crate::types::{BusEvent, ClientRegistration, MessageKind};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct LoopbackState {
    producer: Option<EventProducer>,
    kinds: Vec<MessageKind>,
    registrations: Vec<(String, ClientRegistration)>,
    unsubscribes: usize,
    closed: bool,
    fail_subscribe: Option<String>,
    fail_registration: Option<String>,
}

/// A bus that delivers whatever is published on it straight to the
/// subscribed producer.
///
/// Clones share state, so one clone can be handed to a
/// [`LifecycleController`](super::LifecycleController) while another
/// publishes and inspects.
#[derive(Clone, Debug)]
pub struct LoopbackBus {
    endpoint_uri: String,
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackBus {
    pub fn new(endpoint_uri: impl Into<String>) -> Self {
        Self {
            endpoint_uri: endpoint_uri.into(),
            state: Arc::new(Mutex::new(LoopbackState::default())),
        }
    }

    /// Make `subscribe` fail with a transport error.
    pub fn failing_subscribe(self, reason: impl Into<String>) -> Self {
        self.state.lock().fail_subscribe = Some(reason.into());
        self
    }

    /// Make `send_registration` fail.
    pub fn failing_registration(self, reason: impl Into<String>) -> Self {
        self.state.lock().fail_registration = Some(reason.into());
        self
    }

    /// Deliver an event as the bus would, from the calling thread.
    ///
    /// Returns `Ok(false)` when nobody is subscribed to its kind.
    pub fn publish(&self, event: BusEvent) -> Result<bool> {
        let producer = {
            let state = self.state.lock();
            match &state.producer {
                Some(producer) if state.kinds.contains(&event.kind()) => producer.clone(),
                _ => return Ok(false),
            }
        };
        producer.enqueue(event)?;
        Ok(true)
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.lock().producer.is_some()
    }

    pub fn subscribed_kinds(&self) -> Vec<MessageKind> {
        self.state.lock().kinds.clone()
    }

    /// Registrations sent so far, with their destinations.
    pub fn registrations(&self) -> Vec<(String, ClientRegistration)> {
        self.state.lock().registrations.clone()
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.state.lock().unsubscribes
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl ServiceBus for LoopbackBus {
    fn endpoint_uri(&self) -> String {
        self.endpoint_uri.clone()
    }

    fn subscribe(&mut self, kinds: &[MessageKind], producer: EventProducer) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.fail_subscribe {
            return Err(ViewError::Transport(reason.clone()));
        }
        state.kinds = kinds.to_vec();
        state.producer = Some(producer);
        state.closed = false;
        debug!(endpoint = %self.endpoint_uri, kinds = kinds.len(), "loopback subscribed");
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.producer = None;
        state.kinds.clear();
        state.unsubscribes += 1;
        Ok(())
    }

    fn send_registration(
        &mut self,
        destination: &str,
        registration: &ClientRegistration,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.fail_registration {
            return Err(ViewError::Registration {
                destination: destination.to_string(),
                reason: reason.clone(),
            });
        }
        state
            .registrations
            .push((destination.to_string(), registration.clone()));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}
