//! Lifecycle controller and the bus seam it drives.

use crate::config::DashboardConfig;
use crate::dispatch::{DispatchHandle, DispatchQueue, EventProducer};
use crate::error::{Result, ViewError};
use crate::reconcile::Reconciler;
use crate::sink::ViewSink;
use crate::types::{ClientRegistration, MessageKind};
use tracing::{error, info, warn};

/// The message-bus transport, as seen by the dashboard.
///
/// Implementations route every delivered message of a subscribed kind to
/// [`EventProducer::enqueue`] unchanged, from whatever thread they like.
pub trait ServiceBus: Send {
    /// This client's own inbound address.
    fn endpoint_uri(&self) -> String;

    /// Start delivering `kinds` to `producer`.
    fn subscribe(&mut self, kinds: &[MessageKind], producer: EventProducer) -> Result<()>;

    /// Stop delivering to this client. Called at most once per subscribe.
    fn unsubscribe(&mut self) -> Result<()>;

    /// Send the one-time client registration to `destination`.
    fn send_registration(
        &mut self,
        destination: &str,
        registration: &ClientRegistration,
    ) -> Result<()>;

    /// Release the transport. Called last during shutdown.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Owns the bus registration and the dispatch queue.
///
/// Dropping a running controller stops it.
pub struct LifecycleController<B: ServiceBus> {
    config: DashboardConfig,
    bus: B,
    dispatch: Option<DispatchHandle>,
}

impl<B: ServiceBus> LifecycleController<B> {
    pub fn new(config: DashboardConfig, bus: B) -> Self {
        Self {
            config,
            bus,
            dispatch: None,
        }
    }

    /// Spawn the dispatch queue feeding `sink`, subscribe to the bus and
    /// register with the subscription service.
    ///
    /// On failure everything started so far is torn down and the error is
    /// returned.
    pub fn start<S>(&mut self, sink: S) -> Result<()>
    where
        S: ViewSink + 'static,
    {
        if self.dispatch.is_some() {
            return Err(ViewError::AlreadyStarted);
        }

        self.config.validate()?;
        let reconciler = Reconciler::from_config(&self.config)?;
        let mut dispatch = DispatchQueue::spawn(reconciler, sink, self.config.queue_capacity)?;

        if let Err(e) = self.bus.subscribe(&MessageKind::ALL, dispatch.producer()) {
            error!(error = %e, "bus subscription failed");
            if let Err(stop) = dispatch.stop() {
                warn!(error = %stop, "dispatch stop after failed subscription");
            }
            return Err(e);
        }

        let endpoint_uri = self.bus.endpoint_uri();
        let registration = ClientRegistration {
            client_id: self.config.client_id,
            control_uri: endpoint_uri.clone(),
            data_uri: endpoint_uri,
        };
        let destination = self.config.subscription_service_uri.clone();

        if let Err(e) = self.bus.send_registration(&destination, &registration) {
            error!(error = %e, %destination, "client registration failed");
            dispatch.halt();
            if let Err(unsub) = self.bus.unsubscribe() {
                warn!(error = %unsub, "unsubscribe after failed registration");
            }
            if let Err(stop) = dispatch.stop() {
                warn!(error = %stop, "dispatch stop after failed registration");
            }
            return Err(e);
        }

        info!(
            client_id = %registration.client_id,
            endpoint = %registration.data_uri,
            %destination,
            "dashboard registered"
        );
        self.dispatch = Some(dispatch);
        Ok(())
    }

    /// Deregister from the bus and stop the dispatch queue.
    ///
    /// Every step runs; the first error encountered is returned.
    pub fn stop(&mut self) -> Result<()> {
        let mut dispatch = self.dispatch.take().ok_or(ViewError::NotStarted)?;

        // No event is applied once deregistration begins.
        dispatch.halt();
        let unsubscribed = self.bus.unsubscribe();
        if let Err(e) = &unsubscribed {
            warn!(error = %e, "bus unsubscribe failed");
        }

        let stopped = dispatch.stop();
        let applied = dispatch.applied_count();
        drop(dispatch);

        let closed = self.bus.close();
        if let Err(e) = &closed {
            warn!(error = %e, "bus close failed");
        }

        info!(applied, "dashboard stopped");
        unsubscribed.and(stopped).and(closed)
    }

    pub fn is_running(&self) -> bool {
        self.dispatch.is_some()
    }

    /// The running dispatch queue, for its counters.
    pub fn dispatch(&self) -> Option<&DispatchHandle> {
        self.dispatch.as_ref()
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B: ServiceBus> Drop for LifecycleController<B> {
    fn drop(&mut self) {
        if self.dispatch.is_some() {
            if let Err(e) = self.stop() {
                warn!(error = %e, "dashboard did not stop cleanly");
            }
        }
    }
}
