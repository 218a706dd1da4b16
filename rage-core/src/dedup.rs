use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rage_channels::EventId;
use std::sync::Arc;

/// Tracks webhook deliveries currently being handled by this process.
///
/// Only guards against *concurrent* redelivery: once a delivery finishes its
/// id is forgotten, and a later redelivery is evaluated again.
#[derive(Debug, Clone, Default)]
pub struct InboundDeduplicator {
    in_flight: Arc<DashMap<EventId, ()>>,
}

#[derive(Debug)]
pub enum Admission {
    Admitted(InFlightGuard),
    AlreadyInFlight,
}

/// Marks an event id as in flight until dropped.
#[derive(Debug)]
#[must_use = "the event is released as soon as the guard is dropped"]
pub struct InFlightGuard {
    in_flight: Arc<DashMap<EventId, ()>>,
    event_id: EventId,
}

impl InFlightGuard {
    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    pub fn release(self) {}
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.event_id);
        tracing::debug!(event_id = %self.event_id, "inbound event released");
    }
}

impl InboundDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&self, event_id: &EventId) -> Admission {
        match self.in_flight.entry(event_id.clone()) {
            Entry::Occupied(_) => Admission::AlreadyInFlight,
            Entry::Vacant(slot) => {
                slot.insert(());
                Admission::Admitted(InFlightGuard {
                    in_flight: Arc::clone(&self.in_flight),
                    event_id: event_id.clone(),
                })
            }
        }
    }

    pub fn is_in_flight(&self, event_id: &EventId) -> bool {
        self.in_flight.contains_key(event_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
