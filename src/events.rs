use crate::rocket::Collection;
use chrono::{DateTime, Utc};
#[cfg(test)]
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Debug, Clone)]
pub enum EventKind {
    MethodCalled {
        method: &'static str,
        params: Collection,
    },
    CallbackReceived {
        params: Option<Collection>,
    },
    PayStarted {
        plugins: Vec<&'static str>,
        params: Collection,
    },
    ApiRequesting {
        method: String,
        url: String,
    },
    ApiRequested {
        status: u16,
    },
    PayFinish,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub provider: &'static str,
    pub occurred_at: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(provider: &'static str, kind: EventKind) -> Self {
        Self {
            provider,
            occurred_at: Utc::now(),
            kind,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self.kind {
            EventKind::MethodCalled { .. } => "MethodCalled",
            EventKind::CallbackReceived { .. } => "CallbackReceived",
            EventKind::PayStarted { .. } => "PayStarted",
            EventKind::ApiRequesting { .. } => "ApiRequesting",
            EventKind::ApiRequested { .. } => "ApiRequested",
            EventKind::PayFinish => "PayFinish",
        }
    }
}

/// Fire-and-forget event sink.
pub trait EventDispatcher: Send + Sync {
    fn publish(&self, event: Event);
}

/// Default sink: one `info!` line per event.
#[derive(Default)]
pub struct TracingDispatcher;

impl EventDispatcher for TracingDispatcher {
    fn publish(&self, event: Event) {
        match &event.kind {
            EventKind::MethodCalled { method, .. } => {
                info!(provider = event.provider, method, "{}", event.event_type())
            }
            EventKind::ApiRequesting { method, url } => {
                info!(provider = event.provider, %method, %url, "{}", event.event_type())
            }
            EventKind::ApiRequested { status } => {
                info!(provider = event.provider, status, "{}", event.event_type())
            }
            _ => info!(provider = event.provider, "{}", event.event_type()),
        }
    }
}

#[cfg(test)]
#[derive(Default, Clone)]
pub(crate) struct RecordingDispatcher {
    events: Arc<Mutex<Vec<Event>>>,
}

#[cfg(test)]
impl RecordingDispatcher {
    pub(crate) fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .map(|events| events.iter().map(Event::event_type).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
impl EventDispatcher for RecordingDispatcher {
    fn publish(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
