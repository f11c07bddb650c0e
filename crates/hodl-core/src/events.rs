use serde::{Deserialize, Serialize};

/// A typed state-change record. Events are the only supported change feed for
/// external indexers; every handler emits at least one per mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub ty: String,
    pub module: String,
    pub attributes: Vec<(String, String)>,
}

impl Event {
    pub fn new(module: &str, ty: &str) -> Self {
        Self {
            ty: ty.to_string(),
            module: module.to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn attr(mut self, key: &str, value: impl ToString) -> Self {
        self.attributes.push((key.to_string(), value.to_string()));
        self
    }
}

/// Collects events during a transaction or block phase. Handler failure
/// discards the collected events along with the working cache; the auth
/// layer's events survive because they are emitted into a separate manager.
#[derive(Default, Debug)]
pub struct EventManager {
    events: Vec<Event>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}
