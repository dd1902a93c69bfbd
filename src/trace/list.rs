//! Trace lists - append-only logs of trace events

use super::error::TraceError;
use super::event::TraceEvent;
use super::store::{TraceRecord, TraceStore};
use crate::core::listeners::ListenerRegistry;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Notified about changes in a trace list
pub trait TraceListListener: Send + Sync {
    fn event_added(&self, _list: &TraceList, _event: &Arc<TraceEvent>) {}

    fn changed_name(&self, _list: &TraceList, _name: &str) {}

    fn changed_description(&self, _list: &TraceList, _description: &str) {}
}

#[derive(Debug)]
struct Metadata {
    name: String,
    description: String,
}

/// An identified, ordered log of trace events.
///
/// Name and description are written to the backing store before they change
/// in memory; a rejected write leaves the list untouched.
pub struct TraceList {
    id: u64,
    /// Held across store writes so store and memory change in the same order
    metadata: Mutex<Metadata>,
    events: Mutex<Vec<Arc<TraceEvent>>>,
    store: Arc<dyn TraceStore>,
    listeners: ListenerRegistry<dyn TraceListListener>,
}

impl TraceList {
    pub fn new(
        id: u64,
        name: impl Into<String>,
        description: impl Into<String>,
        store: Arc<dyn TraceStore>,
    ) -> Self {
        Self {
            id,
            metadata: Mutex::new(Metadata {
                name: name.into(),
                description: description.into(),
            }),
            events: Mutex::new(Vec::new()),
            store,
            listeners: ListenerRegistry::new(),
        }
    }

    /// Rebuild a trace list from its stored form
    pub fn from_record(record: TraceRecord, store: Arc<dyn TraceStore>) -> Self {
        let list = Self::new(record.id, record.name, record.description, store);
        *list.events.lock() = record.events.into_iter().map(Arc::new).collect();
        list
    }

    /// Stored form of the current contents
    pub fn to_record(&self) -> TraceRecord {
        let metadata = self.metadata.lock();
        TraceRecord {
            id: self.id,
            name: metadata.name.clone(),
            description: metadata.description.clone(),
            events: self
                .events
                .lock()
                .iter()
                .map(|event| TraceEvent::clone(event))
                .collect(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> String {
        self.metadata.lock().name.clone()
    }

    pub fn description(&self) -> String {
        self.metadata.lock().description.clone()
    }

    /// Append an event to the end of the list
    pub fn add_event(&self, event: Arc<TraceEvent>) -> Result<(), TraceError> {
        {
            let mut events = self.events.lock();
            if events.iter().any(|e| Arc::ptr_eq(e, &event)) {
                return Err(TraceError::DuplicateEvent {
                    list: self.id,
                    address: event.address().clone(),
                });
            }
            events.push(event.clone());
        }

        self.listeners.notify(|l| l.event_added(self, &event));
        Ok(())
    }

    /// Snapshot of the events in insertion order
    pub fn events(&self) -> Vec<Arc<TraceEvent>> {
        self.events.lock().clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn set_name(&self, name: impl Into<String>) -> Result<(), TraceError> {
        let name = name.into();
        {
            let mut metadata = self.metadata.lock();
            self.store.set_name(self.id, &name)?;
            metadata.name = name.clone();
        }

        self.listeners.notify(|l| l.changed_name(self, &name));
        Ok(())
    }

    pub fn set_description(&self, description: impl Into<String>) -> Result<(), TraceError> {
        let description = description.into();
        {
            let mut metadata = self.metadata.lock();
            self.store.set_description(self.id, &description)?;
            metadata.description = description.clone();
        }

        self.listeners
            .notify(|l| l.changed_description(self, &description));
        Ok(())
    }

    pub fn add_listener(&self, listener: Arc<dyn TraceListListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn TraceListListener>) {
        self.listeners.remove(listener);
    }
}

impl fmt::Debug for TraceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metadata = self.metadata.lock();
        f.debug_struct("TraceList")
            .field("id", &self.id)
            .field("name", &metadata.name)
            .field("description", &metadata.description)
            .field("events", &self.events.lock().len())
            .finish()
    }
}
