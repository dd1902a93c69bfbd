//! Trace list provider - lifecycle of the trace lists of one module or project

use super::error::TraceError;
use super::list::TraceList;
use super::store::TraceStore;
use crate::core::listeners::ListenerRegistry;
use parking_lot::Mutex;
use std::sync::Arc;

/// Notified when trace lists are created or deleted
pub trait TraceListProviderListener: Send + Sync {
    fn trace_added(&self, _trace: &Arc<TraceList>) {}

    fn trace_removed(&self, _trace: &Arc<TraceList>) {}
}

/// Owns the trace lists of a module or project and keeps them in sync with
/// the backing store.
pub struct TraceListProvider {
    /// Module or project the traces belong to
    owner: String,
    store: Arc<dyn TraceStore>,
    traces: Mutex<Vec<Arc<TraceList>>>,
    listeners: ListenerRegistry<dyn TraceListProviderListener>,
}

impl TraceListProvider {
    /// Open the provider, loading every trace list already in the store
    pub fn open(owner: impl Into<String>, store: Arc<dyn TraceStore>) -> Result<Self, TraceError> {
        let owner = owner.into();
        let traces: Vec<Arc<TraceList>> = store
            .load_all()?
            .into_iter()
            .map(|record| Arc::new(TraceList::from_record(record, store.clone())))
            .collect();

        log::info!("Loaded {} trace lists for {}", traces.len(), owner);

        Ok(Self {
            owner,
            store,
            traces: Mutex::new(traces),
            listeners: ListenerRegistry::new(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Create and register a new, empty trace list
    pub fn create_trace(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Arc<TraceList>, TraceError> {
        let name = name.into();
        let description = description.into();
        let id = self.store.create(&name, &description)?;
        let trace = Arc::new(TraceList::new(id, name, description, self.store.clone()));

        self.traces.lock().push(trace.clone());
        log::info!("Created trace list {} ({})", trace.id(), trace.name());
        self.listeners.notify(|l| l.trace_added(&trace));
        Ok(trace)
    }

    /// Delete a trace list from the store and the provider
    pub fn remove_trace(&self, trace: &Arc<TraceList>) -> Result<(), TraceError> {
        if !self.contains(trace) {
            return Err(TraceError::UnknownTrace { id: trace.id() });
        }
        self.store.delete(trace.id())?;
        self.traces.lock().retain(|t| !Arc::ptr_eq(t, trace));

        log::info!("Removed trace list {}", trace.id());
        self.listeners.notify(|l| l.trace_removed(trace));
        Ok(())
    }

    /// Write the events of a trace list to the store
    pub fn save(&self, trace: &TraceList) -> Result<(), TraceError> {
        self.store.save(&trace.to_record())?;
        log::debug!(
            "Saved trace list {} with {} events",
            trace.id(),
            trace.event_count()
        );
        Ok(())
    }

    /// All trace lists in creation order
    pub fn traces(&self) -> Vec<Arc<TraceList>> {
        self.traces.lock().clone()
    }

    pub fn trace(&self, id: u64) -> Option<Arc<TraceList>> {
        self.traces.lock().iter().find(|t| t.id() == id).cloned()
    }

    pub fn trace_count(&self) -> usize {
        self.traces.lock().len()
    }

    pub fn contains(&self, trace: &Arc<TraceList>) -> bool {
        self.traces.lock().iter().any(|t| Arc::ptr_eq(t, trace))
    }

    pub fn add_listener(&self, listener: Arc<dyn TraceListProviderListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn TraceListProviderListener>) {
        self.listeners.remove(listener);
    }
}
