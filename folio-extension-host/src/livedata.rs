//! Live data objects: mutable containers bound into the document's
//! variable environment.
//!
//! A live data object is owned by the mediator session and mutated only by
//! the reconciliation engine; the document environment receives a
//! [`LiveDataHandle`] for read access.

use crate::definitions::{LiveDataKind, LiveDataObjectDefinition};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};

/// The mutable container behind a live data object.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveDataContainer {
    Array(Vec<Value>),
    Map(Map<String, Value>),
}

impl LiveDataContainer {
    /// Creates the empty container for `kind`.
    pub fn empty(kind: LiveDataKind) -> Self {
        match kind {
            LiveDataKind::Array => LiveDataContainer::Array(Vec::new()),
            LiveDataKind::Map => LiveDataContainer::Map(Map::new()),
        }
    }

    /// Number of elements or entries.
    pub fn len(&self) -> usize {
        match self {
            LiveDataContainer::Array(items) => items.len(),
            LiveDataContainer::Map(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full contents as a JSON value.
    pub fn snapshot(&self) -> Value {
        match self {
            LiveDataContainer::Array(items) => Value::Array(items.clone()),
            LiveDataContainer::Map(entries) => Value::Object(entries.clone()),
        }
    }
}

/// Kinds of applied live-data operations, used to key event policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveDataOperationKind {
    Insert,
    Update,
    Remove,
    Clear,
    Set,
}

impl LiveDataOperationKind {
    /// The event-policy key this operation kind reports through.
    /// A `Clear` is reported through the `remove` policy when one is bound.
    pub fn policy_key(&self) -> &'static str {
        match self {
            LiveDataOperationKind::Insert => "add",
            LiveDataOperationKind::Update => "update",
            LiveDataOperationKind::Remove | LiveDataOperationKind::Clear => "remove",
            LiveDataOperationKind::Set => "set",
        }
    }
}

/// One applied operation, retained for the duration of one batch.
///
/// `index` is adjusted as later operations in the same batch shift array
/// elements, so it always points at the element the record produced, or is
/// `None` once that element is gone.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub kind: LiveDataOperationKind,
    pub index: Option<usize>,
    pub key: Option<String>,
    pub value: Value,
}

/// A live data object: definition plus current container state.
#[derive(Debug)]
pub struct LiveDataObject {
    definition: Arc<LiveDataObjectDefinition>,
    container: LiveDataContainer,
}

impl LiveDataObject {
    /// Creates an empty object for `definition`.
    pub fn new(definition: Arc<LiveDataObjectDefinition>) -> Self {
        let container = LiveDataContainer::empty(definition.kind);
        Self {
            definition,
            container,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn uri(&self) -> &str {
        &self.definition.uri
    }

    pub fn kind(&self) -> LiveDataKind {
        self.definition.kind
    }

    pub fn definition(&self) -> &Arc<LiveDataObjectDefinition> {
        &self.definition
    }

    pub fn container(&self) -> &LiveDataContainer {
        &self.container
    }

    /// Replaces the container. Reconciliation-engine use only: batches are
    /// applied to a working copy and committed whole.
    pub(crate) fn commit(&mut self, container: LiveDataContainer) {
        self.container = container;
    }
}

/// Shared read view of a live data object, handed to the document
/// environment at bind time.
#[derive(Clone)]
pub struct LiveDataHandle {
    object: Arc<Mutex<LiveDataObject>>,
}

impl LiveDataHandle {
    pub(crate) fn new(object: Arc<Mutex<LiveDataObject>>) -> Self {
        Self { object }
    }

    pub fn name(&self) -> String {
        self.object.lock().expect("live data lock").name().to_string()
    }

    pub fn kind(&self) -> LiveDataKind {
        self.object.lock().expect("live data lock").kind()
    }

    pub fn len(&self) -> usize {
        self.object.lock().expect("live data lock").container().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full contents as a JSON value.
    pub fn snapshot(&self) -> Value {
        self.object.lock().expect("live data lock").container().snapshot()
    }
}
