//! Managed object records

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runtime::Runtime;
use crate::scope::ScopeId;

/// Object id: `<type>:<random hex>` unless given explicitly
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Activation predicate evaluated against the runtime
pub type Cond = Rc<dyn Fn(&Runtime, &ObjectId) -> bool>;

/// Per-type state attached to an object, keyed by its Rust type
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any>>,
}

impl Extensions {
    pub fn insert<T: 'static>(&mut self, value: T) {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

/// Current value of a `resolve`/`resolve_all` slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    One(Option<ObjectId>),
    Many(Vec<ObjectId>),
}

/// A configured object and its reactive state
pub struct ManagedObject {
    pub(crate) id: ObjectId,
    pub(crate) scope: ScopeId,

    /// Persisted configuration. Always a JSON object with a string `type`.
    pub cfg: Value,

    /// Exempt from garbage collection
    pub sticky: bool,

    /// Exempt from persistence and the live state projection
    pub ephemeral: bool,

    /// Referencing object id to reference count
    pub(crate) refs: BTreeMap<ObjectId, u32>,

    pub(crate) has_error: bool,
    pub(crate) restarting: bool,
    pub(crate) destroying: bool,

    pub(crate) resolved: HashMap<String, Resolved>,

    /// Activation name to start time, `None` while inactive
    pub(crate) activations: BTreeMap<String, Option<SystemTime>>,

    /// Feature predicate used by activations that bring no condition
    pub(crate) predicate: Option<Cond>,

    pub ext: Extensions,
}

impl ManagedObject {
    pub(crate) fn new(id: ObjectId, scope: ScopeId, cfg: Value) -> Self {
        Self {
            id,
            scope,
            cfg,
            sticky: false,
            ephemeral: false,
            refs: BTreeMap::new(),
            has_error: false,
            restarting: false,
            destroying: false,
            resolved: HashMap::new(),
            activations: BTreeMap::new(),
            predicate: None,
            ext: Extensions::default(),
        }
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// The `type` field of the configuration
    pub fn type_name(&self) -> &str {
        self.cfg.get("type").and_then(Value::as_str).unwrap_or("unknown")
    }

    pub fn refs(&self) -> &BTreeMap<ObjectId, u32> {
        &self.refs
    }

    /// Reference count held by `from`
    pub fn ref_count(&self, from: &ObjectId) -> u32 {
        self.refs.get(from).copied().unwrap_or(0)
    }

    pub fn has_error(&self) -> bool {
        self.has_error
    }

    pub fn is_restarting(&self) -> bool {
        self.restarting
    }

    pub fn activations(&self) -> &BTreeMap<String, Option<SystemTime>> {
        &self.activations
    }

    /// Whether any activation on this object is currently running
    pub fn is_active(&self) -> bool {
        self.activations.values().any(Option::is_some)
    }

    /// String field of the configuration
    pub fn cfg_str(&self, key: &str) -> Option<&str> {
        self.cfg.get(key).and_then(Value::as_str)
    }

    pub(crate) fn is_collectible(&self) -> bool {
        !self.sticky && !self.destroying && self.refs.is_empty()
    }
}

impl fmt::Debug for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedObject")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("cfg", &self.cfg)
            .field("sticky", &self.sticky)
            .field("ephemeral", &self.ephemeral)
            .field("refs", &self.refs)
            .field("has_error", &self.has_error)
            .field("restarting", &self.restarting)
            .field("activations", &self.activations)
            .finish_non_exhaustive()
    }
}
