//! Object store
//!
//! Every configured thing (source, scene, mixer, clock, ...) is a
//! [`ManagedObject`] with its own scope under the root. Objects reference
//! each other by id and keep a per-referrer count in the target:
//!
//! ```text
//!   scene:1 ──2──► source:video:cam      refs = { scene:1: 2 }
//!   mixer:1 ──1──► scene:1               refs = { mixer:1: 1, root:livecast: 1 }
//! ```
//!
//! After each settled digest, objects that are neither sticky nor
//! referenced are destroyed.

mod activation;
mod object;
mod resolve;

use std::collections::BTreeMap;
use std::rc::Rc;

use rand::Rng;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::runtime::{Disposer, Runtime};
use crate::scope::GraphContext;

pub use activation::Activation;
pub use object::{Cond, Extensions, ManagedObject, ObjectId, Resolved};

type CreateHook = Rc<dyn Fn(&mut Runtime, &ObjectId)>;

/// Type filter of a creation hook
///
/// A filter ending in `:` matches every type it prefixes; any other filter
/// matches exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeFilter(String);

impl TypeFilter {
    pub fn new(filter: impl Into<String>) -> Self {
        Self(filter.into())
    }

    pub fn matches(&self, type_name: &str) -> bool {
        if self.0.ends_with(':') {
            type_name.starts_with(&self.0)
        } else {
            type_name == self.0
        }
    }
}

struct HookEntry {
    id: u64,
    filter: TypeFilter,
    func: CreateHook,
}

/// Objects by id, plus the creation hooks
#[derive(Default)]
pub struct ObjectStore {
    objects: BTreeMap<ObjectId, ManagedObject>,
    hooks: Vec<HookEntry>,
    next_hook: u64,
}

impl ObjectStore {
    pub fn get(&self, id: &ObjectId) -> Option<&ManagedObject> {
        self.objects.get(id)
    }

    pub fn get_mut(&mut self, id: &ObjectId) -> Option<&mut ManagedObject> {
        self.objects.get_mut(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedObject> {
        self.objects.values()
    }

    fn generate_id(&self, type_name: &str) -> ObjectId {
        let mut rng = rand::thread_rng();
        loop {
            let id = ObjectId::new(format!("{}:{:016x}", type_name, rng.gen::<u64>()));
            if !self.objects.contains_key(&id) {
                return id;
            }
        }
    }

    fn hooks_for(&self, type_name: &str) -> Vec<CreateHook> {
        self.hooks
            .iter()
            .filter(|hook| hook.filter.matches(type_name))
            .map(|hook| Rc::clone(&hook.func))
            .collect()
    }
}

/// Make `cfg` a JSON object carrying a string `type`
fn normalize_cfg(cfg: Value) -> Value {
    let mut map = match cfg {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if !map.get("type").is_some_and(Value::is_string) {
        map.insert("type".into(), Value::from("unknown"));
    }
    Value::Object(map)
}

impl Runtime {
    pub fn objects(&self) -> &ObjectStore {
        &self.store
    }

    pub fn object(&self, id: &ObjectId) -> Option<&ManagedObject> {
        self.store.get(id)
    }

    pub fn object_mut(&mut self, id: &ObjectId) -> Option<&mut ManagedObject> {
        self.store.get_mut(id)
    }

    /// Per-type state of an object
    pub fn ext<T: 'static>(&self, id: &ObjectId) -> Option<&T> {
        self.store.get(id).and_then(|obj| obj.ext.get::<T>())
    }

    pub fn ext_mut<T: 'static>(&mut self, id: &ObjectId) -> Option<&mut T> {
        self.store.get_mut(id).and_then(|obj| obj.ext.get_mut::<T>())
    }

    /// Register a creation hook for types matching `filter`
    ///
    /// Hooks run in registration order, only for objects created later.
    pub fn on_create(
        &mut self,
        filter: impl Into<String>,
        hook: impl Fn(&mut Runtime, &ObjectId) + 'static,
    ) -> Disposer {
        let id = self.store.next_hook;
        self.store.next_hook += 1;
        self.store.hooks.push(HookEntry {
            id,
            filter: TypeFilter::new(filter),
            func: Rc::new(hook),
        });

        Disposer::new(move |rt| rt.store.hooks.retain(|hook| hook.id != id))
    }

    /// Create an object and run the matching creation hooks
    ///
    /// Without an explicit id one is generated as `<type>:<random>`.
    pub fn create(&mut self, cfg: Value, id: Option<ObjectId>) -> Result<ObjectId> {
        let cfg = normalize_cfg(cfg);
        let type_name = cfg
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let id = match id {
            Some(id) if self.store.contains(&id) => return Err(Error::DuplicateId(id)),
            Some(id) => id,
            None => self.store.generate_id(&type_name),
        };

        let scope = self.graph_mut().new_root_child();
        self.store
            .objects
            .insert(id.clone(), ManagedObject::new(id.clone(), scope, cfg));
        tracing::trace!(obj = %id, kind = %type_name, "Object created");

        for hook in self.store.hooks_for(&type_name) {
            if !self.store.contains(&id) {
                break;
            }
            hook(self, &id);
        }

        self.mark();
        Ok(id)
    }

    /// Destroy an object
    ///
    /// Listeners see `Destroy` while the object still exists; they release
    /// references and stop activations. Any reference the object still holds
    /// afterwards is dropped.
    pub fn destroy(&mut self, id: &ObjectId) -> Result<()> {
        let obj = self
            .store
            .get_mut(id)
            .ok_or_else(|| Error::ObjectNotFound(id.clone()))?;
        if obj.destroying {
            return Ok(());
        }
        obj.destroying = true;
        let scope = obj.scope;

        self.destroy_scope(scope);
        self.store.objects.remove(id);

        let mut dangling = 0;
        for obj in self.store.objects.values_mut() {
            if obj.refs.remove(id).is_some() {
                dangling += 1;
            }
        }
        if dangling > 0 {
            tracing::debug!(obj = %id, targets = dangling, "Released references left by destroyed object");
        }

        tracing::trace!(obj = %id, "Object destroyed");
        self.mark();
        Ok(())
    }

    /// Destroy every non-sticky object nobody references
    pub fn gc(&mut self) -> usize {
        let garbage: Vec<ObjectId> = self
            .store
            .iter()
            .filter(|obj| obj.is_collectible())
            .map(|obj| obj.id.clone())
            .collect();

        let mut collected = 0;
        for id in garbage {
            let still_garbage = self.store.get(&id).is_some_and(ManagedObject::is_collectible);
            if still_garbage && self.destroy(&id).is_ok() {
                collected += 1;
            }
        }

        if collected > 0 {
            tracing::debug!(collected = collected, "Garbage collected objects");
        }
        collected
    }

    /// Count one more reference from `from` to `target`
    ///
    /// A missing target is ignored.
    pub fn add_ref(&mut self, target: &ObjectId, from: &ObjectId) {
        let Some(obj) = self.store.get_mut(target) else {
            return;
        };
        let count = obj.refs.entry(from.clone()).or_insert(0);
        *count += 1;
        tracing::trace!(obj = %target, from = %from, count = *count, "Ref");
        self.mark();
    }

    /// Drop one reference from `from` to `target`, removing the edge at zero
    pub fn remove_ref(&mut self, target: &ObjectId, from: &ObjectId) {
        let Some(obj) = self.store.get_mut(target) else {
            return;
        };
        let remaining = match obj.refs.get_mut(from) {
            Some(count) if *count > 1 => {
                *count -= 1;
                *count
            }
            Some(_) => {
                obj.refs.remove(from);
                0
            }
            None => return,
        };
        tracing::trace!(obj = %target, from = %from, count = remaining, "Unref");
        self.mark();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::native::testing::NullBackend;
    use crate::scope::EventKind;

    fn runtime() -> Runtime {
        Runtime::new(Rc::new(NullBackend), RuntimeConfig::default())
    }

    #[test]
    fn test_type_filter() {
        let category = TypeFilter::new("source:");
        assert!(category.matches("source:video:test"));
        assert!(category.matches("source:"));
        assert!(!category.matches("sources"));

        let exact = TypeFilter::new("source:video");
        assert!(exact.matches("source:video"));
        assert!(!exact.matches("source:video:test"));
    }

    #[test]
    fn test_create_generates_typed_id() {
        let mut rt = runtime();

        let id = rt.create(json!({"type": "scene"}), None).unwrap();
        assert!(id.as_str().starts_with("scene:"));

        let unknown = rt.create(json!({}), None).unwrap();
        assert!(unknown.as_str().starts_with("unknown:"));
        assert_eq!(rt.object(&unknown).unwrap().type_name(), "unknown");
    }

    #[test]
    fn test_create_with_existing_id_fails() {
        let mut rt = runtime();
        let id = ObjectId::from("scene:main");

        rt.create(json!({"type": "scene"}), Some(id.clone())).unwrap();
        let result = rt.create(json!({"type": "scene"}), Some(id.clone()));

        assert!(matches!(result, Err(Error::DuplicateId(dup)) if dup == id));
    }

    #[test]
    fn test_hooks_run_in_order_for_matching_types() {
        let mut rt = runtime();
        let log = Rc::new(std::cell::RefCell::new(Vec::new()));

        for (filter, name) in [("source:", "category"), ("source:video:", "video"), ("scene", "scene")] {
            let log = log.clone();
            rt.on_create(filter, move |_, _| log.borrow_mut().push(name));
        }

        rt.create(json!({"type": "source:video:test"}), None).unwrap();
        assert_eq!(*log.borrow(), vec!["category", "video"]);
    }

    #[test]
    fn test_disposed_hook_no_longer_runs() {
        let mut rt = runtime();
        let hits = Rc::new(std::cell::Cell::new(0));

        let counter = hits.clone();
        let disposer = rt.on_create("scene", move |_, _| counter.set(counter.get() + 1));
        rt.create(json!({"type": "scene"}), None).unwrap();
        disposer.dispose(&mut rt);
        rt.create(json!({"type": "scene"}), None).unwrap();

        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_ref_counting_removes_edge_at_zero() {
        let mut rt = runtime();
        let a = rt.create(json!({"type": "a"}), None).unwrap();
        let b = rt.create(json!({"type": "b"}), None).unwrap();

        rt.add_ref(&b, &a);
        rt.add_ref(&b, &a);
        assert_eq!(rt.object(&b).unwrap().ref_count(&a), 2);

        rt.remove_ref(&b, &a);
        assert_eq!(rt.object(&b).unwrap().ref_count(&a), 1);

        rt.remove_ref(&b, &a);
        assert!(rt.object(&b).unwrap().refs().is_empty());

        // extra unrefs and unrefs of missing objects do nothing
        rt.remove_ref(&b, &a);
        rt.add_ref(&ObjectId::from("missing:1"), &a);
        assert!(rt.object(&b).unwrap().refs().is_empty());
    }

    #[test]
    fn test_gc_collects_unreferenced_non_sticky() {
        let mut rt = runtime();
        let keeper = rt.create(json!({"type": "keeper"}), None).unwrap();
        rt.object_mut(&keeper).unwrap().sticky = true;
        let held = rt.create(json!({"type": "held"}), None).unwrap();
        rt.add_ref(&held, &keeper);
        let loose = rt.create(json!({"type": "loose"}), None).unwrap();

        rt.settle();

        assert!(rt.object(&keeper).is_some());
        assert!(rt.object(&held).is_some());
        assert!(rt.object(&loose).is_none());
    }

    #[test]
    fn test_destroy_emits_destroy_and_releases_held_refs() {
        let mut rt = runtime();
        let target = rt.create(json!({"type": "target"}), None).unwrap();
        rt.object_mut(&target).unwrap().sticky = true;
        let holder = rt.create(json!({"type": "holder"}), None).unwrap();
        rt.add_ref(&target, &holder);
        let scope = rt.object(&holder).unwrap().scope();

        let seen = Rc::new(std::cell::Cell::new(false));
        let flag = seen.clone();
        let id = holder.clone();
        rt.on(scope, EventKind::Destroy, move |rt, _| flag.set(rt.object(&id).is_some()));

        rt.destroy(&holder).unwrap();

        assert!(seen.get());
        assert!(rt.object(&holder).is_none());
        assert!(rt.object(&target).unwrap().refs().is_empty());
        assert!(!rt.graph().is_live(scope));
        assert!(matches!(rt.destroy(&holder), Err(Error::ObjectNotFound(_))));
    }
}
