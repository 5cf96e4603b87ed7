//! Declarative references between objects
//!
//! `resolve` keeps one slot pointing at whatever object an id getter names,
//! `resolve_all` keeps a list. Either way the owner holds exactly one
//! reference on a target per slot entry pointing at it, and gives them back
//! when the getter changes, when the target disappears, when the resolution
//! is disposed, or when the owner is destroyed.

use serde_json::Value;

use super::{ObjectId, Resolved};
use crate::runtime::{Disposer, Runtime};
use crate::scope::EventKind;

/// `scenes` -> `scene`
fn singular(name: &str) -> &str {
    name.strip_suffix('s').unwrap_or(name)
}

impl Runtime {
    /// Resolve `cfg[name + "Id"]` into the slot `name`
    pub fn resolve(&mut self, owner: &ObjectId, name: &str) -> Disposer {
        let key = format!("{name}Id");
        let from = owner.clone();
        self.resolve_with(
            owner,
            name,
            move |rt| {
                rt.object(&from)
                    .and_then(|obj| obj.cfg_str(&key))
                    .map(ObjectId::from)
            },
            |_, _, _| {},
        )
    }

    /// Resolve whatever id `get` returns into the slot `name`
    ///
    /// `on_change(current, previous)` runs after the references moved.
    pub fn resolve_with<G, F>(&mut self, owner: &ObjectId, name: &str, get: G, mut on_change: F) -> Disposer
    where
        G: Fn(&Runtime) -> Option<ObjectId> + 'static,
        F: FnMut(&mut Runtime, Option<&ObjectId>, Option<&ObjectId>) + 'static,
    {
        let Some(scope) = self.object(owner).map(|obj| obj.scope()) else {
            return Disposer::noop();
        };
        self.set_resolved(owner, name, Resolved::One(None));

        let (from, slot) = (owner.clone(), name.to_string());
        let watcher = self.watch_value(
            scope,
            move |rt| get(rt).filter(|id| rt.objects().contains(id)),
            move |rt, current: &Option<ObjectId>, _| {
                let previous = match rt.set_resolved(&from, &slot, Resolved::One(current.clone())) {
                    Some(Resolved::One(previous)) => previous,
                    _ => None,
                };
                if let Some(target) = current {
                    rt.add_ref(target, &from);
                }
                if let Some(target) = &previous {
                    rt.remove_ref(target, &from);
                }
                rt.mark();
                on_change(rt, current.as_ref(), previous.as_ref());
            },
        );

        self.release_on_destroy(owner, name, scope, watcher)
    }

    /// Resolve `cfg[singular(name) + "Ids"]` into the list slot `name`
    pub fn resolve_all(&mut self, owner: &ObjectId, name: &str) -> Disposer {
        let key = format!("{}Ids", singular(name));
        let from = owner.clone();
        self.resolve_all_with(
            owner,
            name,
            move |rt| {
                rt.object(&from)
                    .and_then(|obj| obj.cfg.get(&key))
                    .and_then(Value::as_array)
                    .map(|ids| ids.iter().filter_map(Value::as_str).map(ObjectId::from).collect())
                    .unwrap_or_default()
            },
            |_, _, _| {},
        )
    }

    /// Resolve the ids `get` returns into the list slot `name`
    ///
    /// Ids without a live object are left out. The same target may appear
    /// more than once and is then referenced once per entry.
    pub fn resolve_all_with<G, F>(
        &mut self,
        owner: &ObjectId,
        name: &str,
        get: G,
        mut on_change: F,
    ) -> Disposer
    where
        G: Fn(&Runtime) -> Vec<ObjectId> + 'static,
        F: FnMut(&mut Runtime, &[ObjectId], &[ObjectId]) + 'static,
    {
        let Some(scope) = self.object(owner).map(|obj| obj.scope()) else {
            return Disposer::noop();
        };
        self.set_resolved(owner, name, Resolved::Many(Vec::new()));

        let (from, slot) = (owner.clone(), name.to_string());
        let watcher = self.watch_value(
            scope,
            move |rt| {
                let mut ids = get(rt);
                ids.retain(|id| rt.objects().contains(id));
                ids
            },
            move |rt, current: &Vec<ObjectId>, _| {
                let previous = match rt.set_resolved(&from, &slot, Resolved::Many(current.clone())) {
                    Some(Resolved::Many(previous)) => previous,
                    _ => Vec::new(),
                };
                for target in current {
                    rt.add_ref(target, &from);
                }
                for target in &previous {
                    rt.remove_ref(target, &from);
                }
                rt.mark();
                on_change(rt, current, &previous);
            },
        );

        self.release_on_destroy(owner, name, scope, watcher)
    }

    /// Current target of the slot `name`
    pub fn resolved(&self, owner: &ObjectId, name: &str) -> Option<&ObjectId> {
        match self.object(owner)?.resolved.get(name)? {
            Resolved::One(target) => target.as_ref(),
            Resolved::Many(_) => None,
        }
    }

    /// Current targets of the list slot `name`
    pub fn resolved_all(&self, owner: &ObjectId, name: &str) -> &[ObjectId] {
        match self.object(owner).and_then(|obj| obj.resolved.get(name)) {
            Some(Resolved::Many(targets)) => targets,
            _ => &[],
        }
    }

    fn set_resolved(&mut self, owner: &ObjectId, name: &str, value: Resolved) -> Option<Resolved> {
        self.object_mut(owner)
            .and_then(|obj| obj.resolved.insert(name.to_string(), value))
    }

    /// Give back every reference the slot holds and empty it
    fn release_slot(&mut self, owner: &ObjectId, name: &str) {
        let held = match self.object_mut(owner).and_then(|obj| obj.resolved.remove(name)) {
            Some(Resolved::One(target)) => target.into_iter().collect(),
            Some(Resolved::Many(targets)) => targets,
            None => Vec::new(),
        };
        for target in &held {
            self.remove_ref(target, owner);
        }
    }

    fn release_on_destroy(
        &mut self,
        owner: &ObjectId,
        name: &str,
        scope: crate::scope::ScopeId,
        watcher: Disposer,
    ) -> Disposer {
        let (from, slot) = (owner.clone(), name.to_string());
        let listener = self.on(scope, EventKind::Destroy, move |rt, _| rt.release_slot(&from, &slot));

        let (from, slot) = (owner.clone(), name.to_string());
        Disposer::new(move |rt| {
            watcher.dispose(rt);
            listener.dispose(rt);
            rt.release_slot(&from, &slot);
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::native::testing::NullBackend;

    fn runtime() -> Runtime {
        Runtime::new(Rc::new(NullBackend), RuntimeConfig::default())
    }

    fn sticky(rt: &mut Runtime, cfg: serde_json::Value, id: &str) -> ObjectId {
        let id = rt.create(cfg, Some(ObjectId::from(id))).unwrap();
        rt.object_mut(&id).unwrap().sticky = true;
        id
    }

    fn set_cfg(rt: &mut Runtime, id: &ObjectId, key: &str, value: serde_json::Value) {
        rt.object_mut(id).unwrap().cfg[key] = value;
        rt.mark();
    }

    #[test]
    fn test_singular() {
        assert_eq!(singular("scenes"), "scene");
        assert_eq!(singular("videoSources"), "videoSource");
        assert_eq!(singular("clock"), "clock");
    }

    #[test]
    fn test_resolve_follows_cfg_id() {
        let mut rt = runtime();
        let a = sticky(&mut rt, json!({"type": "t"}), "t:a");
        let b = sticky(&mut rt, json!({"type": "t"}), "t:b");
        let owner = sticky(&mut rt, json!({"type": "o", "targetId": "t:a"}), "o:1");
        rt.resolve(&owner, "target");
        rt.settle();

        assert_eq!(rt.resolved(&owner, "target"), Some(&a));
        assert_eq!(rt.object(&a).unwrap().ref_count(&owner), 1);

        set_cfg(&mut rt, &owner, "targetId", json!("t:b"));
        rt.settle();

        assert_eq!(rt.resolved(&owner, "target"), Some(&b));
        assert!(rt.object(&a).unwrap().refs().is_empty());
        assert_eq!(rt.object(&b).unwrap().ref_count(&owner), 1);
    }

    #[test]
    fn test_resolve_missing_id_is_absence() {
        let mut rt = runtime();
        let owner = sticky(&mut rt, json!({"type": "o", "targetId": "t:nope"}), "o:1");
        let changes = Rc::new(RefCell::new(Vec::new()));

        let log = changes.clone();
        let from = owner.clone();
        rt.resolve_with(
            &owner,
            "target",
            move |rt| {
                rt.object(&from)
                    .and_then(|obj| obj.cfg_str("targetId"))
                    .map(ObjectId::from)
            },
            move |_, current, _| log.borrow_mut().push(current.cloned()),
        );
        rt.settle();
        assert_eq!(rt.resolved(&owner, "target"), None);

        // the target appearing later resolves on the next pass
        let target = sticky(&mut rt, json!({"type": "t"}), "t:nope");
        rt.settle();

        assert_eq!(rt.resolved(&owner, "target"), Some(&target));
        assert_eq!(*changes.borrow(), vec![None, Some(target.clone())]);
    }

    #[test]
    fn test_resolve_all_counts_duplicates() {
        let mut rt = runtime();
        let a = sticky(&mut rt, json!({"type": "t"}), "t:a");
        let b = sticky(&mut rt, json!({"type": "t"}), "t:b");
        let owner = sticky(
            &mut rt,
            json!({"type": "o", "itemIds": ["t:a", "t:a", "t:missing", "t:b"]}),
            "o:1",
        );
        rt.resolve_all(&owner, "items");
        rt.settle();

        assert_eq!(rt.resolved_all(&owner, "items"), &[a.clone(), a.clone(), b.clone()]);
        assert_eq!(rt.object(&a).unwrap().ref_count(&owner), 2);
        assert_eq!(rt.object(&b).unwrap().ref_count(&owner), 1);

        set_cfg(&mut rt, &owner, "itemIds", json!(["t:b"]));
        rt.settle();

        assert!(rt.object(&a).unwrap().refs().is_empty());
        assert_eq!(rt.object(&b).unwrap().ref_count(&owner), 1);
    }

    #[test]
    fn test_owner_destroy_releases_references() {
        let mut rt = runtime();
        let a = sticky(&mut rt, json!({"type": "t"}), "t:a");
        let owner = sticky(&mut rt, json!({"type": "o", "targetId": "t:a", "itemIds": ["t:a"]}), "o:1");
        rt.resolve(&owner, "target");
        rt.resolve_all(&owner, "items");
        rt.settle();
        assert_eq!(rt.object(&a).unwrap().ref_count(&owner), 2);

        rt.destroy(&owner).unwrap();

        assert!(rt.object(&a).unwrap().refs().is_empty());
    }

    #[test]
    fn test_disposed_resolution_releases_and_stops() {
        let mut rt = runtime();
        let a = sticky(&mut rt, json!({"type": "t"}), "t:a");
        let owner = sticky(&mut rt, json!({"type": "o", "targetId": "t:a"}), "o:1");
        let disposer = rt.resolve(&owner, "target");
        rt.settle();

        disposer.dispose(&mut rt);
        rt.settle();

        assert!(rt.object(&a).unwrap().refs().is_empty());
        assert_eq!(rt.resolved(&owner, "target"), None);
    }

    #[test]
    fn test_unreferenced_target_is_collected_after_switch() {
        let mut rt = runtime();
        let a = rt.create(json!({"type": "t"}), Some(ObjectId::from("t:a"))).unwrap();
        let b = rt.create(json!({"type": "t"}), Some(ObjectId::from("t:b"))).unwrap();
        let owner = sticky(&mut rt, json!({"type": "o", "itemIds": ["t:a", "t:b"]}), "o:1");
        rt.resolve_all(&owner, "items");
        rt.settle();
        assert!(rt.object(&a).is_some());

        set_cfg(&mut rt, &owner, "itemIds", json!(["t:b"]));
        rt.settle();

        assert!(rt.object(&a).is_none());
        assert!(rt.object(&b).is_some());
    }
}
