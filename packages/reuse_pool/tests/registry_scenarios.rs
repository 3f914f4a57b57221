//! Integration tests for the `reuse_pool` package.
//!
//! These tests drive registries end to end through the public API, including TOML-driven
//! configuration and host-attached pools backed by an in-memory host.

#![allow(
    clippy::indexing_slicing,
    reason = "panicking on out of range indexes is fine in test code"
)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use reuse_pool::{
    Attached, Descriptor, DropPolicy, Error, ErrorKind, Host, HookError, NodeId, PoolConfig,
    Poolable, Registry, ResultExt,
};
use testing::{Hook, Journal, next_instance_id, thread_journal};

/// A plain in-process object that records its hooks into the thread journal.
struct Tracked {
    id: u64,
    journal: Journal,
}

impl Default for Tracked {
    fn default() -> Self {
        Self {
            id: next_instance_id(),
            journal: thread_journal(),
        }
    }
}

impl Poolable for Tracked {
    fn on_created(&mut self) {
        self.journal.record(self.id, Hook::Created);
    }

    fn on_acquired(&mut self) {
        self.journal.record(self.id, Hook::Acquired);
    }

    fn on_released(&mut self) {
        self.journal.record(self.id, Hook::Released);
    }

    fn on_destroyed(&mut self) {
        self.journal.record(self.id, Hook::Destroyed);
    }
}

#[derive(Default)]
struct Other;
impl Poolable for Other {}

#[derive(Default)]
struct NeverConfigured;
impl Poolable for NeverConfigured {}

/// An in-memory host. Nodes are tracked with their parent and enabled flag.
#[derive(Debug, Default)]
struct FakeHost {
    next_node: Cell<u64>,
    nodes: RefCell<BTreeMap<NodeId, FakeNode>>,
    fail_instantiate: Cell<bool>,
    // If set, instantiations beyond this many fail.
    instantiations_left: Cell<Option<u32>>,
}

#[derive(Debug)]
struct FakeNode {
    name: String,
    parent: Option<NodeId>,
    enabled: bool,
}

impl FakeHost {
    fn allocate(&self, node: FakeNode) -> NodeId {
        let id = NodeId::new(self.next_node.get());
        self.next_node.set(self.next_node.get().wrapping_add(1));
        self.nodes.borrow_mut().insert(id, node);
        id
    }

    fn is_enabled(&self, node: NodeId) -> Option<bool> {
        self.nodes.borrow().get(&node).map(|node| node.enabled)
    }

    fn children_of(&self, parent: NodeId) -> usize {
        self.nodes
            .borrow()
            .values()
            .filter(|node| node.parent == Some(parent))
            .count()
    }

    fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }
}

impl Host for FakeHost {
    fn create_container(&self, name: &str) -> Result<NodeId, HookError> {
        Ok(self.allocate(FakeNode {
            name: name.to_string(),
            parent: None,
            enabled: true,
        }))
    }

    fn instantiate(&self, descriptor: &Descriptor, parent: NodeId) -> Result<NodeId, HookError> {
        if self.fail_instantiate.get() || self.instantiations_left.get() == Some(0) {
            return Err(format!("cannot instantiate {descriptor}").into());
        }

        if let Some(left) = self.instantiations_left.get() {
            self.instantiations_left.set(Some(left.saturating_sub(1)));
        }

        if !self.nodes.borrow().contains_key(&parent) {
            return Err("parent does not exist".into());
        }

        Ok(self.allocate(FakeNode {
            name: descriptor.to_string(),
            parent: Some(parent),
            enabled: true,
        }))
    }

    fn set_enabled(&self, node: NodeId, enabled: bool) -> Result<(), HookError> {
        let mut nodes = self.nodes.borrow_mut();
        let node = nodes.get_mut(&node).ok_or("node does not exist")?;
        node.enabled = enabled;
        Ok(())
    }

    fn despawn(&self, node: NodeId) -> Result<(), HookError> {
        self.nodes
            .borrow_mut()
            .remove(&node)
            .map(|_| ())
            .ok_or_else(|| "node does not exist".into())
    }
}

/// A host-attached object.
struct Enemy {
    node: NodeId,
    health: u32,
}

impl Attached for Enemy {
    fn attach(node: NodeId) -> Self {
        Self { node, health: 100 }
    }

    fn node(&self) -> NodeId {
        self.node
    }
}

impl Poolable for Enemy {
    fn on_released(&mut self) {
        self.health = 100;
    }
}

fn tracked_registry(initial_size: usize, maximum_size: usize) -> Registry {
    Registry::builder()
        .register::<Tracked>("tracked")
        .register::<Other>("other")
        .build(&[
            PoolConfig::in_process("tracked")
                .with_initial_size(initial_size)
                .with_maximum_size(maximum_size),
            PoolConfig::in_process("other"),
        ])
        .unwrap()
}

#[test]
fn warm_up_scenario() {
    let registry = tracked_registry(2, 10);
    let journal = thread_journal();

    assert_eq!(journal.count(Hook::Created), 2);
    assert_eq!(journal.count(Hook::Acquired), 2);
    assert_eq!(journal.count(Hook::Released), 2);

    for id in journal.instance_ids() {
        assert_eq!(
            journal.hooks_of(id),
            vec![Hook::Created, Hook::Acquired, Hook::Released]
        );
    }

    let reservoir = registry.reservoir::<Tracked>().unwrap();
    assert_eq!(reservoir.active_len(), 0);
    assert_eq!(reservoir.idle_len(), 2);
}

#[test]
fn capacity_scenario() {
    let mut registry = tracked_registry(0, 1);

    let first = registry.acquire::<Tracked>().unwrap();

    let error = registry.acquire::<Tracked>().unwrap_err();
    assert!(matches!(
        error,
        Error::CapacityExceeded {
            maximum_size: 1,
            ..
        }
    ));

    // The first instance is untouched and still the only one.
    assert!(registry.get(first).is_some());
    assert_eq!(registry.reservoir::<Tracked>().unwrap().len(), 1);
    assert_eq!(thread_journal().count(Hook::Created), 1);
}

#[test]
fn bulk_scenario() {
    let mut registry = tracked_registry(0, 10);

    registry.acquire::<Tracked>().unwrap();
    registry.acquire::<Tracked>().unwrap();

    registry.release_all::<Tracked>().unwrap();
    registry.destroy_all::<Tracked>().unwrap();

    let reservoir = registry.reservoir::<Tracked>().unwrap();
    assert_eq!(reservoir.active_len(), 0);
    assert_eq!(reservoir.idle_len(), 0);

    let journal = thread_journal();
    assert_eq!(journal.instance_ids().len(), 2);

    for id in journal.instance_ids() {
        assert_eq!(
            journal
                .hooks_of(id)
                .iter()
                .filter(|hook| **hook == Hook::Destroyed)
                .count(),
            1
        );
    }

    journal.assert_lifecycle_order();
}

#[test]
fn unregistered_type_scenario() {
    let mut registry = tracked_registry(1, 10);
    let tracked = registry.acquire::<Tracked>().unwrap();
    let other = registry.acquire::<Other>().unwrap();
    let before = thread_journal().entries();

    let error = registry.acquire::<NeverConfigured>().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::UnregisteredType);
    assert!(error.to_string().contains("NeverConfigured"));

    assert_eq!(thread_journal().entries(), before);
    assert!(registry.get(tracked).is_some());
    assert!(registry.get(other).is_some());
    assert_eq!(registry.reservoir::<Tracked>().unwrap().len(), 1);
}

#[test]
fn unregistered_type_can_be_logged_instead() {
    let mut registry = tracked_registry(0, 10);

    assert!(registry.acquire::<NeverConfigured>().or_log().is_none());
    registry.release_all::<NeverConfigured>().or_log_default();
}

#[test]
fn lifecycle_order_holds_across_mixed_operations() {
    let mut registry = tracked_registry(3, 6);
    let mut held = Vec::new();

    for round in 0_u32..60 {
        if round % 7 == 6 {
            registry.release_all_pools().unwrap();
            held.clear();
        } else if round % 4 == 3 {
            if let Some(key) = held.pop() {
                registry.destroy(key).unwrap();
            }
        } else if round % 3 == 2 {
            if let Some(key) = held.pop() {
                registry.release(key).unwrap();
            }
        } else if let Ok(key) = registry.acquire::<Tracked>() {
            held.push(key);
        }

        let reservoir = registry.reservoir::<Tracked>().unwrap();
        assert!(reservoir.len() <= reservoir.maximum_size());
    }

    registry.destroy_all_pools().unwrap();

    let journal = thread_journal();
    journal.assert_lifecycle_order();
    assert_eq!(journal.count(Hook::Created), journal.count(Hook::Destroyed));
}

#[test]
fn registry_from_toml() {
    let configs = PoolConfig::parse_toml(
        r#"
        [[pool]]
        type_key = "tracked"
        initial_size = 4
        default_capacity = 8
        maximum_size = 8

        [[pool]]
        type_key = "enemy"
        host_attached = true
        materialization_descriptor = "prefabs/enemy"
        initial_size = 2
        "#,
    )
    .unwrap();

    let host = Rc::new(FakeHost::default());

    let registry = Registry::builder()
        .host(Rc::clone(&host) as Rc<dyn Host>)
        .register::<Tracked>("tracked")
        .register_attached::<Enemy>("enemy")
        .build(&configs)
        .unwrap();

    assert_eq!(
        registry.type_keys().collect::<Vec<_>>(),
        vec!["tracked", "enemy"]
    );
    assert_eq!(registry.reservoir::<Tracked>().unwrap().idle_len(), 4);
    assert_eq!(registry.reservoir::<Enemy>().unwrap().idle_len(), 2);

    let container = registry.container().unwrap();
    assert_eq!(host.children_of(container), 2);
    assert_eq!(host.nodes.borrow()[&container].name, "pool_parent");
}

#[test]
fn toml_size_violation_fails_build() {
    let configs = PoolConfig::parse_toml(
        r#"
        [[pool]]
        type_key = "tracked"
        initial_size = 20
        maximum_size = 10
        "#,
    )
    .unwrap();

    let error = Registry::builder()
        .register::<Tracked>("tracked")
        .build(&configs)
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Configuration);

    // Nothing was created for the invalid entry.
    assert_eq!(thread_journal().count(Hook::Created), 0);
}

#[test]
fn host_attached_nodes_follow_instance_state() {
    let host = Rc::new(FakeHost::default());

    let mut registry = Registry::builder()
        .host(Rc::clone(&host) as Rc<dyn Host>)
        .register_attached::<Enemy>("enemy")
        .build(&[
            PoolConfig::host_attached("enemy", Descriptor::new("prefabs/enemy"))
                .with_initial_size(1)
                .with_maximum_size(3),
        ])
        .unwrap();

    let enemy = registry.acquire::<Enemy>().unwrap();
    let node = registry.get(enemy).unwrap().node();
    assert_eq!(host.is_enabled(node), Some(true));

    registry.get_mut(enemy).unwrap().health = 3;
    registry.release(enemy).unwrap();
    assert_eq!(host.is_enabled(node), Some(false));

    // The idle enemy is reused, with its health reset by its release hook.
    let again = registry.acquire::<Enemy>().unwrap();
    assert_eq!(registry.get(again).unwrap().node(), node);
    assert_eq!(registry.get(again).unwrap().health, 100);

    registry.destroy(again).unwrap();
    assert_eq!(host.is_enabled(node), None);
}

#[test]
fn dropping_registry_despawns_everything() {
    let host = Rc::new(FakeHost::default());

    {
        let mut registry = Registry::builder()
            .host(Rc::clone(&host) as Rc<dyn Host>)
            .register_attached::<Enemy>("enemy")
            .build(&[
                PoolConfig::host_attached("enemy", Descriptor::new("prefabs/enemy"))
                    .with_initial_size(2),
            ])
            .unwrap();

        registry.acquire::<Enemy>().unwrap();
        registry.acquire::<Enemy>().unwrap();
        registry.acquire::<Enemy>().unwrap();

        // Container plus three enemies.
        assert_eq!(host.node_count(), 4);
    }

    assert_eq!(host.node_count(), 0);
}

#[test]
fn host_failure_during_acquire_leaves_registry_usable() {
    let host = Rc::new(FakeHost::default());

    let mut registry = Registry::builder()
        .host(Rc::clone(&host) as Rc<dyn Host>)
        .register_attached::<Enemy>("enemy")
        .build(&[PoolConfig::host_attached(
            "enemy",
            Descriptor::new("prefabs/enemy"),
        )])
        .unwrap();

    host.fail_instantiate.set(true);
    let error = registry.acquire::<Enemy>().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Lifecycle);
    assert!(registry.reservoir::<Enemy>().unwrap().is_empty());

    host.fail_instantiate.set(false);
    registry.acquire::<Enemy>().unwrap();
}

#[test]
fn warm_up_failure_under_strict_drop_policy_is_reported() {
    let host = Rc::new(FakeHost::default());
    host.instantiations_left.set(Some(1));

    // The first enemy is active when the second cannot be instantiated.
    let error = Registry::builder()
        .host(Rc::clone(&host) as Rc<dyn Host>)
        .drop_policy(DropPolicy::MustNotFinalizeActive)
        .register_attached::<Enemy>("enemy")
        .build(&[
            PoolConfig::host_attached("enemy", Descriptor::new("prefabs/enemy"))
                .with_initial_size(2),
        ])
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Lifecycle);

    // The enemy that was created and the container are both gone.
    assert_eq!(host.node_count(), 0);
}

#[test]
fn small_maximum_from_toml_needs_no_capacity() {
    let configs = PoolConfig::parse_toml(
        r#"
        [[pool]]
        type_key = "tracked"
        maximum_size = 1
        "#,
    )
    .unwrap();

    let mut registry = Registry::builder()
        .register::<Tracked>("tracked")
        .build(&configs)
        .unwrap();

    registry.acquire::<Tracked>().unwrap();
    assert_eq!(
        registry.acquire::<Tracked>().unwrap_err().kind(),
        ErrorKind::CapacityExceeded
    );
}

#[test]
#[should_panic]
fn strict_drop_policy_detects_leaked_instances() {
    let mut registry = Registry::builder()
        .drop_policy(DropPolicy::MustNotFinalizeActive)
        .register::<Other>("other")
        .build(&[PoolConfig::in_process("other")])
        .unwrap();

    registry.acquire::<Other>().unwrap();

    drop(registry);
}
