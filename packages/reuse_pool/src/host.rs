use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use serde::Deserialize;

use crate::{HookError, Lifecycle, Poolable};

/// Handle to a node (an entity, scene object or similar) that lives inside a [`Host`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(u64);

impl NodeId {
    /// Wraps a host-specific node identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The host-specific node identifier.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Opaque description of what a [`Host`] should materialize for a pooled type, such as the
/// path or name of a prefab-like template.
///
/// The crate never interprets the contents; they are passed through to [`Host::instantiate()`].
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq)]
#[serde(transparent)]
pub struct Descriptor(String);

impl Descriptor {
    /// Creates a descriptor from its textual form.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The textual form of the descriptor.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The embedding engine or container that materializes host-attached instances.
///
/// A registry creates one shared parent container through the host when it is built and
/// materializes every host-attached instance under it. Idle instances are kept materialized
/// but disabled, which makes reactivating them cheap.
///
/// All methods are synchronous. Implementations typically use interior mutability because
/// the host is shared between all host-attached reservoirs of a registry.
#[cfg_attr(test, mockall::automock)]
pub trait Host: fmt::Debug {
    /// Creates a long-lived container node that pooled nodes are parented to.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot create the container.
    fn create_container(&self, name: &str) -> Result<NodeId, HookError>;

    /// Materializes a new node from `descriptor` as a child of `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot materialize the descriptor.
    fn instantiate(&self, descriptor: &Descriptor, parent: NodeId) -> Result<NodeId, HookError>;

    /// Makes a node visible and behaviorally enabled, or inert and invisible.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be toggled, e.g. because it no longer exists.
    fn set_enabled(&self, node: NodeId, enabled: bool) -> Result<(), HookError>;

    /// Tears a node down entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be removed, e.g. because it no longer exists.
    fn despawn(&self, node: NodeId) -> Result<(), HookError>;
}

/// A pooled type whose instances are bound to a node materialized by a [`Host`].
///
/// # Example
///
/// ```
/// use reuse_pool::{Attached, NodeId, Poolable};
///
/// struct Enemy {
///     node: NodeId,
///     health: u32,
/// }
///
/// impl Attached for Enemy {
///     fn attach(node: NodeId) -> Self {
///         Self { node, health: 100 }
///     }
///
///     fn node(&self) -> NodeId {
///         self.node
///     }
/// }
///
/// impl Poolable for Enemy {
///     fn on_released(&mut self) {
///         self.health = 100;
///     }
/// }
/// ```
pub trait Attached: Poolable {
    /// Creates the instance that represents a freshly materialized node.
    fn attach(node: NodeId) -> Self;

    /// The node that this instance is bound to.
    fn node(&self) -> NodeId;
}

/// Lifecycle strategy for instances materialized by a [`Host`].
///
/// * `create` materializes a node from the descriptor under the shared parent container.
/// * `activate` runs [`Poolable::on_acquired()`] and then enables the node.
/// * `quiesce` runs [`Poolable::on_released()`] and then disables the node.
/// * `finalize` runs [`Poolable::on_destroyed()`] and then despawns the node.
pub struct HostAttached<T> {
    host: Rc<dyn Host>,
    parent: NodeId,
    descriptor: Descriptor,

    _item: PhantomData<fn() -> T>,
}

impl<T> HostAttached<T> {
    /// Creates the strategy. Nodes are materialized from `descriptor` under `parent`.
    #[must_use]
    pub fn new(host: Rc<dyn Host>, parent: NodeId, descriptor: Descriptor) -> Self {
        Self {
            host,
            parent,
            descriptor,
            _item: PhantomData,
        }
    }
}

impl<T> fmt::Debug for HostAttached<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostAttached")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("host", &self.host)
            .field("parent", &self.parent)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl<T> Lifecycle<T> for HostAttached<T>
where
    T: Attached,
{
    fn create(&self) -> Result<T, HookError> {
        let node = self.host.instantiate(&self.descriptor, self.parent)?;

        let mut item = T::attach(node);
        item.on_created();
        Ok(item)
    }

    fn activate(&self, item: &mut T) -> Result<(), HookError> {
        item.on_acquired();
        self.host.set_enabled(item.node(), true)
    }

    fn quiesce(&self, item: &mut T) -> Result<(), HookError> {
        item.on_released();
        self.host.set_enabled(item.node(), false)
    }

    fn finalize(&self, mut item: T) -> Result<(), HookError> {
        item.on_destroyed();
        self.host.despawn(item.node())
    }
}
