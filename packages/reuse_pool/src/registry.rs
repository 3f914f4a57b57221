use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::rc::Rc;

use foldhash::HashMap;
use tracing::{debug, warn};

use crate::{Error, Host, Key, NodeId, RegistryBuilder, Reservoir, Result};

/// A type-indexed collection of [`Reservoir`]s, one per registered item type.
///
/// The registry is built once from an ordered list of [`PoolConfig`][crate::PoolConfig] entries
/// and owns its reservoirs for its whole lifetime. Callers select a reservoir by naming the item
/// type; the lookup is statically typed, so a caller can never receive a reservoir of the wrong
/// type. Operations on a type without a reservoir fail with
/// [`Error::UnregisteredType`] and leave every other reservoir untouched.
///
/// # Host-attached reservoirs
///
/// If any entry uses the host-attached lifecycle, the registry creates one shared parent
/// container through the [`Host`] when it is built. Every host-attached instance is materialized
/// under that container. When the registry is dropped, all reservoirs are dropped first (which
/// finalizes their instances) and then the container is despawned.
///
/// # Example
///
/// ```rust
/// use reuse_pool::{PoolConfig, Poolable, Registry};
///
/// #[derive(Default)]
/// struct Bullet {
///     speed: f32,
/// }
///
/// impl Poolable for Bullet {
///     fn on_released(&mut self) {
///         self.speed = 0.0;
///     }
/// }
///
/// let mut registry = Registry::builder()
///     .register::<Bullet>("bullet")
///     .build(&[PoolConfig::in_process("bullet").with_initial_size(8)])
///     .unwrap();
///
/// let bullet = registry.acquire::<Bullet>().unwrap();
/// registry.get_mut(bullet).unwrap().speed = 120.0;
/// registry.release(bullet).unwrap();
/// ```
pub struct Registry {
    // Declared first so the reservoirs are gone before anything they may refer to.
    reservoirs: HashMap<TypeId, Box<dyn ErasedReservoir>>,

    /// Configuration order, used for deterministic bulk operations.
    order: Vec<TypeId>,

    host: Option<Rc<dyn Host>>,
    container: Option<NodeId>,
}

impl Registry {
    /// Starts building a new [`Registry`].
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub(crate) fn new_inner(host: Option<Rc<dyn Host>>, container: Option<NodeId>) -> Self {
        Self {
            reservoirs: HashMap::default(),
            order: Vec::new(),
            host,
            container,
        }
    }

    pub(crate) fn insert<T: 'static>(&mut self, reservoir: Reservoir<T>) {
        let type_id = TypeId::of::<T>();

        self.order.push(type_id);
        self.reservoirs.insert(type_id, Box::new(reservoir));
    }

    /// Checks out an instance of `T` from its reservoir.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredType`] if there is no reservoir for `T`, otherwise whatever
    /// [`Reservoir::acquire()`] returns.
    pub fn acquire<T: 'static>(&mut self) -> Result<Key<T>> {
        self.reservoir_mut::<T>()?.acquire()
    }

    /// Returns an instance of `T` to its reservoir.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredType`] if there is no reservoir for `T`, otherwise whatever
    /// [`Reservoir::release()`] returns.
    pub fn release<T: 'static>(&mut self, key: Key<T>) -> Result<()> {
        self.reservoir_mut::<T>()?.release(key)
    }

    /// Permanently removes an instance of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredType`] if there is no reservoir for `T`, otherwise whatever
    /// [`Reservoir::destroy()`] returns.
    pub fn destroy<T: 'static>(&mut self, key: Key<T>) -> Result<()> {
        self.reservoir_mut::<T>()?.destroy(key)
    }

    /// Releases every active instance of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredType`] if there is no reservoir for `T`, otherwise whatever
    /// [`Reservoir::release_all()`] returns.
    pub fn release_all<T: 'static>(&mut self) -> Result<()> {
        self.reservoir_mut::<T>()?.release_all()
    }

    /// Finalizes and forgets every instance of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredType`] if there is no reservoir for `T`, otherwise whatever
    /// [`Reservoir::destroy_all()`] returns.
    pub fn destroy_all<T: 'static>(&mut self) -> Result<()> {
        self.reservoir_mut::<T>()?.destroy_all()
    }

    /// Releases every active instance of every type, in configuration order.
    ///
    /// All reservoirs are processed even if some of them report failures.
    ///
    /// # Errors
    ///
    /// Returns the failure if exactly one occurred, or [`Error::Bulk`] with all of them.
    pub fn release_all_pools(&mut self) -> Result<()> {
        self.for_each_in_order(|reservoir| reservoir.release_all_erased())
    }

    /// Finalizes and forgets every instance of every type, in configuration order.
    ///
    /// The reservoirs themselves stay registered and usable. All reservoirs are processed even
    /// if some of them report failures.
    ///
    /// # Errors
    ///
    /// Returns the failure if exactly one occurred, or [`Error::Bulk`] with all of them.
    pub fn destroy_all_pools(&mut self) -> Result<()> {
        self.for_each_in_order(|reservoir| reservoir.destroy_all_erased())
    }

    /// Shared reference to an active instance of `T`.
    ///
    /// Returns `None` if there is no reservoir for `T` or the instance is not active.
    #[must_use]
    pub fn get<T: 'static>(&self, key: Key<T>) -> Option<&T> {
        self.reservoir::<T>().ok()?.get(key)
    }

    /// Exclusive reference to an active instance of `T`.
    ///
    /// Returns `None` if there is no reservoir for `T` or the instance is not active.
    #[must_use]
    pub fn get_mut<T: 'static>(&mut self, key: Key<T>) -> Option<&mut T> {
        self.reservoir_mut::<T>().ok()?.get_mut(key)
    }

    /// The reservoir for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredType`] if there is no reservoir for `T`.
    pub fn reservoir<T: 'static>(&self) -> Result<&Reservoir<T>> {
        self.reservoirs
            .get(&TypeId::of::<T>())
            .and_then(|reservoir| reservoir.as_any().downcast_ref::<Reservoir<T>>())
            .ok_or_else(unregistered::<T>)
    }

    /// The reservoir for `T`, for exclusive use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredType`] if there is no reservoir for `T`.
    pub fn reservoir_mut<T: 'static>(&mut self) -> Result<&mut Reservoir<T>> {
        self.reservoirs
            .get_mut(&TypeId::of::<T>())
            .and_then(|reservoir| reservoir.as_any_mut().downcast_mut::<Reservoir<T>>())
            .ok_or_else(unregistered::<T>)
    }

    /// Whether there is a reservoir for `T`.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.reservoirs.contains_key(&TypeId::of::<T>())
    }

    /// Type keys of all reservoirs, in configuration order.
    pub fn type_keys(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .filter_map(|type_id| self.reservoirs.get(type_id))
            .map(|reservoir| reservoir.type_key_erased())
    }

    /// The number of reservoirs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reservoirs.len()
    }

    /// Whether the registry has no reservoirs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reservoirs.is_empty()
    }

    /// The shared parent container of host-attached instances, if the registry has one.
    #[must_use]
    pub fn container(&self) -> Option<NodeId> {
        self.container
    }

    fn for_each_in_order(
        &mut self,
        mut f: impl FnMut(&mut dyn ErasedReservoir) -> Result<()>,
    ) -> Result<()> {
        let mut failures = Vec::new();

        for type_id in &self.order {
            let Some(reservoir) = self.reservoirs.get_mut(type_id) else {
                continue;
            };

            if let Err(error) = f(reservoir.as_mut()) {
                failures.push(error);
            }
        }

        Error::from_failures(type_name::<Self>(), failures)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("reservoirs", &self.type_keys().collect::<Vec<_>>())
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        // Reservoirs finalize their instances when dropped. Host-attached instances are children
        // of the container, so the container must outlive them.
        self.reservoirs.clear();
        self.order.clear();

        if let (Some(host), Some(container)) = (self.host.as_ref(), self.container) {
            debug!(container = container.raw(), "despawning pool container");

            if let Err(error) = host.despawn(container) {
                warn!(container = container.raw(), %error, "failed to despawn pool container");
            }
        }
    }
}

fn unregistered<T>() -> Error {
    Error::UnregisteredType {
        item_type: type_name::<T>(),
    }
}

/// Object-safe view of a [`Reservoir`] of any item type.
trait ErasedReservoir: fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn type_key_erased(&self) -> &str;
    fn release_all_erased(&mut self) -> Result<()>;
    fn destroy_all_erased(&mut self) -> Result<()>;
}

impl<T: 'static> ErasedReservoir for Reservoir<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_key_erased(&self) -> &str {
        self.type_key()
    }

    fn release_all_erased(&mut self) -> Result<()> {
        self.release_all()
    }

    fn destroy_all_erased(&mut self) -> Result<()> {
        self.destroy_all()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use mockall::Sequence;
    use mockall::predicate::eq;
    use static_assertions::assert_not_impl_any;
    use testing::{Hook, next_instance_id, thread_journal};

    use super::*;
    use crate::{Attached, Descriptor, ErrorKind, MockHost, PoolConfig, Poolable};

    assert_not_impl_any!(Registry: Send, Sync);

    struct Coin {
        id: u64,
    }

    impl Default for Coin {
        fn default() -> Self {
            Self {
                id: next_instance_id(),
            }
        }
    }

    impl Poolable for Coin {
        fn on_created(&mut self) {
            thread_journal().record(self.id, Hook::Created);
        }

        fn on_acquired(&mut self) {
            thread_journal().record(self.id, Hook::Acquired);
        }

        fn on_released(&mut self) {
            thread_journal().record(self.id, Hook::Released);
        }

        fn on_destroyed(&mut self) {
            thread_journal().record(self.id, Hook::Destroyed);
        }
    }

    #[derive(Default)]
    struct Gem;
    impl Poolable for Gem {}

    #[derive(Default)]
    struct Unpooled;
    impl Poolable for Unpooled {}

    struct Crate {
        node: NodeId,
    }

    impl Attached for Crate {
        fn attach(node: NodeId) -> Self {
            Self { node }
        }

        fn node(&self) -> NodeId {
            self.node
        }
    }

    impl Poolable for Crate {}

    fn coins_and_gems() -> Registry {
        Registry::builder()
            .register::<Coin>("coin")
            .register::<Gem>("gem")
            .build(&[
                PoolConfig::in_process("coin").with_initial_size(2),
                PoolConfig::in_process("gem").with_maximum_size(1),
            ])
            .unwrap()
    }

    #[test]
    fn forwards_to_reservoir_of_type() {
        let mut registry = coins_and_gems();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains::<Coin>());
        assert!(registry.contains::<Gem>());
        assert!(!registry.contains::<Unpooled>());

        let coin = registry.acquire::<Coin>().unwrap();
        let gem = registry.acquire::<Gem>().unwrap();

        assert!(registry.get(coin).is_some());
        assert!(registry.get_mut(gem).is_some());

        registry.release(coin).unwrap();
        registry.destroy(gem).unwrap();

        assert_eq!(registry.reservoir::<Coin>().unwrap().idle_len(), 2);
        assert!(registry.reservoir::<Gem>().unwrap().is_empty());
    }

    #[test]
    fn unregistered_type_has_no_side_effects() {
        let mut registry = coins_and_gems();
        let coin = registry.acquire::<Coin>().unwrap();
        let journal_before = thread_journal().entries();

        assert_eq!(
            registry.acquire::<Unpooled>().unwrap_err().kind(),
            ErrorKind::UnregisteredType
        );
        assert_eq!(
            registry.release_all::<Unpooled>().unwrap_err().kind(),
            ErrorKind::UnregisteredType
        );
        assert_eq!(
            registry.destroy_all::<Unpooled>().unwrap_err().kind(),
            ErrorKind::UnregisteredType
        );
        assert!(registry.reservoir::<Unpooled>().is_err());

        assert_eq!(thread_journal().entries(), journal_before);
        assert_eq!(
            registry.reservoir::<Coin>().unwrap().state(coin),
            Some(crate::InstanceState::Active)
        );
    }

    #[test]
    fn bulk_operations_cover_every_pool() {
        let mut registry = coins_and_gems();

        registry.acquire::<Coin>().unwrap();
        registry.acquire::<Coin>().unwrap();
        registry.acquire::<Gem>().unwrap();

        registry.release_all_pools().unwrap();

        assert_eq!(registry.reservoir::<Coin>().unwrap().active_len(), 0);
        assert_eq!(registry.reservoir::<Gem>().unwrap().active_len(), 0);

        registry.destroy_all_pools().unwrap();

        assert!(registry.reservoir::<Coin>().unwrap().is_empty());
        assert!(registry.reservoir::<Gem>().unwrap().is_empty());

        let journal = thread_journal();
        assert_eq!(journal.count(Hook::Created), 2);
        assert_eq!(journal.count(Hook::Destroyed), 2);
        journal.assert_lifecycle_order();

        // Reservoirs stay registered after being emptied.
        registry.acquire::<Gem>().unwrap();
    }

    #[test]
    fn type_keys_follow_configuration_order() {
        let registry = Registry::builder()
            .register::<Coin>("coin")
            .register::<Gem>("gem")
            .build(&[
                PoolConfig::in_process("gem"),
                PoolConfig::in_process("coin"),
            ])
            .unwrap();

        assert_eq!(registry.type_keys().collect::<Vec<_>>(), vec!["gem", "coin"]);
        assert!(format!("{registry:?}").contains("gem"));
    }

    #[test]
    fn drop_destroys_instances_then_container() {
        let mut host = MockHost::new();
        let mut seq = Sequence::new();
        let parent = NodeId::new(1);
        let child = NodeId::new(10);

        host.expect_create_container()
            .once()
            .in_sequence(&mut seq)
            .returning(move |_| Ok(parent));

        host.expect_instantiate()
            .with(eq(Descriptor::new("crate")), eq(parent))
            .once()
            .in_sequence(&mut seq)
            .returning(move |_, _| Ok(child));

        host.expect_set_enabled().returning(|_, _| Ok(()));

        host.expect_despawn()
            .with(eq(child))
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        host.expect_despawn()
            .with(eq(parent))
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let registry = Registry::builder()
            .host(Rc::new(host))
            .register_attached::<Crate>("crate")
            .build(&[
                PoolConfig::host_attached("crate", Descriptor::new("crate")).with_initial_size(1),
            ])
            .unwrap();

        assert_eq!(registry.container(), Some(parent));

        // The mock verifies on drop that the instance was despawned before the container.
        drop(registry);
    }

    #[test]
    fn no_container_without_host_attached_entries() {
        let mut host = MockHost::new();
        host.expect_create_container().never();
        host.expect_despawn().never();

        let registry = Registry::builder()
            .host(Rc::new(host))
            .register::<Gem>("gem")
            .build(&[PoolConfig::in_process("gem")])
            .unwrap();

        assert_eq!(registry.container(), None);
    }
}
