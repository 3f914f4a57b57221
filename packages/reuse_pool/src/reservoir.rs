use std::any::type_name;
use std::{fmt, thread};

use foldhash::{HashMap, HashMapExt, HashSet, HashSetExt};
use tracing::{debug, trace, warn};

use crate::metrics::{
    CAPACITY_EXCEEDED, CREATED, DESTROYED, HOOK_FAILED, RELEASED, REUSED, observe_live_instances,
    observe_once,
};
use crate::{
    DropPolicy, Error, HookError, Key, Lifecycle, PoolConfig, ReservoirBuilder, ReservoirId, Result,
    Stage,
};

/// The state of an instance, as seen by the reservoir that created it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum InstanceState {
    /// Checked out by a caller.
    Active,

    /// Held by the reservoir, available for reuse.
    Idle,

    /// Permanently removed. The instance will never reappear.
    Destroyed,
}

/// A bounded pool of reusable instances of one type.
///
/// Every instance the reservoir creates is at any moment either active (checked out by a caller),
/// idle (available for reuse) or destroyed (forgotten for good). The number of live instances,
/// active plus idle, never exceeds the configured maximum size.
///
/// Instances are materialized and recycled by a pluggable [`Lifecycle`] strategy, which the
/// reservoir calls on every transition:
///
/// * `create` and then `activate` when [`acquire()`][Self::acquire] has no idle instance to reuse,
/// * `activate` when an idle instance is reused,
/// * `quiesce` on [`release()`][Self::release],
/// * `finalize` on [`destroy()`][Self::destroy], [`destroy_all()`][Self::destroy_all] and when the
///   reservoir itself is dropped.
///
/// Callers refer to instances via [`Key`]s and access them through [`get()`][Self::get] and
/// [`get_mut()`][Self::get_mut] while they are active.
///
/// # Pre-warming
///
/// When built, the reservoir acquires `initial_size` instances and then releases all of them, so
/// every pre-warmed instance has gone through create, activate and quiesce before first real use.
///
/// # Hook failures
///
/// If `activate` or `quiesce` fails, the instance is in an unknown state and is finalized and
/// forgotten; the hook error is returned to the caller. If `finalize` fails, the instance is
/// forgotten anyway. Bulk operations process every instance and report all failures together.
///
/// # Example
///
/// ```rust
/// use reuse_pool::{Poolable, Reservoir};
///
/// #[derive(Default)]
/// struct Buffer {
///     bytes: Vec<u8>,
/// }
///
/// impl Poolable for Buffer {
///     fn on_released(&mut self) {
///         self.bytes.clear();
///     }
/// }
///
/// let mut reservoir = Reservoir::<Buffer>::builder()
///     .initial_size(2)
///     .maximum_size(8)
///     .build_in_process()
///     .unwrap();
///
/// let key = reservoir.acquire().unwrap();
/// reservoir.get_mut(key).unwrap().bytes.extend_from_slice(b"hello");
/// reservoir.release(key).unwrap();
///
/// // The buffer was reset when it was released and is reused by the next acquire.
/// let key = reservoir.acquire().unwrap();
/// assert!(reservoir.get(key).unwrap().bytes.is_empty());
/// assert_eq!(reservoir.len(), 2);
/// ```
///
/// # Thread safety
///
/// The reservoir has a single logical owner. All operations take `&mut self` and run the
/// lifecycle hooks synchronously on the calling thread.
pub struct Reservoir<T> {
    id: ReservoirId,
    type_key: String,
    lifecycle: Box<dyn Lifecycle<T>>,

    /// Active instances, keyed by instance index. The key set is the active set.
    active: HashMap<u64, T>,

    /// Indexes of idle instances. Mirrors `idle_store` for constant-time membership tests.
    idle: HashSet<u64>,

    /// Idle instances, most recently released last. Acquire reuses from the end.
    idle_store: Vec<(u64, T)>,

    /// Index of the next instance to be created. Indexes are never reused.
    next_index: u64,

    default_capacity: usize,
    maximum_size: usize,
    drop_policy: DropPolicy,
}

impl<T> fmt::Debug for Reservoir<T> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservoir")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("type_key", &self.type_key)
            .field("active", &self.active.len())
            .field("idle", &self.idle_store.len())
            .field("created", &self.next_index)
            .field("maximum_size", &self.maximum_size)
            .field("drop_policy", &self.drop_policy)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> Reservoir<T> {
    /// Starts building a new standalone [`Reservoir`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use reuse_pool::{Poolable, Reservoir};
    ///
    /// #[derive(Default)]
    /// struct Spark;
    /// impl Poolable for Spark {}
    ///
    /// let reservoir = Reservoir::<Spark>::builder()
    ///     .maximum_size(16)
    ///     .build_in_process()
    ///     .unwrap();
    ///
    /// assert!(reservoir.is_empty());
    /// ```
    pub fn builder() -> ReservoirBuilder<T> {
        ReservoirBuilder::new()
    }

    /// Builds a pre-warmed reservoir from a validated configuration entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the entry is invalid and a lifecycle error if a hook
    /// fails while pre-warming.
    pub fn from_config(
        config: &PoolConfig,
        lifecycle: impl Lifecycle<T> + 'static,
        drop_policy: DropPolicy,
    ) -> Result<Self> {
        ReservoirBuilder::from_config(config.clone())
            .drop_policy(drop_policy)
            .build(lifecycle)
    }
}

impl<T> Reservoir<T> {
    pub(crate) fn new_inner(
        config: &PoolConfig,
        lifecycle: Box<dyn Lifecycle<T>>,
        drop_policy: DropPolicy,
    ) -> Self {
        let default_capacity = config.default_capacity();

        Self {
            id: ReservoirId::next(),
            type_key: config.type_key().to_string(),
            lifecycle,
            active: HashMap::with_capacity(default_capacity),
            idle: HashSet::with_capacity(default_capacity),
            idle_store: Vec::with_capacity(default_capacity),
            next_index: 0,
            default_capacity,
            maximum_size: config.maximum_size(),
            drop_policy,
        }
    }

    /// Acquires `count` instances and then releases all of them, so that the hooks of every
    /// pre-warmed instance observe create, activate and quiesce before first real use.
    ///
    /// If a hook fails, warm-up stops acquiring but still releases everything it acquired, so no
    /// instance is left active.
    pub(crate) fn warm_up(&mut self, count: usize) -> Result<()> {
        let mut keys = Vec::with_capacity(count);
        let mut failures = Vec::new();

        for _ in 0..count {
            match self.acquire() {
                Ok(key) => keys.push(key),
                Err(error) => {
                    failures.push(error);
                    break;
                }
            }
        }

        failures.extend(keys.into_iter().filter_map(|key| self.release(key).err()));

        if !failures.is_empty() {
            warn!(
                type_key = self.type_key,
                failures = failures.len(),
                "reservoir warm-up failed"
            );
        }

        Error::from_failures(type_name::<T>(), failures)?;

        debug!(
            type_key = self.type_key,
            idle = self.idle_store.len(),
            maximum_size = self.maximum_size,
            "reservoir warmed up"
        );

        Ok(())
    }

    /// Checks out an instance, reusing an idle one if possible and creating a new one otherwise.
    ///
    /// The instance has been activated when this returns. The most recently released idle
    /// instance is reused first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if there is no idle instance and the reservoir already
    /// holds its maximum number of live instances. Returns [`Error::Hook`] if creating or
    /// activating the instance failed; an instance that failed to activate has been finalized.
    ///
    /// # Example
    ///
    /// ```rust
    /// use reuse_pool::{ErrorKind, Poolable, Reservoir};
    ///
    /// #[derive(Default)]
    /// struct Spark;
    /// impl Poolable for Spark {}
    ///
    /// let mut reservoir = Reservoir::<Spark>::builder()
    ///     .maximum_size(1)
    ///     .build_in_process()
    ///     .unwrap();
    ///
    /// let _spark = reservoir.acquire().unwrap();
    ///
    /// let error = reservoir.acquire().unwrap_err();
    /// assert_eq!(error.kind(), ErrorKind::CapacityExceeded);
    /// ```
    pub fn acquire(&mut self) -> Result<Key<T>> {
        let (index, mut item) = if let Some((index, item)) = self.idle_store.pop() {
            self.idle.remove(&index);
            observe_once(&REUSED);
            (index, item)
        } else {
            if self.len() >= self.maximum_size {
                observe_once(&CAPACITY_EXCEEDED);
                return Err(Error::CapacityExceeded {
                    item_type: type_name::<T>(),
                    maximum_size: self.maximum_size,
                });
            }

            let item = self
                .lifecycle
                .create()
                .map_err(|source| hook_error::<T>(Stage::Create, source))?;

            let index = self.next_index;
            self.next_index = index
                .checked_add(1)
                .expect("instance index overflow is not a realistic scenario");

            observe_once(&CREATED);
            trace!(type_key = self.type_key, index, "instance created");
            (index, item)
        };

        if let Err(source) = self.lifecycle.activate(&mut item) {
            let error = hook_error::<T>(Stage::Activate, source);
            return Err(self.discard(index, item, error));
        }

        self.active.insert(index, item);
        observe_live_instances(self.len());
        trace!(type_key = self.type_key, index, "instance acquired");

        Ok(Key::new(self.id, index))
    }

    /// Returns an active instance to the reservoir, making it idle.
    ///
    /// Releasing an instance that is already idle is a no-op: the quiesce hook does not run again
    /// and the instance is not added to the idle store twice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OwnershipViolation`] if the key was issued by a different reservoir or
    /// the instance has been destroyed. Returns [`Error::Hook`] if quiescing the instance failed;
    /// the instance has then been finalized.
    ///
    /// # Example
    ///
    /// ```rust
    /// use reuse_pool::{Poolable, Reservoir};
    ///
    /// #[derive(Default)]
    /// struct Spark;
    /// impl Poolable for Spark {}
    ///
    /// let mut reservoir = Reservoir::<Spark>::builder().build_in_process().unwrap();
    ///
    /// let key = reservoir.acquire().unwrap();
    /// reservoir.release(key).unwrap();
    ///
    /// // Releasing again is harmless.
    /// reservoir.release(key).unwrap();
    /// assert_eq!(reservoir.idle_len(), 1);
    /// ```
    pub fn release(&mut self, key: Key<T>) -> Result<()> {
        self.check_ownership(key)?;

        let index = key.index();

        if self.idle.contains(&index) {
            return Ok(());
        }

        let Some(mut item) = self.active.remove(&index) else {
            return Err(ownership_violation::<T>("the instance has been destroyed"));
        };

        if let Err(source) = self.lifecycle.quiesce(&mut item) {
            let error = hook_error::<T>(Stage::Quiesce, source);
            return Err(self.discard(index, item, error));
        }

        self.idle.insert(index);
        self.idle_store.push((index, item));

        observe_once(&RELEASED);
        trace!(type_key = self.type_key, index, "instance released");

        Ok(())
    }

    /// Permanently removes an instance, whether active or idle, running its finalize hook.
    ///
    /// Destroying an instance that has already been destroyed is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OwnershipViolation`] if the key was issued by a different reservoir.
    /// Returns [`Error::Hook`] if the finalize hook failed; the instance is forgotten anyway.
    pub fn destroy(&mut self, key: Key<T>) -> Result<()> {
        self.check_ownership(key)?;

        let index = key.index();

        let item = if let Some(item) = self.active.remove(&index) {
            item
        } else if let Some(item) = self.take_idle(index) {
            item
        } else {
            return Ok(());
        };

        self.finalize(index, item)
    }

    /// Releases every active instance.
    ///
    /// The active set is snapshotted first and instances are released in creation order. A hook
    /// failure does not stop the remaining instances from being released.
    ///
    /// # Errors
    ///
    /// Returns the hook failure if one instance failed, or [`Error::Bulk`] with every failure if
    /// several did.
    pub fn release_all(&mut self) -> Result<()> {
        let mut indexes: Vec<u64> = self.active.keys().copied().collect();
        indexes.sort_unstable();

        let failures = indexes
            .into_iter()
            .filter_map(|index| self.release(Key::new(self.id, index)).err())
            .collect();

        Error::from_failures(type_name::<T>(), failures)
    }

    /// Finalizes and forgets every instance, active and idle alike.
    ///
    /// The finalize hook runs exactly once for every live instance, in creation order. A hook
    /// failure does not stop the remaining instances from being finalized.
    ///
    /// # Errors
    ///
    /// Returns the hook failure if one instance failed, or [`Error::Bulk`] with every failure if
    /// several did.
    pub fn destroy_all(&mut self) -> Result<()> {
        let mut doomed: Vec<(u64, T)> = self.active.drain().collect();
        doomed.append(&mut self.idle_store);
        self.idle.clear();

        doomed.sort_unstable_by_key(|(index, _)| *index);

        let failures = doomed
            .into_iter()
            .filter_map(|(index, item)| self.finalize(index, item).err())
            .collect();

        Error::from_failures(type_name::<T>(), failures)
    }

    /// Returns a shared reference to an active instance.
    ///
    /// Returns `None` if the instance is idle, destroyed or owned by a different reservoir.
    #[must_use]
    pub fn get(&self, key: Key<T>) -> Option<&T> {
        if key.reservoir() != self.id {
            return None;
        }

        self.active.get(&key.index())
    }

    /// Returns an exclusive reference to an active instance.
    ///
    /// Returns `None` if the instance is idle, destroyed or owned by a different reservoir.
    #[must_use]
    pub fn get_mut(&mut self, key: Key<T>) -> Option<&mut T> {
        if key.reservoir() != self.id {
            return None;
        }

        self.active.get_mut(&key.index())
    }

    /// Returns the state of an instance, or `None` if the key was issued by a different reservoir.
    #[must_use]
    pub fn state(&self, key: Key<T>) -> Option<InstanceState> {
        if key.reservoir() != self.id {
            return None;
        }

        let index = key.index();

        Some(if self.active.contains_key(&index) {
            InstanceState::Active
        } else if self.idle.contains(&index) {
            InstanceState::Idle
        } else {
            InstanceState::Destroyed
        })
    }

    /// Keys of all active instances, in no particular order.
    pub fn active_keys(&self) -> impl Iterator<Item = Key<T>> + '_ {
        self.active.keys().map(|index| Key::new(self.id, *index))
    }

    /// The number of active instances.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// The number of idle instances.
    #[must_use]
    pub fn idle_len(&self) -> usize {
        self.idle_store.len()
    }

    /// The number of live (active plus idle) instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active
            .len()
            .checked_add(self.idle_store.len())
            .expect("live instance count is bounded by maximum_size, so cannot overflow")
    }

    /// Whether the reservoir has no live instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.idle_store.is_empty()
    }

    /// How many instances the reservoir has created over its lifetime, including destroyed ones.
    #[must_use]
    pub fn created_count(&self) -> u64 {
        self.next_index
    }

    /// The maximum number of live instances.
    #[must_use]
    pub fn maximum_size(&self) -> usize {
        self.maximum_size
    }

    /// How many instances the reservoir reserved bookkeeping space for up front.
    #[must_use]
    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    /// The key identifying this reservoir in errors and logs.
    #[must_use]
    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    fn check_ownership(&self, key: Key<T>) -> Result<()> {
        if key.reservoir() == self.id {
            Ok(())
        } else {
            Err(ownership_violation::<T>(
                "the key was issued by a different reservoir",
            ))
        }
    }

    fn take_idle(&mut self, index: u64) -> Option<T> {
        if !self.idle.remove(&index) {
            return None;
        }

        let position = self
            .idle_store
            .iter()
            .position(|(candidate, _)| *candidate == index)?;

        Some(self.idle_store.remove(position).1)
    }

    fn finalize(&self, index: u64, item: T) -> Result<()> {
        observe_once(&DESTROYED);
        trace!(type_key = self.type_key, index, "instance destroyed");

        self.lifecycle
            .finalize(item)
            .map_err(|source| hook_error::<T>(Stage::Finalize, source))
    }

    /// Finalizes an instance whose activate or quiesce hook failed, returning the error to
    /// report to the caller (including the finalize failure, if any).
    fn discard(&self, index: u64, item: T, error: Error) -> Error {
        warn!(type_key = self.type_key, index, %error, "discarding instance after hook failure");

        match self.finalize(index, item) {
            Ok(()) => error,
            Err(finalize_error) => Error::Bulk {
                item_type: type_name::<T>(),
                failures: vec![error, finalize_error],
            },
        }
    }
}

impl<T> Drop for Reservoir<T> {
    fn drop(&mut self) {
        let active = self.active.len();

        if active > 0 {
            debug!(
                type_key = self.type_key,
                active, "finalizing active instances of a dropped reservoir"
            );
        }

        if let Err(error) = self.destroy_all() {
            warn!(type_key = self.type_key, %error, "finalizing instances of a dropped reservoir failed");
        }

        // We check this at the end so every instance has been finalized first. If we are already
        // panicking, we do not want to panic again because that would obscure the original panic.
        if self.drop_policy == DropPolicy::MustNotFinalizeActive && active > 0 && !thread::panicking()
        {
            panic!(
                "dropped a reservoir of {} with {active} active instances while the drop policy forbids finalizing active instances",
                type_name::<T>()
            );
        }
    }
}

fn hook_error<T>(stage: Stage, source: HookError) -> Error {
    observe_once(&HOOK_FAILED);

    Error::Hook {
        item_type: type_name::<T>(),
        stage,
        source,
    }
}

fn ownership_violation<T>(problem: &'static str) -> Error {
    Error::OwnershipViolation {
        item_type: type_name::<T>(),
        problem,
    }
}
