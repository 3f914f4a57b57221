use std::any::type_name;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one instance of `T` owned by one [`Reservoir`][crate::Reservoir].
///
/// Keys are returned by `acquire()` and are used to access, release and destroy the instance.
/// They are cheap to copy and carry the identity of the reservoir that issued them, so a key
/// presented to a different reservoir is rejected rather than silently aliasing some other
/// instance.
///
/// # Key reuse
///
/// Keys are never reused. Once an instance has been destroyed, its key keeps referring to the
/// destroyed instance forever: `destroy()` with it is a no-op and `release()` with it is an
/// ownership error.
///
/// # Example
///
/// ```rust
/// use reuse_pool::{InstanceState, Poolable, Reservoir};
///
/// #[derive(Default)]
/// struct Spark;
/// impl Poolable for Spark {}
///
/// let mut reservoir = Reservoir::<Spark>::builder().build_in_process().unwrap();
///
/// let key = reservoir.acquire().unwrap();
/// assert_eq!(reservoir.state(key), Some(InstanceState::Active));
///
/// reservoir.release(key).unwrap();
/// assert_eq!(reservoir.state(key), Some(InstanceState::Idle));
/// ```
pub struct Key<T> {
    reservoir: ReservoirId,
    index: u64,

    _item: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    pub(crate) fn new(reservoir: ReservoirId, index: u64) -> Self {
        Self {
            reservoir,
            index,
            _item: PhantomData,
        }
    }

    pub(crate) fn reservoir(self) -> ReservoirId {
        self.reservoir
    }

    /// The position of the instance in the creation order of its reservoir.
    ///
    /// The first instance a reservoir creates has index 0, the next one 1 and so on.
    #[must_use]
    pub fn index(self) -> u64 {
        self.index
    }
}

// Manual trait implementations so that keys are `Copy`, `Eq` etc. regardless of `T`.
impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.reservoir == other.reservoir && self.index == other.index
    }
}

impl<T> Eq for Key<T> {}

impl<T> Hash for Key<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reservoir.hash(state);
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("reservoir", &self.reservoir.0)
            .field("index", &self.index)
            .finish()
    }
}

/// Process-unique identity of a reservoir, embedded into every key it issues.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct ReservoirId(u64);

static NEXT_RESERVOIR_ID: AtomicU64 = AtomicU64::new(0);

impl ReservoirId {
    pub(crate) fn next() -> Self {
        // Relaxed is enough, we only need uniqueness, not ordering with other memory operations.
        Self(NEXT_RESERVOIR_ID.fetch_add(1, Ordering::Relaxed))
    }
}
