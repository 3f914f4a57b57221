use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use crate::HookError;

/// Lifecycle callbacks for types whose instances are pooled.
///
/// Each callback is invoked by the reservoir exactly once per corresponding transition:
///
/// * [`on_created()`][Self::on_created] - once, right after construction.
/// * [`on_acquired()`][Self::on_acquired] - every time the instance becomes active.
/// * [`on_released()`][Self::on_released] - every time the instance becomes idle.
/// * [`on_destroyed()`][Self::on_destroyed] - once, when the instance is permanently removed.
///
/// All callbacks default to doing nothing. Implementations must not assume they are called
/// on any particular thread.
///
/// # Example
///
/// ```
/// use reuse_pool::Poolable;
///
/// #[derive(Default)]
/// struct Projectile {
///     distance_travelled: f32,
/// }
///
/// impl Poolable for Projectile {
///     fn on_released(&mut self) {
///         // Reset so the next user starts from a clean slate.
///         self.distance_travelled = 0.0;
///     }
/// }
/// ```
pub trait Poolable {
    /// Called once when the instance has been constructed.
    fn on_created(&mut self) {}

    /// Called when the instance is handed out to a caller.
    fn on_acquired(&mut self) {}

    /// Called when the instance is returned to the reservoir.
    fn on_released(&mut self) {}

    /// Called once when the instance is permanently removed from the reservoir.
    fn on_destroyed(&mut self) {}
}

/// The four primitive operations a reservoir needs in order to manage instances of `T`.
///
/// The reservoir is oblivious to how instances are materialized; it only calls these
/// primitives at the right transitions:
///
/// * `create` when a new instance is needed,
/// * `activate` on every transition into the active state,
/// * `quiesce` on every transition into the idle state,
/// * `finalize` when an instance is permanently removed.
///
/// All primitives run synchronously. The crate ships two strategies: [`InProcess`] for plain
/// objects and [`HostAttached`][crate::HostAttached] for objects materialized by an external
/// [`Host`][crate::Host]. Custom strategies can be plugged into a standalone reservoir via
/// [`ReservoirBuilder::build()`][crate::ReservoirBuilder::build].
pub trait Lifecycle<T> {
    /// Constructs a new instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance cannot be materialized.
    fn create(&self) -> Result<T, HookError>;

    /// Prepares an instance for use by a caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance cannot be made usable. The reservoir then finalizes
    /// the instance.
    fn activate(&self, item: &mut T) -> Result<(), HookError>;

    /// Quiesces an instance that a caller has returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance cannot be made inert. The reservoir then finalizes
    /// the instance.
    fn quiesce(&self, item: &mut T) -> Result<(), HookError>;

    /// Tears an instance down permanently.
    ///
    /// # Errors
    ///
    /// Returns an error if tearing down failed. The instance is forgotten either way.
    fn finalize(&self, item: T) -> Result<(), HookError>;
}

/// Lifecycle strategy for plain in-process objects.
///
/// Instances are created via [`Default`] and the remaining primitives simply invoke the
/// [`Poolable`] callbacks of the instance. Nothing can fail.
pub struct InProcess<T> {
    _item: PhantomData<fn() -> T>,
}

impl<T> InProcess<T> {
    /// Creates the strategy.
    #[must_use]
    pub fn new() -> Self {
        Self { _item: PhantomData }
    }
}

impl<T> Default for InProcess<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for InProcess<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcess")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .finish()
    }
}

impl<T> Lifecycle<T> for InProcess<T>
where
    T: Poolable + Default,
{
    fn create(&self) -> Result<T, HookError> {
        let mut item = T::default();
        item.on_created();
        Ok(item)
    }

    fn activate(&self, item: &mut T) -> Result<(), HookError> {
        item.on_acquired();
        Ok(())
    }

    fn quiesce(&self, item: &mut T) -> Result<(), HookError> {
        item.on_released();
        Ok(())
    }

    fn finalize(&self, mut item: T) -> Result<(), HookError> {
        item.on_destroyed();
        Ok(())
    }
}
