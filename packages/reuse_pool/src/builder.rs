use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use crate::{DropPolicy, InProcess, Lifecycle, PoolConfig, Poolable, Reservoir, Result};

/// Builder for creating an instance of [`Reservoir`].
///
/// Reservoirs inside a [`Registry`][crate::Registry] are built from [`PoolConfig`] entries. Use
/// this builder when you want a standalone reservoir, optionally with a custom
/// [`Lifecycle`] strategy.
///
/// # Examples
///
/// ```
/// use reuse_pool::{DropPolicy, Poolable, Reservoir};
///
/// #[derive(Default)]
/// struct Spark;
/// impl Poolable for Spark {}
///
/// let reservoir = Reservoir::<Spark>::builder()
///     .initial_size(4)
///     .maximum_size(32)
///     .drop_policy(DropPolicy::MustNotFinalizeActive)
///     .build_in_process()
///     .unwrap();
///
/// assert_eq!(reservoir.idle_len(), 4);
/// ```
#[must_use]
pub struct ReservoirBuilder<T> {
    config: PoolConfig,
    drop_policy: DropPolicy,

    _item: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for ReservoirBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReservoirBuilder")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("config", &self.config)
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}

impl<T: 'static> ReservoirBuilder<T> {
    pub(crate) fn new() -> Self {
        Self::from_config(PoolConfig::in_process(type_name::<T>()))
    }

    /// Starts from the sizes and type key of an existing configuration entry.
    ///
    /// The lifecycle kind of the entry is not consulted; the strategy is chosen by the
    /// `build*` method you call.
    pub fn from_config(config: PoolConfig) -> Self {
        Self {
            config,
            drop_policy: DropPolicy::default(),
            _item: PhantomData,
        }
    }

    /// Sets the key used to identify the reservoir in errors and logs.
    ///
    /// Defaults to the name of `T`.
    pub fn type_key(mut self, type_key: impl Into<String>) -> Self {
        self.config = self.config.with_type_key(type_key);
        self
    }

    /// Sets how many instances are created and immediately released when the reservoir is built.
    pub fn initial_size(mut self, initial_size: usize) -> Self {
        self.config = self.config.with_initial_size(initial_size);
        self
    }

    /// Sets how many instances the reservoir reserves bookkeeping space for up front.
    pub fn default_capacity(mut self, default_capacity: usize) -> Self {
        self.config = self.config.with_default_capacity(default_capacity);
        self
    }

    /// Sets the maximum number of live (active plus idle) instances.
    pub fn maximum_size(mut self, maximum_size: usize) -> Self {
        self.config = self.config.with_maximum_size(maximum_size);
        self
    }

    /// Sets the [drop policy][DropPolicy] for the reservoir. This governs whether instances may
    /// still be active when the reservoir is dropped.
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the reservoir with a custom lifecycle strategy and pre-warms it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`][crate::Error::Configuration] if the sizes are invalid and
    /// a lifecycle error if a hook fails while pre-warming.
    pub fn build(self, lifecycle: impl Lifecycle<T> + 'static) -> Result<Reservoir<T>> {
        self.config.validate()?;

        let mut reservoir = Reservoir::new_inner(&self.config, Box::new(lifecycle), self.drop_policy);
        reservoir.warm_up(self.config.initial_size())?;

        Ok(reservoir)
    }

    /// Builds the reservoir with the [`InProcess`] strategy and pre-warms it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`][crate::Error::Configuration] if the sizes are invalid.
    pub fn build_in_process(self) -> Result<Reservoir<T>>
    where
        T: Poolable + Default,
    {
        self.build(InProcess::<T>::new())
    }
}
