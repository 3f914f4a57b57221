//! Optional convenience access to one installed [`Registry`] per thread.
//!
//! The core types never use this module. Applications that pass their registry around
//! explicitly do not need it at all. At the outermost edge of an application, such as the glue
//! code of a game loop, it can be handy to reach the registry without threading a reference
//! through every call; for that, install the registry once and use the free functions here.
//!
//! The registry is installed per thread because registries have a single owner and are not
//! [`Send`]. Calls on a thread without an installed registry fail with
//! [`Error::GlobalRegistry`].
//!
//! # Example
//!
//! ```rust
//! use reuse_pool::{PoolConfig, Poolable, Registry, global};
//!
//! #[derive(Default)]
//! struct Spark;
//! impl Poolable for Spark {}
//!
//! let registry = Registry::builder()
//!     .register::<Spark>("spark")
//!     .build(&[PoolConfig::in_process("spark")])
//!     .unwrap();
//!
//! global::install(registry).unwrap();
//!
//! let spark = global::acquire::<Spark>().unwrap();
//! global::release(spark).unwrap();
//!
//! let registry = global::uninstall().unwrap();
//! assert_eq!(registry.reservoir::<Spark>().unwrap().idle_len(), 1);
//! ```

use std::cell::RefCell;

use tracing::debug;

use crate::{Error, Key, Registry, Result};

thread_local! {
    static INSTALLED: RefCell<Option<Registry>> = const { RefCell::new(None) };
}

/// Installs `registry` as the current thread's registry.
///
/// # Errors
///
/// Returns [`Error::GlobalRegistry`] if a registry is already installed on this thread or the
/// installed registry is in use. The rejected registry is dropped.
pub fn install(registry: Registry) -> Result<()> {
    INSTALLED.with(|installed| {
        let mut slot = installed.try_borrow_mut().map_err(|_| busy())?;

        if slot.is_some() {
            return Err(Error::GlobalRegistry {
                problem: "a registry is already installed on this thread",
            });
        }

        debug!(reservoirs = registry.len(), "installing thread registry");
        *slot = Some(registry);
        Ok(())
    })
}

/// Removes and returns the current thread's registry.
///
/// # Errors
///
/// Returns [`Error::GlobalRegistry`] if no registry is installed on this thread or the
/// installed registry is in use.
pub fn uninstall() -> Result<Registry> {
    INSTALLED.with(|installed| {
        installed
            .try_borrow_mut()
            .map_err(|_| busy())?
            .take()
            .ok_or_else(not_installed)
    })
}

/// Whether a registry is installed on the current thread.
#[must_use]
pub fn is_installed() -> bool {
    INSTALLED.with(|installed| installed.try_borrow().map_or(true, |slot| slot.is_some()))
}

/// Runs `f` with exclusive access to the current thread's registry.
///
/// Calls into this module from within `f` fail with [`Error::GlobalRegistry`].
///
/// # Errors
///
/// Returns [`Error::GlobalRegistry`] if no registry is installed on this thread or the
/// installed registry is already in use.
pub fn with<R>(f: impl FnOnce(&mut Registry) -> R) -> Result<R> {
    INSTALLED.with(|installed| {
        let mut slot = installed.try_borrow_mut().map_err(|_| busy())?;
        let registry = slot.as_mut().ok_or_else(not_installed)?;

        Ok(f(registry))
    })
}

/// Checks out an instance of `T` via the current thread's registry.
///
/// # Errors
///
/// Returns [`Error::GlobalRegistry`] if the registry is unavailable, otherwise whatever
/// [`Registry::acquire()`] returns.
pub fn acquire<T: 'static>() -> Result<Key<T>> {
    with(Registry::acquire::<T>)?
}

/// Returns an instance of `T` via the current thread's registry.
///
/// # Errors
///
/// Returns [`Error::GlobalRegistry`] if the registry is unavailable, otherwise whatever
/// [`Registry::release()`] returns.
pub fn release<T: 'static>(key: Key<T>) -> Result<()> {
    with(|registry| registry.release(key))?
}

/// Permanently removes an instance of `T` via the current thread's registry.
///
/// # Errors
///
/// Returns [`Error::GlobalRegistry`] if the registry is unavailable, otherwise whatever
/// [`Registry::destroy()`] returns.
pub fn destroy<T: 'static>(key: Key<T>) -> Result<()> {
    with(|registry| registry.destroy(key))?
}

/// Releases every active instance of `T` via the current thread's registry.
///
/// # Errors
///
/// Returns [`Error::GlobalRegistry`] if the registry is unavailable, otherwise whatever
/// [`Registry::release_all()`] returns.
pub fn release_all<T: 'static>() -> Result<()> {
    with(Registry::release_all::<T>)?
}

/// Finalizes every instance of `T` via the current thread's registry.
///
/// # Errors
///
/// Returns [`Error::GlobalRegistry`] if the registry is unavailable, otherwise whatever
/// [`Registry::destroy_all()`] returns.
pub fn destroy_all<T: 'static>() -> Result<()> {
    with(Registry::destroy_all::<T>)?
}

fn not_installed() -> Error {
    Error::GlobalRegistry {
        problem: "no registry is installed on this thread",
    }
}

fn busy() -> Error {
    Error::GlobalRegistry {
        problem: "the registry is already in use further up the call stack",
    }
}
