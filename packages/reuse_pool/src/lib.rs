#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Bounded pools of reusable objects, selected by type.
//!
//! Constructing and tearing down objects such as projectiles, particles or scene entities
//! again and again is expensive. This package keeps such objects around after use and hands
//! them out again, running lifecycle hooks on every transition so the objects can reset
//! themselves.
//!
//! # Quick start
//!
//! ```rust
//! use reuse_pool::{PoolConfig, Poolable, Registry};
//!
//! #[derive(Default)]
//! struct Projectile {
//!     damage: u32,
//! }
//!
//! impl Poolable for Projectile {
//!     fn on_acquired(&mut self) {
//!         self.damage = 10;
//!     }
//! }
//!
//! let mut registry = Registry::builder()
//!     .register::<Projectile>("projectile")
//!     .build(&[PoolConfig::in_process("projectile")
//!         .with_initial_size(16)
//!         .with_maximum_size(256)])
//!     .unwrap();
//!
//! let shot = registry.acquire::<Projectile>().unwrap();
//! assert_eq!(registry.get(shot).unwrap().damage, 10);
//!
//! registry.release(shot).unwrap();
//! ```
//!
//! # Building blocks
//!
//! - [`Reservoir`] is the bounded pool for one object type. Every instance it created is
//!   active (checked out), idle (available for reuse) or destroyed (gone for good), and the
//!   number of live instances never exceeds the configured maximum size.
//! - [`Lifecycle`] is the strategy a reservoir uses to create, activate, quiesce and finalize
//!   instances. [`InProcess`] drives plain Rust objects through their [`Poolable`] hooks;
//!   [`HostAttached`] materializes objects through an external [`Host`] such as a game engine.
//! - [`Registry`] holds one reservoir per registered type and forwards operations to the
//!   reservoir of the type you name. It is built from a list of [`PoolConfig`] entries, which
//!   can be loaded from TOML via [`PoolConfig::parse_toml()`].
//! - [`global`] optionally installs one registry per thread for code at the outermost edge of an
//!   application.
//!
//! # Errors
//!
//! Every fallible operation returns [`Result`], with [`Error::kind()`] classifying the failure.
//! Callers that prefer to log and continue can use [`ResultExt::or_log()`].
//!
//! # Observability
//!
//! Operations emit `tracing` events and record metrics via the `nm` package
//! (`reuse_pool_created`, `reuse_pool_reused` and so on).
//!
//! # Thread safety
//!
//! Reservoirs and registries have a single logical owner and are neither [`Send`] nor [`Sync`].
//! All operations are synchronous and run lifecycle hooks on the calling thread. Use one
//! registry per thread if several threads need pools.

mod builder;
mod config;
mod drop_policy;
mod error;
pub mod global;
mod host;
mod key;
mod lifecycle;
mod metrics;
mod registry;
mod registry_builder;
mod reservoir;

pub use builder::*;
pub use config::*;
pub use drop_policy::*;
pub use error::*;
pub use host::*;
pub(crate) use key::ReservoirId;
pub use key::*;
pub use lifecycle::*;
pub use registry::*;
pub use registry_builder::*;
pub use reservoir::*;
