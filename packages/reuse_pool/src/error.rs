use std::fmt;

use thiserror::Error;

/// The error type returned by lifecycle hooks and host operations.
///
/// Lifecycle strategies talk to arbitrary embedding code (engines, containers, factories), so
/// their failures are carried as opaque boxed errors and wrapped into [`Error::Hook`] by the
/// reservoir that invoked them.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The lifecycle primitive that was running when a hook failed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Stage {
    /// Constructing a new instance.
    Create,

    /// Preparing an instance for use (transition into the active state).
    Activate,

    /// Quiescing an instance after use (transition into the idle state).
    Quiesce,

    /// Tearing an instance down permanently.
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Activate => "activate",
            Self::Quiesce => "quiesce",
            Self::Finalize => "finalize",
        })
    }
}

/// Errors that can occur when configuring or operating reservoirs and registries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A pool configuration entry (or a set of entries) is not valid. This is detected when
    /// building a reservoir or registry and is fatal to that build.
    #[error("invalid configuration for pool '{type_key}': {problem}")]
    Configuration {
        /// The type key of the offending entry.
        type_key: String,

        /// A human-readable description of the problem.
        problem: String,
    },

    /// A TOML configuration document could not be parsed into pool configuration entries.
    #[error("invalid pool configuration syntax: {source}")]
    ConfigSyntax {
        /// The parser error.
        #[source]
        source: toml::de::Error,
    },

    /// Acquiring an instance would require growing the reservoir beyond its maximum size.
    ///
    /// This is recoverable: releasing or destroying instances makes room again.
    #[error("reservoir of {item_type} is at its maximum size of {maximum_size} instances")]
    CapacityExceeded {
        /// The name of the pooled type.
        item_type: &'static str,

        /// The configured maximum size of the reservoir.
        maximum_size: usize,
    },

    /// A registry operation targeted a type that has no reservoir in the registry.
    #[error("no reservoir is registered for {item_type}")]
    UnregisteredType {
        /// The name of the requested type.
        item_type: &'static str,
    },

    /// An instance key was passed to a reservoir that does not track the instance.
    #[error("instance of {item_type} is not owned by this reservoir: {problem}")]
    OwnershipViolation {
        /// The name of the pooled type.
        item_type: &'static str,

        /// Why the reservoir rejected the key.
        problem: &'static str,
    },

    /// A lifecycle hook failed.
    #[error("{stage} hook for {item_type} failed: {source}")]
    Hook {
        /// The name of the pooled type.
        item_type: &'static str,

        /// The lifecycle primitive that failed.
        stage: Stage,

        /// The error reported by the lifecycle strategy.
        #[source]
        source: HookError,
    },

    /// One or more instances failed during a bulk operation. Every instance was still processed.
    #[error("{} of the instances of {item_type} failed during a bulk operation", .failures.len())]
    Bulk {
        /// The name of the pooled type, or a description of the set of types involved.
        item_type: &'static str,

        /// The individual failures, in processing order.
        failures: Vec<Error>,
    },

    /// The process-wide convenience registry could not be used.
    #[error("the global registry is unavailable: {problem}")]
    GlobalRegistry {
        /// Why the global registry could not be used.
        problem: &'static str,
    },
}

/// The broad category of an [`Error`], for callers that want to decide between propagating,
/// retrying and logging without matching on every variant.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The configuration is invalid. Fatal to startup.
    Configuration,

    /// The reservoir is full. The caller may retry after instances are returned.
    CapacityExceeded,

    /// No reservoir exists for the requested type. Always a caller bug.
    UnregisteredType,

    /// A key was used with a reservoir that does not track its instance.
    OwnershipViolation,

    /// A lifecycle hook failed.
    Lifecycle,

    /// The global convenience registry is not installed or is already in use.
    GlobalRegistry,
}

impl Error {
    /// Returns the broad category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } | Self::ConfigSyntax { .. } => ErrorKind::Configuration,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::UnregisteredType { .. } => ErrorKind::UnregisteredType,
            Self::OwnershipViolation { .. } => ErrorKind::OwnershipViolation,
            Self::Hook { .. } | Self::Bulk { .. } => ErrorKind::Lifecycle,
            Self::GlobalRegistry { .. } => ErrorKind::GlobalRegistry,
        }
    }

    /// Collapses the failures of a bulk operation into a result.
    pub(crate) fn from_failures(item_type: &'static str, mut failures: Vec<Self>) -> Result<()> {
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(Self::Bulk {
                item_type,
                failures,
            }),
        }
    }
}

/// A specialized `Result` type for reservoir and registry operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

/// Log-and-continue handling for callers that do not want to propagate errors.
///
/// Library code should propagate errors with `?`. Tooling and glue code that would rather keep
/// going can use these methods to log the error via `tracing` and carry on with a fallback.
///
/// # Example
///
/// ```
/// use reuse_pool::{Registry, ResultExt};
///
/// #[derive(Default)]
/// struct Missile;
/// impl reuse_pool::Poolable for Missile {}
///
/// let mut registry = Registry::builder().build(&[]).unwrap();
///
/// // Nothing is registered, so this logs an error instead of failing.
/// let key = registry.acquire::<Missile>().or_log();
/// assert!(key.is_none());
/// ```
pub trait ResultExt<T> {
    /// Returns the value on success. On failure, logs the error and returns `None`.
    fn or_log(self) -> Option<T>;

    /// Returns the value on success. On failure, logs the error and returns `T::default()`.
    fn or_log_default(self) -> T
    where
        T: Default;
}

impl<T> ResultExt<T> for Result<T> {
    fn or_log(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::error!(kind = ?error.kind(), %error, "reuse pool operation failed");
                None
            }
        }
    }

    fn or_log_default(self) -> T
    where
        T: Default,
    {
        self.or_log().unwrap_or_default()
    }
}
