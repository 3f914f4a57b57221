use serde::Deserialize;

use crate::{Descriptor, Error, Result};

const DEFAULT_INITIAL_SIZE: usize = 0;
const DEFAULT_DEFAULT_CAPACITY: usize = 10;
const DEFAULT_MAXIMUM_SIZE: usize = 10_000;

/// How the instances of a pool are materialized.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum LifecycleKind {
    /// Plain objects constructed in-process. See [`InProcess`][crate::InProcess].
    #[default]
    InProcess,

    /// Objects materialized by a [`Host`][crate::Host].
    /// See [`HostAttached`][crate::HostAttached].
    HostAttached,
}

/// Configuration of one pool: which type it is for, how instances are materialized and how
/// large the pool may grow.
///
/// Entries are usually loaded from a TOML document via [`PoolConfig::parse_toml()`] and handed to
/// [`RegistryBuilder::build()`][crate::RegistryBuilder::build], but they can also be built in code.
///
/// # Invariants
///
/// Checked by [`validate()`][Self::validate] when a reservoir or registry is built. Violations are
/// reported as [`Error::Configuration`], never silently clamped.
///
/// * `maximum_size` is at least 1.
/// * `initial_size` does not exceed `maximum_size`.
/// * An explicitly set `default_capacity` does not exceed `maximum_size`. When left unset it
///   resolves to 10 or `maximum_size`, whichever is smaller.
/// * A host-attached entry has a materialization descriptor.
///
/// # Example
///
/// ```
/// use reuse_pool::{LifecycleKind, PoolConfig};
///
/// let config = PoolConfig::in_process("bullet")
///     .with_initial_size(8)
///     .with_maximum_size(64);
///
/// assert_eq!(config.lifecycle_kind(), LifecycleKind::InProcess);
/// assert_eq!(config.default_capacity(), 10);
/// config.validate().unwrap();
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(from = "PoolRecord")]
pub struct PoolConfig {
    type_key: String,
    lifecycle_kind: LifecycleKind,
    materialization_descriptor: Option<Descriptor>,
    initial_size: usize,
    default_capacity: Option<usize>,
    maximum_size: usize,
}

impl PoolConfig {
    /// Creates an in-process entry for the type registered under `type_key`, with default sizes.
    #[must_use]
    pub fn in_process(type_key: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
            lifecycle_kind: LifecycleKind::InProcess,
            materialization_descriptor: None,
            initial_size: DEFAULT_INITIAL_SIZE,
            default_capacity: None,
            maximum_size: DEFAULT_MAXIMUM_SIZE,
        }
    }

    /// Creates a host-attached entry for the type registered under `type_key`, materialized
    /// from `descriptor`, with default sizes.
    #[must_use]
    pub fn host_attached(type_key: impl Into<String>, descriptor: Descriptor) -> Self {
        Self {
            lifecycle_kind: LifecycleKind::HostAttached,
            materialization_descriptor: Some(descriptor),
            ..Self::in_process(type_key)
        }
    }

    /// Sets how many instances are created (and immediately returned) when the pool is built.
    #[must_use]
    pub fn with_initial_size(mut self, initial_size: usize) -> Self {
        self.initial_size = initial_size;
        self
    }

    /// Sets how many instances the pool reserves bookkeeping space for up front.
    #[must_use]
    pub fn with_default_capacity(mut self, default_capacity: usize) -> Self {
        self.default_capacity = Some(default_capacity);
        self
    }

    #[must_use]
    pub(crate) fn with_type_key(mut self, type_key: impl Into<String>) -> Self {
        self.type_key = type_key.into();
        self
    }

    /// Sets the maximum number of live (active plus idle) instances.
    #[must_use]
    pub fn with_maximum_size(mut self, maximum_size: usize) -> Self {
        self.maximum_size = maximum_size;
        self
    }

    /// The key the pooled type is registered under.
    #[must_use]
    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    /// How instances of this pool are materialized.
    #[must_use]
    pub fn lifecycle_kind(&self) -> LifecycleKind {
        self.lifecycle_kind
    }

    /// What a host should materialize for host-attached pools.
    #[must_use]
    pub fn materialization_descriptor(&self) -> Option<&Descriptor> {
        self.materialization_descriptor.as_ref()
    }

    /// How many instances are pre-created when the pool is built.
    #[must_use]
    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    /// How many instances the pool reserves bookkeeping space for up front.
    ///
    /// If never set, this is 10 or `maximum_size`, whichever is smaller.
    #[must_use]
    pub fn default_capacity(&self) -> usize {
        self.default_capacity
            .unwrap_or_else(|| DEFAULT_DEFAULT_CAPACITY.min(self.maximum_size))
    }

    /// The maximum number of live instances.
    #[must_use]
    pub fn maximum_size(&self) -> usize {
        self.maximum_size
    }

    /// Checks the invariants of the entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] describing the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.maximum_size == 0 {
            return Err(self.invalid("maximum_size must be at least 1".to_string()));
        }

        if self.initial_size > self.maximum_size {
            return Err(self.invalid(format!(
                "initial_size {} exceeds maximum_size {}",
                self.initial_size, self.maximum_size
            )));
        }

        if let Some(default_capacity) = self
            .default_capacity
            .filter(|&capacity| capacity > self.maximum_size)
        {
            return Err(self.invalid(format!(
                "default_capacity {default_capacity} exceeds maximum_size {}",
                self.maximum_size
            )));
        }

        if self.lifecycle_kind == LifecycleKind::HostAttached
            && self.materialization_descriptor.is_none()
        {
            return Err(
                self.invalid("host-attached pools require a materialization_descriptor".to_string())
            );
        }

        Ok(())
    }

    /// Parses an ordered list of entries from a TOML document with one `[[pool]]` table per entry.
    ///
    /// Omitted sizes take their defaults (`initial_size = 0`, `maximum_size = 10000` and a
    /// `default_capacity` of 10 or `maximum_size`, whichever is smaller) and `host_attached`
    /// defaults to `false`. Parsing does not
    /// validate the entries; that happens when they are built into a registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigSyntax`] if the document is not valid TOML or does not have the
    /// expected shape.
    ///
    /// # Example
    ///
    /// ```
    /// use reuse_pool::{LifecycleKind, PoolConfig};
    ///
    /// let configs = PoolConfig::parse_toml(
    ///     r#"
    ///     [[pool]]
    ///     type_key = "bullet"
    ///     initial_size = 16
    ///     maximum_size = 256
    ///
    ///     [[pool]]
    ///     type_key = "enemy"
    ///     host_attached = true
    ///     materialization_descriptor = "prefabs/enemy"
    ///     "#,
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(configs.len(), 2);
    /// assert_eq!(configs[0].initial_size(), 16);
    /// assert_eq!(configs[1].lifecycle_kind(), LifecycleKind::HostAttached);
    /// ```
    pub fn parse_toml(document: &str) -> Result<Vec<Self>> {
        let file: ConfigFile =
            toml::from_str(document).map_err(|source| Error::ConfigSyntax { source })?;

        Ok(file.pool)
    }

    fn invalid(&self, problem: String) -> Error {
        Error::Configuration {
            type_key: self.type_key.clone(),
            problem,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    pool: Vec<PoolConfig>,
}

/// The serialized shape of one entry, mirroring the record format of configuration files.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PoolRecord {
    type_key: String,

    #[serde(default)]
    host_attached: bool,

    #[serde(default)]
    materialization_descriptor: Option<Descriptor>,

    #[serde(default = "default_initial_size")]
    initial_size: usize,

    #[serde(default)]
    default_capacity: Option<usize>,

    #[serde(default = "default_maximum_size")]
    maximum_size: usize,
}

impl From<PoolRecord> for PoolConfig {
    fn from(record: PoolRecord) -> Self {
        Self {
            type_key: record.type_key,
            lifecycle_kind: if record.host_attached {
                LifecycleKind::HostAttached
            } else {
                LifecycleKind::InProcess
            },
            materialization_descriptor: record.materialization_descriptor,
            initial_size: record.initial_size,
            default_capacity: record.default_capacity,
            maximum_size: record.maximum_size,
        }
    }
}

const fn default_initial_size() -> usize {
    DEFAULT_INITIAL_SIZE
}

const fn default_maximum_size() -> usize {
    DEFAULT_MAXIMUM_SIZE
}
