use std::any::{TypeId, type_name};
use std::fmt;
use std::rc::Rc;

use foldhash::{HashMap, HashMapExt, HashSet, HashSetExt};
use tracing::{debug, info};

use crate::{
    Attached, DropPolicy, Error, Host, HostAttached, InProcess, LifecycleKind, NodeId, PoolConfig,
    Poolable, Registry, Reservoir, Result, Stage,
};

/// Name of the shared parent container that host-attached instances are materialized under.
const CONTAINER_NAME: &str = "pool_parent";

/// Everything a reservoir factory needs besides its configuration entry.
struct BuildContext<'a> {
    host: Option<&'a Rc<dyn Host>>,
    container: Option<NodeId>,
    drop_policy: DropPolicy,
}

type Factory = fn(&PoolConfig, &BuildContext<'_>, &mut Registry) -> Result<()>;

struct Registration {
    type_id: TypeId,
    item_type: &'static str,
    lifecycle_kind: LifecycleKind,
    factory: Factory,
}

/// Builder for creating an instance of [`Registry`].
///
/// Every item type that may be pooled is registered under a type key, together with the
/// lifecycle strategy it supports. The configuration entries passed to [`build()`][Self::build]
/// then refer to registered types by their type key.
///
/// # Examples
///
/// ```
/// use reuse_pool::{PoolConfig, Poolable, Registry};
///
/// #[derive(Default)]
/// struct Spark;
/// impl Poolable for Spark {}
///
/// let configs = PoolConfig::parse_toml(
///     r#"
///     [[pool]]
///     type_key = "spark"
///     initial_size = 4
///     maximum_size = 64
///     "#,
/// )
/// .unwrap();
///
/// let registry = Registry::builder()
///     .register::<Spark>("spark")
///     .build(&configs)
///     .unwrap();
///
/// assert_eq!(registry.reservoir::<Spark>().unwrap().idle_len(), 4);
/// ```
#[must_use]
pub struct RegistryBuilder {
    registrations: HashMap<String, Registration>,

    /// Type keys that were registered more than once, reported by `build()`.
    duplicate_registrations: Vec<String>,

    host: Option<Rc<dyn Host>>,
    drop_policy: DropPolicy,
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut type_keys: Vec<_> = self.registrations.keys().collect();
        type_keys.sort_unstable();

        f.debug_struct("RegistryBuilder")
            .field("registrations", &type_keys)
            .field("host", &self.host)
            .field("drop_policy", &self.drop_policy)
            .finish_non_exhaustive()
    }
}

impl RegistryBuilder {
    pub(crate) fn new() -> Self {
        Self {
            registrations: HashMap::new(),
            duplicate_registrations: Vec::new(),
            host: None,
            drop_policy: DropPolicy::default(),
        }
    }

    /// Registers `T` under `type_key`, to be pooled with the [`InProcess`] lifecycle.
    pub fn register<T>(self, type_key: impl Into<String>) -> Self
    where
        T: Poolable + Default + 'static,
    {
        self.add::<T>(type_key.into(), LifecycleKind::InProcess, build_in_process::<T>)
    }

    /// Registers `T` under `type_key`, to be pooled with the [`HostAttached`] lifecycle.
    ///
    /// A [`Host`] must be supplied via [`host()`][Self::host] if any configuration entry uses
    /// this registration.
    pub fn register_attached<T>(self, type_key: impl Into<String>) -> Self
    where
        T: Attached + 'static,
    {
        self.add::<T>(
            type_key.into(),
            LifecycleKind::HostAttached,
            build_host_attached::<T>,
        )
    }

    /// Sets the host that materializes host-attached instances.
    pub fn host(mut self, host: Rc<dyn Host>) -> Self {
        self.host = Some(host);
        self
    }

    /// Sets the [drop policy][DropPolicy] applied to every reservoir of the registry.
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the registry with one pre-warmed reservoir per configuration entry, in order.
    ///
    /// Every entry is checked before any reservoir is created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a type key was registered twice, if two entries share
    /// a type key, if an entry names an unregistered type key, if an entry's lifecycle kind does
    /// not match its registration, if a host-attached entry is present without a host, or if an
    /// entry's sizes are invalid.
    ///
    /// Returns a lifecycle error if the host fails to create the shared container or a hook
    /// fails while pre-warming. Anything created up to that point is torn down again.
    pub fn build(self, configs: &[PoolConfig]) -> Result<Registry> {
        self.check(configs)?;

        let needs_container = configs
            .iter()
            .any(|config| config.lifecycle_kind() == LifecycleKind::HostAttached);

        let container = match (&self.host, needs_container) {
            (Some(host), true) => Some(
                host.create_container(CONTAINER_NAME)
                    .map_err(|source| Error::Hook {
                        item_type: type_name::<Registry>(),
                        stage: Stage::Create,
                        source,
                    })?,
            ),
            _ => None,
        };

        let context = BuildContext {
            host: self.host.as_ref(),
            container,
            drop_policy: self.drop_policy,
        };

        // If anything below fails, dropping the partially built registry tears down what exists.
        let mut registry = Registry::new_inner(self.host.clone(), container);

        for config in configs {
            let registration = self
                .registrations
                .get(config.type_key())
                .ok_or_else(|| unregistered_key(config))?;

            (registration.factory)(config, &context, &mut registry)?;

            debug!(
                type_key = config.type_key(),
                item_type = registration.item_type,
                lifecycle = ?config.lifecycle_kind(),
                initial_size = config.initial_size(),
                maximum_size = config.maximum_size(),
                "reservoir created"
            );
        }

        info!(reservoirs = registry.len(), "pool registry built");

        Ok(registry)
    }

    fn add<T: 'static>(
        mut self,
        type_key: String,
        lifecycle_kind: LifecycleKind,
        factory: Factory,
    ) -> Self {
        let type_id = TypeId::of::<T>();

        let type_registered_elsewhere = self
            .registrations
            .values()
            .any(|registration| registration.type_id == type_id);

        if type_registered_elsewhere || self.registrations.contains_key(&type_key) {
            self.duplicate_registrations.push(type_key);
            return self;
        }

        self.registrations.insert(
            type_key,
            Registration {
                type_id,
                item_type: type_name::<T>(),
                lifecycle_kind,
                factory,
            },
        );

        self
    }

    fn check(&self, configs: &[PoolConfig]) -> Result<()> {
        if let Some(type_key) = self.duplicate_registrations.first() {
            return Err(Error::Configuration {
                type_key: type_key.clone(),
                problem: "the type key or its item type is registered more than once".to_string(),
            });
        }

        let mut seen = HashSet::with_capacity(configs.len());

        for config in configs {
            config.validate()?;

            if !seen.insert(config.type_key()) {
                return Err(Error::Configuration {
                    type_key: config.type_key().to_string(),
                    problem: "the type key appears in more than one entry".to_string(),
                });
            }

            let registration = self
                .registrations
                .get(config.type_key())
                .ok_or_else(|| unregistered_key(config))?;

            if registration.lifecycle_kind != config.lifecycle_kind() {
                return Err(Error::Configuration {
                    type_key: config.type_key().to_string(),
                    problem: format!(
                        "the entry uses the {:?} lifecycle but {} is registered for {:?}",
                        config.lifecycle_kind(),
                        registration.item_type,
                        registration.lifecycle_kind
                    ),
                });
            }

            if config.lifecycle_kind() == LifecycleKind::HostAttached && self.host.is_none() {
                return Err(Error::Configuration {
                    type_key: config.type_key().to_string(),
                    problem: "host-attached entries require a host".to_string(),
                });
            }
        }

        Ok(())
    }
}

fn unregistered_key(config: &PoolConfig) -> Error {
    Error::Configuration {
        type_key: config.type_key().to_string(),
        problem: "no item type is registered under this type key".to_string(),
    }
}

fn build_in_process<T>(
    config: &PoolConfig,
    context: &BuildContext<'_>,
    registry: &mut Registry,
) -> Result<()>
where
    T: Poolable + Default + 'static,
{
    let reservoir = Reservoir::from_config(config, InProcess::<T>::new(), context.drop_policy)?;
    registry.insert(reservoir);
    Ok(())
}

fn build_host_attached<T>(
    config: &PoolConfig,
    context: &BuildContext<'_>,
    registry: &mut Registry,
) -> Result<()>
where
    T: Attached + 'static,
{
    // `check()` has already verified that these exist for host-attached entries.
    let (Some(host), Some(container), Some(descriptor)) = (
        context.host,
        context.container,
        config.materialization_descriptor(),
    ) else {
        return Err(Error::Configuration {
            type_key: config.type_key().to_string(),
            problem: "host-attached entries require a host and a materialization descriptor"
                .to_string(),
        });
    };

    let lifecycle = HostAttached::<T>::new(Rc::clone(host), container, descriptor.clone());
    let reservoir = Reservoir::from_config(config, lifecycle, context.drop_policy)?;
    registry.insert(reservoir);
    Ok(())
}
