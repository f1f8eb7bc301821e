use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::{Arc, LazyLock};

use foldhash::fast::RandomState;

use crate::{Error, Registry, Result};

static GLOBAL: LazyLock<Registries> = LazyLock::new(Registries::new);

/// A collection of [`Registry`] instances, at most one per value type.
///
/// The process-wide collection behind [`Registry::instance()`] is available via
/// [`Registries::global()`]. Additional collections can be created for scoped use, such as
/// giving each test or each tenant its own set of registries.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use new_zealand::nz;
/// use pooled_registry::{Registries, Registry};
///
/// let registries = Registries::new();
///
/// // Install a custom-configured registry before anyone asks for it.
/// registries
///     .register(Registry::<u64>::builder().capacity(nz!(8)).build())
///     .unwrap();
///
/// let numbers = registries.get::<u64>();
/// assert_eq!(numbers.capacity().get(), 8);
///
/// // Types without a registered registry get one with the default configuration.
/// let names = registries.get::<String>();
/// assert_eq!(names.capacity().get(), 1024);
///
/// assert!(Arc::ptr_eq(&names, &registries.get::<String>()));
/// assert_eq!(registries.len(), 2);
/// ```
pub struct Registries {
    registries: scc::HashMap<TypeId, Arc<dyn Any + Send + Sync>, RandomState>,
}

impl Registries {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registries: scc::HashMap::with_hasher(RandomState::default()),
        }
    }

    /// The process-wide collection used by [`Registry::instance()`].
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Returns the registry for `T`, creating one with the default configuration if this
    /// collection does not have one yet.
    ///
    /// Concurrent callers asking for the same type all receive the same registry.
    #[must_use]
    pub fn get<T>(&self) -> Arc<Registry<T>>
    where
        T: Send + Sync + 'static,
    {
        let key = TypeId::of::<T>();

        let erased = match self.registries.read(&key, |_, registry| Arc::clone(registry)) {
            Some(registry) => registry,
            None => Arc::clone(
                self.registries
                    .entry(key)
                    .or_insert_with(|| {
                        Arc::new(Registry::<T>::new()) as Arc<dyn Any + Send + Sync>
                    })
                    .get(),
            ),
        };

        erased
            .downcast::<Registry<T>>()
            .expect("registries are keyed by the TypeId of their value type")
    }

    /// Installs `registry` as the registry for `T` and returns it.
    ///
    /// Use this to give a type a registry with a non-default configuration. It has to happen
    /// before the first [`get()`][Self::get] for the same type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRegistered`] if this collection already has a registry for `T`.
    /// The existing registry is kept.
    pub fn register<T>(&self, registry: Registry<T>) -> Result<Arc<Registry<T>>>
    where
        T: Send + Sync + 'static,
    {
        let registry = Arc::new(registry);

        self.registries
            .insert(TypeId::of::<T>(), Arc::clone(&registry) as Arc<dyn Any + Send + Sync>)
            .map_err(|_| Error::AlreadyRegistered {
                type_name: type_name::<T>(),
            })?;

        Ok(registry)
    }

    /// The number of value types that have a registry in this collection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registries.len()
    }

    /// Whether no value type has a registry in this collection yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registries {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registries")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
