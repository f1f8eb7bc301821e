use std::any::type_name;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::fmt;
use std::hash::Hash;
use std::num::NonZero;
use std::sync::Arc;

use nm::Event;
use scc::Equivalent;
use tracing::debug;

use crate::bindings::Bindings;
use crate::entry::Entry;
use crate::identifier::IdGenerator;
use crate::pool::{Pool, Pooled, SlotKey};
use crate::{Error, ExhaustionPolicy, Handle, Identifier, Registries, RegistryBuilder, Result};

thread_local! {
    static BINDINGS_CREATED: Event = Event::builder()
        .name("pooled_registry_bindings_created")
        .build();

    static BINDINGS_REPLACED: Event = Event::builder()
        .name("pooled_registry_bindings_replaced")
        .build();

    static POOL_EXHAUSTED: Event = Event::builder()
        .name("pooled_registry_pool_exhausted")
        .build();
}

/// A keyed store of values of type `T`, backed by a fixed-capacity pool.
///
/// Each binding maps an [`Identifier`] to one value. Values are created in place in the
/// registry's pool and accessed through [`Handle`]s. Lookups never block, not even while other
/// threads are replacing the binding being looked up.
///
/// There are multiple ways to create a binding:
///
/// * [`create()`][1] - binds an already constructed value.
/// * [`create_with()`][2] - constructs the value only once a pool slot has been reserved, so a
///   full pool never pays for construction.
/// * [`try_create_with()`][3] - as above, for constructors that can fail.
/// * [`create_unnamed()`][4] and [`create_unnamed_with()`][5] - bind under a generated
///   identifier that can never collide with a caller-supplied one.
///
/// Creating a binding for an identifier that is already bound replaces the existing binding.
/// Handles obtained earlier keep referring to the value they were obtained for; see [`Handle`]
/// for details.
///
/// # Instances
///
/// A registry can be created and passed around like any other value via [`new()`][6] or
/// [`builder()`][7]. For code that wants one shared registry per value type in the process,
/// [`instance()`][8] returns the registry for `T` from [`Registries::global()`].
///
/// # Capacity
///
/// The pool holds a fixed number of values, configured through [`RegistryBuilder::capacity()`]
/// (1024 by default). A value occupies its slot while it is bound or while any [`Handle`] to it
/// exists. Once its binding has been replaced or removed and the last handle has been dropped,
/// the value is dropped and the slot is immediately available for the next creation.
///
/// A pool with room for `n` values therefore always fits `n` bindings when no handles are held,
/// no matter how often identifiers are overwritten.
///
/// When the pool is full, creation fails with [`Error::OutOfCapacity`] or waits for a slot,
/// depending on the [`ExhaustionPolicy`].
///
/// # Example
///
/// ```
/// use pooled_registry::Registry;
///
/// let registry = Registry::<String>::new();
///
/// let greeting = registry.create("greeting", "hello".to_string()).unwrap();
/// assert_eq!(*greeting, "hello");
///
/// let found = registry.find("greeting").unwrap();
/// assert_eq!(*found, "hello");
///
/// assert!(registry.find("farewell").is_none());
/// assert_eq!(registry.len(), 1);
/// ```
///
/// [1]: Self::create
/// [2]: Self::create_with
/// [3]: Self::try_create_with
/// [4]: Self::create_unnamed
/// [5]: Self::create_unnamed_with
/// [6]: Self::new
/// [7]: Self::builder
/// [8]: Self::instance
pub struct Registry<T>
where
    T: 'static,
{
    /// Each bound key owns one reference to its entry, given up via [`Pooled::into_key()`]
    /// and taken back by [`release()`][Self::release] once the binding is unlinked.
    bindings: Bindings<SlotKey>,
    pool: Arc<Pool<Entry<T>>>,
    ids: IdGenerator,
}

impl<T> Registry<T>
where
    T: 'static,
{
    pub(crate) fn new_inner(capacity: NonZero<usize>, exhaustion_policy: ExhaustionPolicy) -> Self {
        let pool = Pool::builder()
            .capacity(capacity)
            .exhaustion_policy(exhaustion_policy)
            .build();

        debug!(
            type_name = type_name::<T>(),
            capacity = capacity.get(),
            ?exhaustion_policy,
            "created registry"
        );

        Self {
            bindings: Bindings::with_capacity(capacity.get()),
            pool: Arc::new(pool),
            ids: IdGenerator::new(),
        }
    }

    /// Creates a new [`Registry`] with the default configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use pooled_registry::Registry;
    ///
    /// let registry = Registry::<u64>::new();
    ///
    /// assert!(registry.is_empty());
    /// assert_eq!(registry.capacity().get(), 1024);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a new [`Registry`].
    ///
    /// Use this when you want to customize the registry configuration beyond the defaults.
    ///
    /// # Example
    ///
    /// ```
    /// use new_zealand::nz;
    /// use pooled_registry::{ExhaustionPolicy, Registry};
    ///
    /// let registry = Registry::<u64>::builder()
    ///     .capacity(nz!(16))
    ///     .exhaustion_policy(ExhaustionPolicy::Block)
    ///     .build();
    ///
    /// assert_eq!(registry.capacity().get(), 16);
    /// ```
    pub fn builder() -> RegistryBuilder<T> {
        RegistryBuilder::new()
    }

    /// Binds `value` to `id`, replacing any existing binding, and returns a handle to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfCapacity`] if the pool is full and configured to fail fast.
    /// The registry is unchanged in that case.
    ///
    /// # Example
    ///
    /// ```
    /// use pooled_registry::Registry;
    ///
    /// let registry = Registry::<i32>::new();
    ///
    /// registry.create("x", 1).unwrap();
    /// let handle = registry.create("x", 2).unwrap();
    ///
    /// assert_eq!(*handle, 2);
    /// assert_eq!(registry.len(), 1);
    /// ```
    pub fn create(&self, id: impl Into<Identifier>, value: T) -> Result<Handle<T>> {
        self.bind(id.into(), || Ok::<_, Infallible>(value))
    }

    /// Reserves pool storage, then binds the value returned by `construct` to `id`, replacing
    /// any existing binding.
    ///
    /// `construct` is not called if the pool has no room.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfCapacity`] if the pool is full and configured to fail fast.
    pub fn create_with<F>(&self, id: impl Into<Identifier>, construct: F) -> Result<Handle<T>>
    where
        F: FnOnce() -> T,
    {
        self.bind(id.into(), || Ok::<_, Infallible>(construct()))
    }

    /// Reserves pool storage, then binds the value returned by `construct` to `id`, replacing
    /// any existing binding.
    ///
    /// If `construct` fails, nothing is bound, any existing binding of `id` is left in place and
    /// the reserved storage is returned to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfCapacity`] if the pool is full and configured to fail fast, or
    /// [`Error::Construction`] wrapping the error returned by `construct`.
    ///
    /// # Example
    ///
    /// ```
    /// use pooled_registry::{Error, Registry};
    ///
    /// let registry = Registry::<u16>::new();
    ///
    /// let port = registry.try_create_with("port", || "8080".parse::<u16>()).unwrap();
    /// assert_eq!(*port, 8080);
    ///
    /// let result = registry.try_create_with("port", || "http".parse::<u16>());
    /// assert!(matches!(result, Err(Error::Construction { .. })));
    ///
    /// // The earlier binding is untouched.
    /// assert_eq!(*registry.find("port").unwrap(), 8080);
    /// ```
    pub fn try_create_with<F, E>(
        &self,
        id: impl Into<Identifier>,
        construct: F,
    ) -> Result<Handle<T>>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        self.bind(id.into(), construct)
    }

    /// Binds `value` under a newly generated identifier and returns a handle to it.
    ///
    /// The identifier is available through [`Handle::id()`]. Generated identifiers are unique
    /// within this registry and never equal a caller-supplied identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfCapacity`] if the pool is full and configured to fail fast.
    ///
    /// # Example
    ///
    /// ```
    /// use pooled_registry::Registry;
    ///
    /// let registry = Registry::<&'static str>::new();
    ///
    /// let a = registry.create_unnamed("a").unwrap();
    /// let b = registry.create_unnamed("b").unwrap();
    ///
    /// assert_ne!(a.id(), b.id());
    /// assert_eq!(*registry.find(a.id()).unwrap(), "a");
    /// ```
    pub fn create_unnamed(&self, value: T) -> Result<Handle<T>> {
        self.bind(self.ids.next(), || Ok::<_, Infallible>(value))
    }

    /// Reserves pool storage, then binds the value returned by `construct` under a newly
    /// generated identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfCapacity`] if the pool is full and configured to fail fast.
    pub fn create_unnamed_with<F>(&self, construct: F) -> Result<Handle<T>>
    where
        F: FnOnce() -> T,
    {
        self.bind(self.ids.next(), || Ok::<_, Infallible>(construct()))
    }

    fn bind<F, E>(&self, id: Identifier, construct: F) -> Result<Handle<T>>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let entry = Entry::materialize(&self.pool, id, construct).inspect_err(|error| {
            if matches!(error, Error::OutOfCapacity { .. }) {
                POOL_EXHAUSTED.with(|e| e.observe_once());
            }
        })?;

        let handle = Handle::new(entry.clone());

        match self.bindings.upsert(entry.id().clone(), Pooled::into_key(entry)) {
            Some(replaced) => {
                BINDINGS_REPLACED.with(|e| e.observe_once());
                self.release(replaced);
            }
            None => BINDINGS_CREATED.with(|e| e.observe_once()),
        }

        Ok(handle)
    }

    /// Drops the reference owned by a binding that has just been unlinked.
    fn release(&self, key: SlotKey) {
        // SAFETY: Every key in the bindings carries one reference given up by `bind()`, and the
        // bindings hand each unlinked key back exactly once, to the caller that unlinked it.
        drop(unsafe { self.pool.adopt(key) });
    }

    /// Returns a handle to the value currently bound to `id`, if any.
    ///
    /// `id` can be an [`Identifier`] or a borrowed name such as a `&str`, so looking up a name
    /// does not allocate.
    ///
    /// # Example
    ///
    /// ```
    /// use pooled_registry::Registry;
    ///
    /// let registry = Registry::<u32>::new();
    /// registry.create("x", 42).unwrap();
    ///
    /// assert_eq!(*registry.find("x").unwrap(), 42);
    /// assert!(registry.find("y").is_none());
    /// ```
    #[must_use]
    pub fn find<Q>(&self, id: &Q) -> Option<Handle<T>>
    where
        Q: Equivalent<Identifier> + Hash + ?Sized,
    {
        loop {
            let key = self.bindings.lookup(id)?;

            if let Some(entry) = self.pool.upgrade(key) {
                return Some(Handle::new(entry));
            }

            // The binding was replaced or removed after the lookup and its value is gone.
            // Whatever is bound now, if anything, is what the caller gets.
        }
    }

    /// Whether a value is currently bound to `id`.
    #[must_use]
    pub fn contains<Q>(&self, id: &Q) -> bool
    where
        Q: Equivalent<Identifier> + Hash + ?Sized,
    {
        self.bindings.contains(id)
    }

    /// Removes the binding of `id`. Returns whether there was one.
    ///
    /// Handles to the removed value remain valid. Its storage returns to the pool as soon as
    /// the last of them is dropped, or right away if there are none.
    pub fn remove<Q>(&self, id: &Q) -> bool
    where
        Q: Equivalent<Identifier> + Hash + ?Sized,
    {
        let Some(key) = self.bindings.remove(id) else {
            return false;
        };

        self.release(key);
        true
    }

    /// Removes every binding.
    ///
    /// Handles to the removed values remain valid. Storage of values without handles returns to
    /// the pool before this returns, the rest follows as their last handles are dropped.
    ///
    /// # Example
    ///
    /// ```
    /// use pooled_registry::Registry;
    ///
    /// let registry = Registry::<u32>::new();
    /// registry.create("a", 1).unwrap();
    /// registry.create("b", 2).unwrap();
    ///
    /// registry.clear();
    ///
    /// assert!(registry.is_empty());
    /// assert!(registry.find("a").is_none());
    /// ```
    pub fn clear(&self) {
        let removed = self.bindings.drain();

        debug!(
            type_name = type_name::<T>(),
            bindings = removed.len(),
            "cleared registry"
        );

        for key in removed {
            self.release(key);
        }
    }

    /// The number of bindings.
    ///
    /// Under concurrent use this is a snapshot that may be out of date by the time it returns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether there are no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The maximum number of simultaneously live values.
    #[must_use]
    pub fn capacity(&self) -> NonZero<usize> {
        self.pool.capacity()
    }

    /// The number of pool slots currently in use, including values that are no longer bound but
    /// are still referenced by handles.
    #[must_use]
    pub fn live_instances(&self) -> usize {
        self.pool.len()
    }

    /// What creating a binding does when the pool is full.
    #[must_use]
    pub fn exhaustion_policy(&self) -> ExhaustionPolicy {
        self.pool.exhaustion_policy()
    }
}

impl<T> Registry<T>
where
    T: Send + Sync + 'static,
{
    /// The process-wide registry for `T`, created with the default configuration on first
    /// access unless one was installed beforehand via [`Registries::register()`] on
    /// [`Registries::global()`]. It lives for the rest of the process.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use pooled_registry::Registry;
    ///
    /// struct Texture {
    ///     width: u32,
    /// }
    ///
    /// Registry::<Texture>::instance()
    ///     .create("grass", Texture { width: 64 })
    ///     .unwrap();
    ///
    /// // Elsewhere in the process.
    /// let grass = Registry::<Texture>::instance().find("grass").unwrap();
    /// assert_eq!(grass.width, 64);
    ///
    /// assert!(Arc::ptr_eq(
    ///     &Registry::<Texture>::instance(),
    ///     &Registry::<Texture>::instance()
    /// ));
    /// ```
    #[must_use]
    pub fn instance() -> Arc<Self> {
        Registries::global().get::<T>()
    }
}

impl<T> Default for Registry<T>
where
    T: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Registry<T>
where
    T: 'static,
{
    fn drop(&mut self) {
        for key in self.bindings.drain() {
            self.release(key);
        }
    }
}

impl<T> fmt::Debug for Registry<T>
where
    T: 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("bindings", &self.bindings)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
