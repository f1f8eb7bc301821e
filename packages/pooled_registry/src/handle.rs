use std::fmt;
use std::ops::Deref;

use crate::Identifier;
use crate::entry::Entry;
use crate::pool::Pooled;

/// A reference to a value bound in a [`Registry`][crate::Registry], returned by
/// [`create()`][crate::Registry::create] and [`find()`][crate::Registry::find].
///
/// # Snapshot semantics
///
/// A handle is bound to the entry that existed when it was obtained and keeps observing that
/// entry's value for as long as the handle exists. Later overwrites of the same identifier,
/// [`remove()`][crate::Registry::remove] and [`clear()`][crate::Registry::clear] only affect
/// what the registry hands out from then on - the handle never re-resolves its identifier, and
/// the value it refers to stays alive and valid until the last handle to it is dropped.
///
/// ```
/// use pooled_registry::Registry;
///
/// let registry = Registry::<u32>::new();
///
/// let before = registry.create("x", 1).unwrap();
/// registry.create("x", 2).unwrap();
///
/// assert_eq!(*before, 1);
/// assert_eq!(*registry.find("x").unwrap(), 2);
/// ```
///
/// # Mutation
///
/// A handle only grants shared access. Values that need to change in place use interior
/// mutability, and the change is visible through every handle to the same entry:
///
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// use pooled_registry::Registry;
///
/// let registry = Registry::<AtomicU32>::new();
///
/// let counter = registry.create("hits", AtomicU32::new(0)).unwrap();
/// counter.fetch_add(1, Ordering::Relaxed);
///
/// let found = registry.find("hits").unwrap();
/// assert_eq!(found.load(Ordering::Relaxed), 1);
/// ```
///
/// Cloning a handle is cheap and yields another reference to the same entry.
pub struct Handle<T> {
    entry: Pooled<Entry<T>>,
}

impl<T> Handle<T> {
    pub(crate) fn new(entry: Pooled<Entry<T>>) -> Self {
        Self { entry }
    }

    /// The identifier the value was bound under when this handle was obtained.
    #[must_use]
    pub fn id(&self) -> &Identifier {
        self.entry.id()
    }

    /// The referenced value. Equivalent to dereferencing the handle.
    #[must_use]
    pub fn value(&self) -> &T {
        self.entry.value()
    }

    /// Whether two handles refer to the same entry.
    ///
    /// Handles obtained for the same identifier before and after an overwrite refer to
    /// different entries, even if the values compare equal.
    ///
    /// # Example
    ///
    /// ```
    /// use pooled_registry::{Handle, Registry};
    ///
    /// let registry = Registry::<u32>::new();
    ///
    /// let created = registry.create("x", 5).unwrap();
    /// let found = registry.find("x").unwrap();
    /// assert!(Handle::ptr_eq(&created, &found));
    ///
    /// let replaced = registry.create("x", 5).unwrap();
    /// assert!(!Handle::ptr_eq(&created, &replaced));
    /// ```
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Pooled::ptr_eq(&this.entry, &other.entry)
    }
}

impl<T> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value()
    }
}

impl<T> AsRef<T> for Handle<T> {
    fn as_ref(&self) -> &T {
        self.value()
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            entry: self.entry.clone(),
        }
    }
}

impl<T> fmt::Debug for Handle<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", self.id())
            .field("value", self.value())
            .finish()
    }
}
