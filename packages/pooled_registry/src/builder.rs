use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZero;

use crate::pool::DEFAULT_CAPACITY;
use crate::{ExhaustionPolicy, Registry};

/// Builder for creating an instance of [`Registry`].
///
/// You only need to use this builder if you want to customize the registry configuration.
/// The default configuration used by [`Registry::new()`][1] holds up to 1024 live values and
/// fails fast when full.
///
/// # Examples
///
/// ```
/// use new_zealand::nz;
/// use pooled_registry::Registry;
///
/// let registry = Registry::<u32>::builder().capacity(nz!(4096)).build();
/// ```
///
/// [1]: Registry::new
#[must_use]
pub struct RegistryBuilder<T> {
    capacity: NonZero<usize>,
    exhaustion_policy: ExhaustionPolicy,

    _item: PhantomData<T>,
}

impl<T> fmt::Debug for RegistryBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("capacity", &self.capacity)
            .field("exhaustion_policy", &self.exhaustion_policy)
            .finish()
    }
}

impl<T> RegistryBuilder<T>
where
    T: 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            exhaustion_policy: ExhaustionPolicy::default(),
            _item: PhantomData,
        }
    }

    /// Sets the maximum number of simultaneously live values. Defaults to 1024.
    ///
    /// All pool storage is allocated up front when the registry is built.
    pub fn capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets what creating a binding does when the pool is full. Defaults to
    /// [`ExhaustionPolicy::FailFast`].
    pub fn exhaustion_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.exhaustion_policy = policy;
        self
    }

    /// Builds the registry with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if the capacity exceeds [`MAX_CAPACITY`][crate::MAX_CAPACITY].
    #[must_use]
    pub fn build(self) -> Registry<T> {
        Registry::new_inner(self.capacity, self.exhaustion_policy)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;

    use super::*;
    use crate::MAX_CAPACITY;

    #[test]
    fn defaults() {
        let registry = RegistryBuilder::<u32>::new().build();

        assert_eq!(registry.capacity(), DEFAULT_CAPACITY);
        assert_eq!(registry.exhaustion_policy(), ExhaustionPolicy::FailFast);
    }

    #[test]
    fn configured_values_reach_registry() {
        let registry = Registry::<u32>::builder()
            .capacity(nz!(7))
            .exhaustion_policy(ExhaustionPolicy::Block)
            .build();

        assert_eq!(registry.capacity().get(), 7);
        assert_eq!(registry.exhaustion_policy(), ExhaustionPolicy::Block);
    }

    #[test]
    fn later_setting_wins() {
        let registry = Registry::<u32>::builder()
            .capacity(nz!(7))
            .capacity(nz!(3))
            .build();

        assert_eq!(registry.capacity().get(), 3);
    }

    #[test]
    #[should_panic]
    fn capacity_over_maximum_panics() {
        let capacity = NonZero::new(MAX_CAPACITY + 1).unwrap();
        drop(Registry::<u8>::builder().capacity(capacity).build());
    }
}
