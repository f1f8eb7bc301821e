use std::any::type_name;
use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::{ManuallyDrop, MaybeUninit};
use std::num::NonZero;
use std::ops::Deref;
use std::sync::atomic::{self, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::{ptr, thread};

use new_zealand::nz;
use tracing::trace;

/// Marks the end of the vacant slot stack.
const NO_SLOT: u32 = u32::MAX;

/// The largest number of live instances a registry can be configured to hold.
pub const MAX_CAPACITY: usize = (u32::MAX - 1) as usize;

/// Beyond this, a reference count increment is treated as a leak of references.
const MAX_REFS: usize = usize::MAX / 2;

/// Capacity used when the caller does not configure one.
pub(crate) const DEFAULT_CAPACITY: NonZero<usize> = nz!(1024);

/// What creating a binding does when every pool slot of the registry holds a live instance.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum ExhaustionPolicy {
    /// Fail immediately with [`Error::OutOfCapacity`][crate::Error::OutOfCapacity].
    #[default]
    FailFast,

    /// Park the calling thread until another thread releases a slot.
    ///
    /// A slot is released once its binding has been replaced or removed and the last handle
    /// to its value has been dropped. If that never happens, the caller waits forever.
    Block,
}

/// A fixed-capacity arena that stores instances of `T` in a slot array allocated up front.
///
/// Vacant slots form a lock-free stack threaded through the slots themselves, so both
/// allocation and release take constant time regardless of capacity. Occupied slots are
/// reference counted through [`Pooled`] and return to the vacant stack when the last
/// reference is dropped.
///
/// Every [`Registry`][crate::Registry] owns one pool, sized through its builder.
pub(crate) struct Pool<T> {
    slots: Box<[Slot<T>]>,

    /// Top of the vacant slot stack. The low 32 bits are the slot index (or [`NO_SLOT`]),
    /// the high 32 bits are a tag bumped on every change so a stale head can never be
    /// mistaken for the current one.
    vacant_head: AtomicU64,

    /// Number of slots that are reserved or occupied.
    live: AtomicUsize,

    capacity: NonZero<usize>,
    exhaustion_policy: ExhaustionPolicy,

    // Only used with `ExhaustionPolicy::Block`. Waiters hold the lock between checking the
    // vacant stack and parking, releasers take it after pushing a slot, so no wakeup is lost.
    vacancy_lock: Mutex<()>,
    vacancy_signal: Condvar,
}

struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,

    /// Number of `Pooled` references to the value. Zero while the slot is vacant or reserved.
    refs: AtomicUsize,

    /// Bumped every time the slot is released, so a key from an earlier occupant is detected.
    generation: AtomicU32,

    /// Next slot down the vacant stack. Only meaningful while the slot is on the stack.
    next_vacant: AtomicU32,
}

/// Locates an occupied slot and the occupancy it belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct SlotKey {
    index: u32,
    generation: u32,
}

impl<T> Pool<T> {
    pub(crate) fn builder() -> PoolBuilder<T> {
        PoolBuilder::new()
    }

    fn new_inner(capacity: NonZero<usize>, exhaustion_policy: ExhaustionPolicy) -> Self {
        assert!(
            capacity.get() <= MAX_CAPACITY,
            "pool of {} cannot hold {} slots, the maximum is {MAX_CAPACITY}",
            type_name::<T>(),
            capacity
        );

        let last_index = capacity.get().checked_sub(1).expect("capacity is non-zero");

        // Initially every slot is vacant and the stack hands them out in index order.
        let slots = (0..capacity.get())
            .map(|index| Slot {
                value: UnsafeCell::new(MaybeUninit::uninit()),
                refs: AtomicUsize::new(0),
                generation: AtomicU32::new(0),
                next_vacant: AtomicU32::new(if index == last_index {
                    NO_SLOT
                } else {
                    to_slot_index(index.checked_add(1).expect("guarded by capacity limit"))
                }),
            })
            .collect();

        Self {
            slots,
            vacant_head: AtomicU64::new(pack(0, 0)),
            live: AtomicUsize::new(0),
            capacity,
            exhaustion_policy,
            vacancy_lock: Mutex::new(()),
            vacancy_signal: Condvar::new(),
        }
    }

    /// The maximum number of simultaneously live instances.
    #[must_use]
    pub(crate) fn capacity(&self) -> NonZero<usize> {
        self.capacity
    }

    /// The number of slots currently reserved or holding a live instance.
    ///
    /// Under concurrent use this is a snapshot that may be out of date by the time it returns.
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// What happens when an allocation finds every slot in use.
    #[must_use]
    pub(crate) fn exhaustion_policy(&self) -> ExhaustionPolicy {
        self.exhaustion_policy
    }

    /// Reserves a vacant slot. The slot returns to the pool if the reservation is dropped
    /// without being filled.
    ///
    /// Returns `None` if every slot is in use and the pool is configured with
    /// [`ExhaustionPolicy::FailFast`].
    #[must_use]
    pub(crate) fn allocate(self: &Arc<Self>) -> Option<Reservation<T>> {
        let index = match self.pop_vacant() {
            Some(index) => index,
            None => match self.exhaustion_policy {
                ExhaustionPolicy::FailFast => return None,
                ExhaustionPolicy::Block => self.wait_for_vacancy(),
            },
        };

        self.live.fetch_add(1, Ordering::Relaxed);

        Some(Reservation {
            pool: Arc::clone(self),
            index,
        })
    }

    #[cfg_attr(test, mutants::skip)] // Mutation can turn this into a thread that never wakes up.
    fn wait_for_vacancy(&self) -> u32 {
        let mut guard = self
            .vacancy_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        loop {
            if let Some(index) = self.pop_vacant() {
                return index;
            }

            trace!(
                type_name = type_name::<T>(),
                thread = ?thread::current().id(),
                "waiting for a vacant slot"
            );

            guard = self
                .vacancy_signal
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Returns a new reference to the value identified by `key`, or `None` if that occupancy
    /// of the slot has already ended.
    ///
    /// Unlike [`Clone`], this does not require an existing reference, so it may race with the
    /// release of the last one. The slot is only pinned if it is occupied at the time, and the
    /// reference is only returned if the occupant is still the one `key` was issued for.
    pub(crate) fn upgrade(self: &Arc<Self>, key: SlotKey) -> Option<Pooled<T>> {
        let slot = self.slot(key.index);

        let mut refs = slot.refs.load(Ordering::Relaxed);

        loop {
            if refs == 0 {
                return None;
            }

            assert!(
                refs < MAX_REFS,
                "too many references to slot {} in pool of {}",
                key.index,
                type_name::<T>()
            );

            match slot.refs.compare_exchange_weak(
                refs,
                refs + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => refs = actual,
            }
        }

        // While we hold a reference the slot cannot be released, so the generation is stable.
        let pooled = Pooled {
            pool: Arc::clone(self),
            key: SlotKey {
                index: key.index,
                generation: slot.generation.load(Ordering::Acquire),
            },
        };

        // On a mismatch the reference we took belongs to a later occupant and dropping it
        // gives it back.
        (pooled.key == key).then_some(pooled)
    }

    /// Takes back a reference previously given up via [`Pooled::into_key()`].
    ///
    /// # Safety
    ///
    /// The caller must own a reference that was turned into `key` by [`Pooled::into_key()`]
    /// on a reference from this pool, and must not adopt the same reference twice.
    pub(crate) unsafe fn adopt(self: &Arc<Self>, key: SlotKey) -> Pooled<T> {
        Pooled {
            pool: Arc::clone(self),
            key,
        }
    }

    fn slot(&self, index: u32) -> &Slot<T> {
        self.slots
            .get(index as usize)
            .expect("slot indexes are only minted for slots of this pool")
    }

    fn pop_vacant(&self) -> Option<u32> {
        let mut head = self.vacant_head.load(Ordering::Acquire);

        loop {
            let (index, tag) = unpack(head);

            if index == NO_SLOT {
                return None;
            }

            // If another thread pops this slot before we do, the head tag will have changed
            // and the exchange below fails, so a stale value read here is never used.
            let next = self.slot(index).next_vacant.load(Ordering::Relaxed);

            match self.vacant_head.compare_exchange_weak(
                head,
                pack(next, tag.wrapping_add(1)),
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(index),
                Err(actual) => head = actual,
            }
        }
    }

    fn push_vacant(&self, index: u32) {
        let mut head = self.vacant_head.load(Ordering::Relaxed);

        loop {
            let (top, tag) = unpack(head);

            self.slot(index).next_vacant.store(top, Ordering::Relaxed);

            // Release publishes both `next_vacant` and the destruction of the previous
            // occupant to whichever thread pops this slot next.
            match self.vacant_head.compare_exchange_weak(
                head,
                pack(index, tag.wrapping_add(1)),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => head = actual,
            }
        }
    }

    /// Returns a slot that holds no value to the vacant stack.
    fn release_vacant(&self, index: u32) {
        // Uncount before pushing, so `live` never overshoots capacity when the slot is
        // immediately popped by another thread.
        let previous = self.live.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previous > 0, "released a slot of a pool that had no live slots");

        self.push_vacant(index);

        if self.exhaustion_policy == ExhaustionPolicy::Block {
            let _guard = self
                .vacancy_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            self.vacancy_signal.notify_one();
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("capacity", &self.capacity)
            .field("live", &self.len())
            .field("exhaustion_policy", &self.exhaustion_policy)
            .finish_non_exhaustive()
    }
}

// SAFETY: Values are only reached through `Pooled` (shared references, from any thread) and are
// dropped on whichever thread releases the last reference. That is sound when `T` is both
// `Send` and `Sync`. All other shared state is atomic or behind a mutex.
unsafe impl<T: Send + Sync> Sync for Pool<T> {}

#[expect(
    clippy::cast_possible_truncation,
    reason = "the shift and mask select exactly 32 bits each"
)]
fn unpack(head: u64) -> (u32, u32) {
    ((head & u64::from(u32::MAX)) as u32, (head >> 32) as u32)
}

fn pack(index: u32, tag: u32) -> u64 {
    (u64::from(tag) << 32) | u64::from(index)
}

fn to_slot_index(index: usize) -> u32 {
    u32::try_from(index).expect("guarded by MAX_CAPACITY check in pool constructor")
}

#[must_use]
pub(crate) struct PoolBuilder<T> {
    capacity: NonZero<usize>,
    exhaustion_policy: ExhaustionPolicy,

    _item: PhantomData<T>,
}

impl<T> fmt::Debug for PoolBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("capacity", &self.capacity)
            .field("exhaustion_policy", &self.exhaustion_policy)
            .finish()
    }
}

impl<T> PoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            exhaustion_policy: ExhaustionPolicy::default(),
            _item: PhantomData,
        }
    }

    pub(crate) fn capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.capacity = capacity;
        self
    }

    pub(crate) fn exhaustion_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.exhaustion_policy = policy;
        self
    }

    /// Allocates all of the slots up front.
    ///
    /// # Panics
    ///
    /// Panics if the capacity exceeds [`MAX_CAPACITY`].
    #[must_use]
    pub(crate) fn build(self) -> Pool<T> {
        Pool::new_inner(self.capacity, self.exhaustion_policy)
    }
}

/// A vacant slot taken off the vacant stack, waiting to be filled with a value.
pub(crate) struct Reservation<T> {
    pool: Arc<Pool<T>>,
    index: u32,
}

impl<T> Reservation<T> {
    /// Moves the value into the reserved slot and returns the first reference to it.
    pub(crate) fn fill(self, value: T) -> Pooled<T> {
        let this = ManuallyDrop::new(self);

        // SAFETY: We own `this` and ManuallyDrop ensures it will not be auto-dropped, which
        // would return the slot to the pool that we are about to occupy.
        let pool = unsafe { ptr::read(&raw const this.pool) };
        let index = this.index;

        let slot = pool.slot(index);

        // SAFETY: The slot was popped off the vacant stack, so no other thread can reach it
        // until we hand out a reference below. The previous occupant, if any, was dropped
        // before the slot was pushed back on the stack.
        unsafe {
            (*slot.value.get()).write(value);
        }

        // Pairs with the acquire in `Pool::upgrade()`, which must see the value we just wrote.
        slot.refs.store(1, Ordering::Release);

        let key = SlotKey {
            index,
            generation: slot.generation.load(Ordering::Relaxed),
        };

        Pooled { pool, key }
    }
}

impl<T> Drop for Reservation<T> {
    fn drop(&mut self) {
        self.pool.release_vacant(self.index);
    }
}

impl<T> fmt::Debug for Reservation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("index", &self.index)
            .finish()
    }
}

/// A counted reference to a value stored in a [`Pool`].
///
/// Cloning adds a reference to the same value. When the last reference is dropped, the value is
/// dropped in place and its slot returns to the pool.
pub(crate) struct Pooled<T> {
    pool: Arc<Pool<T>>,
    key: SlotKey,
}

impl<T> Pooled<T> {
    fn slot(&self) -> &Slot<T> {
        self.pool.slot(self.key.index)
    }

    /// Whether two references point to the same occupancy of the same slot.
    pub(crate) fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.pool, &other.pool) && this.key == other.key
    }

    /// Gives up this reference without releasing it and returns the key it was for.
    ///
    /// The slot stays occupied until the reference is taken back with [`Pool::adopt()`] and
    /// dropped. A key that is never adopted keeps its slot forever.
    #[must_use]
    pub(crate) fn into_key(this: Self) -> SlotKey {
        let this = ManuallyDrop::new(this);

        // SAFETY: ManuallyDrop ensures `this` is never dropped, so the pool handle is read out
        // exactly once. Only the slot reference is given up, not the handle to the pool.
        drop(unsafe { ptr::read(&raw const this.pool) });

        this.key
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        let slot = self.slot();

        assert_eq!(
            slot.generation.load(Ordering::Acquire),
            self.key.generation,
            "slot {} in pool of {} was released while still referenced",
            self.key.index,
            type_name::<T>()
        );

        // SAFETY: We hold a reference, so the slot stays occupied and the value initialized
        // until we are dropped. The value is only ever accessed through shared references.
        unsafe { (*slot.value.get()).assume_init_ref() }
    }
}

impl<T> Clone for Pooled<T> {
    fn clone(&self) -> Self {
        // A new reference can only be created from an existing one, so there is nothing to
        // synchronize with here.
        let previous = self.slot().refs.fetch_add(1, Ordering::Relaxed);

        assert!(
            previous < MAX_REFS,
            "too many references to slot {} in pool of {}",
            self.key.index,
            type_name::<T>()
        );

        Self {
            pool: Arc::clone(&self.pool),
            key: self.key,
        }
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        let slot = self.slot();

        if slot.refs.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }

        // Pairs with the release decrements of all the other references, so their accesses to
        // the value happen before we drop it.
        atomic::fence(Ordering::Acquire);

        slot.generation.fetch_add(1, Ordering::Release);

        // The slot goes back to the pool even if dropping the value panics.
        let pool = &self.pool;
        let index = self.key.index;
        let _release = scopeguard::guard((), |()| pool.release_vacant(index));

        // SAFETY: This was the last reference, so nobody can observe the value anymore and it
        // is still initialized. The slot is not on the vacant stack until the guard above runs.
        unsafe {
            (*slot.value.get()).assume_init_drop();
        }
    }
}

impl<T> fmt::Debug for Pooled<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("key", &self.key)
            .field("value", &**self)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Barrier, mpsc};
    use std::time::Duration;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(Pool<u32>: Send, Sync);
    assert_impl_all!(Pooled<u32>: Send, Sync);
    assert_not_impl_any!(Pool<std::cell::Cell<u32>>: Sync);

    fn pool_of<T>(capacity: NonZero<usize>) -> Arc<Pool<T>> {
        Arc::new(Pool::builder().capacity(capacity).build())
    }

    #[test]
    fn smoke_test() {
        let pool = pool_of::<u32>(nz!(3));

        let a = pool.allocate().unwrap().fill(42);
        let b = pool.allocate().unwrap().fill(43);
        let c = pool.allocate().unwrap().fill(44);

        assert_eq!(*a, 42);
        assert_eq!(*b, 43);
        assert_eq!(*c, 44);
        assert_eq!(pool.len(), 3);

        drop(b);
        assert_eq!(pool.len(), 2);

        let d = pool.allocate().unwrap().fill(45);

        assert_eq!(*a, 42);
        assert_eq!(*c, 44);
        assert_eq!(*d, 45);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn slots_are_handed_out_in_order_then_reused_most_recent_first() {
        let pool = pool_of::<u32>(nz!(3));

        let a = pool.allocate().unwrap().fill(1);
        let b = pool.allocate().unwrap().fill(2);
        let c = pool.allocate().unwrap().fill(3);

        assert_eq!(a.key.index, 0);
        assert_eq!(b.key.index, 1);
        assert_eq!(c.key.index, 2);

        drop(a);
        drop(c);

        let d = pool.allocate().unwrap().fill(4);
        let e = pool.allocate().unwrap().fill(5);

        assert_eq!(d.key.index, 2);
        assert_eq!(e.key.index, 0);
    }

    #[test]
    fn fail_fast_when_exhausted() {
        let pool = pool_of::<u32>(nz!(2));

        let _a = pool.allocate().unwrap().fill(1);
        let _b = pool.allocate().unwrap().fill(2);

        assert!(pool.allocate().is_none());
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn abandoned_reservation_returns_slot() {
        let pool = pool_of::<u32>(nz!(1));

        let reservation = pool.allocate().unwrap();
        assert_eq!(pool.len(), 1);
        assert!(pool.allocate().is_none());

        drop(reservation);
        assert_eq!(pool.len(), 0);

        let value = pool.allocate().unwrap().fill(7);
        assert_eq!(*value, 7);
    }

    #[test]
    fn clone_keeps_slot_occupied() {
        let pool = pool_of::<String>(nz!(1));

        let first = pool.allocate().unwrap().fill("hello".to_string());
        let second = first.clone();

        assert!(Pooled::ptr_eq(&first, &second));

        drop(first);
        assert_eq!(pool.len(), 1);
        assert_eq!(*second, "hello");

        drop(second);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn reuse_bumps_generation() {
        let pool = pool_of::<u32>(nz!(1));

        let first = pool.allocate().unwrap().fill(1);
        let first_key = first.key;
        drop(first);

        let second = pool.allocate().unwrap().fill(2);

        assert_eq!(second.key.index, first_key.index);
        assert_ne!(second.key.generation, first_key.generation);
    }

    #[test]
    fn key_round_trip_keeps_slot_occupied() {
        let pool = pool_of::<String>(nz!(1));

        let key = Pooled::into_key(pool.allocate().unwrap().fill("kept".to_string()));

        assert_eq!(pool.len(), 1);
        assert!(pool.allocate().is_none());

        // SAFETY: The reference given up above is adopted exactly once.
        let adopted = unsafe { pool.adopt(key) };
        assert_eq!(*adopted, "kept");

        drop(adopted);
        assert_eq!(pool.len(), 0);
        assert!(pool.allocate().is_some());
    }

    #[test]
    fn upgrade_adds_reference_while_occupied() {
        let pool = pool_of::<u32>(nz!(1));

        let first = pool.allocate().unwrap().fill(42);
        let upgraded = pool.upgrade(first.key).unwrap();

        assert!(Pooled::ptr_eq(&first, &upgraded));
        assert_eq!(*upgraded, 42);

        drop(first);
        assert_eq!(pool.len(), 1);

        drop(upgraded);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn upgrade_fails_after_release() {
        let pool = pool_of::<u32>(nz!(1));

        let released = pool.allocate().unwrap().fill(1);
        let key = released.key;
        drop(released);

        assert!(pool.upgrade(key).is_none());
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn upgrade_of_stale_key_leaves_new_occupant_alone() {
        let pool = pool_of::<u32>(nz!(1));

        let stale_key = pool.allocate().unwrap().fill(1).key;
        let current = pool.allocate().unwrap().fill(2);

        assert_eq!(current.key.index, stale_key.index);
        assert!(pool.upgrade(stale_key).is_none());

        // The failed upgrade must not have left a reference behind on the new occupant.
        drop(current);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn concurrent_upgrade_and_release_never_resurrects() {
        const ROUNDS: usize = 1_000;

        let pool = pool_of::<usize>(nz!(1));

        for round in 0..ROUNDS {
            let pooled = pool.allocate().unwrap().fill(round);
            let key = pooled.key;

            let upgraded = thread::scope(|s| {
                let upgrader = s.spawn(|| pool.upgrade(key));
                drop(pooled);
                upgrader.join().unwrap()
            });

            if let Some(upgraded) = upgraded {
                assert_eq!(*upgraded, round);
            }

            assert_eq!(pool.len(), 0);
        }
    }

    #[test]
    #[should_panic]
    fn stale_key_access_panics() {
        let pool = pool_of::<u32>(nz!(1));

        let stale_key = pool.allocate().unwrap().fill(1).key;
        let _current = pool.allocate().unwrap().fill(2);

        // Fabricate a reference from a key of a released occupant. It must never be honored.
        let stale = ManuallyDrop::new(Pooled {
            pool: Arc::clone(&pool),
            key: stale_key,
        });

        let _value = **stale;
    }

    #[test]
    fn drops_value_on_last_release() {
        struct Droppable {
            dropped: Arc<AtomicBool>,
        }

        impl Drop for Droppable {
            fn drop(&mut self) {
                self.dropped.store(true, Ordering::Relaxed);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let pool = pool_of::<Droppable>(nz!(2));

        let value = pool
            .allocate()
            .unwrap()
            .fill(Droppable {
                dropped: Arc::clone(&dropped),
            });
        let clone = value.clone();

        drop(value);
        assert!(!dropped.load(Ordering::Relaxed));

        drop(clone);
        assert!(dropped.load(Ordering::Relaxed));
    }

    #[test]
    fn panicking_drop_still_releases_slot() {
        struct PanicOnDrop;

        impl Drop for PanicOnDrop {
            fn drop(&mut self) {
                panic!("intentional panic in drop");
            }
        }

        let pool = pool_of::<PanicOnDrop>(nz!(1));
        let value = pool.allocate().unwrap().fill(PanicOnDrop);

        let result = thread::scope(|s| s.spawn(move || drop(value)).join());
        assert!(result.is_err());

        assert_eq!(pool.len(), 0);
        drop(pool.allocate().unwrap());
    }

    #[test]
    fn block_policy_waits_for_release() {
        let pool = Arc::new(
            Pool::<u32>::builder()
                .capacity(nz!(1))
                .exhaustion_policy(ExhaustionPolicy::Block)
                .build(),
        );

        let held = pool.allocate().unwrap().fill(1);

        let (tx, rx) = mpsc::channel();

        let waiter = thread::spawn({
            let pool = Arc::clone(&pool);
            move || {
                let value = pool.allocate().unwrap().fill(2);
                tx.send(*value).unwrap();
            }
        });

        // The waiter cannot make progress while we hold the only slot.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        drop(held);

        assert_eq!(rx.recv().unwrap(), 2);
        waiter.join().unwrap();
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn concurrent_allocate_and_release_never_share_slots() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 1000;

        let pool = pool_of::<usize>(nz!(8));
        let barrier = Barrier::new(THREADS);

        thread::scope(|s| {
            for thread_index in 0..THREADS {
                let pool = &pool;
                let barrier = &barrier;

                s.spawn(move || {
                    barrier.wait();

                    for round in 0..ROUNDS {
                        let a = pool.allocate().unwrap().fill(thread_index * ROUNDS + round);
                        let b = pool.allocate().unwrap().fill(round);

                        assert_ne!(a.key.index, b.key.index);
                        assert_eq!(*a, thread_index * ROUNDS + round);
                        assert_eq!(*b, round);
                    }
                });
            }
        });

        assert_eq!(pool.len(), 0);

        // Every slot is back on the vacant stack exactly once.
        let all = (0..8)
            .map(|_| pool.allocate().unwrap())
            .collect::<Vec<_>>();
        let distinct = all.iter().map(|r| r.index).collect::<HashSet<_>>();

        assert_eq!(distinct.len(), 8);
        assert!(pool.allocate().is_none());
    }

    #[test]
    #[should_panic]
    fn capacity_over_maximum_panics() {
        let capacity = NonZero::new(MAX_CAPACITY + 1).unwrap();
        drop(Pool::<u8>::builder().capacity(capacity).build());
    }

    #[test]
    fn zero_sized_values_are_pooled() {
        let pool = pool_of::<()>(nz!(2));

        let a = pool.allocate().unwrap().fill(());
        let _b = pool.allocate().unwrap().fill(());

        assert!(pool.allocate().is_none());

        drop(a);
        assert_eq!(pool.len(), 1);
    }
}
