use std::any::type_name;
use std::error::Error as StdError;
use std::sync::Arc;

use tracing::debug;

use crate::pool::{Pool, Pooled};
use crate::{Error, Identifier, Result};

/// The occupant of one pool slot: a constructed value and the identifier it was bound under.
///
/// An entry is constructed directly into the slot reserved for it and never moves afterwards.
/// Map bindings and handles hold counted references to it; when the last one goes away the
/// value is dropped and the slot returns to the pool.
#[derive(Debug)]
pub(crate) struct Entry<T> {
    id: Identifier,
    value: T,
}

impl<T> Entry<T> {
    /// Reserves a slot in `pool`, runs `construct` and moves the result into the slot.
    ///
    /// Capacity is checked before `construct` is called, so a full pool never runs the
    /// constructor. If `construct` fails, the reserved slot is returned to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfCapacity`] if the pool has no vacant slot and fails fast, or
    /// [`Error::Construction`] if `construct` returns an error.
    pub(crate) fn materialize<F, E>(
        pool: &Arc<Pool<Self>>,
        id: Identifier,
        construct: F,
    ) -> Result<Pooled<Self>>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let Some(reservation) = pool.allocate() else {
            debug!(
                type_name = type_name::<T>(),
                capacity = pool.capacity().get(),
                %id,
                "pool exhausted"
            );

            return Err(Error::OutOfCapacity {
                type_name: type_name::<T>(),
                capacity: pool.capacity(),
            });
        };

        match construct() {
            Ok(value) => Ok(reservation.fill(Self { id, value })),
            Err(source) => {
                // Hand the slot back before reporting, the binding is never installed.
                drop(reservation);

                Err(Error::Construction {
                    type_name: type_name::<T>(),
                    id,
                    source: source.into(),
                })
            }
        }
    }

    pub(crate) fn id(&self) -> &Identifier {
        &self.id
    }

    pub(crate) fn value(&self) -> &T {
        &self.value
    }
}
