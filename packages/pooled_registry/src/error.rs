use std::num::NonZero;

use thiserror::Error;

use crate::Identifier;

/// Errors that can occur when creating bindings in a registry.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The pool backing the registry already holds as many live instances as it was configured
    /// to hold. The registry is left unchanged and the value constructor was not called.
    #[error("pool of {type_name} is exhausted: all {capacity} slots hold live instances")]
    OutOfCapacity {
        /// Name of the value type whose pool is exhausted.
        type_name: &'static str,

        /// The configured capacity of the pool.
        capacity: NonZero<usize>,
    },

    /// The constructor of a value reported an error. No binding was installed and the slot
    /// reserved for the value was returned to the pool.
    #[error("failed to construct {type_name} for binding '{id}'")]
    Construction {
        /// Name of the value type that failed to construct.
        type_name: &'static str,

        /// The identifier the value was going to be bound under.
        id: Identifier,

        /// The error reported by the constructor.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A registry for the value type already exists in the collection, so a differently
    /// configured one cannot be installed.
    #[error("a registry of {type_name} is already registered")]
    AlreadyRegistered {
        /// Name of the value type that already has a registry.
        type_name: &'static str,
    },
}

/// A specialized `Result` type for registry operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
