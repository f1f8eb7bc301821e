use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use scc::Equivalent;

/// Names a binding in a [`Registry`][crate::Registry].
///
/// An identifier is either supplied by the caller (created from a string) or generated by the
/// registry for unnamed creation. The two live in separate namespaces: a generated identifier
/// never compares equal to any caller-supplied identifier, even one whose text matches the
/// generated identifier's [`Display`] output.
///
/// Cloning an identifier is cheap - the string storage is shared.
///
/// # Example
///
/// ```
/// use pooled_registry::{Identifier, Registry};
///
/// let registry = Registry::<u32>::new();
///
/// let named = registry.create("answer", 42).unwrap();
/// assert_eq!(named.id(), &Identifier::from("answer"));
/// assert_eq!(named.id().as_str(), Some("answer"));
///
/// let unnamed = registry.create_unnamed(7).unwrap();
/// assert!(unnamed.id().is_generated());
/// assert_ne!(unnamed.id(), &Identifier::from(unnamed.id().to_string()));
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identifier(Repr);

#[derive(Clone, Debug, Eq, PartialEq)]
enum Repr {
    Named(Arc<str>),
    Generated(u64),
}

impl Identifier {
    /// Creates an identifier from a caller-supplied name.
    #[must_use]
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self(Repr::Named(name.into()))
    }

    /// The caller-supplied name, or `None` if this identifier was generated by a registry.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.0 {
            Repr::Named(name) => Some(&**name),
            Repr::Generated(_) => None,
        }
    }

    /// Whether this identifier was generated by a registry for an unnamed binding.
    #[must_use]
    pub fn is_generated(&self) -> bool {
        matches!(self.0, Repr::Generated(_))
    }
}

// A named identifier hashes exactly like its name, so maps keyed by identifiers can be
// searched with a plain `str`.
impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Repr::Named(name) => name.hash(state),
            Repr::Generated(sequence) => sequence.hash(state),
        }
    }
}

impl Equivalent<Identifier> for str {
    fn equivalent(&self, key: &Identifier) -> bool {
        key.as_str() == Some(self)
    }
}

impl Equivalent<Identifier> for String {
    fn equivalent(&self, key: &Identifier) -> bool {
        key.as_str() == Some(self.as_str())
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Named(name) => f.write_str(name),
            Repr::Generated(sequence) => write!(f, "<unnamed-{sequence}>"),
        }
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self::named(value)
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self::named(value)
    }
}

impl From<Arc<str>> for Identifier {
    fn from(value: Arc<str>) -> Self {
        Self::named(value)
    }
}

impl From<&Self> for Identifier {
    fn from(value: &Self) -> Self {
        value.clone()
    }
}

/// Hands out identifiers for unnamed bindings. Each registry owns one, so sequences are
/// scoped to a value type.
#[derive(Debug, Default)]
pub(crate) struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns an identifier that no previous or concurrent call on this generator returned.
    #[must_use]
    pub(crate) fn next(&self) -> Identifier {
        // Only uniqueness matters here, there is no data published through the counter.
        let sequence = self.next.fetch_add(1, Ordering::Relaxed);

        Identifier(Repr::Generated(sequence))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::HashSet;
    use std::hash::BuildHasher;
    use std::sync::Arc;
    use std::thread;

    use foldhash::fast::FixedState;
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Identifier: Send, Sync, Clone);

    #[test]
    fn named_from_any_string_form_is_equal() {
        let from_str = Identifier::from("x");
        let from_string = Identifier::from("x".to_string());
        let from_arc = Identifier::from(Arc::<str>::from("x"));

        assert_eq!(from_str, from_string);
        assert_eq!(from_str, from_arc);
        assert_eq!(from_str.as_str(), Some("x"));
        assert!(!from_str.is_generated());
    }

    #[test]
    fn generated_never_equals_named() {
        let generator = IdGenerator::new();
        let generated = generator.next();

        assert!(generated.is_generated());
        assert_eq!(generated.as_str(), None);
        assert_eq!(generated.to_string(), "<unnamed-0>");
        assert_ne!(generated, Identifier::from(generated.to_string()));
    }

    #[test]
    fn named_hashes_like_its_name() {
        let state = FixedState::with_seed(7);

        assert_eq!(
            state.hash_one(Identifier::from("answer")),
            state.hash_one("answer")
        );
        assert_eq!(
            state.hash_one(Identifier::from("answer")),
            state.hash_one("answer".to_string())
        );
    }

    #[test]
    fn borrowed_names_are_equivalent_only_to_named() {
        let named = Identifier::from("answer");
        let generated = IdGenerator::new().next();

        assert!("answer".equivalent(&named));
        assert!("answer".to_string().equivalent(&named));
        assert!(!"other".equivalent(&named));
        assert!(!generated.to_string().as_str().equivalent(&generated));
    }

    #[test]
    fn generated_sequence_is_monotonic() {
        let generator = IdGenerator::new();

        assert_eq!(generator.next().to_string(), "<unnamed-0>");
        assert_eq!(generator.next().to_string(), "<unnamed-1>");
        assert_eq!(generator.next().to_string(), "<unnamed-2>");
    }

    #[test]
    fn concurrent_generation_is_unique() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 1000;

        let generator = Arc::new(IdGenerator::new());

        let workers = (0..THREADS)
            .map(|_| {
                let generator = Arc::clone(&generator);
                thread::spawn(move || {
                    (0..PER_THREAD)
                        .map(|_| generator.next())
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();

        let mut seen = HashSet::new();

        for worker in workers {
            for id in worker.join().unwrap() {
                assert!(seen.insert(id), "generated identifier was handed out twice");
            }
        }

        assert_eq!(seen.len(), THREADS * PER_THREAD);
    }
}
