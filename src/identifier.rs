//! Equality-keyed request identifiers.
//!
//! An [`Identifier`] names a unit of work for deduplication: every queue,
//! executor and coalescing map in this crate keys its bookkeeping on it.
//! Callers wrap whatever value naturally names their request (a URL, a
//! record id, a tuple of query parameters); tasks that do not supply one
//! receive an auto-assigned identifier from their request handler.
//!
//! Identifiers are cheap to clone and compare by wrapped value *and*
//! concrete type, so auto-assigned identifiers live in their own namespace
//! and can never collide with user keys.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Object-safe view of a key value: equality, hashing and debug formatting
/// forwarded to the concrete type.
trait AnyKey: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_key(&self, other: &dyn AnyKey) -> bool;
    fn hash_key(&self, state: &mut dyn Hasher);
    fn fmt_key(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T> AnyKey for T
where
    T: Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_key(&self, other: &dyn AnyKey) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn hash_key(&self, mut state: &mut dyn Hasher) {
        self.hash(&mut state);
    }

    fn fmt_key(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Key type reserved for scheduler-assigned identifiers.
///
/// Private on purpose: a user key of type `u64` with the same numeric value
/// is a different type and therefore a different identifier.
#[derive(PartialEq, Eq, Hash)]
struct AutoKey(u64);

impl fmt::Debug for AutoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "auto-{}", self.0)
    }
}

/// Equality-keyed handle naming a unit of schedulable work.
///
/// Two identifiers are equal when they wrap equal values of the same
/// concrete type. Cloning shares the wrapped value.
///
/// # Example
///
/// ```
/// use twostage::Identifier;
///
/// let a = Identifier::new("user/42");
/// let b = Identifier::new("user/42");
/// let c = Identifier::new(42u32);
///
/// assert_eq!(a, b);
/// assert_ne!(a, c);
/// ```
#[derive(Clone)]
pub struct Identifier {
    key: Arc<dyn AnyKey>,
}

impl Identifier {
    /// Wraps a user-supplied key value.
    pub fn new<T>(value: T) -> Self
    where
        T: Eq + Hash + fmt::Debug + Send + Sync + 'static,
    {
        Self {
            key: Arc::new(value),
        }
    }

    /// Wraps a scheduler-assigned sequence number.
    ///
    /// Auto identifiers occupy a reserved namespace: they compare equal only
    /// to other auto identifiers with the same sequence number, never to
    /// user keys.
    pub fn auto(sequence: u64) -> Self {
        Self {
            key: Arc::new(AutoKey(sequence)),
        }
    }

    /// Returns a reference to the wrapped value if it has type `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.key.as_any().downcast_ref::<T>()
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.key.eq_key(other.key.as_ref())
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash_key(state);
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key.fmt_key(f)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
