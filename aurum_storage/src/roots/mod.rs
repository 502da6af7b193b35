//! Keeping track of references held outside the collected heap.
//!
//! Objects referred to only by native code would look unreachable
//! to the collector, so native code registers such references as roots.
//! A [`Mutator`] holds the roots of one thread in two containers:
//!
//! | Container          | Holds                      | Registered by     | Unregistered      |
//! |--------------------|----------------------------|-------------------|-------------------|
//! | [`LocalStack`]     | Roots of local handles     | [`RootScope`]     | In bulk, LIFO     |
//! | [`PersistentPool`] | Roots of persistent handles | [`Persistent`]   | One by one, counted |

pub use self::local_stack::*;
pub use self::mutator::*;
pub use self::persistent::*;
pub use self::persistent_pool::*;
pub use self::scope::*;

// The order of these declarations influences
// the order of the Mutator impls in rustdoc.
mod mutator;
mod scope;
mod persistent;

mod local_stack;
mod persistent_pool;
