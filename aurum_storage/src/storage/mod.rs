//! Telling the collector where the references are.
//!
//! Every collected object has a [`StorageDescriptor`],
//! which lists the [`Slot`]s of the object:
//! where its values and references are, what discipline they follow,
//! and what the descriptors of their targets are.
//! The descriptors of native types are registered lazily,
//! on first use, by implementations of [`Storage`].
//!
//! | Layout                   | Described by                              |
//! |--------------------------|-------------------------------------------|
//! | Native type              | [`define_storage`][`crate::define_storage`] |
//! | Shaped at run-time       | [`StorageDescriptor::new_in`]              |
//! | Carries own descriptor   | [`DescriptorRef::boxed`]                   |

pub use self::descriptor::*;
pub use self::newable::*;
pub use self::registry::*;

mod descriptor;
mod newable;
mod registry;
