//! This crate lets native types live on the garbage collected heap.
//!
//! The collector itself is not implemented here.
//! Instead, this crate describes native objects to it
//! and routes every pointer access through it:
//!
//!  - [`storage`] describes the memory layout of native types
//!    with [`StorageDescriptor`][`storage::StorageDescriptor`] records.
//!  - [`handle`] wraps values, strong references, and weak references
//!    so that reads and writes go through the collector's barriers.
//!  - [`roots`] keeps track of references held outside the heap,
//!    so that the collector can find its root set.

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(test)]
extern crate std;

#[macro_use] mod checks;

pub mod handle;
pub mod roots;
pub mod storage;

#[cfg(test)]
mod testing;
