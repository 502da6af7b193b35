//! Handles: values and references that go through the collector's hooks.
//!
//! # Disciplines
//!
//! Every handle has a discipline, which determines what it stores
//! and what the collector does with it.
//!
//! | Discipline | Stores    | Traced by the collector | Barriers | Can die |
//! |------------|-----------|-------------------------|----------|---------|
//! | [`Value`]  | `T`       | Through its members     | No       | No      |
//! | [`Strong`] | `*mut T`  | Yes, keeps target alive | Yes      | No      |
//! | [`Weak`]   | `*mut T`  | Yes, without liveness   | Yes      | Yes     |
//!
//! # Placement
//!
//! Independently, every handle has a placement, which determines its hooks.
//!
//! | Placement      | Aliases                            | Found by the collector through  |
//! |----------------|------------------------------------|---------------------------------|
//! | Member         | [`MemberVal`], [`MemberRef`], ...  | The object's storage descriptor |
//! | Local          | [`LocalVal`], [`LocalRef`], ...    | The shadow stack                |
//! | Persistent     | [`PersistentRef`], ...             | The persistent pool             |
//!
//! [`PersistentRef`]: `crate::roots::PersistentRef`

pub use self::handle::*;
pub use self::hooks::*;

mod handle;
mod hooks;
