//! Combine the blazing speed of [`UnsafeCell`]
//! with a clown-inspired twist on the safety of [`RefCell`].
//!
//! Root sets are mutated on every scope entry and exit,
//! and are only ever read while the collector enumerates them.
//! Neither access pattern should pay for borrow tracking in release builds,
//! but getting it wrong should be loud while developing.

#![no_std]
#![warn(missing_docs)]

#[cfg(test)]
extern crate std;

#[allow(unused)] use core::cell::Ref;
#[allow(unused)] use core::cell::RefCell;
#[allow(unused)] use core::cell::RefMut;
#[allow(unused)] use core::cell::UnsafeCell;
use core::ops::Deref;
use core::ops::DerefMut;

/// Behaves just like [`UnsafeCell`],
/// but with [`RefCell`]-like runtime checks
/// when debug assertions are enabled.
pub struct UnsafeRefCell<T>
{
    #[cfg(debug_assertions)]
    inner: RefCell<T>,

    #[cfg(not(debug_assertions))]
    inner: UnsafeCell<T>,
}

impl<T> UnsafeRefCell<T>
{
    /// Create a new cell containing the given value.
    pub const fn new(value: T) -> Self
    {
        Self::new_internal(value)
    }

    #[cfg(debug_assertions)]
    const fn new_internal(value: T) -> Self
    {
        Self{inner: RefCell::new(value)}
    }

    #[cfg(not(debug_assertions))]
    const fn new_internal(value: T) -> Self
    {
        Self{inner: UnsafeCell::new(value)}
    }

    /// Consume the cell, returning the contained value.
    pub fn into_inner(self) -> T
    {
        self.inner.into_inner()
    }

    /// Access the contained value through a unique borrow of the cell.
    ///
    /// No runtime check is needed: the borrow checker already
    /// guarantees that nobody else is looking.
    pub fn get_mut(&mut self) -> &mut T
    {
        self.inner.get_mut()
    }

    /// Immutably borrow the contained value.
    ///
    /// The borrow lasts until the return value is dropped.
    /// Any number of immutable borrows may coexist.
    ///
    /// # Safety
    ///
    /// There must not exist a mutable borrow of the value.
    /// In debug mode, such a condition causes a panic.
    /// In release mode, the behavior under such a condition is undefined.
    pub unsafe fn borrow(&self) -> UnsafeRef<T>
    {
        self.borrow_internal()
    }

    #[cfg(debug_assertions)]
    unsafe fn borrow_internal(&self) -> UnsafeRef<T>
    {
        UnsafeRef{inner: self.inner.borrow()}
    }

    #[cfg(not(debug_assertions))]
    unsafe fn borrow_internal(&self) -> UnsafeRef<T>
    {
        UnsafeRef{inner: &*self.inner.get()}
    }

    /// Mutably borrow the contained value.
    ///
    /// The borrow lasts until the return value is dropped.
    ///
    /// # Safety
    ///
    /// There must not exist other borrows of the value.
    /// In debug mode, such a condition causes a panic.
    /// In release mode, the behavior under such a condition is undefined.
    pub unsafe fn borrow_mut(&self) -> UnsafeRefMut<T>
    {
        self.borrow_mut_internal()
    }

    #[cfg(debug_assertions)]
    unsafe fn borrow_mut_internal(&self) -> UnsafeRefMut<T>
    {
        UnsafeRefMut{inner: self.inner.borrow_mut()}
    }

    #[cfg(not(debug_assertions))]
    unsafe fn borrow_mut_internal(&self) -> UnsafeRefMut<T>
    {
        UnsafeRefMut{inner: &mut *self.inner.get()}
    }
}

impl<T: Default> Default for UnsafeRefCell<T>
{
    fn default() -> Self
    {
        Self::new(T::default())
    }
}

/// Immutably borrowed content of [`UnsafeRefCell`].
pub struct UnsafeRef<'a, T>
{
    #[cfg(debug_assertions)]
    inner: Ref<'a, T>,

    #[cfg(not(debug_assertions))]
    inner: &'a T,
}

impl<'a, T> Deref for UnsafeRef<'a, T>
{
    type Target = T;

    fn deref(&self) -> &Self::Target
    {
        self.inner.deref()
    }
}

/// Mutably borrowed content of [`UnsafeRefCell`].
pub struct UnsafeRefMut<'a, T>
{
    #[cfg(debug_assertions)]
    inner: RefMut<'a, T>,

    #[cfg(not(debug_assertions))]
    inner: &'a mut T,
}

impl<'a, T> Deref for UnsafeRefMut<'a, T>
{
    type Target = T;

    fn deref(&self) -> &Self::Target
    {
        self.inner.deref()
    }
}

impl<'a, T> DerefMut for UnsafeRefMut<'a, T>
{
    fn deref_mut(&mut self) -> &mut Self::Target
    {
        self.inner.deref_mut()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    use std::vec::Vec;

    #[test]
    fn shared_borrows_coexist()
    {
        let cell = UnsafeRefCell::new(7);
        unsafe {
            let a = cell.borrow();
            let b = cell.borrow();
            assert_eq!(*a + *b, 14);
        }
    }

    #[test]
    fn mutation_is_visible()
    {
        let cell = UnsafeRefCell::new(Vec::new());
        unsafe {
            cell.borrow_mut().push(1);
            cell.borrow_mut().push(2);
            assert_eq!(cell.borrow().as_slice(), &[1, 2]);
        }
        assert_eq!(cell.into_inner(), [1, 2]);
    }

    #[test]
    fn get_mut_needs_no_borrow()
    {
        let mut cell = UnsafeRefCell::<u32>::default();
        *cell.get_mut() += 3;
        assert_eq!(unsafe { *cell.borrow() }, 3);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn overlapping_mutable_borrow_panics_in_debug()
    {
        let cell = UnsafeRefCell::new(0);
        unsafe {
            let _shared = cell.borrow();
            let _unique = cell.borrow_mut();
        }
    }
}
