use super::Handle;
use super::HandleHooks;
use super::Strong;
use super::Value;
use super::Weak;

use alloc::alloc::alloc;
use core::alloc::Layout;
use core::marker::PhantomData;

/// What this crate needs from the garbage collector.
///
/// All pointers are untyped here;
/// the hook bindings below cast them to and from the handle's type.
pub trait GcHooks
{
    /// Read barrier, invoked on every read of a reference handle.
    ///
    /// It may relocate or validate the pointer, rewriting the slot,
    /// and returns the pointer the reader should see.
    /// For weak handles it returns null once the target was collected.
    ///
    /// # Safety
    ///
    /// `slot` must point to the storage of a live reference handle.
    unsafe fn read(slot: *mut *mut u8) -> *mut u8;

    /// Write barrier, invoked on every assignment of a reference handle.
    ///
    /// # Safety
    ///
    /// `slot` must point to the storage of a live reference handle.
    unsafe fn write(slot: *mut *mut u8, value: *mut u8);

    /// Allocate memory on the collected heap.
    ///
    /// Returns null if the memory cannot be allocated.
    /// The memory is never explicitly freed;
    /// the collector reclaims it once it is unreachable.
    fn allocate(layout: Layout) -> *mut u8;
}

/// Hooks that read and write pointers as they are,
/// and allocate from the global allocator without ever freeing.
///
/// Storage descriptors use these for their own members,
/// as descriptors live for the rest of the process and are never relocated.
pub enum NoBarrier { }

impl GcHooks for NoBarrier
{
    #[inline]
    unsafe fn read(slot: *mut *mut u8) -> *mut u8
    {
        *slot
    }

    #[inline]
    unsafe fn write(slot: *mut *mut u8, value: *mut u8)
    {
        *slot = value;
    }

    fn allocate(layout: Layout) -> *mut u8
    {
        if layout.size() == 0 {
            // Zero-sized objects need no memory, only an aligned address.
            return layout.align() as *mut u8;
        }
        // SAFETY: The layout has a non-zero size.
        unsafe { alloc(layout) }
    }
}

/// Defines a [`HandleHooks`] binding that forwards
/// reads and writes to the collector's barriers
/// and does nothing on creation and destruction.
macro_rules! barrier_hooks
{
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        pub struct $name<G>
        {
            _gc: PhantomData<fn() -> G>,
        }

        impl<G: GcHooks> HandleHooks for $name<G>
        {
            #[inline]
            unsafe fn read<T>(slot: *mut *mut T) -> *mut T
            {
                G::read(slot.cast()).cast()
            }

            #[inline]
            unsafe fn write<T>(slot: *mut *mut T, value: *mut T)
            {
                G::write(slot.cast(), value.cast());
            }
        }
    };
}

barrier_hooks!
{
    /// Hooks for handles that are members of collected objects.
    ///
    /// Members are found by the collector through their object's
    /// [`StorageDescriptor`][`crate::storage::StorageDescriptor`],
    /// so creating or destroying them registers nothing.
    MemberHooks
}

barrier_hooks!
{
    /// Hooks for handles on the native stack.
    ///
    /// Registering locals with the shadow stack is the job of
    /// [`RootScope`][`crate::roots::RootScope`], not of the handle,
    /// so that a whole scope can be unregistered at once.
    LocalHooks
}

barrier_hooks!
{
    /// Hooks for the handle inside a
    /// [`Persistent`][`crate::roots::Persistent`].
    ///
    /// The persistent wrapper registers itself with the persistent pool.
    PersistentHooks
}

/// Handle for use as a member of a collected object.
pub type Member<T, D, G> = Handle<T, D, MemberHooks<G>>;

/// Shorthand for `Member<T, Value, G>`.
pub type MemberVal<T, G> = Member<T, Value, G>;

/// Shorthand for `Member<T, Strong, G>`.
pub type MemberRef<T, G> = Member<T, Strong, G>;

/// Shorthand for `Member<T, Weak, G>`.
pub type MemberWeak<T, G> = Member<T, Weak, G>;

/// Handle for use on the native stack, within a root scope.
///
/// Beware that a local value must not outlive its scope.
pub type Local<T, D, G> = Handle<T, D, LocalHooks<G>>;

/// Shorthand for `Local<T, Value, G>`.
pub type LocalVal<T, G> = Local<T, Value, G>;

/// Shorthand for `Local<T, Strong, G>`.
///
/// The handle does not root anything by itself.
/// [`RootScope::local_ref`][`crate::roots::RootScope::local_ref`] roots its target,
/// and [`RootScope::set_local`][`crate::roots::RootScope::set_local`] roots a new one.
pub type LocalRef<T, G> = Local<T, Strong, G>;

/// Shorthand for `Local<T, Weak, G>`.
pub type LocalWeak<T, G> = Local<T, Weak, G>;

#[cfg(test)]
mod tests
{
    use super::*;

    use crate::testing::CountingHooks;
    use crate::testing::counts;
    use crate::testing::reset_counts;
    use core::ptr;

    #[test]
    fn member_hooks_forward_to_collector()
    {
        reset_counts();
        let mut five = 5;
        let mut six = 6;
        let mut m = MemberWeak::<i32, CountingHooks>::new(&mut five);
        assert_eq!(m.get(), &mut five as *mut i32);
        m.set(&mut six);
        assert_eq!(m.get(), &mut six as *mut i32);
        assert_eq!(counts().reads, 2);
        assert_eq!(counts().writes, 1);
    }

    #[test]
    fn member_write_hook_may_store_something_else()
    {
        reset_counts();
        let mut five = 5;
        let mut m = MemberRef::<i32, CountingHooks>::null();
        CountingHooks::set_write_null(true);
        m.set(&mut five);
        CountingHooks::set_write_null(false);
        assert!(m.is_null());
    }

    #[test]
    fn local_hooks_forward_to_collector()
    {
        reset_counts();
        let mut five = 5;
        let l = LocalRef::<i32, CountingHooks>::new(&mut five);
        CountingHooks::set_read_null(true);
        assert!(l.get().is_null());
        CountingHooks::set_read_null(false);
        assert_eq!(counts().reads, 1);
    }

    #[test]
    fn no_barrier_allocates_zero_sized()
    {
        let layout = Layout::new::<()>();
        assert!(!NoBarrier::allocate(layout).is_null());
        let mut slot = ptr::null_mut();
        let mut byte = 0u8;
        unsafe {
            NoBarrier::write(&mut slot, &mut byte);
            assert_eq!(NoBarrier::read(&mut slot), &mut byte as *mut u8);
        }
    }
}
