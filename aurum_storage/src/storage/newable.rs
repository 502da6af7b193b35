use crate::handle::GcHooks;

use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
use core::ptr::NonNull;

/// Types whose objects are allocated on the collected heap.
///
/// Only fixed-size types can implement this.
/// Objects that end in an array are allocated by their own code,
/// which knows how large the array is going to be.
pub trait Newable: Sized
{
    /// The collector whose heap objects of this type live on.
    type Hooks: GcHooks;

    /// Move a value to the collected heap.
    ///
    /// The memory comes from [`GcHooks::allocate`].
    /// The value is never dropped;
    /// the collector reclaims the memory once it is unreachable.
    fn gc_new(value: Self) -> NonNull<Self>
    {
        let layout = Layout::new::<Self>();
        let memory = Self::Hooks::allocate(layout).cast::<Self>();
        let object = match NonNull::new(memory) {
            Some(object) => object,
            None => handle_alloc_error(layout),
        };
        // SAFETY: The memory was allocated with the layout of Self.
        unsafe { object.as_ptr().write(value); }
        object
    }

    /// Does nothing, as the collector frees objects.
    ///
    /// # Safety
    ///
    /// The object must not be used afterwards.
    #[inline]
    unsafe fn gc_delete(object: NonNull<Self>)
    {
        let _ = object;
    }
}
