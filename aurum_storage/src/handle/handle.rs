use core::cell::Cell;
use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ops::Deref;
use core::ops::DerefMut;
use core::ptr::NonNull;
use core::ptr;

/// How a handle refers to its target.
///
/// This is the run-time mirror of the [`Discipline`] marker types.
/// It is what a [`Slot`][`crate::storage::Slot`] records for the collector.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleType
{
    /// The target is stored in place.
    Value,

    /// The handle is an owning pointer.
    /// The collector must trace it and keep the target alive.
    StrongRef,

    /// The handle is a non-owning pointer.
    /// The collector must not count it towards liveness,
    /// and reads return null once the target has been collected.
    WeakRef,
}

impl HandleType
{
    /// Whether handles of this type store a pointer
    /// and go through the read and write barriers.
    #[inline]
    pub fn is_reference(self) -> bool
    {
        !matches!(self, Self::Value)
    }
}

mod sealed
{
    pub trait Sealed { }
    impl Sealed for super::Value { }
    impl Sealed for super::Strong { }
    impl Sealed for super::Weak { }
}

/// Marker type for handles that store their target in place.
pub enum Value { }

/// Marker type for handles that own their target.
pub enum Strong { }

/// Marker type for handles that observe their target without owning it.
pub enum Weak { }

/// The closed set of [`Value`], [`Strong`], and [`Weak`].
///
/// The discipline decides how a [`Handle`] stores its target
/// and which operations the handle offers.
pub trait Discipline<T>: sealed::Sealed
{
    /// See [`HandleType`].
    const TYPE: HandleType;

    /// What the handle stores: the target itself or a pointer to it.
    type Repr;

    /// Address under which a handle with this representation
    /// is registered as a root, if it is to be registered at all.
    #[doc(hidden)]
    fn root_identity(repr: &Self::Repr) -> Option<NonNull<u8>>;
}

impl<T> Discipline<T> for Value
{
    const TYPE: HandleType = HandleType::Value;

    type Repr = T;

    #[inline]
    fn root_identity(repr: &T) -> Option<NonNull<u8>>
    {
        Some(NonNull::from(repr).cast())
    }
}

impl<T> Discipline<T> for Strong
{
    const TYPE: HandleType = HandleType::StrongRef;

    type Repr = Cell<*mut T>;

    #[inline]
    fn root_identity(repr: &Cell<*mut T>) -> Option<NonNull<u8>>
    {
        NonNull::new(repr.get().cast())
    }
}

impl<T> Discipline<T> for Weak
{
    const TYPE: HandleType = HandleType::WeakRef;

    type Repr = Cell<*mut T>;

    #[inline]
    fn root_identity(_repr: &Cell<*mut T>) -> Option<NonNull<u8>>
    {
        None
    }
}

/// Interception points of a [`Handle`].
///
/// `created` and `destroyed` are called once per handle,
/// on construction and on drop, for every discipline.
/// They are not called on assignment, and moving a handle calls nothing.
///
/// `read` and `write` are called on every read and every assignment
/// of a [`Strong`] or [`Weak`] handle, and never for [`Value`] handles.
/// `read` may rewrite the slot and return anything;
/// `write` may store something other than the given value.
/// Neither is called when a handle is constructed.
pub trait HandleHooks
{
    /// Called when a handle is constructed.
    #[inline]
    fn created(discipline: HandleType)
    {
        let _ = discipline;
    }

    /// Called when a handle is dropped.
    #[inline]
    fn destroyed(discipline: HandleType)
    {
        let _ = discipline;
    }

    /// Read the pointer stored in a reference handle.
    ///
    /// # Safety
    ///
    /// `slot` must point to the storage of a live reference handle.
    unsafe fn read<T>(slot: *mut *mut T) -> *mut T;

    /// Store a pointer in a reference handle.
    ///
    /// # Safety
    ///
    /// `slot` must point to the storage of a live reference handle.
    unsafe fn write<T>(slot: *mut *mut T, value: *mut T);
}

/// A value, strong reference, or weak reference to a `T`.
///
/// A handle is exactly as large as what it stores:
/// a `T` for [`Value`] handles and a pointer for the others.
/// This lets handles be embedded in collected objects
/// at the offsets their [`Slot`][`crate::storage::Slot`]s declare.
///
/// You would not normally name this type directly.
/// Use the member, local, and persistent aliases instead,
/// which pick the hooks appropriate for where the handle lives.
#[repr(transparent)]
pub struct Handle<T, D, H>
    where D: Discipline<T>, H: HandleHooks
{
    _hooks: PhantomData<fn() -> H>,
    repr: D::Repr,
}

impl<T, D, H> Handle<T, D, H>
    where D: Discipline<T>, H: HandleHooks
{
    /// The discipline of this handle type.
    pub const TYPE: HandleType = D::TYPE;

    /// Create a handle from its storage representation.
    #[inline]
    pub fn from_repr(repr: D::Repr) -> Self
    {
        H::created(D::TYPE);
        Self{_hooks: PhantomData, repr}
    }

    /// Create a handle from its storage representation
    /// without calling [`HandleHooks::created`].
    ///
    /// This exists for handles in `static` items,
    /// whose initializers cannot call hooks.
    ///
    /// # Safety
    ///
    /// The hooks must not rely on seeing every handle created.
    #[inline]
    pub const unsafe fn from_repr_unhooked(repr: D::Repr) -> Self
    {
        Self{_hooks: PhantomData, repr}
    }

    /// The raw storage representation, bypassing the hooks.
    #[inline]
    pub (crate) fn repr(&self) -> &D::Repr
    {
        &self.repr
    }
}

impl<T, D, H> Drop for Handle<T, D, H>
    where D: Discipline<T>, H: HandleHooks
{
    #[inline]
    fn drop(&mut self)
    {
        H::destroyed(D::TYPE);
    }
}

/// Operations on handles that store their target in place.
///
/// None of these call the read or write hooks.
impl<T, H: HandleHooks> Handle<T, Value, H>
{
    /// Create a handle containing the given value.
    #[inline]
    pub fn new(value: T) -> Self
    {
        Self::from_repr(value)
    }

    /// Borrow the contained value.
    #[inline]
    pub fn get(&self) -> &T
    {
        &self.repr
    }

    /// Mutably borrow the contained value.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T
    {
        &mut self.repr
    }

    /// Replace the contained value.
    #[inline]
    pub fn set(&mut self, value: T)
    {
        self.repr = value;
    }

    /// Replace the contained value with a copy of that of another handle.
    #[inline]
    pub fn assign(&mut self, other: &Self)
        where T: Clone
    {
        self.repr.clone_from(&other.repr);
    }

    /// Destroy the handle, returning the contained value.
    pub fn into_inner(self) -> T
    {
        let this = ManuallyDrop::new(self);
        H::destroyed(HandleType::Value);
        // SAFETY: The handle is never used or dropped again.
        unsafe { ptr::read(&this.repr) }
    }
}

impl<T, H: HandleHooks> Deref for Handle<T, Value, H>
{
    type Target = T;

    #[inline]
    fn deref(&self) -> &T
    {
        &self.repr
    }
}

impl<T, H: HandleHooks> DerefMut for Handle<T, Value, H>
{
    #[inline]
    fn deref_mut(&mut self) -> &mut T
    {
        &mut self.repr
    }
}

impl<T: Default, H: HandleHooks> Default for Handle<T, Value, H>
{
    #[inline]
    fn default() -> Self
    {
        Self::new(T::default())
    }
}

impl<T: Clone, H: HandleHooks> Clone for Handle<T, Value, H>
{
    #[inline]
    fn clone(&self) -> Self
    {
        Self::new(self.repr.clone())
    }
}

impl<T: fmt::Debug, H: HandleHooks> fmt::Debug for Handle<T, Value, H>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_tuple("Handle").field(&self.repr).finish()
    }
}

/// Strong and weak handles share all their operations but one.
macro_rules! reference_methods
{
    ($discipline:ident) => {
        #[doc = concat!("Operations on [`", stringify!($discipline), "`] handles.")]
        impl<T, H: HandleHooks> Handle<T, $discipline, H>
        {
            /// Create a handle pointing to the given target.
            ///
            /// This does not call the write hook.
            #[inline]
            pub fn new(target: *mut T) -> Self
            {
                Self::from_repr(Cell::new(target))
            }

            /// Create a handle pointing nowhere.
            #[inline]
            pub fn null() -> Self
            {
                Self::new(ptr::null_mut())
            }

            /// Read the target through the read hook.
            #[inline]
            pub fn get(&self) -> *mut T
            {
                // SAFETY: The slot is the storage of this handle.
                unsafe { H::read(self.repr.as_ptr()) }
            }

            /// Point the handle to a new target through the write hook.
            #[inline]
            pub fn set(&mut self, target: *mut T)
            {
                // SAFETY: The slot is the storage of this handle.
                unsafe { H::write(self.repr.as_ptr(), target) }
            }

            /// Point the handle to the target of another handle.
            ///
            /// The other handle's pointer is copied as stored,
            /// so only this handle's write hook is called.
            #[inline]
            pub fn assign(&mut self, other: &Self)
            {
                self.set(other.repr.get());
            }

            /// Whether the target read through the read hook is null.
            #[inline]
            pub fn is_null(&self) -> bool
            {
                self.get().is_null()
            }

            /// Borrow the target, read through the read hook.
            ///
            /// # Safety
            ///
            /// The target must be a valid `T` for as long as
            /// the returned reference is used.
            #[inline]
            pub unsafe fn as_ref<'a>(&self) -> Option<&'a T>
            {
                self.get().as_ref()
            }

            /// The location of the stored pointer,
            /// for collectors that rewrite handles in place.
            #[inline]
            pub fn as_slot(&self) -> *mut *mut T
            {
                self.repr.as_ptr()
            }
        }

        impl<T, H: HandleHooks> Clone for Handle<T, $discipline, H>
        {
            /// The stored pointer is copied without calling the read hook.
            #[inline]
            fn clone(&self) -> Self
            {
                Self::new(self.repr.get())
            }
        }

        impl<T, H: HandleHooks> Default for Handle<T, $discipline, H>
        {
            #[inline]
            fn default() -> Self
            {
                Self::null()
            }
        }

        impl<T, H: HandleHooks> fmt::Debug for Handle<T, $discipline, H>
        {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
            {
                f.debug_tuple("Handle").field(&self.repr.get()).finish()
            }
        }
    };
}

reference_methods!(Strong);
reference_methods!(Weak);

impl<T, H: HandleHooks> Handle<T, Weak, H>
{
    /// Whether the target is still alive,
    /// that is whether reading the handle returns non-null.
    ///
    /// Only weak handles can die, so only they have this method:
    ///
    /// ```compile_fail
    /// use aurum_storage::handle::MemberRef;
    /// use aurum_storage::handle::NoBarrier;
    ///
    /// let strong = MemberRef::<u32, NoBarrier>::null();
    /// strong.is_alive();
    /// ```
    #[inline]
    pub fn is_alive(&self) -> bool
    {
        !self.get().is_null()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    use crate::testing::CountingHandleHooks;
    use crate::testing::CountingHooks;
    use crate::testing::counts;
    use crate::testing::reset_counts;
    use core::mem::size_of;
    use core::mem::swap;

    type Hooks = CountingHandleHooks;
    type Val<T> = Handle<T, Value, Hooks>;
    type Ref<T> = Handle<T, Strong, Hooks>;
    type WeakRef<T> = Handle<T, Weak, Hooks>;

    #[test]
    fn sizes_match_storage()
    {
        assert_eq!(size_of::<Val<u8>>(), size_of::<u8>());
        assert_eq!(size_of::<Val<u32>>(), size_of::<u32>());
        assert_eq!(size_of::<Val<[u16; 7]>>(), size_of::<[u16; 7]>());
        assert_eq!(size_of::<Val<(u64, u8)>>(), size_of::<(u64, u8)>());
        assert_eq!(size_of::<Ref<u8>>(), size_of::<*mut u8>());
        assert_eq!(size_of::<Ref<[u64; 4]>>(), size_of::<*mut [u64; 4]>());
        assert_eq!(size_of::<WeakRef<u32>>(), size_of::<*mut u32>());
        assert_eq!(size_of::<WeakRef<(u8, u8)>>(), size_of::<*mut (u8, u8)>());
    }

    #[test]
    fn lifecycle_hooks_run_once_per_handle()
    {
        reset_counts();
        {
            let v = Val::new(1);
            let _w = v.clone();
            let _d = Val::<u32>::default();
            let _r = Ref::<u32>::null();
            assert_eq!(counts().created, 4);
            assert_eq!(counts().destroyed, 0);
        }
        assert_eq!(counts().created, 4);
        assert_eq!(counts().destroyed, 4);
    }

    #[test]
    fn moving_calls_no_hooks()
    {
        reset_counts();
        let a = Ref::<u32>::null();
        let b = a;
        assert_eq!(counts().created, 1);
        drop(b);
        assert_eq!(counts().destroyed, 1);
    }

    #[test]
    fn barrier_counts_for_strong_handle()
    {
        reset_counts();
        let mut one = 1u32;
        let mut two = 2u32;
        let mut h = Ref::new(&mut one);
        assert_eq!(unsafe { *h.get() }, 1);
        assert_eq!(unsafe { *h.get() }, 1);
        h.set(&mut two);
        assert_eq!(counts().reads, 2);
        assert_eq!(counts().writes, 1);
    }

    #[test]
    fn value_handles_never_call_barriers()
    {
        reset_counts();
        let mut a = Val::new(1);
        let b = Val::new(2);
        assert_eq!(*a, 1);
        a.assign(&b);
        a.set(3);
        *a.get_mut() += 1;
        assert_eq!(*a.get(), 4);
        assert_eq!(counts().reads, 0);
        assert_eq!(counts().writes, 0);
    }

    #[test]
    fn assignment_writes_destination_only()
    {
        reset_counts();
        let mut one = 1u32;
        let mut two = 2u32;
        let mut a = Ref::new(&mut one);
        let b = Ref::new(&mut two);
        a.assign(&b);
        assert_eq!(counts().writes, 1);
        assert_eq!(counts().reads, 0);
        assert_eq!(a.get(), b.get());
    }

    #[test]
    fn read_hook_result_is_observed()
    {
        reset_counts();
        let mut target = 5u32;
        let h = WeakRef::new(&mut target);
        assert!(h.is_alive());
        CountingHooks::set_read_null(true);
        assert!(!h.is_alive());
        assert!(h.get().is_null());
        CountingHooks::set_read_null(false);
        assert_eq!(h.get(), &mut target as *mut u32);
    }

    #[test]
    fn liveness_reads_once()
    {
        reset_counts();
        let mut target = true;
        let alive = WeakRef::new(&mut target);
        let dead = WeakRef::<bool>::null();
        assert!(alive.is_alive());
        assert!(!dead.is_alive());
        assert_eq!(counts().reads, 2);
    }

    #[test]
    fn member_access_through_reference()
    {
        struct Pair { left: u32, right: u32 }
        let mut pair = Pair{left: 1, right: 2};
        let h = Ref::new(&mut pair);
        assert_eq!(unsafe { h.as_ref() }.map(|p| p.left + p.right), Some(3));
        unsafe { (*h.get()).left = 10 };
        assert_eq!(unsafe { (*h.get()).left }, 10);
    }

    #[test]
    fn swap_exchanges_values()
    {
        let mut a = Val::new(1);
        let mut b = Val::new(2);
        swap(&mut a, &mut b);
        assert_eq!((*a, *b), (2, 1));
    }

    #[test]
    fn into_inner_returns_value()
    {
        reset_counts();
        let v = Val::new(alloc::string::String::from("kept"));
        assert_eq!(v.into_inner(), "kept");
        assert_eq!(counts().destroyed, 1);
    }

    #[test]
    fn handle_type_constants()
    {
        assert_eq!(Val::<u8>::TYPE, HandleType::Value);
        assert_eq!(Ref::<u8>::TYPE, HandleType::StrongRef);
        assert_eq!(WeakRef::<u8>::TYPE, HandleType::WeakRef);
        assert!(!HandleType::Value.is_reference());
        assert!(HandleType::WeakRef.is_reference());
    }
}
