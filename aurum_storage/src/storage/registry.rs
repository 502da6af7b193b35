use super::DescriptorRef;
use super::Slot;
use super::StorageDescriptor;
use crate::handle::Discipline;
use crate::handle::GcHooks;
use crate::handle::Handle;
use crate::handle::HandleHooks;
use crate::handle::NoBarrier;

use alloc::alloc::handle_alloc_error;
use core::mem::MaybeUninit;
use core::ptr::NonNull;
use core::ptr;
use core::sync::atomic::AtomicPtr;
use core::sync::atomic::AtomicU8;
use core::sync::atomic::Ordering;
use scopeguard::ScopeGuard;
use scopeguard::guard;

/// Types whose layout is known to the collector.
///
/// Implement this with [`define_storage`][`crate::define_storage`].
///
/// # Safety
///
/// The returned descriptor must describe the layout of the type,
/// and must be the same descriptor on every call.
pub unsafe trait Storage
{
    /// The descriptor of this type.
    ///
    /// If this is called while the descriptor is being registered,
    /// that is, from the registration of a type that refers back to this one,
    /// the descriptor may not be fully initialized yet.
    /// It is initialized by the time the outermost registration returns.
    fn storage_descriptor() -> DescriptorRef;
}

/// Shorthand for [`Storage::storage_descriptor`].
pub fn storage_descriptor<T>() -> DescriptorRef
    where T: Storage + ?Sized
{
    T::storage_descriptor()
}

/// Stand-in target type for boxed slots.
///
/// A member handle with this target type
/// refers to memory that starts with its own descriptor.
pub enum Boxed { }

unsafe impl Storage for Boxed
{
    fn storage_descriptor() -> DescriptorRef
    {
        DescriptorRef::boxed()
    }
}

const UNREGISTERED: u8 = 0;
const REGISTERING:  u8 = 1;
const REGISTERED:   u8 = 2;
const POISONED:     u8 = 3;

/// Lazily registered descriptor of one type.
///
/// Registration first reserves the memory of the descriptor
/// and publishes its address, then writes its header,
/// and only then builds the slots and initializes the rest.
/// Building a slot of a type that refers back to this one
/// therefore finds the address and stops recursing.
///
/// If registration panics, the cell is poisoned and every later use fails.
/// Resetting it instead would strand the slots of types that were
/// registered in the meantime, which refer to the published address.
///
/// Registration is not synchronized across threads:
/// the first use of each type must not race with itself.
pub struct DescriptorCell
{
    pointer: AtomicPtr<StorageDescriptor>,
    state: AtomicU8,
}

impl DescriptorCell
{
    /// Create a cell with no descriptor yet.
    pub const fn new() -> Self
    {
        Self{
            pointer: AtomicPtr::new(ptr::null_mut()),
            state: AtomicU8::new(UNREGISTERED),
        }
    }

    /// Return the descriptor, registering it on first use.
    ///
    /// `build` returns the array slot and the `slot_count` other slots.
    /// It is called at most once.
    ///
    /// # Panics
    ///
    /// If `build` returns a different number of slots than `slot_count`,
    /// if another thread is registering the same descriptor,
    /// or if an earlier registration panicked.
    pub fn get_or_init<F, S>(
        &self,
        size_with_empty_array: usize,
        has_array: bool,
        slot_count: usize,
        build: F,
    ) -> DescriptorRef
        where F: FnOnce() -> (Slot, S), S: IntoIterator<Item=Slot>, S::IntoIter: ExactSizeIterator
    {
        match NonNull::new(self.pointer.load(Ordering::Acquire)) {
            Some(pointer) => {
                check!(
                    self.state.load(Ordering::Acquire) != POISONED,
                    "descriptor registration panicked earlier"
                );
                // SAFETY: Published pointers have at least their header written.
                unsafe { DescriptorRef::from_raw(pointer) }
            },
            None => self.register(size_with_empty_array, has_array, slot_count, build),
        }
    }

    #[cold]
    fn register<F, S>(
        &self,
        size_with_empty_array: usize,
        has_array: bool,
        slot_count: usize,
        build: F,
    ) -> DescriptorRef
        where F: FnOnce() -> (Slot, S), S: IntoIterator<Item=Slot>, S::IntoIter: ExactSizeIterator
    {
        let claimed = self.state.compare_exchange(
            UNREGISTERED,
            REGISTERING,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        check!(claimed != Err(POISONED), "descriptor registration panicked earlier");
        check!(claimed.is_ok(), "descriptor is being registered by another thread");

        // Holds the descriptor once its header is published.
        let mut poison = guard(None, |header: Option<NonNull<StorageDescriptor>>| {
            gc_error!("descriptor registration panicked");
            if let Some(header) = header {
                // SAFETY: The header was written before it was stored here.
                unsafe { StorageDescriptor::init_poisoned(header); }
            }
            self.state.store(POISONED, Ordering::Release);
        });

        gc_debug!(size_with_empty_array, has_array, slot_count, "registering descriptor");

        let layout = match StorageDescriptor::layout(slot_count) {
            Ok(layout) => layout,
            Err(err) => panic!("descriptor with {} slots: {:?}", slot_count, err),
        };

        // Registered descriptors are never freed.
        let memory = match NonNull::new(NoBarrier::allocate(layout)) {
            Some(memory) => memory,
            None => handle_alloc_error(layout),
        };

        // SAFETY: The memory was allocated with the layout of a descriptor.
        let header = unsafe {
            StorageDescriptor::init_header(memory, size_with_empty_array, has_array)
        };
        self.pointer.store(header.as_ptr(), Ordering::Release);
        *poison = Some(header);

        let (array, slots) = build();
        let slots = slots.into_iter();
        check!(
            slots.len() == slot_count,
            "declared {} slots but built {}", slot_count, slots.len()
        );

        // SAFETY: The memory was allocated for exactly this many slots.
        let descriptor = unsafe {
            StorageDescriptor::init(memory, size_with_empty_array, has_array, array, slots)
        };

        ScopeGuard::into_inner(poison);
        self.state.store(REGISTERED, Ordering::Release);

        gc_debug!(descriptor = ?descriptor.as_ptr(), "registered descriptor");

        descriptor
    }

    /// Whether the descriptor is fully registered.
    pub fn is_registered(&self) -> bool
    {
        self.state.load(Ordering::Acquire) == REGISTERED
    }

    /// Whether an earlier registration panicked.
    pub fn is_poisoned(&self) -> bool
    {
        self.state.load(Ordering::Acquire) == POISONED
    }
}

impl Default for DescriptorCell
{
    fn default() -> Self
    {
        Self::new()
    }
}

/// Byte offset of the place `project` computes from the start of an `O`.
///
/// # Safety
///
/// `project` must compute the address of a field of the pointee
/// without reading from it.
unsafe fn offset_of_projection<O, F, M>(project: F) -> usize
    where F: FnOnce(*const O) -> *const M
{
    let object = MaybeUninit::<O>::uninit();
    let base = object.as_ptr();
    let field = project(base);
    field as usize - base as usize
}

/// Build the slot of a member handle of an object of type `O`.
///
/// The target descriptor comes from the handle's target type,
/// and the discipline from its discipline.
/// The offset is found by applying `member` to
/// the address of an uninitialized `O`.
///
/// # Safety
///
/// `member` must compute the address of a field of the pointee
/// without reading from it, as with [`ptr::addr_of`].
pub unsafe fn member_slot<O, T, D, H, F>(member: F) -> Slot
    where T: Storage, D: Discipline<T>, H: HandleHooks, F: FnOnce(*const O) -> *const Handle<T, D, H>
{
    let offset = offset_of_projection(member);
    Slot::new(Some(T::storage_descriptor()), D::TYPE, offset)
}

/// Like [`member_slot`], but for the trailing array of an object.
///
/// # Safety
///
/// Same as for [`member_slot`].
pub unsafe fn array_slot<O, T, D, H, F>(array: F) -> Slot
    where T: Storage, D: Discipline<T>, H: HandleHooks, F: FnOnce(*const O) -> *const [Handle<T, D, H>; 0]
{
    let offset = offset_of_projection(array);
    Slot::new(Some(T::storage_descriptor()), D::TYPE, offset)
}

/// Implement [`Storage`][`crate::storage::Storage`] for a type.
///
/// List the fields that are member handles;
/// any other fields are invisible to the collector.
/// A type whose objects end in an array names the array field in brackets.
/// Such types must be `#[repr(C)]`,
/// with the array last and a `usize` length right before it.
///
/// ```
/// use aurum_storage::define_storage;
/// use aurum_storage::handle::{MemberRef, MemberVal, NoBarrier};
///
/// struct Node
/// {
///     value: MemberVal<u64, NoBarrier>,
///     next: MemberRef<Node, NoBarrier>,
/// }
///
/// #[repr(C)]
/// struct Nodes
/// {
///     len: usize,
///     items: [MemberRef<Node, NoBarrier>; 0],
/// }
///
/// define_storage!(Node { value, next });
/// define_storage!(Nodes [items]);
/// ```
///
/// Generic types are not supported,
/// as each type needs a descriptor of its own.
#[macro_export]
macro_rules! define_storage
{
    (@array $type:ty) => {
        $crate::storage::Slot::empty()
    };

    (@array $type:ty, $array:ident) => {
        $crate::storage::array_slot(
            |this: *const $type| ::core::ptr::addr_of!((*this).$array)
        )
    };

    (@define $type:ty, $has_array:expr, [$($array:ident)?], { $($member:ident),* }) => {
        unsafe impl $crate::storage::Storage for $type
        {
            fn storage_descriptor() -> $crate::storage::DescriptorRef
            {
                const SLOT_COUNT: usize = <[&str]>::len(&[$(stringify!($member)),*]);

                static CELL: $crate::storage::DescriptorCell =
                    $crate::storage::DescriptorCell::new();

                CELL.get_or_init(
                    ::core::mem::size_of::<$type>(),
                    $has_array,
                    SLOT_COUNT,
                    || {
                        // SAFETY: The projections only compute addresses.
                        unsafe {
                            let array = $crate::define_storage!(@array $type $(, $array)?);
                            let slots: [$crate::storage::Slot; SLOT_COUNT] = [$(
                                $crate::storage::member_slot(
                                    |this: *const $type| ::core::ptr::addr_of!((*this).$member)
                                ),
                            )*];
                            (array, slots)
                        }
                    },
                )
            }
        }
    };

    ($type:ty $({ $($member:ident),* $(,)? })?) => {
        $crate::define_storage!(@define $type, false, [], { $($($member),*)? });
    };

    ($type:ty [$array:ident] $({ $($member:ident),* $(,)? })?) => {
        $crate::define_storage!(@define $type, true, [$array], { $($($member),*)? });
    };
}

crate::define_storage!(());
crate::define_storage!(bool);
crate::define_storage!(char);
crate::define_storage!(u8);
crate::define_storage!(u16);
crate::define_storage!(u32);
crate::define_storage!(u64);
crate::define_storage!(u128);
crate::define_storage!(usize);
crate::define_storage!(i8);
crate::define_storage!(i16);
crate::define_storage!(i32);
crate::define_storage!(i64);
crate::define_storage!(i128);
crate::define_storage!(isize);
crate::define_storage!(f32);
crate::define_storage!(f64);
