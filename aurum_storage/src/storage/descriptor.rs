use crate::handle::HandleType;
use crate::handle::MemberRef;
use crate::handle::MemberVal;
use crate::handle::GcHooks;
use crate::handle::NoBarrier;

use alloc::alloc::handle_alloc_error;
use bitflags::bitflags;
use core::alloc::Layout;
use core::cell::Cell;
use core::mem::align_of;
use core::mem::size_of;
use core::ptr::NonNull;
use core::ptr::addr_of;
use core::ptr::addr_of_mut;
use core::ptr;
use core::slice;

/// Raised when a descriptor with the requested number of slots
/// would not fit in the address space.
#[derive(Debug)]
pub struct DescriptorSizeError;

/// Describes one value or reference in an object:
/// the type of its target, its discipline, and its location in the object.
///
/// Once created, slots are not mutated.
#[repr(C)]
#[derive(Clone, Debug)]
pub struct Slot
{
    /// Descriptor of the target type.
    ///
    /// If this is the [`boxed`][`DescriptorRef::boxed`] descriptor,
    /// the slot points to a piece of memory whose first machine word
    /// is the descriptor of the value that follows it.
    /// This is how type-erased values are stored.
    /// Null is read as boxed as well.
    descriptor: MemberRef<StorageDescriptor, NoBarrier>,

    /// Boxed slots are never [`HandleType::Value`],
    /// and value slots never describe variable-size objects.
    discipline: HandleType,

    /// Location of the slot, in bytes from the start of the object.
    offset: usize,
}

impl Slot
{
    /// Create a slot.
    ///
    /// If no descriptor is given, the slot is boxed.
    ///
    /// # Panics
    ///
    /// If the slot would be boxed and by value,
    /// or by value and of a variable-size type.
    pub fn new(
        descriptor: Option<DescriptorRef>,
        discipline: HandleType,
        offset: usize,
    ) -> Self
    {
        let descriptor = descriptor.unwrap_or_else(DescriptorRef::boxed);

        check!(
            !(descriptor.is_boxed() && discipline == HandleType::Value),
            "boxed slots cannot be stored by value"
        );

        // The header of a descriptor is written before anything else,
        // so this is fine even if the descriptor is still being built.
        check!(
            discipline != HandleType::Value || !descriptor.has_array(),
            "variable-size objects cannot be stored by value"
        );

        Self{
            descriptor: MemberRef::new(descriptor.as_ptr()),
            discipline,
            offset,
        }
    }

    /// The slot that describes the absence of an array.
    ///
    /// It is a boxed strong reference at offset zero.
    pub fn empty() -> Self
    {
        Self::new(None, HandleType::StrongRef, 0)
    }

    /// Descriptor of the target type.
    ///
    /// The descriptor may still be under construction
    /// if this is called while its type is being registered.
    #[inline]
    pub fn descriptor(&self) -> DescriptorRef
    {
        match NonNull::new(self.descriptor.get()) {
            Some(pointer) => DescriptorRef{pointer},
            None => DescriptorRef::boxed(),
        }
    }

    /// See [`HandleType`].
    #[inline]
    pub fn discipline(&self) -> HandleType
    {
        self.discipline
    }

    /// Location of the slot, in bytes from the start of the object.
    #[inline]
    pub fn offset(&self) -> usize
    {
        self.offset
    }

    /// Whether the slot is boxed.
    #[inline]
    pub fn is_boxed(&self) -> bool
    {
        self.descriptor().is_boxed()
    }
}

bitflags!
{
    /// Properties of a storage descriptor.
    pub (crate) struct Flags: u8
    {
        /// The described objects end in a variable-length array.
        const HAS_ARRAY = 1 << 0;

        /// All fields of the descriptor have been written.
        ///
        /// Only the size and the other flags may be read before this is set.
        const INITIALIZED = 1 << 1;

        /// Registration of the descriptor panicked.
        ///
        /// The descriptor is never initialized,
        /// and describes no slots so that walking it reads no garbage.
        const POISONED = 1 << 2;
    }
}

/// Describes the memory layout of a collected object type,
/// so that the collector can find the references in such objects.
///
/// An object is a fixed-size part, optionally followed by an array.
/// Arrays are always preceded by a machine word holding their length.
/// The fixed-size part is described by a list of slots,
/// and the elements of the array are described by a single slot.
///
/// Descriptors are themselves collected objects of variable size,
/// and so have a descriptor of their own:
/// a descriptor ends in an array of slots.
/// The one exception is the [`boxed`][`DescriptorRef::boxed`] descriptor,
/// which describes memory that carries its own descriptor.
///
/// Descriptors are immutable and are not copied;
/// pass them around as [`DescriptorRef`].
#[repr(C)]
pub struct StorageDescriptor
{
    /// Size of the object with an empty array,
    /// including the array length word if there is an array.
    size_with_empty_array: usize,

    flags: Flags,

    /// Ignored if the descriptor has no array.
    array: MemberVal<Slot, NoBarrier>,

    /// Length of the array that follows.
    slot_count: usize,

    /// Actually `slot_count` slots long.
    slots: [MemberVal<Slot, NoBarrier>; 0],
}

// SAFETY: Descriptors are immutable once initialized,
//         and the only one that is shared between threads is `BOXED`.
unsafe impl Sync for StorageDescriptor { }

/// See [`DescriptorRef::boxed`].
static BOXED: StorageDescriptor = StorageDescriptor{
    size_with_empty_array: 0,
    flags: Flags::INITIALIZED,
    // SAFETY: Descriptor members use hooks that ignore creation.
    array: unsafe {
        MemberVal::<Slot, NoBarrier>::from_repr_unhooked(Slot{
            descriptor: MemberRef::<StorageDescriptor, NoBarrier>
                ::from_repr_unhooked(Cell::new(ptr::null_mut())),
            discipline: HandleType::StrongRef,
            offset: 0,
        })
    },
    slot_count: 0,
    slots: [],
};

impl StorageDescriptor
{
    /// Size of a descriptor with the given number of slots.
    ///
    /// This is not the size of the objects it describes.
    /// Memory passed to [`init`][`Self::init`] must be exactly this large.
    ///
    /// # Panics
    ///
    /// If the size overflows [`usize`].
    pub const fn object_size(slot_count: usize) -> usize
    {
        size_of::<Self>() + slot_count * size_of::<Slot>()
    }

    /// Like [`object_size`][`Self::object_size`],
    /// but fails instead of overflowing.
    pub fn checked_object_size(slot_count: usize)
        -> Result<usize, DescriptorSizeError>
    {
        const ERR: DescriptorSizeError = DescriptorSizeError;
        let slots_size = slot_count.checked_mul(size_of::<Slot>()).ok_or(ERR)?;
        size_of::<Self>().checked_add(slots_size).ok_or(ERR)
    }

    /// Memory layout of a descriptor with the given number of slots.
    pub fn layout(slot_count: usize) -> Result<Layout, DescriptorSizeError>
    {
        let size = Self::checked_object_size(slot_count)?;
        Layout::from_size_align(size, align_of::<Self>())
            .map_err(|_| DescriptorSizeError)
    }

    /// Initialize a descriptor in the given memory.
    ///
    /// Descriptors are of variable size,
    /// so they cannot be constructed the usual way.
    /// Instead, allocate [`object_size`][`Self::object_size`] bytes
    /// for the number of slots and pass them here.
    ///
    /// If `has_array` is false, `array` is ignored;
    /// [`Slot::empty`] is the conventional value for it.
    ///
    /// # Panics
    ///
    /// If `size_with_empty_array` is zero while `has_array` is false
    /// and there are slots, or if `slots` misreports its length.
    ///
    /// # Safety
    ///
    /// The memory must be valid for writes of `object_size(slots.len())`
    /// bytes and aligned for [`StorageDescriptor`].
    /// It must stay valid for as long as the returned descriptor is used.
    pub unsafe fn init<I>(
        memory: NonNull<u8>,
        size_with_empty_array: usize,
        has_array: bool,
        array: Slot,
        slots: I,
    ) -> DescriptorRef
        where I: IntoIterator<Item=Slot>, I::IntoIter: ExactSizeIterator
    {
        let slots = slots.into_iter();
        let slot_count = slots.len();

        check!(
            size_with_empty_array != 0 || has_array || slot_count == 0,
            "a descriptor with slots describes a non-empty object"
        );

        let this = Self::init_header(memory, size_with_empty_array, has_array);
        let this = this.as_ptr();

        addr_of_mut!((*this).array).write(MemberVal::new(array));

        let first = addr_of_mut!((*this).slots) as *mut MemberVal<Slot, NoBarrier>;
        let mut written = 0;
        for slot in slots {
            check!(written < slot_count, "slot iterator is longer than it said");
            first.add(written).write(MemberVal::new(slot));
            written += 1;
        }
        check!(written == slot_count, "slot iterator is shorter than it said");

        addr_of_mut!((*this).slot_count).write(slot_count);

        let flags = addr_of!((*this).flags).read();
        addr_of_mut!((*this).flags).write(flags | Flags::INITIALIZED);

        DescriptorRef{pointer: NonNull::new_unchecked(this)}
    }

    /// Write only the size and the flags of a descriptor.
    ///
    /// This is enough for slots to be created that refer to the descriptor.
    ///
    /// # Safety
    ///
    /// Same as for [`init`][`Self::init`].
    pub (crate) unsafe fn init_header(
        memory: NonNull<u8>,
        size_with_empty_array: usize,
        has_array: bool,
    ) -> NonNull<StorageDescriptor>
    {
        debug_check!(
            memory.as_ptr() as usize % align_of::<Self>() == 0,
            "descriptor memory is misaligned"
        );

        let this = memory.cast::<Self>().as_ptr();
        let mut flags = Flags::empty();
        flags.set(Flags::HAS_ARRAY, has_array);
        addr_of_mut!((*this).size_with_empty_array).write(size_with_empty_array);
        addr_of_mut!((*this).flags).write(flags);
        NonNull::new_unchecked(this)
    }

    /// Mark a descriptor whose registration panicked.
    ///
    /// The slot count is zeroed and the array slot emptied,
    /// but the descriptor is not marked as initialized.
    ///
    /// # Safety
    ///
    /// The header must have been written with [`init_header`][`Self::init_header`].
    pub (crate) unsafe fn init_poisoned(this: NonNull<StorageDescriptor>)
    {
        let this = this.as_ptr();
        addr_of_mut!((*this).array).write(MemberVal::new(Slot::empty()));
        addr_of_mut!((*this).slot_count).write(0);
        let flags = addr_of!((*this).flags).read();
        addr_of_mut!((*this).flags).write((flags - Flags::INITIALIZED) | Flags::POISONED);
    }

    /// Allocate a descriptor on the collected heap and initialize it.
    ///
    /// This is for objects whose shape is only known at run-time,
    /// as opposed to native types, whose descriptors are registered
    /// with [`define_storage`][`crate::define_storage`].
    ///
    /// # Panics
    ///
    /// Under the same conditions as [`init`][`Self::init`].
    ///
    /// # Safety
    ///
    /// The collector must not reclaim the descriptor
    /// while the returned reference is in use.
    pub unsafe fn new_in<G, I>(
        size_with_empty_array: usize,
        has_array: bool,
        array: Slot,
        slots: I,
    ) -> Result<DescriptorRef, DescriptorSizeError>
        where G: GcHooks, I: IntoIterator<Item=Slot>, I::IntoIter: ExactSizeIterator
    {
        let slots = slots.into_iter();
        let layout = Self::layout(slots.len())?;

        let memory = G::allocate(layout);
        let memory = match NonNull::new(memory) {
            Some(memory) => memory,
            None => handle_alloc_error(layout),
        };

        Ok(Self::init(memory, size_with_empty_array, has_array, array, slots))
    }
}

/// Pointer to a [`StorageDescriptor`].
///
/// Descriptors of native types live for the rest of the process,
/// which is why the accessors hand out `'static` borrows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorRef
{
    pointer: NonNull<StorageDescriptor>,
}

impl DescriptorRef
{
    /// The sentinel descriptor of boxed slots.
    ///
    /// It describes memory whose first machine word
    /// points to the descriptor of the rest of that memory,
    /// so the real descriptor is only known at run-time.
    #[inline]
    pub fn boxed() -> Self
    {
        Self{pointer: NonNull::from(&BOXED)}
    }

    /// Create a reference from a pointer.
    ///
    /// # Safety
    ///
    /// The pointer must point to a descriptor
    /// whose header at least has been initialized,
    /// and that stays valid for as long as the reference is used.
    #[inline]
    pub unsafe fn from_raw(pointer: NonNull<StorageDescriptor>) -> Self
    {
        Self{pointer}
    }

    /// Access the reference as a pointer.
    #[inline]
    pub fn as_ptr(self) -> *mut StorageDescriptor
    {
        self.pointer.as_ptr()
    }

    #[inline]
    fn flags(self) -> Flags
    {
        // SAFETY: The header is always initialized.
        unsafe { addr_of!((*self.as_ptr()).flags).read() }
    }

    /// Whether this is the [`boxed`][`Self::boxed`] descriptor.
    #[inline]
    pub fn is_boxed(self) -> bool
    {
        self == Self::boxed()
    }

    /// Whether the described objects end in an array.
    #[inline]
    pub fn has_array(self) -> bool
    {
        self.flags().contains(Flags::HAS_ARRAY)
    }

    /// Whether all of the descriptor has been written.
    ///
    /// This is only ever false for a descriptor
    /// whose registration is still in progress.
    #[inline]
    pub fn is_initialized(self) -> bool
    {
        self.flags().contains(Flags::INITIALIZED)
    }

    /// Whether registration of the descriptor panicked.
    ///
    /// A poisoned descriptor is never initialized.
    /// Slots built before the panic may still refer to it.
    ///
    /// The flags are only exposed through methods like this one:
    ///
    /// ```compile_fail
    /// use aurum_storage::storage::Flags;
    /// ```
    #[inline]
    pub fn is_poisoned(self) -> bool
    {
        self.flags().contains(Flags::POISONED)
    }

    /// Size of the described objects when their array is empty.
    #[inline]
    pub fn size_with_empty_array(self) -> usize
    {
        // SAFETY: The header is always initialized.
        unsafe { addr_of!((*self.as_ptr()).size_with_empty_array).read() }
    }

    /// Number of slots in the fixed-size part of the described objects.
    #[inline]
    pub fn slot_count(self) -> usize
    {
        debug_check!(self.is_initialized(), "descriptor is still being built");
        // SAFETY: The descriptor has been initialized.
        unsafe { addr_of!((*self.as_ptr()).slot_count).read() }
    }

    /// The array slot, only meaningful if [`has_array`][`Self::has_array`].
    #[inline]
    pub fn array(self) -> &'static Slot
    {
        debug_check!(self.is_initialized(), "descriptor is still being built");
        // SAFETY: The descriptor has been initialized,
        //         and member values have the representation of their target.
        unsafe { &*(addr_of!((*self.as_ptr()).array) as *const Slot) }
    }

    /// The slots of the fixed-size part of the described objects.
    #[inline]
    pub fn slots(self) -> &'static [Slot]
    {
        let slot_count = self.slot_count();
        // SAFETY: The descriptor has been initialized with this many slots,
        //         and member values have the representation of their target.
        unsafe {
            let first = addr_of!((*self.as_ptr()).slots) as *const Slot;
            slice::from_raw_parts(first, slot_count)
        }
    }
}

// Slots and descriptors are collected objects too,
// and this is where the circle closes:
// the descriptor of descriptors has an array of slots,
// and the descriptor of slots has a reference to a descriptor.
crate::define_storage!(Slot { descriptor });
crate::define_storage!(StorageDescriptor [slots] { array });
