//! Hooks that count what they are asked to do, for tests.

use crate::handle::GcHooks;
use crate::handle::HandleHooks;
use crate::handle::HandleType;

use alloc::alloc::alloc;
use core::alloc::Layout;
use core::cell::Cell;
use core::ptr;

/// How often each hook was called on this thread since the last reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counts
{
    pub created: usize,
    pub destroyed: usize,
    pub reads: usize,
    pub writes: usize,
    pub allocations: usize,
}

std::thread_local!
{
    static COUNTS: Cell<Counts> = Cell::new(Counts::default());
    static READ_NULL: Cell<bool> = Cell::new(false);
    static WRITE_NULL: Cell<bool> = Cell::new(false);
}

pub fn counts() -> Counts
{
    COUNTS.with(Cell::get)
}

pub fn reset_counts()
{
    COUNTS.with(|c| c.set(Counts::default()));
    READ_NULL.with(|r| r.set(false));
    WRITE_NULL.with(|w| w.set(false));
}

fn bump(f: impl FnOnce(&mut Counts))
{
    COUNTS.with(|c| {
        let mut counts = c.get();
        f(&mut counts);
        c.set(counts);
    });
}

/// Collector hooks backed by the global allocator.
pub enum CountingHooks { }

impl CountingHooks
{
    /// Make reads return null, as if every target had been collected.
    pub fn set_read_null(read_null: bool)
    {
        READ_NULL.with(|r| r.set(read_null));
    }

    /// Make writes store null instead of the given pointer.
    pub fn set_write_null(write_null: bool)
    {
        WRITE_NULL.with(|w| w.set(write_null));
    }
}

impl GcHooks for CountingHooks
{
    unsafe fn read(slot: *mut *mut u8) -> *mut u8
    {
        bump(|c| c.reads += 1);
        if READ_NULL.with(Cell::get) { ptr::null_mut() } else { *slot }
    }

    unsafe fn write(slot: *mut *mut u8, value: *mut u8)
    {
        bump(|c| c.writes += 1);
        *slot = if WRITE_NULL.with(Cell::get) { ptr::null_mut() } else { value };
    }

    fn allocate(layout: Layout) -> *mut u8
    {
        bump(|c| c.allocations += 1);
        if layout.size() == 0 {
            return layout.align() as *mut u8;
        }
        unsafe { alloc(layout) }
    }
}

/// Handle hooks that also count creation and destruction.
pub enum CountingHandleHooks { }

impl HandleHooks for CountingHandleHooks
{
    fn created(_discipline: HandleType)
    {
        bump(|c| c.created += 1);
    }

    fn destroyed(_discipline: HandleType)
    {
        bump(|c| c.destroyed += 1);
    }

    unsafe fn read<T>(slot: *mut *mut T) -> *mut T
    {
        CountingHooks::read(slot.cast()).cast()
    }

    unsafe fn write<T>(slot: *mut *mut T, value: *mut T)
    {
        CountingHooks::write(slot.cast(), value.cast());
    }
}

/// Serialize the first use of registered types across test threads.
///
/// Registration is not synchronized,
/// so tests that may be the first to use a type hold this.
pub fn serial() -> std::sync::MutexGuard<'static, ()>
{
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
