use super::LocalStack;
use super::PersistentPool;
use super::StackRef;
use crate::storage::DescriptorRef;

use core::marker::PhantomData;
use core::ptr::NonNull;
use unsafe_ref_cell::UnsafeRefCell;

/// Uniquely identifies a mutator at compile-time.
///
/// By abusing an invariant lifetime,
/// we can distinguish different mutators at the type level.
/// This prevents roots of one mutator from being unregistered
/// from another one, which would leave the first with dangling roots.
pub type MutatorId<'m> = PhantomData<fn(&'m ()) -> &'m ()>;

/// Root set of one thread that runs native code against the collected heap.
///
/// A mutator owns the shadow stack of local roots
/// and the pool of persistent roots of its thread.
/// It is not [`Sync`]: pass it to the code that needs it.
/// Roots are created through [`RootScope`][`super::RootScope`]
/// and [`Persistent`][`super::Persistent`],
/// and the collector enumerates them with [`visit_roots`][`Self::visit_roots`].
pub struct Mutator<'m>
{
    /// Uniquely identifies this mutator.
    mutator_id: MutatorId<'m>,

    /// Managed only by root scopes,
    /// so that pops happen in the reverse order of pushes.
    locals: UnsafeRefCell<LocalStack<DescriptorRef, NonNull<u8>>>,

    /// Managed only by persistent handles.
    persistents: UnsafeRefCell<PersistentPool<DescriptorRef, NonNull<u8>>>,
}

impl<'m> Mutator<'m>
{
    /// Create a new mutator and pass it to the given function.
    ///
    /// This method passes the mutator to a callback rather than returning it,
    /// as the choice of `'m` must be up to this method and not the caller,
    /// to ensure that the mutator identifier is unique.
    ///
    /// # Panics
    ///
    /// If any roots remain after the function returns,
    /// for example because a root scope was forgotten.
    pub fn with_new<F, R>(then: F) -> R
        where F: for<'fresh_m> FnOnce(&Mutator<'fresh_m>) -> R
    {
        let this = Mutator{
            mutator_id: PhantomData,
            locals: UnsafeRefCell::new(LocalStack::new()),
            persistents: UnsafeRefCell::new(PersistentPool::new()),
        };

        let result = then(&this);

        check!(this.local_count() == 0, "local roots outlived their mutator");
        check!(this.persistent_count() == 0, "persistent roots outlived their mutator");

        result
    }

    /// Number of entries on the shadow stack.
    pub fn local_count(&self) -> usize
    {
        // SAFETY: Borrows of the root sets never escape this module.
        unsafe { self.locals.borrow().len() }
    }

    /// Number of distinct persistent roots.
    pub fn persistent_count(&self) -> usize
    {
        // SAFETY: Borrows of the root sets never escape this module.
        unsafe { self.persistents.borrow().len() }
    }

    /// How often a persistent root is currently registered.
    pub fn persistent_refcount(&self, data: NonNull<u8>) -> usize
    {
        // SAFETY: Borrows of the root sets never escape this module.
        unsafe { self.persistents.borrow().refcount(&data) }
    }

    /// Call `visit` with the descriptor and address of every root,
    /// first those on the shadow stack, from bottom to top,
    /// then the persistent ones.
    ///
    /// # Safety
    ///
    /// `visit` must not create or destroy roots of this mutator.
    pub unsafe fn visit_roots<F>(&self, mut visit: F)
        where F: FnMut(DescriptorRef, NonNull<u8>)
    {
        for (&descriptor, &data) in self.locals.borrow().iter() {
            visit(descriptor, data);
        }
        for (&descriptor, &data) in self.persistents.borrow().iter() {
            visit(descriptor, data);
        }
    }

    pub (super) fn local_top(&self) -> StackRef
    {
        // SAFETY: Borrows of the root sets never escape this module.
        unsafe { self.locals.borrow().top() }
    }

    pub (super) fn push_local(&self, descriptor: DescriptorRef, data: NonNull<u8>)
    {
        // SAFETY: Borrows of the root sets never escape this module.
        unsafe { self.locals.borrow_mut().push(descriptor, data); }
    }

    pub (super) fn pop_locals_to(&self, top: StackRef)
    {
        // SAFETY: Borrows of the root sets never escape this module.
        unsafe { self.locals.borrow_mut().pop_to(top); }
    }

    pub (super) fn add_persistent(&self, data: NonNull<u8>, descriptor: DescriptorRef)
    {
        // SAFETY: Borrows of the root sets never escape this module.
        unsafe { self.persistents.borrow_mut().add(data, descriptor); }
    }

    pub (super) fn remove_persistent(&self, data: NonNull<u8>)
    {
        // SAFETY: Borrows of the root sets never escape this module.
        unsafe { self.persistents.borrow_mut().remove(&data); }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    use crate::storage::Storage;
    use crate::testing::serial;
    use std::vec::Vec;

    #[test]
    fn starts_empty()
    {
        Mutator::with_new(|mutator| {
            assert_eq!(mutator.local_count(), 0);
            assert_eq!(mutator.persistent_count(), 0);
            let mut visited = 0;
            unsafe { mutator.visit_roots(|_, _| visited += 1); }
            assert_eq!(visited, 0);
        });
    }

    #[test]
    fn visits_locals_then_persistents()
    {
        let _serial = serial();
        let descriptor = u32::storage_descriptor();
        let mut a = 1u32;
        let mut b = 2u32;
        let a = NonNull::from(&mut a).cast::<u8>();
        let b = NonNull::from(&mut b).cast::<u8>();

        Mutator::with_new(|mutator| {
            mutator.add_persistent(a, descriptor);
            let top = mutator.local_top();
            mutator.push_local(descriptor, b);

            let mut visited = Vec::new();
            unsafe { mutator.visit_roots(|d, p| visited.push((d, p))); }
            assert_eq!(visited, [(descriptor, b), (descriptor, a)]);

            mutator.pop_locals_to(top);
            mutator.remove_persistent(a);
        });
    }

    #[test]
    #[should_panic(expected = "local roots outlived their mutator")]
    fn leftover_locals_are_fatal()
    {
        Mutator::with_new(|mutator| {
            mutator.push_local(DescriptorRef::boxed(), NonNull::dangling());
        });
    }

    #[test]
    #[should_panic(expected = "persistent roots outlived their mutator")]
    fn leftover_persistents_are_fatal()
    {
        Mutator::with_new(|mutator| {
            mutator.add_persistent(NonNull::dangling(), DescriptorRef::boxed());
        });
    }
}
