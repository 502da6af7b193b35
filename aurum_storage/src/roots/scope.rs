use super::Mutator;
use super::StackRef;
use crate::handle::GcHooks;
use crate::handle::LocalRef;
use crate::handle::LocalVal;
use crate::handle::LocalWeak;
use crate::storage::DescriptorRef;
use crate::storage::Storage;

use core::ptr::NonNull;

impl<'m> Mutator<'m>
{
    /// Open a root scope.
    ///
    /// Local roots created through the scope are popped
    /// from the shadow stack when the scope is dropped.
    /// Scopes must be dropped in the reverse order of their creation,
    /// which is what happens to scopes that are local variables.
    pub fn scope(&self) -> RootScope<'_, 'm>
    {
        RootScope{mutator: self, top: self.local_top()}
    }

    /// Call the given function with a new root scope.
    ///
    /// The scope is closed as soon as the given function returns or panics.
    ///
    /// # Examples
    ///
    /// ```
    /// # use aurum_storage::handle::NoBarrier;
    /// # use aurum_storage::roots::Mutator;
    /// Mutator::with_new(|mutator| {
    ///     let mut answer = 42u64;
    ///     mutator.with_scope(|scope| {
    ///         let local = scope.local_ref::<_, NoBarrier>(&mut answer);
    ///         assert_eq!(mutator.local_count(), 1);
    ///         assert_eq!(unsafe { *local.get() }, 42);
    ///     });
    ///     assert_eq!(mutator.local_count(), 0);
    /// });
    /// ```
    pub fn with_scope<F, R>(&self, then: F) -> R
        where F: for<'s> FnOnce(&RootScope<'s, 'm>) -> R
    {
        let scope = self.scope();
        then(&scope)
    }
}

/// Region of native code that holds local roots.
///
/// Creating the scope records the height of the shadow stack,
/// and dropping it pops the stack back to that height,
/// on every exit path, including early returns and panics.
pub struct RootScope<'a, 'm>
{
    mutator: &'a Mutator<'m>,
    top: StackRef,
}

impl<'a, 'm> RootScope<'a, 'm>
{
    /// The mutator whose shadow stack the scope manages.
    pub fn mutator(&self) -> &'a Mutator<'m>
    {
        self.mutator
    }

    /// Height the shadow stack is popped back to when the scope ends.
    pub fn top(&self) -> StackRef
    {
        self.top
    }

    /// Create a strong local reference and root its target.
    ///
    /// A null target is not rooted.
    /// The root stays on the shadow stack until the scope ends,
    /// even if the local is dropped or changed earlier.
    ///
    /// Only the target is rooted, not the local itself:
    /// a target assigned later with `set` is not rooted,
    /// so assign through [`set_local`][`Self::set_local`] instead.
    /// As the shadow stack records addresses of targets,
    /// a collector that moves objects cannot update the local.
    pub fn local_ref<T, G>(&self, target: *mut T) -> LocalRef<T, G>
        where T: Storage, G: GcHooks
    {
        let local = LocalRef::new(target);
        if let Some(data) = NonNull::new(target) {
            self.mutator.push_local(T::storage_descriptor(), data.cast());
        }
        local
    }

    /// Assign a new target to a strong local and root it.
    ///
    /// The previous target stays rooted until the scope ends.
    /// A null target is not rooted.
    pub fn set_local<T, G>(&self, local: &mut LocalRef<T, G>, target: *mut T)
        where T: Storage, G: GcHooks
    {
        local.set(target);
        if let Some(data) = NonNull::new(target) {
            self.mutator.push_local(T::storage_descriptor(), data.cast());
        }
    }

    /// Create a weak local reference.
    ///
    /// Weak locals do not keep their target alive,
    /// so nothing is rooted.
    pub fn local_weak<T, G>(&self, target: *mut T) -> LocalWeak<T, G>
        where G: GcHooks
    {
        LocalWeak::new(target)
    }

    /// Create a local value.
    ///
    /// The value lives inline on the native stack and moves with it,
    /// so the scope cannot root it by address.
    /// Root the objects it refers to with [`local_ref`][`Self::local_ref`].
    pub fn local_val<T, G>(&self, value: T) -> LocalVal<T, G>
        where G: GcHooks
    {
        LocalVal::new(value)
    }

    /// Root an arbitrary object until the scope ends.
    ///
    /// # Safety
    ///
    /// `descriptor` must describe the memory at `data`,
    /// which must remain valid until the scope ends.
    pub unsafe fn root(&self, descriptor: DescriptorRef, data: NonNull<u8>)
    {
        self.mutator.push_local(descriptor, data);
    }
}

impl<'a, 'm> Drop for RootScope<'a, 'm>
{
    fn drop(&mut self)
    {
        self.mutator.pop_locals_to(self.top);
    }
}
