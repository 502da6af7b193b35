use super::Mutator;
use crate::handle::Discipline;
use crate::handle::GcHooks;
use crate::handle::Handle;
use crate::handle::HandleType;
use crate::handle::PersistentHooks;
use crate::handle::Strong;
use crate::handle::Value;
use crate::handle::Weak;
use crate::storage::Storage;

use alloc::boxed::Box;
use core::fmt;
use core::ops::Deref;
use core::ptr::NonNull;

/// Handle that stays rooted for as long as it exists, outside of any scope.
///
/// The handle is boxed so that its address does not change,
/// and registered with the persistent pool of the mutator:
///
///  - a strong persistent roots its target, unless it is null;
///  - a persistent value roots itself, that is, the boxed value;
///  - a weak persistent roots nothing.
///
/// Persistents referring to the same target share one entry in the pool,
/// which is removed when the last of them is dropped.
///
/// Reading goes through [`Deref`].
/// Changing the handle goes through [`update`][`Self::update`],
/// which keeps the registration in sync with the new target.
pub struct Persistent<'a, 'm, T, D, G>
    where T: Storage, D: Discipline<T>, G: GcHooks
{
    mutator: &'a Mutator<'m>,
    handle: Box<Handle<T, D, PersistentHooks<G>>>,

    /// What the handle is currently registered as, if anything.
    /// Kept so that unregistering removes exactly what was added.
    registered: Option<NonNull<u8>>,
}

/// Shorthand for `Persistent<'a, 'm, T, Value, G>`.
pub type PersistentVal<'a, 'm, T, G> = Persistent<'a, 'm, T, Value, G>;

/// Shorthand for `Persistent<'a, 'm, T, Strong, G>`.
pub type PersistentRef<'a, 'm, T, G> = Persistent<'a, 'm, T, Strong, G>;

/// Shorthand for `Persistent<'a, 'm, T, Weak, G>`.
pub type PersistentWeak<'a, 'm, T, G> = Persistent<'a, 'm, T, Weak, G>;

impl<'a, 'm, T, D, G> Persistent<'a, 'm, T, D, G>
    where T: Storage, D: Discipline<T>, G: GcHooks
{
    /// Move a handle into a persistent and register it.
    ///
    /// # Panics
    ///
    /// If the handle stores a value of a variable-size type.
    pub fn new(mutator: &'a Mutator<'m>, handle: Handle<T, D, PersistentHooks<G>>)
        -> Self
    {
        let mut this = Self{mutator, handle: Box::new(handle), registered: None};
        this.register();
        this
    }

    fn register(&mut self)
    {
        let identity = D::root_identity(self.handle.repr());
        if let Some(data) = identity {
            let descriptor = T::storage_descriptor();
            check!(
                D::TYPE != HandleType::Value || !descriptor.has_array(),
                "variable-size objects cannot be stored by value"
            );
            self.mutator.add_persistent(data, descriptor);
        }
        self.registered = identity;
    }

    fn unregister(&mut self)
    {
        if let Some(data) = self.registered.take() {
            self.mutator.remove_persistent(data);
        }
    }

    /// Change the handle and register it anew.
    ///
    /// The new registration is added before the old one is removed,
    /// so a target that does not change is not unrooted in between.
    pub fn update<F, R>(&mut self, then: F) -> R
        where F: FnOnce(&mut Handle<T, D, PersistentHooks<G>>) -> R
    {
        let result = then(&mut self.handle);
        let previous = self.registered.take();
        self.register();
        if let Some(data) = previous {
            self.mutator.remove_persistent(data);
        }
        result
    }

    /// Address under which the handle is registered, if it is.
    pub fn root(&self) -> Option<NonNull<u8>>
    {
        self.registered
    }

    /// The mutator the handle is registered with.
    pub fn mutator(&self) -> &'a Mutator<'m>
    {
        self.mutator
    }
}

impl<'a, 'm, T, D, G> Deref for Persistent<'a, 'm, T, D, G>
    where T: Storage, D: Discipline<T>, G: GcHooks
{
    type Target = Handle<T, D, PersistentHooks<G>>;

    fn deref(&self) -> &Self::Target
    {
        &self.handle
    }
}

impl<'a, 'm, T, D, G> Drop for Persistent<'a, 'm, T, D, G>
    where T: Storage, D: Discipline<T>, G: GcHooks
{
    fn drop(&mut self)
    {
        self.unregister();
    }
}

impl<'a, 'm, T, D, G> Clone for Persistent<'a, 'm, T, D, G>
    where T: Storage, D: Discipline<T>, G: GcHooks, Handle<T, D, PersistentHooks<G>>: Clone
{
    fn clone(&self) -> Self
    {
        Self::new(self.mutator, (*self.handle).clone())
    }
}

impl<'a, 'm, T, D, G> fmt::Debug for Persistent<'a, 'm, T, D, G>
    where T: Storage, D: Discipline<T>, G: GcHooks, Handle<T, D, PersistentHooks<G>>: fmt::Debug
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("Persistent")
            .field("handle", &self.handle)
            .field("registered", &self.registered)
            .finish()
    }
}

impl<'m> Mutator<'m>
{
    /// Create a persistent value.
    pub fn persistent_val<T, G>(&self, value: T) -> PersistentVal<'_, 'm, T, G>
        where T: Storage, G: GcHooks
    {
        Persistent::new(self, Handle::<T, Value, _>::new(value))
    }

    /// Create a strong persistent reference.
    pub fn persistent_ref<T, G>(&self, target: *mut T) -> PersistentRef<'_, 'm, T, G>
        where T: Storage, G: GcHooks
    {
        Persistent::new(self, Handle::<T, Strong, _>::new(target))
    }

    /// Create a weak persistent reference.
    pub fn persistent_weak<T, G>(&self, target: *mut T) -> PersistentWeak<'_, 'm, T, G>
        where T: Storage, G: GcHooks
    {
        Persistent::new(self, Handle::<T, Weak, _>::new(target))
    }
}
