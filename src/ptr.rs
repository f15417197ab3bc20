use base::cmp::Ordering;
use base::fmt;
use base::hash::{Hash, Hasher};
use base::marker::PhantomData;
use base::mem;
use base::ops::Deref;
use base::ptr::{self, NonNull};

#[cfg(feature = "counter")]
use base::alloc::{dealloc, Layout};
#[cfg(feature = "counter")]
use base::prelude::v1::*;

#[cfg(feature = "counter")]
use crate::Counted;
use crate::RefCounted;

/// A nullable owning handle to a [`RefCounted`] object.
///
/// The handle stores nothing but the pointer itself; the reference count
/// lives inside the pointee. Cloning a non-null handle acquires one
/// reference, dropping it releases one, and the release that observes the
/// last reference destroys the object.
pub struct IntrusivePtr<T: RefCounted + ?Sized> {
    ptr: Option<NonNull<T>>,
    phantom: PhantomData<T>,
}

unsafe impl<T: RefCounted + Sync + Send + ?Sized> Send for IntrusivePtr<T> {}
unsafe impl<T: RefCounted + Sync + Send + ?Sized> Sync for IntrusivePtr<T> {}

impl<T: RefCounted + ?Sized> IntrusivePtr<T> {
    /// Creates a null handle. No reference is acquired.
    pub const fn null() -> IntrusivePtr<T> {
        IntrusivePtr {
            ptr: None,
            phantom: PhantomData,
        }
    }

    /// Adopts a raw pointer, acquiring a reference on it first when
    /// `add_ref` is true.
    ///
    /// With `add_ref` set to false the pointer is adopted as-is, taking over
    /// a reference the caller already owns. This is the counterpart of
    /// [`detach`](IntrusivePtr::detach) and of factories that hand out
    /// pre-acquired objects.
    ///
    /// The reference is acquired before the handle exists, so a panicking
    /// `add_ref` leaves no handle behind and no count was changed.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a live object whose `RefCounted`
    /// contract holds for the adopted reference. For types counted through
    /// [`Counted`], the object must have been allocated by `Box` (as
    /// [`IntrusivePtr::new`] does), since the last release frees it via
    /// `Box::from_raw`. With `add_ref` set to false the caller must actually
    /// own the reference being transferred.
    pub unsafe fn from_raw(ptr: *const T, add_ref: bool) -> IntrusivePtr<T> {
        let ptr = NonNull::new(ptr as *mut T);
        if add_ref {
            if let Some(p) = ptr {
                (&*p.as_ptr()).add_ref();
            }
        }
        IntrusivePtr {
            ptr,
            phantom: PhantomData,
        }
    }

    /// Returns a reference to the pointee, or `None` for a null handle.
    pub fn as_ref(&self) -> Option<&T> {
        // A non-null handle owns a reference, so the pointee is live.
        self.ptr.map(|p| unsafe { &*p.as_ptr() })
    }

    /// True iff the handle is null.
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Releases the current referent (if any) and leaves the handle null.
    pub fn reset(&mut self) {
        *self = IntrusivePtr::null();
    }

    /// Releases the current referent (if any) and adopts `ptr` in its place,
    /// as if by [`from_raw`](IntrusivePtr::from_raw).
    ///
    /// The new referent is acquired before the old one is released, so
    /// passing a pointer aliasing the current referent is fine.
    ///
    /// # Safety
    ///
    /// Same contract as [`from_raw`](IntrusivePtr::from_raw).
    pub unsafe fn reset_raw(&mut self, ptr: *const T, add_ref: bool) {
        *self = IntrusivePtr::from_raw(ptr, add_ref);
    }

    /// Moves the pointer out of this handle, leaving it null. The reference
    /// count is untouched; the returned handle now owns the reference.
    pub fn take(&mut self) -> IntrusivePtr<T> {
        mem::replace(self, IntrusivePtr::null())
    }

    /// Exchanges the pointers of two handles. No reference counts change:
    /// each handle keeps owning one reference, just to the other object.
    pub fn swap(&mut self, other: &mut IntrusivePtr<T>) {
        mem::swap(&mut self.ptr, &mut other.ptr);
    }

    /// The referent's address as a thin pointer, null for a null handle.
    /// All identity comparisons and hashing go through this.
    fn addr(&self) -> *const u8 {
        match self.ptr {
            Some(p) => p.as_ptr() as *const u8,
            None => ptr::null(),
        }
    }
}

// Sized pointees only: the null arm of these accessors has to materialize a
// null `*const T`, which exists only for thin pointers.
impl<T: RefCounted> IntrusivePtr<T> {
    /// Returns the raw pointer without affecting ownership. Null for a null
    /// handle.
    pub fn get(&self) -> *const T {
        match self.ptr {
            Some(p) => p.as_ptr() as *const T,
            None => ptr::null(),
        }
    }

    /// Returns the raw pointer and leaves the handle null, *without*
    /// releasing the reference.
    ///
    /// One ownership share is transferred to the caller, who must eventually
    /// release it, either through [`RefCounted::release`] or by re-adopting
    /// the pointer with `from_raw(ptr, false)`. Doing neither leaks one
    /// reference.
    ///
    /// ```
    /// use intrusive_counted::{Counted, IntrusivePtr, RefCounter};
    ///
    /// struct Blob {
    ///     refs: RefCounter,
    /// }
    ///
    /// impl Counted for Blob {
    ///     fn ref_counter(&self) -> &RefCounter {
    ///         &self.refs
    ///     }
    /// }
    ///
    /// let mut a = IntrusivePtr::new(Blob { refs: RefCounter::new() });
    /// let raw = a.detach();
    /// assert!(a.is_null());
    ///
    /// // Re-adopt the reference we now own; the count is still 1.
    /// let b = unsafe { IntrusivePtr::from_raw(raw, false) };
    /// assert_eq!(b.use_count(), 1);
    /// ```
    pub fn detach(&mut self) -> *const T {
        match self.ptr.take() {
            Some(p) => p.as_ptr() as *const T,
            None => ptr::null(),
        }
    }
}

#[cfg(feature = "counter")]
impl<T: Counted + ?Sized> IntrusivePtr<T> {
    /// The referent's current reference count, or 0 for a null handle.
    ///
    /// Diagnostics only: the moment other threads hold handles to the same
    /// object the value may already be stale.
    pub fn use_count(&self) -> usize {
        self.as_ref().map_or(0, |r| r.ref_counter().use_count())
    }
}

#[cfg(feature = "counter")]
impl<T: Counted> IntrusivePtr<T> {
    /// Moves `data` to the heap and returns an owning handle to it.
    ///
    /// The object starts with count 0 and the adoption acquires the first
    /// reference, so the returned handle observes a count of 1.
    pub fn new(data: T) -> IntrusivePtr<T> {
        let raw = Box::into_raw(Box::new(data));
        unsafe { IntrusivePtr::from_raw(raw, true) }
    }

    /// Returns the inner value if this handle holds the only reference to
    /// it; otherwise returns the handle unchanged.
    ///
    /// On success the allocation is freed without running the value's
    /// destructor; the value now lives in the caller, with its embedded
    /// counter back at 0.
    pub fn try_unwrap(this: IntrusivePtr<T>) -> Result<T, IntrusivePtr<T>> {
        let raw = match this.ptr {
            Some(p) => p.as_ptr(),
            None => return Err(this),
        };

        unsafe {
            // Claiming the count takes it from 1 to 0, so a concurrent
            // manual `add_ref` through a raw pointer can no longer observe
            // a live reference.
            if !(*raw).ref_counter().try_claim() {
                return Err(this);
            }

            let value = ptr::read(raw);
            mem::forget(this);
            // `Box::new` performs no allocation for zero-sized values, so
            // there is nothing to free for them.
            if mem::size_of::<T>() != 0 {
                dealloc(raw.cast(), Layout::new::<T>());
            }
            Ok(value)
        }
    }
}

impl<T: RefCounted + ?Sized> Clone for IntrusivePtr<T> {
    /// Makes a clone of the handle.
    ///
    /// A non-null handle acquires one more reference on the pointee; cloning
    /// a null handle is a no-op.
    fn clone(&self) -> IntrusivePtr<T> {
        if let Some(p) = self.ptr {
            unsafe { (&*p.as_ptr()).add_ref() };
        }
        IntrusivePtr {
            ptr: self.ptr,
            phantom: PhantomData,
        }
    }
}

impl<T: RefCounted + ?Sized> Drop for IntrusivePtr<T> {
    /// Releases the owned reference, destroying the pointee if it was the
    /// last one. Dropping a null handle does nothing.
    fn drop(&mut self) {
        if let Some(p) = self.ptr {
            unsafe { (&*p.as_ptr()).release() };
        }
    }
}

impl<T: RefCounted + ?Sized> Default for IntrusivePtr<T> {
    /// Creates a null handle.
    fn default() -> IntrusivePtr<T> {
        IntrusivePtr::null()
    }
}

impl<T: RefCounted + ?Sized> Deref for IntrusivePtr<T> {
    type Target = T;

    /// Dereferences to the pointee.
    ///
    /// # Panics
    ///
    /// Panics if the handle is null. Use [`as_ref`](IntrusivePtr::as_ref)
    /// when nullness is expected.
    fn deref(&self) -> &T {
        match self.as_ref() {
            Some(r) => r,
            None => panic!("dereferenced a null IntrusivePtr"),
        }
    }
}

impl<T, U> PartialEq<IntrusivePtr<U>> for IntrusivePtr<T>
where
    T: RefCounted + ?Sized,
    U: RefCounted + ?Sized,
{
    /// Identity equality: two handles are equal iff they point at the same
    /// address. The pointees' values are never consulted.
    fn eq(&self, other: &IntrusivePtr<U>) -> bool {
        self.addr() == other.addr()
    }
}

impl<T: RefCounted + ?Sized> Eq for IntrusivePtr<T> {}

impl<T: RefCounted> PartialEq<*const T> for IntrusivePtr<T> {
    /// Identity equality against a raw pointer.
    fn eq(&self, other: &*const T) -> bool {
        self.addr() == *other as *const u8
    }
}

impl<T: RefCounted + ?Sized> PartialOrd for IntrusivePtr<T> {
    fn partial_cmp(&self, other: &IntrusivePtr<T>) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: RefCounted + ?Sized> Ord for IntrusivePtr<T> {
    /// Orders handles by the addresses they point at, with null first.
    ///
    /// This is a strict total order suitable for ordered containers, but it
    /// is an *address* order: it carries no meaning for the pointees and is
    /// not stable from one run of the program to the next.
    fn cmp(&self, other: &IntrusivePtr<T>) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl<T: RefCounted + ?Sized> Hash for IntrusivePtr<T> {
    /// Hashes the address, consistently with the identity `Eq`.
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.addr() as usize).hash(state);
    }
}

impl<T: RefCounted + ?Sized> fmt::Debug for IntrusivePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IntrusivePtr").field(&self.addr()).finish()
    }
}

impl<T: RefCounted + ?Sized> fmt::Pointer for IntrusivePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.addr(), f)
    }
}
