use base::fmt;
use base::sync::atomic::AtomicUsize;
use base::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};

use base::prelude::v1::*;

use crate::RefCounted;

/// A soft limit on the number of references that may be held to one object.
///
/// Going above this limit aborts the program (although not necessarily at
/// _exactly_ `MAX_REFCOUNT + 1` references).
const MAX_REFCOUNT: usize = (isize::MAX) as usize;

/// An embeddable atomic reference counter.
///
/// Store one of these in a struct field and implement [`Counted`] for the
/// struct; the struct then has the default [`RefCounted`] behavior and can be
/// managed by [`IntrusivePtr`](crate::IntrusivePtr).
///
/// Only the crate's acquire/release machinery can mutate the count. The one
/// public accessor, [`use_count`](RefCounter::use_count), is read-only.
pub struct RefCounter {
    count: AtomicUsize,
}

impl RefCounter {
    /// Creates a counter with no references accounted yet.
    pub const fn new() -> RefCounter {
        RefCounter {
            count: AtomicUsize::new(0),
        }
    }

    /// The current count, for diagnostics.
    ///
    /// The moment other threads may acquire or release references, the
    /// returned value may already be stale; never use it to decide whether
    /// the object is about to be destroyed. That decision belongs exclusively
    /// to the atomic decrement in the release path.
    pub fn use_count(&self) -> usize {
        self.count.load(Acquire)
    }

    pub(crate) fn increment(&self) {
        // A new reference is always created from a live one, so no ordering
        // beyond the atomicity of the add is needed here.
        let old = self.count.fetch_add(1, Relaxed);

        if old > MAX_REFCOUNT {
            panic!();
        }
    }

    /// Decrements the count, returning the pre-decrement value. The caller
    /// that gets back 1 released the last reference.
    ///
    /// AcqRel: every access made through any previously released reference
    /// happens before the final decrement, and hence before the destruction
    /// that the final decrement triggers.
    pub(crate) fn decrement(&self) -> usize {
        self.count.fetch_sub(1, AcqRel)
    }

    /// Takes the count from 1 to 0 if this is the only reference.
    pub(crate) fn try_claim(&self) -> bool {
        self.count.compare_exchange(1, 0, AcqRel, Relaxed).is_ok()
    }
}

impl Default for RefCounter {
    fn default() -> RefCounter {
        RefCounter::new()
    }
}

impl Clone for RefCounter {
    /// Cloning yields a fresh counter at 0.
    ///
    /// How many references an object has is not part of its value: a copied
    /// object starts with an independent count of its own.
    fn clone(&self) -> RefCounter {
        RefCounter::new()
    }
}

impl fmt::Debug for RefCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefCounter")
            .field("count", &self.use_count())
            .finish()
    }
}

/// Inherits the default counted-object behavior for a type embedding a
/// [`RefCounter`].
///
/// Implementing this trait is all a type needs to do to be managed by
/// [`IntrusivePtr`](crate::IntrusivePtr): acquiring a reference increments
/// the embedded counter, and the release that observes the last reference
/// frees the object through `Box::from_raw`. Objects of such types must
/// therefore live in a `Box` allocation, which
/// [`IntrusivePtr::new`](crate::IntrusivePtr::new) takes care of.
///
/// The trait is object safe, so handles to trait objects work as well: a
/// handle to a concrete type can be converted into a handle to
/// `dyn SomeTrait` (with `SomeTrait: Counted`) by detaching the raw pointer,
/// casting it, and re-adopting it without acquiring:
///
/// ```
/// use intrusive_counted::{Counted, IntrusivePtr, RefCounter};
///
/// trait Shape: Counted {
///     fn sides(&self) -> u32;
/// }
///
/// struct Square {
///     refs: RefCounter,
/// }
///
/// impl Counted for Square {
///     fn ref_counter(&self) -> &RefCounter {
///         &self.refs
///     }
/// }
///
/// impl Shape for Square {
///     fn sides(&self) -> u32 {
///         4
///     }
/// }
///
/// let mut concrete = IntrusivePtr::new(Square { refs: RefCounter::new() });
/// let shape: IntrusivePtr<dyn Shape> =
///     unsafe { IntrusivePtr::from_raw(concrete.detach() as *const dyn Shape, false) };
/// assert_eq!(shape.sides(), 4);
/// // dropping `shape` destroys the originally allocated `Square`
/// ```
pub trait Counted {
    /// The counter embedded in this object.
    fn ref_counter(&self) -> &RefCounter;
}

unsafe impl<T: Counted + ?Sized> RefCounted for T {
    unsafe fn add_ref(&self) {
        self.ref_counter().increment();
    }

    unsafe fn release(&self) {
        if self.ref_counter().decrement() == 1 {
            // Last reference. `Self` is the statically-known adopted type:
            // for a concrete `T` the deletion is monomorphized to the exact
            // allocated type, and for a trait object the `Box` drop runs the
            // destructor of the type the allocation was created with.
            drop(Box::from_raw(self as *const Self as *mut Self));
        }
    }
}
