#![no_std]

//! An intrusive reference-counted pointer: the count lives inside the pointee
//! rather than in a separately allocated control block.
//!
//! [`IntrusivePtr<T>`](IntrusivePtr) is a nullable owning handle. Every clone
//! of a handle acquires one reference on the pointee, every drop releases one,
//! and whichever release observes the last reference destroys the object.
//! How references are acquired and released is decided by the pointee itself,
//! through the [`RefCounted`] trait.
//!
//! Most types get their `RefCounted` implementation for free by embedding a
//! [`RefCounter`] and implementing [`Counted`] (the `counter` feature, enabled
//! by default):
//!
//! ```
//! use intrusive_counted::{Counted, IntrusivePtr, RefCounter};
//!
//! struct Texture {
//!     refs: RefCounter,
//!     id: u32,
//! }
//!
//! impl Counted for Texture {
//!     fn ref_counter(&self) -> &RefCounter {
//!         &self.refs
//!     }
//! }
//!
//! let first = IntrusivePtr::new(Texture { refs: RefCounter::new(), id: 9 });
//! let second = first.clone();
//! assert_eq!(first.use_count(), 2);
//! assert_eq!(second.id, 9);
//! drop(first);
//! assert_eq!(second.use_count(), 1);
//! // dropping `second` destroys the `Texture`
//! ```
//!
//! Types whose count is managed by some other subsystem implement
//! [`RefCounted`] directly instead and never touch the mixin.

extern crate maybe_std as base;

/// Types that carry their own reference count.
///
/// This is the extension point of the crate: [`IntrusivePtr`] calls these two
/// operations on construction, clone and drop, and knows nothing else about
/// the pointee. Implement it directly to manage a count held outside the
/// object (for example in a registry), or implement [`Counted`] to inherit
/// the default atomic counter and deletion behavior.
///
/// # Safety
///
/// The soundness of every handle to a `RefCounted` type rests on the
/// implementation:
///
/// - `add_ref` must be callable any number of times on a live referent, and
///   each call must account for exactly one future `release`.
/// - `release` must destroy the object exactly once, namely when the last
///   acquired reference is released, and must not unwind.
/// - The object must stay live until that final `release`.
pub unsafe trait RefCounted {
    /// Acquire one ownership share of `self`.
    ///
    /// # Safety
    ///
    /// `self` must currently be kept live by at least one ownership share
    /// (or by external synchronization on the caller's side).
    unsafe fn add_ref(&self);

    /// Give up one ownership share of `self`, destroying it if this was the
    /// last one.
    ///
    /// # Safety
    ///
    /// The caller must own the share being released and must not touch the
    /// referent afterwards.
    unsafe fn release(&self);
}

mod ptr;
pub use ptr::*;

#[cfg(feature = "counter")]
mod counter;
#[cfg(feature = "counter")]
pub use counter::*;
