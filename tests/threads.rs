use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};
use std::sync::{Arc, Barrier};
use std::thread;

use intrusive_counted::{Counted, IntrusivePtr, RefCounter};

struct Payload {
    refs: RefCounter,
    cells: [u64; 4],
    drops: Arc<AtomicUsize>,
}

impl Payload {
    fn new(drops: &Arc<AtomicUsize>) -> Payload {
        Payload {
            refs: RefCounter::new(),
            cells: [1, 2, 3, 4],
            drops: Arc::clone(drops),
        }
    }
}

impl Counted for Payload {
    fn ref_counter(&self) -> &RefCounter {
        &self.refs
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        self.drops.fetch_add(1, SeqCst);
    }
}

/// Eight threads race to release their copies of one shared handle; the
/// object must be destroyed exactly once, after all releases.
#[test]
fn racing_releases_destroy_exactly_once() {
    const THREADS: usize = 8;

    let drops = Arc::new(AtomicUsize::new(0));
    let shared = IntrusivePtr::new(Payload::new(&drops));

    let copies: Vec<_> = (0..THREADS).map(|_| shared.clone()).collect();
    assert_eq!(shared.use_count(), THREADS + 1);

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = copies
        .into_iter()
        .map(|copy| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                assert_eq!(copy.cells[2], 3);
                drop(copy);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(shared.use_count(), 1);
    assert_eq!(drops.load(SeqCst), 0);

    drop(shared);
    assert_eq!(drops.load(SeqCst), 1);
}

/// Threads churning clones of the same object never disturb each other:
/// after everything joins, exactly the original reference is left.
#[test]
fn concurrent_clone_drop_churn() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 10_000;

    let drops = Arc::new(AtomicUsize::new(0));
    let shared = IntrusivePtr::new(Payload::new(&drops));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let copy = shared.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let inner = copy.clone();
                    assert_eq!(inner.cells[0], 1);
                    drop(inner);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(shared.use_count(), 1);
    assert_eq!(drops.load(SeqCst), 0);

    drop(shared);
    assert_eq!(drops.load(SeqCst), 1);
}

/// The last release may happen on any thread, including one that received
/// its handle by move rather than by clone.
#[test]
fn last_release_off_thread() {
    let drops = Arc::new(AtomicUsize::new(0));
    let mut local = IntrusivePtr::new(Payload::new(&drops));

    let moved = local.take();
    assert!(local.is_null());

    let worker = thread::spawn(move || {
        assert_eq!(moved.use_count(), 1);
        drop(moved);
    });
    worker.join().unwrap();

    assert_eq!(drops.load(SeqCst), 1);
}
