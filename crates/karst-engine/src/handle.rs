//! Element handles: the unit of scheduling and the acquisition
//! protocol's entry point.
//!
//! For every tickable element there is exactly one [`TickHandle`]
//! (clones share the same underlying handle). The handle carries the
//! element payload, an [`OwnerCell`] naming the worker responsible for
//! the element this tick, and a monitor — the last-resort mutual
//! exclusion primitive for cross-thread access.
//!
//! # Exclusion model
//!
//! During a tick the owning worker mutates the element freely and
//! holds the monitor while the element's own work item runs. Every
//! other thread must go through [`TickHandle::acquire`] (blocking,
//! monitor-protected) or [`TickHandle::scheduled_acquire`]
//! (non-blocking, runs at the owner's next inter-batch drain). Nested
//! `acquire` calls on *different* elements are permitted; lock
//! ordering across them is the caller's responsibility.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::Sender;

use karst_core::WorkerId;

use crate::worker::{self, WORKER_NONE};

/// A deferred acquisition callback, boxed for the owner's queue.
pub(crate) type AcquireTask = Box<dyn FnOnce() + Send + 'static>;

// ── OwnerCell ────────────────────────────────────────────────────

/// The owning-worker slot of a handle.
///
/// The worker index is the hot field: read with `Acquire` on every
/// `acquire` call for the same-thread check. The mailbox (the owner's
/// acquisition-queue sender) sits behind a mutex that is locked only
/// by the planner's per-tick publish and by `scheduled_acquire`;
/// both are rare relative to the owner check.
///
/// The planner publishes index and mailbox together, before the batch
/// containing the handle is pushed. Between that publish and the
/// tick-complete barrier the slot does not change.
pub struct OwnerCell {
    index: AtomicU32,
    mailbox: Mutex<Option<Sender<AcquireTask>>>,
}

impl OwnerCell {
    fn new() -> Self {
        Self {
            index: AtomicU32::new(WORKER_NONE),
            mailbox: Mutex::new(None),
        }
    }

    /// The worker currently responsible for this element, or `None`
    /// outside any tick assignment.
    pub fn current(&self) -> Option<WorkerId> {
        match self.index.load(Ordering::Acquire) {
            WORKER_NONE => None,
            idx => Some(WorkerId(idx)),
        }
    }

    pub(crate) fn current_raw(&self) -> u32 {
        self.index.load(Ordering::Acquire)
    }

    /// Publish a new owner. Planner only.
    pub(crate) fn refresh(&self, index: u32, mailbox: Sender<AcquireTask>) {
        *self.mailbox.lock().unwrap() = Some(mailbox);
        self.index.store(index, Ordering::Release);
    }

    /// Drop the owner, e.g. when the element leaves the registry.
    pub(crate) fn clear(&self) {
        self.index.store(WORKER_NONE, Ordering::Release);
        *self.mailbox.lock().unwrap() = None;
    }

    fn mailbox(&self) -> Option<Sender<AcquireTask>> {
        self.mailbox.lock().unwrap().clone()
    }
}

// ── TickHandle ───────────────────────────────────────────────────

struct HandleInner<E: ?Sized> {
    owner: OwnerCell,
    monitor: Mutex<()>,
    /// Number of monitor-path (foreign) acquisitions. Instrumentation:
    /// lets tests verify the same-thread fast path took no lock.
    foreign_acquires: AtomicU64,
    element: E,
}

/// Shared handle around a tickable element.
///
/// `E` is usually a trait object (`dyn Instance`, `dyn Chunk`,
/// `dyn Entity`). Cloning is cheap and clones refer to the same
/// element, owner slot, and monitor.
pub struct TickHandle<E: ?Sized> {
    inner: Arc<HandleInner<E>>,
}

impl<E: ?Sized> Clone for TickHandle<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: ?Sized> std::fmt::Debug for TickHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickHandle")
            .field("ptr", &(Arc::as_ptr(&self.inner) as *const ()))
            .finish()
    }
}

fn new_inner<E>(element: E) -> Arc<HandleInner<E>> {
    Arc::new(HandleInner {
        owner: OwnerCell::new(),
        monitor: Mutex::new(()),
        foreign_acquires: AtomicU64::new(0),
        element,
    })
}

impl<E> TickHandle<E> {
    /// Wrap an element in a fresh, unowned handle.
    pub fn new(element: E) -> Self {
        Self {
            inner: new_inner(element),
        }
    }
}

impl TickHandle<dyn karst_core::Instance> {
    /// Wrap an instance in a fresh, unowned trait-object handle.
    pub fn from_instance<T: karst_core::Instance + 'static>(instance: T) -> Self {
        Self {
            inner: new_inner(instance),
        }
    }
}

impl TickHandle<dyn karst_core::Chunk> {
    /// Wrap a chunk in a fresh, unowned trait-object handle.
    pub fn from_chunk<T: karst_core::Chunk + 'static>(chunk: T) -> Self {
        Self {
            inner: new_inner(chunk),
        }
    }
}

impl TickHandle<dyn karst_core::Entity> {
    /// Wrap an entity in a fresh, unowned trait-object handle.
    pub fn from_entity<T: karst_core::Entity + 'static>(entity: T) -> Self {
        Self {
            inner: new_inner(entity),
        }
    }
}

impl<E: ?Sized> TickHandle<E> {
    /// The element payload, without any synchronization.
    ///
    /// Valid from the worker that currently owns the element, or
    /// inside an [`acquire`](Self::acquire) callback. Anywhere else
    /// this is a read of state another thread may be mutating.
    pub fn element(&self) -> &E {
        &self.inner.element
    }

    /// The owner control block.
    pub fn owner(&self) -> &OwnerCell {
        &self.inner.owner
    }

    /// Number of acquisitions that went through the monitor path.
    pub fn foreign_acquires(&self) -> u64 {
        self.inner.foreign_acquires.load(Ordering::Relaxed)
    }

    /// Two handles are the same if they wrap the same element.
    pub fn same_handle(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn lock_monitor(&self) -> MutexGuard<'_, ()> {
        self.inner.monitor.lock().unwrap()
    }

    /// Run `f` with mutually exclusive access to the element, from any
    /// thread. Blocks until exclusion is available; `f` runs exactly
    /// once, before `acquire` returns.
    ///
    /// When the calling thread is the worker that owns the element,
    /// `f` is invoked directly with no locking — this is both the hot
    /// path and what makes `acquire` safe to call on the element a
    /// worker is currently ticking (the worker already holds that
    /// element's monitor for the duration of the work item).
    ///
    /// Otherwise the handle's monitor is taken for the duration of
    /// `f`. If the caller is itself a worker servicing another
    /// worker's element, the call is additionally registered with the
    /// pool's in-flight tracker so tick completion waits for it.
    pub fn acquire<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        let owner = self.inner.owner.current_raw();
        let caller = worker::context();

        if let Some(ctx) = &caller {
            if ctx.index == owner {
                return f(&self.inner.element);
            }
        }

        // Foreign path. Register with the phaser first so the
        // deregistration (guard drop) happens after the monitor is
        // released.
        let _in_flight = caller
            .filter(|_| owner != WORKER_NONE)
            .map(|ctx| ctx.foreign.register());
        let _monitor = self.lock_monitor();
        self.inner.foreign_acquires.fetch_add(1, Ordering::Relaxed);
        f(&self.inner.element)
    }
}

impl<E: ?Sized + Send + Sync + 'static> TickHandle<E> {
    /// Enqueue `f` onto the owning worker's acquisition queue and
    /// return immediately. The callback runs exactly once, at the
    /// owner's next inter-batch drain (or before the owner reports
    /// tick-done if it has no further batches).
    ///
    /// The callback re-enters [`acquire`](Self::acquire) on the
    /// draining worker, so it stays correct even if ownership moved
    /// between deposit and drain.
    ///
    /// If the element is currently unowned the callback runs inline
    /// on the calling thread, under the monitor.
    pub fn scheduled_acquire(&self, f: impl FnOnce(&E) + Send + 'static) {
        match self.inner.owner.mailbox() {
            Some(tx) => {
                let handle = self.clone();
                let task: AcquireTask = Box::new(move || handle.acquire(f));
                if let Err(err) = tx.send(task) {
                    // Owner shut down between the mailbox read and the
                    // send; run the callback here instead.
                    (err.into_inner())();
                }
            }
            None => {
                self.acquire(f);
            }
        }
    }
}

// Compile-time assertion: handles over the element trait objects must
// cross threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<TickHandle<dyn karst_core::Instance>>();
    assert::<TickHandle<dyn karst_core::Chunk>>();
    assert::<TickHandle<dyn karst_core::Entity>>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn new_handle_is_unowned() {
        let handle = TickHandle::new(7u32);
        assert_eq!(handle.owner().current(), None);
        assert_eq!(handle.foreign_acquires(), 0);
    }

    #[test]
    fn acquire_from_plain_thread_uses_monitor() {
        let handle = TickHandle::new(AtomicUsize::new(0));
        let out = handle.acquire(|v| {
            v.store(9, Ordering::Relaxed);
            v.load(Ordering::Relaxed)
        });
        assert_eq!(out, 9);
        assert_eq!(handle.foreign_acquires(), 1);
    }

    #[test]
    fn acquire_is_mutually_exclusive() {
        let handle = Arc::new(TickHandle::new(Mutex::new(0u64)));
        let in_section = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                let in_section = Arc::clone(&in_section);
                thread::spawn(move || {
                    for _ in 0..50 {
                        handle.acquire(|cell| {
                            let concurrent = in_section.fetch_add(1, Ordering::SeqCst);
                            assert_eq!(concurrent, 0, "two callbacks in the section");
                            *cell.lock().unwrap() += 1;
                            thread::sleep(Duration::from_micros(50));
                            in_section.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(*handle.element().lock().unwrap(), 8 * 50);
    }

    #[test]
    fn scheduled_acquire_unowned_runs_inline() {
        let handle = TickHandle::new(AtomicUsize::new(0));
        handle.scheduled_acquire(|v| {
            v.store(3, Ordering::Relaxed);
        });
        assert_eq!(handle.element().load(Ordering::Relaxed), 3);
    }

    #[test]
    fn scheduled_acquire_enqueues_to_mailbox() {
        let handle = TickHandle::new(AtomicUsize::new(0));
        let (tx, rx) = crossbeam_channel::unbounded::<AcquireTask>();
        handle.owner().refresh(2, tx);

        handle.scheduled_acquire(|v| {
            v.store(11, Ordering::Relaxed);
        });
        // Deferred: nothing ran yet.
        assert_eq!(handle.element().load(Ordering::Relaxed), 0);

        // Drain the queue the way a worker would.
        let task = rx.try_recv().expect("task enqueued");
        task();
        assert_eq!(handle.element().load(Ordering::Relaxed), 11);
    }

    #[test]
    fn scheduled_acquire_falls_back_when_mailbox_closed() {
        let handle = TickHandle::new(AtomicUsize::new(0));
        let (tx, rx) = crossbeam_channel::unbounded::<AcquireTask>();
        handle.owner().refresh(0, tx);
        drop(rx);

        handle.scheduled_acquire(|v| {
            v.store(5, Ordering::Relaxed);
        });
        assert_eq!(handle.element().load(Ordering::Relaxed), 5);
    }

    #[test]
    fn clear_resets_owner() {
        let handle = TickHandle::new(());
        let (tx, _rx) = crossbeam_channel::unbounded::<AcquireTask>();
        handle.owner().refresh(4, tx);
        assert_eq!(handle.owner().current(), Some(WorkerId(4)));

        handle.owner().clear();
        assert_eq!(handle.owner().current(), None);
    }

    #[test]
    fn clones_share_state() {
        let a = TickHandle::new(AtomicUsize::new(0));
        let b = a.clone();
        assert!(a.same_handle(&b));
        a.acquire(|v| v.store(1, Ordering::Relaxed));
        assert_eq!(b.element().load(Ordering::Relaxed), 1);
        assert_eq!(b.foreign_acquires(), 1);
    }
}
