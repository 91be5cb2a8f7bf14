//! The shared refcounted state a race uses to learn when every participant —
//! winner and absorbed losers alike — has finished running.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::{Cell, RefCell};
use core::fmt;
use core::task::Waker;

use crate::cancel::CancellationKind;

struct Inner {
    /// Number of participants that have been armed but not yet reported
    /// completion. A plain `Cell` rather than an atomic, because a race's
    /// callbacks never run concurrently.
    live: Cell<usize>,
    waker: Cell<Option<Waker>>,
}

/// Shared handle held by the race state and cloned into every armed
/// participant's completion callback.
///
/// The race's own `poll` stays `Pending` until the last outstanding
/// participant calls [`Completion::complete`], at which point this object's
/// stored waker (the select future's own task) is woken so it can be polled
/// once more to finalize and return.
pub struct SharedCompletionState {
    inner: Rc<Inner>,
}

impl SharedCompletionState {
    /// Creates a fresh, empty completion state.
    pub fn new() -> Self {
        Self { inner: Rc::new(Inner { live: Cell::new(0), waker: Cell::new(None) }) }
    }

    /// Registers one more outstanding participant and returns its
    /// [`Completion`] handle.
    ///
    /// Call this exactly once per participant successfully armed.
    pub fn register(&self) -> Completion {
        self.register_with(|| {})
    }

    /// Like [`register`](Self::register), but runs `on_complete` once,
    /// before the refcount is decremented.
    ///
    /// This is how a race attaches index-aware commit logic (see
    /// `race.rs`) to an otherwise opaque completion token without the
    /// [`Participant`](crate::Participant) trait itself needing to know
    /// about race indices.
    pub fn register_with(&self, on_complete: impl FnOnce() + 'static) -> Completion {
        self.inner.live.set(self.inner.live.get() + 1);
        Completion { inner: self.inner.clone(), on_complete: RefCell::new(Some(Box::new(on_complete))) }
    }

    /// Reports whether any armed participant has yet to complete.
    pub fn has_pending(&self) -> bool {
        self.inner.live.get() > 0
    }

    /// Stores the waker to invoke once the last outstanding participant
    /// completes. Replaces any previously stored waker, matching
    /// `Future::poll`'s contract of only needing to wake the most recent one.
    pub fn set_waker(&self, waker: &Waker) {
        let replace = match self.take_waker() {
            Some(existing) if existing.will_wake(waker) => existing,
            _ => waker.clone(),
        };
        self.inner.waker.set(Some(replace));
    }

    fn take_waker(&self) -> Option<Waker> {
        let waker = self.inner.waker.take();
        if let Some(waker) = &waker {
            self.inner.waker.set(Some(waker.clone()));
        }
        waker
    }
}

impl Default for SharedCompletionState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SharedCompletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCompletionState")
            .field("live", &self.inner.live.get())
            .finish()
    }
}

/// A no-payload token a participant's callback invokes to report that it has
/// finished running (whether it won, lost and unwound cleanly, or lost and
/// was absorbed without being interruptible).
///
/// This carries no result: the value (if any) is fetched separately, by
/// calling [`Participant::finalize`](crate::Participant::finalize) on the
/// original participant, which is expected to have cached it internally.
#[must_use = "a participant must call complete() exactly once or the race never finishes"]
pub struct Completion {
    inner: Rc<Inner>,
    on_complete: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Completion {
    /// Reports completion: runs the race's own commit hook (if any), then
    /// decrements the outstanding-participant count and wakes the race's
    /// task if this was the last one.
    pub fn complete(self) {
        if let Some(on_complete) = self.on_complete.borrow_mut().take() {
            on_complete();
        }
        let live = self.inner.live.get() - 1;
        self.inner.live.set(live);
        if live == 0 {
            if let Some(waker) = self.inner.waker.take() {
                waker.wake();
            }
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

/// A handle an embedder's own cancellation plumbing (a token, a signal
/// handler, a parent `select`) can use to forward external cancellation into
/// every currently-live participant of a race.
///
/// Obtained from a race future via its `cancel_handle()` method, so it can
/// be installed on the caller's own cancellation token independently of
/// polling the race itself.
pub struct CancelHandle {
    emit: Rc<dyn Fn(CancellationKind)>,
    len: usize,
}

impl CancelHandle {
    pub(crate) fn new(len: usize, emit: Rc<dyn Fn(CancellationKind)>) -> Self {
        Self { emit, len }
    }

    /// Forwards `kind` to every participant still armed at the time of the
    /// call. Participants that have already committed or finalized ignore
    /// this (their signal was [`clear`](crate::cancel::CancellationSignal::clear)ed).
    pub fn cancel(&self, kind: CancellationKind) {
        (self.emit)(kind);
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle").field("participants", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use core::task::{Context, RawWaker, RawWakerVTable, Waker};

    fn noop_waker() -> Waker {
        unsafe fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(core::ptr::null(), &VTABLE)
        }
        unsafe fn noop(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &VTABLE)) }
    }

    #[test]
    fn wakes_only_after_last_completion() {
        let state = SharedCompletionState::new();
        let waker = noop_waker();
        let cx = Context::from_waker(&waker);
        state.set_waker(cx.waker());

        let c1 = state.register();
        let c2 = state.register();
        assert!(state.has_pending());

        c1.complete();
        assert!(state.has_pending());

        c2.complete();
        assert!(!state.has_pending());
    }

    #[test]
    fn cancel_handle_emits_to_every_signal() {
        let signals: Rc<Vec<crate::cancel::CancellationSignal>> = Rc::new(vec![
            crate::cancel::CancellationSignal::new(),
            crate::cancel::CancellationSignal::new(),
        ]);
        let seen = Rc::new(Cell::new(0usize));
        for signal in signals.iter() {
            let seen = seen.clone();
            signal.set_handler(move |_| seen.set(seen.get() + 1));
        }
        let len = signals.len();
        let emit_signals = signals.clone();
        let handle = CancelHandle::new(
            len,
            Rc::new(move |kind| {
                for signal in emit_signals.iter() {
                    signal.emit(kind);
                }
            }),
        );
        handle.cancel(CancellationKind::Terminal);
        assert_eq!(seen.get(), 2);
    }
}
