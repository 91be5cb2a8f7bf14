//! The adapter trait a concurrently-running operation implements so it can
//! take part in a [`select`](crate) race, plus a handful of concrete
//! adapters, including one that lets a `select` race itself be raced inside
//! another.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use crate::cancel::CancellationSignal;
use crate::shared::Completion;

/// A handle to an already-running, eagerly-started operation that can be
/// raced against others.
///
/// Unlike [`core::future::Future`], a `Participant` represents something
/// that may already be under way independent of whether anyone is polling
/// it, so a result can be observed as already available before the race
/// ever starts. Each method corresponds to one step of the race's arming
/// pass:
///
/// - [`probe`](Self::probe) is a non-blocking, side-effect-free peek.
/// - [`arm`](Self::arm) registers interest; from this point on, the
///   participant must call `completion.complete()` exactly once, whenever it
///   next knows the answer (synchronously from within `arm`, or later).
/// - [`finalize`](Self::finalize) is called on the winner only, after its
///   completion has fired, to fetch the cached result.
pub trait Participant {
    /// The value produced when this participant wins the race.
    type Output;

    /// Whether this participant can unwind cleanly before it has produced
    /// any observable side effect, i.e. whether it may receive
    /// [`CancellationKind::InterruptAwait`](crate::cancel::CancellationKind::InterruptAwait)
    /// instead of the race's configured kind when it loses before `arm` was
    /// ever called on it.
    const INTERRUPTIBLE: bool;

    /// Non-blocking check for an already-available result.
    ///
    /// Must not register a waker or otherwise cause this participant to be
    /// woken later; it is a pure peek, called once per index before any
    /// `arm` call in the same race.
    fn probe(&mut self) -> bool;

    /// Registers this participant in the race.
    ///
    /// Must arrange for `completion.complete()` to be called exactly once:
    /// either synchronously before `arm` returns if the result is already
    /// available at registration time, or later from whatever notifies this
    /// participant's own progress. `signal` delivers a cancellation request
    /// if this participant loses or the caller cancels the whole race.
    fn arm(&mut self, cx: &mut Context<'_>, signal: &CancellationSignal, completion: Completion);

    /// Fetches the cached result. Called at most once, only on the winning
    /// participant, only after its completion has fired.
    fn finalize(&mut self) -> Self::Output;
}

/// A participant that is ready immediately with a value already in hand.
///
/// `probe` always reports ready; `arm` is never expected to be called on a
/// participant a race has already observed ready, but is implemented
/// defensively by completing synchronously.
pub struct Ready<T> {
    value: Option<T>,
}

impl<T> Ready<T> {
    /// Wraps `value` as an already-completed participant.
    pub fn new(value: T) -> Self {
        Self { value: Some(value) }
    }
}

impl<T> Participant for Ready<T> {
    type Output = T;
    const INTERRUPTIBLE: bool = true;

    fn probe(&mut self) -> bool {
        self.value.is_some()
    }

    fn arm(&mut self, _cx: &mut Context<'_>, _signal: &CancellationSignal, completion: Completion) {
        completion.complete();
    }

    fn finalize(&mut self) -> Self::Output {
        self.value.take().expect("Ready participant finalized twice")
    }
}

struct OneshotInner<T> {
    value: RefCell<Option<T>>,
    on_ready: RefCell<Option<Box<dyn FnOnce()>>>,
}

/// The participant half of a single-value channel, suitable for racing a
/// one-off asynchronous result against others.
///
/// [`Oneshot`] exposes the `Participant` contract, while [`OneshotSender`] is
/// the producer that a spawned task (or the caller) holds to eventually
/// deliver a value.
pub struct Oneshot<T> {
    inner: Rc<OneshotInner<T>>,
}

/// The producing half of a [`Oneshot`] participant.
pub struct OneshotSender<T> {
    inner: Rc<OneshotInner<T>>,
}

/// Creates a connected [`Oneshot`]/[`OneshotSender`] pair.
pub fn oneshot<T>() -> (Oneshot<T>, OneshotSender<T>) {
    let inner = Rc::new(OneshotInner { value: RefCell::new(None), on_ready: RefCell::new(None) });
    (Oneshot { inner: inner.clone() }, OneshotSender { inner })
}

impl<T> OneshotSender<T> {
    /// Delivers `value`, waking the race if a participant is currently
    /// armed and waiting on it.
    pub fn send(self, value: T) {
        *self.inner.value.borrow_mut() = Some(value);
        if let Some(on_ready) = self.inner.on_ready.borrow_mut().take() {
            on_ready();
        }
    }
}

impl<T> Participant for Oneshot<T> {
    type Output = T;
    const INTERRUPTIBLE: bool = true;

    fn probe(&mut self) -> bool {
        self.inner.value.borrow().is_some()
    }

    fn arm(&mut self, _cx: &mut Context<'_>, signal: &CancellationSignal, completion: Completion) {
        let slot = Rc::new(RefCell::new(Some(completion)));

        let ready_slot = slot.clone();
        *self.inner.on_ready.borrow_mut() = Some(Box::new(move || {
            if let Some(completion) = ready_slot.borrow_mut().take() {
                completion.complete();
            }
        }));

        let cancel_slot = slot;
        signal.set_handler(move |_kind| {
            if let Some(completion) = cancel_slot.borrow_mut().take() {
                completion.complete();
            }
        });
    }

    fn finalize(&mut self) -> Self::Output {
        self.inner
            .value
            .borrow_mut()
            .take()
            .expect("Oneshot participant won without a value ever being sent")
    }
}

/// A participant backed by work that cannot be cleanly unwound once armed —
/// for example a write already in flight that must be allowed to finish so
/// it does not leave a half-written record behind.
///
/// Unlike [`Oneshot`], a [`Pending`]'s cancellation handler cannot make it
/// stop early: losing the race, or the caller cancelling, only changes what
/// kind of [`CancellationKind`](crate::cancel::CancellationKind) it
/// observes, never whether it completes. The race still calls its
/// [`finalize`](Participant::finalize) once it loses, to drop the produced
/// value and absorb whatever side effect it carried.
pub struct Pending<T> {
    inner: Rc<OneshotInner<T>>,
}

/// Creates a connected [`Pending`]/[`OneshotSender`] pair.
///
/// Shares [`OneshotSender`] with [`oneshot`] since delivering the value works
/// the same way regardless of whether the receiving side can be interrupted.
pub fn pending<T>() -> (Pending<T>, OneshotSender<T>) {
    let inner = Rc::new(OneshotInner { value: RefCell::new(None), on_ready: RefCell::new(None) });
    (Pending { inner: inner.clone() }, OneshotSender { inner })
}

impl<T> Participant for Pending<T> {
    type Output = T;
    const INTERRUPTIBLE: bool = false;

    fn probe(&mut self) -> bool {
        self.inner.value.borrow().is_some()
    }

    fn arm(&mut self, _cx: &mut Context<'_>, signal: &CancellationSignal, completion: Completion) {
        let slot = Rc::new(RefCell::new(Some(completion)));

        let ready_slot = slot.clone();
        *self.inner.on_ready.borrow_mut() = Some(Box::new(move || {
            if let Some(completion) = ready_slot.borrow_mut().take() {
                completion.complete();
            }
        }));

        // A non-interruptible participant still observes the request, but
        // cannot act on it by stopping early: it only completes once the
        // producing side actually sends, via the `on_ready` callback above.
        signal.set_handler(|kind| {
            crate::trace!("select: pending participant observed {kind} but cannot unwind early");
        });
    }

    fn finalize(&mut self) -> Self::Output {
        self.inner.value.borrow_mut().take().expect("Pending participant finalized before completion")
    }
}

struct NestedInner<F: Future> {
    future: RefCell<Option<F>>,
    output: RefCell<Option<F::Output>>,
    completion: RefCell<Option<Completion>>,
}

/// Wraps any other [`Future`] (including another `select` race, such as
/// [`crate::variadic::Select2`] or [`crate::range::SelectRange`]) so it can
/// be raced as a participant in its own right.
///
/// This is what makes `select` composable: a `select` future already
/// implements `Future`, and `Nested` is the adapter from "a plain `Future`"
/// to "a `Participant`" that every other adapter in this module already is.
/// Since an arbitrary `Future` offers no way to peek at readiness without
/// polling it, `probe` never drives it forward and only ever reports true
/// once a previous `arm` has already cached a result. `arm` drives the
/// wrapped future with a dedicated waker that re-polls it and completes the
/// race as soon as it resolves, whether that happens synchronously or later.
pub struct Nested<F: Future> {
    inner: Rc<NestedInner<F>>,
}

/// Wraps `future` as a participant so it can be raced inside another
/// `select`.
pub fn nested<F: Future + Unpin + 'static>(future: F) -> Nested<F> {
    Nested {
        inner: Rc::new(NestedInner {
            future: RefCell::new(Some(future)),
            output: RefCell::new(None),
            completion: RefCell::new(None),
        }),
    }
}

fn poll_nested<F: Future + Unpin + 'static>(inner: &Rc<NestedInner<F>>) {
    let waker = nested_waker(inner.clone());
    let mut cx = Context::from_waker(&waker);
    let ready = match inner.future.borrow_mut().as_mut() {
        Some(future) => Pin::new(future).poll(&mut cx),
        None => return,
    };
    if let Poll::Ready(value) = ready {
        *inner.future.borrow_mut() = None;
        *inner.output.borrow_mut() = Some(value);
        if let Some(completion) = inner.completion.borrow_mut().take() {
            completion.complete();
        }
    }
}

fn nested_waker<F: Future + Unpin + 'static>(inner: Rc<NestedInner<F>>) -> Waker {
    let ptr = Rc::into_raw(inner).cast::<()>();
    unsafe { Waker::from_raw(RawWaker::new(ptr, nested_vtable::<F>())) }
}

fn nested_vtable<F: Future + Unpin + 'static>() -> &'static RawWakerVTable {
    unsafe fn clone<F: Future + Unpin + 'static>(ptr: *const ()) -> RawWaker {
        Rc::increment_strong_count(ptr.cast::<NestedInner<F>>());
        RawWaker::new(ptr, nested_vtable::<F>())
    }
    unsafe fn wake<F: Future + Unpin + 'static>(ptr: *const ()) {
        let inner = Rc::from_raw(ptr.cast::<NestedInner<F>>());
        poll_nested(&inner);
    }
    unsafe fn wake_by_ref<F: Future + Unpin + 'static>(ptr: *const ()) {
        let inner = Rc::from_raw(ptr.cast::<NestedInner<F>>());
        poll_nested(&inner);
        // Borrow, don't consume: give back the reference count we took in
        // `from_raw` above.
        core::mem::forget(inner.clone());
    }
    unsafe fn drop_waker<F: Future + Unpin + 'static>(ptr: *const ()) {
        drop(Rc::from_raw(ptr.cast::<NestedInner<F>>()));
    }
    &RawWakerVTable::new(clone::<F>, wake::<F>, wake_by_ref::<F>, drop_waker::<F>)
}

impl<F: Future + Unpin + 'static> Participant for Nested<F> {
    type Output = F::Output;
    // An arbitrary wrapped future has no generic way to unwind mid-flight;
    // cancellation is observed but cannot stop it early, the same way
    // `Pending` behaves.
    const INTERRUPTIBLE: bool = false;

    fn probe(&mut self) -> bool {
        self.inner.output.borrow().is_some()
    }

    fn arm(&mut self, _cx: &mut Context<'_>, signal: &CancellationSignal, completion: Completion) {
        *self.inner.completion.borrow_mut() = Some(completion);
        signal.set_handler(|kind| {
            crate::trace!("select: nested participant observed {kind} but cannot unwind early");
        });
        poll_nested(&self.inner);
    }

    fn finalize(&mut self) -> Self::Output {
        self.inner.output.borrow_mut().take().expect("Nested participant finalized before completion")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationKind;
    use crate::shared::SharedCompletionState;
    use core::task::{RawWaker, RawWakerVTable, Waker};

    fn noop_waker() -> Waker {
        unsafe fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(core::ptr::null(), &VTABLE)
        }
        unsafe fn noop(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &VTABLE)) }
    }

    #[test]
    fn ready_probes_true_and_finalizes() {
        let mut p = Ready::new(7);
        assert!(p.probe());
        assert_eq!(p.finalize(), 7);
    }

    #[test]
    fn oneshot_probe_false_until_sent() {
        let (mut rx, tx) = oneshot::<u32>();
        assert!(!rx.probe());
        tx.send(42);
        assert!(rx.probe());
        assert_eq!(rx.finalize(), 42);
    }

    #[test]
    fn oneshot_completes_after_arm_when_sent_later() {
        let (mut rx, tx) = oneshot::<u32>();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let state = SharedCompletionState::new();
        let signal = CancellationSignal::new();
        let completion = state.register();

        rx.arm(&mut cx, &signal, completion);
        assert!(state.has_pending());

        tx.send(9);
        assert!(!state.has_pending());
        assert_eq!(rx.finalize(), 9);
    }

    #[test]
    fn oneshot_cancellation_completes_without_value() {
        let (mut rx, _tx) = oneshot::<u32>();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let state = SharedCompletionState::new();
        let signal = CancellationSignal::new();
        let completion = state.register();

        rx.arm(&mut cx, &signal, completion);
        signal.emit(CancellationKind::Terminal);
        assert!(!state.has_pending());
    }

    #[test]
    fn pending_is_not_interruptible() {
        assert!(!Pending::<u32>::INTERRUPTIBLE);
    }

    #[test]
    fn pending_runs_to_completion_despite_cancellation() {
        let (mut rx, tx) = pending::<u32>();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let state = SharedCompletionState::new();
        let signal = CancellationSignal::new();
        let completion = state.register();

        rx.arm(&mut cx, &signal, completion);
        signal.emit(CancellationKind::Terminal);
        assert!(state.has_pending(), "a non-interruptible participant must not complete just from cancellation");

        tx.send(4);
        assert!(!state.has_pending());
        assert_eq!(rx.finalize(), 4);
    }

    #[test]
    fn nested_is_not_interruptible() {
        assert!(!Nested::<Ready<u32>>::INTERRUPTIBLE);
    }

    #[test]
    fn nested_probe_is_false_before_arming() {
        let mut p = nested(Ready::new(3u32));
        assert!(!p.probe());
    }

    #[test]
    fn nested_future_completes_synchronously() {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let state = SharedCompletionState::new();
        let signal = CancellationSignal::new();
        let completion = state.register();

        let mut p = nested(Ready::new(11u32));
        p.arm(&mut cx, &signal, completion);
        assert!(!state.has_pending(), "an already-ready wrapped future must complete during arm");
        assert_eq!(p.finalize(), 11);
    }

    #[test]
    fn nested_future_completes_after_its_own_waker_fires() {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let state = SharedCompletionState::new();
        let signal = CancellationSignal::new();
        let completion = state.register();

        let (rx0, tx0) = oneshot::<u32>();
        let (rx1, _tx1) = oneshot::<u32>();
        let mut p = nested(crate::variadic::select2(rx0, rx1));
        p.arm(&mut cx, &signal, completion);
        assert!(state.has_pending(), "the wrapped race has not resolved yet");

        tx0.send(42);
        assert!(!state.has_pending(), "sending must drive the wrapped race to completion");
        let outcome = p.finalize();
        assert_eq!(outcome.index(), 0);
    }
}
