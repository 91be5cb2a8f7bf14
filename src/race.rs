//! Race bookkeeping shared by the fixed-arity (heterogeneous tuple) and
//! dynamic-length (homogeneous range) `select` forms.
//!
//! Kept as two distinct types, `FixedRace<N>` and `DynRace`, rather than one
//! generic implementation: the two forms need different backing storage (a
//! `[T; N]` the compiler can size at compile time for the tuple forms, a
//! `Vec<T>` for the range form), and duplicating the handful of bookkeeping
//! methods is cheaper than forcing both through one generic abstraction.

use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::task::Waker;

use crate::cancel::{CancellationKind, CancellationSignal};
use crate::shared::{CancelHandle, Completion, SharedCompletionState};

/// Fixed-arity race state for `select2`/`select3`/`select4`.
pub(crate) struct FixedRace<const N: usize> {
    core: Rc<Core<[CancellationSignal; N]>>,
}

/// Dynamic-length race state for [`crate::range::SelectRange`].
pub(crate) struct DynRace {
    core: Rc<Core<Vec<CancellationSignal>>>,
}

struct Core<S> {
    signals: S,
    /// Per-index `INTERRUPTIBLE` flag: whether a losing participant at that
    /// index is owed the `InterruptAwait` courtesy ahead of the race's
    /// configured cancellation kind.
    interruptible: Vec<bool>,
    /// Set for an index once its probe reported true. Consulted during
    /// resume to decide which losers must still be finalized.
    ready: RefCell<Vec<bool>>,
    /// Set for an index once `arm` has been invoked on it, tracked per-index
    /// rather than as a single high-water mark since losers can be skipped
    /// mid-pass.
    armed: RefCell<Vec<bool>>,
    winner: Cell<Option<usize>>,
    kind: CancellationKind,
    state: SharedCompletionState,
}

impl<const N: usize> FixedRace<N> {
    pub(crate) fn new(kind: CancellationKind, interruptible: [bool; N]) -> Self {
        Self {
            core: Rc::new(Core {
                signals: core::array::from_fn(|_| CancellationSignal::new()),
                interruptible: interruptible.to_vec(),
                ready: RefCell::new(vec![false; N]),
                armed: RefCell::new(vec![false; N]),
                winner: Cell::new(None),
                kind,
                state: SharedCompletionState::new(),
            }),
        }
    }

    pub(crate) fn signal(&self, index: usize) -> &CancellationSignal {
        &self.core.signals[index]
    }

    pub(crate) fn winner(&self) -> Option<usize> {
        self.core.winner.get()
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.core.state.has_pending()
    }

    pub(crate) fn set_waker(&self, waker: &Waker) {
        self.core.state.set_waker(waker);
    }

    pub(crate) fn kind(&self) -> CancellationKind {
        self.core.kind
    }

    /// Commits `index` as the winner without going through a completion
    /// token, for a participant found ready during the probe pass — it was
    /// never armed, so there is nothing to cancel.
    pub(crate) fn force_winner(&self, index: usize) {
        self.core.winner.set(Some(index));
    }

    pub(crate) fn mark_ready(&self, index: usize) {
        self.core.ready.borrow_mut()[index] = true;
    }

    pub(crate) fn is_ready(&self, index: usize) -> bool {
        self.core.ready.borrow()[index]
    }

    pub(crate) fn mark_armed(&self, index: usize) {
        self.core.armed.borrow_mut()[index] = true;
    }

    pub(crate) fn is_armed(&self, index: usize) -> bool {
        self.core.armed.borrow()[index]
    }

    /// Reports whether any index below `index` already committed a winner,
    /// i.e. whether probing/arming `index` itself would be superfluous.
    pub(crate) fn winner_set(&self) -> bool {
        self.core.winner.get().is_some()
    }

    /// Returns a completion token for `index`. Whichever registered
    /// completion fires first while no winner is set commits `index` as the
    /// winner and fires every other participant's cancellation signal with
    /// the race's configured kind.
    pub(crate) fn register(&self, index: usize) -> Completion {
        let core = self.core.clone();
        self.core
            .state
            .register_with(move || commit(&core.winner, &core.signals, &core.interruptible, core.kind, index))
    }

    /// Builds a handle an embedder can use to forward its own cancellation
    /// into every participant of this race.
    pub(crate) fn cancel_handle(&self) -> CancelHandle {
        let core = self.core.clone();
        CancelHandle::new(N, Rc::new(move |kind| cancel_all(&core.signals, &core.interruptible, kind)))
    }
}

impl DynRace {
    pub(crate) fn new(kind: CancellationKind, len: usize, interruptible: bool) -> Self {
        Self {
            core: Rc::new(Core {
                signals: (0..len).map(|_| CancellationSignal::new()).collect(),
                interruptible: vec![interruptible; len],
                ready: RefCell::new(vec![false; len]),
                armed: RefCell::new(vec![false; len]),
                winner: Cell::new(None),
                kind,
                state: SharedCompletionState::new(),
            }),
        }
    }

    pub(crate) fn signal(&self, index: usize) -> &CancellationSignal {
        &self.core.signals[index]
    }

    pub(crate) fn winner(&self) -> Option<usize> {
        self.core.winner.get()
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.core.state.has_pending()
    }

    pub(crate) fn set_waker(&self, waker: &Waker) {
        self.core.state.set_waker(waker);
    }

    pub(crate) fn kind(&self) -> CancellationKind {
        self.core.kind
    }

    pub(crate) fn force_winner(&self, index: usize) {
        self.core.winner.set(Some(index));
    }

    pub(crate) fn mark_ready(&self, index: usize) {
        self.core.ready.borrow_mut()[index] = true;
    }

    pub(crate) fn is_ready(&self, index: usize) -> bool {
        self.core.ready.borrow()[index]
    }

    pub(crate) fn mark_armed(&self, index: usize) {
        self.core.armed.borrow_mut()[index] = true;
    }

    pub(crate) fn is_armed(&self, index: usize) -> bool {
        self.core.armed.borrow()[index]
    }

    pub(crate) fn winner_set(&self) -> bool {
        self.core.winner.get().is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.core.signals.len()
    }

    pub(crate) fn register(&self, index: usize) -> Completion {
        let core = self.core.clone();
        self.core
            .state
            .register_with(move || commit(&core.winner, &core.signals, &core.interruptible, core.kind, index))
    }

    /// Builds a handle an embedder can use to forward its own cancellation
    /// into every participant of this race.
    pub(crate) fn cancel_handle(&self) -> CancelHandle {
        let core = self.core.clone();
        let len = core.signals.len();
        CancelHandle::new(len, Rc::new(move |kind| cancel_all(&core.signals, &core.interruptible, kind)))
    }
}

/// Emits `kind` to every currently-live signal. A participant flagged
/// `INTERRUPTIBLE` first receives the courtesy
/// [`CancellationKind::InterruptAwait`] (a no-op on a signal whose handler
/// was never installed, or was already consumed by its own completion), then
/// the race's configured `kind`. Shared by [`CancelHandle`] and the
/// winner-commit path, since external cancellation and internal
/// winner-selection cancellation both just iterate every other signal.
fn cancel_all(signals: &[CancellationSignal], interruptible: &[bool], kind: CancellationKind) {
    for (signal, &interruptible) in signals.iter().zip(interruptible) {
        if interruptible {
            signal.emit(CancellationKind::InterruptAwait);
        }
        signal.emit(kind);
    }
}

/// Attempts to claim `index` as the winner; on success, cancels every other
/// participant with `kind` (preceded by `InterruptAwait` for interruptible
/// ones). A no-op if a winner was already committed (`index` is then simply
/// a loser whose result is discarded).
fn commit(
    winner: &Cell<Option<usize>>,
    signals: &[CancellationSignal],
    interruptible: &[bool],
    kind: CancellationKind,
    index: usize,
) {
    if winner.get().is_none() {
        winner.set(Some(index));
        crate::trace!("select: participant {index} committed as winner");
        for (i, (signal, &interruptible)) in signals.iter().zip(interruptible).enumerate() {
            if i != index {
                if interruptible {
                    signal.emit(CancellationKind::InterruptAwait);
                }
                signal.emit(kind);
            }
        }
    }
}

/// Decides, per index, whether arming should be skipped because a winner
/// already committed and the participant at that index is allowed to be
/// interrupted before ever starting. When true, the caller should skip this
/// index and continue arming the rest of the list.
#[inline]
pub(crate) fn should_skip_arming(winner_already_set: bool, interruptible: bool) -> bool {
    winner_already_set && interruptible
}
