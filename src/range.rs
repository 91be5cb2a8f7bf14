//! Homogeneous, dynamic-length `select` over a runtime-sized collection of
//! same-typed participants — the counterpart to `variadic.rs`'s fixed-arity
//! forms.

use alloc::vec::Vec;
use core::cell::Cell;
use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use futures_core::future::FusedFuture;

use crate::cancel::CancellationKind;
use crate::error::SelectError;
use crate::participant::Participant;
use crate::race::{should_skip_arming, DynRace};
use crate::shared::CancelHandle;

/// A race between a runtime-determined number of same-typed participants.
///
/// Resolves to `(index, output)`, identifying which participant in the
/// original collection won.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct SelectRange<P: Participant> {
    participants: Vec<P>,
    race: DynRace,
    armed: Cell<bool>,
    terminated: Cell<bool>,
}

impl<P: Participant> fmt::Debug for SelectRange<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectRange")
            .field("len", &self.participants.len())
            .field("winner", &self.race.winner())
            .finish_non_exhaustive()
    }
}

impl<P: Participant> SelectRange<P> {
    /// Returns a handle the caller can use to forward its own cancellation
    /// into every participant of this race, independent of polling it.
    ///
    /// An embedder installs this on its own cancellation token so that a
    /// caller cancellation reaches every currently-live participant.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.race.cancel_handle()
    }
}

impl<P: Participant> Unpin for SelectRange<P> {}

impl<P: Participant> Future for SelectRange<P> {
    type Output = (usize, P::Output);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = Pin::get_mut(self);

        if !this.armed.get() {
            this.armed.set(true);

            let mut found_ready: Option<usize> = None;
            for (i, participant) in this.participants.iter_mut().enumerate() {
                if should_skip_arming(found_ready.is_some(), P::INTERRUPTIBLE) {
                    // Once a winner is known, later interruptible
                    // participants are not probed at all, so any observable
                    // state from calling probe() can't leak out.
                    continue;
                }
                if participant.probe() {
                    this.race.mark_ready(i);
                    found_ready.get_or_insert(i);
                }
            }

            if let Some(winner) = found_ready {
                this.race.force_winner(winner);
            } else {
                for (i, participant) in this.participants.iter_mut().enumerate() {
                    if should_skip_arming(this.race.winner_set(), P::INTERRUPTIBLE) {
                        continue;
                    }
                    crate::trace!("select: arming participant {i}");
                    this.race.mark_armed(i);
                    let completion = this.race.register(i);
                    participant.arm(&mut *cx, this.race.signal(i), completion);
                    if let Some(winner) = this.race.winner() {
                        if winner != i {
                            crate::trace!("select: cancelling straggler {i}");
                            this.race.signal(i).emit(this.race.kind());
                        }
                    }
                }
            }
        }

        if this.race.has_pending() {
            this.race.set_waker(cx.waker());
            return Poll::Pending;
        }

        let winner = this.race.winner().expect("select range finished with no committed winner");
        for (i, participant) in this.participants.iter_mut().enumerate() {
            // Absorb the observable state of every loser that either had a
            // synchronously-ready result or could not be cleanly
            // interrupted once armed.
            if i != winner && (this.race.is_ready(i) || (this.race.is_armed(i) && !P::INTERRUPTIBLE)) {
                let _ = participant.finalize();
            }
        }
        this.terminated.set(true);
        Poll::Ready((winner, this.participants[winner].finalize()))
    }
}

impl<P: Participant> FusedFuture for SelectRange<P> {
    fn is_terminated(&self) -> bool {
        self.terminated.get()
    }
}

/// Races every participant in `participants`, cancelling losers with
/// [`CancellationKind::Terminal`].
///
/// Returns [`SelectError::EmptyInput`] if `participants` is empty.
pub fn select_range<P: Participant>(
    participants: impl IntoIterator<Item = P>,
) -> Result<SelectRange<P>, SelectError> {
    select_range_with_kind(participants, CancellationKind::Terminal)
}

/// Like [`select_range`], cancelling losers with the given `kind`.
pub fn select_range_with_kind<P: Participant>(
    participants: impl IntoIterator<Item = P>,
    kind: CancellationKind,
) -> Result<SelectRange<P>, SelectError> {
    let participants: Vec<P> = participants.into_iter().collect();
    if participants.is_empty() {
        return Err(SelectError::EmptyInput);
    }
    let race = DynRace::new(kind, participants.len(), P::INTERRUPTIBLE);
    Ok(SelectRange { participants, race, armed: Cell::new(false), terminated: Cell::new(false) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::{oneshot, pending, Pending, Ready};
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
    fn empty_range_is_rejected() {
        assert_eq!(select_range::<Ready<u32>>(Vec::new()).unwrap_err(), SelectError::EmptyInput);
    }

    #[test]
    fn lowest_ready_index_wins() {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = select_range(alloc::vec![Ready::new(1u32), Ready::new(2u32)]).unwrap();
        match Pin::new(&mut fut).poll(&mut cx) {
            Poll::Ready((index, value)) => {
                assert_eq!(index, 0);
                assert_eq!(value, 1);
            }
            Poll::Pending => panic!("expected immediate winner"),
        }
    }

    #[test]
    fn later_sender_wins_async_race() {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let (rx0, _tx0) = oneshot::<u32>();
        let (rx1, tx1) = oneshot::<u32>();
        let (rx2, _tx2) = oneshot::<u32>();
        let mut fut = select_range(alloc::vec![rx0, rx1, rx2]).unwrap();

        assert!(Pin::new(&mut fut).poll(&mut cx).is_pending());
        tx1.send(99);
        match Pin::new(&mut fut).poll(&mut cx) {
            Poll::Ready((index, value)) => {
                assert_eq!(index, 1);
                assert_eq!(value, 99);
            }
            Poll::Pending => panic!("expected winner after send"),
        }
    }

    #[test]
    fn non_interruptible_participants_are_all_probed_past_the_first_winner() {
        // A non-interruptible participant is still probed even after a
        // winner has already been found, since its probe may carry state
        // that must later be absorbed.
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let (p0, tx0) = pending::<u32>();
        let (p1, _tx1) = pending::<u32>();
        let (p2, tx2) = pending::<u32>();
        tx0.send(10);
        tx2.send(30);
        let mut fut = select_range::<Pending<u32>>(alloc::vec![p0, p1, p2]).unwrap();
        match Pin::new(&mut fut).poll(&mut cx) {
            Poll::Ready((index, value)) => {
                assert_eq!(index, 0, "the first ready participant still wins");
                assert_eq!(value, 10);
            }
            Poll::Pending => panic!("two pre-sent participants must resolve without suspending"),
        }
    }
}
