//! Fixed-arity heterogeneous `select` over 2-4 participants of different
//! types, generated with `macro_rules!` rather than hand-written once per
//! arity: Rust has no variadic generics, so per-arity generated code is the
//! idiomatic way to cover a small, fixed set of arities.

use core::cell::Cell;
use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use futures_core::future::FusedFuture;

use crate::cancel::CancellationKind;
use crate::participant::Participant;
use crate::race::{should_skip_arming, FixedRace};
use crate::shared::CancelHandle;

macro_rules! select_arity {
    (
        $struct_name:ident, $outcome_name:ident, $arity:expr,
        < $($p:ident : $P:ident),+ >,
        { $($idx:tt => $variant:ident),+ }
    ) => {
        /// The outcome of a
        #[doc = concat!("[`", stringify!($struct_name), "`].")]
        /// Identifies which participant committed, carrying its result.
        pub enum $outcome_name<$($P: Participant),+> {
            $(
                #[allow(missing_docs)]
                $variant($P::Output),
            )+
        }

        impl<$($P: Participant),+> $outcome_name<$($P),+> {
            /// The index (0-based, in argument order) of the participant
            /// that won the race.
            pub fn index(&self) -> usize {
                match self {
                    $(Self::$variant(_) => $idx,)+
                }
            }
        }

        impl<$($P),+> fmt::Debug for $outcome_name<$($P),+>
        where
            $($P: Participant, $P::Output: fmt::Debug),+
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant(value) => f.debug_tuple(stringify!($variant)).field(value).finish(),)+
                }
            }
        }

        /// A race between
        #[doc = concat!(stringify!($arity), " differently-typed participants.")]
        #[must_use = "futures do nothing unless you `.await` or poll them"]
        pub struct $struct_name<$($P: Participant),+> {
            $($p: $P,)+
            race: FixedRace<$arity>,
            armed: Cell<bool>,
            terminated: Cell<bool>,
        }

        impl<$($P: Participant),+> fmt::Debug for $struct_name<$($P),+> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($struct_name))
                    .field("winner", &self.race.winner())
                    .finish_non_exhaustive()
            }
        }

        impl<$($P: Participant),+> $struct_name<$($P),+> {
            /// Returns a handle the caller can use to forward its own
            /// cancellation into every participant of this race,
            /// independent of polling it.
            pub fn cancel_handle(&self) -> CancelHandle {
                self.race.cancel_handle()
            }
        }

        impl<$($P: Participant),+> Unpin for $struct_name<$($P),+> {}

        impl<$($P: Participant),+> Future for $struct_name<$($P),+> {
            type Output = $outcome_name<$($P),+>;

            fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
                let this = Pin::get_mut(self);

                if !this.armed.get() {
                    this.armed.set(true);

                    let mut found_ready: Option<usize> = None;
                    $(
                        {
                            // Once a winner is known, later interruptible
                            // participants are not probed at all, so any
                            // observable state from calling probe() can't
                            // leak out.
                            if !should_skip_arming(found_ready.is_some(), <$P as Participant>::INTERRUPTIBLE) {
                                if this.$p.probe() {
                                    this.race.mark_ready($idx);
                                    found_ready.get_or_insert($idx);
                                }
                            }
                        }
                    )+

                    if let Some(winner) = found_ready {
                        this.race.force_winner(winner);
                    } else {
                        $(
                            {
                                if !should_skip_arming(this.race.winner_set(), <$P as Participant>::INTERRUPTIBLE) {
                                    crate::trace!("select: arming participant {}", $idx);
                                    this.race.mark_armed($idx);
                                    let completion = this.race.register($idx);
                                    this.$p.arm(&mut *cx, this.race.signal($idx), completion);
                                    if let Some(winner) = this.race.winner() {
                                        if winner != $idx {
                                            crate::trace!("select: cancelling straggler {}", $idx);
                                            this.race.signal($idx).emit(this.race.kind());
                                        }
                                    }
                                }
                            }
                        )+
                    }
                }

                if this.race.has_pending() {
                    this.race.set_waker(cx.waker());
                    return Poll::Pending;
                }

                let winner = this.race.winner().expect("select race finished with no committed winner");
                $(
                    // Absorb the observable state of every loser that either
                    // had a synchronously-ready result or could not be
                    // cleanly interrupted once armed.
                    if $idx != winner
                        && (this.race.is_ready($idx) || (this.race.is_armed($idx) && !<$P as Participant>::INTERRUPTIBLE))
                    {
                        let _ = this.$p.finalize();
                    }
                )+
                this.terminated.set(true);
                match winner {
                    $($idx => Poll::Ready($outcome_name::$variant(this.$p.finalize())),)+
                    _ => unreachable!("select race finished with no committed winner"),
                }
            }
        }

        impl<$($P: Participant),+> FusedFuture for $struct_name<$($P),+> {
            fn is_terminated(&self) -> bool {
                self.terminated.get()
            }
        }
    };
}

select_arity!(Select2, Select2Outcome, 2, <p0: P0, p1: P1>, { 0 => First, 1 => Second });
select_arity!(Select3, Select3Outcome, 3, <p0: P0, p1: P1, p2: P2>, { 0 => First, 1 => Second, 2 => Third });
select_arity!(
    Select4, Select4Outcome, 4,
    <p0: P0, p1: P1, p2: P2, p3: P3>,
    { 0 => First, 1 => Second, 2 => Third, 3 => Fourth }
);

/// Races two participants, cancelling the loser with
/// [`CancellationKind::Terminal`].
pub fn select2<P0: Participant, P1: Participant>(p0: P0, p1: P1) -> Select2<P0, P1> {
    select2_with_kind(p0, p1, CancellationKind::Terminal)
}

/// Like [`select2`], cancelling the loser with the given `kind`.
pub fn select2_with_kind<P0: Participant, P1: Participant>(
    p0: P0,
    p1: P1,
    kind: CancellationKind,
) -> Select2<P0, P1> {
    let interruptible = [P0::INTERRUPTIBLE, P1::INTERRUPTIBLE];
    Select2 {
        p0,
        p1,
        race: FixedRace::new(kind, interruptible),
        armed: Cell::new(false),
        terminated: Cell::new(false),
    }
}

/// Races three participants, cancelling losers with
/// [`CancellationKind::Terminal`].
pub fn select3<P0: Participant, P1: Participant, P2: Participant>(
    p0: P0,
    p1: P1,
    p2: P2,
) -> Select3<P0, P1, P2> {
    select3_with_kind(p0, p1, p2, CancellationKind::Terminal)
}

/// Like [`select3`], cancelling losers with the given `kind`.
pub fn select3_with_kind<P0: Participant, P1: Participant, P2: Participant>(
    p0: P0,
    p1: P1,
    p2: P2,
    kind: CancellationKind,
) -> Select3<P0, P1, P2> {
    let interruptible = [P0::INTERRUPTIBLE, P1::INTERRUPTIBLE, P2::INTERRUPTIBLE];
    Select3 {
        p0,
        p1,
        p2,
        race: FixedRace::new(kind, interruptible),
        armed: Cell::new(false),
        terminated: Cell::new(false),
    }
}

/// Races four participants, cancelling losers with
/// [`CancellationKind::Terminal`].
pub fn select4<P0: Participant, P1: Participant, P2: Participant, P3: Participant>(
    p0: P0,
    p1: P1,
    p2: P2,
    p3: P3,
) -> Select4<P0, P1, P2, P3> {
    select4_with_kind(p0, p1, p2, p3, CancellationKind::Terminal)
}

/// Like [`select4`], cancelling losers with the given `kind`.
pub fn select4_with_kind<P0: Participant, P1: Participant, P2: Participant, P3: Participant>(
    p0: P0,
    p1: P1,
    p2: P2,
    p3: P3,
    kind: CancellationKind,
) -> Select4<P0, P1, P2, P3> {
    let interruptible = [P0::INTERRUPTIBLE, P1::INTERRUPTIBLE, P2::INTERRUPTIBLE, P3::INTERRUPTIBLE];
    Select4 {
        p0,
        p1,
        p2,
        p3,
        race: FixedRace::new(kind, interruptible),
        armed: Cell::new(false),
        terminated: Cell::new(false),
    }
}
