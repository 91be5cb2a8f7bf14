//! Cancellation signalling between a [`select`](crate) race and its
//! participants.

use alloc::boxed::Box;
use core::cell::{Cell, RefCell};
use core::fmt;

/// The strength of a cancellation request delivered to a losing or
/// externally-cancelled participant.
///
/// A participant that is [`INTERRUPTIBLE`](crate::Participant::INTERRUPTIBLE)
/// may additionally observe [`InterruptAwait`](CancellationKind::InterruptAwait),
/// a courtesy notification meaning "you were never armed at all" that such a
/// participant can use to skip any work it would otherwise have done to
/// unwind a started operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancellationKind {
    /// The operation must stop and may discard any partial progress.
    Terminal,
    /// The operation should stop but must preserve consistency of any state
    /// it has already mutated (e.g. flush buffered output before closing).
    Partial,
    /// The participant was never armed; it may treat this as a no-op.
    InterruptAwait,
}

impl fmt::Display for CancellationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Terminal => "terminal",
            Self::Partial => "partial",
            Self::InterruptAwait => "interrupt-await",
        };
        f.write_str(name)
    }
}

/// A one-shot cancellation channel installed on an armed participant.
///
/// A single object covers both the signal and slot halves, since this crate
/// has no executor-provided slot type of its own: `arm` installs a handler
/// via [`CancellationSignal::set_handler`], and the race state fires it at
/// most once per kind via [`CancellationSignal::emit`].
pub struct CancellationSignal {
    handler: RefCell<Option<Box<dyn FnMut(CancellationKind)>>>,
    emitted: Cell<u8>,
}

fn kind_bit(kind: CancellationKind) -> u8 {
    match kind {
        CancellationKind::Terminal => 0b001,
        CancellationKind::Partial => 0b010,
        CancellationKind::InterruptAwait => 0b100,
    }
}

impl CancellationSignal {
    /// Creates a signal with no handler installed.
    pub fn new() -> Self {
        Self { handler: RefCell::new(None), emitted: Cell::new(0) }
    }

    /// Installs (or replaces) the handler invoked by a future [`emit`](Self::emit).
    ///
    /// A participant's `arm` implementation calls this to learn when it
    /// should stop.
    pub fn set_handler(&self, handler: impl FnMut(CancellationKind) + 'static) {
        *self.handler.borrow_mut() = Some(Box::new(handler));
    }

    /// Removes any installed handler without invoking it.
    ///
    /// Called once a participant has committed or finalized, so a later,
    /// stale `emit` (e.g. from an overlapping cancel-all pass) is silently
    /// dropped instead of running against torn-down state.
    pub fn clear(&self) {
        self.handler.borrow_mut().take();
    }

    /// Fires the installed handler with the given `kind`, unless that exact
    /// `kind` has already been delivered by an earlier call.
    ///
    /// Idempotent per kind: a caller that cancels the same still-pending
    /// race twice (e.g. two [`CancelHandle::cancel`](crate::shared::CancelHandle::cancel)
    /// calls before any participant completes) reaches each live handler's
    /// `kind` exactly once, not once per call. A signal with no handler
    /// installed (never armed, or already [`clear`](Self::clear)ed) is
    /// always a no-op regardless of this tracking.
    pub fn emit(&self, kind: CancellationKind) {
        let bit = kind_bit(kind);
        if self.emitted.get() & bit != 0 {
            return;
        }
        self.emitted.set(self.emitted.get() | bit);
        if let Some(handler) = self.handler.borrow_mut().as_mut() {
            handler(kind);
        }
    }

    /// Reports whether a handler is currently installed.
    pub fn is_armed(&self) -> bool {
        self.handler.borrow().is_some()
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("armed", &self.is_armed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec::Vec;

    #[test]
    fn emit_without_handler_is_noop() {
        let signal = CancellationSignal::new();
        signal.emit(CancellationKind::Terminal);
    }

    #[test]
    fn emit_invokes_installed_handler_once() {
        let signal = CancellationSignal::new();
        let seen: Rc<Cell<Option<CancellationKind>>> = Rc::new(Cell::new(None));
        let seen_handler = seen.clone();
        signal.set_handler(move |kind| seen_handler.set(Some(kind)));
        assert!(signal.is_armed());
        signal.emit(CancellationKind::Partial);
        assert_eq!(seen.get(), Some(CancellationKind::Partial));
    }

    #[test]
    fn clear_prevents_later_emit() {
        let signal = CancellationSignal::new();
        let fired = Rc::new(Cell::new(false));
        let fired_handler = fired.clone();
        signal.set_handler(move |_| fired_handler.set(true));
        signal.clear();
        assert!(!signal.is_armed());
        signal.emit(CancellationKind::Terminal);
        assert!(!fired.get());
    }

    #[test]
    fn repeated_emit_of_the_same_kind_is_a_noop() {
        let signal = CancellationSignal::new();
        let count = Rc::new(Cell::new(0usize));
        let count_handler = count.clone();
        signal.set_handler(move |_| count_handler.set(count_handler.get() + 1));

        signal.emit(CancellationKind::Partial);
        signal.emit(CancellationKind::Partial);
        signal.emit(CancellationKind::Partial);

        assert_eq!(count.get(), 1, "a kind already delivered must not be delivered again");
    }

    #[test]
    fn distinct_kinds_each_still_fire_once() {
        let signal = CancellationSignal::new();
        let seen: Rc<RefCell<Vec<CancellationKind>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_handler = seen.clone();
        signal.set_handler(move |kind| seen_handler.borrow_mut().push(kind));

        signal.emit(CancellationKind::InterruptAwait);
        signal.emit(CancellationKind::Terminal);
        // Repeating both must not add further entries.
        signal.emit(CancellationKind::InterruptAwait);
        signal.emit(CancellationKind::Terminal);

        assert_eq!(*seen.borrow(), alloc::vec![CancellationKind::InterruptAwait, CancellationKind::Terminal]);
    }
}
