//! A transactional `select` primitive for single-threaded cooperative
//! executors.
//!
//! `select-core` races a handful of independently-progressing
//! [`Participant`]s against each other and resolves to the first one that
//! completes, cancelling the rest. Every participant gets exactly one chance
//! to either report an already-available result ([`Participant::probe`]) or
//! register interest ([`Participant::arm`]); whichever one's registration
//! completes first commits the race and the rest are cancelled.
//!
//! Two shapes are provided:
//!
//! - [`select2`], [`select3`], [`select4`] race a fixed, compile-time number
//!   of differently-typed participants (a heterogeneous tuple), resolving to
//!   a tagged [`Select2Outcome`]-style enum.
//! - [`select_range`] races a runtime-determined number of same-typed
//!   participants, resolving to `(index, output)`.
//!
//! Every race future returned by these functions already implements
//! `Future`, and [`nested`] wraps one (or any other future) as a
//! [`Participant`], so a `select` can itself be raced as one arm of a
//! larger `select`.
//!
//! The crate assumes a single-threaded, cooperatively-scheduled executor:
//! there is no locking, no atomics, and no `unsafe` anywhere in this crate —
//! participants are expected to be other tasks on the same executor that
//! wake the race's task via the ordinary [`core::task::Waker`] contract.
#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod cancel;
pub mod error;
pub mod participant;
mod race;
pub mod range;
pub mod shared;
pub mod variadic;

pub use cancel::{CancellationKind, CancellationSignal};
pub use error::SelectError;
pub use participant::{nested, oneshot, pending, Nested, Oneshot, OneshotSender, Participant, Pending, Ready};
pub use range::{select_range, select_range_with_kind, SelectRange};
pub use shared::{CancelHandle, Completion, SharedCompletionState};
pub use variadic::{
    select2, select2_with_kind, select3, select3_with_kind, select4, select4_with_kind, Select2,
    Select2Outcome, Select3, Select3Outcome, Select4, Select4Outcome,
};

/// Emits a one-line trace message at a handful of state-transition points
/// (arm, commit, cancel-emit) when the `trace` feature is enabled; expands
/// to nothing otherwise, so the default build pays no cost for it.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "trace")]
        {
            #[cfg(feature = "std")]
            ::std::eprintln!($($arg)*);
        }
    };
}
