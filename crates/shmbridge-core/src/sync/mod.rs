//! # Handoff Synchronization
//!
//! Ownership of the header alternates strictly between the agent and the
//! controller. A handoff is: write the fields, pass the turn, signal, and
//! (usually) wait for the turn to come back.
//!
//! The agent only ever needs the two operations of [`Rendezvous`]; the
//! controller side lives on the concrete implementation
//! ([`PthreadRendezvous::request_and_wait`] and [`PthreadRendezvous::resume`]).
//!
//! ## Memory ordering
//!
//! The segment is mapped at different addresses in two address spaces, so
//! language-level happens-before does not carry across. Every handoff is
//! bracketed with [`full_barrier`]: before the turn is passed and after a wait
//! returns.

use std::sync::atomic::{compiler_fence, fence, Ordering};

use crate::error::BridgeResult;

#[cfg(unix)]
pub mod pthread;

#[cfg(unix)]
pub use pthread::PthreadRendezvous;

/// Which side currently owns the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Party
{
    /// The in-process agent running the dispatch engine.
    Agent = 1,
    /// The external requester.
    Controller = 2,
}

impl Party
{
    pub(crate) fn from_raw(raw: u32) -> Option<Self>
    {
        match raw {
            1 => Some(Party::Agent),
            2 => Some(Party::Controller),
            _ => None,
        }
    }
}

/// Compiler and hardware barrier around a handoff.
#[inline]
pub fn full_barrier()
{
    compiler_fence(Ordering::SeqCst);
    fence(Ordering::SeqCst);
}

/// Agent side of a handoff
///
/// Implementations must signal the controller exactly once per call.
pub trait Rendezvous
{
    /// Pass the header to the controller and wake it, without waiting.
    ///
    /// Used when the engine has to release a waiting controller on its way
    /// out of the dispatch loop (faults).
    fn respond(&self) -> BridgeResult<()>;

    /// Pass the header to the controller, wake it, and block until it hands
    /// the header back.
    fn respond_and_wait(&self) -> BridgeResult<()>;
}

impl<R: Rendezvous + ?Sized> Rendezvous for &R
{
    fn respond(&self) -> BridgeResult<()>
    {
        (**self).respond()
    }

    fn respond_and_wait(&self) -> BridgeResult<()>
    {
        (**self).respond_and_wait()
    }
}
