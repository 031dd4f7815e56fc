//! # Dispatch Engine
//!
//! Interprets the command word in the header and drives the state machine
//! until control has to go back to the controller for good.
//!
//! ## One `act` call
//!
//! 1. A `RUNNING` word means nothing is pending: return [`Outcome::Idle`].
//! 2. Otherwise dispatch the current word through the registry.
//! 3. Apply the command's next-state transition, if it has one.
//! 4. Depending on the kind:
//!    - **Cancellation**: leave without signaling anyone
//!    - **Client wait**: hand the header to the controller, block until it
//!      comes back, then continue with whatever word is there now
//!    - **Function**: continue immediately with the new word
//!
//! A fault at any point sets the error flag, parks the word at
//! `Core::ServerError`, and releases the controller, which would otherwise
//! wait forever for an answer.

use tracing::{trace, warn};

use crate::builtin::CoreCommand;
use crate::error::{BridgeResult, Fault};
use crate::registry::Registry;
use crate::shm::Segment;
use crate::sync::{full_barrier, Rendezvous};
use crate::types::{CommandKind, CommandWord};

/// How a call to [`Engine::act`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome
{
    /// Nothing was pending.
    Idle,
    /// A cancellation command ended the loop.
    Cancelled(CommandWord),
    /// A request faulted; the controller has been told through the error flag.
    Faulted(Fault),
}

/// The agent-side state machine
///
/// Single-threaded: only the agent's dispatch thread calls [`Engine::act`].
pub struct Engine<R>
{
    segment: Segment,
    registry: Registry,
    rendezvous: R,
}

impl<R: Rendezvous> Engine<R>
{
    #[must_use]
    pub fn new(segment: Segment, registry: Registry, rendezvous: R) -> Self
    {
        Self {
            segment,
            registry,
            rendezvous,
        }
    }

    pub fn segment(&self) -> &Segment
    {
        &self.segment
    }

    pub fn registry(&self) -> &Registry
    {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry
    {
        &mut self.registry
    }

    pub fn rendezvous(&self) -> &R
    {
        &self.rendezvous
    }

    /// Serve whatever is pending in the header.
    ///
    /// ## Errors
    ///
    /// Only failures of the synchronization primitives themselves. Request
    /// faults are reported through [`Outcome::Faulted`].
    pub fn act(&mut self) -> BridgeResult<Outcome>
    {
        let header = self.segment.header();
        if header.command().is_running() {
            return Ok(Outcome::Idle);
        }

        loop {
            let word = header.command();
            let info = match self.registry.dispatch(word, header, self.segment.body()) {
                Ok(info) => info,
                Err(fault) => {
                    warn!(%word, %fault, "request faulted");
                    header.set_error(true);
                    full_barrier();
                    header.set_command(CoreCommand::ServerError.word());
                    self.rendezvous.respond()?;
                    return Ok(Outcome::Faulted(fault));
                }
            };
            trace!(%word, command = info.name, kind = %info.kind, "dispatched");

            if let Some(next) = info.next {
                full_barrier();
                header.set_command(word.with_command(next));
            }

            match info.kind {
                CommandKind::Cancellation => return Ok(Outcome::Cancelled(word)),
                CommandKind::ClientWait => self.rendezvous.respond_and_wait()?,
                CommandKind::Function => {}
            }
        }
    }
}

impl<R> std::fmt::Debug for Engine<R>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("Engine")
            .field("segment", &self.segment)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
