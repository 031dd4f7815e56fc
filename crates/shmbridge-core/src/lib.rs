//! # shmbridge-core
//!
//! A request/response bridge between an in-process agent and an external
//! controller, over one shared memory segment.
//!
//! The segment holds a small header (command word, scalar slots, error flag
//! and the process-shared synchronization objects) followed by a bulk body.
//! The controller writes a command word; the agent dispatches it through a
//! registry of versioned command modules, answers in the header or body, and
//! hands control back. Exactly one side owns the header at any time.
//!
//! This crate provides:
//! - The segment layout and bounds-checked header/body access ([`shm`])
//! - The handoff protocol over a process-shared pthread mutex and condition
//!   variables ([`sync`])
//! - The module registry and the dispatch state machine ([`registry`],
//!   [`engine`])
//! - The built-in Core module: memory access, process info, module lookup,
//!   yield negotiation ([`builtin`])
//! - Both ends of the protocol: [`agent::Agent`] and
//!   [`controller::Controller`]
//!
//! ## Platform Support
//!
//! Unix only: the handoff relies on `PTHREAD_PROCESS_SHARED` primitives and
//! the segment on `mmap`.
//!
//! ## Why unsafe code is needed
//!
//! The segment is raw shared memory that another process maps at a different
//! address, and the synchronization objects are C structs living inside it.
//! Reading and writing through `LocalMemory` dereferences addresses supplied
//! by the controller. All of this is wrapped in bounds-checked safe APIs; the
//! one remaining trust boundary is the `unsafe` constructor of
//! [`memory::LocalMemory`].

#![allow(unsafe_code)] // Required for shared mappings, pthread primitives and raw memory access

#[cfg(unix)]
pub mod agent;
pub mod builtin;
#[cfg(unix)]
pub mod controller;
pub mod engine;
pub mod error;
pub mod memory;
pub mod platform;
pub mod prelude;
pub mod registry;
pub mod shm;
pub mod sync;
pub mod types;

#[cfg(unix)]
pub use agent::Agent;
#[cfg(unix)]
pub use controller::Controller;
// Re-export commonly used types
pub use error::{BridgeError, BridgeResult, Fault};
pub use types::{Address, CommandWord, ModuleId, ProcessId};
