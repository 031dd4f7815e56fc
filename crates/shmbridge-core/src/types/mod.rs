//! # Types
//!
//! Small value types shared by the segment, registry, engine and controller.

pub mod address;
pub mod command;
pub mod process;

// Re-export all public types
pub use address::Address;
pub use command::{CommandId, CommandKind, CommandWord, ModuleId};
pub use process::ProcessId;
