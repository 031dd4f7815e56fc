//! Common module for library exports

#[cfg(unix)]
pub use crate::agent::{Agent, AgentBuilder, PollSettings, SyncFlag};
pub use crate::builtin::{CoreCommand, CORE_NAME, CORE_VERSION};
#[cfg(unix)]
pub use crate::controller::Controller;
pub use crate::engine::Outcome;
pub use crate::error::{BridgeError, BridgeResult, Fault};
pub use crate::memory::{AddressSpace, ArenaMemory, LocalMemory};
pub use crate::platform::{AffinityProbe, FixedAffinity, SystemAffinity};
pub use crate::registry::{Command, CommandInfo, Module, ModuleKey, Registry, Request};
pub use crate::shm::{Body, ByteRange, Header, Scalar, Segment, TextRef};
pub use crate::types::{Address, CommandId, CommandKind, CommandWord, ModuleId, ProcessId};
