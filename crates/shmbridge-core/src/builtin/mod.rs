//! # Built-in Core Module
//!
//! Module 0 of every registry. Its command table is the wire contract shared
//! with controllers, so the ids below never change.
//!
//! ## Request/response pairs
//!
//! Every request command is a function that does its work and moves the
//! command word to a client-wait "return" command, which hands the header
//! back to the controller:
//!
//! | Request | Return | Effect |
//! |---------|--------|--------|
//! | `GetVersion` | `RetVersion` | `value = CORE_VERSION` |
//! | `GetPid` | `RetPid` | `value = pid` |
//! | `ReadRaw` | `RetData` | `length` bytes at `address` into the body |
//! | `ReadDword`/`Word`/`Byte` | `RetDword`/`Word`/`Byte` | scalar at `address` into `value` |
//! | `ReadString` | `RetString` | text at `address` into the body, `value = len` |
//! | `SyncYield` | `SyncYieldRet` | single-CPU check, `value = 0/1` |
//! | `AcquireModule` | `RetModule` | module index into `value`, or `error = 1` |
//!
//! Writes (`WriteRaw`, `WriteDword`, `WriteWord`, `WriteByte`,
//! `WriteString`) and `Suspend` all land in `Suspended`: the agent parks until
//! the controller either sends another request or resumes it with `RUNNING`.
//!
//! `Running`, `ServerError` and `ClientError` are cancellations: dispatching
//! them ends the current dispatch loop without signaling anyone.

mod handlers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::BridgeResult;
use crate::memory::AddressSpace;
use crate::platform::AffinityProbe;
use crate::registry::{Command, Module};
use crate::types::{CommandId, CommandWord, ModuleId, ProcessId};

/// Name the Core module registers under.
pub const CORE_NAME: &str = "Core";

/// Version reported by `GetVersion`.
pub const CORE_VERSION: u32 = 1;

/// Core command ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CoreCommand
{
    Running = 0,
    GetVersion = 1,
    RetVersion = 2,
    GetPid = 3,
    RetPid = 4,
    ReadRaw = 5,
    RetData = 6,
    ReadDword = 7,
    RetDword = 8,
    ReadWord = 9,
    RetWord = 10,
    ReadByte = 11,
    RetByte = 12,
    ServerError = 13,
    ClientError = 14,
    WriteRaw = 15,
    WriteDword = 16,
    WriteWord = 17,
    WriteByte = 18,
    Suspend = 19,
    Suspended = 20,
    ReadString = 21,
    /// Reserved slot, parks like a return state; keeps the later ids stable.
    Reserved = 22,
    RetString = 23,
    WriteString = 24,
    SyncYield = 25,
    SyncYieldRet = 26,
    AcquireModule = 27,
    RetModule = 28,
}

impl CoreCommand
{
    /// Every command, in id order.
    pub const ALL: [CoreCommand; 29] = [
        CoreCommand::Running,
        CoreCommand::GetVersion,
        CoreCommand::RetVersion,
        CoreCommand::GetPid,
        CoreCommand::RetPid,
        CoreCommand::ReadRaw,
        CoreCommand::RetData,
        CoreCommand::ReadDword,
        CoreCommand::RetDword,
        CoreCommand::ReadWord,
        CoreCommand::RetWord,
        CoreCommand::ReadByte,
        CoreCommand::RetByte,
        CoreCommand::ServerError,
        CoreCommand::ClientError,
        CoreCommand::WriteRaw,
        CoreCommand::WriteDword,
        CoreCommand::WriteWord,
        CoreCommand::WriteByte,
        CoreCommand::Suspend,
        CoreCommand::Suspended,
        CoreCommand::ReadString,
        CoreCommand::Reserved,
        CoreCommand::RetString,
        CoreCommand::WriteString,
        CoreCommand::SyncYield,
        CoreCommand::SyncYieldRet,
        CoreCommand::AcquireModule,
        CoreCommand::RetModule,
    ];

    #[must_use]
    pub const fn id(self) -> CommandId
    {
        CommandId::new(self as u16)
    }

    /// Full command word, Core module included.
    #[must_use]
    pub const fn word(self) -> CommandWord
    {
        CommandWord::new(ModuleId::CORE, self.id())
    }

    #[must_use]
    pub fn from_id(id: CommandId) -> Option<Self>
    {
        Self::ALL.get(id.index()).copied()
    }
}

impl From<CoreCommand> for CommandId
{
    fn from(command: CoreCommand) -> Self
    {
        command.id()
    }
}

/// Process-wide "single CPU, yield between polls" flag
///
/// Set by `SyncYield`, read by the agent's poll loop. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct SyncFlag(Arc<AtomicBool>);

impl SyncFlag
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn is_set(&self) -> bool
    {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: bool)
    {
        self.0.store(value, Ordering::SeqCst);
    }
}

/// State owned by the Core module
pub struct CoreState
{
    memory: Box<dyn AddressSpace>,
    affinity: Box<dyn AffinityProbe>,
    sync_flag: SyncFlag,
    pid: ProcessId,
}

impl CoreState
{
    #[must_use]
    pub fn new(memory: Box<dyn AddressSpace>, affinity: Box<dyn AffinityProbe>, sync_flag: SyncFlag) -> Self
    {
        Self {
            memory,
            affinity,
            sync_flag,
            pid: ProcessId::current(),
        }
    }

    /// Report `pid` instead of the current process's id.
    #[must_use]
    pub fn with_pid(mut self, pid: ProcessId) -> Self
    {
        self.pid = pid;
        self
    }

    pub fn sync_flag(&self) -> &SyncFlag
    {
        &self.sync_flag
    }

    pub fn pid(&self) -> ProcessId
    {
        self.pid
    }
}

impl std::fmt::Debug for CoreState
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("CoreState")
            .field("sync_flag", &self.sync_flag)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

/// Build the Core module around `state`.
///
/// ## Errors
///
/// None in practice; the table is fixed and valid. The `Result` comes from
/// [`crate::registry::ModuleBuilder::build`].
pub fn module(state: CoreState) -> BridgeResult<Module<CoreState>>
{
    use CoreCommand as C;

    Module::builder(CORE_NAME, CORE_VERSION)
        .command(C::Running, Command::cancellation("Running"))
        .command(
            C::GetVersion,
            Command::function("Get core version").handler(handlers::get_version).then(C::RetVersion),
        )
        .command(C::RetVersion, Command::client_wait("Core version return"))
        .command(C::GetPid, Command::function("Get PID").handler(handlers::get_pid).then(C::RetPid))
        .command(C::RetPid, Command::client_wait("PID return"))
        .command(C::ReadRaw, Command::function("Raw read").handler(handlers::read_raw).then(C::RetData))
        .command(C::RetData, Command::client_wait("Raw read return"))
        .command(
            C::ReadDword,
            Command::function("Read DWORD").handler(handlers::read_dword).then(C::RetDword),
        )
        .command(C::RetDword, Command::client_wait("Read DWORD return"))
        .command(C::ReadWord, Command::function("Read WORD").handler(handlers::read_word).then(C::RetWord))
        .command(C::RetWord, Command::client_wait("Read WORD return"))
        .command(C::ReadByte, Command::function("Read BYTE").handler(handlers::read_byte).then(C::RetByte))
        .command(C::RetByte, Command::client_wait("Read BYTE return"))
        .command(C::ServerError, Command::cancellation("Server error"))
        .command(C::ClientError, Command::cancellation("Client error"))
        .command(C::WriteRaw, Command::function("Raw write").handler(handlers::write_raw).then(C::Suspended))
        .command(
            C::WriteDword,
            Command::function("Write DWORD").handler(handlers::write_dword).then(C::Suspended),
        )
        .command(
            C::WriteWord,
            Command::function("Write WORD").handler(handlers::write_word).then(C::Suspended),
        )
        .command(
            C::WriteByte,
            Command::function("Write BYTE").handler(handlers::write_byte).then(C::Suspended),
        )
        .command(C::Suspend, Command::function("Suspend").then(C::Suspended))
        .command(C::Suspended, Command::client_wait("Suspended"))
        .command(
            C::ReadString,
            Command::function("Read string").handler(handlers::read_string).then(C::RetString),
        )
        .command(C::Reserved, Command::client_wait("Reserved"))
        .command(C::RetString, Command::client_wait("Read string return"))
        .command(
            C::WriteString,
            Command::function("Write string").handler(handlers::write_string).then(C::Suspended),
        )
        .command(
            C::SyncYield,
            Command::function("Sync yield").handler(handlers::sync_yield).then(C::SyncYieldRet),
        )
        .command(C::SyncYieldRet, Command::client_wait("Sync yield return"))
        .command(
            C::AcquireModule,
            Command::function("Acquire module").handler(handlers::acquire_module).then(C::RetModule),
        )
        .command(C::RetModule, Command::client_wait("Acquire module return"))
        .build(state)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::memory::ArenaMemory;
    use crate::platform::FixedAffinity;
    use crate::registry::ModuleKey;
    use crate::types::{Address, CommandKind};

    fn state() -> CoreState
    {
        CoreState::new(
            Box::new(ArenaMemory::new(Address::new(0x1000), 64)),
            Box::new(FixedAffinity(0b1)),
            SyncFlag::new(),
        )
    }

    #[test]
    fn test_table_matches_ids()
    {
        let module = module(state()).unwrap();
        assert_eq!(module.command_count(), CoreCommand::ALL.len());
        assert_eq!(module.key(), &ModuleKey::new("Core", CORE_VERSION));

        for (index, command) in CoreCommand::ALL.iter().enumerate() {
            assert_eq!(command.id().index(), index);
            assert_eq!(CoreCommand::from_id(command.id()), Some(*command));
        }
        assert_eq!(CoreCommand::from_id(CommandId::new(29)), None);
    }

    #[test]
    fn test_wire_ids_are_fixed()
    {
        assert_eq!(CoreCommand::ReadString.id(), CommandId::new(21));
        assert_eq!(CoreCommand::Reserved.id(), CommandId::new(22));
        assert_eq!(CoreCommand::RetString.id(), CommandId::new(23));
        assert_eq!(CoreCommand::WriteString.id(), CommandId::new(24));
        assert_eq!(CoreCommand::SyncYield.id(), CommandId::new(25));
        assert_eq!(CoreCommand::AcquireModule.id(), CommandId::new(27));
        assert_eq!(CoreCommand::RetModule.id(), CommandId::new(28));
    }

    #[test]
    fn test_kinds_and_transitions()
    {
        use crate::registry::Registry;

        let registry = Registry::new(module(state()).unwrap());
        let info = |command: CoreCommand| registry.resolve(command.word()).unwrap();

        for cancel in [CoreCommand::Running, CoreCommand::ServerError, CoreCommand::ClientError] {
            assert_eq!(info(cancel).kind, CommandKind::Cancellation);
        }
        for write in [
            CoreCommand::WriteRaw,
            CoreCommand::WriteDword,
            CoreCommand::WriteWord,
            CoreCommand::WriteByte,
            CoreCommand::WriteString,
            CoreCommand::Suspend,
        ] {
            assert_eq!(info(write).next, Some(CoreCommand::Suspended.id()));
        }
        assert!(!info(CoreCommand::Suspend).has_handler);
        let reserved = info(CoreCommand::Reserved);
        assert_eq!(reserved.kind, CommandKind::ClientWait);
        assert!(!reserved.has_handler);
        assert_eq!(reserved.next, None);
        assert_eq!(info(CoreCommand::Suspended).kind, CommandKind::ClientWait);
        assert_eq!(info(CoreCommand::AcquireModule).next, Some(CoreCommand::RetModule.id()));
        assert_eq!(info(CoreCommand::SyncYield).next, Some(CoreCommand::SyncYieldRet.id()));
    }

    #[test]
    fn test_sync_flag_is_shared()
    {
        let flag = SyncFlag::new();
        let clone = flag.clone();
        clone.set(true);
        assert!(flag.is_set());
    }
}
