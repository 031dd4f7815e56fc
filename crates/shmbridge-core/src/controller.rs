//! # Controller
//!
//! The requester side of the bridge. A controller attaches to a segment the
//! agent has already initialized and issues one request at a time:
//!
//! 1. clear the error flag and fill `address`/`length`/`value`/body
//! 2. publish the command word and wait for the agent to hand the header back
//! 3. read the answer, or turn a raised error flag into
//!    [`BridgeError::RequestFailed`]
//!
//! Writes and `Suspend` leave the agent parked in `Suspended`; the next request
//! or [`Controller::resume`] releases it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use shmbridge_core::controller::Controller;
//! use shmbridge_core::shm::Segment;
//! use shmbridge_core::types::Address;
//!
//! # fn segment() -> Segment { unimplemented!() }
//! let controller = Controller::attach(&segment())?;
//! let version = controller.core_version()?;
//! let value = controller.read_dword(Address::new(0x1000))?;
//! controller.resume()?;
//! # Ok::<(), shmbridge_core::error::BridgeError>(())
//! ```

use tracing::{debug, warn};

use crate::builtin::CoreCommand;
use crate::error::{BridgeError, BridgeResult, Fault};
use crate::shm::{Body, ByteRange, Header, Segment, BODY_SIZE};
use crate::sync::PthreadRendezvous;
use crate::types::{Address, CommandWord, ModuleId, ProcessId};

/// Issues requests to an agent over a shared segment
#[derive(Debug, Clone)]
pub struct Controller
{
    segment: Segment,
    rendezvous: PthreadRendezvous,
}

impl Controller
{
    /// Attach to a segment whose agent is already running.
    ///
    /// ## Errors
    ///
    /// - `SyncNotReady`: no agent has initialized this segment yet
    pub fn attach(segment: &Segment) -> BridgeResult<Self>
    {
        let rendezvous = PthreadRendezvous::attach(segment)?;
        debug!(segment = ?segment, "controller attached");
        Ok(Self {
            segment: segment.clone(),
            rendezvous,
        })
    }

    /// Shared header, for feature-module requests.
    pub fn header(&self) -> &Header
    {
        self.segment.header()
    }

    /// Body region, for feature-module requests.
    pub fn body(&self) -> Body<'_>
    {
        self.segment.body()
    }

    /// Publish `word` and wait for the agent to answer, without interpreting
    /// the error flag.
    fn exchange(&self, word: CommandWord) -> BridgeResult<()>
    {
        let header = self.header();
        header.set_error(false);
        self.rendezvous.request_and_wait(|| header.set_command(word))
    }

    /// The agent faulted: its word is parked at `ServerError` and it is no
    /// longer waiting, so put the header back to idle.
    fn failed(&self, word: CommandWord) -> BridgeError
    {
        let header = self.header();
        if header.command() == CoreCommand::ServerError.word() {
            header.set_command(CommandWord::RUNNING);
        }
        warn!(%word, "request failed on the agent side");
        BridgeError::RequestFailed { command: word }
    }

    /// Issue `word` and wait for its answer.
    ///
    /// `word` must lead to a client-wait command; a request that ends in a
    /// cancellation never gets an answer.
    ///
    /// ## Errors
    ///
    /// - `RequestFailed`: the agent raised the error flag
    /// - `Sync`: the handoff itself failed
    pub fn call(&self, word: CommandWord) -> BridgeResult<()>
    {
        self.exchange(word)?;
        if self.header().error() {
            return Err(self.failed(word));
        }
        Ok(())
    }

    fn call_core(&self, command: CoreCommand) -> BridgeResult<()>
    {
        self.call(command.word())
    }

    /// Version of the agent's Core module.
    pub fn core_version(&self) -> BridgeResult<u32>
    {
        self.call_core(CoreCommand::GetVersion)?;
        Ok(self.header().value())
    }

    /// Process id the agent runs in.
    pub fn pid(&self) -> BridgeResult<ProcessId>
    {
        self.call_core(CoreCommand::GetPid)?;
        Ok(ProcessId(self.header().value()))
    }

    fn set_range(&self, address: Address, len: usize) -> BridgeResult<()>
    {
        let range = ByteRange::new(address, len, BODY_SIZE)?;
        let length = u32::try_from(range.len()).map_err(|_| Fault::BodyOverflow {
            requested: len,
            capacity: BODY_SIZE,
        })?;
        self.header().set_address(range.address());
        self.header().set_length(length);
        Ok(())
    }

    /// Copy `len` bytes at `address` out of the agent.
    ///
    /// ## Errors
    ///
    /// - `Fault(BodyOverflow)`: `len` exceeds the body, checked before sending
    /// - `RequestFailed`: the agent could not read the range
    pub fn read_raw(&self, address: Address, len: usize) -> BridgeResult<Vec<u8>>
    {
        self.set_range(address, len)?;
        self.call_core(CoreCommand::ReadRaw)?;
        let mut data = vec![0u8; len];
        self.body().read(0, &mut data)?;
        Ok(data)
    }

    /// Copy `data` to `address` in the agent.
    pub fn write_raw(&self, address: Address, data: &[u8]) -> BridgeResult<()>
    {
        self.set_range(address, data.len())?;
        self.body().write(0, data)?;
        self.call_core(CoreCommand::WriteRaw)
    }

    fn read_scalar(&self, command: CoreCommand, address: Address) -> BridgeResult<u32>
    {
        self.header().set_address(address);
        self.call_core(command)?;
        Ok(self.header().value())
    }

    fn write_scalar(&self, command: CoreCommand, address: Address, value: u32) -> BridgeResult<()>
    {
        self.header().set_address(address);
        self.header().set_value(value);
        self.call_core(command)
    }

    pub fn read_dword(&self, address: Address) -> BridgeResult<u32>
    {
        self.read_scalar(CoreCommand::ReadDword, address)
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn read_word(&self, address: Address) -> BridgeResult<u16>
    {
        Ok(self.read_scalar(CoreCommand::ReadWord, address)? as u16)
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn read_byte(&self, address: Address) -> BridgeResult<u8>
    {
        Ok(self.read_scalar(CoreCommand::ReadByte, address)? as u8)
    }

    pub fn write_dword(&self, address: Address, value: u32) -> BridgeResult<()>
    {
        self.write_scalar(CoreCommand::WriteDword, address, value)
    }

    pub fn write_word(&self, address: Address, value: u16) -> BridgeResult<()>
    {
        self.write_scalar(CoreCommand::WriteWord, address, value.into())
    }

    pub fn write_byte(&self, address: Address, value: u8) -> BridgeResult<()>
    {
        self.write_scalar(CoreCommand::WriteByte, address, value.into())
    }

    /// Contents of the text buffer at `address`.
    ///
    /// ## Errors
    ///
    /// - `RequestFailed`: the agent could not read it, or it does not fit
    /// - `Fault(InvalidText)`: the text is not UTF-8
    pub fn read_string(&self, address: Address) -> BridgeResult<String>
    {
        self.header().set_address(address);
        self.call_core(CoreCommand::ReadString)?;
        let len = usize::try_from(self.header().value()).unwrap_or(usize::MAX);
        let len = len.min(BODY_SIZE);
        let mut text = vec![0u8; len];
        self.body().read(0, &mut text)?;
        String::from_utf8(text).map_err(|_| Fault::InvalidText.into())
    }

    /// Replace the text buffer at `address` with `text`.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument`: `text` contains a NUL byte
    /// - `Fault(BodyOverflow)`: `text` plus its terminator exceeds the body
    pub fn write_string(&self, address: Address, text: &str) -> BridgeResult<()>
    {
        reject_nul(text)?;
        self.body().write_terminated(0, text.as_bytes())?;
        self.header().set_address(address);
        self.call_core(CoreCommand::WriteString)
    }

    /// Index of the module registered as `(name, version)`, if any.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument`: `name` contains a NUL byte
    /// - `RequestFailed`: the lookup payload was rejected
    pub fn find_module(&self, name: &str, version: u32) -> BridgeResult<Option<ModuleId>>
    {
        reject_nul(name)?;
        let body = self.body();
        body.write(0, &version.to_ne_bytes())?;
        body.write_terminated(4, name.as_bytes())?;

        let word = CoreCommand::AcquireModule.word();
        self.exchange(word)?;
        let header = self.header();
        if !header.error() {
            let id = u16::try_from(header.value())
                .map_err(|_| BridgeError::InvalidArgument(format!("module index {} out of range", header.value())))?;
            return Ok(Some(ModuleId::new(id)));
        }
        // A miss is answered normally, with the flag raised
        if header.command() == CoreCommand::RetModule.word() {
            debug!(name, version, "module not found");
            return Ok(None);
        }
        Err(self.failed(word))
    }

    /// Offer the controller's CPU mask and learn whether both sides share a
    /// single CPU (in which case the agent starts yielding between polls).
    pub fn sync_yield(&self, affinity_mask: u32) -> BridgeResult<bool>
    {
        self.header().set_value(affinity_mask);
        self.call_core(CoreCommand::SyncYield)?;
        Ok(self.header().value() != 0)
    }

    /// Park the agent in `Suspended` until the next request or
    /// [`Controller::resume`].
    pub fn suspend(&self) -> BridgeResult<()>
    {
        self.call_core(CoreCommand::Suspend)
    }

    /// Release a parked agent back to idle polling. Does not wait.
    pub fn resume(&self) -> BridgeResult<()>
    {
        let header = self.header();
        self.rendezvous.resume(|| header.set_command(CommandWord::RUNNING))
    }
}

fn reject_nul(text: &str) -> BridgeResult<()>
{
    if text.as_bytes().contains(&0) {
        return Err(BridgeError::InvalidArgument(format!("{text:?} contains a NUL byte")));
    }
    Ok(())
}
