//! # Agent
//!
//! The in-process side of the bridge: owns the dispatch engine, the module
//! registry and the process-wide [`SyncFlag`].
//!
//! ## Lifecycle
//!
//! 1. Build: [`Agent::builder`] initializes the process-shared primitives in
//!    the segment, resets the header and registers Core followed by any
//!    feature modules, in order.
//! 2. Serve: call [`Agent::poll`] periodically from the host's own loop, or
//!    hand a thread to [`Agent::run`].
//! 3. Shut down: [`Agent::shutdown`] releases every module's state. Dropping
//!    the agent does the same if it was not shut down explicitly.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::atomic::AtomicBool;
//!
//! use shmbridge_core::agent::Agent;
//! use shmbridge_core::memory::ArenaMemory;
//! use shmbridge_core::shm::Segment;
//! use shmbridge_core::types::Address;
//!
//! let segment = Segment::anonymous()?;
//! let memory = ArenaMemory::new(Address::new(0x1000), 4096);
//! let mut agent = Agent::builder(segment, memory).build()?;
//!
//! let stop = AtomicBool::new(false);
//! agent.run(&stop)?;
//! agent.shutdown();
//! # Ok::<(), shmbridge_core::error::BridgeError>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

pub use crate::builtin::SyncFlag;
use crate::builtin::{self, CoreState};
use crate::engine::{Engine, Outcome};
use crate::error::BridgeResult;
use crate::memory::AddressSpace;
use crate::platform::{AffinityProbe, SystemAffinity};
use crate::registry::{Module, ModuleObject, Registry};
use crate::shm::Segment;
use crate::sync::PthreadRendezvous;
use crate::types::ProcessId;

/// How often [`Agent::run`] looks at the header when nothing is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings
{
    /// Sleep between polls, unless the sync flag asks for a yield instead
    pub poll_interval: Duration,
}

impl Default for PollSettings
{
    fn default() -> Self
    {
        Self {
            poll_interval: Duration::from_millis(1),
        }
    }
}

/// Configures and starts an [`Agent`]
pub struct AgentBuilder
{
    segment: Segment,
    memory: Box<dyn AddressSpace>,
    affinity: Box<dyn AffinityProbe>,
    poll: PollSettings,
    pid: Option<ProcessId>,
    modules: Vec<Box<dyn ModuleObject>>,
}

impl AgentBuilder
{
    /// Use `affinity` instead of asking the operating system.
    #[must_use]
    pub fn affinity(mut self, affinity: impl AffinityProbe + 'static) -> Self
    {
        self.affinity = Box::new(affinity);
        self
    }

    #[must_use]
    pub fn poll_settings(mut self, poll: PollSettings) -> Self
    {
        self.poll = poll;
        self
    }

    /// Report `pid` from `GetPid` instead of the current process id.
    #[must_use]
    pub fn pid(mut self, pid: ProcessId) -> Self
    {
        self.pid = Some(pid);
        self
    }

    /// Register a feature module after Core. Modules get consecutive ids in
    /// the order they are added, starting at 1.
    #[must_use]
    pub fn module<S: Send + 'static>(mut self, module: Module<S>) -> Self
    {
        self.modules.push(Box::new(module));
        self
    }

    /// Initialize the segment and assemble the registry.
    ///
    /// ## Errors
    ///
    /// - `SyncInit`: the process-shared primitives could not be created; the
    ///   agent must not serve anything in that case
    /// - `DuplicateModule` / `RegistryFull`: a feature module was rejected
    pub fn build(self) -> BridgeResult<Agent>
    {
        let rendezvous = PthreadRendezvous::initialize(&self.segment).inspect_err(|err| {
            error!(%err, "cannot initialize synchronization, agent disabled");
        })?;
        self.segment.header().reset();

        let sync_flag = SyncFlag::new();
        let mut state = CoreState::new(self.memory, self.affinity, sync_flag.clone());
        if let Some(pid) = self.pid {
            state = state.with_pid(pid);
        }
        let mut registry = Registry::new(builtin::module(state)?);
        for module in self.modules {
            registry.insert(module)?;
        }

        info!(modules = registry.len(), segment = ?self.segment, "agent ready");
        Ok(Agent {
            engine: Engine::new(self.segment, registry, rendezvous),
            sync_flag,
            poll: self.poll,
        })
    }
}

impl std::fmt::Debug for AgentBuilder
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("AgentBuilder")
            .field("segment", &self.segment)
            .field("poll", &self.poll)
            .field("pid", &self.pid)
            .field("modules", &self.modules.len())
            .finish_non_exhaustive()
    }
}

/// The running in-process agent
pub struct Agent
{
    engine: Engine<PthreadRendezvous>,
    sync_flag: SyncFlag,
    poll: PollSettings,
}

impl Agent
{
    /// Start configuring an agent that serves `memory` over `segment`.
    #[must_use]
    pub fn builder(segment: Segment, memory: impl AddressSpace + 'static) -> AgentBuilder
    {
        AgentBuilder {
            segment,
            memory: Box::new(memory),
            affinity: Box::new(SystemAffinity),
            poll: PollSettings::default(),
            pid: None,
            modules: Vec::new(),
        }
    }

    /// Serve whatever is pending, once.
    ///
    /// ## Errors
    ///
    /// Synchronization failures only; request faults come back as
    /// [`Outcome::Faulted`].
    pub fn poll(&mut self) -> BridgeResult<Outcome>
    {
        self.engine.act()
    }

    /// Poll until `stop` is set.
    ///
    /// Between polls the thread yields if the sync flag is set and sleeps for
    /// the poll interval otherwise.
    ///
    /// ## Errors
    ///
    /// The first synchronization failure ends the loop.
    pub fn run(&mut self, stop: &AtomicBool) -> BridgeResult<()>
    {
        info!(poll_interval = ?self.poll.poll_interval, "agent serving");
        while !stop.load(Ordering::SeqCst) {
            match self.poll()? {
                Outcome::Idle => {}
                Outcome::Cancelled(word) => debug!(%word, "dispatch loop ended"),
                Outcome::Faulted(fault) => debug!(%fault, "request failed"),
            }
            if self.sync_flag.is_set() {
                thread::yield_now();
            } else {
                thread::sleep(self.poll.poll_interval);
            }
        }
        info!("agent stopped");
        Ok(())
    }

    pub fn sync_flag(&self) -> &SyncFlag
    {
        &self.sync_flag
    }

    pub fn segment(&self) -> &Segment
    {
        self.engine.segment()
    }

    pub fn registry(&self) -> &Registry
    {
        self.engine.registry()
    }

    /// Release every module's state.
    pub fn shutdown(mut self)
    {
        self.teardown();
    }

    fn teardown(&mut self)
    {
        let registry = self.engine.registry_mut();
        if !registry.is_empty() {
            info!(modules = registry.len(), "agent shutting down");
            registry.teardown();
        }
    }
}

impl Drop for Agent
{
    fn drop(&mut self)
    {
        self.teardown();
    }
}

impl std::fmt::Debug for Agent
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("Agent")
            .field("engine", &self.engine)
            .field("sync_flag", &self.sync_flag)
            .field("poll", &self.poll)
            .finish()
    }
}

#[cfg(test)]
mod tests
{
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use super::*;
    use crate::builtin::CORE_NAME;
    use crate::memory::ArenaMemory;
    use crate::platform::FixedAffinity;
    use crate::registry::Command;
    use crate::types::{Address, CommandWord, ModuleId};

    fn memory() -> ArenaMemory
    {
        ArenaMemory::new(Address::new(0x1000), 64)
    }

    /// Counts how many times its state is dropped.
    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked
    {
        fn drop(&mut self)
        {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked(name: &str, drops: &Arc<AtomicUsize>) -> Module<Tracked>
    {
        Module::builder(name, 1)
            .command(0u16, Command::cancellation("Idle"))
            .build(Tracked(Arc::clone(drops)))
            .unwrap()
    }

    #[test]
    fn test_build_registers_in_order()
    {
        let drops = Arc::new(AtomicUsize::new(0));
        let agent = Agent::builder(Segment::anonymous().unwrap(), memory())
            .affinity(FixedAffinity(1))
            .module(tracked("First", &drops))
            .module(tracked("Second", &drops))
            .build()
            .unwrap();

        let registry = agent.registry();
        assert_eq!(registry.lookup(CORE_NAME, builtin::CORE_VERSION), Some(ModuleId::CORE));
        assert_eq!(registry.lookup("First", 1), Some(ModuleId::new(1)));
        assert_eq!(registry.lookup("Second", 1), Some(ModuleId::new(2)));
    }

    #[test]
    fn test_duplicate_feature_module_fails_build()
    {
        let drops = Arc::new(AtomicUsize::new(0));
        let result = Agent::builder(Segment::anonymous().unwrap(), memory())
            .module(tracked("Twin", &drops))
            .module(tracked("Twin", &drops))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_resets_header()
    {
        let segment = Segment::anonymous().unwrap();
        segment.header().set_command(CommandWord::from_raw(0xdead_beef));
        segment.header().set_error(true);

        let mut agent = Agent::builder(segment.clone(), memory()).build().unwrap();
        assert!(segment.header().command().is_running());
        assert!(!segment.header().error());
        assert_eq!(agent.poll().unwrap(), Outcome::Idle);
    }

    #[test]
    fn test_teardown_runs_once()
    {
        let drops = Arc::new(AtomicUsize::new(0));
        let agent = Agent::builder(Segment::anonymous().unwrap(), memory())
            .module(tracked("Once", &drops))
            .build()
            .unwrap();
        agent.shutdown();
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        let agent = Agent::builder(Segment::anonymous().unwrap(), memory())
            .module(tracked("Dropped", &drops))
            .build()
            .unwrap();
        drop(agent);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_run_stops_when_asked()
    {
        let mut agent = Agent::builder(Segment::anonymous().unwrap(), memory())
            .poll_settings(PollSettings {
                poll_interval: Duration::from_micros(10),
            })
            .build()
            .unwrap();
        let stop = AtomicBool::new(true);
        agent.run(&stop).unwrap();
    }
}
