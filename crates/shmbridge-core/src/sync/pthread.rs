//! # Process-Shared pthread Rendezvous
//!
//! One mutex and two condition variables, all created with
//! `PTHREAD_PROCESS_SHARED`, stored in the sync block of the segment:
//!
//! - `agent_signaled`: the agent handed the header to the controller
//! - `controller_signaled`: the controller handed the header to the agent
//!
//! A `turn` word next to them records the current owner. Waits loop on it, so
//! a signal sent before the peer started waiting is never lost and spurious
//! wakeups are harmless. The mutex only protects this rendezvous, never the
//! header contents themselves.
//!
//! ## References
//!
//! - [pthread_mutexattr_setpshared(3)](https://man7.org/linux/man-pages/man3/pthread_mutexattr_setpshared.3p.html)
//! - [pthread_cond_wait(3)](https://man7.org/linux/man-pages/man3/pthread_cond_wait.3p.html)

use std::mem::{self, size_of};
use std::ptr::{addr_of_mut, NonNull};
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, trace};

use super::{full_barrier, Party, Rendezvous};
use crate::error::{BridgeError, BridgeResult};
use crate::shm::{Segment, SYNC_SIZE};

/// Marks a sync block whose primitives have been initialized.
const READY_MAGIC: u32 = 0x5348_4d42;

#[repr(C)]
struct SyncBlock
{
    mutex: libc::pthread_mutex_t,
    agent_signaled: libc::pthread_cond_t,
    controller_signaled: libc::pthread_cond_t,
    turn: AtomicU32,
    ready: AtomicU32,
}

const _: () = assert!(size_of::<SyncBlock>() <= SYNC_SIZE);

/// Process-shared mutex/condvar pair living inside the segment
///
/// Cheap to clone; every clone keeps the segment mapped.
#[derive(Clone)]
pub struct PthreadRendezvous
{
    block: NonNull<SyncBlock>,
    _segment: Segment,
}

// SAFETY: the block only holds process-shared primitives and atomics, which
// are designed to be used concurrently from several threads and processes.
unsafe impl Send for PthreadRendezvous {}
unsafe impl Sync for PthreadRendezvous {}

/// Holds the rendezvous mutex, unlocking on drop.
struct LockGuard<'a>
{
    rendezvous: &'a PthreadRendezvous,
}

impl Drop for LockGuard<'_>
{
    fn drop(&mut self)
    {
        // Best effort unlock - ignore errors
        unsafe {
            let _ = libc::pthread_mutex_unlock(self.rendezvous.mutex());
        }
    }
}

fn check(operation: &'static str, code: libc::c_int) -> BridgeResult<()>
{
    if code == 0 {
        Ok(())
    } else {
        Err(BridgeError::Sync { operation, code })
    }
}

fn init_failure(operation: &str, code: libc::c_int) -> BridgeError
{
    BridgeError::SyncInit(format!("{operation} failed with code {code}"))
}

impl PthreadRendezvous
{
    /// Create the process-shared primitives in the segment's sync block.
    ///
    /// Called once by the agent before any controller attaches. Any failure
    /// here is fatal for the agent.
    ///
    /// ## Errors
    ///
    /// - `SyncInit`: an attribute or primitive could not be created
    pub fn initialize(segment: &Segment) -> BridgeResult<Self>
    {
        let block = segment.sync_block().cast::<SyncBlock>();
        let raw = block.as_ptr();

        unsafe {
            (*raw).ready.store(0, Ordering::SeqCst);

            let mut mutex_attr: libc::pthread_mutexattr_t = mem::zeroed();
            let code = libc::pthread_mutexattr_init(&mut mutex_attr);
            if code != 0 {
                return Err(init_failure("pthread_mutexattr_init", code));
            }
            let code = libc::pthread_mutexattr_setpshared(&mut mutex_attr, libc::PTHREAD_PROCESS_SHARED);
            if code != 0 {
                libc::pthread_mutexattr_destroy(&mut mutex_attr);
                return Err(init_failure("pthread_mutexattr_setpshared", code));
            }
            let code = libc::pthread_mutex_init(addr_of_mut!((*raw).mutex), &mutex_attr);
            libc::pthread_mutexattr_destroy(&mut mutex_attr);
            if code != 0 {
                return Err(init_failure("pthread_mutex_init", code));
            }

            let mut cond_attr: libc::pthread_condattr_t = mem::zeroed();
            let code = libc::pthread_condattr_init(&mut cond_attr);
            if code != 0 {
                return Err(init_failure("pthread_condattr_init", code));
            }
            let code = libc::pthread_condattr_setpshared(&mut cond_attr, libc::PTHREAD_PROCESS_SHARED);
            if code != 0 {
                libc::pthread_condattr_destroy(&mut cond_attr);
                return Err(init_failure("pthread_condattr_setpshared", code));
            }
            let code = libc::pthread_cond_init(addr_of_mut!((*raw).agent_signaled), &cond_attr);
            if code != 0 {
                libc::pthread_condattr_destroy(&mut cond_attr);
                return Err(init_failure("pthread_cond_init(agent_signaled)", code));
            }
            let code = libc::pthread_cond_init(addr_of_mut!((*raw).controller_signaled), &cond_attr);
            libc::pthread_condattr_destroy(&mut cond_attr);
            if code != 0 {
                return Err(init_failure("pthread_cond_init(controller_signaled)", code));
            }

            (*raw).turn.store(Party::Controller as u32, Ordering::SeqCst);
            full_barrier();
            (*raw).ready.store(READY_MAGIC, Ordering::SeqCst);
        }

        debug!(segment = ?segment, "initialized process-shared rendezvous");
        Ok(Self {
            block,
            _segment: segment.clone(),
        })
    }

    /// Use primitives an agent already initialized in this segment.
    ///
    /// ## Errors
    ///
    /// - `SyncNotReady`: the agent has not called [`Self::initialize`]
    pub fn attach(segment: &Segment) -> BridgeResult<Self>
    {
        let block = segment.sync_block().cast::<SyncBlock>();
        let ready = unsafe { (*block.as_ptr()).ready.load(Ordering::SeqCst) };
        if ready != READY_MAGIC {
            return Err(BridgeError::SyncNotReady);
        }
        full_barrier();
        Ok(Self {
            block,
            _segment: segment.clone(),
        })
    }

    /// Current owner of the header, if the turn word is valid.
    pub fn turn(&self) -> Option<Party>
    {
        Party::from_raw(self.turn_word().load(Ordering::SeqCst))
    }

    /// Controller side: pass the header to the agent, run `publish` (which
    /// stores the command word), wake the agent, and block until the agent
    /// hands the header back.
    ///
    /// The turn is passed before `publish` runs, so an agent that picks the
    /// command up by polling can never have its answer overwritten.
    ///
    /// ## Errors
    ///
    /// - `Sync`: a lock/wait/signal call failed
    pub fn request_and_wait<F: FnOnce()>(&self, publish: F) -> BridgeResult<()>
    {
        full_barrier();
        let guard = self.lock()?;
        self.set_turn(Party::Agent);
        publish();
        full_barrier();
        self.signal(self.controller_signaled(), "pthread_cond_signal(controller_signaled)")?;
        self.wait_for(&guard, self.agent_signaled(), Party::Controller)?;
        drop(guard);
        full_barrier();
        Ok(())
    }

    /// Controller side: pass the header to the agent, run `publish`, and wake
    /// the agent without waiting for an answer.
    ///
    /// ## Errors
    ///
    /// - `Sync`: a lock/signal call failed
    pub fn resume<F: FnOnce()>(&self, publish: F) -> BridgeResult<()>
    {
        full_barrier();
        let _guard = self.lock()?;
        self.set_turn(Party::Agent);
        publish();
        full_barrier();
        self.signal(self.controller_signaled(), "pthread_cond_signal(controller_signaled)")
    }

    fn lock(&self) -> BridgeResult<LockGuard<'_>>
    {
        check("pthread_mutex_lock", unsafe { libc::pthread_mutex_lock(self.mutex()) })?;
        Ok(LockGuard { rendezvous: self })
    }

    fn signal(&self, cond: *mut libc::pthread_cond_t, operation: &'static str) -> BridgeResult<()>
    {
        check(operation, unsafe { libc::pthread_cond_signal(cond) })
    }

    /// Block on `cond` until `party` owns the header. Requires the lock.
    fn wait_for(&self, _guard: &LockGuard<'_>, cond: *mut libc::pthread_cond_t, party: Party) -> BridgeResult<()>
    {
        while self.turn() != Some(party) {
            check("pthread_cond_wait", unsafe { libc::pthread_cond_wait(cond, self.mutex()) })?;
        }
        Ok(())
    }

    fn set_turn(&self, party: Party)
    {
        trace!(?party, "handoff");
        self.turn_word().store(party as u32, Ordering::SeqCst);
    }

    fn turn_word(&self) -> &AtomicU32
    {
        unsafe { &(*self.block.as_ptr()).turn }
    }

    fn mutex(&self) -> *mut libc::pthread_mutex_t
    {
        unsafe { addr_of_mut!((*self.block.as_ptr()).mutex) }
    }

    fn agent_signaled(&self) -> *mut libc::pthread_cond_t
    {
        unsafe { addr_of_mut!((*self.block.as_ptr()).agent_signaled) }
    }

    fn controller_signaled(&self) -> *mut libc::pthread_cond_t
    {
        unsafe { addr_of_mut!((*self.block.as_ptr()).controller_signaled) }
    }
}

impl Rendezvous for PthreadRendezvous
{
    fn respond(&self) -> BridgeResult<()>
    {
        full_barrier();
        let _guard = self.lock()?;
        self.set_turn(Party::Controller);
        self.signal(self.agent_signaled(), "pthread_cond_signal(agent_signaled)")
    }

    fn respond_and_wait(&self) -> BridgeResult<()>
    {
        full_barrier();
        let guard = self.lock()?;
        self.set_turn(Party::Controller);
        self.signal(self.agent_signaled(), "pthread_cond_signal(agent_signaled)")?;
        self.wait_for(&guard, self.controller_signaled(), Party::Agent)?;
        drop(guard);
        full_barrier();
        Ok(())
    }
}

impl std::fmt::Debug for PthreadRendezvous
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("PthreadRendezvous").field("turn", &self.turn()).finish()
    }
}
