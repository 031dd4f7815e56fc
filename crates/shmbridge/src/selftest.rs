//! In-process self test: one agent thread, one controller, one anonymous
//! segment, every Core command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use shmbridge_core::agent::{Agent, PollSettings};
use shmbridge_core::builtin::{CORE_NAME, CORE_VERSION};
use shmbridge_core::controller::Controller;
use shmbridge_core::error::{BridgeError, BridgeResult};
use shmbridge_core::memory::ArenaMemory;
use shmbridge_core::platform::{AffinityProbe, SystemAffinity};
use shmbridge_core::registry::{Command, Module};
use shmbridge_core::shm::Segment;
use shmbridge_core::types::{Address, CommandId, CommandWord, ProcessId};
use shmbridge_utils::{debug, warn};

const ARENA_BASE: u64 = 0x7000_0000;
const ARENA_SIZE: usize = 64 * 1024;

/// Outcome of every check, in order.
#[derive(Debug, Default)]
pub struct Report
{
    checks: Vec<(&'static str, Result<(), String>)>,
    elapsed: Duration,
}

impl Report
{
    fn check(&mut self, name: &'static str, result: BridgeResult<Result<(), String>>)
    {
        let result = result.map_err(|err| err.to_string()).and_then(|inner| inner);
        if let Err(reason) = &result {
            warn!(check = name, %reason, "self test check failed");
        }
        self.checks.push((name, result));
    }

    pub fn len(&self) -> usize
    {
        self.checks.len()
    }

    pub fn failures(&self) -> usize
    {
        self.checks.iter().filter(|(_, result)| result.is_err()).count()
    }

    pub fn print(&self)
    {
        println!("=== Self test ===");
        for (name, result) in &self.checks {
            match result {
                Ok(()) => println!("  ok    {name}"),
                Err(reason) => println!("  FAIL  {name}: {reason}"),
            }
        }
        println!(
            "{} passed, {} failed in {:.1?}",
            self.len() - self.failures(),
            self.failures(),
            self.elapsed
        );
    }
}

fn expect_eq<T: PartialEq + std::fmt::Debug>(actual: T, expected: T) -> Result<(), String>
{
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected:?}, got {actual:?}"))
    }
}

/// Feature module registered next to Core to exercise lookup and custom calls.
fn echo_module() -> BridgeResult<Module<u32>>
{
    Module::builder("Echo", 1)
        .command(0u16, Command::cancellation("Idle"))
        .command(
            1u16,
            Command::function("Echo")
                .handler(|request, calls: &mut u32| {
                    *calls += 1;
                    let value = request.header().value();
                    request.header().set_value(value.rotate_left(8));
                    Ok(())
                })
                .then(2u16),
        )
        .command(2u16, Command::client_wait("Echo return"))
        .build(0)
}

/// Run the self test.
///
/// ## Errors
///
/// Setup failures only (mapping, synchronization, module registration);
/// failed checks are recorded in the report.
pub fn run(poll_interval: Duration, rounds: u32) -> BridgeResult<Report>
{
    let started = Instant::now();
    let segment = Segment::anonymous()?;
    let arena = ArenaMemory::new(Address::new(ARENA_BASE), ARENA_SIZE);
    let mut agent = Agent::builder(segment.clone(), arena.clone())
        .poll_settings(PollSettings { poll_interval })
        .module(echo_module()?)
        .build()?;
    let controller = Controller::attach(&segment)?;

    let stop = Arc::new(AtomicBool::new(false));
    let agent_stop = Arc::clone(&stop);
    let handle = thread::Builder::new()
        .name("shmbridge-agent".to_string())
        .spawn(move || {
            let result = agent.run(&agent_stop);
            agent.shutdown();
            result
        })?;

    let mut report = Report::default();
    exercise(&controller, &arena, rounds, &mut report);

    controller.resume()?;
    stop.store(true, Ordering::SeqCst);
    match handle.join() {
        Ok(result) => result?,
        Err(_) => return Err(BridgeError::InvalidArgument("agent thread panicked".to_string())),
    }

    report.elapsed = started.elapsed();
    debug!(checks = report.len(), failures = report.failures(), "self test finished");
    Ok(report)
}

fn dword_round_trips(controller: &Controller, rounds: u32) -> BridgeResult<Result<(), String>>
{
    let at = |offset: u64| Address::new(ARENA_BASE + offset);
    for round in 0..rounds {
        let value = round.wrapping_mul(0x9e37_79b9);
        let address = at(u64::from(round % 64) * 4);
        controller.write_dword(address, value)?;
        let read = controller.read_dword(address)?;
        if read != value {
            return Ok(Err(format!("round {round}: wrote {value:#x}, read {read:#x}")));
        }
    }
    for edge in [0, u32::MAX] {
        controller.write_dword(at(0), edge)?;
        if controller.read_dword(at(0))? != edge {
            return Ok(Err(format!("edge value {edge:#x} did not round trip")));
        }
    }
    Ok(Ok(()))
}

fn echo_call(controller: &Controller) -> BridgeResult<Result<(), String>>
{
    let Some(echo) = controller.find_module("Echo", 1)? else {
        return Ok(Err("Echo module not registered".to_string()));
    };
    controller.header().set_value(0x1122_3344);
    controller.call(CommandWord::new(echo, CommandId::new(1)))?;
    Ok(expect_eq(controller.header().value(), 0x2233_4411))
}

fn exercise(controller: &Controller, arena: &ArenaMemory, rounds: u32, report: &mut Report)
{
    let at = |offset: u64| Address::new(ARENA_BASE + offset);

    report.check(
        "GetVersion",
        controller.core_version().map(|version| expect_eq(version, CORE_VERSION)),
    );
    report.check(
        "GetPid",
        controller.pid().map(|pid| expect_eq(pid, ProcessId::current())),
    );

    report.check("WriteDword/ReadDword", dword_round_trips(controller, rounds));
    report.check(
        "WriteWord/ReadWord",
        controller
            .write_word(at(0x400), 0xbeef)
            .and_then(|()| controller.read_word(at(0x400)))
            .map(|word| expect_eq(word, 0xbeef)),
    );
    report.check(
        "WriteByte/ReadByte",
        controller
            .write_byte(at(0x402), 0x5a)
            .and_then(|()| controller.read_byte(at(0x402)))
            .map(|byte| expect_eq(byte, 0x5a)),
    );

    let pattern: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
    report.check(
        "WriteRaw/ReadRaw",
        controller
            .write_raw(at(0x800), &pattern)
            .and_then(|()| controller.read_raw(at(0x800), pattern.len()))
            .map(|data| expect_eq(data, pattern.clone())),
    );

    let handle = arena.alloc_string("");
    report.check(
        "WriteString/ReadString",
        controller
            .write_string(handle, "hello")
            .and_then(|()| controller.read_string(handle))
            .map(|text| expect_eq(text.as_str(), "hello")),
    );

    report.check(
        "AcquireModule (hit)",
        controller
            .find_module(CORE_NAME, CORE_VERSION)
            .map(|id| expect_eq(id.map(|id| id.raw()), Some(0))),
    );
    report.check(
        "AcquireModule (miss)",
        controller.find_module("Echo", 2).map(|id| expect_eq(id, None)),
    );
    report.check("Feature module call", echo_call(controller));

    let local = SystemAffinity.affinity_mask();
    report.check(
        "SyncYield",
        controller
            .sync_yield(local)
            .map(|single| expect_eq(single, local.count_ones() == 1)),
    );

    report.check(
        "Fault reporting",
        Ok(match controller.read_dword(Address::NULL) {
            Err(BridgeError::RequestFailed { .. }) => expect_eq(controller.header().command(), CommandWord::RUNNING),
            other => Err(format!("expected RequestFailed, got {other:?}")),
        }),
    );

    report.check(
        "Suspend/resume",
        controller.suspend().and_then(|()| controller.resume()).and_then(|()| {
            let running = controller.header().command().is_running();
            controller.core_version().map(|version| {
                expect_eq(running, true).and_then(|()| expect_eq(version, CORE_VERSION))
            })
        }),
    );
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_selftest_passes()
    {
        let report = run(Duration::from_micros(20), 16).unwrap();
        assert!(report.len() > 10);
        assert_eq!(report.failures(), 0, "{:?}", report.checks);
    }

    #[test]
    fn test_report_counts_failures()
    {
        let mut report = Report::default();
        report.check("good", Ok(Ok(())));
        report.check("bad", Ok(Err("nope".to_string())));
        report.check("broken", Err(BridgeError::SyncNotReady));
        assert_eq!(report.len(), 3);
        assert_eq!(report.failures(), 2);
    }
}
