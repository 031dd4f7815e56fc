//! CPU affinity masks.
//!
//! Masks are limited to the first 32 CPUs because they travel through the
//! 32-bit header `value` slot.

use tracing::warn;

/// Source of the hosting process's CPU affinity mask.
pub trait AffinityProbe: Send
{
    /// Bit `n` set means the process may run on CPU `n` (`n < 32`).
    fn affinity_mask(&self) -> u32;
}

/// A constant mask, for tests and for hosts that pin themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedAffinity(pub u32);

impl AffinityProbe for FixedAffinity
{
    fn affinity_mask(&self) -> u32
    {
        self.0
    }
}

/// Asks the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAffinity;

impl AffinityProbe for SystemAffinity
{
    fn affinity_mask(&self) -> u32
    {
        query_affinity().unwrap_or_else(|| {
            let fallback = online_mask();
            warn!(fallback = format_args!("{fallback:#b}"), "affinity query failed, assuming all online CPUs");
            fallback
        })
    }
}

/// Mask with one bit per online CPU, capped at 32.
fn online_mask() -> u32
{
    let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    mask_of_first(cpus)
}

fn mask_of_first(count: usize) -> u32
{
    if count >= 32 {
        u32::MAX
    } else {
        (1u32 << count) - 1
    }
}

#[cfg(target_os = "linux")]
fn query_affinity() -> Option<u32>
{
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        let code = libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set);
        if code != 0 {
            return None;
        }
        let mut mask = 0u32;
        for cpu in 0..32 {
            if libc::CPU_ISSET(cpu, &set) {
                mask |= 1 << cpu;
            }
        }
        // Confined to CPUs past the first 32: report nothing rather than an empty mask
        (mask != 0).then_some(mask)
    }
}

#[cfg(not(target_os = "linux"))]
fn query_affinity() -> Option<u32>
{
    Some(online_mask())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_mask_of_first()
    {
        assert_eq!(mask_of_first(1), 0b1);
        assert_eq!(mask_of_first(4), 0b1111);
        assert_eq!(mask_of_first(32), u32::MAX);
        assert_eq!(mask_of_first(64), u32::MAX);
    }

    #[test]
    fn test_system_mask_is_not_empty()
    {
        assert_ne!(SystemAffinity.affinity_mask(), 0);
    }

    #[test]
    fn test_fixed()
    {
        assert_eq!(FixedAffinity(0b10).affinity_mask(), 0b10);
    }
}
