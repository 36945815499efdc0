// src/utils/system.rs: System functions

use anyhow::{anyhow, Result};
use log::warn;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

use crate::config::defs::MEMORY_FRACTION;


/// Number of logical CPUs on this machine, at least 1.
pub fn detect_cpus() -> usize {
    let system = System::new_with_specifics(RefreshKind::nothing().with_cpu(CpuRefreshKind::everything()));
    match system.cpus().len() {
        0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        n => n,
    }
}


/// Total physical RAM in bytes.
pub fn detect_ram() -> Result<u64> {
    let mut system = System::new_with_specifics(RefreshKind::nothing().with_memory(MemoryRefreshKind::everything()));
    system.refresh_memory();
    let total_ram = system.total_memory();
    if total_ram == 0 {
        return Err(anyhow!("Failed to detect valid RAM values"));
    }
    Ok(total_ram)
}


/// Clamps requested threads and parallel samples into `[1, total_cpus]`.
///
/// # Arguments
///
/// * `requested_threads` - threads asked for on the command line; `None` means all CPUs
/// * `parallel` - samples to process at once
/// * `total_cpus` - logical CPUs available
///
/// # Returns
/// (threads, parallel)
pub fn check_cpus(requested_threads: Option<usize>, parallel: usize, total_cpus: usize) -> (usize, usize) {
    let total_cpus = total_cpus.max(1);
    let threads = requested_threads.unwrap_or(total_cpus);
    let clamped_threads = threads.clamp(1, total_cpus);
    if clamped_threads != threads {
        warn!("Number of threads was set to {}", clamped_threads);
    }
    let clamped_parallel = parallel.clamp(1, total_cpus);
    if clamped_parallel != parallel {
        warn!("Number of samples to process in parallel was set to {}", clamped_parallel);
    }
    (clamped_threads, clamped_parallel)
}


/// Caps the memory budget (GB) at 85% of total RAM; no request means the cap itself.
pub fn check_mem(requested_gb: Option<u64>, total_ram_bytes: u64) -> u64 {
    let max_mem = (total_ram_bytes as f64 * MEMORY_FRACTION / 1_000_000_000.0) as u64;
    match requested_gb {
        Some(requested) if requested > max_mem => {
            warn!(
                "Requested memory ({} GB) is higher than available system memory; memory was set to {} GB",
                requested, max_mem
            );
            max_mem
        }
        Some(requested) => requested,
        None => max_mem,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_cpus() {
        assert_eq!(check_cpus(None, 2, 16), (16, 2));
        assert_eq!(check_cpus(Some(64), 2, 16), (16, 2));
        assert_eq!(check_cpus(Some(0), 0, 16), (1, 1));
        assert_eq!(check_cpus(Some(4), 32, 16), (4, 16));
    }

    #[test]
    fn test_check_mem() {
        let total = 100_000_000_000;
        assert_eq!(check_mem(None, total), 85);
        assert_eq!(check_mem(Some(200), total), 85);
        assert_eq!(check_mem(Some(10), total), 10);
    }

    #[test]
    fn test_detection() {
        assert!(detect_cpus() >= 1);
        assert!(detect_ram().unwrap() > 0);
    }
}
