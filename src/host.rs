//! Host CPU introspection — spec.md §4.2. Reads cumulative counters
//! from the kernel rather than sampling instantaneous process CPU,
//! which is noisy and attributable to the wrong process.

use std::fs;
use std::path::Path;

use crate::error::FatalError;

/// Two cumulative, monotonically increasing counters read at a point
/// in time. `uptime_s` and `idle_s` are both host-wide, summed across
/// all CPUs, as reported by `/proc/uptime`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostSample {
    pub uptime_s: f64,
    pub idle_s: f64,
}

/// Reads `/proc/uptime` and online CPU count. A fixed path is used
/// rather than a configurable one since this is host introspection,
/// not something an operator should need to redirect.
pub struct HostProbe {
    uptime_path: String,
    ncpus: usize,
}

impl HostProbe {
    pub fn new() -> Result<Self, FatalError> {
        Self::with_path("/proc/uptime")
    }

    pub fn with_path(uptime_path: &str) -> Result<Self, FatalError> {
        let ncpus = num_cpus();
        if ncpus == 0 {
            return Err(FatalError::HostProbe(
                "failed to determine online CPU count".to_string(),
            ));
        }
        let probe = Self {
            uptime_path: uptime_path.to_string(),
            ncpus,
        };
        // Fail fast at construction so init can treat this as fatal
        // rather than discovering it on the first tick.
        probe.sample()?;
        Ok(probe)
    }

    pub fn ncpus(&self) -> usize {
        self.ncpus
    }

    /// `/proc/uptime` holds two space-separated floats: total uptime
    /// and cumulative idle time summed across all CPUs.
    pub fn sample(&self) -> Result<HostSample, FatalError> {
        let raw = fs::read_to_string(&self.uptime_path).map_err(|e| {
            FatalError::HostProbe(format!("reading {}: {e}", self.uptime_path))
        })?;
        let mut fields = raw.split_whitespace();
        let uptime_s: f64 = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| FatalError::HostProbe(format!("malformed {}", self.uptime_path)))?;
        let idle_s: f64 = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| FatalError::HostProbe(format!("malformed {}", self.uptime_path)))?;
        Ok(HostSample { uptime_s, idle_s })
    }
}

#[cfg(target_os = "linux")]
fn num_cpus() -> usize {
    // `_SC_NPROCESSORS_ONLN` would need libc; the online-CPU set as
    // seen by the scheduler can also be read from the affinity mask
    // via sched_getaffinity, but parsing the cpu list in
    // /sys/devices/system/cpu/online keeps this dependency-free.
    fs::read_to_string("/sys/devices/system/cpu/online")
        .ok()
        .and_then(|s| parse_cpu_list(s.trim()))
        .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(0))
}

#[cfg(not(target_os = "linux"))]
fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(0)
}

/// Parses a cpulist like `0-3,6,8-9` into a count of CPUs.
fn parse_cpu_list(s: &str) -> Option<usize> {
    let mut total = 0usize;
    for part in s.split(',') {
        if part.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: usize = lo.parse().ok()?;
            let hi: usize = hi.parse().ok()?;
            total += hi.checked_sub(lo)?.checked_add(1)?;
        } else {
            part.parse::<usize>().ok()?;
            total += 1;
        }
    }
    Some(total)
}

/// True if AppArmor is enabled on this host (spec.md §4.1's
/// `SecurityOpt` gate, carried from the original's `apparmor_enabled`).
pub fn apparmor_enabled() -> bool {
    apparmor_enabled_at("/sys/module/apparmor/parameters/enabled")
}

fn apparmor_enabled_at(path: &str) -> bool {
    fs::read_to_string(path)
        .map(|s| s.trim() == "Y")
        .unwrap_or(false)
}

/// Interval CPU efficiency between two samples — spec.md §3's
/// `EfficiencyWindow` and §4.2. The first tick after startup has no
/// previous sample and reports 0% by convention (seeded via
/// `Efficiency::initial`).
#[derive(Debug, Clone, Copy)]
pub struct Efficiency {
    pub efficiency_pct: f64,
    pub idle_pct: f64,
}

impl Efficiency {
    pub fn initial() -> Self {
        Self {
            efficiency_pct: 0.0,
            idle_pct: 100.0,
        }
    }

    /// `efficiency_pct = (Δuptime·ncpus − Δidle)·100 / (Δuptime·ncpus)`,
    /// clamped to `[0, 100·ncpus]`. `idle_pct = 100 − efficiency_pct`.
    pub fn between(prev: HostSample, curr: HostSample, ncpus: usize) -> Self {
        let ncpus = ncpus as f64;
        let delta_uptime = curr.uptime_s - prev.uptime_s;
        let delta_idle = curr.idle_s - prev.idle_s;
        let denom = delta_uptime * ncpus;

        let efficiency_pct = if denom <= 0.0 {
            0.0
        } else {
            ((denom - delta_idle) * 100.0 / denom).clamp(0.0, 100.0 * ncpus)
        };

        Self {
            efficiency_pct,
            idle_pct: 100.0 - efficiency_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_simple_cpu_list() {
        assert_eq!(parse_cpu_list("0-3"), Some(4));
        assert_eq!(parse_cpu_list("0-3,6,8-9"), Some(6));
        assert_eq!(parse_cpu_list("0"), Some(1));
    }

    #[test]
    fn efficiency_idle_host_is_near_zero() {
        let prev = HostSample {
            uptime_s: 100.0,
            idle_s: 90.0,
        };
        let curr = HostSample {
            uptime_s: 110.0,
            idle_s: 99.0,
        };
        let eff = Efficiency::between(prev, curr, 4);
        // delta_uptime*ncpus = 40, delta_idle = 9 -> (40-9)*100/40 = 77.5
        assert!((eff.efficiency_pct - 77.5).abs() < 1e-9);
    }

    #[test]
    fn efficiency_clamped_to_zero_on_backwards_idle() {
        let prev = HostSample {
            uptime_s: 100.0,
            idle_s: 0.0,
        };
        let curr = HostSample {
            uptime_s: 110.0,
            idle_s: 1000.0,
        };
        let eff = Efficiency::between(prev, curr, 2);
        assert_eq!(eff.efficiency_pct, 0.0);
    }

    #[test]
    fn apparmor_detects_enabled_flag() {
        let dir = std::env::temp_dir().join(format!(
            "plancton-apparmor-test-{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("enabled");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "Y").unwrap();
        assert!(apparmor_enabled_at(path.to_str().unwrap()));
        fs::remove_dir_all(&dir).ok();
    }
}
