//! Configuration model — spec.md §3. `RawConfig` mirrors the on-disk
//! document field-for-field (string/loose types, optional); `Configuration`
//! is the resolved, validated snapshot the rest of the agent consumes.

use serde::Deserialize;

use super::expr;

/// As read from TOML. Every field is optional; missing keys take the
/// defaults below, matching the original's `self.conf` dict in
/// `examples/original_source/plancton/__init__.py`. Unknown keys are
/// silently ignored (no `deny_unknown_fields`), per spec.md §4.4.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfig {
    pub docker_image: Option<String>,
    pub docker_cmd: Option<String>,
    pub max_docks: Option<String>,
    pub cpus_per_dock: Option<f64>,
    pub max_ttl: Option<i64>,
    pub main_sleep: Option<i64>,
    pub updateconfig: Option<i64>,
    pub image_expiration: Option<i64>,
    pub grace_kill: Option<i64>,
    pub grace_spawn: Option<i64>,
    pub max_dock_mem: Option<i64>,
    pub max_dock_swap: Option<i64>,
    pub docker_privileged: Option<bool>,
    pub binds: Option<Vec<String>>,
    pub devices: Option<Vec<String>>,
    pub capabilities: Option<Vec<String>>,
    pub security_opts: Option<Vec<String>>,
    pub influxdb_url: Option<String>,
}

/// The resolved, validated snapshot. Replaced atomically on reload —
/// nothing in the agent holds a mutable reference into a live
/// `Configuration`, only an `Arc` swap (spec.md §5).
#[derive(Debug, Clone)]
pub struct Configuration {
    pub image: String,
    pub command: Vec<String>,
    pub max_docks: i64,
    pub cpus_per_dock: f64,
    pub max_ttl_s: i64,
    pub main_sleep_s: i64,
    pub update_config_s: i64,
    pub image_expiration_s: i64,
    pub grace_kill_s: i64,
    pub grace_spawn_s: i64,
    pub max_mem_bytes: i64,
    pub max_swap_bytes: i64,
    pub privileged: bool,
    pub binds: Vec<String>,
    pub devices: Vec<String>,
    pub capabilities: Vec<String>,
    pub security_opts: Vec<String>,
    pub telemetry_url: Option<String>,
}

impl Configuration {
    /// Resolve a `RawConfig` against the host's cpu count, falling
    /// back to `previous`'s `max_docks` if the symbolic expression
    /// fails to parse (spec.md §4.4: "any evaluation error falls back
    /// to the previous value").
    pub fn resolve(raw: &RawConfig, ncpus: usize, previous: Option<&Configuration>) -> Self {
        let image = raw
            .docker_image
            .clone()
            .unwrap_or_else(|| "busybox".to_string());

        let command = raw
            .docker_cmd
            .clone()
            .unwrap_or_else(|| "/bin/sleep 60".to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let max_docks_expr = raw
            .max_docks
            .clone()
            .unwrap_or_else(|| "ncpus - 2".to_string());

        let max_docks = match expr::eval(&max_docks_expr, ncpus as i64) {
            Ok(n) if n >= 0 => n,
            Ok(negative) => {
                tracing::warn!(
                    expr = %max_docks_expr,
                    value = negative,
                    "max_docks expression evaluated negative, clamping to 0"
                );
                0
            }
            Err(e) => {
                let fallback = previous.map(|p| p.max_docks).unwrap_or(0);
                tracing::warn!(
                    expr = %max_docks_expr,
                    error = %e,
                    fallback,
                    "failed to evaluate max_docks expression, keeping previous value"
                );
                fallback
            }
        };

        Self {
            image,
            command,
            max_docks,
            cpus_per_dock: raw.cpus_per_dock.unwrap_or(1.0),
            max_ttl_s: raw.max_ttl.unwrap_or(43_200),
            main_sleep_s: raw.main_sleep.unwrap_or(30),
            update_config_s: raw.updateconfig.unwrap_or(60),
            image_expiration_s: raw.image_expiration.unwrap_or(43_200),
            grace_kill_s: raw.grace_kill.unwrap_or(120),
            grace_spawn_s: raw.grace_spawn.unwrap_or(60),
            max_mem_bytes: raw.max_dock_mem.unwrap_or(2_000_000_000),
            max_swap_bytes: raw.max_dock_swap.unwrap_or(0),
            privileged: raw.docker_privileged.unwrap_or(false),
            binds: raw.binds.clone().unwrap_or_default(),
            devices: raw.devices.clone().unwrap_or_default(),
            capabilities: raw.capabilities.clone().unwrap_or_default(),
            security_opts: raw.security_opts.clone().unwrap_or_default(),
            telemetry_url: raw.influxdb_url.clone(),
        }
    }

    /// Validate the invariants from spec.md §3. Called after `resolve`;
    /// a failure here means the document is logged and the previous
    /// snapshot is retained (spec.md §4.4, §7's `InvariantViolation`).
    pub fn validate(&self) -> Result<(), String> {
        if self.max_docks < 0 {
            return Err("max_docks must be >= 0".to_string());
        }
        if self.cpus_per_dock <= 0.0 {
            return Err("cpus_per_dock must be > 0".to_string());
        }
        if self.grace_spawn_s <= 0 || self.grace_kill_s <= 0 {
            return Err("grace_spawn_s and grace_kill_s must be > 0".to_string());
        }
        if self.grace_kill_s > self.max_ttl_s {
            return Err("grace_kill_s must be <= max_ttl_s".to_string());
        }
        if self.grace_spawn_s > self.max_ttl_s {
            return Err("grace_spawn_s must be <= max_ttl_s".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_applies_documented_defaults() {
        let raw = RawConfig::default();
        let cfg = Configuration::resolve(&raw, 8, None);
        assert_eq!(cfg.image, "busybox");
        assert_eq!(cfg.command, vec!["/bin/sleep", "60"]);
        assert_eq!(cfg.max_docks, 6);
        assert_eq!(cfg.cpus_per_dock, 1.0);
        assert_eq!(cfg.max_ttl_s, 43_200);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn resolve_falls_back_on_bad_expression() {
        let mut raw = RawConfig::default();
        raw.max_docks = Some("not an expr".to_string());
        let previous = Configuration::resolve(&RawConfig::default(), 8, None);
        let cfg = Configuration::resolve(&raw, 8, Some(&previous));
        assert_eq!(cfg.max_docks, previous.max_docks);
    }

    #[test]
    fn validate_rejects_grace_kill_exceeding_ttl() {
        let mut raw = RawConfig::default();
        raw.max_ttl = Some(10);
        raw.grace_kill = Some(20);
        let cfg = Configuration::resolve(&raw, 8, None);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_grace_spawn_exceeding_ttl() {
        let mut raw = RawConfig::default();
        raw.max_ttl = Some(10);
        raw.grace_spawn = Some(20);
        let cfg = Configuration::resolve(&raw, 8, None);
        assert!(cfg.validate().is_err());
    }
}
