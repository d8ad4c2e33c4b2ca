use std::env;
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use tracing::{info, warn};

use crate::planner::PlannerConfig;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Bind address and port of the HTTP server.
    pub api: ApiConfig,
    /// Planner tuning knobs.
    pub planner: PlannerSettings,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            planner: PlannerSettings::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "STOW_IT_NOW_API_HOST";
    const PORT_VAR: &'static str = "STOW_IT_NOW_API_PORT";

    fn from_env() -> Self {
        Self::from_values(env_string(Self::HOST_VAR), env_string(Self::PORT_VAR))
    }

    fn from_values(host: Option<String>, port: Option<String>) -> Self {
        let host_value = host.unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, display_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = parse_setting(
            Self::PORT_VAR,
            port,
            Self::DEFAULT_PORT,
            |value| value != 0,
            "must not be 0",
        );

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

/// Planner tuning, read from `STOW_IT_NOW_PLANNER_*`.
#[derive(Clone, Debug)]
pub struct PlannerSettings {
    planner: PlannerConfig,
}

impl PlannerSettings {
    const GRID_STEP_VAR: &'static str = "STOW_IT_NOW_PLANNER_GRID_STEP";
    const EPSILON_VAR: &'static str = "STOW_IT_NOW_PLANNER_EPSILON";
    const HIGH_PRIORITY_VAR: &'static str = "STOW_IT_NOW_PLANNER_HIGH_PRIORITY";
    const BATCH_SIZE_VAR: &'static str = "STOW_IT_NOW_PLANNER_BATCH_SIZE";

    fn from_env() -> Self {
        Self::from_lookup(env_string)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let grid_step = parse_setting(
            Self::GRID_STEP_VAR,
            lookup(Self::GRID_STEP_VAR),
            PlannerConfig::DEFAULT_GRID_STEP,
            |value| value.is_finite() && value > 0.0,
            "must be greater than 0",
        );
        let epsilon = parse_setting(
            Self::EPSILON_VAR,
            lookup(Self::EPSILON_VAR),
            PlannerConfig::DEFAULT_EPSILON,
            |value| value.is_finite() && value > 0.0,
            "must be greater than 0",
        );
        let high_priority_threshold = parse_setting(
            Self::HIGH_PRIORITY_VAR,
            lookup(Self::HIGH_PRIORITY_VAR),
            PlannerConfig::DEFAULT_HIGH_PRIORITY_THRESHOLD,
            |value| (1..=100).contains(&value),
            "must be between 1 and 100",
        );
        let batch_size = parse_setting(
            Self::BATCH_SIZE_VAR,
            lookup(Self::BATCH_SIZE_VAR),
            PlannerConfig::DEFAULT_BATCH_SIZE,
            |value| value > 0,
            "must be greater than 0",
        );

        let planner = PlannerConfig::builder()
            .grid_step(grid_step)
            .epsilon(epsilon)
            .high_priority_threshold(high_priority_threshold)
            .batch_size(batch_size)
            .build();
        if planner != PlannerConfig::default() {
            info!(?planner, "Using adjusted planner settings");
        }

        Self { planner }
    }

    pub fn planner_config(&self) -> PlannerConfig {
        self.planner
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!("⚠️ Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

/// Parses `raw` or falls back to `default` with a warning.
fn parse_setting<T>(
    var_name: &str,
    raw: Option<String>,
    default: T,
    validator: impl Fn(T) -> bool,
    invalid_hint: &str,
) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if validator(value) => value,
        Ok(_) => {
            warn!(
                "⚠️ {} contains invalid value '{}': {}. Using {}.",
                var_name, raw, invalid_hint, default
            );
            default
        }
        Err(err) => {
            warn!(
                "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                var_name, raw, err, default
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_setting_accepts_valid_values() {
        assert_eq!(parse_setting("X", Some(" 2.5 ".into()), 1.0, |v| v > 0.0, "hint"), 2.5);
        assert_eq!(parse_setting("X", Some("7".into()), 10usize, |v| v > 0, "hint"), 7);
    }

    #[test]
    fn parse_setting_falls_back_on_missing_invalid_or_garbage() {
        assert_eq!(parse_setting("X", None, 1.0, |v| v > 0.0, "hint"), 1.0);
        assert_eq!(parse_setting("X", Some("-3".into()), 1.0, |v| v > 0.0, "hint"), 1.0);
        assert_eq!(parse_setting("X", Some("abc".into()), 90u8, |_| true, "hint"), 90);
        assert_eq!(parse_setting("X", Some("300".into()), 90u8, |_| true, "hint"), 90);
    }

    #[test]
    fn planner_settings_read_from_lookup() {
        let settings = PlannerSettings::from_lookup(|name| match name {
            "STOW_IT_NOW_PLANNER_GRID_STEP" => Some("0.5".into()),
            "STOW_IT_NOW_PLANNER_HIGH_PRIORITY" => Some("80".into()),
            "STOW_IT_NOW_PLANNER_BATCH_SIZE" => Some("0".into()),
            _ => None,
        });
        let config = settings.planner_config();
        assert_eq!(config.grid_step, 0.5);
        assert_eq!(config.high_priority_threshold, 80);
        assert_eq!(config.batch_size, PlannerConfig::DEFAULT_BATCH_SIZE);
        assert_eq!(config.epsilon, PlannerConfig::DEFAULT_EPSILON);
    }

    #[test]
    fn api_config_defaults_and_fallbacks() {
        let config = ApiConfig::from_values(None, None);
        assert_eq!(config.port(), 8080);
        assert!(config.binds_to_all_interfaces());
        assert!(config.uses_default_host());

        let config = ApiConfig::from_values(Some("not-an-ip".into()), Some("0".into()));
        assert_eq!(config.display_host(), "0.0.0.0");
        assert_eq!(config.port(), 8080);

        let config = ApiConfig::from_values(Some("127.0.0.1".into()), Some("9000".into()));
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:9000");
        assert!(!config.binds_to_all_interfaces());
    }
}
