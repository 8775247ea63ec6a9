// Config file + CLI override parsing (spec.md §6 "Configuration"). Kept as
// plain functions with fallback defaults, the way the teacher's
// `frameworks/config.rs` reads `std::env` — just sourced from a file plus
// argv instead. No CLI-argument crate: three flags don't need one, and it
// keeps the dependency stack aligned with the teacher's zero-CLI-crate
// habit.

use std::fs;
use std::net::IpAddr;

pub const DEFAULT_CONFIG_PATH: &str = "server.conf";
pub const DEFAULT_LOBBY_COUNT: u32 = 8;
pub const DEFAULT_IP: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 4545;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub ip: String,
    pub port: u16,
    pub lobby_count: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            ip: DEFAULT_IP.to_string(),
            port: DEFAULT_PORT,
            lobby_count: DEFAULT_LOBBY_COUNT,
        }
    }
}

/// Parses a `KEY=VALUE` config file. Blank lines and `#`-prefixed comments
/// are ignored; unknown keys are ignored; invalid values fall back to the
/// compiled-in default for that field (spec.md §6 "All missing/invalid
/// fields fall back to compiled-in defaults").
pub fn load_config_file(path: &str) -> ServerConfig {
    let mut config = ServerConfig::default();
    let Ok(contents) = fs::read_to_string(path) else {
        return config;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "LOBBY_COUNT" => {
                if let Ok(n) = value.parse::<u32>() {
                    if (1..=1000).contains(&n) {
                        config.lobby_count = n;
                    }
                }
            }
            "IP" => {
                if value.parse::<IpAddr>().is_ok() || value == "0.0.0.0" {
                    config.ip = value.to_string();
                }
            }
            "PORT" => {
                if let Ok(n) = value.parse::<u16>() {
                    if n >= 1 {
                        config.port = n;
                    }
                }
            }
            _ => {}
        }
    }
    config
}

#[derive(Debug)]
pub struct CliError(pub String);

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CliError {}

/// Applies `--ip`, `--port`, `--lobby-count`, `--config <path>` overrides.
/// An unrecognized flag is a startup error (spec.md §6). `--config` is
/// consumed here only to discover the path; the caller loads the file
/// before calling this, then applies the remaining flags over it.
pub fn apply_cli_overrides(config: &mut ServerConfig, args: &[String]) -> Result<(), CliError> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                iter.next()
                    .ok_or_else(|| CliError("--config requires a path".to_string()))?;
            }
            "--ip" => {
                let value = iter
                    .next()
                    .ok_or_else(|| CliError("--ip requires a value".to_string()))?;
                config.ip = value.clone();
            }
            "--port" => {
                let value = iter
                    .next()
                    .ok_or_else(|| CliError("--port requires a value".to_string()))?;
                config.port = value
                    .parse()
                    .map_err(|_| CliError(format!("invalid --port value: {value}")))?;
            }
            "--lobby-count" => {
                let value = iter
                    .next()
                    .ok_or_else(|| CliError("--lobby-count requires a value".to_string()))?;
                config.lobby_count = value
                    .parse()
                    .map_err(|_| CliError(format!("invalid --lobby-count value: {value}")))?;
            }
            other => return Err(CliError(format!("unrecognized flag: {other}"))),
        }
    }
    Ok(())
}

/// Scans `args` for an explicit `--config <path>` without consuming them,
/// since the config file must be loaded before other overrides apply.
pub fn config_path_from_args(args: &[String]) -> String {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            if let Some(path) = iter.next() {
                return path.clone();
            }
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

pub fn resolve_config(args: &[String]) -> Result<ServerConfig, CliError> {
    let path = config_path_from_args(args);
    let mut config = load_config_file(&path);
    apply_cli_overrides(&mut config, args)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config_file("/nonexistent/path/server.conf");
        assert_eq!(config.lobby_count, DEFAULT_LOBBY_COUNT);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn cli_overrides_win_over_file_defaults() {
        let mut config = ServerConfig::default();
        let args: Vec<String> = vec!["--port".into(), "9000".into(), "--lobby-count".into(), "4".into()];
        apply_cli_overrides(&mut config, &args).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.lobby_count, 4);
    }

    #[test]
    fn unrecognized_flag_is_an_error() {
        let mut config = ServerConfig::default();
        let args: Vec<String> = vec!["--bogus".into()];
        assert!(apply_cli_overrides(&mut config, &args).is_err());
    }

    #[test]
    fn out_of_range_lobby_count_in_file_is_ignored() {
        let dir = std::env::temp_dir().join(format!("c45_test_{}", std::process::id()));
        std::fs::write(&dir, "LOBBY_COUNT=0\nPORT=7000\n").unwrap();
        let config = load_config_file(dir.to_str().unwrap());
        assert_eq!(config.lobby_count, DEFAULT_LOBBY_COUNT);
        assert_eq!(config.port, 7000);
        let _ = std::fs::remove_file(&dir);
    }
}
