use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("cannot resolve SERVER_HOST {host:?}: {reason}")]
    Unresolvable { host: String, reason: String },
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub canvas_width: usize,
    pub canvas_height: usize,
    pub rate_limit_points: u32,
    pub rate_limit_duration_ms: u64,
    pub rate_limit_prune_secs: u64,
    pub trust_proxy_headers: bool,
    pub snapshot_enabled: bool,
    pub snapshot_dir: PathBuf,
    pub snapshot_interval_secs: u64,
    pub snapshot_retain: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".into(),
            server_port: 3000,
            canvas_width: 400,
            canvas_height: 300,
            rate_limit_points: 1,
            rate_limit_duration_ms: 100,
            rate_limit_prune_secs: 60,
            trust_proxy_headers: false,
            snapshot_enabled: true,
            snapshot_dir: PathBuf::from("snapshots"),
            snapshot_interval_secs: 60,
            snapshot_retain: 10,
        }
    }
}

/// 读取环境变量，未设置时使用默认值，设置了但无法解析则报错
fn var_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

fn flag_or(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value }),
        },
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let defaults = Config::default();
        let config = Config {
            server_host: var_or("SERVER_HOST", defaults.server_host)?,
            server_port: var_or("SERVER_PORT", defaults.server_port)?,
            canvas_width: var_or("CANVAS_WIDTH", defaults.canvas_width)?,
            canvas_height: var_or("CANVAS_HEIGHT", defaults.canvas_height)?,
            rate_limit_points: var_or("RATE_LIMIT_POINTS", defaults.rate_limit_points)?,
            rate_limit_duration_ms: var_or(
                "RATE_LIMIT_DURATION_MS",
                defaults.rate_limit_duration_ms,
            )?,
            rate_limit_prune_secs: var_or("RATE_LIMIT_PRUNE_SECS", defaults.rate_limit_prune_secs)?,
            trust_proxy_headers: flag_or("TRUST_PROXY_HEADERS", defaults.trust_proxy_headers)?,
            snapshot_enabled: flag_or("SNAPSHOT_ENABLED", defaults.snapshot_enabled)?,
            snapshot_dir: var_or("SNAPSHOT_DIR", defaults.snapshot_dir)?,
            snapshot_interval_secs: var_or(
                "SNAPSHOT_INTERVAL_SECS",
                defaults.snapshot_interval_secs,
            )?,
            snapshot_retain: var_or("SNAPSHOT_RETAIN", defaults.snapshot_retain)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive: [(&'static str, u64); 6] = [
            ("CANVAS_WIDTH", self.canvas_width as u64),
            ("CANVAS_HEIGHT", self.canvas_height as u64),
            ("RATE_LIMIT_POINTS", self.rate_limit_points as u64),
            ("RATE_LIMIT_DURATION_MS", self.rate_limit_duration_ms),
            ("RATE_LIMIT_PRUNE_SECS", self.rate_limit_prune_secs),
            ("SNAPSHOT_INTERVAL_SECS", self.snapshot_interval_secs),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    /// 解析监听地址，`SERVER_HOST` 可以是 IP 字面量或主机名
    pub async fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let unresolvable = |reason: String| ConfigError::Unresolvable {
            host: self.server_host.clone(),
            reason,
        };
        let mut addrs = tokio::net::lookup_host((self.server_host.as_str(), self.server_port))
            .await
            .map_err(|e| unresolvable(e.to_string()))?;
        addrs
            .next()
            .ok_or_else(|| unresolvable("no addresses found".into()))
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_duration_ms)
    }

    pub fn rate_limit_prune_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_prune_secs)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = Config::default();
        assert_eq!((config.canvas_width, config.canvas_height), (400, 300));
        assert_eq!(config.rate_limit_points, 1);
        assert_eq!(config.rate_limit_window(), Duration::from_millis(100));
        assert_eq!(config.snapshot_interval(), Duration::from_secs(60));
        assert_eq!(config.server_port, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let config = Config {
            canvas_width: 0,
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "CANVAS_WIDTH",
                value: "0".into()
            })
        );

        let config = Config {
            rate_limit_points: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn listen_addr_accepts_literals_and_hostnames() {
        let config = Config {
            server_host: "127.0.0.1".into(),
            server_port: 3000,
            ..Config::default()
        };
        assert_eq!(
            config.listen_addr().await,
            Ok(SocketAddr::from(([127, 0, 0, 1], 3000)))
        );

        let config = Config {
            server_host: "::".into(),
            ..Config::default()
        };
        assert!(config.listen_addr().await.unwrap().ip().is_unspecified());

        let config = Config {
            server_host: "localhost".into(),
            server_port: 8080,
            ..Config::default()
        };
        let addr = config.listen_addr().await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 8080);
    }

    #[tokio::test]
    async fn bad_server_host_is_an_error() {
        let config = Config {
            server_host: "no such host.invalid".into(),
            ..Config::default()
        };
        assert!(matches!(
            config.listen_addr().await,
            Err(ConfigError::Unresolvable { host, .. }) if host == "no such host.invalid"
        ));
    }

    #[test]
    fn env_parsing_helpers() {
        // 使用不会与真实配置冲突的变量名
        unsafe {
            env::set_var("PIXEL_CANVAS_TEST_NUM", " 42 ");
            env::set_var("PIXEL_CANVAS_TEST_BAD", "forty");
            env::set_var("PIXEL_CANVAS_TEST_FLAG", "Yes");
        }
        assert_eq!(var_or("PIXEL_CANVAS_TEST_NUM", 0u32), Ok(42));
        assert_eq!(var_or("PIXEL_CANVAS_TEST_MISSING", 7u32), Ok(7));
        assert_eq!(
            var_or("PIXEL_CANVAS_TEST_BAD", 0u32),
            Err(ConfigError::Invalid {
                key: "PIXEL_CANVAS_TEST_BAD",
                value: "forty".into()
            })
        );
        assert_eq!(flag_or("PIXEL_CANVAS_TEST_FLAG", false), Ok(true));
        assert_eq!(flag_or("PIXEL_CANVAS_TEST_MISSING", true), Ok(true));
    }
}
