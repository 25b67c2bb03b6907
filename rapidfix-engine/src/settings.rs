/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Process-wide platform settings.
//!
//! Unlike the per-session configuration, these values are shared by every
//! session an engine hosts. They are plain data threaded through
//! construction, so tests can run several isolated engines in one process.

use rapidfix_core::error::ConfigError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Process-wide engine settings.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Worker threads for the I/O runtime.
    pub input_threads: usize,
    /// Dispatcher queues serializing session work.
    pub writer_threads: usize,
    /// Period of the per-session tick.
    pub update_delay: Duration,
    /// Readiness-poll bound for the I/O runtime.
    pub epoll_timeout: Duration,
    /// Directory for event and message logs.
    pub log_path: PathBuf,
    /// Directory for session store files.
    pub data_path: PathBuf,
    /// Port reserved for the administrative page (served elsewhere).
    pub admin_website_port: u16,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            input_threads: 10,
            writer_threads: 4,
            update_delay: Duration::from_millis(100),
            epoll_timeout: Duration::from_millis(1000),
            log_path: PathBuf::from("log"),
            data_path: PathBuf::from("data"),
            admin_website_port: 8080,
        }
    }
}

impl PlatformConfig {
    /// Loads platform settings from a string key/value map. Unknown keys
    /// warn and are ignored.
    ///
    /// # Errors
    /// [`ConfigError::InvalidValue`] when a value does not parse.
    pub fn from_map(settings: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        const KNOWN: &[&str] = &[
            "InputThreads",
            "WriterThreads",
            "UpdateDelay",
            "EpollTimeout",
            "LogPath",
            "DataPath",
            "AdminWebsitePort",
        ];
        for key in settings.keys() {
            if !KNOWN.contains(&key.as_str()) {
                tracing::warn!(key, "unknown platform configuration key");
            }
        }

        fn parse<T: std::str::FromStr>(
            settings: &HashMap<String, String>,
            key: &str,
        ) -> Result<Option<T>, ConfigError> {
            settings
                .get(key)
                .map(|raw| {
                    raw.parse().map_err(|_| ConfigError::InvalidValue {
                        key: key.to_string(),
                        value: raw.clone(),
                    })
                })
                .transpose()
        }

        if let Some(threads) = parse::<usize>(settings, "InputThreads")? {
            config.input_threads = threads.max(1);
        }
        if let Some(threads) = parse::<usize>(settings, "WriterThreads")? {
            config.writer_threads = threads.max(1);
        }
        if let Some(ms) = parse::<u64>(settings, "UpdateDelay")? {
            config.update_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64>(settings, "EpollTimeout")? {
            config.epoll_timeout = Duration::from_millis(ms);
        }
        if let Some(path) = settings.get("LogPath") {
            config.log_path = PathBuf::from(path);
        }
        if let Some(path) = settings.get("DataPath") {
            config.data_path = PathBuf::from(path);
        }
        if let Some(port) = parse::<u16>(settings, "AdminWebsitePort")? {
            config.admin_website_port = port;
        }

        Ok(config)
    }

    /// Builds a multi-threaded I/O runtime sized by `InputThreads`, with
    /// event polling bounded by `EpollTimeout`.
    ///
    /// # Errors
    /// Propagates runtime construction failures.
    pub fn runtime(&self) -> std::io::Result<tokio::runtime::Runtime> {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.input_threads)
            .max_io_events_per_tick(1024)
            .event_interval(61)
            .enable_all()
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlatformConfig::default();
        assert_eq!(config.input_threads, 10);
        assert_eq!(config.update_delay, Duration::from_millis(100));
        assert_eq!(config.log_path, PathBuf::from("log"));
        assert_eq!(config.admin_website_port, 8080);
    }

    #[test]
    fn test_from_map_overrides() {
        let settings: HashMap<String, String> = [
            ("InputThreads", "2"),
            ("UpdateDelay", "50"),
            ("DataPath", "/var/lib/fix"),
            ("AdminWebsitePort", "9000"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = PlatformConfig::from_map(&settings).unwrap();
        assert_eq!(config.input_threads, 2);
        assert_eq!(config.update_delay, Duration::from_millis(50));
        assert_eq!(config.data_path, PathBuf::from("/var/lib/fix"));
        assert_eq!(config.admin_website_port, 9000);
    }

    #[test]
    fn test_invalid_value() {
        let settings: HashMap<String, String> =
            [("InputThreads".to_string(), "many".to_string())].into();
        assert!(matches!(
            PlatformConfig::from_map(&settings),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_threads_clamped() {
        let settings: HashMap<String, String> =
            [("InputThreads".to_string(), "0".to_string())].into();
        let config = PlatformConfig::from_map(&settings).unwrap();
        assert_eq!(config.input_threads, 1);
    }
}
