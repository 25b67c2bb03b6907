/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Per-session configuration.

use rapidfix_core::error::ConfigError;
use rapidfix_core::types::CompId;
use rapidfix_dictionary::ParseConfig;
use rapidfix_transport::{ConnectSettings, SocketOptions};
use std::collections::HashMap;
use std::time::Duration;

/// Which side of the TCP connection this session takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Listens for the counterparty's connection.
    Acceptor,
    /// Initiates the connection and the logon exchange.
    Initiator,
}

/// Configuration for one FIX session.
///
/// Field defaults follow the recognized configuration surface; every value
/// can also be loaded from a string key/value map with
/// [`SessionConfig::from_map`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Protocol version (tag 8), e.g. `FIX.4.2`.
    pub begin_string: String,
    /// Our SenderCompID (tag 49).
    pub sender_comp_id: CompId,
    /// Our TargetCompID (tag 56).
    pub target_comp_id: CompId,
    /// Acceptor or initiator.
    pub role: SessionRole,
    /// Path of the FIX dictionary schema file.
    pub dictionary_path: String,
    /// Listening port (acceptor).
    pub accept_port: u16,
    /// Counterparty host (initiator).
    pub connect_host: String,
    /// Counterparty port (initiator).
    pub connect_port: u16,
    /// Per-address connect timeout.
    pub connect_timeout: Duration,
    /// Heartbeat interval (tag 108).
    pub heartbeat_interval: Duration,
    /// Minimum spacing between logon attempts.
    pub logon_interval: Duration,
    /// Minimum spacing between reconnect attempts.
    pub reconnect_interval: Duration,
    /// Multiplier on the heartbeat interval before a TestRequest fires.
    pub test_request_threshold: f64,
    /// Tolerated |now - SendingTime| skew.
    pub sending_time_threshold: Duration,
    /// Reset both sequence numbers (and the store) on logon.
    pub reset_seq_num_on_logon: bool,
    /// Recover from parse violations instead of failing.
    pub relaxed_parsing: bool,
    /// Log parse warnings and errors.
    pub loud_parsing: bool,
    /// Reject messages missing required-marked fields.
    pub validate_required_fields: bool,
    /// Apply TCP_NODELAY.
    pub tcp_nodelay: bool,
    /// Apply TCP_QUICKACK where supported.
    pub tcp_quickack: bool,
    /// Stamp TestMessageIndicator (464) and require agreement from peers.
    pub test_session: bool,
}

impl SessionConfig {
    /// Creates a configuration with spec defaults.
    #[must_use]
    pub fn new(
        begin_string: impl Into<String>,
        sender_comp_id: CompId,
        target_comp_id: CompId,
        role: SessionRole,
    ) -> Self {
        Self {
            begin_string: begin_string.into(),
            sender_comp_id,
            target_comp_id,
            role,
            dictionary_path: String::new(),
            accept_port: 0,
            connect_host: String::new(),
            connect_port: 0,
            connect_timeout: Duration::from_millis(5000),
            heartbeat_interval: Duration::from_secs(10),
            logon_interval: Duration::from_secs(10),
            reconnect_interval: Duration::from_secs(10),
            test_request_threshold: 2.0,
            sending_time_threshold: Duration::from_secs(10),
            reset_seq_num_on_logon: false,
            relaxed_parsing: false,
            loud_parsing: true,
            validate_required_fields: false,
            tcp_nodelay: true,
            tcp_quickack: true,
            test_session: false,
        }
    }

    /// Loads a configuration from a string key/value map.
    ///
    /// Unknown keys are logged and ignored so configurations stay forward
    /// compatible.
    ///
    /// # Errors
    /// [`ConfigError`] when a required key is missing or a value does not
    /// parse as its declared type.
    pub fn from_map(settings: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let require = |key: &'static str| {
            settings
                .get(key)
                .cloned()
                .ok_or(ConfigError::MissingKey { key })
        };

        let sender = require("SenderCompID")?;
        let sender_comp_id = CompId::new(&sender).ok_or_else(|| ConfigError::InvalidValue {
            key: "SenderCompID".to_string(),
            value: sender.clone(),
        })?;
        let target = require("TargetCompID")?;
        let target_comp_id = CompId::new(&target).ok_or_else(|| ConfigError::InvalidValue {
            key: "TargetCompID".to_string(),
            value: target.clone(),
        })?;

        let role_raw = require("SessionType")?;
        let role = match role_raw.to_lowercase().as_str() {
            "acceptor" => SessionRole::Acceptor,
            "initiator" => SessionRole::Initiator,
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: "SessionType".to_string(),
                    value: role_raw,
                })
            }
        };

        let mut config = Self::new(require("BeginString")?, sender_comp_id, target_comp_id, role);

        const KNOWN: &[&str] = &[
            "BeginString",
            "SenderCompID",
            "TargetCompID",
            "SessionType",
            "FIXDictionary",
            "AcceptPort",
            "ConnectHost",
            "ConnectPort",
            "ConnectTimeout",
            "HeartbeatInterval",
            "LogonInterval",
            "ReconnectInterval",
            "TestRequestThreshold",
            "SendingTimeThreshold",
            "ResetSeqNumOnLogon",
            "RelaxedParsing",
            "LoudParsing",
            "ValidateRequiredFields",
            "TCPNoDelay",
            "TCPQuickAck",
            "TestSession",
        ];
        for key in settings.keys() {
            if !KNOWN.contains(&key.as_str()) {
                tracing::warn!(key, "unknown session configuration key");
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

        fn parse_flag(
            settings: &HashMap<String, String>,
            key: &str,
        ) -> Result<Option<bool>, ConfigError> {
            settings
                .get(key)
                .map(|raw| match raw.to_lowercase().as_str() {
                    "1" | "y" | "true" => Ok(true),
                    "0" | "n" | "false" => Ok(false),
                    _ => Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        value: raw.clone(),
                    }),
                })
                .transpose()
        }

        if let Some(path) = settings.get("FIXDictionary") {
            config.dictionary_path = path.clone();
        }
        if let Some(port) = parse::<u16>(settings, "AcceptPort")? {
            config.accept_port = port;
        }
        if let Some(host) = settings.get("ConnectHost") {
            config.connect_host = host.clone();
        }
        if let Some(port) = parse::<u16>(settings, "ConnectPort")? {
            config.connect_port = port;
        }
        if let Some(ms) = parse::<u64>(settings, "ConnectTimeout")? {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse::<u64>(settings, "HeartbeatInterval")? {
            config.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(settings, "LogonInterval")? {
            config.logon_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(settings, "ReconnectInterval")? {
            config.reconnect_interval = Duration::from_secs(secs);
        }
        if let Some(threshold) = parse::<f64>(settings, "TestRequestThreshold")? {
            config.test_request_threshold = threshold;
        }
        if let Some(secs) = parse::<u64>(settings, "SendingTimeThreshold")? {
            config.sending_time_threshold = Duration::from_secs(secs);
        }
        if let Some(flag) = parse_flag(settings, "ResetSeqNumOnLogon")? {
            config.reset_seq_num_on_logon = flag;
        }
        if let Some(flag) = parse_flag(settings, "RelaxedParsing")? {
            config.relaxed_parsing = flag;
        }
        if let Some(flag) = parse_flag(settings, "LoudParsing")? {
            config.loud_parsing = flag;
        }
        if let Some(flag) = parse_flag(settings, "ValidateRequiredFields")? {
            config.validate_required_fields = flag;
        }
        if let Some(flag) = parse_flag(settings, "TCPNoDelay")? {
            config.tcp_nodelay = flag;
        }
        if let Some(flag) = parse_flag(settings, "TCPQuickAck")? {
            config.tcp_quickack = flag;
        }
        if let Some(flag) = parse_flag(settings, "TestSession")? {
            config.test_session = flag;
        }

        Ok(config)
    }

    /// The local session identifier: `sender:target`.
    #[must_use]
    pub fn session_id(&self) -> String {
        format!("{}:{}", self.sender_comp_id, self.target_comp_id)
    }

    /// Parse behavior derived from the parsing flags.
    #[must_use]
    pub fn parse_config(&self) -> ParseConfig {
        ParseConfig {
            loud: self.loud_parsing,
            strict: !self.relaxed_parsing,
            validate_required: self.validate_required_fields,
        }
    }

    /// Socket options derived from the TCP flags.
    #[must_use]
    pub fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            nodelay: self.tcp_nodelay,
            quickack: self.tcp_quickack,
        }
    }

    /// Connect parameters for the initiator side.
    #[must_use]
    pub fn connect_settings(&self) -> ConnectSettings {
        ConnectSettings {
            host: self.connect_host.clone(),
            port: self.connect_port,
            timeout: self.connect_timeout,
            options: self.socket_options(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_map() -> HashMap<String, String> {
        [
            ("BeginString", "FIX.4.2"),
            ("SenderCompID", "LEFT"),
            ("TargetCompID", "RIGHT"),
            ("SessionType", "initiator"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::from_map(&base_map()).unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Duration::from_millis(5000));
        assert_eq!(config.test_request_threshold, 2.0);
        assert!(!config.reset_seq_num_on_logon);
        assert!(!config.relaxed_parsing);
        assert!(config.loud_parsing);
        assert!(config.tcp_nodelay);
        assert_eq!(config.session_id(), "LEFT:RIGHT");
    }

    #[test]
    fn test_overrides() {
        let mut map = base_map();
        map.insert("HeartbeatInterval".to_string(), "30".to_string());
        map.insert("ConnectTimeout".to_string(), "250".to_string());
        map.insert("RelaxedParsing".to_string(), "Y".to_string());
        map.insert("TCPNoDelay".to_string(), "false".to_string());

        let config = SessionConfig::from_map(&map).unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert!(config.relaxed_parsing);
        assert!(!config.tcp_nodelay);
        assert!(!config.parse_config().strict);
    }

    #[test]
    fn test_missing_required_key() {
        let mut map = base_map();
        map.remove("SenderCompID");
        assert!(matches!(
            SessionConfig::from_map(&map),
            Err(ConfigError::MissingKey {
                key: "SenderCompID"
            })
        ));
    }

    #[test]
    fn test_bad_session_type() {
        let mut map = base_map();
        map.insert("SessionType".to_string(), "middleman".to_string());
        assert!(matches!(
            SessionConfig::from_map(&map),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_bad_numeric_value() {
        let mut map = base_map();
        map.insert("AcceptPort".to_string(), "not-a-port".to_string());
        assert!(matches!(
            SessionConfig::from_map(&map),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_role_case_insensitive() {
        let mut map = base_map();
        map.insert("SessionType".to_string(), "ACCEPTOR".to_string());
        let config = SessionConfig::from_map(&map).unwrap();
        assert_eq!(config.role, SessionRole::Acceptor);
    }
}
