use std::fmt;

use safecom_pdu::DEFAULT_N_SEND_MAX;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SafeComError};

/// Maximum instance name length in bytes.
pub const MAX_INSTANCE_NAME_LEN: usize = 10;

/// Default capacity of each channel's event queue.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 10;

/// Default number of unconfirmed DATA payloads kept for retransmission.
pub const DEFAULT_RETRANSMISSION_CAPACITY: usize = 32;

/// Which side initiates connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sends CONNECTION_REQUEST on open.
    #[default]
    Client,
    /// Waits in DOWN for a CONNECTION_REQUEST.
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Server => f.write_str("server"),
        }
    }
}

/// Protocol timing in clock ticks (milliseconds for [`crate::SystemClock`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Heartbeat period Th.
    pub heartbeat_period: u32,
    /// Maximum accepted message age Tmax.
    pub max_message_age: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat_period: 300,
            max_message_age: 1000,
        }
    }
}

/// Sender/receiver ids of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAddress {
    /// Our id, written as `sender_id`.
    pub local_id: u32,
    /// The peer's id, written as `receiver_id`.
    pub remote_id: u32,
}

impl ChannelAddress {
    pub fn new(local_id: u32, remote_id: u32) -> Self {
        Self {
            local_id,
            remote_id,
        }
    }
}

/// Manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeComConfig {
    pub instance_name: String,
    pub role: Role,
    pub channel_count: u32,
    pub timing: TimingConfig,
    pub event_queue_capacity: usize,
    pub retransmission_capacity: usize,
    /// Receive buffer size advertised in connection payloads.
    pub n_send_max: u16,
    /// Per-channel address overrides. Empty means channel `n` uses `(n, n)`.
    pub addresses: Vec<ChannelAddress>,
    /// Seed for initial sequence numbers. `None` seeds from the OS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl Default for SafeComConfig {
    fn default() -> Self {
        Self {
            instance_name: "safecom".to_string(),
            role: Role::default(),
            channel_count: 1,
            timing: TimingConfig::default(),
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            retransmission_capacity: DEFAULT_RETRANSMISSION_CAPACITY,
            n_send_max: DEFAULT_N_SEND_MAX,
            addresses: Vec::new(),
            rng_seed: None,
        }
    }
}

impl SafeComConfig {
    pub fn new(role: Role, channel_count: u32) -> Self {
        Self {
            role,
            channel_count,
            ..Self::default()
        }
    }

    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = name.into();
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_channel_count(mut self, count: u32) -> Self {
        self.channel_count = count;
        self
    }

    pub fn with_timing(mut self, heartbeat_period: u32, max_message_age: u32) -> Self {
        self.timing = TimingConfig {
            heartbeat_period,
            max_message_age,
        };
        self
    }

    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity;
        self
    }

    pub fn with_retransmission_capacity(mut self, capacity: usize) -> Self {
        self.retransmission_capacity = capacity;
        self
    }

    pub fn with_addresses(mut self, addresses: Vec<ChannelAddress>) -> Self {
        self.addresses = addresses;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Address of `channel`, falling back to `(channel, channel)`.
    pub fn address(&self, channel: u32) -> ChannelAddress {
        self.addresses
            .get(channel as usize)
            .copied()
            .unwrap_or(ChannelAddress::new(channel, channel))
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SafeComError::InvalidConfig(msg));

        if self.instance_name.len() > MAX_INSTANCE_NAME_LEN {
            return invalid(format!(
                "instance name '{}' exceeds {MAX_INSTANCE_NAME_LEN} bytes",
                self.instance_name
            ));
        }
        if self.channel_count == 0 {
            return invalid("channel count must be at least 1".to_string());
        }
        let TimingConfig {
            heartbeat_period,
            max_message_age,
        } = self.timing;
        if heartbeat_period == 0 || heartbeat_period >= max_message_age {
            return invalid(format!(
                "heartbeat period {heartbeat_period} must be non-zero and below max message age {max_message_age}"
            ));
        }
        if self.event_queue_capacity == 0 {
            return invalid("event queue capacity must be at least 1".to_string());
        }
        if self.retransmission_capacity == 0 {
            return invalid("retransmission capacity must be at least 1".to_string());
        }
        if !self.addresses.is_empty() {
            if self.addresses.len() != self.channel_count as usize {
                return invalid(format!(
                    "{} addresses configured for {} channels",
                    self.addresses.len(),
                    self.channel_count
                ));
            }
            for (i, a) in self.addresses.iter().enumerate() {
                if self.addresses[..i]
                    .iter()
                    .any(|b| b.local_id == a.local_id && b.remote_id == a.remote_id)
                {
                    return invalid(format!(
                        "duplicate address ({}, {})",
                        a.local_id, a.remote_id
                    ));
                }
            }
        }
        Ok(())
    }
}
