//! Safety-layer connection state machine and manager.
//!
//! Each channel runs a closed state machine (CLOSED, DOWN, START, UP,
//! RETR_REQ, RETR_RUN) that monitors sequence numbers and timestamps of the
//! peer's PDUs and resolves every protocol violation into a disconnect with a
//! coded reason. [`SafeCom`] owns the channels, routes inbound PDUs by their
//! sender/receiver ids and hands outbound PDUs to an [`SpduSink`].
//!
//! [`SpduSink`]: safecom_transport::SpduSink

pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod queue;
pub mod retransmission;
pub mod state;
pub mod timer;
pub mod transition;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ChannelAddress, Role, SafeComConfig, TimingConfig};
pub use connection::{ChannelSnapshot, Connection, Output};
pub use error::{Result, SafeComError};
pub use manager::{MessageSink, SafeCom};
pub use queue::EventQueue;
pub use retransmission::RetransmissionBuffer;
pub use state::{Event, Input, State};
pub use timer::{ChannelTimers, Expired};
pub use transition::{transition, Action, Checks, Step};
