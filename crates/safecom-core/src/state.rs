use std::fmt;

use bytes::Bytes;
use safecom_pdu::{MessageType, Pdu};
use serde::{Deserialize, Serialize};

/// Connection state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    #[default]
    Closed,
    Down,
    Start,
    Up,
    RetrReq,
    RetrRun,
}

impl State {
    /// States in which heartbeat and incoming-message timers run.
    pub fn monitors_peer(self) -> bool {
        matches!(self, Self::Start | Self::Up | Self::RetrReq | Self::RetrRun)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Down => "DOWN",
            Self::Start => "START",
            Self::Up => "UP",
            Self::RetrReq => "RETR_REQ",
            Self::RetrRun => "RETR_RUN",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Events of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    OpenConn,
    CloseConn,
    SendData,
    RecvConnReq,
    RecvConnResp,
    RecvRetrReq,
    RecvRetrResp,
    RecvDiscReq,
    RecvHb,
    RecvData,
    RecvRetrData,
    /// Heartbeat period elapsed.
    ThElapsed,
    /// Incoming-message window elapsed.
    TiElapsed,
}

impl Event {
    pub fn name(self) -> &'static str {
        match self {
            Self::OpenConn => "OPEN_CONN",
            Self::CloseConn => "CLOSE_CONN",
            Self::SendData => "SEND_DATA",
            Self::RecvConnReq => "RECV_CONN_REQ",
            Self::RecvConnResp => "RECV_CONN_RESP",
            Self::RecvRetrReq => "RECV_RETR_REQ",
            Self::RecvRetrResp => "RECV_RETR_RESP",
            Self::RecvDiscReq => "RECV_DISC_REQ",
            Self::RecvHb => "RECV_HB",
            Self::RecvData => "RECV_DATA",
            Self::RecvRetrData => "RECV_RETR_DATA",
            Self::ThElapsed => "TH_ELAPSED",
            Self::TiElapsed => "TI_ELAPSED",
        }
    }
}

impl From<MessageType> for Event {
    fn from(message_type: MessageType) -> Self {
        match message_type {
            MessageType::ConnectionRequest => Self::RecvConnReq,
            MessageType::ConnectionResponse => Self::RecvConnResp,
            MessageType::RetransmissionRequest => Self::RecvRetrReq,
            MessageType::RetransmissionResponse => Self::RecvRetrResp,
            MessageType::DisconnectionRequest => Self::RecvDiscReq,
            MessageType::Heartbeat => Self::RecvHb,
            MessageType::Data => Self::RecvData,
            MessageType::RetransmittedData => Self::RecvRetrData,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An event together with the data it carries, as queued per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Open,
    Close,
    Send(Bytes),
    Receive(Pdu),
    HeartbeatElapsed,
    IncomingElapsed,
}

impl Input {
    pub fn event(&self) -> Event {
        match self {
            Self::Open => Event::OpenConn,
            Self::Close => Event::CloseConn,
            Self::Send(_) => Event::SendData,
            Self::Receive(pdu) => Event::from(pdu.message_type),
            Self::HeartbeatElapsed => Event::ThElapsed,
            Self::IncomingElapsed => Event::TiElapsed,
        }
    }
}
