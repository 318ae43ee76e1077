use bytes::Bytes;
use rand::Rng;
use safecom_pdu::{ConnectionPayload, DiscReason, DisconnectPayload, MessageType, Pdu};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::{ChannelAddress, Role, SafeComConfig};
use crate::error::Result;
use crate::retransmission::RetransmissionBuffer;
use crate::state::{Input, State};
use crate::timer::{ChannelTimers, Expired};
use crate::transition::{transition, Action, Checks};

/// What one input produced.
#[derive(Debug, Default)]
pub struct Output {
    /// Sealed frames to send, in order.
    pub frames: Vec<Pdu>,
    /// DATA payload received in sequence.
    pub delivered: Option<Bytes>,
    /// Reason of the DISCONNECTION_REQUEST sent, if any.
    pub disconnect: Option<DiscReason>,
}

/// Point-in-time view of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub channel: u32,
    pub local_id: u32,
    pub remote_id: u32,
    pub role: Role,
    pub state: State,
    pub snt: u32,
    pub snr: u32,
    pub cst: u32,
    pub csr: u32,
    pub tsr: u32,
    pub ctsr: u32,
    pub ti: u32,
    pub trtd: u32,
    pub peer_n_send_max: Option<u16>,
    pub unconfirmed: usize,
}

/// Context of one channel: state, counters, timers and unconfirmed data.
#[derive(Debug, Clone)]
pub struct Connection {
    channel: u32,
    address: ChannelAddress,
    role: Role,
    state: State,
    snt: u32,
    snr: u32,
    cst: u32,
    csr: u32,
    tsr: u32,
    ctsr: u32,
    max_message_age: u32,
    ti: u32,
    trtd: u32,
    n_send_max: u16,
    peer_n_send_max: Option<u16>,
    buffer: RetransmissionBuffer,
    timers: ChannelTimers,
}

impl Connection {
    pub fn new(channel: u32, config: &SafeComConfig) -> Self {
        let tmax = config.timing.max_message_age;
        Self {
            channel,
            address: config.address(channel),
            role: config.role,
            state: State::Closed,
            snt: 0,
            snr: 0,
            cst: 0,
            csr: 0,
            tsr: 0,
            ctsr: 0,
            max_message_age: tmax,
            ti: tmax,
            trtd: 0,
            n_send_max: config.n_send_max,
            peer_n_send_max: None,
            buffer: RetransmissionBuffer::new(config.retransmission_capacity),
            timers: ChannelTimers::new(config.timing.heartbeat_period, tmax),
        }
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    pub fn address(&self) -> ChannelAddress {
        self.address
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            channel: self.channel,
            local_id: self.address.local_id,
            remote_id: self.address.remote_id,
            role: self.role,
            state: self.state,
            snt: self.snt,
            snr: self.snr,
            cst: self.cst,
            csr: self.csr,
            tsr: self.tsr,
            ctsr: self.ctsr,
            ti: self.ti,
            trtd: self.trtd,
            peer_n_send_max: self.peer_n_send_max,
            unconfirmed: self.buffer.len(),
        }
    }

    /// Timers that elapsed by `now`.
    pub fn expired_timers(&mut self, now: u32) -> Expired {
        self.timers.expired(now)
    }

    /// Run one input through the transition table and carry out its action.
    pub fn apply<R: Rng>(&mut self, input: Input, now: u32, rng: &mut R) -> Result<Output> {
        let event = input.event();
        let (payload, pdu) = match input {
            Input::Send(payload) => (Some(payload), None),
            Input::Receive(pdu) => (None, Some(pdu)),
            _ => (None, None),
        };

        let checks = match &pdu {
            Some(pdu) => {
                if self.state.monitors_peer() {
                    self.timers.on_received(now);
                }
                self.checks(pdu)
            }
            None => Checks::PASS,
        };

        let step = transition(self.state, self.role, event, checks);
        if step.action.is_noop() && step.next == self.state {
            trace!(channel = self.channel, state = %self.state, %event, "event ignored");
            return Ok(Output::default());
        }
        trace!(
            channel = self.channel,
            state = %self.state,
            %event,
            action = ?step.action,
            "transition"
        );

        let mut out = Output::default();
        self.perform(step.action, payload, pdu.as_ref(), now, rng, &mut out)?;

        let from = self.state;
        self.state = step.next;
        self.sync_timers(now);

        if from != self.state {
            debug!(channel = self.channel, %from, to = %self.state, %event, "state change");
        }
        if let Some(reason) = out.disconnect {
            info!(channel = self.channel, %reason, %event, "disconnected");
        }
        Ok(out)
    }

    fn checks(&self, pdu: &Pdu) -> Checks {
        let version_ok = match pdu.message_type {
            MessageType::ConnectionRequest | MessageType::ConnectionResponse => {
                ConnectionPayload::decode(&pdu.payload).is_ok_and(|p| p.version_matches())
            }
            _ => true,
        };
        let retransmission_available = pdu.message_type != MessageType::RetransmissionRequest
            || self
                .buffer
                .has_unsent_range(pdu.confirmed_sequence_number.wrapping_add(1));

        Checks {
            sequence_in_order: pdu.sequence_number == self.snr,
            timestamp_in_window: pdu.confirmed_timestamp.wrapping_sub(self.ctsr)
                < self.max_message_age,
            version_ok,
            retransmission_available,
        }
    }

    fn perform<R: Rng>(
        &mut self,
        action: Action,
        payload: Option<Bytes>,
        pdu: Option<&Pdu>,
        now: u32,
        rng: &mut R,
        out: &mut Output,
    ) -> Result<()> {
        match (action, pdu) {
            (Action::Ignore, _) => {}
            (Action::Reset, _) => self.reset(rng.gen()),
            (Action::ResetAndConnect, _) => {
                self.reset(rng.gen());
                let payload = ConnectionPayload::new(self.n_send_max).encode();
                self.send(MessageType::ConnectionRequest, payload, now, out)?;
            }
            (Action::Close, pdu) => {
                if let Some(pdu) = pdu {
                    debug!(channel = self.channel, seq = pdu.sequence_number, "peer closed");
                }
                self.reset(0);
            }
            (Action::Disconnect(reason), pdu) => {
                if let Some(pdu) = pdu {
                    self.cst = pdu.sequence_number;
                }
                let payload = DisconnectPayload::new(reason).encode();
                self.send(MessageType::DisconnectionRequest, payload, now, out)?;
                out.disconnect = Some(reason);
                self.reset(0);
            }
            (Action::AcceptConnection, Some(pdu)) => {
                self.snr = pdu.sequence_number.wrapping_add(1);
                self.cst = pdu.sequence_number;
                self.tsr = pdu.timestamp;
                self.peer_n_send_max = peer_n_send_max(pdu);
                let payload = ConnectionPayload::new(self.n_send_max).encode();
                self.send(MessageType::ConnectionResponse, payload, now, out)?;
                // the client confirms our response timestamp first
                self.ctsr = now;
            }
            (Action::CompleteConnection, Some(pdu)) => {
                self.accept_in_sequence(pdu);
                self.peer_n_send_max = peer_n_send_max(pdu);
                self.measure_round_trip(pdu, now);
                self.send(MessageType::Heartbeat, Bytes::new(), now, out)?;
            }
            (Action::ConfirmConnection, Some(pdu)) => {
                self.accept_in_sequence(pdu);
                self.measure_round_trip(pdu, now);
            }
            (Action::SendData, _) => {
                if let Some(payload) = payload {
                    let seq = self.snt;
                    self.send(MessageType::Data, payload.clone(), now, out)?;
                    self.buffer.push(seq, payload);
                }
            }
            (Action::Receive, Some(pdu)) => {
                self.accept_in_sequence(pdu);
                if matches!(
                    pdu.message_type,
                    MessageType::Data | MessageType::RetransmittedData
                ) {
                    out.delivered = Some(pdu.payload.clone());
                }
            }
            (Action::RequestRetransmission, _) => {
                if let Some(pdu) = pdu {
                    debug!(
                        channel = self.channel,
                        expected = self.snr,
                        seq = pdu.sequence_number,
                        "sequence gap, requesting retransmission"
                    );
                }
                self.send(MessageType::RetransmissionRequest, Bytes::new(), now, out)?;
            }
            (Action::Retransmit { regular_receipt }, Some(pdu)) => {
                if regular_receipt {
                    self.accept_in_sequence(pdu);
                } else {
                    self.csr = pdu.confirmed_sequence_number;
                    self.buffer.confirm(self.csr);
                }
                let replay = self
                    .buffer
                    .replay(pdu.confirmed_sequence_number.wrapping_add(1));
                debug!(
                    channel = self.channel,
                    frames = replay.len(),
                    "retransmitting unconfirmed data"
                );
                self.send(MessageType::RetransmissionResponse, Bytes::new(), now, out)?;
                for payload in replay {
                    let seq = self.snt;
                    self.send(MessageType::RetransmittedData, payload.clone(), now, out)?;
                    self.buffer.push(seq, payload);
                }
            }
            (Action::ResyncRetransmission, Some(pdu)) => self.accept_in_sequence(pdu),
            (Action::Heartbeat, _) => {
                self.send(MessageType::Heartbeat, Bytes::new(), now, out)?;
            }
            (action, None) => {
                warn!(channel = self.channel, ?action, "action needs a received pdu");
            }
        }
        Ok(())
    }

    /// Regular receipt: adopt the counters of an accepted PDU.
    fn accept_in_sequence(&mut self, pdu: &Pdu) {
        self.snr = pdu.sequence_number.wrapping_add(1);
        self.cst = pdu.sequence_number;
        self.csr = pdu.confirmed_sequence_number;
        self.tsr = pdu.timestamp;
        self.ctsr = pdu.confirmed_timestamp;
        self.buffer.confirm(self.csr);
    }

    /// Trtd = now - confirmed timestamp, Ti = Tmax - Trtd.
    fn measure_round_trip(&mut self, pdu: &Pdu, now: u32) {
        self.trtd = now.wrapping_sub(pdu.confirmed_timestamp);
        self.ti = self.max_message_age.saturating_sub(self.trtd);
        self.timers.set_incoming_window(self.ti);
        debug!(channel = self.channel, trtd = self.trtd, ti = self.ti, "round trip measured");
    }

    fn reset(&mut self, initial_snt: u32) {
        self.snt = initial_snt;
        self.snr = 0;
        self.cst = 0;
        self.csr = 0;
        self.tsr = 0;
        self.ctsr = 0;
        self.ti = self.max_message_age;
        self.trtd = 0;
        self.peer_n_send_max = None;
        self.buffer.clear();
        self.timers.set_incoming_window(self.ti);
    }

    /// Build, seal and queue one frame; it takes the next send sequence number.
    fn send(
        &mut self,
        message_type: MessageType,
        payload: Bytes,
        now: u32,
        out: &mut Output,
    ) -> Result<()> {
        let mut pdu = Pdu::new(message_type, payload);
        pdu.receiver_id = self.address.remote_id;
        pdu.sender_id = self.address.local_id;
        pdu.sequence_number = self.snt;
        pdu.confirmed_sequence_number = self.cst;
        pdu.timestamp = now;
        pdu.confirmed_timestamp = self.tsr;
        pdu.seal()?;

        self.snt = self.snt.wrapping_add(1);
        self.timers.on_sent(now);
        out.frames.push(pdu);
        Ok(())
    }

    fn sync_timers(&mut self, now: u32) {
        match (self.state.monitors_peer(), self.timers.is_armed()) {
            (true, false) => self.timers.arm(now),
            (false, true) => self.timers.disarm(),
            _ => {}
        }
    }
}

fn peer_n_send_max(pdu: &Pdu) -> Option<u16> {
    ConnectionPayload::decode(&pdu.payload)
        .ok()
        .map(|p| p.n_send_max)
}
