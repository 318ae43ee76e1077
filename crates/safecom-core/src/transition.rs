//! The state transition table.
//!
//! [`transition`] is a pure function of the current state, the channel role,
//! the event and the outcome of the checks the channel ran on the inbound PDU.
//! It decides what to do and where to go; [`crate::Connection`] carries the
//! decision out.

use safecom_pdu::DiscReason;

use crate::config::Role;
use crate::state::{Event, State};

/// Results of the checks run on an inbound PDU before the transition.
///
/// Fields that do not apply to an event are ignored by the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checks {
    /// `sequence_number == snr`.
    pub sequence_in_order: bool,
    /// `confirmed_timestamp - ctsr` lies in `[0, Tmax)`, wrapping.
    pub timestamp_in_window: bool,
    /// Connection payload carries our protocol version.
    pub version_ok: bool,
    /// Everything the peer asks to have retransmitted is still buffered.
    pub retransmission_available: bool,
}

impl Checks {
    /// Every check passes.
    pub const PASS: Self = Self {
        sequence_in_order: true,
        timestamp_in_window: true,
        version_ok: true,
        retransmission_available: true,
    };
}

impl Default for Checks {
    fn default() -> Self {
        Self::PASS
    }
}

/// Side effect of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing happens.
    Ignore,
    /// Reset counters and draw a random initial send sequence number.
    Reset,
    /// Reset, then send CONNECTION_REQUEST.
    ResetAndConnect,
    /// Reset without telling the peer.
    Close,
    /// Send DISCONNECTION_REQUEST with the reason, then reset.
    Disconnect(DiscReason),
    /// Server: adopt the peer's counters and send CONNECTION_RESPONSE.
    AcceptConnection,
    /// Client: adopt the peer's counters, measure Trtd and send HEARTBEAT.
    CompleteConnection,
    /// Server: regular receipt of the first HEARTBEAT and Trtd measurement.
    ConfirmConnection,
    /// Send a DATA frame.
    SendData,
    /// Regular receipt; DATA payloads are delivered.
    Receive,
    /// Send RETRANSMISSION_REQUEST.
    RequestRetransmission,
    /// Send RETRANSMISSION_RESPONSE followed by the unconfirmed DATA as
    /// RETRANSMITTED_DATA. With `regular_receipt` the request is also taken
    /// as the next in-sequence PDU.
    Retransmit { regular_receipt: bool },
    /// Adopt the counters of a RETRANSMISSION_RESPONSE.
    ResyncRetransmission,
    /// Send HEARTBEAT.
    Heartbeat,
}

impl Action {
    /// Whether the action leaves the channel untouched.
    pub fn is_noop(self) -> bool {
        matches!(self, Self::Ignore)
    }
}

/// Outcome of [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    pub next: State,
}

impl Step {
    fn new(action: Action, next: State) -> Self {
        Self { action, next }
    }

    fn stay(state: State) -> Self {
        Self::new(Action::Ignore, state)
    }

    fn disconnect(reason: DiscReason) -> Self {
        Self::new(Action::Disconnect(reason), State::Closed)
    }
}

/// Look up the transition for `event` in `state`.
pub fn transition(state: State, role: Role, event: Event, checks: Checks) -> Step {
    use DiscReason::*;
    use Event::*;

    match (state, event) {
        (State::Closed, OpenConn) => match role {
            Role::Server => Step::new(Action::Reset, State::Down),
            Role::Client => Step::new(Action::ResetAndConnect, State::Start),
        },
        (State::Closed, _) => Step::stay(State::Closed),

        (State::Down, OpenConn | CloseConn | SendData | RecvDiscReq) => {
            Step::new(Action::Close, State::Closed)
        }
        (State::Down, RecvConnReq) if checks.version_ok => {
            Step::new(Action::AcceptConnection, State::Start)
        }
        (State::Down, RecvConnReq) => Step::disconnect(ProtocolVersionError),
        (State::Down, TiElapsed) => Step::disconnect(TimeoutIncomingMsg),
        (State::Down, _) => Step::stay(State::Down),

        (State::Start, OpenConn | SendData) => Step::disconnect(StateServiceNotAllowed),
        (State::Start, CloseConn) => Step::disconnect(UserRequest),
        (State::Start, RecvConnReq | RecvRetrReq | RecvRetrResp | RecvData | RecvRetrData) => {
            Step::disconnect(NotExpectedRecvMsgType)
        }
        (State::Start, RecvConnResp) => match role {
            Role::Server => Step::disconnect(NotExpectedRecvMsgType),
            Role::Client if checks.version_ok => {
                Step::new(Action::CompleteConnection, State::Up)
            }
            Role::Client => Step::disconnect(ProtocolVersionError),
        },
        (State::Start, RecvHb) => match role {
            Role::Client => Step::disconnect(NotExpectedRecvMsgType),
            Role::Server if !checks.sequence_in_order => Step::disconnect(SeqNbrErrForConnection),
            Role::Server if !checks.timestamp_in_window => Step::disconnect(SeqErr),
            Role::Server => Step::new(Action::ConfirmConnection, State::Up),
        },

        (State::Up, SendData) => Step::new(Action::SendData, State::Up),
        (State::Up, RecvConnReq | RecvConnResp | RecvRetrResp | RecvRetrData) => {
            Step::disconnect(NotExpectedRecvMsgType)
        }
        (State::Up, RecvRetrReq) => retransmission_requested(state, checks),
        (State::Up, RecvHb | RecvData) => regular_receipt(State::Up, checks),

        (State::RetrReq, SendData) => Step::new(Action::SendData, State::RetrReq),
        (State::RetrReq, RecvRetrResp) => {
            Step::new(Action::ResyncRetransmission, State::RetrRun)
        }
        (State::RetrReq, RecvHb | RecvData | RecvRetrData) => Step::stay(State::RetrReq),
        (State::RetrReq, RecvRetrReq) => retransmission_requested(state, checks),
        (State::RetrReq, RecvConnReq | RecvConnResp) => Step::disconnect(NotExpectedRecvMsgType),

        (State::RetrRun, SendData) => Step::new(Action::SendData, State::RetrRun),
        (State::RetrRun, RecvRetrReq) if checks.sequence_in_order => {
            Step::disconnect(NotExpectedRecvMsgType)
        }
        (State::RetrRun, RecvRetrReq) if checks.retransmission_available => Step::new(
            Action::Retransmit {
                regular_receipt: false,
            },
            State::RetrReq,
        ),
        (State::RetrRun, RecvRetrReq) => Step::disconnect(FailRetransmission),
        (State::RetrRun, RecvHb | RecvData) => regular_receipt(State::Up, checks),
        (State::RetrRun, RecvRetrData) => regular_receipt(State::RetrRun, checks),
        (State::RetrRun, RecvConnReq | RecvConnResp | RecvRetrResp) => {
            Step::disconnect(NotExpectedRecvMsgType)
        }

        // Shared by START, UP, RETR_REQ and RETR_RUN.
        (_, OpenConn) => Step::disconnect(StateServiceNotAllowed),
        (_, CloseConn) => Step::disconnect(UserRequest),
        (_, RecvDiscReq) => Step::new(Action::Close, State::Closed),
        (_, ThElapsed) => Step::new(Action::Heartbeat, state),
        (_, TiElapsed) => Step::disconnect(TimeoutIncomingMsg),
    }
}

/// HEARTBEAT, DATA or RETRANSMITTED_DATA in a connected state.
fn regular_receipt(on_success: State, checks: Checks) -> Step {
    if !checks.sequence_in_order {
        Step::new(Action::RequestRetransmission, State::RetrReq)
    } else if !checks.timestamp_in_window {
        Step::disconnect(DiscReason::SeqErr)
    } else {
        Step::new(Action::Receive, on_success)
    }
}

/// RETRANSMISSION_REQUEST in UP or RETR_REQ.
fn retransmission_requested(state: State, checks: Checks) -> Step {
    if !checks.retransmission_available {
        return Step::disconnect(DiscReason::FailRetransmission);
    }
    if checks.sequence_in_order {
        Step::new(
            Action::Retransmit {
                regular_receipt: true,
            },
            State::RetrReq,
        )
    } else {
        Step::new(
            Action::Retransmit {
                regular_receipt: false,
            },
            state,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [State; 6] = [
        State::Closed,
        State::Down,
        State::Start,
        State::Up,
        State::RetrReq,
        State::RetrRun,
    ];

    const ALL_EVENTS: [Event; 13] = [
        Event::OpenConn,
        Event::CloseConn,
        Event::SendData,
        Event::RecvConnReq,
        Event::RecvConnResp,
        Event::RecvRetrReq,
        Event::RecvRetrResp,
        Event::RecvDiscReq,
        Event::RecvHb,
        Event::RecvData,
        Event::RecvRetrData,
        Event::ThElapsed,
        Event::TiElapsed,
    ];

    fn step(state: State, role: Role, event: Event) -> Step {
        transition(state, role, event, Checks::PASS)
    }

    fn with(f: impl FnOnce(&mut Checks)) -> Checks {
        let mut checks = Checks::PASS;
        f(&mut checks);
        checks
    }

    fn disconnect(reason: DiscReason) -> Step {
        Step::disconnect(reason)
    }

    #[test]
    fn open_from_closed_depends_on_role() {
        assert_eq!(
            step(State::Closed, Role::Server, Event::OpenConn),
            Step::new(Action::Reset, State::Down)
        );
        assert_eq!(
            step(State::Closed, Role::Client, Event::OpenConn),
            Step::new(Action::ResetAndConnect, State::Start)
        );
    }

    #[test]
    fn closed_ignores_everything_but_open() {
        for event in ALL_EVENTS.into_iter().filter(|e| *e != Event::OpenConn) {
            for role in [Role::Client, Role::Server] {
                assert_eq!(
                    step(State::Closed, role, event),
                    Step::stay(State::Closed),
                    "{event}"
                );
            }
        }
    }

    #[test]
    fn only_client_open_emits_connection_request() {
        for state in ALL_STATES {
            for event in ALL_EVENTS {
                for role in [Role::Client, Role::Server] {
                    let s = step(state, role, event);
                    if s.action == Action::ResetAndConnect {
                        assert_eq!((state, role, event), (State::Closed, Role::Client, Event::OpenConn));
                    }
                }
            }
        }
    }

    #[test]
    fn down_closes_silently_on_local_requests() {
        for event in [Event::OpenConn, Event::CloseConn, Event::SendData, Event::RecvDiscReq] {
            assert_eq!(
                step(State::Down, Role::Server, event),
                Step::new(Action::Close, State::Closed),
                "{event}"
            );
        }
    }

    #[test]
    fn down_accepts_connection_request_with_matching_version() {
        assert_eq!(
            step(State::Down, Role::Server, Event::RecvConnReq),
            Step::new(Action::AcceptConnection, State::Start)
        );
        let bad = with(|c| c.version_ok = false);
        assert_eq!(
            transition(State::Down, Role::Server, Event::RecvConnReq, bad),
            disconnect(DiscReason::ProtocolVersionError)
        );
    }

    #[test]
    fn down_ignores_other_frames_and_heartbeat_timer() {
        for event in [
            Event::RecvConnResp,
            Event::RecvHb,
            Event::RecvData,
            Event::RecvRetrReq,
            Event::ThElapsed,
        ] {
            assert_eq!(step(State::Down, Role::Server, event), Step::stay(State::Down));
        }
    }

    #[test]
    fn start_rejects_local_services() {
        for event in [Event::OpenConn, Event::SendData] {
            assert_eq!(
                step(State::Start, Role::Client, event),
                disconnect(DiscReason::StateServiceNotAllowed)
            );
        }
        assert_eq!(
            step(State::Start, Role::Client, Event::CloseConn),
            disconnect(DiscReason::UserRequest)
        );
    }

    #[test]
    fn start_rejects_unexpected_frames() {
        for event in [
            Event::RecvConnReq,
            Event::RecvRetrReq,
            Event::RecvRetrResp,
            Event::RecvData,
            Event::RecvRetrData,
        ] {
            for role in [Role::Client, Role::Server] {
                assert_eq!(
                    step(State::Start, role, event),
                    disconnect(DiscReason::NotExpectedRecvMsgType)
                );
            }
        }
        assert_eq!(
            step(State::Start, Role::Server, Event::RecvConnResp),
            disconnect(DiscReason::NotExpectedRecvMsgType)
        );
        assert_eq!(
            step(State::Start, Role::Client, Event::RecvHb),
            disconnect(DiscReason::NotExpectedRecvMsgType)
        );
    }

    #[test]
    fn client_start_completes_on_connection_response() {
        assert_eq!(
            step(State::Start, Role::Client, Event::RecvConnResp),
            Step::new(Action::CompleteConnection, State::Up)
        );
        let bad = with(|c| c.version_ok = false);
        assert_eq!(
            transition(State::Start, Role::Client, Event::RecvConnResp, bad),
            disconnect(DiscReason::ProtocolVersionError)
        );
    }

    #[test]
    fn server_start_checks_sequence_before_timestamp() {
        assert_eq!(
            step(State::Start, Role::Server, Event::RecvHb),
            Step::new(Action::ConfirmConnection, State::Up)
        );
        let both_bad = with(|c| {
            c.sequence_in_order = false;
            c.timestamp_in_window = false;
        });
        assert_eq!(
            transition(State::Start, Role::Server, Event::RecvHb, both_bad),
            disconnect(DiscReason::SeqNbrErrForConnection)
        );
        let late = with(|c| c.timestamp_in_window = false);
        assert_eq!(
            transition(State::Start, Role::Server, Event::RecvHb, late),
            disconnect(DiscReason::SeqErr)
        );
    }

    #[test]
    fn up_regular_receipt_and_failures() {
        for event in [Event::RecvHb, Event::RecvData] {
            assert_eq!(
                step(State::Up, Role::Client, event),
                Step::new(Action::Receive, State::Up)
            );
            let gap = with(|c| c.sequence_in_order = false);
            assert_eq!(
                transition(State::Up, Role::Client, event, gap),
                Step::new(Action::RequestRetransmission, State::RetrReq)
            );
            let late = with(|c| c.timestamp_in_window = false);
            assert_eq!(
                transition(State::Up, Role::Client, event, late),
                disconnect(DiscReason::SeqErr)
            );
        }
    }

    #[test]
    fn up_local_services() {
        assert_eq!(
            step(State::Up, Role::Server, Event::SendData),
            Step::new(Action::SendData, State::Up)
        );
        assert_eq!(
            step(State::Up, Role::Server, Event::OpenConn),
            disconnect(DiscReason::StateServiceNotAllowed)
        );
        assert_eq!(
            step(State::Up, Role::Server, Event::CloseConn),
            disconnect(DiscReason::UserRequest)
        );
    }

    #[test]
    fn up_rejects_handshake_and_retransmission_frames() {
        for event in [
            Event::RecvConnReq,
            Event::RecvConnResp,
            Event::RecvRetrResp,
            Event::RecvRetrData,
        ] {
            assert_eq!(
                step(State::Up, Role::Server, event),
                disconnect(DiscReason::NotExpectedRecvMsgType)
            );
        }
    }

    #[test]
    fn retransmission_request_branches() {
        for state in [State::Up, State::RetrReq] {
            assert_eq!(
                step(state, Role::Client, Event::RecvRetrReq),
                Step::new(
                    Action::Retransmit {
                        regular_receipt: true
                    },
                    State::RetrReq
                )
            );
            let gap = with(|c| c.sequence_in_order = false);
            assert_eq!(
                transition(state, Role::Client, Event::RecvRetrReq, gap),
                Step::new(
                    Action::Retransmit {
                        regular_receipt: false
                    },
                    state
                )
            );
            let lost = with(|c| c.retransmission_available = false);
            assert_eq!(
                transition(state, Role::Client, Event::RecvRetrReq, lost),
                disconnect(DiscReason::FailRetransmission)
            );
        }
    }

    #[test]
    fn retr_req_waits_for_response() {
        assert_eq!(
            step(State::RetrReq, Role::Client, Event::RecvRetrResp),
            Step::new(Action::ResyncRetransmission, State::RetrRun)
        );
        for event in [Event::RecvHb, Event::RecvData, Event::RecvRetrData] {
            assert_eq!(
                step(State::RetrReq, Role::Client, event),
                Step::stay(State::RetrReq)
            );
        }
        assert_eq!(
            step(State::RetrReq, Role::Client, Event::SendData),
            Step::new(Action::SendData, State::RetrReq)
        );
        assert_eq!(
            step(State::RetrReq, Role::Client, Event::RecvConnResp),
            disconnect(DiscReason::NotExpectedRecvMsgType)
        );
    }

    #[test]
    fn retr_run_returns_to_up_on_heartbeat_or_data() {
        for event in [Event::RecvHb, Event::RecvData] {
            assert_eq!(
                step(State::RetrRun, Role::Server, event),
                Step::new(Action::Receive, State::Up)
            );
        }
        assert_eq!(
            step(State::RetrRun, Role::Server, Event::RecvRetrData),
            Step::new(Action::Receive, State::RetrRun)
        );
        let gap = with(|c| c.sequence_in_order = false);
        assert_eq!(
            transition(State::RetrRun, Role::Server, Event::RecvRetrData, gap),
            Step::new(Action::RequestRetransmission, State::RetrReq)
        );
        let late = with(|c| c.timestamp_in_window = false);
        assert_eq!(
            transition(State::RetrRun, Role::Server, Event::RecvData, late),
            disconnect(DiscReason::SeqErr)
        );
    }

    #[test]
    fn retr_run_retransmission_requests() {
        assert_eq!(
            step(State::RetrRun, Role::Server, Event::RecvRetrReq),
            disconnect(DiscReason::NotExpectedRecvMsgType)
        );
        let gap = with(|c| c.sequence_in_order = false);
        assert_eq!(
            transition(State::RetrRun, Role::Server, Event::RecvRetrReq, gap),
            Step::new(
                Action::Retransmit {
                    regular_receipt: false
                },
                State::RetrReq
            )
        );
        let lost = with(|c| {
            c.sequence_in_order = false;
            c.retransmission_available = false;
        });
        assert_eq!(
            transition(State::RetrRun, Role::Server, Event::RecvRetrReq, lost),
            disconnect(DiscReason::FailRetransmission)
        );
        for event in [Event::RecvConnReq, Event::RecvConnResp, Event::RecvRetrResp] {
            assert_eq!(
                step(State::RetrRun, Role::Server, event),
                disconnect(DiscReason::NotExpectedRecvMsgType)
            );
        }
    }

    #[test]
    fn disconnect_request_closes_every_open_state() {
        for state in [State::Down, State::Start, State::Up, State::RetrReq, State::RetrRun] {
            assert_eq!(
                step(state, Role::Client, Event::RecvDiscReq),
                Step::new(Action::Close, State::Closed)
            );
        }
    }

    #[test]
    fn heartbeat_timer_keeps_connected_state() {
        for state in [State::Start, State::Up, State::RetrReq, State::RetrRun] {
            assert_eq!(
                step(state, Role::Client, Event::ThElapsed),
                Step::new(Action::Heartbeat, state)
            );
        }
    }

    #[test]
    fn incoming_timeout_disconnects_every_open_state() {
        for state in [State::Down, State::Start, State::Up, State::RetrReq, State::RetrRun] {
            for role in [Role::Client, Role::Server] {
                assert_eq!(
                    step(state, role, Event::TiElapsed),
                    disconnect(DiscReason::TimeoutIncomingMsg)
                );
            }
        }
    }

    #[test]
    fn at_most_one_closing_outcome_per_lookup() {
        for state in ALL_STATES {
            for event in ALL_EVENTS {
                let s = step(state, Role::Client, event);
                if matches!(s.action, Action::Close | Action::Disconnect(_)) {
                    assert_eq!(s.next, State::Closed, "{state} {event}");
                }
            }
        }
    }
}
