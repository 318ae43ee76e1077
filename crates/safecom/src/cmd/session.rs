use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use safecom_core::{MessageSink, Role, SafeCom, SafeComConfig, State};
use safecom_transport::DatagramSocket;
use tracing::{info, warn};

use crate::cmd::SessionArgs;
use crate::exit::{
    io_error, safecom_error, transport_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS,
    TIMEOUT, USAGE,
};
use crate::output::{print_delivery, print_snapshots, OutputFormat};

/// Run one instance over a Unix datagram socket until Ctrl-C, `--count` or
/// `--duration`. The server reopens channels the peer closed; the client
/// gives up once all of its channels are closed.
pub fn run(args: SessionArgs, role: Role, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(&args, role)?;
    let tick = parse_duration(&args.tick)?;
    let connect_timeout = parse_duration(&args.connect_timeout)?;
    let deadline = args
        .duration
        .as_deref()
        .map(parse_duration)
        .transpose()?
        .map(|d| Instant::now() + d);
    let channel_count = config.channel_count;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut socket =
        DatagramSocket::bind(&args.socket).map_err(|err| transport_error("bind failed", err))?;
    connect_peer(&mut socket, &args, connect_timeout, &running)?;
    socket
        .set_read_timeout(Some(tick))
        .map_err(|err| transport_error("socket setup failed", err))?;
    let sender = socket
        .try_clone()
        .map_err(|err| transport_error("socket setup failed", err))?;

    let (deliveries, delivered_rx) = mpsc::channel::<(u32, Vec<u8>)>();
    let mut safecom = SafeCom::new();
    safecom
        .initialize(config, sender, DeliveryForwarder(deliveries))
        .map_err(|err| safecom_error("initialize failed", err))?;

    for channel in 0..channel_count {
        safecom
            .open(channel)
            .map_err(|err| safecom_error("open failed", err))?;
    }
    info!(%role, channels = channel_count, socket = ?args.socket, "session started");

    let mut buf = vec![0u8; DatagramSocket::MAX_DATAGRAM];
    let mut greeted = vec![false; channel_count as usize];
    let mut delivered = 0usize;

    let code = loop {
        if !running.load(Ordering::SeqCst) {
            break SUCCESS;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break SUCCESS;
        }

        match socket.recv(&mut buf) {
            Ok(Some(n)) => {
                if let Err(err) = safecom.receive(&buf[..n]) {
                    warn!(error = %err, len = n, "dropping inbound datagram");
                }
            }
            Ok(None) => {}
            Err(err) => return Err(transport_error("receive failed", err)),
        }
        safecom
            .poll()
            .map_err(|err| safecom_error("poll failed", err))?;

        while let Ok((channel, payload)) = delivered_rx.try_recv() {
            print_delivery(channel, &payload, format);
            delivered = delivered.saturating_add(1);
        }
        if args.count.is_some_and(|count| delivered >= count) {
            break SUCCESS;
        }

        let mut closed = 0;
        for channel in 0..channel_count {
            let state = safecom
                .query_state(channel)
                .map_err(|err| safecom_error("state query failed", err))?;
            let slot = &mut greeted[channel as usize];
            match state {
                State::Up if !*slot => {
                    for text in &args.send {
                        safecom
                            .send_data(channel, text.as_bytes())
                            .map_err(|err| safecom_error("send failed", err))?;
                    }
                    *slot = true;
                }
                State::Closed if role == Role::Server => {
                    safecom
                        .open(channel)
                        .map_err(|err| safecom_error("open failed", err))?;
                    *slot = false;
                }
                State::Closed => closed += 1,
                _ => {}
            }
        }
        if closed == channel_count {
            warn!("every channel closed by the peer");
            break FAILURE;
        }
    };

    for channel in 0..channel_count {
        safecom
            .close(channel)
            .map_err(|err| safecom_error("close failed", err))?;
    }
    let snapshots = safecom
        .snapshots()
        .map_err(|err| safecom_error("state query failed", err))?;
    print_snapshots(&snapshots, format);
    safecom
        .shutdown()
        .map_err(|err| safecom_error("shutdown failed", err))?;

    Ok(code)
}

/// Hands delivered payloads from the protocol thread to the session loop.
struct DeliveryForwarder(mpsc::Sender<(u32, Vec<u8>)>);

impl MessageSink for DeliveryForwarder {
    fn deliver(&mut self, channel: u32, payload: &[u8]) {
        if self.0.send((channel, payload.to_vec())).is_err() {
            warn!(channel, len = payload.len(), "delivery receiver gone, dropping payload");
        }
    }
}

fn load_config(args: &SessionArgs, role: Role) -> CliResult<SafeComConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
            SafeComConfig::from_json(&text).map_err(|err| safecom_error("invalid config", err))?
        }
        None => SafeComConfig::default(),
    };

    config = config.with_role(role);
    if let Some(count) = args.channels {
        config = config.with_channel_count(count);
    }
    if let Some(name) = &args.instance {
        config = config.with_instance_name(name.clone());
    }
    config
        .validate()
        .map_err(|err| safecom_error("invalid config", err))?;
    Ok(config)
}

/// The peer may start after us; retry until its socket exists.
fn connect_peer(
    socket: &mut DatagramSocket,
    args: &SessionArgs,
    timeout: Duration,
    running: &AtomicBool,
) -> CliResult<()> {
    let start = Instant::now();
    loop {
        match socket.connect(&args.peer) {
            Ok(()) => return Ok(()),
            Err(err) => {
                if !running.load(Ordering::SeqCst) {
                    return Err(CliError::new(FAILURE, "interrupted before peer appeared"));
                }
                if start.elapsed() >= timeout {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("peer {} not reachable: {err}", args.peer.display()),
                    ));
                }
            }
        }
        thread::sleep(Duration::from_millis(50));
    }
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_millis_and_seconds() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration(" 7 ").unwrap(), Duration::from_secs(7));
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert_eq!(parse_duration("0ms").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("soon").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn forwarder_passes_deliveries_to_session_loop() {
        let (tx, rx) = mpsc::channel();
        let mut forwarder = DeliveryForwarder(tx);
        forwarder.deliver(3, b"points locked");
        assert_eq!(rx.try_recv().unwrap(), (3, b"points locked".to_vec()));
    }

    #[test]
    fn forwarder_survives_closed_receiver() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let mut forwarder = DeliveryForwarder(tx);
        forwarder.deliver(0, b"late");
        forwarder.deliver(1, b"later");
    }

    #[test]
    fn command_line_overrides_config_file() {
        let dir = std::env::temp_dir().join(format!("safecom-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(
            &path,
            r#"{"instance_name":"yard","role":"client","channel_count":4}"#,
        )
        .unwrap();

        let args = SessionArgs {
            socket: dir.join("a.sock"),
            peer: dir.join("b.sock"),
            config: Some(path),
            channels: Some(2),
            instance: None,
            send: Vec::new(),
            count: None,
            duration: None,
            connect_timeout: "5s".into(),
            tick: "10ms".into(),
        };
        let config = load_config(&args, Role::Server).unwrap();
        assert_eq!(config.role, Role::Server);
        assert_eq!(config.channel_count, 2);
        assert_eq!(config.instance_name, "yard");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn overlong_instance_name_is_rejected() {
        let args = SessionArgs {
            socket: "a.sock".into(),
            peer: "b.sock".into(),
            config: None,
            channels: None,
            instance: Some("interlocking-7".into()),
            send: Vec::new(),
            count: None,
            duration: None,
            connect_timeout: "5s".into(),
            tick: "10ms".into(),
        };
        let err = load_config(&args, Role::Client).unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
