use std::fmt;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::SeedableRng;
use safecom_pdu::{decode_pdu, Pdu, PduError, MAX_PAYLOAD};
use safecom_transport::SpduSink;
use tracing::{debug, info, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SafeComConfig;
use crate::connection::{ChannelSnapshot, Connection};
use crate::error::{Result, SafeComError};
use crate::queue::EventQueue;
use crate::state::{Input, State};

/// Receives application payloads delivered in sequence.
pub trait MessageSink {
    fn deliver(&mut self, channel: u32, payload: &[u8]);
}

impl<F> MessageSink for F
where
    F: FnMut(u32, &[u8]),
{
    fn deliver(&mut self, channel: u32, payload: &[u8]) {
        self(channel, payload)
    }
}

struct Channel {
    connection: Connection,
    queue: EventQueue<Input>,
}

struct Runtime {
    config: SafeComConfig,
    channels: Vec<Channel>,
    sink: Box<dyn SpduSink + Send>,
    messages: Box<dyn MessageSink + Send>,
    rng: StdRng,
}

impl Runtime {
    fn channel(&self, channel: u32) -> Result<&Channel> {
        self.channels
            .get(channel as usize)
            .ok_or(SafeComError::ChannelOutOfRange {
                channel,
                count: self.config.channel_count,
            })
    }

    fn enqueue(&mut self, channel: u32, input: Input) -> Result<()> {
        let count = self.config.channel_count;
        let slot = self
            .channels
            .get_mut(channel as usize)
            .ok_or(SafeComError::ChannelOutOfRange { channel, count })?;
        if slot.queue.try_push(input).is_err() {
            let capacity = slot.queue.capacity();
            warn!(channel, capacity, "event queue full, rejecting event");
            return Err(SafeComError::QueueFull { channel, capacity });
        }
        Ok(())
    }

    /// Run every queued event of one channel to completion, in order.
    fn drain(&mut self, channel: u32, now: u32) -> Result<()> {
        let Runtime {
            channels,
            sink,
            messages,
            rng,
            ..
        } = self;
        let Some(slot) = channels.get_mut(channel as usize) else {
            return Ok(());
        };

        while let Some(input) = slot.queue.pop() {
            let out = slot.connection.apply(input, now, &mut *rng)?;
            for pdu in &out.frames {
                let bytes = pdu.to_bytes()?;
                // Lost frames are recovered by the protocol timers, not here.
                if let Err(err) = sink.send_spdu(channel, &bytes) {
                    warn!(
                        channel,
                        message_type = %pdu.message_type,
                        error = %err,
                        "failed to send pdu"
                    );
                }
            }
            if let Some(payload) = out.delivered {
                trace!(channel, len = payload.len(), "delivering payload");
                messages.deliver(channel, &payload);
            }
        }
        Ok(())
    }

    fn submit(&mut self, channel: u32, input: Input, now: u32) -> Result<()> {
        self.enqueue(channel, input)?;
        self.drain(channel, now)
    }

    fn find_channel(&self, pdu: &Pdu) -> Result<u32> {
        self.channels
            .iter()
            .position(|c| {
                let address = c.connection.address();
                address.local_id == pdu.receiver_id && address.remote_id == pdu.sender_id
            })
            .map(|index| index as u32)
            .ok_or(SafeComError::UnknownAddress {
                receiver_id: pdu.receiver_id,
                sender_id: pdu.sender_id,
            })
    }
}

/// Owns every channel of one safety-layer instance.
///
/// Each public operation queues the matching event on its channel and runs
/// that channel's queue to completion before returning, so events of one
/// channel are always processed in arrival order. [`SafeCom::poll`] turns
/// elapsed timers into events and must be called regularly.
pub struct SafeCom<C: Clock = SystemClock> {
    clock: C,
    runtime: Option<Runtime>,
}

impl SafeCom<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for SafeCom<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> SafeCom<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            runtime: None,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn is_initialized(&self) -> bool {
        self.runtime.is_some()
    }

    /// Create the channels. Fails if already initialized.
    pub fn initialize<S, M>(&mut self, config: SafeComConfig, sink: S, messages: M) -> Result<()>
    where
        S: SpduSink + Send + 'static,
        M: MessageSink + Send + 'static,
    {
        if self.runtime.is_some() {
            return Err(SafeComError::AlreadyInitialized);
        }
        config.validate()?;

        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let channels = (0..config.channel_count)
            .map(|id| Channel {
                connection: Connection::new(id, &config),
                queue: EventQueue::new(config.event_queue_capacity),
            })
            .collect();

        info!(
            instance = %config.instance_name,
            role = %config.role,
            channels = config.channel_count,
            "safecom initialized"
        );
        self.runtime = Some(Runtime {
            config,
            channels,
            sink: Box::new(sink),
            messages: Box::new(messages),
            rng,
        });
        Ok(())
    }

    /// Drop every channel without notifying peers.
    pub fn shutdown(&mut self) -> Result<()> {
        let runtime = self.runtime.take().ok_or(SafeComError::NotInitialized)?;
        info!(instance = %runtime.config.instance_name, "safecom shut down");
        Ok(())
    }

    pub fn config(&self) -> Result<&SafeComConfig> {
        Ok(&self.runtime()?.config)
    }

    pub fn open(&mut self, channel: u32) -> Result<()> {
        debug!(channel, "open requested");
        self.submit(channel, Input::Open)
    }

    pub fn close(&mut self, channel: u32) -> Result<()> {
        debug!(channel, "close requested");
        self.submit(channel, Input::Close)
    }

    /// Send application data. Outside UP and the retransmission states this
    /// closes the channel, as the protocol demands.
    pub fn send_data(&mut self, channel: u32, payload: &[u8]) -> Result<()> {
        self.runtime()?.channel(channel)?;
        if payload.len() > MAX_PAYLOAD {
            return Err(PduError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD,
            }
            .into());
        }
        self.submit(channel, Input::Send(Bytes::copy_from_slice(payload)))
    }

    /// Decode a PDU and process it on the channel its ids address.
    /// Returns that channel.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<u32> {
        let channel = self.admit(bytes)?;
        let now = self.clock.now();
        self.runtime_mut()?.drain(channel, now)?;
        Ok(channel)
    }

    /// Decode a PDU that arrived on `channel` and process it.
    pub fn receive_raw(&mut self, channel: u32, bytes: &[u8]) -> Result<()> {
        let now = self.clock.now();
        let runtime = self.runtime_mut()?;
        runtime.channel(channel)?;
        let pdu = decode_verified(bytes)?;
        let address = runtime.channel(channel)?.connection.address();
        if address.local_id != pdu.receiver_id || address.remote_id != pdu.sender_id {
            warn!(
                channel,
                receiver_id = pdu.receiver_id,
                sender_id = pdu.sender_id,
                "pdu addressed to another channel"
            );
            return Err(SafeComError::AddressMismatch {
                channel,
                receiver_id: pdu.receiver_id,
                sender_id: pdu.sender_id,
            });
        }
        runtime.submit(channel, Input::Receive(pdu), now)
    }

    /// Decode a PDU and queue it on its channel without processing it.
    /// The next [`SafeCom::poll`] or operation on that channel runs it.
    pub fn admit(&mut self, bytes: &[u8]) -> Result<u32> {
        let runtime = self.runtime_mut()?;
        let pdu = decode_verified(bytes)?;
        let channel = runtime.find_channel(&pdu)?;
        runtime.enqueue(channel, Input::Receive(pdu))?;
        Ok(channel)
    }

    /// Process queued events, then fire elapsed timers on every channel.
    pub fn poll(&mut self) -> Result<()> {
        let now = self.clock.now();
        let runtime = self.runtime_mut()?;
        let mut first_error = None;

        for channel in 0..runtime.config.channel_count {
            if let Err(err) = runtime.drain(channel, now) {
                first_error.get_or_insert(err);
            }

            let expired = runtime.channels[channel as usize]
                .connection
                .expired_timers(now);
            if expired.incoming {
                trace!(channel, "incoming message timer elapsed");
                if let Err(err) = runtime.submit(channel, Input::IncomingElapsed, now) {
                    first_error.get_or_insert(err);
                }
            }
            if expired.heartbeat {
                trace!(channel, "heartbeat timer elapsed");
                if let Err(err) = runtime.submit(channel, Input::HeartbeatElapsed, now) {
                    first_error.get_or_insert(err);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    pub fn query_state(&self, channel: u32) -> Result<State> {
        Ok(self.runtime()?.channel(channel)?.connection.state())
    }

    pub fn snapshot(&self, channel: u32) -> Result<ChannelSnapshot> {
        Ok(self.runtime()?.channel(channel)?.connection.snapshot())
    }

    pub fn snapshots(&self) -> Result<Vec<ChannelSnapshot>> {
        Ok(self
            .runtime()?
            .channels
            .iter()
            .map(|c| c.connection.snapshot())
            .collect())
    }

    fn submit(&mut self, channel: u32, input: Input) -> Result<()> {
        let now = self.clock.now();
        self.runtime_mut()?.submit(channel, input, now)
    }

    fn runtime(&self) -> Result<&Runtime> {
        self.runtime.as_ref().ok_or(SafeComError::NotInitialized)
    }

    fn runtime_mut(&mut self) -> Result<&mut Runtime> {
        self.runtime.as_mut().ok_or(SafeComError::NotInitialized)
    }
}

impl<C: Clock> fmt::Debug for SafeCom<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("SafeCom");
        match &self.runtime {
            Some(runtime) => dbg
                .field("instance", &runtime.config.instance_name)
                .field("role", &runtime.config.role)
                .field("channels", &runtime.channels.len()),
            None => dbg.field("initialized", &false),
        };
        dbg.finish()
    }
}

fn decode_verified(bytes: &[u8]) -> Result<Pdu> {
    let result = decode_pdu(bytes).and_then(|pdu| {
        pdu.verify()?;
        Ok(pdu)
    });
    if let Err(err) = &result {
        warn!(len = bytes.len(), error = %err, "dropping malformed pdu");
    }
    Ok(result?)
}
