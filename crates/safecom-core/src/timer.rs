/// Heartbeat and incoming-message timers of one channel.
///
/// Both timers measure ticks since a reference point: the last frame sent for
/// Th, the last valid frame received for Ti. They only run while armed.
#[derive(Debug, Clone)]
pub struct ChannelTimers {
    heartbeat_period: u32,
    incoming_window: u32,
    last_sent: u32,
    last_received: u32,
    armed: bool,
}

/// Timers found elapsed by [`ChannelTimers::expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expired {
    pub heartbeat: bool,
    pub incoming: bool,
}

impl Expired {
    pub fn any(self) -> bool {
        self.heartbeat || self.incoming
    }
}

impl ChannelTimers {
    pub fn new(heartbeat_period: u32, incoming_window: u32) -> Self {
        Self {
            heartbeat_period,
            incoming_window,
            last_sent: 0,
            last_received: 0,
            armed: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Start both timers at `now`.
    pub fn arm(&mut self, now: u32) {
        self.armed = true;
        self.last_sent = now;
        self.last_received = now;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Set Ti.
    pub fn set_incoming_window(&mut self, ticks: u32) {
        self.incoming_window = ticks;
    }

    pub fn incoming_window(&self) -> u32 {
        self.incoming_window
    }

    pub fn on_sent(&mut self, now: u32) {
        self.last_sent = now;
    }

    pub fn on_received(&mut self, now: u32) {
        self.last_received = now;
    }

    /// Report elapsed timers and restart them from `now`.
    pub fn expired(&mut self, now: u32) -> Expired {
        if !self.armed {
            return Expired::default();
        }
        let mut expired = Expired::default();
        if now.wrapping_sub(self.last_received) >= self.incoming_window {
            expired.incoming = true;
            self.last_received = now;
        }
        if now.wrapping_sub(self.last_sent) >= self.heartbeat_period {
            expired.heartbeat = true;
            self.last_sent = now;
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disarmed_timers_never_fire() {
        let mut timers = ChannelTimers::new(10, 100);
        assert_eq!(timers.expired(1_000), Expired::default());
    }

    #[test]
    fn heartbeat_fires_after_period_without_sends() {
        let mut timers = ChannelTimers::new(10, 100);
        timers.arm(0);
        assert!(!timers.expired(9).any());
        let expired = timers.expired(10);
        assert!(expired.heartbeat);
        assert!(!expired.incoming);
        // restarted from 10
        assert!(!timers.expired(15).heartbeat);
    }

    #[test]
    fn sending_postpones_heartbeat() {
        let mut timers = ChannelTimers::new(10, 100);
        timers.arm(0);
        timers.on_sent(8);
        assert!(!timers.expired(12).heartbeat);
        assert!(timers.expired(18).heartbeat);
    }

    #[test]
    fn receiving_postpones_incoming_timeout() {
        let mut timers = ChannelTimers::new(10, 100);
        timers.arm(0);
        timers.on_received(90);
        assert!(!timers.expired(150).incoming);
        assert!(timers.expired(190).incoming);
    }

    #[test]
    fn incoming_window_is_adjustable() {
        let mut timers = ChannelTimers::new(10, 100);
        timers.arm(0);
        timers.set_incoming_window(40);
        assert!(timers.expired(40).incoming);
        assert_eq!(timers.incoming_window(), 40);
    }

    #[test]
    fn elapsed_time_wraps() {
        let mut timers = ChannelTimers::new(10, 100);
        timers.arm(u32::MAX - 5);
        assert!(!timers.expired(3).heartbeat);
        assert!(timers.expired(4).heartbeat);
    }
}
