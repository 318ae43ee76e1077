use crate::error::Result;

/// Outbound half of the lower transport.
///
/// The connection manager hands every encoded SPDU to a sink together with the
/// id of the channel that produced it. Implementations must not block on the
/// peer; a failed send is reported but never retried by the safety layer, whose
/// own liveness timers cover lost frames.
pub trait SpduSink {
    /// Send one encoded SPDU on behalf of `channel`.
    fn send_spdu(&mut self, channel: u32, spdu: &[u8]) -> Result<()>;
}

impl<F> SpduSink for F
where
    F: FnMut(u32, &[u8]) -> Result<()>,
{
    fn send_spdu(&mut self, channel: u32, spdu: &[u8]) -> Result<()> {
        self(channel, spdu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    fn send_through<S: SpduSink>(sink: &mut S, channel: u32, spdu: &[u8]) -> Result<()> {
        sink.send_spdu(channel, spdu)
    }

    #[test]
    fn closure_acts_as_sink() {
        let mut sent = Vec::new();
        let mut sink = |channel: u32, spdu: &[u8]| -> Result<()> {
            sent.push((channel, spdu.to_vec()));
            Ok(())
        };

        send_through(&mut sink, 3, b"abc").unwrap();
        send_through(&mut sink, 4, b"de").unwrap();

        assert_eq!(sent, vec![(3, b"abc".to_vec()), (4, b"de".to_vec())]);
    }

    #[test]
    fn closure_errors_propagate() {
        let mut sink = |_: u32, _: &[u8]| -> Result<()> { Err(TransportError::Shutdown) };
        let result = send_through(&mut sink, 0, b"x");
        assert!(matches!(result, Err(TransportError::Shutdown)));
    }

    #[test]
    fn boxed_trait_object_dispatches() {
        let mut count = 0usize;
        {
            let mut sink: Box<dyn SpduSink + '_> = Box::new(|_: u32, _: &[u8]| -> Result<()> {
                count += 1;
                Ok(())
            });
            sink.send_spdu(0, b"one").unwrap();
            sink.send_spdu(0, b"two").unwrap();
        }
        assert_eq!(count, 2);
    }
}
