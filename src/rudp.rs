use std::sync::Arc;
use bytes::Bytes;
use tracing::{debug, trace, warn};
use crate::config::RudpConfig;
use crate::loss_detection::LossDetection;
use crate::message_id::{IdRange, MessageId};
use crate::packet_builder::PacketBuilder;
use crate::receive_buffer::ReceiveBuffer;
use crate::record::{Record, RecordReader};
use crate::send_buffer::SendBuffer;
use crate::state::{RudpError, StreamState, StreamStatus};

/// A single reliable, ordered message stream on top of an unreliable datagram transport.
///
/// This is a sans-I/O state machine: received datagrams are passed in through [Rudp::input],
///  and time is advanced through [Rudp::update], which returns the packets to be sent. All calls
///  must be serialized by the caller (see [crate::driver::RudpDriver] for a way to do that).
pub struct Rudp {
    config: RudpConfig,
    status: Arc<StreamStatus>,

    send_buffer: SendBuffer,
    receive_buffer: ReceiveBuffer,
    loss_detection: LossDetection,

    current_tick: u64,
    last_recv_tick: u64,
    last_expired_tick: u64,
    last_send_delay_tick: u64,
}

impl Rudp {
    pub fn new(config: RudpConfig) -> anyhow::Result<Rudp> {
        config.validate()?;

        Ok(Rudp {
            loss_detection: LossDetection::new(config.missing_ticks),
            config,
            status: Default::default(),
            send_buffer: SendBuffer::default(),
            receive_buffer: ReceiveBuffer::default(),
            current_tick: 0,
            last_recv_tick: 0,
            last_expired_tick: 0,
            last_send_delay_tick: 0,
        })
    }

    pub fn config(&self) -> &RudpConfig {
        &self.config
    }

    pub fn state(&self) -> StreamState {
        self.status.load()
    }

    /// A handle to the stream state that can be shared with other threads
    pub fn status(&self) -> Arc<StreamStatus> {
        self.status.clone()
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// the id the application will consume next
    pub fn recv_id_min(&self) -> MessageId {
        self.receive_buffer.recv_id_min()
    }

    /// the highest id received so far
    pub fn recv_id_max(&self) -> MessageId {
        self.receive_buffer.recv_id_max()
    }

    /// the id that will be assigned to the next message sent
    pub fn send_id(&self) -> MessageId {
        self.send_buffer.send_id()
    }

    pub fn pending_len(&self) -> usize {
        self.send_buffer.pending_len()
    }

    pub fn history_len(&self) -> usize {
        self.send_buffer.history_len()
    }

    /// Register a message for sending with the next flush. Messages exceeding the configured
    ///  maximum message size are declined without affecting the stream.
    pub fn send(&mut self, message: &[u8]) -> Result<MessageId, RudpError> {
        self.status.check_active()?;

        if message.len() > self.config.max_message_size {
            debug!("declining message of {} bytes, maximum is {}", message.len(), self.config.max_message_size);
            return Err(RudpError::MessageTooLarge {
                len: message.len(),
                max: self.config.max_message_size,
            });
        }

        Ok(self.send_buffer.enqueue(message, self.current_tick))
    }

    /// Copy the next in-sequence message into `buf`, returning its length, or `None` if the next
    ///  message was not received yet. If `buf` is too small, the message stays in the buffer.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>, RudpError> {
        self.status.check_active()?;

        let len = match self.receive_buffer.peek_next_len() {
            Some(len) => len,
            None => return Ok(None),
        };
        if len > buf.len() {
            return Err(RudpError::BufferTooSmall { needed: len, available: buf.len() });
        }

        match self.receive_buffer.pop_next() {
            Some(message) => {
                buf[..len].copy_from_slice(&message);
                Ok(Some(len))
            }
            None => Ok(None),
        }
    }

    /// Take the next in-sequence message, or `None` if it was not received yet
    pub fn recv_message(&mut self) -> Result<Option<Bytes>, RudpError> {
        self.status.check_active()?;
        Ok(self.receive_buffer.pop_next())
    }

    /// Process a received datagram. Record boundaries are self-delimiting, so this accepts any
    ///  number of complete records.
    ///
    /// Malformed data moves the stream to [StreamState::MalformedMessage]; records before the
    ///  malformed one are still applied.
    pub fn input(&mut self, buf: &[u8]) {
        if let Some(e) = self.status.load().as_error() {
            trace!("ignoring {} received bytes: stream is terminated ({})", buf.len(), e);
            return;
        }

        if !buf.is_empty() {
            self.last_recv_tick = self.current_tick;
        }

        for record in RecordReader::new(buf) {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!("received malformed data: {}", e);
                    self.status.store(StreamState::MalformedMessage);
                    return;
                }
            };

            match record {
                Record::Ping => {
                    self.loss_detection.check_missing(&self.receive_buffer, self.current_tick, false);
                }
                Record::Eof => {
                    debug!("peer closed the stream");
                    self.status.store(StreamState::Eof);
                }
                Record::Corrupt => {
                    debug!("peer aborted the stream");
                    self.status.store(StreamState::RemoteEof);
                    return;
                }
                Record::Request { min, max } => {
                    if let Some(range) = Self::reconcile_range(self.send_buffer.send_id(), min, max) {
                        self.loss_detection.on_request(range);
                    }
                }
                Record::Missing { min, max } => {
                    if let Some(range) = Self::reconcile_range(self.receive_buffer.recv_id_max(), min, max) {
                        self.loss_detection.on_missing(range, &mut self.receive_buffer, self.current_tick);
                    }
                }
                Record::Data { id, payload } => {
                    match MessageId::reconcile(self.receive_buffer.recv_id_max(), id) {
                        Some(id) => {
                            self.loss_detection.on_message_received(id);
                            self.receive_buffer.insert(id, payload);
                        }
                        None => {
                            trace!("message with truncated id {} predates the stream - ignoring", id);
                        }
                    }
                }
            }
        }

        self.loss_detection.check_missing(&self.receive_buffer, self.current_tick, false);
    }

    fn reconcile_range(reference: MessageId, min: u16, max: u16) -> Option<IdRange> {
        let max = MessageId::reconcile(reference, max)?;
        let min = MessageId::reconcile(reference, min)
            .unwrap_or(MessageId::ZERO);
        Some(IdRange::new(min, max))
    }

    /// Advance protocol time by the given number of ticks. This discards expired history, checks
    ///  the stream's liveness and - once per `send_delay_ticks` - returns the packets to be sent,
    ///  oldest first. The result is empty if nothing is due or the stream is terminated.
    pub fn update(&mut self, ticks: u64) -> Vec<Bytes> {
        if self.status.load().is_terminal() {
            return Vec::new();
        }

        // the 'last_*' ticks never exceed current_tick, so elapsed times are computed by subtraction
        self.current_tick = self.current_tick.saturating_add(ticks);

        if self.current_tick - self.last_expired_tick >= self.config.expired_ticks {
            self.last_expired_tick = self.current_tick;
            self.send_buffer.expire(self.current_tick - self.config.expired_ticks);
        }

        if self.current_tick - self.last_recv_tick >= self.config.corrupt_ticks {
            warn!("nothing received for {} ticks - stream is corrupt", self.current_tick - self.last_recv_tick);
            self.status.store(StreamState::Corrupt);
            return Vec::new();
        }

        if self.current_tick - self.last_send_delay_tick >= self.config.send_delay_ticks {
            self.last_send_delay_tick = self.current_tick;
            let mut builder = PacketBuilder::new(self.config.max_packet_size);
            self.assemble(&mut builder);
            return builder.finish();
        }

        Vec::new()
    }

    fn assemble(&mut self, builder: &mut PacketBuilder) {
        self.loss_detection.check_missing(&self.receive_buffer, self.current_tick, false);
        self.loss_detection.write_requests(builder);
        self.loss_detection.serve_requests(&self.send_buffer, builder);
        self.send_buffer.flush(builder);
    }

    /// Close the stream gracefully: everything pending is packed, followed by an EOF record for
    ///  the peer. Returns the final packets; afterwards the stream is in state `Eof`.
    pub fn close(&mut self) -> Vec<Bytes> {
        if self.status.load().is_terminal() {
            return Vec::new();
        }

        let mut builder = PacketBuilder::new(self.config.max_packet_size);
        self.assemble(&mut builder);
        builder.push(&Record::Eof);

        debug!("closing stream after {} sent messages", self.send_buffer.send_id());
        self.status.store(StreamState::Eof);
        builder.finish()
    }

    /// Abort the stream: returns a packet telling the peer to stop, and moves the stream to
    ///  state `Corrupt`. Pending messages are discarded.
    pub fn abort(&mut self) -> Vec<Bytes> {
        if self.status.load().is_terminal() {
            return Vec::new();
        }

        let mut builder = PacketBuilder::new(self.config.max_packet_size);
        builder.push(&Record::Corrupt);

        debug!("aborting stream");
        self.status.store(StreamState::Corrupt);
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rstest::rstest;

    fn session() -> Rudp {
        Rudp::new(RudpConfig::default()).unwrap()
    }

    fn deliver(packets: &[Bytes], to: &mut Rudp) {
        for packet in packets {
            to.input(packet);
        }
    }

    fn drain(rudp: &mut Rudp) -> Vec<Vec<u8>> {
        let mut result = Vec::new();
        while let Some(message) = rudp.recv_message().unwrap() {
            result.push(message.to_vec());
        }
        result
    }

    fn records(packets: &[Bytes]) -> Vec<Record<'_>> {
        packets.iter()
            .flat_map(|p| RecordReader::new(p))
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn test_invalid_config() {
        assert!(Rudp::new(RudpConfig { max_packet_size: 10, ..RudpConfig::default() }).is_err());
    }

    #[test]
    fn test_simple_exchange() {
        let mut a = session();
        let mut b = session();

        assert_eq!(a.send(b"hello"), Ok(MessageId::from_raw(0)));
        assert_eq!(a.send(b"world"), Ok(MessageId::from_raw(1)));
        assert_eq!(a.pending_len(), 2);

        let packets = a.update(1);
        assert_eq!(records(&packets), vec![
            Record::Data { id: 0, payload: b"hello" },
            Record::Data { id: 1, payload: b"world" },
        ]);
        assert_eq!(a.pending_len(), 0);
        assert_eq!(a.history_len(), 2);

        deliver(&packets, &mut b);
        assert_eq!(drain(&mut b), vec![b"hello".to_vec(), b"world".to_vec()]);
        assert_eq!(b.recv_id_min(), MessageId::from_raw(2));
        assert_eq!(b.recv_id_max(), MessageId::from_raw(1));
    }

    #[test]
    fn test_idle_flush_is_ping() {
        let mut a = session();
        assert_eq!(records(&a.update(1)), vec![Record::Ping]);
    }

    #[rstest]
    #[case::every_update(0, vec![true, true, true, true])]
    #[case::every_tick(1, vec![true, true, true, true])]
    #[case::every_third_tick(3, vec![false, false, true, false, false, true])]
    fn test_flush_cadence(#[case] send_delay_ticks: u64, #[case] expected: Vec<bool>) {
        let mut a = Rudp::new(RudpConfig { send_delay_ticks, ..RudpConfig::default() }).unwrap();
        let actual = expected.iter()
            .map(|_| !a.update(1).is_empty())
            .collect::<Vec<_>>();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_batches_messages_between_flushes() {
        let mut a = Rudp::new(RudpConfig { send_delay_ticks: 2, ..RudpConfig::default() }).unwrap();
        a.send(b"a").unwrap();
        assert!(a.update(1).is_empty());
        a.send(b"b").unwrap();
        let packets = a.update(1);
        assert_eq!(packets.len(), 1);
        assert_eq!(records(&packets), vec![
            Record::Data { id: 0, payload: b"a" },
            Record::Data { id: 1, payload: b"b" },
        ]);
    }

    #[test]
    fn test_packets_respect_max_size() {
        let mut a = session();
        for i in 0..20u8 {
            a.send(&[i; 100]).unwrap();
        }
        let packets = a.update(1);
        assert_eq!(packets.len(), 5);
        assert!(packets.iter().all(|p| p.len() <= 508));

        let mut b = session();
        deliver(&packets, &mut b);
        let received = drain(&mut b);
        assert_eq!(received.len(), 20);
        for (i, message) in received.iter().enumerate() {
            assert_eq!(message, &vec![i as u8; 100]);
        }
    }

    #[test]
    fn test_send_too_large() {
        let mut a = session();
        assert_eq!(a.send(&[0; 505]), Err(RudpError::MessageTooLarge { len: 505, max: 504 }));
        assert_eq!(a.state(), StreamState::Active);
        assert_eq!(a.send_id(), MessageId::ZERO);

        assert_eq!(a.send(&[0; 504]), Ok(MessageId::ZERO));
        let packets = a.update(1);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), 508);
    }

    #[test]
    fn test_recv_into_buffer() {
        let mut a = session();
        let mut b = session();
        a.send(b"abc").unwrap();
        a.send(b"").unwrap();
        deliver(&a.update(1), &mut b);

        let mut buf = [0u8; 2];
        assert_eq!(b.recv(&mut buf), Err(RudpError::BufferTooSmall { needed: 3, available: 2 }));
        assert_eq!(b.state(), StreamState::Active);

        let mut buf = [0u8; 10];
        assert_eq!(b.recv(&mut buf), Ok(Some(3)));
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(b.recv(&mut buf), Ok(Some(0)));
        assert_eq!(b.recv(&mut buf), Ok(None));
    }

    /// message #1 is lost, and re-sent on request
    #[test]
    fn test_lost_message_is_resent() {
        let mut a = session();
        let mut b = session();

        a.send(b"m0").unwrap();
        let p0 = a.update(1);
        a.send(b"m1").unwrap();
        let _lost = a.update(1);
        a.send(b"m2").unwrap();
        let p2 = a.update(1);

        deliver(&p0, &mut b);
        deliver(&p2, &mut b);
        assert_eq!(drain(&mut b), vec![b"m0".to_vec()]);

        // debounce: the gap is requested only after 'missing_ticks'
        assert_eq!(records(&b.update(1)), vec![Record::Ping]);
        let request = b.update(1);
        assert_eq!(records(&request), vec![Record::Request { min: 1, max: 1 }]);
        assert_eq!(drain(&mut b), Vec::<Vec<u8>>::new());

        deliver(&request, &mut a);
        let resent = a.update(1);
        assert_eq!(records(&resent), vec![Record::Data { id: 1, payload: b"m1" }]);

        deliver(&resent, &mut b);
        assert_eq!(drain(&mut b), vec![b"m1".to_vec(), b"m2".to_vec()]);
    }

    /// message #1 is lost, and it expired from the sender's history before it was requested
    #[test]
    fn test_lost_and_expired_message_is_skipped() {
        let mut a = Rudp::new(RudpConfig { expired_ticks: 3, ..RudpConfig::default() }).unwrap();
        let mut b = session();

        a.send(b"m0").unwrap();
        let p0 = a.update(1);
        a.send(b"m1").unwrap();
        let _lost = a.update(1);
        a.send(b"m2").unwrap();
        let p2 = a.update(1);
        assert_eq!(a.history_len(), 3);
        for _ in 0..3 {
            a.update(1);
        }
        assert_eq!(a.history_len(), 0);

        deliver(&p0, &mut b);
        deliver(&p2, &mut b);
        assert_eq!(drain(&mut b), vec![b"m0".to_vec()]);

        b.update(1);
        deliver(&b.update(1), &mut a);

        let reply = a.update(1);
        assert_eq!(records(&reply), vec![Record::Missing { min: 1, max: 1 }]);

        deliver(&reply, &mut b);
        assert_eq!(b.recv_id_min(), MessageId::from_raw(2));
        assert_eq!(drain(&mut b), vec![b"m2".to_vec()]);
    }

    #[test]
    fn test_abandon_unblocks_delivery() {
        let mut a = session();
        let mut b = session();
        for m in [b"m0", b"m1", b"m2"] {
            a.send(m).unwrap();
        }
        let packets = a.update(1);
        let recs = records(&packets);
        assert_eq!(recs.len(), 3);

        // hand-craft the delivery of #0 and #2 only
        b.input(&[7, 0,0, b'm',b'0', 7, 0,2, b'm',b'2']);
        assert_eq!(drain(&mut b), vec![b"m0".to_vec()]);

        b.input(&[4, 0,1, 0,1]);
        assert_eq!(drain(&mut b), vec![b"m2".to_vec()]);

        // a second identical abandon record changes nothing
        b.input(&[4, 0,1, 0,1]);
        assert_eq!(b.recv_id_min(), MessageId::from_raw(3));
    }

    #[test]
    fn test_reordered_gap_heals_without_request() {
        let mut a = session();
        let mut b = session();

        a.send(b"m0").unwrap();
        let p0 = a.update(1);
        a.send(b"m1").unwrap();
        let p1 = a.update(1);

        deliver(&p1, &mut b);
        assert_eq!(records(&b.update(1)), vec![Record::Ping]);
        deliver(&p0, &mut b);

        for _ in 0..10 {
            assert_eq!(records(&b.update(1)), vec![Record::Ping]);
            deliver(&a.update(1), &mut b);
        }
        assert_eq!(drain(&mut b), vec![b"m0".to_vec(), b"m1".to_vec()]);
    }

    #[test]
    fn test_liveness_timeout() {
        let mut a = Rudp::new(RudpConfig { corrupt_ticks: 10, ..RudpConfig::default() }).unwrap();
        for _ in 0..9 {
            assert!(!a.update(1).is_empty());
        }
        assert_eq!(a.state(), StreamState::Active);

        assert!(a.update(1).is_empty());
        assert_eq!(a.state(), StreamState::Corrupt);
        assert!(a.update(1).is_empty());
        assert_eq!(a.send(b"x"), Err(RudpError::Corrupt));
        assert_eq!(a.recv_message(), Err(RudpError::Corrupt));
    }

    #[test]
    fn test_receiving_keeps_stream_alive() {
        let mut a = Rudp::new(RudpConfig { corrupt_ticks: 10, ..RudpConfig::default() }).unwrap();
        for _ in 0..100 {
            a.update(1);
            a.input(&[0]);
        }
        assert_eq!(a.state(), StreamState::Active);
    }

    #[rstest]
    #[case::never_corrupt(RudpConfig::default())]
    #[case::never_expire(RudpConfig { expired_ticks: u64::MAX, ..RudpConfig::default() })]
    #[case::never_flush(RudpConfig { send_delay_ticks: u64::MAX, ..RudpConfig::default() })]
    fn test_unbounded_tick_config(#[case] config: RudpConfig) {
        let mut a = Rudp::new(RudpConfig { corrupt_ticks: u64::MAX, ..config }).unwrap();
        a.send(b"x").unwrap();
        for _ in 0..10 {
            a.update(1);
            a.input(&[0]);
        }
        a.update(u64::MAX);
        a.input(&[0]);
        a.update(1);
        assert_eq!(a.state(), StreamState::Active);
        assert_eq!(a.current_tick(), u64::MAX);
    }

    #[rstest]
    #[case::truncated_data(vec![8, 0,0, 1], StreamState::MalformedMessage)]
    #[case::truncated_range(vec![3, 0,0], StreamState::MalformedMessage)]
    #[case::truncated_length(vec![0x85], StreamState::MalformedMessage)]
    #[case::eof(vec![1], StreamState::Eof)]
    #[case::remote_abort(vec![2], StreamState::RemoteEof)]
    fn test_terminal_input(#[case] input: Vec<u8>, #[case] expected: StreamState) {
        let mut b = session();
        b.input(&input);
        assert_eq!(b.state(), expected);
        assert!(b.update(1).is_empty());
        assert_eq!(b.recv_message(), Err(expected.as_error().unwrap()));
        assert_eq!(b.send(b"x"), Err(expected.as_error().unwrap()));
    }

    #[test]
    fn test_malformed_keeps_earlier_records() {
        let mut b = session();
        b.input(&[6, 0,0, 42]);
        b.input(&[6, 0,1, 43, 8, 0,2, 1]);
        assert_eq!(b.state(), StreamState::MalformedMessage);
        assert_eq!(b.recv_id_max(), MessageId::from_raw(1));
    }

    #[test]
    fn test_remote_abort_stops_processing() {
        let mut b = session();
        b.input(&[6, 0,5, 42, 2, 6, 0,6, 43]);
        assert_eq!(b.state(), StreamState::RemoteEof);
        assert_eq!(b.recv_id_max(), MessageId::from_raw(5));

        // input after termination is ignored
        b.input(&[6, 0,7, 43]);
        assert_eq!(b.recv_id_max(), MessageId::from_raw(5));
    }

    #[test]
    fn test_later_terminal_state_overwrites_earlier() {
        let b = session();
        b.status().store(StreamState::Eof);
        assert_eq!(b.state(), StreamState::Eof);

        b.status().store(StreamState::Corrupt);
        assert_eq!(b.state(), StreamState::Corrupt);
    }

    #[test]
    fn test_close() {
        let mut a = session();
        let mut b = session();
        a.send(b"bye").unwrap();

        let packets = a.close();
        assert_eq!(records(&packets), vec![
            Record::Data { id: 0, payload: b"bye" },
            Record::Eof,
        ]);
        assert_eq!(a.state(), StreamState::Eof);
        assert!(a.close().is_empty());
        assert!(a.update(1).is_empty());

        deliver(&packets, &mut b);
        assert_eq!(b.state(), StreamState::Eof);
        assert_eq!(b.recv_message(), Err(RudpError::Eof));
    }

    #[test]
    fn test_abort() {
        let mut a = session();
        let mut b = session();
        a.send(b"dropped").unwrap();

        let packets = a.abort();
        assert_eq!(records(&packets), vec![Record::Corrupt]);
        assert_eq!(a.state(), StreamState::Corrupt);
        assert!(a.abort().is_empty());

        deliver(&packets, &mut b);
        assert_eq!(b.state(), StreamState::RemoteEof);
    }

    #[test]
    fn test_external_eof_flag() {
        let mut a = session();
        let status = a.status();
        std::thread::spawn(move || status.store(StreamState::Eof))
            .join()
            .unwrap();

        assert_eq!(a.send(b"x"), Err(RudpError::Eof));
        assert!(a.update(1).is_empty());
    }

    /// more than 2^16 messages, so truncated ids wrap around several times
    #[test]
    fn test_id_wrap_around() {
        let mut a = session();
        let mut b = session();

        let mut next_to_send = 0u32;
        let mut next_expected = 0u32;
        while next_expected < 140_000 {
            for _ in 0..60 {
                a.send(&next_to_send.to_be_bytes()).unwrap();
                next_to_send += 1;
            }
            deliver(&a.update(1), &mut b);
            deliver(&b.update(1), &mut a);

            for message in drain(&mut b) {
                assert_eq!(message, next_expected.to_be_bytes().to_vec());
                next_expected += 1;
            }
            assert_eq!(next_expected, next_to_send);
        }
        assert_eq!(b.recv_id_min(), MessageId::from_raw(next_expected as u64));
    }

    /// random packet loss in both directions: everything arrives, in order and without gaps
    #[rstest]
    #[case::light_loss(1, 0.05)]
    #[case::medium_loss(2, 0.2)]
    #[case::heavy_loss(3, 0.4)]
    fn test_lossy_link(#[case] seed: u64, #[case] loss_probability: f64) {
        const NUM_MESSAGES: u32 = 500;

        // history outlives the test, so every gap is eventually filled rather than abandoned
        let config = RudpConfig { expired_ticks: 1_000_000, ..RudpConfig::default() };

        let mut rng = StdRng::seed_from_u64(seed);
        let mut a = Rudp::new(config.clone()).unwrap();
        let mut b = Rudp::new(config).unwrap();

        let mut next_to_send = 0u32;
        let mut received = Vec::new();

        for tick in 0..20_000 {
            if received.len() >= NUM_MESSAGES as usize {
                break;
            }

            // keep sending after the interesting part so that a lost tail is detected as a gap
            let num_to_send = if next_to_send < NUM_MESSAGES { 5 } else if tick % 5 == 0 { 1 } else { 0 };
            for _ in 0..num_to_send {
                a.send(&next_to_send.to_be_bytes()).unwrap();
                next_to_send += 1;
            }

            for packet in a.update(1) {
                if !rng.random_bool(loss_probability) {
                    b.input(&packet);
                }
            }
            for packet in b.update(1) {
                if !rng.random_bool(loss_probability) {
                    a.input(&packet);
                }
            }

            for message in drain(&mut b) {
                received.push(u32::from_be_bytes(message.try_into().unwrap()));
            }
        }

        assert_eq!(a.state(), StreamState::Active);
        assert_eq!(b.state(), StreamState::Active);
        assert!(received.len() >= NUM_MESSAGES as usize);
        for (i, &value) in received.iter().enumerate() {
            assert_eq!(value, i as u32);
        }
    }
}
