//! Loss detection and recovery is based on two exchanges, both of them pull-based and range-based:
//!
//! * The receiver notices a gap at the head of its receive buffer. If the gap persists for
//!   `missing_ticks`, it sends a `Request` for the missing range.
//! * The sender answers a `Request` by re-sending whatever it still has in its history. For the
//!   part of the range that expired from history, it sends a `Missing` record, and the receiver
//!   gives up on that range and moves on.
//!
//! Both directions are buffered in plain work lists that are drained when the next batch of
//!  packets is assembled.

use rustc_hash::FxHashMap;
use tracing::{debug, trace};
use crate::message_id::{IdRange, MessageId};
use crate::packet_builder::PacketBuilder;
use crate::receive_buffer::ReceiveBuffer;
use crate::send_buffer::SendBuffer;

pub struct LossDetection {
    missing_ticks: u64,
    /// start of a gap -> tick at which the gap was first noticed
    gap_first_seen: FxHashMap<MessageId, u64>,
    /// gaps to be requested from the peer
    outgoing_requests: Vec<IdRange>,
    /// ranges the peer asked us to re-send
    incoming_requests: Vec<IdRange>,
}

impl LossDetection {
    pub fn new(missing_ticks: u64) -> LossDetection {
        LossDetection {
            missing_ticks,
            gap_first_seen: FxHashMap::default(),
            outgoing_requests: Vec::new(),
            incoming_requests: Vec::new(),
        }
    }

    /// Check for a gap at the head of the receive buffer. A gap is requested only if it was
    ///  noticed at least `missing_ticks` ago, or immediately if `direct` is set.
    pub fn check_missing(&mut self, receive_buffer: &ReceiveBuffer, now: u64, direct: bool) {
        let gap = match receive_buffer.gap() {
            Some(gap) => gap,
            None => return,
        };

        match self.gap_first_seen.get(&gap.min) {
            None if !direct => {
                trace!("gap {} noticed, highest received is #{}", gap, receive_buffer.recv_id_max());
                self.gap_first_seen.insert(gap.min, now);
            }
            Some(&first_seen) if !direct && now.saturating_sub(first_seen) < self.missing_ticks => {}
            _ => {
                self.gap_first_seen.remove(&gap.min);
                debug!("requesting missing messages {} (direct: {}), {} messages buffered", gap, direct, receive_buffer.len());
                self.outgoing_requests.push(gap);
            }
        }
    }

    /// A message arrived: if it starts a gap that is being tracked, the gap is gone
    pub fn on_message_received(&mut self, id: MessageId) {
        self.gap_first_seen.remove(&id);
    }

    /// The peer asked for messages to be re-sent
    pub fn on_request(&mut self, range: IdRange) {
        trace!("peer requests re-sending {}", range);
        self.incoming_requests.push(range);
    }

    /// The peer announced that a range of messages will never be re-sent. If this is applied,
    ///  the gap check is repeated right away since there may be a further gap behind it.
    pub fn on_missing(&mut self, range: IdRange, receive_buffer: &mut ReceiveBuffer, now: u64) {
        if !receive_buffer.abandon(range) {
            return;
        }

        let recv_id_min = receive_buffer.recv_id_min();
        self.gap_first_seen.retain(|&gap_start, _| gap_start >= recv_id_min);

        self.check_missing(receive_buffer, now, true);
    }

    /// Pack requests for all gaps detected since the last call
    pub fn write_requests(&mut self, builder: &mut PacketBuilder) {
        for range in self.outgoing_requests.drain(..) {
            builder.push_request(range);
        }
    }

    /// Answer all requests received since the last call: re-send what is still in history, and
    ///  announce everything below that as missing.
    pub fn serve_requests(&mut self, send_buffer: &SendBuffer, builder: &mut PacketBuilder) {
        for range in self.incoming_requests.drain(..) {
            if range.min > range.max {
                debug!("ignoring request for empty range {}", range);
                continue;
            }

            let history_first_id = match send_buffer.history_first_id() {
                Some(first) if range.max >= first => first,
                _ => {
                    debug!("requested range {} expired from history - sending missing", range);
                    builder.push_missing(range);
                    continue;
                }
            };

            let mut first_resent = None;
            let mut num_resent = 0usize;
            for message in send_buffer.history_in_range(range) {
                builder.push_data(message.id, &message.payload);
                first_resent.get_or_insert(message.id);
                num_resent += 1;
            }

            match first_resent {
                Some(first_resent) => {
                    if let Some(max_missing) = first_resent.prev().filter(|&max_missing| range.min <= max_missing) {
                        let missing = IdRange::new(range.min, max_missing);
                        debug!("part {} of requested range {} expired from history - sending missing", missing, range);
                        builder.push_missing(missing);
                    }
                    debug!("re-sent {} messages of requested range {}, history starts at #{}", num_resent, range, history_first_id);
                }
                None => {
                    debug!("requested range {} was not sent yet - ignoring", range);
                }
            }
        }
    }
}
