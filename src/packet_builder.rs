use bytes::{Bytes, BytesMut};
use tracing::trace;
use crate::message_id::{IdRange, MessageId};
use crate::record::Record;

/// Packs records into a sequence of packets, none of which exceeds the configured maximum size.
///
/// A record is never split: if it does not fit into the packet under construction, that packet is
///  finished and the record starts a new one. Callers must ensure that no single record exceeds
///  the maximum packet size.
pub struct PacketBuilder {
    max_packet_size: usize,
    packets: Vec<Bytes>,
    work_in_progress: BytesMut,
}

impl PacketBuilder {
    pub fn new(max_packet_size: usize) -> PacketBuilder {
        PacketBuilder {
            max_packet_size,
            packets: Vec::new(),
            work_in_progress: BytesMut::with_capacity(max_packet_size),
        }
    }

    pub fn push(&mut self, record: &Record) {
        let record_len = record.serialized_len();
        debug_assert!(record_len <= self.max_packet_size);

        if self.work_in_progress.len() + record_len > self.max_packet_size {
            self.finish_work_in_progress();
        }
        record.ser(&mut self.work_in_progress);
    }

    pub fn push_request(&mut self, range: IdRange) {
        self.push(&Record::Request { min: range.min.truncated(), max: range.max.truncated() });
    }

    pub fn push_missing(&mut self, range: IdRange) {
        self.push(&Record::Missing { min: range.min.truncated(), max: range.max.truncated() });
    }

    pub fn push_data(&mut self, id: MessageId, payload: &[u8]) {
        self.push(&Record::Data { id: id.truncated(), payload });
    }

    /// true if nothing was pushed so far
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty() && self.work_in_progress.is_empty()
    }

    fn finish_work_in_progress(&mut self) {
        if self.work_in_progress.is_empty() {
            return;
        }
        let packet = self.work_in_progress.split().freeze();
        trace!("finished packet of {} bytes", packet.len());
        self.packets.push(packet);
    }

    /// Returns all packets, oldest first. If no record was pushed, the result is a single packet
    ///  containing a ping so that every flush produces some output.
    pub fn finish(mut self) -> Vec<Bytes> {
        if self.is_empty() {
            self.push(&Record::Ping);
        }
        self.finish_work_in_progress();
        self.packets
    }
}
