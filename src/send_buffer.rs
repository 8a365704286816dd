use std::collections::VecDeque;
use bytes::Bytes;
use tracing::{debug, trace};
use crate::message_id::{IdRange, MessageId};
use crate::packet_builder::PacketBuilder;

pub struct OutboundMessage {
    pub id: MessageId,
    /// the tick at which the message was registered for sending
    pub tick: u64,
    pub payload: Bytes,
}

/// Outgoing messages: `pending` holds messages that were not sent yet, `history` holds sent
///  messages that are retained for re-sending.
///
/// History is always a contiguous run of ascending ids: messages are appended when they are
///  flushed, and they are removed only from the front when they expire.
#[derive(Default)]
pub struct SendBuffer {
    pending: VecDeque<OutboundMessage>,
    history: VecDeque<OutboundMessage>,
    /// the id that will be assigned to the next message
    send_id: MessageId,
}

impl SendBuffer {
    pub fn send_id(&self) -> MessageId {
        self.send_id
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// The lowest id that can still be re-sent
    pub fn history_first_id(&self) -> Option<MessageId> {
        self.history.front().map(|m| m.id)
    }

    pub fn enqueue(&mut self, payload: &[u8], tick: u64) -> MessageId {
        let id = self.send_id;
        self.send_id = id.next();

        trace!("registering message #{} of length {} for sending", id, payload.len());
        self.pending.push_back(OutboundMessage {
            id,
            tick,
            payload: Bytes::copy_from_slice(payload),
        });
        id
    }

    /// Pack all pending messages and move them to history
    pub fn flush(&mut self, builder: &mut PacketBuilder) {
        for message in &self.pending {
            builder.push_data(message.id, &message.payload);
        }
        self.history.extend(self.pending.drain(..));
    }

    /// Discard history entries registered before the given tick. These can never be re-sent.
    pub fn expire(&mut self, boundary_tick: u64) -> usize {
        let mut num_expired = 0;
        while let Some(oldest) = self.history.front() {
            if oldest.tick >= boundary_tick {
                break;
            }
            self.history.pop_front();
            num_expired += 1;
        }

        if num_expired > 0 {
            debug!("discarded {} sent messages registered before tick {} from history", num_expired, boundary_tick);
        }
        num_expired
    }

    /// All retained messages in the given range, in ascending order
    pub fn history_in_range(&self, range: IdRange) -> impl Iterator<Item = &OutboundMessage> {
        self.history.iter()
            .skip_while(move |m| m.id < range.min)
            .take_while(move |m| m.id <= range.max)
    }
}
