use std::collections::VecDeque;
use bytes::Bytes;
use tracing::{debug, trace};
use crate::message_id::{IdRange, MessageId};

struct InboundMessage {
    id: MessageId,
    payload: Bytes,
}

/// Received messages that were not yet consumed by the application, ordered by id.
///
/// The buffer may have gaps, but it never contains an id twice, and never an id below
///  `recv_id_min`. Messages are handed out strictly in order: only a message with exactly the id
///  `recv_id_min` can be consumed, so a single gap blocks everything after it until it is either
///  filled or abandoned.
#[derive(Default)]
pub struct ReceiveBuffer {
    messages: VecDeque<InboundMessage>,
    /// the id of the next message the application will consume
    recv_id_min: MessageId,
    /// the highest id that was ever accepted into the buffer
    recv_id_max: MessageId,
}

impl ReceiveBuffer {
    pub fn recv_id_min(&self) -> MessageId {
        self.recv_id_min
    }

    pub fn recv_id_max(&self) -> MessageId {
        self.recv_id_max
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Store a received message, returning `true` if it was actually added and `false` if it was
    ///  a duplicate or was consumed already.
    pub fn insert(&mut self, id: MessageId, payload: &[u8]) -> bool {
        if id < self.recv_id_min {
            trace!("message #{} was already received (next expected is #{}) - ignoring", id, self.recv_id_min);
            return false;
        }

        match self.messages.binary_search_by_key(&id, |m| m.id) {
            Ok(_) => {
                trace!("duplicate message #{} - ignoring", id);
                false
            }
            Err(pos) => {
                self.messages.insert(pos, InboundMessage {
                    id,
                    payload: Bytes::copy_from_slice(payload),
                });
                if id > self.recv_id_max {
                    self.recv_id_max = id;
                }
                true
            }
        }
    }

    /// The length of the next message, if it is ready for consumption
    pub fn peek_next_len(&self) -> Option<usize> {
        self.messages.front()
            .filter(|m| m.id == self.recv_id_min)
            .map(|m| m.payload.len())
    }

    /// Remove and return the next message in sequence, if it was received
    pub fn pop_next(&mut self) -> Option<Bytes> {
        if self.peek_next_len().is_none() {
            return None;
        }
        let message = self.messages.pop_front()?;
        self.recv_id_min = message.id.next();
        Some(message.payload)
    }

    /// The range of missing ids between the next expected id and the lowest buffered message, if
    ///  there is such a gap.
    pub fn gap(&self) -> Option<IdRange> {
        let head = self.messages.front()?;
        if head.id > self.recv_id_min {
            head.id.prev()
                .map(|max| IdRange::new(self.recv_id_min, max))
        }
        else {
            None
        }
    }

    /// Give up on a range of ids that the peer announced will never be re-sent. This is applied
    ///  only if the range starts at (or before) the next expected id and is not entirely in the
    ///  past, so it can never move `recv_id_min` backwards or past a range that is not the
    ///  current gap.
    ///
    /// Returns `true` if `recv_id_min` was moved.
    pub fn abandon(&mut self, range: IdRange) -> bool {
        if range.max < self.recv_id_min {
            debug!("abandoning {} ignored: already received up to #{}", range, self.recv_id_min);
            return false;
        }
        if range.min > self.recv_id_min {
            debug!("abandoning {} ignored: next expected is #{}", range, self.recv_id_min);
            return false;
        }

        debug!("abandoning {}, next expected was #{}", range, self.recv_id_min);
        self.recv_id_min = range.max.next();

        while let Some(head) = self.messages.front() {
            if head.id >= self.recv_id_min {
                break;
            }
            debug!("discarding buffered message #{} inside abandoned range", head.id);
            self.messages.pop_front();
        }
        true
    }
}
