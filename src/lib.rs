//! A reliable, ordered, message-oriented protocol on top of an unreliable datagram transport
//!  (typically UDP).
//!
//! Design:
//! * The abstraction is sending / receiving *messages*, i.e. defined-length chunks of data. A
//!   message is never split across packets, so the maximum message size is bounded by the
//!   packet size.
//! * The core ([rudp::Rudp]) is a sans-I/O state machine: the application feeds in received
//!   datagrams, advances time in abstract 'ticks', and sends whatever packets a tick produces.
//!   [driver::RudpDriver] does this with Tokio and a UDP socket.
//! * Messages are numbered consecutively from 0 per direction. On the wire, only the low 16 bits
//!   of an id are transmitted, and the receiver reconstructs the full id relative to what it has
//!   seen so far. This works as long as no more than 32K messages are in flight.
//! * There are no ACKs. Loss is detected by the receiver as a gap in the received ids, and the
//!   missing range is requested explicitly (negative acknowledgement). To tolerate reordering,
//!   a gap is requested only after it persisted for a configurable number of ticks.
//! * The sender retains sent messages for a configurable number of ticks. If a requested message
//!   is no longer available, the sender answers with a 'missing' record, and the receiver skips
//!   the range. So delivery is in order, but not strictly guaranteed: the application may see a
//!   gap in the sequence after prolonged loss.
//! * Messages sent within a tick window are batched into as few packets as possible. Every flush
//!   produces at least one packet (a ping if there is nothing else to send), which makes silence
//!   a reliable signal: if nothing is received for a configurable number of ticks, the stream is
//!   considered corrupt.
//! * Any protocol violation, timeout or EOF terminates the stream for good. There is no
//!   reconnect; the application creates a new stream.
//!
//! A packet is a sequence of records without any header. Each record starts with a length /
//!  type field; all numbers are in network byte order (BE):
//! ```ascii
//!  L < 0x80:    | L (1 byte) | body
//!  L >= 0x80:   | 0x80 | L >> 8 (1 byte) | L & 0xff (1 byte) | body
//!
//!  L = 0   ping       no body
//!  L = 1   EOF        no body
//!  L = 2   corrupt    no body - the sender aborted, nothing after this record is read
//!  L = 3   request    | min id (u16) | max id (u16) |  please re-send this inclusive range
//!  L = 4   missing    | min id (u16) | max id (u16) |  this range will never be re-sent
//!  L >= 5  data       | id (u16) | payload (L - 5 bytes) |
//! ```
//!
//! Packets are assembled in this order: requests for missing messages, replies to the peer's
//!  requests (re-sent data and 'missing' records), then newly sent messages.

pub mod config;
pub mod driver;
pub mod message_id;
pub mod record;
pub mod rudp;
pub mod state;

mod loss_detection;
mod packet_builder;
mod receive_buffer;
mod send_buffer;

#[cfg(test)]
mod test {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .with_test_writer()
            .try_init()
            .ok();
    }
}
