use anyhow::bail;
use crate::record::{data_record_len, MAX_PAYLOAD_LEN, RANGE_RECORD_LEN};

/// All time values are in ticks, i.e. in the unit the application uses when advancing protocol
///  time through [crate::rudp::Rudp::update]. The defaults assume ticks of roughly 10ms.
#[derive(Debug, Clone)]
pub struct RudpConfig {
    /// This is the maximum size of a single packet produced by the protocol. The default is
    ///  conservative: `576 - 60 - 8 = 508`, i.e. the minimum datagram size every IPv4 host must
    ///  accept, minus maximum IP header and UDP header. This guarantees that packets are never
    ///  fragmented on the way, which is what the protocol assumes.
    ///
    /// Choosing this value too big causes packets to be dropped (or fragmented) by the network.
    pub max_packet_size: usize,

    /// Messages longer than this are declined by `send()`. A data record carrying a message of this
    ///  size must fit into a single packet, since messages are never split across packets.
    pub max_message_size: usize,

    /// Outgoing packets are assembled at most once per this many ticks, batching all messages
    ///  sent in between. Zero means every call to `update()` flushes.
    pub send_delay_ticks: u64,

    /// Sent messages are retained for re-sending for (at least) this many ticks. Requests for
    ///  messages that were discarded are answered with a 'missing' record.
    pub expired_ticks: u64,

    /// If nothing is received for this many ticks, the stream is considered corrupt. Since every
    ///  flush sends at least a ping, this is a liveness timeout.
    pub corrupt_ticks: u64,

    /// A gap in the received messages is requested from the peer only after it persisted for this
    ///  many ticks, giving reordered packets a chance to arrive first.
    pub missing_ticks: u64,
}

impl Default for RudpConfig {
    fn default() -> Self {
        const MAX_PACKET_SIZE: usize = 576 - 60 - 8;

        RudpConfig {
            max_packet_size: MAX_PACKET_SIZE,
            max_message_size: MAX_PACKET_SIZE - data_record_len(0) - 1,
            send_delay_ticks: 1,
            expired_ticks: 1000,
            corrupt_ticks: 500,
            missing_ticks: 2,
        }
    }
}

impl RudpConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_packet_size < RANGE_RECORD_LEN {
            bail!("max packet size {} is too small to hold a control record", self.max_packet_size);
        }
        if self.max_message_size > MAX_PAYLOAD_LEN {
            bail!("max message size {} exceeds the protocol limit of {}", self.max_message_size, MAX_PAYLOAD_LEN);
        }
        if data_record_len(self.max_message_size) > self.max_packet_size {
            bail!("a message of max message size {} does not fit into a packet of {} bytes", self.max_message_size, self.max_packet_size);
        }
        if self.corrupt_ticks == 0 {
            bail!("corrupt ticks must be positive");
        }
        if self.expired_ticks == 0 {
            bail!("expired ticks must be positive");
        }
        Ok(())
    }
}
