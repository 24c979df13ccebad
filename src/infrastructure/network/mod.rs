/// Network boundary of the scheduler core.
///
/// The actual TCP/UDP reply transport lives outside this crate; workers hand
/// finished replies to a [`ReplySink`], and whatever owns the sockets drains
/// them. The wire formats for both directions live in [`codec`].

pub mod codec;

pub use codec::{Codec, CodecError, ReplyCodec, RequestCodec};

use crate::shared::protocol::ReplyMessage;
use crossbeam::channel::{unbounded, Receiver, Sender};

/// Where workers deliver answers. Implementations must tolerate being called
/// from every partition thread concurrently.
pub trait ReplySink: Send + Sync {
    fn send(&self, reply: ReplyMessage);
}

/// Buffers replies on a channel for an external drain loop. This is the sink
/// used by the CLI run loop and by the scenario tests.
pub struct ChannelReplySink {
    tx: Sender<ReplyMessage>,
}

impl ChannelReplySink {
    pub fn new() -> (Self, Receiver<ReplyMessage>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl ReplySink for ChannelReplySink {
    fn send(&self, reply: ReplyMessage) {
        // The drain side may already be gone during shutdown; replies for a
        // dead transport are dropped, matching the drop-on-shutdown contract.
        let _ = self.tx.send(reply);
    }
}

/// Logs replies instead of delivering them. Useful under `--dry-run` and in
/// benches where the answer content is irrelevant.
#[derive(Debug, Default)]
pub struct LogReplySink;

impl ReplySink for LogReplySink {
    fn send(&self, reply: ReplyMessage) {
        tracing::debug!(id = reply.id, answer = %reply.answer, "reply");
    }
}
