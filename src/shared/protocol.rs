/// Request/reply protocol shared by the scheduler core, the wire codec and
/// the workload loaders.
///
/// The upstream delivery layer hands the scheduler an ordered stream of
/// [`ClientMessage`]s; workers answer with [`ReplyMessage`]s through a
/// [`crate::infrastructure::network::ReplySink`].
use serde::{Deserialize, Serialize};

/// Keys are plain integers end to end (wire header carries an `i32`).
pub type Key = i32;

/// Maximum length of the variable `args` field on the wire, in bytes.
pub const MAX_ARGS_LEN: usize = 4096;

/// Value written for keys that are pre-created rather than client-written,
/// and returned when a stored value cannot be recovered.
pub const TEMPLATE_VALUE: &str = "#";

/// Request kinds. Discriminants are part of the wire protocol and must not
/// be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum RequestType {
    Read = 0,
    Write = 1,
    Scan = 2,
    /// Internal rendezvous marker. Never produced by clients; a SYNC arriving
    /// from the outside is dropped at the scheduler front door.
    Sync = 3,
    Error = 4,
}

impl RequestType {
    pub fn from_wire(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(RequestType::Read),
            1 => Some(RequestType::Write),
            2 => Some(RequestType::Scan),
            3 => Some(RequestType::Sync),
            4 => Some(RequestType::Error),
            _ => None,
        }
    }

    pub fn as_wire(self) -> i32 {
        self as i32
    }

    /// Label used for metrics and logs.
    pub fn label(self) -> &'static str {
        match self {
            RequestType::Read => "read",
            RequestType::Write => "write",
            RequestType::Scan => "scan",
            RequestType::Sync => "sync",
            RequestType::Error => "error",
        }
    }
}

/// A single unit of work as delivered by the upstream ordering layer.
///
/// `s_addr`/`sin_port` form the opaque reply address; the core never
/// interprets them beyond echoing them to the reply transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub id: i32,
    pub s_addr: u32,
    pub sin_port: u16,
    pub key: Key,
    pub kind: RequestType,
    pub record_timestamp: bool,
    /// WRITE: the new value. SCAN: decimal range length. Empty otherwise.
    pub args: String,
}

impl ClientMessage {
    pub fn new(id: i32, kind: RequestType, key: Key, args: impl Into<String>) -> Self {
        Self {
            id,
            s_addr: 0,
            sin_port: 0,
            key,
            kind,
            record_timestamp: false,
            args: args.into(),
        }
    }

    /// Parses the SCAN range length out of `args`.
    pub fn scan_length(&self) -> Option<usize> {
        self.args.trim().parse::<usize>().ok().filter(|n| *n > 0)
    }
}

/// Answer to a non-SYNC request, in admission order per key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMessage {
    pub id: i32,
    pub answer: String,
}

impl ReplyMessage {
    pub fn new(id: i32, answer: impl Into<String>) -> Self {
        Self {
            id,
            answer: answer.into(),
        }
    }

    /// Fixed answer for requests that could not be routed or executed.
    pub fn error(id: i32) -> Self {
        Self::new(id, "ERROR")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_discriminants_are_stable() {
        assert_eq!(RequestType::Read.as_wire(), 0);
        assert_eq!(RequestType::Write.as_wire(), 1);
        assert_eq!(RequestType::Scan.as_wire(), 2);
        assert_eq!(RequestType::Sync.as_wire(), 3);
        assert_eq!(RequestType::Error.as_wire(), 4);

        for raw in 0..5 {
            assert_eq!(RequestType::from_wire(raw).unwrap().as_wire(), raw);
        }
        assert!(RequestType::from_wire(5).is_none());
        assert!(RequestType::from_wire(-1).is_none());
    }

    #[test]
    fn test_scan_length_parsing() {
        let scan = ClientMessage::new(1, RequestType::Scan, 10, "4");
        assert_eq!(scan.scan_length(), Some(4));

        let padded = ClientMessage::new(2, RequestType::Scan, 10, " 12 ");
        assert_eq!(padded.scan_length(), Some(12));

        let zero = ClientMessage::new(3, RequestType::Scan, 10, "0");
        assert_eq!(zero.scan_length(), None);

        let garbage = ClientMessage::new(4, RequestType::Scan, 10, "four");
        assert_eq!(garbage.scan_length(), None);
    }

    #[test]
    fn test_error_reply_answer() {
        let reply = ReplyMessage::error(42);
        assert_eq!(reply.id, 42);
        assert_eq!(reply.answer, "ERROR");
    }
}
