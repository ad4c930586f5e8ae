mod flags;
mod level;

pub use flags::EnvelopeFlags;
pub use level::Level;

use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::constants::{ORIGIN_NOT_RUNNING, TOKEN_SEPARATOR};
use crate::context::NodeContext;
use crate::routing;

/// One message in flight between nodes.
///
/// An envelope is constructed once per logical message, mutated in place as
/// it is routed (hop appended, flags adjusted), and otherwise treated as a
/// value. Callers must not mutate the same envelope from two threads.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Short command or description. Structured commands separate tokens
    /// with `;:;`. Conventionally kept under [`crate::constants::TEXT_SOFT_LIMIT`]
    /// characters; not enforced.
    pub text: String,
    pub timestamp: OffsetDateTime,
    pub flags: EnvelopeFlags,
    pub payload_text: String,
    pub payload_binary: Option<Vec<u8>>,
    /// Ordered hop identifiers, `;`-joined. First entry is the birthplace,
    /// optionally annotated `nodeId:thingId`; last entry is the most recent
    /// relay.
    pub origin_chain: String,
    /// Precomputed reverse path toward the originator. Empty means normal
    /// mesh propagation rules apply.
    pub return_route: String,
    /// Lower is more urgent. Zero is reserved for non-cloud-routed
    /// real-time traffic.
    pub queue_priority: u8,
    pub level: Level,
    /// Target subsystem that owns and interprets this message.
    pub engine_name: String,
    pub serial_id: String,
    pub scope_id_scrambled: String,
    pub session_id: String,
    pub user_id: String,
    pub costing_history: String,
    pub owner: String,
}

impl Envelope {
    pub fn new<C: NodeContext + ?Sized>(ctx: &C) -> Self {
        Self::with_text(ctx, "")
    }

    pub fn with_text<C: NodeContext + ?Sized>(ctx: &C, text: impl Into<String>) -> Self {
        let mut envelope = Self::blank();
        envelope.text = text.into();
        envelope.stamp_origin(ctx);
        envelope
    }

    pub fn with_payload<C: NodeContext + ?Sized>(
        ctx: &C,
        text: impl Into<String>,
        payload_text: impl Into<String>,
    ) -> Self {
        let mut envelope = Self::with_text(ctx, text);
        envelope.payload_text = payload_text.into();
        envelope
    }

    /// Envelope with no origin stamp. Used by the wire decoder and by
    /// callers that defer stamping for performance.
    pub fn unstamped() -> Self {
        Self::blank()
    }

    fn blank() -> Self {
        Self {
            text: String::new(),
            timestamp: truncate_to_ticks(OffsetDateTime::now_utc()),
            flags: EnvelopeFlags::new(),
            payload_text: String::new(),
            payload_binary: None,
            origin_chain: String::new(),
            return_route: String::new(),
            queue_priority: 1,
            level: Level::Normal,
            engine_name: String::new(),
            serial_id: String::new(),
            scope_id_scrambled: String::new(),
            session_id: String::new(),
            user_id: String::new(),
            costing_history: String::new(),
            owner: String::new(),
        }
    }

    /// All construction variants funnel through here. Before the host has
    /// started the chain carries a sentinel instead of the node id.
    pub fn stamp_origin<C: NodeContext + ?Sized>(&mut self, ctx: &C) {
        if ctx.started() {
            self.origin_chain = ctx.local_node_id().to_owned();
        } else {
            self.origin_chain = ORIGIN_NOT_RUNNING.to_owned();
        }
    }

    /// Whether any payload is attached.
    pub fn has_payload(&self) -> bool {
        !self.payload_text.is_empty()
            || self.payload_binary.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Copy for independent forwarding. With `copy_binary_payload` the clone
    /// owns its own copy of the bytes; without, the clone carries no binary
    /// payload even if the source had one.
    pub fn clone_for_forward(&self, copy_binary_payload: bool) -> Self {
        let mut clone = self.clone();
        if !copy_binary_payload {
            clone.payload_binary = None;
        }
        clone
    }

    /// Similarity fingerprint over salt, level, engine name, originator,
    /// owner, and the first `;:;` token of the text, in that order.
    ///
    /// Not a cryptographic hash: semantically different messages may
    /// collide, and dedupe consumers must tolerate rare false equality.
    pub fn similarity_hash(&self, salt: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update([0x1f, self.level.to_wire()]);
        hasher.update(self.engine_name.as_bytes());
        hasher.update([0x1f]);
        hasher.update(routing::originator(&self.origin_chain).as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.owner.as_bytes());
        hasher.update([0x1f]);
        let first_token = self.text.split(TOKEN_SEPARATOR).next().unwrap_or("");
        hasher.update(first_token.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes)
    }
}

/// Clamp to the 100 ns tick granularity the wire format carries, so a
/// freshly built envelope survives an encode/decode round trip unchanged.
pub(crate) fn truncate_to_ticks(timestamp: OffsetDateTime) -> OffsetDateTime {
    let nanos = timestamp.nanosecond();
    timestamp
        .replace_nanosecond(nanos - nanos % 100)
        .unwrap_or(timestamp)
}
