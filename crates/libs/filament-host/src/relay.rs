//! The receive path: wire frame in, routable envelope out.
//!
//! Frames arrive from any number of connection handlers; one pipeline
//! instance serves them all. Chunk-transfer fragments are accumulated until
//! the enclosing frame is whole, then decoded like any other frame.

use std::sync::{Arc, Mutex};

use filament_proto::chunk::split_frame;
use filament_proto::constants::CHUNK_PAYLOAD_MAX;
use filament_proto::routing::{self, Router};
use filament_proto::wire;
use filament_proto::{ChunkAssembler, ChunkCommand, Envelope, IngestOutcome, NodeContext};

use crate::error::HostError;
use crate::events::FabricEvent;
use crate::registry::PayloadCipher;

/// What one inbound frame produced.
#[derive(Debug)]
pub enum Inbound {
    /// A complete message, ready for routing and dispatch.
    Message(Envelope),
    /// A fragment was recorded; the logical message is still incomplete.
    FragmentPending,
    /// A malformed fragment was dropped. The logical message will simply
    /// never complete; no retry is initiated here.
    FragmentDropped,
}

/// Routing admission for a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayDecision {
    /// Deliver locally and forward onward.
    Forward,
    /// Deliver locally, do not forward.
    DeliverOnly,
    /// Already traveled through this node; discard.
    Drop,
}

pub struct RelayPipeline<C> {
    ctx: Arc<C>,
    assembler: ChunkAssembler,
    payload_cipher: Option<Arc<dyn PayloadCipher>>,
    events: Mutex<Vec<FabricEvent>>,
}

impl<C: NodeContext> RelayPipeline<C> {
    pub fn new(ctx: Arc<C>) -> Self {
        Self {
            ctx,
            assembler: ChunkAssembler::new(),
            payload_cipher: None,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn with_cipher(ctx: Arc<C>, cipher: Arc<dyn PayloadCipher>) -> Self {
        let mut pipeline = Self::new(ctx);
        pipeline.payload_cipher = Some(cipher);
        pipeline
    }

    /// Decode one inbound frame and run it through reassembly.
    pub fn handle_frame(&self, frame: &[u8]) -> Result<Inbound, HostError> {
        let envelope = wire::decode(frame, 0)?;
        if let Some(command) = ChunkCommand::parse(&envelope.text) {
            return self.ingest_fragment(&envelope, &command);
        }
        self.finish_inbound(envelope)
    }

    fn ingest_fragment(
        &self,
        envelope: &Envelope,
        command: &ChunkCommand,
    ) -> Result<Inbound, HostError> {
        let bytes = envelope.payload_binary.as_deref().unwrap_or(&[]);
        match self.assembler.ingest(
            &command.correlation_id,
            command.chunk_index,
            command.expected_count,
            bytes,
        ) {
            IngestOutcome::Rejected(reason) => {
                self.push_event(FabricEvent::FrameRejected { reason: reason.to_owned() });
                Ok(Inbound::FragmentDropped)
            }
            IngestOutcome::Pending => {
                self.push_event(FabricEvent::FragmentReceived {
                    correlation_id: command.correlation_id.clone(),
                    chunk_index: command.chunk_index,
                    expected_count: command.expected_count,
                });
                Ok(Inbound::FragmentPending)
            }
            IngestOutcome::Completed(payload) => {
                self.push_event(FabricEvent::MessageReassembled {
                    correlation_id: command.correlation_id.clone(),
                    byte_len: payload.len(),
                });
                let inner = wire::decode(&payload, 0)?;
                self.finish_inbound(inner)
            }
        }
    }

    fn finish_inbound(&self, mut envelope: Envelope) -> Result<Inbound, HostError> {
        if envelope.flags.payload_is_encrypted() {
            match &self.payload_cipher {
                Some(cipher) => {
                    let sealed = hex::decode(&envelope.payload_text)
                        .map_err(|err| HostError::Cipher(format!("bad sealed payload: {err}")))?;
                    let plain = cipher.open(&sealed)?;
                    envelope.payload_text = String::from_utf8(plain).map_err(|_| {
                        HostError::Cipher("decrypted payload is not utf-8".into())
                    })?;
                    envelope.flags.set_payload_is_encrypted(false);
                }
                None => {
                    log::warn!("relay: encrypted payload received with no cipher configured");
                }
            }
        }
        Ok(Inbound::Message(envelope))
    }

    /// Stamp the local hop and decide what may happen next. Receive-path
    /// only; locally originated envelopes do not pass through here.
    pub fn admit(&self, envelope: &mut Envelope) -> RelayDecision {
        let router = Router::new(self.ctx.as_ref());
        if !router.add_local_hop(envelope) {
            // Second visit: the mesh looped the message back.
            return RelayDecision::Drop;
        }
        let hops = routing::hop_count(&envelope.origin_chain);
        if envelope.flags.do_not_relay() && hops >= 2 {
            return RelayDecision::DeliverOnly;
        }
        if envelope.flags.relay_only() && hops >= 2 {
            return RelayDecision::DeliverOnly;
        }
        RelayDecision::Forward
    }

    /// Prepare a locally originated envelope for the transport: honor an
    /// encryption request, then fragment the frame when it exceeds the
    /// chunk bound and the envelope allows chunking.
    pub fn prepare_outbound(
        &self,
        envelope: &mut Envelope,
        correlation_id: &str,
    ) -> Result<Vec<Envelope>, HostError> {
        if envelope.flags.encrypt_payload_request() {
            match &self.payload_cipher {
                Some(cipher) if !envelope.payload_text.is_empty() => {
                    let sealed = cipher.seal(envelope.payload_text.as_bytes())?;
                    envelope.payload_text = hex::encode(sealed);
                    envelope.flags.set_payload_is_encrypted(true);
                }
                Some(_) => {}
                None => {
                    log::warn!("relay: payload encryption requested but no cipher configured");
                }
            }
            envelope.flags.set_encrypt_payload_request(false);
        }

        let frame = wire::encode(envelope, 0)?;
        if envelope.flags.do_not_chunk() || frame.len() <= CHUNK_PAYLOAD_MAX {
            return Ok(vec![envelope.clone()]);
        }

        let carriers = split_frame(&frame, correlation_id, CHUNK_PAYLOAD_MAX)
            .into_iter()
            .map(|(command, bytes)| {
                let mut carrier = Envelope::with_text(self.ctx.as_ref(), command.encode());
                carrier.payload_binary = Some(bytes);
                carrier.engine_name = envelope.engine_name.clone();
                carrier.scope_id_scrambled = envelope.scope_id_scrambled.clone();
                carrier.queue_priority = envelope.queue_priority;
                carrier.level = envelope.level;
                carrier
            })
            .collect();
        Ok(carriers)
    }

    /// Resident partial chunk sets. Grows without bound under lossy
    /// transports; hosts that care should watch it.
    pub fn pending_chunk_sets(&self) -> usize {
        self.assembler.pending_len()
    }

    pub fn drain_events(&self) -> Vec<FabricEvent> {
        let mut events = self.events.lock().unwrap_or_else(|poisoned| {
            log::error!("relay: event queue lock poisoned, recovering");
            poisoned.into_inner()
        });
        std::mem::take(&mut *events)
    }

    fn push_event(&self, event: FabricEvent) {
        let mut events = self.events.lock().unwrap_or_else(|poisoned| {
            log::error!("relay: event queue lock poisoned, recovering");
            poisoned.into_inner()
        });
        events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::{Inbound, RelayDecision, RelayPipeline};
    use crate::context::HostContext;
    use crate::registry::AesGcmCipher;
    use filament_proto::{wire, Envelope};
    use std::sync::Arc;

    const KEY_HEX: &str = "202122232425262728292a2b2c2d2e2f303132333435363738393a3b3c3d3e3f";

    fn started_context(id: &str) -> Arc<HostContext> {
        let ctx = Arc::new(HostContext::new(id));
        ctx.mark_started();
        ctx
    }

    #[test]
    fn plain_frame_passes_straight_through() {
        let sender = started_context("N1");
        let receiver = started_context("N2");
        let envelope = Envelope::with_text(sender.as_ref(), "PING");
        let frame = wire::encode(&envelope, 0).expect("encode");

        let pipeline = RelayPipeline::new(receiver);
        let Inbound::Message(received) = pipeline.handle_frame(&frame).expect("handle") else {
            panic!("plain frame should yield a message");
        };
        assert_eq!(received.text, "PING");
        assert_eq!(received.origin_chain, "N1");
    }

    #[test]
    fn admit_stamps_hop_and_drops_loops() {
        let ctx = started_context("N2");
        let pipeline = RelayPipeline::new(Arc::clone(&ctx));

        let sender = started_context("N1");
        let mut envelope = Envelope::with_text(sender.as_ref(), "PING");
        assert_eq!(pipeline.admit(&mut envelope), RelayDecision::Forward);
        assert_eq!(envelope.origin_chain, "N1;N2");

        // Same envelope looping back through this node.
        assert_eq!(pipeline.admit(&mut envelope), RelayDecision::Drop);
        assert_eq!(envelope.origin_chain, "N1;N2");
    }

    #[test]
    fn admit_honors_next_hop_and_relay_stop_flags() {
        let ctx = started_context("N2");
        let pipeline = RelayPipeline::new(ctx);
        let sender = started_context("N1");

        let mut envelope = Envelope::with_text(sender.as_ref(), "near");
        envelope.flags.set_do_not_relay(true);
        assert_eq!(pipeline.admit(&mut envelope), RelayDecision::DeliverOnly);

        let mut envelope = Envelope::with_text(sender.as_ref(), "stop-here");
        envelope.flags.set_relay_only(true);
        assert_eq!(pipeline.admit(&mut envelope), RelayDecision::DeliverOnly);
    }

    #[test]
    fn encryption_request_round_trips_through_the_wire() {
        let sender_ctx = started_context("N1");
        let receiver_ctx = started_context("N2");
        let cipher = Arc::new(AesGcmCipher::from_hex_key(KEY_HEX).expect("cipher"));

        let sender = RelayPipeline::with_cipher(sender_ctx.clone(), cipher.clone());
        let receiver = RelayPipeline::with_cipher(receiver_ctx, cipher);

        let mut envelope =
            Envelope::with_payload(sender_ctx.as_ref(), "report", "meter reading 42");
        envelope.flags.set_encrypt_payload_request(true);

        let outbound = sender.prepare_outbound(&mut envelope, "c-1").expect("prepare");
        assert_eq!(outbound.len(), 1);
        let sent = &outbound[0];
        assert!(sent.flags.payload_is_encrypted());
        assert!(!sent.flags.encrypt_payload_request());
        assert_ne!(sent.payload_text, "meter reading 42");

        let frame = wire::encode(sent, 0).expect("encode");
        let Inbound::Message(received) = receiver.handle_frame(&frame).expect("handle") else {
            panic!("frame should yield a message");
        };
        assert_eq!(received.payload_text, "meter reading 42");
        assert!(!received.flags.payload_is_encrypted());
    }

    #[test]
    fn do_not_chunk_keeps_oversized_frames_whole() {
        let ctx = started_context("N1");
        let pipeline = RelayPipeline::new(Arc::clone(&ctx));

        let mut envelope = Envelope::with_text(ctx.as_ref(), "bulk");
        envelope.payload_binary = Some(vec![7u8; 2 * filament_proto::constants::CHUNK_PAYLOAD_MAX]);
        envelope.flags.set_do_not_chunk(true);

        let outbound = pipeline.prepare_outbound(&mut envelope, "c-2").expect("prepare");
        assert_eq!(outbound.len(), 1);
        assert!(outbound[0].payload_binary.as_ref().is_some_and(|p| p.len() > 100_000));
    }

    #[test]
    fn empty_fragment_is_dropped_not_fatal() {
        let sender = started_context("N1");
        let receiver = started_context("N2");
        let pipeline = RelayPipeline::new(receiver);

        let mut fragment = Envelope::with_text(
            sender.as_ref(),
            filament_proto::ChunkCommand {
                chunk_index: 0,
                expected_count: 2,
                correlation_id: "broken".into(),
            }
            .encode(),
        );
        fragment.payload_binary = None;
        let frame = wire::encode(&fragment, 0).expect("encode");

        assert!(matches!(
            pipeline.handle_frame(&frame).expect("handle"),
            Inbound::FragmentDropped
        ));
        assert_eq!(pipeline.pending_chunk_sets(), 0);
    }
}
