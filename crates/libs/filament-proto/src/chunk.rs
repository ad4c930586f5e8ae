//! Reassembly of oversized frames delivered as bounded-size fragments.
//!
//! Fragments are keyed by an opaque correlation id and indexed from zero.
//! Completion is detected synchronously inside [`ChunkAssembler::ingest`].
//! There is no expiry: a set whose tail fragment never arrives stays
//! resident. Hosts that care can watch [`ChunkAssembler::pending_len`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::constants::{CHUNK_COMMAND, TOKEN_SEPARATOR};

/// Result of ingesting one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Fragment recorded; the set is still missing pieces.
    Pending,
    /// Final fragment arrived; the payload is assembled by ascending index.
    Completed(Vec<u8>),
    /// Fragment dropped. The logical message simply never completes.
    Rejected(&'static str),
}

/// Reassembly state for one logical message.
#[derive(Debug, Default)]
struct ChunkSet {
    expected: u32,
    parts: BTreeMap<u32, Vec<u8>>,
    completed: bool,
}

impl ChunkSet {
    fn assemble(&self) -> Vec<u8> {
        let total: usize = self.parts.values().map(Vec::len).sum();
        let mut payload = Vec::with_capacity(total);
        for part in self.parts.values() {
            payload.extend_from_slice(part);
        }
        payload
    }
}

/// Shared store of partially received messages.
///
/// Many receive paths feed one assembler. Lookups take the shared read
/// side; the exclusive side is held only to insert a new set or remove a
/// finished one, so fragments for different correlation ids do not block
/// each other while fragments for the same id are serialized by the
/// per-set mutex.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    pending: RwLock<HashMap<String, Arc<Mutex<ChunkSet>>>>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one fragment. The first fragment for an id fixes the expected
    /// count; a duplicate index overwrites its earlier bytes; arrival order
    /// never affects the assembled layout.
    pub fn ingest(
        &self,
        correlation_id: &str,
        chunk_index: u32,
        expected_count: u32,
        bytes: &[u8],
    ) -> IngestOutcome {
        if bytes.is_empty() {
            log::warn!("chunk: missing payload for chunk {chunk_index} of {correlation_id}");
            return IngestOutcome::Rejected("missing payload for chunk");
        }

        let set = self.find_or_create(correlation_id, expected_count);

        let payload = {
            let mut guard = lock_set(&set);
            if guard.completed {
                // A racing duplicate of the final fragment; the set is gone
                // from the store already.
                return IngestOutcome::Pending;
            }
            guard.parts.insert(chunk_index, bytes.to_vec());
            if (guard.parts.len() as u32) < guard.expected {
                return IngestOutcome::Pending;
            }
            guard.completed = true;
            guard.assemble()
        };

        write_guard(&self.pending).remove(correlation_id);
        IngestOutcome::Completed(payload)
    }

    /// Whether a set for this correlation id is still pending.
    pub fn contains(&self, correlation_id: &str) -> bool {
        read_guard(&self.pending).contains_key(correlation_id)
    }

    /// Number of resident partial sets.
    pub fn pending_len(&self) -> usize {
        read_guard(&self.pending).len()
    }

    fn find_or_create(&self, correlation_id: &str, expected_count: u32) -> Arc<Mutex<ChunkSet>> {
        if let Some(set) = read_guard(&self.pending).get(correlation_id) {
            return Arc::clone(set);
        }
        let mut store = write_guard(&self.pending);
        Arc::clone(store.entry(correlation_id.to_owned()).or_insert_with(|| {
            Arc::new(Mutex::new(ChunkSet {
                expected: expected_count.max(1),
                ..ChunkSet::default()
            }))
        }))
    }
}

fn read_guard<'a, T>(lock: &'a RwLock<T>) -> std::sync::RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        log::error!("chunk: pending store read lock poisoned, recovering");
        poisoned.into_inner()
    })
}

fn write_guard<'a, T>(lock: &'a RwLock<T>) -> std::sync::RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        log::error!("chunk: pending store write lock poisoned, recovering");
        poisoned.into_inner()
    })
}

fn lock_set(set: &Mutex<ChunkSet>) -> MutexGuard<'_, ChunkSet> {
    set.lock().unwrap_or_else(|poisoned| {
        log::error!("chunk: set lock poisoned, recovering");
        poisoned.into_inner()
    })
}

/// The textual chunk-transfer command carried in an envelope's text while
/// the fragment bytes travel as its binary payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCommand {
    pub chunk_index: u32,
    pub expected_count: u32,
    pub correlation_id: String,
}

impl ChunkCommand {
    pub fn encode(&self) -> String {
        format!(
            "{CHUNK_COMMAND}{TOKEN_SEPARATOR}{}{TOKEN_SEPARATOR}{}{TOKEN_SEPARATOR}{}",
            self.chunk_index, self.expected_count, self.correlation_id
        )
    }

    pub fn parse(text: &str) -> Option<Self> {
        let mut tokens = text.split(TOKEN_SEPARATOR);
        if tokens.next()? != CHUNK_COMMAND {
            return None;
        }
        let chunk_index = tokens.next()?.parse().ok()?;
        let expected_count = tokens.next()?.parse().ok()?;
        let correlation_id = tokens.next()?.to_owned();
        if correlation_id.is_empty() {
            return None;
        }
        Some(Self { chunk_index, expected_count, correlation_id })
    }
}

/// Split an encoded frame into chunk-command fragments of at most
/// `max_chunk` bytes. The receive side's [`ChunkAssembler`] is the exact
/// inverse. Empty input yields no fragments.
pub fn split_frame(
    frame: &[u8],
    correlation_id: &str,
    max_chunk: usize,
) -> Vec<(ChunkCommand, Vec<u8>)> {
    if frame.is_empty() || max_chunk == 0 {
        return Vec::new();
    }
    let expected_count = frame.len().div_ceil(max_chunk) as u32;
    frame
        .chunks(max_chunk)
        .enumerate()
        .map(|(index, part)| {
            (
                ChunkCommand {
                    chunk_index: index as u32,
                    expected_count,
                    correlation_id: correlation_id.to_owned(),
                },
                part.to_vec(),
            )
        })
        .collect()
}
