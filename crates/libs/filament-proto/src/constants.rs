/// Token separator used inside `Envelope::text` for structured commands.
pub const TOKEN_SEPARATOR: &str = ";:;";

/// Command token announcing one fragment of a chunked frame.
pub const CHUNK_COMMAND: &str = "chunk-transfer";

/// Largest fragment carried by a single chunk envelope.
pub const CHUNK_PAYLOAD_MAX: usize = 100_000;

/// Soft ceiling for `Envelope::text`, kept short for transport efficiency.
pub const TEXT_SOFT_LIMIT: usize = 476;

/// Origin-chain sentinel stamped before the hosting process has started.
pub const ORIGIN_NOT_RUNNING: &str = "not-running";

pub const HOP_SEPARATOR: char = ';';
pub const THING_SEPARATOR: char = ':';
