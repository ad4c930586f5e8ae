pub mod chunk;
pub mod constants;
pub mod context;
pub mod envelope;
pub mod error;
pub mod routing;
pub mod wire;

pub use chunk::{ChunkAssembler, ChunkCommand, IngestOutcome};
pub use context::{NodeContext, SenderClass};
pub use envelope::{Envelope, EnvelopeFlags, Level};
pub use error::ProtoError;
