pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod registry;
pub mod relay;

pub use config::HostConfig;
pub use context::HostContext;
pub use error::HostError;
pub use events::FabricEvent;
pub use relay::{Inbound, RelayDecision, RelayPipeline};
