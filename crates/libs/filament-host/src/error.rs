use filament_proto::ProtoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("config error: {0}")]
    Config(String),
    #[error("cipher error: {0}")]
    Cipher(String),
    #[error(transparent)]
    Proto(#[from] ProtoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
