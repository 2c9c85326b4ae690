//! Event relay core: envelopes, canonical payload decoding, and writer configuration.
//!
//! Everything in this crate is transport-free: the HTTP host, the writers, and the
//! stages live in `relay-server`.

pub mod config;
pub mod context;
pub mod decode;
pub mod envelope;
pub mod error;
pub mod payload;

pub use config::{
    ConfigSource, EnvSource, EventIdentity, EventReaderKind, WriterConfig, WriterMode,
};
pub use context::RequestContext;
pub use decode::decode;
pub use envelope::{event_types, Envelope};
pub use error::{ConfigurationError, DecodeError};
pub use payload::{CanonicalPayload, ReplyPayload, StorageRef};
