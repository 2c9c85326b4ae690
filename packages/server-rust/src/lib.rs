//! Event relay server: HTTP host, reply writers, processing stages, and cloud clients.

pub mod app;
pub mod config;
pub mod drain;
pub mod error;
pub mod gcp;
pub mod ingress;
pub mod network;
pub mod pipeline;
pub mod publish;
pub mod selector;
pub mod stage;
pub mod storage;
pub mod traits;
pub mod writer;

pub use error::{DomainOperationError, PublishError, StageError};
pub use traits::{ImageAnnotator, ObjectStore, QueryEngine, TranslationApi};
