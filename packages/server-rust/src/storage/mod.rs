//! Object storage backends for stages that read and write bucket objects.
//!
//! The [`ObjectStore`](crate::traits::ObjectStore) trait lives in `traits`; this
//! module holds the in-process implementation. The Cloud Storage client is in
//! [`crate::gcp::storage`].

pub mod memory;

pub use memory::MemoryObjectStore;
