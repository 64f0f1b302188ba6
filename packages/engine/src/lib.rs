//! Derived-media orchestration: deterministic variation identity, per
//! (blob, digest) reservation, placeholder outputs, and dispatch of the
//! actual transformation work to a remote service.

pub mod database;
pub mod entity;
pub mod error;
pub mod kind;
pub mod preview;
pub mod processor;
pub mod repository;
pub mod urls;
pub mod variant;
pub mod variation;
pub mod waiter;

pub use error::ProcessError;
pub use kind::MediaKind;
pub use processor::{AssemblyProcessor, DirectProcessor, VariantProcessor};
pub use repository::BlobRepository;
pub use urls::EndpointResolver;
pub use variant::{ProcessOptions, VariantEngine};
pub use variation::Variation;
