pub mod config;
pub mod error;
pub mod groups;
pub mod hub;
pub mod segment;
pub mod store;
pub mod transport;

pub use config::{ConfigLoader, ServerConfig, Validate};
pub use error::{ConfigError, HubError};
pub use groups::{GroupDispatcher, Outbox};
pub use hub::Hub;
pub use segment::{CompletedSegment, SegmentRing, segment_slot};
pub use store::SegmentStore;
