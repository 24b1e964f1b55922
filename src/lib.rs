// Telex - multi-hop link attribution pipeline
// Chains a visitor through link resolution, script delivery, and data
// collection so one visit correlates with network enrichment and client
// fingerprint data under a single event.

pub mod capture;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod ids;
pub mod meta;
pub mod pipeline;
pub mod server;
pub mod store;

pub use config::TelexConfig;
pub use error::{Error, Result};
pub use pipeline::{HopResponse, Pipeline};
pub use store::{AttributionRecordStore, KeyValueStore, MemoryStore, Partition};
