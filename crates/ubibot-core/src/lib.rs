pub mod config;
pub mod coordinator;
pub mod fetcher;
pub mod normalize;
pub mod sensors;
pub mod snapshot;
pub mod validation;

pub use config::{resolve_scan_interval, ConfigError, Credentials, PollConfig};
pub use coordinator::{Coordinator, CycleOutcome, SetupError};
pub use fetcher::{ChannelFetcher, FetchError, HttpFetcher};
pub use normalize::normalize;
pub use sensors::{DeviceInfo, EntityCategory, SensorDescription, SensorView, SENSORS};
pub use snapshot::{CoordinatorState, NormalizedSnapshot, SnapshotValue};
pub use validation::{validate_credentials, ValidationError};
