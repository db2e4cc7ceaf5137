pub mod config;
pub mod error;
pub mod external;
pub mod flush;
pub mod host;
pub mod registry;
pub mod series;
#[cfg(feature = "http")]
pub mod server;
pub mod sources;

pub use config::AgentConfig;
pub use error::{AgentError, ConfigError, ProviderError, ScrapeError};
pub use external::ExternalCollector;
pub use host::{HostStats, SystemHost};
pub use registry::Registry;
pub use series::{DataPoint, OutputFormat, SeriesFormat, Value};
pub use sources::MetricSource;
