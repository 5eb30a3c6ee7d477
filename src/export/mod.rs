//! Export pipeline: bucketing, sinks, the backup store and the agent that
//! drives them.

pub mod agent;
pub mod backup;
pub mod bucket;
pub mod http;
pub mod point;
pub mod sink;
pub mod stats;

pub use agent::{Agent, FlushSummary, ReplaySummary};
pub use backup::{backup_path, BackupFile, Exhausted, SpillHandler};
pub use bucket::{Bucket, BucketKey, REALTIME};
pub use http::HttpTransport;
pub use point::Point;
pub use sink::{BatchWriter, FailureCallback, LineProtocolSink, Sink, SinkWriter, Transport};
pub use stats::AgentStats;
