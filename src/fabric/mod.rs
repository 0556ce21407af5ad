mod arbiter;
mod cluster;
mod config;
mod pending;
mod req;
mod xlat;

pub use arbiter::MemArbiter;
pub use cluster::CacheCluster;
pub use config::ClusterConfig;
pub use pending::PendingXlatTable;
pub use req::{MemOp, MemRequest, MemResponse};
pub use xlat::TranslationStage;
