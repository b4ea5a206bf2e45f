pub mod engine;
pub mod message;
pub mod topic;

pub use engine::{Broker, RemovedSubscriptions};
pub use topic::{RegistrySnapshot, TopicKind, TopicRegistry};
