//! Interzept Background Service
//!
//! The long-lived background process: answers UI messages, persists the
//! rule list, and keeps the platform's installed dynamic rules in step
//! with it.
//!
//! # Modules
//!
//! - `background`: Message handling and the serialized update queue
//! - `messages`: Request and response shapes
//! - `storage`: Persistent key-value storage seam
//! - `platform`: Platform rule store seam
//! - `stats`: Interception statistics
//! - `config`: Service configuration

pub mod background;
pub mod config;
pub mod error;
pub mod messages;
pub mod platform;
pub mod stats;
pub mod storage;

pub use background::Background;
pub use config::ServiceConfig;
pub use error::{PlatformError, ServiceError, StorageError};
pub use messages::Request;
pub use platform::{JsonFilePlatform, MemoryPlatform, PlatformRuleStore};
pub use stats::Stats;
pub use storage::{JsonFileStorage, MemoryStorage, RuleStorage};
