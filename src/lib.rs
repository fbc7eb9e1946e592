pub mod builder;
pub mod config;
pub mod ir;

pub use builder::{Artifact, Builder, BuilderError, ErrorCategory, FrameKind, ScopeHandle};
pub use config::{BuilderConfig, NamingPolicy};
