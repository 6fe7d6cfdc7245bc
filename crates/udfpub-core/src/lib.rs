//! Dependency resolution and reference rewriting for publishing SQL UDFs
//! as persistent warehouse functions

pub mod error;
pub mod matcher;
pub mod parse;
pub mod publish;
pub mod registry;
pub mod resolver;
pub mod rewriter;

pub use error::{LoadError, PublishError, RemoteError, ResolveError};
pub use publish::{
    FailurePolicy, ObjectStore, PublishOptions, PublishReport, Publisher, RunState, Warehouse,
};
pub use registry::{RawFunction, Registry};
pub use resolver::DependencyResolver;
pub use rewriter::{rewrite, to_persistent, Rewriter};
