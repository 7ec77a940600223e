pub mod cleanup;
pub mod executor;
pub mod resolver;
pub mod rewriter;

pub use cleanup::delete_repositories;
pub use executor::{ExecutorSettings, ReplicationExecutor};
pub use resolver::WorkloadResolver;
pub use rewriter::ReferenceRewriter;
