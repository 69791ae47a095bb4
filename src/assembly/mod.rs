pub mod resolver;
pub mod store;
pub mod types;

pub use resolver::{AssemblyResolver, ResolveError};
pub use store::{AssemblyStore, InMemoryAssemblyStore};
pub use types::{Assembly, EvaluatorConfig, InstructionPayload};
