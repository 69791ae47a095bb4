pub mod conversation;
pub mod factory;
pub mod prompts;
pub mod task;
pub mod unit;

pub use conversation::Conversation;
pub use factory::AgentFactory;
pub use prompts::RenderedInstructions;
pub use task::Task;
pub use unit::AgentUnit;
