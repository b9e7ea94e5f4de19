// The seven pipeline stages, each runnable on its own from the CLI, plus
// the orchestrated full run. Stages talk to the outside world only through
// the capability traits, so everything here tests against in-memory fakes.

pub mod catalog;
pub mod export;
pub mod extract;
pub mod join;
pub mod normalize;
pub mod publish;
pub mod raw_store;
pub mod tasks;

pub use tasks::PipelineContext;
