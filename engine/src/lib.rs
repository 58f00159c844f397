pub mod artifact;
pub mod assembler;
mod builtins;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod guard;
pub mod pipeline;
pub mod session;
pub mod value;

pub use artifact::{Artifact, ArtifactStore};
pub use assembler::Assembler;
pub use engine::{BlockResult, BlockState, Engine, Executed};
pub use error::{Error, ExecutionError, ScriptError};
pub use executor::{ArtifactPayload, CalcExecutor, Execution, Executor};
pub use guard::evaluate_guard;
pub use pipeline::{Expansion, Options, Pipeline};
pub use session::{Binding, SessionState};
pub use value::Value;
