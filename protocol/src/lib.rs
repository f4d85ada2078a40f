//! Transport-agnostic request and response types for the hostbridge surface.
//!
//! Field names (camelCase on the wire) are the stable contract other
//! components rely on; transports frame and route these payloads but never
//! reinterpret them.

mod debug;
mod error;
mod ops;
mod runs;

pub use debug::DebugAck;
pub use debug::EvaluateParams;
pub use debug::EvaluatedValue;
pub use debug::StackFrame;
pub use debug::StackResponse;
pub use debug::Variable;
pub use debug::VariablesParams;
pub use debug::VariablesResponse;
pub use error::FaultKind;
pub use error::RequestError;
pub use ops::BuildOutcome;
pub use ops::BuildParams;
pub use ops::CompilerMessage;
pub use ops::TestCaseResult;
pub use ops::TestOutcome;
pub use ops::TestParams;
pub use ops::TestStatus;
pub use runs::RunList;
pub use runs::RunOutputChunk;
pub use runs::RunOutputParams;
pub use runs::RunStartParams;
pub use runs::RunStarted;
pub use runs::RunStopParams;
pub use runs::RunStopped;
pub use runs::RunSummary;
