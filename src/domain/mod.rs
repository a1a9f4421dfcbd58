//! Domain types for VerifyBot
//!
//! - CodeBlock: a fragment of code recovered from a chat response
//! - Target: where a block runs (local, Raspberry Pi, STM32)
//! - ExecutionResult: what happened when a block ran
//! - AcceptanceReport / FailureCategory: verdicts beyond the exit code
//! - RunRecord: the append-only history of one task

pub mod block;
pub mod execution;
pub mod outcome;
pub mod record;
pub mod target;

pub use block::{BlockKind, CodeBlock, FilenameOrigin};
pub use execution::{ExecutionResult, ExecutionStatus};
pub use outcome::{AcceptanceReport, FailureCategory};
pub use record::{Attempt, Placement, RunRecord, RunStatus};
pub use target::Target;
