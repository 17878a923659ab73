//! Cognitive agent loop, split by stage:
//! - observe.rs: snapshot, topic inference, question context
//! - prompt.rs / decision.rs: planner and critic prompts, validated parsing
//! - gate.rs: pure commit/abstain decision
//! - compose.rs: answer drafting under a char budget
//! - ledger.rs / memory.rs: per-question state machine and cross-run memory
//! - discovery.rs: wiki discovery pulse
//! - runtime.rs: the loop that ties it together

pub mod compose;
pub mod cooldown;
pub mod decision;
pub mod discovery;
pub mod gate;
pub mod ledger;
pub mod memory;
pub mod observe;
pub mod persona;
pub mod prompt;
mod runtime;

pub use ledger::{LedgerError, QuestionLedger, QuestionStatus};
pub use memory::AgentMemory;
pub use persona::{Persona, RiskProfile};
pub use runtime::{AgentRuntime, CycleReport, LoopState, QuestionOutcome};
