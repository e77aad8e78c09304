//! Adaptive interview core
//!
//! The director drives one session at a time through the seven dimensions,
//! collaborating with three stateless agents:
//!
//! - **navigator**: shape of the next question from the interaction mode
//! - **diagnostic**: whether the evidence gathered so far is sufficient
//! - **scoring**: transcript to a bounded score with rationale
//!
//! Every call into the answer generator is wrapped in one [`RetryPolicy`].

pub mod batch;
pub mod diagnostic;
pub mod director;
pub mod generator;
pub mod navigator;
pub mod retry;
pub mod scoring;
pub mod session;

pub use batch::{BatchOutcome, BatchRunner, BatchSummary};
pub use diagnostic::{DiagnosticAgent, HeuristicDiagnostic, LlmDiagnostic, Sufficiency};
pub use director::ScenarioDirector;
pub use generator::{AnswerGenerator, AskRequest, JudgeRequest, JudgmentKind, Role};
pub use navigator::{Depth, ModePolicy, NavigatorAgent, PromptShape};
pub use retry::RetryPolicy;
pub use scoring::ScoringEngine;
pub use session::{Session, SessionState, SessionStatus};
