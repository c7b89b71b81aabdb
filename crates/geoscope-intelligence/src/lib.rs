//! LLM abstraction and the two audit agents.
//!
//! A [`ChatCompleter`] capability hides the backend; the completion chain
//! walks an ordered provider list on transient failure. Agent responses
//! go through a lenient JSON extractor, and every agent has a
//! deterministic offline fallback so an LLM outage never fails an audit.

pub mod agents;
pub mod chain;
pub mod extract;
pub mod fallback_report;
pub mod provider;

pub use agents::{AgentOutcome, IntelligenceAgents, SynthesisInput};
pub use chain::CompletionChain;
pub use extract::extract_json;
pub use provider::{ChatCompleter, ChatMessage, ChatRequest, HttpChatProvider, Role};
