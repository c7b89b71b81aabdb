//! Shared data model for the geoscope audit pipeline.
//!
//! Every type that crosses a crate boundary lives here: the audit record and
//! its configuration, per-page score reports, performance telemetry, agent
//! outputs, progress events, and the error enum used across the workspace.

pub mod agents;
pub mod audit;
pub mod config;
pub mod errors;
pub mod page;
pub mod perf;
pub mod progress;

pub use agents::{AuxiliaryContext, ExternalIntelligence, ParsedAgentOutput, SynthesisOutput};
pub use audit::{
    Audit, AuditConfig, AuditResults, AuditStatus, FixItem, FixPriority, Language, Market,
    SearchResult, Stage,
};
pub use config::{AppConfig, LlmEndpoint};
pub use errors::{AuditError, Result};
pub use page::{
    grade_for_score, CheckResult, CheckStatus, CitationSignalsReport, ContentReport, Dimension,
    EeatReport, FreshnessCheck, PageReport, SchemaPresence, SchemaReport, StructureReport,
    TechnicalReport, TransparencySignals,
};
pub use perf::{AuditRecord, CoreWebVitals, Opportunity, PerfMetadata, PerfReport, PerformancePair};
pub use progress::{NoopProgressSink, ProgressEvent, ProgressSink, ProgressUpdate};
