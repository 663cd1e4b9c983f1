//! Downstream consumers of a computed snapshot: prose generation and
//! persistence. Neither may affect an already published snapshot.

mod insights;
mod sink;

pub use insights::{
    DisabledInsights, GeminiInsights, InsightGenerator, MisconfiguredInsights, DEFAULT_GEMINI_MODEL,
    DEFAULT_GEMINI_URL,
};
pub use sink::{save_best_effort, SnapshotSink, SupabaseSink};
