mod codes;
mod pipeline;

pub use codes::{IdentifierSource, RandomIdentifiers};
pub use pipeline::{
    CertificateVerification, CertificationError, CertificationPipeline, GenerationReport,
    IssuanceOutcome, NotificationReport, NotificationSummary, PipelineConfig, RetryFailure,
    RetrySummary,
};
