//! rultor-migrate library - stand document migrations
//!
//! Four idempotent stages reshape legacy stand documents:
//! coordinates extraction, tag normalization, attribute promotion and tag
//! merging. A generic driver applies one stage over a [`DocumentStore`],
//! and the pipeline runs the stages in version order.
//!
//! [`DocumentStore`]: rultor_common::db::DocumentStore

pub mod audit;
pub mod driver;
pub mod pipeline;
pub mod stages;
pub mod transfer;

#[cfg(test)]
mod test_support;

pub use audit::{audit, audit_document, AuditReport, Violation, ViolationKind};
pub use driver::{run_stage, RunOptions, StageReport};
pub use pipeline::{run_migrations, standard_migrations, Migration, PipelineReport};
pub use stages::{MergePair, Outcome, Stage};
