//! Versioned migration pipeline
//!
//! Every stage has a schema version and a stable name. The store records
//! the name of each stage completed over the whole collection, so an
//! up-to-date collection is left alone, an interrupted run resumes at the
//! first unfinished stage, and a newly configured merge pair runs on its
//! own. Merge stages all share one version: their order in the config
//! carries no meaning.
//!
//! # Migration Guidelines
//!
//! 1. **Never rename existing stages** - stores already record their names
//! 2. **Append new stages** - give each new transformation the next version
//! 3. **Keep stages idempotent** - `--rerun` replays every stage over migrated data
//! 4. **Never delete documents** - stages only set fields

use crate::driver::{run_stage, RunOptions, StageReport};
use crate::stages::{
    ExtractCoordinates, MergePair, MergeTags, NormalizeTags, PromoteAttributes, Stage,
};
use rultor_common::db::{DocumentStore, MemoryStore, Predicate};
use rultor_common::Result;
use serde::Serialize;
use tracing::{info, warn};

/// Schema version shared by every merge stage
pub const MERGE_VERSION: i32 = 4;

/// A stage with its schema version
pub struct Migration {
    pub version: i32,
    pub stage: Box<dyn Stage>,
}

impl Migration {
    pub fn new(version: i32, stage: impl Stage + 'static) -> Self {
        Self {
            version,
            stage: Box::new(stage),
        }
    }

    pub fn name(&self) -> String {
        self.stage.name()
    }
}

/// The standard stage sequence
///
/// v1 coordinates, v2 tag normalization, v3 attribute promotion, then one
/// v4 merge stage per pair, in config order.
pub fn standard_migrations(pairs: &[MergePair]) -> Vec<Migration> {
    let mut migrations = vec![
        Migration::new(1, ExtractCoordinates),
        Migration::new(2, NormalizeTags),
        Migration::new(3, PromoteAttributes),
    ];
    for pair in pairs {
        migrations.push(Migration::new(MERGE_VERSION, MergeTags::new(pair.clone())));
    }
    migrations
}

/// Highest version in a stage sequence
pub fn latest_version(migrations: &[Migration]) -> i32 {
    migrations.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Migrations not yet recorded as completed, in run order
pub fn pending_migrations<'a>(migrations: &'a [Migration], applied: &[String]) -> Vec<&'a Migration> {
    migrations
        .iter()
        .filter(|m| !applied.contains(&m.name()))
        .collect()
}

/// Result of a pipeline run
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub from_version: i32,
    pub to_version: i32,
    pub dry_run: bool,
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    pub fn failed(&self) -> usize {
        self.stages.iter().map(|s| s.failed).sum()
    }
}

/// Copy of the documents a run would touch
async fn scratch_copy(store: &dyn DocumentStore, options: &RunOptions) -> Result<MemoryStore> {
    let scope = match &options.stand {
        Some(name) => Predicate::InStand(name.clone()),
        None => Predicate::Any,
    };
    Ok(MemoryStore::with_documents(store.find(&scope).await?))
}

/// Run all pending migrations
///
/// A dry run applies the pending stages to an in-memory copy of the
/// documents, so every stage sees the output of the one before it and the
/// counts match a real run. Nothing is written to `store`.
///
/// A stage with failed writes is not recorded, and neither is any stage
/// after it, so the next run retries from there.
pub async fn run_migrations(
    store: &dyn DocumentStore,
    migrations: &[Migration],
    options: &RunOptions,
) -> Result<PipelineReport> {
    let current_version = store.schema_version().await?;
    let target_version = latest_version(migrations);

    let mut report = PipelineReport {
        from_version: current_version,
        to_version: current_version,
        dry_run: options.dry_run,
        stages: Vec::new(),
    };

    if !options.rerun && current_version > target_version {
        warn!(
            "Stand collection version ({}) is newer than code version ({})",
            current_version, target_version
        );
        warn!("This may indicate a downgrade. Leaving documents untouched.");
        return Ok(report);
    }

    let pending: Vec<&Migration> = if options.rerun {
        migrations.iter().collect()
    } else {
        pending_migrations(migrations, &store.applied_stages().await?)
    };

    if pending.is_empty() {
        info!("Stand collection is up to date (v{})", current_version);
        return Ok(report);
    }

    if options.dry_run {
        let scratch = scratch_copy(store, options).await?;
        let live = RunOptions {
            dry_run: false,
            ..options.clone()
        };
        info!(
            "Dry run of {} stage(s) over a copy of {} document(s)",
            pending.len(),
            scratch.count().await?
        );
        for migration in pending {
            report
                .stages
                .push(run_stage(&scratch, migration.stage.as_ref(), &live).await?);
        }
        info!("Dry run completed, nothing written");
        return Ok(report);
    }

    let mut record = options.covers_collection();
    info!(
        "Running {} stand migration(s) up to v{}{}",
        pending.len(),
        target_version,
        if record { "" } else { " (not recorded)" }
    );

    for migration in pending {
        let stage_report = run_stage(store, migration.stage.as_ref(), options).await?;

        if record && stage_report.failed > 0 {
            warn!(
                "{} write(s) failed in {}; it and later stages stay pending",
                stage_report.failed, stage_report.stage
            );
            record = false;
        }

        if record {
            store.record_stage(&stage_report.stage).await?;
            if migration.version > report.to_version {
                store.set_schema_version(migration.version).await?;
                report.to_version = migration.version;
            }
        }

        info!("✓ Migration v{} {} completed", migration.version, stage_report.stage);
        report.stages.push(stage_report);
    }

    info!("All migrations completed");
    Ok(report)
}
