//! Migration orchestrator - main workflow coordinator.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::entry::EntryKind;
use crate::core::traits::{RowReader, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::source::SqliteStore;
use crate::target::PgStore;
use crate::transfer::{BatchReader, BatchWriter};
use crate::verify::{ConsistencyVerifier, VerifyReport};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "table", rename_all = "snake_case")]
pub enum RunPhase {
    NotStarted,
    Running(EntryKind),
    Verifying,
    Completed,
}

/// Result of migrating one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    Succeeded,
    Failed { reason: String },
}

/// Per-table statistics and outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub table: EntryKind,
    pub outcome: TableOutcome,
    pub batches: usize,
    pub rows_read: u64,
    pub rows_inserted: u64,
    /// Rows left alone because their primary key already existed.
    pub rows_skipped: u64,
    pub duration_ms: u64,
}

impl TableReport {
    fn new(table: EntryKind) -> Self {
        Self {
            table,
            outcome: TableOutcome::Succeeded,
            batches: 0,
            rows_read: 0,
            rows_inserted: 0,
            rows_skipped: 0,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == TableOutcome::Succeeded
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// One report per table, in processing order.
    pub tables: Vec<TableReport>,

    /// Total rows inserted across all tables.
    pub rows_inserted: u64,
}

impl MigrationSummary {
    /// Tables whose migration failed.
    pub fn failed_tables(&self) -> Vec<EntryKind> {
        self.tables
            .iter()
            .filter(|t| !t.is_success())
            .map(|t| t.table)
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.tables.iter().all(TableReport::is_success)
    }

    pub fn table(&self, kind: EntryKind) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == kind)
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Source and target row counts for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCountReport {
    pub table: EntryKind,
    pub source_rows: i64,
    pub target_rows: i64,
    pub matches: bool,
}

/// Migration orchestrator.
///
/// Owns both stores for the lifetime of one invocation. Every public
/// operation closes the stores when it returns, so an orchestrator serves a
/// single operation.
pub struct Orchestrator<S = SqliteStore, T = PgStore> {
    source: S,
    target: T,
    batch_size: usize,
    phase: RunPhase,
    closed: bool,
}

impl Orchestrator<SqliteStore, PgStore> {
    /// Validate the configuration and open both stores.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let source = SqliteStore::open(&config.source.path).await?;
        let target = match PgStore::new(&config.target).await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        Ok(Self::with_stores(
            source,
            target,
            config.migration.batch_size,
        ))
    }
}

impl<S, T> Orchestrator<S, T>
where
    S: RowReader,
    T: RowReader + TargetWriter,
{
    /// Build an orchestrator over already opened stores.
    pub fn with_stores(source: S, target: T, batch_size: usize) -> Self {
        Self {
            source,
            target,
            batch_size,
            phase: RunPhase::NotStarted,
            closed: false,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Run the migration over every table in order.
    ///
    /// A failing table is logged and reported without stopping the run. A
    /// lost connection ends the run with an error once both stores are closed.
    pub async fn run(&mut self) -> Result<MigrationSummary> {
        self.ensure_open()?;
        let summary = self.migrate().await;
        self.shutdown().await;
        summary
    }

    /// Run the migration, then check the target against the source.
    pub async fn run_and_verify(&mut self) -> Result<(MigrationSummary, Vec<VerifyReport>)> {
        self.ensure_open()?;
        let summary = match self.migrate().await {
            Ok(summary) => summary,
            Err(e) => {
                self.shutdown().await;
                return Err(e);
            }
        };
        let verified = self.check_consistency().await;
        self.shutdown().await;
        Ok((summary, verified?))
    }

    /// Check the target against the source without migrating.
    pub async fn verify(&mut self) -> Result<Vec<VerifyReport>> {
        self.ensure_open()?;
        let verified = self.check_consistency().await;
        self.shutdown().await;
        verified
    }

    /// Compare row counts between source and target.
    pub async fn validate(&mut self) -> Result<Vec<RowCountReport>> {
        self.ensure_open()?;
        let counts = self.count_rows().await;
        self.shutdown().await;
        counts
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(MigrateError::Config(
                "stores are closed; this orchestrator has already run".to_string(),
            ));
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.source.close().await;
        self.target.close().await;
        self.closed = true;
    }

    async fn migrate(&mut self) -> Result<MigrationSummary> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!("Starting migration run: {}", run_id);

        let mut tables = Vec::with_capacity(EntryKind::MIGRATION_ORDER.len());
        for kind in EntryKind::MIGRATION_ORDER {
            self.phase = RunPhase::Running(kind);
            info!("{}: migrating", kind);

            let start = Instant::now();
            let mut report = TableReport::new(kind);

            match self.migrate_table(&mut report).await {
                Ok(()) => info!(
                    "{}: {} rows read, {} inserted, {} skipped in {} batches",
                    kind,
                    report.rows_read,
                    report.rows_inserted,
                    report.rows_skipped,
                    report.batches
                ),
                Err(e) if e.is_connectivity() => {
                    error!("{}: connection lost, aborting run {}: {}", kind, run_id, e);
                    return Err(e);
                }
                Err(e) => {
                    error!("{}: migration failed: {}", kind, e);
                    report.outcome = TableOutcome::Failed {
                        reason: e.to_string(),
                    };
                }
            }

            report.duration_ms = start.elapsed().as_millis() as u64;
            tables.push(report);
        }

        self.phase = RunPhase::Completed;

        let completed_at = Utc::now();
        let summary = MigrationSummary {
            run_id,
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            rows_inserted: tables.iter().map(|t| t.rows_inserted).sum(),
            tables,
        };

        let failed = summary.failed_tables();
        if failed.is_empty() {
            info!(
                "Migration run {} complete: {} rows inserted",
                summary.run_id, summary.rows_inserted
            );
        } else {
            warn!(
                "Migration run {} complete with {} failed tables: {:?}",
                summary.run_id,
                failed.len(),
                failed
            );
        }

        Ok(summary)
    }

    async fn migrate_table(&self, report: &mut TableReport) -> Result<()> {
        let entry = report.table.entry();
        let mut reader = BatchReader::new(&self.source, entry, self.batch_size);
        let writer = BatchWriter::new(&self.target, entry);

        while let Some(batch) = reader.next_batch().await? {
            report.rows_read += batch.len() as u64;
            let stats = writer.write(&batch).await?;
            report.batches += 1;
            report.rows_inserted += stats.inserted;
            report.rows_skipped += stats.skipped();
        }

        Ok(())
    }

    async fn check_consistency(&mut self) -> Result<Vec<VerifyReport>> {
        self.phase = RunPhase::Verifying;
        let reports = ConsistencyVerifier::new(&self.source, &self.target, self.batch_size)
            .verify_all()
            .await;
        self.phase = RunPhase::Completed;
        reports
    }

    async fn count_rows(&self) -> Result<Vec<RowCountReport>> {
        let mut results = Vec::with_capacity(EntryKind::MIGRATION_ORDER.len());

        for kind in EntryKind::MIGRATION_ORDER {
            let source_rows = self.source.row_count(kind.table_name()).await?;
            let target_rows = self.target.row_count(kind.table_name()).await?;

            let matches = source_rows == target_rows;
            if matches {
                info!("{}: {} rows (match)", kind, source_rows);
            } else {
                warn!(
                    "{}: source={} target={} (MISMATCH)",
                    kind, source_rows, target_rows
                );
            }

            results.push(RowCountReport {
                table: kind,
                source_rows,
                target_rows,
                matches,
            });
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entry::StoreSide;
    use crate::core::value::SqlValue;
    use crate::testing::{
        film_work_rows, fixture_id, genre_rows, person_film_work_row, person_row, person_rows,
        seed_catalogue, MemoryStore,
    };

    fn stores() -> (MemoryStore, MemoryStore) {
        (
            MemoryStore::new(StoreSide::Source),
            MemoryStore::new(StoreSide::Target),
        )
    }

    fn orchestrator(
        source: &MemoryStore,
        target: &MemoryStore,
        batch_size: usize,
    ) -> Orchestrator<MemoryStore, MemoryStore> {
        Orchestrator::with_stores(source.clone(), target.clone(), batch_size)
    }

    #[tokio::test]
    async fn test_250_genres_take_three_statements() {
        let (source, target) = stores();
        source.seed(EntryKind::Genre, genre_rows(250));

        let summary = orchestrator(&source, &target, 100).run().await.unwrap();

        assert!(summary.is_success());
        assert_eq!(target.statements_for(EntryKind::Genre), 3);
        assert_eq!(target.statement_sizes(), vec![100, 100, 50]);
        assert_eq!(target.rows(EntryKind::Genre).len(), 250);

        let genre = summary.table(EntryKind::Genre).unwrap();
        assert_eq!(genre.batches, 3);
        assert_eq!(genre.rows_inserted, 250);
    }

    #[tokio::test]
    async fn test_existing_person_is_not_overwritten() {
        let (source, target) = stores();
        let existing = person_row(0);
        target.seed(EntryKind::Person, vec![existing.clone()]);

        let mut changed = person_row(0);
        changed[2] = SqlValue::from("A Different Name");
        source.seed(EntryKind::Person, vec![changed, person_row(1)]);

        let summary = orchestrator(&source, &target, 100).run().await.unwrap();

        let person = summary.table(EntryKind::Person).unwrap();
        assert_eq!(person.rows_inserted, 1);
        assert_eq!(person.rows_skipped, 1);

        let p1 = target
            .rows(EntryKind::Person)
            .into_iter()
            .find(|r| r[0].as_uuid() == Some(fixture_id(EntryKind::Person, 0)))
            .unwrap();
        assert_eq!(p1, existing);
    }

    #[tokio::test]
    async fn test_dangling_film_reference_fails_only_its_table() {
        let (source, target) = stores();
        seed_catalogue(&source, 3, 3, 3);
        source.seed(
            EntryKind::PersonFilmWork,
            vec![person_film_work_row(
                99,
                fixture_id(EntryKind::Person, 0),
                fixture_id(EntryKind::FilmWork, 42),
                "actor",
            )],
        );

        let mut orch = orchestrator(&source, &target, 100);
        let summary = orch.run().await.unwrap();

        assert_eq!(summary.failed_tables(), vec![EntryKind::PersonFilmWork]);
        assert!(!summary.is_success());
        match &summary.table(EntryKind::PersonFilmWork).unwrap().outcome {
            TableOutcome::Failed { reason } => assert!(reason.contains("film_work_id")),
            other => panic!("expected failure, got {:?}", other),
        }

        assert_eq!(target.rows(EntryKind::FilmWork).len(), 3);
        assert_eq!(target.rows(EntryKind::GenreFilmWork).len(), 3);
        assert!(target.rows(EntryKind::PersonFilmWork).is_empty());
        assert_eq!(orch.phase(), RunPhase::Completed);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let (source, target) = stores();
        seed_catalogue(&source, 12, 8, 5);

        let first = orchestrator(&source, &target, 5).run().await.unwrap();
        let counts: Vec<usize> = EntryKind::MIGRATION_ORDER
            .iter()
            .map(|k| target.rows(*k).len())
            .collect();

        let second = orchestrator(&source, &target, 5).run().await.unwrap();
        let recounts: Vec<usize> = EntryKind::MIGRATION_ORDER
            .iter()
            .map(|k| target.rows(*k).len())
            .collect();

        assert!(first.is_success() && second.is_success());
        assert_eq!(counts, recounts);
        assert_eq!(second.rows_inserted, 0);
        assert_eq!(
            second.tables.iter().map(|t| t.rows_skipped).sum::<u64>(),
            first.rows_inserted
        );
    }

    #[tokio::test]
    async fn test_stores_closed_once_after_last_table() {
        let (source, target) = stores();
        source.seed(EntryKind::Person, person_rows(3));
        source.fail_reads_of(EntryKind::Genre);

        let mut orch = orchestrator(&source, &target, 2);
        assert_eq!(orch.phase(), RunPhase::NotStarted);

        let summary = orch.run().await.unwrap();
        assert_eq!(summary.failed_tables(), vec![EntryKind::Genre]);
        assert_eq!(source.close_count(), 1);
        assert_eq!(target.close_count(), 1);

        assert!(orch.run().await.is_err());
        assert_eq!(source.close_count(), 1);
    }

    #[tokio::test]
    async fn test_lost_target_connection_aborts_run() {
        let (source, target) = stores();
        seed_catalogue(&source, 3, 3, 3);
        target.drop_connection();

        let mut orch = orchestrator(&source, &target, 100);
        let err = orch.run().await.unwrap_err();

        assert!(matches!(err, MigrateError::Pool { .. }));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(target.statements_for(EntryKind::FilmWork), 0);
        assert_eq!(source.close_count(), 1);
        assert_eq!(target.close_count(), 1);
        assert_eq!(orch.phase(), RunPhase::Running(EntryKind::FilmWork));
    }

    #[tokio::test]
    async fn test_lost_source_connection_skips_verification() {
        let (source, target) = stores();
        seed_catalogue(&source, 2, 2, 2);
        source.drop_connection();

        let err = orchestrator(&source, &target, 100)
            .run_and_verify()
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 3);
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(source.close_count(), 1);
        assert_eq!(target.close_count(), 1);
    }

    #[tokio::test]
    async fn test_every_table_reported_in_order() {
        let (source, target) = stores();
        source.seed(EntryKind::FilmWork, film_work_rows(2));

        let summary = orchestrator(&source, &target, 100).run().await.unwrap();
        let order: Vec<EntryKind> = summary.tables.iter().map(|t| t.table).collect();

        assert_eq!(order, EntryKind::MIGRATION_ORDER.to_vec());
        assert_eq!(summary.rows_inserted, 2);
    }

    #[tokio::test]
    async fn test_run_and_verify() {
        let (source, target) = stores();
        seed_catalogue(&source, 10, 10, 4);

        let (summary, reports) = orchestrator(&source, &target, 3)
            .run_and_verify()
            .await
            .unwrap();

        assert!(summary.is_success());
        assert_eq!(reports.len(), 5);
        assert_eq!(reports[1].table, EntryKind::Person);
        assert_eq!(reports[1].rows, 10);
        assert_eq!(source.close_count(), 1);
    }

    #[tokio::test]
    async fn test_verify_reports_partial_migration() {
        let (source, target) = stores();
        seed_catalogue(&source, 2, 2, 2);
        target.seed(EntryKind::FilmWork, source.rows(EntryKind::FilmWork));

        let err = orchestrator(&source, &target, 100)
            .verify()
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 4);
        assert_eq!(target.close_count(), 1);
    }

    #[tokio::test]
    async fn test_validate_counts_rows() {
        let (source, target) = stores();
        source.seed(EntryKind::Genre, genre_rows(4));
        target.seed(EntryKind::Genre, genre_rows(3));

        let counts = orchestrator(&source, &target, 100).validate().await.unwrap();

        let genre = counts.iter().find(|c| c.table == EntryKind::Genre).unwrap();
        assert_eq!((genre.source_rows, genre.target_rows), (4, 3));
        assert!(!genre.matches);
        assert!(counts
            .iter()
            .filter(|c| c.table != EntryKind::Genre)
            .all(|c| c.matches));
    }

    #[tokio::test]
    async fn test_summary_json_lists_failures() {
        let (source, target) = stores();
        source.fail_reads_of(EntryKind::Person);

        let summary = orchestrator(&source, &target, 100).run().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();

        assert_eq!(json["tables"][1]["table"], "person");
        assert_eq!(json["tables"][1]["outcome"]["status"], "failed");
        assert_eq!(json["tables"][0]["outcome"]["status"], "succeeded");
    }
}
