use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use metadata_ingest::IngestError;
use metadata_ingest::config::PipelineConfig;
use metadata_ingest::execution::{ParallelRunner, RunnerOptions, discover_inputs};
use metadata_ingest::ingestion::{
    CancellationToken, CompositeObserver, DatasetReaderOptions, FileObserver, InputResource, Job, JobContext,
    JobObserver, JobOptions, JobStats, Severity,
};
use metadata_ingest::logging::LogFormat;
use metadata_ingest::metadata::{Catalog, CatalogMetadataProvider, JobIdAllocator};
use metadata_ingest::writer::{
    EventTables, JdbcBatchWriter, PropertyFileWriter, PropertyFileWriterOptions, ensure_event_tables,
};
use rusqlite::Connection;

fn catalog() -> Catalog {
    Catalog::from_path("tests/fixtures/catalog.json").unwrap()
}

fn provider() -> Arc<CatalogMetadataProvider> {
    Arc::new(CatalogMetadataProvider::new(catalog()))
}

/// Copy a fixture into `dir` (created if needed) and return the new path.
fn stage(dir: &Path, fixture: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let target = dir.join(fixture);
    fs::copy(Path::new("tests/fixtures").join(fixture), &target).unwrap();
    target
}

fn jdbc_job(provider: Arc<CatalogMetadataProvider>, options: JobOptions) -> Job<JdbcBatchWriter> {
    let conn = Connection::open_in_memory().unwrap();
    ensure_event_tables(&conn, &EventTables::default()).unwrap();
    let writer = JdbcBatchWriter::new(conn, provider.clone());
    Job::new(provider, writer, options)
}

#[derive(Default)]
struct Recording {
    events: Mutex<Vec<String>>,
}

impl Recording {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl JobObserver for Recording {
    fn on_success(&self, ctx: &JobContext, stats: JobStats) {
        self.events.lock().unwrap().push(format!(
            "ok dataset={:?} test={} read={} written={}",
            ctx.dataset, ctx.test, stats.records_read, stats.events_written
        ));
    }

    fn on_failure(&self, _ctx: &JobContext, severity: Severity, _error: &IngestError) {
        self.events.lock().unwrap().push(format!("fail {severity:?}"));
    }

    fn on_alert(&self, _ctx: &JobContext, severity: Severity, _error: &IngestError) {
        self.events.lock().unwrap().push(format!("alert {severity:?}"));
    }
}

/// Job ids of the jobs that finished successfully.
#[derive(Default)]
struct FinishedJobs {
    ids: Mutex<Vec<i64>>,
}

impl JobObserver for FinishedJobs {
    fn on_success(&self, ctx: &JobContext, _stats: JobStats) {
        if let Some(id) = ctx.job_id {
            self.ids.lock().unwrap().push(id);
        }
    }
}

/// customer_id, event_type_id, event_ts, event_property, source_key, job_id
type EventRow = (String, i32, NaiveDateTime, Option<String>, String, i64);

fn event_rows(conn: &Connection, table: &str) -> Vec<EventRow> {
    conn.prepare(&format!(
        "SELECT customer_id, event_type_id, event_ts, event_property, source_key, job_id \
         FROM {table} ORDER BY rowid"
    ))
    .unwrap()
    .query_map([], |row| {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    })
    .unwrap()
    .collect::<Result<_, _>>()
    .unwrap()
}

#[test]
fn purchases_file_lands_in_the_production_table() {
    let dir = tempfile::tempdir().unwrap();
    let input = stage(&dir.path().join("inbox"), "purchases_2015.csv");
    let options = JobOptions {
        commit_interval: 2,
        ..Default::default()
    };
    let mut job = jdbc_job(provider(), options);

    let stats = job.run(InputResource::from_path(&input)).unwrap();
    assert_eq!(stats.records_read, 3);
    assert_eq!(stats.events_written, 3);
    assert_eq!(stats.chunks, 2);

    let writer = job.into_writer();
    let created = writer.created();
    let conn = writer.into_connection();
    let rows = event_rows(&conn, "events");
    assert_eq!(rows.len(), 3);
    assert!(event_rows(&conn, "events_test").is_empty());

    let ts = |s: &str| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap();
    assert_eq!(rows[0].0, "c-1");
    assert_eq!(rows[0].1, 3);
    assert_eq!(rows[0].2, ts("2015-05-03 10:00:00"));
    assert_eq!(rows[0].3.as_deref(), Some("\"web\",2"));
    assert_eq!(rows[1].1, 4);
    assert_eq!(rows[1].3.as_deref(), Some("\"store \"\"north\"\"\",1"));
    assert_eq!(rows[2].2, created);
    assert_eq!(rows[2].3.as_deref(), Some("\"mobile\""));
    assert!(rows.iter().all(|r| r.4 == "purchases" && r.5 == 1));
}

#[test]
fn input_under_a_test_directory_is_routed_to_test_destinations() {
    let dir = tempfile::tempdir().unwrap();
    let input = stage(&dir.path().join("test"), "purchases_2015.csv");

    let mut job = jdbc_job(provider(), JobOptions::default());
    job.run(InputResource::from_path(&input)).unwrap();
    let conn = job.into_writer().into_connection();
    assert_eq!(event_rows(&conn, "events_test").len(), 3);
    assert!(event_rows(&conn, "events").is_empty());

    let provider = provider();
    let options = PropertyFileWriterOptions {
        processing_folder: dir.path().join("out/processing"),
        test_processing_folder: dir.path().join("out/test/processing"),
        ..Default::default()
    };
    let writer = PropertyFileWriter::new(options, provider.clone());
    let mut job = Job::new(provider, writer, JobOptions::default());
    let stats = job.run(InputResource::from_path(&input)).unwrap();
    assert_eq!(stats.events_written, 5);

    let side_file = dir
        .path()
        .join("out/test/processing/purchases_2015.csv_properties.filepart");
    assert_eq!(fs::read_to_string(side_file).unwrap().lines().count(), 5);
    assert!(!dir.path().join("out/processing").exists());
}

#[test]
fn side_file_is_created_even_without_properties() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider();
    let options = PropertyFileWriterOptions {
        processing_folder: dir.path().join("processing"),
        test_processing_folder: dir.path().join("test/processing"),
        ..Default::default()
    };
    let writer = PropertyFileWriter::new(options, provider.clone());
    let mut job = Job::new(provider, writer, JobOptions::default());
    let stats = job
        .run(InputResource::from_content(
            "purchases_2017.csv",
            "customer|event|amount|ts|channel|qty\n",
        ))
        .unwrap();
    assert_eq!(stats, JobStats::default());

    let side_file = dir.path().join("processing/purchases_2017.csv_properties.filepart");
    assert_eq!(fs::read_to_string(side_file).unwrap(), "");
}

#[test]
fn explicit_test_flag_overrides_the_path() {
    let options = JobOptions {
        reader: DatasetReaderOptions {
            test: Some(true),
            ..Default::default()
        },
        ..Default::default()
    };
    let observer = Arc::new(Recording::default());
    let mut job = jdbc_job(provider(), options).with_observer(observer.clone());
    job.run(InputResource::from_path("tests/fixtures/purchases_2015.csv"))
        .unwrap();
    assert_eq!(
        observer.events(),
        vec!["ok dataset=Some(\"purchases\") test=true read=3 written=3".to_string()]
    );
    let conn = job.into_writer().into_connection();
    assert_eq!(event_rows(&conn, "events_test").len(), 3);
}

#[test]
fn notes_dataset_uses_explicit_event_rules() {
    let mut job = jdbc_job(provider(), JobOptions::default());
    let stats = job
        .run(InputResource::from_path("tests/fixtures/notes.dat"))
        .unwrap();
    assert_eq!(stats.records_read, 3);
    assert_eq!(stats.events_written, 2);

    let conn = job.into_writer().into_connection();
    let (type_id, cit, prop): (i32, i32, String) = conn
        .query_row(
            "SELECT event_type_id, customer_id_type_id, event_property FROM events WHERE customer_id = 'c-9'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(type_id, 42);
    assert_eq!(cit, 2);
    assert_eq!(prop, "\"<note kind=\"\"gift\"\">wrapped</note>\"");
}

#[test]
fn failures_are_classified_and_alerted() {
    let observer = Arc::new(Recording::default());
    let options = JobOptions {
        alert_at_or_above: Severity::Error,
        ..Default::default()
    };

    let mut job = jdbc_job(provider(), options.clone()).with_observer(observer.clone());
    let err = job
        .run(InputResource::from_content("unknown.txt", "a,b\n"))
        .unwrap_err();
    assert!(matches!(err, IngestError::MissingDataset { .. }));

    let mut job = jdbc_job(provider(), options).with_observer(observer.clone());
    let err = job
        .run(InputResource::from_content("people.csv", "id,name\n1,a\n"))
        .unwrap_err();
    assert!(matches!(err, IngestError::InvalidDataset { .. }));

    assert_eq!(
        observer.events(),
        vec!["fail Error", "alert Error", "fail Error", "alert Error"]
    );
}

#[test]
fn chunks_committed_before_a_bad_row_are_kept() {
    let content = "customer|event|amount|ts|channel|qty\nc-1|3|1||web|1\nc-2|x|1||web|1\n";
    let options = JobOptions {
        commit_interval: 1,
        ..Default::default()
    };
    let mut job = jdbc_job(provider(), options);
    let err = job
        .run(InputResource::from_content("purchases_bad.csv", content))
        .unwrap_err();
    assert!(matches!(err, IngestError::FlatFileParse { line_number: 3, .. }));
    let conn = job.into_writer().into_connection();
    assert_eq!(event_rows(&conn, "events").len(), 1);
}

#[test]
fn file_observer_records_each_job() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("jobs.log");
    let recording = Arc::new(Recording::default());
    let observers: Vec<Arc<dyn JobObserver>> = vec![Arc::new(FileObserver::new(&log)), recording.clone()];
    let observer = Arc::new(CompositeObserver::new(observers));

    let mut job = jdbc_job(provider(), JobOptions::default()).with_observer(observer.clone());
    job.run(InputResource::from_path("tests/fixtures/purchases_2015.csv"))
        .unwrap();
    let mut job = jdbc_job(provider(), JobOptions::default()).with_observer(observer);
    job.run(InputResource::from_path(dir.path().join("test/people.csv")))
        .unwrap_err();

    let text = fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("ok resource=file [tests/fixtures/purchases_2015.csv]"));
    assert!(lines[0].contains("read=3 skipped=0 written=3 chunks=1"));
    assert!(lines[1].contains("fail severity=Error"));
    assert_eq!(recording.events().len(), 2);
}

#[test]
fn cancelled_job_reads_nothing() {
    let token = CancellationToken::new();
    token.cancel();
    let options = JobOptions {
        reader: DatasetReaderOptions {
            cancellation: Some(token),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut job = jdbc_job(provider(), options);
    let stats = job
        .run(InputResource::from_path("tests/fixtures/purchases_2015.csv"))
        .unwrap();
    assert_eq!(stats, JobStats::default());
}

#[test]
fn parallel_runner_ingests_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    stage(&inbox, "purchases_2015.csv");
    stage(&inbox, "notes.dat");
    fs::copy(inbox.join("purchases_2015.csv"), inbox.join("purchases_2016.csv")).unwrap();
    fs::write(inbox.join("unknown.txt"), "x\n").unwrap();

    let inputs = discover_inputs(&inbox, "*").unwrap();
    assert_eq!(inputs.len(), 4);

    let catalog = catalog();
    let job_ids = JobIdAllocator::default();
    let finished = Arc::new(FinishedJobs::default());
    let out = dir.path().join("out");
    let runner = ParallelRunner::new(RunnerOptions { num_threads: Some(2) }).unwrap();
    let outcomes = runner.run(&inputs, |_path| {
        let provider = Arc::new(CatalogMetadataProvider::new(catalog.clone()).with_job_ids(job_ids.clone()));
        let options = PropertyFileWriterOptions {
            processing_folder: out.join("processing"),
            test_processing_folder: out.join("test/processing"),
            ..Default::default()
        };
        let writer = PropertyFileWriter::new(options, provider.clone());
        Ok(Job::new(provider, writer, JobOptions::default()).with_observer(finished.clone()))
    });

    let names: Vec<String> = outcomes
        .iter()
        .map(|o| o.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["notes.dat", "purchases_2015.csv", "purchases_2016.csv", "unknown.txt"]);
    let written: Vec<Option<usize>> = outcomes
        .iter()
        .map(|o| o.result.as_ref().ok().map(|s| s.events_written))
        .collect();
    assert_eq!(written, vec![Some(2), Some(5), Some(5), None]);

    let metrics = runner.metrics().snapshot();
    assert_eq!(metrics.files_started, 4);
    assert_eq!(metrics.files_succeeded, 3);
    assert_eq!(metrics.files_failed, 1);
    assert_eq!(metrics.events_written, 12);
    assert!(metrics.max_active_files <= 2);
    assert!(out.join("processing/purchases_2016.csv_properties.filepart").is_file());

    let mut ids = finished.ids.lock().unwrap().clone();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn pipeline_config_drives_a_run() {
    let config = PipelineConfig::from_path("tests/fixtures/pipeline.json").unwrap();
    assert_eq!(config.commit_interval, 2);
    assert_eq!(config.alert_at_or_above, Severity::Error);
    assert!(config.property_file.append);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert!(config.logging.env_filter().is_ok());
    assert_eq!(config.runner_options().num_threads, Some(2));

    let dir = tempfile::tempdir().unwrap();
    stage(dir.path(), "purchases_2015.csv");
    stage(dir.path(), "notes.dat");
    let inputs = discover_inputs(dir.path(), &config.input_pattern).unwrap();
    assert_eq!(inputs.len(), 1);

    let catalog_path = config.catalog_path.clone().unwrap();
    let catalog = Catalog::from_path(catalog_path).unwrap();
    let provider = Arc::new(CatalogMetadataProvider::new(catalog));
    let conn = Connection::open_in_memory().unwrap();
    ensure_event_tables(&conn, &config.tables).unwrap();
    let writer = JdbcBatchWriter::new(conn, provider.clone())
        .with_tables(config.tables.clone())
        .unwrap();
    let mut job = Job::new(provider, writer, config.job_options());
    let stats = job.run(InputResource::from_path(&inputs[0])).unwrap();
    assert_eq!(stats.chunks, 2);
    assert_eq!(stats.events_written, 3);
}
