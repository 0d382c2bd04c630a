use metadata_ingest::IngestError;
use metadata_ingest::ingestion::{
    DatasetReader, DatasetReaderOptions, InputResource, ReaderOptions, RecordReader,
};
use metadata_ingest::metadata::{Catalog, CatalogMetadataProvider};
use metadata_ingest::types::{Record, Value};

fn provider() -> CatalogMetadataProvider {
    CatalogMetadataProvider::new(Catalog::from_path("tests/fixtures/catalog.json").unwrap())
}

fn read_all(reader: &mut DatasetReader) -> Vec<Record> {
    let mut out = Vec::new();
    while let Some(record) = reader.read().unwrap() {
        out.push(record);
    }
    out
}

fn utf8(s: &str) -> Value {
    Value::Utf8(s.to_string())
}

#[test]
fn simple_csv_skips_header_and_unquotes() {
    let provider = provider();
    let mut reader = DatasetReader::open(
        InputResource::from_path("tests/fixtures/people.csv"),
        &provider,
        DatasetReaderOptions::default(),
    )
    .unwrap();

    let records = read_all(&mut reader);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["id"], Value::Int64(1));
    assert_eq!(records[0]["name"], utf8("alice"));
    assert_eq!(records[1]["id"], Value::Int64(2));
    assert_eq!(records[1]["name"], utf8("bob"));
    assert_eq!(reader.line_count(), 3);
}

#[test]
fn footer_row_is_dropped_silently() {
    let provider = provider();
    let mut reader = DatasetReader::open(
        InputResource::from_path("tests/fixtures/people_footer.csv"),
        &provider,
        DatasetReaderOptions::default(),
    )
    .unwrap();

    let records = read_all(&mut reader);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["name"], utf8("alice"));
    assert_eq!(reader.records_skipped(), 1);
}

#[test]
fn footer_without_the_flag_is_a_token_count_error() {
    let provider = provider();
    let content = std::fs::read_to_string("tests/fixtures/people_footer.csv").unwrap();
    let mut reader = DatasetReader::open(
        InputResource::from_content("people.csv", &content),
        &provider,
        DatasetReaderOptions::default(),
    )
    .unwrap();

    assert!(reader.read().unwrap().is_some());
    let err = reader.read().unwrap_err();
    assert!(matches!(err, IngestError::FlatFileParse { line_number: 3, ref line, .. } if line == "END"));
    assert!(matches!(
        err.root_cause(),
        IngestError::IncorrectTokenCount { expected: 2, actual: 1 }
    ));
}

#[test]
fn header_skip_counts_physical_rows_and_ignores_comments() {
    let mut reader = RecordReader::new(
        InputResource::from_content("rows.txt", "#lead\nh1\nh2\n#mid\nr3\nr4\n"),
        ReaderOptions {
            lines_to_skip: 2,
            ..Default::default()
        },
    );
    reader.open().unwrap();
    assert_eq!(reader.read().unwrap().as_deref(), Some("r3"));
    assert_eq!(reader.line_count(), 5);
    assert_eq!(reader.read().unwrap().as_deref(), Some("r4"));
    assert_eq!(reader.read().unwrap(), None);
}

#[test]
fn comment_rows_advance_the_line_count() {
    let provider = provider();
    let mut reader = DatasetReader::open(
        InputResource::from_path("tests/fixtures/purchases_2015.csv"),
        &provider,
        DatasetReaderOptions::default(),
    )
    .unwrap();
    assert_eq!(reader.dataset().name, "purchases");

    let records = read_all(&mut reader);
    let customers: Vec<&Value> = records.iter().map(|r| &r["customer"]).collect();
    assert_eq!(customers, vec![&utf8("c-1"), &utf8("c-2"), &utf8("c-3")]);
    assert_eq!(records[1]["channel"], utf8("store \"north\""));
    assert_eq!(records[1]["amount"], Value::Null);
    assert_eq!(records[2]["qty"], Value::Null);
    assert_eq!(reader.records_skipped(), 0);
}

#[test]
fn custom_row_delimiter_and_quoted_continuation() {
    let provider = provider();
    let mut reader = DatasetReader::open(
        InputResource::from_path("tests/fixtures/notes.dat"),
        &provider,
        DatasetReaderOptions::default(),
    )
    .unwrap();
    assert_eq!(reader.dataset().name, "notes");

    let records = read_all(&mut reader);
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["note"], utf8(r#"<note kind="gift">wrapped</note>"#));
    assert_eq!(records[1]["kind"], Value::Int64(4));
    assert_eq!(records[1]["note"], utf8("first~~~~second"));
    assert_eq!(records[2]["note"], utf8(""));
    assert_eq!(reader.line_count(), 4);
}

#[test]
fn missing_file_depends_on_strict_mode() {
    let provider = provider();
    let missing = || InputResource::from_path("tests/fixtures/people_missing.csv");

    let err = DatasetReader::open(missing(), &provider, DatasetReaderOptions::default()).unwrap_err();
    assert!(matches!(err, IngestError::MissingDataset { .. }));

    let lenient = DatasetReaderOptions {
        strict: false,
        ..Default::default()
    };
    let err = DatasetReader::open(
        InputResource::from_path("tests/fixtures/missing/people.csv"),
        &provider,
        DatasetReaderOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, IngestError::InvalidState { .. }));

    let mut reader = DatasetReader::open(
        InputResource::from_path("tests/fixtures/missing/people.csv"),
        &provider,
        lenient,
    )
    .unwrap();
    assert_eq!(reader.read().unwrap(), None);
}

#[test]
fn latin1_input_decodes_every_byte() {
    let provider = provider();
    let mut reader = DatasetReader::open(
        InputResource::Memory {
            filename: "people.csv".to_string(),
            bytes: b"id,name\n1,Jos\xe9\n".to_vec(),
        },
        &provider,
        DatasetReaderOptions {
            charset: metadata_ingest::ingestion::Charset::Latin1,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(read_all(&mut reader)[0]["name"], utf8("José"));
}
