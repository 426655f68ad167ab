//! Functional tests driving full diffs over paired duckdb databases

use crate::common::{sample_data, DiffFixture};
use datadiff::diff::{DiffOp, DiffOptions, DiffRow};
use datadiff::{diff_tables, DiffError};

fn options() -> DiffOptions {
    DiffOptions {
        threaded: false,
        ..DiffOptions::default()
    }
}

fn sorted(mut rows: Vec<DiffRow>) -> Vec<DiffRow> {
    rows.sort_by(|a, b| a.values.cmp(&b.values).then_with(|| a.op.sign().cmp(&b.op.sign())));
    rows
}

#[test]
fn test_identical_tables_produce_empty_result() {
    let fixture = DiffFixture::new().unwrap();
    fixture.seed_both(sample_data::ORDERS).unwrap();

    let source = fixture
        .connect_source("orders", &["id"], &["name", "amount"])
        .unwrap();
    let target = fixture
        .connect_target("orders", &["id"], &["name", "amount"])
        .unwrap();

    let result = diff_tables(&source, &target, &options(), None).unwrap();

    assert!(!result.has_differences());
    // Matching checksums mean nothing was ever downloaded
    assert_eq!(result.stats.segments_downloaded, 0);
    assert_eq!(result.stats.rows_downloaded, 0);
}

#[test]
fn test_detects_added_removed_and_updated_rows() {
    let fixture = DiffFixture::new().unwrap();
    fixture.seed_source(sample_data::ORDERS).unwrap();
    fixture.seed_target(sample_data::ORDERS).unwrap();
    fixture
        .seed_target(
            "UPDATE orders SET amount = 0.99 WHERE id = 2;
             DELETE FROM orders WHERE id = 3;
             INSERT INTO orders VALUES (4, '2024-01-04 00:00:00', 'delta', 3.00);",
        )
        .unwrap();

    let source = fixture
        .connect_source("orders", &["id"], &["name", "amount"])
        .unwrap();
    let target = fixture
        .connect_target("orders", &["id"], &["name", "amount"])
        .unwrap();

    let result = diff_tables(&source, &target, &options(), None).unwrap();

    assert_eq!(result.stats.rows_updated, 1);
    assert_eq!(result.stats.rows_removed, 1);
    assert_eq!(result.stats.rows_added, 1);
    // An update contributes a -/+ pair, so four entries in total
    assert_eq!(result.rows.len(), 4);

    let removed: Vec<_> = result
        .rows
        .iter()
        .filter(|r| r.op == DiffOp::Removed)
        .collect();
    let added: Vec<_> = result
        .rows
        .iter()
        .filter(|r| r.op == DiffOp::Added)
        .collect();

    assert_eq!(removed.len(), 2);
    assert_eq!(added.len(), 2);
    assert!(removed.iter().any(|r| r.values[0].as_deref() == Some("3")));
    assert!(added.iter().any(|r| r.values[0].as_deref() == Some("4")));

    // The update pair shares the key but not the amount
    assert!(removed
        .iter()
        .any(|r| r.values[0].as_deref() == Some("2") && r.values[3].as_deref() == Some("0.75")));
    assert!(added
        .iter()
        .any(|r| r.values[0].as_deref() == Some("2") && r.values[3].as_deref() == Some("0.99")));
}

#[test]
fn test_update_pair_is_emitted_in_order() {
    let fixture = DiffFixture::new().unwrap();
    fixture.seed_source(sample_data::ORDERS).unwrap();
    fixture.seed_target(sample_data::ORDERS).unwrap();
    fixture
        .seed_target("UPDATE orders SET name = 'BETA' WHERE id = 2;")
        .unwrap();

    let source = fixture.connect_source("orders", &["id"], &["name"]).unwrap();
    let target = fixture.connect_target("orders", &["id"], &["name"]).unwrap();

    let result = diff_tables(&source, &target, &options(), None).unwrap();

    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0].op, DiffOp::Removed);
    assert_eq!(result.rows[0].values[2].as_deref(), Some("beta"));
    assert_eq!(result.rows[1].op, DiffOp::Added);
    assert_eq!(result.rows[1].values[2].as_deref(), Some("BETA"));
}

#[test]
fn test_segment_rows_keep_numeric_key_order() {
    let fixture = DiffFixture::new().unwrap();
    fixture
        .seed_both(
            "CREATE TABLE t AS
               SELECT range AS id,
                      TIMESTAMP '2024-01-01 00:00:00' AS _timestamp,
                      'v' || range AS v
               FROM range(1, 13);",
        )
        .unwrap();
    fixture
        .seed_target("UPDATE t SET v = 'changed' WHERE id IN (9, 10);")
        .unwrap();

    let source = fixture.connect_source("t", &["id"], &["v"]).unwrap();
    let target = fixture.connect_target("t", &["id"], &["v"]).unwrap();

    let result = diff_tables(&source, &target, &options(), None).unwrap();

    // Both updates land in one downloaded segment; 9 must precede 10
    assert_eq!(result.rows.len(), 4);
    let keys: Vec<_> = result
        .rows
        .iter()
        .map(|r| r.values[0].as_deref().unwrap().to_string())
        .collect();
    assert_eq!(keys, vec!["9", "9", "10", "10"]);
}

#[test]
fn test_null_and_empty_string_differ() {
    let fixture = DiffFixture::new().unwrap();
    fixture
        .seed_source(
            "CREATE TABLE t (id BIGINT, _timestamp TIMESTAMP, v VARCHAR);
             INSERT INTO t VALUES (1, '2024-01-01 00:00:00', NULL);",
        )
        .unwrap();
    fixture
        .seed_target(
            "CREATE TABLE t (id BIGINT, _timestamp TIMESTAMP, v VARCHAR);
             INSERT INTO t VALUES (1, '2024-01-01 00:00:00', '');",
        )
        .unwrap();

    let source = fixture.connect_source("t", &["id"], &["v"]).unwrap();
    let target = fixture.connect_target("t", &["id"], &["v"]).unwrap();

    let result = diff_tables(&source, &target, &options(), None).unwrap();

    assert_eq!(result.stats.rows_updated, 1);
    assert_eq!(result.rows[0].values[2], None);
    assert_eq!(result.rows[1].values[2].as_deref(), Some(""));
}

#[test]
fn test_empty_tables_compare_clean() {
    let fixture = DiffFixture::new().unwrap();
    fixture
        .seed_both("CREATE TABLE t (id BIGINT, _timestamp TIMESTAMP, v VARCHAR);")
        .unwrap();

    let source = fixture.connect_source("t", &["id"], &["v"]).unwrap();
    let target = fixture.connect_target("t", &["id"], &["v"]).unwrap();

    let result = diff_tables(&source, &target, &options(), None).unwrap();

    assert!(!result.has_differences());
    assert_eq!(result.stats.segments_compared, 0);
}

#[test]
fn test_one_side_empty_reports_every_row() {
    let fixture = DiffFixture::new().unwrap();
    fixture.seed_source(sample_data::ORDERS).unwrap();
    fixture
        .seed_target("CREATE TABLE orders (id BIGINT, _timestamp TIMESTAMP, name VARCHAR, amount DOUBLE);")
        .unwrap();

    let source = fixture
        .connect_source("orders", &["id"], &["name", "amount"])
        .unwrap();
    let target = fixture
        .connect_target("orders", &["id"], &["name", "amount"])
        .unwrap();

    let result = diff_tables(&source, &target, &options(), None).unwrap();

    assert_eq!(result.stats.rows_removed, 3);
    assert_eq!(result.stats.rows_added, 0);
    assert!(result.rows.iter().all(|r| r.op == DiffOp::Removed));
}

#[test]
fn test_bisection_downloads_only_differing_segments() {
    let fixture = DiffFixture::new().unwrap();
    fixture.seed_source(sample_data::LARGE).unwrap();
    fixture.seed_target(sample_data::LARGE).unwrap();
    fixture
        .seed_target(
            "UPDATE orders SET name = 'changed' WHERE id IN (123, 2500);
             DELETE FROM orders WHERE id = 4999;
             INSERT INTO orders VALUES (5001, '2024-01-02 00:00:00', 'extra');",
        )
        .unwrap();

    let source = fixture.connect_source("orders", &["id"], &["name"]).unwrap();
    let target = fixture.connect_target("orders", &["id"], &["name"]).unwrap();

    let opts = DiffOptions {
        threaded: false,
        bisection_factor: 4,
        bisection_threshold: 100,
        ..DiffOptions::default()
    };
    let result = diff_tables(&source, &target, &opts, None).unwrap();

    assert_eq!(result.stats.rows_updated, 2);
    assert_eq!(result.stats.rows_removed, 1);
    assert_eq!(result.stats.rows_added, 1);
    assert_eq!(result.rows.len(), 6);

    // Bisection must prune matching ranges instead of downloading the table
    assert!(result.stats.rows_downloaded < 1000);
    assert!(result.stats.segments_downloaded <= 8);
}

#[test]
fn test_threaded_and_sequential_agree() {
    let fixture = DiffFixture::new().unwrap();
    fixture.seed_source(sample_data::LARGE).unwrap();
    fixture.seed_target(sample_data::LARGE).unwrap();
    fixture
        .seed_target(
            "UPDATE orders SET name = 'changed' WHERE id IN (17, 1700, 3400);
             DELETE FROM orders WHERE id = 42;",
        )
        .unwrap();

    let source = fixture.connect_source("orders", &["id"], &["name"]).unwrap();
    let target = fixture.connect_target("orders", &["id"], &["name"]).unwrap();

    let sequential = DiffOptions {
        threaded: false,
        bisection_factor: 8,
        bisection_threshold: 64,
        ..DiffOptions::default()
    };
    let threaded = DiffOptions {
        threaded: true,
        max_threadpool_size: 6,
        ..sequential.clone()
    };

    let sequential_result = diff_tables(&source, &target, &sequential, None).unwrap();
    let threaded_result = diff_tables(&source, &target, &threaded, None).unwrap();

    assert_eq!(
        sorted(sequential_result.rows),
        sorted(threaded_result.rows)
    );
}

#[test]
fn test_limit_truncates_result_list() {
    let fixture = DiffFixture::new().unwrap();
    fixture.seed_source(sample_data::ORDERS).unwrap();
    fixture
        .seed_target("CREATE TABLE orders (id BIGINT, _timestamp TIMESTAMP, name VARCHAR, amount DOUBLE);")
        .unwrap();

    let source = fixture
        .connect_source("orders", &["id"], &["name", "amount"])
        .unwrap();
    let target = fixture
        .connect_target("orders", &["id"], &["name", "amount"])
        .unwrap();

    let opts = DiffOptions {
        threaded: false,
        limit: Some(2),
        ..DiffOptions::default()
    };
    let result = diff_tables(&source, &target, &opts, None).unwrap();

    assert_eq!(result.rows.len(), 2);
}

#[test]
fn test_varchar_key_falls_back_to_full_compare() {
    let fixture = DiffFixture::new().unwrap();
    fixture
        .seed_source(
            "CREATE TABLE t (code VARCHAR, _timestamp TIMESTAMP, v VARCHAR);
             INSERT INTO t VALUES ('a', '2024-01-01 00:00:00', '1'), ('b', '2024-01-01 00:00:00', '2');",
        )
        .unwrap();
    fixture
        .seed_target(
            "CREATE TABLE t (code VARCHAR, _timestamp TIMESTAMP, v VARCHAR);
             INSERT INTO t VALUES ('a', '2024-01-01 00:00:00', '1'), ('b', '2024-01-01 00:00:00', 'X');",
        )
        .unwrap();

    let source = fixture.connect_source("t", &["code"], &["v"]).unwrap();
    let target = fixture.connect_target("t", &["code"], &["v"]).unwrap();

    let result = diff_tables(&source, &target, &options(), None).unwrap();

    assert_eq!(result.stats.rows_updated, 1);
    assert_eq!(result.stats.segments_compared, 1);
    assert_eq!(result.stats.segments_downloaded, 1);
}

#[test]
fn test_compound_keys() {
    let fixture = DiffFixture::new().unwrap();
    let ddl = "CREATE TABLE t (id BIGINT, part BIGINT, _timestamp TIMESTAMP, v VARCHAR);
         INSERT INTO t VALUES
           (1, 1, '2024-01-01 00:00:00', 'a'),
           (1, 2, '2024-01-01 00:00:00', 'b'),
           (2, 1, '2024-01-01 00:00:00', 'c');";
    fixture.seed_source(ddl).unwrap();
    fixture.seed_target(ddl).unwrap();
    fixture
        .seed_target("UPDATE t SET v = 'B' WHERE id = 1 AND part = 2;")
        .unwrap();

    let source = fixture.connect_source("t", &["id", "part"], &["v"]).unwrap();
    let target = fixture.connect_target("t", &["id", "part"], &["v"]).unwrap();

    let result = diff_tables(&source, &target, &options(), None).unwrap();

    assert_eq!(result.stats.rows_updated, 1);
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0].values[1].as_deref(), Some("2"));
}

#[test]
fn test_mismatched_column_sets_rejected() {
    let fixture = DiffFixture::new().unwrap();
    fixture.seed_both(sample_data::ORDERS).unwrap();

    let source = fixture
        .connect_source("orders", &["id"], &["name", "amount"])
        .unwrap();
    let target = fixture.connect_target("orders", &["id"], &["name"]).unwrap();

    let result = diff_tables(&source, &target, &options(), None);
    assert!(matches!(result, Err(DiffError::SchemaMismatch { .. })));
}
