//! Row hashing and downloaded-segment matching

use blake3::Hasher;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// A hash value represented as a hex string
pub type HashValue = String;

/// A downloaded row: compared column values in column order
pub type Row = Vec<Option<String>>;

/// Compute the hash of a single row.
///
/// Every value is prefixed with a presence tag so NULL never collides with
/// any string, including the empty one.
pub fn hash_row(values: &[Option<String>]) -> HashValue {
    let mut hasher = Hasher::new();
    for value in values {
        match value {
            Some(v) => {
                hasher.update(&[1]);
                hasher.update(v.as_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        hasher.update(b"|");
    }
    hasher.finalize().to_hex().to_string()
}

/// Hash all rows of a downloaded segment in parallel
pub fn hash_rows(rows: &[Row]) -> Vec<HashValue> {
    rows.par_iter().map(|row| hash_row(row)).collect()
}

/// Outcome of matching two downloaded segments by key tuple
#[derive(Debug, Default)]
pub struct SegmentComparison {
    /// Rows whose key exists only in the source
    pub removed: Vec<Row>,
    /// Rows whose key exists only in the target
    pub added: Vec<Row>,
    /// Key in both sides but the rows differ: (source row, target row)
    pub updated: Vec<(Row, Row)>,
}

impl SegmentComparison {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.updated.is_empty()
    }

    pub fn total_changes(&self) -> usize {
        self.removed.len() + self.added.len() + self.updated.len()
    }
}

/// Match two downloaded segments by their leading `key_len` values.
///
/// Results come out in key order on each list. Keys are unique per side
/// (they are the table's primary key), so a duplicate simply overwrites.
pub fn match_rows(key_len: usize, source_rows: Vec<Row>, target_rows: Vec<Row>) -> SegmentComparison {
    let source_hashes = hash_rows(&source_rows);
    let target_hashes = hash_rows(&target_rows);

    let mut target_map: BTreeMap<Vec<Option<String>>, (HashValue, Row)> = target_rows
        .into_iter()
        .zip(target_hashes)
        .map(|(row, hash)| (row[..key_len].to_vec(), (hash, row)))
        .collect();

    let mut comparison = SegmentComparison::default();

    for (source_row, source_hash) in source_rows.into_iter().zip(source_hashes) {
        let key = source_row[..key_len].to_vec();
        match target_map.remove(&key) {
            None => comparison.removed.push(source_row),
            Some((target_hash, target_row)) => {
                if source_hash != target_hash {
                    comparison.updated.push((source_row, target_row));
                }
            }
        }
    }

    // Whatever the source never claimed exists only in the target
    comparison
        .added
        .extend(target_map.into_values().map(|(_, row)| row));

    comparison
}
