//! SQL text building for schema reads, checksums and row downloads

/// Quote an identifier, doubling any embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fully qualified, quoted table name
pub fn qualified_table(alias: Option<&str>, schema: Option<&str>, table: &str) -> String {
    let mut parts = Vec::new();
    if let Some(alias) = alias {
        parts.push(quote_ident(alias));
    }
    if let Some(schema) = schema {
        parts.push(quote_ident(schema));
    }
    parts.push(quote_ident(table));
    parts.join(".")
}

/// Per-row hash expression over the compared columns.
///
/// NULL and empty string must hash differently, so every value is rendered
/// through COALESCE with a NUL sentinel before concatenation.
fn row_hash_expr(columns: &[String]) -> String {
    let rendered: Vec<String> = columns
        .iter()
        .map(|c| format!("COALESCE(CAST({} AS VARCHAR), chr(0))", quote_ident(c)))
        .collect();
    format!("hash(concat_ws('|', {}))", rendered.join(", "))
}

/// Inclusive key-range restriction, or None for a whole-table segment
fn where_clause(key: &str, bounds: Option<(i64, i64)>) -> String {
    match bounds {
        Some((low, high)) => format!(
            " WHERE {} >= {} AND {} <= {}",
            quote_ident(key),
            low,
            quote_ident(key),
            high
        ),
        None => String::new(),
    }
}

/// Aggregate query returning (row count, checksum) for one segment
pub fn select_segment_checksum(
    table: &str,
    columns: &[String],
    key: &str,
    bounds: Option<(i64, i64)>,
) -> String {
    format!(
        "SELECT COUNT(*), COALESCE(SUM(CAST({} AS HUGEINT)), 0) FROM {}{}",
        row_hash_expr(columns),
        table,
        where_clause(key, bounds)
    )
}

/// Row download query for one segment, ordered by the key columns.
///
/// Values are cast to VARCHAR so both sides render through the same
/// canonical conversion the checksum expression uses.
pub fn select_segment_rows(
    table: &str,
    columns: &[String],
    key_columns: &[String],
    bounds: Option<(i64, i64)>,
) -> String {
    let select_list: Vec<String> = columns
        .iter()
        .map(|c| format!("CAST({} AS VARCHAR)", quote_ident(c)))
        .collect();
    let order_list: Vec<String> = key_columns.iter().map(|c| quote_ident(c)).collect();
    let key = &key_columns[0];
    format!(
        "SELECT {} FROM {}{} ORDER BY {}",
        select_list.join(", "),
        table,
        where_clause(key, bounds),
        order_list.join(", ")
    )
}

/// Min/max of the first key column, cast to BIGINT for segment arithmetic
pub fn select_key_range(table: &str, key: &str) -> String {
    let key = quote_ident(key);
    format!(
        "SELECT CAST(MIN({}) AS BIGINT), CAST(MAX({}) AS BIGINT) FROM {}",
        key, key, table
    )
}

/// Column names and types, in table order
pub fn describe_table(table: &str) -> String {
    format!("DESCRIBE {}", table)
}
