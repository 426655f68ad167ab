//! Table handles over the source and target databases

use crate::config::{ConnectConfig, Driver};
use crate::error::{DiffError, Result};
use crate::sql;
use duckdb::Connection;
use indexmap::IndexMap;

/// Alias remote databases are attached under
const REMOTE_ALIAS: &str = "remote";

/// Key column types eligible for range segmentation (fit in a BIGINT)
const INTEGRAL_TYPES: [&str; 7] = [
    "TINYINT",
    "SMALLINT",
    "INTEGER",
    "BIGINT",
    "UTINYINT",
    "USMALLINT",
    "UINTEGER",
];

/// One side of a diff: an open connection plus the table to compare.
///
/// The compared column set is key columns + update column + extra columns,
/// in that order.
pub struct TableHandle {
    connection: Connection,
    qualified: String,
    key_columns: Vec<String>,
    update_column: String,
    extra_columns: Vec<String>,
    schema: IndexMap<String, String>,
}

/// Open the backend described by `config` and bind `table` for diffing.
///
/// Remote drivers are reached by attaching the remote database to a local
/// connection through the matching scanner extension. Fails when the backend
/// is unreachable, the table is missing, or any requested column is absent.
pub fn connect_to_table(
    config: &ConnectConfig,
    table: &str,
    key_columns: Vec<String>,
    update_column: &str,
    extra_columns: Vec<String>,
) -> Result<TableHandle> {
    if key_columns.is_empty() {
        return Err(DiffError::invalid_key(
            "at least one primary key column is required",
        ));
    }

    let connection = open_connection(config)?;
    let qualified = qualified_name(config, table);

    let schema = read_schema(&connection, &qualified)?;

    let handle = TableHandle {
        connection,
        qualified,
        key_columns,
        update_column: update_column.to_string(),
        extra_columns,
        schema,
    };
    handle.validate_columns()?;

    log::debug!(
        "Connected to {} ({} driver, {} columns)",
        handle.qualified,
        config.driver,
        handle.schema.len()
    );

    Ok(handle)
}

/// Open a local connection, attaching the remote database when needed
fn open_connection(config: &ConnectConfig) -> Result<Connection> {
    let connection = match config.driver {
        Driver::DuckDb => {
            // Read-only, so both sides of a diff may share one file
            if config.database == ":memory:" {
                Connection::open_in_memory()
            } else {
                duckdb::Config::default()
                    .access_mode(duckdb::AccessMode::ReadOnly)
                    .and_then(|flags| Connection::open_with_flags(&config.database, flags))
            }
            .map_err(|e| {
                DiffError::connect(format!(
                    "Failed to open duckdb database '{}': {}",
                    config.database, e
                ))
            })?
        }
        Driver::Postgres | Driver::Mysql => {
            let connection = Connection::open_in_memory()
                .map_err(|e| DiffError::connect(format!("Failed to open connection: {}", e)))?;

            if let Some(extension) = config.required_extension() {
                connection
                    .execute_batch(&format!("INSTALL {}; LOAD {};", extension, extension))
                    .map_err(|e| {
                        DiffError::connect(format!(
                            "Failed to load {} scanner extension: {}",
                            extension, e
                        ))
                    })?;
            }

            connection
                .execute_batch(&config.attach_statement(REMOTE_ALIAS)?)
                .map_err(|e| {
                    DiffError::connect(format!(
                        "Failed to attach {} database '{}': {}",
                        config.driver, config.database, e
                    ))
                })?;

            connection
        }
    };

    // Aggregation-heavy workload; insertion order is irrelevant here
    connection.execute_batch(
        "SET enable_progress_bar=false; SET preserve_insertion_order=false;",
    )?;

    Ok(connection)
}

/// Qualified table name as seen through the local connection
fn qualified_name(config: &ConnectConfig, table: &str) -> String {
    match config.driver {
        Driver::DuckDb => sql::qualified_table(None, config.schema.as_deref(), table),
        Driver::Postgres => sql::qualified_table(
            Some(REMOTE_ALIAS),
            Some(config.schema.as_deref().unwrap_or("public")),
            table,
        ),
        // The attached MySQL database exposes its tables directly
        Driver::Mysql => sql::qualified_table(Some(REMOTE_ALIAS), None, table),
    }
}

/// Column names and types, in table order
fn read_schema(connection: &Connection, qualified: &str) -> Result<IndexMap<String, String>> {
    let mut stmt = connection
        .prepare(&sql::describe_table(qualified))
        .map_err(|e| {
            DiffError::schema_mismatch(format!("Failed to describe table {}: {}", qualified, e))
        })?;

    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| DiffError::query(format!("Failed to read table schema: {}", e)))?;

    let mut schema = IndexMap::new();
    for row in rows {
        let (name, data_type) =
            row.map_err(|e| DiffError::query(format!("Failed to read schema row: {}", e)))?;
        schema.insert(name, data_type);
    }

    if schema.is_empty() {
        return Err(DiffError::schema_mismatch(format!(
            "Table {} has no columns",
            qualified
        )));
    }

    Ok(schema)
}

impl TableHandle {
    /// All compared columns: keys, then update column, then extras
    pub fn compared_columns(&self) -> Vec<String> {
        let mut columns = self.key_columns.clone();
        columns.push(self.update_column.clone());
        columns.extend(self.extra_columns.iter().cloned());
        columns
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    pub fn qualified(&self) -> &str {
        &self.qualified
    }

    pub fn schema(&self) -> &IndexMap<String, String> {
        &self.schema
    }

    /// First key column, the one segments are cut on
    pub fn segment_key(&self) -> &str {
        &self.key_columns[0]
    }

    /// Whether a column holds an integral type
    pub fn column_is_integral(&self, column: &str) -> bool {
        let data_type = self
            .schema
            .get(column)
            .map(|t| t.to_uppercase())
            .unwrap_or_default();
        INTEGRAL_TYPES.iter().any(|t| *t == data_type)
    }

    /// Whether the segment key supports range arithmetic
    pub fn segment_key_is_integral(&self) -> bool {
        self.column_is_integral(self.segment_key())
    }

    /// Min/max of the segment key, None when the table is empty
    pub fn key_range(&self) -> Result<Option<(i64, i64)>> {
        let query = sql::select_key_range(&self.qualified, self.segment_key());
        let (min, max): (Option<i64>, Option<i64>) = self
            .connection
            .query_row(&query, [], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| DiffError::query(format!("Failed to read key range: {}", e)))?;

        match (min, max) {
            (Some(min), Some(max)) => Ok(Some((min, max))),
            _ => Ok(None),
        }
    }

    /// Row count and checksum over one key segment
    pub fn segment_checksum(&self, bounds: Option<(i64, i64)>) -> Result<(u64, i128)> {
        let query = sql::select_segment_checksum(
            &self.qualified,
            &self.compared_columns(),
            self.segment_key(),
            bounds,
        );
        let (count, checksum): (i64, i128) = self
            .connection
            .query_row(&query, [], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| DiffError::query(format!("Failed to checksum segment: {}", e)))?;

        Ok((count as u64, checksum))
    }

    /// Download one segment's rows, ordered by the key columns
    pub fn fetch_rows(&self, bounds: Option<(i64, i64)>) -> Result<Vec<Vec<Option<String>>>> {
        let columns = self.compared_columns();
        let query =
            sql::select_segment_rows(&self.qualified, &columns, &self.key_columns, bounds);

        let mut stmt = self
            .connection
            .prepare(&query)
            .map_err(|e| DiffError::query(format!("Failed to prepare row download: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                (0..columns.len())
                    .map(|i| row.get::<_, Option<String>>(i))
                    .collect::<std::result::Result<Vec<_>, _>>()
            })
            .map_err(|e| DiffError::query(format!("Failed to download rows: {}", e)))?;

        let mut data = Vec::new();
        for row in rows {
            data.push(row.map_err(|e| DiffError::query(format!("Failed to read row: {}", e)))?);
        }

        Ok(data)
    }

    /// Clone of this handle over its own connection, for a diff worker
    pub fn try_clone(&self) -> Result<Self> {
        let connection = self
            .connection
            .try_clone()
            .map_err(|e| DiffError::connect(format!("Failed to clone connection: {}", e)))?;

        Ok(Self {
            connection,
            qualified: self.qualified.clone(),
            key_columns: self.key_columns.clone(),
            update_column: self.update_column.clone(),
            extra_columns: self.extra_columns.clone(),
            schema: self.schema.clone(),
        })
    }

    /// Verify every requested column exists in the table
    fn validate_columns(&self) -> Result<()> {
        for column in self.compared_columns() {
            if !self.schema.contains_key(&column) {
                return Err(DiffError::schema_mismatch(format!(
                    "Column '{}' not found in table {} (available: {})",
                    column,
                    self.qualified,
                    self.schema
                        .keys()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
        }
        Ok(())
    }
}
