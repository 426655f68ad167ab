//! Connection configuration records and credential handling

use crate::error::{DiffError, Result};
use std::env;
use std::fmt;
use std::path::Path;

/// Backend driver tag carried in a connection record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    DuckDb,
    Postgres,
    Mysql,
}

impl Driver {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "duckdb" => Ok(Self::DuckDb),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            other => Err(DiffError::unsupported_driver(other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuckDb => "duckdb",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transient connection record for one side of the diff.
///
/// Built from CLI arguments, passed by value into `connect_to_table`, never
/// persisted. `account`, `role` and `warehouse` are vendor fields; drivers
/// that have no use for them accept and ignore them.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub driver: Driver,
    pub user: Option<String>,
    pub password: Option<String>,
    pub account: Option<String>,
    pub role: Option<String>,
    pub warehouse: Option<String>,
    pub database: String,
    pub schema: Option<String>,
}

impl ConnectConfig {
    /// Resolve `{VAR}` placeholders in the credential-bearing fields
    pub fn resolve_secrets(&mut self) -> Result<()> {
        for field in [&mut self.account, &mut self.user, &mut self.password] {
            if let Some(value) = field.take() {
                *field = Some(substitute_env_vars(&value)?);
            }
        }
        Ok(())
    }

    /// Key/value connection payload for the remote drivers
    fn attach_payload(&self) -> Result<String> {
        let mut parts = Vec::new();

        if let Some(host) = &self.account {
            parts.push(format!("host={}", host));
        }
        if let Some(user) = &self.user {
            parts.push(format!("user={}", user));
        }
        if let Some(password) = &self.password {
            parts.push(format!("password={}", password));
        }

        match self.driver {
            Driver::Postgres => parts.push(format!("dbname={}", self.database)),
            Driver::Mysql => {
                // MySQL has no schema level under the database; the schema
                // field, when given, names the remote database to attach.
                let db = self.schema.as_deref().unwrap_or(&self.database);
                parts.push(format!("db={}", db));
            }
            Driver::DuckDb => {
                return Err(DiffError::config(
                    "duckdb databases are opened directly, not attached",
                ));
            }
        }

        Ok(parts.join(" "))
    }

    /// Full ATTACH statement binding the remote database under `alias`
    pub fn attach_statement(&self, alias: &str) -> Result<String> {
        let payload = self.attach_payload()?.replace('\'', "''");
        Ok(format!(
            "ATTACH '{}' AS {} (TYPE {})",
            payload,
            alias,
            self.driver.as_str()
        ))
    }

    /// Scanner extension backing a remote driver, if one must be loaded
    pub fn required_extension(&self) -> Option<&'static str> {
        match self.driver {
            Driver::DuckDb => None,
            Driver::Postgres => Some("postgres"),
            Driver::Mysql => Some("mysql"),
        }
    }
}

/// Substitute environment variable placeholders like `{VAR_NAME}`
pub fn substitute_env_vars(value: &str) -> Result<String> {
    let mut result = value.to_string();

    let mut start = 0;
    while let Some(open_pos) = result[start..].find('{') {
        let open_pos = start + open_pos;
        if let Some(close_pos) = result[open_pos..].find('}') {
            let close_pos = open_pos + close_pos;
            let var_name = &result[open_pos + 1..close_pos];

            let var_value = env::var(var_name).map_err(|_| {
                DiffError::config(format!(
                    "Environment variable '{}' not found. Make sure it's set in your .env file or environment.",
                    var_name
                ))
            })?;

            result.replace_range(open_pos..=close_pos, &var_value);
            start = open_pos + var_value.len();
        } else {
            start = open_pos + 1;
        }
    }

    Ok(result)
}

/// Load environment variables from a .env file if one exists
pub fn load_env_file() -> Result<()> {
    if Path::new(".env").exists() {
        dotenv::dotenv().map_err(|e| {
            DiffError::config(format!("Failed to load .env file: {}", e))
        })?;
    }

    Ok(())
}
