//! Configuration for building a migrator.

/// The default name of the table holding the schema version.
pub const DEFAULT_VERSION_TABLE: &str = "schema_version";

/// Controls how a [`Migrator`](crate::Migrator) is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratorConfig {
    /// Name of the single-row table that records the schema version.
    ///
    /// May be schema-qualified (`schema.table`). It is interpolated into
    /// SQL, so it must be a plain identifier; see [`is_valid_table_name`].
    pub version_table: String,

    /// Whether `*.sql` files that do not follow the patch naming grammar are
    /// a hard error (`true`) or silently ignored (`false`).
    pub strict: bool,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            version_table: DEFAULT_VERSION_TABLE.to_string(),
            strict: true,
        }
    }
}

impl MigratorConfig {
    /// The default configuration with non-matching filenames ignored.
    pub fn loose() -> Self {
        Self {
            strict: false,
            ..Self::default()
        }
    }

    /// Replaces the version table name.
    pub fn with_version_table(mut self, name: impl Into<String>) -> Self {
        self.version_table = name.into();
        self
    }
}

/// Whether `name` is an unquoted SQL identifier, optionally qualified with a
/// schema: `[A-Za-z_][A-Za-z0-9_]*` with at most one `.` separator.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut parts = name.split('.');
    let valid = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    match (parts.next(), parts.next(), parts.next()) {
        (Some(table), None, None) => valid(table),
        (Some(schema), Some(table), None) => valid(schema) && valid(table),
        _ => false,
    }
}
