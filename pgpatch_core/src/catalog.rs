//! The migration catalog: discovery, validation and pairing of patch scripts.

use crate::migration::{Direction, Migration, ParsedFilename, migration_from_parts, parse_filename};
use crate::patch_store::{PatchStore, PatchStoreError};
use std::collections::BTreeMap;

/// Errors raised while building a catalog. None of them leave a usable catalog behind.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The patch store could not be listed.
    #[error("failed to read patches: {0}")]
    List(#[from] PatchStoreError),

    /// A `*.sql` file does not follow the naming grammar (strict mode only).
    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    /// The version digits of a filename do not fit a version number.
    #[error("bad filename: {filename}: {source}")]
    BadVersion {
        /// The offending filename.
        filename: String,
        /// Why the digits did not parse.
        #[source]
        source: std::num::ParseIntError,
    },

    /// Two scripts of the same direction claim the same version.
    #[error("duplicate {direction} version {version}: {first} and {second}")]
    DuplicateVersion {
        /// The shared version.
        version: i32,
        /// The direction both scripts belong to.
        direction: Direction,
        /// The first script seen with this version.
        first: String,
        /// The second script seen with this version.
        second: String,
    },

    /// A script sits where a different version was expected.
    #[error("unexpected sequence - found {filename} at {position}")]
    UnexpectedSequence {
        /// The out-of-place script.
        filename: String,
        /// The version expected at this place in the sequence.
        position: i32,
    },

    /// Down scripts exist but there are not as many as up scripts.
    #[error("{up} up scripts vs {down} down scripts")]
    CountMismatch {
        /// Number of up scripts.
        up: usize,
        /// Number of down scripts.
        down: usize,
    },

    /// The up and down scripts of one version have different base names.
    #[error("up/down mismatch: {up}, {down}")]
    PairMismatch {
        /// The up script.
        up: String,
        /// The down script.
        down: String,
    },

    /// The configured version table is not a plain SQL identifier.
    #[error("invalid version table name: {0:?}")]
    InvalidVersionTable(String),
}

/// The validated, ordered set of patch scripts.
///
/// `up()[i]` and, when present, `down()[i]` hold version `i + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    up: Vec<Migration>,
    down: Option<Vec<Migration>>,
}

impl Catalog {
    /// Lists the store and validates every script name it finds.
    ///
    /// With `strict` set, any `*.sql` name outside the patch grammar fails the
    /// build; otherwise such names are skipped.
    pub async fn build<S>(store: &S, strict: bool) -> Result<Self, CatalogError>
    where
        S: PatchStore + ?Sized,
    {
        let mut names = store.list_names().await?;
        names.sort();
        Self::from_names(names, strict)
    }

    /// Builds a catalog from an already listed set of names.
    pub fn from_names<I>(names: I, strict: bool) -> Result<Self, CatalogError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut up: BTreeMap<i32, Migration> = BTreeMap::new();
        let mut down: BTreeMap<i32, Migration> = BTreeMap::new();

        for filename in names {
            let filename = filename.as_ref();
            let ParsedFilename::Patch {
                digits, direction, ..
            } = parse_filename(filename)
            else {
                if strict {
                    return Err(CatalogError::InvalidFilename(filename.to_string()));
                }
                log::debug!("Ignoring {} : not a patch filename", filename);
                continue;
            };

            let migration =
                migration_from_parts(filename, digits, direction).map_err(|source| {
                    CatalogError::BadVersion {
                        filename: filename.to_string(),
                        source,
                    }
                })?;
            let bucket = match direction {
                Direction::Up => &mut up,
                Direction::Down => &mut down,
            };
            if let Some(existing) = bucket.get(&migration.version) {
                return Err(CatalogError::DuplicateVersion {
                    version: migration.version,
                    direction,
                    first: existing.filename.clone(),
                    second: migration.filename,
                });
            }
            bucket.insert(migration.version, migration);
        }

        // BTreeMap iteration is already ascending by version.
        let up: Vec<Migration> = up.into_values().collect();
        check_contiguous(&up)?;

        if down.is_empty() {
            return Ok(Self { up, down: None });
        }

        let down: Vec<Migration> = down.into_values().collect();
        if up.len() != down.len() {
            return Err(CatalogError::CountMismatch {
                up: up.len(),
                down: down.len(),
            });
        }
        check_contiguous(&down)?;
        for (u, d) in up.iter().zip(&down) {
            if u.base_name() != d.base_name() {
                return Err(CatalogError::PairMismatch {
                    up: u.filename.clone(),
                    down: d.filename.clone(),
                });
            }
        }

        Ok(Self {
            up,
            down: Some(down),
        })
    }

    /// The up scripts, ascending by version.
    pub fn up(&self) -> &[Migration] {
        &self.up
    }

    /// The down scripts, ascending by version, or `None` when the store has none.
    pub fn down(&self) -> Option<&[Migration]> {
        self.down.as_deref()
    }

    /// The highest version available, or 0 when there are no scripts.
    pub fn latest_version(&self) -> i32 {
        self.up.last().map(|m| m.version).unwrap_or(0)
    }
}

fn check_contiguous(sequence: &[Migration]) -> Result<(), CatalogError> {
    for (expected, migration) in (1..).zip(sequence) {
        if migration.version != expected {
            return Err(CatalogError::UnexpectedSequence {
                filename: migration.filename.clone(),
                position: expected,
            });
        }
    }
    Ok(())
}
