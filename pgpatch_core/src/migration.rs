//! Migration records and the patch filename grammar.
//!
//! A patch filename has the shape `<digits>_<name>.<direction>.sql`, for
//! example `3_add_users_table.up.sql`. The digit group is the version, parsed
//! as a plain integer (leading zeros are allowed and carry no meaning).

use std::fmt;
use std::num::ParseIntError;

const SQL_EXTENSION: &str = ".sql";

/// The direction a patch script moves the schema in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Moves the schema forward to `version`.
    Up,
    /// Moves the schema back from `version` to `version - 1`.
    Down,
}

impl Direction {
    /// The tag used for this direction in patch filenames.
    pub fn tag(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A single patch script known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// The schema version this script belongs to.
    pub version: i32,
    /// The exact name used to fetch the script from the patch store.
    pub filename: String,
    /// Whether this is an up or a down script.
    pub direction: Direction,
}

impl Migration {
    /// The filename without the direction tag and the `.sql` extension.
    ///
    /// Up and down scripts of the same version must share a base name.
    /// A filename without that suffix is returned whole.
    pub fn base_name(&self) -> &str {
        self.filename
            .strip_suffix(SQL_EXTENSION)
            .and_then(|stem| stem.strip_suffix(self.direction.tag()))
            .and_then(|stem| stem.strip_suffix('.'))
            .unwrap_or(&self.filename)
    }
}

/// The result of matching a filename against the patch grammar.
#[derive(Debug, PartialEq, Eq)]
pub enum ParsedFilename<'a> {
    /// The name follows the grammar.
    Patch {
        /// The digit group, unparsed.
        digits: &'a str,
        /// The free-form part between `_` and the direction tag.
        name: &'a str,
        /// The direction tag.
        direction: Direction,
    },
    /// The name does not follow the grammar.
    NoMatch,
}

/// Matches `filename` against `<digits>_<name>.(up|down).sql`.
///
/// `<name>` may be empty and may itself contain dots or underscores.
pub fn parse_filename(filename: &str) -> ParsedFilename<'_> {
    let Some(stem) = filename.strip_suffix(SQL_EXTENSION) else {
        return ParsedFilename::NoMatch;
    };
    let Some((rest, tag)) = stem.rsplit_once('.') else {
        return ParsedFilename::NoMatch;
    };
    let Some(direction) = Direction::from_tag(tag) else {
        return ParsedFilename::NoMatch;
    };
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return ParsedFilename::NoMatch;
    }
    let (digits, tail) = rest.split_at(digits_len);
    match tail.strip_prefix('_') {
        Some(name) => ParsedFilename::Patch {
            digits,
            name,
            direction,
        },
        None => ParsedFilename::NoMatch,
    }
}

/// Builds a [`Migration`] from a filename that already matched the grammar.
pub(crate) fn migration_from_parts(
    filename: &str,
    digits: &str,
    direction: Direction,
) -> Result<Migration, ParseIntError> {
    Ok(Migration {
        version: digits.parse()?,
        filename: filename.to_string(),
        direction,
    })
}
