//! Read-only dump of customer first names from a SQLite database.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

const FIRST_NAMES_QUERY: &str = "SELECT FirstName FROM Customer";

/// Handle on an existing customer database
pub struct CustomerDirectory {
    connection: Connection,
}

impl CustomerDirectory {
    /// Open an existing database file without write access
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let connection = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        log::debug!("Opened customer database {:?}", path.as_ref());
        Ok(Self { connection })
    }

    /// Every `FirstName` in table order; NULL stays `None`
    pub fn first_names(&self) -> crate::Result<Vec<Option<String>>> {
        let mut statement = self.connection.prepare(FIRST_NAMES_QUERY)?;
        let rows = statement.query_map([], |row| Ok(decode_value(row.get_ref(0)?)))?;

        let names = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        log::debug!("Fetched {} customer rows", names.len());
        Ok(names)
    }
}

fn decode_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) => Some(decode_utf8_ignoring_invalid(bytes)),
        // untyped column: a BLOB name is printed as the text its bytes spell
        ValueRef::Blob(bytes) => Some(decode_utf8_ignoring_invalid(bytes)),
    }
}

/// UTF-8 decode that skips invalid byte sequences instead of replacing them
pub(crate) fn decode_utf8_ignoring_invalid(mut bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());

    loop {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(err) => {
                let (valid, rest) = bytes.split_at(err.valid_up_to());
                // prefix was just validated
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                match err.error_len() {
                    Some(len) => bytes = &rest[len..],
                    // truncated sequence at the end
                    None => return out,
                }
            }
        }
    }
}
