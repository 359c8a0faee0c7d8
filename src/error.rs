//! Error taxonomy for the search engine, matching §7 of the design: query
//! errors, missing keys, caller-size-limit violations, namespace misuse,
//! storage/IO failures, and record corruption.

use std::{fmt, io, result};

pub type Result<T> = result::Result<T, Error>;

/// All engine errors carry a `file:line context` prefix (see [`err_at!`])
/// so a log line is enough to find the call site without a backtrace.
#[derive(Debug)]
pub enum Error {
    /// Unparseable query text, unknown operator, malformed id-range.
    InvalidQuery(String),
    /// Missing history id, or a lookup that expected an existing key.
    NotFound(String),
    /// Keyword or comment exceeds the `u16`/`u32` wire limits.
    InvalidKey(String),
    /// Double-scoping a tag into a namespace, or other namespace misuse.
    PermissionError(String),
    /// Underlying I/O or decryption failure on the record store.
    StorageError(String),
    /// A record failed to decode; caller chose not to treat it as absent.
    Corruption(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidQuery(m) => write!(f, "invalid query: {}", m),
            Error::NotFound(m) => write!(f, "not found: {}", m),
            Error::InvalidKey(m) => write!(f, "invalid key: {}", m),
            Error::PermissionError(m) => write!(f, "permission error: {}", m),
            Error::StorageError(m) => write!(f, "storage error: {}", m),
            Error::Corruption(m) => write!(f, "corruption: {}", m),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::StorageError(err.to_string())
    }
}

/// Wrap a fallible expression (or a `msg:` format string) with a
/// `{file}:{line}` context tag and convert it into an [`Error`] variant.
///
/// ```ignore
/// err_at!(StorageError, fs::write(path, data))?;
/// err_at!(InvalidQuery, msg: "unexpected token {:?}", tok)?;
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let msg = format!($($arg),+);
        Err($crate::error::Error::$v(format!("{}:{} {}", file!(), line!(), msg)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => Err($crate::error::Error::$v(format!(
                "{}:{} {}", file!(), line!(), err
            ))),
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let msg = format!($($arg),+);
                Err($crate::error::Error::$v(format!(
                    "{}:{} {}: {}", file!(), line!(), msg, err
                )))
            }
        }
    }};
}

/// Bounds-check a buffer slice before a fixed-width read, producing a
/// [`Error::Corruption`] instead of panicking on truncated input.
#[macro_export]
macro_rules! check_remaining {
    ($buf:expr, $n:expr, $ctx:expr) => {{
        if $buf.len() < $n {
            Err($crate::error::Error::Corruption(format!(
                "{}:{} {}: need {} bytes, have {}",
                file!(),
                line!(),
                $ctx,
                $n,
                $buf.len()
            )))
        } else {
            Ok(())
        }
    }};
}
