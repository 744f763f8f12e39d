//! Error types shared across the `slim-rs` workspace.
//!
//! The error kinds mirror the five causes documented for the simulator:
//! user-script errors, configuration errors, file-format errors, internal
//! invariant violations, and I/O errors. Every variant carries enough
//! context to be printed directly to the user without further
//! decoration, matching the fact that the simulator terminates fatally on
//! any of them rather than retrying.

use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

pub type Result<T> = std::result::Result<T, SlimError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    UserScript,
    Configuration,
    FileFormat,
    Internal,
    Io,
}

/// A cheaply-cloneable owned-or-borrowed error string, following the same
/// shape as `radiate_error::ErrString`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrString(Cow<'static, str>);

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T: Into<Cow<'static, str>>> From<T> for ErrString {
    fn from(v: T) -> Self {
        Self(v.into())
    }
}

/// A source-code locus within a user script, reported alongside
/// user-script errors so the outer caller can underline the offending
/// token the way the interpreter's error tracker does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScriptLocus {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug)]
pub enum SlimError {
    /// Malformed script, undefined symbol, type mismatch, out-of-range
    /// argument, or a user-settable constraint violation (e.g. a cloning
    /// rate outside `[0, 1]`).
    UserScript {
        message: ErrString,
        locus: Option<ScriptLocus>,
        from_interpreter: bool,
    },
    /// A configuration call is missing, contradictory, or invalid for the
    /// selected model (WF vs. nonWF), e.g. age information supplied under
    /// a WF model, or no mutation rate ever defined.
    Configuration { message: ErrString },
    /// Wrong magic, wrong endianness, unknown version, size mismatch,
    /// missing section, or a malformed row while reading a population
    /// file.
    FileFormat { message: ErrString },
    /// An assertion the simulator relies on for correctness was violated
    /// (double free, out-of-range mutation index, COW invariant break,
    /// cross-check mismatch, ...). Always a bug, never user-recoverable.
    Internal { message: ErrString },
    /// File not found, directory could not be created, or a short write.
    Io {
        message: ErrString,
        source: Option<std::io::Error>,
    },
}

impl SlimError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SlimError::UserScript { .. } => ErrorCode::UserScript,
            SlimError::Configuration { .. } => ErrorCode::Configuration,
            SlimError::FileFormat { .. } => ErrorCode::FileFormat,
            SlimError::Internal { .. } => ErrorCode::Internal,
            SlimError::Io { .. } => ErrorCode::Io,
        }
    }

    pub fn is_fatal(&self) -> bool {
        // Every error kind the simulator raises is fatal; there is no
        // retry path within a generation (spec §7).
        true
    }

    pub fn user_script(message: impl Into<ErrString>) -> Self {
        SlimError::UserScript {
            message: message.into(),
            locus: None,
            from_interpreter: false,
        }
    }

    pub fn user_script_at(message: impl Into<ErrString>, locus: ScriptLocus) -> Self {
        SlimError::UserScript {
            message: message.into(),
            locus: Some(locus),
            from_interpreter: false,
        }
    }

    pub fn configuration(message: impl Into<ErrString>) -> Self {
        SlimError::Configuration {
            message: message.into(),
        }
    }

    pub fn file_format(message: impl Into<ErrString>) -> Self {
        SlimError::FileFormat {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<ErrString>) -> Self {
        SlimError::Internal {
            message: message.into(),
        }
    }
}

impl Display for SlimError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SlimError::UserScript {
                message, locus, ..
            } => {
                write!(f, "user script error: {message}")?;
                if let Some(locus) = locus {
                    write!(f, " (line {}, column {})", locus.line, locus.column)?;
                }
                Ok(())
            }
            SlimError::Configuration { message } => write!(f, "configuration error: {message}"),
            SlimError::FileFormat { message } => write!(f, "file format error: {message}"),
            SlimError::Internal { message } => write!(f, "(internal error) {message}"),
            SlimError::Io { message, .. } => write!(f, "I/O error: {message}"),
        }
    }
}

impl std::error::Error for SlimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SlimError::Io { source, .. } => source.as_ref().map(|e| e as _),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SlimError {
    fn from(source: std::io::Error) -> Self {
        SlimError::Io {
            message: source.to_string().into(),
            source: Some(source),
        }
    }
}

/// Construct a [`SlimError`] of a named kind with a formatted message,
/// mirroring `radiate_err!`.
#[macro_export]
macro_rules! slim_err {
    (UserScript: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::SlimError::user_script(format!($fmt, $($arg),*))
    };
    (Configuration: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::SlimError::configuration(format!($fmt, $($arg),*))
    };
    (FileFormat: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::SlimError::file_format(format!($fmt, $($arg),*))
    };
    (Internal: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::SlimError::internal(format!($fmt, $($arg),*))
    };
}

/// Return early with a [`SlimError`] of the given kind.
#[macro_export]
macro_rules! slim_bail {
    ($($tt:tt)+) => {
        return Err($crate::slim_err!($($tt)+))
    };
}

/// Assert an internal invariant, returning an `Internal` error on failure
/// instead of panicking, so callers in library code can propagate rather
/// than abort the process.
#[macro_export]
macro_rules! slim_ensure {
    (Internal, $cond:expr, $($tt:tt)+) => {
        if !$cond {
            $crate::slim_bail!(Internal: $($tt)+);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_locus() {
        let err = SlimError::user_script_at("undefined symbol 'x'", ScriptLocus { line: 3, column: 7 });
        let message = err.to_string();
        assert!(message.contains("line 3"));
        assert!(message.contains("column 7"));
    }

    #[test]
    fn code_matches_variant() {
        assert_eq!(SlimError::internal("oops").code(), ErrorCode::Internal);
        assert_eq!(SlimError::configuration("oops").code(), ErrorCode::Configuration);
    }

    #[test]
    fn macro_constructs_expected_variant() {
        let err = slim_err!(FileFormat: "bad magic: {:#x}", 0xdeadbeefu32);
        assert_eq!(err.code(), ErrorCode::FileFormat);
        assert!(err.to_string().contains("deadbeef"));
    }
}
