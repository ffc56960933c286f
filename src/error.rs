//! Error taxonomy shared by every module in this crate.
//!
//! Every public operation returns a [`Result`] instead of the thread-local
//! `coda_errno` that the original C library uses; the classification is the
//! same fixed set described by the specification.

use std::fmt;

use thiserror::Error;

/// The fixed, stable classification of failures a CODA operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    FileOpen,
    FileRead,
    InvalidArgument,
    InvalidIndex,
    InvalidDatetime,
    InvalidFormat,
    InvalidName,
    ArrayOutOfBounds,
    ArrayNumDimsMismatch,
    OutOfMemory,
    Expression,
    DataDefinition,
    Product,
    UnsupportedProduct,
    #[cfg(feature = "hdf5")]
    Hdf5,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::FileOpen => "file open error",
            ErrorKind::FileRead => "file read error",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::InvalidIndex => "invalid index",
            ErrorKind::InvalidDatetime => "invalid date/time",
            ErrorKind::InvalidFormat => "invalid format",
            ErrorKind::InvalidName => "invalid name",
            ErrorKind::ArrayOutOfBounds => "array index out of bounds",
            ErrorKind::ArrayNumDimsMismatch => "number of dimensions does not match",
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::Expression => "expression error",
            ErrorKind::DataDefinition => "data definition error",
            ErrorKind::Product => "product error",
            ErrorKind::UnsupportedProduct => "unsupported product",
            #[cfg(feature = "hdf5")]
            ErrorKind::Hdf5 => "HDF5 error",
        };
        f.write_str(name)
    }
}

/// A CODA error: a [`ErrorKind`], a human-readable message, and (when the
/// error escaped out of a cursor operation) the path of the cursor at the
/// point of failure.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}{}", path_suffix(.path))]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    /// Cursor path segments collected on the way out of a failed navigation
    /// or read, innermost first. Empty when the error did not originate
    /// from (or pass through) a cursor operation.
    pub path: Vec<String>,
}

fn path_suffix(path: &[String]) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" (at {})", path.join(""))
    }
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error { kind, message: message.into(), path: Vec::new() }
    }

    /// Prepend a path segment as the error propagates out through a cursor
    /// frame, building up the "cursor path appendix" from the inside out.
    pub fn with_path_segment(mut self, segment: impl Into<String>) -> Self {
        self.path.push(segment.into());
        self
    }
}

macro_rules! error_kind_ctor {
    ($name:ident, $kind:ident) => {
        impl Error {
            pub fn $name(message: impl Into<String>) -> Self {
                Error::new(ErrorKind::$kind, message)
            }
        }
    };
}

error_kind_ctor!(file_open, FileOpen);
error_kind_ctor!(file_read, FileRead);
error_kind_ctor!(invalid_argument, InvalidArgument);
error_kind_ctor!(invalid_index, InvalidIndex);
error_kind_ctor!(invalid_datetime, InvalidDatetime);
error_kind_ctor!(invalid_format, InvalidFormat);
error_kind_ctor!(invalid_name, InvalidName);
error_kind_ctor!(array_out_of_bounds, ArrayOutOfBounds);
error_kind_ctor!(array_num_dims_mismatch, ArrayNumDimsMismatch);
error_kind_ctor!(out_of_memory, OutOfMemory);
error_kind_ctor!(expression, Expression);
error_kind_ctor!(data_definition, DataDefinition);
error_kind_ctor!(product, Product);
error_kind_ctor!(unsupported_product, UnsupportedProduct);

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = Error::invalid_index("index 3 out of range");
        let text = err.to_string();
        assert!(text.contains("invalid index"));
        assert!(text.contains("index 3 out of range"));
    }

    #[test]
    fn path_segments_render_as_suffix() {
        let err = Error::invalid_index("bad index")
            .with_path_segment("/b[1]")
            .with_path_segment("/root");
        assert!(err.to_string().contains("(at /b[1]/root)"));
    }
}
