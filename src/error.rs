use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! invalid_pe {
    ($msg:expr) => {
        crate::Error::InvalidPe {
            message: $msg.to_string(),
        }
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidPe {
            message: format!($fmt, $($arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers all failure modes of PE container parsing, CLI metadata decoding,
/// signature processing, and name resolution. Each variant provides specific context
/// about the failure mode to enable appropriate error handling.
///
/// # Error Categories
///
/// ## Container and stream errors
/// - [`Error::InvalidPe`] - Header signature or structural violation in the PE container
/// - [`Error::Malformed`] - Corrupted encoding inside an otherwise located structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the available data
/// - [`Error::MissingStream`] - A required metadata heap or stream is absent
///
/// ## Metadata errors
/// - [`Error::UnknownElementType`] - Unrecognized element-type opcode in a signature blob
/// - [`Error::InvalidToken`] - A metadata token references a table or row out of range
/// - [`Error::RecursionLimit`] - Maximum nesting depth exceeded during signature parsing
///
/// ## Resolution and I/O
/// - [`Error::ResolutionFailure`] - Name resolution found no matching assembly or type
/// - [`Error::FileError`] - Filesystem I/O errors from the backing store
///
/// # Examples
///
/// ```rust,no_run
/// use dotforge::{Error, PeFile};
/// use std::path::Path;
///
/// match PeFile::from_file(Path::new("assembly.dll")) {
///     Ok(pe) => println!("loaded {} sections", pe.sections().len()),
///     Err(Error::InvalidPe { message }) => eprintln!("not a PE: {}", message),
///     Err(Error::OutOfBounds(offset)) => eprintln!("truncated at {}", offset),
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Header signature or structural violation in the PE container.
    ///
    /// Raised when the DOS stub, PE signature, COFF header, or optional header
    /// do not satisfy the PE/COFF specification. Fatal for the whole file.
    #[error("Invalid PE - {message}")]
    InvalidPe {
        /// Description of the structural violation
        message: String,
    },

    /// A structure was located but its encoding is damaged.
    ///
    /// Covers bad compressed integers, invalid strings, malformed stream
    /// headers and similar in-structure corruption. The error carries the
    /// source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    ///
    /// The payload is the offset at which data ran out. This is a safety
    /// check to prevent buffer overruns during parsing of truncated input.
    #[error("Insufficient data at offset {0}")]
    OutOfBounds(usize),

    /// Unrecognized element-type opcode while parsing a signature blob.
    ///
    /// The payload is the offending opcode byte.
    #[error("Unknown element type - 0x{0:02x}")]
    UnknownElementType(u8),

    /// A required metadata stream or heap is absent.
    ///
    /// The payload is the stream name that was looked up (e.g. `#Strings`).
    #[error("Missing metadata stream - {0}")]
    MissingStream(String),

    /// A metadata token references a table or row that is out of range.
    #[error("Invalid metadata token - {0}")]
    InvalidToken(Token),

    /// Name resolution found no matching assembly or type.
    ///
    /// The payload is the display form of the reference that failed to resolve.
    #[error("Failed to resolve - {0}")]
    ResolutionFailure(String),

    /// Recursion limit reached.
    ///
    /// Signature parsing enforces a maximum nesting depth to guard against
    /// stack exhaustion on crafted blobs. The payload is the enforced limit.
    #[error("Reached the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during file operations
    /// such as reading from disk, permission issues, or filesystem errors.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    ///
    /// Used for errors that don't fit into other categories, and for
    /// argument-validation failures that indicate caller bugs rather than
    /// damaged input.
    #[error("{0}")]
    Error(String),
}
