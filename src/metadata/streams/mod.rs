//! Metadata heaps and streams.
//!
//! Each named stream of the metadata directory gets a read-only view over its bytes and,
//! where rebuilding needs one, an append-only builder with stable deduplicated offsets:
//!
//! - [`Strings`] / [`StringsBuilder`] - `#Strings`, NUL-terminated UTF-8 identifiers
//! - [`UserStrings`] / [`UserStringsBuilder`] - `#US`, length-prefixed UTF-16 literals
//! - [`Blob`] / [`BlobBuilder`] - `#Blob`, length-prefixed byte records
//! - [`GuidHeap`] / [`GuidBuilder`] - `#GUID`, a 1-indexed array of 16-byte GUIDs
//! - [`TablesStream`] / [`TablesStreamBuilder`] - `#~` / `#-`, the tables stream
//! - [`StreamHeader`] - the directory entry describing any stream

mod blob;
mod guid;
mod streamheader;
mod strings;
mod tablesheader;
mod userstrings;

pub use blob::{Blob, BlobBuilder};
pub use guid::{GuidBuilder, GuidHeap};
pub use streamheader::{StreamHeader, MAX_STREAM_NAME};
pub use strings::{Strings, StringsBuilder, StringsIterator};
pub use tablesheader::{TableSlice, TablesStream, TablesStreamBuilder};
pub use userstrings::{UserStrings, UserStringsBuilder, UserStringsIterator};
