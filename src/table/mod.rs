// This module is the debug-table codec: the serialized, embeddable form of a LineMap.
// The writer emits a compact text table (header, stratum marker, file table, line
// table, end marker) with omission rules that drop fields equal to the running
// defaults. The parser is a single forward pass that honors only sections matching
// the requested stratum, skips unknown section markers for forward compatibility,
// and drops malformed individual lines rather than failing the parse; only a bad
// header is fatal. The merge step attaches the raw table bytes to a compiled ELF
// artifact as an opaque named section, degrading to a logged skip on any failure.

//! Debug-table codec: serialize, parse and embed [`LineMap`](crate::LineMap)s.
//!
//! Wire format, one directive per line:
//!
//! ```text
//! TPLMAP
//! <artifact name>
//! <default stratum>
//! *S <stratum>
//! *F
//! <file entries>
//! *L
//! <line entries>
//! *E
//! ```
//!
//! File entries are `<id> <name>`, or the two-line form `+ <id> <short name>`
//! followed by the relative or absolute path. Line entries follow
//! `srcLine['#'fileId[','repeatCount]]':'destLine[','destIncrement]`.

pub mod merge;
pub mod parser;
pub mod writer;

pub use merge::{extract_table, merge_debug_table};
pub use parser::parse_table;
pub use writer::{write_table, write_table_file};

/// First line of every serialized table.
pub const HEADER_TOKEN: &str = "TPLMAP";

/// ELF section holding the embedded table.
pub const TABLE_SECTION: &str = ".debug_tplmap";

/// Side-car tables at or above this size are skipped at merge time.
pub const MAX_TABLE_SIZE: u64 = 64 * 1024;

/// Suffix appended to a generated source path for its side-car table.
pub const TABLE_SUFFIX: &str = ".dtab";
