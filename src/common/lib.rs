//! Infrastructure shared between the language-specific crates of the
//! compiler: a source manager that maps compact ids to input buffers, a name
//! interner, the diagnostic machinery, and arena allocation helpers.

pub mod arenas;
pub mod errors;
pub mod name;
pub mod source;

pub use crate::errors::{DiagCode, DiagEmitter, Diagnostic, Diagnostics, Severity};
pub use crate::name::{get_name_table, Name, RcStr};
pub use crate::source::{Location, Source, SourceManager, Span, Spanned};
