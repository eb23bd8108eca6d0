pub use crate::errors::{ErrorCategory, ErrorKind, ErrorReporting, PatraError, SourceContext};

pub mod combinator;
pub mod context;
pub mod cursor;
pub mod document;
pub mod errors;
pub mod rewrite;
pub mod scan;
