pub mod builder;
pub mod io;
pub mod table;

pub use builder::{load_annotations, AnnotationLoader, AttributeKeys};
pub use io::{AnnotationReader, GtfRecord, ParseError};
pub use table::{strip_version, AnnotationRecord, AnnotationTable};
