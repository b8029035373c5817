//! gtf_splice_sites
//!
//! Turns a GTF annotation into a normalized column-oriented table and derives
//! the genome-wide set of intron boundaries (splice sites) from its
//! transcripts. Coordinates are 0-based, half-open.

pub mod annotation;
pub mod download;
pub mod error;
pub mod model;
pub mod persist;
pub mod splice;
pub mod types;

pub use annotation::{load_annotations, AnnotationLoader, AnnotationRecord, AnnotationTable, AttributeKeys};

pub use error::{Error, Result, SchemaError};

pub use model::{EndSite, Intron, StartSite, Transcript};

pub use persist::{
    read_annotation_table, splice_site_paths, write_annotation_table, write_end_sites,
    write_splice_sites, write_start_sites, TableFormat,
};

pub use splice::{build_transcripts, derive_splice_sites, derive_splice_sites_from_table, SpliceSites};

pub use types::{RefBlock, Strand};
