use crate::types::Strand;

/// Gap between two consecutive exons of one transcript, 0-based half-open.
///
/// Field order is the deduplication key: `(chromosome, start, end, strand)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Intron {
    pub chromosome: String,
    pub start: u32,
    pub end: u32,
    pub strand: Strand,
}

impl Intron {
    pub fn start_site(&self) -> StartSite {
        StartSite {
            chromosome: self.chromosome.clone(),
            start: self.start,
            strand: self.strand,
        }
    }

    pub fn end_site(&self) -> EndSite {
        EndSite {
            chromosome: self.chromosome.clone(),
            end: self.end,
            strand: self.strand,
        }
    }
}

/// Intron start coordinate (the splice donor on `+`, acceptor on `-`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StartSite {
    pub chromosome: String,
    pub start: u32,
    pub strand: Strand,
}

/// Intron end coordinate (the splice acceptor on `+`, donor on `-`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndSite {
    pub chromosome: String,
    pub end: u32,
    pub strand: Strand,
}
