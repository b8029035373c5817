use crate::error::{Error, Result};
use crate::model::types::Intron;
use crate::types::{RefBlock, Strand};

/// Transcript model: its exon blocks on one chromosome and strand.
///
/// Exons are kept sorted by start; exons with equal starts keep insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub id: String,
    pub chromosome: String,
    pub strand: Strand,
    exons: Vec<RefBlock>,
}

impl Transcript {
    pub fn new(id: impl Into<String>, chromosome: impl Into<String>, strand: Strand) -> Self {
        Self {
            id: id.into(),
            chromosome: chromosome.into(),
            strand,
            exons: Vec::new(),
        }
    }

    pub fn add_exon(&mut self, block: RefBlock) {
        let pos = self.exons.partition_point(|e| e.start <= block.start);
        self.exons.insert(pos, block);
    }

    pub fn exons(&self) -> &[RefBlock] {
        &self.exons
    }

    /// Check that a row claimed by this transcript sits on the same chromosome and strand.
    pub fn check_member(&self, chromosome: &str, strand: Strand) -> Result<()> {
        if chromosome != self.chromosome {
            return Err(Error::MalformedGroup {
                transcript_id: self.id.clone(),
                reason: format!(
                    "rows on chromosomes '{}' and '{}'",
                    self.chromosome, chromosome
                ),
            });
        }
        if strand != self.strand {
            return Err(Error::MalformedGroup {
                transcript_id: self.id.clone(),
                reason: format!("rows on strands '{}' and '{}'", self.strand, strand),
            });
        }
        Ok(())
    }

    /// Introns between consecutive exons: `[exon_i.end, exon_{i+1}.start)`.
    ///
    /// Transcripts with fewer than two exons have none. Overlapping or touching
    /// exons leave no intron between them and are reported as a malformed transcript.
    pub fn introns(&self) -> Result<Vec<Intron>> {
        self.exons
            .windows(2)
            .map(|w| {
                let (a, b) = (w[0], w[1]);
                let gap = a.gap_to(b).ok_or_else(|| Error::MalformedGroup {
                    transcript_id: self.id.clone(),
                    reason: format!(
                        "exon [{}, {}) {} exon [{}, {})",
                        a.start,
                        a.end,
                        if a.overlaps(b) { "overlaps" } else { "touches" },
                        b.start,
                        b.end
                    ),
                })?;
                Ok(Intron {
                    chromosome: self.chromosome.clone(),
                    start: gap.start,
                    end: gap.end,
                    strand: self.strand,
                })
            })
            .collect()
    }
}
