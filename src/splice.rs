use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use log::{debug, warn};

use crate::annotation::table::AnnotationTable;
use crate::error::Result;
use crate::model::transcript::Transcript;
use crate::model::types::{EndSite, Intron, StartSite};
use crate::types::Strand;

/// Group annotation rows into transcripts, keyed by transcript id.
///
/// Rows without a transcript id (gene-level rows) are skipped. Every other row
/// joins its transcript's group and must agree with it on chromosome and
/// strand; only `exon` rows contribute exon blocks.
///
/// The map is ordered by transcript id, which keeps everything derived from it
/// deterministic.
///
/// ```
/// use std::io::Cursor;
/// use gtf_splice_sites::{build_transcripts, AnnotationLoader};
///
/// let gtf = "\
/// chr1\tsrc\texon\t201\t250\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";\n\
/// chr1\tsrc\texon\t101\t150\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";\n";
///
/// let table = AnnotationLoader::new().load_reader(Cursor::new(gtf.as_bytes())).unwrap();
/// let transcripts = build_transcripts(&table).unwrap();
///
/// assert_eq!(transcripts.len(), 1);
/// assert_eq!(transcripts["T1"].exons()[0].start, 100);
/// ```
pub fn build_transcripts(table: &AnnotationTable) -> Result<BTreeMap<String, Transcript>> {
    table.validate()?;

    let mut transcripts: BTreeMap<String, Transcript> = BTreeMap::new();

    for rec in table.records() {
        let Some(tx_id) = rec.transcript_id.as_deref() else {
            continue;
        };

        let tx = match transcripts.entry(tx_id.to_string()) {
            Entry::Occupied(e) => {
                let tx = e.into_mut();
                tx.check_member(&rec.chromosome, rec.strand)?;
                tx
            }
            Entry::Vacant(e) => e.insert(Transcript::new(tx_id, &rec.chromosome, rec.strand)),
        };

        if rec.is_exon() {
            tx.add_exon(rec.block());
        }
    }

    let without_exons = transcripts.values().filter(|t| t.exons().is_empty()).count();
    if without_exons > 0 {
        warn!("{without_exons} transcripts have no exon rows");
    }
    debug!(
        "Built {} transcripts from {} annotation rows",
        transcripts.len(),
        table.len()
    );

    Ok(transcripts)
}

/// Derive the genome-wide splice sites of a set of transcripts.
pub fn derive_splice_sites(transcripts: &BTreeMap<String, Transcript>) -> Result<SpliceSites> {
    let mut introns: Vec<Intron> = Vec::new();
    for tx in transcripts.values() {
        introns.extend(tx.introns()?);
    }
    debug!(
        "Collected {} introns from {} transcripts",
        introns.len(),
        transcripts.len()
    );

    Ok(SpliceSites::from_introns(introns))
}

/// [`build_transcripts`] followed by [`derive_splice_sites`].
pub fn derive_splice_sites_from_table(table: &AnnotationTable) -> Result<SpliceSites> {
    let transcripts = build_transcripts(table)?;
    derive_splice_sites(&transcripts)
}

/// Stable sort by `(chromosome, start)`; ties keep their current order.
pub fn sort_introns(introns: &mut [Intron]) {
    introns.sort_by(|a, b| {
        a.chromosome
            .cmp(&b.chromosome)
            .then_with(|| a.start.cmp(&b.start))
    });
}

/// Drop exact `(chromosome, start, end, strand)` repeats, keeping the first
/// occurrence. Survivors keep their relative order.
pub fn dedup_introns(introns: Vec<Intron>) -> Vec<Intron> {
    let mut seen: HashSet<Intron> = HashSet::with_capacity(introns.len());
    introns
        .into_iter()
        .filter(|i| seen.insert(i.clone()))
        .collect()
}

/// Deduplicated introns sorted by `(chromosome, start)`, with the start-site and
/// end-site views projected from them.
///
/// Row `i` of both views comes from intron `i`. The views are not deduplicated
/// on their own: two introns sharing a start but not an end give two start rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpliceSites {
    introns: Vec<Intron>,
}

impl SpliceSites {
    /// Sort, then deduplicate. The order of the two steps matters: dedup keeps
    /// the first occurrence in sorted order.
    pub fn from_introns(mut introns: Vec<Intron>) -> Self {
        sort_introns(&mut introns);
        let introns = dedup_introns(introns);
        Self { introns }
    }

    pub fn introns(&self) -> &[Intron] {
        &self.introns
    }

    pub fn start_sites(&self) -> Vec<StartSite> {
        self.introns.iter().map(Intron::start_site).collect()
    }

    pub fn end_sites(&self) -> Vec<EndSite> {
        self.introns.iter().map(Intron::end_site).collect()
    }

    pub fn len(&self) -> usize {
        self.introns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.introns.is_empty()
    }
}

/// Summary for logging: total introns, then per chromosome the intron count
/// split by strand.
impl fmt::Display for SpliceSites {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut per_chr: BTreeMap<&str, [usize; 3]> = BTreeMap::new();
        for i in &self.introns {
            let counts = per_chr.entry(i.chromosome.as_str()).or_default();
            match i.strand {
                Strand::Plus => counts[0] += 1,
                Strand::Minus => counts[1] += 1,
                Strand::Unknown => counts[2] += 1,
            }
        }

        writeln!(
            f,
            "SpliceSites: {} unique introns on {} chromosomes",
            self.introns.len(),
            per_chr.len()
        )?;
        for (chr, [plus, minus, unknown]) in per_chr {
            writeln!(
                f,
                "  - {}: introns={}, plus={}, minus={}, unknown={}",
                chr,
                plus + minus + unknown,
                plus,
                minus,
                unknown
            )?;
        }
        Ok(())
    }
}
