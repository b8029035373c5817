use crate::error::SchemaError;
use crate::types::{RefBlock, Strand};

pub const CHROMOSOME: &str = "Chromosome";
pub const START: &str = "Start";
pub const END: &str = "End";
pub const STRAND: &str = "Strand";
pub const FEATURE: &str = "Feature";
pub const GENE_ID: &str = "gene_id";
pub const TRANSCRIPT_ID: &str = "transcript_id";
pub const GENE_ID_NOPATCH: &str = "gene_id_nopatch";

/// Fixed leading columns of every annotation table, in order.
pub const FIXED_COLUMNS: [&str; 8] = [
    CHROMOSOME,
    START,
    END,
    STRAND,
    FEATURE,
    GENE_ID,
    TRANSCRIPT_ID,
    GENE_ID_NOPATCH,
];

pub const SOURCE: &str = "Source";
pub const SCORE: &str = "Score";
pub const FRAME: &str = "Frame";

/// Nullable GTF columns that follow the fixed columns, in order.
pub const GTF_COLUMNS: [&str; 3] = [SOURCE, SCORE, FRAME];

pub const EXON_FEATURE: &str = "exon";

/// True for the names of the fixed and GTF columns; attribute columns may not reuse them.
pub fn is_reserved_column(name: &str) -> bool {
    FIXED_COLUMNS.contains(&name) || GTF_COLUMNS.contains(&name)
}

/// One normalized annotation row (gene, transcript, exon, ...).
///
/// Coordinates are 0-based, half-open. `transcript_id` is `None` for gene-level rows.
/// `source`, `score` and `frame` are `None` where the GTF has `.`.
/// `extra` holds the optional attribute columns, aligned with
/// [`AnnotationTable::extra_columns`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    pub chromosome: String,
    pub start: u32,
    pub end: u32,
    pub strand: Strand,
    pub feature: String,
    pub gene_id: String,
    pub transcript_id: Option<String>,
    pub gene_id_nopatch: String,
    pub source: Option<String>,
    pub score: Option<f64>,
    pub frame: Option<u8>,
    pub extra: Vec<Option<String>>,
}

impl AnnotationRecord {
    /// Build a record, deriving `gene_id_nopatch` from `gene_id`.
    pub fn new(
        chromosome: impl Into<String>,
        start: u32,
        end: u32,
        strand: Strand,
        feature: impl Into<String>,
        gene_id: impl Into<String>,
        transcript_id: Option<String>,
    ) -> Self {
        let gene_id = gene_id.into();
        let gene_id_nopatch = strip_version(&gene_id).to_string();
        Self {
            chromosome: chromosome.into(),
            start,
            end,
            strand,
            feature: feature.into(),
            gene_id,
            transcript_id,
            gene_id_nopatch,
            source: None,
            score: None,
            frame: None,
            extra: Vec::new(),
        }
    }

    #[inline]
    pub fn is_exon(&self) -> bool {
        self.feature == EXON_FEATURE
    }

    /// The record's span. Only valid once the table passed [`AnnotationTable::validate`].
    #[inline]
    pub fn block(&self) -> RefBlock {
        RefBlock {
            start: self.start,
            end: self.end,
        }
    }
}

/// Drop the version suffix: `ENSG00000223972.5` -> `ENSG00000223972`.
pub fn strip_version(gene_id: &str) -> &str {
    gene_id.split('.').next().unwrap_or(gene_id)
}

/// Annotation rows in file order, plus the names of any extra attribute columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationTable {
    extra_columns: Vec<String>,
    records: Vec<AnnotationRecord>,
}

impl AnnotationTable {
    pub fn new(extra_columns: Vec<String>) -> Self {
        Self {
            extra_columns,
            records: Vec::new(),
        }
    }

    /// Build a table without extra columns from ready-made records.
    pub fn from_records(records: Vec<AnnotationRecord>) -> Result<Self, SchemaError> {
        let mut table = Self::default();
        for rec in records {
            table.push(rec)?;
        }
        Ok(table)
    }

    /// Append a row. Its `extra` values must line up with the declared extra columns.
    pub fn push(&mut self, record: AnnotationRecord) -> Result<(), SchemaError> {
        if record.extra.len() != self.extra_columns.len() {
            return Err(SchemaError::RowWidth {
                row: self.records.len(),
                expected: self.extra_columns.len(),
                found: record.extra.len(),
            });
        }
        self.records.push(record);
        Ok(())
    }

    pub(crate) fn push_unchecked(&mut self, record: AnnotationRecord) {
        debug_assert_eq!(record.extra.len(), self.extra_columns.len());
        self.records.push(record);
    }

    pub fn records(&self) -> &[AnnotationRecord] {
        &self.records
    }

    pub fn extra_columns(&self) -> &[String] {
        &self.extra_columns
    }

    /// All column names: fixed columns, then GTF columns, then extra attribute columns.
    pub fn column_names(&self) -> Vec<&str> {
        FIXED_COLUMNS
            .iter()
            .chain(GTF_COLUMNS.iter())
            .copied()
            .chain(self.extra_columns.iter().map(String::as_str))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every row must span a non-empty interval.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (row, rec) in self.records.iter().enumerate() {
            if rec.start >= rec.end {
                return Err(SchemaError::InvalidInterval {
                    row,
                    chromosome: rec.chromosome.clone(),
                    start: rec.start,
                    end: rec.end,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nopatch_strips_first_version_suffix() {
        assert_eq!(strip_version("GENE00000000001.1"), "GENE00000000001");
        assert_eq!(strip_version("ENSG00000223972.5_PAR_Y"), "ENSG00000223972");
        assert_eq!(strip_version("plain"), "plain");

        let rec = AnnotationRecord::new("chr1", 0, 10, Strand::Plus, "gene", "G.2", None);
        assert_eq!(rec.gene_id_nopatch, "G");
        assert!(!rec.is_exon());
    }

    #[test]
    fn push_checks_extra_width() {
        let mut table = AnnotationTable::new(vec!["gene_name".to_string()]);
        let mut rec = AnnotationRecord::new("chr1", 0, 10, Strand::Plus, "exon", "G", Some("T".into()));
        let err = table.push(rec.clone()).unwrap_err();
        assert!(matches!(err, SchemaError::RowWidth { row: 0, expected: 1, found: 0 }));

        rec.extra = vec![Some("Alpha".into())];
        table.push(rec).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.column_names(),
            vec![
                "Chromosome", "Start", "End", "Strand", "Feature", "gene_id", "transcript_id",
                "gene_id_nopatch", "Source", "Score", "Frame", "gene_name"
            ]
        );
    }

    #[test]
    fn reserved_column_names() {
        assert!(is_reserved_column("gene_id"));
        assert!(is_reserved_column("Score"));
        assert!(!is_reserved_column("gene_name"));
        assert!(!is_reserved_column("score"));
    }

    #[test]
    fn validate_rejects_empty_intervals() {
        let ok = AnnotationRecord::new("chr1", 0, 10, Strand::Plus, "exon", "G", Some("T".into()));
        let bad = AnnotationRecord::new("chr2", 10, 10, Strand::Plus, "exon", "G", Some("T".into()));
        let table = AnnotationTable::from_records(vec![ok, bad]).unwrap();

        match table.validate() {
            Err(SchemaError::InvalidInterval { row, chromosome, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(chromosome, "chr2");
            }
            other => panic!("expected InvalidInterval, got {other:?}"),
        }
    }
}
