use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::{debug, info};

use crate::annotation::io::{AnnotationReader, GtfRecord, ParseError};
use crate::annotation::table::{is_reserved_column, AnnotationRecord, AnnotationTable};
use crate::download::{download_to_dir, is_url};

/// Which GTF attributes feed the table's id columns, and which extra attributes
/// become columns of their own.
///
/// For the id columns several keys may be given; the first present on a line wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeKeys {
    pub gene_id_keys: Vec<String>,
    pub transcript_id_keys: Vec<String>,

    /// Appended after the GTF columns, one nullable column per key.
    pub extra_attributes: Vec<String>,

    /// Also keep every other attribute found in the file, sorted by key,
    /// after `extra_attributes`.
    pub all_attributes: bool,
}

impl Default for AttributeKeys {
    fn default() -> Self {
        Self {
            gene_id_keys: vec!["gene_id".into()],
            transcript_id_keys: vec!["transcript_id".into()],
            extra_attributes: Vec::new(),
            all_attributes: false,
        }
    }
}

/// Reads a GTF file (plain, gzipped, or remote) into an [`AnnotationTable`].
///
/// ```
/// use std::io::Cursor;
/// use gtf_splice_sites::AnnotationLoader;
///
/// let gtf = "chr1\tsrc\texon\t101\t150\t.\t+\t.\tgene_id \"G1.3\"; transcript_id \"T1\"; gene_name \"Alpha\";\n";
/// let table = AnnotationLoader::new()
///     .extra_attributes(&["gene_name"])
///     .load_reader(Cursor::new(gtf.as_bytes()))
///     .unwrap();
///
/// let rec = &table.records()[0];
/// assert_eq!((rec.start, rec.end), (100, 150));
/// assert_eq!(rec.gene_id_nopatch, "G1");
/// assert_eq!(rec.extra, vec![Some("Alpha".to_string())]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AnnotationLoader {
    pub keys: AttributeKeys,
}

impl AnnotationLoader {
    /// Start with GTF-safe defaults (`gene_id`, `transcript_id`, no extra columns).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(keys: AttributeKeys) -> Self {
        Self { keys }
    }

    /// Set gene id key(s), in preference order.
    pub fn gene_id_keys(mut self, keys: &[&str]) -> Self {
        self.keys.gene_id_keys = keys.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set transcript id key(s), in preference order.
    pub fn transcript_id_keys(mut self, keys: &[&str]) -> Self {
        self.keys.transcript_id_keys = keys.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn extra_attributes(mut self, keys: &[&str]) -> Self {
        self.keys.extra_attributes = keys.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn all_attributes(mut self, keep: bool) -> Self {
        self.keys.all_attributes = keep;
        self
    }

    /// Load from anything implementing `BufRead`.
    pub fn load_reader<R: BufRead>(&self, reader: R) -> Result<AnnotationTable, ParseError> {
        let records = AnnotationReader::new(reader).records();
        let table = if self.keys.all_attributes {
            self.collect_all_attributes(records)?
        } else {
            let mut table = AnnotationTable::new(self.keys.extra_attributes.clone());
            for rec in records {
                let (mut row, attrs) = self.normalize(rec?)?;
                row.extra = attribute_values(&attrs, table.extra_columns());
                table.push_unchecked(row);
            }
            table
        };

        debug!(
            "Loaded {} annotation rows ({} extra columns)",
            table.len(),
            table.extra_columns().len()
        );
        Ok(table)
    }

    /// Load from a local file. Paths ending in `.gz` are decompressed on the fly.
    pub fn load_path<P: AsRef<Path>>(&self, path: P) -> Result<AnnotationTable, ParseError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ParseError::IoPath {
            path: path.display().to_string(),
            source: e,
        })?;

        let is_gz = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);

        if is_gz {
            self.load_reader(BufReader::new(GzDecoder::new(file)))
        } else {
            self.load_reader(BufReader::new(file))
        }
    }

    /// Load from a local path or a URL.
    ///
    /// URLs are downloaded into a temporary directory that is removed once the
    /// table has been read.
    pub fn load(&self, path_or_url: &str) -> Result<AnnotationTable> {
        let table = if is_url(path_or_url) {
            let dir = tempfile::tempdir().context("create temporary download directory")?;
            let local = download_to_dir(path_or_url, dir.path())
                .with_context(|| format!("download GTF from {path_or_url}"))?;
            self.load_path(&local)
                .with_context(|| format!("read downloaded GTF {}", local.display()))?
        } else {
            self.load_path(path_or_url)
                .with_context(|| format!("read GTF {path_or_url}"))?
        };

        info!("Read {} annotation rows from {}", table.len(), path_or_url);
        Ok(table)
    }

    /// Column set is only known once the whole file has been read, so rows
    /// keep their attributes until then.
    fn collect_all_attributes(
        &self,
        records: impl Iterator<Item = Result<GtfRecord, ParseError>>,
    ) -> Result<AnnotationTable, ParseError> {
        let mut rows = Vec::new();
        let mut discovered: BTreeSet<String> = BTreeSet::new();

        for rec in records {
            let (row, attrs) = self.normalize(rec?)?;
            discovered.extend(attrs.keys().cloned());
            rows.push((row, attrs));
        }

        let mut columns = self.keys.extra_attributes.clone();
        columns.extend(
            discovered
                .into_iter()
                .filter(|k| !is_reserved_column(k) && !self.keys.extra_attributes.contains(k)),
        );

        let mut table = AnnotationTable::new(columns);
        for (mut row, attrs) in rows {
            row.extra = attribute_values(&attrs, table.extra_columns());
            table.push_unchecked(row);
        }
        Ok(table)
    }

    fn normalize(
        &self,
        mut rec: GtfRecord,
    ) -> Result<(AnnotationRecord, HashMap<String, String>), ParseError> {
        let gene_id = rec
            .pick_first_attr(&self.keys.gene_id_keys)
            .ok_or_else(|| ParseError::MissingAttribute {
                line_no: rec.line_no,
                keys: self.keys.gene_id_keys.clone(),
                line: rec.line_preview.clone(),
            })?
            .to_string();
        let transcript_id = rec
            .pick_first_attr(&self.keys.transcript_id_keys)
            .map(str::to_string);

        let attrs = std::mem::take(&mut rec.attrs);

        let mut out = AnnotationRecord::new(
            rec.seqname,
            rec.start0,
            rec.end0,
            rec.strand,
            rec.feature,
            gene_id,
            transcript_id,
        );
        out.source = Some(rec.source).filter(|s| s != ".");
        out.score = rec.score;
        out.frame = rec.frame;
        Ok((out, attrs))
    }
}

fn attribute_values(attrs: &HashMap<String, String>, columns: &[String]) -> Vec<Option<String>> {
    columns.iter().map(|k| attrs.get(k).cloned()).collect()
}

/// Load a GTF path or URL with the default attribute keys.
pub fn load_annotations(path_or_url: &str) -> Result<AnnotationTable> {
    AnnotationLoader::new().load(path_or_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Strand;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    const EXAMPLE_GTF: &str = "\
chr1\tFOO\tgene\t12100\t21316\t.\t+\t.\tgene_id \"GENE00000000001.1\";
chr1\tFOO\ttranscript\t12100\t18244\t.\t+\t.\tgene_id \"GENE00000000001.1\"; transcript_id \"TRANS00000000001.2\";
chr1\tFOO\texon\t12100\t14148\t.\t+\t.\tgene_id \"GENE00000000001.1\"; transcript_id \"TRANS00000000001.2\";
chr1\tFOO\texon\t16196\t17220\t.\t+\t.\tgene_id \"GENE00000000001.1\"; transcript_id \"TRANS00000000001.2\";
";

    #[test]
    fn loads_example_gtf_into_normalized_rows() {
        let table = AnnotationLoader::new()
            .load_reader(Cursor::new(EXAMPLE_GTF.as_bytes()))
            .unwrap();

        assert_eq!(table.len(), 4);
        let starts: Vec<u32> = table.records().iter().map(|r| r.start).collect();
        let ends: Vec<u32> = table.records().iter().map(|r| r.end).collect();
        let features: Vec<&str> = table.records().iter().map(|r| r.feature.as_str()).collect();
        assert_eq!(starts, vec![12099, 12099, 12099, 16195]);
        assert_eq!(ends, vec![21316, 18244, 14148, 17220]);
        assert_eq!(features, vec!["gene", "transcript", "exon", "exon"]);

        let tx: Vec<Option<&str>> = table
            .records()
            .iter()
            .map(|r| r.transcript_id.as_deref())
            .collect();
        assert_eq!(
            tx,
            vec![
                None,
                Some("TRANS00000000001.2"),
                Some("TRANS00000000001.2"),
                Some("TRANS00000000001.2")
            ]
        );

        for rec in table.records() {
            assert_eq!(rec.chromosome, "chr1");
            assert_eq!(rec.strand, Strand::Plus);
            assert_eq!(rec.gene_id, "GENE00000000001.1");
            assert_eq!(rec.gene_id_nopatch, "GENE00000000001");
            assert!(rec.extra.is_empty());
            assert_eq!(rec.source.as_deref(), Some("FOO"));
        }
    }

    #[test]
    fn custom_keys_and_extra_attributes() {
        let gtf = "\
chr2\tsrc\texon\t5\t20\t.\t-\t.\tgene \"G9\"; transcript \"tx1\"; gene_name \"Nice\"; tag \"a\"; tag \"b\";
";
        let table = AnnotationLoader::new()
            .gene_id_keys(&["gene_id", "gene"])
            .transcript_id_keys(&["transcript"])
            .extra_attributes(&["gene_name", "tag", "level"])
            .load_reader(Cursor::new(gtf.as_bytes()))
            .unwrap();

        let rec = &table.records()[0];
        assert_eq!(rec.gene_id, "G9");
        assert_eq!(rec.transcript_id.as_deref(), Some("tx1"));
        assert_eq!(rec.strand, Strand::Minus);
        assert_eq!(
            rec.extra,
            vec![Some("Nice".to_string()), Some("a,b".to_string()), None]
        );
        assert_eq!(table.extra_columns(), &["gene_name", "tag", "level"]);
    }

    #[test]
    fn source_score_and_frame_are_kept() {
        let gtf = "\
chr1\tHAVANA\tCDS\t101\t150\t0.5\t+\t2\tgene_id \"G1\"; transcript_id \"T1\";
chr1\t.\texon\t101\t150\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
";
        let table = AnnotationLoader::new()
            .load_reader(Cursor::new(gtf.as_bytes()))
            .unwrap();

        let cds = &table.records()[0];
        assert_eq!(cds.source.as_deref(), Some("HAVANA"));
        assert_eq!(cds.score, Some(0.5));
        assert_eq!(cds.frame, Some(2));

        let exon = &table.records()[1];
        assert_eq!((exon.source.as_deref(), exon.score, exon.frame), (None, None, None));
    }

    #[test]
    fn all_attributes_become_columns() {
        let gtf = "\
chr1\tsrc\tgene\t1\t500\t.\t+\t.\tgene_id \"G1\"; gene_type \"lncRNA\"; gene_name \"Alpha\";
chr1\tsrc\texon\t1\t100\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\"; tag \"basic\"; tag \"CCDS\"; exon_number \"1\";
";
        let table = AnnotationLoader::new()
            .extra_attributes(&["gene_name"])
            .all_attributes(true)
            .load_reader(Cursor::new(gtf.as_bytes()))
            .unwrap();

        // requested keys first, then the rest sorted; id keys stay in their fixed columns
        assert_eq!(
            table.extra_columns(),
            &["gene_name", "exon_number", "gene_type", "tag"]
        );
        assert_eq!(
            table.records()[0].extra,
            vec![Some("Alpha".into()), None, Some("lncRNA".into()), None]
        );
        assert_eq!(
            table.records()[1].extra,
            vec![None, Some("1".into()), None, Some("basic,CCDS".into())]
        );
        assert_eq!(table.records()[1].transcript_id.as_deref(), Some("T1"));
    }

    #[test]
    fn missing_gene_id_is_an_error() {
        let gtf = "chr1\tsrc\texon\t1\t10\t.\t+\t.\ttranscript_id \"T1\";\n";
        let err = AnnotationLoader::new()
            .load_reader(Cursor::new(gtf.as_bytes()))
            .unwrap_err();
        assert!(matches!(err, ParseError::MissingAttribute { line_no: 1, .. }));
    }

    #[test]
    fn loads_plain_and_gzipped_files() {
        let dir = tempfile::tempdir().unwrap();

        let plain = dir.path().join("genes.gtf");
        std::fs::write(&plain, EXAMPLE_GTF).unwrap();

        let gz = dir.path().join("genes.gtf.gz");
        let mut enc = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        enc.write_all(EXAMPLE_GTF.as_bytes()).unwrap();
        enc.finish().unwrap();

        let a = load_annotations(plain.to_str().unwrap()).unwrap();
        let b = load_annotations(gz.to_str().unwrap()).unwrap();
        assert_eq!(a.len(), 4);
        assert_eq!(a, b);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_annotations("/nonexistent/genes.gtf").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/genes.gtf"));
    }

    #[test]
    fn ftp_source_is_an_unsupported_download() {
        let err = load_annotations("ftp://ftp.ensembl.org/pub/release-112/gtf/genes.gtf.gz")
            .unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("download GTF from ftp://"), "{msg}");
        assert!(msg.contains("only http and https"), "{msg}");
    }
}
