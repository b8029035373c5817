use std::collections::HashMap;
use std::io::BufRead;

use thiserror::Error;

use crate::types::Strand;

const PREVIEW_CHARS: usize = 120;

/// A single parsed GTF line, before normalization into the annotation table.
///
/// Coordinates:
/// - `start0` is 0-based start
/// - `end0` is 0-based end (half-open)
#[derive(Debug, Clone, PartialEq)]
pub struct GtfRecord {
    pub line_no: usize,
    pub seqname: String,      // chromosome / contig
    pub source: String,       // column 2
    pub feature: String,      // column 3
    pub start0: u32,          // 0-based start
    pub end0: u32,            // 0-based end (half-open)
    pub score: Option<f64>,   // '.' => None
    pub strand: Strand,       // + / - / . / ?
    pub frame: Option<u8>,    // '.' => None, else 0/1/2
    pub attrs: HashMap<String, String>,
    pub line_preview: String,
}

impl GtfRecord {
    /// Convenience: get an attribute value.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(|s| s.as_str())
    }

    /// First non-empty value among `keys`, in preference order.
    pub fn pick_first_attr(&self, keys: &[String]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.attr(k))
            .map(str::trim)
            .find(|v| !v.is_empty())
    }
}

/// Parsing errors for GTF input. Line numbers are 1-based.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("I/O error while reading '{path}': {source}")]
    IoPath {
        path: String,
        source: std::io::Error,
    },

    #[error("line {line_no}: malformed GTF line ({problem}): {line}")]
    MalformedLine {
        line_no: usize,
        problem: String,
        line: String,
    },

    #[error("line {line_no}: bad coordinates: {line}")]
    BadCoordinates { line_no: usize, line: String },

    #[error("line {line_no}: missing required attribute (tried keys {keys:?}): {line}")]
    MissingAttribute {
        line_no: usize,
        keys: Vec<String>,
        line: String,
    },
}

/// Streaming parser for GTF files.
///
/// Most callers want [`crate::annotation::AnnotationLoader`], which turns these
/// records into an [`crate::annotation::AnnotationTable`].
///
/// ```no_run
/// use std::fs::File;
/// use std::io::BufReader;
/// use gtf_splice_sites::annotation::io::AnnotationReader;
///
/// let file = File::open("genes.gtf").unwrap();
/// let rdr = AnnotationReader::new(BufReader::new(file));
/// for rec in rdr.records() {
///     let rec = rec.unwrap();
///     println!("{} {}-{}", rec.seqname, rec.start0, rec.end0);
/// }
/// ```
pub struct AnnotationReader<R: BufRead> {
    reader: R,
    buf: String,
    line_no: usize,
}

impl<R: BufRead> AnnotationReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            line_no: 0,
        }
    }

    /// Returns an iterator over parsed records.
    ///
    /// - Skips blank lines
    /// - Skips comment lines starting with '#'
    pub fn records(mut self) -> impl Iterator<Item = Result<GtfRecord, ParseError>> {
        std::iter::from_fn(move || loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => self.line_no += 1,
                Err(e) => {
                    return Some(Err(ParseError::IoPath {
                        path: "<reader>".to_string(),
                        source: e,
                    }))
                }
            }

            let line = self.buf.trim_end_matches(&['\n', '\r'][..]);
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            return Some(parse_record_line(line, self.line_no));
        })
    }
}

pub(crate) fn preview(line: &str) -> String {
    if line.chars().count() <= PREVIEW_CHARS {
        return line.to_string();
    }
    let mut s: String = line.chars().take(PREVIEW_CHARS).collect();
    s.push_str("...");
    s
}

/// Parse a single non-comment line into a `GtfRecord`.
pub fn parse_record_line(line: &str, line_no: usize) -> Result<GtfRecord, ParseError> {
    let malformed = |problem: &str| ParseError::MalformedLine {
        line_no,
        problem: problem.to_string(),
        line: preview(line),
    };
    let bad_coords = || ParseError::BadCoordinates {
        line_no,
        line: preview(line),
    };

    // seqname source feature start end score strand frame attributes
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() != 9 {
        return Err(malformed(&format!("expected 9 columns, found {}", cols.len())));
    }
    let [seqname, source, feature, start_s, end_s, score_s, strand_s, frame_s, attrs_s] =
        [cols[0], cols[1], cols[2], cols[3], cols[4], cols[5], cols[6], cols[7], cols[8]];

    if seqname.is_empty() {
        return Err(malformed("empty seqname"));
    }

    // 1-based inclusive on disk; convert to 0-based half-open [start-1, end)
    let start_1: u32 = start_s.trim().parse().map_err(|_| bad_coords())?;
    let end_1: u32 = end_s.trim().parse().map_err(|_| bad_coords())?;
    if start_1 == 0 || end_1 < start_1 {
        return Err(bad_coords());
    }

    let score = match score_s {
        "." => None,
        s => Some(s.parse::<f64>().map_err(|_| malformed("bad score"))?),
    };

    let strand = Strand::from_symbol(strand_s).ok_or_else(|| malformed("bad strand"))?;

    let frame = match frame_s {
        "." => None,
        s => match s.parse::<u8>() {
            Ok(p) if p <= 2 => Some(p),
            _ => return Err(malformed("bad frame")),
        },
    };

    Ok(GtfRecord {
        line_no,
        seqname: seqname.to_string(),
        source: source.to_string(),
        feature: feature.to_string(),
        start0: start_1 - 1,
        end0: end_1,
        score,
        strand,
        frame,
        attrs: parse_attributes(attrs_s),
        line_preview: preview(line),
    })
}

/// Parse the GTF attribute column: `key "value"; key2 "value2";`
///
/// A key that occurs more than once keeps all of its values, joined by ','.
pub fn parse_attributes(s: &str) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = HashMap::new();

    for part in split_unquoted(s.trim(), ';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let mut it = part.splitn(2, char::is_whitespace);
        let key = it.next().unwrap_or("").trim();
        let value = unquote(it.next().unwrap_or(""));
        if key.is_empty() || value.is_empty() {
            continue;
        }

        match map.get_mut(key) {
            Some(existing) => {
                existing.push(',');
                existing.push_str(&value);
            }
            None => {
                map.insert(key.to_string(), value);
            }
        }
    }

    map
}

/// Split on `sep`, ignoring separators inside double quotes.
fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut from = 0;
    for (i, c) in s.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == sep && !in_quotes {
            out.push(&s[from..i]);
            from = i + c.len_utf8();
        }
    }
    out.push(&s[from..]);
    out
}

fn unquote(v: &str) -> String {
    let v = v.trim();
    let v = v.strip_prefix('"').unwrap_or(v);
    let v = v.strip_suffix('"').unwrap_or(v);
    v.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_gtf_line() {
        let line = "chr1\tsrc\texon\t101\t150\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\"; exon_number \"1\";";
        let rec = parse_record_line(line, 7).unwrap();

        assert_eq!(rec.line_no, 7);
        assert_eq!(rec.seqname, "chr1");
        assert_eq!(rec.feature, "exon");
        // 101..150 inclusive -> [100,150)
        assert_eq!(rec.start0, 100);
        assert_eq!(rec.end0, 150);
        assert_eq!(rec.strand, Strand::Plus);
        assert_eq!(rec.score, None);
        assert_eq!(rec.frame, None);

        assert_eq!(rec.attr("gene_id"), Some("G1"));
        assert_eq!(rec.attr("transcript_id"), Some("T1"));
        assert_eq!(rec.attr("exon_number"), Some("1"));
    }

    #[test]
    fn duplicate_attributes_are_joined() {
        let attrs = parse_attributes(
            "gene_id \"G1\"; tag \"basic\"; tag \"CCDS\"; note \"a;b\";",
        );
        assert_eq!(attrs.get("tag").map(String::as_str), Some("basic,CCDS"));
        assert_eq!(attrs.get("note").map(String::as_str), Some("a;b"));
        assert_eq!(attrs.len(), 3);
    }

    #[test]
    fn pick_first_attr_prefers_earlier_keys() {
        let line = "chr1\tsrc\tgene\t1\t10\t.\t-\t.\tgene_id \"G1\"; gene \"Alias\";";
        let rec = parse_record_line(line, 1).unwrap();
        let keys = vec!["missing".to_string(), "gene".to_string(), "gene_id".to_string()];
        assert_eq!(rec.pick_first_attr(&keys), Some("Alias"));
        assert_eq!(rec.pick_first_attr(&["nope".to_string()]), None);
    }

    #[test]
    fn bad_lines_are_rejected_with_line_numbers() {
        let short = parse_record_line("chr1\tsrc\texon\t1\t2", 3).unwrap_err();
        assert!(matches!(short, ParseError::MalformedLine { line_no: 3, .. }));

        let zero = parse_record_line("chr1\tsrc\texon\t0\t2\t.\t+\t.\tgene_id \"G\";", 4).unwrap_err();
        assert!(matches!(zero, ParseError::BadCoordinates { line_no: 4, .. }));

        let reversed = parse_record_line("chr1\tsrc\texon\t9\t2\t.\t+\t.\tgene_id \"G\";", 5).unwrap_err();
        assert!(matches!(reversed, ParseError::BadCoordinates { line_no: 5, .. }));

        let strand = parse_record_line("chr1\tsrc\texon\t1\t2\t.\t*\t.\tgene_id \"G\";", 6).unwrap_err();
        assert!(strand.to_string().contains("bad strand"));

        let frame = parse_record_line("chr1\tsrc\tCDS\t1\t2\t.\t+\t3\tgene_id \"G\";", 8).unwrap_err();
        assert!(frame.to_string().contains("line 8"));
    }

    #[test]
    fn single_base_feature_is_valid() {
        let rec = parse_record_line("chr1\tsrc\texon\t5\t5\t.\t+\t0\tgene_id \"G\";", 1).unwrap();
        assert_eq!((rec.start0, rec.end0), (4, 5));
        assert_eq!(rec.frame, Some(0));
    }

    #[test]
    fn streaming_reader_skips_comments_and_blank_lines() {
        let data = "\
#!genome-build test
chr1\tsrc\texon\t1\t2\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";

chr1\tsrc\texon\t3\t4\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
";
        let reader = AnnotationReader::new(Cursor::new(data.as_bytes()));

        let recs: Vec<_> = reader.records().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!((recs[0].start0, recs[0].end0), (0, 2));
        assert_eq!((recs[1].start0, recs[1].end0), (2, 4));
        assert_eq!(recs[0].line_no, 2);
        assert_eq!(recs[1].line_no, 4);
    }

    #[test]
    fn long_lines_are_previewed() {
        let long = "x".repeat(500);
        let p = preview(&long);
        assert_eq!(p.len(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
    }
}
