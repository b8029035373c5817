//! Columnar persistence for annotation and splice site tables.
//!
//! Files ending in `.feather` or `.arrow` are written as Arrow IPC files
//! (Feather v2); files ending in `.parquet` as Parquet. Coordinates are stored
//! as `Int64` and strings as `Utf8`, so the files read back unchanged in
//! dataframe libraries.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use log::debug;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use crate::annotation::table::{
    is_reserved_column, AnnotationRecord, AnnotationTable, CHROMOSOME, END, FEATURE,
    FIXED_COLUMNS, FRAME, GENE_ID, GENE_ID_NOPATCH, SCORE, SOURCE, START, STRAND, TRANSCRIPT_ID,
};
use crate::error::{Error, Result, SchemaError};
use crate::model::types::{EndSite, StartSite};
use crate::splice::SpliceSites;
use crate::types::Strand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Feather,
    Parquet,
}

impl TableFormat {
    /// Pick the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("feather") | Some("arrow") => Ok(TableFormat::Feather),
            Some("parquet") => Ok(TableFormat::Parquet),
            _ => Err(Error::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            TableFormat::Feather => "feather",
            TableFormat::Parquet => "parquet",
        }
    }
}

/// Output paths for the two splice site tables: `<base>_starts.<ext>` and
/// `<base>_ends.<ext>`.
///
/// A trailing `.feather` or `.parquet` (any case) on `base` is replaced; any other base
/// keeps its full name and gets `.feather`.
pub fn splice_site_paths(base: &Path) -> (PathBuf, PathBuf) {
    let (stem, ext) = match TableFormat::from_path(base) {
        Ok(format)
            if base
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(format.extension())) =>
        {
            (base.with_extension(""), format.extension())
        }
        _ => (base.to_path_buf(), TableFormat::Feather.extension()),
    };

    let with_suffix = |suffix: &str| {
        let mut s = stem.clone().into_os_string();
        s.push(format!("_{suffix}.{ext}"));
        PathBuf::from(s)
    };
    (with_suffix("starts"), with_suffix("ends"))
}

// ---------------------------------------------------------------------------
// Schemas
// ---------------------------------------------------------------------------

fn annotation_schema(extra_columns: &[String]) -> Schema {
    let mut fields = vec![
        Field::new(CHROMOSOME, DataType::Utf8, false),
        Field::new(START, DataType::Int64, false),
        Field::new(END, DataType::Int64, false),
        Field::new(STRAND, DataType::Utf8, false),
        Field::new(FEATURE, DataType::Utf8, false),
        Field::new(GENE_ID, DataType::Utf8, false),
        Field::new(TRANSCRIPT_ID, DataType::Utf8, true),
        Field::new(GENE_ID_NOPATCH, DataType::Utf8, false),
        Field::new(SOURCE, DataType::Utf8, true),
        Field::new(SCORE, DataType::Float64, true),
        Field::new(FRAME, DataType::Int64, true),
    ];
    fields.extend(
        extra_columns
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true)),
    );
    Schema::new(fields)
}

fn start_site_schema() -> Schema {
    Schema::new(vec![
        Field::new(CHROMOSOME, DataType::Utf8, false),
        Field::new(START, DataType::Int64, false),
        Field::new(STRAND, DataType::Utf8, false),
    ])
}

fn end_site_schema() -> Schema {
    Schema::new(vec![
        Field::new(CHROMOSOME, DataType::Utf8, false),
        Field::new(END, DataType::Int64, false),
        Field::new(STRAND, DataType::Utf8, false),
    ])
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn write_batch(path: &Path, schema: SchemaRef, columns: Vec<ArrayRef>) -> Result<()> {
    let format = TableFormat::from_path(path)?;
    let batch = RecordBatch::try_new(schema.clone(), columns)?;
    let file = File::create(path).map_err(|e| Error::io_at(path, e))?;

    match format {
        TableFormat::Feather => {
            let mut writer = FileWriter::try_new(file, &schema)?;
            writer.write(&batch)?;
            writer.finish()?;
        }
        TableFormat::Parquet => {
            let mut writer = ArrowWriter::try_new(file, schema, None)?;
            writer.write(&batch)?;
            writer.close()?;
        }
    }

    debug!("Wrote {} rows to {}", batch.num_rows(), path.display());
    Ok(())
}

/// Write the annotation table with its fixed columns followed by any extra columns.
pub fn write_annotation_table(table: &AnnotationTable, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let schema = Arc::new(annotation_schema(table.extra_columns()));
    let rows = table.records();

    let chroms: Vec<&str> = rows.iter().map(|r| r.chromosome.as_str()).collect();
    let starts: Vec<i64> = rows.iter().map(|r| i64::from(r.start)).collect();
    let ends: Vec<i64> = rows.iter().map(|r| i64::from(r.end)).collect();
    let strands: Vec<&str> = rows.iter().map(|r| r.strand.as_str()).collect();
    let features: Vec<&str> = rows.iter().map(|r| r.feature.as_str()).collect();
    let gene_ids: Vec<&str> = rows.iter().map(|r| r.gene_id.as_str()).collect();
    let tx_ids: Vec<Option<&str>> = rows.iter().map(|r| r.transcript_id.as_deref()).collect();
    let nopatch: Vec<&str> = rows.iter().map(|r| r.gene_id_nopatch.as_str()).collect();
    let sources: Vec<Option<&str>> = rows.iter().map(|r| r.source.as_deref()).collect();
    let scores: Vec<Option<f64>> = rows.iter().map(|r| r.score).collect();
    let frames: Vec<Option<i64>> = rows.iter().map(|r| r.frame.map(i64::from)).collect();

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(chroms)),
        Arc::new(Int64Array::from(starts)),
        Arc::new(Int64Array::from(ends)),
        Arc::new(StringArray::from(strands)),
        Arc::new(StringArray::from(features)),
        Arc::new(StringArray::from(gene_ids)),
        Arc::new(StringArray::from(tx_ids)),
        Arc::new(StringArray::from(nopatch)),
        Arc::new(StringArray::from(sources)),
        Arc::new(Float64Array::from(scores)),
        Arc::new(Int64Array::from(frames)),
    ];
    for idx in 0..table.extra_columns().len() {
        let values: Vec<Option<&str>> = rows.iter().map(|r| r.extra[idx].as_deref()).collect();
        columns.push(Arc::new(StringArray::from(values)));
    }

    write_batch(path, schema, columns)
}

pub fn write_start_sites(sites: &[StartSite], path: impl AsRef<Path>) -> Result<()> {
    let chroms: Vec<&str> = sites.iter().map(|s| s.chromosome.as_str()).collect();
    let starts: Vec<i64> = sites.iter().map(|s| i64::from(s.start)).collect();
    let strands: Vec<&str> = sites.iter().map(|s| s.strand.as_str()).collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(chroms)),
        Arc::new(Int64Array::from(starts)),
        Arc::new(StringArray::from(strands)),
    ];
    write_batch(path.as_ref(), Arc::new(start_site_schema()), columns)
}

pub fn write_end_sites(sites: &[EndSite], path: impl AsRef<Path>) -> Result<()> {
    let chroms: Vec<&str> = sites.iter().map(|s| s.chromosome.as_str()).collect();
    let ends: Vec<i64> = sites.iter().map(|s| i64::from(s.end)).collect();
    let strands: Vec<&str> = sites.iter().map(|s| s.strand.as_str()).collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(chroms)),
        Arc::new(Int64Array::from(ends)),
        Arc::new(StringArray::from(strands)),
    ];
    write_batch(path.as_ref(), Arc::new(end_site_schema()), columns)
}

/// Write both splice site views next to `base` (see [`splice_site_paths`]).
/// Returns the start-site and end-site paths.
pub fn write_splice_sites(sites: &SpliceSites, base: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
    let (starts_path, ends_path) = splice_site_paths(base.as_ref());
    write_start_sites(&sites.start_sites(), &starts_path)?;
    write_end_sites(&sites.end_sites(), &ends_path)?;
    Ok((starts_path, ends_path))
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

fn read_batches(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let format = TableFormat::from_path(path)?;
    let file = File::open(path).map_err(|e| Error::io_at(path, e))?;

    match format {
        TableFormat::Feather => {
            let reader = FileReader::try_new(file, None)?;
            let schema = reader.schema();
            let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((schema, batches))
        }
        TableFormat::Parquet => {
            let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
            let schema = builder.schema().clone();
            let batches = builder
                .build()?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((schema, batches))
        }
    }
}

/// Column types the reader accepts. Anything else is a schema error rather
/// than a lossy cast.
#[derive(Debug, Clone, Copy)]
enum ColumnKind {
    Integer,
    Float,
    Text,
}

impl ColumnKind {
    fn target(self) -> DataType {
        match self {
            ColumnKind::Integer => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Text => DataType::Utf8,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ColumnKind::Integer => "an integer type (Int8..Int64, UInt8..UInt32)",
            ColumnKind::Float => "a floating point type",
            ColumnKind::Text => "Utf8, LargeUtf8 or a Utf8 dictionary",
        }
    }

    fn accepts(self, data_type: &DataType) -> bool {
        use DataType::*;
        match self {
            ColumnKind::Integer => matches!(
                data_type,
                Int8 | Int16 | Int32 | Int64 | UInt8 | UInt16 | UInt32
            ),
            ColumnKind::Float => matches!(data_type, Float16 | Float32 | Float64),
            ColumnKind::Text => match data_type {
                Utf8 | LargeUtf8 => true,
                Dictionary(_, values) => matches!(values.as_ref(), Utf8 | LargeUtf8),
                _ => false,
            },
        }
    }
}

fn column_as(batch: &RecordBatch, name: &str, kind: ColumnKind) -> Result<ArrayRef> {
    let col = batch
        .column_by_name(name)
        .ok_or_else(|| SchemaError::MissingColumn {
            column: name.to_string(),
        })?;
    if !kind.accepts(col.data_type()) {
        return Err(SchemaError::ColumnType {
            column: name.to_string(),
            expected: kind.describe(),
            found: col.data_type().to_string(),
        }
        .into());
    }
    let target = kind.target();
    if col.data_type() == &target {
        return Ok(col.clone());
    }
    Ok(cast(col, &target)?)
}

fn downcast<T: Array + Clone + 'static>(arr: &ArrayRef, name: &str, kind: ColumnKind) -> Result<T> {
    arr.as_any().downcast_ref::<T>().cloned().ok_or_else(|| {
        SchemaError::ColumnType {
            column: name.to_string(),
            expected: kind.describe(),
            found: arr.data_type().to_string(),
        }
        .into()
    })
}

fn strings(batch: &RecordBatch, name: &str) -> Result<StringArray> {
    let arr = column_as(batch, name, ColumnKind::Text)?;
    downcast(&arr, name, ColumnKind::Text)
}

fn integers(batch: &RecordBatch, name: &str) -> Result<Int64Array> {
    let arr = column_as(batch, name, ColumnKind::Integer)?;
    downcast(&arr, name, ColumnKind::Integer)
}

fn floats(batch: &RecordBatch, name: &str) -> Result<Float64Array> {
    let arr = column_as(batch, name, ColumnKind::Float)?;
    downcast(&arr, name, ColumnKind::Float)
}

/// Source, Score and Frame are optional on read so tables without them still load.
fn optional_column<T>(
    batch: &RecordBatch,
    name: &str,
    read: impl Fn(&RecordBatch, &str) -> Result<T>,
) -> Result<Option<T>> {
    if batch.column_by_name(name).is_none() {
        return Ok(None);
    }
    read(batch, name).map(Some)
}

fn required_str<'a>(col: &'a StringArray, name: &str, i: usize, row: usize) -> Result<&'a str> {
    if col.is_null(i) {
        return Err(SchemaError::NullValue {
            column: name.to_string(),
            row,
        }
        .into());
    }
    Ok(col.value(i))
}

fn optional_str(col: &StringArray, i: usize) -> Option<String> {
    (!col.is_null(i)).then(|| col.value(i).to_string())
}

fn frame(col: &Int64Array, i: usize, row: usize) -> Result<Option<u8>> {
    if col.is_null(i) {
        return Ok(None);
    }
    let value = col.value(i);
    match u8::try_from(value) {
        Ok(f) if f <= 2 => Ok(Some(f)),
        _ => Err(SchemaError::InvalidFrame { row, value }.into()),
    }
}

fn coordinate(col: &Int64Array, name: &str, i: usize, row: usize) -> Result<u32> {
    if col.is_null(i) {
        return Err(SchemaError::NullValue {
            column: name.to_string(),
            row,
        }
        .into());
    }
    let value = col.value(i);
    u32::try_from(value).map_err(|_| {
        SchemaError::CoordinateRange {
            column: name.to_string(),
            row,
            value,
        }
        .into()
    })
}

/// Read an annotation table written by [`write_annotation_table`] (or by a
/// dataframe library using the same column names).
///
/// All fixed columns must be present; `Source`, `Score` and `Frame` may be
/// missing. Any other column is kept as an extra attribute column and must
/// hold strings.
pub fn read_annotation_table(path: impl AsRef<Path>) -> Result<AnnotationTable> {
    let path = path.as_ref();
    let (schema, batches) = read_batches(path)?;

    for column in FIXED_COLUMNS {
        if schema.column_with_name(column).is_none() {
            return Err(SchemaError::MissingColumn {
                column: column.to_string(),
            }
            .into());
        }
    }
    let extra_columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .filter(|name| !is_reserved_column(name))
        .collect();

    let mut table = AnnotationTable::new(extra_columns.clone());
    let mut row = 0usize;

    for batch in &batches {
        let chroms = strings(batch, CHROMOSOME)?;
        let starts = integers(batch, START)?;
        let ends = integers(batch, END)?;
        let strands = strings(batch, STRAND)?;
        let features = strings(batch, FEATURE)?;
        let gene_ids = strings(batch, GENE_ID)?;
        let tx_ids = strings(batch, TRANSCRIPT_ID)?;
        let nopatch = strings(batch, GENE_ID_NOPATCH)?;
        let sources = optional_column(batch, SOURCE, strings)?;
        let scores = optional_column(batch, SCORE, floats)?;
        let frames = optional_column(batch, FRAME, integers)?;
        let extras = extra_columns
            .iter()
            .map(|name| strings(batch, name))
            .collect::<Result<Vec<_>>>()?;

        for i in 0..batch.num_rows() {
            let strand_s = required_str(&strands, STRAND, i, row)?;
            let strand = Strand::from_symbol(strand_s).ok_or_else(|| SchemaError::InvalidStrand {
                column: STRAND.to_string(),
                row,
                value: strand_s.to_string(),
            })?;

            let record = AnnotationRecord {
                chromosome: required_str(&chroms, CHROMOSOME, i, row)?.to_string(),
                start: coordinate(&starts, START, i, row)?,
                end: coordinate(&ends, END, i, row)?,
                strand,
                feature: required_str(&features, FEATURE, i, row)?.to_string(),
                gene_id: required_str(&gene_ids, GENE_ID, i, row)?.to_string(),
                transcript_id: optional_str(&tx_ids, i),
                gene_id_nopatch: required_str(&nopatch, GENE_ID_NOPATCH, i, row)?.to_string(),
                source: sources.as_ref().and_then(|col| optional_str(col, i)),
                score: scores
                    .as_ref()
                    .and_then(|col| (!col.is_null(i)).then(|| col.value(i))),
                frame: match &frames {
                    Some(col) => frame(col, i, row)?,
                    None => None,
                },
                extra: extras.iter().map(|col| optional_str(col, i)).collect(),
            };
            table.push(record)?;
            row += 1;
        }
    }

    debug!("Read {} rows from {}", table.len(), path.display());
    Ok(table)
}
