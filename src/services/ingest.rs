use bytes::Bytes;
use calamine::{open_workbook_from_rs, Data, Reader, Xls, Xlsx};
use chrono::{Duration, NaiveDate, Timelike};
use polars::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use crate::error::AppError;
use crate::services::columns::round_to;
use crate::services::store::{StoredTable, TableStore};

const PREVIEW_EDGE_ROWS: usize = 5;
const NULL_TOKENS: [&str; 9] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None", "#N/A"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Xlsx,
    Xls,
}

impl FileKind {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_lowercase();
        if lower.ends_with(".csv") {
            Some(FileKind::Csv)
        } else if lower.ends_with(".xlsx") {
            Some(FileKind::Xlsx)
        } else if lower.ends_with(".xls") {
            Some(FileKind::Xls)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Csv => "CSV",
            FileKind::Xlsx | FileKind::Xls => "Excel",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadSummary {
    pub file_id: String,
    pub filename: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub preview: Vec<Vec<Value>>,
    pub dtypes: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct SampleFile {
    pub filename: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub file_type: String,
}

/// Parse an uploaded file, store it, and describe it for the client.
pub fn ingest(store: &TableStore, file_data: Bytes, filename: &str) -> Result<UploadSummary, AppError> {
    let start = std::time::Instant::now();
    let kind = FileKind::from_filename(filename)
        .ok_or_else(|| AppError::InvalidInput("Only CSV and Excel files are supported".to_string()))?;

    tracing::info!("Parsing {} ({}KB) as {}", filename, file_data.len() / 1024, kind.label());
    let df = parse_table(file_data, kind)?;

    if df.height() == 0 {
        return Err(AppError::InvalidInput("File is empty".to_string()));
    }
    if df.width() == 0 {
        return Err(AppError::InvalidInput("File has no columns".to_string()));
    }

    let preview = build_preview(&df)?;
    let dtypes = df
        .get_columns()
        .iter()
        .map(|s| (s.name().to_string(), s.dtype().to_string()))
        .collect();

    let table = StoredTable::new(df, filename);
    let rows = table.rows;
    let columns = table.columns.clone();
    let file_id = store.insert(table);

    tracing::info!("File loaded: {} ({}) in {:?}", filename, file_id, start.elapsed());

    Ok(UploadSummary {
        file_id,
        filename: filename.to_string(),
        rows,
        columns,
        preview,
        dtypes,
    })
}

pub fn parse_table(file_data: Bytes, kind: FileKind) -> Result<DataFrame, AppError> {
    match kind {
        FileKind::Csv => read_csv(file_data),
        FileKind::Xlsx => {
            let rows = read_first_sheet::<Xlsx<_>>(file_data)?;
            rows_to_dataframe(&rows)
        }
        FileKind::Xls => {
            let rows = read_first_sheet::<Xls<_>>(file_data)?;
            rows_to_dataframe(&rows)
        }
    }
}

fn read_csv(file_data: Bytes) -> Result<DataFrame, AppError> {
    let null_values = NullValues::AllColumns(NULL_TOKENS.iter().map(|t| t.to_string()).collect());

    CsvReader::new(Cursor::new(file_data))
        .has_header(true)
        .infer_schema(None)
        .with_null_values(Some(null_values))
        .finish()
        .map_err(|e| AppError::FileProcessingError(format!("Error processing file: {}", e)))
}

fn read_first_sheet<R>(file_data: Bytes) -> Result<Vec<Vec<Data>>, AppError>
where
    R: Reader<Cursor<Bytes>>,
    R::Error: std::fmt::Display,
{
    let mut workbook: R = open_workbook_from_rs(Cursor::new(file_data)).map_err(|e| {
        tracing::error!("Failed to open Excel file: {}", e);
        AppError::FileProcessingError(format!("Error processing file: {}", e))
    })?;

    let sheet_names = workbook.sheet_names().to_vec();
    tracing::debug!("Found {} sheets: {:?}", sheet_names.len(), sheet_names);

    let first = sheet_names
        .first()
        .ok_or_else(|| AppError::FileProcessingError("No sheets found in workbook".to_string()))?;

    let range = workbook
        .worksheet_range(first)
        .map_err(|e| AppError::FileProcessingError(format!("Failed to read worksheet {}: {}", first, e)))?;

    Ok(range
        .rows()
        .filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|row| row.to_vec())
        .collect())
}

/// Header naming as pandas does it: blanks become `Unnamed: <i>`, repeats get
/// a `.n` suffix.
pub fn column_name(raw: &str, idx: usize, existing_names: &mut HashSet<String>) -> String {
    let trimmed = raw.trim();
    let base = if trimmed.is_empty() {
        format!("Unnamed: {}", idx)
    } else {
        trimmed.to_string()
    };

    let mut name = base.clone();
    let mut counter = 1;
    while !existing_names.insert(name.clone()) {
        name = format!("{}.{}", base, counter);
        counter += 1;
    }
    name
}

fn rows_to_dataframe(rows: &[Vec<Data>]) -> Result<DataFrame, AppError> {
    let Some(header_row) = rows.first() else {
        return Err(AppError::InvalidInput("File is empty".to_string()));
    };

    let mut existing_names = HashSet::new();
    let headers: Vec<String> = header_row
        .iter()
        .enumerate()
        .map(|(idx, cell)| column_name(&cell.to_string(), idx, &mut existing_names))
        .collect();

    let empty = Data::Empty;
    let columns = headers
        .iter()
        .enumerate()
        .map(|(col_idx, header)| {
            let values: Vec<&Data> = rows
                .iter()
                .skip(1)
                .map(|row| row.get(col_idx).unwrap_or(&empty))
                .collect();
            cells_to_series(header, &values)
        })
        .collect::<Vec<_>>();

    DataFrame::new(columns)
        .map_err(|e| AppError::FileProcessingError(format!("Error processing file: {}", e)))
}

fn cells_to_series(name: &str, values: &[&Data]) -> Series {
    let present: Vec<&Data> = values.iter().copied().filter(|v| !is_blank(v)).collect();

    let all_numeric = present.iter().all(|v| matches!(v, Data::Int(_) | Data::Float(_)));
    let all_integral = present.iter().all(|v| match v {
        Data::Int(_) => true,
        Data::Float(f) => f.fract() == 0.0 && f.abs() < 9.0e15,
        _ => false,
    });
    let all_bool = present.iter().all(|v| matches!(v, Data::Bool(_)));

    if present.is_empty() {
        let strings: Vec<Option<String>> = vec![None; values.len()];
        return Series::new(name, strings);
    }

    if all_integral {
        let ints: Vec<Option<i64>> = values
            .iter()
            .map(|v| match v {
                Data::Int(i) => Some(*i),
                Data::Float(f) => Some(*f as i64),
                _ => None,
            })
            .collect();
        Series::new(name, ints)
    } else if all_numeric {
        let nums: Vec<Option<f64>> = values
            .iter()
            .map(|v| match v {
                Data::Int(i) => Some(*i as f64),
                Data::Float(f) if f.is_finite() => Some(*f),
                _ => None,
            })
            .collect();
        Series::new(name, nums)
    } else if all_bool {
        let bools: Vec<Option<bool>> = values
            .iter()
            .map(|v| match v {
                Data::Bool(b) => Some(*b),
                _ => None,
            })
            .collect();
        Series::new(name, bools)
    } else {
        let strings: Vec<Option<String>> = values.iter().map(|v| cell_text(v)).collect();
        Series::new(name, strings)
    }
}

fn is_blank(value: &Data) -> bool {
    match value {
        Data::Empty | Data::Error(_) => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn cell_text(value: &Data) -> Option<String> {
    if is_blank(value) {
        return None;
    }
    match value {
        Data::String(s) => Some(s.clone()),
        Data::Bool(b) => Some(if *b { "True".to_string() } else { "False".to_string() }),
        Data::DateTime(d) => excel_serial_to_string(d.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Excel stores timestamps as days since 1899-12-30.
pub fn excel_serial_to_string(serial: f64) -> Option<String> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    let datetime = epoch.checked_add_signed(Duration::milliseconds(millis))?;
    if datetime.time().num_seconds_from_midnight() == 0 {
        Some(datetime.format("%Y-%m-%d").to_string())
    } else {
        Some(datetime.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

/// All rows for small tables, otherwise the first and last five in file order.
pub fn preview_row_indices(height: usize) -> Vec<usize> {
    if height <= PREVIEW_EDGE_ROWS * 2 {
        (0..height).collect()
    } else {
        (0..PREVIEW_EDGE_ROWS)
            .chain(height - PREVIEW_EDGE_ROWS..height)
            .collect()
    }
}

pub fn build_preview(df: &DataFrame) -> Result<Vec<Vec<Value>>, AppError> {
    preview_row_indices(df.height())
        .into_iter()
        .map(|row_idx| {
            df.get_columns()
                .iter()
                .map(|series| Ok(preview_cell(series.get(row_idx)?)))
                .collect::<Result<Vec<_>, AppError>>()
        })
        .collect()
}

fn preview_cell(value: AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Float64(v) => float_cell(v),
        AnyValue::Float32(v) => float_cell(v as f64),
        AnyValue::Int8(v) => json!(v),
        AnyValue::Int16(v) => json!(v),
        AnyValue::Int32(v) => json!(v),
        AnyValue::Int64(v) => json!(v),
        AnyValue::UInt8(v) => json!(v),
        AnyValue::UInt16(v) => json!(v),
        AnyValue::UInt32(v) => json!(v),
        AnyValue::UInt64(v) => json!(v),
        AnyValue::Boolean(v) => json!(v),
        AnyValue::String(v) => json!(v),
        other => json!(other.to_string()),
    }
}

fn float_cell(v: f64) -> Value {
    if v.is_finite() {
        json!(round_to(v, 4))
    } else {
        Value::Null
    }
}

pub fn list_sample_files(sample_dir: &Path) -> Result<Vec<SampleFile>, AppError> {
    if !sample_dir.exists() {
        return Ok(Vec::new());
    }

    let mut samples = Vec::new();
    for entry in std::fs::read_dir(sample_dir)? {
        let entry = entry?;
        let filename = entry.file_name().to_string_lossy().to_string();
        if let Some(kind) = FileKind::from_filename(&filename) {
            samples.push(SampleFile {
                size: entry.metadata()?.len(),
                file_type: kind.label().to_string(),
                filename,
            });
        }
    }
    samples.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(samples)
}

/// Resolve a sample filename inside `sample_dir`, refusing anything that
/// escapes it.
pub fn resolve_sample_path(sample_dir: &Path, filename: &str) -> Result<PathBuf, AppError> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
    {
        return Err(AppError::InvalidInput("Invalid filename".to_string()));
    }

    let path = sample_dir.join(filename);
    if !path.exists() {
        return Err(AppError::NotFound("Sample file not found".to_string()));
    }

    let root = sample_dir.canonicalize()?;
    let resolved = path.canonicalize()?;
    if !resolved.starts_with(&root) {
        return Err(AppError::InvalidInput("Invalid filename".to_string()));
    }

    if FileKind::from_filename(filename).is_none() {
        return Err(AppError::InvalidInput("Invalid file type".to_string()));
    }

    Ok(resolved)
}
