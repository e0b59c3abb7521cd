use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::{fs, time::Instant};

use anyhow::{anyhow, bail, Result};
use log::*;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ctr_analyzer::AnalysisResult;

/// Canonical column layout of a search performance export. The header row of
/// the input is discarded; only its column count is checked.
pub const EXPECTED_COLUMNS: [&str; 6] =
    ["Category", "Term", "Impressions", "Clicks", "Position", "CTR"];

/// One query term from the export, with the CTR kept as a fraction in [0, 1].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QueryRow {
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Term")]
    pub term: String,
    #[serde(rename = "Impressions")]
    pub impressions: u64,
    #[serde(rename = "Clicks")]
    pub clicks: u64,
    #[serde(rename = "Position")]
    pub position: f64,
    #[serde(rename = "CTR")]
    pub ctr: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatasetInfo {
    pub path: String,
    pub row_count: usize,
}

/// Holds the one dataset of the interactive session. Nothing is persisted;
/// a new upload replaces the previous dataset wholesale.
#[derive(Default)]
pub struct SearchDataManager {
    dataset: Option<Vec<QueryRow>>,
    source_path: Option<PathBuf>,
}

impl SearchDataManager {
    pub fn new() -> Self {
        SearchDataManager::default()
    }

    /// Load a CSV export from disk, replacing any previously loaded dataset.
    /// Returns the number of data rows.
    pub fn load_csv(&mut self, path: &Path) -> Result<usize> {
        let start = Instant::now();

        let bytes = fs::read(path)
            .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
        let text = decode_bytes(&bytes);
        let rows = parse_csv_text(&text)?;

        info!(
            "Loaded {} rows from {} in {:.2}s",
            rows.len(),
            path.display(),
            start.elapsed().as_secs_f64()
        );

        let row_count = rows.len();
        self.dataset = Some(rows);
        self.source_path = Some(path.to_path_buf());
        Ok(row_count)
    }

    pub fn rows(&self) -> Option<&[QueryRow]> {
        self.dataset.as_deref()
    }

    pub fn info(&self) -> Option<DatasetInfo> {
        match (&self.dataset, &self.source_path) {
            (Some(rows), Some(path)) => Some(DatasetInfo {
                path: path.to_string_lossy().into_owned(),
                row_count: rows.len(),
            }),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.dataset = None;
        self.source_path = None;
        info!("Dataset cleared");
    }

    /// Write both aggregate tables to a date-stamped CSV in `dir`, with a
    /// UTF-8 BOM so spreadsheet tools pick the right encoding.
    pub fn export_report(&self, dir: &Path, result: &AnalysisResult) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .map_err(|e| anyhow!("Failed to create report directory: {}", e))?;

        let date_str = chrono::Local::now().format("%Y-%m-%d").to_string();
        let report_path = dir.join(format!("ctr_report_{}.csv", date_str));

        let mut df = report_dataframe(result)
            .map_err(|e| anyhow!("Failed to build report table: {}", e))?;

        let mut file = fs::File::create(&report_path)
            .map_err(|e| anyhow!("Failed to create report file: {}", e))?;
        file.write_all(&[0xEF, 0xBB, 0xBF])
            .map_err(|e| anyhow!("Failed to write BOM: {}", e))?;
        CsvWriter::new(file)
            .finish(&mut df)
            .map_err(|e| anyhow!("Failed to write report CSV: {}", e))?;

        info!("Report written to {}", report_path.display());
        Ok(report_path)
    }
}

/// Decode raw file bytes with BOM sniffing. Search console exports show up
/// as UTF-8 (with or without BOM) and occasionally UTF-16 from Windows
/// tooling; encoding_rs handles all three from the UTF-8 entry point.
pub fn decode_bytes(bytes: &[u8]) -> String {
    let (text, encoding, had_errors) = encoding_rs::UTF_8.decode(bytes);
    if had_errors {
        warn!("Input contained malformed {} sequences; replaced", encoding.name());
    }
    if encoding != encoding_rs::UTF_8 {
        info!("Decoded input as {}", encoding.name());
    }
    text.into_owned()
}

/// Parse decoded CSV text into typed rows. The column layout is positional:
/// the header row is consumed and ignored, but a column-count mismatch fails
/// loudly instead of silently misaligning fields.
pub fn parse_csv_text(text: &str) -> Result<Vec<QueryRow>> {
    let mut header_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());
    let headers = header_reader
        .headers()
        .map_err(|e| anyhow!("Failed to read CSV header row: {}", e))?;
    if headers.len() != EXPECTED_COLUMNS.len() {
        bail!(
            "CSV column layout mismatch: expected {} columns ({}), found {}",
            EXPECTED_COLUMNS.len(),
            EXPECTED_COLUMNS.join(", "),
            headers.len()
        );
    }

    let mut df = CsvReader::new(Cursor::new(text.as_bytes().to_vec()))
        .has_header(true)
        .with_ignore_errors(true)
        .finish()
        .map_err(|e| anyhow!("Failed to parse CSV: {}", e))?;

    // Header names are untrusted; rebind columns by position.
    df.set_column_names(&EXPECTED_COLUMNS)
        .map_err(|e| anyhow!("Failed to normalize column names: {}", e))?;

    let df = df
        .lazy()
        .with_columns([
            col("Category").cast(DataType::String),
            col("Term").cast(DataType::String),
            col("Impressions").cast(DataType::Int64),
            col("Clicks").cast(DataType::Int64),
            col("Position").cast(DataType::Float64),
            col("CTR").cast(DataType::Float64),
        ])
        .collect()
        .map_err(|e| anyhow!("Failed to normalize column types: {}", e))?;

    dataframe_to_rows(&df)
}

/// Walk the frame column-wise and materialize typed rows. Unparseable
/// numeric cells came through as nulls and default to zero.
fn dataframe_to_rows(df: &DataFrame) -> Result<Vec<QueryRow>> {
    let category_col = df.column("Category")?.str()?;
    let term_col = df.column("Term")?.str()?;
    let impressions_col = df.column("Impressions")?.i64()?;
    let clicks_col = df.column("Clicks")?.i64()?;
    let position_col = df.column("Position")?.f64()?;
    let ctr_col = df.column("CTR")?.f64()?;

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        rows.push(QueryRow {
            category: category_col.get(i).unwrap_or("").to_string(),
            term: term_col.get(i).unwrap_or("").to_string(),
            impressions: impressions_col.get(i).unwrap_or(0).max(0) as u64,
            clicks: clicks_col.get(i).unwrap_or(0).max(0) as u64,
            position: position_col.get(i).unwrap_or(0.0),
            ctr: ctr_col.get(i).unwrap_or(0.0),
        });
    }
    Ok(rows)
}

/// Flatten both classifications' aggregates into one labeled table.
fn report_dataframe(result: &AnalysisResult) -> PolarsResult<DataFrame> {
    let mut segments: Vec<String> = Vec::new();
    let mut positions: Vec<u32> = Vec::new();
    let mut avg_ctrs: Vec<f64> = Vec::new();
    let mut num_terms: Vec<u64> = Vec::new();
    let mut total_impressions: Vec<u64> = Vec::new();
    let mut total_clicks: Vec<u64> = Vec::new();

    for (label, report) in [
        ("Branded", &result.branded),
        ("Non-Branded", &result.non_branded),
    ] {
        for aggregate in &report.aggregates {
            segments.push(label.to_string());
            positions.push(aggregate.position);
            avg_ctrs.push(aggregate.avg_ctr * 100.0);
            num_terms.push(aggregate.num_terms as u64);
            total_impressions.push(aggregate.total_impressions);
            total_clicks.push(aggregate.total_clicks);
        }
    }

    DataFrame::new(vec![
        Series::new("Segment", segments),
        Series::new("Position", positions),
        Series::new("avg_CTR (%)", avg_ctrs),
        Series::new("num_terms", num_terms),
        Series::new("total_impressions", total_impressions),
        Series::new("total_clicks", total_clicks),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Category,Term,Impressions,Clicks,Position,CTR
shoes,nike air max,1200,240,1.4,0.2
shoes,running shoes,800,40,3.6,0.05
apparel,nike hoodie,150,3,7.2,0.02
";

    #[test]
    fn test_parse_typed_rows() {
        let rows = parse_csv_text(SAMPLE).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].category, "shoes");
        assert_eq!(rows[0].term, "nike air max");
        assert_eq!(rows[0].impressions, 1200);
        assert_eq!(rows[0].clicks, 240);
        assert!((rows[0].position - 1.4).abs() < 1e-12);
        assert!((rows[0].ctr - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_header_names_are_discarded() {
        // The export's actual header wording varies; only the position of
        // each column matters.
        let text = "\
categoria,consulta,impresiones,clics,posicion,ctr
shoes,nike air,100,10,2.0,0.1
";
        let rows = parse_csv_text(text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].term, "nike air");
        assert_eq!(rows[0].impressions, 100);
    }

    #[test]
    fn test_column_count_mismatch_fails_loudly() {
        let text = "Category,Term,Impressions\nshoes,nike,100\n";
        let err = parse_csv_text(text).unwrap_err();
        assert!(err.to_string().contains("expected 6"));
        assert!(err.to_string().contains("found 3"));
    }

    #[test]
    fn test_malformed_numeric_defaults_to_zero() {
        let text = "\
Category,Term,Impressions,Clicks,Position,CTR
shoes,nike air,not-a-number,10,2.0,0.1
shoes,nike sb,500,25,1.0,0.05
";
        let rows = parse_csv_text(text).unwrap();
        assert_eq!(rows[0].impressions, 0);
        assert_eq!(rows[1].impressions, 500);
    }

    #[test]
    fn test_decode_strips_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(SAMPLE.as_bytes());
        let text = decode_bytes(&bytes);
        assert!(text.starts_with("Category"));
        let rows = parse_csv_text(&text).unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_decode_handles_utf16le_export() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "Category,Term,Impressions,Clicks,Position,CTR\nshoes,nike,100,10,2.0,0.1\n"
            .encode_utf16()
        {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let text = decode_bytes(&bytes);
        let rows = parse_csv_text(&text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].term, "nike");
    }

    #[test]
    fn test_manager_load_and_clear() {
        let dir = std::env::temp_dir().join("ctr_analyzer_test_load");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("export.csv");
        fs::write(&path, SAMPLE).unwrap();

        let mut manager = SearchDataManager::new();
        let count = manager.load_csv(&path).unwrap();
        assert_eq!(count, 3);

        let info = manager.info().unwrap();
        assert_eq!(info.row_count, 3);
        assert!(info.path.ends_with("export.csv"));

        manager.clear();
        assert!(manager.rows().is_none());
        assert!(manager.info().is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_export_report_writes_bom_and_rows() {
        use crate::ctr_analyzer::{analyze, AnalysisInput};

        let rows = parse_csv_text(SAMPLE).unwrap();
        let result = analyze(&rows, &AnalysisInput::new("nike".to_string(), 0));

        let dir = std::env::temp_dir().join("ctr_analyzer_test_export");
        let manager = SearchDataManager::new();
        let report_path = manager.export_report(&dir, &result).unwrap();

        let bytes = fs::read(&report_path).unwrap();
        assert_eq!(&bytes[..3], &[0xEF, 0xBB, 0xBF]);
        let text = String::from_utf8_lossy(&bytes[3..]).into_owned();
        assert!(text.lines().next().unwrap().starts_with("Segment,Position"));
        assert!(text.contains("Branded"));
        assert!(text.contains("Non-Branded"));

        let _ = fs::remove_dir_all(&dir);
    }
}
