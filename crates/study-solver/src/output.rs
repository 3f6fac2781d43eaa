use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use study_core::errors::{ErrorInfo, StudyError};
use study_core::{ResultRecord, SeriesData};

fn wrap_csv(code: &str, path: &Path, err: csv::Error) -> StudyError {
    StudyError::Storage(
        ErrorInfo::new(code, "CSV output failure")
            .with_context("path", path.display().to_string())
            .with_hint(err.to_string()),
    )
}

/// Writes channels column-wise with a header row of labels.
pub fn write_csv(path: &Path, labels: &[String], channels: &[Vec<f64>]) -> Result<(), StudyError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| StudyError::storage("output_mkdir", parent, err))?;
    }
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|err| wrap_csv("output_open", path, err))?;
    writer
        .write_record(labels)
        .map_err(|err| wrap_csv("output_header", path, err))?;
    let samples = channels.first().map(Vec::len).unwrap_or(0);
    let mut row = Vec::with_capacity(channels.len());
    for idx in 0..samples {
        row.clear();
        row.extend(channels.iter().map(|channel| channel[idx].to_string()));
        writer
            .write_record(&row)
            .map_err(|err| wrap_csv("output_row", path, err))?;
    }
    writer
        .flush()
        .map_err(|err| wrap_csv("output_flush", path, err.into()))?;
    Ok(())
}

/// Reads a CSV written by [`write_csv`], returning its header and columns.
pub fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<Vec<f64>>), StudyError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|err| wrap_csv("output_read", path, err))?;
    let labels: Vec<String> = reader
        .headers()
        .map_err(|err| wrap_csv("output_header", path, err))?
        .iter()
        .map(str::to_string)
        .collect();
    let mut columns = vec![Vec::new(); labels.len()];
    for record in reader.records() {
        let record = record.map_err(|err| wrap_csv("output_record", path, err))?;
        for (column, field) in columns.iter_mut().zip(record.iter()) {
            let value = field.parse::<f64>().map_err(|err| {
                StudyError::Storage(
                    ErrorInfo::new("output_parse", err.to_string())
                        .with_context("path", path.display().to_string()),
                )
            })?;
            column.push(value);
        }
    }
    Ok((labels, columns))
}

/// Channels of a record in its label order, reading disk outputs as needed.
pub fn load_channels(record: &ResultRecord) -> Result<Vec<Vec<f64>>, StudyError> {
    match &record.series {
        SeriesData::Memory { channels } => Ok(channels.clone()),
        SeriesData::Disk { path } => {
            let (labels, mut columns) = read_csv(path)?;
            let mut ordered = Vec::with_capacity(record.labels.len());
            for label in &record.labels {
                let idx = labels.iter().position(|l| l == label).ok_or_else(|| {
                    StudyError::Storage(
                        ErrorInfo::new("output_missing_channel", "CSV output lacks a channel")
                            .with_context("path", path.display().to_string())
                            .with_context("label", label.clone()),
                    )
                })?;
                ordered.push(std::mem::take(&mut columns[idx]));
            }
            Ok(ordered)
        }
    }
}
