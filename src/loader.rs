use crate::error::{RodoviaError, io_err};
use crate::record::RawRecord;
use csv::{ReaderBuilder, Trim};
use geojson::{FeatureCollection, GeoJson};
use std::path::Path;
use tracing::info;

/// `;` when the header line has more semicolons than commas, as Brazilian
/// spreadsheet exports do.
pub fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons > commas { b';' } else { b',' }
}

pub fn records_from_str(text: &str) -> Result<Vec<RawRecord>, RodoviaError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut rdr = ReaderBuilder::new()
        .delimiter(detect_delimiter(text))
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = rdr.headers()?.clone();
    let mut records = Vec::new();

    for result in rdr.records() {
        let row = result?;
        if row.iter().all(|field| field.is_empty()) {
            continue;
        }
        records.push(headers.iter().zip(row.iter()).collect::<RawRecord>());
    }

    Ok(records)
}

/// Reads a delimited sheet. Bytes that are not UTF-8 are replaced rather
/// than failing the whole file.
pub fn read_records(path: &Path) -> Result<Vec<RawRecord>, RodoviaError> {
    let bytes = std::fs::read(path).map_err(|e| io_err!(path, e))?;
    let records = records_from_str(&String::from_utf8_lossy(&bytes))?;
    info!("Read {} rows from {}", records.len(), path.display());
    Ok(records)
}

/// Parses GeoJSON text, a lone Feature is wrapped into a collection.
pub fn network_from_str(text: &str, path: &Path) -> Result<FeatureCollection, RodoviaError> {
    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => Ok(collection),
        GeoJson::Feature(feature) => Ok(FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        }),
        GeoJson::Geometry(_) => Err(RodoviaError::NotFeatureCollection(path.to_path_buf())),
    }
}

pub fn read_network(path: &Path) -> Result<FeatureCollection, RodoviaError> {
    let text = std::fs::read_to_string(path).map_err(|e| io_err!(path, e))?;
    network_from_str(&text, path)
}

pub fn write_feature_collection(
    path: &Path,
    collection: &FeatureCollection,
) -> Result<(), RodoviaError> {
    std::fs::write(path, collection.to_string()).map_err(|e| io_err!(path, e))
}
