use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RodoviaError {
    #[error("I/O error accessing path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("'{0}' holds neither a FeatureCollection nor a Feature")]
    NotFeatureCollection(PathBuf),
    #[error("Invalid render config: {0}")]
    Config(#[from] ron::error::SpannedError),
}

macro_rules! io_err {
    ($path:expr, $err:expr) => {
        $crate::error::RodoviaError::Io {
            path: $path.to_path_buf(),
            source: $err,
        }
    };
}

pub(crate) use io_err;
