use crate::error::{RodoviaError, io_err};
use crate::sampler::SamplerConfig;
use crate::vector_network::ExtractorConfig;
use std::path::Path;

/// Where unresolvable requests are drawn so they stay visible and apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceholderConfig {
    pub origin_lat: f64,
    pub origin_lng: f64,
    /// Shift applied per request index.
    pub lat_step: f64,
    pub lng_step: f64,
    /// Second point relative to the first.
    pub offset_lat: f64,
    pub offset_lng: f64,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            origin_lat: -23.5,
            origin_lng: -46.6,
            lat_step: -0.15,
            lng_step: 0.2,
            offset_lat: -0.05,
            offset_lng: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub sampler: SamplerConfig,
    pub extractor: ExtractorConfig,
    pub placeholder: PlaceholderConfig,
    /// Opacity written on every rendered path.
    pub path_opacity: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            extractor: ExtractorConfig::default(),
            placeholder: PlaceholderConfig::default(),
            path_opacity: 0.8,
        }
    }
}

impl RenderConfig {
    pub fn from_ron_str(text: &str) -> Result<Self, RodoviaError> {
        Ok(ron::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, RodoviaError> {
        let text = std::fs::read_to_string(path).map_err(|e| io_err!(path, e))?;
        Self::from_ron_str(&text)
    }
}
