//! Image URL composition for TMDB relative paths.

use serde::{Deserialize, Serialize};

/// Returned when an item has no image.
pub const PLACEHOLDER_IMAGE: &str = "/placeholder-image.jpg";

/// Size token understood by the TMDB image CDN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSize {
    W185,
    W342,
    W500,
    W1280,
    Original,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::W185 => "w185",
            ImageSize::W342 => "w342",
            ImageSize::W500 => "w500",
            ImageSize::W1280 => "w1280",
            ImageSize::Original => "original",
        }
    }
}

/// Joins relative image paths with the configured CDN base.
#[derive(Debug, Clone)]
pub struct ImageUrls {
    base_url: String,
}

impl ImageUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `<base>/<size><path>`, or the placeholder when there is no path.
    pub fn url(&self, path: Option<&str>, size: ImageSize) -> String {
        match path.filter(|p| !p.is_empty()) {
            Some(p) if p.starts_with('/') => format!("{}/{}{}", self.base_url, size.as_str(), p),
            Some(p) => format!("{}/{}/{}", self.base_url, size.as_str(), p),
            None => PLACEHOLDER_IMAGE.to_string(),
        }
    }

    pub fn poster(&self, path: Option<&str>) -> String {
        self.url(path, ImageSize::W500)
    }

    pub fn backdrop(&self, path: Option<&str>) -> String {
        self.url(path, ImageSize::W1280)
    }

    pub fn profile(&self, path: Option<&str>) -> String {
        self.url(path, ImageSize::W185)
    }
}
