// src/ingest/config.rs
use serde::{Deserialize, Serialize};

use crate::ingest::providers::FeedFormat;
use crate::ingest::types::EventKind;

/// One configured upstream: which parser to use and where to get the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub format: FeedFormat,
    pub url: String,
}

impl Endpoint {
    pub fn new(format: FeedFormat, url: impl Into<String>) -> Self {
        Self {
            format,
            url: url.into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.format.kind()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CulturalSources {
    #[serde(default)]
    pub json: Option<String>,
    #[serde(default)]
    pub xml: Option<String>,
    #[serde(default)]
    pub csv: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitySources {
    #[serde(default)]
    pub xml: Option<String>,
}

/// `[sources]` section: endpoint URLs per category and format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub cultural: CulturalSources,
    #[serde(default)]
    pub city: CitySources,
}

impl SourcesConfig {
    /// Configured endpoints in fetch order: cultural JSON, XML, CSV, then city.
    /// Blank URLs count as unset.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        [
            (FeedFormat::CulturalJson, &self.cultural.json),
            (FeedFormat::CulturalXml, &self.cultural.xml),
            (FeedFormat::CulturalCsv, &self.cultural.csv),
            (FeedFormat::CityXml, &self.city.xml),
        ]
        .into_iter()
        .filter_map(|(format, url)| {
            url.as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(|u| Endpoint::new(format, u))
        })
        .collect()
    }
}
