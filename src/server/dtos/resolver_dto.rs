use serde::{Deserialize, Serialize};

/// these mirror the metadata api's /servers and /watch responses. only the fields the relay reads
/// are typed, everything else rides along in `extra` so /fetch-stream can hand it back untouched

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerDescriptor {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl ServerDescriptor {
    /// what to send as `server` when the name gets rejected, none when it would be the same call
    pub fn fallback_identifier(&self) -> Option<&str> {
        self.id
            .as_deref()
            .filter(|id| !id.is_empty() && *id != self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceVariant {
    pub url: String,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(rename = "isM3U8", default, skip_serializing_if = "Option::is_none")]
    pub is_m3u8: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamSources {
    #[serde(default)]
    pub sources: Vec<SourceVariant>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StreamSources {
    /// the "auto" variant if there is one, otherwise whatever came first. order is whatever the
    /// api felt like sending, nothing is sorted
    pub fn select_variant(&self) -> Option<&SourceVariant> {
        self.sources
            .iter()
            .find(|variant| {
                variant
                    .quality
                    .as_deref()
                    .is_some_and(|quality| quality.eq_ignore_ascii_case("auto"))
            })
            .or_else(|| self.sources.first())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "episodeId")]
    pub episode_id: Option<String>,
    #[serde(rename = "mediaId")]
    pub media_id: Option<String>,
}
