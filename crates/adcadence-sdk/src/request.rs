// ── Request-level configuration ──
//
// Per-request targeting options and the process-wide request
// configuration applied once at SDK initialization.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Kind of ad object to create.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AdFormat {
    AppOpen,
    Interstitial,
    Native,
    Banner,
}

impl AdFormat {
    /// Full-screen formats go through the show/close cycle; inline
    /// formats (native, banner) only load and render.
    pub fn is_full_screen(self) -> bool {
        matches!(self, Self::AppOpen | Self::Interstitial)
    }
}

/// Options attached to every ad request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdRequestOptions {
    /// Serve only non-personalized ads.
    pub request_non_personalized_ads_only: bool,
    /// Contextual keywords passed to the ad server.
    pub keywords: Vec<String>,
}

impl Default for AdRequestOptions {
    fn default() -> Self {
        Self {
            request_non_personalized_ads_only: true,
            keywords: Vec::new(),
        }
    }
}

impl AdRequestOptions {
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

/// Maximum content rating of ads the SDK may serve.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[strum(ascii_case_insensitive)]
pub enum MaxAdContentRating {
    G,
    #[default]
    PG,
    T,
    MA,
}

/// Process-wide request configuration, applied at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestConfiguration {
    pub max_ad_content_rating: MaxAdContentRating,
    pub tag_for_child_directed_treatment: bool,
    pub tag_for_under_age_of_consent: bool,
    /// Devices that always receive test creatives.
    pub test_device_identifiers: Vec<String>,
}

impl Default for RequestConfiguration {
    fn default() -> Self {
        Self {
            max_ad_content_rating: MaxAdContentRating::PG,
            tag_for_child_directed_treatment: true,
            tag_for_under_age_of_consent: true,
            test_device_identifiers: vec!["EMULATOR".into()],
        }
    }
}
