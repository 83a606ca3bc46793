// Data structures shared by the analytics core, the backend routes and the client
// e.g. Listing, AiAnalysis, StatisticsSummary, FilterCriteria, ProgressEvent

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// One scraped marketplace listing (a bicycle)
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Listing {
    pub title: String,
    #[serde(default)]
    pub price: Option<f64>, // None or 0.0 means "unknown"
    #[serde(default)]
    pub url: String, // External reference, not enforced unique
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    // Technical parameters lifted from the listing's parameter table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derailleur_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brake_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wheel_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bike_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_size_desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gears: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension: Option<String>,

    // Raw parameter table keyed by the marketplace's own labels ("Marka", "Stan", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, String>>,

    // Present only after enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<AiAnalysis>,

    // Anything else the scraper wrote; kept so listings round-trip untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Listing {
    // Price with "unknown" folded to 0.0, the way the filter and binner compare it
    pub fn price_or_zero(&self) -> f64 {
        self.price.filter(|p| !p.is_nan()).unwrap_or(0.0)
    }

    // Price only when it is a usable (truthy) number
    pub fn known_price(&self) -> Option<f64> {
        self.price.filter(|p| *p != 0.0 && !p.is_nan())
    }
}

// Either the analysis payload or the `{ "error": ... }` marker the enricher writes instead
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Analyzed<T> {
    Failed { error: String },
    Ready(T),
}

impl<T> Analyzed<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Analyzed::Ready(value) => Some(value),
            Analyzed::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct AiAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>, // Whole analysis failed (e.g. no description)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_details: Option<Analyzed<ParsedDetails>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Analyzed<Category>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Analyzed<ValueReport>>,
}

impl AiAnalysis {
    pub fn failed(reason: impl Into<String>) -> Self {
        AiAnalysis {
            error: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn details(&self) -> Option<&ParsedDetails> {
        self.parsed_details.as_ref().and_then(Analyzed::ready)
    }

    pub fn assessment(&self) -> Option<ValueAssessment> {
        self.value
            .as_ref()
            .and_then(Analyzed::ready)
            .and_then(|v| v.value_analysis.as_ref())
            .and_then(|v| v.value_assessment.as_deref())
            .and_then(ValueAssessment::parse)
    }
}

// Model replies are loosely typed: any field may be null, sizes come back as 28 or "28",
// lists as null or a bare string. These readers fold all of that into the typed shape.

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        serde_json::Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(de::Error::custom(format!("expected text, got {}", other))),
    }
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        serde_json::Value::String(s) => Ok(vec![s]),
        serde_json::Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect()),
        other => Err(de::Error::custom(format!("expected a list, got {}", other))),
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => Ok(n.as_f64()),
        // "4 500", "4500 zł"
        serde_json::Value::String(s) => {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
            Ok(digits.parse().ok())
        }
        other => Err(de::Error::custom(format!("expected a number, got {}", other))),
    }
}

// Structured re-extraction of the free-text description
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ParsedDetails {
    #[serde(default, deserialize_with = "lenient_text")]
    pub bicycle_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub brand: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub frame_size: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub frame_material: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub wheel_size: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub groupset: Option<String>,
    #[serde(default)]
    pub year: Option<serde_json::Value>, // LLMs return both 2021 and "2021"
    #[serde(default, deserialize_with = "lenient_text")]
    pub condition: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub accessories: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Category {
    #[serde(default, deserialize_with = "lenient_text")]
    pub primary_category: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub subcategory: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub intended_use: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub price_category: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ValueReport {
    #[serde(default)]
    pub value_analysis: Option<ValueAnalysis>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub selling_points: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub concerns: Vec<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub overall_recommendation: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ValueAnalysis {
    #[serde(default)]
    pub estimated_value_range: Option<ValueRange>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub value_assessment: Option<String>, // Kept raw; see ValueAssessment::parse
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ValueRange {
    #[serde(default, deserialize_with = "lenient_number")]
    pub low: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub high: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub currency: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ValueAssessment {
    Fair,
    Overpriced,
    Underpriced,
}

impl ValueAssessment {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "fair" => Some(ValueAssessment::Fair),
            "overpriced" => Some(ValueAssessment::Overpriced),
            "underpriced" => Some(ValueAssessment::Underpriced),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueAssessment::Fair => "fair",
            ValueAssessment::Overpriced => "overpriced",
            ValueAssessment::Underpriced => "underpriced",
        }
    }
}

// --- Statistics summary (pre-aggregated by the backend) ---

pub type Tally = IndexMap<String, u64>;
pub type PriceTable = IndexMap<String, f64>;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct StatisticsSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_stats: Option<PriceStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_listings: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identified_brands: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identified_sizes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identified_bike_types: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identified_condition: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_counts: Option<Tally>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_counts: Option<Tally>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bicycle_type_counts: Option<Tally>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_price_by_type: Option<PriceTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_price_by_brand: Option<PriceTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_material_counts: Option<Tally>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wheel_size_counts: Option<Tally>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_counts: Option<Tally>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_vs_new: Option<UsedVsNew>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_assessment_counts: Option<Tally>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_counts: Option<Tally>, // Chronological, already ordered by the producer
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct PriceStats {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct UsedVsNew {
    #[serde(default)]
    pub new: u64,
    #[serde(default)]
    pub used: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_price_new: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_price_used: Option<f64>,
}

// --- View criteria ---

// Active filter selection. Empty / unset fields mean "no constraint"
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub price_min: Option<f64>,
    #[serde(default)]
    pub price_max: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SortCriteria {
    pub field: String,
    pub direction: SortDirection,
}

impl Default for SortCriteria {
    fn default() -> Self {
        SortCriteria {
            field: "price".to_string(),
            direction: SortDirection::Asc,
        }
    }
}

impl SortCriteria {
    // Column-header click: same field flips direction, a new field starts ascending.
    // This state belongs to whoever renders the view, not to the sort engine.
    pub fn toggle(&mut self, field: &str) {
        if self.field == field {
            self.direction = self.direction.flipped();
        } else {
            self.field = field.to_string();
            self.direction = SortDirection::Asc;
        }
    }
}

// --- Enrichment progress ---

// One message on the progress push channel
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub current: u64,
    pub total: u64,
    pub status: String,
}

impl ProgressEvent {
    pub fn new(current: u64, total: u64, status: impl Into<String>) -> Self {
        ProgressEvent {
            current,
            total,
            status: status.into(),
        }
    }
}

// What the presentation layer shows while an enrichment run is in flight
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub percentage: u8, // 0..=100
    pub status: String,
    pub done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listing_keeps_unknown_fields() {
        let raw = json!({
            "title": "Trek Checkpoint",
            "price": 5400.0,
            "url": "https://olx.pl/a",
            "views": 12
        });
        let listing: Listing = serde_json::from_value(raw).unwrap();
        assert_eq!(listing.extra.get("views"), Some(&json!(12)));

        let back = serde_json::to_value(&listing).unwrap();
        assert_eq!(back["views"], json!(12));
        assert_eq!(back["price"], json!(5400.0));
    }

    #[test]
    fn analysis_sections_accept_error_markers() {
        let raw = json!({
            "parsed_details": { "bicycle_type": "gravel", "brand": "Kross" },
            "category": { "error": "Could not categorize due to parsing error" },
            "value": {
                "value_analysis": { "value_assessment": "Overpriced" },
                "selling_points": ["carbon fork"]
            }
        });
        let analysis: AiAnalysis = serde_json::from_value(raw).unwrap();
        assert_eq!(analysis.details().unwrap().brand.as_deref(), Some("Kross"));
        assert!(matches!(analysis.category, Some(Analyzed::Failed { .. })));
        assert_eq!(analysis.assessment(), Some(ValueAssessment::Overpriced));
    }

    #[test]
    fn loosely_typed_model_replies_still_parse() {
        let details: ParsedDetails = serde_json::from_value(json!({
            "bicycle_type": "gravel",
            "frame_size": 56,
            "wheel_size": 28,
            "groupset": null,
            "year": "2021",
            "accessories": null
        }))
        .unwrap();
        assert_eq!(details.frame_size.as_deref(), Some("56"));
        assert_eq!(details.wheel_size.as_deref(), Some("28"));
        assert_eq!(details.groupset, None);
        assert!(details.accessories.is_empty());

        let report: ValueReport = serde_json::from_value(json!({
            "value_analysis": {
                "estimated_value_range": { "low": null, "high": "5 200", "currency": "PLN" },
                "value_assessment": "fair"
            },
            "selling_points": "new tyres",
            "concerns": null,
            "overall_recommendation": null
        }))
        .unwrap();
        let range = report.value_analysis.as_ref().unwrap().estimated_value_range.as_ref().unwrap();
        assert_eq!(range.low, None);
        assert_eq!(range.high, Some(5200.0));
        assert_eq!(report.selling_points, vec!["new tyres".to_string()]);
        assert!(report.concerns.is_empty());
    }

    #[test]
    fn stored_listing_with_null_analysis_fields_loads() {
        let raw = json!({
            "title": "Merida Silex",
            "ai_analysis": {
                "parsed_details": { "wheel_size": 28, "accessories": null },
                "value": { "selling_points": null, "concerns": ["worn chain"] }
            }
        });
        let listing: Listing = serde_json::from_value(raw).unwrap();
        let analysis = listing.ai_analysis.unwrap();
        assert_eq!(analysis.details().unwrap().wheel_size.as_deref(), Some("28"));
        let value = analysis.value.as_ref().and_then(Analyzed::ready).unwrap();
        assert_eq!(value.concerns, vec!["worn chain".to_string()]);
    }

    #[test]
    fn sort_toggle_flips_then_resets() {
        let mut sort = SortCriteria::default();
        sort.toggle("price");
        assert_eq!(sort.direction, SortDirection::Desc);
        sort.toggle("brand");
        assert_eq!(sort.field, "brand");
        assert_eq!(sort.direction, SortDirection::Asc);
    }

    #[test]
    fn zero_price_is_unknown() {
        let listing = Listing {
            price: Some(0.0),
            ..Default::default()
        };
        assert_eq!(listing.known_price(), None);
        assert_eq!(listing.price_or_zero(), 0.0);
    }
}
