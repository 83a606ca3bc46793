// Statistics projector.
//
// Turns the backend's pre-aggregated `StatisticsSummary` into ordered,
// display-ready `Section`s. Nothing is computed here except ranking,
// truncation and the used/new percentages.

use serde::Serialize;

use crate::models::{PriceTable, StatisticsSummary, Tally, UsedVsNew, ValueAssessment};

const TOP_BRANDS: usize = 5;
const TOP_LOCATIONS: usize = 5;
const TOP_BIKE_TYPES: usize = 5;
const TOP_BRAND_PRICES: usize = 8;

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    PriceSummary,
    Listings,
    Ranking,
    PriceRanking,
    UsedVsNew,
    ValueAssessment,
    Timeline,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RowValue {
    Count { count: u64 },
    Amount { amount: f64 },
    Share { count: u64, percent: Option<f64> },
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Row {
    pub label: String,
    pub value: RowValue,
}

impl Row {
    fn count(label: impl Into<String>, count: u64) -> Self {
        Row { label: label.into(), value: RowValue::Count { count } }
    }

    fn amount(label: impl Into<String>, amount: f64) -> Self {
        Row { label: label.into(), value: RowValue::Amount { amount } }
    }

    // Text the dashboard prints next to the label.
    pub fn display_value(&self) -> String {
        match &self.value {
            RowValue::Count { count } => count.to_string(),
            RowValue::Amount { amount } => format!("{:.2}", amount),
            RowValue::Share { count, percent: Some(p) } => format!("{} ({:.1}%)", count, p),
            RowValue::Share { count, percent: None } => count.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub kind: SectionKind,
    pub rows: Vec<Row>,
}

impl Section {
    fn new(title: &str, kind: SectionKind, rows: Vec<Row>) -> Self {
        Section { title: title.to_string(), kind, rows }
    }
}

// Result of a projection run. `Unavailable` means the projector ran and found
// no section to show, which the caller renders as "no statistics available".
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "status", content = "sections", rename_all = "snake_case")]
pub enum Projection {
    Sections(Vec<Section>),
    Unavailable,
}

impl Projection {
    pub fn sections(&self) -> &[Section] {
        match self {
            Projection::Sections(sections) => sections,
            Projection::Unavailable => &[],
        }
    }
}

fn ranked_counts(tally: &Tally, limit: Option<usize>) -> Vec<Row> {
    let mut entries: Vec<(&String, &u64)> = tally.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1));
    entries
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|(label, count)| Row::count(label.clone(), *count))
        .collect()
}

fn ranked_prices(table: &PriceTable, limit: Option<usize>) -> Vec<Row> {
    let mut entries: Vec<(&String, &f64)> = table.iter().collect();
    entries.sort_by(|a, b| b.1.total_cmp(a.1));
    entries
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|(label, price)| Row::amount(label.clone(), *price))
        .collect()
}

fn percent_of(count: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(total) if total > 0 => Some((count as f64 / total as f64 * 1000.0).round() / 10.0),
        _ => None,
    }
}

fn used_vs_new_rows(split: &UsedVsNew, total: Option<u64>) -> Vec<Row> {
    let mut rows = vec![
        Row {
            label: "New".into(),
            value: RowValue::Share { count: split.new, percent: percent_of(split.new, total) },
        },
        Row {
            label: "Used".into(),
            value: RowValue::Share { count: split.used, percent: percent_of(split.used, total) },
        },
    ];
    if let Some(avg) = split.avg_price_new.filter(|p| *p != 0.0) {
        rows.push(Row::amount("Average price (new)", avg));
    }
    if let Some(avg) = split.avg_price_used.filter(|p| *p != 0.0) {
        rows.push(Row::amount("Average price (used)", avg));
    }
    rows
}

// Projects every present section, in the fixed display order.
pub fn project(stats: &StatisticsSummary) -> Projection {
    let mut sections = Vec::new();

    if let Some(price) = &stats.price_stats {
        sections.push(Section::new(
            "Price statistics",
            SectionKind::PriceSummary,
            vec![
                Row::amount("Mean", price.mean),
                Row::amount("Median", price.median),
                Row::amount("Min", price.min),
                Row::amount("Max", price.max),
            ],
        ));
    }

    if let Some(total) = stats.total_listings {
        let mut rows = vec![
            Row::count("Listings", total),
            Row::count("With identified brand", stats.identified_brands.unwrap_or(0)),
            Row::count("With identified size", stats.identified_sizes.unwrap_or(0)),
        ];
        if let Some(n) = stats.identified_bike_types.filter(|n| *n > 0) {
            rows.push(Row::count("With identified bike type", n));
        }
        if let Some(n) = stats.identified_condition.filter(|n| *n > 0) {
            rows.push(Row::count("With identified condition", n));
        }
        sections.push(Section::new("Listings", SectionKind::Listings, rows));
    }

    if let Some(tally) = &stats.brand_counts {
        sections.push(Section::new("Top brands", SectionKind::Ranking, ranked_counts(tally, Some(TOP_BRANDS))));
    }
    if let Some(tally) = &stats.location_counts {
        sections.push(Section::new("Top locations", SectionKind::Ranking, ranked_counts(tally, Some(TOP_LOCATIONS))));
    }
    if let Some(tally) = &stats.bicycle_type_counts {
        sections.push(Section::new("Bike types", SectionKind::Ranking, ranked_counts(tally, Some(TOP_BIKE_TYPES))));
    }
    if let Some(table) = &stats.avg_price_by_type {
        sections.push(Section::new("Average price by type", SectionKind::PriceRanking, ranked_prices(table, None)));
    }
    if let Some(table) = &stats.avg_price_by_brand {
        sections.push(Section::new(
            "Average price by brand",
            SectionKind::PriceRanking,
            ranked_prices(table, Some(TOP_BRAND_PRICES)),
        ));
    }
    if let Some(tally) = &stats.frame_material_counts {
        sections.push(Section::new("Frame materials", SectionKind::Ranking, ranked_counts(tally, None)));
    }
    if let Some(tally) = &stats.wheel_size_counts {
        sections.push(Section::new("Wheel sizes", SectionKind::Ranking, ranked_counts(tally, None)));
    }
    if let Some(tally) = &stats.condition_counts {
        sections.push(Section::new("Condition", SectionKind::Ranking, ranked_counts(tally, None)));
    }
    if let Some(split) = &stats.used_vs_new {
        sections.push(Section::new("Used vs new", SectionKind::UsedVsNew, used_vs_new_rows(split, stats.total_listings)));
    }
    if let Some(tally) = &stats.value_assessment_counts {
        let rows = [ValueAssessment::Fair, ValueAssessment::Overpriced, ValueAssessment::Underpriced]
            .iter()
            .map(|a| Row::count(a.as_str(), tally.get(a.as_str()).copied().unwrap_or(0)))
            .collect();
        sections.push(Section::new("Value assessment (AI)", SectionKind::ValueAssessment, rows));
    }
    if let Some(tally) = &stats.monthly_counts {
        let rows = tally.iter().map(|(month, count)| Row::count(month.clone(), *count)).collect();
        sections.push(Section::new("Listings per month", SectionKind::Timeline, rows));
    }

    if sections.is_empty() {
        Projection::Unavailable
    } else {
        Projection::Sections(sections)
    }
}
