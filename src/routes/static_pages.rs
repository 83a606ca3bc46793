use askama::Template;
use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse},
};

use super::api::{self, DashboardView, ViewQuery};
use crate::error::AppError;
use crate::fields;
use crate::models::{FilterCriteria, Listing, SortCriteria, SortDirection};
use crate::statistics::Section;
use crate::AppState;

// (field, header label) of the listing table
const COLUMNS: [(&str, &str); 7] = [
    ("title", "Title"),
    ("price", "Price"),
    ("brand", "Brand"),
    ("size", "Size"),
    ("condition", "Condition"),
    ("location", "Location"),
    ("date_added", "Added"),
];

struct Column {
    label: &'static str,
    href: String,
    indicator: &'static str,
}

struct Choice {
    value: String,
    selected: bool,
}

struct TableRow {
    url: String,
    cells: Vec<String>,
}

struct Bar {
    label: String,
    count: u64,
    width: u32, // percent of the tallest bucket
}

#[derive(Template)]
#[template(path = "index.html")]
struct DashboardTemplate {
    total: usize,
    shown: usize,
    brands: Vec<Choice>,
    sizes: Vec<Choice>,
    price_min: String,
    price_max: String,
    columns: Vec<Column>,
    rows: Vec<TableRow>,
    bars: Vec<Bar>,
    sections: Vec<Section>,
}

fn choices(values: &[String], current: Option<&str>) -> Vec<Choice> {
    values
        .iter()
        .map(|value| Choice {
            selected: current == Some(value.as_str()),
            value: value.clone(),
        })
        .collect()
}

// Header link: clicking the active column flips direction, any other starts ascending
fn column_href(filter: &FilterCriteria, sort: &SortCriteria, field: &str) -> String {
    let mut next = sort.clone();
    next.toggle(field);
    let direction = match next.direction {
        SortDirection::Asc => "asc",
        SortDirection::Desc => "desc",
    };
    let mut params = vec![format!("sort={}", field), format!("direction={}", direction)];
    if let Some(brand) = &filter.brand {
        params.push(format!("brand={}", urlencoding::encode(brand)));
    }
    if let Some(size) = &filter.size {
        params.push(format!("size={}", urlencoding::encode(size)));
    }
    if let Some(min) = filter.price_min {
        params.push(format!("price_min={}", min));
    }
    if let Some(max) = filter.price_max {
        params.push(format!("price_max={}", max));
    }
    format!("/?{}", params.join("&"))
}

fn table_row(listing: &Listing) -> TableRow {
    TableRow {
        url: listing.url.clone(),
        cells: COLUMNS
            .iter()
            .map(|(field, _)| match *field {
                "price" => listing
                    .known_price()
                    .map(|p| format!("{:.0} zł", p))
                    .unwrap_or_else(|| "-".to_string()),
                other => fields::display_field(listing, other),
            })
            .collect(),
    }
}

fn dashboard(view: DashboardView) -> DashboardTemplate {
    let columns = COLUMNS
        .iter()
        .map(|(field, label)| Column {
            label: *label,
            href: column_href(&view.filter, &view.sort, field),
            indicator: match (view.sort.field == *field, view.sort.direction) {
                (true, SortDirection::Asc) => "▲",
                (true, SortDirection::Desc) => "▼",
                (false, _) => "",
            },
        })
        .collect();

    let tallest = view.histogram.counts.iter().copied().max().unwrap_or(0).max(1);
    let bars = view
        .histogram
        .labels
        .iter()
        .zip(&view.histogram.counts)
        .map(|(label, count)| Bar {
            label: label.clone(),
            count: *count,
            width: (*count * 100 / tallest) as u32,
        })
        .collect();

    DashboardTemplate {
        total: view.total,
        shown: view.listings.len(),
        brands: choices(&view.options.brands, view.filter.brand.as_deref()),
        sizes: choices(&view.options.sizes, view.filter.size.as_deref()),
        price_min: view.filter.price_min.map(|p| p.to_string()).unwrap_or_default(),
        price_max: view.filter.price_max.map(|p| p.to_string()).unwrap_or_default(),
        columns,
        rows: view.listings.iter().map(table_row).collect(),
        bars,
        sections: view.statistics.sections().to_vec(),
    }
}

// Handler function to render the dashboard
pub async fn dashboard_page(
    State(app_state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Result<impl IntoResponse, AppError> {
    let view = api::build_view(&app_state, &query).await?;
    let template = dashboard(view);
    match template.render() {
        Ok(html) => Ok(Html(html)),
        Err(e) => {
            tracing::error!("Failed to render dashboard template: {}", e);
            Err(AppError::InternalServerError(anyhow::Error::new(e)))
        }
    }
}
