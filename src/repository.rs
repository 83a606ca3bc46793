// File-backed data directory: scraped listings, scraper statistics, enriched listings
//
// A missing file is an empty collection, not an error. Corrupt files surface as
// CoreError::MalformedInput so the handler can say which file is broken.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::aggregate;
use crate::error::CoreError;
use crate::models::{Listing, StatisticsSummary};
use crate::store;

pub const BIKES_FILE: &str = "gravel_bikes.json";
pub const STATS_FILE: &str = "statistics.json";
pub const ENRICHED_FILE: &str = "enriched_bikes.json";

const CSV_COLUMNS: [&str; 14] = [
    "title",
    "price",
    "location",
    "date_added",
    "url",
    "brand",
    "size",
    "year",
    "condition",
    "frame_material",
    "wheel_size",
    "brake_type",
    "derailleur_type",
    "seller_type",
];

#[derive(Debug, Clone)]
pub struct DataRepository {
    data_dir: PathBuf,
}

impl DataRepository {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        DataRepository {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    pub fn has_listings(&self) -> bool {
        self.path(BIKES_FILE).exists()
    }

    // None when the file does not exist
    async fn read(&self, file: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(file);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Data file not found, treating as empty");
                Ok(None)
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn read_listings(&self, file: &str) -> Result<Vec<Listing>> {
        let Some(bytes) = self.read(file).await? else {
            return Ok(Vec::new());
        };
        let listings = store::parse_listings(&bytes).with_context(|| format!("Invalid listing file {}", file))?;
        tracing::info!(file, count = listings.len(), "Loaded listings");
        Ok(listings)
    }

    pub async fn load_listings(&self) -> Result<Vec<Listing>> {
        self.read_listings(BIKES_FILE).await
    }

    pub async fn load_enriched(&self) -> Result<Vec<Listing>> {
        self.read_listings(ENRICHED_FILE).await
    }

    // Statistics written by the scraper, if any
    pub async fn load_base_statistics(&self) -> Result<Option<StatisticsSummary>> {
        let Some(bytes) = self.read(STATS_FILE).await? else {
            return Ok(None);
        };
        let summary = serde_json::from_slice(&bytes)
            .map_err(CoreError::from)
            .with_context(|| format!("Invalid statistics file {}", STATS_FILE))?;
        Ok(Some(summary))
    }

    // Scraper statistics, topped up from the listings themselves, plus the
    // AI-derived sections once an enriched collection exists
    pub async fn statistics(&self) -> Result<StatisticsSummary> {
        let listings = self.load_listings().await?;
        let computed = aggregate::summarize(&listings);
        let base = match self.load_base_statistics().await? {
            Some(stored) => aggregate::fill_missing(stored, computed),
            None => computed,
        };

        let enriched = self.load_enriched().await?;
        if enriched.is_empty() {
            return Ok(base);
        }
        Ok(aggregate::enhance(base, &enriched))
    }

    // Writes through a temp file so readers never observe a half-written array
    pub async fn save_enriched(&self, listings: &[Listing]) -> Result<()> {
        self.write_json(ENRICHED_FILE, listings).await
    }

    async fn write_json(&self, file: &str, listings: &[Listing]) -> Result<()> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", self.data_dir.display()))?;

        let body = serde_json::to_vec_pretty(listings).context("Failed to serialize listings")?;
        let target = self.path(file);
        let staging = self.path(&format!("{}.tmp", file));
        tokio::fs::write(&staging, body)
            .await
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        tokio::fs::rename(&staging, &target)
            .await
            .with_context(|| format!("Failed to move {} into place", target.display()))?;

        tracing::info!(file, count = listings.len(), "Saved listings");
        Ok(())
    }

    // Enriched listings when available, else the scraped ones
    pub async fn export_csv(&self) -> Result<Vec<u8>> {
        let mut listings = self.load_enriched().await?;
        if listings.is_empty() {
            listings = self.load_listings().await?;
        }
        listings_to_csv(&listings)
    }
}

pub fn listings_to_csv(listings: &[Listing]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS).context("Failed to write CSV header")?;

    for listing in listings {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        writer
            .write_record([
                listing.title.clone(),
                listing.price.map(|p| p.to_string()).unwrap_or_default(),
                text(&listing.location),
                text(&listing.date_added),
                listing.url.clone(),
                text(&listing.brand),
                text(&listing.size),
                listing.year.map(|y| y.to_string()).unwrap_or_default(),
                text(&listing.condition),
                text(&listing.frame_material),
                text(&listing.wheel_size),
                text(&listing.brake_type),
                text(&listing.derailleur_type),
                text(&listing.seller_type),
            ])
            .with_context(|| format!("Failed to write CSV row for {}", listing.url))?;
    }

    writer.into_inner().context("Failed to flush CSV writer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(dir: &Path, file: &str, value: serde_json::Value) {
        std::fs::write(dir.join(file), serde_json::to_vec(&value).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn missing_files_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = DataRepository::new(dir.path());
        assert!(repo.load_listings().await.unwrap().is_empty());
        assert!(repo.load_enriched().await.unwrap().is_empty());
        assert!(repo.load_base_statistics().await.unwrap().is_none());
        assert!(!repo.has_listings());

        let stats = repo.statistics().await.unwrap();
        assert_eq!(stats.total_listings, Some(0));
        assert!(stats.used_vs_new.is_none());
    }

    #[tokio::test]
    async fn object_instead_of_array_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), BIKES_FILE, json!({"status": "oops"}));
        let repo = DataRepository::new(dir.path());
        let err = repo.load_listings().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CoreError>(), Some(CoreError::MalformedInput(_))));
    }

    #[tokio::test]
    async fn statistics_merge_stored_computed_and_enriched() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            BIKES_FILE,
            json!([{"title": "Kross", "price": 1000, "url": "a", "brand": "Kross"}]),
        );
        write(dir.path(), STATS_FILE, json!({"total_listings": 40}));
        write(
            dir.path(),
            ENRICHED_FILE,
            json!([{
                "title": "Kross", "price": 1000, "url": "a", "brand": "Kross",
                "ai_analysis": {"parsed_details": {"condition": "nowy"}}
            }]),
        );

        let stats = DataRepository::new(dir.path()).statistics().await.unwrap();
        assert_eq!(stats.total_listings, Some(40));
        assert_eq!(stats.identified_brands, Some(1));
        assert_eq!(stats.used_vs_new.unwrap().new, 1);
    }

    #[tokio::test]
    async fn save_then_load_enriched() {
        let dir = tempfile::tempdir().unwrap();
        let repo = DataRepository::new(dir.path().join("nested"));
        let listing = Listing {
            title: "Trek".into(),
            url: "u".into(),
            ..Default::default()
        };
        repo.save_enriched(std::slice::from_ref(&listing)).await.unwrap();
        assert_eq!(repo.load_enriched().await.unwrap(), vec![listing]);
        assert!(!repo.data_dir().join("enriched_bikes.json.tmp").exists());
    }

    #[test]
    fn csv_has_header_and_one_row_per_listing() {
        let listings = vec![Listing {
            title: "Kross, Esker".into(),
            price: Some(4200.0),
            url: "u".into(),
            ..Default::default()
        }];
        let text = String::from_utf8(listings_to_csv(&listings).unwrap()).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("title,price,location"));
        assert!(lines.next().unwrap().starts_with("\"Kross, Esker\",4200,"));
        assert!(lines.next().is_none());
    }
}
