// Histogram binner: equal-width price buckets for the price distribution chart

use serde::Serialize;

pub const DEFAULT_BUCKETS: usize = 10;

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct Histogram {
    pub labels: Vec<String>,
    pub counts: Vec<u64>,
}

impl Histogram {
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

// Partitions the truthy prices (non-zero, non-NaN) into `bucket_count` buckets
// spanning [min, max]. The maximum lands in the last bucket; when every price is
// equal the bucket width is zero and all prices go to bucket 0.
pub fn bin<I>(prices: I, bucket_count: usize) -> Histogram
where
    I: IntoIterator<Item = f64>,
{
    let prices: Vec<f64> = prices
        .into_iter()
        .filter(|p| *p != 0.0 && !p.is_nan())
        .collect();

    if prices.is_empty() || bucket_count == 0 {
        return Histogram::default();
    }

    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let bin_size = (max - min) / bucket_count as f64;

    let labels = (0..bucket_count)
        .map(|i| {
            let lower = min + i as f64 * bin_size;
            let upper = min + (i + 1) as f64 * bin_size;
            format!("{}-{}", lower.round() as i64, upper.round() as i64)
        })
        .collect();

    let mut counts = vec![0u64; bucket_count];
    for price in &prices {
        let index = if bin_size == 0.0 {
            0
        } else {
            (((price - min) / bin_size).floor() as usize).min(bucket_count - 1)
        };
        counts[index] += 1;
    }

    tracing::debug!(values = prices.len(), min, max, bucket_count, "Binned prices");
    Histogram { labels, counts }
}
