//! Reading generator module for simulating temperature sensors.
//!
//! This module produces synthetic [`SensorReading`]s from a fixed catalog of
//! sensors and a configurable temperature model. The random source is
//! injected so tests can run against a seeded generator.

use std::ops::Range;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Unit label attached to every generated reading.
pub const CELSIUS: &str = "celsius";

/// Cold readings: 20% of draws, uniform over [0, 10).
pub const COLD_BUCKET: TemperatureBucket = TemperatureBucket {
    label: "cold",
    weight: 0.2,
    range: 0.0..10.0,
};

/// Nominal readings: 60% of draws, uniform over [10, 25).
pub const NOMINAL_BUCKET: TemperatureBucket = TemperatureBucket {
    label: "nominal",
    weight: 0.6,
    range: 10.0..25.0,
};

/// Hot readings: 20% of draws, uniform over [25, 40).
pub const HOT_BUCKET: TemperatureBucket = TemperatureBucket {
    label: "hot",
    weight: 0.2,
    range: 25.0..40.0,
};

/// Sensor identifiers of the default catalog, paired by index with [`DEFAULT_LOCATIONS`].
pub const DEFAULT_SENSOR_IDS: [&str; 5] = ["TEMP-001", "TEMP-002", "TEMP-003", "TEMP-004", "TEMP-005"];

/// Locations of the default catalog.
pub const DEFAULT_LOCATIONS: [&str; 5] = ["Server Room", "Office", "Warehouse", "Loading Dock", "Rooftop"];

// Location baseline model
const BASELINE_DEFAULT_CELSIUS: f64 = 22.0;
const BASELINE_SERVER_ROOM_CELSIUS: f64 = 18.0;
const BASELINE_ROOFTOP_CELSIUS: f64 = 15.0;
const BASELINE_VARIATION_CELSIUS: f64 = 8.0;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// A single temperature reading as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Catalog identifier of the sensor
    pub sensor_id: String,

    /// Temperature in degrees
    pub temperature: f64,

    /// Unit label, e.g. "celsius"
    pub unit: String,

    /// Catalog location bound to the sensor
    pub location: String,

    /// Instant the reading was taken
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    /// Create a celsius reading stamped with the current instant.
    pub fn new(sensor_id: impl Into<String>, location: impl Into<String>, temperature: f64) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            temperature,
            unit: CELSIUS.to_string(),
            location: location.into(),
            timestamp: Utc::now(),
        }
    }

    /// Classify the reading's temperature.
    pub fn band(&self) -> TemperatureBand {
        TemperatureBand::classify(self.temperature)
    }
}

/// Coarse classification of a temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureBand {
    Cold,
    Warm,
    Hot,
}

impl TemperatureBand {
    /// Below 10 is cold, 10 through 25 inclusive is warm, above 25 is hot.
    pub fn classify(celsius: f64) -> Self {
        if celsius < 10.0 {
            TemperatureBand::Cold
        } else if celsius <= 25.0 {
            TemperatureBand::Warm
        } else {
            TemperatureBand::Hot
        }
    }

    /// Human readable description, e.g. "12.5C is warm".
    pub fn describe(celsius: f64) -> String {
        format!("{:.1}C is {}", celsius, Self::classify(celsius))
    }
}

impl std::fmt::Display for TemperatureBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemperatureBand::Cold => write!(f, "cold"),
            TemperatureBand::Warm => write!(f, "warm"),
            TemperatureBand::Hot => write!(f, "hot"),
        }
    }
}

/// Errors raised while building a catalog or a distribution.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog must contain at least one sensor")]
    Empty,

    #[error("catalog has {sensors} sensor ids but {locations} locations")]
    LengthMismatch { sensors: usize, locations: usize },

    #[error("distribution must contain at least one bucket")]
    NoBuckets,

    #[error("bucket '{label}' has invalid weight {weight}")]
    InvalidWeight { label: &'static str, weight: f64 },

    #[error("bucket weights sum to {sum}, expected 1")]
    WeightSum { sum: f64 },

    #[error("bucket '{label}' has an empty range")]
    EmptyRange { label: &'static str },

    #[error("bucket '{label}' does not start where the previous bucket ends")]
    NotContiguous { label: &'static str },
}

/// Fixed sensor catalog: `sensor_ids[i]` is installed at `locations[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorCatalog {
    sensor_ids: Vec<String>,
    locations: Vec<String>,
}

impl GeneratorCatalog {
    /// Build a catalog from parallel lists of equal, non-zero length.
    pub fn new(sensor_ids: Vec<String>, locations: Vec<String>) -> Result<Self, CatalogError> {
        if sensor_ids.len() != locations.len() {
            return Err(CatalogError::LengthMismatch {
                sensors: sensor_ids.len(),
                locations: locations.len(),
            });
        }
        if sensor_ids.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self {
            sensor_ids,
            locations,
        })
    }

    /// Build a catalog from `(sensor_id, location)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self, CatalogError> {
        let (sensor_ids, locations) = pairs
            .into_iter()
            .map(|(s, l)| (s.to_string(), l.to_string()))
            .unzip();
        Self::new(sensor_ids, locations)
    }

    pub fn len(&self) -> usize {
        self.sensor_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensor_ids.is_empty()
    }

    /// The `(sensor_id, location)` pair at `index`.
    pub fn entry(&self, index: usize) -> Option<(&str, &str)> {
        let sensor = self.sensor_ids.get(index)?;
        let location = self.locations.get(index)?;
        Some((sensor.as_str(), location.as_str()))
    }
}

impl Default for GeneratorCatalog {
    fn default() -> Self {
        Self {
            sensor_ids: DEFAULT_SENSOR_IDS.iter().map(|s| s.to_string()).collect(),
            locations: DEFAULT_LOCATIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// One category of the temperature distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureBucket {
    /// Name used in logs and tests
    pub label: &'static str,

    /// Probability of choosing this bucket
    pub weight: f64,

    /// Half-open range sampled uniformly once the bucket is chosen
    pub range: Range<f64>,
}

/// Categorical-then-uniform temperature distribution.
#[derive(Debug, Clone)]
pub struct TemperatureDistribution {
    buckets: Vec<TemperatureBucket>,
    index: WeightedIndex<f64>,
}

impl TemperatureDistribution {
    /// Validate and build a distribution.
    ///
    /// Buckets must be ordered, non-empty, contiguous, and their weights must sum to 1.
    pub fn new(buckets: Vec<TemperatureBucket>) -> Result<Self, CatalogError> {
        if buckets.is_empty() {
            return Err(CatalogError::NoBuckets);
        }

        for bucket in &buckets {
            if !bucket.weight.is_finite() || bucket.weight <= 0.0 {
                return Err(CatalogError::InvalidWeight {
                    label: bucket.label,
                    weight: bucket.weight,
                });
            }
            if bucket.range.is_empty() {
                return Err(CatalogError::EmptyRange {
                    label: bucket.label,
                });
            }
        }

        for pair in buckets.windows(2) {
            if pair[0].range.end != pair[1].range.start {
                return Err(CatalogError::NotContiguous {
                    label: pair[1].label,
                });
            }
        }

        let sum: f64 = buckets.iter().map(|b| b.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(CatalogError::WeightSum { sum });
        }

        let index = WeightedIndex::new(buckets.iter().map(|b| b.weight))
            .map_err(|_| CatalogError::WeightSum { sum })?;

        Ok(Self { buckets, index })
    }

    pub fn buckets(&self) -> &[TemperatureBucket] {
        &self.buckets
    }

    /// Overall range covered by the buckets.
    pub fn span(&self) -> Range<f64> {
        let start = self.buckets.first().map(|b| b.range.start).unwrap_or_default();
        let end = self.buckets.last().map(|b| b.range.end).unwrap_or_default();
        start..end
    }

    /// The bucket containing `celsius`, if any.
    pub fn bucket_of(&self, celsius: f64) -> Option<&TemperatureBucket> {
        self.buckets.iter().find(|b| b.range.contains(&celsius))
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let bucket = &self.buckets[self.index.sample(rng)];
        rng.gen_range(bucket.range.clone())
    }
}

impl Default for TemperatureDistribution {
    fn default() -> Self {
        let buckets = vec![COLD_BUCKET, NOMINAL_BUCKET, HOT_BUCKET];
        let index = WeightedIndex::new(buckets.iter().map(|b| b.weight))
            .expect("default bucket weights are valid");
        Self { buckets, index }
    }
}

/// How temperatures are drawn.
#[derive(Debug, Clone)]
pub enum TemperatureModel {
    /// Pick a bucket by weight, then a uniform value inside it.
    Buckets(TemperatureDistribution),

    /// Per-location baseline with a uniform ±4 degree variation.
    LocationBaseline,
}

impl Default for TemperatureModel {
    fn default() -> Self {
        TemperatureModel::Buckets(TemperatureDistribution::default())
    }
}

impl TemperatureModel {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R, location: &str) -> f64 {
        match self {
            TemperatureModel::Buckets(distribution) => distribution.sample(rng),
            TemperatureModel::LocationBaseline => {
                let base = match location {
                    "Server Room" => BASELINE_SERVER_ROOM_CELSIUS,
                    "Rooftop" => BASELINE_ROOFTOP_CELSIUS,
                    _ => BASELINE_DEFAULT_CELSIUS,
                };
                base + (rng.gen::<f64>() - 0.5) * BASELINE_VARIATION_CELSIUS
            }
        }
    }
}

/// Reading generator for simulated temperature sensors.
///
/// The generator is shared between concurrent tasks; the random source sits
/// behind a mutex so `generate` only needs `&self`.
pub struct ReadingGenerator<R = StdRng> {
    catalog: GeneratorCatalog,
    model: TemperatureModel,
    rng: Mutex<R>,
}

impl ReadingGenerator<StdRng> {
    /// Default catalog and bucket distribution, seeded from OS entropy.
    pub fn with_defaults() -> Self {
        Self::new(
            GeneratorCatalog::default(),
            TemperatureModel::default(),
            StdRng::from_entropy(),
        )
    }

    /// Default catalog and bucket distribution with a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self::new(
            GeneratorCatalog::default(),
            TemperatureModel::default(),
            StdRng::seed_from_u64(seed),
        )
    }
}

impl<R: Rng> ReadingGenerator<R> {
    pub fn new(catalog: GeneratorCatalog, model: TemperatureModel, rng: R) -> Self {
        Self {
            catalog,
            model,
            rng: Mutex::new(rng),
        }
    }

    pub fn catalog(&self) -> &GeneratorCatalog {
        &self.catalog
    }

    pub fn model(&self) -> &TemperatureModel {
        &self.model
    }

    /// Generate a reading for a uniformly chosen catalog entry.
    pub fn generate(&self) -> SensorReading {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let index = rng.gen_range(0..self.catalog.len());
        self.reading_at(&mut *rng, index)
    }

    /// Generate a reading for a specific catalog entry.
    ///
    /// Returns `None` if `index` is outside the catalog.
    pub fn generate_for_index(&self, index: usize) -> Option<SensorReading> {
        if index >= self.catalog.len() {
            return None;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Some(self.reading_at(&mut *rng, index))
    }

    /// Generate multiple readings.
    pub fn generate_batch(&self, count: usize) -> Vec<SensorReading> {
        (0..count).map(|_| self.generate()).collect()
    }

    fn reading_at(&self, rng: &mut R, index: usize) -> SensorReading {
        let (sensor_id, location) = self.catalog.entry(index).unwrap_or(("", ""));
        let temperature = self.model.sample(rng, location);
        SensorReading::new(sensor_id, location, temperature)
    }
}

impl Default for ReadingGenerator<StdRng> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_SIZE: usize = 100_000;
    const FREQUENCY_TOLERANCE: f64 = 0.02;

    fn two_sensor_catalog() -> GeneratorCatalog {
        GeneratorCatalog::from_pairs([("TEMP-001", "Server Room"), ("TEMP-002", "Office")]).unwrap()
    }

    #[test]
    fn test_reading_serialization() {
        let reading = SensorReading::new("TEMP-001", "Server Room", 21.5);
        let json = serde_json::to_string(&reading).unwrap();

        assert!(json.contains(r#""sensor_id":"TEMP-001""#));
        assert!(json.contains(r#""temperature":21.5"#));
        assert!(json.contains(r#""unit":"celsius""#));
        assert!(json.contains(r#""location":"Server Room""#));
        assert!(json.contains(r#""timestamp":""#));
    }

    #[test]
    fn test_reading_timestamp_is_rfc3339() {
        let json = r#"{
            "sensor_id": "TEMP-003",
            "temperature": 12.25,
            "unit": "celsius",
            "location": "Warehouse",
            "timestamp": "2024-05-01T12:30:00Z"
        }"#;

        let reading: SensorReading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.sensor_id, "TEMP-003");
        assert_eq!(reading.timestamp.to_rfc3339(), "2024-05-01T12:30:00+00:00");
    }

    #[test]
    fn test_catalog_rejects_length_mismatch() {
        let result = GeneratorCatalog::new(
            vec!["TEMP-001".to_string(), "TEMP-002".to_string()],
            vec!["Office".to_string()],
        );
        assert_eq!(
            result.unwrap_err(),
            CatalogError::LengthMismatch {
                sensors: 2,
                locations: 1
            }
        );
    }

    #[test]
    fn test_catalog_rejects_empty() {
        let result = GeneratorCatalog::new(vec![], vec![]);
        assert_eq!(result.unwrap_err(), CatalogError::Empty);
    }

    #[test]
    fn test_forced_index_binds_pair() {
        let generator = ReadingGenerator::new(two_sensor_catalog(), TemperatureModel::default(), StdRng::seed_from_u64(7));

        let reading = generator.generate_for_index(0).unwrap();
        assert_eq!(reading.sensor_id, "TEMP-001");
        assert_eq!(reading.location, "Server Room");

        let reading = generator.generate_for_index(1).unwrap();
        assert_eq!(reading.sensor_id, "TEMP-002");
        assert_eq!(reading.location, "Office");

        assert!(generator.generate_for_index(2).is_none());
    }

    #[test]
    fn test_sensor_and_location_stay_paired() {
        let generator = ReadingGenerator::seeded(42);
        let catalog = generator.catalog().clone();

        for reading in generator.generate_batch(5_000) {
            let index = DEFAULT_SENSOR_IDS
                .iter()
                .position(|id| *id == reading.sensor_id)
                .expect("sensor id comes from the catalog");
            assert_eq!(catalog.entry(index), Some((reading.sensor_id.as_str(), reading.location.as_str())));
        }
    }

    #[test]
    fn test_every_catalog_entry_is_chosen() {
        let generator = ReadingGenerator::seeded(3);
        let mut seen = [false; 5];
        for reading in generator.generate_batch(1_000) {
            let index = DEFAULT_SENSOR_IDS.iter().position(|id| *id == reading.sensor_id).unwrap();
            seen[index] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_temperature_within_bucket_span() {
        let generator = ReadingGenerator::seeded(11);
        for reading in generator.generate_batch(10_000) {
            assert!(reading.temperature >= 0.0 && reading.temperature < 40.0);
            assert_eq!(reading.unit, CELSIUS);
        }
    }

    #[test]
    fn test_bucket_frequencies_match_weights() {
        let generator = ReadingGenerator::seeded(2024);
        let distribution = TemperatureDistribution::default();
        let mut counts = vec![0usize; distribution.buckets().len()];

        for reading in generator.generate_batch(SAMPLE_SIZE) {
            let position = distribution
                .buckets()
                .iter()
                .position(|b| b.range.contains(&reading.temperature))
                .expect("temperature falls in a bucket");
            counts[position] += 1;
        }

        for (bucket, count) in distribution.buckets().iter().zip(counts) {
            let observed = count as f64 / SAMPLE_SIZE as f64;
            assert!(
                (observed - bucket.weight).abs() < FREQUENCY_TOLERANCE,
                "bucket {} observed {:.4}, expected {:.2}",
                bucket.label,
                observed,
                bucket.weight
            );
        }
    }

    #[test]
    fn test_seeded_generators_agree() {
        let a = ReadingGenerator::seeded(99);
        let b = ReadingGenerator::seeded(99);
        for _ in 0..20 {
            let (ra, rb) = (a.generate(), b.generate());
            assert_eq!(ra.sensor_id, rb.sensor_id);
            assert_eq!(ra.temperature, rb.temperature);
        }
    }

    #[test]
    fn test_distribution_validation() {
        let result = TemperatureDistribution::new(vec![]);
        assert_eq!(result.unwrap_err(), CatalogError::NoBuckets);

        let result = TemperatureDistribution::new(vec![
            TemperatureBucket { label: "low", weight: 0.5, range: 0.0..10.0 },
            TemperatureBucket { label: "high", weight: 0.5, range: 12.0..20.0 },
        ]);
        assert_eq!(result.unwrap_err(), CatalogError::NotContiguous { label: "high" });

        let result = TemperatureDistribution::new(vec![
            TemperatureBucket { label: "low", weight: 0.5, range: 0.0..10.0 },
            TemperatureBucket { label: "high", weight: 0.4, range: 10.0..20.0 },
        ]);
        assert!(matches!(result, Err(CatalogError::WeightSum { .. })));

        let result = TemperatureDistribution::new(vec![TemperatureBucket {
            label: "flat",
            weight: 1.0,
            range: 5.0..5.0,
        }]);
        assert_eq!(result.unwrap_err(), CatalogError::EmptyRange { label: "flat" });

        let result = TemperatureDistribution::new(vec![COLD_BUCKET, NOMINAL_BUCKET, HOT_BUCKET]);
        assert!(result.is_ok());
    }

    #[test]
    fn test_custom_distribution_is_honoured() {
        let distribution = TemperatureDistribution::new(vec![TemperatureBucket {
            label: "freezer",
            weight: 1.0,
            range: -20.0..-10.0,
        }])
        .unwrap();
        let generator = ReadingGenerator::new(
            GeneratorCatalog::default(),
            TemperatureModel::Buckets(distribution),
            StdRng::seed_from_u64(5),
        );

        for reading in generator.generate_batch(500) {
            assert!((-20.0..-10.0).contains(&reading.temperature));
        }
    }

    #[test]
    fn test_location_baseline_model() {
        let generator = ReadingGenerator::new(
            two_sensor_catalog(),
            TemperatureModel::LocationBaseline,
            StdRng::seed_from_u64(8),
        );

        for _ in 0..500 {
            let server_room = generator.generate_for_index(0).unwrap();
            assert!((14.0..22.0).contains(&server_room.temperature));

            let office = generator.generate_for_index(1).unwrap();
            assert!((18.0..26.0).contains(&office.temperature));
        }
    }

    #[test]
    fn test_distribution_span_and_lookup() {
        let distribution = TemperatureDistribution::default();
        assert_eq!(distribution.span(), 0.0..40.0);
        assert_eq!(distribution.bucket_of(10.0).map(|b| b.label), Some("nominal"));
        assert_eq!(distribution.bucket_of(39.9).map(|b| b.label), Some("hot"));
        assert!(distribution.bucket_of(40.0).is_none());
    }

    #[test]
    fn test_temperature_band_classification() {
        assert_eq!(TemperatureBand::classify(9.99), TemperatureBand::Cold);
        assert_eq!(TemperatureBand::classify(10.0), TemperatureBand::Warm);
        assert_eq!(TemperatureBand::classify(25.0), TemperatureBand::Warm);
        assert_eq!(TemperatureBand::classify(25.01), TemperatureBand::Hot);
        assert_eq!(TemperatureBand::describe(12.34), "12.3C is warm");
        assert_eq!(format!("{}", TemperatureBand::Hot), "hot");
    }
}
