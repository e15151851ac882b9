//! Group-by-key reduction of simplified records within one survey-year.
//!
//! Combine rule: `num_aggregated`, weight, count and area swept are summed;
//! temperatures are averaged, weighted by `num_aggregated`. The map view
//! derives CPUE as weight / area swept per cell, which stays meaningful under
//! summation.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::domain::{AggregateKey, SimplifiedRecord};

impl SimplifiedRecord {
    /// Merges two records sharing an aggregate key.
    ///
    /// # Panics
    ///
    /// Panics when the keys differ.
    pub fn combine(&self, other: &SimplifiedRecord) -> SimplifiedRecord {
        assert!(
            self.has_key(&other.key()),
            "combine called on mismatched keys: {:?} vs {:?}",
            self.key(),
            other.key()
        );

        let mut merged = Measures::from(self);
        merged.merge(Measures::from(other));
        merged.into_record(self.key())
    }
}

/// Everything in a record except its key.
#[derive(Debug, Clone)]
struct Measures {
    common_name: String,
    surface_temperature: f64,
    bottom_temperature: f64,
    weight: f64,
    count: f64,
    area_swept: f64,
    num_aggregated: u32,
}

impl Measures {
    fn split(record: SimplifiedRecord) -> (AggregateKey, Measures) {
        let key = AggregateKey {
            year: record.year,
            survey: record.survey,
            species: record.species,
            geohash: record.geohash,
        };
        let measures = Measures {
            common_name: record.common_name,
            surface_temperature: record.surface_temperature,
            bottom_temperature: record.bottom_temperature,
            weight: record.weight,
            count: record.count,
            area_swept: record.area_swept,
            num_aggregated: record.num_aggregated,
        };
        (key, measures)
    }

    fn merge(&mut self, other: Measures) {
        let self_n = self.num_aggregated as f64;
        let other_n = other.num_aggregated as f64;
        let total_n = self_n + other_n;
        let weighted_mean = |a: f64, b: f64| (a * self_n + b * other_n) / total_n;

        self.surface_temperature = weighted_mean(self.surface_temperature, other.surface_temperature);
        self.bottom_temperature = weighted_mean(self.bottom_temperature, other.bottom_temperature);
        self.weight += other.weight;
        self.count += other.count;
        self.area_swept += other.area_swept;
        self.num_aggregated += other.num_aggregated;
        if other.common_name < self.common_name {
            self.common_name = other.common_name;
        }
    }

    fn into_record(self, key: AggregateKey) -> SimplifiedRecord {
        SimplifiedRecord {
            year: key.year,
            survey: key.survey,
            species: key.species,
            common_name: self.common_name,
            geohash: key.geohash,
            surface_temperature: self.surface_temperature,
            bottom_temperature: self.bottom_temperature,
            weight: self.weight,
            count: self.count,
            area_swept: self.area_swept,
            num_aggregated: self.num_aggregated,
        }
    }
}

impl From<&SimplifiedRecord> for Measures {
    fn from(record: &SimplifiedRecord) -> Self {
        Measures {
            common_name: record.common_name.clone(),
            surface_temperature: record.surface_temperature,
            bottom_temperature: record.bottom_temperature,
            weight: record.weight,
            count: record.count,
            area_swept: record.area_swept,
            num_aggregated: record.num_aggregated,
        }
    }
}

/// Accumulator map for one unit of work. Consumed by [`KeyedReducer::finish`].
///
/// Key strings are moved out of each pushed record into the map key, so a
/// record costs no allocation beyond the first one seen for its key.
#[derive(Debug, Default)]
pub struct KeyedReducer {
    accumulators: HashMap<AggregateKey, Measures>,
    folded: u64,
}

impl KeyedReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: SimplifiedRecord) {
        self.folded += 1;
        let (key, measures) = Measures::split(record);
        match self.accumulators.entry(key) {
            Entry::Occupied(mut entry) => entry.get_mut().merge(measures),
            Entry::Vacant(entry) => {
                entry.insert(measures);
            }
        }
    }

    pub fn distinct_keys(&self) -> usize {
        self.accumulators.len()
    }

    pub fn folded(&self) -> u64 {
        self.folded
    }

    /// Emits one aggregate per distinct key, sorted by key.
    pub fn finish(self) -> Vec<SimplifiedRecord> {
        let mut entries = self.accumulators.into_iter().collect::<Vec<_>>();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
            .into_iter()
            .map(|(key, measures)| measures.into_record(key))
            .collect()
    }
}

impl Extend<SimplifiedRecord> for KeyedReducer {
    fn extend<T: IntoIterator<Item = SimplifiedRecord>>(&mut self, iter: T) {
        for record in iter {
            self.push(record);
        }
    }
}

pub fn reduce_by_key<I>(records: I) -> Vec<SimplifiedRecord>
where
    I: IntoIterator<Item = SimplifiedRecord>,
{
    let mut reducer = KeyedReducer::new();
    reducer.extend(records);
    reducer.finish()
}
