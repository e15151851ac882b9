use serde::Serialize;

use crate::domain::{GeohashPrecision, RawObservation, SimplifiedRecord};
use crate::geohash;

/// First required measurement found missing on a dropped observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    SurfaceTemperature,
    BottomTemperature,
    Weight,
    Count,
}

/// Narrows an observation to an aggregate-ready record.
///
/// Returns `None` as soon as one of surface temperature, bottom temperature,
/// weight or count (checked in that order) is missing.
pub fn simplify(obs: &RawObservation, precision: GeohashPrecision) -> Option<SimplifiedRecord> {
    simplify_checked(obs, precision).ok()
}

pub fn simplify_checked(
    obs: &RawObservation,
    precision: GeohashPrecision,
) -> Result<SimplifiedRecord, DropReason> {
    let geohash = geohash::encode(obs.latitude, obs.longitude, precision);

    let surface_temperature = obs
        .surface_temperature_c
        .ok_or(DropReason::SurfaceTemperature)?;
    let bottom_temperature = obs
        .bottom_temperature_c
        .ok_or(DropReason::BottomTemperature)?;
    let weight = obs.weight_kg.ok_or(DropReason::Weight)?;
    let count = obs.count.ok_or(DropReason::Count)?;

    Ok(SimplifiedRecord {
        year: obs.year.round_ties_even() as i32,
        survey: obs.survey.clone(),
        species: obs.scientific_name.clone(),
        common_name: obs.common_name.clone(),
        geohash,
        surface_temperature,
        bottom_temperature,
        weight,
        count,
        area_swept: obs.area_swept_ha,
        num_aggregated: 1,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub missing_surface_temperature: u64,
    pub missing_bottom_temperature: u64,
    pub missing_weight: u64,
    pub missing_count: u64,
}

impl DropCounts {
    pub fn record(&mut self, reason: DropReason) {
        match reason {
            DropReason::SurfaceTemperature => self.missing_surface_temperature += 1,
            DropReason::BottomTemperature => self.missing_bottom_temperature += 1,
            DropReason::Weight => self.missing_weight += 1,
            DropReason::Count => self.missing_count += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.missing_surface_temperature
            + self.missing_bottom_temperature
            + self.missing_weight
            + self.missing_count
    }

    pub fn absorb(&mut self, other: DropCounts) {
        self.missing_surface_temperature += other.missing_surface_temperature;
        self.missing_bottom_temperature += other.missing_bottom_temperature;
        self.missing_weight += other.missing_weight;
        self.missing_count += other.missing_count;
    }
}

/// Stateless simplification plus per-unit drop accounting.
#[derive(Debug, Clone)]
pub struct Simplifier {
    precision: GeohashPrecision,
    seen: u64,
    drops: DropCounts,
}

impl Simplifier {
    pub fn new(precision: GeohashPrecision) -> Self {
        Self {
            precision,
            seen: 0,
            drops: DropCounts::default(),
        }
    }

    pub fn apply(&mut self, obs: &RawObservation) -> Option<SimplifiedRecord> {
        self.seen += 1;
        match simplify_checked(obs, self.precision) {
            Ok(record) => Some(record),
            Err(reason) => {
                tracing::debug!(species = %obs.scientific_name, ?reason, "dropping observation");
                self.drops.record(reason);
                None
            }
        }
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn drops(&self) -> DropCounts {
        self.drops
    }
}
