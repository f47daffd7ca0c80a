use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::mix::{
    CapacityFactorProfile, InstalledCapacity, Source, SourceValues, TimestepRecord,
};

/// Per-source generation, index-aligned with the scenario timestamps
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationSeries {
    pub nuclear: Vec<f64>,
    pub wind_offshore: Vec<f64>,
    pub wind_onshore: Vec<f64>,
    pub solar: Vec<f64>,
}

impl GenerationSeries {
    fn with_capacity(len: usize) -> Self {
        Self {
            nuclear: Vec::with_capacity(len),
            wind_offshore: Vec::with_capacity(len),
            wind_onshore: Vec::with_capacity(len),
            solar: Vec::with_capacity(len),
        }
    }

    pub fn get(&self, source: Source) -> &[f64] {
        match source {
            Source::Nuclear => &self.nuclear,
            Source::WindOffshore => &self.wind_offshore,
            Source::WindOnshore => &self.wind_onshore,
            Source::Solar => &self.solar,
        }
    }

    fn push(&mut self, values: &SourceValues) {
        self.nuclear.push(values.nuclear);
        self.wind_offshore.push(values.wind_offshore);
        self.wind_onshore.push(values.wind_onshore);
        self.solar.push(values.solar);
    }
}

/// Outcome of sizing and dispatching one nuclear share over a period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioResult {
    pub nuclear_fraction: f64,
    pub timestamps: Vec<DateTime<Utc>>,
    pub load: Vec<f64>,
    pub generation: GenerationSeries,
    /// Surplus per step, >= 0
    pub storage_potential: Vec<f64>,
    /// Deficit per step, >= 0
    pub storage_consumption: Vec<f64>,
    pub installed_capacity: InstalledCapacity,
    /// Peak deficit: backup power needed to never miss load
    pub battery_capacity: f64,
    /// Peak surplus: charging power needed to absorb the worst curtailment.
    /// This is a power rating, not an energy (state of charge) sizing.
    pub storage_requirement: f64,
}

impl ScenarioResult {
    /// Placeholder for a period with no data: metrics are NaN, series empty
    pub fn unavailable(nuclear_fraction: f64) -> Self {
        Self {
            nuclear_fraction,
            timestamps: Vec::new(),
            load: Vec::new(),
            generation: GenerationSeries::default(),
            storage_potential: Vec::new(),
            storage_consumption: Vec::new(),
            installed_capacity: InstalledCapacity::default(),
            battery_capacity: f64::NAN,
            storage_requirement: f64::NAN,
        }
    }

    pub fn is_available(&self) -> bool {
        self.battery_capacity.is_finite() && self.storage_requirement.is_finite()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Sum of all sources at each step
    pub fn total_generation(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| Source::ALL.iter().map(|&s| self.generation.get(s)[i]).sum())
            .collect()
    }

    /// Larger of peak deficit and peak surplus: the single firm rating that
    /// covers both backup and absorption
    pub fn peak_power_requirement(&self) -> f64 {
        if !self.is_available() {
            return f64::NAN;
        }
        self.battery_capacity.max(self.storage_requirement)
    }
}

/// Sizes the capacity mix for a nuclear share and replays hourly dispatch
#[derive(Debug, Clone, Copy)]
pub struct ScenarioEngine {
    profile: CapacityFactorProfile,
}

impl ScenarioEngine {
    pub fn new(profile: CapacityFactorProfile) -> Self {
        Self { profile }
    }

    /// Installed capacity that makes generation integrate exactly to load
    /// over `records`, with `nuclear_fraction` of the energy from nuclear.
    pub fn size(&self, records: &[TimestepRecord], nuclear_fraction: f64) -> InstalledCapacity {
        let mut cf_sums = SourceValues::default();
        let mut total_load = 0.0;
        for record in records {
            for (source, cf) in record.capacity_factors.iter() {
                cf_sums.set(source, cf_sums.get(source) + cf);
            }
            total_load += record.load;
        }

        let mut installed = InstalledCapacity::default();

        let nuclear_energy = nuclear_fraction * total_load;
        if cf_sums.nuclear > 0.0 {
            installed.nuclear = nuclear_energy / cf_sums.nuclear;
        } else {
            debug!(nuclear_energy, "nuclear capacity factors sum to zero, nuclear left unbuilt");
        }

        let renewable_energy = (1.0 - nuclear_fraction) * total_load;
        let mix_weight: f64 = Source::ALL
            .iter()
            .filter(|s| s.is_renewable())
            .map(|&s| self.profile.ratio(s) * cf_sums.get(s))
            .sum();
        let renewable_scale = if mix_weight > 0.0 {
            renewable_energy / mix_weight
        } else {
            debug!(renewable_energy, "renewable mix weight is zero, renewables left unbuilt");
            0.0
        };
        for source in Source::ALL.into_iter().filter(|s| s.is_renewable()) {
            installed.set(source, self.profile.ratio(source) * renewable_scale);
        }

        installed
    }

    /// Run one scenario. Callers should not pass an empty slice; doing so
    /// yields empty series and zero peaks.
    pub fn compute(&self, records: &[TimestepRecord], nuclear_fraction: f64) -> ScenarioResult {
        let installed = self.size(records, nuclear_fraction);
        let len = records.len();

        let mut timestamps = Vec::with_capacity(len);
        let mut load = Vec::with_capacity(len);
        let mut generation = GenerationSeries::with_capacity(len);
        let mut storage_potential = Vec::with_capacity(len);
        let mut storage_consumption = Vec::with_capacity(len);
        let mut peak_surplus: f64 = 0.0;
        let mut peak_deficit: f64 = 0.0;

        for record in records {
            let mut output = SourceValues::default();
            for source in Source::ALL {
                output.set(
                    source,
                    record.capacity_factors.get(source) * installed.get(source),
                );
            }

            let balance = output.total() - record.load;
            let surplus = balance.max(0.0);
            let deficit = (-balance).max(0.0);
            peak_surplus = peak_surplus.max(surplus);
            peak_deficit = peak_deficit.max(deficit);

            timestamps.push(record.timestamp);
            load.push(record.load);
            generation.push(&output);
            storage_potential.push(surplus);
            storage_consumption.push(deficit);
        }

        debug!(
            nuclear_fraction,
            steps = len,
            peak_surplus,
            peak_deficit,
            "scenario computed"
        );

        ScenarioResult {
            nuclear_fraction,
            timestamps,
            load,
            generation,
            storage_potential,
            storage_consumption,
            installed_capacity: installed,
            battery_capacity: peak_deficit,
            storage_requirement: peak_surplus,
        }
    }
}
