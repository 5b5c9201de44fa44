/*!
 * Run-wide location histograms
 *
 * Conditional template variables like `{city?min=10|country}` need to know
 * how many files share a location value before committing to a directory
 * for it. The planner records every located file here; the template engine
 * reads the counts back through `PathGeneratorContext`.
 */

use std::collections::HashMap;
use std::sync::Mutex;

use crate::media::LocationData;

/// One component of a resolved location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationField {
    District,
    City,
    County,
    State,
    Country,
}

/// Counts consulted by conditional template variables
pub trait PathGeneratorContext: Send + Sync {
    /// Number of files recorded with `value` for `field`
    fn count(&self, field: LocationField, value: &str) -> u64;
}

#[derive(Debug, Default)]
struct Histograms {
    district: HashMap<String, u64>,
    city: HashMap<String, u64>,
    county: HashMap<String, u64>,
    state: HashMap<String, u64>,
    country: HashMap<String, u64>,
}

/// Thread-safe histograms of location values seen during a run
#[derive(Debug, Default)]
pub struct LocationStatistics {
    inner: Mutex<Histograms>,
}

impl LocationStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one located file
    pub fn record(&self, location: &LocationData) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(ref v) = location.district {
            *inner.district.entry(v.clone()).or_insert(0) += 1;
        }
        if let Some(ref v) = location.city {
            *inner.city.entry(v.clone()).or_insert(0) += 1;
        }
        if let Some(ref v) = location.county {
            *inner.county.entry(v.clone()).or_insert(0) += 1;
        }
        if let Some(ref v) = location.state {
            *inner.state.entry(v.clone()).or_insert(0) += 1;
        }
        if let Some(ref v) = location.country {
            *inner.country.entry(v.clone()).or_insert(0) += 1;
        }
    }

    /// Forget all recorded values
    pub fn reset(&self) {
        *self.inner.lock().unwrap() = Histograms::default();
    }

    /// Distinct values recorded for a field
    pub fn distinct_values(&self, field: LocationField) -> usize {
        let inner = self.inner.lock().unwrap();
        match field {
            LocationField::District => inner.district.len(),
            LocationField::City => inner.city.len(),
            LocationField::County => inner.county.len(),
            LocationField::State => inner.state.len(),
            LocationField::Country => inner.country.len(),
        }
    }
}

impl PathGeneratorContext for LocationStatistics {
    fn count(&self, field: LocationField, value: &str) -> u64 {
        let inner = self.inner.lock().unwrap();
        let map = match field {
            LocationField::District => &inner.district,
            LocationField::City => &inner.city,
            LocationField::County => &inner.county,
            LocationField::State => &inner.state,
            LocationField::Country => &inner.country,
        };
        map.get(value).copied().unwrap_or(0)
    }
}
