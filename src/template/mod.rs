/*!
 * Destination path template engine
 *
 * Expands templates like `/photos/{year}/{city?min=10|country}/{name}{ext}`
 * against one file descriptor. Variables may carry conditions (`min=N`,
 * `max=N`) evaluated against run-wide location counts, and a fallback used
 * when the value is empty or a condition fails. Unknown `{...}` tokens pass
 * through untouched so broken templates stay debuggable; expansion never
 * fails.
 */

pub mod sanitize;

mod country;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::{Captures, Regex};

use crate::config::{CopyConfig, LocationGranularity, PathCasing};
use crate::location::{LocationField, PathGeneratorContext};
use crate::media::FileRef;

/// Every recognized template variable, in substitution order
const VARIABLES: &[&str] = &[
    "year",
    "month",
    "day",
    "district",
    "city",
    "county",
    "state",
    "country",
    "directory",
    "name",
    "nameNoExtension",
    "ext",
    "filename",
    "camera",
    "album",
];

/// Compiled `{var...}` patterns, one per variable, built once
fn patterns() -> &'static HashMap<&'static str, Regex> {
    static PATTERNS: OnceLock<HashMap<&'static str, Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        VARIABLES
            .iter()
            .map(|name| {
                let pattern = format!(
                    r"\{{{}(?:\?([^|{{}}]*))?(?:\|([^{{}}]*))?\}}",
                    regex::escape(name)
                );
                (*name, Regex::new(&pattern).expect("variable pattern compiles"))
            })
            .collect()
    })
}

#[derive(Debug, Clone, Copy)]
enum Condition {
    Min(u64),
    Max(u64),
}

/// Malformed conditions are ignored rather than rejected; expansion never
/// fails on a bad template.
fn parse_conditions(spec: &str) -> Vec<Condition> {
    spec.split(',')
        .filter_map(|part| {
            let part = part.trim();
            if let Some(n) = part.strip_prefix("min=") {
                n.parse().ok().map(Condition::Min)
            } else if let Some(n) = part.strip_prefix("max=") {
                n.parse().ok().map(Condition::Max)
            } else {
                None
            }
        })
        .collect()
}

fn location_field(name: &str) -> Option<LocationField> {
    match name {
        "district" => Some(LocationField::District),
        "city" => Some(LocationField::City),
        "county" => Some(LocationField::County),
        "state" => Some(LocationField::State),
        "country" => Some(LocationField::Country),
        _ => None,
    }
}

/// Template engine bound to one run's configuration
pub struct PathTemplate {
    template: String,
    casing: PathCasing,
    granularity: LocationGranularity,
    unknown_location_fallback: String,
    use_full_country_names: bool,
    context: Option<Arc<dyn PathGeneratorContext>>,
}

impl PathTemplate {
    pub fn new(template: &str, config: &CopyConfig) -> Self {
        Self {
            template: template.to_string(),
            casing: config.path_casing,
            granularity: config.location_granularity,
            unknown_location_fallback: config.unknown_location_fallback.clone(),
            use_full_country_names: config.use_full_country_names,
            context: None,
        }
    }

    /// Attach run-wide location counts for conditional variables
    pub fn with_context(mut self, context: Arc<dyn PathGeneratorContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// Expand the template for one file
    pub fn expand(&self, file: &FileRef) -> String {
        let mut result = self.template.clone();
        for name in VARIABLES {
            let re = &patterns()[name];
            if !re.is_match(&result) {
                continue;
            }
            result = re
                .replace_all(&result, |caps: &Captures| self.substitute(name, caps, file))
                .into_owned();
        }
        sanitize::normalize_expanded(&result)
    }

    /// Destination for a sidecar, derived from its primary's final path.
    ///
    /// The sidecar inherits the primary's directory and resolved stem, so a
    /// duplicate suffix picked during planning carries over; the tail after
    /// the shared stem (extension chain, edit markers) is preserved.
    pub fn expand_for_sidecar(
        &self,
        primary: &FileRef,
        primary_dest: &Path,
        sidecar: &FileRef,
    ) -> PathBuf {
        let dir = primary_dest.parent().unwrap_or_else(|| Path::new(""));
        let dest_stem = primary_dest
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        let sidecar_name = sidecar.file_name();
        let source_stem = primary.stem();
        let new_name = match sidecar_name.strip_prefix(source_stem) {
            Some(tail) if !source_stem.is_empty() => format!("{}{}", dest_stem, tail),
            _ => sidecar_name.to_string(),
        };

        dir.join(new_name)
    }

    fn substitute(&self, name: &str, caps: &Captures, file: &FileRef) -> String {
        let raw = self.resolve_raw(name, file);
        let mut value = sanitize::sanitize_component(&sanitize::apply_casing(&raw, self.casing));

        if !value.is_empty() {
            if let Some(cond_spec) = caps.get(1) {
                if !self.conditions_met(name, file, cond_spec.as_str()) {
                    value.clear();
                }
            }
        }

        if value.is_empty() {
            value = self.fallback_value(caps.get(2).map(|m| m.as_str()), file);
        }

        value
    }

    fn conditions_met(&self, name: &str, file: &FileRef, spec: &str) -> bool {
        let conditions = parse_conditions(spec);
        if conditions.is_empty() {
            return true;
        }

        // Counts are tracked for location fields only; without a context
        // (or for other variables) a non-empty value is enough.
        let (Some(field), Some(context)) = (location_field(name), self.context.as_ref()) else {
            return true;
        };

        // Conditions count the underlying value, before country expansion
        // or casing changes the string the histogram saw.
        let key = self.location_value(file, field);
        let count = context.count(field, &key);
        conditions.iter().all(|c| match c {
            Condition::Min(n) => count >= *n,
            Condition::Max(n) => count <= *n,
        })
    }

    fn fallback_value(&self, fallback: Option<&str>, file: &FileRef) -> String {
        match fallback {
            Some(fb) if VARIABLES.contains(&fb) => {
                let raw = self.resolve_raw(fb, file);
                let value =
                    sanitize::sanitize_component(&sanitize::apply_casing(&raw, self.casing));
                if value.is_empty() {
                    self.unknown_location_fallback.clone()
                } else {
                    value
                }
            }
            // A fallback that is not a variable name is a literal, kept as
            // written in the template.
            Some(fb) => fb.to_string(),
            None => self.unknown_location_fallback.clone(),
        }
    }

    fn resolve_raw(&self, name: &str, file: &FileRef) -> String {
        match name {
            "year" => file.date_time.best().format("%Y").to_string(),
            "month" => file.date_time.best().format("%m").to_string(),
            "day" => file.date_time.best().format("%d").to_string(),
            "district" => self.location_value(file, LocationField::District),
            "city" => self.location_value(file, LocationField::City),
            "county" => self.location_value(file, LocationField::County),
            "state" => self.location_value(file, LocationField::State),
            "country" => country::expand(
                &self.location_value(file, LocationField::Country),
                self.use_full_country_names,
            ),
            "directory" => file.parent_directory_name().to_string(),
            "name" | "nameNoExtension" => file.stem().to_string(),
            "ext" => file.extension(),
            "filename" => file.file_name().to_string(),
            "camera" => file.camera.clone().unwrap_or_default(),
            "album" => file.album.clone().unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// Location component for a file, masked by the configured granularity.
    ///
    /// `{city}` borrows the district when the city itself is unknown, but
    /// only at `City` granularity; coarser settings blank the finer fields
    /// outright.
    fn location_value(&self, file: &FileRef, field: LocationField) -> String {
        let Some(location) = &file.location else {
            return String::new();
        };

        use LocationGranularity as G;
        let value = match field {
            LocationField::District => {
                if self.granularity <= G::City {
                    location.district.clone()
                } else {
                    None
                }
            }
            LocationField::City => match self.granularity {
                G::District => location.city.clone(),
                G::City => location.city.clone().or_else(|| location.district.clone()),
                _ => None,
            },
            LocationField::County => {
                if self.granularity <= G::County {
                    location.county.clone()
                } else {
                    None
                }
            }
            LocationField::State => {
                if self.granularity <= G::State {
                    location.state.clone()
                } else {
                    None
                }
            }
            LocationField::Country => location.country.clone(),
        };

        value.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocationStatistics;
    use crate::media::test_support::file_ref;
    use crate::media::LocationData;

    fn config() -> CopyConfig {
        CopyConfig::default()
    }

    fn located(path: &str, city: Option<&str>, district: Option<&str>, country: Option<&str>) -> FileRef {
        let mut file = file_ref(path, 100, Some((2023, 6, 15)));
        file.location = Some(LocationData {
            district: district.map(str::to_string),
            city: city.map(str::to_string),
            county: None,
            state: None,
            country: country.map(str::to_string),
        });
        file
    }

    #[test]
    fn test_date_layout() {
        let template = PathTemplate::new("/dest/{year}/{month}/{name}{ext}", &config());
        let file = file_ref("/src/a.jpg", 100, Some((2023, 6, 15)));
        assert_eq!(template.expand(&file), "/dest/2023/06/a.jpg");
    }

    #[test]
    fn test_filename_variables() {
        let template = PathTemplate::new("/dest/{filename}", &config());
        let file = file_ref("/src/a.jpg", 100, Some((2023, 6, 15)));
        assert_eq!(template.expand(&file), "/dest/a.jpg");

        let template = PathTemplate::new("/dest/{nameNoExtension}{ext}", &config());
        assert_eq!(template.expand(&file), "/dest/a.jpg");
    }

    #[test]
    fn test_unknown_token_passes_through() {
        let template = PathTemplate::new("/dest/{bogus}/{name}{ext}", &config());
        let file = file_ref("/src/a.jpg", 100, Some((2023, 6, 15)));
        assert_eq!(template.expand(&file), "/dest/{bogus}/a.jpg");
    }

    #[test]
    fn test_city_with_fallback_variable() {
        let template = PathTemplate::new("/dest/{city|country}/{name}{ext}", &config());

        let with_city = located("/src/a.jpg", Some("Prague"), None, Some("CZ"));
        assert_eq!(template.expand(&with_city), "/dest/Prague/a.jpg");

        let without_city = located("/src/b.jpg", None, None, Some("CZ"));
        assert_eq!(template.expand(&without_city), "/dest/CZ/b.jpg");
    }

    #[test]
    fn test_literal_fallback() {
        let template = PathTemplate::new("/dest/{album|misc}/{name}{ext}", &config());
        let file = file_ref("/src/a.jpg", 100, Some((2023, 6, 15)));
        assert_eq!(template.expand(&file), "/dest/misc/a.jpg");
    }

    #[test]
    fn test_unknown_location_fallback() {
        let template = PathTemplate::new("/dest/{city}/{name}{ext}", &config());
        let file = file_ref("/src/a.jpg", 100, Some((2023, 6, 15)));
        assert_eq!(template.expand(&file), "/dest/unknown/a.jpg");
    }

    #[test]
    fn test_min_condition_consults_counts() {
        let stats = Arc::new(LocationStatistics::new());
        let prague = LocationData {
            city: Some("Prague".to_string()),
            country: Some("CZ".to_string()),
            ..LocationData::default()
        };
        for _ in 0..3 {
            stats.record(&prague);
        }

        let template = PathTemplate::new("/dest/{city?min=5|country}/{name}{ext}", &config())
            .with_context(stats.clone());
        let file = located("/src/a.jpg", Some("Prague"), None, Some("CZ"));
        assert_eq!(template.expand(&file), "/dest/CZ/a.jpg");

        for _ in 0..5 {
            stats.record(&prague);
        }
        assert_eq!(template.expand(&file), "/dest/Prague/a.jpg");
    }

    #[test]
    fn test_max_condition() {
        let stats = Arc::new(LocationStatistics::new());
        let prague = LocationData {
            city: Some("Prague".to_string()),
            ..LocationData::default()
        };
        for _ in 0..10 {
            stats.record(&prague);
        }

        let template = PathTemplate::new("/dest/{city?max=5|overflow}/{name}{ext}", &config())
            .with_context(stats);
        let file = located("/src/a.jpg", Some("Prague"), None, None);
        assert_eq!(template.expand(&file), "/dest/overflow/a.jpg");
    }

    #[test]
    fn test_conditions_without_context_pass() {
        let template = PathTemplate::new("/dest/{city?min=100}/{name}{ext}", &config());
        let file = located("/src/a.jpg", Some("Prague"), None, None);
        assert_eq!(template.expand(&file), "/dest/Prague/a.jpg");
    }

    #[test]
    fn test_city_borrows_district_at_city_granularity() {
        let template = PathTemplate::new("/dest/{city}/{name}{ext}", &config());
        let file = located("/src/a.jpg", None, Some("Vinohrady"), None);
        assert_eq!(template.expand(&file), "/dest/Vinohrady/a.jpg");
    }

    #[test]
    fn test_granularity_blanks_finer_fields() {
        let mut cfg = config();
        cfg.location_granularity = LocationGranularity::State;

        let template = PathTemplate::new("/dest/{city|country}/{name}{ext}", &cfg);
        let file = located("/src/a.jpg", Some("Prague"), None, Some("CZ"));
        assert_eq!(template.expand(&file), "/dest/CZ/a.jpg");
    }

    #[test]
    fn test_country_expansion() {
        let mut cfg = config();
        cfg.use_full_country_names = true;

        let template = PathTemplate::new("/dest/{country}/{name}{ext}", &cfg);
        let file = located("/src/a.jpg", None, None, Some("CZ"));
        assert_eq!(template.expand(&file), "/dest/Czechia/a.jpg");
    }

    #[test]
    fn test_casing_applies_to_values() {
        let mut cfg = config();
        cfg.path_casing = PathCasing::Lower;

        let template = PathTemplate::new("/dest/{city}/{name}{ext}", &cfg);
        let file = located("/src/IMG.JPG", Some("Prague"), None, None);
        assert_eq!(template.expand(&file), "/dest/prague/img.jpg");
    }

    #[test]
    fn test_empty_variable_leaves_no_debris() {
        let template = PathTemplate::new("/dest/{year}/{camera|}-{name}{ext}", &config());
        let file = file_ref("/src/a.jpg", 100, Some((2023, 6, 15)));
        // Empty literal fallback, then normalization strips the orphan dash
        assert_eq!(template.expand(&file), "/dest/2023/a.jpg");
    }

    #[test]
    fn test_sidecar_inherits_resolved_stem() {
        let template = PathTemplate::new("/dest/{name}{ext}", &config());
        let primary = file_ref("/src/p.jpg", 100, None);
        let sidecar = file_ref("/src/p.xmp", 10, None);

        let dest = template.expand_for_sidecar(&primary, Path::new("/dest/2024/p-1.jpg"), &sidecar);
        assert_eq!(dest, PathBuf::from("/dest/2024/p-1.xmp"));

        let double_ext = file_ref("/src/p.jpg.xmp", 10, None);
        let dest =
            template.expand_for_sidecar(&primary, Path::new("/dest/2024/p-1.jpg"), &double_ext);
        assert_eq!(dest, PathBuf::from("/dest/2024/p-1.jpg.xmp"));
    }

    #[test]
    fn test_sidecar_with_unrelated_name() {
        let template = PathTemplate::new("/dest/{name}{ext}", &config());
        let primary = file_ref("/src/p.jpg", 100, None);
        let sidecar = file_ref("/src/metadata.json", 10, None);

        let dest = template.expand_for_sidecar(&primary, Path::new("/dest/2024/p.jpg"), &sidecar);
        assert_eq!(dest, PathBuf::from("/dest/2024/metadata.json"));
    }
}
