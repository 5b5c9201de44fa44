/*!
 * File validator chain
 *
 * Validators run in order over every enumerated file before a destination
 * is planned; the first rejection wins. Media-specific validators are
 * supplied by the caller; the engine ships the date-range filter that the
 * configuration exposes.
 */

use chrono::NaiveDate;

use crate::config::CopyConfig;
use crate::media::FileRef;
use crate::plan::ValidationFailure;

/// Outcome of a single validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorOutcome {
    Valid,
    Invalid(String),
}

/// One link in the validation chain
pub trait FileValidator: Send + Sync {
    /// Short name used in skip reports
    fn name(&self) -> &str;

    fn validate(&self, file: &FileRef) -> ValidatorOutcome;
}

/// Ordered validator chain; first failure rejects the file
#[derive(Default)]
pub struct ValidatorChain {
    validators: Vec<Box<dyn FileValidator>>,
}

impl ValidatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain built from the configuration's own filters
    pub fn from_config(config: &CopyConfig) -> Self {
        let mut chain = Self::new();
        if let Some(validator) = DateRangeValidator::from_config(config) {
            chain.push(Box::new(validator));
        }
        chain
    }

    pub fn push(&mut self, validator: Box<dyn FileValidator>) {
        self.validators.push(validator);
    }

    pub fn with(mut self, validator: Box<dyn FileValidator>) -> Self {
        self.push(validator);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// First failure in chain order, or None when the file passes
    pub fn check(&self, file: &FileRef) -> Option<ValidationFailure> {
        for validator in &self.validators {
            if let ValidatorOutcome::Invalid(reason) = validator.validate(file) {
                return Some(ValidationFailure {
                    file: file.path.clone(),
                    validator: validator.name().to_string(),
                    reason,
                });
            }
        }
        None
    }
}

/// Rejects files taken outside the configured date window
pub struct DateRangeValidator {
    min: Option<NaiveDate>,
    max: Option<NaiveDate>,
}

impl DateRangeValidator {
    pub fn new(min: Option<NaiveDate>, max: Option<NaiveDate>) -> Self {
        Self { min, max }
    }

    /// None when the configuration sets no date bounds
    pub fn from_config(config: &CopyConfig) -> Option<Self> {
        if config.min_date.is_none() && config.max_date.is_none() {
            return None;
        }
        Some(Self::new(config.min_date, config.max_date))
    }
}

impl FileValidator for DateRangeValidator {
    fn name(&self) -> &str {
        "date-range"
    }

    fn validate(&self, file: &FileRef) -> ValidatorOutcome {
        let date = file.date_time.best().date_naive();

        if let Some(min) = self.min {
            if date < min {
                return ValidatorOutcome::Invalid(format!(
                    "taken {} is before minimum date {}",
                    date, min
                ));
            }
        }

        if let Some(max) = self.max {
            if date > max {
                return ValidatorOutcome::Invalid(format!(
                    "taken {} is after maximum date {}",
                    date, max
                ));
            }
        }

        ValidatorOutcome::Valid
    }
}
