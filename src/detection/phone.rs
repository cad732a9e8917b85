//! Phone number plausibility checks.
//!
//! The naive phone pattern matches any run of 8-16 digits with separators, so
//! every candidate passes through three gates before it is accepted:
//! - date and timestamp shapes are rejected outright
//! - the digit count after normalization must fall inside configured bounds
//! - some region's numbering plan must accept the number

use lru::LruCache;
use phonenumber::country;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};
use tracing::debug;

/// Date and time shapes that the phone pattern would otherwise pick up
const DATE_TIME_PATTERNS: &[&str] = &[
    // YYYY-MM-DD, optionally followed by more digits
    r"(?:^|\s)([0-9]{4}[-/\s](?:0?[1-9]|1[0-2])[-/\s](?:0?[1-9]|[12][0-9]|3[01])(?:[-/\s]+[0-9]+)?)(?:$|\s)",
    // DD-MM-YYYY
    r"(?:^|\s)(?:0?[1-9]|[12][0-9]|3[01])[-/\s](?:0?[1-9]|1[0-2])[-/\s][0-9]{4}(?:$|\s)",
    // YYYYMMDD
    r"(?:^|\s)(?:(?:19|20)[0-9]{2}(?:0[1-9]|1[0-2])(?:0[1-9]|[12][0-9]|3[01]))(?:$|\s)",
    // H:MM[:SS]
    r"(?:^|\s)[0-9]{1,2}:[0-9]{1,2}(?::[0-9]{1,2})?(?:$|\s)",
    // Compact timestamps, YYYYMMDD followed by a time
    r"\b(?:19|20)[0-9]{2}(?:0[1-9]|1[0-2])[0-3][0-9]{4,}\b",
];

fn date_time_regexes() -> &'static [Regex] {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        DATE_TIME_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("Invalid date/time regex"))
            .collect()
    })
}

fn extension_regex() -> &'static Regex {
    static COMPILED: OnceLock<Regex> = OnceLock::new();
    COMPILED.get_or_init(|| {
        Regex::new(r"(?i)(?:;ext=|extension|ext\.?|x|#|,)\s*[0-9]+").expect("Invalid extension regex")
    })
}

/// Whether the candidate looks like a date or a time of day
pub fn looks_like_date_or_time(value: &str) -> bool {
    let value = value.trim();
    date_time_regexes().iter().any(|re| re.is_match(value))
}

/// Digits of the number with separators, extension suffix and a leading `+`
/// stripped. Returns the digits and whether the number was internationally
/// formatted.
pub fn normalize_phone_digits(value: &str) -> (String, bool) {
    let trimmed = value.trim();
    let main_part = match extension_regex().find(trimmed) {
        Some(ext) => &trimmed[..ext.start()],
        None => trimmed,
    };
    let digits: String = main_part.chars().filter(|c| c.is_ascii_digit()).collect();
    (digits, main_part.starts_with('+'))
}

/// Whether the value begins with `+`, ignoring leading punctuation
pub fn is_internationally_formatted(value: &str) -> bool {
    value
        .trim()
        .chars()
        .find(|c| c.is_ascii_digit() || *c == '+')
        .is_some_and(|c| c == '+')
}

/// Settings for phone validation
#[derive(Debug, Clone)]
pub struct PhoneRules {
    pub min_digits: usize,
    pub max_digits: usize,
    /// Regions tried after the caller's region and the region-less parse
    pub fallback_regions: Vec<String>,
    /// Upper bound on memoized (region, digits) verdicts
    pub cache_size: usize,
}

impl Default for PhoneRules {
    fn default() -> Self {
        Self {
            min_digits: 7,
            max_digits: 15,
            fallback_regions: vec!["US".to_string(), "KR".to_string()],
            cache_size: 2000,
        }
    }
}

/// Validates phone-shaped candidates against numbering plans
#[derive(Debug)]
pub struct PhoneValidator {
    rules: PhoneRules,
    /// Numbering-plan verdicts keyed by `region|digits`; `None` when disabled
    cache: Option<Mutex<LruCache<String, bool>>>,
}

impl Default for PhoneValidator {
    fn default() -> Self {
        Self::new(PhoneRules::default())
    }
}

impl PhoneValidator {
    pub fn new(rules: PhoneRules) -> Self {
        let cache = NonZeroUsize::new(rules.cache_size).map(|cap| Mutex::new(LruCache::new(cap)));
        Self { rules, cache }
    }

    /// Decide whether `value` is a plausible phone number.
    ///
    /// `region` is the caller's locale region, tried first.
    pub fn is_plausible(&self, value: &str, region: Option<&str>) -> bool {
        if looks_like_date_or_time(value) {
            return false;
        }

        let (digits, _) = normalize_phone_digits(value);
        if digits.len() < self.rules.min_digits || digits.len() > self.rules.max_digits {
            return false;
        }

        if let Some(region) = region {
            if self.check(value, &digits, Some(region)) {
                return true;
            }
        }

        if is_internationally_formatted(value) && self.check(value, &digits, None) {
            return true;
        }

        self.rules
            .fallback_regions
            .iter()
            .filter(|fallback| Some(fallback.as_str()) != region)
            .any(|fallback| self.check(value, &digits, Some(fallback)))
    }

    fn check(&self, value: &str, digits: &str, region: Option<&str>) -> bool {
        let Some(cache) = &self.cache else {
            return validate_with_plan(value, region);
        };
        let key = format!("{}|{}", region.unwrap_or("ANY"), digits);

        if let Some(&valid) = cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return valid;
        }

        let valid = validate_with_plan(value, region);
        cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(key, valid);
        valid
    }

    #[cfg(test)]
    fn cached_entries(&self) -> usize {
        self.cache
            .as_ref()
            .map_or(0, |cache| cache.lock().unwrap_or_else(|e| e.into_inner()).len())
    }
}

fn validate_with_plan(value: &str, region: Option<&str>) -> bool {
    let country = match region {
        Some(code) => match code.parse::<country::Id>() {
            Ok(id) => Some(id),
            Err(_) => {
                debug!(region = code, "Unknown phone region, skipping");
                return false;
            }
        },
        None => None,
    };

    match phonenumber::parse(country, value) {
        Ok(number) => phonenumber::is_valid(&number),
        Err(_) => false,
    }
}
