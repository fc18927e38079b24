//! Reference shaping between local transactions and the acquirer.
//!
//! Outbound references get a fixed prefix when it still fits the acquirer's
//! length limit, and retried attempts carry a `-<N>` suffix. Both transforms
//! are pure so candidate enumeration can be tested without a network.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::ReferenceConfig;

fn suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(.+)-([0-9]+)$").expect("static regex"))
}

/// Prefix and length rules applied to every outbound reference.
#[derive(Debug, Clone)]
pub struct ReferenceFormat {
    prefix: String,
    max_length: usize,
}

impl ReferenceFormat {
    pub fn new(prefix: impl Into<String>, max_length: usize) -> Self {
        Self {
            prefix: prefix.into(),
            max_length,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prepend the prefix if it is absent and the result still fits.
    pub fn normalize(&self, reference: &str) -> String {
        let fits = reference.chars().count() + self.prefix.chars().count() <= self.max_length;
        if !reference.starts_with(&self.prefix) && fits {
            format!("{}{}", self.prefix, reference)
        } else {
            reference.to_string()
        }
    }

    /// Remove the prefix for local lookups.
    pub fn strip<'a>(&self, reference: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            return reference;
        }
        reference.strip_prefix(self.prefix.as_str()).unwrap_or(reference)
    }

    /// Remote references to query, most recent attempt first.
    ///
    /// `ABC-2` yields `ABC-2`, `ABC-1`, `ABC` (each normalized); a reference
    /// without a numeric suffix yields itself only. Candidates are produced
    /// lazily, one per lookup.
    pub fn candidates<'a>(&'a self, reference: &'a str) -> impl Iterator<Item = String> + Send + 'a {
        let (base, start) = split_suffix(reference).unwrap_or((reference, 0));
        (0..=start).rev().map(move |n| {
            if n == 0 {
                self.normalize(base)
            } else {
                self.normalize(&format!("{}-{}", base, n))
            }
        })
    }
}

impl From<&ReferenceConfig> for ReferenceFormat {
    fn from(config: &ReferenceConfig) -> Self {
        Self::new(config.prefix.clone(), config.max_length)
    }
}

/// Split `<base>-<N>` into its parts. Suffixes too large for `u64` are
/// treated as part of the base.
pub fn split_suffix(reference: &str) -> Option<(&str, u64)> {
    let caps = suffix_pattern().captures(reference)?;
    let base = caps.get(1)?.as_str();
    let number = caps.get(2)?.as_str().parse::<u64>().ok()?;
    Some((base, number))
}

/// Keys used to find the business record that owns a transaction, most
/// specific first: the local reference without prefix, then without the retry
/// suffix (`SNSVT-S00042-3` -> `S00042-3`, `S00042`). A record named
/// `INV-0001` matches on the first key.
pub fn owner_keys<'a>(format: &ReferenceFormat, reference: &'a str) -> Vec<&'a str> {
    let stripped = format.strip(reference);
    match split_suffix(stripped) {
        Some((base, _)) => vec![stripped, base],
        None => vec![stripped],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format() -> ReferenceFormat {
        ReferenceFormat::new("PFX-", 20)
    }

    #[test]
    fn normalize_adds_prefix_when_it_fits() {
        assert_eq!(format().normalize("ABC"), "PFX-ABC");
        // already prefixed
        assert_eq!(format().normalize("PFX-ABC"), "PFX-ABC");
    }

    #[test]
    fn normalize_length_bound_is_inclusive() {
        let f = ReferenceFormat::new("PFX-", 10);
        assert_eq!(f.normalize("ABCDEF"), "PFX-ABCDEF");
        assert_eq!(f.normalize("ABCDEFG"), "ABCDEFG");
    }

    #[test]
    fn prefix_comparison_is_case_sensitive() {
        assert_eq!(format().normalize("pfx-ABC"), "PFX-pfx-ABC");
        assert_eq!(format().strip("pfx-ABC"), "pfx-ABC");
    }

    #[test]
    fn candidates_walk_suffixes_backwards() {
        assert_eq!(
            format().candidates("ABC-2").collect::<Vec<_>>(),
            vec!["PFX-ABC-2", "PFX-ABC-1", "PFX-ABC"]
        );
    }

    #[test]
    fn candidates_for_unsuffixed_reference_is_single_lookup() {
        let f = format();
        assert_eq!(f.candidates("ABC").collect::<Vec<_>>(), vec!["PFX-ABC"]);
        assert_eq!(f.candidates("ABC-x1").collect::<Vec<_>>(), vec!["PFX-ABC-x1"]);
    }

    #[test]
    fn candidates_zero_suffix_queries_base_only() {
        assert_eq!(format().candidates("ABC-0").collect::<Vec<_>>(), vec!["PFX-ABC"]);
    }

    #[test]
    fn huge_suffix_yields_candidates_on_demand() {
        let f = format();
        let first: Vec<_> = f.candidates("ABC-18446744073709551615").take(2).collect();
        assert_eq!(first, vec!["ABC-18446744073709551615", "ABC-18446744073709551614"]);
    }

    #[test]
    fn candidates_apply_length_rule_per_candidate() {
        // suffixed forms are too long for the prefix, the bare base is not
        let f = ReferenceFormat::new("SNSVT-", 20);
        let candidates: Vec<_> = f.candidates("S000000000042-10").collect();
        assert_eq!(candidates[0], "S000000000042-10");
        assert_eq!(candidates[1], "S000000000042-9");
        assert_eq!(candidates[10], "SNSVT-S000000000042");
        assert_eq!(candidates.len(), 11);
    }

    #[test]
    fn only_last_dash_is_a_suffix() {
        assert_eq!(split_suffix("S0001-2-3"), Some(("S0001-2", 3)));
        assert_eq!(split_suffix("-3"), None);
        assert_eq!(split_suffix("S0001-"), None);
    }

    #[test]
    fn owner_keys_try_full_reference_before_base() {
        let f = ReferenceFormat::new("SNSVT-", 20);
        assert_eq!(owner_keys(&f, "SNSVT-S00042-3"), vec!["S00042-3", "S00042"]);
        assert_eq!(owner_keys(&f, "S00042"), vec!["S00042"]);
        assert_eq!(owner_keys(&f, "INV-0001"), vec!["INV-0001", "INV"]);
    }
}
