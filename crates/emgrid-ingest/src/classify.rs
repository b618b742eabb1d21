//! Filename classification
//!
//! Emission rasters arrive named `emission.<marker>.<token>.<ext>` where the
//! marker selects the geometry category and the token carries the pollutant.
//! Several legacy naming variants embed a 4-digit year inside the token
//! (`emission.p.2001_co.tif`, optionally with trailing segments). The
//! classifier maps any filename to a `(category, subcategory)` pair and never
//! fails: an unparseable name degrades to `unknown` with a diagnostic and the
//! pipeline keeps going.
//!
//! Classification is pure string work, no I/O.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Fallback value for an unresolved category or subcategory.
pub const UNKNOWN_TOKEN: &str = "unknown";

/// Pollutant tokens observed in production data. Purely diagnostic: a
/// subcategory outside this set is still accepted.
const KNOWN_POLLUTANTS: [&str; 7] = ["co", "nox", "nh3", "voc", "pm10", "sox", "tsp"];

/// Geometry category of an emission raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Point,
    Line,
    Area,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Point => "point",
            Category::Line => "line",
            Category::Area => "area",
            Category::Unknown => UNKNOWN_TOKEN,
        }
    }

    /// Map the single-letter filename marker to a category.
    fn from_marker(marker: &str) -> Self {
        match marker {
            "p" => Category::Point,
            "l" => Category::Line,
            "a" => Category::Area,
            _ => Category::Unknown,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    pub subcategory: String,
}

/// One subcategory extraction rule: a pattern and the capture group holding
/// the subcategory token.
struct SubcategoryRule {
    pattern: Regex,
    group: usize,
}

fn marker_pattern() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"^emission\.([a-z])\.").expect("marker pattern is valid"))
}

fn year_prefix_pattern() -> &'static Regex {
    static YEAR_PREFIX: OnceLock<Regex> = OnceLock::new();
    YEAR_PREFIX.get_or_init(|| Regex::new(r"^\d{4}_(.+)$").expect("year prefix pattern is valid"))
}

/// Subcategory rules in strict priority order, first match wins:
///
/// 1. direct token right after the marker: `emission.p.co.tif`
/// 2. year-prefixed token: `emission.a.2001_nh3.tif`
/// 3. year-prefixed token with trailing segments: `emission.l.2010_pm10_extra.tif`
/// 4. any token between dots, year prefix stripped afterwards
fn subcategory_rules() -> &'static [SubcategoryRule] {
    static RULES: OnceLock<Vec<SubcategoryRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let rule = |pattern: &str, group: usize| SubcategoryRule {
            pattern: Regex::new(pattern).expect("subcategory pattern is valid"),
            group,
        };
        vec![
            rule(r"^emission\.[a-z]\.([a-z0-9]+)\.[a-z0-9]+$", 1),
            rule(r"^emission\.[a-z]\.\d{4}_([a-z0-9]+)\.[a-z0-9]+$", 1),
            rule(r"^emission\.[a-z]\.\d{4}_([a-z0-9]+)(?:_[a-z0-9]+)+\.[a-z0-9]+$", 1),
            rule(r"\.([a-z0-9_]+)\.", 1),
        ]
    })
}

/// Classify a raw filename into its `(category, subcategory)` pair.
///
/// Never fails. Worst case both fields come back as `unknown` and a
/// diagnostic is emitted; the caller keeps processing with degraded
/// metadata.
pub fn classify(filename: &str) -> Classification {
    let name = filename.to_lowercase();

    let category = match marker_pattern().captures(&name) {
        Some(caps) => {
            let category = Category::from_marker(&caps[1]);
            if category == Category::Unknown {
                warn!(file = %filename, marker = &caps[1], "Unrecognized category marker");
            }
            category
        }
        None => {
            warn!(file = %filename, "Filename carries no category marker");
            Category::Unknown
        }
    };

    let mut subcategory = extract_subcategory(&name);

    // Defensive re-check: a rule may have yielded a token that still carries
    // a year prefix.
    subcategory = strip_year_prefix(&subcategory);

    if subcategory == UNKNOWN_TOKEN {
        warn!(file = %filename, "No subcategory token found");
    } else if !KNOWN_POLLUTANTS.contains(&subcategory.as_str()) {
        debug!(file = %filename, subcategory = %subcategory, "Subcategory outside the known pollutant set");
    }

    Classification {
        category,
        subcategory,
    }
}

fn extract_subcategory(name: &str) -> String {
    for rule in subcategory_rules() {
        if let Some(caps) = rule.pattern.captures(name) {
            if let Some(token) = caps.get(rule.group) {
                return token.as_str().to_string();
            }
        }
    }
    UNKNOWN_TOKEN.to_string()
}

/// Strip a leading `YYYY_` year prefix if present.
fn strip_year_prefix(token: &str) -> String {
    match year_prefix_pattern().captures(token) {
        Some(caps) => caps[1].to_string(),
        None => token.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_token() {
        let c = classify("emission.p.co.tif");
        assert_eq!(c.category, Category::Point);
        assert_eq!(c.subcategory, "co");
    }

    #[test]
    fn test_year_prefixed_token() {
        let c = classify("emission.a.2001_nh3.tif");
        assert_eq!(c.category, Category::Area);
        assert_eq!(c.subcategory, "nh3");
    }

    #[test]
    fn test_year_prefixed_token_with_trailing_segments() {
        let c = classify("emission.l.2010_pm10_extra.tif");
        assert_eq!(c.category, Category::Line);
        assert_eq!(c.subcategory, "pm10");
    }

    #[test]
    fn test_all_category_markers() {
        assert_eq!(classify("emission.p.co.tif").category, Category::Point);
        assert_eq!(classify("emission.l.nox.tif").category, Category::Line);
        assert_eq!(classify("emission.a.sox.tif").category, Category::Area);
    }

    #[test]
    fn test_unrecognized_marker_keeps_subcategory() {
        let c = classify("emission.x.co.tif");
        assert_eq!(c.category, Category::Unknown);
        assert_eq!(c.subcategory, "co");
    }

    #[test]
    fn test_missing_marker_falls_back_to_between_dots() {
        let c = classify("data.2001_co.tif");
        assert_eq!(c.category, Category::Unknown);
        // Fallback token with its embedded year prefix stripped
        assert_eq!(c.subcategory, "co");
    }

    #[test]
    fn test_unmatched_filename_degrades_to_unknown() {
        let c = classify("notes");
        assert_eq!(c.category, Category::Unknown);
        assert_eq!(c.subcategory, UNKNOWN_TOKEN);
    }

    #[test]
    fn test_uppercase_filename_is_normalized() {
        let c = classify("EMISSION.P.CO.TIF");
        assert_eq!(c.category, Category::Point);
        assert_eq!(c.subcategory, "co");
    }

    #[test]
    fn test_classification_is_deterministic() {
        let a = classify("emission.a.2005_voc.tif");
        let b = classify("emission.a.2005_voc.tif");
        assert_eq!(a, b);
        assert_eq!(a.subcategory, "voc");
    }

    #[test]
    fn test_strip_year_prefix() {
        assert_eq!(strip_year_prefix("2001_co"), "co");
        assert_eq!(strip_year_prefix("co"), "co");
        assert_eq!(strip_year_prefix("2010_pm10_extra"), "pm10_extra");
        // Needs exactly four leading digits
        assert_eq!(strip_year_prefix("201_co"), "201_co");
    }
}
