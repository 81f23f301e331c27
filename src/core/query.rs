//! Overpass QL compilation.
//!
//! A request's area and filter selection compile to one query string. The
//! text is deterministic (fixed coordinate precision, canonical category
//! order) so it can double as the cache identity.

use crate::models::{CompiledQuery, SearchArea};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Upper bound on explicit `key=value` filters in one request
pub const MAX_TAG_FILTERS: usize = 8;

/// Element types requested for every selector
const ELEMENT_TYPES: [&str; 3] = ["node", "way", "relation"];

/// Logical POI category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Gym,
    Nutritionist,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Gym, Category::Nutritionist];

    pub fn name(self) -> &'static str {
        match self {
            Category::Gym => "gym",
            Category::Nutritionist => "nutritionist",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "gym" | "gyms" | "fitness" => Some(Category::Gym),
            "nutritionist" | "nutritionists" | "dietitian" => Some(Category::Nutritionist),
            _ => None,
        }
    }

    /// OSM tags that identify this category
    pub fn predicates(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Category::Gym => &[("amenity", "fitness_centre"), ("leisure", "fitness_centre")],
            Category::Nutritionist => &[
                ("healthcare", "nutritionist"),
                ("office", "dietitian"),
                ("healthcare", "dietitian"),
            ],
        }
    }

    /// Search term sent to the commercial places API
    pub fn search_term(self) -> &'static str {
        match self {
            Category::Gym => "gym",
            Category::Nutritionist => "nutritionist",
        }
    }

    /// Classify an OSM element by its tags
    pub fn classify(tags: &Map<String, Value>) -> Option<Self> {
        Category::ALL.into_iter().find(|category| {
            category
                .predicates()
                .iter()
                .any(|(key, value)| tags.get(*key).and_then(Value::as_str) == Some(*value))
        })
    }
}

/// Explicit tag predicate supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TagFilter {
    pub key: String,
    pub value: Option<String>,
}

impl TagFilter {
    fn parse(raw: &str) -> Option<Self> {
        let (key, value) = raw.split_once('=')?;
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() {
            return None;
        }

        Some(Self {
            key: key.to_string(),
            value: if value.is_empty() || value == "*" {
                None
            } else {
                Some(value.to_string())
            },
        })
    }

    fn selector(&self) -> String {
        match &self.value {
            Some(value) => format!("[\"{}\"=\"{}\"]", escape_quoted(&self.key), escape_quoted(value)),
            None => format!("[\"{}\"]", escape_quoted(&self.key)),
        }
    }
}

/// Categories and tag filters requested by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    categories: BTreeSet<Category>,
    tags: BTreeSet<TagFilter>,
}

impl FilterSelection {
    /// Parse repeated and/or comma-separated filter values.
    ///
    /// Unknown names are ignored; an empty result compiles to the permissive
    /// default instead of failing.
    pub fn parse<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut selection = Self::default();

        for value in values {
            for item in value.as_ref().split(',').map(str::trim).filter(|s| !s.is_empty()) {
                if let Some(category) = Category::from_name(item) {
                    selection.categories.insert(category);
                } else if let Some(tag) = TagFilter::parse(item) {
                    if selection.tags.len() < MAX_TAG_FILTERS {
                        selection.tags.insert(tag);
                    } else {
                        tracing::debug!("Dropping tag filter beyond limit: {}", item);
                    }
                } else {
                    tracing::debug!("Ignoring unknown filter: {}", item);
                }
            }
        }

        selection
    }

    pub fn with_categories(categories: &[Category]) -> Self {
        Self {
            categories: categories.iter().copied().collect(),
            tags: BTreeSet::new(),
        }
    }

    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.categories.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.tags.is_empty()
    }

    fn selectors(&self) -> Vec<String> {
        if self.is_empty() {
            return vec!["[\"amenity\"]".to_string()];
        }

        let mut selectors: Vec<String> = self
            .categories
            .iter()
            .flat_map(|category| category.predicates().iter())
            .map(|(key, value)| format!("[\"{}\"=\"{}\"]", escape_quoted(key), escape_quoted(value)))
            .collect();
        selectors.extend(self.tags.iter().map(TagFilter::selector));

        let mut seen = BTreeSet::new();
        selectors.retain(|selector| seen.insert(selector.clone()));
        selectors
    }
}

/// Compiles search areas and filters into Overpass QL
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder {
    query_timeout_secs: u32,
}

impl QueryBuilder {
    pub fn new(query_timeout_secs: u32) -> Self {
        Self {
            query_timeout_secs: query_timeout_secs.max(1),
        }
    }

    pub fn compile(&self, area: &SearchArea, selection: &FilterSelection) -> CompiledQuery {
        let area_filter = render_area(area);

        let mut lines = Vec::new();
        for selector in selection.selectors() {
            for element_type in ELEMENT_TYPES {
                lines.push(format!("  {}{}{};", element_type, selector, area_filter));
            }
        }

        let text = format!(
            "[out:json][timeout:{}];\n(\n{}\n);\nout center tags;",
            self.query_timeout_secs,
            lines.join("\n")
        );
        let cache_key = cache_key_for(&text);

        CompiledQuery { text, cache_key }
    }
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new(25)
    }
}

/// Content-addressed cache key for a compiled query
pub fn cache_key_for(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("overpass:{}", hex::encode(digest))
}

fn render_area(area: &SearchArea) -> String {
    match area {
        SearchArea::Radius(query) => format!(
            "(around:{},{:.6},{:.6})",
            query.radius_m(),
            query.lat(),
            query.lon()
        ),
        SearchArea::BoundingBox(bbox) => format!(
            "({:.6},{:.6},{:.6},{:.6})",
            bbox.south(),
            bbox.west(),
            bbox.north(),
            bbox.east()
        ),
    }
}

fn escape_quoted(raw: &str) -> String {
    raw.replace('\\', r"\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::{parse_bbox, validate_radius, GeometryLimits};

    fn radius_area() -> SearchArea {
        let query = validate_radius(Some("33.8938"), Some("35.5018"), Some("1500"), &GeometryLimits::default()).unwrap();
        SearchArea::Radius(query)
    }

    #[test]
    fn test_compile_gym_radius() {
        let compiled = QueryBuilder::new(25).compile(&radius_area(), &FilterSelection::parse(["gym"]));

        assert!(compiled.text.starts_with("[out:json][timeout:25];"));
        assert!(compiled.text.contains("node[\"amenity\"=\"fitness_centre\"](around:1500,33.893800,35.501800);"));
        assert!(compiled.text.contains("way[\"leisure\"=\"fitness_centre\"](around:1500,33.893800,35.501800);"));
        assert!(compiled.text.contains("relation[\"amenity\"=\"fitness_centre\"]"));
        assert!(!compiled.text.contains("dietitian"));
        assert!(compiled.text.ends_with("out center tags;"));
    }

    #[test]
    fn test_compile_bbox_nutritionist() {
        let bbox = parse_bbox("33.8,35.4,33.9,35.6", &GeometryLimits::default()).unwrap();
        let compiled = QueryBuilder::default()
            .compile(&SearchArea::BoundingBox(bbox), &FilterSelection::parse(["nutritionist"]));

        assert!(compiled.text.contains("node[\"healthcare\"=\"nutritionist\"](33.800000,35.400000,33.900000,35.600000);"));
        assert!(compiled.text.contains("node[\"office\"=\"dietitian\"]"));
        assert!(compiled.text.contains("node[\"healthcare\"=\"dietitian\"]"));
    }

    #[test]
    fn test_unknown_categories_fall_back_to_permissive_default() {
        let selection = FilterSelection::parse(["bakery", "", "swimming"]);
        assert!(selection.is_empty());

        let compiled = QueryBuilder::default().compile(&radius_area(), &selection);
        assert!(compiled.text.contains("node[\"amenity\"](around:"));
    }

    #[test]
    fn test_category_order_does_not_change_cache_key() {
        let builder = QueryBuilder::default();
        let a = builder.compile(&radius_area(), &FilterSelection::parse(["gym,nutritionist"]));
        let b = builder.compile(&radius_area(), &FilterSelection::parse(["Nutritionist", "GYM"]));

        assert_eq!(a.text, b.text);
        assert_eq!(a.cache_key, b.cache_key);
        assert!(a.cache_key.starts_with("overpass:"));
        assert_eq!(a.cache_key.len(), "overpass:".len() + 64);
    }

    #[test]
    fn test_different_geometry_changes_cache_key() {
        let builder = QueryBuilder::default();
        let selection = FilterSelection::parse(["gym"]);
        let other = validate_radius(Some("33.8938"), Some("35.5018"), Some("1600"), &GeometryLimits::default()).unwrap();

        let a = builder.compile(&radius_area(), &selection);
        let b = builder.compile(&SearchArea::Radius(other), &selection);
        assert_ne!(a.cache_key, b.cache_key);
    }

    #[test]
    fn test_tag_filter_values_are_escaped() {
        let selection = FilterSelection::parse([r#"name=Joe"](around:999999,0,0);out;"#]);
        let compiled = QueryBuilder::default().compile(&radius_area(), &selection);

        assert!(compiled.text.contains(r#"node["name"="Joe\"](around:999999"#));
        // the injected quote never closes the value
        assert!(!compiled.text.contains(r#"="Joe"]"#));
    }

    #[test]
    fn test_tag_filter_wildcard_and_limit() {
        let raw: Vec<String> = (0..12).map(|i| format!("key{}=*", i)).collect();
        let selection = FilterSelection::parse(raw);
        let compiled = QueryBuilder::default().compile(&radius_area(), &selection);

        assert!(compiled.text.contains("node[\"key0\"](around:"));
        assert_eq!(compiled.text.matches("node[").count(), MAX_TAG_FILTERS);
    }

    #[test]
    fn test_classify_tags() {
        let tags: Map<String, Value> = serde_json::from_str(r#"{"office":"dietitian"}"#).unwrap();
        assert_eq!(Category::classify(&tags), Some(Category::Nutritionist));

        let tags: Map<String, Value> = serde_json::from_str(r#"{"amenity":"cafe"}"#).unwrap();
        assert_eq!(Category::classify(&tags), None);
    }
}
