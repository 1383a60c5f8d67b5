//! Keyword and alias rules mapping a listing onto a marketplace category.

use serde::Serialize;

/// Top-level source category names and the marketplace category they map to.
pub const CATEGORY_ALIASES: &[(&str, &str)] = &[
    ("Phones & Telecommunications", "15032"),
    ("Computer & Office", "58058"),
    ("Consumer Electronics", "293"),
    ("Women's Clothing", "11450"),
    ("Home & Garden", "11700"),
];

pub const FALLBACK_CATEGORY_ID: &str = "99";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingSource {
    /// Matched a title keyword.
    Rule,
    /// Matched a category hint against [`CATEGORY_ALIASES`].
    Alias,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryMapping {
    pub category_id: String,
    pub confidence: f32,
    pub source: MappingSource,
}

impl CategoryMapping {
    fn new(category_id: &str, confidence: f32, source: MappingSource) -> Self {
        Self {
            category_id: category_id.to_owned(),
            confidence,
            source,
        }
    }
}

#[must_use]
pub fn alias_category(name: &str) -> Option<&'static str> {
    CATEGORY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name.trim())
        .map(|(_, id)| *id)
}

/// Title keywords win over hints; hints are tried in order; otherwise the
/// catch-all category with low confidence.
#[must_use]
pub fn map_category<'a, I>(title: &str, hints: I) -> CategoryMapping
where
    I: IntoIterator<Item = &'a str>,
{
    let title = title.to_lowercase();

    if title.contains("case") || title.contains("phone") {
        return CategoryMapping::new("15032", 0.85, MappingSource::Rule);
    }
    if title.contains("laptop") || title.contains("keyboard") {
        return CategoryMapping::new("58058", 0.75, MappingSource::Rule);
    }

    hints
        .into_iter()
        .filter(|h| !h.trim().is_empty())
        .find_map(alias_category)
        .map_or_else(
            || CategoryMapping::new(FALLBACK_CATEGORY_ID, 0.2, MappingSource::Fallback),
            |id| CategoryMapping::new(id, 0.7, MappingSource::Alias),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_keywords_map_by_rule() {
        let m = map_category("Shockproof iPhone CASE", None::<&str>);
        assert_eq!(m.category_id, "15032");
        assert_eq!(m.source, MappingSource::Rule);
        assert!((m.confidence - 0.85).abs() < f32::EPSILON);
    }

    #[test]
    fn computer_keywords_map_by_rule() {
        let m = map_category("Mechanical Keyboard", ["Home & Garden"]);
        assert_eq!(m.category_id, "58058");
        assert_eq!(m.source, MappingSource::Rule);
    }

    #[test]
    fn first_known_hint_wins() {
        let m = map_category("Garden hose", ["", "Unknown", "Home & Garden", "Consumer Electronics"]);
        assert_eq!(m.category_id, "11700");
        assert_eq!(m.source, MappingSource::Alias);
    }

    #[test]
    fn fallback_when_nothing_matches() {
        let m = map_category("Mystery item", ["Toys"]);
        assert_eq!(m.category_id, FALLBACK_CATEGORY_ID);
        assert_eq!(m.source, MappingSource::Fallback);
    }

    #[test]
    fn serializes_with_camel_case_id() {
        let json = serde_json::to_value(map_category("phone", None::<&str>)).unwrap();
        assert_eq!(json["categoryId"], "15032");
        assert_eq!(json["source"], "rule");
    }
}
