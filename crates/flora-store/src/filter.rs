//! Client-side plant search over a fetched page

use flora_api::{Page, Plant};

/// Trimmed, lowercased search text. Blank text matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlantQuery {
    needle: Option<String>,
}

impl PlantQuery {
    pub fn new(text: &str) -> Self {
        let trimmed = text.trim();
        Self {
            needle: (!trimmed.is_empty()).then(|| trimmed.to_lowercase()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.needle.is_none()
    }

    pub fn matches(&self, plant: &Plant) -> bool {
        match &self.needle {
            Some(needle) => plant.matches_lowercase(needle),
            None => true,
        }
    }

    /// Filter the page items. `total` keeps the server's count so paging
    /// controls still reflect the unfiltered collection.
    pub fn apply(&self, page: Page<Plant>) -> Page<Plant> {
        if self.is_empty() {
            return page;
        }
        Page {
            items: page.items.into_iter().filter(|p| self.matches(p)).collect(),
            ..page
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flora_api::PlantStatus;

    fn plant(id: u64, scientific: &str, common: &[&str]) -> Plant {
        Plant {
            id,
            scientific_name: scientific.to_string(),
            common_names: common.iter().map(|s| s.to_string()).collect(),
            status: PlantStatus::Active,
            taxonomy_id: 1,
            family_id: None,
            created_at: Default::default(),
            updated_at: Default::default(),
            images: vec![],
            taxonomy: None,
        }
    }

    fn sample() -> Page<Plant> {
        Page {
            items: vec![
                plant(1, "Rosa canina", &["Dog rose", "Escaramujo"]),
                plant(2, "Quercus robur", &["English oak"]),
                plant(3, "Malus domestica", &["Apple"]),
            ],
            total: 57,
            page: 1,
            limit: 25,
        }
    }

    #[test]
    fn test_matches_common_name_case_insensitive() {
        let page = PlantQuery::new("  ROSE ").apply(sample());
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, 1);
        assert_eq!(page.total, 57);
    }

    #[test]
    fn test_matches_scientific_name() {
        let page = PlantQuery::new("quercus").apply(sample());
        assert_eq!(page.items.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_blank_query_keeps_everything() {
        assert!(PlantQuery::new("   ").is_empty());
        assert_eq!(PlantQuery::new("").apply(sample()), sample());
    }

    #[test]
    fn test_result_is_subset_of_page() {
        let original = sample();
        for text in ["a", "o", "rob", "zzz", "APPLE", "escaramujo"] {
            let query = PlantQuery::new(text);
            let filtered = query.apply(original.clone());
            assert!(filtered
                .items
                .iter()
                .all(|p| original.items.contains(p) && query.matches(p)));
        }
    }
}
