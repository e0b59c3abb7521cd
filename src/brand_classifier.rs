use crate::search_data_manager::QueryRow;

/// Case-insensitive literal substring matcher built from a comma-separated
/// keyword list. No pattern syntax: fragments are matched verbatim.
#[derive(Debug, Clone)]
pub struct BrandMatcher {
    fragments: Vec<String>,
}

impl BrandMatcher {
    pub fn from_keywords(keywords: &str) -> Self {
        // Trimmed, lowercased, empties dropped so a stray comma cannot
        // produce a fragment that matches every term.
        let fragments = keywords
            .split(',')
            .map(|fragment| fragment.trim().to_lowercase())
            .filter(|fragment| !fragment.is_empty())
            .collect();

        BrandMatcher { fragments }
    }

    /// An empty fragment list never matches, so with no keywords every row
    /// classifies as non-branded.
    pub fn matches(&self, term: &str) -> bool {
        if self.fragments.is_empty() {
            return false;
        }
        let term_lower = term.to_lowercase();
        self.fragments.iter().any(|fragment| term_lower.contains(fragment))
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Drop rows below the impressions threshold, then split the remainder into
/// (branded, non_branded). Every surviving row lands in exactly one side.
pub fn partition(
    rows: &[QueryRow],
    matcher: &BrandMatcher,
    min_impressions: u64,
) -> (Vec<QueryRow>, Vec<QueryRow>) {
    rows.iter()
        .filter(|row| row.impressions >= min_impressions)
        .cloned()
        .partition(|row| matcher.matches(&row.term))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(term: &str, impressions: u64) -> QueryRow {
        QueryRow {
            category: "shoes".to_string(),
            term: term.to_string(),
            impressions,
            clicks: impressions / 10,
            position: 1.0,
            ctr: 0.1,
        }
    }

    #[test]
    fn test_case_insensitive_substring_match() {
        let matcher = BrandMatcher::from_keywords("Nike");
        assert!(matcher.matches("nike air max 2021"));
        assert!(matcher.matches("NIKE SHOES"));
        assert!(!matcher.matches("bike"));
    }

    #[test]
    fn test_multiple_fragments_are_trimmed() {
        let matcher = BrandMatcher::from_keywords(" nike , adidas ");
        assert!(matcher.matches("adidas samba"));
        assert!(matcher.matches("best nike deals"));
        assert!(!matcher.matches("puma running"));
    }

    #[test]
    fn test_empty_keyword_string_never_matches() {
        for keywords in ["", "   ", " , ,  "] {
            let matcher = BrandMatcher::from_keywords(keywords);
            assert!(matcher.is_empty());
            assert!(!matcher.matches("nike air max"));
        }
    }

    #[test]
    fn test_stray_empty_fragment_does_not_match_everything() {
        let matcher = BrandMatcher::from_keywords("nike, ,adidas");
        assert!(!matcher.matches("puma running"));
        assert!(matcher.matches("nike sb"));
    }

    #[test]
    fn test_special_characters_are_literal() {
        let matcher = BrandMatcher::from_keywords("c++ store, a.b");
        assert!(matcher.matches("best C++ Store downtown"));
        assert!(matcher.matches("a.b testing"));
        // A regex would let '.' match any character; a literal match must not.
        assert!(!matcher.matches("axb testing"));
    }

    #[test]
    fn test_partition_is_complete_and_disjoint() {
        let rows = vec![
            row("nike air", 500),
            row("running shoes", 300),
            row("nike pegasus", 200),
            row("trail shoes", 100),
        ];
        let matcher = BrandMatcher::from_keywords("nike");
        let (branded, non_branded) = partition(&rows, &matcher, 0);

        assert_eq!(branded.len() + non_branded.len(), rows.len());
        assert!(branded.iter().all(|r| matcher.matches(&r.term)));
        assert!(non_branded.iter().all(|r| !matcher.matches(&r.term)));
    }

    #[test]
    fn test_threshold_drops_rows_from_both_sides() {
        let rows = vec![
            row("nike air", 999),
            row("nike sb", 1000),
            row("running shoes", 50),
            row("trail shoes", 2000),
        ];
        let matcher = BrandMatcher::from_keywords("nike");
        let (branded, non_branded) = partition(&rows, &matcher, 1000);

        assert_eq!(branded.len(), 1);
        assert_eq!(branded[0].term, "nike sb");
        assert_eq!(non_branded.len(), 1);
        assert_eq!(non_branded[0].term, "trail shoes");
    }

    #[test]
    fn test_raising_threshold_never_grows_either_side() {
        let rows: Vec<QueryRow> = (0..50)
            .map(|i| row(if i % 2 == 0 { "nike run" } else { "run" }, i * 100))
            .collect();
        let matcher = BrandMatcher::from_keywords("nike");

        let mut prev_sizes = (usize::MAX, usize::MAX);
        for threshold in [0, 500, 1000, 2500, 5000] {
            let (branded, non_branded) = partition(&rows, &matcher, threshold);
            assert!(branded.len() <= prev_sizes.0);
            assert!(non_branded.len() <= prev_sizes.1);
            prev_sizes = (branded.len(), non_branded.len());
        }
    }

    #[test]
    fn test_no_match_keyword_yields_empty_branded_side() {
        let rows = vec![row("nike air", 500), row("running shoes", 300)];
        let matcher = BrandMatcher::from_keywords("zzzznomatch");
        let (branded, non_branded) = partition(&rows, &matcher, 0);
        assert!(branded.is_empty());
        assert_eq!(non_branded.len(), 2);
    }
}
