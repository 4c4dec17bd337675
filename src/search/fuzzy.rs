use crate::data::types::{CatalogEntry, ForeignListing, ScoredEntry, StockMatch};
use crate::search::normalize::normalize;

pub const MAX_RESULTS: usize = 10;

const EXACT_SCORE: f64 = 1000.0;
const PREFIX_SCORE: f64 = 500.0;
const SUBSTRING_BASE: f64 = 100.0;
const SECTOR_WEIGHT: f64 = 0.8;

/// Query prepared once per search
struct PreparedQuery {
    normalized: String,
    lower: String,
}

impl PreparedQuery {
    fn new(query: &str) -> Self {
        Self {
            normalized: normalize(query),
            lower: query.to_lowercase(),
        }
    }
}

/// Character position of `needle` in `haystack`
fn char_index(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .find(needle)
        .map(|byte_pos| haystack[..byte_pos].chars().count())
}

/// Score one field: exact 1000, prefix 500, substring `100 - position`, else 0
fn field_score(target: &str, query: &PreparedQuery) -> f64 {
    let normalized = normalize(target);
    let lower = target.to_lowercase();

    if normalized == query.normalized || lower == query.lower {
        return EXACT_SCORE;
    }

    if normalized.starts_with(&query.normalized) || lower.starts_with(&query.lower) {
        return PREFIX_SCORE;
    }

    // Normalized position wins when both forms match
    char_index(&normalized, &query.normalized)
        .or_else(|| char_index(&lower, &query.lower))
        .map_or(0.0, |index| SUBSTRING_BASE - index as f64)
}

fn entry_score(entry: &CatalogEntry, query: &PreparedQuery) -> f64 {
    [
        field_score(&entry.code, query),
        field_score(&entry.name_local, query),
        field_score(&entry.name_foreign, query),
        field_score(&entry.sector, query) * SECTOR_WEIGHT,
    ]
    .into_iter()
    .fold(0.0, f64::max)
}

/// Rank catalog entries against a free-text query.
///
/// Matches code, both names and sector (down-weighted). Returns at most
/// [`MAX_RESULTS`] entries by descending score; equal scores keep
/// catalog order.
pub fn search(catalog: &[CatalogEntry], query: &str) -> Vec<ScoredEntry> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let prepared = PreparedQuery::new(trimmed);

    let mut results: Vec<ScoredEntry> = catalog
        .iter()
        .filter_map(|entry| {
            let score = entry_score(entry, &prepared);
            (score > 0.0).then(|| ScoredEntry {
                entry: entry.clone(),
                score,
            })
        })
        .collect();

    // sort_by is stable
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(MAX_RESULTS);
    results
}

/// Foreign listings whose symbol or name contains the query
pub fn search_foreign(listings: &[ForeignListing], query: &str) -> Vec<ForeignListing> {
    let lower = query.trim().to_lowercase();
    if lower.is_empty() {
        return Vec::new();
    }

    listings
        .iter()
        .filter(|listing| {
            listing.symbol.to_lowercase().contains(&lower)
                || listing.name.to_lowercase().contains(&lower)
        })
        .cloned()
        .collect()
}

/// Combined stock search: domestic hits first, then foreign listings
pub fn search_stocks(
    catalog: &[CatalogEntry],
    listings: &[ForeignListing],
    query: &str,
) -> Vec<StockMatch> {
    let domestic = search(catalog, query).into_iter().map(|hit| StockMatch {
        symbol: format!("{}.T", hit.entry.code),
        name: hit.entry.name_local,
        sector: Some(hit.entry.sector),
        market: Some(hit.entry.market),
    });

    let foreign = search_foreign(listings, query).into_iter().map(|listing| StockMatch {
        symbol: listing.symbol.to_string(),
        name: listing.name.to_string(),
        sector: None,
        market: None,
    });

    domestic.chain(foreign).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::catalog::{CatalogSource, StaticCatalog, FOREIGN_LISTINGS};

    fn entry(code: &str, local: &str, foreign: &str, sector: &str) -> CatalogEntry {
        CatalogEntry {
            code: code.to_string(),
            name_local: local.to_string(),
            name_foreign: foreign.to_string(),
            sector: sector.to_string(),
            market: "プライム".to_string(),
        }
    }

    fn sample() -> Vec<CatalogEntry> {
        vec![
            entry("7203", "トヨタ自動車", "Toyota Motor", "輸送用機器"),
            entry("7267", "本田技研工業", "Honda Motor", "輸送用機器"),
            entry("6758", "ソニーグループ", "Sony Group", "電気機器"),
            entry("9984", "ソフトバンクグループ", "SoftBank Group", "情報・通信業"),
            entry("9434", "ソフトバンク", "SoftBank Corp", "情報・通信業"),
        ]
    }

    #[test]
    fn test_exact_code_ranks_first() {
        let results = search(&sample(), "7203");
        assert_eq!(results[0].entry.code, "7203");
        assert_eq!(results[0].score, 1000.0);
    }

    #[test]
    fn test_prefix_and_substring_scores() {
        let catalog = sample();

        // "72" prefixes both 7203 and 7267; catalog order breaks the tie
        let results = search(&catalog, "72");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entry.code, "7203");
        assert_eq!(results[1].entry.code, "7267");
        assert!(results.iter().all(|r| r.score == 500.0));

        // "motor" sits at character 6 of "toyotamotor" after normalization
        let results = search(&catalog, "motor");
        let toyota = results.iter().find(|r| r.entry.code == "7203").unwrap();
        assert_eq!(toyota.score, 94.0);
        assert_eq!(results[0].entry.code, "7267");
    }

    #[test]
    fn test_kana_insensitive_match() {
        let results = search(&sample(), "そにー");
        assert_eq!(results[0].entry.code, "6758");
        assert_eq!(results[0].score, 500.0);

        let results = search(&sample(), "ソフトハンク");
        assert_eq!(results[0].entry.code, "9434");
        assert_eq!(results[0].score, 1000.0);
        assert_eq!(results[1].entry.code, "9984");
        assert_eq!(results[1].score, 500.0);
    }

    #[test]
    fn test_sector_is_down_weighted() {
        let results = search(&sample(), "輸送用機器");
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.score == 800.0));
    }

    #[test]
    fn test_no_match_and_blank_query() {
        assert!(search(&sample(), "zzz").is_empty());
        assert!(search(&sample(), "   ").is_empty());
    }

    #[test]
    fn test_results_capped_and_sorted() {
        let catalog = StaticCatalog::bundled().unwrap();
        let results = search(catalog.entries(), "a");

        assert!(results.len() <= MAX_RESULTS);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_toyota_code_against_bundled_catalog() {
        let catalog = StaticCatalog::bundled().unwrap();
        let results = search(catalog.entries(), "7203");

        assert_eq!(results[0].entry.code, "7203");
        assert_eq!(results[0].score, 1000.0);
        assert!(!results[0].entry.market.is_empty());
    }

    #[test]
    fn test_search_stocks_orders_domestic_first() {
        let mut catalog = sample();
        catalog.push(entry("9999", "モトローラ", "Motorola", "電気機器"));

        let results = search_stocks(&catalog, FOREIGN_LISTINGS, "mo");
        assert_eq!(results.first().unwrap().symbol, "9999.T");
        assert_eq!(results.last().unwrap().symbol, "JPM");

        let foreign = search_foreign(FOREIGN_LISTINGS, "Tesla");
        assert_eq!(foreign.len(), 1);
        assert_eq!(foreign[0].symbol, "TSLA");
    }
}
