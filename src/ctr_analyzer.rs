use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::brand_classifier::{self, BrandMatcher};
use crate::search_data_manager::QueryRow;

pub const MAX_POSITION: i64 = 10;
pub const TOP_TERM_LIMIT: usize = 100;
pub const MIN_IMPRESSIONS_FLOOR: u64 = 0;
pub const MIN_IMPRESSIONS_CEILING: u64 = 10_000;

/// Explicit analysis parameters. Every interaction recomputes from these and
/// the loaded dataset; no widget state leaks into the computation.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnalysisInput {
    pub brand_keywords: String,
    pub min_impressions: u64,
}

impl AnalysisInput {
    pub fn new(brand_keywords: String, min_impressions: u64) -> Self {
        AnalysisInput {
            brand_keywords,
            min_impressions: min_impressions.clamp(MIN_IMPRESSIONS_FLOOR, MIN_IMPRESSIONS_CEILING),
        }
    }
}

/// One aggregate per rounded position (1-10) present in the data. Absent
/// positions stay absent; the frontend decides how to draw the gaps.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PositionAggregate {
    #[serde(rename = "Position")]
    pub position: u32,
    #[serde(rename = "avg_CTR")]
    pub avg_ctr: f64,
    #[serde(rename = "num_terms")]
    pub num_terms: usize,
    #[serde(rename = "total_impressions")]
    pub total_impressions: u64,
    #[serde(rename = "total_clicks")]
    pub total_clicks: u64,
}

/// Display projection of a high-volume term. CTR is rescaled to a percentage
/// and the average position rounded, so the frontend renders values as-is.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TopTerm {
    #[serde(rename = "Term")]
    pub term: String,
    #[serde(rename = "Impressions")]
    pub impressions: u64,
    #[serde(rename = "Clicks")]
    pub clicks: u64,
    #[serde(rename = "CTR")]
    pub ctr_pct: f64,
    #[serde(rename = "Avg Position")]
    pub avg_position: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SegmentTotals {
    pub total_impressions: u64,
    pub total_clicks: u64,
    #[serde(rename = "avg_CTR")]
    pub avg_ctr: f64,
    pub total_terms: usize,
}

/// Everything the frontend needs to render one classification.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SegmentReport {
    pub rows: Vec<QueryRow>,
    pub aggregates: Vec<PositionAggregate>,
    pub top_terms: Vec<TopTerm>,
    pub totals: SegmentTotals,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnalysisResult {
    pub branded: SegmentReport,
    pub non_branded: SegmentReport,
}

/// Pure entry point: filter, classify, aggregate and summarize both
/// classifications from the given rows and parameters.
pub fn analyze(rows: &[QueryRow], input: &AnalysisInput) -> AnalysisResult {
    let matcher = BrandMatcher::from_keywords(&input.brand_keywords);
    let (branded_rows, non_branded_rows) =
        brand_classifier::partition(rows, &matcher, input.min_impressions);

    AnalysisResult {
        branded: segment_report(branded_rows),
        non_branded: segment_report(non_branded_rows),
    }
}

pub fn segment_report(rows: Vec<QueryRow>) -> SegmentReport {
    let aggregates = aggregate_by_position(&rows);
    let top_terms = top_terms(&rows, TOP_TERM_LIMIT);
    let totals = summarize(&aggregates);

    SegmentReport {
        rows,
        aggregates,
        top_terms,
        totals,
    }
}

/// Round to the nearest integer, ties to even. Pinned to the behavior the
/// rest of the pipeline and the tests rely on: 10.5 -> 10, 9.5 -> 10, 8.5 -> 8.
fn rounded_position(position: f64) -> i64 {
    position.round_ties_even() as i64
}

#[derive(Default)]
struct PositionAccumulator {
    weighted_ctr_sum: f64,
    num_terms: usize,
    total_impressions: u64,
    total_clicks: u64,
}

/// Group rows by rounded position, keeping positions up to 10, and compute
/// the impression-weighted mean CTR plus sums per group. Output is sorted
/// ascending by position with no duplicates.
pub fn aggregate_by_position(rows: &[QueryRow]) -> Vec<PositionAggregate> {
    let mut groups: BTreeMap<i64, PositionAccumulator> = BTreeMap::new();

    for row in rows {
        let position = rounded_position(row.position);
        if position > MAX_POSITION {
            continue;
        }
        let group = groups.entry(position).or_default();
        group.weighted_ctr_sum += row.ctr * row.impressions as f64;
        group.num_terms += 1;
        group.total_impressions += row.impressions;
        group.total_clicks += row.clicks;
    }

    groups
        .into_iter()
        .map(|(position, group)| {
            // A zero-impression group can only happen at threshold 0; its
            // weighted mean is defined as zero instead of dividing by zero.
            let avg_ctr = if group.total_impressions > 0 {
                group.weighted_ctr_sum / group.total_impressions as f64
            } else {
                0.0
            };
            PositionAggregate {
                position: position.max(0) as u32,
                avg_ctr,
                num_terms: group.num_terms,
                total_impressions: group.total_impressions,
                total_clicks: group.total_clicks,
            }
        })
        .collect()
}

/// Select the `limit` rows with the largest impression counts. The sort is
/// stable, so ties keep their input order.
pub fn top_terms(rows: &[QueryRow], limit: usize) -> Vec<TopTerm> {
    let mut selected: Vec<&QueryRow> = rows.iter().collect();
    selected.sort_by(|a, b| b.impressions.cmp(&a.impressions));
    selected.truncate(limit);

    selected
        .into_iter()
        .map(|row| TopTerm {
            term: row.term.clone(),
            impressions: row.impressions,
            clicks: row.clicks,
            ctr_pct: round2(row.ctr * 100.0),
            avg_position: round2(row.position),
        })
        .collect()
}

/// Scalar summary over one classification's aggregates. All zeros for an
/// empty aggregate set, never an error.
pub fn summarize(aggregates: &[PositionAggregate]) -> SegmentTotals {
    let total_impressions = aggregates.iter().map(|a| a.total_impressions).sum();
    let total_clicks = aggregates.iter().map(|a| a.total_clicks).sum();
    let total_terms = aggregates.iter().map(|a| a.num_terms).sum();
    let avg_ctr = if aggregates.is_empty() {
        0.0
    } else {
        aggregates.iter().map(|a| a.avg_ctr).sum::<f64>() / aggregates.len() as f64
    };

    SegmentTotals {
        total_impressions,
        total_clicks,
        avg_ctr,
        total_terms,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
