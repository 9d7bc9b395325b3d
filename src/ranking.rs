//! # Ranking
//!
//! Orders endpoint results from fastest to slowest and assigns standard
//! competition ranks ("1224" ranking, zero based here).
//!
//! ## Pairwise order
//!
//! 1. Endpoints without a sample go last.
//! 2. Cheap separability heuristics on the metrics, in order: value range,
//!    Tukey fences, three-sigma intervals. The first one that separates the
//!    pair decides.
//! 3. A one-sided Mann–Whitney test with zero threshold at the 5% level.
//! 4. `mean + 3·std_dev`, smaller first.
//!
//! This order is not guaranteed to be transitive, so sorting uses a stable
//! insertion sort that tolerates an inconsistent comparator.
//!
//! ## Ranks
//!
//! Adjacent items in sorted order share a rank when the equivalence predicate
//! says they are indistinguishable; otherwise an item's rank is its sorted
//! position.

use crate::equivalence::{EquivalenceTester, SampleEquivalence, SignificanceLevel, Threshold};
use crate::metrics::Metrics;
use crate::results::{EndpointResult, ProjectResult};
use std::cmp::Ordering;

/// Verdict of a heuristic decision function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    LessThan,
    GreaterThan,
    Undetermined,
}

/// A pure separability heuristic over two metrics
pub type DecisionFn = fn(&Metrics, &Metrics) -> Decision;

/// Heuristics in evaluation order
pub const HEURISTICS: [(&str, DecisionFn); 3] = [
    ("range", decide_by_range),
    ("tukey fence", decide_by_tukey_fence),
    ("three sigma", decide_by_three_sigma),
];

/// `LessThan` when `x`'s interval lies entirely below `y`'s, `GreaterThan`
/// for the reverse.
fn separate(x_low: f64, x_high: f64, y_low: f64, y_high: f64) -> Decision {
    if x_high < y_low {
        Decision::LessThan
    } else if y_high < x_low {
        Decision::GreaterThan
    } else {
        Decision::Undetermined
    }
}

pub fn decide_by_range(x: &Metrics, y: &Metrics) -> Decision {
    separate(x.min(), x.max(), y.min(), y.max())
}

pub fn decide_by_tukey_fence(x: &Metrics, y: &Metrics) -> Decision {
    let fences = |m: &Metrics| {
        (
            m.quartiles.q1() - 1.5 * m.iqr,
            m.quartiles.q3() + 1.5 * m.iqr,
        )
    };
    let (x_low, x_high) = fences(x);
    let (y_low, y_high) = fences(y);
    separate(x_low, x_high, y_low, y_high)
}

pub fn decide_by_three_sigma(x: &Metrics, y: &Metrics) -> Decision {
    separate(
        x.mean - 3.0 * x.std_dev,
        x.mean + 3.0 * x.std_dev,
        y.mean - 3.0 * y.std_dev,
        y.mean + 3.0 * y.std_dev,
    )
}

/// Order two endpoint results, faster first.
pub fn compare(a: &EndpointResult, b: &EndpointResult) -> Ordering {
    let (a_sample, a_metrics, b_sample, b_metrics) =
        match (&a.sample, &a.metrics, &b.sample, &b.metrics) {
            (Some(a_sample), Some(a_metrics), Some(b_sample), Some(b_metrics)) => {
                (a_sample, a_metrics, b_sample, b_metrics)
            }
            _ => {
                return match (a.has_sample(), b.has_sample()) {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    _ => Ordering::Equal,
                }
            }
        };

    for (_, decide) in HEURISTICS.iter() {
        match decide(a_metrics, b_metrics) {
            Decision::LessThan => return Ordering::Less,
            Decision::GreaterThan => return Ordering::Greater,
            Decision::Undetermined => {}
        }
    }

    let verdict = EquivalenceTester::perform(
        a_sample.values(),
        b_sample.values(),
        Threshold::ZERO,
        SignificanceLevel::P05,
    );
    match verdict.to_ordering() {
        Ordering::Equal => a_metrics
            .upper_three_sigma()
            .partial_cmp(&b_metrics.upper_three_sigma())
            .unwrap_or(Ordering::Equal),
        decided => decided,
    }
}

/// Stable in-place insertion sort.
///
/// Only moves an element past a neighbour the comparator calls strictly
/// greater, so equal elements keep their input order, and an inconsistent
/// comparator cannot cause a panic.
pub fn insertion_sort_by<T, F>(items: &mut [T], mut compare: F)
where
    F: FnMut(&T, &T) -> Ordering,
{
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 && compare(&items[j - 1], &items[j]) == Ordering::Greater {
            items.swap(j - 1, j);
            j -= 1;
        }
    }
}

/// Standard competition ranks of an already ordered sequence.
///
/// `eq` is only ever applied to neighbours, so it need not be transitive.
pub fn ranks_ordered<T, F>(items: &[T], mut eq: F) -> Vec<usize>
where
    F: FnMut(&T, &T) -> bool,
{
    let mut ranks: Vec<usize> = Vec::with_capacity(items.len());
    for i in 0..items.len() {
        let rank = if i > 0 && eq(&items[i], &items[i - 1]) {
            ranks[i - 1]
        } else {
            i
        };
        ranks.push(rank);
    }
    ranks
}

/// Sort results and assign ranks.
pub fn rank_results(
    mut results: Vec<EndpointResult>,
    equivalence: &SampleEquivalence,
    cancelled: bool,
) -> ProjectResult {
    insertion_sort_by(&mut results, compare);
    let ranks = ranks_ordered(&results, |a, b| {
        equivalence.equivalent(a.sample.as_ref(), b.sample.as_ref())
    });
    ProjectResult {
        results,
        ranks,
        cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{AttemptOutcome, Endpoint, RequestAttempt};
    use reqwest::Url;
    use std::time::{Duration, Instant};

    fn result_with(index: usize, durations_ms: &[u64]) -> EndpointResult {
        let endpoint = Endpoint {
            index,
            uri: Url::parse(&format!("http://host-{}.test/", index)).unwrap(),
        };
        let base = Instant::now();
        let attempts = durations_ms
            .iter()
            .enumerate()
            .map(|(attempt_index, &ms)| RequestAttempt {
                endpoint_index: index,
                attempt_index,
                started_at: base,
                finished_at: base + Duration::from_millis(ms),
                outcome: AttemptOutcome::Success { status: 200 },
            })
            .collect();
        EndpointResult::from_attempts(endpoint, attempts)
    }

    fn empty_result(index: usize) -> EndpointResult {
        result_with(index, &[])
    }

    #[test]
    fn test_ranks_ordered_competition_ranking() {
        let values = [90, 95, 95, 100, 101, 101, 101, 105];
        assert_eq!(
            ranks_ordered(&values, |a, b| a == b),
            vec![0, 1, 1, 3, 4, 4, 4, 7]
        );
    }

    #[test]
    fn test_ranks_ordered_edge_cases() {
        let empty: [u32; 0] = [];
        assert!(ranks_ordered(&empty, |a, b| a == b).is_empty());
        assert_eq!(ranks_ordered(&[7], |a, b| a == b), vec![0]);
        assert_eq!(ranks_ordered(&[1, 1, 1], |a, b| a == b), vec![0, 0, 0]);
    }

    #[test]
    fn test_insertion_sort_is_stable() {
        let mut items = vec![(3, 'a'), (1, 'b'), (3, 'c'), (2, 'd'), (1, 'e')];
        insertion_sort_by(&mut items, |x, y| x.0.cmp(&y.0));
        assert_eq!(items, vec![(1, 'b'), (1, 'e'), (2, 'd'), (3, 'a'), (3, 'c')]);
    }

    #[test]
    fn test_insertion_sort_tolerates_inconsistent_comparator() {
        // Rock-paper-scissors order.
        let mut items = vec![0u8, 1, 2, 0, 1, 2];
        insertion_sort_by(&mut items, |a, b| {
            if (a + 1) % 3 == *b {
                Ordering::Less
            } else if (b + 1) % 3 == *a {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        });
        assert_eq!(items.len(), 6);
    }

    #[test]
    fn test_heuristics() {
        let fast = Metrics::compute(&[10.0, 11.0, 12.0, 11.0]).unwrap();
        let slow = Metrics::compute(&[50.0, 51.0, 52.0, 53.0]).unwrap();
        assert_eq!(decide_by_range(&fast, &slow), Decision::LessThan);
        assert_eq!(decide_by_range(&slow, &fast), Decision::GreaterThan);
        assert_eq!(decide_by_range(&fast, &fast), Decision::Undetermined);
        assert_eq!(decide_by_tukey_fence(&fast, &slow), Decision::LessThan);
        assert_eq!(decide_by_three_sigma(&slow, &fast), Decision::GreaterThan);
    }

    #[test]
    fn test_tukey_fence_ignores_outlier() {
        // One extreme outlier defeats the range check but not the fences.
        let fast = Metrics::compute(&[10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 100.0]).unwrap();
        let slow = Metrics::compute(&[50.0, 50.0, 50.0, 50.0, 50.0, 50.0, 50.0, 50.0]).unwrap();
        assert_eq!(decide_by_range(&fast, &slow), Decision::Undetermined);
        assert_eq!(decide_by_tukey_fence(&fast, &slow), Decision::LessThan);
    }

    #[test]
    fn test_missing_samples_sort_last() {
        let results = vec![
            empty_result(0),
            result_with(1, &[30, 31, 32]),
            empty_result(2),
            result_with(3, &[10, 11, 12]),
        ];
        let project = rank_results(results, &SampleEquivalence::default(), false);
        let order: Vec<usize> = project.results.iter().map(|r| r.endpoint.index).collect();
        assert_eq!(order, vec![3, 1, 0, 2]);
        assert_eq!(project.ranks[2], 2);
        assert_eq!(project.ranks[3], 2);
        assert!(!project.cancelled);
    }

    #[test]
    fn test_equal_samples_share_rank() {
        let durations = [20, 22, 21, 23, 24, 25, 19];
        let results = vec![
            result_with(0, &durations),
            result_with(1, &durations),
            result_with(2, &[5, 6, 7, 8, 9, 4, 3]),
        ];
        let project = rank_results(results, &SampleEquivalence::default(), false);
        let order: Vec<usize> = project.results.iter().map(|r| r.endpoint.index).collect();
        assert_eq!(order, vec![2, 0, 1]);
        assert_eq!(project.ranks, vec![0, 1, 1]);
    }

    #[test]
    fn test_compare_is_consistent_for_swapped_pair() {
        let a = result_with(0, &[95, 94, 101, 89, 91, 87, 96]);
        let b = result_with(1, &[100, 96, 104, 105, 97, 94, 106]);
        assert_eq!(compare(&a, &b), compare(&b, &a).reverse());
        assert_eq!(compare(&a, &b), Ordering::Less);
    }
}
