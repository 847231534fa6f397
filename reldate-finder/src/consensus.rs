//! Consensus Reconciler
//!
//! Groups one item's candidates by normalized date and picks the group backed
//! by the most sources.
//!
//! Selection is order-independent: the winner depends only on group size and
//! source priority, never on which candidate arrived first.

use crate::normalizer::{DateNormalizer, NormalizedDate};
use crate::types::{Candidate, SourceTable, Verdict};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Priority assigned to sources missing from the table (lowest)
const UNRANKED: usize = usize::MAX;

/// Date group: normalized date plus the sources backing it
#[derive(Debug)]
struct DateGroup {
    date: NormalizedDate,
    /// (priority, source name), sorted
    sources: BTreeSet<(usize, String)>,
}

impl DateGroup {
    fn best_priority(&self) -> usize {
        self.sources
            .first()
            .map(|(priority, _)| *priority)
            .unwrap_or(UNRANKED)
    }
}

/// Candidate reconciler bound to a source priority order
#[derive(Debug, Clone)]
pub struct ConsensusReconciler {
    /// Source names, index = priority
    priorities: Vec<String>,
}

impl ConsensusReconciler {
    /// Capture the table's priority order
    pub fn new(table: &SourceTable) -> Self {
        Self::with_priorities(table.names().into_iter().map(str::to_string).collect())
    }

    /// Build from an explicit priority list (index 0 = highest)
    pub fn with_priorities(priorities: Vec<String>) -> Self {
        Self { priorities }
    }

    fn priority_of(&self, source: &str) -> usize {
        self.priorities
            .iter()
            .position(|name| name == source)
            .unwrap_or(UNRANKED)
    }

    /// Reconcile one item's candidates
    ///
    /// Winner: largest group; ties go to the group holding the
    /// highest-priority source, then to the smaller canonical date string.
    pub fn reconcile(&self, candidates: &[Candidate]) -> Verdict {
        let mut groups: BTreeMap<NormalizedDate, DateGroup> = BTreeMap::new();

        for candidate in candidates {
            let Some(raw) = candidate.raw_date() else {
                continue;
            };
            let date = DateNormalizer::normalize(raw);
            groups
                .entry(date.clone())
                .or_insert_with(|| DateGroup {
                    date,
                    sources: BTreeSet::new(),
                })
                .sources
                .insert((self.priority_of(&candidate.source), candidate.source.clone()));
        }

        let winner = groups.into_values().min_by(|a, b| {
            b.sources
                .len()
                .cmp(&a.sources.len())
                .then_with(|| a.best_priority().cmp(&b.best_priority()))
                .then_with(|| a.date.cmp(&b.date))
        });

        match winner {
            Some(group) => {
                debug!(
                    date = %group.date,
                    support = group.sources.len(),
                    "Consensus reached"
                );
                Verdict::Found {
                    date: group.date,
                    supporting_sources: group.sources.into_iter().map(|(_, name)| name).collect(),
                }
            }
            None => Verdict::NoResultFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, SourceFailure};

    fn reconciler() -> ConsensusReconciler {
        ConsensusReconciler::with_priorities(vec![
            "steam".into(),
            "wikipedia".into(),
            "metacritic".into(),
        ])
    }

    #[test]
    fn test_agreeing_sources_collapse() {
        let verdict = reconciler().reconcile(&[
            Candidate::dated("steam", "March 3, 2023"),
            Candidate::dated("wikipedia", "Mar 3, 2023"),
        ]);

        assert_eq!(verdict.date().map(|d| d.as_str()), Some("March 3, 2023"));
        assert_eq!(verdict.supporting_sources(), ["steam", "wikipedia"]);
        assert_eq!(verdict.confidence(), Some(Confidence::Multiple));
    }

    #[test]
    fn test_disagreement_goes_to_priority() {
        let verdict = reconciler().reconcile(&[
            Candidate::dated("metacritic", "Feb 2, 2023"),
            Candidate::dated("steam", "Feb 1, 2023"),
        ]);

        assert_eq!(verdict.date().map(|d| d.as_str()), Some("February 1, 2023"));
        assert_eq!(verdict.supporting_sources(), ["steam"]);
        assert_eq!(verdict.confidence(), Some(Confidence::Single));
    }

    #[test]
    fn test_majority_beats_priority() {
        let verdict = reconciler().reconcile(&[
            Candidate::dated("steam", "Feb 1, 2023"),
            Candidate::dated("wikipedia", "2023-02-02"),
            Candidate::dated("metacritic", "Feb 2, 2023"),
        ]);

        assert_eq!(verdict.date().map(|d| d.as_str()), Some("February 2, 2023"));
        assert_eq!(verdict.supporting_sources(), ["wikipedia", "metacritic"]);
    }

    #[test]
    fn test_no_dates_is_no_result() {
        let verdict = reconciler().reconcile(&[
            Candidate::failed("steam", SourceFailure::NoMatch),
            Candidate::failed("wikipedia", SourceFailure::NoDate),
            Candidate::dated("metacritic", "   "),
        ]);
        assert_eq!(verdict, Verdict::NoResultFound);
        assert_eq!(reconciler().reconcile(&[]), Verdict::NoResultFound);
    }

    #[test]
    fn test_failed_sources_never_support() {
        let verdict = reconciler().reconcile(&[
            Candidate::failed("steam", SourceFailure::Timeout),
            Candidate::dated("wikipedia", "3 March 2023"),
            Candidate::dated("metacritic", "March 3rd, 2023"),
        ]);

        assert_eq!(verdict.supporting_sources(), ["wikipedia", "metacritic"]);
    }

    #[test]
    fn test_unparseable_identical_strings_agree() {
        let verdict = reconciler().reconcile(&[
            Candidate::dated("steam", "Coming soon"),
            Candidate::dated("metacritic", "Coming soon"),
            Candidate::dated("wikipedia", "2024"),
        ]);

        assert_eq!(verdict.date().map(|d| d.as_str()), Some("Coming soon"));
        assert_eq!(verdict.supporting_sources(), ["steam", "metacritic"]);
    }

    #[test]
    fn test_order_independent() {
        let candidates = vec![
            Candidate::dated("steam", "Feb 1, 2023"),
            Candidate::dated("wikipedia", "Feb 2, 2023"),
            Candidate::dated("metacritic", "1 February 2023"),
            Candidate::dated("itch", "Feb 2, 2023"),
        ];
        let expected = reconciler().reconcile(&candidates);
        assert_eq!(expected.supporting_sources(), ["steam", "metacritic"]);

        let mut rotated = candidates.clone();
        for _ in 0..candidates.len() {
            rotated.rotate_left(1);
            assert_eq!(reconciler().reconcile(&rotated), expected);
            let mut reversed = rotated.clone();
            reversed.reverse();
            assert_eq!(reconciler().reconcile(&reversed), expected);
        }
    }
}
