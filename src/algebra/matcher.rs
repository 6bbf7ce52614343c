//! Pairing of series entries by temporal relation.

use super::series::Series;
use crate::temporal::{RelationSet, TemporalExtent};

/// Finds the entries of a right series that relate to entries of a left
/// series. Matched pairs are logged at `trace`, or at `info` in debug mode.
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    level: log::Level,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Matcher {
    pub fn new(debug: bool) -> Self {
        Self {
            level: if debug {
                log::Level::Info
            } else {
                log::Level::Trace
            },
        }
    }

    /// All `(left, right)` index pairs satisfying any relation of the set,
    /// or none of them when `negated`.
    pub fn pairs(
        &self,
        a: &Series,
        b: &Series,
        relations: &RelationSet,
        negated: bool,
    ) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (i, left) in a.iter().enumerate() {
            for (j, right) in b.iter().enumerate() {
                if relations.matches(&left.extent, &right.extent) != negated {
                    self.log_pair(&left.extent, &right.extent, relations);
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    /// For every left entry, the right indices it relates to.
    pub fn groups(&self, a: &Series, b: &Series, relations: &RelationSet) -> Vec<Vec<usize>> {
        a.iter()
            .map(|left| {
                b.iter()
                    .enumerate()
                    .filter(|(_, right)| relations.matches(&left.extent, &right.extent))
                    .map(|(j, right)| {
                        self.log_pair(&left.extent, &right.extent, relations);
                        j
                    })
                    .collect()
            })
            .collect()
    }

    /// Whether `extent` relates to any entry of `b`.
    pub fn has_match(&self, extent: &TemporalExtent, b: &Series, relations: &RelationSet) -> bool {
        b.iter().any(|right| relations.matches(extent, &right.extent))
    }

    fn log_pair(&self, left: &TemporalExtent, right: &TemporalExtent, relations: &RelationSet) {
        log::log!(self.level, "matched {left} with {right} ({relations})");
    }
}

pub fn match_pairs(
    a: &Series,
    b: &Series,
    relations: &RelationSet,
    negated: bool,
) -> Vec<(usize, usize)> {
    Matcher::default().pairs(a, b, relations, negated)
}

pub fn match_groups(a: &Series, b: &Series, relations: &RelationSet) -> Vec<Vec<usize>> {
    Matcher::default().groups(a, b, relations)
}

pub fn has_match(extent: &TemporalExtent, b: &Series, relations: &RelationSet) -> bool {
    Matcher::default().has_match(extent, b, relations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::series::{Entry, Operand};
    use crate::temporal::Relation;
    use crate::types::MapId;

    fn series(name: &str, spans: &[(u32, u32)]) -> Series {
        Series::new(
            spans
                .iter()
                .enumerate()
                .map(|(i, (s, e))| {
                    Entry::new(
                        TemporalExtent::parse_absolute(
                            &format!("2001-01-{s:02}"),
                            &format!("2001-01-{e:02}"),
                        )
                        .unwrap(),
                        Operand::map(MapId::new(format!("{name}{}", i + 1), "PERMANENT")),
                    )
                })
                .collect(),
        )
    }

    fn daily_a() -> Series {
        series("a", &[(1, 2), (2, 3), (3, 4), (4, 5)])
    }

    #[test]
    fn test_during_accepts_shared_boundaries() {
        let b = series("b", &[(1, 3), (3, 5)]);
        let during = RelationSet::single(Relation::During);
        assert_eq!(
            match_pairs(&daily_a(), &b, &during, false),
            vec![(0, 0), (1, 0), (2, 1), (3, 1)]
        );
        assert_eq!(
            match_groups(&b, &daily_a(), &RelationSet::single(Relation::Contains)),
            vec![vec![0, 1], vec![2, 3]]
        );
    }

    #[test]
    fn test_equal_pairs_with_self() {
        let a = daily_a();
        let pairs = match_pairs(&a, &a, &RelationSet::default(), false);
        assert_eq!(pairs, vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn test_negated_and_has_match() {
        let c = series("c", &[(2, 4)]);
        let during = RelationSet::single(Relation::During);
        assert_eq!(
            match_pairs(&daily_a(), &c, &during, true),
            vec![(0, 0), (3, 0)]
        );
        let a = daily_a();
        assert!(has_match(&a.entries()[1].extent, &c, &during));
        assert!(!has_match(&a.entries()[0].extent, &c, &during));
    }

    #[test]
    fn test_relation_set_is_or() {
        let c = series("c", &[(2, 4)]);
        let rels = RelationSet::parse("meets|met_by").unwrap();
        assert_eq!(match_pairs(&daily_a(), &c, &rels, false), vec![(0, 0), (3, 0)]);
    }
}
