//! Allen interval relations and `|`-separated relation sets.

use super::extent::TemporalExtent;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::fmt;

/// The thirteen Allen relations plus the `intersect` shorthand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Equal,
    During,
    Contains,
    Starts,
    StartedBy,
    Finishes,
    FinishedBy,
    Overlaps,
    OverlappedBy,
    Meets,
    MetBy,
    Before,
    After,
    Intersect,
}

static RELATION_NAMES: Lazy<FxHashMap<&'static str, Relation>> = Lazy::new(|| {
    let mut names = FxHashMap::default();
    for (name, relation) in [
        ("equal", Relation::Equal),
        ("equals", Relation::Equal),
        ("during", Relation::During),
        ("contains", Relation::Contains),
        ("starts", Relation::Starts),
        ("started_by", Relation::StartedBy),
        ("started", Relation::StartedBy),
        ("finishes", Relation::Finishes),
        ("finished_by", Relation::FinishedBy),
        ("finished", Relation::FinishedBy),
        ("overlaps", Relation::Overlaps),
        ("overlapped_by", Relation::OverlappedBy),
        ("overlapped", Relation::OverlappedBy),
        ("meets", Relation::Meets),
        ("met_by", Relation::MetBy),
        ("before", Relation::Before),
        ("precedes", Relation::Before),
        ("after", Relation::After),
        ("follows", Relation::After),
        ("intersect", Relation::Intersect),
    ] {
        names.insert(name, relation);
    }
    names
});

impl Relation {
    /// The mutually exclusive Allen relations.
    pub const ALLEN: [Relation; 13] = [
        Relation::Equal,
        Relation::During,
        Relation::Contains,
        Relation::Starts,
        Relation::StartedBy,
        Relation::Finishes,
        Relation::FinishedBy,
        Relation::Overlaps,
        Relation::OverlappedBy,
        Relation::Meets,
        Relation::MetBy,
        Relation::Before,
        Relation::After,
    ];

    /// Case-insensitive lookup including the usual aliases.
    pub fn parse(name: &str) -> Option<Self> {
        RELATION_NAMES
            .get(name.trim().to_ascii_lowercase().as_str())
            .copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Relation::Equal => "equal",
            Relation::During => "during",
            Relation::Contains => "contains",
            Relation::Starts => "starts",
            Relation::StartedBy => "started_by",
            Relation::Finishes => "finishes",
            Relation::FinishedBy => "finished_by",
            Relation::Overlaps => "overlaps",
            Relation::OverlappedBy => "overlapped_by",
            Relation::Meets => "meets",
            Relation::MetBy => "met_by",
            Relation::Before => "before",
            Relation::After => "after",
            Relation::Intersect => "intersect",
        }
    }

    pub fn inverse(self) -> Self {
        match self {
            Relation::Equal => Relation::Equal,
            Relation::During => Relation::Contains,
            Relation::Contains => Relation::During,
            Relation::Starts => Relation::StartedBy,
            Relation::StartedBy => Relation::Starts,
            Relation::Finishes => Relation::FinishedBy,
            Relation::FinishedBy => Relation::Finishes,
            Relation::Overlaps => Relation::OverlappedBy,
            Relation::OverlappedBy => Relation::Overlaps,
            Relation::Meets => Relation::MetBy,
            Relation::MetBy => Relation::Meets,
            Relation::Before => Relation::After,
            Relation::After => Relation::Before,
            Relation::Intersect => Relation::Intersect,
        }
    }

    /// Classify two half-open intervals; requires `s1 < e1` and `s2 < e2`.
    pub fn classify(s1: i64, e1: i64, s2: i64, e2: i64) -> Relation {
        if s1 == s2 && e1 == e2 {
            Relation::Equal
        } else if e1 < s2 {
            Relation::Before
        } else if s1 > e2 {
            Relation::After
        } else if e1 == s2 {
            Relation::Meets
        } else if s1 == e2 {
            Relation::MetBy
        } else if s1 == s2 {
            if e1 < e2 {
                Relation::Starts
            } else {
                Relation::StartedBy
            }
        } else if e1 == e2 {
            if s1 > s2 {
                Relation::Finishes
            } else {
                Relation::FinishedBy
            }
        } else if s1 > s2 && e1 < e2 {
            Relation::During
        } else if s1 < s2 && e1 > e2 {
            Relation::Contains
        } else if s1 < s2 {
            Relation::Overlaps
        } else {
            Relation::OverlappedBy
        }
    }

    /// Whether this relation, used as a set member, accepts the actual
    /// Allen relation. `during` and `contains` include the cases that share
    /// one boundary.
    pub fn accepts(self, actual: Relation) -> bool {
        match self {
            Relation::During => matches!(
                actual,
                Relation::During | Relation::Starts | Relation::Finishes
            ),
            Relation::Contains => matches!(
                actual,
                Relation::Contains | Relation::StartedBy | Relation::FinishedBy
            ),
            Relation::Intersect => !matches!(actual, Relation::Before | Relation::After),
            other => other == actual,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Relations joined by logical OR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSet(SmallVec<[Relation; 4]>);

impl RelationSet {
    pub fn new(relations: impl IntoIterator<Item = Relation>) -> Self {
        let mut set: SmallVec<[Relation; 4]> = SmallVec::new();
        for relation in relations {
            if !set.contains(&relation) {
                set.push(relation);
            }
        }
        Self(set)
    }

    pub fn single(relation: Relation) -> Self {
        Self(smallvec![relation])
    }

    /// Parse `"during|starts"`; the error carries the unknown name.
    pub fn parse(list: &str) -> Result<Self, String> {
        let mut relations = SmallVec::<[Relation; 4]>::new();
        for name in list.split('|') {
            let name = name.trim();
            let relation = Relation::parse(name).ok_or_else(|| name.to_string())?;
            if !relations.contains(&relation) {
                relations.push(relation);
            }
        }
        Ok(Self(relations))
    }

    pub fn relations(&self) -> &[Relation] {
        &self.0
    }

    pub fn contains(&self, relation: Relation) -> bool {
        self.0.contains(&relation)
    }

    /// True if any relation of the set holds from `a` to `b`.
    pub fn matches(&self, a: &TemporalExtent, b: &TemporalExtent) -> bool {
        match a.relation(b) {
            Some(actual) => self.0.iter().any(|r| r.accepts(actual)),
            None => false,
        }
    }
}

impl Default for RelationSet {
    fn default() -> Self {
        Self::single(Relation::Equal)
    }
}

impl fmt::Display for RelationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, relation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            f.write_str(relation.name())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(s: i64, e: i64) -> TemporalExtent {
        TemporalExtent::relative(s, e, super::super::TimeUnit::Day).unwrap()
    }

    #[test]
    fn test_classify_all_relations() {
        assert_eq!(Relation::classify(1, 2, 1, 2), Relation::Equal);
        assert_eq!(Relation::classify(2, 3, 1, 4), Relation::During);
        assert_eq!(Relation::classify(1, 4, 2, 3), Relation::Contains);
        assert_eq!(Relation::classify(1, 2, 1, 3), Relation::Starts);
        assert_eq!(Relation::classify(1, 3, 1, 2), Relation::StartedBy);
        assert_eq!(Relation::classify(2, 3, 1, 3), Relation::Finishes);
        assert_eq!(Relation::classify(1, 3, 2, 3), Relation::FinishedBy);
        assert_eq!(Relation::classify(1, 3, 2, 4), Relation::Overlaps);
        assert_eq!(Relation::classify(2, 4, 1, 3), Relation::OverlappedBy);
        assert_eq!(Relation::classify(1, 2, 2, 3), Relation::Meets);
        assert_eq!(Relation::classify(2, 3, 1, 2), Relation::MetBy);
        assert_eq!(Relation::classify(1, 2, 3, 4), Relation::Before);
        assert_eq!(Relation::classify(3, 4, 1, 2), Relation::After);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(Relation::parse("EQUALS"), Some(Relation::Equal));
        assert_eq!(Relation::parse("precedes"), Some(Relation::Before));
        assert_eq!(Relation::parse("follows"), Some(Relation::After));
        assert_eq!(Relation::parse("overlapped"), Some(Relation::OverlappedBy));
        assert_eq!(Relation::parse("sometimes"), None);
    }

    #[test]
    fn test_relation_set_parse() {
        let set = RelationSet::parse("during | starts|during").unwrap();
        assert_eq!(set.relations(), &[Relation::During, Relation::Starts]);
        assert_eq!(set.to_string(), "during|starts");
        assert_eq!(RelationSet::parse("during|sometimes").unwrap_err(), "sometimes");
    }

    #[test]
    fn test_set_groups_boundary_cases() {
        let during = RelationSet::single(Relation::During);
        assert!(during.matches(&ext(1, 2), &ext(1, 3)));
        assert!(during.matches(&ext(2, 3), &ext(1, 3)));
        assert!(during.matches(&ext(2, 3), &ext(1, 4)));
        assert!(!during.matches(&ext(1, 3), &ext(1, 3)));

        let contains = RelationSet::single(Relation::Contains);
        assert!(contains.matches(&ext(1, 3), &ext(1, 2)));
        assert!(contains.matches(&ext(1, 3), &ext(2, 3)));

        let intersect = RelationSet::single(Relation::Intersect);
        assert!(intersect.matches(&ext(1, 2), &ext(2, 3)));
        assert!(!intersect.matches(&ext(1, 2), &ext(3, 4)));
    }

    #[test]
    fn test_inverse_is_involution() {
        for relation in Relation::ALLEN {
            assert_eq!(relation.inverse().inverse(), relation);
        }
    }
}
