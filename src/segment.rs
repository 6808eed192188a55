use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::models::{ClassifiedCustomer, ScoredAggregate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Segment {
    ChurnedCustomer,
    SlippingAwayCannotLose,
    NewCustomer,
    PotentialChurners,
    Active,
    Loyal,
    CannotBeDefined,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::ChurnedCustomer => "CHURNED_CUSTOMER",
            Segment::SlippingAwayCannotLose => "SLIPPING_AWAY_CANNOT_LOSE",
            Segment::NewCustomer => "NEW_CUSTOMER",
            Segment::PotentialChurners => "POTENTIAL_CHURNERS",
            Segment::Active => "ACTIVE",
            Segment::Loyal => "LOYAL",
            Segment::CannotBeDefined => "CANNOT_BE_DEFINED",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Segment rules in priority order. 211 is listed twice under churned
/// customers; only the first assignment of a code counts.
pub const SEGMENT_RULES: &[(Segment, &[u16])] = &[
    (
        Segment::ChurnedCustomer,
        &[111, 112, 121, 132, 211, 211, 212, 114, 141],
    ),
    (
        Segment::SlippingAwayCannotLose,
        &[133, 134, 143, 224, 334, 343, 344, 144],
    ),
    (Segment::NewCustomer, &[311, 411, 331]),
    (
        Segment::PotentialChurners,
        &[222, 231, 221, 223, 233, 322],
    ),
    (Segment::Active, &[323, 333, 321, 341, 422, 332, 432]),
    (Segment::Loyal, &[433, 434, 443, 444]),
];

/// Combination code lookup compiled from [`SEGMENT_RULES`].
#[derive(Debug, Clone)]
pub struct SegmentRules {
    lookup: HashMap<u16, Segment>,
}

impl SegmentRules {
    pub fn new() -> Self {
        let mut lookup = HashMap::new();
        for (segment, codes) in SEGMENT_RULES {
            for code in codes.iter() {
                lookup.entry(*code).or_insert(*segment);
            }
        }
        Self { lookup }
    }

    /// Falls back to [`Segment::CannotBeDefined`] for codes no rule names.
    pub fn classify(&self, combination: u16) -> Segment {
        self.lookup
            .get(&combination)
            .copied()
            .unwrap_or(Segment::CannotBeDefined)
    }

    pub fn covered_codes(&self) -> usize {
        self.lookup.len()
    }
}

impl Default for SegmentRules {
    fn default() -> Self {
        Self::new()
    }
}

pub fn classify_customers(
    rules: &SegmentRules,
    scores: &[ScoredAggregate],
) -> Vec<ClassifiedCustomer> {
    let classified: Vec<ClassifiedCustomer> = scores
        .iter()
        .map(|scored| ClassifiedCustomer {
            segment: rules.classify(scored.combination()),
            scored: scored.clone(),
        })
        .collect();

    let undefined = classified
        .iter()
        .filter(|c| c.segment == Segment::CannotBeDefined)
        .count();
    tracing::debug!(
        customers = classified.len(),
        undefined,
        "classified customers into segments"
    );
    classified
}
