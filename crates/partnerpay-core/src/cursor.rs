//! Pair and cursor types for resumable sweeps.
//!
//! The batch scheduler walks distinct `(program_id, partner_id)` pairs in
//! lexicographic order. Pagination state is an explicit `PairCursor` value
//! passed between invocations (a queue message payload), never process
//! state.

use serde::{Deserialize, Serialize};

use crate::ids::{PartnerId, ProgramId};

/// A `(program, partner)` combination: the unit of aggregation work.
///
/// `Ord` is lexicographic on `(program_id, partner_id)`, matching the
/// scheduler's sweep order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pair {
    /// Program scope.
    pub program_id: ProgramId,
    /// Partner within the program.
    pub partner_id: PartnerId,
}

impl Pair {
    /// Create a pair.
    #[must_use]
    pub const fn new(program_id: ProgramId, partner_id: PartnerId) -> Self {
        Self {
            program_id,
            partner_id,
        }
    }
}

/// Continuation token for a paginated sweep: the last-processed pair, used
/// as an exclusive lower bound for the next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCursor {
    /// Last processed program.
    pub program_id: ProgramId,
    /// Last processed partner within that program.
    pub partner_id: PartnerId,
}

impl PairCursor {
    /// Whether `pair` lies strictly after this cursor in sweep order.
    #[must_use]
    pub fn precedes(&self, pair: &Pair) -> bool {
        pair.program_id > self.program_id
            || (pair.program_id == self.program_id && pair.partner_id > self.partner_id)
    }
}

impl From<Pair> for PairCursor {
    fn from(pair: Pair) -> Self {
        Self {
            program_id: pair.program_id,
            partner_id: pair.partner_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ordered_ids<T: Ord + Copy>(mut ids: Vec<T>) -> Vec<T> {
        ids.sort();
        ids
    }

    #[test]
    fn pair_ordering_is_lexicographic() {
        let programs = ordered_ids(vec![ProgramId::generate(), ProgramId::generate()]);
        let partners = ordered_ids(vec![PartnerId::generate(), PartnerId::generate()]);

        let a = Pair::new(programs[0], partners[1]);
        let b = Pair::new(programs[1], partners[0]);
        // Program takes precedence over partner.
        assert!(a < b);

        let c = Pair::new(programs[0], partners[0]);
        assert!(c < a);
    }

    #[test]
    fn cursor_excludes_itself() {
        let pair = Pair::new(ProgramId::generate(), PartnerId::generate());
        let cursor = PairCursor::from(pair);
        assert!(!cursor.precedes(&pair));
    }

    #[test]
    fn cursor_admits_strictly_greater_pairs() {
        let programs = ordered_ids(vec![ProgramId::generate(), ProgramId::generate()]);
        let partners = ordered_ids(vec![PartnerId::generate(), PartnerId::generate()]);

        let cursor = PairCursor::from(Pair::new(programs[0], partners[0]));
        assert!(cursor.precedes(&Pair::new(programs[0], partners[1])));
        assert!(cursor.precedes(&Pair::new(programs[1], partners[0])));
        assert!(!cursor.precedes(&Pair::new(programs[0], partners[0])));
    }

    #[test]
    fn cursor_serde_roundtrip() {
        let cursor = PairCursor::from(Pair::new(ProgramId::generate(), PartnerId::generate()));
        let json = serde_json::to_string(&cursor).unwrap();
        let parsed: PairCursor = serde_json::from_str(&json).unwrap();
        assert_eq!(cursor, parsed);
    }
}
