use std::collections::BTreeMap;

use log::warn;

use crate::data::model::{IdentifierTable, PlateKey, RawPlate};
use crate::error::PlateFailure;

// ---------------------------------------------------------------------------
// Relational left join
// ---------------------------------------------------------------------------

/// Left join by key. Every left row appears at least once: with `None` when
/// no right row shares its key, once per match otherwise (n x m on
/// duplicates). Left order is preserved; matches follow right order.
pub fn left_join_by_key<'r, L, R, K, FL, FR>(
    left: impl IntoIterator<Item = L>,
    right: &'r [R],
    key_left: FL,
    key_right: FR,
) -> Vec<(L, Option<&'r R>)>
where
    L: Clone,
    K: Ord,
    FL: Fn(&L) -> K,
    FR: Fn(&R) -> K,
{
    let mut index: BTreeMap<K, Vec<&'r R>> = BTreeMap::new();
    for r in right {
        index.entry(key_right(r)).or_default().push(r);
    }

    let mut out = Vec::new();
    for l in left {
        match index.get(&key_left(&l)) {
            Some(matches) => out.extend(matches.iter().map(|r| (l.clone(), Some(*r)))),
            None => out.push((l, None)),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Raw plates ↔ identifier tables
// ---------------------------------------------------------------------------

/// Plates that found exactly one identifier table, plus everything that did not.
#[derive(Debug)]
pub struct JoinOutcome<'a> {
    pub matched: Vec<(&'a RawPlate, &'a IdentifierTable)>,
    pub failures: Vec<PlateFailure>,
    /// Identifier files no raw plate joined to.
    pub unused_tables: Vec<String>,
}

/// Join plates to identifier tables by date and check cardinality: zero or
/// several tables for a plate become a [`PlateFailure`] for that plate.
/// Raw files that resolve to the same plate key are all dropped.
pub fn join_by_date<'a>(raw: &'a [RawPlate], tables: &'a [IdentifierTable]) -> JoinOutcome<'a> {
    let mut by_key: BTreeMap<&PlateKey, Vec<&'a RawPlate>> = BTreeMap::new();
    for plate in raw {
        by_key.entry(&plate.key).or_default().push(plate);
    }

    let mut failures: Vec<PlateFailure> = by_key
        .iter()
        .filter(|(_, plates)| plates.len() > 1)
        .map(|(key, plates)| PlateFailure::DuplicatePlate {
            key: (*key).clone(),
            filenames: plates.iter().map(|p| p.filename.clone()).collect(),
        })
        .collect();
    let unique: Vec<&'a RawPlate> = raw
        .iter()
        .filter(|p| by_key.get(&p.key).is_some_and(|same| same.len() == 1))
        .collect();

    let joined =
        left_join_by_key(unique.iter().enumerate(), tables, |(_, p)| p.key.date, |t| t.date);

    let mut candidates: Vec<Vec<&IdentifierTable>> = vec![Vec::new(); unique.len()];
    for ((idx, _), table) in joined {
        if let Some(t) = table {
            candidates[idx].push(t);
        }
    }

    let mut matched = Vec::new();
    for (plate, found) in unique.into_iter().zip(candidates) {
        match found.as_slice() {
            [table] => matched.push((plate, *table)),
            [] => failures.push(PlateFailure::NoIdentifierTable {
                key: plate.key.clone(),
                filename: plate.filename.clone(),
            }),
            many => failures.push(PlateFailure::AmbiguousIdentifierTables {
                key: plate.key.clone(),
                filename: plate.filename.clone(),
                candidates: many.iter().map(|t| t.filename.clone()).collect(),
            }),
        }
    }

    let unused_tables: Vec<String> = tables
        .iter()
        .filter(|t| !raw.iter().any(|p| p.key.date == t.date))
        .map(|t| t.filename.clone())
        .collect();

    for failure in &failures {
        warn!("{failure}");
    }
    for name in &unused_tables {
        warn!("identifier table {name} matches no raw plate");
    }

    JoinOutcome {
        matched,
        failures,
        unused_tables,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::PlateGrid;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 6, d).unwrap()
    }

    fn plate(d: u32, id: &str) -> RawPlate {
        RawPlate {
            filename: format!("2021-06-{d:02}_{id}.csv"),
            key: PlateKey {
                date: day(d),
                plate_id: id.to_string(),
            },
            grid: PlateGrid::filled(0.5),
        }
    }

    fn table(d: u32, suffix: &str) -> IdentifierTable {
        IdentifierTable {
            filename: format!("2021-06-{d:02}_{suffix}.csv"),
            date: day(d),
            rows: Vec::new(),
        }
    }

    #[test]
    fn left_join_one_to_one_keeps_row_count() {
        let left = [1, 2, 3];
        let right = [(1, 'a'), (2, 'b'), (3, 'c')];
        let out = left_join_by_key(left, &right, |l| *l, |r| r.0);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|(l, r)| r.is_some_and(|r| r.0 == *l)));
    }

    #[test]
    fn left_join_multiplies_duplicates() {
        let left = [1, 1, 2];
        let right = [(1, 'a'), (1, 'b'), (1, 'c'), (2, 'd')];
        let out = left_join_by_key(left, &right, |l| *l, |r| r.0);
        // 2 x 3 for key 1, 1 x 1 for key 2
        assert_eq!(out.len(), 7);
        assert_eq!(out.iter().filter(|(l, _)| *l == 1).count(), 6);
    }

    #[test]
    fn left_join_keeps_unmatched_left_rows() {
        let left = [1, 5];
        let right = [(1, 'a')];
        let out = left_join_by_key(left, &right, |l| *l, |r| r.0);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], (5, None));
    }

    #[test]
    fn plates_join_to_their_day() {
        let raw = [plate(1, "p1"), plate(1, "p2"), plate(2, "p1")];
        let tables = [table(1, "ids"), table(2, "ids")];
        let outcome = join_by_date(&raw, &tables);

        assert!(outcome.failures.is_empty());
        assert!(outcome.unused_tables.is_empty());
        assert_eq!(outcome.matched.len(), 3);
        for (p, t) in &outcome.matched {
            assert_eq!(p.key.date, t.date);
        }
    }

    #[test]
    fn missing_and_ambiguous_days_are_reported() {
        let raw = [plate(1, "p1"), plate(2, "p1"), plate(3, "p1")];
        let tables = [table(1, "ids"), table(2, "ids_a"), table(2, "ids_b"), table(9, "ids")];
        let outcome = join_by_date(&raw, &tables);

        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.matched[0].0.key.date, day(1));
        assert_eq!(outcome.failures.len(), 2);
        assert!(matches!(
            &outcome.failures[0],
            PlateFailure::AmbiguousIdentifierTables { candidates, .. } if candidates.len() == 2
        ));
        assert!(matches!(
            &outcome.failures[1],
            PlateFailure::NoIdentifierTable { key, .. } if key.date == day(3)
        ));
        assert_eq!(outcome.unused_tables, ["2021-06-09_ids.csv"]);
    }

    #[test]
    fn colliding_plate_keys_drop_every_file() {
        let mut twin = plate(1, "p1");
        twin.filename = "2021-06-01_ p1.csv".into();
        let raw = [plate(1, "p1"), twin, plate(1, "p2")];
        let tables = [table(1, "ids")];
        let outcome = join_by_date(&raw, &tables);

        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.matched[0].0.key.plate_id, "p2");
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            &outcome.failures[0],
            PlateFailure::DuplicatePlate { key, filenames }
                if key.plate_id == "p1" && filenames.len() == 2
        ));
    }
}
