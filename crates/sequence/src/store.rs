//! In-memory sequence registry.
//!
//! Records live behind one `RwLock`; every sequence and date range owns one
//! `Arc<Counter>` for its whole lifetime, so draws happen outside the
//! registry lock and updates reach draws already in flight.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use basis_core::{DomainError, DomainResult, Model, RecordId};

use crate::counter::Counter;
use crate::format::{format_number, interpolate};
use crate::sequence::{DateRange, Sequence, SequenceUpdate};

#[derive(Debug)]
struct RangeEntry {
    range: DateRange,
    counter: Arc<Counter>,
}

#[derive(Debug)]
struct Entry {
    sequence: Sequence,
    counter: Arc<Counter>,
    ranges: Vec<RangeEntry>,
}

impl Entry {
    fn snapshot(&self) -> Sequence {
        let mut seq = self.sequence.clone();
        seq.number_next = self.counter.peek();
        seq
    }
}

#[derive(Debug, Default)]
struct Inner {
    last_id: i64,
    last_range_id: i64,
    entries: BTreeMap<RecordId, Entry>,
}

#[derive(Debug, Default)]
pub struct SequenceStore {
    inner: RwLock<Inner>,
}

impl SequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn create(&self, mut sequence: Sequence) -> DomainResult<Sequence> {
        sequence.validate()?;
        let mut inner = self.write();
        inner.last_id += 1;
        let id = RecordId::new(inner.last_id);
        sequence.set_id(id);
        let counter = Arc::new(Counter::new(sequence.implementation, sequence.number_next));
        inner.entries.insert(
            id,
            Entry {
                sequence: sequence.clone(),
                counter,
                ranges: Vec::new(),
            },
        );
        tracing::debug!(sequence_id = %id, name = %sequence.name, "sequence created");
        Ok(sequence)
    }

    pub fn get(&self, id: RecordId) -> DomainResult<Sequence> {
        self.read()
            .entries
            .get(&id)
            .map(Entry::snapshot)
            .ok_or_else(|| DomainError::not_found(format!("sequence {id}")))
    }

    pub fn list(&self) -> Vec<Sequence> {
        self.read().entries.values().map(Entry::snapshot).collect()
    }

    /// Apply a partial update.
    ///
    /// Switching implementation carries the current counter value over;
    /// setting `number_next` resets the counter.
    pub fn update(&self, id: RecordId, update: &SequenceUpdate) -> DomainResult<Sequence> {
        let mut inner = self.write();
        let entry = inner
            .entries
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("sequence {id}")))?;

        let mut next = entry.snapshot();
        update.apply(&mut next);
        next.validate()?;

        if next.implementation != entry.counter.implementation() {
            entry.counter.switch_to(next.implementation);
            for r in &entry.ranges {
                r.counter.switch_to(next.implementation);
            }
        }
        if let Some(value) = update.number_next {
            entry.counter.reset(value);
        }
        entry.sequence = next;
        Ok(entry.snapshot())
    }

    pub fn delete(&self, id: RecordId) -> DomainResult<()> {
        self.write()
            .entries
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found(format!("sequence {id}")))
    }

    /// Next value the sequence itself will hand out.
    pub fn number_next_actual(&self, id: RecordId) -> DomainResult<i64> {
        self.read()
            .entries
            .get(&id)
            .map(|e| e.counter.peek())
            .ok_or_else(|| DomainError::not_found(format!("sequence {id}")))
    }

    pub fn ranges(&self, id: RecordId) -> DomainResult<Vec<DateRange>> {
        let inner = self.read();
        let entry = inner
            .entries
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("sequence {id}")))?;
        Ok(entry
            .ranges
            .iter()
            .map(|r| DateRange {
                number_next: r.counter.peek(),
                ..r.range.clone()
            })
            .collect())
    }

    /// Add an explicit date range. Overlapping windows are rejected.
    pub fn add_range(
        &self,
        id: RecordId,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> DomainResult<DateRange> {
        if date_to <= date_from {
            return Err(DomainError::validation("date range must end after it starts"));
        }
        let mut inner = self.write();
        inner.last_range_id += 1;
        let range_id = RecordId::new(inner.last_range_id);
        let entry = inner
            .entries
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("sequence {id}")))?;
        if entry
            .ranges
            .iter()
            .any(|r| r.range.date_from < date_to && date_from < r.range.date_to)
        {
            return Err(DomainError::conflict("date range overlaps an existing one"));
        }
        let range = DateRange {
            id: range_id,
            sequence_id: id,
            date_from,
            date_to,
            number_next: 1,
        };
        entry.ranges.push(RangeEntry {
            range: range.clone(),
            counter: Arc::new(Counter::new(entry.sequence.implementation, 1)),
        });
        entry.ranges.sort_by_key(|r| r.range.date_from);
        Ok(range)
    }

    pub fn next_by_id(&self, id: RecordId, at: NaiveDateTime) -> DomainResult<String> {
        self.next_by_id_with(id, at, Ok)
    }

    /// First active sequence carrying `code`, in id order.
    pub fn next_by_code(&self, code: &str, at: NaiveDateTime) -> DomainResult<String> {
        self.next_by_code_with(code, at, Ok)
    }

    pub fn next_by_code_with<T, E, F>(&self, code: &str, at: NaiveDateTime, use_number: F) -> Result<T, E>
    where
        E: From<DomainError>,
        F: FnOnce(String) -> Result<T, E>,
    {
        let id = self
            .read()
            .entries
            .values()
            .find(|e| e.sequence.active && e.sequence.code.as_deref() == Some(code))
            .map(|e| e.sequence.id)
            .ok_or_else(|| DomainError::not_found(format!("active sequence with code '{code}'")))?;
        self.next_by_id_with(id, at, use_number)
    }

    /// Draw the next formatted value and hand it to `use_number`.
    ///
    /// On a `no_gap` sequence the number is only consumed when `use_number`
    /// returns `Ok`; concurrent callers wait for it to finish.
    pub fn next_by_id_with<T, E, F>(&self, id: RecordId, at: NaiveDateTime, use_number: F) -> Result<T, E>
    where
        E: From<DomainError>,
        F: FnOnce(String) -> Result<T, E>,
    {
        let (sequence, counter, range_start) = self.resolve(id, at.date())?;
        let prefix = interpolate(sequence.prefix.as_deref().unwrap_or(""), at, range_start)?;
        let suffix = interpolate(sequence.suffix.as_deref().unwrap_or(""), at, range_start)?;
        counter.draw_with(sequence.number_increment, |n| {
            use_number(format_number(&prefix, n, sequence.padding, &suffix))
        })
    }

    /// Sequence, the counter to draw from, and the start of the window used.
    fn resolve(
        &self,
        id: RecordId,
        date: NaiveDate,
    ) -> DomainResult<(Sequence, Arc<Counter>, Option<NaiveDate>)> {
        {
            let inner = self.read();
            let entry = inner
                .entries
                .get(&id)
                .ok_or_else(|| DomainError::not_found(format!("sequence {id}")))?;
            if !entry.sequence.use_date_range {
                return Ok((entry.sequence.clone(), entry.counter.clone(), None));
            }
            if let Some(r) = entry.ranges.iter().find(|r| r.range.contains(date)) {
                return Ok((
                    entry.sequence.clone(),
                    r.counter.clone(),
                    Some(r.range.date_from),
                ));
            }
        }

        let mut inner = self.write();
        inner.last_range_id += 1;
        let range_id = RecordId::new(inner.last_range_id);
        let entry = inner
            .entries
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("sequence {id}")))?;
        // Another caller may have created the window in between.
        if let Some(r) = entry.ranges.iter().find(|r| r.range.contains(date)) {
            return Ok((
                entry.sequence.clone(),
                r.counter.clone(),
                Some(r.range.date_from),
            ));
        }
        let (date_from, date_to) = year_window(&entry.ranges, date)?;
        let counter = Arc::new(Counter::new(entry.sequence.implementation, 1));
        entry.ranges.push(RangeEntry {
            range: DateRange {
                id: range_id,
                sequence_id: id,
                date_from,
                date_to,
                number_next: 1,
            },
            counter: counter.clone(),
        });
        entry.ranges.sort_by_key(|r| r.range.date_from);
        tracing::debug!(sequence_id = %id, %date_from, %date_to, "sequence date range created");
        Ok((entry.sequence.clone(), counter, Some(date_from)))
    }
}

/// Calendar year of `date`, clipped so it does not overlap existing windows.
fn year_window(ranges: &[RangeEntry], date: NaiveDate) -> DomainResult<(NaiveDate, NaiveDate)> {
    let year_start = NaiveDate::from_ymd_opt(date.year(), 1, 1);
    let next_year = NaiveDate::from_ymd_opt(date.year() + 1, 1, 1);
    let (Some(year_start), Some(next_year)) = (year_start, next_year) else {
        return Err(DomainError::validation(format!("date {date} is out of range")));
    };
    let from = ranges
        .iter()
        .map(|r| r.range.date_to)
        .filter(|to| *to <= date)
        .fold(year_start, NaiveDate::max);
    let to = ranges
        .iter()
        .map(|r| r.range.date_from)
        .filter(|from| *from > date)
        .fold(next_year, NaiveDate::min);
    Ok((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::Implementation;
    use std::collections::BTreeSet;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn padded_numbers_and_reset() {
        let store = SequenceStore::new();
        let seq = store
            .create(Sequence::new("Test").with_code("test.seq").with_padding(4))
            .unwrap();
        let now = at(2024, 5, 1);
        let drawn: Vec<String> = (0..4)
            .map(|_| store.next_by_code("test.seq", now).unwrap())
            .collect();
        assert_eq!(drawn, ["0001", "0002", "0003", "0004"]);
        assert_eq!(store.number_next_actual(seq.id).unwrap(), 5);

        store
            .update(
                seq.id,
                &SequenceUpdate {
                    number_next: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(store.next_by_id(seq.id, now).unwrap(), "0001");
    }

    #[test]
    fn prefix_and_suffix_are_interpolated() {
        let store = SequenceStore::new();
        let seq = store
            .create(
                Sequence::new("Invoices")
                    .with_prefix("INV/%(year)s/")
                    .with_suffix("-%(month)s")
                    .with_padding(3)
                    .with_increment(5),
            )
            .unwrap();
        assert_eq!(store.next_by_id(seq.id, at(2024, 2, 9)).unwrap(), "INV/2024/001-02");
        assert_eq!(store.next_by_id(seq.id, at(2024, 2, 9)).unwrap(), "INV/2024/006-02");
    }

    #[test]
    fn invalid_prefix_does_not_consume_a_number() {
        let store = SequenceStore::new();
        let seq = store.create(Sequence::new("Bad").with_prefix("%(nope)s")).unwrap();
        assert!(matches!(
            store.next_by_id(seq.id, at(2024, 1, 1)),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(store.number_next_actual(seq.id).unwrap(), 1);
    }

    #[test]
    fn next_by_code_skips_inactive_and_reports_missing() {
        let store = SequenceStore::new();
        let old = store.create(Sequence::new("Old").with_code("so")).unwrap();
        store
            .update(
                old.id,
                &SequenceUpdate {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .create(Sequence::new("New").with_code("so").with_prefix("SO"))
            .unwrap();
        assert_eq!(store.next_by_code("so", at(2024, 1, 1)).unwrap(), "SO1");
        assert!(matches!(
            store.next_by_code("missing", at(2024, 1, 1)),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn switching_implementation_keeps_counter() {
        let store = SequenceStore::new();
        let seq = store.create(Sequence::new("S")).unwrap();
        for _ in 0..3 {
            store.next_by_id(seq.id, at(2024, 1, 1)).unwrap();
        }
        let updated = store
            .update(
                seq.id,
                &SequenceUpdate {
                    implementation: Some(Implementation::NoGap),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.implementation, Implementation::NoGap);
        assert_eq!(updated.number_next, 4);
        assert_eq!(store.next_by_id(seq.id, at(2024, 1, 1)).unwrap(), "4");
    }

    #[test]
    fn no_gap_consumes_only_on_success() {
        let store = SequenceStore::new();
        let seq = store
            .create(Sequence::new("NG").with_implementation(Implementation::NoGap))
            .unwrap();
        let failed: Result<(), DomainError> =
            store.next_by_id_with(seq.id, at(2024, 1, 1), |_| Err(DomainError::conflict("rollback")));
        assert!(failed.is_err());
        assert_eq!(store.next_by_id(seq.id, at(2024, 1, 1)).unwrap(), "1");

        let std_seq = store.create(Sequence::new("STD")).unwrap();
        let failed: Result<(), DomainError> =
            store.next_by_id_with(std_seq.id, at(2024, 1, 1), |_| Err(DomainError::conflict("rollback")));
        assert!(failed.is_err());
        assert_eq!(store.next_by_id(std_seq.id, at(2024, 1, 1)).unwrap(), "2");
    }

    #[test]
    fn no_gap_concurrent_draws_are_contiguous() {
        let store = Arc::new(SequenceStore::new());
        let seq = store
            .create(Sequence::new("NG").with_implementation(Implementation::NoGap))
            .unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| {
                            store
                                .next_by_id(seq.id, at(2024, 1, 1))
                                .unwrap()
                                .parse::<i64>()
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let all: BTreeSet<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(all.len(), 400);
        assert_eq!(all, (1..=400).collect::<BTreeSet<_>>());
    }

    #[test]
    fn standard_draws_are_monotonic_per_caller() {
        let store = Arc::new(SequenceStore::new());
        let seq = store.create(Sequence::new("STD")).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| store.next_by_id(seq.id, at(2024, 1, 1)).unwrap().parse::<i64>().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut seen = BTreeSet::new();
        for h in handles {
            let drawn = h.join().unwrap();
            assert!(drawn.windows(2).all(|w| w[0] < w[1]));
            seen.extend(drawn);
        }
        assert_eq!(seen.len(), 400);
    }

    #[test]
    fn toggling_implementation_during_draws_never_repeats_a_number() {
        for _ in 0..20 {
            let store = Arc::new(SequenceStore::new());
            let seq = store.create(Sequence::new("Toggle")).unwrap();
            let drawers: Vec<_> = (0..4)
                .map(|_| {
                    let store = store.clone();
                    std::thread::spawn(move || {
                        (0..200)
                            .map(|_| store.next_by_id(seq.id, at(2024, 1, 1)).unwrap().parse::<i64>().unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            for i in 0..200 {
                let implementation = if i % 2 == 0 {
                    Implementation::NoGap
                } else {
                    Implementation::Standard
                };
                store
                    .update(
                        seq.id,
                        &SequenceUpdate {
                            implementation: Some(implementation),
                            ..Default::default()
                        },
                    )
                    .unwrap();
            }
            let drawn: Vec<i64> = drawers.into_iter().flat_map(|h| h.join().unwrap()).collect();
            let unique: BTreeSet<i64> = drawn.iter().copied().collect();
            assert_eq!(unique.len(), drawn.len());
            assert_eq!(unique, (1..=800).collect::<BTreeSet<_>>());
            assert_eq!(store.number_next_actual(seq.id).unwrap(), 801);
        }
    }

    #[test]
    fn date_ranges_are_created_per_year_and_clipped() {
        let store = SequenceStore::new();
        let seq = store
            .create(
                Sequence::new("Ranged")
                    .with_prefix("%(range_year)s/")
                    .with_padding(2)
                    .with_date_range(),
            )
            .unwrap();
        store.add_range(seq.id, day(2024, 7, 1), day(2024, 10, 1)).unwrap();

        assert_eq!(store.next_by_id(seq.id, at(2024, 8, 15)).unwrap(), "2024/01");
        assert_eq!(store.next_by_id(seq.id, at(2024, 8, 16)).unwrap(), "2024/02");
        // Falls before the explicit window: Jan 1 up to its start.
        assert_eq!(store.next_by_id(seq.id, at(2024, 3, 1)).unwrap(), "2024/01");
        // After it: its end up to next Jan 1.
        assert_eq!(store.next_by_id(seq.id, at(2024, 11, 1)).unwrap(), "2024/01");
        assert_eq!(store.next_by_id(seq.id, at(2025, 1, 1)).unwrap(), "2025/01");

        let windows: Vec<(NaiveDate, NaiveDate)> = store
            .ranges(seq.id)
            .unwrap()
            .into_iter()
            .map(|r| (r.date_from, r.date_to))
            .collect();
        assert_eq!(
            windows,
            [
                (day(2024, 1, 1), day(2024, 7, 1)),
                (day(2024, 7, 1), day(2024, 10, 1)),
                (day(2024, 10, 1), day(2025, 1, 1)),
                (day(2025, 1, 1), day(2026, 1, 1)),
            ]
        );
        // The sequence's own counter is untouched by ranged draws.
        assert_eq!(store.number_next_actual(seq.id).unwrap(), 1);
    }

    #[test]
    fn overlapping_ranges_are_rejected() {
        let store = SequenceStore::new();
        let seq = store.create(Sequence::new("R").with_date_range()).unwrap();
        store.add_range(seq.id, day(2024, 1, 1), day(2024, 6, 1)).unwrap();
        assert!(store.add_range(seq.id, day(2024, 5, 1), day(2024, 8, 1)).is_err());
        assert!(store.add_range(seq.id, day(2024, 6, 1), day(2024, 6, 1)).is_err());
        assert!(store.add_range(seq.id, day(2024, 6, 1), day(2024, 8, 1)).is_ok());
    }

    #[test]
    fn missing_sequence_is_not_found() {
        let store = SequenceStore::new();
        assert!(matches!(store.get(RecordId::new(9)), Err(DomainError::NotFound(_))));
        assert!(store.delete(RecordId::new(9)).is_err());
        let seq = store.create(Sequence::new("X")).unwrap();
        store.delete(seq.id).unwrap();
        assert!(store.next_by_id(seq.id, at(2024, 1, 1)).is_err());
    }

    #[test]
    fn invalid_sequences_are_rejected() {
        let store = SequenceStore::new();
        assert!(store.create(Sequence::new("  ")).is_err());
        assert!(store.create(Sequence::new("Z").with_increment(0)).is_err());
        assert!(store.create(Sequence::new("N").with_increment(-1)).is_err());
        assert!(store.list().is_empty());

        let seq = store.create(Sequence::new("Up")).unwrap();
        let lowered = store.update(
            seq.id,
            &SequenceUpdate {
                number_increment: Some(-5),
                ..Default::default()
            },
        );
        assert!(matches!(lowered, Err(DomainError::Validation(_))));
        assert_eq!(store.get(seq.id).unwrap().number_increment, 1);
    }

    proptest::proptest! {
        #[test]
        fn draws_follow_increment(start in 1i64..1000, increment in 1i64..50, draws in 1usize..30) {
            let store = SequenceStore::new();
            let mut seq = Sequence::new("P").with_increment(increment);
            seq.number_next = start;
            let seq = store.create(seq).unwrap();
            for i in 0..draws {
                let n: i64 = store.next_by_id(seq.id, at(2024, 1, 1)).unwrap().parse().unwrap();
                proptest::prop_assert_eq!(n, start + increment * i as i64);
            }
        }
    }
}
