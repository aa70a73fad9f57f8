#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use overlay_core::{ContainerRecords, RecordStatus, ValueRecord};
use overlay_merge::{merge, BufferField, EditBuffer};

fn rec(key: &str) -> ValueRecord { ValueRecord::plain(key, format!("v-{}", key)) }

fn list(keys: &[&str]) -> Vec<ValueRecord> { keys.iter().map(|k| rec(k)).collect() }

// Small deterministic corpus of base/override shapes with unique keys per side.
fn cases() -> Vec<(Vec<ValueRecord>, Vec<ValueRecord>)> {
    vec![
        (list(&[]), list(&[])),
        (list(&["a"]), list(&[])),
        (list(&[]), list(&["a", "b"])),
        (list(&["a", "b"]), list(&["b", "c"])),
        (list(&["z", "y", "x"]), list(&["x", "w", "z", "v"])),
        (list(&["a", "b", "c"]), list(&["c", "b", "a"])),
        (list(&["m", "n"]), list(&["p", "q", "r"])),
    ]
}

#[test]
fn ordering_is_base_then_override_only() {
    for (base, overrides) in cases() {
        let rows = merge(&base, &overrides);
        let got: Vec<&str> = rows.iter().map(|r| r.record.key.as_str()).collect();

        let base_keys: Vec<&str> = base.iter().map(|r| r.key.as_str()).collect();
        let mut expected = base_keys.clone();
        expected.extend(overrides.iter().map(|r| r.key.as_str()).filter(|k| !base_keys.contains(k)));
        assert_eq!(got, expected, "base={:?} overrides={:?}", base_keys, overrides);

        for row in &rows[..base.len()] {
            assert_ne!(row.status, RecordStatus::New);
        }
        for row in &rows[base.len()..] {
            assert_eq!(row.status, RecordStatus::New);
        }
    }
}

#[test]
fn keys_are_the_union_without_duplicates() {
    for (base, overrides) in cases() {
        let rows = merge(&base, &overrides);
        let got: Vec<&str> = rows.iter().map(|r| r.record.key.as_str()).collect();
        let unique: BTreeSet<&str> = got.iter().copied().collect();
        assert_eq!(unique.len(), got.len());

        let union: BTreeSet<&str> = base.iter().chain(overrides.iter()).map(|r| r.key.as_str()).collect();
        assert_eq!(unique, union);
    }
}

#[test]
fn source_index_points_at_override_slot() {
    for (base, overrides) in cases() {
        for row in merge(&base, &overrides) {
            match row.status {
                RecordStatus::Inherited => {
                    assert!(row.source_index.is_none());
                    assert!(row.base_value.is_none());
                }
                RecordStatus::Overridden => {
                    let idx = row.source_index.expect("overridden rows carry an index");
                    assert_eq!(overrides[idx], row.record);
                    assert_eq!(row.base_value.as_ref().map(|b| b.key.as_str()), Some(row.record.key.as_str()));
                }
                RecordStatus::New => {
                    let idx = row.source_index.expect("new rows carry an index");
                    assert_eq!(overrides[idx], row.record);
                }
            }
        }
    }
}

#[test]
fn merged_view_follows_edit_sessions() {
    let base = list(&["LOG_LEVEL", "PORT"]);
    let mut lists = ContainerRecords::new();
    let mut eb = EditBuffer::new();

    // override an inherited row through its merged entry
    let rows = merge(&base, &[]);
    let idx = eb.start_override(&mut lists, "main", &rows[1].record).unwrap();
    eb.update_buffer(BufferField::PlainValue("9090".into())).unwrap();
    eb.apply_edit(&mut lists).unwrap();

    // add a new row, then abandon another
    eb.start_new(&mut lists, "main", None).unwrap();
    eb.update_buffer(BufferField::Key("DB_HOST".into())).unwrap();
    eb.update_buffer(BufferField::PlainValue("db".into())).unwrap();
    eb.apply_edit(&mut lists).unwrap();
    eb.start_new(&mut lists, "main", None).unwrap();
    eb.cancel_edit(&mut lists).unwrap();

    let rows = merge(&base, &lists["main"]);
    let summary: Vec<(&str, RecordStatus, Option<usize>)> =
        rows.iter().map(|r| (r.record.key.as_str(), r.status, r.source_index)).collect();
    assert_eq!(
        summary,
        vec![
            ("LOG_LEVEL", RecordStatus::Inherited, None),
            ("PORT", RecordStatus::Overridden, Some(idx)),
            ("DB_HOST", RecordStatus::New, Some(1)),
        ]
    );
    assert_eq!(rows[1].record.plain_value(), Some("9090"));
}
