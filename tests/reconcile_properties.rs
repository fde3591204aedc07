// Property-based tests for change detection.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use proptest::prelude::*;
use table_reconcile::*;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

const MARKER: &str = "__edited__";

fn columns() -> Vec<String> {
    ["id", "amount", "label", "qty"]
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Arbitrary cell: numbers, short text, or null. Never contains `MARKER`.
fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        3 => (-1_000_000i64..1_000_000).prop_map(Value::Int),
        2 => (-1.0e6..1.0e6f64).prop_map(Value::Float),
        2 => r"[a-z ]{0,8}".prop_map(Value::Text),
        1 => Just(Value::Null),
        1 => any::<bool>().prop_map(Value::Bool),
    ]
}

/// Snapshot with a unique integer `id` per row.
fn arb_snapshot(max_rows: usize) -> impl Strategy<Value = Snapshot> {
    proptest::collection::vec((arb_value(), arb_value(), arb_value()), 0..=max_rows).prop_map(
        |cells| {
            let rows = cells
                .into_iter()
                .enumerate()
                .map(|(idx, (amount, label, qty))| vec![Value::Int(idx as i64), amount, label, qty])
                .collect();
            Snapshot::new(columns(), rows).expect("generated snapshot is rectangular")
        },
    )
}

fn arb_options() -> impl Strategy<Value = ReconcileOptions> {
    (
        prop_oneof![Just(ComparePolicy::Textual), Just(ComparePolicy::Typed)],
        prop_oneof![Just(OutputMode::FullRow), Just(OutputMode::ChangedOnly)],
        prop_oneof![Just(Alignment::Positional), Just(Alignment::Keyed)],
    )
        .prop_map(|(compare, output, alignment)| ReconcileOptions {
            compare,
            output,
            alignment,
            row_count: RowCountPolicy::Truncate,
        })
}

/// A non-empty snapshot plus one (row, value column) to edit.
fn arb_edit() -> impl Strategy<Value = (Snapshot, usize, usize)> {
    arb_snapshot(12)
        .prop_filter("need at least one row", |snapshot| !snapshot.is_empty())
        .prop_flat_map(|snapshot| {
            let rows = snapshot.len();
            (Just(snapshot), 0..rows, 1..4usize)
        })
}

fn key() -> [&'static str; 1] {
    ["id"]
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn snapshot_against_itself_is_empty(snapshot in arb_snapshot(16), options in arb_options()) {
        let changes = Reconciler::with_options(options)
            .reconcile(&snapshot, &snapshot, &key())
            .expect("same columns");
        prop_assert!(changes.is_empty());
    }

    #[test]
    fn single_cell_edit_yields_one_record((snapshot, row, col) in arb_edit(), options in arb_options()) {
        let column = columns()[col].clone();
        let mut edited = snapshot.clone();
        edited.set(row, &column, Value::from(MARKER)).expect("cell exists");

        let changes = Reconciler::with_options(options)
            .reconcile(&snapshot, &edited, &key())
            .expect("same columns");

        prop_assert_eq!(changes.len(), 1);
        let record = &changes.records()[0];
        prop_assert_eq!(record.kind, ChangeKind::Modified);
        prop_assert_eq!(record.row_index, row);
        prop_assert_eq!(&record.changed, &vec![column.clone()]);
        prop_assert_eq!(record.key.get("id"), Some(&Value::Int(row as i64)));
        prop_assert_eq!(record.values.get(&column), Some(&Value::from(MARKER)));
    }

    #[test]
    fn column_order_does_not_matter((snapshot, row, col) in arb_edit(), options in arb_options()) {
        // Two different value columns in the same row.
        let other = col % 3 + 1;
        let mut edited = snapshot.clone();
        edited.set(row, &columns()[col], Value::from(MARKER)).expect("cell exists");
        edited.set(row, &columns()[other], Value::from(MARKER)).expect("cell exists");

        let order = ["qty", "label", "id", "amount"].map(String::from);
        let shuffled_original = snapshot.reordered(&order).expect("same columns");
        let shuffled_edited = edited.reordered(&order).expect("same columns");

        let reconciler = Reconciler::with_options(options);
        let direct = reconciler.reconcile(&snapshot, &edited, &key()).expect("same columns");
        let one_side = reconciler
            .reconcile(&snapshot, &shuffled_edited, &key())
            .expect("same columns");
        let both_sides = reconciler
            .reconcile(&shuffled_original, &shuffled_edited, &key())
            .expect("same columns");

        prop_assert_eq!(direct.records()[0].changed.len(), 2);
        prop_assert_eq!(&direct, &one_side);
        prop_assert_eq!(&direct, &both_sides);
    }

    #[test]
    fn reconcile_is_idempotent(
        original in arb_snapshot(10),
        modified in arb_snapshot(10),
        options in arb_options(),
    ) {
        let reconciler = Reconciler::with_options(options);
        let first = reconciler.reconcile(&original, &modified, &key());
        let second = reconciler.reconcile(&original, &modified, &key());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn key_columns_are_never_reported_as_changed(
        original in arb_snapshot(10),
        modified in arb_snapshot(10),
        options in arb_options(),
    ) {
        let changes = Reconciler::with_options(options)
            .reconcile(&original, &modified, &["id", "label"])
            .expect("same columns, unique ids");
        for record in &changes {
            prop_assert!(!record.changed.iter().any(|c| c == "id" || c == "label"));
            prop_assert!(!record.values.contains_key("id"));
            prop_assert!(!record.values.contains_key("label"));
        }
    }

    #[test]
    fn keyed_alignment_ignores_row_order(snapshot in arb_snapshot(12), rotate in 0usize..12) {
        let mut rows: Vec<Vec<Value>> = snapshot.rows().to_vec();
        if !rows.is_empty() {
            let by = rotate % rows.len();
            rows.rotate_left(by);
        }
        let rotated = Snapshot::new(columns(), rows).expect("rectangular");

        let options = ReconcileOptions {
            alignment: Alignment::Keyed,
            ..ReconcileOptions::default()
        };
        let changes = Reconciler::with_options(options)
            .reconcile(&snapshot, &rotated, &key())
            .expect("unique ids");
        prop_assert!(changes.is_empty());
    }

    #[test]
    fn keyed_counts_match_the_key_sets(
        original in arb_snapshot(10),
        modified in arb_snapshot(10),
    ) {
        let options = ReconcileOptions {
            alignment: Alignment::Keyed,
            ..ReconcileOptions::default()
        };
        let changes = Reconciler::with_options(options)
            .reconcile(&original, &modified, &key())
            .expect("unique ids");

        // ids are 0..len on both sides
        let deleted = original.len().saturating_sub(modified.len());
        let inserted = modified.len().saturating_sub(original.len());
        prop_assert_eq!(changes.count(ChangeKind::Deleted), deleted);
        prop_assert_eq!(changes.count(ChangeKind::Inserted), inserted);
    }
}
