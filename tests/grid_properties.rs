use batchsheet::grid::{ChangedRow, Grid, GridEvent, GridOptions, RowData};
use batchsheet::navigation::{ActiveCell, NavKey};
use batchsheet::view::{SortDirection, SortSpec, cell_value, contains_ignore_case};

fn row(pairs: &[(&str, &str)]) -> RowData {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn alice_bob() -> Grid {
    Grid::new(
        columns(&["name", "age"]),
        vec![
            row(&[("name", "Alice"), ("age", "30")]),
            row(&[("name", "Bob"), ("age", "25")]),
        ],
        GridOptions::default(),
    )
}

fn numbered(n: usize, page_size: usize) -> Grid {
    let rows = (0..n)
        .map(|i| {
            row(&[
                ("name", &format!("person {}", i)),
                ("team", if i % 2 == 0 { "red" } else { "blue" }),
            ])
        })
        .collect();
    Grid::new(
        columns(&["name", "team"]),
        rows,
        GridOptions::default().with_page_size(page_size),
    )
}

#[test]
fn displayed_rows_satisfy_every_filter() {
    let mut grid = numbered(40, 7);
    grid.set_column_filter("team", "RED");
    grid.set_global_filter("1");

    let shown = grid.get_all_filtered_rows();
    assert!(shown.len() <= grid.row_count());
    assert!(!shown.is_empty());
    for r in &shown {
        assert!(contains_ignore_case(cell_value(r, "team"), "red"));
        assert!(r.values().any(|v| contains_ignore_case(v, "1")));
    }
    assert!(grid.page_rows().len() <= grid.page_size());
}

#[test]
fn sort_is_stable_for_equal_keys() {
    let mut grid = numbered(10, 10);
    grid.set_sort(Some(SortSpec {
        column: "team".to_string(),
        direction: SortDirection::Asc,
    }));

    let order = grid.display_order();
    // blue rows are the odd ones, in their original relative order
    assert_eq!(order, vec![1, 3, 5, 7, 9, 0, 2, 4, 6, 8]);

    grid.set_sort(Some(SortSpec {
        column: "team".to_string(),
        direction: SortDirection::Desc,
    }));
    assert_eq!(grid.display_order(), vec![0, 2, 4, 6, 8, 1, 3, 5, 7, 9]);
}

#[test]
fn edit_round_trip_marks_row_changed() {
    let mut grid = alice_bob();
    grid.activate_cell(1, "age").unwrap();
    assert_eq!(grid.active_value(), Some("25"));
    grid.input("26").unwrap();
    grid.blur();

    assert_eq!(grid.row(1).unwrap()["age"], "26");
    assert!(grid.is_changed(1));
    assert!(!grid.is_changed(0));
    assert!(grid.can_save());
}

#[test]
fn save_clears_exactly_the_changed_set() {
    let mut grid = alice_bob();
    grid.set_cell(0, "age", "31").unwrap();
    grid.set_cell(1, "age", "26").unwrap();

    assert_eq!(grid.save().unwrap(), 2);
    assert_eq!(grid.changed_count(), 0);
    assert!(grid.active_cell().is_none());
    match grid.take_events().as_slice() {
        [GridEvent::SaveRequested(rows)] => {
            assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![0, 1]);
        }
        other => panic!("unexpected events: {:?}", other),
    }

    grid.set_cell(1, "name", "Robert").unwrap();
    assert_eq!(
        grid.changed_rows(),
        vec![ChangedRow {
            id: 1,
            fields: row(&[("name", "Robert"), ("age", "26")]),
        }]
    );
}

#[test]
fn only_filter_changes_reset_the_page() {
    let mut grid = numbered(30, 5);
    grid.set_page_index(3);

    grid.toggle_sort("name");
    assert_eq!(grid.page_index(), 3);
    grid.set_column_visible("team", false);
    assert_eq!(grid.page_index(), 3);

    grid.set_global_filter("person");
    assert_eq!(grid.page_index(), 0);

    grid.set_page_index(2);
    grid.set_column_filter("name", "person");
    assert_eq!(grid.page_index(), 0);
}

#[test]
fn reorder_moves_one_column_and_keeps_the_rest() {
    let mut grid = Grid::new(
        columns(&["a", "b", "c", "d"]),
        vec![row(&[("a", "1")])],
        GridOptions::default(),
    );

    let order = grid.move_column(0, 2).unwrap();
    assert_eq!(order, columns(&["b", "c", "a", "d"]));
    assert_eq!(
        grid.take_events(),
        vec![GridEvent::ColumnsReordered(columns(&["b", "c", "a", "d"]))]
    );

    assert!(grid.begin_column_drag("d"));
    let order = grid.end_column_drag(Some("b")).unwrap();
    assert_eq!(order, columns(&["d", "b", "c", "a"]));
}

#[test]
fn age_filter_keeps_only_alice() {
    let mut grid = alice_bob();
    grid.set_column_filter("age", "3");

    let rows = grid.get_all_filtered_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "Alice");
}

#[test]
fn arrow_right_on_last_column_turns_the_page() {
    let mut grid = Grid::new(
        columns(&["name", "age"]),
        vec![
            row(&[("name", "Alice"), ("age", "30")]),
            row(&[("name", "Bob"), ("age", "25")]),
            row(&[("name", "Cara"), ("age", "41")]),
        ],
        GridOptions::default().with_page_size(1),
    );

    grid.activate_cell(0, "age").unwrap();
    assert!(grid.handle_key(NavKey::Right));
    assert_eq!(grid.page_index(), 1);
    assert_eq!(grid.active_cell(), Some(&ActiveCell::new(0, "name")));
    assert_eq!(grid.active_value(), Some("Bob"));

    assert!(grid.handle_key(NavKey::Left));
    assert_eq!(grid.page_index(), 0);
    assert_eq!(grid.active_cell(), Some(&ActiveCell::new(0, "age")));
}

#[test]
fn selection_survives_paging_and_follows_filters() {
    let mut grid = numbered(12, 5);
    grid.toggle_row_selected(0).unwrap();
    grid.next_page();
    grid.toggle_row_selected(1).unwrap();
    grid.previous_page();

    assert!(grid.is_row_selected(0));
    assert!(grid.is_row_selected(6));
    assert_eq!(grid.selected_count(), 2);

    grid.set_column_filter("team", "red");
    let selected = grid.get_selected_rows();
    assert_eq!(selected.len(), 2);
    assert_eq!(selected[0]["name"], "person 0");

    grid.set_column_filter("team", "blue");
    assert_eq!(grid.filtered_count(), 6);
    let hidden = grid.get_selected_rows();
    assert_eq!(hidden.len(), grid.selected_count());
    assert_eq!(hidden[1]["name"], "person 6");
}

#[test]
fn header_toggle_selects_filtered_rows_on_every_page() {
    let mut grid = numbered(12, 5);
    grid.set_column_filter("team", "red");
    assert_eq!(grid.page_count(), 2);

    assert_eq!(grid.toggle_all_rows_selected(), Ok(true));
    assert_eq!(grid.selected_count(), grid.filtered_count());
    assert!(grid.is_row_selected(10));
    assert!(!grid.is_row_selected(1));

    grid.set_column_filter("team", "");
    assert!(!grid.is_all_rows_selected());
    assert_eq!(grid.get_selected_rows().len(), 6);
}

#[test]
fn seeding_resets_working_state() {
    let mut grid = alice_bob();
    grid.set_cell(0, "age", "99").unwrap();
    grid.set_row_selected(1, true).unwrap();
    grid.set_global_filter("a");

    grid.seed(
        columns(&["name", "age"]),
        vec![row(&[("name", "Cara"), ("age", "41")])],
    );
    assert_eq!(grid.changed_count(), 0);
    assert_eq!(grid.selected_count(), 0);
    assert_eq!(grid.page_index(), 0);
    assert_eq!(grid.row_count(), 1);
    assert_eq!(grid.get_all_filtered_rows()[0]["name"], "Cara");
}
