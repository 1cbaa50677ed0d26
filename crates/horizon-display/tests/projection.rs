//! Projection behaviour over real strategy chains.

use std::sync::Arc;

use horizon_display::{
    AdjacencyList, CollectionItem, Direct, DisplayError, DisplayItem, Group, IndexAction,
    ItemTreeDebug, ItemsChange, Projection,
};
use horizon_display_core::{CoreError, Record, RecordList, Row, StrictRow, TreeFormatOptions};
use parking_lot::Mutex;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn row(id: i64, pid: Option<i64>, team: &str) -> Row {
    Row::new()
        .with("id", id)
        .with("pid", pid)
        .with("team", team)
        .with("title", format!("{team}{id}"))
}

fn teams() -> RecordList<Row> {
    RecordList::new(vec![
        row(1, None, "red"),
        row(2, Some(1), "red"),
        row(3, Some(2), "red"),
        row(4, None, "blue"),
    ])
}

fn grouped_tree(rows: RecordList<Row>) -> Projection<Row> {
    let tree = AdjacencyList::builder()
        .source(Box::new(Direct::new(rows)))
        .key_property("id")
        .parent_property("pid")
        .build()
        .unwrap();
    let group = Group::builder()
        .source(Box::new(tree))
        .handler(|row: &Row, _| row.get("team"))
        .build()
        .unwrap();
    Projection::builder().strategy(Box::new(group)).build().unwrap()
}

fn render(projection: &Projection<Row>) -> String {
    ItemTreeDebug::with_field(&projection.items(), "title")
        .with_options(TreeFormatOptions::minimal())
        .to_string()
}

fn find(projection: &Projection<Row>, title: &str) -> DisplayItem<Row> {
    projection
        .strategy()
        .items()
        .unwrap()
        .into_iter()
        .find(|item| {
            item.group_key().map(|key| key.to_string()).as_deref() == Some(title)
                || item.get("title").is_some_and(|value| value.to_string() == title)
        })
        .unwrap()
}

#[test]
fn test_renders_grouped_tree() {
    init_tracing();
    let projection = grouped_tree(teams());
    assert_eq!(
        render(&projection),
        "red\nred1\n\u{251c}\u{2500}\u{2500} red2\n\u{2502}  \u{251c}\u{2500}\u{2500} red3\nblue\nblue4\n"
    );
}

#[test]
fn test_collapsing_a_node_hides_descendants() {
    init_tracing();
    let mut projection = grouped_tree(teams());
    assert_eq!(projection.count(), 6);

    let red1 = find(&projection, "red1");
    assert!(projection.set_expanded(&red1, false).unwrap());
    assert!(!projection.set_expanded(&red1, false).unwrap());
    let titles: Vec<String> = projection.items().iter().map(title).collect();
    assert_eq!(titles, vec!["#red", "red1", "#blue", "blue4"]);

    projection.set_expanded(&red1, true).unwrap();
    assert_eq!(projection.count(), 6);
}

#[test]
fn test_collapsing_a_group_hides_members() {
    let mut projection = grouped_tree(teams());
    let red = find(&projection, "red");
    projection.set_expanded(&red, false).unwrap();
    let titles: Vec<String> = projection.items().iter().map(title).collect();
    assert_eq!(titles, vec!["#red", "#blue", "blue4"]);
}

#[test]
fn test_filtered_out_group_hides_header() {
    let mut projection = grouped_tree(teams());
    projection
        .add_filter(|item, _| {
            item.is_group() || item.get("team").is_some_and(|team| team.to_string() == "blue")
        })
        .unwrap();
    let titles: Vec<String> = projection.items().iter().map(title).collect();
    assert_eq!(titles, vec!["#blue", "blue4"]);
}

#[test]
fn test_sorting_keeps_members_under_their_header() {
    let rows = RecordList::new(vec![
        Row::new().with("title", "b1").with("team", "x"),
        Row::new().with("title", "a1").with("team", "y"),
        Row::new().with("title", "a2").with("team", "x"),
    ]);
    let group = Group::builder()
        .source(Box::new(Direct::new(rows)))
        .handler(|row: &Row, _| row.get("team"))
        .build()
        .unwrap();
    let mut projection = Projection::builder().strategy(Box::new(group)).build().unwrap();
    let titles: Vec<String> = projection.items().iter().map(title).collect();
    assert_eq!(titles, vec!["#x", "b1", "a2", "#y", "a1"]);

    projection
        .sort_by(|a, b| {
            let name = |item: &DisplayItem<Row>| item.get("title").and_then(|v| v.coerced());
            name(a).cmp(&name(b))
        })
        .unwrap();
    let titles: Vec<String> = projection.items().iter().map(title).collect();
    assert_eq!(titles, vec!["#x", "a2", "b1", "#y", "a1"]);

    let x = find(&projection, "x");
    projection.set_expanded(&x, false).unwrap();
    let titles: Vec<String> = projection.items().iter().map(title).collect();
    assert_eq!(titles, vec!["#x", "#y", "a1"]);
}

#[test]
fn test_cursor_survives_mutation_through_chain() {
    init_tracing();
    let rows = teams();
    let mut projection = grouped_tree(rows.clone());
    let blue4 = find(&projection, "blue4");
    assert!(projection.enumerator_mut().set_current(&blue4));
    assert_eq!(projection.enumerator().position(), 5);

    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = changes.clone();
    projection
        .signals()
        .items_changed
        .connect(move |change: &ItemsChange| sink.lock().push(*change));

    projection.remove(2).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(CollectionItem::same_as(
        &projection.enumerator().current().unwrap(),
        &blue4
    ));
    assert_eq!(projection.enumerator().position(), 4);
    assert_eq!(changes.lock()[0].action, IndexAction::Remove);

    projection.insert(0, row(9, None, "blue")).unwrap();
    let titles: Vec<String> = projection.items().iter().map(title).collect();
    // Known groups keep their order.
    assert_eq!(titles, vec!["#red", "red1", "red2", "#blue", "blue9", "blue4"]);
    assert_eq!(projection.enumerator().position(), 5);
    assert_eq!(projection.display_index(0).unwrap(), Some(4));
    assert_eq!(projection.collection_index(4).unwrap(), Some(0));
    assert_eq!(projection.collection_index(3).unwrap(), None);
}

#[test]
fn test_record_errors_propagate() {
    let rows = RecordList::new(vec![
        StrictRow(Row::new().with("id", 1).with("pid", 0)),
        StrictRow(Row::new().with("id", 2)),
    ]);
    let tree = AdjacencyList::builder()
        .source(Box::new(Direct::new(rows)))
        .key_property("id")
        .parent_property("pid")
        .root(0)
        .build()
        .unwrap();
    let err = Projection::builder().strategy(Box::new(tree)).build().err().unwrap();
    match err {
        DisplayError::Record(CoreError::FieldNotFound { name }) => assert_eq!(name, "pid"),
        other => panic!("unexpected error: {other}"),
    }
}

fn title(item: &DisplayItem<Row>) -> String {
    match item.group_key() {
        Some(key) => format!("#{key}"),
        None => item.get("title").unwrap().to_string(),
    }
}
