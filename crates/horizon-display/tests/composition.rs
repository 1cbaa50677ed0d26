//! Strategy chains: layering, index translation through every layer,
//! item identity and snapshots.

use std::sync::Arc;

use horizon_display::{
    AdjacencyList, CollectionItem, Direct, DisplayItem, Group, GroupHandler, ItemsStrategy,
    MaterializedPath, Search, StrategyState, User,
};
use horizon_display_core::{Record, RecordList, Row};

fn row(id: i64, pid: Option<i64>, team: &str) -> Row {
    Row::new()
        .with("id", id)
        .with("pid", pid)
        .with("team", team)
        .with("title", format!("{team}{id}"))
}

fn label(item: &DisplayItem<Row>) -> String {
    if let Some(key) = item.group_key() {
        return format!("#{key}");
    }
    if let Some(path) = item.path() {
        return path
            .iter()
            .map(|record| record.get("title").unwrap().to_string())
            .collect::<Vec<_>>()
            .join(",");
    }
    item.get("title").unwrap().to_string()
}

fn labels(strategy: &dyn ItemsStrategy<Row>) -> Vec<String> {
    strategy.items().unwrap().iter().map(label).collect()
}

fn by_team() -> GroupHandler<Row> {
    Arc::new(|row: &Row, _| row.get("team"))
}

fn tree(source: Box<dyn ItemsStrategy<Row>>) -> AdjacencyList<Row> {
    AdjacencyList::builder()
        .source(source)
        .key_property("id")
        .parent_property("pid")
        .build()
        .unwrap()
}

fn teams() -> RecordList<Row> {
    RecordList::new(vec![
        row(1, None, "red"),
        row(2, Some(1), "red"),
        row(3, None, "blue"),
        row(4, Some(3), "blue"),
    ])
}

#[test]
fn test_group_over_tree() {
    let group = Group::builder()
        .source(Box::new(tree(Box::new(Direct::new(teams())))))
        .handler(|row: &Row, _| row.get("team"))
        .build()
        .unwrap();

    assert_eq!(
        labels(&group),
        vec!["#red", "red1", "red2", "#blue", "blue3", "blue4"]
    );
    let items = group.items().unwrap();
    assert_eq!(items[2].level(), 1);
    assert!(CollectionItem::same_as(&items[2].parent().unwrap(), &items[1]));
    assert_eq!(items[0].level(), 0);

    assert_eq!(group.display_index(3).unwrap(), Some(5));
    assert_eq!(group.collection_index(4).unwrap(), Some(2));
    assert_eq!(group.collection_index(3).unwrap(), None);
}

#[test]
fn test_tree_over_group_repeats_headers() {
    let rows = RecordList::new(vec![
        row(1, None, "red"),
        row(2, Some(1), "blue"),
        row(3, Some(1), "red"),
        row(4, None, "red"),
    ]);
    let group = Group::builder()
        .source(Box::new(Direct::new(rows)))
        .handler(|row: &Row, _| row.get("team"))
        .build()
        .unwrap();
    let tree = tree(Box::new(group));

    assert_eq!(
        labels(&tree),
        vec!["#red", "red1", "red3", "#blue", "blue2", "#red", "red4"]
    );
    let items = tree.items().unwrap();
    assert!(CollectionItem::same_as(&items[0], &items[5]));
    assert_eq!(tree.display_index(3).unwrap(), Some(6));
    assert_eq!(tree.display_index(1).unwrap(), Some(4));
    assert_eq!(tree.collection_index(5).unwrap(), None);
}

fn grouped_tree(rows: RecordList<Row>) -> AdjacencyList<Row> {
    let group = Group::builder()
        .source(Box::new(Direct::new(rows)))
        .handler(|row: &Row, _| row.get("team"))
        .build()
        .unwrap();
    tree(Box::new(group))
}

#[test]
fn test_tree_over_group_returns_to_ancestor_group() {
    let tree = grouped_tree(RecordList::new(vec![
        row(1, None, "red"),
        row(2, Some(1), "blue"),
        row(3, Some(2), "red"),
    ]));

    assert_eq!(
        labels(&tree),
        vec!["#red", "red1", "#blue", "blue2", "#red", "red3"]
    );
    let items = tree.items().unwrap();
    assert!(CollectionItem::same_as(&items[0], &items[4]));
    // The header is repeated but the tree links are not.
    assert_eq!(items[5].level(), 2);
    assert!(CollectionItem::same_as(&items[5].parent().unwrap(), &items[3]));
    assert_eq!(tree.display_index(2).unwrap(), Some(5));
}

#[test]
fn test_tree_over_group_keeps_contiguous_children_together() {
    let rows = RecordList::new(vec![
        row(1, None, "red"),
        row(2, Some(1), "red"),
        row(3, Some(1), "red"),
        row(4, Some(1), "blue"),
    ]);
    let mut tree = grouped_tree(rows.clone());
    assert_eq!(
        labels(&tree),
        vec!["#red", "red1", "red2", "red3", "#blue", "blue4"]
    );
    let header = tree.at(0).unwrap();

    tree.splice(3, 1, Vec::new()).unwrap();
    assert_eq!(labels(&tree), vec!["#red", "red1", "red2", "red3"]);
    assert!(CollectionItem::same_as(&tree.at(0).unwrap(), &header));

    tree.splice(1, 1, Vec::new()).unwrap();
    assert_eq!(labels(&tree), vec!["#red", "red1", "red3"]);
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_search_over_materialized_path() {
    let node = |title: &str, children: Vec<Row>| {
        Row::new()
            .with("title", title)
            .with_children("items", children)
    };
    let leaf = |title: &str| Row::new().with("title", title);
    let rows = RecordList::new(vec![
        node(
            "A",
            vec![node("AA", vec![node("AAA", vec![leaf("AAAa"), leaf("AAAb")])])],
        ),
        leaf("d"),
        leaf("e"),
    ]);
    let tree = MaterializedPath::builder()
        .collection(rows)
        .children_property("items")
        .build()
        .unwrap();
    let search = Search::builder().source(Box::new(tree)).build().unwrap();

    assert_eq!(labels(&search), vec!["A,AA,AAA", "AAAa", "AAAb", "d", "e"]);
    assert_eq!(search.display_index(1).unwrap(), Some(3));
    assert_eq!(search.display_index(0).unwrap(), Some(5));
    assert_eq!(search.collection_index(4).unwrap(), Some(2));
}

#[test]
fn test_user_sort_over_direct() {
    let user = User::builder()
        .source(Box::new(Direct::new(teams())))
        .comparator(|a, b| {
            let team = |entry: &horizon_display::SortEntry<Row>| {
                entry.record().and_then(|record| record.get("team")).and_then(|v| v.coerced())
            };
            team(a).cmp(&team(b))
        })
        .build()
        .unwrap();
    assert_eq!(labels(&user), vec!["blue3", "blue4", "red1", "red2"]);
    assert_eq!(user.display_index(0).unwrap(), Some(2));
    assert_eq!(user.collection_index(0).unwrap(), Some(2));
}

#[test]
fn test_items_keep_identity_until_reset() {
    let chains: Vec<Box<dyn ItemsStrategy<Row>>> = vec![
        Box::new(Direct::new(teams())),
        Box::new(tree(Box::new(Direct::new(teams())))),
        Box::new(
            Group::builder()
                .source(Box::new(Direct::new(teams())))
                .handler(|row: &Row, _| row.get("team"))
                .build()
                .unwrap(),
        ),
        Box::new(
            User::builder()
                .source(Box::new(Direct::new(teams())))
                .build()
                .unwrap(),
        ),
        Box::new(
            Search::builder()
                .source(Box::new(tree(Box::new(Direct::new(teams())))))
                .build()
                .unwrap(),
        ),
    ];

    for mut chain in chains {
        let first = chain.items().unwrap();
        let second = chain.items().unwrap();
        assert_eq!(first.len(), second.len(), "{:?}", chain.kind());
        for (a, b) in first.iter().zip(&second) {
            assert!(CollectionItem::same_as(a, b), "{:?}", chain.kind());
        }
        for (index, item) in first.iter().enumerate() {
            assert!(CollectionItem::same_as(&chain.at(index).unwrap(), item));
        }

        chain.reset();
        let rebuilt = chain.items().unwrap();
        assert_eq!(rebuilt.len(), first.len());
        assert!(
            rebuilt
                .iter()
                .zip(&first)
                .any(|(a, b)| !CollectionItem::same_as(a, b)),
            "{:?}",
            chain.kind()
        );
    }
}

#[test]
fn test_splice_through_chain() {
    let rows = teams();
    let mut group = Group::builder()
        .source(Box::new(tree(Box::new(Direct::new(rows.clone())))))
        .handler(|row: &Row, _| row.get("team"))
        .build()
        .unwrap();

    group
        .splice(4, 0, vec![Arc::new(row(5, Some(1), "red"))])
        .unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(
        labels(&group),
        vec!["#red", "red1", "red2", "red5", "#blue", "blue3", "blue4"]
    );

    let removed = group.splice(2, 2, Vec::new()).unwrap();
    assert_eq!(removed.len(), 2);
    assert_eq!(labels(&group), vec!["#red", "red1", "red2", "red5"]);
}

#[test]
fn test_snapshot_restores_chain() {
    let rows = teams();
    let group = Group::builder()
        .source(Box::new(tree(Box::new(Direct::new(rows.clone())))))
        .handler(|row: &Row, _| row.get("team"))
        .build()
        .unwrap();
    let before = labels(&group);

    let json = group.to_state().unwrap().to_json().unwrap();
    assert_eq!(json["state"]["kind"], "group");
    assert_eq!(json["state"]["source"]["kind"], "adjacency_list");
    assert_eq!(json["state"]["source"]["$options"]["parent_property"], "pid");

    let state = StrategyState::from_json(&json).unwrap();
    let tree_state = state.source.as_deref().unwrap();
    let direct_state = tree_state.source.as_deref().unwrap();
    let direct = Direct::from_state(direct_state, rows).unwrap();
    let tree = AdjacencyList::from_state(tree_state, Box::new(direct)).unwrap();
    let restored = Group::from_state(&state, Box::new(tree), Some(by_team())).unwrap();

    assert_eq!(labels(&restored), before);
    assert_eq!(restored.to_state().unwrap(), group.to_state().unwrap());
}

#[test]
fn test_restoring_the_wrong_kind_fails() {
    let state = Direct::new(teams()).to_state().unwrap();
    let err = AdjacencyList::from_state(&state, Box::new(Direct::new(teams()))).err();
    assert!(err.is_some());
}
