//! Normalizer and change behaviour on whole documents.

use kiroku_state::{ApplyMode, DocumentState, Event, MAX_CHILDREN, cleanup_layouts};
use kiroku_types::keys::HEADER_BLOCK_ID;
use kiroku_types::{Block, ChangeContent, LayoutStyle, Position, Value, WIDTH_FIELD};

// ============================================================================
// Helpers
// ============================================================================

fn root(children: &[&str]) -> Block {
    Block::new("root", Default::default()).with_children(children.iter().copied())
}

fn texts(prefix: &str, n: usize) -> Vec<Block> {
    (0..n).map(|i| Block::text(format!("{prefix}{i:03}"), "")).collect()
}

fn children(state: &DocumentState, id: &str) -> Vec<String> {
    state.pick(id).map(|b| b.children_ids.clone()).unwrap_or_default()
}

/// Flattened leaf order below `id`, looking through `Div` wrappers.
fn leaves(state: &DocumentState, id: &str) -> Vec<String> {
    let mut out = Vec::new();
    for child in children(state, id) {
        if state.pick(&child).is_some_and(Block::is_div_wrapper) {
            out.extend(leaves(state, &child));
        } else {
            out.push(child);
        }
    }
    out
}

fn apply_full(state: DocumentState) -> DocumentState {
    state.apply(ApplyMode::Full { with_layouts: true }).unwrap().0
}

// ============================================================================
// Tree repair
// ============================================================================

#[test]
fn test_root_claims_first() {
    let base = DocumentState::with_blocks(
        "root",
        [
            root(&["a", "b", "c"]),
            Block::text("a", "").with_children(["c", "gone"]),
            Block::text("b", "").with_children(["a", "b"]),
            Block::text("c", ""),
        ],
    );
    let mut state = base.new_state();
    state.normalize(false).unwrap();

    assert_eq!(children(&state, "root"), vec!["a", "b", "c"]);
    assert!(children(&state, "a").is_empty());
    assert!(children(&state, "b").is_empty());
    assert!(state.validate().is_ok());
}

#[test]
fn test_empty_layouts_removed_table_sections_kept() {
    let base = DocumentState::with_blocks(
        "root",
        [
            root(&["r1", "col", "rows", "d"]),
            Block::layout("r1", LayoutStyle::Row),
            Block::layout("col", LayoutStyle::Column),
            Block::layout("rows", LayoutStyle::TableRows),
            Block::layout("d", LayoutStyle::Div),
        ],
    );
    let mut state = base.new_state();
    state.normalize(false).unwrap();
    assert_eq!(children(&state, "root"), vec!["rows"]);
}

#[test]
fn test_single_column_row_collapses() {
    let base = DocumentState::with_blocks(
        "root",
        [
            root(&["a", "row", "b"]),
            Block::layout("row", LayoutStyle::Row).with_children(["col"]),
            Block::layout("col", LayoutStyle::Column).with_children(["t1", "t2"]),
            Block::text("a", ""),
            Block::text("b", ""),
            Block::text("t1", ""),
            Block::text("t2", ""),
        ],
    );
    let (state, result) = base.new_state().apply(ApplyMode::Fast).unwrap();
    assert_eq!(children(&state, "root"), vec!["a", "t1", "t2", "b"]);
    assert!(!state.exists("row"));
    assert!(result.events.contains(&Event::BlockDelete {
        ids: vec!["col".into(), "row".into()],
    }));
}

#[test]
fn test_row_width_reset_when_columns_change() {
    let base = DocumentState::with_blocks(
        "root",
        [
            root(&["row"]),
            Block::layout("row", LayoutStyle::Row).with_children(["c1", "c2"]),
            Block::layout("c1", LayoutStyle::Column)
                .with_children(["t1"])
                .with_field(WIDTH_FIELD, 0.3),
            Block::layout("c2", LayoutStyle::Column)
                .with_children(["t2"])
                .with_field(WIDTH_FIELD, 0.7),
            Block::text("t1", ""),
            Block::text("t2", ""),
            Block::text("t3", ""),
        ],
    );
    let mut state = base.new_state();
    state
        .apply_change(&ChangeContent::BlockCreate {
            target_id: "row".into(),
            position: Position::Inner,
            blocks: vec![Block::layout("c3", LayoutStyle::Column).with_children(["t3"])],
        })
        .unwrap();
    let state = apply_full(state);

    let width = |id: &str| state.pick(id).and_then(|b| b.fields.get(WIDTH_FIELD).cloned());
    assert_eq!(width("c1"), Some(Value::from(0.0)));
    assert_eq!(width("c2"), Some(Value::from(0.0)));
    assert_eq!(width("c3"), None);
}

#[test]
fn test_emptied_column_collapses_row() {
    let base = DocumentState::with_blocks(
        "root",
        [
            root(&["row"]),
            Block::layout("row", LayoutStyle::Row).with_children(["c1", "c2"]),
            Block::layout("c1", LayoutStyle::Column)
                .with_children(["t1"])
                .with_field(WIDTH_FIELD, 0.3),
            Block::layout("c2", LayoutStyle::Column).with_children(["t2"]),
            Block::text("t1", ""),
            Block::text("t2", "two"),
        ],
    );
    let mut state = base.new_state();
    state
        .apply_change(&ChangeContent::BlockRemove { ids: vec!["t1".into()] })
        .unwrap();
    let state = apply_full(state);
    // c1 emptied and removed; the collapsed row leaves only t2.
    assert_eq!(children(&state, "root"), vec!["t2"]);
}

// ============================================================================
// Div rebalancing and header
// ============================================================================

#[test]
fn test_big_branch_split_into_divs() {
    let mut blocks = texts("t", 200);
    let ids: Vec<String> = blocks.iter().map(|b| b.id.clone()).collect();
    blocks.push(Block::new("root", Default::default()).with_children(ids.clone()));
    let state = apply_full(DocumentState::with_blocks("root", blocks).new_state());

    let top = children(&state, "root");
    assert_eq!(top.len(), 5);
    for div in &top {
        assert!(state.pick(div).unwrap().is_div_wrapper());
        assert_eq!(children(&state, div).len(), 40);
    }
    assert_eq!(leaves(&state, "root"), ids);
    assert!(state.validate().is_ok());
}

#[test]
fn test_huge_branch_nests_divs() {
    let mut blocks = texts("t", 2000);
    let ids: Vec<String> = blocks.iter().map(|b| b.id.clone()).collect();
    blocks.push(Block::new("root", Default::default()).with_children(ids.clone()));
    let state = apply_full(DocumentState::with_blocks("root", blocks).new_state());

    assert!(children(&state, "root").len() <= MAX_CHILDREN);
    state.to_snapshot().blocks.iter().for_each(|b| assert!(b.children_ids.len() <= MAX_CHILDREN));
    assert_eq!(leaves(&state, "root"), ids);
}

#[test]
fn test_rebalance_is_stable() {
    let mut blocks = texts("t", 100);
    let ids: Vec<String> = blocks.iter().map(|b| b.id.clone()).collect();
    blocks.push(Block::new("root", Default::default()).with_children(ids));
    let state = apply_full(DocumentState::with_blocks("root", blocks).new_state());
    let before = state.to_snapshot();

    let mut again = state.new_state();
    again.normalize(true).unwrap();
    assert_eq!(again.local_blocks().count(), 0);
    assert_eq!(again.into_parent().to_snapshot(), before);
}

#[test]
fn test_header_hoisted_first() {
    let base = DocumentState::with_blocks(
        "root",
        [
            root(&["a", HEADER_BLOCK_ID, "b"]),
            Block::layout(HEADER_BLOCK_ID, LayoutStyle::Header),
            Block::text("a", ""),
            Block::text("b", ""),
        ],
    );
    let state = apply_full(base.new_state());
    assert_eq!(children(&state, "root"), vec![HEADER_BLOCK_ID, "a", "b"]);
}

#[test]
fn test_header_stays_first_when_rebalanced() {
    let mut blocks = texts("t", 90);
    let mut ids: Vec<String> = blocks.iter().map(|b| b.id.clone()).collect();
    ids.push(HEADER_BLOCK_ID.to_string());
    blocks.push(Block::layout(HEADER_BLOCK_ID, LayoutStyle::Header));
    blocks.push(Block::new("root", Default::default()).with_children(ids));
    let state = apply_full(DocumentState::with_blocks("root", blocks).new_state());

    let top = children(&state, "root");
    assert_eq!(top[0], HEADER_BLOCK_ID);
    assert!(top.len() <= MAX_CHILDREN);
    assert_eq!(leaves(&state, "root").len(), 91);
}

#[test]
fn test_emptied_div_removed() {
    let base = DocumentState::with_blocks(
        "root",
        [
            root(&["d1", "d2"]),
            Block::layout("d1", LayoutStyle::Div).with_children(["a"]),
            Block::layout("d2", LayoutStyle::Div).with_children(["b"]),
            Block::text("a", ""),
            Block::text("b", ""),
        ],
    );
    let mut state = base.new_state();
    state
        .apply_change(&ChangeContent::BlockRemove { ids: vec!["b".into()] })
        .unwrap();
    let state = apply_full(state);
    assert_eq!(children(&state, "root"), vec!["d1"]);
    assert!(!state.exists("d2"));
}

#[test]
fn test_cleanup_layouts_flattens_all_divs() {
    let mut state = DocumentState::with_blocks(
        "root",
        [
            root(&["d1", "x", "d2"]),
            Block::layout("d1", LayoutStyle::Div).with_children(["a", "b"]),
            Block::layout("d2", LayoutStyle::Div).with_children(["c", "d3"]),
            Block::layout("d3", LayoutStyle::Div).with_children(["e"]),
            Block::text("a", ""),
            Block::text("b", ""),
            Block::text("c", ""),
            Block::text("e", ""),
            Block::text("x", ""),
        ],
    )
    .new_state();
    assert_eq!(cleanup_layouts(&mut state), 3);
    assert_eq!(children(&state, "root"), vec!["a", "b", "x", "c", "e"]);
}

// ============================================================================
// Changes end to end
// ============================================================================

#[test]
fn test_side_insert_then_apply() {
    let base = DocumentState::with_blocks(
        "root",
        [root(&["a", "b"]), Block::text("a", "alpha"), Block::text("b", "beta")],
    );
    let mut state = base.new_state();
    state
        .apply_change(&ChangeContent::BlockCreate {
            target_id: "b".into(),
            position: Position::Left,
            blocks: vec![Block::text("n", "new")],
        })
        .unwrap();
    let state = apply_full(state);

    let top = children(&state, "root");
    assert_eq!(top[0], "a");
    let row = state.pick(&top[1]).unwrap();
    assert!(row.is_layout(LayoutStyle::Row));
    let columns: Vec<Vec<String>> = row.children_ids.iter().map(|c| children(&state, c)).collect();
    assert_eq!(columns, vec![vec!["n".to_string()], vec!["b".to_string()]]);
    assert!(state.validate().is_ok());
}

#[test]
fn test_replace_with_children_drops_old_subtree() {
    let base = DocumentState::with_blocks(
        "root",
        [
            root(&["a"]),
            Block::text("a", "").with_children(["a1"]),
            Block::text("a1", ""),
        ],
    );
    let mut state = base.new_state();
    state
        .apply_change(&ChangeContent::BlockCreate {
            target_id: "a".into(),
            position: Position::Replace,
            blocks: vec![Block::text("n", "").with_children(["m"]), Block::text("m", "")],
        })
        .unwrap();
    let (state, result) = state.apply(ApplyMode::Fast).unwrap();
    assert_eq!(children(&state, "root"), vec!["n"]);
    assert_eq!(children(&state, "n"), vec!["m"]);
    assert!(result.events.contains(&Event::BlockDelete {
        ids: vec!["a".into(), "a1".into()],
    }));
}

#[test]
fn test_undo_history_records_full_applies() {
    let mut state = DocumentState::new("root");
    for i in 0..3 {
        let mut next = state.new_state();
        next.apply_change(&ChangeContent::BlockCreate {
            target_id: String::new(),
            position: Position::Inner,
            blocks: vec![Block::text(format!("t{i}"), "x")],
        })
        .unwrap();
        state = apply_full(next);
    }
    let history = state.undo_history_mut();
    assert_eq!(history.len(), 3);
    let last = history.undo().unwrap();
    assert_eq!(last.add[0].id, "t2");
}

// ============================================================================
// Properties
// ============================================================================

mod properties {
    use std::collections::HashSet;

    use super::*;
    use proptest::prelude::*;
    use proptest::sample::Index;

    #[derive(Clone, Debug)]
    enum Op {
        Create { target: Index, position: Position, shape: u8, fan: usize },
        Move { id: Index, target: Index, position: Position },
        Remove { id: Index },
        Header { target: Index, position: Position },
    }

    fn position() -> impl Strategy<Value = Position> {
        prop::sample::select(vec![
            Position::Top,
            Position::Bottom,
            Position::Inner,
            Position::InnerFirst,
            Position::Left,
            Position::Right,
            Position::Replace,
        ])
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (any::<Index>(), position(), 0u8..4, prop_oneof![5 => Just(1usize), 1 => 2usize..60])
                .prop_map(|(target, position, shape, fan)| Op::Create { target, position, shape, fan }),
            2 => (any::<Index>(), any::<Index>(), position())
                .prop_map(|(id, target, position)| Op::Move { id, target, position }),
            1 => any::<Index>().prop_map(|id| Op::Remove { id }),
            1 => (any::<Index>(), position()).prop_map(|(target, position)| Op::Header { target, position }),
        ]
    }

    fn pick(state: &DocumentState, index: &Index) -> String {
        let ids: Vec<String> = state.to_snapshot().blocks.into_iter().map(|b| b.id).collect();
        ids[index.index(ids.len())].clone()
    }

    fn to_content(state: &DocumentState, op: &Op, counter: &mut usize) -> ChangeContent {
        let mut fresh = || {
            *counter += 1;
            format!("n{counter:04}")
        };
        match op {
            Op::Create { target, position, shape, fan } => {
                let blocks = match *shape {
                    0 => (0..*fan).map(|_| Block::text(fresh(), "text")).collect(),
                    1 => {
                        let (row, col, text) = (fresh(), fresh(), fresh());
                        vec![
                            Block::layout(row, LayoutStyle::Row).with_children([col.clone()]),
                            Block::layout(col, LayoutStyle::Column).with_children([text.clone()]),
                            Block::text(text, "cell"),
                        ]
                    }
                    2 => vec![Block::layout(fresh(), LayoutStyle::Column)],
                    _ => vec![Block::layout(fresh(), LayoutStyle::Div)],
                };
                ChangeContent::BlockCreate {
                    target_id: pick(state, target),
                    position: *position,
                    blocks,
                }
            }
            Op::Move { id, target, position } => ChangeContent::BlockMove {
                target_id: pick(state, target),
                position: *position,
                ids: vec![pick(state, id)],
            },
            Op::Remove { id } => ChangeContent::BlockRemove {
                ids: vec![pick(state, id)],
            },
            Op::Header { target, position } => ChangeContent::BlockCreate {
                target_id: pick(state, target),
                position: *position,
                blocks: vec![Block::layout(HEADER_BLOCK_ID, LayoutStyle::Header)],
            },
        }
    }

    /// Applies every op as its own change with a full apply.
    fn run(ops: &[Op]) -> DocumentState {
        let mut state = DocumentState::new("root");
        let mut counter = 0;
        for op in ops {
            let content = to_content(&state, op, &mut counter);
            let mut next = state.new_state();
            let _ = next.apply_change(&content);
            state = apply_full(next);
        }
        state
    }

    fn check_invariants(state: &DocumentState) -> Result<(), TestCaseError> {
        prop_assert!(state.validate().is_ok(), "{}", state.to_tree_string());
        let blocks = state.to_snapshot().blocks;
        for block in &blocks {
            prop_assert!(!block.children_ids.iter().any(|c| c == "root"));
            prop_assert!(block.children_ids.len() <= MAX_CHILDREN);
            if let Some(style) = block.layout_style() {
                if !style.survives_empty() {
                    prop_assert!(!block.children_ids.is_empty(), "empty layout {}", block.id);
                }
                if style == LayoutStyle::Row {
                    prop_assert!(block.children_ids.len() > 1, "single-child row {}", block.id);
                }
            }
        }
        if blocks.iter().any(|b| b.id == HEADER_BLOCK_ID) {
            let top = children(state, "root");
            prop_assert_eq!(top.first().map(String::as_str), Some(HEADER_BLOCK_ID));
        }
        Ok(())
    }

    /// After a create that went through, every new block it brought is in
    /// the tree. Only layout wrappers may be folded away by normalization.
    /// Re-created ids (the header) replace the old block and may be placed
    /// under a subtree they just dropped.
    fn check_created_reachable(
        state: &DocumentState,
        content: &ChangeContent,
        existed: &HashSet<String>,
    ) -> Result<(), TestCaseError> {
        let ChangeContent::BlockCreate { blocks, .. } = content else {
            return Ok(());
        };
        let in_use = state.in_use_ids();
        for block in blocks {
            if existed.contains(&block.id) || block.layout_style().is_some_and(|style| !style.survives_empty()) {
                continue;
            }
            prop_assert!(
                in_use.contains(&block.id),
                "created block {} is gone\n{}",
                block.id,
                state.to_tree_string()
            );
        }
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_invariants_hold_after_every_apply(ops in prop::collection::vec(op(), 1..25)) {
            let mut state = DocumentState::new("root");
            let mut counter = 0;
            for op in &ops {
                let content = to_content(&state, op, &mut counter);
                let existed = state.in_use_ids();
                let mut next = state.new_state();
                let applied = next.apply_change(&content).is_ok();
                state = apply_full(next);
                check_invariants(&state)?;
                if applied {
                    check_created_reachable(&state, &content, &existed)?;
                }
            }
        }

        #[test]
        fn test_normalize_is_idempotent(ops in prop::collection::vec(op(), 1..25)) {
            let state = run(&ops);
            let before = state.to_snapshot();
            let mut again = state.new_state();
            again.normalize(true).unwrap();
            prop_assert_eq!(again.local_blocks().count(), 0);
            prop_assert_eq!(again.into_parent().to_snapshot(), before);
        }

        #[test]
        fn test_replay_is_deterministic(ops in prop::collection::vec(op(), 1..25)) {
            let first = run(&ops);
            let second = run(&ops);
            prop_assert_eq!(first.to_snapshot(), second.to_snapshot());
            prop_assert_eq!(first.to_tree_string(), second.to_tree_string());
        }
    }
}
