//! Tracked positions must keep denoting the same logical location across
//! arbitrary mutations, including deletion of enclosing subtrees and undo.

use prosetree_engine::dom::Tag;
use prosetree_engine::html::parse_document;
use prosetree_engine::position::Position;
use prosetree_engine::range::Range;

#[test]
fn test_positions_inside_deleted_subtree_collapse_to_deletion_point() {
    let mut doc = parse_document("<p>a<span><b>bc</b></span>d</p>").unwrap();
    let bc = doc.find_text("bc").unwrap();
    let span = doc.find_first(&Tag::Span).unwrap();
    let p = doc.find_first(&Tag::P).unwrap();

    let mut positions = [Position::new(bc, 1), Position::new(bc, 2)];
    doc.track_positions(&mut positions, |doc| {
        doc.delete_node(span);
    });

    // Both were inside the deleted subtree: collapsed to the deletion point.
    assert_eq!(positions[0], Position::new(p, 1));
    assert_eq!(positions[1], Position::new(p, 1));
    // And still valid.
    assert!(positions[0].offset <= doc.max_offset(positions[0].node));
}

#[test]
fn test_positions_outside_deleted_subtree_keep_their_offset() {
    let mut doc = parse_document("<p>a<span>x</span>d</p>").unwrap();
    let a = doc.find_text("a").unwrap();
    let d = doc.find_text("d").unwrap();
    let span = doc.find_first(&Tag::Span).unwrap();

    let mut positions = [Position::new(a, 1), Position::new(d, 0)];
    doc.track_positions(&mut positions, |doc| {
        doc.delete_node(span);
    });

    // Positions in sibling text nodes are untouched.
    assert_eq!(positions[0], Position::new(a, 1));
    assert_eq!(positions[1], Position::new(d, 0));
}

#[test]
fn test_tracked_range_survives_ancestor_delete_and_undo() {
    let mut doc = parse_document("<p>before</p><div><p>inside</p></div><p>after</p>").unwrap();
    let inside = doc.find_text("inside").unwrap();
    let div = doc.find_first(&Tag::Div).unwrap();
    let body = doc.body();

    let mut range = Range::new(Position::new(inside, 1), Position::new(inside, 4));
    doc.undo_new_group("Delete block");
    doc.track_range(&mut range, |doc| {
        doc.delete_node(div);
    });

    // Collapsed to the deletion point, valid, non-throwing.
    assert_eq!(range.start, Position::new(body, 1));
    assert_eq!(range.end, Position::new(body, 1));
    assert!(range.start.offset <= doc.max_offset(range.start.node));

    // Replaying the inverse brings the identical nodes back.
    doc.undo();
    assert!(doc.in_tree(div));
    assert!(doc.in_tree(inside));
    assert_eq!(doc.node_text(inside), "inside");
}

#[test]
fn test_position_round_trip_through_delete_and_undo() {
    let mut doc = parse_document("<p>one</p><p>two</p>").unwrap();
    let two = doc.find_text("two").unwrap();
    let p2 = doc.parent(two).unwrap();
    let body = doc.body();

    let mut positions = [Position::new(two, 2)];
    doc.undo_new_group("Delete paragraph");
    doc.track_positions(&mut positions, |doc| {
        doc.delete_node(p2);
    });
    assert_eq!(positions[0], Position::new(body, 1));

    let mut positions = [positions[0]];
    doc.track_positions(&mut positions, |doc| {
        doc.undo();
    });
    // The node identity survived the round trip; the tracked position sits
    // at the re-insertion point.
    assert!(doc.in_tree(p2));
    assert_eq!(doc.node_text(p2), "two");
    assert_eq!(positions[0], Position::new(body, 1));
    assert!(positions[0].offset <= doc.max_offset(positions[0].node));
}

#[test]
fn test_text_edits_shift_tracked_selection() {
    let mut doc = parse_document("<p>hello world</p>").unwrap();
    let text = doc.find_text("hello world").unwrap();

    let mut range = Range::new(Position::new(text, 6), Position::new(text, 11));
    doc.track_range(&mut range, |doc| {
        doc.insert_characters(text, 0, ">> ");
        doc.delete_characters(text, 3, 8); // remove "hello"
    });

    // "world" is still exactly what the range covers.
    assert_eq!(range.start.offset, 4);
    assert_eq!(range.end.offset, 9);
    let value = doc.node_text(text);
    let chars: Vec<char> = value.chars().collect();
    let covered: String = chars[range.start.offset..range.end.offset].iter().collect();
    assert_eq!(covered, "world");
}

#[test]
fn test_many_positions_on_one_node() {
    let mut doc = parse_document("<p>abcdef</p>").unwrap();
    let text = doc.find_text("abcdef").unwrap();

    let mut positions: Vec<Position> = (0..=6).map(|i| Position::new(text, i)).collect();
    doc.track_positions(&mut positions, |doc| {
        doc.insert_characters(text, 3, "XY");
    });
    let offsets: Vec<usize> = positions.iter().map(|p| p.offset).collect();
    assert_eq!(offsets, vec![0, 1, 2, 3, 6, 7, 8]);
}
