//! Table structure analysis and editing.
//!
//! A table's rowspan/colspan layout is derived on demand into a dense grid
//! ([`TableStructure`]): every `(row, col)` slot maps to the logical
//! [`Cell`] covering it. Missing slots are repaired by synthesizing empty
//! cells, after which the grid tiles exactly — no gaps, no overlaps. All
//! structural edits (row/column insertion and deletion, merging, splitting,
//! pasting) are phrased over this grid and re-derive it afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::clipboard;
use crate::dom::{Document, NodeId, Tag};
use crate::position::{self, Position};
use crate::range::Range;

/// A logical table cell: the element, its anchor slot, and its spans.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    pub element: NodeId,
    pub row: usize,
    pub col: usize,
    pub rowspan: usize,
    pub colspan: usize,
}

impl Cell {
    fn from_element(doc: &Document, element: NodeId, row: usize, col: usize) -> Cell {
        let parse = |name: &str| -> usize {
            doc.node(element)
                .attribute(name)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(1)
                .max(1)
        };
        Cell {
            element,
            row,
            col,
            rowspan: parse("rowspan"),
            colspan: parse("colspan"),
        }
    }

    pub fn top(&self) -> usize {
        self.row
    }

    pub fn bottom(&self) -> usize {
        self.row + self.rowspan - 1
    }

    pub fn left(&self) -> usize {
        self.col
    }

    pub fn right(&self) -> usize {
        self.col + self.colspan - 1
    }
}

/// Derived dense grid of a table element.
#[derive(Clone, Debug)]
pub struct TableStructure {
    pub element: NodeId,
    pub num_rows: usize,
    pub num_cols: usize,
    cells: Vec<Cell>,
    grid: Vec<Vec<Option<usize>>>,
    by_element: HashMap<NodeId, usize>,
}

impl TableStructure {
    fn new(element: NodeId) -> TableStructure {
        TableStructure {
            element,
            num_rows: 0,
            num_cols: 0,
            cells: Vec::new(),
            grid: Vec::new(),
            by_element: HashMap::new(),
        }
    }

    pub fn cell_at(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cell_index(row, col).map(|i| &self.cells[i])
    }

    fn cell_index(&self, row: usize, col: usize) -> Option<usize> {
        self.grid.get(row)?.get(col)?.as_ref().copied()
    }

    pub fn cell_for_element(&self, element: NodeId) -> Option<&Cell> {
        self.by_element.get(&element).map(|i| &self.cells[*i])
    }

    fn set(&mut self, row: usize, col: usize, cell_index: usize) {
        if self.num_rows < row + 1 {
            self.num_rows = row + 1;
        }
        if self.num_cols < col + 1 {
            self.num_cols = col + 1;
        }
        if self.grid.len() <= row {
            self.grid.resize(row + 1, Vec::new());
        }
        if self.grid[row].len() <= col {
            self.grid[row].resize(col + 1, None);
        }
        self.grid[row][col] = Some(cell_index);
    }

    fn add_cell(&mut self, cell: Cell) -> usize {
        let index = self.cells.len();
        self.by_element.insert(cell.element, index);
        self.cells.push(cell);
        index
    }

    /// Point every slot of a rectangle at one cell, deleting whatever cell
    /// elements previously occupied those slots. Used when pasting moves a
    /// spanning cell into the grid.
    fn set_region(
        &mut self,
        doc: &mut Document,
        top: usize,
        left: usize,
        bottom: usize,
        right: usize,
        cell_index: usize,
    ) {
        for row in top..=bottom {
            for col in left..=right {
                if let Some(old) = self.cell_index(row, col) {
                    let element = self.cells[old].element;
                    doc.delete_node(element);
                }
                self.set(row, col, cell_index);
            }
        }
    }
}

/// Build the dense grid for a table element, synthesizing empty cells for
/// any uncovered slots (the result is re-analysed once if repair ran).
pub fn analyse_structure(doc: &mut Document, element: NodeId) -> TableStructure {
    let initial = build_structure(doc, element);
    fix(doc, initial)
}

fn build_structure(doc: &Document, element: NodeId) -> TableStructure {
    let mut structure = TableStructure::new(element);
    let mut row = 0;
    let mut col = 0;
    process_table(doc, &mut structure, &mut row, &mut col, element);
    structure
}

fn process_table(
    doc: &Document,
    structure: &mut TableStructure,
    row: &mut usize,
    col: &mut usize,
    node: NodeId,
) {
    match doc.node(node).tag() {
        Some(Tag::Td) | Some(Tag::Th) => {
            while structure.cell_index(*row, *col).is_some() {
                *col += 1;
            }
            let cell = Cell::from_element(doc, node, *row, *col);
            let colspan = cell.colspan;
            let rowspan = cell.rowspan;
            let index = structure.add_cell(cell);
            for r in 0..rowspan {
                for c in 0..colspan {
                    structure.set(*row + r, *col + c, index);
                }
            }
            *col += colspan;
        }
        Some(Tag::Tr) => {
            let children = doc.children(node);
            for child in children {
                process_table(doc, structure, row, col, child);
            }
            *row += 1;
            *col = 0;
        }
        _ => {
            let children = doc.children(node);
            for child in children {
                process_table(doc, structure, row, col, child);
            }
        }
    }
}

fn create_empty_cell(doc: &mut Document, tag: Tag) -> NodeId {
    let br = doc.create_element(Tag::Br);
    let p = doc.create_element(Tag::P);
    let td = doc.create_element(tag);
    doc.append_child(p, br);
    doc.append_child(td, p);
    td
}

fn find_tbody(doc: &Document, table: NodeId) -> Option<NodeId> {
    doc.children(table)
        .into_iter()
        .find(|c| doc.has_tag(*c, &Tag::Tbody))
}

fn get_trs(doc: &Document, node: NodeId, result: &mut Vec<NodeId>) {
    if doc.has_tag(node, &Tag::Tr) {
        result.push(node);
    } else {
        for child in doc.children(node) {
            get_trs(doc, child, result);
        }
    }
}

/// Synthesize rows and cells until every grid slot is covered.
fn fix(doc: &mut Document, table: TableStructure) -> TableStructure {
    let Some(tbody) = find_tbody(doc, table.element) else {
        return table;
    };

    let mut trs: Vec<NodeId> = doc
        .children(tbody)
        .into_iter()
        .filter(|c| doc.has_tag(*c, &Tag::Tr))
        .collect();

    let mut changed = false;
    while trs.len() < table.num_rows {
        let tr = doc.create_element(Tag::Tr);
        doc.append_child(tbody, tr);
        trs.push(tr);
        changed = true;
    }

    for row in 0..table.num_rows {
        for col in 0..table.num_cols {
            if table.cell_index(row, col).is_none() {
                let td = create_empty_cell(doc, Tag::Td);
                doc.append_child(trs[row], td);
                changed = true;
            }
        }
    }

    if changed {
        build_structure(doc, table.element)
    } else {
        table
    }
}

// ----------------------------------------------------------------------
// Regions
// ----------------------------------------------------------------------

/// A rectangular, span-consistent sub-grid selection within one table.
#[derive(Clone, Debug)]
pub struct TableRegion {
    pub structure: TableStructure,
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

pub fn find_containing_cell(doc: &Document, node: NodeId) -> Option<NodeId> {
    let mut current = Some(node);
    while let Some(n) = current {
        if doc.is_table_cell(n) {
            return Some(n);
        }
        current = doc.parent(n);
    }
    None
}

pub fn find_containing_table(doc: &Document, node: NodeId) -> Option<NodeId> {
    let mut current = Some(node);
    while let Some(n) = current {
        if doc.has_tag(n, &Tag::Table) {
            return Some(n);
        }
        current = doc.parent(n);
    }
    None
}

/// Map a range's endpoints to a table region. `None` when the endpoints are
/// not in (the same) table, or — unless `allow_same_cell` — when both fall
/// in one cell, which callers treat as a plain text selection.
pub fn region_from_range(
    doc: &mut Document,
    range: Range,
    allow_same_cell: bool,
) -> Option<TableRegion> {
    let start = position::closest_actual_node(doc, range.start, true);
    let end = position::closest_actual_node(doc, range.end, true);

    let start_td = find_containing_cell(doc, start);
    let end_td = find_containing_cell(doc, end);

    if (!doc.is_table_cell(start) || !doc.is_table_cell(end))
        && !allow_same_cell
        && start_td == end_td
    {
        return None;
    }
    let (start_td, end_td) = (start_td?, end_td?);

    let start_table = find_containing_table(doc, start_td)?;
    let end_table = find_containing_table(doc, end_td)?;
    if start_table != end_table {
        return None;
    }

    let structure = analyse_structure(doc, start_table);
    let start_info = *structure.cell_for_element(start_td)?;
    let end_info = *structure.cell_for_element(end_td)?;

    let top = start_info.top().min(end_info.top());
    let bottom = start_info.bottom().max(end_info.bottom());
    let left = start_info.left().min(end_info.left());
    let right = start_info.right().max(end_info.right());

    let mut region = TableRegion {
        structure,
        top,
        bottom,
        left,
        right,
    };
    adjust_region_for_spanned_cells(&mut region);
    Some(region)
}

/// Grow the rectangle until no spanning cell straddles its boundary.
fn adjust_region_for_spanned_cells(region: &mut TableRegion) {
    loop {
        let mut boundaries_ok = true;
        for row in region.top..=region.bottom {
            if let Some(cell) = region.structure.cell_at(row, region.left) {
                if region.left > cell.left() {
                    region.left = cell.left();
                    boundaries_ok = false;
                }
            }
            if let Some(cell) = region.structure.cell_at(row, region.right) {
                if region.right < cell.right() {
                    region.right = cell.right();
                    boundaries_ok = false;
                }
            }
        }
        for col in region.left..=region.right {
            if let Some(cell) = region.structure.cell_at(region.top, col) {
                if region.top > cell.top() {
                    region.top = cell.top();
                    boundaries_ok = false;
                }
            }
            if let Some(cell) = region.structure.cell_at(region.bottom, col) {
                if region.bottom < cell.bottom() {
                    region.bottom = cell.bottom();
                    boundaries_ok = false;
                }
            }
        }
        if boundaries_ok {
            break;
        }
    }
}

// ----------------------------------------------------------------------
// Column width bookkeeping
// ----------------------------------------------------------------------

static PERCENTAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(\.\d+)?)\s*%\s*$").unwrap());

fn parse_percentage(s: &str) -> Option<f64> {
    PERCENTAGE_RE
        .captures(s)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn format_percent(value: f64) -> String {
    // Two decimal places, trailing zeros trimmed.
    let rounded = (value * 100.0).round() / 100.0;
    let mut s = format!("{rounded:.2}");
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    format!("{s}%")
}

fn get_col_elements(doc: &Document, table: NodeId) -> Vec<NodeId> {
    let mut cols = Vec::new();
    for child in doc.children(table) {
        match doc.node(child).tag() {
            Some(Tag::Colgroup) => {
                for gc in doc.children(child) {
                    if doc.has_tag(gc, &Tag::Col) {
                        cols.push(gc);
                    }
                }
            }
            Some(Tag::Col) => cols.push(child),
            _ => {}
        }
    }
    cols
}

/// If there are fewer `<col>` elements than columns, add extras copying the
/// last one's width.
fn add_missing_col_elements(
    doc: &mut Document,
    structure: &TableStructure,
    cols: &mut Vec<NodeId>,
) {
    while cols.len() < structure.num_cols {
        let last = *cols.last().expect("caller checked non-empty");
        let new_col = doc.create_element(Tag::Col);
        let parent = doc.parent(last).expect("col attached");
        let next = doc.next_sibling(last);
        doc.insert_before(parent, new_col, next);
        let width = doc.node(last).attribute("width").map(|s| s.to_string());
        doc.set_attribute(new_col, "width", width.as_deref());
        cols.push(new_col);
    }
}

/// Rescale explicit percentage widths so they sum to 100 again.
fn fix_col_percentages(doc: &mut Document, cols: &[NodeId]) {
    let percentages: Vec<Option<f64>> = cols
        .iter()
        .map(|c| doc.node(*c).attribute("width").and_then(parse_percentage))
        .collect();
    if percentages.iter().any(|p| p.is_none()) {
        return;
    }
    let total: f64 = percentages.iter().map(|p| p.expect("checked")).sum();
    if total <= 0.0 {
        return;
    }
    for (col, pct) in cols.iter().zip(percentages) {
        let scaled = 100.0 * pct.expect("checked") / total;
        doc.set_attribute(*col, "width", Some(&format_percent(scaled)));
    }
}

fn add_col_element(doc: &mut Document, structure: &TableStructure, old_index: usize, right: bool) {
    let mut cols = get_col_elements(doc, structure.element);
    if cols.is_empty() {
        return; // tables without COL elements stay that way
    }
    add_missing_col_elements(doc, structure, &mut cols);

    let prev = cols[old_index];
    let new_col = doc.create_element(Tag::Col);
    let width = doc.node(prev).attribute("width").map(|s| s.to_string());
    doc.set_attribute(new_col, "width", width.as_deref());
    let parent = doc.parent(prev).expect("col attached");
    if right {
        let next = doc.next_sibling(prev);
        doc.insert_before(parent, new_col, next);
    } else {
        doc.insert_before(parent, new_col, Some(prev));
    }
    cols.insert(old_index + 1, new_col);

    fix_col_percentages(doc, &cols);
}

fn delete_col_elements(doc: &mut Document, structure: &TableStructure, left: usize, right: usize) {
    let mut cols = get_col_elements(doc, structure.element);
    if cols.is_empty() {
        return;
    }
    add_missing_col_elements(doc, structure, &mut cols);

    for col in left..=right {
        doc.delete_node(cols[col]);
    }
    cols.drain(left..=right);

    fix_col_percentages(doc, &cols);
}

/// Column widths as percentages, with missing or non-percentage values
/// filled from the average of the explicit ones, rescaled to sum to 100.
pub fn get_col_widths(doc: &Document, structure: &TableStructure) -> Vec<f64> {
    let cols = get_col_elements(doc, structure.element);
    let mut widths: Vec<Option<f64>> = (0..structure.num_cols)
        .map(|i| {
            cols.get(i)
                .and_then(|c| doc.node(*c).attribute("width"))
                .and_then(parse_percentage)
                .filter(|v| *v >= 1.0)
        })
        .collect();
    fix_widths(&mut widths)
}

fn fix_widths(widths: &mut [Option<f64>]) -> Vec<f64> {
    let mut total: f64 = widths.iter().flatten().sum();
    let valid = widths.iter().flatten().count();
    let average = if valid > 0 { total / valid as f64 } else { 1.0 };

    let mut result: Vec<f64> = Vec::with_capacity(widths.len());
    for w in widths.iter() {
        match w {
            Some(v) => result.push(*v),
            None => {
                result.push(average);
                total += average;
            }
        }
    }
    if total > 0.0 {
        for w in &mut result {
            *w = 100.0 * *w / total;
        }
    }
    result
}

/// Write explicit percentage widths for every column.
pub fn set_col_widths(doc: &mut Document, element: NodeId, widths: &[f64]) {
    let structure = analyse_structure(doc, element);
    let mut padded: Vec<Option<f64>> = widths.iter().copied().map(Some).collect();
    padded.resize(structure.num_cols, None);
    let fixed = fix_widths(&mut padded);

    let mut cols = get_col_elements(doc, element);
    if cols.is_empty() {
        return;
    }
    add_missing_col_elements(doc, &structure, &mut cols);
    for (col, width) in cols.iter().zip(fixed) {
        doc.set_attribute(*col, "width", Some(&format_percent(width)));
    }
}

/// Recompute and write widths after a structural change added columns.
pub fn fix_column_widths(doc: &mut Document, structure: &TableStructure) {
    let mut cols = get_col_elements(doc, structure.element);
    if cols.is_empty() {
        return;
    }
    add_missing_col_elements(doc, structure, &mut cols);
    let widths = get_col_widths(doc, structure);
    let cols = get_col_elements(doc, structure.element);
    for (col, width) in cols.iter().zip(widths) {
        doc.set_attribute(*col, "width", Some(&format_percent(width)));
    }
}

// ----------------------------------------------------------------------
// Row and column insertion
// ----------------------------------------------------------------------

fn cell_set_rowspan(doc: &mut Document, structure: &mut TableStructure, index: usize, span: usize) {
    let span = span.max(1);
    structure.cells[index].rowspan = span;
    let element = structure.cells[index].element;
    if span == 1 {
        doc.remove_attribute(element, "rowspan");
    } else {
        doc.set_attribute(element, "rowspan", Some(&span.to_string()));
    }
}

fn cell_set_colspan(doc: &mut Document, structure: &mut TableStructure, index: usize, span: usize) {
    let span = span.max(1);
    structure.cells[index].colspan = span;
    let element = structure.cells[index].element;
    if span == 1 {
        doc.remove_attribute(element, "colspan");
    } else {
        doc.set_attribute(element, "colspan", Some(&span.to_string()));
    }
}

/// Fill a freshly inserted `<tr>`: cells spanning across the new row grow
/// their rowspan, everything else gets a fresh empty cell of matching tag
/// and colspan.
fn populate_new_row(
    doc: &mut Document,
    structure: &mut TableStructure,
    new_tr: NodeId,
    new_row: isize,
    old_row: usize,
) {
    let mut col = 0;
    while col < structure.num_cols {
        let Some(index) = structure.cell_index(old_row, col) else {
            col += 1;
            continue;
        };
        let cell = structure.cells[index];
        let spans_new_row = (new_row > old_row as isize
            && new_row < (cell.row + cell.rowspan) as isize)
            || (new_row < old_row as isize && new_row >= cell.row as isize);
        if spans_new_row {
            cell_set_rowspan(doc, structure, index, cell.rowspan + 1);
        } else {
            let tag = doc.node(cell.element).tag().cloned().unwrap_or(Tag::Td);
            let td = create_empty_cell(doc, tag);
            doc.append_child(new_tr, td);
            if cell.colspan != 1 {
                doc.set_attribute(td, "colspan", Some(&cell.colspan.to_string()));
            }
        }
        col += cell.colspan;
    }
}

pub fn insert_row_above(doc: &mut Document, structure: &mut TableStructure, row: usize) {
    let cell = *structure.cell_at(row, 0).expect("grid is tiled");
    let old_tr = doc.parent(cell.element).expect("cell in row");
    let new_tr = doc.create_element(Tag::Tr);
    let parent = doc.parent(old_tr).expect("row in table");
    doc.insert_before(parent, new_tr, Some(old_tr));
    populate_new_row(doc, structure, new_tr, row as isize - 1, row);
}

pub fn insert_row_below(doc: &mut Document, structure: &mut TableStructure, row: usize) {
    let cell = *structure.cell_at(row, 0).expect("grid is tiled");
    let old_tr = doc.parent(cell.element).expect("cell in row");
    let new_tr = doc.create_element(Tag::Tr);
    let parent = doc.parent(old_tr).expect("row in table");
    let next = doc.next_sibling(old_tr);
    doc.insert_before(parent, new_tr, next);
    populate_new_row(doc, structure, new_tr, row as isize + 1, row);
}

fn add_column_cells(
    doc: &mut Document,
    structure: &mut TableStructure,
    old_index: usize,
    right: bool,
) {
    for row in 0..structure.num_rows {
        let Some(index) = structure.cell_index(row, old_index) else {
            continue;
        };
        let cell = structure.cells[index];
        if cell.row != row {
            continue;
        }
        let grows_span = cell.colspan > 1
            && ((right && old_index + 1 < cell.col + cell.colspan)
                || (!right && old_index >= cell.col + 1));
        if grows_span {
            cell_set_colspan(doc, structure, index, cell.colspan + 1);
        } else {
            let tag = doc.node(cell.element).tag().cloned().unwrap_or(Tag::Td);
            let new_td = create_empty_cell(doc, tag);
            let parent = doc.parent(cell.element).expect("cell in row");
            if right {
                let next = doc.next_sibling(cell.element);
                doc.insert_before(parent, new_td, next);
            } else {
                doc.insert_before(parent, new_td, Some(cell.element));
            }
            if cell.rowspan != 1 {
                doc.set_attribute(new_td, "rowspan", Some(&cell.rowspan.to_string()));
            }
        }
    }
}

fn table_at_left_of_range(doc: &mut Document, range: Range) -> Option<TableStructure> {
    if !range.is_empty() {
        return None;
    }
    let pos = position::prefer_element_position(doc, range.start);
    if doc.node(pos.node).is_element() && pos.offset > 0 {
        let child = doc.child_at(pos.node, pos.offset - 1)?;
        if doc.has_tag(child, &Tag::Table) {
            return Some(analyse_structure(doc, child));
        }
    }
    None
}

fn table_at_right_of_range(doc: &mut Document, range: Range) -> Option<TableStructure> {
    if !range.is_empty() {
        return None;
    }
    let pos = position::prefer_element_position(doc, range.start);
    if doc.node(pos.node).is_element() {
        let child = doc.child_at(pos.node, pos.offset)?;
        if doc.has_tag(child, &Tag::Table) {
            return Some(analyse_structure(doc, child));
        }
    }
    None
}

/// Insert a row below the current table selection (or adjacent to a table
/// the cursor touches).
pub fn add_adjacent_row(doc: &mut Document) {
    doc.undo_new_group("Insert row below");
    doc.preserve_selection_while(|doc| {
        let Some(range) = doc.selection() else {
            return;
        };
        match region_from_range(doc, range, true) {
            Some(mut region) => {
                let bottom = region.bottom;
                insert_row_below(doc, &mut region.structure, bottom);
            }
            None => {
                if let Some(mut table) = table_at_left_of_range(doc, range) {
                    let last = table.num_rows - 1;
                    insert_row_below(doc, &mut table, last);
                } else if let Some(mut table) = table_at_right_of_range(doc, range) {
                    insert_row_above(doc, &mut table, 0);
                }
            }
        }
    });
}

/// Insert a column to the right of the current table selection.
pub fn add_adjacent_column(doc: &mut Document) {
    doc.undo_new_group("Insert column at right");
    doc.preserve_selection_while(|doc| {
        let Some(range) = doc.selection() else {
            return;
        };
        match region_from_range(doc, range, true) {
            Some(mut region) => {
                let right = region.right;
                add_col_element(doc, &region.structure, right, true);
                add_column_cells(doc, &mut region.structure, right, true);
            }
            None => {
                if let Some(mut table) = table_at_left_of_range(doc, range) {
                    let right = table.num_cols - 1;
                    add_col_element(doc, &table, right, true);
                    add_column_cells(doc, &mut table, right, true);
                } else if let Some(mut table) = table_at_right_of_range(doc, range) {
                    add_col_element(doc, &table, 0, false);
                    add_column_cells(doc, &mut table, 0, false);
                }
            }
        }
    });
}

// ----------------------------------------------------------------------
// Deletion
// ----------------------------------------------------------------------

fn column_has_content(doc: &Document, table: &TableStructure, col: usize) -> bool {
    for row in 0..table.num_rows {
        if let Some(cell) = table.cell_at(row, col) {
            if cell.col == col && doc.node_has_content(cell.element) {
                return true;
            }
        }
    }
    false
}

fn row_has_content(doc: &Document, table: &TableStructure, row: usize) -> bool {
    for col in 0..table.num_cols {
        if let Some(cell) = table.cell_at(row, col) {
            if cell.row == row && doc.node_has_content(cell.element) {
                return true;
            }
        }
    }
    false
}

fn clamp_row(table: &TableStructure, row: usize) -> usize {
    row.min(table.num_rows.saturating_sub(1))
}

fn clamp_col(table: &TableStructure, col: usize) -> usize {
    col.min(table.num_cols.saturating_sub(1))
}

fn select_region(
    doc: &mut Document,
    table: &TableStructure,
    top: usize,
    bottom: usize,
    left: usize,
    right: usize,
) {
    let top = clamp_row(table, top);
    let bottom = clamp_row(table, bottom);
    let left = clamp_col(table, left);
    let right = clamp_col(table, right);

    let (Some(tl), Some(br)) = (table.cell_at(top, left), table.cell_at(bottom, right)) else {
        return;
    };
    let tl_pos = position::closest_match_forwards(doc, Position::new(tl.element, 0), |d, p| {
        position::ok_for_movement(d, p, false)
    });
    let br_element = br.element;
    let br_pos = position::closest_match_backwards(
        doc,
        Position::new(br_element, doc.child_count(br_element)),
        |d, p| position::ok_for_movement(d, p, false),
    );
    doc.set_selection(Range::new(tl_pos, br_pos));
}

fn delete_rows(doc: &mut Document, structure: &TableStructure, top: usize, bottom: usize) {
    let mut trs = Vec::new();
    get_trs(doc, structure.element, &mut trs);
    for row in top..=bottom.min(trs.len().saturating_sub(1)) {
        doc.delete_node(trs[row]);
    }
}

fn delete_columns(doc: &mut Document, structure: &TableStructure, left: usize, right: usize) {
    let mut to_delete: HashSet<NodeId> = HashSet::new();
    for row in 0..structure.num_rows {
        for col in left..=right {
            if let Some(cell) = structure.cell_at(row, col) {
                to_delete.insert(cell.element);
            }
        }
    }
    let mut ordered: Vec<NodeId> = to_delete.into_iter().collect();
    ordered.sort();
    for element in ordered {
        doc.delete_node(element);
    }
    delete_col_elements(doc, structure, left, right);
}

fn delete_cell_contents(doc: &mut Document, region: &TableRegion) {
    for row in region.top..=region.bottom {
        for col in region.left..=region.right {
            if let Some(cell) = region.structure.cell_at(row, col) {
                let element = cell.element;
                doc.delete_all_children(element);
            }
        }
    }
}

/// Delete a region: whole rows if it spans the full width, whole columns if
/// the full height, the entire table if both, and only cell contents if
/// neither.
pub fn delete_region(doc: &mut Document, region: &TableRegion) {
    let covers_width = region.left == 0 && region.right == region.structure.num_cols - 1;
    let covers_height = region.top == 0 && region.bottom == region.structure.num_rows - 1;

    if covers_width && covers_height {
        doc.delete_node(region.structure.element);
    } else if covers_width {
        delete_rows(doc, &region.structure, region.top, region.bottom);
    } else if covers_height {
        delete_columns(doc, &region.structure, region.left, region.right);
    } else {
        delete_cell_contents(doc, region);
    }
}

/// Remove a row near the current selection, preferring an empty neighbour
/// row over destroying selected content.
pub fn remove_adjacent_row(doc: &mut Document) {
    let Some(range) = doc.selection() else {
        return;
    };
    let Some(region) = region_from_range(doc, range, true) else {
        remove_row_adjacent_to_range(doc, range);
        return;
    };
    if region.structure.num_rows <= 1 {
        return;
    }

    doc.undo_new_group("Delete one row");
    let TableRegion {
        structure: table,
        top,
        bottom,
        left,
        right,
    } = region;

    if bottom + 1 < table.num_rows && !row_has_content(doc, &table, bottom + 1) {
        doc.preserve_selection_while(|doc| {
            let region = full_width_region(table.clone(), bottom + 1, bottom + 1);
            delete_region(doc, &region);
        });
    } else if top >= 1 && !row_has_content(doc, &table, top - 1) {
        doc.preserve_selection_while(|doc| {
            let region = full_width_region(table.clone(), top - 1, top - 1);
            delete_region(doc, &region);
        });
    } else {
        doc.preserve_selection_while(|doc| {
            let region = full_width_region(table.clone(), bottom, bottom);
            delete_region(doc, &region);
        });
        let element = table.element;
        let table = analyse_structure(doc, element);
        if top != bottom {
            select_region(doc, &table, top, bottom - 1, left, right);
        } else {
            let new_row = clamp_row(&table, bottom);
            if let Some(cell) = table.cell_at(new_row, left) {
                let pos = position::closest_match_forwards(
                    doc,
                    Position::new(cell.element, 0),
                    |d, p| position::ok_for_movement(d, p, false),
                );
                doc.set_cursor(pos);
            }
        }
    }
}

fn full_width_region(table: TableStructure, top: usize, bottom: usize) -> TableRegion {
    let num_cols = table.num_cols;
    TableRegion {
        structure: table,
        top,
        bottom,
        left: 0,
        right: num_cols - 1,
    }
}

fn full_height_region(table: TableStructure, left: usize, right: usize) -> TableRegion {
    let num_rows = table.num_rows;
    TableRegion {
        structure: table,
        top: 0,
        bottom: num_rows - 1,
        left,
        right,
    }
}

fn remove_row_adjacent_to_range(doc: &mut Document, range: Range) {
    if let Some(table) = table_at_left_of_range(doc, range) {
        if table.num_rows >= 2 {
            doc.undo_new_group("Delete one row");
            let last = table.num_rows - 1;
            let region = full_width_region(table, last, last);
            delete_region(doc, &region);
            return;
        }
    }
    if let Some(table) = table_at_right_of_range(doc, range) {
        if table.num_rows >= 2 {
            doc.undo_new_group("Delete one row");
            let region = full_width_region(table, 0, 0);
            delete_region(doc, &region);
        }
    }
}

/// Remove a column near the current selection, preferring an empty
/// neighbour column.
pub fn remove_adjacent_column(doc: &mut Document) {
    let Some(range) = doc.selection() else {
        return;
    };
    let Some(region) = region_from_range(doc, range, true) else {
        remove_column_adjacent_to_range(doc, range);
        return;
    };
    if region.structure.num_cols <= 1 {
        return;
    }

    doc.undo_new_group("Delete one column");
    let TableRegion {
        structure: table,
        top,
        bottom,
        left,
        right,
    } = region;

    if right + 1 < table.num_cols && !column_has_content(doc, &table, right + 1) {
        doc.preserve_selection_while(|doc| {
            let region = full_height_region(table.clone(), right + 1, right + 1);
            delete_region(doc, &region);
        });
    } else if left >= 1 && !column_has_content(doc, &table, left - 1) {
        doc.preserve_selection_while(|doc| {
            let region = full_height_region(table.clone(), left - 1, left - 1);
            delete_region(doc, &region);
        });
    } else {
        doc.preserve_selection_while(|doc| {
            let region = full_height_region(table.clone(), right, right);
            delete_region(doc, &region);
        });
        let element = table.element;
        let table = analyse_structure(doc, element);
        if left != right {
            select_region(doc, &table, top, bottom, left, right - 1);
        } else {
            let new_col = clamp_col(&table, right);
            if let Some(cell) = table.cell_at(top, new_col) {
                let pos = position::closest_match_forwards(
                    doc,
                    Position::new(cell.element, 0),
                    |d, p| position::ok_for_movement(d, p, false),
                );
                doc.set_cursor(pos);
            }
        }
    }
}

fn remove_column_adjacent_to_range(doc: &mut Document, range: Range) {
    if let Some(table) = table_at_left_of_range(doc, range) {
        if table.num_cols >= 2 {
            doc.undo_new_group("Delete one column");
            let last = table.num_cols - 1;
            let region = full_height_region(table, last, last);
            delete_region(doc, &region);
            return;
        }
    }
    if let Some(table) = table_at_right_of_range(doc, range) {
        if table.num_cols >= 2 {
            doc.undo_new_group("Delete one column");
            let region = full_height_region(table, 0, 0);
            delete_region(doc, &region);
        }
    }
}

// ----------------------------------------------------------------------
// Merging and splitting
// ----------------------------------------------------------------------

/// Merge the selected cells into the region's top-left cell, concatenating
/// their contents in reading order. Declines (returning `false`) when a
/// spanning cell straddles the region boundary.
pub fn merge_cells(doc: &mut Document) -> bool {
    let Some(range) = doc.selection() else {
        return false;
    };
    let mut merged = false;
    doc.preserve_selection_while(|doc| {
        let Some(region) = region_from_range(doc, range, false) else {
            return;
        };
        merged = merge_region(doc, &region);
    });
    merged
}

pub fn merge_region(doc: &mut Document, region: &TableRegion) -> bool {
    let structure = &region.structure;

    for row in region.top..=region.bottom {
        for col in region.left..=region.right {
            let Some(cell) = structure.cell_at(row, col) else {
                continue;
            };
            if cell.top() < region.top
                || cell.bottom() > region.bottom
                || cell.left() < region.left
                || cell.right() > region.right
            {
                warn!(
                    row,
                    col, "cannot merge cells: cell extends outside the selection"
                );
                return false;
            }
        }
    }

    let merged_cell = *structure
        .cell_at(region.top, region.left)
        .expect("grid is tiled");

    for row in region.top..=region.bottom {
        for col in region.left..=region.right {
            let Some(cell) = structure.cell_at(row, col).copied() else {
                continue;
            };
            // Parent is gone once a multi-slot cell has been processed.
            if cell.element != merged_cell.element && doc.parent(cell.element).is_some() {
                while let Some(child) = doc.first_child(cell.element) {
                    doc.append_child(merged_cell.element, child);
                }
                doc.delete_node(cell.element);
            }
        }
    }

    let total_rows = region.bottom - region.top + 1;
    let total_cols = region.right - region.left + 1;
    if total_rows == 1 {
        doc.remove_attribute(merged_cell.element, "rowspan");
    } else {
        doc.set_attribute(merged_cell.element, "rowspan", Some(&total_rows.to_string()));
    }
    if total_cols == 1 {
        doc.remove_attribute(merged_cell.element, "colspan");
    } else {
        doc.set_attribute(merged_cell.element, "colspan", Some(&total_cols.to_string()));
    }
    true
}

/// Split every spanning cell in the current selection back into unit cells.
pub fn split_selection(doc: &mut Document) {
    doc.preserve_selection_while(|doc| {
        let Some(range) = doc.selection() else {
            return;
        };
        if let Some(mut region) = region_from_range(doc, range, true) {
            split_cells(doc, &mut region);
        }
    });
}

/// Replace every spanning cell in the region with one empty unit cell per
/// covered slot (the original keeps the anchor slot). Several other
/// operations require all touched cells to be 1x1 and call this first.
pub fn split_cells(doc: &mut Document, region: &mut TableRegion) {
    let mut trs = Vec::new();
    get_trs(doc, region.structure.element, &mut trs);

    for row in region.top..=region.bottom {
        for col in region.left..=region.right {
            let Some(index) = region.structure.cell_index(row, col) else {
                continue;
            };
            let cell = region.structure.cells[index];
            if cell.rowspan > 1 || cell.colspan > 1 {
                let original = cell.element;
                for r in cell.top()..=cell.bottom() {
                    for c in cell.left()..=cell.right() {
                        if r == cell.top() && c == cell.left() {
                            continue;
                        }
                        let tag = doc.node(original).tag().cloned().unwrap_or(Tag::Td);
                        let new_td = create_empty_cell(doc, tag);

                        let mut next_element = None;
                        let mut next_col = cell.right() + 1;
                        while next_col < region.structure.num_cols {
                            if let Some(next_cell) = region.structure.cell_at(r, next_col) {
                                if next_cell.row == r {
                                    next_element = Some(next_cell.element);
                                    break;
                                }
                            }
                            next_col += 1;
                        }

                        doc.insert_before(trs[r], new_td, next_element);
                        let new_index = region.structure.add_cell(Cell {
                            element: new_td,
                            row: r,
                            col: c,
                            rowspan: 1,
                            colspan: 1,
                        });
                        region.structure.set(r, c, new_index);
                    }
                }
                doc.remove_attribute(original, "rowspan");
                doc.remove_attribute(original, "colspan");
                region.structure.cells[index].rowspan = 1;
                region.structure.cells[index].colspan = 1;
            }
        }
    }
}

// ----------------------------------------------------------------------
// Creation, cloning, pasting support
// ----------------------------------------------------------------------

/// Build and insert a fresh table at the cursor: optional caption, equal
/// percentage `<col>` widths, and `<td><p><br></p></td>` cells so every
/// cell has height. The cursor lands in the first cell.
pub fn insert_table(
    doc: &mut Document,
    rows: usize,
    cols: usize,
    width: Option<&str>,
    caption: Option<&str>,
    class_name: Option<&str>,
) {
    doc.undo_new_group("Insert table");
    debug!(rows, cols, "inserting table");

    let rows = rows.max(1);
    let cols = cols.max(1);

    let table = doc.create_element(Tag::Table);
    if let Some(width) = width {
        let props = [("width".to_string(), Some(width.to_string()))]
            .into_iter()
            .collect();
        doc.set_style_properties(table, &props);
    }
    if let Some(class_name) = class_name {
        doc.set_attribute(table, "class", Some(class_name));
    }

    // Caption comes first in document order.
    if let Some(caption) = caption.filter(|c| !c.is_empty()) {
        let caption_el = doc.create_element(Tag::Caption);
        let text = doc.create_text(caption);
        doc.append_child(caption_el, text);
        doc.append_child(table, caption_el);
    }

    let col_width = format!("{}%", (100.0 / cols as f64).round());
    for _ in 0..cols {
        let col = doc.create_element(Tag::Col);
        doc.set_attribute(col, "width", Some(&col_width));
        doc.append_child(table, col);
    }

    let mut first_td = None;
    let tbody = doc.create_element(Tag::Tbody);
    doc.append_child(table, tbody);
    for _ in 0..rows {
        let tr = doc.create_element(Tag::Tr);
        doc.append_child(tbody, tr);
        for _ in 0..cols {
            let td = create_empty_cell(doc, Tag::Td);
            doc.append_child(tr, td);
            if first_td.is_none() {
                first_td = Some(td);
            }
        }
    }

    clipboard::paste_nodes(doc, vec![table]);

    let first_td = first_td.expect("at least one cell");
    let pos = position::closest_match_forwards(doc, Position::new(first_td, 0), |d, p| {
        position::ok_for_movement(d, p, false)
    });
    doc.set_cursor(pos);
}

/// Deep-copy a region into a standalone table fragment (for copy/paste).
pub fn clone_region(doc: &mut Document, region: &TableRegion) -> NodeId {
    let mut done: HashSet<NodeId> = HashSet::new();
    let table = doc.shallow_copy_element(region.structure.element);
    for row in region.top..=region.bottom {
        let tr = doc.create_element(Tag::Tr);
        doc.append_child(table, tr);
        for col in region.left..=region.right {
            if let Some(cell) = region.structure.cell_at(row, col) {
                let element = cell.element;
                if done.insert(element) {
                    let copy = doc.clone_subtree(element, true, false);
                    doc.append_child(tr, copy);
                }
            }
        }
    }
    table
}

/// Paste a source table's cells over a destination region: grow the
/// destination to fit, force-split the footprint, then move (not clone) the
/// source cells slot by slot.
pub fn paste_table(doc: &mut Document, src_table: NodeId, dest: &mut TableRegion) {
    let src = analyse_structure(doc, src_table);

    // The paste footprint is the size of the source table, anchored at the
    // destination's top-left; the rest of the selection is ignored.
    dest.bottom = dest.top + src.num_rows - 1;
    dest.right = dest.left + src.num_cols - 1;

    // Grow the destination table so every target slot exists.
    if dest.structure.num_rows < dest.bottom + 1 {
        dest.structure.num_rows = dest.bottom + 1;
    }
    if dest.structure.num_cols < dest.right + 1 {
        dest.structure.num_cols = dest.right + 1;
    }
    dest.structure = fix(doc, dest.structure.clone());

    // Split any merged destination cells in the footprint, then re-analyse
    // to get an accurate grid.
    split_cells(doc, dest);
    dest.structure = analyse_structure(doc, dest.structure.element);

    doc.preserve_selection_while(|doc| {
        replace_cells(doc, &src, dest);
    });

    fix_column_widths(doc, &dest.structure);

    doc.ensure_unique_ids();

    // Cursor to the bottom-right pasted cell.
    if let Some(cell) = dest.structure.cell_at(dest.bottom, dest.right) {
        let element = cell.element;
        let offset = doc.child_count(element);
        doc.set_selection(Range::collapsed(Position::new(element, offset)));
    }
}

fn replace_cells(doc: &mut Document, src: &TableStructure, dest: &mut TableRegion) {
    // All destination cells in the footprint are 1x1 after splitting.
    for src_row in 0..src.num_rows {
        for src_col in 0..src.num_cols {
            let Some(src_cell) = src.cell_at(src_row, src_col).copied() else {
                continue;
            };
            // Skip non-anchor slots of spanning source cells.
            if src_row != src_cell.row || src_col != src_cell.col {
                continue;
            }
            let dest_row = dest.top + src_row;
            let dest_col = dest.left + src_col;
            let Some(dest_cell) = dest.structure.cell_at(dest_row, dest_col).copied() else {
                continue;
            };
            assert_eq!(dest_cell.rowspan, 1, "destination cell not split");
            assert_eq!(dest_cell.colspan, 1, "destination cell not split");

            let parent = doc.parent(dest_cell.element).expect("cell in row");
            doc.insert_before(parent, src_cell.element, Some(dest_cell.element));

            let index = dest.structure.add_cell(Cell {
                element: src_cell.element,
                row: dest_row,
                col: dest_col,
                rowspan: src_cell.rowspan,
                colspan: src_cell.colspan,
            });
            let bottom = dest_row + src_cell.rowspan - 1;
            let right = dest_col + src_cell.colspan - 1;
            dest.structure
                .set_region(doc, dest_row, dest_col, bottom, right, index);
        }
    }
}

/// Table width/shape summary for host property dialogs.
pub fn get_properties(doc: &mut Document, element: NodeId) -> Option<(Option<String>, usize, usize)> {
    if !doc.has_tag(element, &Tag::Table) {
        return None;
    }
    let structure = analyse_structure(doc, element);
    let width = doc
        .node(element)
        .style_property("width")
        .map(|s| s.to_string());
    Some((width, structure.num_rows, structure.num_cols))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::{parse_document, serialize_subtree};
    use pretty_assertions::assert_eq;

    fn simple_table(rows: usize, cols: usize) -> String {
        let mut html = String::from("<table><tbody>");
        for r in 0..rows {
            html.push_str("<tr>");
            for c in 0..cols {
                html.push_str(&format!("<td>r{r}c{c}</td>"));
            }
            html.push_str("</tr>");
        }
        html.push_str("</tbody></table>");
        html
    }

    fn assert_grid_tiles(structure: &TableStructure) {
        for row in 0..structure.num_rows {
            for col in 0..structure.num_cols {
                let cell = structure
                    .cell_at(row, col)
                    .unwrap_or_else(|| panic!("gap at ({row},{col})"));
                assert!(
                    row >= cell.top()
                        && row <= cell.bottom()
                        && col >= cell.left()
                        && col <= cell.right(),
                    "cell at ({row},{col}) does not cover its slot"
                );
            }
        }
        // Every cell covers exactly its span rectangle.
        for (i, cell) in structure.cells.iter().enumerate() {
            if !structure.by_element.contains_key(&cell.element) {
                continue;
            }
            for row in cell.top()..=cell.bottom() {
                for col in cell.left()..=cell.right() {
                    assert_eq!(
                        structure.cell_index(row, col),
                        Some(i),
                        "slot ({row},{col}) not owned by its spanning cell"
                    );
                }
            }
        }
    }

    #[test]
    fn test_analyse_simple_grid() {
        let mut doc = parse_document(&simple_table(2, 3)).unwrap();
        let table = doc.find_first(&Tag::Table).unwrap();
        let structure = analyse_structure(&mut doc, table);
        assert_eq!(structure.num_rows, 2);
        assert_eq!(structure.num_cols, 3);
        assert_grid_tiles(&structure);
    }

    #[test]
    fn test_analyse_with_spans() {
        let mut doc = parse_document(
            "<table><tbody>\
             <tr><td rowspan=\"2\">a</td><td>b</td><td>c</td></tr>\
             <tr><td colspan=\"2\">d</td></tr>\
             </tbody></table>",
        )
        .unwrap();
        let table = doc.find_first(&Tag::Table).unwrap();
        let structure = analyse_structure(&mut doc, table);
        assert_eq!(structure.num_rows, 2);
        assert_eq!(structure.num_cols, 3);
        assert_grid_tiles(&structure);
        let a = structure.cell_at(0, 0).unwrap();
        assert_eq!((a.rowspan, a.colspan), (2, 1));
        assert_eq!(structure.cell_at(1, 0).unwrap().element, a.element);
        let d = structure.cell_at(1, 1).unwrap();
        assert_eq!(d.colspan, 2);
    }

    #[test]
    fn test_fixup_synthesizes_missing_cells() {
        // Second row is one cell short.
        let mut doc = parse_document(
            "<table><tbody><tr><td>a</td><td>b</td></tr><tr><td>c</td></tr></tbody></table>",
        )
        .unwrap();
        let table = doc.find_first(&Tag::Table).unwrap();
        let structure = analyse_structure(&mut doc, table);
        assert_eq!(structure.num_rows, 2);
        assert_eq!(structure.num_cols, 2);
        assert_grid_tiles(&structure);
    }

    #[test]
    fn test_region_from_range_spanning_cells() {
        let mut doc = parse_document(&simple_table(2, 2)).unwrap();
        let start = doc.find_text("r0c0").unwrap();
        let end = doc.find_text("r1c1").unwrap();
        let range = Range::new(Position::new(start, 0), Position::new(end, 0));
        let region = region_from_range(&mut doc, range, false).unwrap();
        assert_eq!(
            (region.top, region.bottom, region.left, region.right),
            (0, 1, 0, 1)
        );
    }

    #[test]
    fn test_region_same_cell_requires_flag() {
        let mut doc = parse_document(&simple_table(2, 2)).unwrap();
        let text = doc.find_text("r0c0").unwrap();
        let range = Range::new(Position::new(text, 0), Position::new(text, 2));
        assert!(region_from_range(&mut doc, range, false).is_none());
        let region = region_from_range(&mut doc, range, true).unwrap();
        assert_eq!((region.top, region.bottom), (0, 0));
    }

    #[test]
    fn test_region_expands_over_straddling_span() {
        // Selecting b..c pulls in the rowspan cell's full extent.
        let mut doc = parse_document(
            "<table><tbody>\
             <tr><td rowspan=\"2\">a</td><td>b</td></tr>\
             <tr><td>c</td></tr>\
             </tbody></table>",
        )
        .unwrap();
        let b = doc.find_text("b").unwrap();
        let c = doc.find_text("c").unwrap();
        let range = Range::new(Position::new(b, 0), Position::new(c, 0));
        let region = region_from_range(&mut doc, range, false).unwrap();
        assert_eq!(
            (region.top, region.bottom, region.left, region.right),
            (0, 1, 0, 1)
        );
    }

    #[test]
    fn test_merge_cells_2x2() {
        let mut doc = parse_document(&simple_table(2, 2)).unwrap();
        let start = doc.find_text("r0c0").unwrap();
        let end = doc.find_text("r1c1").unwrap();
        doc.set_selection(Range::new(Position::new(start, 0), Position::new(end, 4)));

        assert!(merge_cells(&mut doc));

        let table = doc.find_first(&Tag::Table).unwrap();
        let structure = analyse_structure(&mut doc, table);
        assert_eq!(structure.num_rows, 2);
        assert_eq!(structure.num_cols, 2);
        let merged = structure.cell_at(0, 0).unwrap();
        assert_eq!((merged.rowspan, merged.colspan), (2, 2));
        // All four slots map to the one cell, contents concatenated in
        // reading order.
        for (r, c) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            assert_eq!(structure.cell_at(r, c).unwrap().element, merged.element);
        }
        assert_eq!(doc.node_text(merged.element), "r0c0r0c1r1c0r1c1");
        assert_grid_tiles(&structure);
    }

    #[test]
    fn test_merge_declines_straddling_cell() {
        let mut doc = parse_document(
            "<table><tbody>\
             <tr><td>a</td><td rowspan=\"2\">b</td><td>x</td></tr>\
             <tr><td>c</td><td>y</td></tr>\
             </tbody></table>",
        )
        .unwrap();
        // Select only the first row: the rowspan cell sticks out below.
        let table = doc.find_first(&Tag::Table).unwrap();
        let structure = analyse_structure(&mut doc, table);
        let region = TableRegion {
            structure,
            top: 0,
            bottom: 0,
            left: 0,
            right: 2,
        };
        let before = serialize_subtree(&doc, doc.body());
        assert!(!merge_region(&mut doc, &region));
        assert_eq!(serialize_subtree(&doc, doc.body()), before);
    }

    #[test]
    fn test_split_cells_restores_unit_grid() {
        let mut doc = parse_document(
            "<table><tbody>\
             <tr><td rowspan=\"2\" colspan=\"2\">big</td><td>x</td></tr>\
             <tr><td>y</td></tr>\
             </tbody></table>",
        )
        .unwrap();
        let table = doc.find_first(&Tag::Table).unwrap();
        let structure = analyse_structure(&mut doc, table);
        let mut region = TableRegion {
            structure,
            top: 0,
            bottom: 1,
            left: 0,
            right: 2,
        };
        split_cells(&mut doc, &mut region);

        let structure = analyse_structure(&mut doc, table);
        assert_eq!(structure.num_rows, 2);
        assert_eq!(structure.num_cols, 3);
        assert_grid_tiles(&structure);
        for row in 0..2 {
            for col in 0..3 {
                let cell = structure.cell_at(row, col).unwrap();
                assert_eq!((cell.rowspan, cell.colspan), (1, 1));
            }
        }
        // The anchor slot kept the original content.
        assert_eq!(doc.node_text(structure.cell_at(0, 0).unwrap().element), "big");
    }

    #[test]
    fn test_insert_row_below_with_span_growth() {
        let mut doc = parse_document(
            "<table><tbody>\
             <tr><td rowspan=\"2\">a</td><td>b</td></tr>\
             <tr><td>c</td></tr>\
             </tbody></table>",
        )
        .unwrap();
        let table = doc.find_first(&Tag::Table).unwrap();
        let mut structure = analyse_structure(&mut doc, table);
        // Insert below row 0: the rowspan cell covers the new row too.
        insert_row_below(&mut doc, &mut structure, 0);

        let structure = analyse_structure(&mut doc, table);
        assert_eq!(structure.num_rows, 3);
        assert_grid_tiles(&structure);
        let a = structure.cell_at(0, 0).unwrap();
        assert_eq!(a.rowspan, 3);
    }

    #[test]
    fn test_add_adjacent_column_redistributes_widths() {
        let mut doc = parse_document(
            "<table><col width=\"50%\"><col width=\"50%\"><tbody>\
             <tr><td>left</td><td><p>right</p></td></tr>\
             </tbody></table>",
        )
        .unwrap();
        let right_text = doc.find_text("right").unwrap();
        doc.set_cursor(Position::new(right_text, 0));

        add_adjacent_column(&mut doc);

        let table = doc.find_first(&Tag::Table).unwrap();
        let structure = analyse_structure(&mut doc, table);
        assert_eq!(structure.num_cols, 3);
        let widths = get_col_widths(&doc, &structure);
        assert_eq!(widths.len(), 3);
        let total: f64 = widths.iter().sum();
        assert!((total - 100.0).abs() <= 0.02, "widths sum to {total}");
        for w in widths {
            assert!((w - 33.33).abs() < 0.1, "unexpected width {w}");
        }
        // The new cell is empty.
        let new_cell = structure.cell_at(0, 2).unwrap();
        assert!(!doc.node_has_content(new_cell.element));
    }

    #[test]
    fn test_delete_region_full_width_removes_rows() {
        let mut doc = parse_document(&simple_table(3, 2)).unwrap();
        let table = doc.find_first(&Tag::Table).unwrap();
        let structure = analyse_structure(&mut doc, table);
        let region = TableRegion {
            structure,
            top: 1,
            bottom: 1,
            left: 0,
            right: 1,
        };
        delete_region(&mut doc, &region);
        let structure = analyse_structure(&mut doc, table);
        assert_eq!(structure.num_rows, 2);
        assert!(doc.find_text("r1c0").is_none());
    }

    #[test]
    fn test_delete_region_full_height_removes_columns_and_rescales() {
        let mut doc = parse_document(
            "<table><col width=\"20%\"><col width=\"30%\"><col width=\"50%\"><tbody>\
             <tr><td>a</td><td>b</td><td>c</td></tr>\
             </tbody></table>",
        )
        .unwrap();
        let table = doc.find_first(&Tag::Table).unwrap();
        let structure = analyse_structure(&mut doc, table);
        let region = TableRegion {
            structure,
            top: 0,
            bottom: 0,
            left: 1,
            right: 1,
        };
        delete_region(&mut doc, &region);

        let structure = analyse_structure(&mut doc, table);
        assert_eq!(structure.num_cols, 2);
        let widths = get_col_widths(&doc, &structure);
        let total: f64 = widths.iter().sum();
        assert!((total - 100.0).abs() < 0.01);
        assert!((widths[0] - 28.57).abs() < 0.05, "got {}", widths[0]);
        assert!((widths[1] - 71.43).abs() < 0.05, "got {}", widths[1]);
    }

    #[test]
    fn test_delete_region_partial_clears_contents() {
        let mut doc = parse_document(&simple_table(2, 3)).unwrap();
        let table = doc.find_first(&Tag::Table).unwrap();
        let structure = analyse_structure(&mut doc, table);
        let region = TableRegion {
            structure,
            top: 0,
            bottom: 0,
            left: 0,
            right: 1,
        };
        delete_region(&mut doc, &region);
        let structure = analyse_structure(&mut doc, table);
        // Still a 2x3 table; only the contents of two cells are gone.
        assert_eq!((structure.num_rows, structure.num_cols), (2, 3));
        assert!(doc.find_text("r0c0").is_none());
        assert!(doc.find_text("r0c1").is_none());
        assert!(doc.find_text("r0c2").is_some());
    }

    #[test]
    fn test_delete_region_whole_table() {
        let mut doc = parse_document(&simple_table(2, 2)).unwrap();
        let table = doc.find_first(&Tag::Table).unwrap();
        let structure = analyse_structure(&mut doc, table);
        let region = TableRegion {
            structure,
            top: 0,
            bottom: 1,
            left: 0,
            right: 1,
        };
        delete_region(&mut doc, &region);
        assert!(!doc.in_tree(table));
    }

    #[test]
    fn test_remove_adjacent_row_prefers_empty_neighbour() {
        let mut doc = parse_document(
            "<table><tbody>\
             <tr><td>keep</td></tr>\
             <tr><td><p><br></p></td></tr>\
             </tbody></table>",
        )
        .unwrap();
        let keep = doc.find_text("keep").unwrap();
        doc.set_cursor(Position::new(keep, 0));

        remove_adjacent_row(&mut doc);

        let table = doc.find_first(&Tag::Table).unwrap();
        let structure = analyse_structure(&mut doc, table);
        assert_eq!(structure.num_rows, 1);
        assert!(doc.find_text("keep").is_some());
    }

    #[test]
    fn test_insert_table_builds_equal_columns() {
        let mut doc = parse_document("<p>before</p>").unwrap();
        let text = doc.find_text("before").unwrap();
        doc.set_cursor(Position::new(text, 6));

        insert_table(&mut doc, 1, 2, Some("100%"), None, None);

        let table = doc.find_first(&Tag::Table).unwrap();
        let structure = analyse_structure(&mut doc, table);
        assert_eq!((structure.num_rows, structure.num_cols), (1, 2));
        let widths = get_col_widths(&doc, &structure);
        assert!((widths[0] - 50.0).abs() < 0.01);
        // Cursor landed inside the new table.
        let sel = doc.selection().unwrap();
        assert!(find_containing_table(&doc, sel.start.node).is_some());
    }

    #[test]
    fn test_adjacent_column_after_insert_table() {
        let mut doc = parse_document("<p>x</p>").unwrap();
        let text = doc.find_text("x").unwrap();
        doc.set_cursor(Position::new(text, 1));
        insert_table(&mut doc, 1, 2, None, None, None);

        // Cursor sits in the first cell; move it to the rightmost cell.
        let table = doc.find_first(&Tag::Table).unwrap();
        let structure = analyse_structure(&mut doc, table);
        let last = structure.cell_at(0, 1).unwrap().element;
        let pos = position::closest_match_forwards(
            &doc,
            Position::new(last, 0),
            |d, p| position::ok_for_movement(d, p, false),
        );
        doc.set_cursor(pos);

        add_adjacent_column(&mut doc);

        let structure = analyse_structure(&mut doc, table);
        assert_eq!(structure.num_cols, 3);
        let widths = get_col_widths(&doc, &structure);
        let total: f64 = widths.iter().sum();
        assert!((total - 100.0).abs() <= 0.02);
        for w in &widths {
            assert!((w - 33.33).abs() < 0.01, "width {w}");
        }
        let new_cell = structure.cell_at(0, 2).unwrap();
        assert!(!doc.node_has_content(new_cell.element));
    }

    #[test]
    fn test_paste_table_moves_cells() {
        let mut doc = parse_document(&simple_table(2, 2)).unwrap();
        // Build a source table fragment in the same arena.
        let src = crate::html::parse_fragment(
            &mut doc,
            "<table><tbody><tr><td>new1</td><td>new2</td></tr></tbody></table>",
        )
        .unwrap()[0];

        let dest_table = doc.find_first(&Tag::Table).unwrap();
        let structure = analyse_structure(&mut doc, dest_table);
        let mut dest = TableRegion {
            structure,
            top: 0,
            bottom: 0,
            left: 0,
            right: 0,
        };
        paste_table(&mut doc, src, &mut dest);

        let structure = analyse_structure(&mut doc, dest_table);
        assert_grid_tiles(&structure);
        assert_eq!(doc.node_text(structure.cell_at(0, 0).unwrap().element), "new1");
        assert_eq!(doc.node_text(structure.cell_at(0, 1).unwrap().element), "new2");
        // Second row untouched.
        assert_eq!(doc.node_text(structure.cell_at(1, 0).unwrap().element), "r1c0");
    }

    #[test]
    fn test_clone_region_copies_cells() {
        let mut doc = parse_document(&simple_table(2, 2)).unwrap();
        let table = doc.find_first(&Tag::Table).unwrap();
        let structure = analyse_structure(&mut doc, table);
        let region = TableRegion {
            structure,
            top: 0,
            bottom: 0,
            left: 0,
            right: 1,
        };
        let copy = clone_region(&mut doc, &region);
        assert_eq!(doc.node_text(copy), "r0c0r0c1");
        // The copy is a fresh subtree, not the original cells.
        assert!(doc.find_text("r0c0").is_some());
        assert!(doc.parent(copy).is_none());
    }
}
