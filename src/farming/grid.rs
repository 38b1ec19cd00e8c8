//! Soil cell tags and the rectangular cell grid.

use bevy::prelude::*;
use serde_json::Value;

/// Set of state tags carried by one soil cell, packed into a byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CellTags(u8);

impl CellTags {
    pub const FARMABLE: CellTags = CellTags(1 << 0);
    pub const TILLED: CellTags = CellTags(1 << 1);
    pub const WATERED: CellTags = CellTags(1 << 2);
    pub const PLANTED: CellTags = CellTags(1 << 3);

    pub const EMPTY: CellTags = CellTags(0);

    const ALL: [(CellTags, &'static str); 4] = [
        (CellTags::FARMABLE, "Farmable"),
        (CellTags::TILLED, "Tilled"),
        (CellTags::WATERED, "Watered"),
        (CellTags::PLANTED, "Planted"),
    ];

    // Single-letter tags written by older saves.
    const SHORT: [(CellTags, &'static str); 4] = [
        (CellTags::FARMABLE, "F"),
        (CellTags::TILLED, "X"),
        (CellTags::WATERED, "W"),
        (CellTags::PLANTED, "P"),
    ];

    pub fn contains(self, other: CellTags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: CellTags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: CellTags) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_farmable(self) -> bool {
        self.contains(CellTags::FARMABLE)
    }

    pub fn is_tilled(self) -> bool {
        self.contains(CellTags::TILLED)
    }

    pub fn is_watered(self) -> bool {
        self.contains(CellTags::WATERED)
    }

    pub fn is_planted(self) -> bool {
        self.contains(CellTags::PLANTED)
    }

    /// Tag name as stored in save documents.
    pub fn tag_name(tag: CellTags) -> Option<&'static str> {
        Self::ALL.iter().find(|(t, _)| *t == tag).map(|(_, n)| *n)
    }

    pub fn from_tag_name(name: &str) -> Option<CellTags> {
        Self::ALL
            .iter()
            .chain(Self::SHORT.iter())
            .find(|(_, n)| *n == name)
            .map(|(t, _)| *t)
    }

    /// Tag names in a fixed order, suitable for serialization.
    pub fn names(self) -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|(t, _)| self.contains(*t))
            .map(|(_, n)| *n)
            .collect()
    }
}

impl std::ops::BitOr for CellTags {
    type Output = CellTags;

    fn bitor(self, rhs: CellTags) -> CellTags {
        CellTags(self.0 | rhs.0)
    }
}

/// Column/row address of a soil cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPos {
    pub x: usize,
    pub y: usize,
}

impl GridPos {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// The cell containing a map-pixel point, if the point is not left of or above the map.
    pub fn from_point(point: Vec2, tile_size: f32) -> Option<Self> {
        if point.x < 0.0 || point.y < 0.0 || !point.is_finite() {
            return None;
        }
        Some(Self {
            x: (point.x / tile_size).floor() as usize,
            y: (point.y / tile_size).floor() as usize,
        })
    }

    /// Top-left corner of the cell in map pixels.
    pub fn top_left(self, tile_size: f32) -> Vec2 {
        Vec2::new(self.x as f32 * tile_size, self.y as f32 * tile_size)
    }

    pub fn rect(self, tile_size: f32) -> Rect {
        let min = self.top_left(tile_size);
        Rect::from_corners(min, min + Vec2::splat(tile_size))
    }
}

/// Rectangular matrix of cells, `height` rows of `width` cells each.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Grid {
    rows: Vec<Vec<CellTags>>,
    width: usize,
}

impl Grid {
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            rows: vec![vec![CellTags::EMPTY; width]; height],
            width,
        }
    }

    /// Builds a grid from possibly ragged rows, padding short rows with empty cells.
    pub fn from_rows(mut rows: Vec<Vec<CellTags>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, CellTags::EMPTY);
        }
        Self { rows, width }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn get(&self, pos: GridPos) -> Option<CellTags> {
        self.rows.get(pos.y).and_then(|row| row.get(pos.x)).copied()
    }

    pub fn get_mut(&mut self, pos: GridPos) -> Option<&mut CellTags> {
        self.rows.get_mut(pos.y).and_then(|row| row.get_mut(pos.x))
    }

    /// Signed lookup used for neighbour checks; anything off-grid reads as empty.
    pub fn get_signed(&self, x: isize, y: isize) -> CellTags {
        if x < 0 || y < 0 {
            return CellTags::EMPTY;
        }
        self.get(GridPos::new(x as usize, y as usize))
            .unwrap_or(CellTags::EMPTY)
    }

    pub fn rows(&self) -> &[Vec<CellTags>] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = (GridPos, CellTags)> + '_ {
        self.rows.iter().enumerate().flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .map(move |(x, &cell)| (GridPos::new(x, y), cell))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (GridPos, &mut CellTags)> + '_ {
        self.rows.iter_mut().enumerate().flat_map(|(y, row)| {
            row.iter_mut()
                .enumerate()
                .map(move |(x, cell)| (GridPos::new(x, y), cell))
        })
    }

    /// Pads or truncates to exactly `height` × `width`.
    pub fn fit_to(mut self, height: usize, width: usize) -> Self {
        self.rows.resize_with(height, Vec::new);
        for row in &mut self.rows {
            row.resize(width, CellTags::EMPTY);
        }
        self.width = width;
        self
    }

    /// Nested-array document form: rows of cells of tag-name lists.
    pub fn to_value(&self) -> Value {
        Value::Array(
            self.rows
                .iter()
                .map(|row| {
                    Value::Array(
                        row.iter()
                            .map(|cell| {
                                Value::Array(
                                    cell.names()
                                        .into_iter()
                                        .map(|n| Value::String(n.to_string()))
                                        .collect(),
                                )
                            })
                            .collect(),
                    )
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_insert_is_idempotent() {
        let mut cell = CellTags::FARMABLE;
        cell.insert(CellTags::TILLED);
        cell.insert(CellTags::TILLED);
        assert_eq!(cell.names(), vec!["Farmable", "Tilled"]);
        assert!(cell.is_tilled());
        cell.remove(CellTags::TILLED);
        assert!(!cell.is_tilled());
        assert!(cell.is_farmable());
    }

    #[test]
    fn test_tag_names_roundtrip() {
        for name in ["Farmable", "Tilled", "Watered", "Planted"] {
            let tag = CellTags::from_tag_name(name).unwrap();
            assert_eq!(CellTags::tag_name(tag), Some(name));
        }
        assert_eq!(CellTags::from_tag_name("X"), Some(CellTags::TILLED));
        assert_eq!(CellTags::from_tag_name("Q"), None);
    }

    #[test]
    fn test_from_rows_pads_ragged_rows() {
        let grid = Grid::from_rows(vec![
            vec![CellTags::FARMABLE],
            vec![CellTags::EMPTY, CellTags::EMPTY, CellTags::FARMABLE],
            vec![],
        ]);
        assert_eq!(grid.height(), 3);
        assert_eq!(grid.width(), 3);
        assert!(grid.rows().iter().all(|r| r.len() == 3));
        assert_eq!(grid.get(GridPos::new(2, 2)), Some(CellTags::EMPTY));
    }

    #[test]
    fn test_signed_lookup_off_grid_is_empty() {
        let mut grid = Grid::new(2, 2);
        *grid.get_mut(GridPos::new(0, 0)).unwrap() = CellTags::FARMABLE | CellTags::TILLED;
        assert!(grid.get_signed(0, 0).is_tilled());
        assert!(grid.get_signed(-1, 0).is_empty());
        assert!(grid.get_signed(0, 5).is_empty());
    }

    #[test]
    fn test_point_to_cell() {
        assert_eq!(
            GridPos::from_point(Vec2::new(64.0, 64.0), 64.0),
            Some(GridPos::new(1, 1))
        );
        assert_eq!(
            GridPos::from_point(Vec2::new(63.9, 0.0), 64.0),
            Some(GridPos::new(0, 0))
        );
        assert_eq!(GridPos::from_point(Vec2::new(-1.0, 10.0), 64.0), None);
    }

    #[test]
    fn test_fit_to_pads_and_truncates() {
        let grid = Grid::new(1, 1).fit_to(3, 2);
        assert_eq!((grid.height(), grid.width()), (3, 2));
        let grid = grid.fit_to(1, 1);
        assert_eq!((grid.height(), grid.width()), (1, 1));
    }
}
