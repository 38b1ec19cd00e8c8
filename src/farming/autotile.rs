//! Neighbour-aware soil tile selection.

use super::grid::{Grid, GridPos};

/// Visual shape of a tilled soil tile, named after the sides that are open
/// toward tilled neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoilTileVariant {
    /// Tilled on all four sides.
    Surrounded,
    TopBottomRight,
    TopBottomLeft,
    LeftRightBottom,
    LeftRightTop,
    Vertical,
    Horizontal,
    TopRight,
    TopLeft,
    BottomRight,
    BottomLeft,
    Right,
    Left,
    Bottom,
    Top,
    Isolated,
}

impl SoilTileVariant {
    /// Sprite sheet key for the variant.
    pub fn sprite_key(self) -> &'static str {
        match self {
            SoilTileVariant::Surrounded => "x",
            SoilTileVariant::TopBottomRight => "tbr",
            SoilTileVariant::TopBottomLeft => "tbl",
            SoilTileVariant::LeftRightBottom => "lrb",
            SoilTileVariant::LeftRightTop => "lrt",
            SoilTileVariant::Vertical => "tb",
            SoilTileVariant::Horizontal => "lr",
            SoilTileVariant::TopRight => "tr",
            SoilTileVariant::TopLeft => "tl",
            SoilTileVariant::BottomRight => "br",
            SoilTileVariant::BottomLeft => "bl",
            SoilTileVariant::Right => "r",
            SoilTileVariant::Left => "l",
            SoilTileVariant::Bottom => "b",
            SoilTileVariant::Top => "t",
            SoilTileVariant::Isolated => "o",
        }
    }
}

/// Picks the tile variant from which axis neighbours are tilled.
///
/// Checked in a fixed order: all four, three sides, opposite pairs, corners,
/// single sides, none. Corner and single-side keys name the edge the sprite
/// draws, which is the side facing away from the tilled neighbour.
pub fn resolve_tile_variant(top: bool, bottom: bool, left: bool, right: bool) -> SoilTileVariant {
    use SoilTileVariant::*;

    if top && bottom && left && right {
        return Surrounded;
    }

    if top && bottom && right && !left {
        return TopBottomRight;
    }
    if top && bottom && left && !right {
        return TopBottomLeft;
    }
    if left && right && top && !bottom {
        return LeftRightBottom;
    }
    if left && right && bottom && !top {
        return LeftRightTop;
    }

    if top && bottom && !left && !right {
        return Vertical;
    }
    if left && right && !top && !bottom {
        return Horizontal;
    }

    if left && bottom && !top && !right {
        return TopRight;
    }
    if right && bottom && !top && !left {
        return TopLeft;
    }
    if left && top && !bottom && !right {
        return BottomRight;
    }
    if right && top && !bottom && !left {
        return BottomLeft;
    }

    if left && !top && !bottom && !right {
        return Right;
    }
    if right && !top && !bottom && !left {
        return Left;
    }
    if top && !bottom && !left && !right {
        return Bottom;
    }
    if bottom && !top && !left && !right {
        return Top;
    }

    Isolated
}

/// Variant for the tilled cell at `pos`, or `None` if the cell is not tilled.
/// Neighbours off the grid count as untilled.
pub fn tile_variant_at(grid: &Grid, pos: GridPos) -> Option<SoilTileVariant> {
    if !grid.get(pos)?.is_tilled() {
        return None;
    }
    let (x, y) = (pos.x as isize, pos.y as isize);
    Some(resolve_tile_variant(
        grid.get_signed(x, y - 1).is_tilled(),
        grid.get_signed(x, y + 1).is_tilled(),
        grid.get_signed(x - 1, y).is_tilled(),
        grid.get_signed(x + 1, y).is_tilled(),
    ))
}
