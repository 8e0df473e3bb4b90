//! Walkability grid and greedy path stepping for tile-based modes.

use crate::config::TileConfig;
use crate::math::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tile {
    Grass,
    Stone,
    Tree,
}

impl Tile {
    pub fn is_walkable(self) -> bool {
        self != Tile::Tree
    }
}

/// Row-major grid, `rows[y][x]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileMap {
    pub columns: u32,
    pub rows: u32,
    pub tiles: Vec<Vec<Tile>>,
}

impl TileMap {
    /// Tree border, the configured stone plaza and road, and scattered trees
    /// everywhere else.
    pub fn generate<R: Rng + ?Sized>(config: &TileConfig, rng: &mut R) -> Self {
        let (columns, rows) = (config.columns, config.rows);
        let mut tiles = Vec::with_capacity(rows as usize);
        for y in 0..rows {
            let mut row = Vec::with_capacity(columns as usize);
            for x in 0..columns {
                let border = x == 0 || y == 0 || x == columns - 1 || y == rows - 1;
                let paved = config.plaza.contains(x, y) || config.road.contains(x, y);
                let tile = if border {
                    Tile::Tree
                } else if paved {
                    Tile::Stone
                } else if rng.gen_bool(config.tree_density) {
                    Tile::Tree
                } else {
                    Tile::Grass
                };
                row.push(tile);
            }
            tiles.push(row);
        }
        Self {
            columns,
            rows,
            tiles,
        }
    }

    /// Open map with only the tree border; handy for deterministic tests.
    pub fn open(columns: u32, rows: u32) -> Self {
        let tiles = (0..rows)
            .map(|y| {
                (0..columns)
                    .map(|x| {
                        if x == 0 || y == 0 || x == columns - 1 || y == rows - 1 {
                            Tile::Tree
                        } else {
                            Tile::Grass
                        }
                    })
                    .collect()
            })
            .collect();
        Self {
            columns,
            rows,
            tiles,
        }
    }

    pub fn tile(&self, x: i64, y: i64) -> Option<Tile> {
        if x < 0 || y < 0 {
            return None;
        }
        self.tiles
            .get(y as usize)
            .and_then(|row| row.get(x as usize))
            .copied()
    }

    pub fn is_walkable(&self, x: i64, y: i64) -> bool {
        self.tile(x, y).is_some_and(Tile::is_walkable)
    }

    pub fn set(&mut self, x: u32, y: u32, tile: Tile) {
        if let Some(slot) = self
            .tiles
            .get_mut(y as usize)
            .and_then(|row| row.get_mut(x as usize))
        {
            *slot = tile;
        }
    }

    /// Greedy step-by-step path from `start` to `target`, diagonal first.
    ///
    /// When the diagonal step is blocked the longer axis is tried alone; the
    /// walk stops at the first step that cannot be taken or after `max_len`
    /// steps, so the returned path may end short of the target.
    pub fn find_path(&self, start: (i64, i64), target: (i64, i64), max_len: usize) -> Vec<(i64, i64)> {
        let mut path = Vec::new();
        let (mut x, mut y) = start;

        while (x, y) != target && path.len() < max_len {
            let step_x = (target.0 - x).signum();
            let step_y = (target.1 - y).signum();

            if self.is_walkable(x + step_x, y + step_y) {
                x += step_x;
                y += step_y;
            } else {
                let (alt_x, alt_y) = if (target.0 - x).abs() > (target.1 - y).abs() {
                    (x + step_x, y)
                } else {
                    (x, y + step_y)
                };
                if !self.is_walkable(alt_x, alt_y) || (alt_x, alt_y) == (x, y) {
                    break;
                }
                x = alt_x;
                y = alt_y;
            }
            path.push((x, y));
        }

        path
    }
}

/// Rounds a continuous position to the tile it sits on.
pub fn tile_of(position: Vec2) -> (i64, i64) {
    (position.x.round() as i64, position.y.round() as i64)
}
