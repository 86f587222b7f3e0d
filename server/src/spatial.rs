//! Coarse grid partition used for proximity queries and broadcast fan-out.
//!
//! Positions are bucketed into square cells ("sectors"). A query around a
//! point looks at the home cell plus its 8 neighbours, so as long as the cell
//! size is at least the query radius nothing inside the radius is missed.
//! Results may include members slightly beyond the radius; callers that need
//! exact distances filter afterwards.

use shared::Vec2;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Integer cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub fn of(position: Vec2, cell_size: f32) -> Cell {
        Cell {
            x: (position.x / cell_size).floor() as i32,
            y: (position.y / cell_size).floor() as i32,
        }
    }

    /// This cell and its 8 neighbours.
    pub fn neighbourhood(&self) -> [Cell; 9] {
        let mut cells = [*self; 9];
        let mut i = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                cells[i] = Cell {
                    x: self.x + dx,
                    y: self.y + dy,
                };
                i += 1;
            }
        }
        cells
    }
}

/// Maps members to the cell they currently live in.
#[derive(Debug)]
pub struct SpatialIndex<K> {
    cell_size: f32,
    cells: HashMap<Cell, HashSet<K>>,
    homes: HashMap<K, Cell>,
}

impl<K: Copy + Eq + Hash> SpatialIndex<K> {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(1.0),
            cells: HashMap::new(),
            homes: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn cell_of(&self, position: Vec2) -> Cell {
        Cell::of(position, self.cell_size)
    }

    /// Regions a broadcast originating at `position` must reach.
    pub fn regions_for(&self, position: Vec2) -> [Cell; 9] {
        self.cell_of(position).neighbourhood()
    }

    /// Records `member` at `position`.
    ///
    /// Membership only changes when the home cell changes; returns true in
    /// that case (including first insertion).
    pub fn update(&mut self, member: K, position: Vec2) -> bool {
        let new_cell = self.cell_of(position);
        match self.homes.get(&member).copied() {
            Some(old_cell) if old_cell == new_cell => false,
            Some(old_cell) => {
                self.detach(member, old_cell);
                self.attach(member, new_cell);
                true
            }
            None => {
                self.attach(member, new_cell);
                true
            }
        }
    }

    /// Removes `member`. Unknown members are ignored.
    pub fn remove(&mut self, member: K) -> bool {
        match self.homes.remove(&member) {
            Some(cell) => {
                if let Some(set) = self.cells.get_mut(&cell) {
                    set.remove(&member);
                    if set.is_empty() {
                        self.cells.remove(&cell);
                    }
                }
                true
            }
            None => false,
        }
    }

    pub fn home_of(&self, member: K) -> Option<Cell> {
        self.homes.get(&member).copied()
    }

    pub fn contains(&self, member: K) -> bool {
        self.homes.contains_key(&member)
    }

    /// Every member in the 3x3 neighbourhood of `position`.
    pub fn candidates_near(&self, position: Vec2) -> Vec<K> {
        let mut out = Vec::new();
        for cell in self.regions_for(position) {
            if let Some(set) = self.cells.get(&cell) {
                out.extend(set.iter().copied());
            }
        }
        out
    }

    /// Every member in the cells a circle of `radius` can touch. Same as
    /// [`Self::candidates_near`] for radii up to the cell size.
    pub fn candidates_within(&self, position: Vec2, radius: f32) -> Vec<K> {
        let rings = (radius / self.cell_size).ceil().max(1.0) as i32;
        let home = self.cell_of(position);
        let mut out = Vec::new();
        for y in home.y - rings..=home.y + rings {
            for x in home.x - rings..=home.x + rings {
                if let Some(set) = self.cells.get(&Cell { x, y }) {
                    out.extend(set.iter().copied());
                }
            }
        }
        out
    }

    pub fn count_in_cell(&self, cell: Cell) -> usize {
        self.cells.get(&cell).map(|set| set.len()).unwrap_or(0)
    }

    /// Occupied cells, for per-sector bookkeeping.
    pub fn occupied_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.keys()
    }

    pub fn len(&self) -> usize {
        self.homes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.homes.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.homes.clear();
    }

    fn attach(&mut self, member: K, cell: Cell) {
        self.cells.entry(cell).or_default().insert(member);
        self.homes.insert(member, cell);
    }

    fn detach(&mut self, member: K, cell: Cell) {
        if let Some(set) = self.cells.get_mut(&cell) {
            set.remove(&member);
            if set.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }
}
