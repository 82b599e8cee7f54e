use crate::prelude::HashMap;

/// Per-level record of which grid cells are already painted opaque.
///
/// A level must be reset before cells can be set on it; an unreset level
/// provides no coverage. Within a reset level, cells that were never set
/// count as covered, so only the cells evaluated this frame can hold
/// coverage back.
#[derive(Debug, Clone, Default)]
pub struct CoverageMap {
    levels: HashMap<u32, HashMap<(i64, i64), bool>>,
}

impl CoverageMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    /// Starts a fresh, empty grid for `level`.
    pub fn reset_level(&mut self, level: u32) {
        self.levels.insert(level, HashMap::default());
    }

    pub fn has_level(&self, level: u32) -> bool {
        self.levels.contains_key(&level)
    }

    pub fn set(&mut self, level: u32, x: i64, y: i64, covers: bool) {
        match self.levels.get_mut(&level) {
            Some(cells) => {
                cells.insert((x, y), covers);
            }
            None => log::warn!(
                "coverage set on level {} before it was reset, ignoring ({}, {})",
                level,
                x,
                y
            ),
        }
    }

    /// Whether the cell at `(x, y)` is covered.
    pub fn provides_coverage_at(&self, level: u32, x: i64, y: i64) -> bool {
        match self.levels.get(&level) {
            Some(cells) => cells.get(&(x, y)).copied().unwrap_or(true),
            None => false,
        }
    }

    /// Whether every evaluated cell of `level` is covered.
    pub fn provides_coverage(&self, level: u32) -> bool {
        match self.levels.get(&level) {
            Some(cells) => cells.values().all(|&covered| covered),
            None => false,
        }
    }

    /// A cell is covered when its four children one level up are.
    pub fn is_covered(&self, level: u32, x: i64, y: i64) -> bool {
        let child = level + 1;
        let (cx, cy) = (x * 2, y * 2);
        self.provides_coverage_at(child, cx, cy)
            && self.provides_coverage_at(child, cx, cy + 1)
            && self.provides_coverage_at(child, cx + 1, cy)
            && self.provides_coverage_at(child, cx + 1, cy + 1)
    }
}
