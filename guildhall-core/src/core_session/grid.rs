//! Fixed-width cell grid that screens render into

use super::ScreenError;
use crate::core_guild::types::{ApplicationId, GuildId, InvitationId, PlayerId, RelationId};
use std::fmt;

/// Cells per row
pub const COLUMNS: usize = 9;

/// Largest grid a screen may request (six rows)
pub const MAX_ROWS: usize = 6;

/// How a cell was clicked; screens decide what each kind means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    Primary,
    Secondary,
    Tertiary,
}

impl ClickKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "primary" | "left" | "p" => Some(ClickKind::Primary),
            "secondary" | "right" | "s" => Some(ClickKind::Secondary),
            "tertiary" | "middle" | "t" => Some(ClickKind::Tertiary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Click {
    pub slot: usize,
    pub kind: ClickKind,
}

impl Click {
    pub fn primary(slot: usize) -> Self {
        Click {
            slot,
            kind: ClickKind::Primary,
        }
    }
}

/// What a cell refers to, handed back to the screen on click
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellPayload {
    PrevPage,
    NextPage,
    Guild(GuildId),
    Member(PlayerId),
    Relation(RelationId),
    Application(ApplicationId),
    Invitation(InvitationId),
    /// Screen-specific button
    Action(&'static str),
}

/// A renderable item: icon, label and description lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub icon: String,
    pub label: String,
    pub lore: Vec<String>,
    pub payload: Option<CellPayload>,
}

impl Cell {
    pub fn new(icon: impl Into<String>, label: impl Into<String>) -> Self {
        Cell {
            icon: icon.into(),
            label: label.into(),
            lore: Vec::new(),
            payload: None,
        }
    }

    /// Non-interactive border filler
    pub fn filler() -> Self {
        Cell::new("GRAY_STAINED_GLASS_PANE", " ")
    }

    pub fn lore(mut self, line: impl Into<String>) -> Self {
        self.lore.push(line.into());
        self
    }

    pub fn payload(mut self, payload: CellPayload) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    cells: Vec<Option<Cell>>,
}

impl Grid {
    /// Grid with `size` cells; `size` must be a whole number of rows
    pub fn new(size: usize) -> Result<Self, ScreenError> {
        if size == 0 || size % COLUMNS != 0 || size > COLUMNS * MAX_ROWS {
            return Err(ScreenError::InvalidSize(size));
        }
        Ok(Grid {
            cells: vec![None; size],
        })
    }

    pub fn size(&self) -> usize {
        self.cells.len()
    }

    pub fn rows(&self) -> usize {
        self.cells.len() / COLUMNS
    }

    pub fn get(&self, slot: usize) -> Option<&Cell> {
        self.cells.get(slot).and_then(|c| c.as_ref())
    }

    pub fn set(&mut self, slot: usize, cell: Cell) -> Result<(), ScreenError> {
        let size = self.size();
        let target = self
            .cells
            .get_mut(slot)
            .ok_or(ScreenError::SlotOutOfRange { slot, size })?;
        *target = Some(cell);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = None);
    }

    /// Occupied slots in order
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &Cell)> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(slot, cell)| cell.as_ref().map(|c| (slot, c)))
    }

    fn is_border(&self, slot: usize) -> bool {
        let (row, col) = (slot / COLUMNS, slot % COLUMNS);
        row == 0 || row + 1 == self.rows() || col == 0 || col + 1 == COLUMNS
    }

    pub fn fill_border(&mut self) {
        for slot in 0..self.size() {
            if self.is_border(slot) {
                self.cells[slot] = Some(Cell::filler());
            }
        }
    }

    /// Slots inside the border, row by row
    pub fn inner_slots(&self) -> Vec<usize> {
        (0..self.size()).filter(|s| !self.is_border(*s)).collect()
    }

    /// Bottom-row slot in column `col`
    pub fn bottom(&self, col: usize) -> usize {
        (self.rows() - 1) * COLUMNS + col.min(COLUMNS - 1)
    }

    /// Fill the inner area with `items`, returning how many fit
    pub fn place_all(&mut self, items: impl IntoIterator<Item = Cell>) -> usize {
        let slots = self.inner_slots();
        let mut placed = 0;
        for (slot, cell) in slots.into_iter().zip(items) {
            self.cells[slot] = Some(cell);
            placed += 1;
        }
        placed
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (slot, cell) in self.occupied() {
            if cell.payload.is_none() && cell.label.trim().is_empty() {
                continue;
            }
            write!(f, "[{:>2}] {}", slot, cell.label)?;
            if !cell.lore.is_empty() {
                write!(f, " ({})", cell.lore.join("; "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Page cursor for list screens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    pub page: usize,
    pub per_page: usize,
}

impl Pager {
    pub fn new(per_page: usize) -> Self {
        Pager {
            page: 0,
            per_page: per_page.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        self.page * self.per_page
    }

    pub fn has_next(&self, total: usize) -> bool {
        self.offset() + self.per_page < total
    }

    /// Apply a prev/next click. Returns whether the page changed.
    pub fn turn(&mut self, payload: Option<&CellPayload>) -> bool {
        match payload {
            Some(CellPayload::PrevPage) if self.page > 0 => {
                self.page -= 1;
                true
            }
            Some(CellPayload::NextPage) => {
                self.page += 1;
                true
            }
            _ => false,
        }
    }

    /// Put prev/next cells on the bottom row where they apply
    pub fn place_controls(&self, grid: &mut Grid, total: usize) -> Result<(), ScreenError> {
        if self.page > 0 {
            grid.set(
                grid.bottom(0),
                Cell::new("ARROW", "Previous page").payload(CellPayload::PrevPage),
            )?;
        }
        if self.has_next(total) {
            grid.set(
                grid.bottom(COLUMNS - 1),
                Cell::new("ARROW", "Next page").payload(CellPayload::NextPage),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_size_must_be_whole_rows() {
        assert!(Grid::new(27).is_ok());
        assert!(matches!(Grid::new(20), Err(ScreenError::InvalidSize(20))));
        assert!(Grid::new(63).is_err());
    }

    #[test]
    fn test_border_and_inner_slots() {
        let mut grid = Grid::new(27).unwrap();
        grid.fill_border();
        assert_eq!(grid.inner_slots(), (10..17).collect::<Vec<_>>());
        assert!(grid.get(0).is_some());
        assert!(grid.get(13).is_none());
        assert_eq!(grid.occupied().count(), 20);
    }

    #[test]
    fn test_out_of_range_slot() {
        let mut grid = Grid::new(9).unwrap();
        assert_eq!(
            grid.set(9, Cell::new("STONE", "x")),
            Err(ScreenError::SlotOutOfRange { slot: 9, size: 9 })
        );
    }

    #[test]
    fn test_pager() {
        let mut pager = Pager::new(7);
        assert!(pager.has_next(8));
        assert!(!pager.turn(Some(&CellPayload::PrevPage)));
        assert!(pager.turn(Some(&CellPayload::NextPage)));
        assert_eq!(pager.offset(), 7);
        assert!(!pager.has_next(8));

        let mut grid = Grid::new(27).unwrap();
        pager.place_controls(&mut grid, 8).unwrap();
        assert_eq!(grid.get(18).unwrap().payload, Some(CellPayload::PrevPage));
        assert!(grid.get(26).is_none());
    }
}
