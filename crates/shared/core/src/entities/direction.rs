use serde::{Deserialize, Serialize};

/// Position direction of an order, fill or holding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
    /// Net holdings (venues that do not split long/short)
    Net,
}

impl Direction {
    /// Returns the opposite direction. `Net` has no opposite.
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
            Direction::Net => Direction::Net,
        }
    }
}

/// Open/close flag carried by futures orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Offset {
    #[default]
    None,
    Open,
    Close,
    CloseToday,
    CloseYesterday,
}

impl Offset {
    /// Returns true if this offset reduces an existing holding
    pub fn is_close(&self) -> bool {
        matches!(
            self,
            Offset::Close | Offset::CloseToday | Offset::CloseYesterday
        )
    }
}
