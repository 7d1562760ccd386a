use serde::{Deserialize, Serialize};

/// Order lifecycle status
///
/// ```text
/// Submitting ──► NotTraded ──► PartTraded ──► AllTraded
///     │              │              │
///     ├──► Rejected  └──────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created locally, not yet acknowledged by the venue
    Submitting,
    /// Resting on the venue with no fills
    NotTraded,
    /// Partially filled
    PartTraded,
    /// Completely filled
    AllTraded,
    /// Cancelled (possibly after partial fills)
    Cancelled,
    /// Rejected by the venue or the session
    Rejected,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::AllTraded | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    /// Returns true if the order is still active
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if moving from `self` to `next` is a forward step.
    ///
    /// Repeating `PartTraded` is allowed (further fills). Rejection is only
    /// possible before the venue has accepted the order.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Submitting, NotTraded | PartTraded | AllTraded | Cancelled | Rejected) => true,
            (NotTraded, PartTraded | AllTraded | Cancelled) => true,
            (PartTraded, PartTraded | AllTraded | Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Submitting => "SUBMITTING",
            OrderStatus::NotTraded => "NOT_TRADED",
            OrderStatus::PartTraded => "PART_TRADED",
            OrderStatus::AllTraded => "ALL_TRADED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
        };
        write!(f, "{}", s)
    }
}
