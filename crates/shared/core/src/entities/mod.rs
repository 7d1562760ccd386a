mod account;
mod contract;
mod direction;
mod order;
mod order_status;
mod order_type;
mod position;
mod risk_level;
mod session_state;
mod tick;
mod trade;

pub use account::AccountRecord;
pub use contract::{ContractRef, Exchange, ProductKind};
pub use direction::{Direction, Offset};
pub use order::{OrderId, OrderIntent, OrderRecord};
pub use order_status::OrderStatus;
pub use order_type::OrderType;
pub use position::{PositionKey, PositionRecord};
pub use risk_level::RiskLevel;
pub use session_state::GatewayState;
pub use tick::TickData;
pub use trade::TradeRecord;
