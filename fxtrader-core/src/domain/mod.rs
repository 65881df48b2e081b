//! Domain types for fxtrader

pub mod candle;
pub mod decimal;
pub mod ids;
pub mod instrument;
pub mod order;
pub mod position;
pub mod timeframe;

pub use candle::Candle;
pub use decimal::{parse_decimal, DecimalError};
pub use ids::{OrderId, StrategyId};
pub use instrument::{Instrument, InstrumentError, InstrumentRegistry};
pub use order::{OrderType, Side};
pub use position::{Position, PositionStatus};
pub use timeframe::{Timeframe, TimeframeError};
