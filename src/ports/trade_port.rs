//! Trade source port trait.

use crate::domain::error::QmetricsError;
use crate::domain::trade::RawTrade;

pub trait TradePort {
    /// Raw rows in source order; row `i` of the result is data row `i` of the source.
    fn load_trades(&self) -> Result<Vec<RawTrade>, QmetricsError>;
}
