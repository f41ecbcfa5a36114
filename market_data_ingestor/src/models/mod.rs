pub mod range;
pub mod record;
pub mod symbol;

pub use range::{DateRange, RangeError};
pub use record::{OhlcvRecord, merge_by_date};
pub use symbol::SymbolInfo;
