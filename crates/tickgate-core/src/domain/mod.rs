//! # Domain Types
//!
//! Validated value types shared by every gateway component.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Uppercase ticker, used as the cache key |
//! | [`Quote`] | Normalized quote returned to callers |
//! | [`QuoteSource`] | Provider that produced a quote, or the offline sample |
//! | [`UtcDateTime`] | UTC timestamp, RFC3339 on the wire |

mod quote;
mod symbol;
mod timestamp;

pub use quote::{Quote, QuoteSource};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
