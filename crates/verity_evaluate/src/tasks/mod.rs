pub mod comparison;
pub mod expression;
pub mod judge;
pub mod registry;
pub mod trace;
pub mod traits;
