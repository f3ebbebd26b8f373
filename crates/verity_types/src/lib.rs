pub mod context;
pub mod error;
pub mod eval;
pub mod judge;
pub mod trace;
pub mod value;

pub use context::*;
pub use error::*;
pub use eval::*;
pub use judge::*;
pub use trace::*;
pub use value::*;
