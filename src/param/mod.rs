//! Forward-flowing values ("loads") and the algebra over them.

pub mod load_ops;
pub mod math_ops;
pub mod random;
pub mod types;

pub use random::{DistributionFamily, RandomParam};
pub use types::{Aspect, NumberParam, Param, UNKNOWN_SLICE};
