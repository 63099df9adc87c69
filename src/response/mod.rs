//! Backward-flowing responses: discrete distributions and their algebra.

pub mod cartesian;
pub mod groups;
pub mod ops;
pub mod types;

pub use cartesian::{CART_MAX_ENTRIES, Reducer};
pub use groups::{
    add_response_groups, combine_response_groups, combine_response_groups_weighted, max_response_groups,
};
pub use types::{ResponseAspect, ResponseParam, ResponseValue, ResponseValueEntry, NORM_FREQ};
