//! Image compatibility predicates and precondition checks.
//!
//! - [`predicates`]: pure boolean comparisons between descriptors
//! - [`requirements`]: the same comparisons as fail-fast `Result` checks

pub mod predicates;
pub mod requirements;

pub use predicates::{
    match_color, match_color_space, match_data_type, match_full, match_size, Compatibility,
};
pub use requirements::{
    require_color_space, require_data_type, require_histogram_eligible, require_match_color,
    require_match_full, require_match_size, require_not_complex, require_plane,
    require_same_depth,
};
