//! Probability building blocks for ipwstat.
//!
//! - small numeric helpers (stable log/exp/sigmoid primitives)
//! - standard normal critical values and tail probabilities

pub mod math;
pub mod normal;
