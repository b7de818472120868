//! Games to synthesize strategies for.

pub mod catcher;
