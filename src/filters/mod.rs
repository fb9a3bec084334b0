pub mod s1_filter;

pub use s1_filter::{apply as apply_s1_filter, FilterVerdict};
