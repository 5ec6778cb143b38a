//! Resumable enumeration over continuation-token listings.

mod enumerator;

pub use enumerator::SegmentedEnumerator;
