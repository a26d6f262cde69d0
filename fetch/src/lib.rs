//! HTTP fetching and robots.txt policy enforcement.

mod fetcher;
mod robots;

pub use fetcher::{FetchOutcome, Fetcher, USER_AGENT};
pub use robots::{RobotsCache, RobotsPolicy};
