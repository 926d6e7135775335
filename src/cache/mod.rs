// 进程内缓存
// 目前只有限流计数，重启后不保留

pub mod rate_limit;

pub use rate_limit::{RateDecision, RateLimiter};
