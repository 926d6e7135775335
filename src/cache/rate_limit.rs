use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

/// 触发惰性清理的表大小
const PRUNE_HIGH_WATER: usize = 4096;

/// 单个客户端的固定窗口计数
#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        remaining: u32,
        reset_after: Duration,
    },
    Denied {
        retry_after: Duration,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

#[derive(Debug)]
struct Table {
    windows: HashMap<String, Window>,
    high_water: usize,
}

/// 按客户端标识的固定窗口限流器
///
/// 客户端第一次消耗时开启窗口，窗口内最多放行 `points` 次，
/// 窗口到期后计数归零，下一次请求开启新窗口。被拒绝的请求不会延长窗口。
/// 整张表由一把互斥锁保护，同一客户端的并发请求因此串行计数。
#[derive(Debug)]
pub struct RateLimiter {
    points: u32,
    duration: Duration,
    table: Mutex<Table>,
}

impl RateLimiter {
    pub fn new(points: u32, duration: Duration) -> Self {
        Self {
            points,
            duration,
            table: Mutex::new(Table {
                windows: HashMap::new(),
                high_water: PRUNE_HIGH_WATER,
            }),
        }
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn try_consume(&self, client_id: &str, cost: u32) -> RateDecision {
        self.try_consume_at(client_id, cost, Instant::now())
    }

    pub fn try_consume_at(&self, client_id: &str, cost: u32, now: Instant) -> RateDecision {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);

        if table.windows.len() >= table.high_water {
            self.prune_table(&mut table, now);
        }

        let window = table
            .windows
            .entry(client_id.to_owned())
            .or_insert(Window {
                count: 0,
                started: now,
            });

        let elapsed = now.saturating_duration_since(window.started);
        if elapsed >= self.duration {
            *window = Window {
                count: 0,
                started: now,
            };
        }
        let reset_after = self
            .duration
            .saturating_sub(now.saturating_duration_since(window.started));

        match window.count.checked_add(cost) {
            Some(total) if total <= self.points => {
                window.count = total;
                RateDecision::Allowed {
                    remaining: self.points - total,
                    reset_after,
                }
            }
            _ => RateDecision::Denied {
                retry_after: reset_after,
            },
        }
    }

    /// 删除所有已过期的窗口，返回删除数量
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    pub fn prune_at(&self, now: Instant) -> usize {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune_table(&mut table, now)
    }

    pub fn tracked_clients(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .windows
            .len()
    }

    fn prune_table(&self, table: &mut Table, now: Instant) -> usize {
        let before = table.windows.len();
        let duration = self.duration;
        table
            .windows
            .retain(|_, w| now.saturating_duration_since(w.started) < duration);
        let removed = before - table.windows.len();

        // 活跃客户端过多时提高阈值，避免每次请求都全表扫描
        table.high_water = if table.windows.len() >= PRUNE_HIGH_WATER / 2 {
            table.windows.len() * 2
        } else {
            PRUNE_HIGH_WATER
        };

        if removed > 0 {
            tracing::debug!(removed, remaining = table.windows.len(), "pruned rate limit windows");
        }
        removed
    }

    /// 后台定期清理过期窗口
    pub fn spawn_pruner(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                limiter.prune();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    #[test]
    fn admits_up_to_points_then_denies() {
        let limiter = RateLimiter::new(10, WINDOW);
        let t0 = Instant::now();

        let decisions: Vec<bool> = (0..15)
            .map(|i| {
                limiter
                    .try_consume_at("10.0.0.1", 1, t0 + Duration::from_millis(i))
                    .is_allowed()
            })
            .collect();

        assert!(decisions[..10].iter().all(|d| *d));
        assert!(decisions[10..].iter().all(|d| !*d));
    }

    #[test]
    fn window_reset_admits_again() {
        let limiter = RateLimiter::new(1, WINDOW);
        let t0 = Instant::now();

        assert!(limiter.try_consume_at("a", 1, t0).is_allowed());
        assert_eq!(
            limiter.try_consume_at("a", 1, t0 + Duration::from_millis(40)),
            RateDecision::Denied {
                retry_after: Duration::from_millis(60)
            }
        );
        // 被拒绝的请求不延长窗口
        assert!(limiter.try_consume_at("a", 1, t0 + WINDOW).is_allowed());
        assert!(!limiter
            .try_consume_at("a", 1, t0 + WINDOW + Duration::from_millis(1))
            .is_allowed());
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(1, WINDOW);
        let t0 = Instant::now();

        assert!(limiter.try_consume_at("a", 1, t0).is_allowed());
        assert!(limiter.try_consume_at("b", 1, t0).is_allowed());
        assert!(!limiter.try_consume_at("a", 1, t0).is_allowed());
    }

    #[test]
    fn cost_larger_than_points_is_denied() {
        let limiter = RateLimiter::new(10, WINDOW);
        let t0 = Instant::now();

        assert!(!limiter.try_consume_at("a", 11, t0).is_allowed());
        assert_eq!(
            limiter.try_consume_at("a", 4, t0),
            RateDecision::Allowed {
                remaining: 6,
                reset_after: WINDOW
            }
        );
        assert!(!limiter.try_consume_at("a", u32::MAX, t0).is_allowed());
    }

    #[test]
    fn prune_drops_only_expired_windows() {
        let limiter = RateLimiter::new(1, WINDOW);
        let t0 = Instant::now();

        limiter.try_consume_at("old", 1, t0);
        limiter.try_consume_at("new", 1, t0 + Duration::from_millis(80));
        assert_eq!(limiter.tracked_clients(), 2);

        assert_eq!(limiter.prune_at(t0 + Duration::from_millis(120)), 1);
        assert_eq!(limiter.tracked_clients(), 1);
        assert!(!limiter
            .try_consume_at("new", 1, t0 + Duration::from_millis(120))
            .is_allowed());
    }

    #[test]
    fn churn_of_many_clients_stays_bounded() {
        let limiter = RateLimiter::new(1, WINDOW);
        let t0 = Instant::now();

        for i in 0..(PRUNE_HIGH_WATER * 3) {
            // 每个客户端只出现一次，且前一批早已过期
            let now = t0 + WINDOW * (i / 1000) as u32;
            limiter.try_consume_at(&format!("client-{i}"), 1, now);
        }
        assert!(limiter.tracked_clients() <= PRUNE_HIGH_WATER);
    }

    #[test]
    fn concurrent_consumers_never_exceed_capacity() {
        let limiter = Arc::new(RateLimiter::new(10, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| limiter.try_consume("shared", 1).is_allowed())
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 10);
    }
}
