use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::store::{SnapshotError, SnapshotId, SnapshotStore};
use crate::canvas::Canvas;

/// 复制当前画布并写入一个快照
///
/// 只在复制期间持有画布读锁，序列化和写盘不阻塞像素写入。
pub async fn snapshot_now(
    store: &SnapshotStore,
    canvas: &Canvas,
) -> Result<SnapshotId, SnapshotError> {
    let grid = canvas.get_all();
    store.save(&grid, Utc::now()).await
}

/// 按固定间隔保存快照，与写入流量无关
///
/// 失败只记录日志，下一次定时再试。
pub fn spawn_snapshotter(
    store: Arc<SnapshotStore>,
    canvas: Arc<Canvas>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即触发，跳过
        interval.tick().await;

        loop {
            interval.tick().await;
            match snapshot_now(&store, &canvas).await {
                Ok(id) => info!("Canvas snapshot saved: {}", id),
                Err(e) => error!("Failed to save canvas snapshot: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::models::Color;

    #[tokio::test]
    async fn snapshot_now_captures_current_state() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path(), 0).await.unwrap();
        let canvas = Canvas::new(4, 3);
        canvas.write(1, 2, Color::parse("#00FF00").unwrap()).unwrap();

        snapshot_now(&store, &canvas).await.unwrap();

        let restored = store.load_latest(4, 3).await.unwrap();
        assert_eq!(restored.get(1, 2), Some(Color::parse("#00FF00").unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn snapshotter_saves_after_interval() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SnapshotStore::open(dir.path(), 0).await.unwrap());
        let canvas = Arc::new(Canvas::new(2, 2));

        let handle = spawn_snapshotter(store.clone(), canvas, Duration::from_secs(60));
        tokio::task::yield_now().await;
        assert!(store.list().await.is_empty());

        tokio::time::sleep(Duration::from_secs(61)).await;
        wait_for_writer(&store, true).await;
        handle.abort();

        assert!(!store.list().await.is_empty());
    }

    /// 等待后台任务完成文件写入，`until_saved` 为真时一旦出现快照就返回
    async fn wait_for_writer(store: &SnapshotStore, until_saved: bool) {
        for _ in 0..500 {
            if until_saved && !store.list().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_is_retried_on_next_tick() {
        let dir = TempDir::new().unwrap();
        let snaps = dir.path().join("snaps");
        let store = Arc::new(SnapshotStore::open(&snaps, 0).await.unwrap());
        let canvas = Arc::new(Canvas::new(2, 2));
        std::fs::remove_dir(&snaps).unwrap();

        let handle = spawn_snapshotter(store.clone(), canvas, Duration::from_secs(60));

        // 第一次定时保存失败，任务继续运行
        tokio::time::sleep(Duration::from_secs(61)).await;
        wait_for_writer(&store, false).await;
        assert!(store.list().await.is_empty());
        assert!(!handle.is_finished());

        std::fs::create_dir(&snaps).unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        wait_for_writer(&store, true).await;
        assert!(!handle.is_finished());
        handle.abort();

        let saved = store.list().await;
        assert!(!saved.is_empty());
        assert!(snaps.join(saved[0].id.as_str()).exists());
    }
}
