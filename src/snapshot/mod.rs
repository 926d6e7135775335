// 快照：定期把画布写入磁盘，启动时恢复最近一个可用快照

mod store;
mod task;

pub use store::{SnapshotError, SnapshotId, SnapshotMeta, SnapshotStore};
pub use task::{snapshot_now, spawn_snapshotter};
