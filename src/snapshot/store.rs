use std::cmp::Ordering;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::{Color, Grid};

const PREFIX: &str = "canvas-";
const SUFFIX: &str = ".json";
const TMP_SUFFIX: &str = ".tmp";
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("snapshot {id} is corrupt: {reason}")]
    Corrupt { id: SnapshotId, reason: String },
    #[error("snapshot {id} is {}x{}, expected {}x{}", .found.0, .found.1, .expected.0, .expected.1)]
    DimensionMismatch {
        id: SnapshotId,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("snapshot {0} already exists")]
    Exists(SnapshotId),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SnapshotError + '_ {
    move |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// 快照文件名，例如 `canvas-20261019T120000.123Z-000000.json`
///
/// 时间戳为 UTC 且补零，字典序与创建顺序一致；末尾序号区分同一毫秒内的多次保存。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub id: SnapshotId,
    pub created_at: DateTime<Utc>,
    pub seq: u32,
}

impl SnapshotMeta {
    fn new(created_at: DateTime<Utc>, seq: u32) -> Self {
        let name = format!(
            "{PREFIX}{}-{seq:06}{SUFFIX}",
            created_at.format(TIMESTAMP_FORMAT)
        );
        Self {
            id: SnapshotId(name),
            created_at,
            seq,
        }
    }

    /// 解析文件名，不符合命名规则的返回 None
    fn parse(name: &str) -> Option<Self> {
        let stem = name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
        let (ts, seq) = stem.rsplit_once('-')?;
        if !seq.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let seq = seq.parse().ok()?;
        let created_at = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
            .ok()?
            .and_utc();

        let meta = Self::new(created_at, seq);
        // 只接受规范形式，保证文件名与索引一一对应
        (meta.id.as_str() == name).then_some(meta)
    }
}

impl Ord for SnapshotMeta {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.created_at, self.seq, &self.id).cmp(&(other.created_at, other.seq, &other.id))
    }
}

impl PartialOrd for SnapshotMeta {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialOrd for SnapshotId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SnapshotId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// 快照目录
///
/// 内存中维护按创建时间排序的索引，不依赖目录遍历顺序。
#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
    retain: usize,
    index: Mutex<Vec<SnapshotMeta>>,
}

impl SnapshotStore {
    /// 打开（必要时创建）快照目录并建立索引
    ///
    /// 上次异常退出留下的临时文件会被删除。`retain` 为 0 表示保留全部快照。
    pub async fn open(dir: impl Into<PathBuf>, retain: usize) -> Result<Self, SnapshotError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;

        let mut index = Vec::new();
        let mut entries = fs::read_dir(&dir).await.map_err(io_error(&dir))?;
        while let Some(entry) = entries.next_entry().await.map_err(io_error(&dir))? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            if name.starts_with(PREFIX) && name.ends_with(TMP_SUFFIX) {
                let path = entry.path();
                if let Err(e) = fs::remove_file(&path).await {
                    warn!("Failed to remove stale snapshot temp file {}: {}", path.display(), e);
                }
                continue;
            }

            match SnapshotMeta::parse(name) {
                Some(meta) => index.push(meta),
                None => debug!("Ignoring unrecognized file in snapshot dir: {}", name),
            }
        }
        index.sort();

        info!(dir = %dir.display(), count = index.len(), "Snapshot store opened");
        Ok(Self {
            dir,
            retain,
            index: Mutex::new(index),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 按创建时间升序返回已知快照
    pub async fn list(&self) -> Vec<SnapshotMeta> {
        self.index.lock().await.clone()
    }

    /// 写入新快照，永不覆盖已有文件
    pub async fn save(
        &self,
        grid: &Grid,
        timestamp: DateTime<Utc>,
    ) -> Result<SnapshotId, SnapshotError> {
        let body = serde_json::to_vec(grid)?;

        let mut index = self.index.lock().await;
        let meta = next_meta(index.last(), timestamp);

        let path = self.dir.join(meta.id.as_str());
        let tmp = self.dir.join(format!("{}{TMP_SUFFIX}", meta.id));

        if fs::try_exists(&path).await.map_err(io_error(&path))? {
            return Err(SnapshotError::Exists(meta.id));
        }
        if let Err(e) = write_new(&tmp, &body).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(SnapshotError::Io {
                path: tmp,
                source: e,
            });
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(SnapshotError::Io { path, source: e });
        }

        let id = meta.id.clone();
        index.push(meta);
        index.sort();
        self.enforce_retention(&mut index).await;

        Ok(id)
    }

    async fn enforce_retention(&self, index: &mut Vec<SnapshotMeta>) {
        if self.retain == 0 || index.len() <= self.retain {
            return;
        }
        let excess = index.len() - self.retain;
        for meta in index.drain(..excess) {
            let path = self.dir.join(meta.id.as_str());
            match fs::remove_file(&path).await {
                Ok(()) => debug!("Removed old snapshot {}", meta.id),
                Err(e) => warn!("Failed to remove old snapshot {}: {}", meta.id, e),
            }
        }
    }

    /// 读取并校验单个快照
    pub async fn load(&self, id: &SnapshotId) -> Result<Grid, SnapshotError> {
        let path = self.dir.join(id.as_str());
        let bytes = fs::read(&path).await.map_err(io_error(&path))?;

        let rows: Vec<Vec<Color>> =
            serde_json::from_slice(&bytes).map_err(|e| SnapshotError::Corrupt {
                id: id.clone(),
                reason: e.to_string(),
            })?;
        Grid::from_rows(rows).map_err(|e| SnapshotError::Corrupt {
            id: id.clone(),
            reason: e.to_string(),
        })
    }

    /// 从最新开始找第一个可读且尺寸匹配的快照
    ///
    /// 损坏、不可读或尺寸不符的快照记录日志后跳过，都不可用时返回 None。
    pub async fn load_latest(&self, width: usize, height: usize) -> Option<Grid> {
        let candidates = self.list().await;
        for meta in candidates.iter().rev() {
            match self.load(&meta.id).await {
                Ok(grid) if grid.dimensions() == (width, height) => {
                    info!("Restoring canvas from snapshot {}", meta.id);
                    return Some(grid);
                }
                Ok(grid) => {
                    let err = SnapshotError::DimensionMismatch {
                        id: meta.id.clone(),
                        expected: (width, height),
                        found: grid.dimensions(),
                    };
                    warn!("Skipping snapshot: {}", err);
                }
                Err(e) => warn!("Skipping snapshot: {}", e),
            }
        }
        None
    }
}

/// 新快照总是排在索引末尾
///
/// 时钟回拨时沿用最新快照的时间戳并递增序号，顺序始终等于创建顺序。
fn next_meta(newest: Option<&SnapshotMeta>, timestamp: DateTime<Utc>) -> SnapshotMeta {
    let created_at = timestamp.trunc_subsecs(3);
    match newest {
        Some(newest) if created_at <= newest.created_at => {
            if created_at < newest.created_at {
                warn!(
                    "Clock is behind newest snapshot {}, keeping its timestamp",
                    newest.id
                );
            }
            SnapshotMeta::new(newest.created_at, newest.seq + 1)
        }
        _ => SnapshotMeta::new(created_at, 0),
    }
}

async fn write_new(path: &Path, body: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(body).await?;
    file.sync_all().await
}
