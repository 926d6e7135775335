use std::sync::{PoisonError, RwLock};

use thiserror::Error;

use crate::models::{Color, Grid};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CanvasError {
    #[error("({x}, {y}) is outside the {width}x{height} canvas")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    #[error("canvas lock poisoned")]
    Poisoned,
}

/// 共享画布，尺寸在构造后不变
///
/// 所有格子放在一把读写锁后面：写入独占，`get_all` 在读锁下整体复制，
/// 因此读到的副本不会混有某次写入前后的两种状态。
#[derive(Debug)]
pub struct Canvas {
    width: usize,
    height: usize,
    cells: RwLock<Vec<Color>>,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self::from_grid(Grid::filled(width, height, Color::WHITE))
    }

    /// 用已恢复的快照作为初始内容
    pub fn from_grid(grid: Grid) -> Self {
        let (width, height) = grid.dimensions();
        Self {
            width,
            height,
            cells: RwLock::new(grid.into_cells()),
        }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn get_all(&self) -> Grid {
        // 写操作只替换单个格子，锁中毒时数据结构仍然完整
        let cells = self.cells.read().unwrap_or_else(PoisonError::into_inner);
        Grid::from_cells(self.width, self.height, cells.clone())
            .unwrap_or_else(|_| Grid::filled(self.width, self.height, Color::WHITE))
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let cells = self.cells.read().unwrap_or_else(PoisonError::into_inner);
        cells.get(y * self.width + x).copied()
    }

    /// 唯一的修改入口：覆盖一个格子（后写者胜）
    pub fn write(&self, x: usize, y: usize, color: Color) -> Result<(), CanvasError> {
        if x >= self.width || y >= self.height {
            return Err(CanvasError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }

        let mut cells = self.cells.write().map_err(|_| CanvasError::Poisoned)?;
        cells[y * self.width + x] = color;
        Ok(())
    }

    /// 在持有写锁时 panic，让锁进入中毒状态
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.cells.write();
            panic!("writer panicked");
        }));
    }
}
