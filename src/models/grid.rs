use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use thiserror::Error;

use super::color::Color;

/// 画布某一时刻的完整只读副本，行优先存储
///
/// 序列化为嵌套数组 `grid[y][x]`，与 `GET /canvas` 和快照文件格式一致。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Color>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("grid has no rows")]
    Empty,
    #[error("row {row} has {found} cells, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("cell buffer holds {found} cells, expected {expected}")]
    Size { expected: usize, found: usize },
}

impl Grid {
    /// 全白网格
    pub fn filled(width: usize, height: usize, color: Color) -> Self {
        Self {
            width,
            height,
            cells: vec![color; width * height],
        }
    }

    pub(crate) fn from_cells(
        width: usize,
        height: usize,
        cells: Vec<Color>,
    ) -> Result<Self, GridError> {
        if cells.len() != width * height {
            return Err(GridError::Size {
                expected: width * height,
                found: cells.len(),
            });
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// 从嵌套数组构造，所有行必须等长
    pub fn from_rows(rows: Vec<Vec<Color>>) -> Result<Self, GridError> {
        let height = rows.len();
        let width = rows.first().map(Vec::len).ok_or(GridError::Empty)?;
        if width == 0 {
            return Err(GridError::Empty);
        }

        let mut cells = Vec::with_capacity(width * height);
        for (row, cols) in rows.into_iter().enumerate() {
            if cols.len() != width {
                return Err(GridError::Ragged {
                    row,
                    expected: width,
                    found: cols.len(),
                });
            }
            cells.extend(cols);
        }

        Ok(Self {
            width,
            height,
            cells,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(y * self.width + x).copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Color]> {
        self.cells.chunks(self.width.max(1))
    }

    pub(crate) fn into_cells(self) -> Vec<Color> {
        self.cells
    }
}

impl Serialize for Grid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.height))?;
        for row in self.rows() {
            seq.serialize_element(row)?;
        }
        seq.end()
    }
}
