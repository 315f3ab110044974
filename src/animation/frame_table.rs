//! 帧数据表 - 行为帧、列为通道的二维浮点数组
//!
//! 所有越界访问都以错误返回，动作序列本身不做下标检查。

use crate::{MocapError, Result};

/// 帧主序二维数据表
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameTable {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl FrameTable {
    /// 创建全零数据表
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// 由逐帧数据构建，各行长度必须一致
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
            return Err(MocapError::LayoutMismatch(format!(
                "row {} has {} values, expected {}",
                index,
                row.len(),
                cols
            )));
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    fn offset(&self, row: usize, col: usize) -> Result<usize> {
        if row >= self.rows {
            return Err(MocapError::FrameOutOfRange {
                frame: row,
                frame_count: self.rows,
            });
        }
        if col >= self.cols {
            return Err(MocapError::ColumnOutOfRange {
                column: col,
                column_count: self.cols,
            });
        }
        Ok(row * self.cols + col)
    }

    pub fn get(&self, row: usize, col: usize) -> Result<f32> {
        let offset = self.offset(row, col)?;
        Ok(self.data[offset])
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) -> Result<()> {
        let offset = self.offset(row, col)?;
        self.data[offset] = value;
        Ok(())
    }

    pub fn row(&self, row: usize) -> Result<&[f32]> {
        if row >= self.rows {
            return Err(MocapError::FrameOutOfRange {
                frame: row,
                frame_count: self.rows,
            });
        }
        let start = row * self.cols;
        Ok(&self.data[start..start + self.cols])
    }

    pub fn row_mut(&mut self, row: usize) -> Result<&mut [f32]> {
        if row >= self.rows {
            return Err(MocapError::FrameOutOfRange {
                frame: row,
                frame_count: self.rows,
            });
        }
        let start = row * self.cols;
        Ok(&mut self.data[start..start + self.cols])
    }

    /// 调整尺寸，保留重叠区域的数据，新单元填零
    pub fn resize(&mut self, rows: usize, cols: usize) {
        if cols == self.cols {
            self.data.resize(rows * cols, 0.0);
            self.rows = rows;
            return;
        }
        let mut data = vec![0.0; rows * cols];
        let keep_cols = cols.min(self.cols);
        for row in 0..rows.min(self.rows) {
            let src = row * self.cols;
            let dst = row * cols;
            data[dst..dst + keep_cols].copy_from_slice(&self.data[src..src + keep_cols]);
        }
        self.rows = rows;
        self.cols = cols;
        self.data = data;
    }

    /// 对某一列的全部值应用变换
    pub fn map_column(&mut self, col: usize, mut f: impl FnMut(f32) -> f32) -> Result<()> {
        if col >= self.cols {
            return Err(MocapError::ColumnOutOfRange {
                column: col,
                column_count: self.cols,
            });
        }
        for value in self.data.iter_mut().skip(col).step_by(self.cols) {
            *value = f(*value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_errors() {
        let mut table = FrameTable::new(2, 3);
        assert_eq!(table.get(1, 2), Ok(0.0));
        assert_eq!(
            table.get(2, 0),
            Err(MocapError::FrameOutOfRange { frame: 2, frame_count: 2 })
        );
        assert_eq!(
            table.set(0, 3, 1.0),
            Err(MocapError::ColumnOutOfRange { column: 3, column_count: 3 })
        );
        assert!(table.row(5).is_err());
    }

    #[test]
    fn test_resize_keeps_overlap() {
        let mut table = FrameTable::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        table.resize(3, 3);
        assert_eq!(table.row(0).unwrap(), &[1.0, 2.0, 0.0]);
        assert_eq!(table.row(1).unwrap(), &[3.0, 4.0, 0.0]);
        assert_eq!(table.row(2).unwrap(), &[0.0, 0.0, 0.0]);

        table.resize(1, 1);
        assert_eq!(table.row(0).unwrap(), &[1.0]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = FrameTable::from_rows(vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(result, Err(MocapError::LayoutMismatch(_))));
    }

    #[test]
    fn test_map_column() {
        let mut table = FrameTable::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        table.map_column(1, |v| v * 10.0).unwrap();
        assert_eq!(table.row(0).unwrap(), &[1.0, 20.0]);
        assert_eq!(table.row(1).unwrap(), &[3.0, 40.0]);
        assert!(table.map_column(2, |v| v).is_err());
    }
}
