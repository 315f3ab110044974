//! 动作序列 - 一段动捕片段的原始数据
//!
//! 数据按帧主序存储，列号通过通道索引间接查找：
//! 通道按添加顺序获得列号，每个通道最多占一列。

use std::collections::BTreeMap;

use crate::config::get_config;
use crate::skeleton::{Dof, SkeletonDefinition, DOF_COUNT};
use crate::{MocapError, Result};

use super::channel::ChannelId;
use super::frame_table::FrameTable;

/// 动作序列
#[derive(Clone, Debug)]
pub struct MotionSequence {
    /// 序列标识
    pub id: String,
    /// 说明文字
    pub documentation: String,
    /// 数据来源
    pub source: String,

    /// 通道 -> 列号
    channel_index: BTreeMap<ChannelId, usize>,
    /// 帧数据（行 = 帧，列 = 通道）
    data: FrameTable,

    frame_rate: f32,
    /// 是否为逐帧增量数据
    is_delta: bool,
}

impl Default for MotionSequence {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl MotionSequence {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            documentation: String::new(),
            source: String::new(),
            channel_index: BTreeMap::new(),
            data: FrameTable::default(),
            frame_rate: get_config().default_frame_rate,
            is_delta: false,
        }
    }

    /// 设置帧数（保留已有数据）
    pub fn with_frames(mut self, frame_count: usize) -> Self {
        self.resize_frames(frame_count);
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: f32) -> Self {
        self.set_frame_rate(frame_rate);
        self
    }

    // ========================================
    // 基本属性
    // ========================================

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.data.rows()
    }

    #[inline]
    pub fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    /// 时长（秒）= 帧数 / 帧率
    #[inline]
    pub fn duration(&self) -> f32 {
        if self.frame_rate > 0.0 {
            self.frame_count() as f32 / self.frame_rate
        } else {
            0.0
        }
    }

    /// 设置帧率；非正值被忽略
    pub fn set_frame_rate(&mut self, frame_rate: f32) {
        if frame_rate > 0.0 {
            self.frame_rate = frame_rate;
        } else {
            log::warn!("忽略无效帧率 {} (序列 '{}')", frame_rate, self.id);
        }
    }

    #[inline]
    pub fn is_delta(&self) -> bool {
        self.is_delta
    }

    pub fn resize_frames(&mut self, frame_count: usize) {
        let cols = self.channel_index.len();
        self.data.resize(frame_count, cols);
    }

    // ========================================
    // 通道索引
    // ========================================

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channel_index.len()
    }

    /// 为新通道分配下一列并返回列号；已存在的通道直接返回原列号
    pub fn add_channel(&mut self, channel: ChannelId) -> usize {
        if let Some(&column) = self.channel_index.get(&channel) {
            return column;
        }
        let column = self.channel_index.len();
        self.channel_index.insert(channel, column);
        self.data.resize(self.data.rows(), column + 1);
        column
    }

    #[inline]
    pub fn column_of(&self, channel: ChannelId) -> Option<usize> {
        self.channel_index.get(&channel).copied()
    }

    #[inline]
    pub fn has_channel(&self, channel: ChannelId) -> bool {
        self.channel_index.contains_key(&channel)
    }

    /// 按 (骨骼, 通道类型) 顺序枚举全部通道
    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channel_index.keys().copied()
    }

    /// 按骨骼定义的有效自由度重建通道布局
    ///
    /// 遍历每根骨骼的六个自由度（按索引顺序），为每个有效自由度添加一个通道。
    /// 先清空索引再调整数据表，旧的列号不会残留；数据全部清零。
    pub fn build_channels_from_skeleton(&mut self, def: &SkeletonDefinition) {
        let frame_count = self.frame_count();
        self.channel_index.clear();
        self.data = FrameTable::default();

        for bone in 0..def.bone_count() {
            for dof in Dof::ALL {
                if def.is_active_dof(bone, dof) {
                    let column = self.channel_index.len();
                    self.channel_index.insert(ChannelId::from_dof(bone, dof), column);
                }
            }
        }

        self.data = FrameTable::new(frame_count, self.channel_index.len());
        log::debug!(
            "序列 '{}' 通道布局: {} 根骨骼 -> {} 列",
            self.id,
            def.bone_count(),
            self.channel_index.len()
        );
    }

    // ========================================
    // 数据访问
    // ========================================

    /// 读取通道值
    ///
    /// 通道不在索引中时返回 0.0；帧越界由数据表报错。
    pub fn get_value(&self, channel: ChannelId, frame: usize) -> Result<f32> {
        match self.column_of(channel) {
            Some(column) => self.data.get(frame, column),
            None => {
                log::trace!("序列 '{}' 无通道 {}，按 0.0 处理", self.id, channel);
                Ok(0.0)
            }
        }
    }

    /// 写入通道值；通道不在索引中时不做任何修改
    pub fn set_value(&mut self, channel: ChannelId, frame: usize, value: f32) -> Result<()> {
        match self.column_of(channel) {
            Some(column) => self.data.set(frame, column, value),
            None => {
                log::trace!("序列 '{}' 无通道 {}，忽略写入", self.id, channel);
                Ok(())
            }
        }
    }

    /// 某一帧全部列的原始值（按列号排列）
    pub fn frame_values(&self, frame: usize) -> Result<&[f32]> {
        self.data.row(frame)
    }

    // ========================================
    // 数据转换
    // ========================================

    /// 以 `source` 重建为增量序列
    ///
    /// 第 0 帧与源相同（绝对值），之后每帧 = source[f] - source[f-1]。
    pub fn compute_deltas(&mut self, source: &MotionSequence) -> Result<()> {
        if source.frame_count() == 0 {
            return Err(MocapError::LayoutMismatch(format!(
                "cannot compute deltas of empty sequence '{}'",
                source.id
            )));
        }

        self.channel_index = source.channel_index.clone();
        self.data = FrameTable::new(source.frame_count(), source.channel_count());
        self.frame_rate = source.frame_rate;
        self.documentation = source.documentation.clone();
        self.source = source.source.clone();

        self.data.row_mut(0)?.copy_from_slice(source.data.row(0)?);
        for frame in 1..source.frame_count() {
            let prev = source.data.row(frame - 1)?;
            let curr = source.data.row(frame)?;
            for (dst, (c, p)) in self.data.row_mut(frame)?.iter_mut().zip(curr.iter().zip(prev)) {
                *dst = c - p;
            }
        }

        self.is_delta = true;
        Ok(())
    }

    /// 将增量序列累加为绝对序列
    pub fn integrate_deltas(&self) -> Result<MotionSequence> {
        let mut out = self.clone_layout(self.frame_count());
        let mut running = vec![0.0f32; self.channel_count()];
        for frame in 0..self.frame_count() {
            for (sum, delta) in running.iter_mut().zip(self.data.row(frame)?) {
                *sum += delta;
            }
            out.data.row_mut(frame)?.copy_from_slice(&running);
        }
        out.is_delta = false;
        Ok(out)
    }

    /// 将固定布局的原始表（每根骨骼连续 6 列，不论自由度是否有效）
    /// 重新打包为只含有效自由度的紧凑布局，同时重建通道索引
    pub fn convert_data(&mut self, raw: &FrameTable, def: &SkeletonDefinition) -> Result<()> {
        let expected = def.bone_count() * DOF_COUNT;
        if raw.cols() != expected {
            return Err(MocapError::LayoutMismatch(format!(
                "raw table has {} columns, skeleton needs {} ({} bones x {})",
                raw.cols(),
                expected,
                def.bone_count(),
                DOF_COUNT
            )));
        }

        self.resize_frames(raw.rows());
        self.build_channels_from_skeleton(def);

        for frame in 0..raw.rows() {
            let src = raw.row(frame)?;
            for (&channel, &column) in &self.channel_index {
                // 通道均由 Dof 生成，必有对应自由度
                if let Some(dof) = channel.kind.dof() {
                    self.data.set(frame, column, src[channel.bone * DOF_COUNT + dof.index()])?;
                }
            }
        }

        self.is_delta = false;
        Ok(())
    }

    /// 截取第 `start..=end` 帧为新序列，通道布局与源序列相同
    pub fn extract_motion_segment(
        &self,
        start: usize,
        end: usize,
        def: &SkeletonDefinition,
    ) -> Result<MotionSequence> {
        if start > end || end >= self.frame_count() {
            return Err(MocapError::InvalidSegment {
                start,
                end,
                frame_count: self.frame_count(),
            });
        }

        let mut segment = self.clone_layout(end - start + 1);
        segment.id = format!("{}[{}..={}]", self.id, start, end);
        for (local, frame) in (start..=end).enumerate() {
            segment.data.row_mut(local)?.copy_from_slice(self.data.row(frame)?);
        }

        let missing = (0..def.bone_count())
            .flat_map(|bone| Dof::ALL.map(|dof| (bone, dof)))
            .filter(|&(bone, dof)| def.is_active_dof(bone, dof))
            .filter(|&(bone, dof)| !segment.has_channel(ChannelId::from_dof(bone, dof)))
            .count();
        if missing > 0 {
            log::debug!("片段 '{}' 缺少骨骼定义中的 {} 个通道", segment.id, missing);
        }
        Ok(segment)
    }

    /// 按比例缩放单个通道；未知通道忽略
    pub fn scale_channel(&mut self, channel: ChannelId, factor: f32) -> Result<()> {
        match self.column_of(channel) {
            Some(column) => self.data.map_column(column, |v| v * factor),
            None => Ok(()),
        }
    }

    /// 按比例缩放全部平移通道（配合骨骼长度缩放使用）
    pub fn scale_translations(&mut self, factor: f32) -> Result<()> {
        let columns: Vec<usize> = self
            .channel_index
            .iter()
            .filter(|(channel, _)| channel.kind.dof().is_some_and(|dof| !dof.is_rotation()))
            .map(|(_, &column)| column)
            .collect();
        for column in columns {
            self.data.map_column(column, |v| v * factor)?;
        }
        Ok(())
    }

    fn clone_layout(&self, frame_count: usize) -> MotionSequence {
        MotionSequence {
            id: self.id.clone(),
            documentation: self.documentation.clone(),
            source: self.source.clone(),
            channel_index: self.channel_index.clone(),
            data: FrameTable::new(frame_count, self.channel_count()),
            frame_rate: self.frame_rate,
            is_delta: self.is_delta,
        }
    }
}
