//! 动作控制器接口
//!
//! 控制器把 (通道, 世界时间) 映射为标量值。两个查询都显式接收时间，
//! 因为更高层的控制器（混合、过渡等）会随时间改变有效通道集合。

use std::collections::BTreeMap;

use crate::skeleton::SkeletonDefinition;

use super::channel::ChannelId;
use super::motion_sequence::MotionSequence;

/// 动作控制器 trait
pub trait MotionController {
    /// 该通道在 `time` 时刻是否有数据
    fn is_valid_channel(&self, channel: ChannelId, time: f32) -> bool;

    /// 读取通道值；无效通道返回 0.0
    fn get_value(&mut self, channel: ChannelId, time: f32) -> f32;

    /// 返回的数据是否为逐帧增量
    fn is_delta(&self) -> bool {
        false
    }

    /// 底层动作序列（若有）
    fn sequence(&self) -> Option<&MotionSequence> {
        None
    }

    /// 挂接到骨骼实例时调用
    fn bind(&mut self, _definition: &SkeletonDefinition) {}

    /// 骨骼实例的工作姿态被清除时调用，增量控制器从第 0 帧重新累加
    fn rewind(&mut self) {}
}

/// 静态姿态控制器
///
/// 只有显式设置过的通道有效，与时间无关。用于手动摆姿态。
#[derive(Clone, Debug, Default)]
pub struct PoseController {
    values: BTreeMap<ChannelId, f32>,
}

impl PoseController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, channel: ChannelId, value: f32) {
        self.values.insert(channel, value);
    }

    pub fn with(mut self, channel: ChannelId, value: f32) -> Self {
        self.set(channel, value);
        self
    }

    pub fn clear(&mut self, channel: ChannelId) {
        self.values.remove(&channel);
    }
}

impl MotionController for PoseController {
    fn is_valid_channel(&self, channel: ChannelId, _time: f32) -> bool {
        self.values.contains_key(&channel)
    }

    fn get_value(&mut self, channel: ChannelId, _time: f32) -> f32 {
        self.values.get(&channel).copied().unwrap_or(0.0)
    }
}
