//! 动作序列控制器
//!
//! 将世界时间换算为序列内帧号（超出时长后循环），再把通道查询转发给序列。
//! 可选的根偏移校正：以指定起始帧的根平移与朝向构造校正变换，
//! 使片段从原点、朝向不变处开始播放。校正结果按帧缓存。
//!
//! 增量序列按通道记录播放头：同一帧重复采样不再叠加，跳帧时叠加跳过的全部增量，
//! 循环回绕时返回回到目标帧绝对值所需的差值。

use std::cmp::Ordering;
use std::collections::HashMap;

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::config::get_config;
use crate::skeleton::{
    compose_rotations, Axis, AxisOrder, BoneId, Dof, SkeletonDefinition, DEFAULT_AXIS_ORDER,
    DOF_COUNT,
};

use super::channel::ChannelId;
use super::controller::MotionController;
use super::motion_sequence::MotionSequence;

/// 根偏移校正（由起始帧推导）
#[derive(Clone, Copy, Debug)]
struct RootCorrection {
    /// 水平平移归零 + 绕 Y 轴消除起始朝向
    transform: Mat4,
    /// 绕 Y 轴消除起始朝向的旋转，左乘到根旋转上
    heading: Quat,
}

/// 按帧缓存校正后的根通道值
///
/// 任何重新配置都通过 `invalidate` 递增代数并清空缓存。
#[derive(Clone, Debug, Default)]
struct RootOffsetCache {
    generation: u64,
    correction: Option<RootCorrection>,
    frames: HashMap<usize, [f32; DOF_COUNT]>,
}

impl RootOffsetCache {
    fn invalidate(&mut self) {
        self.generation += 1;
        self.correction = None;
        self.frames.clear();
    }
}

#[inline]
fn rotation_dof(axis: Axis) -> Dof {
    match axis {
        Axis::X => Dof::RotateX,
        Axis::Y => Dof::RotateY,
        Axis::Z => Dof::RotateZ,
    }
}

/// 通道顺序对应的欧拉分解：先应用的轴在最内层
fn euler_rot(order: AxisOrder) -> EulerRot {
    match order {
        [Axis::X, Axis::Y, Axis::Z] => EulerRot::ZYX,
        [Axis::X, Axis::Z, Axis::Y] => EulerRot::YZX,
        [Axis::Y, Axis::X, Axis::Z] => EulerRot::ZXY,
        [Axis::Y, Axis::Z, Axis::X] => EulerRot::XZY,
        [Axis::Z, Axis::X, Axis::Y] => EulerRot::YXZ,
        [Axis::Z, Axis::Y, Axis::X] => EulerRot::XYZ,
        _ => EulerRot::ZYX,
    }
}

/// 动作序列控制器
#[derive(Clone, Debug)]
pub struct MotionSequenceController {
    sequence: MotionSequence,
    /// 播放速度倍率
    time_scale: f32,
    /// 根偏移校正的起始帧，`None` 为关闭
    root_offset_frame: Option<usize>,
    /// 根骨骼旋转通道的应用顺序（补全为三轴）
    root_order: AxisOrder,
    cache: RootOffsetCache,
    /// 增量序列：每个通道上次输出到的帧
    playhead: HashMap<ChannelId, usize>,
}

impl MotionSequenceController {
    /// 根骨骼 id
    const ROOT: BoneId = 0;

    pub fn new(sequence: MotionSequence) -> Self {
        Self {
            sequence,
            time_scale: 1.0,
            root_offset_frame: None,
            root_order: DEFAULT_AXIS_ORDER,
            cache: RootOffsetCache::default(),
            playhead: HashMap::new(),
        }
    }

    // ========================================
    // 序列管理
    // ========================================

    #[inline]
    pub fn sequence(&self) -> &MotionSequence {
        &self.sequence
    }

    /// 可变访问序列（缓存与播放头随之失效）
    pub fn sequence_mut(&mut self) -> &mut MotionSequence {
        self.cache.invalidate();
        self.playhead.clear();
        &mut self.sequence
    }

    pub fn set_sequence(&mut self, sequence: MotionSequence) -> MotionSequence {
        self.cache.invalidate();
        self.playhead.clear();
        std::mem::replace(&mut self.sequence, sequence)
    }

    pub fn into_sequence(self) -> MotionSequence {
        self.sequence
    }

    #[inline]
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    pub fn set_time_scale(&mut self, time_scale: f32) {
        self.time_scale = time_scale;
    }

    // ========================================
    // 时间 -> 帧
    // ========================================

    /// 世界时间对应的帧号，超出范围时循环；空序列返回 `None`
    pub fn time_to_frame(&self, time: f32) -> Option<usize> {
        let frame_count = self.sequence.frame_count();
        if frame_count == 0 {
            return None;
        }
        let frame = (time * self.time_scale * self.sequence.frame_rate()).floor();
        if !frame.is_finite() {
            return None;
        }
        Some((frame as i64).rem_euclid(frame_count as i64) as usize)
    }

    /// 增量通道从上次输出的帧到 `frame` 的累计变化
    fn delta_since_playhead(&mut self, channel: ChannelId, frame: usize) -> f32 {
        let previous = self.playhead.insert(channel, frame);
        let sequence = &self.sequence;
        let sum = |first: usize, last: usize| -> f32 {
            (first..=last)
                .map(|f| sequence.get_value(channel, f).unwrap_or_default())
                .sum()
        };
        match previous {
            None => sum(0, frame),
            Some(last) => match frame.cmp(&last) {
                Ordering::Greater => sum(last + 1, frame),
                // 回绕：撤销 frame 之后已叠加的增量
                Ordering::Less => -sum(frame + 1, last),
                Ordering::Equal => 0.0,
            },
        }
    }

    // ========================================
    // 根偏移校正
    // ========================================

    /// 以 `start_frame` 为基准启用根偏移校正
    pub fn enable_root_offset(&mut self, start_frame: usize) {
        if self.sequence.is_delta() {
            log::warn!(
                "序列 '{}' 为增量数据，根偏移校正仅作用于绝对数据",
                self.sequence.id
            );
        }
        self.root_offset_frame = Some(start_frame);
        self.cache.invalidate();
    }

    pub fn disable_root_offset(&mut self) {
        self.root_offset_frame = None;
        self.cache.invalidate();
    }

    #[inline]
    pub fn root_offset_frame(&self) -> Option<usize> {
        self.root_offset_frame
    }

    /// 设置根骨骼旋转通道的应用顺序；缺少的轴按 X, Y, Z 补在外层
    pub fn set_root_rotation_order<I>(&mut self, axes: I)
    where
        I: IntoIterator<Item = Axis>,
    {
        let mut order = DEFAULT_AXIS_ORDER;
        let mut filled = 0;
        for axis in axes.into_iter().chain(DEFAULT_AXIS_ORDER) {
            if filled < order.len() && !order[..filled].contains(&axis) {
                order[filled] = axis;
                filled += 1;
            }
        }
        self.root_order = order;
        self.cache.invalidate();
    }

    #[inline]
    pub fn root_rotation_order(&self) -> AxisOrder {
        self.root_order
    }

    /// 缓存代数（每次重新配置递增）
    #[inline]
    pub fn cache_generation(&self) -> u64 {
        self.cache.generation
    }

    /// 已缓存的帧数
    #[inline]
    pub fn cached_frame_count(&self) -> usize {
        self.cache.frames.len()
    }

    fn raw_root_values(&self, frame: usize) -> [f32; DOF_COUNT] {
        let mut values = [0.0; DOF_COUNT];
        for dof in Dof::ALL {
            let channel = ChannelId::from_dof(Self::ROOT, dof);
            values[dof.index()] = self.sequence.get_value(channel, frame).unwrap_or_default();
        }
        values
    }

    fn correction(&mut self, start_frame: usize) -> RootCorrection {
        if let Some(correction) = self.cache.correction {
            return correction;
        }
        let start = start_frame.min(self.sequence.frame_count().saturating_sub(1));
        let values = self.raw_root_values(start);
        let yaw = get_config().to_radians(values[Dof::RotateY.index()]);
        let offset = Vec3::new(values[Dof::TranslateX.index()], 0.0, values[Dof::TranslateZ.index()]);

        let heading = Quat::from_rotation_y(-yaw);
        let correction = RootCorrection {
            transform: Mat4::from_quat(heading) * Mat4::from_translation(-offset),
            heading,
        };
        self.cache.correction = Some(correction);
        correction
    }

    fn corrected_root_values(&mut self, frame: usize, start_frame: usize) -> [f32; DOF_COUNT] {
        if let Some(values) = self.cache.frames.get(&frame) {
            return *values;
        }

        let correction = self.correction(start_frame);
        let mut values = self.raw_root_values(frame);
        let position = Vec3::new(
            values[Dof::TranslateX.index()],
            values[Dof::TranslateY.index()],
            values[Dof::TranslateZ.index()],
        );
        let corrected = correction.transform.transform_point3(position);
        values[Dof::TranslateX.index()] = corrected.x;
        values[Dof::TranslateY.index()] = corrected.y;
        values[Dof::TranslateZ.index()] = corrected.z;

        // 旋转：Ry(-yaw) * M，再按同一通道顺序分解回欧拉角
        let config = get_config();
        let order = self.root_order;
        let rotation = compose_rotations(
            order
                .iter()
                .map(|&axis| (axis, config.to_radians(values[rotation_dof(axis).index()]))),
        );
        let rotation = correction.heading * Quat::from_mat4(&rotation);
        let (outer, middle, inner) = rotation.normalize().to_euler(euler_rot(order));
        for (axis, radians) in [(order[2], outer), (order[1], middle), (order[0], inner)] {
            values[rotation_dof(axis).index()] = config.angle_from_radians(radians);
        }

        self.cache.frames.insert(frame, values);
        values
    }
}

impl MotionController for MotionSequenceController {
    fn is_valid_channel(&self, channel: ChannelId, time: f32) -> bool {
        self.time_to_frame(time).is_some() && self.sequence.has_channel(channel)
    }

    fn get_value(&mut self, channel: ChannelId, time: f32) -> f32 {
        let Some(frame) = self.time_to_frame(time) else {
            return 0.0;
        };

        if self.sequence.is_delta() {
            return self.delta_since_playhead(channel, frame);
        }

        if let Some(start_frame) = self.root_offset_frame {
            if channel.bone == Self::ROOT && self.sequence.has_channel(channel) {
                if let Some(dof) = channel.kind.dof() {
                    return self.corrected_root_values(frame, start_frame)[dof.index()];
                }
            }
        }

        self.sequence.get_value(channel, frame).unwrap_or_default()
    }

    fn is_delta(&self) -> bool {
        self.sequence.is_delta()
    }

    fn sequence(&self) -> Option<&MotionSequence> {
        Some(&self.sequence)
    }

    fn bind(&mut self, definition: &SkeletonDefinition) {
        if let Some(root) = definition.bone_description(Self::ROOT) {
            let axes: Vec<Axis> = root
                .active_dofs()
                .filter(|dof| dof.is_rotation())
                .map(Dof::axis)
                .collect();
            self.set_root_rotation_order(axes);
        }
    }

    fn rewind(&mut self) {
        self.playhead.clear();
    }
}
