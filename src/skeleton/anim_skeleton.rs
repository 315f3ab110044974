//! 运行时骨骼实例
//!
//! 每次 `update(time)`：
//! 1. 重算实例整体偏移变换
//! 2. 对每根骨骼向控制器查询 6 个通道并暂存（根骨骼叠加偏移位置）
//! 3. 全部暂存完成后，从根骨骼开始一次递归提交
//!
//! 第 2 步是提交屏障：查询任意骨骼的通道时不会看到本帧更新了一半的其它骨骼。

use std::fmt;
use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::animation::{ChannelId, MotionController};
use crate::config::get_config;
use crate::{MocapError, Result};

use super::anim_bone::AnimBone;
use super::{compose_rotations, Axis, BoneId, Dof, SkeletonDefinition, DOF_COUNT};

// ============================================================================
// 对外类型
// ============================================================================

/// 按 id 或名称引用骨骼
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoneKey<'a> {
    Id(BoneId),
    Name(&'a str),
}

impl From<BoneId> for BoneKey<'_> {
    fn from(id: BoneId) -> Self {
        BoneKey::Id(id)
    }
}

impl<'a> From<&'a str> for BoneKey<'a> {
    fn from(name: &'a str) -> Self {
        BoneKey::Name(name)
    }
}

impl fmt::Display for BoneKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoneKey::Id(id) => write!(f, "#{}", id),
            BoneKey::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// 渲染层接收每根骨骼端点的接口
pub trait RenderSink {
    fn bone_segment(&mut self, id: BoneId, name: &str, start: Vec3, end: Vec3);
}

/// 每帧每根骨骼的世界终点位置
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PositionMatrix {
    /// 骨骼数量
    pub bone_count: usize,
    /// 帧率（来自动作序列）
    pub frame_rate: f32,
    /// 帧主序：`positions[frame * bone_count + bone]`
    pub positions: Vec<Vec3>,
}

impl PositionMatrix {
    #[inline]
    pub fn frame_count(&self) -> usize {
        if self.bone_count == 0 {
            0
        } else {
            self.positions.len() / self.bone_count
        }
    }

    #[inline]
    pub fn get(&self, frame: usize, bone: BoneId) -> Option<Vec3> {
        if bone >= self.bone_count {
            return None;
        }
        self.positions.get(frame * self.bone_count + bone).copied()
    }

    /// 某一帧全部骨骼的位置
    pub fn frame(&self, frame: usize) -> Option<&[Vec3]> {
        let start = frame.checked_mul(self.bone_count)?;
        self.positions.get(start..start + self.bone_count)
    }
}

// ============================================================================
// 骨骼实例
// ============================================================================

/// 运行时骨骼实例
pub struct AnimSkeleton {
    definition: Arc<SkeletonDefinition>,
    bones: Vec<AnimBone>,
    controller: Option<Box<dyn MotionController>>,

    /// 最近一次更新的时间
    sequence_time: f32,

    /// 整体偏移位置
    offset_position: Vec3,
    /// 整体偏移旋转（欧拉角 X, Y, Z，存储单位）
    offset_rotation: Vec3,
    /// 整体世界变换
    world_transform: Mat4,
    /// 已叠加进根骨骼工作位置的偏移（增量数据使用）
    applied_offset: Vec3,
}

impl fmt::Debug for AnimSkeleton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimSkeleton")
            .field("bones", &self.bones.len())
            .field("has_controller", &self.controller.is_some())
            .field("sequence_time", &self.sequence_time)
            .field("offset_position", &self.offset_position)
            .field("offset_rotation", &self.offset_rotation)
            .finish()
    }
}

impl AnimSkeleton {
    /// 由骨骼定义构建实例：每个骨骼 id 一个 AnimBone，连接后预计算静止姿态
    pub fn new(definition: Arc<SkeletonDefinition>) -> Result<Self> {
        definition.validate()?;

        let bones: Vec<AnimBone> = (0..definition.bone_count())
            .map(|id| {
                AnimBone::new(
                    id,
                    definition.parent_bone_id(id),
                    definition.children_of(id).to_vec(),
                )
            })
            .collect();

        let mut skeleton = Self {
            definition,
            bones,
            controller: None,
            sequence_time: 0.0,
            offset_position: Vec3::ZERO,
            offset_rotation: Vec3::ZERO,
            world_transform: Mat4::IDENTITY,
            applied_offset: Vec3::ZERO,
        };
        AnimBone::precalc_recursive(&mut skeleton.bones, &skeleton.definition, 0);

        log::info!("骨骼实例创建: {} 根骨骼", skeleton.bones.len());
        Ok(skeleton)
    }

    // ========================================
    // 控制器
    // ========================================

    /// 挂接控制器，返回之前挂接的控制器
    ///
    /// 增量控制器从零姿态开始累加，挂接时清除工作姿态。
    pub fn attach_controller(
        &mut self,
        mut controller: Box<dyn MotionController>,
    ) -> Option<Box<dyn MotionController>> {
        controller.bind(&self.definition);
        if controller.is_delta() {
            self.clear_working_pose();
        }
        self.controller.replace(controller)
    }

    pub fn detach_controller(&mut self) -> Option<Box<dyn MotionController>> {
        self.controller.take()
    }

    pub fn controller(&self) -> Option<&dyn MotionController> {
        self.controller.as_deref()
    }

    pub fn controller_mut(&mut self) -> Option<&mut (dyn MotionController + 'static)> {
        self.controller.as_deref_mut()
    }

    // ========================================
    // 偏移
    // ========================================

    pub fn set_offset_position(&mut self, position: Vec3) {
        self.offset_position = position;
    }

    pub fn set_offset_rotation(&mut self, rotation: Vec3) {
        self.offset_rotation = rotation;
    }

    #[inline]
    pub fn offset_position(&self) -> Vec3 {
        self.offset_position
    }

    #[inline]
    pub fn offset_rotation(&self) -> Vec3 {
        self.offset_rotation
    }

    /// 实例整体变换：绕偏移位置旋转
    ///
    /// 根骨骼的平移已叠加偏移位置，所以这里是 `T(p) * R * T(-p)`，
    /// 根骨骼最终位于 `p + R * motion`。
    fn compute_offset_transform(&self) -> Mat4 {
        let config = get_config();
        let rotation = compose_rotations([
            (Axis::X, config.to_radians(self.offset_rotation.x)),
            (Axis::Y, config.to_radians(self.offset_rotation.y)),
            (Axis::Z, config.to_radians(self.offset_rotation.z)),
        ]);
        Mat4::from_translation(self.offset_position)
            * rotation
            * Mat4::from_translation(-self.offset_position)
    }

    // ========================================
    // 每帧更新
    // ========================================

    /// 以 `time` 驱动一帧
    pub fn update(&mut self, time: f32) -> Result<()> {
        let world_transform = self.compute_offset_transform();
        let Some(controller) = self.controller.as_deref_mut() else {
            log::warn!("骨骼实例在未挂接控制器时被更新 (t = {})", time);
            return Err(MocapError::NoController(format!(
                "update({}) called on a skeleton with {} bones",
                time,
                self.bones.len()
            )));
        };

        self.world_transform = world_transform;
        self.sequence_time = time;

        // 阶段 1：全部暂存
        let is_delta = controller.is_delta();
        for bone in &mut self.bones {
            let mut values = [0.0f32; DOF_COUNT];
            for dof in Dof::ALL {
                let channel = ChannelId::from_dof(bone.id, dof);
                if controller.is_valid_channel(channel, time) {
                    values[dof.index()] = controller.get_value(channel, time);
                }
            }

            let mut position = Vec3::new(values[0], values[1], values[2]);
            let angles = Vec3::new(values[3], values[4], values[5]);
            if bone.is_root() {
                // 增量数据只叠加偏移位置的变化量
                if is_delta {
                    position += self.offset_position - self.applied_offset;
                } else {
                    position += self.offset_position;
                }
                self.applied_offset = self.offset_position;
            }
            bone.set_pose(position, angles, is_delta);
        }

        // 阶段 2：一次提交
        AnimBone::update_recursive(&mut self.bones, &self.definition, 0, &self.world_transform);

        if get_config().debug_log {
            log::debug!(
                "t = {:.4}: 根骨骼 {:?} -> {:?}",
                time,
                self.bones[0].start_position(),
                self.bones[0].end_position()
            );
        }
        Ok(())
    }

    // ========================================
    // 缩放
    // ========================================

    /// 缩放全部骨骼长度
    pub fn rescale(&mut self, factor: f32) {
        for bone in &mut self.bones {
            bone.length_scale = factor;
        }
        AnimBone::precalc_recursive(&mut self.bones, &self.definition, 0);
    }

    /// 缩放单根骨骼长度，从该骨骼向下重新预计算
    pub fn rescale_bone(&mut self, id: BoneId, factor: f32) -> Result<()> {
        let bone = self
            .bones
            .get_mut(id)
            .ok_or_else(|| MocapError::UnknownBone(BoneKey::Id(id).to_string()))?;
        bone.length_scale = factor;
        AnimBone::precalc_recursive(&mut self.bones, &self.definition, id);
        Ok(())
    }

    // ========================================
    // 查询
    // ========================================

    #[inline]
    pub fn definition(&self) -> &Arc<SkeletonDefinition> {
        &self.definition
    }

    #[inline]
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    pub fn bone(&self, id: BoneId) -> Option<&AnimBone> {
        self.bones.get(id)
    }

    #[inline]
    pub fn sequence_time(&self) -> f32 {
        self.sequence_time
    }

    #[inline]
    pub fn world_transform(&self) -> Mat4 {
        self.world_transform
    }

    fn resolve(&self, key: BoneKey<'_>) -> Result<BoneId> {
        let id = match key {
            BoneKey::Id(id) => Some(id).filter(|&id| id < self.bones.len()),
            BoneKey::Name(name) => self.definition.bone_id_from_name(name),
        };
        id.ok_or_else(|| MocapError::UnknownBone(key.to_string()))
    }

    /// 骨骼当前的世界起点与终点
    pub fn bone_positions<'a>(&self, key: impl Into<BoneKey<'a>>) -> Result<(Vec3, Vec3)> {
        let id = self.resolve(key.into())?;
        let bone = &self.bones[id];
        Ok((bone.start_position(), bone.end_position()))
    }

    /// 骨骼当前的通道值；未知骨骼返回 0.0
    pub fn channel_value(&self, channel: ChannelId) -> f32 {
        self.bones
            .get(channel.bone)
            .map_or(0.0, |bone| bone.channel_value(channel.kind))
    }

    /// 把每根骨骼的端点交给渲染层
    pub fn construct_render_object(&self, sink: &mut dyn RenderSink) {
        for bone in &self.bones {
            let name = self.definition.bone_name_from_id(bone.id).unwrap_or_default();
            sink.bone_segment(bone.id, name, bone.start_position(), bone.end_position());
        }
    }

    /// 逐帧播放控制器的动作序列，导出每根骨骼的终点位置
    ///
    /// 增量序列先复位工作姿态，从第 0 帧开始累加。
    pub fn build_position_matrix(&mut self) -> Result<PositionMatrix> {
        let controller = self.controller.as_deref().ok_or_else(|| {
            MocapError::NoController("build_position_matrix needs a controller".to_string())
        })?;
        let sequence = controller.sequence().ok_or(MocapError::NoSequence)?;
        let frame_count = sequence.frame_count();
        let frame_rate = sequence.frame_rate();
        if controller.is_delta() {
            self.reset_pose();
        }

        let mut matrix = PositionMatrix {
            bone_count: self.bones.len(),
            frame_rate,
            positions: Vec::with_capacity(frame_count * self.bones.len()),
        };
        for frame in 0..frame_count {
            // 取帧中点，避免浮点误差落到前一帧
            let time = (frame as f32 + 0.5) / frame_rate;
            self.update(time)?;
            matrix.positions.extend(self.bones.iter().map(AnimBone::end_position));
        }

        log::debug!(
            "位置矩阵导出: {} 帧 x {} 根骨骼",
            frame_count,
            matrix.bone_count
        );
        Ok(matrix)
    }

    /// 清除全部骨骼的工作姿态，控制器同步回到起点
    pub fn reset_pose(&mut self) {
        self.clear_working_pose();
        if let Some(controller) = self.controller.as_deref_mut() {
            controller.rewind();
        }
    }

    fn clear_working_pose(&mut self) {
        for bone in &mut self.bones {
            bone.reset_pose();
        }
        self.applied_offset = Vec3::ZERO;
    }
}
