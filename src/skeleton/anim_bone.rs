//! 运行时骨骼节点 - 前向运动学
//!
//! 每帧分两个阶段，由"待处理输入"标志隔开：
//! 1. `set_pose` 只暂存姿态，不修改任何变换
//! 2. 从根开始自上而下的 `update`：先应用暂存姿态，再重算变换
//!
//! 变换组合：
//! - 根骨骼：`W = S * T(p) * B * M`（S 为骨骼实例的整体偏移变换）
//! - 非根骨骼：`L = C * M * C⁻¹ * T(p) * B`，`W = parent.W * L`
//!
//! 动捕旋转数据定义在骨骼自身的轴坐标系中，用 C 共轭后才回到父骨骼坐标系。
//! 这一顺序不能调换或省略。

use glam::{Mat4, Quat, Vec3};

use crate::animation::ChannelKind;
use crate::config::get_config;

use super::{compose_rotations, BoneDefinition, BoneId, SkeletonDefinition};

// ============================================================================
// 暂存姿态
// ============================================================================

/// 暂存但尚未应用的姿态
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StagedPose {
    /// 平移通道 (tx, ty, tz)
    pub position: Vec3,
    /// 旋转通道 (rx, ry, rz)，存储单位
    pub angles: Vec3,
    /// 是否为相对上一帧的增量
    pub is_delta: bool,
}

// ============================================================================
// 骨骼节点
// ============================================================================

/// 运行时骨骼节点
///
/// 骨骼存放在 AnimSkeleton 的数组中，父子关系以索引表示。
#[derive(Clone, Debug)]
pub struct AnimBone {
    // ========================================
    // 拓扑（构建后不变）
    // ========================================

    /// 骨骼 id（即在 SkeletonDefinition 中的索引）
    pub(crate) id: BoneId,

    /// 父骨骼
    pub(crate) parent: Option<BoneId>,

    /// 子骨骼
    pub(crate) children: Vec<BoneId>,

    /// 长度缩放（修改后需要重新预计算）
    pub(crate) length_scale: f32,

    // ========================================
    // 静止姿态缓存（precalc 计算）
    // ========================================

    /// 局部轴变换 C
    axis_transform: Mat4,

    /// 局部轴逆变换 C⁻¹
    axis_inverse: Mat4,

    /// 相对父骨骼终点的偏移变换 B
    offset_transform: Mat4,

    // ========================================
    // 动态数据（每帧更新）
    // ========================================

    /// 待应用的输入
    pending: Option<StagedPose>,

    /// 当前平移
    position: Vec3,

    /// 当前旋转角（存储单位）
    angles: Vec3,

    /// 本帧旋转 M
    motion_transform: Mat4,

    /// 局部变换
    local_transform: Mat4,

    /// 世界变换
    world_transform: Mat4,

    /// 世界空间起点
    start: Vec3,

    /// 世界空间终点
    end: Vec3,
}

impl AnimBone {
    pub fn new(id: BoneId, parent: Option<BoneId>, children: Vec<BoneId>) -> Self {
        Self {
            id,
            parent,
            children,
            length_scale: 1.0,
            axis_transform: Mat4::IDENTITY,
            axis_inverse: Mat4::IDENTITY,
            offset_transform: Mat4::IDENTITY,
            pending: None,
            position: Vec3::ZERO,
            angles: Vec3::ZERO,
            motion_transform: Mat4::IDENTITY,
            local_transform: Mat4::IDENTITY,
            world_transform: Mat4::IDENTITY,
            start: Vec3::ZERO,
            end: Vec3::ZERO,
        }
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn id(&self) -> BoneId {
        self.id
    }

    #[inline]
    pub fn parent(&self) -> Option<BoneId> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[BoneId] {
        &self.children
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    pub fn length_scale(&self) -> f32 {
        self.length_scale
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    pub fn angles(&self) -> Vec3 {
        self.angles
    }

    #[inline]
    pub fn axis_transform(&self) -> Mat4 {
        self.axis_transform
    }

    #[inline]
    pub fn axis_inverse(&self) -> Mat4 {
        self.axis_inverse
    }

    #[inline]
    pub fn offset_transform(&self) -> Mat4 {
        self.offset_transform
    }

    #[inline]
    pub fn motion_transform(&self) -> Mat4 {
        self.motion_transform
    }

    #[inline]
    pub fn local_transform(&self) -> Mat4 {
        self.local_transform
    }

    #[inline]
    pub fn world_transform(&self) -> Mat4 {
        self.world_transform
    }

    /// 世界空间起点（非根骨骼等于父骨骼终点）
    #[inline]
    pub fn start_position(&self) -> Vec3 {
        self.start
    }

    /// 世界空间终点（世界变换的平移列）
    #[inline]
    pub fn end_position(&self) -> Vec3 {
        self.end
    }

    /// 世界旋转
    #[inline]
    pub fn world_rotation(&self) -> Quat {
        Quat::from_mat4(&self.world_transform).normalize()
    }

    /// 当前通道值：平移/旋转通道为工作值，四元数通道为世界旋转分量
    pub fn channel_value(&self, kind: ChannelKind) -> f32 {
        match kind {
            ChannelKind::TranslateX => self.position.x,
            ChannelKind::TranslateY => self.position.y,
            ChannelKind::TranslateZ => self.position.z,
            ChannelKind::RotateX => self.angles.x,
            ChannelKind::RotateY => self.angles.y,
            ChannelKind::RotateZ => self.angles.z,
            ChannelKind::QuaternionW => self.world_rotation().w,
            ChannelKind::QuaternionX => self.world_rotation().x,
            ChannelKind::QuaternionY => self.world_rotation().y,
            ChannelKind::QuaternionZ => self.world_rotation().z,
        }
    }

    // ========================================
    // 阶段 1：暂存
    // ========================================

    /// 暂存姿态，直到下一次 update 才生效
    #[inline]
    pub fn set_pose(&mut self, position: Vec3, angles: Vec3, is_delta: bool) {
        self.pending = Some(StagedPose {
            position,
            angles,
            is_delta,
        });
    }

    #[inline]
    pub fn has_pending_input(&self) -> bool {
        self.pending.is_some()
    }

    /// 应用暂存姿态：绝对值直接覆盖，增量累加到上一帧
    ///
    /// 返回是否有输入被应用。
    pub fn apply_input_data(&mut self) -> bool {
        let Some(pose) = self.pending.take() else {
            return false;
        };
        if pose.is_delta {
            self.position += pose.position;
            self.angles += pose.angles;
        } else {
            self.position = pose.position;
            self.angles = pose.angles;
        }
        true
    }

    /// 清除工作姿态
    pub fn reset_pose(&mut self) {
        self.pending = None;
        self.position = Vec3::ZERO;
        self.angles = Vec3::ZERO;
    }

    // ========================================
    // 静止姿态预计算
    // ========================================

    /// 由静态描述计算 C、C⁻¹ 与 B
    pub fn precalc_data(&mut self, def: &BoneDefinition) {
        let config = get_config();
        self.axis_transform = compose_rotations(
            def.axis_order
                .iter()
                .map(|&axis| (axis, config.to_radians(def.axis[axis.index()]))),
        );
        self.axis_inverse = self.axis_transform.inverse();
        self.offset_transform = Mat4::from_translation(def.rest_offset() * self.length_scale);
    }

    // ========================================
    // 阶段 2：变换计算
    // ========================================

    /// 按通道顺序组合本帧旋转 M（只应用存在且有效的旋转自由度）
    pub fn compute_rotation_transform(&mut self, def: &BoneDefinition) {
        let config = get_config();
        let angles = self.angles;
        self.motion_transform = compose_rotations(
            def.active_dofs()
                .filter(|dof| dof.is_rotation())
                .map(|dof| (dof.axis(), config.to_radians(angles[dof.axis().index()]))),
        );
    }

    /// 应用输入并重算根骨骼变换
    fn update_root(&mut self, def: &BoneDefinition, skeleton_world: &Mat4) {
        self.apply_input_data();
        self.compute_rotation_transform(def);

        let placed = *skeleton_world * Mat4::from_translation(self.position);
        self.local_transform =
            Mat4::from_translation(self.position) * self.offset_transform * self.motion_transform;
        self.world_transform = placed * self.offset_transform * self.motion_transform;
        self.start = placed.col(3).truncate();
        self.end = self.world_transform.col(3).truncate();
    }

    /// 应用输入并重算非根骨骼变换
    fn update_child(&mut self, def: &BoneDefinition, parent_world: &Mat4, parent_end: Vec3) {
        self.apply_input_data();
        self.compute_rotation_transform(def);

        self.local_transform = self.axis_transform
            * self.motion_transform
            * self.axis_inverse
            * Mat4::from_translation(self.position)
            * self.offset_transform;
        self.world_transform = *parent_world * self.local_transform;
        self.start = parent_end;
        self.end = self.world_transform.col(3).truncate();
    }

    // ========================================
    // 递归遍历
    // ========================================

    /// 从 `idx` 开始递归更新子树（父骨骼先于子骨骼）
    pub(crate) fn update_recursive(
        bones: &mut [AnimBone],
        def: &SkeletonDefinition,
        idx: BoneId,
        skeleton_world: &Mat4,
    ) {
        let Some(bone_def) = def.bone_description(idx) else {
            return;
        };

        match bones[idx].parent {
            Some(parent_idx) => {
                let parent_world = bones[parent_idx].world_transform;
                let parent_end = bones[parent_idx].end;
                bones[idx].update_child(bone_def, &parent_world, parent_end);
            }
            None => bones[idx].update_root(bone_def, skeleton_world),
        }

        for i in 0..bones[idx].children.len() {
            let child_idx = bones[idx].children[i];
            Self::update_recursive(bones, def, child_idx, skeleton_world);
        }
    }

    /// 从 `idx` 开始递归预计算静止姿态
    pub(crate) fn precalc_recursive(bones: &mut [AnimBone], def: &SkeletonDefinition, idx: BoneId) {
        if let Some(bone_def) = def.bone_description(idx) {
            bones[idx].precalc_data(bone_def);
        }
        for i in 0..bones[idx].children.len() {
            let child_idx = bones[idx].children[i];
            Self::precalc_recursive(bones, def, child_idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{Axis, Dof, DofLimit};

    fn child_def() -> BoneDefinition {
        BoneDefinition::new("child")
            .with_length(5.0)
            .with_direction(Vec3::Z)
            .with_dof(Dof::RotateY, DofLimit::default())
    }

    #[test]
    fn test_set_pose_does_not_touch_transforms() {
        let mut bone = AnimBone::new(1, Some(0), Vec::new());
        bone.set_pose(Vec3::ONE, Vec3::new(10.0, 20.0, 30.0), false);
        assert!(bone.has_pending_input());
        assert_eq!(bone.position(), Vec3::ZERO);
        assert_eq!(bone.angles(), Vec3::ZERO);
        assert_eq!(bone.world_transform(), Mat4::IDENTITY);

        assert!(bone.apply_input_data());
        assert!(!bone.has_pending_input());
        assert_eq!(bone.angles(), Vec3::new(10.0, 20.0, 30.0));
        // 第二次没有新输入
        assert!(!bone.apply_input_data());
    }

    #[test]
    fn test_delta_input_accumulates() {
        let mut bone = AnimBone::new(0, None, Vec::new());
        bone.set_pose(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 5.0, 0.0), false);
        bone.apply_input_data();
        bone.set_pose(Vec3::new(0.5, 0.0, 0.0), Vec3::new(0.0, 5.0, 0.0), true);
        bone.apply_input_data();
        assert_eq!(bone.position(), Vec3::new(1.5, 0.0, 0.0));
        assert_eq!(bone.angles(), Vec3::new(0.0, 10.0, 0.0));
    }

    #[test]
    fn test_rotation_follows_channel_order() {
        let mut def = BoneDefinition::new("wrist")
            .with_dof(Dof::RotateX, DofLimit::default())
            .with_dof(Dof::RotateY, DofLimit::default());
        let mut bone = AnimBone::new(0, None, Vec::new());
        bone.set_pose(Vec3::ZERO, Vec3::new(90.0, 90.0, 0.0), false);
        bone.apply_input_data();

        // 顺序 X, Y：M = Ry * Rx
        bone.compute_rotation_transform(&def);
        let xy = Mat4::from_rotation_y(90f32.to_radians()) * Mat4::from_rotation_x(90f32.to_radians());
        assert!(bone.motion_transform().abs_diff_eq(xy, 1e-6));

        // 顺序 Y, X：M = Rx * Ry
        def.set_channel_order(&[Dof::RotateY, Dof::RotateX]);
        bone.compute_rotation_transform(&def);
        let yx = Mat4::from_rotation_x(90f32.to_radians()) * Mat4::from_rotation_y(90f32.to_radians());
        assert!(bone.motion_transform().abs_diff_eq(yx, 1e-6));
        assert!(!xy.abs_diff_eq(yx, 1e-3));
    }

    #[test]
    fn test_precalc_axis_transform() {
        let def = child_def().with_axis(Vec3::new(0.0, 0.0, 90.0), [Axis::X, Axis::Y, Axis::Z]);
        let mut bone = AnimBone::new(1, Some(0), Vec::new());
        bone.precalc_data(&def);

        let c = bone.axis_transform();
        assert!(c.abs_diff_eq(Mat4::from_rotation_z(90f32.to_radians()), 1e-6));
        assert!((c * bone.axis_inverse()).abs_diff_eq(Mat4::IDENTITY, 1e-6));
        assert!(bone
            .offset_transform()
            .col(3)
            .truncate()
            .abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-6));
    }

    #[test]
    fn test_child_update_uses_conjugation() {
        // C = Rz(90°)，动作 ry = 90°，方向 +Z
        let def = child_def().with_axis(Vec3::new(0.0, 0.0, 90.0), [Axis::X, Axis::Y, Axis::Z]);
        let mut bone = AnimBone::new(1, Some(0), Vec::new());
        bone.precalc_data(&def);
        bone.set_pose(Vec3::ZERO, Vec3::new(0.0, 90.0, 0.0), false);
        bone.update_child(&def, &Mat4::IDENTITY, Vec3::ZERO);

        let expected = bone.axis_transform()
            * Mat4::from_rotation_y(90f32.to_radians())
            * bone.axis_inverse()
            * bone.offset_transform();
        assert!(bone.local_transform().abs_diff_eq(expected, 1e-5));

        // C Ry C⁻¹ 是绕世界 -X 的旋转：(0,0,5) -> (0,5,0)
        assert!(bone.end_position().abs_diff_eq(Vec3::new(0.0, 5.0, 0.0), 1e-4));
        // 不共轭时会得到 (5,0,0)
        assert!(!bone.end_position().abs_diff_eq(Vec3::new(5.0, 0.0, 0.0), 1e-2));
    }

    #[test]
    fn test_quaternion_channel_values() {
        let def = child_def();
        let mut bone = AnimBone::new(1, Some(0), Vec::new());
        bone.precalc_data(&def);
        bone.set_pose(Vec3::ZERO, Vec3::new(0.0, 90.0, 0.0), false);
        bone.update_child(&def, &Mat4::IDENTITY, Vec3::ZERO);

        let half = std::f32::consts::FRAC_1_SQRT_2;
        assert!((bone.channel_value(ChannelKind::QuaternionW).abs() - half).abs() < 1e-5);
        assert!((bone.channel_value(ChannelKind::QuaternionY).abs() - half).abs() < 1e-5);
        assert_eq!(bone.channel_value(ChannelKind::RotateY), 90.0);
        assert_eq!(bone.channel_value(ChannelKind::TranslateX), 0.0);
    }
}
