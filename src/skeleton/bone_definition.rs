//! 骨骼静态描述
//!
//! 由外部加载器一次性填充，之后在程序生命周期内只读。

use glam::Vec3;

use crate::config::get_config;

use super::{AxisOrder, Dof, DofFlags, DofLimit, DEFAULT_AXIS_ORDER, DOF_COUNT};

/// 单根骨骼的静态描述
#[derive(Clone, Debug, PartialEq)]
pub struct BoneDefinition {
    /// 骨骼名称
    pub name: String,

    /// 静止长度（沿骨骼局部 Z 方向）
    pub length: f32,

    /// 从骨骼起点指向终点的单位向量（父骨骼坐标系）
    pub direction: Vec3,

    /// 局部轴角（相对父骨骼的轴坐标系，存储单位见 EngineConfig::angles_in_degrees）
    pub axis: Vec3,

    /// 轴角的应用顺序
    pub axis_order: AxisOrder,

    /// 自由度有效性
    pub dof: DofFlags,

    /// 各自由度的取值范围，按 Dof::index 排列
    pub limits: [DofLimit; DOF_COUNT],

    /// 读取/应用动作数据时自由度的顺序，`None` 为未使用
    pub channel_order: [Option<Dof>; DOF_COUNT],
}

impl Default for BoneDefinition {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl BoneDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            length: 0.0,
            direction: Vec3::Z,
            axis: Vec3::ZERO,
            axis_order: DEFAULT_AXIS_ORDER,
            dof: DofFlags::empty(),
            limits: [DofLimit::default(); DOF_COUNT],
            channel_order: [None; DOF_COUNT],
        }
    }

    // ========================================
    // 构建器
    // ========================================

    pub fn with_length(mut self, length: f32) -> Self {
        self.set_length(length);
        self
    }

    pub fn with_direction(mut self, direction: Vec3) -> Self {
        self.set_direction(direction);
        self
    }

    pub fn with_axis(mut self, axis: Vec3, order: AxisOrder) -> Self {
        self.set_axis(axis, order);
        self
    }

    /// 启用一个自由度，并追加到通道顺序末尾
    pub fn with_dof(mut self, dof: Dof, limit: DofLimit) -> Self {
        self.set_dof(dof, true, limit);
        self
    }

    // ========================================
    // 按字段写入（幂等）
    // ========================================

    pub fn set_length(&mut self, length: f32) {
        self.length = length;
    }

    /// 设置方向；长度不超过 `EngineConfig::epsilon` 的向量保持原值不变
    pub fn set_direction(&mut self, direction: Vec3) {
        let length = direction.length();
        if length.is_finite() && length > get_config().epsilon {
            self.direction = direction / length;
        } else {
            log::trace!("骨骼 '{}' 忽略退化方向 {:?}", self.name, direction);
        }
    }

    pub fn set_axis(&mut self, axis: Vec3, order: AxisOrder) {
        self.axis = axis;
        self.axis_order = order;
    }

    /// 设置自由度有效性与范围
    ///
    /// 启用时若通道顺序中尚无该自由度则追加；禁用时从通道顺序中移除。
    pub fn set_dof(&mut self, dof: Dof, valid: bool, limit: DofLimit) {
        self.limits[dof.index()] = limit;
        if valid {
            self.dof.insert(dof.flag());
            if !self.channel_order.contains(&Some(dof)) {
                if let Some(slot) = self.channel_order.iter_mut().find(|slot| slot.is_none()) {
                    *slot = Some(dof);
                }
            }
        } else {
            self.dof.remove(dof.flag());
            let kept: Vec<Dof> = self
                .channel_order
                .iter()
                .flatten()
                .copied()
                .filter(|d| *d != dof)
                .collect();
            self.set_channel_order(&kept);
        }
    }

    /// 直接指定通道顺序（超出 6 个的条目被忽略，其余位置填 `None`）
    pub fn set_channel_order(&mut self, order: &[Dof]) {
        self.channel_order = [None; DOF_COUNT];
        for (slot, dof) in self.channel_order.iter_mut().zip(order) {
            *slot = Some(*dof);
        }
    }

    // ========================================
    // 查询
    // ========================================

    #[inline]
    pub fn is_active_dof(&self, dof: Dof) -> bool {
        self.dof.contains(dof.flag())
    }

    #[inline]
    pub fn limit(&self, dof: Dof) -> DofLimit {
        self.limits[dof.index()]
    }

    /// 按通道顺序列出有效自由度（未使用或被标记无效的条目跳过）
    pub fn active_dofs(&self) -> impl Iterator<Item = Dof> + '_ {
        self.channel_order
            .iter()
            .flatten()
            .copied()
            .filter(move |dof| self.is_active_dof(*dof))
    }

    /// 将取值限制在该自由度的范围内
    #[inline]
    pub fn clamp_to_limits(&self, dof: Dof, value: f32) -> f32 {
        self.limit(dof).clamp(value)
    }

    /// 静止姿态下骨骼起点到终点的偏移
    #[inline]
    pub fn rest_offset(&self) -> Vec3 {
        self.direction * self.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_dof_maintains_channel_order() {
        let mut bone = BoneDefinition::new("femur")
            .with_dof(Dof::RotateZ, DofLimit::default())
            .with_dof(Dof::RotateX, DofLimit::new(-160.0, 20.0));
        assert_eq!(bone.channel_order[0], Some(Dof::RotateZ));
        assert_eq!(bone.channel_order[1], Some(Dof::RotateX));
        assert_eq!(bone.channel_order[2], None);

        // 重复启用不重复追加
        bone.set_dof(Dof::RotateZ, true, DofLimit::default());
        assert_eq!(bone.active_dofs().count(), 2);

        bone.set_dof(Dof::RotateZ, false, DofLimit::default());
        assert!(!bone.is_active_dof(Dof::RotateZ));
        assert_eq!(bone.active_dofs().collect::<Vec<_>>(), vec![Dof::RotateX]);
        assert_eq!(bone.clamp_to_limits(Dof::RotateX, -200.0), -160.0);
    }

    #[test]
    fn test_degenerate_direction_is_ignored() {
        let mut bone = BoneDefinition::new("toe").with_direction(Vec3::new(0.0, 3.0, 4.0));
        assert!((bone.direction - Vec3::new(0.0, 0.6, 0.8)).length() < 1e-6);

        // 低于容差的向量不参与归一化
        bone.set_direction(Vec3::splat(1e-7));
        assert!((bone.direction - Vec3::new(0.0, 0.6, 0.8)).length() < 1e-6);
        bone.set_direction(Vec3::ZERO);
        assert!((bone.direction - Vec3::new(0.0, 0.6, 0.8)).length() < 1e-6);
    }

    #[test]
    fn test_invalid_entry_in_channel_order_is_skipped() {
        let mut bone = BoneDefinition::new("hand").with_dof(Dof::RotateY, DofLimit::default());
        // 加载器写入了一个未标记有效的条目
        bone.set_channel_order(&[Dof::RotateX, Dof::RotateY]);
        assert_eq!(bone.active_dofs().collect::<Vec<_>>(), vec![Dof::RotateY]);
    }

    #[test]
    fn test_direction_is_normalized() {
        let bone = BoneDefinition::new("tibia")
            .with_direction(Vec3::new(0.0, -3.0, 0.0))
            .with_length(2.0);
        assert!(bone.direction.abs_diff_eq(Vec3::NEG_Y, 1e-6));
        assert!(bone.rest_offset().abs_diff_eq(Vec3::new(0.0, -2.0, 0.0), 1e-6));

        let unchanged = BoneDefinition::new("x").with_direction(Vec3::ZERO);
        assert_eq!(unchanged.direction, Vec3::Z);
    }
}
