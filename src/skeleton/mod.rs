//! 骨骼系统
//!
//! 核心设计思想：
//! - BoneDefinition / SkeletonDefinition: 静态骨骼描述（加载后只读，可被多个实例共享）
//! - AnimBone: 运行时骨骼节点，缓存静止姿态变换并逐帧重算局部/世界变换
//! - AnimSkeleton: 持有全部 AnimBone，驱动每帧"先暂存、后提交"的更新流程

mod anim_bone;
mod anim_skeleton;
mod bone_definition;
mod skeleton_definition;

pub use anim_bone::{AnimBone, StagedPose};
pub use anim_skeleton::{AnimSkeleton, BoneKey, PositionMatrix, RenderSink};
pub use bone_definition::BoneDefinition;
pub use skeleton_definition::SkeletonDefinition;

use bitflags::bitflags;
use glam::Mat4;

// ============================================================================
// 公共类型定义
// ============================================================================

/// 骨骼索引（0 号骨骼永远是根骨骼）
pub type BoneId = usize;

/// 每根骨骼的自由度数量（3 平移 + 3 旋转）
pub const DOF_COUNT: usize = 6;

/// 自由度
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dof {
    TranslateX,
    TranslateY,
    TranslateZ,
    RotateX,
    RotateY,
    RotateZ,
}

impl Dof {
    /// 按索引顺序排列的全部自由度
    pub const ALL: [Dof; DOF_COUNT] = [
        Dof::TranslateX,
        Dof::TranslateY,
        Dof::TranslateZ,
        Dof::RotateX,
        Dof::RotateY,
        Dof::RotateZ,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[inline]
    pub fn is_rotation(self) -> bool {
        matches!(self, Dof::RotateX | Dof::RotateY | Dof::RotateZ)
    }

    /// 旋转自由度对应的轴
    #[inline]
    pub fn axis(self) -> Axis {
        match self {
            Dof::TranslateX | Dof::RotateX => Axis::X,
            Dof::TranslateY | Dof::RotateY => Axis::Y,
            Dof::TranslateZ | Dof::RotateZ => Axis::Z,
        }
    }

    #[inline]
    pub fn flag(self) -> DofFlags {
        DofFlags::from_bits_truncate(1 << self.index())
    }
}

bitflags! {
    /// 自由度有效性标志
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DofFlags: u8 {
        const TX = 1 << 0;
        const TY = 1 << 1;
        const TZ = 1 << 2;
        const RX = 1 << 3;
        const RY = 1 << 4;
        const RZ = 1 << 5;
        const TRANSLATION = Self::TX.bits() | Self::TY.bits() | Self::TZ.bits();
        const ROTATION = Self::RX.bits() | Self::RY.bits() | Self::RZ.bits();
    }
}

/// 自由度取值范围
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DofLimit {
    pub min: f32,
    pub max: f32,
}

impl Default for DofLimit {
    fn default() -> Self {
        Self {
            min: f32::NEG_INFINITY,
            max: f32::INFINITY,
        }
    }
}

impl DofLimit {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.max(self.min).min(self.max)
    }
}

/// 坐标轴
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// 绕该轴旋转 `radians` 的基本旋转矩阵
    #[inline]
    pub fn rotation(self, radians: f32) -> Mat4 {
        match self {
            Axis::X => Mat4::from_rotation_x(radians),
            Axis::Y => Mat4::from_rotation_y(radians),
            Axis::Z => Mat4::from_rotation_z(radians),
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'X' => Some(Axis::X),
            'Y' => Some(Axis::Y),
            'Z' => Some(Axis::Z),
            _ => None,
        }
    }
}

/// 轴角应用顺序（三个轴的排列）
pub type AxisOrder = [Axis; 3];

/// 默认轴顺序 XYZ
pub const DEFAULT_AXIS_ORDER: AxisOrder = [Axis::X, Axis::Y, Axis::Z];

/// 解析形如 "XYZ" / "zyx" 的轴顺序；必须恰好是三个轴的一个排列
pub fn parse_axis_order(text: &str) -> Option<AxisOrder> {
    let axes: Vec<Axis> = text.trim().chars().map(Axis::from_char).collect::<Option<_>>()?;
    if axes.len() != 3 {
        return None;
    }
    let order = [axes[0], axes[1], axes[2]];
    let distinct = order[0] != order[1] && order[1] != order[2] && order[0] != order[2];
    distinct.then_some(order)
}

/// 按顺序左乘基本旋转：`M = R_k * M`
///
/// 越靠后的条目越处于最外层，所以顺序即欧拉角的组合顺序。
pub fn compose_rotations<I>(rotations: I) -> Mat4
where
    I: IntoIterator<Item = (Axis, f32)>,
{
    rotations
        .into_iter()
        .fold(Mat4::IDENTITY, |m, (axis, radians)| axis.rotation(radians) * m)
}

// ============================================================================
// 测试用骨骼
// ============================================================================


#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_parse_axis_order() {
        assert_eq!(parse_axis_order("XYZ"), Some([Axis::X, Axis::Y, Axis::Z]));
        assert_eq!(parse_axis_order(" zyx "), Some([Axis::Z, Axis::Y, Axis::X]));
        assert_eq!(parse_axis_order("XXZ"), None);
        assert_eq!(parse_axis_order("XY"), None);
        assert_eq!(parse_axis_order("XYW"), None);
    }

    #[test]
    fn test_compose_rotations_order() {
        let a = std::f32::consts::FRAC_PI_2;
        // 先绕 X 再绕 Y：M = Ry * Rx
        let m = compose_rotations([(Axis::X, a), (Axis::Y, a)]);
        let expected = Mat4::from_rotation_y(a) * Mat4::from_rotation_x(a);
        assert!(m.abs_diff_eq(expected, 1e-6));

        // Y 轴 (0,1,0) 经 Rx(90°) 变为 (0,0,1)，再经 Ry(90°) 变为 (1,0,0)
        let p = m.transform_vector3(Vec3::Y);
        assert!(p.abs_diff_eq(Vec3::X, 1e-5));
    }

    #[test]
    fn test_dof_flags() {
        assert_eq!(Dof::RotateY.flag(), DofFlags::RY);
        assert!(DofFlags::ROTATION.contains(Dof::RotateZ.flag()));
        assert!(!DofFlags::TRANSLATION.contains(Dof::RotateX.flag()));
        assert_eq!(Dof::from_index(4), Some(Dof::RotateY));
        assert_eq!(Dof::from_index(6), None);
    }
}
