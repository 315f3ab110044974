//! 引擎全局配置
//!
//! 参数扁平化，直接在代码中修改默认值即可。

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 引擎配置（扁平化，不嵌套）
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    // ========== 动作数据 ==========
    /// 新建动作序列的默认帧率，默认 120.0（光学动捕常用采样率）
    pub default_frame_rate: f32,
    /// 旋转通道与骨骼轴角是否以角度（而非弧度）存储，默认 true
    pub angles_in_degrees: bool,

    // ========== 数值 ==========
    /// 方向向量归一化时的最小长度，默认 1e-5
    pub epsilon: f32,

    // ========== 调试 ==========
    /// 是否输出逐帧调试日志，默认 false
    pub debug_log: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_frame_rate: 120.0,
            angles_in_degrees: true,
            epsilon: 1e-5,
            debug_log: false,
        }
    }
}

impl EngineConfig {
    /// 将存储单位的角度转换为弧度
    #[inline]
    pub fn to_radians(&self, angle: f32) -> f32 {
        if self.angles_in_degrees {
            angle.to_radians()
        } else {
            angle
        }
    }

    /// 将弧度转换为存储单位
    #[inline]
    pub fn angle_from_radians(&self, radians: f32) -> f32 {
        if self.angles_in_degrees {
            radians.to_degrees()
        } else {
            radians
        }
    }
}

/// 全局配置实例
static ENGINE_CONFIG: Lazy<RwLock<EngineConfig>> = Lazy::new(|| {
    RwLock::new(EngineConfig::default())
});

/// 获取当前配置（只读）
pub fn get_config() -> EngineConfig {
    ENGINE_CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: EngineConfig) {
    *ENGINE_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// 重置为默认配置
pub fn reset_config() {
    *ENGINE_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = EngineConfig::default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_units() {
        let config = EngineConfig::default();
        assert!(config.angles_in_degrees);
        assert!((config.to_radians(180.0) - std::f32::consts::PI).abs() < 1e-6);
        assert!((config.angle_from_radians(std::f32::consts::FRAC_PI_2) - 90.0).abs() < 1e-4);

        let radians = EngineConfig { angles_in_degrees: false, ..EngineConfig::default() };
        assert_eq!(radians.to_radians(1.5), 1.5);
        assert_eq!(radians.angle_from_radians(1.5), 1.5);
    }
}
