//! Mocap Engine - 骨骼动画运行时
//!
//! 将静态骨骼描述与逐关节的动作通道数据组合，逐帧计算每根骨骼的世界变换：
//! - 骨骼定义（BoneDefinition / SkeletonDefinition）
//! - 通道寻址的动作序列（ChannelId / MotionSequence）
//! - 运行时骨骼实例与前向运动学（AnimBone / AnimSkeleton）
//! - 时间到姿态的动作控制器（MotionController / MotionSequenceController）

pub mod animation;
pub mod config;
pub mod skeleton;

pub use animation::{
    ChannelId, ChannelKind, FrameTable, MotionController, MotionSequence,
    MotionSequenceController, PoseController,
};
pub use config::EngineConfig;
pub use skeleton::{
    AnimBone, AnimSkeleton, BoneDefinition, BoneId, BoneKey, Dof, DofFlags, PositionMatrix,
    RenderSink, SkeletonDefinition,
};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MocapError {
    #[error("No motion controller attached: {0}")]
    NoController(String),

    #[error("Unknown bone: {0}")]
    UnknownBone(String),

    #[error("Frame {frame} out of range (frame count {frame_count})")]
    FrameOutOfRange { frame: usize, frame_count: usize },

    #[error("Column {column} out of range (column count {column_count})")]
    ColumnOutOfRange { column: usize, column_count: usize },

    #[error("Invalid segment {start}..={end} (frame count {frame_count})")]
    InvalidSegment {
        start: usize,
        end: usize,
        frame_count: usize,
    },

    #[error("Channel layout mismatch: {0}")]
    LayoutMismatch(String),

    #[error("Invalid skeleton topology: {0}")]
    InvalidTopology(String),

    #[error("Attached motion controller exposes no motion sequence")]
    NoSequence,
}

pub type Result<T> = std::result::Result<T, MocapError>;
