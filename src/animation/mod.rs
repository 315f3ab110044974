//! 动作数据与控制器
//!
//! - ChannelId: 通道寻址（骨骼 + 通道类型）
//! - FrameTable: 带边界检查的帧数据表
//! - MotionSequence: 通道索引 + 帧数据
//! - MotionController: 时间 -> 通道值的控制器接口

mod channel;
mod controller;
mod frame_table;
mod motion_sequence;
mod sequence_controller;

pub use channel::{ChannelId, ChannelKind};
pub use controller::{MotionController, PoseController};
pub use frame_table::FrameTable;
pub use motion_sequence::MotionSequence;
pub use sequence_controller::MotionSequenceController;
