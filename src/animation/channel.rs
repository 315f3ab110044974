//! 通道寻址
//!
//! 一个通道 = (骨骼 id, 通道类型)，标识一条标量动作数据流。
//! 排序先按骨骼 id 再按通道类型，用作映射键时枚举顺序确定。

use std::fmt;

use crate::skeleton::{BoneId, Dof};

/// 通道类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelKind {
    TranslateX,
    TranslateY,
    TranslateZ,
    RotateX,
    RotateY,
    RotateZ,
    QuaternionW,
    QuaternionX,
    QuaternionY,
    QuaternionZ,
}

/// 助记符表（文本格式读写器使用）
const MNEMONICS: [(&str, ChannelKind); 10] = [
    ("tx", ChannelKind::TranslateX),
    ("ty", ChannelKind::TranslateY),
    ("tz", ChannelKind::TranslateZ),
    ("rx", ChannelKind::RotateX),
    ("ry", ChannelKind::RotateY),
    ("rz", ChannelKind::RotateZ),
    ("qw", ChannelKind::QuaternionW),
    ("qx", ChannelKind::QuaternionX),
    ("qy", ChannelKind::QuaternionY),
    ("qz", ChannelKind::QuaternionZ),
];

impl ChannelKind {
    /// 由两字符助记符解析（忽略大小写），无法识别时返回 `None`
    pub fn from_mnemonic(text: &str) -> Option<Self> {
        let text = text.trim();
        MNEMONICS
            .iter()
            .find(|(m, _)| m.eq_ignore_ascii_case(text))
            .map(|(_, kind)| *kind)
    }

    pub fn mnemonic(self) -> &'static str {
        MNEMONICS
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(m, _)| *m)
            .unwrap_or("??")
    }

    /// 对应的自由度（四元数分量没有对应自由度）
    pub fn dof(self) -> Option<Dof> {
        match self {
            ChannelKind::TranslateX => Some(Dof::TranslateX),
            ChannelKind::TranslateY => Some(Dof::TranslateY),
            ChannelKind::TranslateZ => Some(Dof::TranslateZ),
            ChannelKind::RotateX => Some(Dof::RotateX),
            ChannelKind::RotateY => Some(Dof::RotateY),
            ChannelKind::RotateZ => Some(Dof::RotateZ),
            _ => None,
        }
    }
}

impl From<Dof> for ChannelKind {
    fn from(dof: Dof) -> Self {
        match dof {
            Dof::TranslateX => ChannelKind::TranslateX,
            Dof::TranslateY => ChannelKind::TranslateY,
            Dof::TranslateZ => ChannelKind::TranslateZ,
            Dof::RotateX => ChannelKind::RotateX,
            Dof::RotateY => ChannelKind::RotateY,
            Dof::RotateZ => ChannelKind::RotateZ,
        }
    }
}

/// 通道标识
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId {
    pub bone: BoneId,
    pub kind: ChannelKind,
}

impl ChannelId {
    #[inline]
    pub fn new(bone: BoneId, kind: ChannelKind) -> Self {
        Self { bone, kind }
    }

    #[inline]
    pub fn from_dof(bone: BoneId, dof: Dof) -> Self {
        Self::new(bone, dof.into())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bone, self.kind.mnemonic())
    }
}
