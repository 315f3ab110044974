//! 骨骼定义 - 骨骼层级的"模式"
//!
//! 骨骼按 id 顺序存放，0 号为根；拓扑以 (父名, 子名) 连接列表保存。
//! 父索引与子列表在每次修改后重建缓存，查询为 O(1)。

use std::collections::HashMap;

use crate::{MocapError, Result};

use super::{BoneDefinition, BoneId, Dof};

/// 骨骼定义
#[derive(Clone, Debug, Default)]
pub struct SkeletonDefinition {
    bones: Vec<BoneDefinition>,
    name_to_id: HashMap<String, BoneId>,
    /// (父骨骼名, 子骨骼名)
    connections: Vec<(String, String)>,
    /// 父骨骼索引缓存（由连接列表推导）
    parent_cache: Vec<Option<BoneId>>,
    /// 子骨骼索引缓存（按连接添加顺序）
    children_cache: Vec<Vec<BoneId>>,
}

impl SkeletonDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================
    // 构建
    // ========================================

    /// 添加骨骼，返回分配的 id；同名骨骼覆盖原定义并返回原 id
    pub fn add_bone(&mut self, bone: BoneDefinition) -> BoneId {
        if let Some(&id) = self.name_to_id.get(&bone.name) {
            self.bones[id] = bone;
            return id;
        }
        let id = self.bones.len();
        self.name_to_id.insert(bone.name.clone(), id);
        self.bones.push(bone);
        self.rebuild_topology();
        id
    }

    /// 添加父子连接（重复连接忽略）
    pub fn add_connection(&mut self, parent: impl Into<String>, child: impl Into<String>) {
        let connection = (parent.into(), child.into());
        if !self.connections.contains(&connection) {
            self.connections.push(connection);
            self.rebuild_topology();
        }
    }

    /// 修改骨骼定义
    ///
    /// 闭包内改动的名称经 `rename_bone` 同步到名称映射与连接列表；
    /// 新名称冲突时其余字段的改动保留，名称恢复原值并返回错误。
    pub fn update_bone<F>(&mut self, id: BoneId, f: F) -> Result<()>
    where
        F: FnOnce(&mut BoneDefinition),
    {
        let bone = self
            .bones
            .get_mut(id)
            .ok_or_else(|| MocapError::UnknownBone(format!("#{}", id)))?;
        let old_name = bone.name.clone();
        f(bone);
        if bone.name != old_name {
            let new_name = std::mem::replace(&mut bone.name, old_name);
            self.rename_bone(id, new_name)?;
        }
        Ok(())
    }

    /// 重命名骨骼，同时更新名称映射、连接列表与拓扑缓存
    pub fn rename_bone(&mut self, id: BoneId, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        let old_name = self
            .bones
            .get(id)
            .map(|bone| bone.name.clone())
            .ok_or_else(|| MocapError::UnknownBone(format!("#{}", id)))?;
        if old_name == name {
            return Ok(());
        }
        if self.name_to_id.contains_key(&name) {
            return Err(MocapError::InvalidTopology(format!(
                "cannot rename '{}': bone name '{}' already in use",
                old_name, name
            )));
        }

        self.name_to_id.remove(&old_name);
        self.name_to_id.insert(name.clone(), id);
        for (parent, child) in &mut self.connections {
            if *parent == old_name {
                *parent = name.clone();
            }
            if *child == old_name {
                *child = name.clone();
            }
        }
        self.bones[id].name = name;
        self.rebuild_topology();
        Ok(())
    }

    /// 按比例缩放全部骨骼长度
    pub fn scale_lengths(&mut self, factor: f32) {
        for bone in &mut self.bones {
            bone.length *= factor;
        }
    }

    fn rebuild_topology(&mut self) {
        let count = self.bones.len();
        self.parent_cache = vec![None; count];
        self.children_cache = vec![Vec::new(); count];
        for (parent, child) in &self.connections {
            let (Some(&p), Some(&c)) = (self.name_to_id.get(parent), self.name_to_id.get(child))
            else {
                continue;
            };
            if self.parent_cache[c].is_none() {
                self.parent_cache[c] = Some(p);
                self.children_cache[p].push(c);
            }
        }
    }

    // ========================================
    // 查询
    // ========================================

    #[inline]
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    #[inline]
    pub fn root_id(&self) -> Option<BoneId> {
        (!self.bones.is_empty()).then_some(0)
    }

    #[inline]
    pub fn bone_id_from_name(&self, name: &str) -> Option<BoneId> {
        self.name_to_id.get(name).copied()
    }

    #[inline]
    pub fn bone_name_from_id(&self, id: BoneId) -> Option<&str> {
        self.bones.get(id).map(|bone| bone.name.as_str())
    }

    /// 父骨骼 id，根骨骼（或未连接的骨骼）返回 `None`
    #[inline]
    pub fn parent_bone_id(&self, id: BoneId) -> Option<BoneId> {
        self.parent_cache.get(id).copied().flatten()
    }

    #[inline]
    pub fn children_of(&self, id: BoneId) -> &[BoneId] {
        self.children_cache.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub fn bone_description(&self, id: BoneId) -> Option<&BoneDefinition> {
        self.bones.get(id)
    }

    pub fn bones(&self) -> impl Iterator<Item = &BoneDefinition> {
        self.bones.iter()
    }

    pub fn connections(&self) -> &[(String, String)] {
        &self.connections
    }

    #[inline]
    pub fn is_active_dof(&self, id: BoneId, dof: Dof) -> bool {
        self.bones.get(id).is_some_and(|bone| bone.is_active_dof(dof))
    }

    // ========================================
    // 校验
    // ========================================

    /// 校验拓扑是一棵以 0 号骨骼为根的树
    pub fn validate(&self) -> Result<()> {
        if self.bones.is_empty() {
            return Err(MocapError::InvalidTopology("skeleton has no bones".to_string()));
        }

        let mut parent_count = vec![0usize; self.bones.len()];
        for (parent, child) in &self.connections {
            if !self.name_to_id.contains_key(parent) {
                return Err(MocapError::InvalidTopology(format!(
                    "connection references unknown parent '{}'",
                    parent
                )));
            }
            let Some(&c) = self.name_to_id.get(child) else {
                return Err(MocapError::InvalidTopology(format!(
                    "connection references unknown child '{}'",
                    child
                )));
            };
            parent_count[c] += 1;
        }

        if parent_count[0] != 0 {
            return Err(MocapError::InvalidTopology(format!(
                "root bone '{}' has a parent",
                self.bones[0].name
            )));
        }
        for (id, &count) in parent_count.iter().enumerate().skip(1) {
            if count != 1 {
                return Err(MocapError::InvalidTopology(format!(
                    "bone '{}' has {} parents",
                    self.bones[id].name, count
                )));
            }
        }

        // 每根骨骼沿父链最多 N 步到达根
        for id in 0..self.bones.len() {
            let mut current = id;
            let mut steps = 0;
            while let Some(parent) = self.parent_bone_id(current) {
                current = parent;
                steps += 1;
                if steps > self.bones.len() {
                    return Err(MocapError::InvalidTopology(format!(
                        "cycle through bone '{}'",
                        self.bones[id].name
                    )));
                }
            }
            if current != 0 {
                return Err(MocapError::InvalidTopology(format!(
                    "bone '{}' is not connected to the root",
                    self.bones[id].name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::fixtures;

    #[test]
    fn test_name_id_lookup() {
        let def = fixtures::branching();
        assert_eq!(def.bone_count(), 5);
        assert_eq!(def.bone_id_from_name("hip"), Some(3));
        assert_eq!(def.bone_name_from_id(3), Some("hip"));
        assert_eq!(def.bone_id_from_name("tail"), None);
        assert_eq!(def.bone_name_from_id(99), None);
    }

    #[test]
    fn test_parent_links_reach_root() {
        let def = fixtures::branching();
        assert!(def.validate().is_ok());
        assert_eq!(def.parent_bone_id(0), None);

        for id in 1..def.bone_count() {
            assert!(def.parent_bone_id(id).is_some());
            let mut current = id;
            let mut steps = 0;
            while let Some(parent) = def.parent_bone_id(current) {
                current = parent;
                steps += 1;
            }
            assert_eq!(current, 0);
            assert!(steps <= def.bone_count());
        }

        assert_eq!(def.children_of(0), &[1, 3]);
        assert_eq!(def.children_of(4), &[] as &[BoneId]);
    }

    #[test]
    fn test_connection_before_bone_resolves() {
        let mut def = SkeletonDefinition::new();
        def.add_connection("root", "arm");
        def.add_bone(BoneDefinition::new("root"));
        assert_eq!(def.parent_bone_id(0), None);
        def.add_bone(BoneDefinition::new("arm"));
        assert_eq!(def.parent_bone_id(1), Some(0));
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let mut def = SkeletonDefinition::new();
        def.add_bone(BoneDefinition::new("root"));
        def.add_bone(BoneDefinition::new("a"));
        def.add_bone(BoneDefinition::new("b"));
        def.add_connection("a", "b");
        def.add_connection("b", "a");
        assert!(matches!(def.validate(), Err(MocapError::InvalidTopology(_))));
    }

    #[test]
    fn test_validate_rejects_orphan_and_unknown() {
        let mut def = SkeletonDefinition::new();
        def.add_bone(BoneDefinition::new("root"));
        def.add_bone(BoneDefinition::new("orphan"));
        assert!(def.validate().is_err());

        def.add_connection("root", "orphan");
        assert!(def.validate().is_ok());

        def.add_connection("root", "ghost");
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_rename_keeps_lookup_and_topology() {
        let mut def = fixtures::branching();
        let hip = def.bone_id_from_name("hip").unwrap();
        def.rename_bone(hip, "lhipjoint").unwrap();

        assert_eq!(def.bone_id_from_name("lhipjoint"), Some(hip));
        assert_eq!(def.bone_id_from_name("hip"), None);
        assert_eq!(def.bone_name_from_id(hip), Some("lhipjoint"));
        let knee = def.bone_id_from_name("knee").unwrap();
        assert_eq!(def.parent_bone_id(knee), Some(hip));
        assert_eq!(def.parent_bone_id(hip), Some(0));
        assert!(def.validate().is_ok());

        // 名称冲突
        assert!(matches!(def.rename_bone(hip, "spine"), Err(MocapError::InvalidTopology(_))));
        assert!(matches!(def.rename_bone(42, "x"), Err(MocapError::UnknownBone(_))));
    }

    #[test]
    fn test_update_bone_routes_renames() {
        let mut def = fixtures::two_bone_chain();
        def.update_bone(1, |bone| {
            bone.length = 7.0;
            bone.name = "tip".to_string();
        })
        .unwrap();
        assert_eq!(def.bone_description(1).map(|b| b.length), Some(7.0));
        assert_eq!(def.bone_id_from_name("tip"), Some(1));
        assert_eq!(def.bone_id_from_name("child"), None);
        assert_eq!(def.parent_bone_id(1), Some(0));
        assert_eq!(def.children_of(0), &[1]);

        // 冲突时名称恢复，其余改动保留
        let result = def.update_bone(1, |bone| {
            bone.length = 3.0;
            bone.name = "root".to_string();
        });
        assert!(result.is_err());
        assert_eq!(def.bone_name_from_id(1), Some("tip"));
        assert_eq!(def.bone_description(1).map(|b| b.length), Some(3.0));
        assert_eq!(def.bone_id_from_name("root"), Some(0));
    }

    #[test]
    fn test_scale_lengths() {
        let mut def = fixtures::two_bone_chain();
        def.scale_lengths(2.0);
        assert_eq!(def.bone_description(1).map(|b| b.length), Some(10.0));
        assert!(def.is_active_dof(1, Dof::RotateY));
        assert!(!def.is_active_dof(1, Dof::RotateX));
        assert!(!def.is_active_dof(7, Dof::RotateX));
    }
}
