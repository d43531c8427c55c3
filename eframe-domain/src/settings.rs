//! 实例级领域设置（Domain Settings）
//!
//! 每个记录实例携带的瞬态簿记：各子记录集合最近一次加载/保存时的 uuid 列表，
//! 以及各单一外键引用的加载状态。不参与持久化。
//!
//! 写事务进行中，实例上被改动的状态（新分配的 uuid、回填的反向引用、集合簿记）
//! 会先暂存一份原值；事务提交后丢弃，回滚后由引擎据此恢复实例。
//!
use std::collections::HashMap;
use uuid::Uuid;

/// 单一外键引用的加载状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceLoad {
    /// 本次会话尚未解析
    #[default]
    Unloaded,
    /// 读取时已随连接查询一并填充
    Joined,
    /// 通过懒加载解析（包括确认为空）
    Lazy,
}

impl ReferenceLoad {
    pub fn is_loaded(self) -> bool {
        self != ReferenceLoad::Unloaded
    }
}

/// 写事务期间暂存的原值
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PendingWrite {
    /// 本次事务中插入（uuid 由存储分配）
    pub(crate) inserted: bool,
    /// 被回填的反向引用字段
    pub(crate) back_references: Vec<String>,
    /// 集合簿记的原值；`None` 表示原先未加载
    pub(crate) loaded_children: HashMap<String, Option<Vec<Uuid>>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainSettings {
    loaded_children: HashMap<String, Vec<Uuid>>,
    references: HashMap<String, ReferenceLoad>,
    pending: Option<PendingWrite>,
}

impl DomainSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// 关系最近一次加载/保存时的 uuid 列表；`None` 表示本次会话未加载过
    pub fn loaded_children(&self, relation: &str) -> Option<&[Uuid]> {
        self.loaded_children.get(relation).map(Vec::as_slice)
    }

    pub fn store_loaded_children(&mut self, relation: impl Into<String>, uuids: Vec<Uuid>) {
        self.loaded_children.insert(relation.into(), uuids);
    }

    pub fn forget_loaded_children(&mut self, relation: &str) {
        self.loaded_children.remove(relation);
    }

    pub fn reference_state(&self, field: &str) -> ReferenceLoad {
        self.references.get(field).copied().unwrap_or_default()
    }

    pub fn mark_reference(&mut self, field: impl Into<String>, state: ReferenceLoad) {
        self.references.insert(field.into(), state);
    }

    pub fn is_empty(&self) -> bool {
        self.loaded_children.is_empty() && self.references.is_empty()
    }

    pub fn clear(&mut self) {
        self.loaded_children.clear();
        self.references.clear();
        self.pending = None;
    }

    /// 实例是否参与了尚未结束的写事务
    pub fn is_writing(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn begin_write(&mut self) {
        self.pending.get_or_insert_with(PendingWrite::default);
    }

    pub(crate) fn note_inserted(&mut self) {
        self.pending
            .get_or_insert_with(PendingWrite::default)
            .inserted = true;
    }

    pub(crate) fn note_back_reference(&mut self, field: &str) {
        let pending = self.pending.get_or_insert_with(PendingWrite::default);
        if !pending.back_references.iter().any(|f| f == field) {
            pending.back_references.push(field.to_string());
        }
    }

    /// 写事务内更新集合簿记；同一集合只暂存第一次的原值
    pub(crate) fn stage_loaded_children(&mut self, relation: &str, uuids: Vec<Uuid>) {
        let previous = self.loaded_children.insert(relation.to_string(), uuids);
        self.pending
            .get_or_insert_with(PendingWrite::default)
            .loaded_children
            .entry(relation.to_string())
            .or_insert(previous);
    }

    pub(crate) fn take_pending(&mut self) -> Option<PendingWrite> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_children_and_reference_state() {
        let mut settings = DomainSettings::new();
        assert!(settings.loaded_children("lines").is_none());
        assert_eq!(settings.reference_state("customer"), ReferenceLoad::Unloaded);

        let id = Uuid::new_v4();
        settings.store_loaded_children("lines", vec![id]);
        settings.mark_reference("customer", ReferenceLoad::Lazy);

        assert_eq!(settings.loaded_children("lines"), Some(&[id][..]));
        assert!(settings.reference_state("customer").is_loaded());

        settings.clear();
        assert!(settings.is_empty());
    }

    #[test]
    fn staged_bookkeeping_keeps_the_first_original() {
        let mut settings = DomainSettings::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        settings.store_loaded_children("lines", vec![a]);

        settings.stage_loaded_children("lines", vec![b]);
        settings.stage_loaded_children("lines", vec![a, b]);
        settings.stage_loaded_children("tags", vec![b]);
        settings.note_back_reference("order");
        settings.note_back_reference("order");
        assert!(settings.is_writing());
        assert_eq!(settings.loaded_children("lines"), Some(&[a, b][..]));

        let pending = settings.take_pending().unwrap();
        assert!(!pending.inserted);
        assert_eq!(pending.back_references, ["order"]);
        assert_eq!(pending.loaded_children["lines"], Some(vec![a]));
        assert_eq!(pending.loaded_children["tags"], None);
        assert!(!settings.is_writing());
    }
}
