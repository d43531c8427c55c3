use crate::schema::{EntitySchema, Relation};
use dashmap::DashMap;
use std::any::TypeId;
use std::sync::Arc;

/// 自定义字段扩展：为实体动态贡献子记录集合
///
/// 引擎在级联保存、删除与懒加载时把这些关系与静态声明的子记录关系同等对待，
/// 集合本身保存在实体的 [`FieldHolderMap`](super::FieldHolderMap) 中。
pub trait ExtensibleFieldHelper: Send + Sync {
    fn custom_child_relations(&self, schema: &EntitySchema) -> Vec<Relation>;
}

impl<T> ExtensibleFieldHelper for Arc<T>
where
    T: ExtensibleFieldHelper + ?Sized,
{
    fn custom_child_relations(&self, schema: &EntitySchema) -> Vec<Relation> {
        (**self).custom_child_relations(schema)
    }
}

/// 不提供任何自定义字段
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCustomFields;

impl ExtensibleFieldHelper for NoCustomFields {
    fn custom_child_relations(&self, _schema: &EntitySchema) -> Vec<Relation> {
        Vec::new()
    }
}

/// 基于内存的自定义字段定义表
/// - 以宿主实体的 TypeId 为键登记子记录集合
#[derive(Default)]
pub struct CustomFieldRegistry {
    child_lists: DashMap<TypeId, Vec<Relation>>,
}

impl CustomFieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个自定义子记录集合；`parent_field` 为子记录中指回宿主的引用字段
    pub fn register_child_list(
        &self,
        owner: &'static EntitySchema,
        field: &str,
        parent_field: &str,
        child: &'static EntitySchema,
    ) {
        let mut entry = self.child_lists.entry(owner.type_id()).or_default();
        entry.retain(|r| r.field() != field);
        entry.push(Relation::children(field, parent_field, child));
    }

    pub fn unregister(&self, owner: &'static EntitySchema, field: &str) {
        if let Some(mut entry) = self.child_lists.get_mut(&owner.type_id()) {
            entry.retain(|r| r.field() != field);
        }
    }
}

impl ExtensibleFieldHelper for CustomFieldRegistry {
    fn custom_child_relations(&self, schema: &EntitySchema) -> Vec<Relation> {
        self.child_lists
            .get(&schema.type_id())
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }
}
