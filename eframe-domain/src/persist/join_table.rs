//! 多对多连接表
//!
//! 通用仓储不支持连接表读写，这里单独抽象；所有操作都要求传入活动事务。
//!
use crate::error::StorageResult;
use crate::naming::NamingStrategy;
use crate::persist::TransactionStatus;
use crate::schema::{EntitySchema, Relation};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// 一个多对多关系对应的物理连接表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    /// 连接表名
    pub table: String,
    /// 指向拥有方的列（`<owner>_id`）
    pub from_column: String,
    /// 指向被引用方的列（`<target>_id`）
    pub to_column: String,
    /// 被引用记录所在的表
    pub target_table: String,
}

impl JoinTable {
    /// 按命名策略推导：表名取自关系的 `mapped_by`，列名取自两端的类型名
    pub fn resolve(owner: &EntitySchema, relation: &Relation, naming: &dyn NamingStrategy) -> Self {
        let target = relation.target();
        Self {
            table: naming.mapped_name(relation.mapped_by()),
            from_column: format!("{}_id", naming.mapped_name(owner.name())),
            to_column: format!("{}_id", naming.mapped_name(target.name())),
            target_table: target.table_name(naming),
        }
    }
}

#[async_trait]
pub trait JoinTableOperations: Send + Sync {
    /// 删除拥有方的全部连接行，返回删除行数
    async fn delete_links(
        &self,
        status: &TransactionStatus,
        join: &JoinTable,
        from: Uuid,
    ) -> StorageResult<u64>;

    async fn insert_link(
        &self,
        status: &TransactionStatus,
        join: &JoinTable,
        from: Uuid,
        to: Uuid,
    ) -> StorageResult<()>;

    /// 连接查询被引用表，按连接行插入顺序返回被引用记录的行数据
    async fn select_linked(
        &self,
        status: &TransactionStatus,
        join: &JoinTable,
        from: Uuid,
    ) -> StorageResult<Vec<Value>>;
}

#[async_trait]
impl<T> JoinTableOperations for Arc<T>
where
    T: JoinTableOperations + ?Sized,
{
    async fn delete_links(
        &self,
        status: &TransactionStatus,
        join: &JoinTable,
        from: Uuid,
    ) -> StorageResult<u64> {
        (**self).delete_links(status, join, from).await
    }

    async fn insert_link(
        &self,
        status: &TransactionStatus,
        join: &JoinTable,
        from: Uuid,
        to: Uuid,
    ) -> StorageResult<()> {
        (**self).insert_link(status, join, from, to).await
    }

    async fn select_linked(
        &self,
        status: &TransactionStatus,
        join: &JoinTable,
        from: Uuid,
    ) -> StorageResult<Vec<Value>> {
        (**self).select_linked(status, join, from).await
    }
}
