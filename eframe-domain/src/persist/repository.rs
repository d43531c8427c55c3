//! 仓储抽象
//!
//! - [`Repository`]：面向具体实体类型的 CRUD/查询门面，由基础设施层实现；
//! - [`ErasedRepository`]：引擎内部使用的类型擦除视图，由 [`TypedRepository`] 适配。
//!
//! 写操作（插入/更新/删除）必须在活动的写事务内执行，调用方传入 [`TransactionStatus`]；
//! 查询可以在事务之外执行。
//!
use crate::entity::{AsAny, DomainEntity};
use crate::error::{DomainError, DomainResult, StorageResult};
use crate::persist::TransactionStatus;
use crate::schema::EntitySchema;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait Repository<E>: Send + Sync
where
    E: DomainEntity,
{
    async fn find_all(&self) -> StorageResult<Vec<E>>;

    async fn find_by_uuid(&self, uuid: Uuid) -> StorageResult<Option<E>>;

    /// 按外键属性查询（`property` 为引用字段名，值为被引用记录的 uuid）
    async fn find_all_by(&self, property: &str, uuid: Uuid) -> StorageResult<Vec<E>>;

    /// 插入新记录，成功后为其分配 uuid
    async fn save(&self, status: &TransactionStatus, record: &mut E) -> StorageResult<()>;

    /// 更新已有记录，返回受影响行数
    async fn update(&self, status: &TransactionStatus, record: &E) -> StorageResult<u64>;

    /// 删除记录，返回受影响行数
    async fn delete(&self, status: &TransactionStatus, record: &E) -> StorageResult<u64>;
}

#[async_trait]
impl<E, T> Repository<E> for Arc<T>
where
    E: DomainEntity,
    T: Repository<E> + ?Sized,
{
    async fn find_all(&self) -> StorageResult<Vec<E>> {
        (**self).find_all().await
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> StorageResult<Option<E>> {
        (**self).find_by_uuid(uuid).await
    }

    async fn find_all_by(&self, property: &str, uuid: Uuid) -> StorageResult<Vec<E>> {
        (**self).find_all_by(property, uuid).await
    }

    async fn save(&self, status: &TransactionStatus, record: &mut E) -> StorageResult<()> {
        (**self).save(status, record).await
    }

    async fn update(&self, status: &TransactionStatus, record: &E) -> StorageResult<u64> {
        (**self).update(status, record).await
    }

    async fn delete(&self, status: &TransactionStatus, record: &E) -> StorageResult<u64> {
        (**self).delete(status, record).await
    }
}

/// 类型擦除的仓储视图
#[async_trait]
pub trait ErasedRepository: Send + Sync {
    fn schema(&self) -> &'static EntitySchema;

    /// 仅带 uuid 的空记录（用于按标识删除）
    fn new_instance(&self, uuid: Uuid) -> Box<dyn DomainEntity>;

    /// 把一行 JSON 数据绑定为记录
    fn bind(&self, row: Value) -> DomainResult<Box<dyn DomainEntity>>;

    /// 记录的持久化列快照（集合与瞬态字段不在其中）
    fn to_row(&self, record: &dyn DomainEntity) -> DomainResult<Value>;

    async fn find_all(&self) -> DomainResult<Vec<Box<dyn DomainEntity>>>;

    async fn find_by_uuid(&self, uuid: Uuid) -> DomainResult<Option<Box<dyn DomainEntity>>>;

    async fn find_all_by(
        &self,
        property: &str,
        uuid: Uuid,
    ) -> DomainResult<Vec<Box<dyn DomainEntity>>>;

    async fn insert(
        &self,
        status: &TransactionStatus,
        record: &mut dyn DomainEntity,
    ) -> DomainResult<()>;

    async fn update(
        &self,
        status: &TransactionStatus,
        record: &dyn DomainEntity,
    ) -> DomainResult<u64>;

    async fn delete(
        &self,
        status: &TransactionStatus,
        record: &dyn DomainEntity,
    ) -> DomainResult<u64>;
}

/// 把 `Repository<E>` 适配为 [`ErasedRepository`]
pub struct TypedRepository<E, R> {
    inner: R,
    _marker: PhantomData<fn() -> E>,
}

impl<E, R> TypedRepository<E, R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

fn downcast_ref<E: DomainEntity>(record: &dyn DomainEntity) -> DomainResult<&E> {
    record
        .as_any()
        .downcast_ref::<E>()
        .ok_or_else(|| DomainError::TypeMismatch {
            expected: E::schema().name(),
            found: record.entity_schema().name(),
        })
}

fn downcast_mut<E: DomainEntity>(record: &mut dyn DomainEntity) -> DomainResult<&mut E> {
    let found = record.entity_schema().name();
    record
        .as_any_mut()
        .downcast_mut::<E>()
        .ok_or_else(|| DomainError::TypeMismatch {
            expected: E::schema().name(),
            found,
        })
}

fn erase<E: DomainEntity>(records: Vec<E>) -> Vec<Box<dyn DomainEntity>> {
    records
        .into_iter()
        .map(|r| Box::new(r) as Box<dyn DomainEntity>)
        .collect()
}

#[async_trait]
impl<E, R> ErasedRepository for TypedRepository<E, R>
where
    E: DomainEntity + Default + Serialize + DeserializeOwned,
    R: Repository<E>,
{
    fn schema(&self) -> &'static EntitySchema {
        E::schema()
    }

    fn new_instance(&self, uuid: Uuid) -> Box<dyn DomainEntity> {
        let mut record = E::default();
        record.set_uuid(Some(uuid));
        Box::new(record)
    }

    fn bind(&self, row: Value) -> DomainResult<Box<dyn DomainEntity>> {
        let record: E = serde_json::from_value(row)?;
        Ok(Box::new(record))
    }

    fn to_row(&self, record: &dyn DomainEntity) -> DomainResult<Value> {
        let typed = downcast_ref::<E>(record)?;
        Ok(serde_json::to_value(typed)?)
    }

    async fn find_all(&self) -> DomainResult<Vec<Box<dyn DomainEntity>>> {
        Ok(erase(self.inner.find_all().await?))
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> DomainResult<Option<Box<dyn DomainEntity>>> {
        let found = self.inner.find_by_uuid(uuid).await?;
        Ok(found.map(|r| Box::new(r) as Box<dyn DomainEntity>))
    }

    async fn find_all_by(
        &self,
        property: &str,
        uuid: Uuid,
    ) -> DomainResult<Vec<Box<dyn DomainEntity>>> {
        Ok(erase(self.inner.find_all_by(property, uuid).await?))
    }

    async fn insert(
        &self,
        status: &TransactionStatus,
        record: &mut dyn DomainEntity,
    ) -> DomainResult<()> {
        let typed = downcast_mut::<E>(record)?;
        self.inner.save(status, typed).await?;
        Ok(())
    }

    async fn update(
        &self,
        status: &TransactionStatus,
        record: &dyn DomainEntity,
    ) -> DomainResult<u64> {
        let typed = downcast_ref::<E>(record)?;
        Ok(self.inner.update(status, typed).await?)
    }

    async fn delete(
        &self,
        status: &TransactionStatus,
        record: &dyn DomainEntity,
    ) -> DomainResult<u64> {
        let typed = downcast_ref::<E>(record)?;
        Ok(self.inner.delete(status, typed).await?)
    }
}

/// 把类型擦除的记录列表还原为具体类型
pub fn downcast_records<E: DomainEntity>(
    records: Vec<Box<dyn DomainEntity>>,
) -> DomainResult<Vec<E>> {
    records
        .into_iter()
        .map(|boxed| {
            let found = boxed.entity_schema().name();
            AsAny::into_any(boxed)
                .downcast::<E>()
                .map(|b| *b)
                .map_err(|_| DomainError::TypeMismatch {
                    expected: E::schema().name(),
                    found,
                })
        })
        .collect()
}
