//! 领域实体引擎（DomainEngine）
//!
//! 编排任意受管记录的保存、删除、校验、列表、懒加载与级联：
//! - save：仓储解析 -> 保存前钩子 -> 校验 -> 插入/更新 -> 多对多级联 -> 子记录级联 -> 提交后广播保存事件；
//! - delete：删除前钩子 -> 删除多对多连接行 -> 自底向上删除子记录 -> 删除记录本身；
//! - save/delete 的整条级联共享一个写事务，失败时整体回滚；
//! - 懒加载：子记录集合、多对多引用集合、单一外键引用。
//!
//! 引擎不持有任何记录状态；所有协作者（仓储注册表、事务管理、连接表、命名策略、
//! 自定义字段扩展）在构建时注入。
//!
mod cascade;
mod config;
mod event;
mod lazy;

pub use config::{DomainEngineConfig, OPTIMISTIC_LOCKING_ENV};
pub use event::DomainSaveEvent;

use crate::custom::{ExtensibleFieldHelper, NoCustomFields};
use crate::entity::DomainEntity;
use crate::error::{DomainError, DomainResult};
use crate::naming::{NamingStrategy, UnderscoreSeparatedLowerCase};
use crate::persist::{
    ErasedRepository, JoinTable, JoinTableOperations, RepositoryRegistry, TransactionManager,
    TransactionManagerExt, TransactionStatus, downcast_records,
};
use crate::schema::{EntitySchema, Relation};
use crate::validate::{ValidationError, validate_columns};
use bon::Builder;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Builder)]
pub struct DomainEngine {
    registry: Arc<RepositoryRegistry>,
    transactions: Arc<dyn TransactionManager>,
    join_tables: Arc<dyn JoinTableOperations>,
    #[builder(default = Arc::new(UnderscoreSeparatedLowerCase))]
    naming: Arc<dyn NamingStrategy>,
    #[builder(default = Arc::new(NoCustomFields))]
    extensions: Arc<dyn ExtensibleFieldHelper>,
    #[builder(default)]
    config: DomainEngineConfig,
    events: Option<broadcast::Sender<DomainSaveEvent>>,
}

impl DomainEngine {
    pub fn config(&self) -> &DomainEngineConfig {
        &self.config
    }

    pub fn naming(&self) -> &dyn NamingStrategy {
        self.naming.as_ref()
    }

    pub fn registry(&self) -> &RepositoryRegistry {
        &self.registry
    }

    /// 订阅保存事件；未配置广播通道时返回 `None`
    pub fn subscribe(&self) -> Option<broadcast::Receiver<DomainSaveEvent>> {
        self.events.as_ref().map(broadcast::Sender::subscribe)
    }

    pub fn repository(&self, schema: &EntitySchema) -> DomainResult<Arc<dyn ErasedRepository>> {
        self.registry.resolve(schema)
    }

    /// 物理表名
    pub fn table_name(&self, schema: &EntitySchema) -> String {
        schema.table_name(self.naming.as_ref())
    }

    /// 物理列名；未知字段返回 `None`
    pub fn column_name(&self, schema: &EntitySchema, field: &str) -> Option<String> {
        schema.column_name(field, self.naming.as_ref())
    }

    /// 多对多关系对应的连接表
    pub fn join_table(&self, owner: &EntitySchema, relation: &Relation) -> JoinTable {
        JoinTable::resolve(owner, relation, self.naming.as_ref())
    }

    /// 静态声明的子记录关系，加上自定义字段贡献的子记录关系
    pub fn child_relations(&self, schema: &EntitySchema) -> Vec<Relation> {
        let mut relations: Vec<Relation> = schema.child_relations().cloned().collect();
        relations.extend(self.extensions.custom_child_relations(schema));
        relations
    }

    pub fn execute_write<'a, F, Fut, T>(&'a self, work: F) -> BoxFuture<'a, DomainResult<T>>
    where
        F: FnOnce(TransactionStatus) -> Fut + Send + 'a,
        Fut: Future<Output = DomainResult<T>> + Send + 'a,
        T: Send + 'a,
    {
        self.transactions.execute_write(work)
    }

    pub fn execute_read<'a, F, Fut, T>(&'a self, work: F) -> BoxFuture<'a, DomainResult<T>>
    where
        F: FnOnce(TransactionStatus) -> Fut + Send + 'a,
        Fut: Future<Output = DomainResult<T>> + Send + 'a,
        T: Send + 'a,
    {
        self.transactions.execute_read(work)
    }

    /// 返回记录的完整校验错误列表（空表示通过）
    pub fn validate(&self, record: &mut dyn DomainEntity) -> DomainResult<Vec<ValidationError>> {
        record.before_validate()?;
        let mut errors = validate_columns(&*record, self.config.ignore_fields_for_validation());
        errors.extend(record.validate().into_errors());
        Ok(errors)
    }

    /// 保存记录：无 uuid 时插入，否则更新；随后级联多对多与子记录
    ///
    /// 整个级联在同一个写事务内执行。任何一步失败都会回滚全部写入，
    /// 并恢复实例上本次分配的 uuid、回填的反向引用与集合簿记；保存事件在提交后才广播。
    pub fn save<'a>(&'a self, record: &'a mut dyn DomainEntity) -> BoxFuture<'a, DomainResult<()>> {
        Box::pin(async move {
            let target = &mut *record;
            let outcome = self
                .transactions
                .execute_write(move |status| async move {
                    let mut work = UnitOfWork::new(status);
                    self.save_record(&mut work, target).await?;
                    Ok(work.saved)
                })
                .await;

            self.settle(&mut *record, outcome.is_ok());
            for event in outcome? {
                self.publish(event);
            }
            Ok(())
        })
    }

    /// 删除记录；只需 uuid 已设置，其余字段可以未加载
    ///
    /// 连接行、子记录与记录本身在同一个写事务内删除；失败时全部回滚，
    /// 实例上的子记录集合重置为未加载，下次访问时重新读取。
    pub fn delete<'a>(
        &'a self,
        record: &'a mut dyn DomainEntity,
    ) -> BoxFuture<'a, DomainResult<()>> {
        Box::pin(async move {
            let target = &mut *record;
            let outcome = self
                .transactions
                .execute_write(move |status| async move {
                    let mut work = UnitOfWork::new(status);
                    self.delete_record(&mut work, target).await
                })
                .await;

            if outcome.is_err() {
                self.discard_children(&mut *record);
            }
            outcome
        })
    }

    pub(crate) fn save_record<'a>(
        &'a self,
        work: &'a mut UnitOfWork,
        record: &'a mut dyn DomainEntity,
    ) -> BoxFuture<'a, DomainResult<()>> {
        Box::pin(async move {
            record.domain_settings_mut().begin_write();
            let schema = record.entity_schema();
            let repository = self.repository(schema)?;

            record.before_save()?;

            let errors = self.validate(&mut *record)?;
            if !errors.is_empty() {
                debug!(entity = schema.name(), count = errors.len(), "validation failed");
                return Err(DomainError::ValidationFailed {
                    errors,
                    record: record.describe(),
                });
            }

            if record.uuid().is_none() {
                repository.insert(work.status(), &mut *record).await?;
                record.domain_settings_mut().note_inserted();
                debug!(entity = schema.name(), uuid = ?record.uuid(), "inserted");
            } else {
                let count = repository.update(work.status(), &*record).await?;
                self.check_update_count(&*record, count)?;
                debug!(entity = schema.name(), uuid = ?record.uuid(), "updated");
            }

            self.save_many_to_many(work, &mut *record).await?;
            self.save_children(work, &mut *record).await?;

            if let Some(uuid) = record.uuid() {
                work.saved.push(DomainSaveEvent::new(schema.name(), uuid));
            }
            Ok(())
        })
    }

    pub(crate) fn delete_record<'a>(
        &'a self,
        work: &'a mut UnitOfWork,
        record: &'a mut dyn DomainEntity,
    ) -> BoxFuture<'a, DomainResult<()>> {
        Box::pin(async move {
            record.before_delete()?;

            let schema = record.entity_schema();
            let repository = self.repository(schema)?;

            self.delete_many_to_many(work, &mut *record).await?;
            self.delete_children(work, &mut *record).await?;

            let count = repository.delete(work.status(), &*record).await?;
            debug!(entity = schema.name(), uuid = ?record.uuid(), count, "deleted");
            Ok(())
        })
    }

    pub async fn list<E: DomainEntity>(&self) -> DomainResult<Vec<E>> {
        let repository = self.repository(E::schema())?;
        downcast_records(repository.find_all().await?)
    }

    pub async fn find_by_uuid<E: DomainEntity>(&self, uuid: Uuid) -> DomainResult<Option<E>> {
        let repository = self.repository(E::schema())?;
        match repository.find_by_uuid(uuid).await? {
            Some(found) => Ok(downcast_records(vec![found])?.pop()),
            None => Ok(None),
        }
    }

    fn check_update_count(&self, record: &dyn DomainEntity, count: u64) -> DomainResult<()> {
        if count == 1 {
            return Ok(());
        }
        let entity = record.entity_schema().name();
        warn!(entity, uuid = ?record.uuid(), "Update count is {count}. Expected 1");
        if self.config.optimistic_locking() {
            return Err(DomainError::ConcurrentUpdate {
                entity,
                uuid: record.uuid(),
            });
        }
        Ok(())
    }

    fn publish(&self, event: DomainSaveEvent) {
        if let Some(sender) = &self.events {
            // 没有订阅者时发送失败，忽略即可
            let _ = sender.send(event);
        }
    }

    /// 写事务结束后处理实例树上的暂存状态：提交时丢弃，回滚时恢复原值
    fn settle(&self, record: &mut dyn DomainEntity, committed: bool) {
        let Some(pending) = record.domain_settings_mut().take_pending() else {
            return;
        };
        if !committed {
            if pending.inserted {
                record.set_uuid(None);
            }
            for field in &pending.back_references {
                if let Some(slot) = record.reference_mut(field) {
                    slot.set_uuid(None);
                }
            }
            let settings = record.domain_settings_mut();
            for (relation, previous) in pending.loaded_children {
                match previous {
                    Some(uuids) => settings.store_loaded_children(relation, uuids),
                    None => settings.forget_loaded_children(&relation),
                }
            }
        }

        let schema = record.entity_schema();
        let mut relations = self.child_relations(schema);
        relations.extend(schema.many_to_many_relations().cloned());
        for relation in &relations {
            let Some(list) = record.relation_list_mut(relation) else {
                continue;
            };
            for i in 0..list.len() {
                if let Some(element) = list.entity_mut(i) {
                    self.settle(element, committed);
                }
            }
        }
    }

    /// 删除失败后，子记录集合重置为未加载
    fn discard_children(&self, record: &mut dyn DomainEntity) {
        for relation in &self.child_relations(record.entity_schema()) {
            if let Some(list) = record.relation_list_mut(relation) {
                list.unload();
            }
            record
                .domain_settings_mut()
                .forget_loaded_children(relation.field());
        }
    }
}

/// 一次写事务内的工作单元：活动事务，以及提交后才广播的保存事件
pub(crate) struct UnitOfWork {
    status: TransactionStatus,
    saved: Vec<DomainSaveEvent>,
}

impl UnitOfWork {
    fn new(status: TransactionStatus) -> Self {
        Self {
            status,
            saved: Vec::new(),
        }
    }

    pub(crate) fn status(&self) -> &TransactionStatus {
        &self.status
    }
}
