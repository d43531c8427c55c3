use super::DomainEngine;
use super::cascade::list_mut;
use crate::entity::DomainEntity;
use crate::error::{DomainError, DomainResult};
use crate::persist::TransactionManagerExt;
use crate::relation::ErasedRef;
use crate::schema::{Relation, RelationKind};
use crate::settings::ReferenceLoad;
use tracing::debug;
use uuid::Uuid;

impl DomainEngine {
    /// 首次访问子记录集合时从存储加载；已加载则不再查询
    pub async fn lazy_child_load(
        &self,
        record: &mut dyn DomainEntity,
        field: &str,
    ) -> DomainResult<()> {
        let schema = record.entity_schema();
        let relation = schema
            .relation(field)
            .filter(|r| r.kind() == RelationKind::Children)
            .cloned()
            .or_else(|| {
                self.extensions
                    .custom_child_relations(schema)
                    .into_iter()
                    .find(|r| r.field() == field)
            })
            .ok_or_else(|| DomainError::UnknownProperty {
                entity: schema.name(),
                property: field.to_string(),
            })?;
        self.load_children(record, &relation).await
    }

    pub(crate) async fn load_children(
        &self,
        record: &mut dyn DomainEntity,
        relation: &Relation,
    ) -> DomainResult<()> {
        let parent = record.uuid();
        {
            let list = list_mut(&mut *record, relation)?;
            if list.is_loaded() {
                return Ok(());
            }
            list.mark_loading();
        }
        record
            .domain_settings_mut()
            .store_loaded_children(relation.field(), Vec::new());

        let Some(parent) = parent else {
            return Ok(());
        };

        let found = async {
            let repository = self.repository(relation.target())?;
            let mut children = repository.find_all_by(relation.mapped_by(), parent).await?;
            self.attach_parent(&*record, relation, parent, &mut children)?;
            Ok::<_, DomainError>(children)
        }
        .await;
        let children = match found {
            Ok(children) => children,
            Err(err) => {
                list_mut(&mut *record, relation)?.unload();
                record
                    .domain_settings_mut()
                    .forget_loaded_children(relation.field());
                return Err(err);
            }
        };

        let list = list_mut(&mut *record, relation)?;
        list.replace(children)?;
        if let Some(compare) = relation.target().natural_order() {
            list.sort_by(compare);
        }
        let uuids = list.uuids();
        debug!(relation = relation.field(), count = uuids.len(), "children loaded");
        record
            .domain_settings_mut()
            .store_loaded_children(relation.field(), uuids);
        Ok(())
    }

    /// 回填子记录的反向引用
    ///
    /// 引用目标与父记录同类型时直接挂上父记录的快照并标记为已加载，
    /// 之后经由子记录访问父记录不再查询。
    fn attach_parent(
        &self,
        parent: &dyn DomainEntity,
        relation: &Relation,
        uuid: Uuid,
        children: &mut [Box<dyn DomainEntity>],
    ) -> DomainResult<()> {
        let schema = parent.entity_schema();
        let snapshot = match self.registry.resolve(schema) {
            Ok(repository) => Some((repository.to_row(parent)?, repository)),
            Err(_) => None,
        };

        for child in children.iter_mut() {
            let same_type = match child.reference_mut(relation.mapped_by()) {
                Some(slot) => {
                    slot.set_uuid(Some(uuid));
                    slot.target_schema().type_id() == schema.type_id()
                }
                None => false,
            };
            let Some((row, repository)) = snapshot.as_ref().filter(|_| same_type) else {
                continue;
            };
            let copy = repository.bind(row.clone())?;
            child.set_reference(relation.mapped_by(), ErasedRef::loaded(copy))?;
            child
                .domain_settings_mut()
                .mark_reference(relation.mapped_by(), ReferenceLoad::Joined);
        }
        Ok(())
    }

    /// 首次访问多对多集合时经连接表加载（在只读事务内执行）
    pub async fn lazy_ref_list_load(
        &self,
        record: &mut dyn DomainEntity,
        field: &str,
    ) -> DomainResult<()> {
        let schema = record.entity_schema();
        let relation = schema
            .relation(field)
            .filter(|r| r.kind() == RelationKind::ManyToMany)
            .ok_or_else(|| DomainError::UnknownProperty {
                entity: schema.name(),
                property: field.to_string(),
            })?;

        let owner = record.uuid();
        {
            let list = list_mut(&mut *record, relation)?;
            if list.is_loaded() {
                return Ok(());
            }
            list.mark_loading();
        }
        record
            .domain_settings_mut()
            .store_loaded_children(relation.field(), Vec::new());

        let Some(owner) = owner else {
            return Ok(());
        };

        let join = self.join_table(schema, relation);
        let join_ops = &self.join_tables;
        let join_ref = &join;
        let rows = self
            .transactions
            .execute_read(move |status| async move {
                Ok(join_ops.select_linked(&status, join_ref, owner).await?)
            })
            .await;
        let rows = match rows {
            Ok(rows) => rows,
            Err(err) => {
                list_mut(&mut *record, relation)?.unload();
                record
                    .domain_settings_mut()
                    .forget_loaded_children(relation.field());
                return Err(err);
            }
        };

        let repository = self.repository(relation.target())?;
        let records = rows
            .into_iter()
            .map(|row| repository.bind(row))
            .collect::<DomainResult<Vec<_>>>()?;

        let list = list_mut(&mut *record, relation)?;
        list.replace(records)?;
        let uuids = list.uuids();
        debug!(relation = relation.field(), count = uuids.len(), "references loaded");
        record
            .domain_settings_mut()
            .store_loaded_children(relation.field(), uuids);
        Ok(())
    }

    /// 首次访问单一外键引用时加载；本次会话最多读取一次
    pub async fn lazy_reference_load(
        &self,
        record: &mut dyn DomainEntity,
        field: &str,
    ) -> DomainResult<()> {
        if record.domain_settings().reference_state(field).is_loaded() {
            return Ok(());
        }

        let schema = record.entity_schema();
        let slot = record
            .reference_mut(field)
            .ok_or_else(|| DomainError::UnknownProperty {
                entity: schema.name(),
                property: field.to_string(),
            })?;

        if slot.is_populated() {
            record
                .domain_settings_mut()
                .mark_reference(field, ReferenceLoad::Joined);
            return Ok(());
        }

        let target = slot.target_schema();
        let value = match slot.uuid() {
            Some(uuid) => {
                let repository = self.repository(target)?;
                match repository.find_by_uuid(uuid).await? {
                    Some(found) => ErasedRef::loaded(found),
                    None => {
                        return Err(DomainError::DanglingReference {
                            parent: schema.name(),
                            parent_uuid: record.uuid(),
                            field: field.to_string(),
                            uuid,
                        });
                    }
                }
            }
            None => ErasedRef::none(),
        };

        debug!(
            entity = schema.name(),
            field,
            found = value.record.is_some(),
            "reference loaded"
        );
        record
            .domain_settings_mut()
            .mark_reference(field, ReferenceLoad::Lazy);
        record.set_reference(field, value)
    }
}
