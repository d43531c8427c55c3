use super::{DomainEngine, UnitOfWork};
use crate::entity::DomainEntity;
use crate::error::{DomainError, DomainResult};
use crate::relation::RecordList;
use crate::schema::Relation;
use tracing::{debug, trace};
use uuid::Uuid;

pub(super) fn list_mut<'r>(
    record: &'r mut dyn DomainEntity,
    relation: &Relation,
) -> DomainResult<&'r mut dyn RecordList> {
    let entity = record.entity_schema().name();
    record
        .relation_list_mut(relation)
        .ok_or_else(|| DomainError::UnknownProperty {
            entity,
            property: relation.field().to_string(),
        })
}

impl DomainEngine {
    /// 多对多级联：整体替换连接行，再保存各元素
    pub(crate) async fn save_many_to_many(
        &self,
        work: &mut UnitOfWork,
        record: &mut dyn DomainEntity,
    ) -> DomainResult<()> {
        let schema = record.entity_schema();
        for relation in schema.many_to_many_relations() {
            self.save_many_to_many_relation(work, record, relation).await?;
        }
        Ok(())
    }

    async fn save_many_to_many_relation(
        &self,
        work: &mut UnitOfWork,
        record: &mut dyn DomainEntity,
        relation: &Relation,
    ) -> DomainResult<()> {
        let Some(owner) = record.uuid() else {
            return Ok(());
        };
        let join = self.join_table(record.entity_schema(), relation);
        let list = list_mut(record, relation)?;
        if !list.is_loaded() {
            trace!(relation = relation.field(), "many-to-many not loaded, skipped");
            return Ok(());
        }

        // 连接行需要被引用方的 uuid，未持久化的元素先保存
        let mut saved_first = vec![false; list.len()];
        for (i, flag) in saved_first.iter_mut().enumerate() {
            if let Some(element) = list.entity_mut(i) {
                if element.uuid().is_none() {
                    self.save_record(work, element).await?;
                    *flag = true;
                }
            }
        }

        let targets = list.uuids();
        let removed = self
            .join_tables
            .delete_links(work.status(), &join, owner)
            .await?;
        for to in &targets {
            self.join_tables
                .insert_link(work.status(), &join, owner, *to)
                .await?;
        }
        trace!(
            table = %join.table,
            removed,
            inserted = targets.len(),
            "join rows replaced"
        );

        for (i, already) in saved_first.into_iter().enumerate() {
            if already {
                continue;
            }
            if let Some(element) = list.entity_mut(i) {
                self.save_record(work, element).await?;
            }
        }
        Ok(())
    }

    /// 子记录级联：静态声明的关系在前，自定义字段贡献的关系在后
    pub(crate) async fn save_children(
        &self,
        work: &mut UnitOfWork,
        record: &mut dyn DomainEntity,
    ) -> DomainResult<()> {
        let relations = self.child_relations(record.entity_schema());
        for relation in &relations {
            self.save_child_list(work, record, relation).await?;
        }
        Ok(())
    }

    async fn save_child_list(
        &self,
        work: &mut UnitOfWork,
        record: &mut dyn DomainEntity,
        relation: &Relation,
    ) -> DomainResult<()> {
        let parent = record.uuid();
        let previous: Option<Vec<Uuid>> = record
            .domain_settings()
            .loaded_children(relation.field())
            .map(<[Uuid]>::to_vec);

        let list = list_mut(record, relation)?;
        if !list.is_loaded() {
            return Ok(());
        }

        if let Some(compare) = relation.target().natural_order() {
            list.sort_by(compare);
            trace!(relation = relation.field(), "children sorted");
        }

        let mut current = Vec::with_capacity(list.len());
        for i in 0..list.len() {
            let Some(child) = list.entity_mut(i) else {
                continue;
            };
            let filled = {
                let child_name = child.entity_schema().name();
                let slot = child.reference_mut(relation.mapped_by()).ok_or_else(|| {
                    DomainError::UnknownProperty {
                        entity: child_name,
                        property: relation.mapped_by().to_string(),
                    }
                })?;
                // 仅在未设置时回填，保留显式的改挂
                let unset = slot.uuid().is_none();
                if unset {
                    slot.set_uuid(parent);
                }
                unset
            };
            if filled {
                child
                    .domain_settings_mut()
                    .note_back_reference(relation.mapped_by());
            }
            self.save_record(work, &mut *child).await?;
            if let Some(uuid) = child.uuid() {
                current.push(uuid);
            }
        }

        if let Some(previous) = previous {
            let orphans: Vec<Uuid> = previous
                .into_iter()
                .filter(|uuid| !current.contains(uuid))
                .collect();
            if !orphans.is_empty() {
                let repository = self.repository(relation.target())?;
                for uuid in orphans {
                    debug!(relation = relation.field(), %uuid, "deleting orphaned child");
                    let mut orphan = repository.new_instance(uuid);
                    self.delete_record(work, &mut *orphan).await?;
                }
            }
        }

        record
            .domain_settings_mut()
            .stage_loaded_children(relation.field(), current);
        Ok(())
    }

    /// 删除记录的全部多对多连接行
    pub(crate) async fn delete_many_to_many(
        &self,
        work: &mut UnitOfWork,
        record: &mut dyn DomainEntity,
    ) -> DomainResult<()> {
        let Some(owner) = record.uuid() else {
            return Ok(());
        };
        let schema = record.entity_schema();
        for relation in schema.many_to_many_relations() {
            let join = self.join_table(schema, relation);
            let removed = self
                .join_tables
                .delete_links(work.status(), &join, owner)
                .await?;
            trace!(table = %join.table, removed, "join rows deleted");
        }
        Ok(())
    }

    /// 自底向上删除子记录：先从存储重新加载，再逐个递归删除
    pub(crate) async fn delete_children(
        &self,
        work: &mut UnitOfWork,
        record: &mut dyn DomainEntity,
    ) -> DomainResult<()> {
        let relations = self.child_relations(record.entity_schema());
        for relation in &relations {
            list_mut(&mut *record, relation)?.unload();
            self.load_children(&mut *record, relation).await?;

            let list = list_mut(record, relation)?;
            for i in 0..list.len() {
                if let Some(child) = list.entity_mut(i) {
                    self.delete_record(work, child).await?;
                }
            }
            list.mark_loading();
            record
                .domain_settings_mut()
                .store_loaded_children(relation.field(), Vec::new());
        }
        Ok(())
    }
}
