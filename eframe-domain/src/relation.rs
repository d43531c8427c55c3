//! 关系容器
//!
//! - [`Ref`]：单一外键引用槽，持久化时只保存 uuid，加载后持有被引用记录；
//! - [`RecordList`]：子记录/多对多集合的统一视图，`None` 表示本次会话尚未加载；
//! - [`DynamicList`]：自定义字段贡献的、类型擦除的子记录集合。
//!
use crate::entity::{AsAny, DomainEntity};
use crate::error::{DomainError, DomainResult};
use crate::schema::{CompareFn, EntitySchema};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// 外键引用
pub struct Ref<T> {
    uuid: Option<Uuid>,
    record: Option<Box<T>>,
}

impl<T> Ref<T> {
    pub fn none() -> Self {
        Self {
            uuid: None,
            record: None,
        }
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self {
            uuid: Some(uuid),
            record: None,
        }
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    pub fn get(&self) -> Option<&T> {
        self.record.as_deref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.record.as_deref_mut()
    }

    /// 已持有被引用记录（例如读取时随连接查询一并填充）
    pub fn is_populated(&self) -> bool {
        self.record.is_some()
    }

    /// 改指向另一个 uuid；与当前不同则丢弃已加载的记录
    pub fn set_uuid(&mut self, uuid: Option<Uuid>) {
        if self.uuid != uuid {
            self.record = None;
        }
        self.uuid = uuid;
    }

    pub fn clear(&mut self) {
        self.uuid = None;
        self.record = None;
    }

    pub fn take(&mut self) -> Option<T> {
        self.record.take().map(|b| *b)
    }
}

impl<T: DomainEntity> Ref<T> {
    pub fn from_record(record: T) -> Self {
        Self {
            uuid: record.uuid(),
            record: Some(Box::new(record)),
        }
    }

    pub fn set(&mut self, record: T) {
        *self = Self::from_record(record);
    }

    /// 由类型擦除的引用还原；记录类型不符时返回 `TypeMismatch`
    pub fn from_erased(erased: ErasedRef) -> DomainResult<Self> {
        let record = match erased.record {
            Some(boxed) => {
                let found = boxed.entity_schema().name();
                let any = AsAny::into_any(boxed);
                match any.downcast::<T>() {
                    Ok(record) => Some(record),
                    Err(_) => {
                        return Err(DomainError::TypeMismatch {
                            expected: T::schema().name(),
                            found,
                        });
                    }
                }
            }
            None => None,
        };
        Ok(Self {
            uuid: erased.uuid,
            record,
        })
    }
}

impl<T> Default for Ref<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T: Clone> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            uuid: self.uuid,
            record: self.record.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("uuid", &self.uuid)
            .field("record", &self.record)
            .finish()
    }
}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl<T> Serialize for Ref<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.uuid.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Ref<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let uuid = Option::<Uuid>::deserialize(deserializer)?;
        Ok(Self { uuid, record: None })
    }
}

/// 类型擦除的引用值（懒加载结果经由实体的 `set_reference` 写回）
#[derive(Debug, Default)]
pub struct ErasedRef {
    pub uuid: Option<Uuid>,
    pub record: Option<Box<dyn DomainEntity>>,
}

impl ErasedRef {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn loaded(record: Box<dyn DomainEntity>) -> Self {
        Self {
            uuid: record.uuid(),
            record: Some(record),
        }
    }
}

/// 引擎对单一引用字段的操作视图
pub trait ReferenceSlot: Send + Sync {
    fn target_schema(&self) -> &'static EntitySchema;
    fn uuid(&self) -> Option<Uuid>;
    fn is_populated(&self) -> bool;
    fn set_uuid(&mut self, uuid: Option<Uuid>);
}

impl<T: DomainEntity> ReferenceSlot for Ref<T> {
    fn target_schema(&self) -> &'static EntitySchema {
        T::schema()
    }

    fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    fn is_populated(&self) -> bool {
        self.record.is_some()
    }

    fn set_uuid(&mut self, uuid: Option<Uuid>) {
        Ref::set_uuid(self, uuid);
    }
}

/// 引擎对集合字段的操作视图
pub trait RecordList: Send + Sync {
    fn element_schema(&self) -> &'static EntitySchema;

    /// 本次会话是否已加载（或由调用方赋值）
    fn is_loaded(&self) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entity(&self, index: usize) -> Option<&dyn DomainEntity>;

    fn entity_mut(&mut self, index: usize) -> Option<&mut dyn DomainEntity>;

    /// 已持久化元素的 uuid（保持集合顺序）
    fn uuids(&self) -> Vec<Uuid> {
        (0..self.len())
            .filter_map(|i| self.entity(i).and_then(|e| e.uuid()))
            .collect()
    }

    /// 置为已加载的空集合（防止加载过程中重入）
    fn mark_loading(&mut self);

    /// 回到未加载状态
    fn unload(&mut self);

    fn replace(&mut self, records: Vec<Box<dyn DomainEntity>>) -> DomainResult<()>;

    fn sort_by(&mut self, compare: CompareFn);
}

impl<T: DomainEntity> RecordList for Option<Vec<T>> {
    fn element_schema(&self) -> &'static EntitySchema {
        T::schema()
    }

    fn is_loaded(&self) -> bool {
        self.is_some()
    }

    fn len(&self) -> usize {
        self.as_ref().map_or(0, Vec::len)
    }

    fn entity(&self, index: usize) -> Option<&dyn DomainEntity> {
        self.as_ref()?
            .get(index)
            .map(|e| e as &dyn DomainEntity)
    }

    fn entity_mut(&mut self, index: usize) -> Option<&mut dyn DomainEntity> {
        self.as_mut()?
            .get_mut(index)
            .map(|e| e as &mut dyn DomainEntity)
    }

    fn mark_loading(&mut self) {
        *self = Some(Vec::new());
    }

    fn unload(&mut self) {
        *self = None;
    }

    fn replace(&mut self, records: Vec<Box<dyn DomainEntity>>) -> DomainResult<()> {
        let mut typed = Vec::with_capacity(records.len());
        for boxed in records {
            let found = boxed.entity_schema().name();
            match AsAny::into_any(boxed).downcast::<T>() {
                Ok(record) => typed.push(*record),
                Err(_) => {
                    return Err(DomainError::TypeMismatch {
                        expected: T::schema().name(),
                        found,
                    });
                }
            }
        }
        *self = Some(typed);
        Ok(())
    }

    fn sort_by(&mut self, compare: CompareFn) {
        if let Some(records) = self {
            records.sort_by(|a, b| compare(a, b));
        }
    }
}

/// 类型擦除的子记录集合
#[derive(Debug)]
pub struct DynamicList {
    schema: &'static EntitySchema,
    records: Option<Vec<Box<dyn DomainEntity>>>,
}

impl DynamicList {
    pub fn new(schema: &'static EntitySchema) -> Self {
        Self {
            schema,
            records: None,
        }
    }

    pub fn records(&self) -> Option<&[Box<dyn DomainEntity>]> {
        self.records.as_deref()
    }

    pub fn push(&mut self, record: Box<dyn DomainEntity>) {
        self.records.get_or_insert_with(Vec::new).push(record);
    }

    pub fn set(&mut self, records: Vec<Box<dyn DomainEntity>>) {
        self.records = Some(records);
    }
}

impl RecordList for DynamicList {
    fn element_schema(&self) -> &'static EntitySchema {
        self.schema
    }

    fn is_loaded(&self) -> bool {
        self.records.is_some()
    }

    fn len(&self) -> usize {
        self.records.as_ref().map_or(0, Vec::len)
    }

    fn entity(&self, index: usize) -> Option<&dyn DomainEntity> {
        self.records.as_ref()?.get(index).map(|b| &**b)
    }

    fn entity_mut(&mut self, index: usize) -> Option<&mut dyn DomainEntity> {
        match self.records.as_mut()?.get_mut(index) {
            Some(b) => Some(&mut **b),
            None => None,
        }
    }

    fn mark_loading(&mut self) {
        self.records = Some(Vec::new());
    }

    fn unload(&mut self) {
        self.records = None;
    }

    fn replace(&mut self, records: Vec<Box<dyn DomainEntity>>) -> DomainResult<()> {
        if let Some(wrong) = records
            .iter()
            .find(|r| r.entity_schema().type_id() != self.schema.type_id())
        {
            return Err(DomainError::TypeMismatch {
                expected: self.schema.name(),
                found: wrong.entity_schema().name(),
            });
        }
        self.records = Some(records);
        Ok(())
    }

    fn sort_by(&mut self, compare: CompareFn) {
        if let Some(records) = &mut self.records {
            records.sort_by(|a, b| compare(&**a, &**b));
        }
    }
}
