//! 领域实体（Domain Entity）
//!
//! 定义引擎管理的记录需要满足的契约：
//! - 静态结构描述（[`EntitySchema`]）与 uuid 标识；
//! - 实例级领域设置（加载簿记）；
//! - 引擎访问字段所需的访问器表（列值、集合、引用）；
//! - 可选的生命周期钩子（保存前、校验前、删除前、自定义校验）。
//!
//! 通常由 `#[domain_entity]` 宏生成实现，无需手写。
//!
use crate::column::ColumnValue;
use crate::custom::FieldHolderMap;
use crate::engine::DomainEngine;
use crate::error::DomainResult;
use crate::relation::{ErasedRef, RecordList, ReferenceSlot};
use crate::schema::{EntitySchema, Relation};
use crate::settings::DomainSettings;
use crate::validate::ValidationError;
use async_trait::async_trait;
use std::any::Any;
use std::fmt::Debug;
use uuid::Uuid;

/// 类型擦除辅助：用于从 `dyn DomainEntity` 还原具体类型
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }
}

/// 自定义校验结果：无错误、单个错误或多个错误
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CustomValidation {
    #[default]
    Valid,
    Error(ValidationError),
    Errors(Vec<ValidationError>),
}

impl CustomValidation {
    pub fn into_errors(self) -> Vec<ValidationError> {
        match self {
            CustomValidation::Valid => Vec::new(),
            CustomValidation::Error(e) => vec![e],
            CustomValidation::Errors(errors) => errors,
        }
    }
}

impl From<()> for CustomValidation {
    fn from(_: ()) -> Self {
        CustomValidation::Valid
    }
}

impl From<ValidationError> for CustomValidation {
    fn from(value: ValidationError) -> Self {
        CustomValidation::Error(value)
    }
}

impl From<Option<ValidationError>> for CustomValidation {
    fn from(value: Option<ValidationError>) -> Self {
        value.map_or(CustomValidation::Valid, CustomValidation::Error)
    }
}

impl From<Vec<ValidationError>> for CustomValidation {
    fn from(value: Vec<ValidationError>) -> Self {
        CustomValidation::Errors(value)
    }
}

/// 生命周期钩子；均有空实现，按需覆盖
///
/// 钩子返回的错误原样向上传播，并中止后续流程。
pub trait EntityHooks {
    fn before_save(&mut self) -> DomainResult<()> {
        Ok(())
    }

    fn before_validate(&mut self) -> DomainResult<()> {
        Ok(())
    }

    fn before_delete(&mut self) -> DomainResult<()> {
        Ok(())
    }

    fn validate(&self) -> CustomValidation {
        CustomValidation::Valid
    }
}

/// 引擎可管理的记录
pub trait DomainEntity: AsAny + EntityHooks + Debug + Send + Sync + 'static {
    fn schema() -> &'static EntitySchema
    where
        Self: Sized;

    fn entity_schema(&self) -> &'static EntitySchema;

    fn uuid(&self) -> Option<Uuid>;

    fn set_uuid(&mut self, uuid: Option<Uuid>);

    fn domain_settings(&self) -> &DomainSettings;

    fn domain_settings_mut(&mut self) -> &mut DomainSettings;

    /// 持久化属性的列值视图；未知属性返回 `None`
    fn column_value(&self, property: &str) -> Option<ColumnValue<'_>>;

    /// 集合字段（静态声明的或自定义字段贡献的）
    fn relation_list_mut(&mut self, relation: &Relation) -> Option<&mut dyn RecordList>;

    fn reference_mut(&mut self, field: &str) -> Option<&mut dyn ReferenceSlot>;

    /// 写回懒加载得到的引用；声明了 setter 时经由 setter 赋值
    fn set_reference(&mut self, field: &str, value: ErasedRef) -> DomainResult<()>;

    fn field_holder(&self) -> Option<&FieldHolderMap> {
        None
    }

    fn field_holder_mut(&mut self) -> Option<&mut FieldHolderMap> {
        None
    }

    /// 简短描述（类型名 + uuid），用于错误与日志
    fn describe(&self) -> String {
        match self.uuid() {
            Some(uuid) => format!("{}(uuid: {uuid})", self.entity_schema().name()),
            None => format!("{}(unsaved)", self.entity_schema().name()),
        }
    }
}

/// 记录上的便捷方法：`record.save(&engine).await?`
#[async_trait]
pub trait EntityOps: DomainEntity + Sized {
    async fn save(&mut self, engine: &DomainEngine) -> DomainResult<()>;

    async fn delete(&mut self, engine: &DomainEngine) -> DomainResult<()>;
}

#[async_trait]
impl<T: DomainEntity + Sized> EntityOps for T {
    async fn save(&mut self, engine: &DomainEngine) -> DomainResult<()> {
        engine.save(self).await
    }

    async fn delete(&mut self, engine: &DomainEngine) -> DomainResult<()> {
        engine.delete(self).await
    }
}
