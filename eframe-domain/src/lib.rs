//! 领域实体持久化引擎（eframe-domain）
//!
//! 管理领域实体（记录）在可插拔仓储层之上的生命周期：
//! - 保存/删除编排（`engine`），含列级校验与自定义校验钩子（`validate`）；
//! - 一对多（拥有的子记录）与多对多（连接表）关系的级联持久化；
//! - 子记录集合、多对多集合与单一外键引用的懒加载（`relation`）；
//! - 事务委托与实例级领域设置簿记（`persist`、`settings`）；
//! - 由结构描述推导的持久化属性（`schema`、`persistent_property`）；
//! - 自定义字段扩展（`custom`）。
//!
//! 实体通常通过 `eframe-macros` 中的 `#[domain_entity]` 声明，宏会生成结构描述与
//! 引擎所需的访问器表；引擎本身是显式构建、注入全部协作者的对象。
//!
//! 典型用法：
//! 1. 用 `#[domain_entity]` 声明实体及其关系；
//! 2. 为每种实体在 `RepositoryRegistry` 中登记仓储（或使用 `InMemoryStore`）；
//! 3. 通过 `DomainEngine::builder()` 组装引擎；
//! 4. 调用 `engine.save(&mut record)` / `record.save(&engine)` 等操作。
//!
pub mod column;
pub mod custom;
pub mod engine;
pub mod entity;
pub mod error;
pub mod naming;
pub mod persist;
pub mod persistent_property;
pub mod relation;
pub mod schema;
pub mod settings;
pub mod validate;

pub use engine::{DomainEngine, DomainEngineConfig, DomainSaveEvent};
pub use entity::{CustomValidation, DomainEntity, EntityHooks, EntityOps};
pub use error::{DomainError, DomainResult, StorageError, StorageResult};
pub use relation::Ref;

// 供宏生成代码使用
pub use uuid;

// 允许在本 crate 内部通过 ::eframe_domain 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::eframe_domain 路径。
extern crate self as eframe_domain;
