//! 持久化协作者（persist）
//!
//! 引擎只依赖这里定义的接口：
//! - 每种实体一个仓储（`Repository`），经 `RepositoryRegistry` 按类型解析；
//! - 事务管理（`TransactionManager`）与有界作用域执行（`TransactionManagerExt`）；
//! - 多对多连接表读写（`JoinTableOperations`）。
//!
//! 具体存储后端由上层实现并注入；`InMemoryStore` 是一个完整的内存参考实现。
//!
mod join_table;
mod memory;
mod registry;
mod repository;
mod transaction;

pub use join_table::{JoinTable, JoinTableOperations};
pub use memory::{InMemoryRepository, InMemoryStore};
pub use registry::RepositoryRegistry;
pub use repository::{ErasedRepository, Repository, TypedRepository, downcast_records};
pub use transaction::{TransactionManager, TransactionManagerExt, TransactionStatus};
