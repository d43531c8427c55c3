//! 领域层统一错误定义
//!
//! 聚焦校验失败、存储失败（剥离包装层后的根因）、并发更新、悬空引用与仓储装配等
//! 最小必要集合，便于调用方按类别处理。
//!
use crate::validate::ValidationError;
use thiserror::Error;
use uuid::Uuid;

/// 统一错误类型（引擎对调用方暴露的全部失败类别）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 校验 ---
    #[error("validation failed for {record} ({} error(s))", .errors.len())]
    ValidationFailed {
        errors: Vec<ValidationError>,
        record: String,
    },

    // --- 存储 ---
    #[error("storage failure: {0}")]
    Storage(StorageError),
    #[error("update failed (probably updated by another user): {entity}(uuid: {uuid:?})")]
    ConcurrentUpdate {
        entity: &'static str,
        uuid: Option<Uuid>,
    },
    #[error(
        "{parent}(uuid: {parent_uuid:?}) foreign reference ({field}, uuid: {uuid}) not found in storage"
    )]
    DanglingReference {
        parent: &'static str,
        parent_uuid: Option<Uuid>,
        field: String,
        uuid: Uuid,
    },

    // --- 装配/契约 ---
    #[error("missing repository for {entity}")]
    MissingRepository { entity: &'static str },
    #[error("unknown property: {entity}.{property}")]
    UnknownProperty {
        entity: &'static str,
        property: String,
    },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    // --- 领域规则（钩子可直接返回） ---
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },
    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },

    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
}

impl DomainError {
    /// 校验失败时返回错误列表，其余情况返回空切片
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            DomainError::ValidationFailed { errors, .. } => errors,
            _ => &[],
        }
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

/// 存储层错误
///
/// 仓储、事务与连接表实现返回该类型。`Wrapped` 与 `DataAccess` 仅是包装层，
/// 转换为 [`DomainError`] 时会被逐层剥离，调用方看到的是真正的根因。
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{context}: {source}")]
    Wrapped {
        context: String,
        #[source]
        source: Box<StorageError>,
    },
    #[error("data access error: {message}")]
    DataAccess {
        message: String,
        #[source]
        source: Option<Box<StorageError>>,
    },
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("no active transaction: {0}")]
    NoTransaction(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("unknown property: {table}.{property}")]
    UnknownProperty { table: String, property: String },
    #[error("row serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    /// 以上下文包装一个底层错误
    pub fn wrap(context: impl Into<String>, source: StorageError) -> Self {
        StorageError::Wrapped {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// 剥离所有包装层，返回根因
    pub fn root_cause(self) -> StorageError {
        let mut current = self;
        loop {
            current = match current {
                StorageError::Wrapped { source, .. } => *source,
                StorageError::DataAccess {
                    source: Some(source),
                    ..
                } => *source,
                other => return other,
            };
        }
    }
}

/// 存储层 Result 类型别名
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for DomainError {
    fn from(err: StorageError) -> Self {
        DomainError::Storage(err.root_cause())
    }
}

// ---- Cross-crate conversions for infrastructure convenience ----
// 允许在基础设施层直接使用 `?` 将 sqlx 错误转换为 StorageError

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => {
                if db.is_unique_violation() || db.is_foreign_key_violation() {
                    StorageError::Constraint(db.to_string())
                } else {
                    StorageError::DataAccess {
                        message: db.to_string(),
                        source: None,
                    }
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::Connection(err.to_string())
            }
            other => StorageError::DataAccess {
                message: other.to_string(),
                source: None,
            },
        }
    }
}
