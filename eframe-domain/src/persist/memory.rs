//! 基于内存的参考存储实现
//!
//! - 每张表以 JSON 行保存（保持插入顺序），外键引用保存为 uuid；
//! - 行与连接表行的写入都记录在事务的撤销日志中，回滚/放弃时逆序撤销；
//! - 记录每张表的查询次数，便于在测试中断言懒加载只查询一次。
//!
//! 仅用于测试与演示，不追求性能。
//!
use crate::entity::DomainEntity;
use crate::error::{StorageError, StorageResult};
use crate::naming::{NamingStrategy, UnderscoreSeparatedLowerCase};
use crate::persist::{JoinTable, JoinTableOperations, Repository, TransactionManager, TransactionStatus};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Undo {
    RowInserted { table: String, uuid: Uuid },
    RowUpdated { table: String, previous: Value },
    RowDeleted { table: String, position: usize, row: Value },
    LinkInserted { table: String, from: Uuid, to: Uuid },
    LinksDeleted { table: String, links: Vec<(Uuid, Uuid)> },
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: DashMap<String, Vec<Value>>,
    join_tables: DashMap<String, Vec<(Uuid, Uuid)>>,
    undo_logs: DashMap<u64, Vec<Undo>>,
    next_tx: AtomicU64,
    queries: DashMap<String, u64>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 表内全部行（测试辅助）
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .get(table)
            .map(|rows| rows.value().clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |rows| rows.len())
    }

    pub fn contains(&self, table: &str, uuid: Uuid) -> bool {
        self.tables
            .get(table)
            .is_some_and(|rows| rows.iter().any(|row| row_uuid(row) == Some(uuid)))
    }

    /// 绕过仓储直接删除一行（模拟并发删除）
    pub fn remove_row(&self, table: &str, uuid: Uuid) -> bool {
        match self.tables.get_mut(table) {
            Some(mut rows) => {
                let before = rows.len();
                rows.retain(|row| row_uuid(row) != Some(uuid));
                rows.len() != before
            }
            None => false,
        }
    }

    /// 连接表中某拥有方的被引用 uuid（按插入顺序）
    pub fn linked(&self, join_table: &str, from: Uuid) -> Vec<Uuid> {
        self.join_tables
            .get(join_table)
            .map(|links| {
                links
                    .iter()
                    .filter(|(f, _)| *f == from)
                    .map(|(_, to)| *to)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn query_count(&self, table: &str) -> u64 {
        self.queries.get(table).map_or(0, |n| *n)
    }

    pub fn total_queries(&self) -> u64 {
        self.queries.iter().map(|n| *n.value()).sum()
    }

    pub fn reset_query_counts(&self) {
        self.queries.clear();
    }

    fn count_query(&self, table: &str) {
        *self.queries.entry(table.to_string()).or_default() += 1;
    }

    fn log_undo(&self, status: &TransactionStatus, entry: Undo) -> StorageResult<()> {
        match self.undo_logs.get_mut(&status.id()) {
            Some(mut log) => {
                log.push(entry);
                Ok(())
            }
            None => Err(StorageError::NoTransaction(format!(
                "transaction {} is not known to this store",
                status.id()
            ))),
        }
    }

    /// 写操作前的校验：事务活动、可写，且由本存储开启
    fn check_writable(&self, status: &TransactionStatus, operation: &str) -> StorageResult<()> {
        self.check_transaction(status, operation)?;
        status.ensure_writable(operation)
    }

    fn check_transaction(&self, status: &TransactionStatus, operation: &str) -> StorageResult<()> {
        status.ensure_active(operation)?;
        if self.undo_logs.contains_key(&status.id()) {
            Ok(())
        } else {
            Err(StorageError::NoTransaction(format!(
                "{operation}: transaction {} is not known to this store",
                status.id()
            )))
        }
    }

    fn undo(&self, status: &TransactionStatus) {
        let Some((_, log)) = self.undo_logs.remove(&status.id()) else {
            return;
        };
        trace!(tx = status.id(), entries = log.len(), "undo");
        for entry in log.into_iter().rev() {
            match entry {
                Undo::RowInserted { table, uuid } => {
                    if let Some(mut rows) = self.tables.get_mut(&table) {
                        rows.retain(|row| row_uuid(row) != Some(uuid));
                    }
                }
                Undo::RowUpdated { table, previous } => {
                    let uuid = row_uuid(&previous);
                    if let Some(mut rows) = self.tables.get_mut(&table) {
                        if let Some(row) = rows.iter_mut().find(|row| row_uuid(row) == uuid) {
                            *row = previous;
                        }
                    }
                }
                Undo::RowDeleted {
                    table,
                    position,
                    row,
                } => {
                    let mut rows = self.tables.entry(table).or_default();
                    let position = position.min(rows.len());
                    rows.insert(position, row);
                }
                Undo::LinkInserted { table, from, to } => {
                    if let Some(mut links) = self.join_tables.get_mut(&table) {
                        if let Some(pos) = links.iter().rposition(|l| *l == (from, to)) {
                            links.remove(pos);
                        }
                    }
                }
                Undo::LinksDeleted { table, links } => {
                    self.join_tables.entry(table).or_default().extend(links);
                }
            }
        }
    }
}

fn row_uuid(row: &Value) -> Option<Uuid> {
    row.get("uuid")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

#[async_trait]
impl TransactionManager for InMemoryStore {
    async fn begin(&self, read_only: bool) -> StorageResult<TransactionStatus> {
        let id = self.next_tx.fetch_add(1, Ordering::Relaxed) + 1;
        self.undo_logs.insert(id, Vec::new());
        Ok(TransactionStatus::new(id, read_only))
    }

    async fn commit(&self, status: &TransactionStatus) -> StorageResult<()> {
        status.ensure_active("commit")?;
        self.undo_logs.remove(&status.id());
        status.finish();
        trace!(tx = status.id(), "commit");
        Ok(())
    }

    async fn rollback(&self, status: &TransactionStatus) -> StorageResult<()> {
        status.ensure_active("rollback")?;
        self.undo(status);
        status.finish();
        trace!(tx = status.id(), "rollback");
        Ok(())
    }

    fn abandon(&self, status: &TransactionStatus) {
        self.undo(status);
        status.finish();
    }
}

#[async_trait]
impl JoinTableOperations for InMemoryStore {
    async fn delete_links(
        &self,
        status: &TransactionStatus,
        join: &JoinTable,
        from: Uuid,
    ) -> StorageResult<u64> {
        self.check_writable(status, "delete_links")?;

        let removed: Vec<(Uuid, Uuid)> = match self.join_tables.get_mut(&join.table) {
            Some(mut links) => {
                let (gone, kept): (Vec<_>, Vec<_>) =
                    links.iter().copied().partition(|(f, _)| *f == from);
                *links = kept;
                gone
            }
            None => Vec::new(),
        };
        let count = removed.len() as u64;
        if !removed.is_empty() {
            self.log_undo(
                status,
                Undo::LinksDeleted {
                    table: join.table.clone(),
                    links: removed,
                },
            )?;
        }
        Ok(count)
    }

    async fn insert_link(
        &self,
        status: &TransactionStatus,
        join: &JoinTable,
        from: Uuid,
        to: Uuid,
    ) -> StorageResult<()> {
        self.check_writable(status, "insert_link")?;

        self.join_tables
            .entry(join.table.clone())
            .or_default()
            .push((from, to));
        self.log_undo(
            status,
            Undo::LinkInserted {
                table: join.table.clone(),
                from,
                to,
            },
        )
    }

    async fn select_linked(
        &self,
        status: &TransactionStatus,
        join: &JoinTable,
        from: Uuid,
    ) -> StorageResult<Vec<Value>> {
        self.check_transaction(status, "select_linked")?;
        self.count_query(&join.table);

        let targets = self.linked(&join.table, from);
        let rows = self.rows(&join.target_table);
        Ok(targets
            .into_iter()
            .filter_map(|to| rows.iter().find(|row| row_uuid(row) == Some(to)).cloned())
            .collect())
    }
}

/// 基于 [`InMemoryStore`] 的通用仓储
pub struct InMemoryRepository<E> {
    store: Arc<InMemoryStore>,
    table: String,
    _marker: PhantomData<fn() -> E>,
}

impl<E: DomainEntity> InMemoryRepository<E> {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self::with_naming(store, &UnderscoreSeparatedLowerCase)
    }

    pub fn with_naming(store: Arc<InMemoryStore>, naming: &dyn NamingStrategy) -> Self {
        Self {
            store,
            table: E::schema().table_name(naming),
            _marker: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn decode(&self, row: Value) -> StorageResult<E>
    where
        E: DeserializeOwned,
    {
        Ok(serde_json::from_value(row)?)
    }

    fn encode(&self, record: &E) -> StorageResult<Value>
    where
        E: Serialize,
    {
        Ok(serde_json::to_value(record)?)
    }
}

#[async_trait]
impl<E> Repository<E> for InMemoryRepository<E>
where
    E: DomainEntity + Serialize + DeserializeOwned,
{
    async fn find_all(&self) -> StorageResult<Vec<E>> {
        self.store.count_query(&self.table);
        self.store
            .rows(&self.table)
            .into_iter()
            .map(|row| self.decode(row))
            .collect()
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> StorageResult<Option<E>> {
        self.store.count_query(&self.table);
        self.store
            .rows(&self.table)
            .into_iter()
            .find(|row| row_uuid(row) == Some(uuid))
            .map(|row| self.decode(row))
            .transpose()
    }

    async fn find_all_by(&self, property: &str, uuid: Uuid) -> StorageResult<Vec<E>> {
        if E::schema().property(property).is_none() {
            return Err(StorageError::UnknownProperty {
                table: self.table.clone(),
                property: property.to_string(),
            });
        }
        self.store.count_query(&self.table);
        let wanted = Value::String(uuid.to_string());
        self.store
            .rows(&self.table)
            .into_iter()
            .filter(|row| row.get(property) == Some(&wanted))
            .map(|row| self.decode(row))
            .collect()
    }

    async fn save(&self, status: &TransactionStatus, record: &mut E) -> StorageResult<()> {
        self.store.check_writable(status, "insert")?;
        let uuid = record.uuid().unwrap_or_else(Uuid::new_v4);
        if self.store.contains(&self.table, uuid) {
            return Err(StorageError::wrap(
                format!("insert into {}", self.table),
                StorageError::DataAccess {
                    message: "Error executing SQL INSERT".into(),
                    source: Some(Box::new(StorageError::Constraint(format!(
                        "{}_pkey",
                        self.table
                    )))),
                },
            ));
        }

        let mut row = self.encode(record)?;
        if let Value::Object(map) = &mut row {
            map.insert("uuid".into(), Value::String(uuid.to_string()));
        }
        self.store
            .tables
            .entry(self.table.clone())
            .or_default()
            .push(row);
        self.store.log_undo(
            status,
            Undo::RowInserted {
                table: self.table.clone(),
                uuid,
            },
        )?;
        record.set_uuid(Some(uuid));
        Ok(())
    }

    async fn update(&self, status: &TransactionStatus, record: &E) -> StorageResult<u64> {
        self.store.check_writable(status, "update")?;
        let Some(uuid) = record.uuid() else {
            return Ok(0);
        };
        let row = self.encode(record)?;
        let previous = {
            let Some(mut rows) = self.store.tables.get_mut(&self.table) else {
                return Ok(0);
            };
            match rows.iter_mut().find(|r| row_uuid(r) == Some(uuid)) {
                Some(existing) => std::mem::replace(existing, row),
                None => return Ok(0),
            }
        };
        self.store.log_undo(
            status,
            Undo::RowUpdated {
                table: self.table.clone(),
                previous,
            },
        )?;
        Ok(1)
    }

    async fn delete(&self, status: &TransactionStatus, record: &E) -> StorageResult<u64> {
        self.store.check_writable(status, "delete")?;
        let Some(uuid) = record.uuid() else {
            return Ok(0);
        };
        let removed = {
            let Some(mut rows) = self.store.tables.get_mut(&self.table) else {
                return Ok(0);
            };
            match rows.iter().position(|r| row_uuid(r) == Some(uuid)) {
                Some(position) => (position, rows.remove(position)),
                None => return Ok(0),
            }
        };
        let (position, row) = removed;
        self.store.log_undo(
            status,
            Undo::RowDeleted {
                table: self.table.clone(),
                position,
                row,
            },
        )?;
        Ok(1)
    }
}
