//! 事务管理
//!
//! 工作单元只能在显式的事务作用域内执行：`execute_read`/`execute_write` 负责开启事务、
//! 成功时提交、失败时回滚；若 future 在中途被丢弃（取消或 panic），守卫会同步放弃事务，
//! 保证连接在任何退出路径上都被释放。
//!
use crate::error::{DomainResult, StorageError, StorageResult};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{trace, warn};

/// 活动事务的句柄
#[derive(Debug, Clone)]
pub struct TransactionStatus {
    id: u64,
    read_only: bool,
    active: Arc<AtomicBool>,
}

impl TransactionStatus {
    pub fn new(id: u64, read_only: bool) -> Self {
        Self {
            id,
            read_only,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// 标记事务已结束（提交、回滚或放弃后由实现调用）
    pub fn finish(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// 校验事务仍处于活动状态
    pub fn ensure_active(&self, operation: &str) -> StorageResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(StorageError::NoTransaction(format!(
                "{operation} requires an active transaction (tx {} already completed)",
                self.id
            )))
        }
    }

    /// 校验事务可写
    pub fn ensure_writable(&self, operation: &str) -> StorageResult<()> {
        self.ensure_active(operation)?;
        if self.read_only {
            return Err(StorageError::Other(format!(
                "{operation} not allowed in read-only transaction {}",
                self.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self, read_only: bool) -> StorageResult<TransactionStatus>;

    async fn commit(&self, status: &TransactionStatus) -> StorageResult<()>;

    async fn rollback(&self, status: &TransactionStatus) -> StorageResult<()>;

    /// 同步放弃事务（守卫在 future 被丢弃时调用），不得阻塞
    fn abandon(&self, status: &TransactionStatus);
}

#[async_trait]
impl<T> TransactionManager for Arc<T>
where
    T: TransactionManager + ?Sized,
{
    async fn begin(&self, read_only: bool) -> StorageResult<TransactionStatus> {
        (**self).begin(read_only).await
    }

    async fn commit(&self, status: &TransactionStatus) -> StorageResult<()> {
        (**self).commit(status).await
    }

    async fn rollback(&self, status: &TransactionStatus) -> StorageResult<()> {
        (**self).rollback(status).await
    }

    fn abandon(&self, status: &TransactionStatus) {
        (**self).abandon(status)
    }
}

struct TransactionGuard<'a, M: TransactionManager + ?Sized> {
    manager: &'a M,
    status: TransactionStatus,
}

impl<M: TransactionManager + ?Sized> Drop for TransactionGuard<'_, M> {
    fn drop(&mut self) {
        if self.status.is_active() {
            warn!(tx = self.status.id(), "transaction scope dropped early, abandoning");
            self.manager.abandon(&self.status);
        }
    }
}

/// 在有界事务作用域内执行工作单元
pub trait TransactionManagerExt: TransactionManager {
    fn execute_write<'a, F, Fut, T>(&'a self, work: F) -> BoxFuture<'a, DomainResult<T>>
    where
        F: FnOnce(TransactionStatus) -> Fut + Send + 'a,
        Fut: Future<Output = DomainResult<T>> + Send + 'a,
        T: Send + 'a,
    {
        run_in_transaction(self, false, work)
    }

    fn execute_read<'a, F, Fut, T>(&'a self, work: F) -> BoxFuture<'a, DomainResult<T>>
    where
        F: FnOnce(TransactionStatus) -> Fut + Send + 'a,
        Fut: Future<Output = DomainResult<T>> + Send + 'a,
        T: Send + 'a,
    {
        run_in_transaction(self, true, work)
    }
}

impl<M: TransactionManager + ?Sized> TransactionManagerExt for M {}

fn run_in_transaction<'a, M, F, Fut, T>(
    manager: &'a M,
    read_only: bool,
    work: F,
) -> BoxFuture<'a, DomainResult<T>>
where
    M: TransactionManager + ?Sized,
    F: FnOnce(TransactionStatus) -> Fut + Send + 'a,
    Fut: Future<Output = DomainResult<T>> + Send + 'a,
    T: Send + 'a,
{
    Box::pin(async move {
        let status = manager.begin(read_only).await?;
        trace!(tx = status.id(), read_only, "transaction started");
        let guard = TransactionGuard {
            manager,
            status: status.clone(),
        };

        let result = work(status.clone()).await;

        let outcome = match result {
            Ok(value) => manager.commit(&status).await.map(|_| value).map_err(Into::into),
            Err(err) => {
                if let Err(rollback_err) = manager.rollback(&status).await {
                    warn!(tx = status.id(), error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        };
        drop(guard);
        outcome
    })
}
