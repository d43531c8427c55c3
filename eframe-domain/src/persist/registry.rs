use crate::entity::DomainEntity;
use crate::error::{DomainError, DomainResult};
use crate::persist::{ErasedRepository, Repository, TypedRepository};
use crate::schema::EntitySchema;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::TypeId;
use std::sync::Arc;

/// 仓储注册表
/// - 以实体的 TypeId 为键登记仓储
/// - 运行时以类型擦除方式解析
#[derive(Default)]
pub struct RepositoryRegistry {
    repositories: DashMap<TypeId, Arc<dyn ErasedRepository>>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记实体 `E` 的仓储（重复登记时覆盖）
    pub fn register<E, R>(&self, repository: R)
    where
        E: DomainEntity + Default + Serialize + DeserializeOwned,
        R: Repository<E> + 'static,
    {
        let erased: Arc<dyn ErasedRepository> = Arc::new(TypedRepository::new(repository));
        self.repositories.insert(TypeId::of::<E>(), erased);
    }

    /// 链式登记
    pub fn with<E, R>(self, repository: R) -> Self
    where
        E: DomainEntity + Default + Serialize + DeserializeOwned,
        R: Repository<E> + 'static,
    {
        self.register::<E, R>(repository);
        self
    }

    pub fn contains(&self, schema: &EntitySchema) -> bool {
        self.repositories.contains_key(&schema.type_id())
    }

    pub fn resolve(&self, schema: &EntitySchema) -> DomainResult<Arc<dyn ErasedRepository>> {
        self.repositories
            .get(&schema.type_id())
            .map(|r| r.value().clone())
            .ok_or(DomainError::MissingRepository {
                entity: schema.name(),
            })
    }
}
