#![allow(dead_code)]

use eframe_domain::custom::{CustomFieldRegistry, FieldHolderMap};
use eframe_domain::entity::{CustomValidation, EntityHooks};
use eframe_domain::persist::{InMemoryRepository, InMemoryStore, RepositoryRegistry};
use eframe_domain::validate::ValidationError;
use eframe_domain::{
    DomainEngine, DomainEngineConfig, DomainError, DomainResult, DomainSaveEvent, Ref,
};
use eframe_macros::domain_entity;
use std::sync::Arc;
use tokio::sync::broadcast;

#[domain_entity]
pub struct Customer {
    pub name: String,
}

#[domain_entity]
pub struct Order {
    #[text]
    pub customer_name: String,
    #[column(length = 30)]
    pub reference: Option<String>,
    #[nullable]
    #[many_to_one(target = Customer)]
    pub customer: Ref<Customer>,
    #[one_to_many(mapped_by = "order")]
    pub lines: Option<Vec<OrderLine>>,
    #[many_to_many(mapped_by = "order_tags")]
    pub tags: Option<Vec<Tag>>,
    #[extensible_field_holder]
    pub custom_fields: FieldHolderMap,
}

#[domain_entity(order_by = "sequence")]
pub struct OrderLine {
    pub sequence: i32,
    pub product: String,
    #[many_to_one]
    pub order: Ref<Order>,
}

#[domain_entity]
pub struct Tag {
    pub label: String,
}

/// 通过自定义字段挂到订单上的备注
#[domain_entity(hooks)]
pub struct Note {
    pub body: String,
    #[many_to_one]
    pub order: Ref<Order>,
}

/// 置顶备注不允许删除
pub const PINNED_NOTE: &str = "pinned";

impl EntityHooks for Note {
    fn before_delete(&mut self) -> DomainResult<()> {
        if self.body == PINNED_NOTE {
            return Err(DomainError::InvalidState {
                reason: "note is pinned".into(),
            });
        }
        Ok(())
    }
}

#[domain_entity(hooks)]
pub struct Invoice {
    pub number: String,
    #[transient]
    pub locked: bool,
}

pub const INVOICE_PREFIX_REJECTED: u32 = 100;

impl EntityHooks for Invoice {
    fn before_save(&mut self) -> DomainResult<()> {
        if self.locked {
            return Err(DomainError::InvalidState {
                reason: "invoice is locked".into(),
            });
        }
        self.number = self.number.trim().to_string();
        Ok(())
    }

    fn before_delete(&mut self) -> DomainResult<()> {
        if self.locked {
            return Err(DomainError::InvalidState {
                reason: "invoice is locked".into(),
            });
        }
        Ok(())
    }

    fn validate(&self) -> CustomValidation {
        if self.number.starts_with('X') {
            ValidationError::new(INVOICE_PREFIX_REJECTED, "number")
                .with_arg("X")
                .into()
        } else {
            CustomValidation::Valid
        }
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub custom: Arc<CustomFieldRegistry>,
    pub events: broadcast::Sender<DomainSaveEvent>,
    pub engine: DomainEngine,
}

pub fn harness() -> Harness {
    harness_with(DomainEngineConfig::default())
}

pub fn harness_with(config: DomainEngineConfig) -> Harness {
    let store = InMemoryStore::new();
    let registry = RepositoryRegistry::new()
        .with::<Customer, _>(InMemoryRepository::<Customer>::new(store.clone()))
        .with::<Order, _>(InMemoryRepository::<Order>::new(store.clone()))
        .with::<OrderLine, _>(InMemoryRepository::<OrderLine>::new(store.clone()))
        .with::<Tag, _>(InMemoryRepository::<Tag>::new(store.clone()))
        .with::<Note, _>(InMemoryRepository::<Note>::new(store.clone()))
        .with::<Invoice, _>(InMemoryRepository::<Invoice>::new(store.clone()));
    let custom = Arc::new(CustomFieldRegistry::new());
    let (events, _rx) = broadcast::channel(64);

    let engine = DomainEngine::builder()
        .registry(Arc::new(registry))
        .transactions(store.clone())
        .join_tables(store.clone())
        .extensions(custom.clone())
        .config(config)
        .events(events.clone())
        .build();

    Harness {
        store,
        custom,
        events,
        engine,
    }
}

pub fn order(customer_name: &str) -> Order {
    Order {
        customer_name: customer_name.into(),
        ..Default::default()
    }
}

pub fn line(sequence: i32, product: &str) -> OrderLine {
    OrderLine {
        sequence,
        product: product.into(),
        ..Default::default()
    }
}

pub fn tag(label: &str) -> Tag {
    Tag {
        label: label.into(),
        ..Default::default()
    }
}
