use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// 记录保存成功后广播的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainSaveEvent {
    pub entity: &'static str,
    pub uuid: Uuid,
    pub saved_at: DateTime<Utc>,
}

impl DomainSaveEvent {
    pub fn new(entity: &'static str, uuid: Uuid) -> Self {
        Self {
            entity,
            uuid,
            saved_at: Utc::now(),
        }
    }
}

impl fmt::Display for DomainSaveEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DomainSaveEvent{{entity={}, uuid={}}}", self.entity, self.uuid)
    }
}
