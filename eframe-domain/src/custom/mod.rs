//! 自定义字段（Custom Fields）
//!
//! - `FieldHolderMap`：实体上保存自定义字段值与动态子记录集合的容器
//! - `ExtensibleFieldHelper`：为实体贡献额外子记录关系的扩展点
//!
mod extension;
mod field_holder;

pub use extension::*;
pub use field_holder::*;
