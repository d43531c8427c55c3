//! 命名策略：逻辑名（类型名/字段名）到物理名（表名/列名）的映射
//!
use convert_case::{Case, Casing};
use std::sync::Arc;

pub trait NamingStrategy: Send + Sync {
    fn mapped_name(&self, name: &str) -> String;
}

impl<T> NamingStrategy for Arc<T>
where
    T: NamingStrategy + ?Sized,
{
    fn mapped_name(&self, name: &str) -> String {
        (**self).mapped_name(name)
    }
}

/// 默认策略：下划线分隔的小写形式（`OrderLine` -> `order_line`）
#[derive(Debug, Clone, Copy, Default)]
pub struct UnderscoreSeparatedLowerCase;

impl NamingStrategy for UnderscoreSeparatedLowerCase {
    fn mapped_name(&self, name: &str) -> String {
        name.to_case(Case::Snake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_type_and_field_names() {
        let naming = UnderscoreSeparatedLowerCase;
        assert_eq!(naming.mapped_name("OrderLine"), "order_line");
        assert_eq!(naming.mapped_name("customerName"), "customer_name");
        assert_eq!(naming.mapped_name("customer_name"), "customer_name");
        assert_eq!(naming.mapped_name("Order"), "order");
    }
}
