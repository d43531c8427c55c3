use eframe_domain::Ref;
use eframe_domain::entity::DomainEntity;
use eframe_domain::schema::{FieldKind, RelationKind};
use eframe_macros::domain_entity;

#[domain_entity(table = "customer_orders")]
struct Order {
    #[text]
    customer_name: String,
    #[column(length = 20, nullable = true)]
    reference: Option<String>,
    #[one_to_many(mapped_by = "order")]
    lines: Option<Vec<OrderLine>>,
}

#[domain_entity(order_by = "sequence")]
struct OrderLine {
    sequence: i32,
    #[many_to_one]
    order: Ref<Order>,
}

fn main() {
    let schema = Order::schema();
    assert_eq!(schema.name(), "Order");
    assert_eq!(schema.fields()[0].name(), "uuid");
    assert_eq!(schema.field("customer_name").map(|f| f.kind()), Some(FieldKind::Text));
    assert_eq!(schema.relation("lines").map(|r| r.kind()), Some(RelationKind::Children));
    assert!(OrderLine::schema().is_ordered());

    let line = OrderLine::default();
    assert!(line.uuid().is_none());
    let _ = format!("{line:?}");
}
