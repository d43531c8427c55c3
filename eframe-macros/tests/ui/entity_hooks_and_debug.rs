use eframe_domain::entity::{CustomValidation, DomainEntity, EntityHooks};
use eframe_domain::validate::ValidationError;
use eframe_macros::domain_entity;

#[domain_entity(hooks, debug = false)]
struct Product {
    name: String,
    #[transient]
    scratch: u32,
}

impl std::fmt::Debug for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Product({})", self.name)
    }
}

impl EntityHooks for Product {
    fn validate(&self) -> CustomValidation {
        if self.name == "forbidden" {
            ValidationError::new(100, "name").into()
        } else {
            CustomValidation::Valid
        }
    }
}

fn main() {
    let product = Product {
        name: "forbidden".into(),
        scratch: 7,
        ..Default::default()
    };
    assert_eq!(product.validate().into_errors().len(), 1);
    assert_eq!(format!("{product:?}"), "Product(forbidden)");
    assert!(product.column_value("scratch").is_none());

    // 瞬态字段不参与序列化
    let json = serde_json::to_string(&product).unwrap();
    assert!(!json.contains("scratch"));
}
