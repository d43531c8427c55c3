use eframe_domain::custom::FieldHolderMap;
use eframe_domain::entity::DomainEntity;
use eframe_domain::{DomainResult, Ref};
use eframe_macros::domain_entity;

#[domain_entity]
struct Supplier {
    name: String,
}

#[domain_entity]
struct Part {
    #[many_to_one(target = Supplier, setter = assign_supplier)]
    supplier: Ref<Supplier>,
    #[many_to_many(mapped_by = "part_tags")]
    tags: Option<Vec<Tag>>,
    #[extensible_field_holder]
    custom_fields: FieldHolderMap,
}

#[domain_entity]
struct Tag {
    label: String,
}

impl Part {
    fn assign_supplier(&mut self, supplier: Ref<Supplier>) {
        self.supplier = supplier;
    }
}

fn main() -> DomainResult<()> {
    let mut part = Part::default();
    assert!(part.field_holder().is_some());
    part.set_reference("supplier", eframe_domain::relation::ErasedRef::none())?;
    assert!(part.set_reference("missing", eframe_domain::relation::ErasedRef::none()).is_err());
    Ok(())
}
