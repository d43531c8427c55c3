//! 持久化属性
//!
//! 由字段描述推导出的持久化视图：可空性、最大长度、引用类型以及父/子关系分类。
//! 校验与级联逻辑只依赖这里的结果，而不直接解读注解。
//!
use crate::schema::{EntitySchema, FieldDescriptor, FieldKind, RelationAnnotation};
use std::fmt;

/// 文本字段未显式声明长度时的默认上限
pub const DEFAULT_MAX_LENGTH: u32 = 255;

#[derive(Clone)]
pub struct PersistentProperty {
    field: FieldDescriptor,
    nullable: bool,
    max_length: u32,
    reference_type: Option<&'static EntitySchema>,
    parent_reference: bool,
    child: bool,
}

impl PersistentProperty {
    pub fn from_field(field: &FieldDescriptor) -> Self {
        let column = field.column().copied().unwrap_or_default();

        let nullable = column.nullable.unwrap_or(field.is_nullable());

        // 最大长度仅对文本有意义：显式长度 > 无上限文本 > 默认值
        let max_length = if field.kind() == FieldKind::Text {
            if column.length > 0 {
                column.length
            } else if field.is_text() {
                0
            } else {
                DEFAULT_MAX_LENGTH
            }
        } else {
            0
        };

        let reference_type = field.element();

        let parent_reference = match field.relation() {
            Some(RelationAnnotation::ManyToOne { target }) => match (target, reference_type) {
                (None, _) => true,
                (Some(target), Some(declared)) => target().type_id() != declared.type_id(),
                (Some(_), None) => true,
            },
            _ => false,
        };

        let child = matches!(field.relation(), Some(RelationAnnotation::OneToMany { .. }))
            && !parent_reference;

        Self {
            field: field.clone(),
            nullable,
            max_length,
            reference_type,
            parent_reference,
            child,
        }
    }

    pub fn name(&self) -> &'static str {
        self.field.name()
    }

    pub fn type_name(&self) -> &'static str {
        self.field.type_name()
    }

    pub fn field(&self) -> &FieldDescriptor {
        &self.field
    }

    pub fn kind(&self) -> FieldKind {
        self.field.kind()
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// 文本最大长度；0 表示不限（或非文本字段）
    pub fn max_length(&self) -> u32 {
        self.max_length
    }

    /// 引用的实体类型（集合字段为元素类型）
    pub fn reference_type(&self) -> Option<&'static EntitySchema> {
        self.reference_type
    }

    /// 指向父记录的引用（多对一且未指定为普通外键）
    pub fn is_parent_reference(&self) -> bool {
        self.parent_reference
    }

    /// 被当前记录拥有的子记录集合
    pub fn is_child(&self) -> bool {
        self.child
    }

    pub fn is_collection(&self) -> bool {
        self.field.kind() == FieldKind::Collection
    }

    pub fn is_reference(&self) -> bool {
        self.field.kind() == FieldKind::Reference
    }

    pub fn column_name(&self) -> Option<&'static str> {
        self.field.column().and_then(|c| c.name)
    }
}

impl fmt::Debug for PersistentProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentProperty")
            .field("name", &self.name())
            .field("type", &self.type_name())
            .field("nullable", &self.nullable)
            .field("max_length", &self.max_length)
            .field("reference_type", &self.reference_type.map(|s| s.name()))
            .field("parent_reference", &self.parent_reference)
            .field("child", &self.child)
            .finish()
    }
}

impl fmt::Display for PersistentProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PersistentProperty{{name={}, type={}, maxLength={}",
            self.name(),
            self.type_name(),
            self.max_length
        )?;
        if let Some(reference) = self.reference_type {
            write!(f, ", referenceType={}", reference.name())?;
        }
        if self.parent_reference {
            f.write_str(", parentReference")?;
        }
        if self.child {
            f.write_str(", child")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnAnnotation;
    use std::any::TypeId;
    use std::sync::OnceLock;

    struct Customer;
    struct Invoice;

    fn customer_schema() -> &'static EntitySchema {
        static SCHEMA: OnceLock<EntitySchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            EntitySchema::builder()
                .name("Customer")
                .type_id(TypeId::of::<Customer>())
                .fields(vec![
                    FieldDescriptor::builder()
                        .name("name")
                        .type_name("String")
                        .kind(FieldKind::Text)
                        .build(),
                ])
                .build()
        })
    }

    fn invoice_schema() -> &'static EntitySchema {
        static SCHEMA: OnceLock<EntitySchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            EntitySchema::builder()
                .name("Invoice")
                .type_id(TypeId::of::<Invoice>())
                .fields(vec![
                    FieldDescriptor::builder()
                        .name("title")
                        .type_name("String")
                        .kind(FieldKind::Text)
                        .build(),
                    FieldDescriptor::builder()
                        .name("notes")
                        .type_name("Option<String>")
                        .kind(FieldKind::Text)
                        .nullable(true)
                        .text(true)
                        .build(),
                    FieldDescriptor::builder()
                        .name("code")
                        .type_name("String")
                        .kind(FieldKind::Text)
                        .column(ColumnAnnotation {
                            name: Some("invoice_code"),
                            length: 30,
                            nullable: Some(true),
                        })
                        .build(),
                    FieldDescriptor::builder()
                        .name("amount")
                        .type_name("i64")
                        .build(),
                    FieldDescriptor::builder()
                        .name("cache")
                        .type_name("String")
                        .kind(FieldKind::Text)
                        .transient(true)
                        .build(),
                    FieldDescriptor::builder()
                        .name("COUNTER")
                        .type_name("u32")
                        .is_static(true)
                        .build(),
                    FieldDescriptor::builder()
                        .name("customer")
                        .type_name("Ref<Customer>")
                        .kind(FieldKind::Reference)
                        .element(customer_schema)
                        .relation(RelationAnnotation::ManyToOne {
                            target: Some(customer_schema),
                        })
                        .build(),
                    FieldDescriptor::builder()
                        .name("owner")
                        .type_name("Ref<Customer>")
                        .kind(FieldKind::Reference)
                        .element(customer_schema)
                        .relation(RelationAnnotation::ManyToOne { target: None })
                        .build(),
                ])
                .build()
        })
    }

    #[test]
    fn excludes_static_and_transient_fields() {
        let names: Vec<_> = invoice_schema()
            .persistent_properties()
            .iter()
            .map(|p| p.name())
            .collect();
        assert_eq!(
            names,
            vec!["title", "notes", "code", "amount", "customer", "owner"]
        );
    }

    #[test]
    fn repeated_calls_return_the_same_slice() {
        let first = invoice_schema().persistent_properties().as_ptr();
        let second = invoice_schema().persistent_properties().as_ptr();
        assert_eq!(first, second);
    }

    #[test]
    fn max_length_rules() {
        let schema = invoice_schema();
        assert_eq!(schema.property("title").map(|p| p.max_length()), Some(255));
        assert_eq!(schema.property("notes").map(|p| p.max_length()), Some(0));
        assert_eq!(schema.property("code").map(|p| p.max_length()), Some(30));
        assert_eq!(schema.property("amount").map(|p| p.max_length()), Some(0));
    }

    #[test]
    fn column_annotation_overrides_nullable() {
        let schema = invoice_schema();
        let code = schema.property("code").unwrap();
        assert!(code.is_nullable());
        assert_eq!(code.column_name(), Some("invoice_code"));
        assert!(!schema.property("title").unwrap().is_nullable());
        assert!(schema.property("notes").unwrap().is_nullable());
    }

    #[test]
    fn many_to_one_classification() {
        let schema = invoice_schema();
        let customer = schema.property("customer").unwrap();
        assert!(!customer.is_parent_reference());
        assert_eq!(customer.reference_type().map(|s| s.name()), Some("Customer"));

        let owner = schema.property("owner").unwrap();
        assert!(owner.is_parent_reference());
        assert!(!owner.is_child());
    }

    #[test]
    fn display_names_the_property() {
        let schema = invoice_schema();
        let text = schema.property("owner").unwrap().to_string();
        assert!(text.contains("name=owner"));
        assert!(text.contains("referenceType=Customer"));
        assert!(text.contains("parentReference"));
    }
}
