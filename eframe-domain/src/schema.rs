//! 实体结构描述（Schema Descriptor）
//!
//! 每个实体类型在首次访问时构建一份静态描述：字段列表、注解信息、表名覆盖与自然排序。
//! 引擎通过这份描述而不是运行时反射来完成校验、级联与懒加载。
//! 通常由 `#[domain_entity]` 宏生成，也可以通过 `EntitySchema::builder()` 手工构建。
//!
use crate::entity::DomainEntity;
use crate::naming::NamingStrategy;
use crate::persistent_property::PersistentProperty;
use bon::Builder;
use std::any::TypeId;
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

/// 自然排序比较函数（实体类型声明了 `ordered` 时生成）
pub type CompareFn = fn(&dyn DomainEntity, &dyn DomainEntity) -> Ordering;

/// 延迟解析的实体描述（避免相互引用的实体在初始化时互相等待）
pub type SchemaFn = fn() -> &'static EntitySchema;

/// 字段的形态分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldKind {
    /// 普通标量值
    #[default]
    Value,
    /// 文本（`String`、`Option<String>`）
    Text,
    /// 集合（子记录列表、多对多列表）
    Collection,
    /// 单一外键引用（`Ref<T>`）
    Reference,
}

/// 列注解：`#[column(name = "...", length = n, nullable = bool)]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnAnnotation {
    pub name: Option<&'static str>,
    pub length: u32,
    pub nullable: Option<bool>,
}

/// 关系注解
#[derive(Debug, Clone, Copy)]
pub enum RelationAnnotation {
    /// 一对多（拥有子记录），`mapped_by` 为子记录中指回父记录的字段
    OneToMany { mapped_by: &'static str },
    /// 多对多，`mapped_by` 为连接表的逻辑名
    ManyToMany { mapped_by: &'static str },
    /// 多对一；`target` 缺省表示父引用
    ManyToOne { target: Option<SchemaFn> },
}

/// 单个字段的原始描述
#[derive(Debug, Clone, Builder)]
pub struct FieldDescriptor {
    name: &'static str,
    type_name: &'static str,
    #[builder(default)]
    kind: FieldKind,
    /// `Option<_>` 字段或标注了 `#[nullable]`
    #[builder(default)]
    nullable: bool,
    column: Option<ColumnAnnotation>,
    /// `#[text]`：无长度上限的文本列
    #[builder(default)]
    text: bool,
    #[builder(default)]
    transient: bool,
    /// 类级（非实例）字段；宏生成的实体不会出现，手工描述可使用
    #[builder(default)]
    is_static: bool,
    /// 引用的实体（集合字段为元素类型）
    element: Option<SchemaFn>,
    relation: Option<RelationAnnotation>,
}

impl FieldDescriptor {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn column(&self) -> Option<&ColumnAnnotation> {
        self.column.as_ref()
    }

    pub fn is_text(&self) -> bool {
        self.text
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn element(&self) -> Option<&'static EntitySchema> {
        self.element.map(|f| f())
    }

    pub fn relation(&self) -> Option<RelationAnnotation> {
        self.relation
    }
}

/// 实体类型的完整描述
#[derive(Builder)]
pub struct EntitySchema {
    /// 类型简单名（如 `Order`）
    name: &'static str,
    type_id: TypeId,
    /// 显式表名；缺省时由命名策略从类型名推导
    table: Option<&'static str>,
    fields: Vec<FieldDescriptor>,
    natural_order: Option<CompareFn>,
    #[builder(skip)]
    properties: OnceLock<Vec<PersistentProperty>>,
    #[builder(skip)]
    relations: OnceLock<Vec<Relation>>,
}

impl EntitySchema {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn natural_order(&self) -> Option<CompareFn> {
        self.natural_order
    }

    pub fn is_ordered(&self) -> bool {
        self.natural_order.is_some()
    }

    /// 持久化属性列表：排除静态字段与 transient 字段，按声明顺序，仅计算一次
    pub fn persistent_properties(&self) -> &[PersistentProperty] {
        self.properties.get_or_init(|| {
            self.fields
                .iter()
                .filter(|f| !f.is_static && !f.transient)
                .map(PersistentProperty::from_field)
                .collect()
        })
    }

    pub fn property(&self, name: &str) -> Option<&PersistentProperty> {
        self.persistent_properties()
            .iter()
            .find(|p| p.name() == name)
    }

    /// 集合型关系（子记录与多对多），按声明顺序
    pub fn relations(&self) -> &[Relation] {
        self.relations.get_or_init(|| {
            self.persistent_properties()
                .iter()
                .filter_map(Relation::from_property)
                .collect()
        })
    }

    pub fn child_relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations()
            .iter()
            .filter(|r| r.kind == RelationKind::Children)
    }

    pub fn many_to_many_relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations()
            .iter()
            .filter(|r| r.kind == RelationKind::ManyToMany)
    }

    pub fn relation(&self, field: &str) -> Option<&Relation> {
        self.relations().iter().find(|r| r.field == field)
    }

    /// 物理表名：显式覆盖优先，否则由命名策略推导
    pub fn table_name(&self, naming: &dyn NamingStrategy) -> String {
        match self.table {
            Some(table) if !table.is_empty() => table.to_string(),
            _ => naming.mapped_name(self.name),
        }
    }

    /// 物理列名：显式 `#[column(name)]` 优先，否则由命名策略推导
    pub fn column_name(&self, field: &str, naming: &dyn NamingStrategy) -> Option<String> {
        let descriptor = self.field(field)?;
        match descriptor.column.and_then(|c| c.name) {
            Some(name) if !name.is_empty() => Some(name.to_string()),
            _ => Some(naming.mapped_name(field)),
        }
    }
}

impl fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("ordered", &self.is_ordered())
            .finish()
    }
}

impl PartialEq for EntitySchema {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

/// 集合关系的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Children,
    ManyToMany,
}

/// 一个集合型关系：静态声明的或由自定义字段动态贡献的
#[derive(Debug, Clone)]
pub struct Relation {
    kind: RelationKind,
    field: String,
    mapped_by: String,
    target: &'static EntitySchema,
}

impl Relation {
    /// 子记录关系；`parent_field` 为子记录中指回父记录的字段
    pub fn children(
        field: impl Into<String>,
        parent_field: impl Into<String>,
        target: &'static EntitySchema,
    ) -> Self {
        Self {
            kind: RelationKind::Children,
            field: field.into(),
            mapped_by: parent_field.into(),
            target,
        }
    }

    /// 多对多关系；`join_table` 为连接表的逻辑名
    pub fn many_to_many(
        field: impl Into<String>,
        join_table: impl Into<String>,
        target: &'static EntitySchema,
    ) -> Self {
        Self {
            kind: RelationKind::ManyToMany,
            field: field.into(),
            mapped_by: join_table.into(),
            target,
        }
    }

    fn from_property(property: &PersistentProperty) -> Option<Self> {
        if property.field().kind() != FieldKind::Collection {
            return None;
        }
        let target = property.reference_type()?;
        match property.field().relation()? {
            RelationAnnotation::OneToMany { mapped_by } if property.is_child() => {
                Some(Self::children(property.name(), mapped_by, target))
            }
            RelationAnnotation::ManyToMany { mapped_by } => {
                Some(Self::many_to_many(property.name(), mapped_by, target))
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn mapped_by(&self) -> &str {
        &self.mapped_by
    }

    pub fn target(&self) -> &'static EntitySchema {
        self.target
    }
}
