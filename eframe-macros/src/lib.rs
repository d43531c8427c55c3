mod derive_utils;
mod domain_entity;
mod field_utils;

use proc_macro::TokenStream;

/// 领域实体宏
/// - 追加字段：`uuid: Option<Uuid>`（最前）、`domain_settings: DomainSettings`（最后）
/// - 自动实现 `::eframe_domain::entity::DomainEntity`（结构描述、列值、集合与引用访问器）
/// - 支持参数：`#[domain_entity(table = "...", ordered | order_by = "field", hooks, debug = bool)]`
///   - `table`：显式表名，缺省由命名策略推导
///   - `ordered`：按类型自身的 `Ord` 自然排序；`order_by` 按指定字段排序
///   - `hooks`：由用户自行实现 `EntityHooks`，否则生成空实现
///   - `debug` 默认 `true`（派生 Debug）
///
/// 字段注解：
/// - `#[column(name = "...", length = n, nullable = bool)]`
/// - `#[nullable]`、`#[text]`（不限长度）、`#[transient]`（不持久化）
/// - `#[one_to_many(mapped_by = "parent_field")]`：子记录集合，类型须为 `Option<Vec<T>>`
/// - `#[many_to_many(mapped_by = "join_table")]`：多对多集合，类型须为 `Option<Vec<T>>`
/// - `#[many_to_one]` / `#[many_to_one(target = T, setter = fn_name)]`：单一引用，类型须为 `Ref<T>`
/// - `#[extensible_field_holder]`：自定义字段容器（`FieldHolderMap`）
#[proc_macro_attribute]
pub fn domain_entity(attr: TokenStream, item: TokenStream) -> TokenStream {
    domain_entity::expand(attr, item)
}
