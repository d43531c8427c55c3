//! 订单实体生命周期示例
//!
//! 展示 `#[domain_entity]` 声明、基于内存存储的引擎装配、
//! 校验失败、级联保存子记录、懒加载与删除。
//!
//! 运行示例：
//! ```bash
//! cargo run -p eframe-domain --example order_lifecycle
//! ```

use eframe_domain::entity::DomainEntity;
use eframe_domain::persist::{InMemoryRepository, InMemoryStore, RepositoryRegistry};
use eframe_domain::{DomainEngine, DomainError, DomainResult, Ref};
use eframe_macros::domain_entity;
use std::sync::Arc;

#[domain_entity]
struct Order {
    #[text]
    customer_name: String,
    #[one_to_many(mapped_by = "order")]
    lines: Option<Vec<OrderLine>>,
}

#[domain_entity(order_by = "sequence")]
struct OrderLine {
    sequence: i32,
    product: String,
    #[many_to_one]
    order: Ref<Order>,
}

fn line(sequence: i32, product: &str) -> OrderLine {
    OrderLine {
        sequence,
        product: product.into(),
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> DomainResult<()> {
    println!("=== 订单实体生命周期示例 ===\n");

    let store = InMemoryStore::new();
    let registry = RepositoryRegistry::new()
        .with::<Order, _>(InMemoryRepository::<Order>::new(store.clone()))
        .with::<OrderLine, _>(InMemoryRepository::<OrderLine>::new(store.clone()));
    let engine = DomainEngine::builder()
        .registry(Arc::new(registry))
        .transactions(store.clone())
        .join_tables(store.clone())
        .build();

    // 1. 校验失败：必填字段为空
    println!("1. 保存缺少客户名的订单");
    let mut order = Order::default();
    match engine.save(&mut order).await {
        Err(DomainError::ValidationFailed { errors, record }) => {
            println!("   {record} 校验失败：");
            for error in &errors {
                println!("   - {error}");
            }
        }
        other => println!("   意外结果: {other:?}"),
    }

    // 2. 级联保存子记录
    println!("\n2. 补全后保存，并附带两条明细");
    order.customer_name = "Acme".into();
    order.lines = Some(vec![line(2, "Widget"), line(1, "Gadget")]);
    engine.save(&mut order).await?;
    println!("   {}", order.describe());
    println!("   order_line 行数: {}", store.row_count("order_line"));

    // 3. 重新读取并懒加载明细（按 sequence 排序）
    println!("\n3. 重新读取并懒加载明细");
    let uuid = order.uuid().unwrap_or_default();
    if let Some(mut loaded) = engine.find_by_uuid::<Order>(uuid).await? {
        for line in loaded.load_lines(&engine).await? {
            println!("   #{} {}", line.sequence, line.product);
        }
    }

    // 4. 删除订单，子记录一并删除
    println!("\n4. 删除订单");
    engine.delete(&mut order).await?;
    println!(
        "   order 行数: {}, order_line 行数: {}",
        store.row_count("order"),
        store.row_count("order_line")
    );

    Ok(())
}
