use anyhow::Result as AnyResult;
use eframe_domain::entity::{DomainEntity, EntityOps};
use eframe_domain::persist::{InMemoryStore, RepositoryRegistry};
use eframe_domain::schema::Relation;
use eframe_domain::validate::{REQUIRED_VALUE_MISSING, VALUE_TOO_LONG};
use eframe_domain::{DomainEngine, DomainError, Ref};
use serde_json::json;
use std::sync::Arc;

mod common;

use common::{
    Customer, INVOICE_PREFIX_REJECTED, Invoice, Note, Order, PINNED_NOTE, harness, line, order,
    tag,
};

#[tokio::test]
async fn save_rejects_blank_required_value() -> AnyResult<()> {
    let h = harness();
    let mut record = order("");

    let err = h.engine.save(&mut record).await.unwrap_err();
    match &err {
        DomainError::ValidationFailed { errors, record } => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].code(), REQUIRED_VALUE_MISSING);
            assert_eq!(errors[0].field_name(), "customer_name");
            assert_eq!(
                errors[0].to_string(),
                r#"Required value is missing "customer_name" (Order)."#
            );
            assert_eq!(record, "Order(unsaved)");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(record.uuid().is_none());
    assert_eq!(h.store.row_count("order"), 0);
    Ok(())
}

#[tokio::test]
async fn validate_reports_too_long_values_with_limits() -> AnyResult<()> {
    let h = harness();
    let mut record = order("Acme");
    record.reference = Some("R".repeat(31));

    let errors = h.engine.validate(&mut record)?;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), VALUE_TOO_LONG);
    assert_eq!(
        errors[0].to_string(),
        "Value is too long (max=30, length=31) for field reference."
    );

    // 不限长度的文本列不报错
    record.reference = None;
    record.customer_name = "A".repeat(10_000);
    assert!(h.engine.validate(&mut record)?.is_empty());
    Ok(())
}

#[tokio::test]
async fn unset_reference_is_required_unless_nullable() -> AnyResult<()> {
    let h = harness();
    let mut orphan = line(1, "A");
    let errors = h.engine.validate(&mut orphan)?;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), REQUIRED_VALUE_MISSING);
    assert_eq!(errors[0].field_name(), "order");

    // Order.customer 标注了 #[nullable]
    let mut record = order("Acme");
    assert!(record.customer.uuid().is_none());
    assert!(h.engine.validate(&mut record)?.is_empty());
    Ok(())
}

#[tokio::test]
async fn save_persists_children_with_back_references() -> AnyResult<()> {
    let h = harness();
    let mut record = order("Acme");
    record.lines = Some(vec![line(2, "B"), line(1, "A")]);

    h.engine.save(&mut record).await?;
    let order_uuid = record.uuid().expect("order uuid assigned");

    let rows = h.store.rows("order_line");
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row["order"], json!(order_uuid.to_string()));
    }

    // 有自然排序的子记录在保存时被排序
    let sequences: Vec<i32> = record
        .lines
        .as_ref()
        .map(|lines| lines.iter().map(|l| l.sequence).collect())
        .unwrap_or_default();
    assert_eq!(sequences, [1, 2]);
    assert!(
        record
            .lines
            .iter()
            .flatten()
            .all(|l| l.order.uuid() == Some(order_uuid) && l.uuid().is_some())
    );

    let mut loaded: Order = h
        .engine
        .find_by_uuid(order_uuid)
        .await?
        .expect("order stored");
    let lines = loaded.load_lines(&h.engine).await?;
    let products: Vec<&str> = lines.iter().map(|l| l.product.as_str()).collect();
    assert_eq!(products, ["A", "B"]);
    Ok(())
}

#[tokio::test]
async fn removed_children_are_deleted_on_next_save() -> AnyResult<()> {
    let h = harness();
    let mut record = order("Acme");
    record.lines = Some(vec![line(1, "A"), line(2, "B")]);
    h.engine.save(&mut record).await?;

    let lines = record.lines.as_mut().expect("lines loaded");
    let a = lines[0].uuid().expect("saved");
    let b = lines[1].uuid().expect("saved");
    lines.remove(1);
    lines.push(line(3, "C"));
    h.engine.save(&mut record).await?;

    assert_eq!(h.store.row_count("order_line"), 2);
    assert!(h.store.contains("order_line", a));
    assert!(!h.store.contains("order_line", b));
    let c = record.lines.as_ref().and_then(|l| l[1].uuid()).expect("saved");
    assert!(h.store.contains("order_line", c));
    assert_eq!(
        record.domain_settings().loaded_children("lines"),
        Some(&[a, c][..])
    );
    Ok(())
}

#[tokio::test]
async fn unloaded_children_are_left_alone() -> AnyResult<()> {
    let h = harness();
    let mut record = order("Acme");
    record.lines = Some(vec![line(1, "A")]);
    h.engine.save(&mut record).await?;
    let uuid = record.uuid().expect("saved");

    // 重新读取后未访问 lines，保存不应删除任何子记录
    let mut loaded: Order = h.engine.find_by_uuid(uuid).await?.expect("stored");
    loaded.customer_name = "Globex".into();
    h.engine.save(&mut loaded).await?;

    assert_eq!(h.store.row_count("order_line"), 1);
    assert_eq!(h.store.rows("order")[0]["customer_name"], json!("Globex"));
    Ok(())
}

#[tokio::test]
async fn reloaded_children_are_pruned_and_updated_in_place() -> AnyResult<()> {
    let h = harness();
    let mut record = order("Acme");
    record.lines = Some(vec![line(1, "A"), line(2, "B")]);
    h.engine.save(&mut record).await?;
    let uuid = record.uuid().expect("saved");

    // 新会话：重新读取并加载子记录后再修改
    let mut loaded: Order = h.engine.find_by_uuid(uuid).await?.expect("stored");
    let lines = loaded.load_lines(&h.engine).await?;
    let a = lines[0].uuid().expect("saved");
    let b = lines[1].uuid().expect("saved");

    let lines = loaded.lines.as_mut().expect("lines loaded");
    lines.remove(1);
    lines[0].product = "A2".into();
    lines.push(line(3, "C"));
    h.engine.save(&mut loaded).await?;

    let rows = h.store.rows("order_line");
    assert_eq!(rows.len(), 2);
    assert!(!h.store.contains("order_line", b));
    let kept = rows
        .iter()
        .find(|row| row["uuid"] == json!(a.to_string()))
        .expect("A updated in place");
    assert_eq!(kept["product"], json!("A2"));
    let c = loaded.lines.as_ref().and_then(|l| l[1].uuid()).expect("saved");
    assert_eq!(
        loaded.domain_settings().loaded_children("lines"),
        Some(&[a, c][..])
    );
    Ok(())
}

#[tokio::test]
async fn failed_cascade_leaves_no_rows_behind() -> AnyResult<()> {
    let h = harness();
    let mut rx = h.events.subscribe();
    let mut record = order("Acme");
    record.lines = Some(vec![line(1, "A"), line(2, "")]);
    record.tags = Some(vec![tag("X")]);

    let err = h.engine.save(&mut record).await.unwrap_err();
    match &err {
        DomainError::ValidationFailed { errors, record } => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].field_name(), "product");
            assert_eq!(record, "OrderLine(unsaved)");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(h.store.row_count("order"), 0);
    assert_eq!(h.store.row_count("order_line"), 0);
    assert_eq!(h.store.row_count("tag"), 0);
    assert!(rx.try_recv().is_err());

    // 实例恢复为保存前的状态
    assert!(record.uuid().is_none());
    assert!(!record.domain_settings().is_writing());
    assert!(record.domain_settings().loaded_children("lines").is_none());
    assert!(record.tags.iter().flatten().all(|t| t.uuid().is_none()));
    assert!(
        record
            .lines
            .iter()
            .flatten()
            .all(|l| l.uuid().is_none() && l.order.uuid().is_none())
    );

    // 修正后重试即可完整保存
    record.lines.as_mut().expect("lines")[1].product = "B".into();
    h.engine.save(&mut record).await?;
    let owner = record.uuid().expect("saved");
    assert_eq!(h.store.row_count("order"), 1);
    assert_eq!(h.store.row_count("order_line"), 2);
    assert_eq!(h.store.linked("order_tags", owner).len(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_update_keeps_orphans_for_the_next_save() -> AnyResult<()> {
    let h = harness();
    h.custom
        .register_child_list(Order::schema(), "notes", "order", Note::schema());
    let notes = Relation::children("notes", "order", Note::schema());

    let mut record = order("Acme");
    record.lines = Some(vec![line(1, "A"), line(2, "B")]);
    h.engine.save(&mut record).await?;
    let a = record.lines.as_ref().and_then(|l| l[0].uuid()).expect("saved");
    let b = record.lines.as_ref().and_then(|l| l[1].uuid()).expect("saved");

    // 静态子记录级联（含删除 B）完成后，自定义子记录校验失败
    let lines = record.lines.as_mut().expect("lines loaded");
    lines.remove(1);
    lines.push(line(3, "C"));
    record
        .custom_fields
        .child_list_mut(&notes)
        .push(Box::new(Note::default()));
    let err = h.engine.save(&mut record).await.unwrap_err();
    assert_eq!(err.validation_errors()[0].field_name(), "body");

    assert!(h.store.contains("order_line", b));
    assert_eq!(h.store.row_count("order_line"), 2);
    assert_eq!(h.store.row_count("note"), 0);
    assert_eq!(
        record.domain_settings().loaded_children("lines"),
        Some(&[a, b][..])
    );
    assert!(record.lines.as_ref().is_some_and(|l| l[1].uuid().is_none()));

    let note: Box<dyn DomainEntity> = Box::new(Note {
        body: "call back".into(),
        ..Default::default()
    });
    record.custom_fields.child_list_mut(&notes).set(vec![note]);
    h.engine.save(&mut record).await?;

    assert!(!h.store.contains("order_line", b));
    assert!(h.store.contains("order_line", a));
    assert_eq!(h.store.row_count("order_line"), 2);
    assert_eq!(h.store.row_count("note"), 1);
    Ok(())
}

#[tokio::test]
async fn many_to_many_links_are_replaced_as_a_whole() -> AnyResult<()> {
    let h = harness();
    let mut y = tag("Y");
    h.engine.save(&mut y).await?;

    let mut record = order("Acme");
    record.tags = Some(vec![tag("X"), y]);
    h.engine.save(&mut record).await?;
    let owner = record.uuid().expect("saved");

    let tags = record.tags.take().expect("tags loaded");
    let x = tags[0].uuid().expect("unsaved element saved first");
    let y = tags[1].uuid().expect("saved");
    assert_eq!(h.store.linked("order_tags", owner), [x, y]);

    let mut tags = tags;
    tags.remove(0);
    tags.push(tag("Z"));
    record.tags = Some(tags);
    h.engine.save(&mut record).await?;

    let z = record.tags.as_ref().and_then(|t| t[1].uuid()).expect("saved");
    assert_eq!(h.store.linked("order_tags", owner), [y, z]);
    // 多对多只维护连接行，不删除被引用的记录
    assert!(h.store.contains("tag", x));
    Ok(())
}

#[tokio::test]
async fn delete_cascades_children_and_links() -> AnyResult<()> {
    let h = harness();
    let mut record = order("Acme");
    record.lines = Some(vec![line(1, "A"), line(2, "B")]);
    record.tags = Some(vec![tag("X")]);
    h.engine.save(&mut record).await?;
    let uuid = record.uuid().expect("saved");

    // 只需 uuid 即可删除
    let mut stub = Order::default();
    stub.set_uuid(Some(uuid));
    h.engine.delete(&mut stub).await?;

    assert_eq!(h.store.row_count("order"), 0);
    assert_eq!(h.store.row_count("order_line"), 0);
    assert!(h.store.linked("order_tags", uuid).is_empty());
    assert_eq!(h.store.row_count("tag"), 1);
    Ok(())
}

#[tokio::test]
async fn aborted_delete_restores_rows_and_links() -> AnyResult<()> {
    let h = harness();
    h.custom
        .register_child_list(Order::schema(), "notes", "order", Note::schema());

    let mut record = order("Acme");
    record.lines = Some(vec![line(1, "A")]);
    record.tags = Some(vec![tag("X")]);
    record
        .custom_fields
        .child_list_mut(&Relation::children("notes", "order", Note::schema()))
        .push(Box::new(Note {
            body: PINNED_NOTE.into(),
            ..Default::default()
        }));
    h.engine.save(&mut record).await?;
    let uuid = record.uuid().expect("saved");

    // 静态子记录与连接行先被删除，随后备注的删除前钩子中止
    let err = h.engine.delete(&mut record).await.unwrap_err();
    match err {
        DomainError::InvalidState { reason } => assert_eq!(reason, "note is pinned"),
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(h.store.contains("order", uuid));
    assert_eq!(h.store.row_count("order_line"), 1);
    assert_eq!(h.store.row_count("note"), 1);
    assert_eq!(h.store.linked("order_tags", uuid).len(), 1);

    // 子记录集合重置为未加载，再次访问时从存储读取
    assert!(record.lines.is_none());
    assert_eq!(record.load_lines(&h.engine).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn record_level_save_and_delete() -> AnyResult<()> {
    let h = harness();
    let mut customer = Customer {
        name: "Globex".into(),
        ..Default::default()
    };
    customer.save(&h.engine).await?;
    let uuid = customer.uuid().expect("saved");
    assert!(h.store.contains("customer", uuid));

    customer.name = "Globex Corp".into();
    customer.save(&h.engine).await?;
    assert_eq!(h.store.row_count("customer"), 1);

    let listed: Vec<Customer> = h.engine.list().await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Globex Corp");

    customer.delete(&h.engine).await?;
    assert!(!h.store.contains("customer", uuid));
    Ok(())
}

#[tokio::test]
async fn round_trip_preserves_values_and_reference_uuid() -> AnyResult<()> {
    let h = harness();
    let mut customer = Customer {
        name: "Globex".into(),
        ..Default::default()
    };
    h.engine.save(&mut customer).await?;

    let mut record = order("Acme");
    record.reference = Some("PO-1".into());
    record.customer = Ref::from_uuid(customer.uuid().expect("saved"));
    record.custom_fields.set("priority", 3);
    h.engine.save(&mut record).await?;

    let loaded: Order = h
        .engine
        .find_by_uuid(record.uuid().expect("saved"))
        .await?
        .expect("stored");
    assert_eq!(loaded.customer_name, "Acme");
    assert_eq!(loaded.reference.as_deref(), Some("PO-1"));
    assert_eq!(loaded.customer.uuid(), customer.uuid());
    assert!(!loaded.customer.is_populated());
    assert_eq!(loaded.custom_fields.get("priority"), Some(&json!(3)));
    assert!(loaded.lines.is_none());
    Ok(())
}

#[tokio::test]
async fn hooks_run_before_save_and_can_abort() -> AnyResult<()> {
    let h = harness();
    let mut invoice = Invoice {
        number: "  INV-1 ".into(),
        ..Default::default()
    };
    h.engine.save(&mut invoice).await?;
    assert_eq!(invoice.number, "INV-1");

    invoice.locked = true;
    invoice.number = "INV-2".into();
    let err = h.engine.save(&mut invoice).await.unwrap_err();
    match err {
        DomainError::InvalidState { reason } => assert_eq!(reason, "invoice is locked"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.store.rows("invoice")[0]["number"], json!("INV-1"));

    let err = h.engine.delete(&mut invoice).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidState { .. }));
    assert_eq!(h.store.row_count("invoice"), 1);
    Ok(())
}

#[tokio::test]
async fn custom_validation_errors_follow_column_errors() -> AnyResult<()> {
    let h = harness();
    let mut invoice = Invoice {
        number: "X-1".into(),
        ..Default::default()
    };
    let err = h.engine.save(&mut invoice).await.unwrap_err();
    let errors = err.validation_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), INVOICE_PREFIX_REJECTED);
    assert_eq!(errors[0].field_name(), "number");

    invoice.number = String::new();
    let errors = h.engine.validate(&mut invoice)?;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), REQUIRED_VALUE_MISSING);
    Ok(())
}

#[tokio::test]
async fn save_events_are_published_after_cascade() -> AnyResult<()> {
    let h = harness();
    let mut rx = h.events.subscribe();

    let mut record = order("Acme");
    record.lines = Some(vec![line(1, "A")]);
    h.engine.save(&mut record).await?;

    let first = rx.try_recv()?;
    let second = rx.try_recv()?;
    assert_eq!(first.entity, "OrderLine");
    assert_eq!(second.entity, "Order");
    assert_eq!(Some(second.uuid), record.uuid());
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn unregistered_entity_type_is_reported() {
    let store = InMemoryStore::new();
    let engine = DomainEngine::builder()
        .registry(Arc::new(RepositoryRegistry::new()))
        .transactions(store.clone())
        .join_tables(store)
        .build();

    let mut customer = Customer {
        name: "Globex".into(),
        ..Default::default()
    };
    match engine.save(&mut customer).await.unwrap_err() {
        DomainError::MissingRepository { entity } => assert_eq!(entity, "Customer"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn delete_hook_runs_before_repository_lookup() {
    let store = InMemoryStore::new();
    let engine = DomainEngine::builder()
        .registry(Arc::new(RepositoryRegistry::new()))
        .transactions(store.clone())
        .join_tables(store)
        .build();

    let mut invoice = Invoice {
        number: "INV-1".into(),
        locked: true,
        ..Default::default()
    };
    match engine.delete(&mut invoice).await.unwrap_err() {
        DomainError::InvalidState { reason } => assert_eq!(reason, "invoice is locked"),
        other => panic!("unexpected error: {other:?}"),
    }

    invoice.locked = false;
    match engine.delete(&mut invoice).await.unwrap_err() {
        DomainError::MissingRepository { entity } => assert_eq!(entity, "Invoice"),
        other => panic!("unexpected error: {other:?}"),
    }
}
