use crate::relation::DynamicList;
use crate::schema::Relation;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// 自定义字段容器
///
/// 值以 JSON 形式保存，持久化为单个文本列；子记录集合只存在于内存中，
/// 由引擎像静态声明的子记录一样级联保存与删除。
#[derive(Debug, Default)]
pub struct FieldHolderMap {
    values: Map<String, Value>,
    dirty: bool,
    lists: HashMap<String, DynamicList>,
}

impl FieldHolderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let values: Map<String, Value> = serde_json::from_str(text)?;
        Ok(Self {
            values,
            ..Self::default()
        })
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.values.clone()).to_string()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
        self.dirty = true;
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        let removed = self.values.remove(field);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// 合并另一个容器的值（覆盖同名字段）
    pub fn merge(&mut self, src: &FieldHolderMap) {
        if src.values.is_empty() {
            return;
        }
        for (k, v) in src.values.iter() {
            self.values.insert(k.clone(), v.clone());
        }
        self.dirty = true;
    }

    pub fn child_list(&self, field: &str) -> Option<&DynamicList> {
        self.lists.get(field)
    }

    /// 自定义子记录集合；首次访问时创建为未加载状态
    pub fn child_list_mut(&mut self, relation: &Relation) -> &mut DynamicList {
        self.lists
            .entry(relation.field().to_string())
            .or_insert_with(|| DynamicList::new(relation.target()))
    }
}

impl Clone for FieldHolderMap {
    /// 仅复制字段值；内存中的子记录集合不随之复制
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            dirty: self.dirty,
            lists: HashMap::new(),
        }
    }
}

impl PartialEq for FieldHolderMap {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Serialize for FieldHolderMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.values.is_empty() {
            serializer.serialize_none()
        } else {
            serializer.serialize_str(&self.to_json())
        }
    }
}

impl<'de> Deserialize<'de> for FieldHolderMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // 兼容文本列（JSON 字符串）与直接嵌入的对象
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(Value::String(text)) => Self::from_json(&text).map_err(de::Error::custom),
            Some(Value::Object(values)) => Ok(Self {
                values,
                ..Self::default()
            }),
            Some(other) => Err(de::Error::custom(format!(
                "expected JSON text or object for custom fields, found {other}"
            ))),
        }
    }
}
