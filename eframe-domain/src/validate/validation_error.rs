use super::message::{MessageBundle, MessageLookup};
use serde::Serialize;
use std::fmt;

/// 缺少必填值
pub const REQUIRED_VALUE_MISSING: u32 = 1;
/// 值超出最大长度
pub const VALUE_TOO_LONG: u32 = 2;

/// 消息参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MessageArg {
    Text(String),
    Int(i64),
    UInt(u64),
}

impl fmt::Display for MessageArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageArg::Text(s) => f.write_str(s),
            MessageArg::Int(n) => write!(f, "{n}"),
            MessageArg::UInt(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for MessageArg {
    fn from(value: &str) -> Self {
        MessageArg::Text(value.to_string())
    }
}

impl From<String> for MessageArg {
    fn from(value: String) -> Self {
        MessageArg::Text(value)
    }
}

impl From<i64> for MessageArg {
    fn from(value: i64) -> Self {
        MessageArg::Int(value)
    }
}

impl From<i32> for MessageArg {
    fn from(value: i32) -> Self {
        MessageArg::Int(value.into())
    }
}

impl From<u32> for MessageArg {
    fn from(value: u32) -> Self {
        MessageArg::UInt(value.into())
    }
}

impl From<u64> for MessageArg {
    fn from(value: u64) -> Self {
        MessageArg::UInt(value)
    }
}

impl From<usize> for MessageArg {
    fn from(value: usize) -> Self {
        MessageArg::UInt(value as u64)
    }
}

/// 字段级校验错误：错误码 + 字段名 + 附加参数
///
/// 渲染时字段名总是第一个参数（`{0}`），附加参数依次为 `{1}`、`{2}`…
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    code: u32,
    field_name: String,
    args: Vec<MessageArg>,
}

impl ValidationError {
    pub fn new(code: u32, field_name: impl Into<String>) -> Self {
        Self {
            code,
            field_name: field_name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<MessageArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// 必填值缺失（code 1），参数为记录的类型名
    pub fn required(field_name: impl Into<String>, type_name: &str) -> Self {
        Self::new(REQUIRED_VALUE_MISSING, field_name).with_arg(type_name)
    }

    /// 值过长（code 2），参数为实际长度与最大长度
    pub fn too_long(field_name: impl Into<String>, length: usize, max: u32) -> Self {
        Self::new(VALUE_TOO_LONG, field_name)
            .with_arg(length)
            .with_arg(max)
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn args(&self) -> &[MessageArg] {
        &self.args
    }

    /// 渲染用参数：字段名在前
    pub fn message_args(&self) -> Vec<MessageArg> {
        std::iter::once(MessageArg::Text(self.field_name.clone()))
            .chain(self.args.iter().cloned())
            .collect()
    }

    pub fn message_key(&self) -> String {
        format!("error.{}.message", self.code)
    }

    pub fn to_message(&self, lookup: &dyn MessageLookup, locale: Option<&str>) -> String {
        lookup.lookup(&self.message_key(), locale, &self.message_args())
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_message(MessageBundle::english(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_name_is_the_first_rendered_argument() {
        let err = ValidationError::required("customerName", "Order");
        assert_eq!(err.code(), 1);
        assert_eq!(err.args(), &[MessageArg::from("Order")]);
        assert_eq!(
            err.to_string(),
            r#"Required value is missing "customerName" (Order)."#
        );
    }

    #[test]
    fn too_long_renders_length_and_max() {
        let err = ValidationError::too_long("title", 300, 255);
        assert_eq!(err.args(), &[MessageArg::UInt(300), MessageArg::UInt(255)]);
        assert_eq!(
            err.to_string(),
            "Value is too long (max=255, length=300) for field title."
        );
    }

    #[test]
    fn serializes_as_structured_entry() {
        let err = ValidationError::required("name", "Product");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"code": 1, "fieldName": "name", "args": ["Product"]})
        );
    }
}
