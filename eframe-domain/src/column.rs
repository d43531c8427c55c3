//! 列值视图：校验时只关心“是否为空”与“文本内容”
//!
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnValue<'a> {
    Null,
    Text(&'a str),
    Present,
}

impl<'a> ColumnValue<'a> {
    pub fn text(value: &'a str) -> Self {
        ColumnValue::Text(value)
    }

    pub fn optional_text(value: &'a Option<String>) -> Self {
        match value {
            Some(s) => ColumnValue::Text(s),
            None => ColumnValue::Null,
        }
    }

    pub fn optional<T>(value: &Option<T>) -> Self {
        if value.is_some() {
            ColumnValue::Present
        } else {
            ColumnValue::Null
        }
    }

    pub fn reference(uuid: Option<Uuid>, populated: bool) -> Self {
        if uuid.is_some() || populated {
            ColumnValue::Present
        } else {
            ColumnValue::Null
        }
    }

    /// 空值或空字符串
    pub fn is_blank(&self) -> bool {
        match self {
            ColumnValue::Null => true,
            ColumnValue::Text(s) => s.is_empty(),
            ColumnValue::Present => false,
        }
    }

    /// 文本长度（按字符计）
    pub fn text_length(&self) -> Option<usize> {
        match self {
            ColumnValue::Text(s) => Some(s.chars().count()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_length() {
        assert!(ColumnValue::Null.is_blank());
        assert!(ColumnValue::text("").is_blank());
        assert!(!ColumnValue::Present.is_blank());
        assert_eq!(ColumnValue::text("größe").text_length(), Some(5));
        assert_eq!(ColumnValue::optional(&Some(3)), ColumnValue::Present);
        assert_eq!(ColumnValue::optional_text(&None), ColumnValue::Null);
    }
}
