use super::validation_error::ValidationError;
use crate::entity::DomainEntity;
use crate::schema::FieldKind;

/// 列级校验：按属性声明顺序检查必填与文本长度
///
/// `ignored` 中的字段与集合字段不参与校验。
pub fn validate_columns(record: &dyn DomainEntity, ignored: &[String]) -> Vec<ValidationError> {
    let schema = record.entity_schema();
    let mut errors = Vec::new();

    for property in schema.persistent_properties() {
        if property.kind() == FieldKind::Collection
            || ignored.iter().any(|name| name == property.name())
        {
            continue;
        }
        let Some(value) = record.column_value(property.name()) else {
            continue;
        };

        if !property.is_nullable() && value.is_blank() {
            errors.push(ValidationError::required(property.name(), schema.name()));
            continue;
        }

        let max = property.max_length();
        if max > 0 {
            if let Some(length) = value.text_length() {
                if length > max as usize {
                    errors.push(ValidationError::too_long(property.name(), length, max));
                }
            }
        }
    }

    errors
}
