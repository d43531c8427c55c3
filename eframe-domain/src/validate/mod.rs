//! 校验（Validation）
//!
//! 保存前产生记录的完整错误列表：先是列级错误（按属性声明顺序），
//! 再是实体自定义 `validate()` 返回的错误。空列表表示通过。
//! 错误以结构化形式（错误码 + 字段 + 参数）返回，渲染文本通过 `MessageLookup` 完成。
//!
mod columns;
mod message;
mod validation_error;

pub use columns::*;
pub use message::*;
pub use validation_error::*;
