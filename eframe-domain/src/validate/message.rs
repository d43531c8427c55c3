use super::validation_error::MessageArg;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// 本地化消息查找：消息键 + 语言区域 + 参数 -> 文本
pub trait MessageLookup: Send + Sync {
    /// 找不到消息时返回键本身
    fn lookup(&self, key: &str, locale: Option<&str>, args: &[MessageArg]) -> String;
}

impl<T> MessageLookup for Arc<T>
where
    T: MessageLookup + ?Sized,
{
    fn lookup(&self, key: &str, locale: Option<&str>, args: &[MessageArg]) -> String {
        (**self).lookup(key, locale, args)
    }
}

/// 内存消息表
///
/// 查找顺序：完整区域（`de_DE`）-> 语言（`de`）-> 默认区域。
#[derive(Debug, Clone)]
pub struct MessageBundle {
    default_locale: String,
    messages: HashMap<String, HashMap<String, String>>,
}

impl MessageBundle {
    pub fn new(default_locale: impl Into<String>) -> Self {
        Self {
            default_locale: default_locale.into(),
            messages: HashMap::new(),
        }
    }

    /// 内置英文消息
    pub fn english() -> &'static MessageBundle {
        static BUNDLE: OnceLock<MessageBundle> = OnceLock::new();
        BUNDLE.get_or_init(|| {
            MessageBundle::new("en")
                .with_message("en", "error.1.message", r#"Required value is missing "{0}" ({1})."#)
                .with_message(
                    "en",
                    "error.2.message",
                    "Value is too long (max={2}, length={1}) for field {0}.",
                )
        })
    }

    pub fn with_message(
        mut self,
        locale: impl Into<String>,
        key: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.insert(locale, key, template);
        self
    }

    pub fn insert(
        &mut self,
        locale: impl Into<String>,
        key: impl Into<String>,
        template: impl Into<String>,
    ) {
        self.messages
            .entry(locale.into())
            .or_default()
            .insert(key.into(), template.into());
    }

    fn template(&self, key: &str, locale: Option<&str>) -> Option<&str> {
        let mut candidates: Vec<&str> = Vec::with_capacity(3);
        if let Some(locale) = locale {
            candidates.push(locale);
            if let Some((language, _)) = locale.split_once(['_', '-']) {
                candidates.push(language);
            }
        }
        candidates.push(&self.default_locale);

        candidates
            .into_iter()
            .filter_map(|l| self.messages.get(l))
            .find_map(|table| table.get(key))
            .map(String::as_str)
    }
}

impl Default for MessageBundle {
    fn default() -> Self {
        Self::english().clone()
    }
}

impl MessageLookup for MessageBundle {
    fn lookup(&self, key: &str, locale: Option<&str>, args: &[MessageArg]) -> String {
        match self.template(key, locale) {
            Some(template) => format_template(template, args),
            None => key.to_string(),
        }
    }
}

/// 以参数替换 `{n}` 占位符；越界或非数字的占位符原样保留
pub fn format_template(template: &str, args: &[MessageArg]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let replaced = after.find('}').and_then(|end| {
            let index: usize = after[..end].parse().ok()?;
            let arg = args.get(index)?;
            Some((arg.to_string(), end))
        });
        match replaced {
            Some((text, end)) => {
                out.push_str(&text);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_from_region_to_language_to_default() {
        let bundle = MessageBundle::default()
            .with_message("de", "error.1.message", "Pflichtwert fehlt \"{0}\" ({1}).");
        let args = vec![MessageArg::from("name"), MessageArg::from("Order")];

        assert_eq!(
            bundle.lookup("error.1.message", Some("de_DE"), &args),
            "Pflichtwert fehlt \"name\" (Order)."
        );
        assert_eq!(
            bundle.lookup("error.1.message", Some("fr"), &args),
            r#"Required value is missing "name" (Order)."#
        );
    }

    #[test]
    fn missing_key_returns_the_key() {
        let bundle = MessageBundle::new("en");
        assert_eq!(bundle.lookup("error.99.message", None, &[]), "error.99.message");
    }

    #[test]
    fn keeps_unmatched_placeholders() {
        let args = vec![MessageArg::from("a")];
        assert_eq!(format_template("{0}-{1}-{x}-{", &args), "a-{1}-{x}-{");
    }
}
