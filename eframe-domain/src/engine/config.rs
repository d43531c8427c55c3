use bon::Builder;
use serde::{Deserialize, Serialize};

/// 开启更新行数校验的环境变量
pub const OPTIMISTIC_LOCKING_ENV: &str = "EFRAME_OPTIMISTIC_LOCKING";

fn default_ignored_fields() -> Vec<String> {
    ["uuid", "date_created", "date_updated"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainEngineConfig {
    /// 更新影响行数不为 1 时返回 `ConcurrentUpdate`（默认仅记录日志）
    #[builder(default)]
    optimistic_locking: bool,
    /// 不参与列级校验的字段
    #[builder(default = default_ignored_fields())]
    ignore_fields_for_validation: Vec<String>,
}

impl Default for DomainEngineConfig {
    fn default() -> Self {
        Self {
            optimistic_locking: false,
            ignore_fields_for_validation: default_ignored_fields(),
        }
    }
}

impl DomainEngineConfig {
    /// 以默认值为基础，读取环境变量覆盖
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(OPTIMISTIC_LOCKING_ENV) {
            config.optimistic_locking = parse_flag(&value);
        }
        config
    }

    pub fn optimistic_locking(&self) -> bool {
        self.optimistic_locking
    }

    pub fn ignore_fields_for_validation(&self) -> &[String] {
        &self.ignore_fields_for_validation
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
