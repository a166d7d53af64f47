//! 配置模块，负责加载JSON配置文件

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::default_filter::DefaultExpression;
use crate::error::ConfigError;

/// 逻辑实体名
pub const RUNS: &str = "runs";
pub const EXPERIMENTS: &str = "experiments";
pub const METRICS: &str = "metrics";
pub const LATEST_METRICS: &str = "latest_metrics";
pub const CONTEXTS: &str = "contexts";

/// 逻辑实体名到物理表名的映射
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTableMap {
    #[serde(flatten)]
    pub mappings: HashMap<String, String>,
}

impl Default for EntityTableMap {
    fn default() -> Self {
        let mappings = [RUNS, EXPERIMENTS, METRICS, LATEST_METRICS, CONTEXTS]
            .into_iter()
            .map(|name| (name.to_string(), name.to_string()))
            .collect();
        Self { mappings }
    }
}

impl EntityTableMap {
    /// 空映射，所有实体都使用逻辑名作为表名
    pub fn new() -> Self {
        Self { mappings: HashMap::new() }
    }

    pub fn with(mut self, entity: impl Into<String>, table: impl Into<String>) -> Self {
        self.mappings.insert(entity.into(), table.into());
        self
    }

    /// 从JSON文件加载表映射配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = read_config_file(path.as_ref())?;
        serde_json::from_str(&content).map_err(|source| ConfigError::InvalidFile {
            path: path.as_ref().to_path_buf(),
            source,
        })
    }

    /// 获取实体对应的表名，如果没有配置则返回逻辑名本身
    pub fn get_table_name(&self, entity: &str) -> String {
        self.mappings
            .get(entity)
            .cloned()
            .unwrap_or_else(|| entity.to_string())
    }

    /// 获取所有映射
    pub fn get_mappings(&self) -> &HashMap<String, String> {
        &self.mappings
    }
}

/// 指标选择器到 latest_metrics 列的映射, 例如 `last` -> `value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSelectors {
    #[serde(flatten)]
    pub columns: BTreeMap<String, String>,
}

impl Default for MetricSelectors {
    fn default() -> Self {
        let columns = [
            ("last", "value"),
            ("last_step", "step"),
            ("last_iter", "last_iter"),
            ("last_timestamp", "timestamp"),
            ("is_nan", "is_nan"),
        ]
        .into_iter()
        .map(|(selector, column)| (selector.to_string(), column.to_string()))
        .collect();
        Self { columns }
    }
}

impl MetricSelectors {
    pub fn column(&self, selector: &str) -> Option<&str> {
        self.columns.get(selector).map(String::as_str)
    }

    /// 所有已知选择器，用于错误提示
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

/// 输入长度与嵌套深度的上限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// 过滤表达式的最大字节数
    pub max_length: usize,
    /// 最大嵌套层数：括号、not、函数调用与 and/or 链的树高
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_length: 8192,
            max_depth: crate::parser::DEFAULT_MAX_DEPTH,
        }
    }
}

/// 查询解析器的完整配置
///
/// ```json
/// {
///   "dialect": "sqlite",
///   "default": { "contains": "run.archived", "expression": "not run.archived" },
///   "tables": { "experiments": "Experiment" },
///   "limits": { "max_length": 4096 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// 目标 SQL 方言名, 例如 `postgres`, `sqlite`
    pub dialect: String,
    pub default: DefaultExpression,
    pub tables: EntityTableMap,
    pub selectors: MetricSelectors,
    pub limits: Limits,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            dialect: "postgres".to_string(),
            default: DefaultExpression::default(),
            tables: EntityTableMap::default(),
            selectors: MetricSelectors::default(),
            limits: Limits::default(),
        }
    }
}

impl ParserConfig {
    /// 从JSON文件加载配置，缺省字段使用默认值
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = read_config_file(path.as_ref())?;
        serde_json::from_str(&content).map_err(|source| ConfigError::InvalidFile {
            path: path.as_ref().to_path_buf(),
            source,
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }
}

fn read_config_file(path: &Path) -> Result<String, ConfigError> {
    // 检查文件是否存在
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
