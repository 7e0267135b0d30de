//! Schema 数据模型：字段定义、字段类型、存在策略与包含过滤器
//!
//! `TrackerSchema` 是字段 id → 字段定义的有序映射，插入顺序即展示与提示顺序，任何往返都必须保持。

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 字段类型标签；未知类型按 STRING 处理
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    #[default]
    String,
    Array,
    Object,
    ForEachObject,
    ForEachArray,
    /// 调和时与 OBJECT 相同，语义上是「该对象形状的实例列表」
    ArrayObject,
    #[serde(other)]
    Unknown,
}

impl FieldType {
    /// 可以携带 nestedFields 的类型
    pub fn is_nesting(self) -> bool {
        matches!(
            self,
            Self::Object | Self::ArrayObject | Self::ForEachObject | Self::ForEachArray
        )
    }
}

/// 字段的存在策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Presence {
    #[default]
    Dynamic,
    Ephemeral,
    Static,
}

/// 调用方选择参与遍历的字段集合
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum IncludeFilter {
    #[default]
    Dynamic,
    Static,
    All,
}

impl IncludeFilter {
    /// DYNAMIC 只在生成相关的遍历（`include_ephemeral`）中额外包含 EPHEMERAL 字段
    pub fn includes(self, presence: Presence, include_ephemeral: bool) -> bool {
        match self {
            Self::All => true,
            Self::Dynamic => {
                presence == Presence::Dynamic
                    || (include_ephemeral && presence == Presence::Ephemeral)
            }
            Self::Static => presence == Presence::Static,
        }
    }
}

impl std::str::FromStr for IncludeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dynamic" => Ok(Self::Dynamic),
            "static" => Ok(Self::Static),
            "all" => Ok(Self::All),
            other => Err(format!("unknown include filter: {other}")),
        }
    }
}

/// Schema 节点
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// 展示标识，同级唯一；实例中的键是 name 而不是 id
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub presence: Presence,
    /// 给生成模型看的字段说明；纯结构字段可以为空
    #[serde(default)]
    pub prompt: String,
    /// STRING 为字面量，其他类型为 JSON 字符串化的种子
    #[serde(default)]
    pub default_value: String,
    /// 各字段按下标并行：下标 i 上所有字段的示例组成一个完整示例实例
    #[serde(default)]
    pub example_values: Vec<String>,
    #[serde(default)]
    pub nested_fields: TrackerSchema,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            ..Default::default()
        }
    }

    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = default_value.into();
        self
    }

    pub fn with_examples<I, S>(mut self, examples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.example_values = examples.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_nested(mut self, id: impl Into<String>, field: FieldDefinition) -> Self {
        self.nested_fields.insert(id, field);
        self
    }

    /// 下标处的非空示例值
    pub fn example(&self, index: usize) -> Option<&str> {
        self.example_values
            .get(index)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// FOR_EACH_ARRAY 的形状判定：恰好一个嵌套字段且为 STRING 时，每个键对应字符串数组
    pub fn is_single_string_shape(&self) -> bool {
        let mut nested = self.nested_fields.fields();
        matches!(
            (nested.next(), nested.next()),
            (Some(only), None) if only.field_type == FieldType::String
        )
    }
}

/// 有序的字段 id → 字段定义映射
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TrackerSchema(IndexMap<String, FieldDefinition>);

impl TrackerSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, field: FieldDefinition) {
        self.0.insert(id.into(), field);
    }

    pub fn with_field(mut self, id: impl Into<String>, field: FieldDefinition) -> Self {
        self.insert(id, field);
        self
    }

    pub fn get(&self, id: &str) -> Option<&FieldDefinition> {
        self.0.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldDefinition)> {
        self.0.iter()
    }

    /// 按 schema 插入顺序遍历字段定义
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields().find(|field| field.name == name)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.field_by_name(name).is_some()
    }

    /// 整棵树（含嵌套）上最长的示例数组长度
    pub fn max_example_count(&self) -> usize {
        self.fields()
            .map(|field| {
                field
                    .example_values
                    .len()
                    .max(field.nested_fields.max_example_count())
            })
            .max()
            .unwrap_or(0)
    }

    /// 下一个可用的 `field-N` id：整棵树上最大数字后缀加一
    pub fn next_field_id(&self) -> String {
        let next = self.max_field_number().map_or(0, |n| n + 1);
        format!("field-{next}")
    }

    fn max_field_number(&self) -> Option<u64> {
        self.iter()
            .flat_map(|(id, field)| {
                let own = id
                    .strip_prefix("field-")
                    .and_then(|suffix| suffix.parse::<u64>().ok());
                own.into_iter().chain(field.nested_fields.max_field_number())
            })
            .max()
    }
}

impl FromIterator<(String, FieldDefinition)> for TrackerSchema {
    fn from_iter<T: IntoIterator<Item = (String, FieldDefinition)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_include_filter() {
        assert!(IncludeFilter::All.includes(Presence::Static, false));
        assert!(IncludeFilter::Dynamic.includes(Presence::Dynamic, false));
        assert!(!IncludeFilter::Dynamic.includes(Presence::Ephemeral, false));
        assert!(IncludeFilter::Dynamic.includes(Presence::Ephemeral, true));
        assert!(!IncludeFilter::Dynamic.includes(Presence::Static, true));
        assert!(IncludeFilter::Static.includes(Presence::Static, false));
        assert!(!IncludeFilter::Static.includes(Presence::Ephemeral, true));
    }

    #[test]
    fn test_deserialize_definition() {
        let schema: TrackerSchema = serde_json::from_value(json!({
            "field-0": {"name": "Time", "type": "STRING", "presence": "DYNAMIC", "prompt": "p",
                        "defaultValue": "now", "exampleValues": ["a"], "nestedFields": {}},
            "field-1": {"name": "Mood", "type": "SOMETHING_NEW"},
            "field-2": {"name": "Cast", "type": "FOR_EACH_ARRAY",
                        "nestedFields": {"field-3": {"name": "Item", "type": "STRING"}}}
        }))
        .unwrap();

        let ids: Vec<_> = schema.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["field-0", "field-1", "field-2"]);
        assert_eq!(schema.get("field-1").unwrap().field_type, FieldType::Unknown);
        assert_eq!(schema.get("field-1").unwrap().presence, Presence::Dynamic);
        assert!(schema.get("field-2").unwrap().is_single_string_shape());
        assert_eq!(schema.next_field_id(), "field-4");
    }

    #[test]
    fn test_serialize_keeps_interchange_shape() {
        let schema = TrackerSchema::new().with_field(
            "field-0",
            FieldDefinition::new("Topics", FieldType::ArrayObject)
                .with_nested("field-1", FieldDefinition::new("Primary", FieldType::String)),
        );
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["field-0"]["type"], json!("ARRAY_OBJECT"));
        assert_eq!(value["field-0"]["nestedFields"]["field-1"]["name"], json!("Primary"));
        assert_eq!(value["field-0"]["exampleValues"], json!([]));
    }

    #[test]
    fn test_max_example_count_includes_nested() {
        let schema = TrackerSchema::new()
            .with_field("a", FieldDefinition::new("A", FieldType::String).with_examples(["1"]))
            .with_field(
                "b",
                FieldDefinition::new("B", FieldType::Object).with_nested(
                    "c",
                    FieldDefinition::new("C", FieldType::String).with_examples(["1", "2", "3"]),
                ),
            );
        assert_eq!(schema.max_example_count(), 3);
        assert_eq!(TrackerSchema::new().max_example_count(), 0);
    }
}
