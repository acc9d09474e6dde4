//! Task inputs, and slots that address values inside a `RunContext`.

use anyhow::anyhow;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine::context::RunContext;
use crate::task::error::TaskError;

/// Arguments handed to a task body for one execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    /// Set when the caller approved a confirmation this task asked for
    pub confirmed: bool,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, value: Value) -> Self {
        self.args.push(value);
        self
    }

    pub fn with_kwarg<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.kwargs.insert(key.into(), value);
        self
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }

    /// Deserialize positional argument `index`, failing validation if absent or mistyped.
    pub fn arg_as<T: DeserializeOwned>(&self, index: usize) -> Result<T, TaskError> {
        let value = self
            .args
            .get(index)
            .ok_or_else(|| TaskError::validation(format!("missing argument {}", index)))?;
        serde_json::from_value(value.clone())
            .map_err(|e| TaskError::validation(format!("argument {}: {}", index, e)))
    }

    /// Deserialize keyword argument `name`, failing validation if absent or mistyped.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, TaskError> {
        let value = self
            .kwargs
            .get(name)
            .ok_or_else(|| TaskError::validation(format!("missing argument {}", name)))?;
        serde_json::from_value(value.clone())
            .map_err(|e| TaskError::validation(format!("{}: {}", name, e)))
    }
}

/// Which `RunContext` map a slot addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Store,
    Artifacts,
    Kwargs,
    Data,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Artifacts => "artifacts",
            Self::Kwargs => "kwargs",
            Self::Data => "data",
        }
    }
}

/// How a slot writes a value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectMode {
    /// Replace the value
    #[default]
    Set,
    /// Push onto a list, creating it if needed
    Append,
    /// Add to a running number, starting at zero
    Count,
}

/// A key inside one section of a `RunContext`.
///
/// Nested keys are separated by `:`, so `Slot::store("scene:frames")`
/// addresses `ctx.store["scene"]["frames"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub section: Section,
    pub key: String,
    #[serde(default)]
    pub mode: InjectMode,
}

pub const KEY_SEPARATOR: char = ':';

impl Slot {
    fn new<S: Into<String>>(section: Section, key: S) -> Self {
        Self {
            section,
            key: key.into(),
            mode: InjectMode::Set,
        }
    }

    pub fn store<S: Into<String>>(key: S) -> Self {
        Self::new(Section::Store, key)
    }

    pub fn artifact<S: Into<String>>(key: S) -> Self {
        Self::new(Section::Artifacts, key)
    }

    /// Read-only: kwargs cannot be injected into
    pub fn kwarg<S: Into<String>>(key: S) -> Self {
        Self::new(Section::Kwargs, key)
    }

    pub fn data<S: Into<String>>(key: S) -> Self {
        Self::new(Section::Data, key)
    }

    pub fn append(mut self) -> Self {
        self.mode = InjectMode::Append;
        self
    }

    pub fn count(mut self) -> Self {
        self.mode = InjectMode::Count;
        self
    }

    pub fn is_writable(&self) -> bool {
        self.section != Section::Kwargs
    }

    fn path(&self) -> Vec<&str> {
        self.key.split(KEY_SEPARATOR).collect()
    }

    fn section_of<'a>(&self, ctx: &'a RunContext) -> &'a Map<String, Value> {
        match self.section {
            Section::Store => &ctx.store,
            Section::Artifacts => &ctx.artifacts,
            Section::Kwargs => &ctx.kwargs,
            Section::Data => &ctx.data,
        }
    }

    /// The addressed value, if present
    pub fn lookup<'a>(&self, ctx: &'a RunContext) -> Option<&'a Value> {
        let path = self.path();
        let (last, parents) = path.split_last()?;
        let mut section = self.section_of(ctx);
        for key in parents {
            section = section.get(*key)?.as_object()?;
        }
        section.get(*last)
    }

    /// Read the addressed value; a missing key is an error.
    pub fn get(&self, ctx: &RunContext) -> Result<Value, TaskError> {
        self.lookup(ctx).cloned().ok_or_else(|| {
            TaskError::other(anyhow!(
                "{} key '{}' not found",
                self.section.as_str(),
                self.key
            ))
        })
    }

    /// Write `value` according to the slot's mode, creating parent objects.
    pub fn set(&self, ctx: &mut RunContext, value: Value) -> Result<(), TaskError> {
        let mut section = match self.section {
            Section::Store => &mut ctx.store,
            Section::Artifacts => &mut ctx.artifacts,
            Section::Data => &mut ctx.data,
            Section::Kwargs => {
                return Err(TaskError::other(anyhow!(
                    "kwarg slot '{}' cannot receive results",
                    self.key
                )))
            }
        };

        let path = self.path();
        let Some((last, parents)) = path.split_last() else {
            return Ok(());
        };
        for key in parents {
            let entry = section
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            section = entry.as_object_mut().ok_or_else(|| {
                TaskError::other(anyhow!(
                    "{} key '{}' is not an object",
                    self.section.as_str(),
                    key
                ))
            })?;
        }

        match self.mode {
            InjectMode::Set => {
                section.insert(last.to_string(), value);
            }
            InjectMode::Append => {
                let entry = section
                    .entry(last.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                match entry {
                    Value::Array(items) => items.push(value),
                    other => {
                        let previous = other.take();
                        *other = Value::Array(vec![previous, value]);
                    }
                }
            }
            InjectMode::Count => {
                let step = value.as_f64().unwrap_or(1.0);
                let current = section.get(*last).and_then(Value::as_f64).unwrap_or(0.0);
                let total = current + step;
                let number = if total.fract() == 0.0 && total.abs() < i64::MAX as f64 {
                    Value::from(total as i64)
                } else {
                    Value::from(total)
                };
                section.insert(last.to_string(), number);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_params_accessors() {
        let params = Params::new()
            .with_arg(json!(3))
            .with_kwarg("name", json!("shot_010"));
        assert_eq!(params.arg_as::<i64>(0).unwrap(), 3);
        assert_eq!(params.get::<String>("name").unwrap(), "shot_010");
        assert_eq!(params.get::<i64>("missing").unwrap_err().kind(), "validation");
        assert_eq!(params.get::<i64>("name").unwrap_err().kind(), "validation");
    }

    #[test]
    fn test_nested_set_and_get() {
        let mut ctx = RunContext::new("x");
        Slot::store("scene:frames").set(&mut ctx, json!(24)).unwrap();
        assert_eq!(ctx.store, json!({"scene": {"frames": 24}}).as_object().cloned().unwrap());
        assert_eq!(Slot::store("scene:frames").get(&ctx).unwrap(), json!(24));
        assert!(Slot::store("scene:missing").get(&ctx).is_err());
    }

    #[test]
    fn test_append_and_count() {
        let mut ctx = RunContext::new("x");
        let files = Slot::artifact("files").append();
        files.set(&mut ctx, json!("a.exr")).unwrap();
        files.set(&mut ctx, json!("b.exr")).unwrap();
        assert_eq!(ctx.artifacts["files"], json!(["a.exr", "b.exr"]));

        let counter = Slot::store("published").count();
        counter.set(&mut ctx, json!(null)).unwrap();
        counter.set(&mut ctx, json!(2)).unwrap();
        assert_eq!(ctx.store["published"], json!(3));
    }

    #[test]
    fn test_kwarg_slot_is_read_only() {
        let mut ctx = RunContext::new("x").with_kwarg("project", json!("demo"));
        let slot = Slot::kwarg("project");
        assert!(!slot.is_writable());
        assert_eq!(slot.get(&ctx).unwrap(), json!("demo"));
        assert!(slot.set(&mut ctx, json!("other")).is_err());
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut ctx = RunContext::new("x");
        Slot::store("a").set(&mut ctx, json!(1)).unwrap();
        assert!(Slot::store("a:b").set(&mut ctx, json!(2)).is_err());
    }
}
