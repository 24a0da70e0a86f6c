use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use toml::Value;

use crate::error::{Error, Result};

/// Resolved build configuration, queried by the emitters and the template
/// engines. Values come from the host's config TOML; the core only reads.
#[derive(Debug, Clone)]
pub struct BobConfig {
    pub path: PathBuf,
    pub value: Value,
}

impl BobConfig {
    pub fn from_value(value: Value) -> Self {
        Self {
            path: PathBuf::from("<mem>"),
            value,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::msg(format!("failed to read {}: {e}", path.display())))?;
        let value: Value = toml::from_str(&text)
            .map_err(|e| Error::msg(format!("failed to parse {}: {e}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            value,
        })
    }

    pub fn value_path(&self, path: &str) -> Option<&Value> {
        let path = path.trim();
        if path.is_empty() {
            return Some(&self.value);
        }
        let mut cur = &self.value;
        for seg in path.split('.') {
            let tbl = cur.as_table()?;
            cur = tbl.get(seg)?;
        }
        Some(cur)
    }

    pub fn get_bool(&self, path: &str) -> bool {
        self.value_path(path)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.value_path(path).and_then(Value::as_str)
    }

    pub fn deserialize_path<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let Some(v) = self.value_path(path) else {
            return Ok(None);
        };
        let owned = v.clone();
        let parsed = owned
            .try_into()
            .map_err(|e| Error::msg(format!("failed to deserialize config at '{}': {e}", path)))?;
        Ok(Some(parsed))
    }

    /// Flat view of the top-level string and bool values, used by the
    /// configuration-value template pass. Bools render as "1"/"0" so they can
    /// participate in string substitution.
    pub fn string_map(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let Some(tbl) = self.value.as_table() else {
            return out;
        };
        for (k, v) in tbl {
            match v {
                Value::String(s) => {
                    out.insert(k.clone(), s.clone());
                }
                Value::Boolean(b) => {
                    out.insert(k.clone(), if *b { "1".into() } else { "0".into() });
                }
                Value::Integer(i) => {
                    out.insert(k.clone(), i.to_string());
                }
                _ => {}
            }
        }
        out
    }
}
