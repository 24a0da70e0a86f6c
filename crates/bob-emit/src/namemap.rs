use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::module::graph::ModuleGraph;

#[derive(Debug, Default)]
struct Maps {
    forward: BTreeMap<String, String>,
    reverse: BTreeMap<String, String>,
}

/// Bidirectional mapping from declared module name to the backend-exposed
/// name. Writes happen during the populate pass, reads during emission; the
/// host keeps the phases separate, the lock keeps us honest anyway.
#[derive(Debug, Default)]
pub struct NameMap {
    inner: RwLock<Maps>,
}

impl NameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, declared: &str, alt: &str) -> Result<()> {
        let mut maps = self
            .inner
            .write()
            .map_err(|_| Error::msg("name map lock poisoned"))?;
        if let Some(existing) = maps.reverse.get(alt)
            && existing != declared
        {
            return Err(Error::msg(format!(
                "out name collision. Both {declared} and {existing} are required and map to {alt}"
            )));
        }
        maps.forward.insert(declared.to_string(), alt.to_string());
        maps.reverse.insert(alt.to_string(), declared.to_string());
        Ok(())
    }

    pub fn lookup(&self, declared: &str) -> Option<String> {
        self.inner
            .read()
            .ok()
            .and_then(|maps| maps.forward.get(declared).cloned())
    }

    pub fn lookup_all(&self, declared: &[String]) -> Result<Vec<String>> {
        let maps = self
            .inner
            .read()
            .map_err(|_| Error::msg("name map lock poisoned"))?;
        let mut out = Vec::with_capacity(declared.len());
        for name in declared {
            let Some(alt) = maps.forward.get(name) else {
                return Err(Error::module(
                    name.as_str(),
                    "not registered in the backend name map",
                ));
            };
            out.push(alt.clone());
        }
        Ok(out)
    }
}

/// The populate pass. Only enabled, non-defaults modules take part; the
/// host's bottom-up traversal may call this concurrently per module, which
/// the lock in `register` makes safe.
pub fn populate(graph: &ModuleGraph, map: &NameMap) -> Result<()> {
    for module in graph.modules() {
        if module.is_defaults() || !module.enabled() {
            continue;
        }
        map.register(&module.name, module.alt_name())?;
    }
    Ok(())
}
