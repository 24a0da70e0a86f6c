use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::module::{DepTag, KindProps, Module};

#[derive(Debug, Clone)]
pub struct DepEdge {
    pub name: String,
    pub tag: DepTag,
}

/// The module DAG. Edges are derived from the property records when the
/// graph is built; referencing an undeclared module is fatal at that point,
/// cycles are caught later by the orderer.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: BTreeMap<String, Module>,
    deps: BTreeMap<String, Vec<DepEdge>>,
}

fn edges_of(module: &Module) -> Vec<DepEdge> {
    let mut edges = Vec::new();
    let mut push = |names: &[String], tag: DepTag| {
        for name in names {
            edges.push(DepEdge {
                name: name.clone(),
                tag,
            });
        }
    };

    match &module.kind {
        KindProps::StaticLib(p) | KindProps::SharedLib(p) | KindProps::Binary(p) => {
            push(&p.static_libs, DepTag::Static);
            push(&p.shared_libs, DepTag::Shared);
            push(&p.whole_static_libs, DepTag::WholeStatic);
            push(&p.header_libs, DepTag::Header);
            push(&p.export_header_libs, DepTag::Header);
            push(&p.generated_sources, DepTag::GeneratedSource);
            push(&p.generated_headers, DepTag::GeneratedHeader);
            push(&p.install_deps, DepTag::Install);
        }
        KindProps::KernelModule(p) => {
            push(&p.extra_symbols, DepTag::KernelModule);
            push(&p.install_deps, DepTag::Install);
        }
        KindProps::GenerateSource(p)
        | KindProps::TransformSource(p)
        | KindProps::GenerateStaticLib(p)
        | KindProps::GenerateSharedLib(p)
        | KindProps::GenerateBinary(p) => {
            push(&p.generated_deps, DepTag::GeneratedSource);
            push(&p.install_deps, DepTag::Install);
        }
        KindProps::Resource(p) => {
            push(&p.install_deps, DepTag::Install);
        }
        KindProps::Alias(p) => {
            push(&p.srcs, DepTag::Alias);
        }
        KindProps::ExternalLib(_) | KindProps::Defaults(_) => {}
    }
    edges
}

impl ModuleGraph {
    pub fn new(modules: Vec<Module>) -> Result<Self> {
        let mut graph = Self::default();
        for module in modules {
            if graph.modules.contains_key(&module.name) {
                return Err(Error::msg(format!(
                    "duplicate module name '{}'",
                    module.name
                )));
            }
            graph.modules.insert(module.name.clone(), module);
        }

        for (name, module) in &graph.modules {
            let edges = edges_of(module);
            for edge in &edges {
                if !graph.modules.contains_key(&edge.name) {
                    return Err(Error::module(
                        name.as_str(),
                        format!("depends on undeclared module '{}'", edge.name),
                    ));
                }
            }
            graph.deps.insert(name.clone(), edges);
        }
        Ok(graph)
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn into_modules(self) -> Vec<Module> {
        self.modules.into_values().collect()
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn modules_mut(&mut self) -> impl Iterator<Item = &mut Module> {
        self.modules.values_mut()
    }

    pub fn direct_deps(&self, name: &str) -> &[DepEdge] {
        self.deps.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn visit_direct_deps_if<P, F>(&self, name: &str, pred: P, mut f: F) -> Result<()>
    where
        P: Fn(&DepEdge) -> bool,
        F: FnMut(&Module, &DepEdge) -> Result<()>,
    {
        for edge in self.direct_deps(name) {
            if !pred(edge) {
                continue;
            }
            let dep = self
                .modules
                .get(&edge.name)
                .expect("edges are validated at construction");
            f(dep, edge)?;
        }
        Ok(())
    }

    /// Walks the dependency tree below `name`. The callback decides, per
    /// edge, whether to descend into that dependency's own dependencies.
    /// Each (parent, child) edge is visited at most once so a cyclic input
    /// cannot loop the walk.
    pub fn walk_deps<F>(&self, name: &str, mut f: F)
    where
        F: FnMut(&Module, &DepEdge) -> bool,
    {
        let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
        self.walk_deps_inner(name, &mut f, &mut seen);
    }

    fn walk_deps_inner<F>(
        &self,
        name: &str,
        f: &mut F,
        seen: &mut BTreeSet<(String, String)>,
    ) where
        F: FnMut(&Module, &DepEdge) -> bool,
    {
        for edge in self.direct_deps(name) {
            if !seen.insert((name.to_string(), edge.name.clone())) {
                continue;
            }
            let dep = self
                .modules
                .get(&edge.name)
                .expect("edges are validated at construction");
            if f(dep, edge) {
                self.walk_deps_inner(&edge.name, f, seen);
            }
        }
    }

    /// Visits every transitive dependency of `name` exactly once, children
    /// before their dependents.
    pub fn visit_deps_depth_first<F>(&self, name: &str, mut f: F)
    where
        F: FnMut(&Module),
    {
        let mut visited: BTreeSet<String> = BTreeSet::new();
        for edge in self.direct_deps(name) {
            self.visit_depth_first_inner(name, &edge.name, &mut f, &mut visited);
        }
    }

    fn visit_depth_first_inner<F>(
        &self,
        root: &str,
        name: &str,
        f: &mut F,
        visited: &mut BTreeSet<String>,
    ) where
        F: FnMut(&Module),
    {
        if !visited.insert(name.to_string()) {
            return;
        }
        for edge in self.direct_deps(name) {
            self.visit_depth_first_inner(root, &edge.name, f, visited);
        }
        let module = self
            .modules
            .get(name)
            .expect("edges are validated at construction");
        if module.name != root {
            f(module);
        } else {
            // A module reachable from itself means the graph is cyclic; the
            // orderer reports that with full context, so don't fire the
            // callback for the root here.
        }
    }

    /// Export_cflags contributed by direct link and header dependencies.
    pub fn exported_cflags(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        for edge in self.direct_deps(name) {
            if !edge.tag.is_link() && edge.tag != DepTag::Header {
                continue;
            }
            let Some(dep) = self.modules.get(&edge.name) else {
                continue;
            };
            match &dep.kind {
                KindProps::StaticLib(p) | KindProps::SharedLib(p) | KindProps::Binary(p) => {
                    out.extend(p.export_cflags.iter().cloned());
                }
                KindProps::ExternalLib(p) => {
                    out.extend(p.export_cflags.iter().cloned());
                }
                _ => {}
            }
        }
        out
    }

    /// Names of directly-depended generate-source/transform-source modules.
    pub fn generated_source_modules(&self, name: &str) -> Vec<&Module> {
        let mut out = Vec::new();
        for edge in self.direct_deps(name) {
            if edge.tag != DepTag::GeneratedSource {
                continue;
            }
            let Some(dep) = self.modules.get(&edge.name) else {
                continue;
            };
            if matches!(
                dep.kind,
                KindProps::GenerateSource(_) | KindProps::TransformSource(_)
            ) {
                out.push(dep);
            }
        }
        out
    }

    /// Include dirs and outputs contributed by generated-header deps.
    pub fn generated_headers(&self, name: &str) -> (Vec<String>, Vec<String>) {
        let mut dirs = Vec::new();
        let mut outputs = Vec::new();
        for edge in self.direct_deps(name) {
            if edge.tag != DepTag::GeneratedHeader {
                continue;
            }
            let Some(dep) = self.modules.get(&edge.name) else {
                continue;
            };
            dirs.extend(dep.gen_include_dirs.iter().cloned());
            outputs.extend(dep.outs.iter().cloned());
        }
        (dirs, outputs)
    }

    /// Install-time dependencies (install and kernel-module tags), by
    /// declared name.
    pub fn install_dep_names(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        for edge in self.direct_deps(name) {
            if edge.tag == DepTag::Install || edge.tag == DepTag::KernelModule {
                out.push(edge.name.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::BuildDescription;

    fn graph(desc: &str) -> ModuleGraph {
        let desc = BuildDescription::from_str(desc).expect("parse");
        ModuleGraph::new(desc.modules).expect("graph")
    }

    #[test]
    fn undeclared_dependency_is_fatal() {
        let desc = BuildDescription::from_str(
            r#"
[[modules]]
name = "libfoo"
kind = "static-lib"
static_libs = ["libmissing"]
"#,
        )
        .expect("parse");
        let err = ModuleGraph::new(desc.modules).expect_err("must fail");
        assert!(err.to_string().contains("libmissing"));
        assert!(err.to_string().contains("libfoo"));
    }

    #[test]
    fn depth_first_visit_sees_transitive_deps_once() {
        let g = graph(
            r#"
[[modules]]
name = "app"
kind = "binary"
static_libs = ["liba", "libb"]

[[modules]]
name = "liba"
kind = "static-lib"
static_libs = ["libc"]

[[modules]]
name = "libb"
kind = "static-lib"
static_libs = ["libc"]

[[modules]]
name = "libc"
kind = "static-lib"
"#,
        );
        let mut seen = Vec::new();
        g.visit_deps_depth_first("app", |m| seen.push(m.name.clone()));
        assert_eq!(seen, vec!["libc", "liba", "libb"]);
    }

    #[test]
    fn walk_deps_can_prune_subtrees() {
        let g = graph(
            r#"
[[modules]]
name = "app"
kind = "binary"
shared_libs = ["libshared"]

[[modules]]
name = "libshared"
kind = "shared-lib"
static_libs = ["libdeep"]

[[modules]]
name = "libdeep"
kind = "static-lib"
"#,
        );
        let mut seen = Vec::new();
        g.walk_deps("app", |m, edge| {
            seen.push(m.name.clone());
            edge.tag != DepTag::Shared
        });
        assert_eq!(seen, vec!["libshared"]);
    }
}
