use std::path::PathBuf;

use crate::emit::BuildGraphTarget;
use crate::error::{Error, Result};
use crate::fileutils;
use crate::module::graph::ModuleGraph;

use super::AndroidMkGenerator;

struct MkFile {
    name: String,
    deps: Vec<String>,
}

/// Runs once, after every module has emitted: collects each module's
/// fragment-producing transitive dependencies and writes `Android.inc`
/// including every fragment in dependency order.
///
/// Ties are broken by always taking the lexicographically smallest
/// dependency-free name, so the result is total and reproducible.
pub fn write_android_inc(
    g: &AndroidMkGenerator,
    graph: &ModuleGraph,
) -> Result<(PathBuf, BuildGraphTarget)> {
    let mut order: Vec<MkFile> = Vec::new();
    for module in graph.modules() {
        if !module.enabled() {
            continue;
        }
        let mut deps = Vec::new();
        graph.visit_deps_depth_first(&module.name, |child| {
            if child.emits_inc() && child.enabled() {
                deps.push(child.alt_short_name().to_string());
            }
        });
        if module.emits_inc() {
            order.push(MkFile {
                name: module.alt_short_name().to_string(),
                deps,
            });
        }
    }

    let mut sb = String::new();
    while !order.is_empty() {
        let mut low: Option<usize> = None;
        for (i, entry) in order.iter().enumerate() {
            if entry.deps.is_empty() && low.is_none_or(|l| entry.name < order[l].name) {
                low = Some(i);
            }
        }
        let Some(low) = low else {
            let mut deps_text = String::new();
            for entry in &order {
                deps_text.push_str(&format!("{} depends on\n", entry.name));
                for dep in &entry.deps {
                    deps_text.push_str(&format!("\t{dep}\n"));
                }
            }
            return Err(Error::msg(format!(
                "unmet or circular dependency. {} remaining.\n{deps_text}",
                order.len()
            )));
        };

        let name = order.remove(low).name;
        sb.push_str(&format!("include $(BOB_ANDROIDMK_DIR)/{name}.inc\n"));
        for entry in &mut order {
            entry.deps.retain(|dep| dep != &name);
        }
    }

    let path = g.androidmk_path();
    fileutils::write_if_changed(&path, &sb)?;

    // The host only tracks package-context dependencies when a backend
    // contributes something to the build graph. The makefiles carry the
    // actual build logic, so register a no-op target for the aggregate
    // file, optional so it never runs on its own.
    let target = BuildGraphTarget {
        rule: "nop",
        outputs: vec![path.clone()],
        optional: true,
    };
    Ok((path, target))
}
