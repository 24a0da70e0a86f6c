use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::emit::Backend;
use crate::error::{Error, Result};
use crate::module::Module;
use crate::module::graph::ModuleGraph;
use crate::template::{FuncMap, PropExpander};
use crate::toolchain::{Toolchain, ToolchainSet};
use crate::utils;

/// The late-template mutator pass. Runs after property resolution and
/// before any emission, so every string arriving at an emitter is already
/// expanded. These templates see semantic module state (the source list,
/// the active toolchain) that the configuration-value pass cannot.
pub fn apply_late_templates(
    graph: &mut ModuleGraph,
    toolchains: &ToolchainSet,
    backend: &dyn Backend,
) -> Result<()> {
    for module in graph.modules_mut() {
        if !module.enabled() {
            continue;
        }
        apply_to_module(module, toolchains, backend)?;
    }
    Ok(())
}

/// `match_srcs` is only applied where sensible use-cases exist: a library's
/// ldflags, and a generator's args and cmd.
fn match_src_props(module: &Module) -> &'static [&'static str] {
    if module.library().is_some() {
        &["ldflags"]
    } else if module.generate().is_some() {
        &["args", "cmd"]
    } else {
        &[]
    }
}

pub fn apply_to_module(
    module: &mut Module,
    toolchains: &ToolchainSet,
    backend: &dyn Backend,
) -> Result<()> {
    let name = module.name.clone();
    let srcs = module.sources().to_vec();
    let is_library = module.library().is_some();
    let target = module.target();
    let props_with_match = match_src_props(module);

    // Unused non-compiled sources are not allowed, so track whether each one
    // gets consumed by a match_srcs expansion. Headers are exempt; they ride
    // along as plain dependencies.
    let mut initial: BTreeMap<String, bool> = BTreeMap::new();
    if is_library {
        for src in &srcs {
            if utils::is_not_compilable_source(src) && !utils::is_header_source(src) {
                initial.insert(src.clone(), false);
            }
        }
    }
    let non_compiled = RefCell::new(initial);

    let source_dir = backend.source_dir();
    let match_srcs_fn = |args: &[String]| -> Result<String> {
        let [glob] = args else {
            return Err(Error::msg("match_srcs expects exactly one argument"));
        };
        let mut matched = Vec::new();
        for src in &srcs {
            if utils::match_source_glob(glob, src) {
                if let Some(flag) = non_compiled.borrow_mut().get_mut(src) {
                    *flag = true;
                }
                matched.push(utils::join_path(&source_dir, src));
            }
        }
        if matched.is_empty() {
            return Err(Error::module(
                name.as_str(),
                format!("could not match '{glob}' against the source list"),
            ));
        }
        Ok(matched.join(" "))
    };
    let match_srcs_fn = &match_srcs_fn;

    let tc = toolchains.for_target(target);
    let flag_if_supported = |flag: &str, langs: &[&str]| -> String {
        if langs.iter().any(|lang| tc.check_flag_is_supported(lang, flag)) {
            flag.to_string()
        } else {
            String::new()
        }
    };
    let flag_if_supported = &flag_if_supported;

    let mut propfnmap: BTreeMap<String, FuncMap> = BTreeMap::new();
    for prop in props_with_match {
        let fm = propfnmap.entry(prop.to_string()).or_default();
        fm.insert("match_srcs", move |args: &[String]| match_srcs_fn(args));
    }
    if is_library {
        static FLAG_PROP_LANGS: [(&[&str], &[&str]); 3] = [
            (&["cflags", "export_cflags"], &["c++", "c"]),
            (&["cxxflags"], &["c++"]),
            (&["conlyflags"], &["c"]),
        ];
        for (props, langs) in FLAG_PROP_LANGS {
            for prop in props {
                let fm = propfnmap.entry(prop.to_string()).or_default();
                fm.insert("add_if_supported", move |args: &[String]| match args {
                    [flag] => Ok(flag_if_supported(flag, langs)),
                    _ => Err(Error::msg(
                        "add_if_supported expects exactly one argument",
                    )),
                });
            }
        }
    }

    // No late templates apply to this module kind.
    if propfnmap.is_empty() {
        return Ok(());
    }

    let mut expander = PropExpander { propfnmap };
    module.walk_props(&mut expander)?;
    drop(expander);

    for (src, matched) in non_compiled.borrow().iter() {
        if !matched {
            return Err(Error::module(
                name.as_str(),
                format!("non-compiled source {src} is not consumed by match_srcs"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::BuildDescription;
    use crate::toolchain::ConfigToolchain;

    struct TestBackend;

    impl Backend for TestBackend {
        fn source_dir(&self) -> String {
            "$(LOCAL_PATH)".to_string()
        }
        fn build_dir(&self) -> String {
            "$(BOB_ANDROIDMK_DIR)".to_string()
        }
        fn scripts_dir(&self) -> String {
            "$(LOCAL_PATH)/scripts".to_string()
        }
        fn escape_flag(&self, s: &str) -> String {
            s.to_string()
        }
    }

    fn module(desc: &str) -> Module {
        let mut desc = BuildDescription::from_str(desc).expect("parse");
        desc.modules.remove(0)
    }

    fn toolchains() -> ToolchainSet {
        ToolchainSet {
            target: ConfigToolchain::with_supported_flags(&["-fcommon"], &["-fno-rtti"]),
            host: ConfigToolchain::default(),
        }
    }

    #[test]
    fn match_srcs_expands_ldflags_to_source_paths() {
        let mut m = module(
            r#"
[[modules]]
name = "libfoo"
kind = "shared-lib"
srcs = ["a.c", "scripts/version.ld"]
ldflags = ["-Wl,--script={{match_srcs \"*.ld\"}}"]
"#,
        );
        apply_to_module(&mut m, &toolchains(), &TestBackend).expect("expand");
        assert_eq!(
            m.library().expect("lib").ldflags,
            vec!["-Wl,--script=$(LOCAL_PATH)/scripts/version.ld".to_string()]
        );
    }

    #[test]
    fn empty_match_is_fatal_and_names_the_module() {
        let mut m = module(
            r#"
[[modules]]
name = "libfoo"
kind = "shared-lib"
srcs = ["a.c"]
ldflags = ["{{match_srcs \"version.ld\"}}"]
"#,
        );
        let err = apply_to_module(&mut m, &toolchains(), &TestBackend).expect_err("must fail");
        assert!(err.to_string().contains("version.ld"));
        assert!(err.to_string().contains("libfoo"));
    }

    #[test]
    fn unconsumed_non_compiled_source_is_fatal() {
        let mut m = module(
            r#"
[[modules]]
name = "libfoo"
kind = "shared-lib"
srcs = ["a.c", "version.ld"]
"#,
        );
        let err = apply_to_module(&mut m, &toolchains(), &TestBackend).expect_err("must fail");
        assert!(err.to_string().contains("version.ld"));
        assert!(err.to_string().contains("match_srcs"));
    }

    #[test]
    fn headers_do_not_need_match_srcs() {
        let mut m = module(
            r#"
[[modules]]
name = "libfoo"
kind = "static-lib"
srcs = ["a.c", "x.h"]
"#,
        );
        apply_to_module(&mut m, &toolchains(), &TestBackend).expect("headers are exempt");
    }

    #[test]
    fn add_if_supported_consults_the_toolchain_per_language() {
        let mut m = module(
            r#"
[[modules]]
name = "libfoo"
kind = "static-lib"
srcs = ["a.c"]
cflags = ["{{add_if_supported \"-fcommon\"}}", "-Wall"]
cxxflags = ["{{add_if_supported \"-fno-rtti\"}}"]
conlyflags = ["{{add_if_supported \"-fno-rtti\"}}"]
"#,
        );
        apply_to_module(&mut m, &toolchains(), &TestBackend).expect("expand");
        let lib = m.library().expect("lib");
        assert_eq!(lib.cflags, vec!["-fcommon".to_string(), "-Wall".to_string()]);
        assert_eq!(lib.cxxflags, vec!["-fno-rtti".to_string()]);
        // -fno-rtti is a C++ flag; the C-only list drops it entirely.
        assert!(lib.conlyflags.is_empty());
    }

    #[test]
    fn second_run_produces_identical_output() {
        let mut m = module(
            r#"
[[modules]]
name = "libfoo"
kind = "static-lib"
srcs = ["a.c"]
cflags = ["{{add_if_supported \"-fcommon\"}}", "-O2"]
"#,
        );
        let tcs = toolchains();
        apply_to_module(&mut m, &tcs, &TestBackend).expect("first run");
        let after_first = m.library().expect("lib").cflags.clone();
        apply_to_module(&mut m, &tcs, &TestBackend).expect("second run");
        assert_eq!(m.library().expect("lib").cflags, after_first);
    }
}
