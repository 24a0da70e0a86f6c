use std::collections::BTreeMap;

use crate::emit::Backend;
use crate::error::{Error, Result};
use crate::module::{GenerateProps, Module, TgtType};
use crate::utils;

use super::{AndroidMkGenerator, path_to_module_name, write_list_assignment};

/// Older platforms want depfiles converted to .P files; the conditional has
/// to travel with every rule that writes one.
pub fn transform_dep_file(depfile: &str) -> String {
    format!(
        "ifeq ($(word 1, $(subst ., ,$(PLATFORM_VERSION))),7)\n\
         \t$(call transform-d-to-p-args,{depfile},{depfile}.P)\n\
         endif\n"
    )
}

pub fn include_dep_file(target: &str, depfile: &str) -> String {
    format!(
        "ifeq ($(word 1, $(subst ., ,$(PLATFORM_VERSION))),7)\n\
         \x20 $(call include-depfile,{depfile}.P,{target})\n\
         else\n\
         \x20 $(call include-depfile,{depfile},{target})\n\
         endif\n"
    )
}

fn outputs_var(module: &Module) -> String {
    format!("{}_OUTPUTS", module.name)
}

fn output_dir_var(module: &Module) -> String {
    format!("{}_GEN_DIR", module.name)
}

fn get_args(
    g: &AndroidMkGenerator,
    module: &Module,
    props: &GenerateProps,
) -> Result<(String, BTreeMap<String, String>, Vec<String>)> {
    let Some(cmd) = &props.cmd else {
        return Err(Error::module(module.name.as_str(), "has no cmd"));
    };
    let cmd = cmd.replace("${args}", &props.args.join(" "));

    let mut args = BTreeMap::new();
    let mut implicits = Vec::new();
    if let Some(tool) = &props.tool {
        let tool_path = g.source_path(tool);
        implicits.push(tool_path.clone());
        args.insert("tool".to_string(), tool_path);
    }
    args.insert("gen_dir".to_string(), module.output_dir.clone());
    for dep in &props.generated_deps {
        args.insert(format!("{dep}_out"), format!("$({dep}_OUTPUTS)"));
    }
    utils::strip_unused_args(&mut args, &cmd);
    Ok((cmd, args, implicits))
}

pub fn generate_common_actions(g: &AndroidMkGenerator, module: &Module) -> Result<String> {
    let props = module.generate().expect("generator kinds only");

    let mut sb = String::new();
    sb.push_str("##########################\ninclude $(CLEAR_VARS)\n\n");

    // Declared under the module's own name so that
    // $(local-generated-sources-dir) resolves as expected in dependents.
    sb.push_str(&format!("LOCAL_MODULE := {}\n", module.name));
    sb.push_str("LOCAL_MODULE_CLASS := STATIC_LIBRARIES\n");
    sb.push_str(&format!("{} := \n", outputs_var(module)));
    sb.push_str(&format!(
        "{} := {}\n",
        output_dir_var(module),
        module.output_dir
    ));
    sb.push('\n');

    let (cmd, args, implicits) = get_args(g, module, props)?;

    for inout in &props.inouts {
        let Some(first_out) = inout.outs.first() else {
            return Err(Error::module(
                module.name.as_str(),
                "has an inout with no outputs",
            ));
        };
        let ins = inout.srcs.join(" ");

        // Make does not cleanly support multiple output files, so the rule
        // is attached to the first output and every other output depends on
        // it. Removing a secondary output alone will not rebuild it, which
        // is acceptable for generated directories.
        for (key, value) in &args {
            sb.push_str(&format!("{first_out}: {key}:= {value}\n"));
        }
        sb.push_str(&format!("{first_out}: in := {ins}\n"));
        sb.push_str(&format!("{first_out}: out := {}\n", inout.outs.join(" ")));
        if let Some(depfile) = &inout.depfile {
            sb.push_str(&format!("{first_out}: depfile := {depfile}\n"));
        }
        let rspfile = inout
            .rspfile
            .clone()
            .unwrap_or_else(|| format!("{first_out}.rsp"));
        if props.rsp_content.is_some() {
            sb.push_str(&format!("{first_out}: rspfile := {rspfile}\n"));
        }
        if cmd.contains("$(LOCAL_PATH)") {
            sb.push_str(&format!("{first_out}: LOCAL_PATH := $(LOCAL_PATH)\n"));
        }

        sb.push_str(&format!(
            "{first_out}: {ins} {}\n",
            inout.implicit_srcs.join(" ")
        ));
        // Kati moves long command lines into response files by itself, so
        // echoing the content is enough; Make's $(file) is not permitted
        // under Kati.
        if let Some(content) = &props.rsp_content {
            sb.push_str(&format!("\techo \"{content}\" > \"$(rspfile)\"\n"));
        }
        sb.push_str(&format!("\t{cmd}\n"));
        if let Some(depfile) = &inout.depfile {
            // Convert the depfile format as part of the rule, include it
            // outside of it.
            sb.push_str(&transform_dep_file("$(depfile)"));
            sb.push_str(&include_dep_file(first_out, depfile));
        }
        sb.push_str(&format!("{} += {first_out}\n", outputs_var(module)));

        for out in inout.outs.iter().skip(1).chain(inout.implicit_outs.iter()) {
            sb.push_str(&format!("{out}: {first_out}\n"));
            sb.push_str(&format!("{} += {out}\n", outputs_var(module)));
        }
        sb.push('\n');
    }
    sb.push_str(&format!(
        "$({}): {}\n",
        outputs_var(module),
        implicits.join(" ")
    ));

    // Keep dependents from rebuilding when a re-run leaves the outputs
    // unchanged.
    sb.push_str(&format!(".KATI_RESTAT: $({})\n", outputs_var(module)));
    Ok(sb)
}

fn install_generated_files(module: &Module) -> String {
    let mut sb = String::new();
    let Some(install) = module.install_props() else {
        return sb;
    };
    let Some((install_base, install_rel)) = install.install_path() else {
        return sb;
    };

    sb.push('\n');
    for file in &module.outs {
        let module_name = path_to_module_name(file);

        sb.push_str("include $(CLEAR_VARS)\n\n");
        sb.push_str(&format!("LOCAL_MODULE := {module_name}\n"));
        sb.push_str(&format!(
            "LOCAL_INSTALLED_MODULE_STEM := {}\n",
            super::file_stem_of(file)
        ));
        sb.push_str("LOCAL_MODULE_CLASS := ETC\n");
        sb.push_str(&format!("LOCAL_MODULE_PATH := {install_base}\n"));
        sb.push_str(&format!("LOCAL_MODULE_RELATIVE_PATH := {install_rel}\n"));
        write_list_assignment(&mut sb, "LOCAL_MODULE_TAGS", module.tags());
        sb.push_str(&format!("LOCAL_PREBUILT_MODULE_FILE := {file}\n\n"));
        sb.push_str("include $(BUILD_PREBUILT)\n");
    }
    sb
}

pub fn generate_source_actions(g: &AndroidMkGenerator, module: &Module) -> Result<String> {
    let mut sb = generate_common_actions(g, module)?;
    sb.push_str(&install_generated_files(module));
    Ok(sb)
}

// The export_includes and link_type snippets below are modelled on the
// Android makefiles in aosp/build/core/make/prebuilt_internal.mk.

fn write_export_include_mk_text(sb: &mut String, module_name: &str) {
    sb.push_str(
        "export_includes:=$(intermediates)/export_includes\n\
         $(export_includes): PRIVATE_EXPORT_C_INCLUDE_DIRS:=$(LOCAL_EXPORT_C_INCLUDE_DIRS)\n",
    );

    // The rule proper, depending on this module's own outputs.
    sb.push_str(&format!(
        "$(export_includes): $({module_name}_OUTPUTS) $(LOCAL_MODULE_MAKEFILE_DEP)\n"
    ));

    sb.push_str(
        "\t@echo Export includes file: $< -- $@\n\
         \t$(hide) mkdir -p $(dir $@) && rm -f $@\n\
         ifdef LOCAL_EXPORT_C_INCLUDE_DIRS\n\
         \t$(hide) for d in $(PRIVATE_EXPORT_C_INCLUDE_DIRS); do \\\n\
         \t\techo \"-I $$d\" >> $@; \\\n\
         \t\tdone\n\
         else\n\
         \t$(hide) touch $@\n\
         endif\n\n\
         $(LOCAL_BUILT_MODULE): $(LOCAL_SRC_FILES) | $(export_includes)\n\
         \tmkdir -p $(dir $@)\n\
         \tcp $< $@\n\n",
    );
}

// LOCAL_SDK_VERSION and LOCAL_USE_VNDK are assumed unset.
const LIBRARY_LINK_TYPE_MK_TEXT: &str = "ifeq ($(PLATFORM_SDK_VERSION),25)\n\
     \x20 # link_type not required\n\
     else ifeq ($(PLATFORM_SDK_VERSION),26)\n\
     \x20 my_link_type := $(intermediates)/link_type\n\n\
     $(my_link_type): PRIVATE_LINK_TYPE := native:platform\n\
     $(eval $(call link-type-partitions,$(my_link_type)))\n\
     $(my_link_type):\n\
     \t@echo Check module type: $@\n\
     \t$(hide) mkdir -p $(dir $@) && rm -f $@\n\
     \t$(hide) echo \"$(PRIVATE_LINK_TYPE)\" >$@\n\
     $(LOCAL_BUILT_MODULE): | $(my_link_type)\n\n\
     else\n\
     \x20 include $(BUILD_SYSTEM)/allowed_ndk_types.mk\n\n\
     \x20 my_link_type := native:platform\n\
     \x20 my_link_deps :=\n\
     \x20 my_2nd_arch_prefix := $(LOCAL_2ND_ARCH_VAR_PREFIX)\n\
     \x20 my_common :=\n\
     \x20 include $(BUILD_SYSTEM)/link_type.mk\n\
     endif\n";

fn declare_prebuilt_static_lib(
    sb: &mut String,
    module_name: &str,
    path: &str,
    include_paths: &str,
    target: bool,
) {
    sb.push_str("\ninclude $(CLEAR_VARS)\n");
    sb.push_str(&format!("LOCAL_MODULE:={module_name}\n"));
    sb.push_str(&format!("LOCAL_SRC_FILES:={path}\n"));
    if !target {
        sb.push_str("LOCAL_IS_HOST_MODULE:=true\n");
    }

    // `include $(PREBUILT_STATIC_LIBRARY)` would say all of this, but that
    // rule is NDK-only, hence the longhand.
    sb.push_str("LOCAL_MODULE_CLASS:=STATIC_LIBRARIES\n");
    sb.push_str("LOCAL_UNINSTALLABLE_MODULE:=true\n");
    sb.push_str("LOCAL_MODULE_SUFFIX:=.a\n");

    if !include_paths.is_empty() {
        sb.push_str(&format!("LOCAL_EXPORT_C_INCLUDE_DIRS:={include_paths}\n"));
    }

    sb.push_str("include $(BUILD_SYSTEM)/base_rules.mk\n\n");

    write_export_include_mk_text(sb, module_name);
    sb.push_str(LIBRARY_LINK_TYPE_MK_TEXT);
}

fn declare_prebuilt_shared_lib(
    sb: &mut String,
    module_name: &str,
    path: &str,
    include_paths: &str,
    target: bool,
) {
    sb.push_str("\ninclude $(CLEAR_VARS)\n");
    sb.push_str(&format!("LOCAL_MODULE:={module_name}\n"));
    sb.push_str(&format!("LOCAL_SRC_FILES:={path}\n"));
    if !target {
        sb.push_str("LOCAL_IS_HOST_MODULE:=true\n");
    }

    sb.push_str("LOCAL_MODULE_CLASS:=SHARED_LIBRARIES\n");
    sb.push_str("LOCAL_MODULE_SUFFIX:=.so\n");

    if !include_paths.is_empty() {
        sb.push_str(&format!("LOCAL_EXPORT_C_INCLUDE_DIRS:={include_paths}\n"));
    }

    // Shared libraries go to the common intermediates path to keep the link
    // line simple; only the primary architecture is supported, the others
    // would be TARGET_2ND_x / HOST_2ND_x.
    if target {
        sb.push_str("OVERRIDE_BUILT_MODULE_PATH:=$(TARGET_OUT_INTERMEDIATE_LIBRARIES)\n\n");
    } else {
        sb.push_str("OVERRIDE_BUILT_MODULE_PATH:=$(HOST_OUT_INTERMEDIATE_LIBRARIES)\n\n");
    }

    sb.push_str("include $(BUILD_SYSTEM)/base_rules.mk\n\n");

    write_export_include_mk_text(sb, module_name);
    sb.push_str(LIBRARY_LINK_TYPE_MK_TEXT);
}

fn declare_prebuilt_binary(sb: &mut String, module_name: &str, path: &str, target: bool) {
    sb.push_str("\ninclude $(CLEAR_VARS)\n");
    sb.push_str(&format!("LOCAL_MODULE:={module_name}\n"));
    sb.push_str(&format!("LOCAL_SRC_FILES:={path}\n"));
    if !target {
        sb.push_str("LOCAL_IS_HOST_MODULE:=true\n");
    }

    sb.push_str("LOCAL_MODULE_CLASS:=EXECUTABLES\n");
    sb.push_str("LOCAL_MODULE_SUFFIX:=\n\n");

    sb.push_str("include $(BUILD_SYSTEM)/base_rules.mk\n\n");

    sb.push_str("$(LOCAL_BUILT_MODULE): $(LOCAL_SRC_FILES)\n");
    sb.push_str("\tmkdir -p $(dir $@)\n");
    sb.push_str("\tcp $< $@\n");
}

fn single_output(module: &Module) -> Result<&str> {
    match module.outs.as_slice() {
        [out] => Ok(out),
        outs => Err(Error::module(
            module.name.as_str(),
            format!(
                "{} produced {} outputs, expected exactly one",
                module.kind_name(),
                outs.len()
            ),
        )),
    }
}

pub fn gen_static_actions(g: &AndroidMkGenerator, module: &Module) -> Result<String> {
    let props = module.generate().expect("generator kinds only");
    let mut sb = generate_common_actions(g, module)?;
    let library = single_output(module)?.to_string();
    declare_prebuilt_static_lib(
        &mut sb,
        module.alt_short_name(),
        &library,
        &module.gen_include_dirs.join(" "),
        props.target != TgtType::Host,
    );
    Ok(sb)
}

pub fn gen_shared_actions(g: &AndroidMkGenerator, module: &Module) -> Result<String> {
    let props = module.generate().expect("generator kinds only");
    let mut sb = generate_common_actions(g, module)?;
    let library = single_output(module)?.to_string();
    declare_prebuilt_shared_lib(
        &mut sb,
        module.alt_short_name(),
        &library,
        &module.gen_include_dirs.join(" "),
        props.target != TgtType::Host,
    );
    Ok(sb)
}

pub fn gen_binary_actions(g: &AndroidMkGenerator, module: &Module) -> Result<String> {
    let props = module.generate().expect("generator kinds only");
    let mut sb = generate_common_actions(g, module)?;
    let binary = single_output(module)?.to_string();
    declare_prebuilt_binary(
        &mut sb,
        module.alt_short_name(),
        &binary,
        props.target != TgtType::Host,
    );
    Ok(sb)
}
