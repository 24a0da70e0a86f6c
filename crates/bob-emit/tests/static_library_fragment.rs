use std::fs;
use std::sync::Arc;

use bob_emit::androidmk::{EmitOptions, emit_description};
use bob_emit::emit::{EmitCtx, NullSink};
use bob_emit::module::BuildDescription;

fn emit(desc: &str) -> tempfile::TempDir {
    let tmp = tempfile::tempdir().expect("tempdir");
    let desc = BuildDescription::from_str(desc).expect("parse");
    let ctx = EmitCtx::new(Arc::new(NullSink));
    emit_description(
        desc,
        EmitOptions {
            build_dir: tmp.path().join("androidmk"),
            scripts_rel: "scripts".into(),
        },
        &ctx,
    )
    .expect("emit");
    tmp
}

fn fragment(tmp: &tempfile::TempDir, name: &str) -> String {
    fs::read_to_string(tmp.path().join("androidmk").join(name)).expect("read fragment")
}

#[test]
fn single_static_library() {
    let tmp = emit(
        r#"
[config]
target_toolchain_clang = true

[[modules]]
name = "libfoo"
kind = "static-lib"
srcs = ["a.c", "b.c", "x.h"]
"#,
    );
    let inc = fragment(&tmp, "libfoo.inc");

    assert!(inc.contains("LOCAL_MODULE:=libfoo\n"));
    assert!(inc.contains("LOCAL_MODULE_CLASS:=STATIC_LIBRARIES\n"));
    assert!(inc.contains("LOCAL_CLANG := true\n"));
    assert!(inc.contains("LOCAL_SRC_FILES := a.c b.c\n"));
    assert!(inc.contains("LOCAL_ADDITIONAL_DEPENDENCIES := $(LOCAL_PATH)/x.h\n"));
    assert!(inc.ends_with("include $(BUILD_STATIC_LIBRARY)\n"));

    // Uninstallable: target module without an install base, not shared.
    assert!(inc.contains("LOCAL_UNINSTALLABLE_MODULE:=true\n"));
}

#[test]
fn rejected_flags_never_reach_the_fragment() {
    let tmp = emit(
        r#"
[[modules]]
name = "libflags"
kind = "static-lib"
srcs = ["a.c"]
cflags = ["-Wall", "-march=armv8-a", "-std=c11"]
cxxflags = ["-fno-rtti", "-mthumb"]
conlyflags = ["-m32"]
"#,
    );
    let inc = fragment(&tmp, "libflags.inc");

    assert!(inc.contains("LOCAL_CFLAGS := -Wall -std=c11\n"));
    assert!(inc.contains("LOCAL_CPPFLAGS := -fno-rtti\n"));
    assert!(!inc.contains("-march=armv8-a"));
    assert!(!inc.contains("-m32"));
    // ARM mode is communicated via LOCAL_ARM_MODE, not the raw flag.
    assert!(inc.contains("LOCAL_ARM_MODE:=thumb\n"));
    assert!(inc.contains("LOCAL_C_STD:=c11\n"));
}

#[test]
fn conflicting_arm_modes_abort_emission() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let desc = BuildDescription::from_str(
        r#"
[[modules]]
name = "libarm"
kind = "static-lib"
srcs = ["a.c"]
cflags = ["-marm"]
cxxflags = ["-mthumb"]
"#,
    )
    .expect("parse");
    let ctx = EmitCtx::new(Arc::new(NullSink));
    let err = emit_description(
        desc,
        EmitOptions {
            build_dir: tmp.path().join("androidmk"),
            scripts_rel: "scripts".into(),
        },
        &ctx,
    )
    .expect_err("conflicting arm modes must fail");
    assert!(err.to_string().contains("-marm"));
    assert!(err.to_string().contains("-mthumb"));
}

#[test]
fn include_dir_ordering_and_exports() {
    let tmp = emit(
        r#"
[[modules]]
name = "libinc"
kind = "static-lib"
srcs = ["a.c"]
local_include_dirs = ["src"]
export_local_include_dirs = ["include"]
include_dirs = ["/abs/sys"]
export_include_dirs = ["/abs/exported"]
"#,
    );
    let inc = fragment(&tmp, "libinc.inc");

    assert!(inc.contains(
        "LOCAL_C_INCLUDES := $(LOCAL_PATH)/src $(LOCAL_PATH)/include /abs/sys /abs/exported\n"
    ));
    assert!(inc.contains(
        "LOCAL_EXPORT_C_INCLUDE_DIRS := /abs/exported $(LOCAL_PATH)/include\n"
    ));
}

#[test]
fn host_binary_uses_host_rules() {
    let tmp = emit(
        r#"
[[modules]]
name = "hosttool"
kind = "binary"
target = "host"
srcs = ["main.c"]
ldlibs = ["-lm"]
"#,
    );
    let inc = fragment(&tmp, "hosttool.inc");

    assert!(inc.contains("LOCAL_MODULE_CLASS:=EXECUTABLES\n"));
    assert!(inc.contains("LOCAL_LDLIBS_$(HOST_OS) := -lm\n"));
    assert!(inc.ends_with("include $(BUILD_HOST_EXECUTABLE)\n"));
    // Host modules are never marked uninstallable; the build needs them.
    assert!(!inc.contains("LOCAL_UNINSTALLABLE_MODULE"));
}

#[test]
fn proprietary_modules_carry_owner_and_strip() {
    let tmp = emit(
        r#"
[[modules]]
name = "libowned"
kind = "shared-lib"
srcs = ["a.c"]
proprietary = true
owner = "acme"
strip = true
"#,
    );
    let inc = fragment(&tmp, "libowned.inc");

    assert!(inc.contains("LOCAL_MODULE_OWNER := acme\n"));
    assert!(inc.contains("LOCAL_PROPRIETARY_MODULE := true\n"));
    assert!(inc.contains("LOCAL_STRIP_MODULE := true\n"));
}
