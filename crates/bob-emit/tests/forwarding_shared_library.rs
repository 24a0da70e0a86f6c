use std::fs;
use std::sync::Arc;

use bob_emit::androidmk::{EmitOptions, emit_description};
use bob_emit::emit::{EmitCtx, EmissionManifest, NullSink};
use bob_emit::module::BuildDescription;
use bob_emit::{Error, Result};

fn try_emit(desc: &str) -> (tempfile::TempDir, Result<EmissionManifest>) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let desc = BuildDescription::from_str(desc).expect("parse");
    let ctx = EmitCtx::new(Arc::new(NullSink));
    let res = emit_description(
        desc,
        EmitOptions {
            build_dir: tmp.path().join("androidmk"),
            scripts_rel: "scripts".into(),
        },
        &ctx,
    );
    (tmp, res)
}

fn emit(desc: &str) -> tempfile::TempDir {
    let (tmp, res) = try_emit(desc);
    res.expect("emit");
    tmp
}

fn emit_err(desc: &str) -> Error {
    let (_tmp, res) = try_emit(desc);
    res.expect_err("emission must fail")
}

fn fragment(tmp: &tempfile::TempDir, name: &str) -> String {
    fs::read_to_string(tmp.path().join("androidmk").join(name)).expect("read fragment")
}

#[test]
fn forwarding_shared_dep_keeps_transitivity() {
    let tmp = emit(
        r#"
[[modules]]
name = "appA"
kind = "binary"
srcs = ["main.c"]
shared_libs = ["libB"]

[[modules]]
name = "libB"
kind = "shared-lib"
srcs = ["b.c"]
forwarding = true
"#,
    );
    let inc = fragment(&tmp, "appA.inc");
    assert!(inc.contains("-fuse-ld=bfd -Wl,--copy-dt-needed-entries"));
}

#[test]
fn non_forwarding_shared_dep_adds_nothing() {
    let tmp = emit(
        r#"
[[modules]]
name = "appA"
kind = "binary"
srcs = ["main.c"]
shared_libs = ["libB"]

[[modules]]
name = "libB"
kind = "shared-lib"
srcs = ["b.c"]
"#,
    );
    let inc = fragment(&tmp, "appA.inc");
    assert!(!inc.contains("-fuse-ld=bfd"));
}

#[test]
fn shared_dep_must_be_a_shared_library() {
    let err = emit_err(
        r#"
[[modules]]
name = "appA"
kind = "binary"
srcs = ["main.c"]
shared_libs = ["libB"]

[[modules]]
name = "libB"
kind = "static-lib"
srcs = ["b.c"]
"#,
    );
    assert!(err.to_string().contains("libB is not a shared library"));
}

#[test]
fn external_shared_deps_are_allowed_and_never_forward() {
    let tmp = emit(
        r#"
[[modules]]
name = "appA"
kind = "binary"
srcs = ["main.c"]
shared_libs = ["libext"]

[[modules]]
name = "libext"
kind = "external-lib"
out = "libext_android"
"#,
    );
    let inc = fragment(&tmp, "appA.inc");
    assert!(inc.contains("LOCAL_SHARED_LIBRARIES := libext_android\n"));
    assert!(!inc.contains("-fuse-ld=bfd"));

    // External libraries never get a fragment of their own.
    assert!(!tmp.path().join("androidmk/libext_android.inc").exists());
    assert!(!tmp.path().join("androidmk/libext.inc").exists());
}

#[test]
fn version_script_lands_in_deps_and_ldflags() {
    let tmp = emit(
        r#"
[[modules]]
name = "libver"
kind = "shared-lib"
srcs = ["a.c"]
version_script = "abi.map"
"#,
    );
    let inc = fragment(&tmp, "libver.inc");
    assert!(inc.contains("LOCAL_ADDITIONAL_DEPENDENCIES := $(LOCAL_PATH)/abi.map\n"));
    assert!(inc.contains("-Wl,--version-script,$(LOCAL_PATH)/abi.map"));
}

#[test]
fn target_libraries_are_multilib() {
    let tmp = emit(
        r#"
[[modules]]
name = "libboth"
kind = "shared-lib"
srcs = ["a.c"]
ldflags = ["-Wl,--no-undefined"]
"#,
    );
    let inc = fragment(&tmp, "libboth.inc");
    assert!(inc.contains("LOCAL_MULTILIB:=both\n"));
    assert!(inc.contains("LOCAL_LDFLAGS_32 := -Wl,--no-undefined\n"));
    assert!(inc.contains("LOCAL_LDFLAGS_64 := -Wl,--no-undefined\n"));
}

#[test]
fn linking_a_generated_library_suppresses_multilib() {
    let tmp = emit(
        r#"
[[modules]]
name = "libuser"
kind = "shared-lib"
srcs = ["a.c"]
ldflags = ["-Wl,-z,now"]
static_libs = ["libgen"]

[[modules]]
name = "libgen"
kind = "generate-static-lib"
cmd = "python ${tool} ${out}"
tool = "makelib.py"

[[modules.inouts]]
outs = ["libgen.a"]
"#,
    );
    let inc = fragment(&tmp, "libuser.inc");
    assert!(!inc.contains("LOCAL_MULTILIB"));
    assert!(inc.contains("LOCAL_LDFLAGS := -Wl,-z,now\n"));
    assert!(!inc.contains("LOCAL_LDFLAGS_32"));
}

#[test]
fn transitive_generated_library_also_suppresses_multilib() {
    let tmp = emit(
        r#"
[[modules]]
name = "libouter"
kind = "shared-lib"
srcs = ["a.c"]
static_libs = ["libmid"]

[[modules]]
name = "libmid"
kind = "static-lib"
srcs = ["m.c"]
static_libs = ["libgen"]

[[modules]]
name = "libgen"
kind = "generate-static-lib"
cmd = "python ${tool} ${out}"
tool = "makelib.py"

[[modules.inouts]]
outs = ["libgen.a"]
"#,
    );
    let inc = fragment(&tmp, "libouter.inc");
    assert!(!inc.contains("LOCAL_MULTILIB"));
}
