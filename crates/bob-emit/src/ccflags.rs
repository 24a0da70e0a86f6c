use crate::error::{Error, Result};

// Flags the Android build system sets itself. Passing them through from a
// module would fight the platform's own arch/ABI selection.
const REJECTED_PREFIXES: &[&str] = &[
    "-march=",
    "-mcpu=",
    "-mtune=",
    "-mfpu=",
    "-mfloat-abi=",
    "--sysroot",
    "-target",
    "-gcc-toolchain",
];

const REJECTED_COMPILE_FLAGS: &[&str] = &["-m32", "-m64", "-marm", "-mthumb"];

pub fn android_compile_flag(flag: &str) -> bool {
    if REJECTED_COMPILE_FLAGS.contains(&flag) {
        return false;
    }
    !REJECTED_PREFIXES.iter().any(|p| flag.starts_with(p))
}

pub fn android_link_flag(flag: &str) -> bool {
    if flag == "-static" || flag.starts_with("-fuse-ld=") {
        return false;
    }
    android_compile_flag(flag)
}

pub fn filter_compile_flags(flags: &[String]) -> Vec<String> {
    flags
        .iter()
        .filter(|f| android_compile_flag(f))
        .cloned()
        .collect()
}

pub fn filter_link_flags(flags: &[String]) -> Vec<String> {
    flags
        .iter()
        .filter(|f| android_link_flag(f))
        .cloned()
        .collect()
}

/// Extracts the language standard requested via `-std=`. The last occurrence
/// across the given lists wins, matching compiler behavior.
pub fn compiler_standard(lists: &[&[String]]) -> Option<String> {
    let mut std = None;
    for list in lists {
        for flag in *list {
            if let Some(value) = flag.strip_prefix("-std=") {
                std = Some(value.to_string());
            }
        }
    }
    std
}

/// Detects an explicit ARM instruction-set selection. Mixing `-marm` and
/// `-mthumb` across the combined flag lists is an error.
pub fn arm_mode(lists: &[&[String]]) -> Result<Option<&'static str>> {
    let mut arm = false;
    let mut thumb = false;
    for list in lists {
        for flag in *list {
            match flag.as_str() {
                "-marm" => arm = true,
                "-mthumb" => thumb = true,
                _ => {}
            }
        }
    }
    match (arm, thumb) {
        (true, true) => Err(Error::msg(
            "conflicting ARM instruction set flags: both -marm and -mthumb requested",
        )),
        (true, false) => Ok(Some("arm")),
        (false, true) => Ok(Some("thumb")),
        (false, false) => Ok(None),
    }
}
