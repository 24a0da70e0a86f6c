use std::collections::BTreeMap;

/// Extensions the C/C++ rules will compile. Everything else in a source list
/// is carried as a dependency only.
const COMPILABLE_EXTS: &[&str] = &["c", "cc", "cpp", "cxx", "s", "S"];

pub fn is_compilable_source(src: &str) -> bool {
    match src.rsplit_once('.') {
        Some((_, ext)) => COMPILABLE_EXTS.contains(&ext),
        None => false,
    }
}

pub fn is_not_compilable_source(src: &str) -> bool {
    !is_compilable_source(src)
}

const HEADER_EXTS: &[&str] = &["h", "hpp", "hh", "inc"];

/// Headers ride along as dependencies without needing to be consumed by a
/// `match_srcs` expansion; other non-compiled sources (linker scripts and
/// the like) must be.
pub fn is_header_source(src: &str) -> bool {
    match src.rsplit_once('.') {
        Some((_, ext)) => HEADER_EXTS.contains(&ext),
        None => false,
    }
}

pub fn prefix_dirs(dirs: &[String], prefix: &str) -> Vec<String> {
    dirs.iter().map(|d| join_path(prefix, d)).collect()
}

pub fn join_path(base: &str, rel: &str) -> String {
    if rel.is_empty() {
        return base.to_string();
    }
    if base.is_empty() || rel.starts_with('/') {
        return rel.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), rel)
}

pub fn newline_separated_list(list: &[String]) -> String {
    format!(" \\\n    {}\n", list.join(" \\\n    "))
}

/// Drops argument-map entries the command never references. The map entries
/// become target-scoped Make variables, so an unused one would still show up
/// in the fragment.
pub fn strip_unused_args(args: &mut BTreeMap<String, String>, cmd: &str) {
    let unused: Vec<String> = args
        .keys()
        .filter(|k| !cmd.contains(&format!("${{{k}}}")))
        .cloned()
        .collect();
    for k in unused {
        args.remove(&k);
    }
}

/// Tail glob match, as used by `match_srcs`: the pattern applies under an
/// implicit `**/`, so it matches the trailing path components of `src`.
/// `*` and `?` match within a component only.
pub fn match_source_glob(pattern: &str, src: &str) -> bool {
    let pat_parts: Vec<&str> = pattern.split('/').collect();
    let src_parts: Vec<&str> = src.split('/').collect();
    if pat_parts.len() > src_parts.len() {
        return false;
    }
    let tail = &src_parts[src_parts.len() - pat_parts.len()..];
    pat_parts
        .iter()
        .zip(tail.iter())
        .all(|(p, s)| glob_component_match(p, s))
}

fn glob_component_match(pattern: &str, s: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = s.chars().collect();
    component_match_at(&pat, &txt)
}

fn component_match_at(pat: &[char], txt: &[char]) -> bool {
    match pat.first() {
        None => txt.is_empty(),
        Some('*') => {
            (0..=txt.len()).any(|skip| component_match_at(&pat[1..], &txt[skip..]))
        }
        Some('?') => !txt.is_empty() && component_match_at(&pat[1..], &txt[1..]),
        Some(c) => txt.first() == Some(c) && component_match_at(&pat[1..], &txt[1..]),
    }
}
