/// Escaping for text that passes through Make and then a shell.
///
/// Flags in variable-assignment position are emitted verbatim; flags embedded
/// in recipes go through this. Dollar signs double for Make, then shell
/// metacharacters are backslash-escaped.
pub fn makefile_and_shell_escape(s: &str) -> String {
    shell_escape(&makefile_escape(s))
}

pub fn makefile_escape(s: &str) -> String {
    s.replace('$', "$$")
}

fn shell_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            ' ' | '\t' | '"' | '\'' | '`' | '\\' | '#' | '&' | '|' | ';' | '<' | '>' | '('
            | ')' | '*' | '?' | '[' | ']' | '~' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_flags_pass_through() {
        assert_eq!(makefile_and_shell_escape("-Wall"), "-Wall");
        assert_eq!(makefile_and_shell_escape("-std=c++11"), "-std=c++11");
    }

    #[test]
    fn dollars_double_before_shell_escaping() {
        assert_eq!(makefile_and_shell_escape("$(OUT)"), "$$\\(OUT\\)");
    }

    #[test]
    fn spaces_and_quotes_are_backslashed() {
        assert_eq!(
            makefile_and_shell_escape("-DNAME=\"a b\""),
            "-DNAME=\\\"a\\ b\\\""
        );
    }
}
