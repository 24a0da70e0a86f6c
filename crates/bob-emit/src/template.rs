use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Receives every string-typed leaf reachable from a property record.
/// Implementations decide what expansion, if any, applies; slices get their
/// own entry point so expansion can strip elements that became empty.
pub trait TemplateVisitor {
    fn visit_string(&mut self, prop: &str, value: &mut String) -> Result<()>;
    fn visit_slice(&mut self, prop: &str, values: &mut Vec<String>) -> Result<()>;
}

/// Implemented via `#[derive(TemplateProps)]` on property records.
pub trait TemplateProps {
    fn walk_template_strings(&mut self, visitor: &mut dyn TemplateVisitor) -> Result<()>;
}

pub type TemplateFn<'a> = Box<dyn Fn(&[String]) -> Result<String> + 'a>;

#[derive(Default)]
pub struct FuncMap<'a> {
    funcs: BTreeMap<String, TemplateFn<'a>>,
}

impl<'a> FuncMap<'a> {
    pub fn insert<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&[String]) -> Result<String> + 'a,
    {
        self.funcs.insert(name.to_string(), Box::new(f));
    }

    pub fn get(&self, name: &str) -> Option<&TemplateFn<'a>> {
        self.funcs.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

enum Token {
    Literal(String),
    ValueRef(String),
}

fn tokenize(inner: &str, input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        let Some(&c) = chars.peek() else {
            break;
        };
        if c == '"' {
            chars.next();
            let mut lit = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(ch) => lit.push(ch),
                    None => {
                        return Err(Error::template(input, "unterminated string argument"));
                    }
                }
            }
            tokens.push(Token::Literal(lit));
        } else {
            let mut word = String::new();
            while matches!(chars.peek(), Some(c) if !c.is_whitespace()) {
                word.push(chars.next().expect("peeked"));
            }
            if let Some(key) = word.strip_prefix('.') {
                tokens.push(Token::ValueRef(key.to_string()));
            } else {
                tokens.push(Token::Literal(word));
            }
        }
    }
    Ok(tokens)
}

fn resolve_value(
    key: &str,
    values: Option<&BTreeMap<String, String>>,
    input: &str,
) -> Result<String> {
    values
        .and_then(|m| m.get(key))
        .cloned()
        .ok_or_else(|| Error::template(input, format!("unknown configuration value '.{key}'")))
}

/// Expands every `{{ ... }}` occurrence in `input`. A leading `.` is a
/// configuration-value reference; anything else is a function call whose
/// arguments are quoted literals or further value references. Unknown
/// values, unknown functions, and malformed templates are fatal, carrying
/// the offending template text.
pub fn expand(
    input: &str,
    values: Option<&BTreeMap<String, String>>,
    funcs: &FuncMap,
) -> Result<String> {
    if !input.contains("{{") {
        return Ok(input.to_string());
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(Error::template(input, "unterminated '{{' delimiter"));
        };
        let inner = after[..end].trim();
        if inner.is_empty() {
            return Err(Error::template(input, "empty template"));
        }

        if let Some(key) = inner.strip_prefix('.') {
            out.push_str(&resolve_value(key.trim(), values, input)?);
        } else {
            let tokens = tokenize(inner, input)?;
            let mut iter = tokens.into_iter();
            let name = match iter.next() {
                Some(Token::Literal(name)) => name,
                _ => {
                    return Err(Error::template(input, "expected a function name"));
                }
            };
            let mut args = Vec::new();
            for token in iter {
                match token {
                    Token::Literal(lit) => args.push(lit),
                    Token::ValueRef(key) => args.push(resolve_value(&key, values, input)?),
                }
            }
            let Some(f) = funcs.get(&name) else {
                return Err(Error::template(input, format!("unknown function '{name}'")));
            };
            let expanded = f(&args).map_err(|e| Error::template(input, e.to_string()))?;
            out.push_str(&expanded);
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn expand_slice(
    items: &mut Vec<String>,
    values: Option<&BTreeMap<String, String>>,
    funcs: &FuncMap,
) -> Result<()> {
    let mut saw_empty = false;
    for item in items.iter_mut() {
        *item = expand(item, values, funcs)?;
        if item.is_empty() {
            saw_empty = true;
        }
    }
    // Expansion may leave empty elements behind; properties cannot legally
    // contain empty strings before expansion, so strip them.
    if saw_empty {
        items.retain(|s| !s.is_empty());
    }
    Ok(())
}

/// Configuration-value pass: the same function set applies to every string
/// property.
pub struct ConfigExpander<'a> {
    pub values: &'a BTreeMap<String, String>,
    pub funcs: FuncMap<'a>,
}

impl TemplateVisitor for ConfigExpander<'_> {
    fn visit_string(&mut self, _prop: &str, value: &mut String) -> Result<()> {
        *value = expand(value, Some(self.values), &self.funcs)?;
        Ok(())
    }

    fn visit_slice(&mut self, _prop: &str, values: &mut Vec<String>) -> Result<()> {
        expand_slice(values, Some(self.values), &self.funcs)
    }
}

/// Late pass: the function set depends on the property being expanded, and
/// a property with no entry is left untouched.
pub struct PropExpander<'a> {
    pub propfnmap: BTreeMap<String, FuncMap<'a>>,
}

impl TemplateVisitor for PropExpander<'_> {
    fn visit_string(&mut self, prop: &str, value: &mut String) -> Result<()> {
        if let Some(funcs) = self.propfnmap.get(prop) {
            *value = expand(value, None, funcs)?;
        }
        Ok(())
    }

    fn visit_slice(&mut self, prop: &str, values: &mut Vec<String>) -> Result<()> {
        if let Some(funcs) = self.propfnmap.get(prop) {
            expand_slice(values, None, funcs)?;
        }
        Ok(())
    }
}

/// Function set for the configuration-value pass. `match_srcs` and
/// `add_if_supported` are requoted verbatim here; they need semantic module
/// state and run in the late pass instead.
pub fn config_funcmap() -> FuncMap<'static> {
    fn one_arg(name: &'static str, args: &[String]) -> Result<String> {
        match args {
            [a] => Ok(a.clone()),
            _ => Err(Error::msg(format!("{name} expects exactly one argument"))),
        }
    }

    let mut funcs = FuncMap::default();
    funcs.insert("to_upper", |args: &[String]| {
        Ok(one_arg("to_upper", args)?.to_uppercase())
    });
    funcs.insert("to_lower", |args: &[String]| {
        Ok(one_arg("to_lower", args)?.to_lowercase())
    });
    funcs.insert("split", |args: &[String]| match args {
        [s, sep] if !sep.is_empty() => Ok(s
            .split(sep.as_str())
            .collect::<Vec<_>>()
            .join(" ")),
        _ => Err(Error::msg("split expects a string and a separator")),
    });
    funcs.insert("match_srcs", |args: &[String]| {
        Ok(format!("{{{{match_srcs \"{}\"}}}}", one_arg("match_srcs", args)?))
    });
    funcs.insert("add_if_supported", |args: &[String]| {
        Ok(format!(
            "{{{{add_if_supported \"{}\"}}}}",
            one_arg("add_if_supported", args)?
        ))
    });
    funcs
}

/// The configuration-value mutator pass: writes config values into the
/// string properties of every enabled module. Runs before the late pass.
pub fn apply_config_templates(
    graph: &mut crate::module::graph::ModuleGraph,
    config: &crate::config::BobConfig,
) -> Result<()> {
    let values = config.string_map();
    for module in graph.modules_mut() {
        if !module.enabled() {
            continue;
        }
        let mut expander = ConfigExpander {
            values: &values,
            funcs: config_funcmap(),
        };
        module.walk_props(&mut expander)?;
    }
    Ok(())
}
