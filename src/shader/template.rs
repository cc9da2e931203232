//! Shader Template Manager
//!
//! Stores named shader sources per stage and resolves them into final,
//! compilable text.
//!
//! ## Template syntax
//!
//! | Construct | Meaning |
//! |-----------|---------|
//! | `#include "Name"` | Splice the resolved source of `Name` (same stage) |
//! | `#include "Name(key=value,...)"` | Same, with extra substitution parameters |
//! | `@identifier` | Replaced by the parameter value; unknown names become `!!identifier` |
//!
//! An include directive must be alone on its line. Parameter values inside an
//! include may themselves reference `@tokens`, which are resolved against the
//! including file's parameters. The included file sees the including file's
//! parameters overlaid with the include's own.
//!
//! A stage with no source of its own falls back to the entry's base source.
//! Include cycles and nesting deeper than the configured limit are reported
//! as `RenderError::Template`.

use rustc_hash::FxHashMap;

use crate::backend::ShaderStage;
use crate::errors::{RenderError, Result};

/// Default maximum `#include` nesting.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 32;

/// Prefix written in place of an unresolved `@identifier`.
pub const UNRESOLVED_MARKER: &str = "!!";

/// Empty parameter list for [`ShaderManager::get_shader`].
pub const NO_PARAMS: &[(&str, &str)] = &[];

type Params = FxHashMap<String, String>;

#[derive(Debug, Clone, Default)]
struct ShaderEntry {
    sources: [Option<String>; 4],
}

/// Named, stage-tagged shader sources with `#include` / `@param` resolution.
#[derive(Debug, Clone)]
pub struct ShaderManager {
    entries: FxHashMap<String, ShaderEntry>,
    max_include_depth: usize,
}

impl Default for ShaderManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderManager {
    /// An empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }

    /// A manager preloaded with the built-in shader library.
    #[must_use]
    pub fn with_builtin_library() -> Self {
        let mut manager = Self::new();
        super::library::register_builtin_shaders(&mut manager);
        manager
    }

    pub fn set_max_include_depth(&mut self, depth: usize) {
        self.max_include_depth = depth.max(1);
    }

    #[must_use]
    pub fn max_include_depth(&self) -> usize {
        self.max_include_depth
    }

    /// Stores (or overwrites) the source of `name` for `stage`.
    pub fn set_shader(&mut self, stage: ShaderStage, name: &str, source: impl Into<String>) {
        let entry = self.entries.entry(name.to_string()).or_default();
        entry.sources[stage.index()] = Some(source.into());
    }

    /// Removes every stage of `name`. Returns whether it existed.
    pub fn remove_shader(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Whether `name` has any source at all.
    #[must_use]
    pub fn has_shader(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Whether `name` resolves for `stage`, directly or through the base source.
    #[must_use]
    pub fn has_stage(&self, stage: ShaderStage, name: &str) -> bool {
        self.raw_source(stage, name).is_some()
    }

    /// Whether `name` has its own source for `stage`, ignoring the base fallback.
    #[must_use]
    pub fn has_explicit_stage(&self, stage: ShaderStage, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|e| e.sources[stage.index()].is_some())
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Unresolved source for `(stage, name)`, applying the base fallback.
    #[must_use]
    pub fn raw_source(&self, stage: ShaderStage, name: &str) -> Option<&str> {
        let entry = self.entries.get(name)?;
        entry.sources[stage.index()]
            .as_deref()
            .or(entry.sources[ShaderStage::Base.index()].as_deref())
    }

    /// Fully resolved source of `name` for `stage`.
    pub fn get_shader<K, V>(&self, stage: ShaderStage, name: &str, params: &[(K, V)]) -> Result<String>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let params: Params = params
            .iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        let mut stack = Vec::new();
        self.resolve(stage, name, &params, &mut stack)
    }

    fn resolve(
        &self,
        stage: ShaderStage,
        name: &str,
        params: &Params,
        stack: &mut Vec<String>,
    ) -> Result<String> {
        if stack.iter().any(|n| n == name) {
            return Err(RenderError::Template(format!(
                "include cycle: {} -> {name}",
                stack.join(" -> ")
            )));
        }
        if stack.len() >= self.max_include_depth {
            return Err(RenderError::Template(format!(
                "include depth exceeds {} while resolving \"{name}\"",
                self.max_include_depth
            )));
        }
        let source = self
            .raw_source(stage, name)
            .ok_or_else(|| RenderError::NotFound(format!("\"{name}\" ({stage:?})")))?;

        stack.push(name.to_string());
        let mut output = String::with_capacity(source.len());
        for line in source.lines() {
            if let Some(target) = parse_include_directive(line) {
                let (child, args) = parse_include_target(target).ok_or_else(|| {
                    RenderError::Template(format!("malformed include in \"{name}\": {}", line.trim()))
                })?;
                let mut child_params = params.clone();
                for (key, value) in args {
                    child_params.insert(key.to_string(), substitute_params(value, params));
                }
                let resolved = self.resolve(stage, child, &child_params, stack)?;
                output.push_str(&resolved);
                if !resolved.ends_with('\n') {
                    output.push('\n');
                }
            } else if line.contains('@') {
                output.push_str(&substitute_params(line, params));
                output.push('\n');
            } else {
                output.push_str(line);
                output.push('\n');
            }
        }
        stack.pop();
        Ok(output)
    }
}

/// Returns the quoted target of a `#include "..."` line.
fn parse_include_directive(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("#include")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    rest.trim().strip_prefix('"')?.strip_suffix('"')
}

/// Splits `Name(k=v,...)` into the name and its arguments.
fn parse_include_target(target: &str) -> Option<(&str, Vec<(&str, &str)>)> {
    let target = target.trim();
    let Some(open) = target.find('(') else {
        return is_identifier(target).then_some((target, Vec::new()));
    };
    let name = target[..open].trim();
    let args = target[open + 1..].strip_suffix(')')?;
    if !is_identifier(name) {
        return None;
    }

    let mut parsed = Vec::new();
    for arg in args.split(',') {
        let arg = arg.trim();
        if arg.is_empty() {
            continue;
        }
        let (key, value) = arg.split_once('=')?;
        let key = key.trim();
        if !is_identifier(key) {
            return None;
        }
        parsed.push((key, value.trim()));
    }
    Some((name, parsed))
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_identifier_char)
}

/// Replaces every `@identifier` in `line`. A lone `@` is kept as is.
fn substitute_params(line: &str, params: &Params) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(at) = rest.find('@') {
        out.push_str(&rest[..at]);
        let after = &rest[at + 1..];
        let len = after
            .char_indices()
            .find(|&(_, c)| !is_identifier_char(c))
            .map_or(after.len(), |(i, _)| i);
        if len == 0 {
            out.push('@');
        } else {
            let ident = &after[..len];
            match params.get(ident) {
                Some(value) => out.push_str(value),
                None => {
                    out.push_str(UNRESOLVED_MARKER);
                    out.push_str(ident);
                }
            }
        }
        rest = &after[len..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn include_directive_variants() {
        assert_eq!(parse_include_directive("#include \"A\""), Some("A"));
        assert_eq!(parse_include_directive("   #include   \"B(x=1)\"  "), Some("B(x=1)"));
        assert_eq!(parse_include_directive("# include \"C\""), None);
        assert_eq!(parse_include_directive("#includeX \"C\""), None);
        assert_eq!(parse_include_directive("// #include \"C\""), None);
    }

    #[test]
    fn include_target_args() {
        let (name, args) = parse_include_target("Lights(count=4, kind=point)").unwrap();
        assert_eq!(name, "Lights");
        assert_eq!(args, vec![("count", "4"), ("kind", "point")]);
        assert_eq!(parse_include_target("Plain").unwrap().0, "Plain");
        assert!(parse_include_target("Bad(x)").is_none());
        assert!(parse_include_target("Bad(x=1").is_none());
    }

    #[test]
    fn substitution_rules() {
        let p = params(&[("x", "1"), ("name_2", "two")]);
        assert_eq!(substitute_params("v=@x;", &p), "v=1;");
        assert_eq!(substitute_params("@name_2+@x", &p), "two+1");
        assert_eq!(substitute_params("@nope", &p), "!!nope");
        assert_eq!(substitute_params("a @ b", &p), "a @ b");
        assert_eq!(substitute_params("mail@x.y", &p), "mail1.y");
    }
}
