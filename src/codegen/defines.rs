//! Shader Macro Definitions
//!
//! Ordered `#define` set injected into every stage of a pass. The engine's
//! finalize callback fills it (e.g. `USE_TRANSPARENCY`, `NODETREE_AOV`) and
//! the assembler renders it both as template variables and as literal
//! `#define` lines.
//!
//! Entries are kept sorted by key, so identical sets compare and hash
//! identically regardless of insertion order.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ShaderDefines {
    defines: Vec<(String, String)>,
}

impl ShaderDefines {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            defines: Vec::new(),
        }
    }

    /// Sets `key`, replacing any previous value (keeps sorted order).
    pub fn set(&mut self, key: &str, value: &str) {
        match self.defines.binary_search_by(|(k, _)| k.as_str().cmp(key)) {
            Ok(idx) => value.clone_into(&mut self.defines[idx].1),
            Err(idx) => self.defines.insert(idx, (key.to_owned(), value.to_owned())),
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        match self.defines.binary_search_by(|(k, _)| k.as_str().cmp(key)) {
            Ok(idx) => {
                self.defines.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.defines
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|idx| self.defines[idx].1.as_str())
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.defines.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.defines.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Template-friendly view.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.defines.iter().cloned().collect()
    }

    /// `#define KEY VALUE` lines in key order.
    #[must_use]
    pub fn to_glsl(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.iter() {
            out.push_str("#define ");
            out.push_str(key);
            if !value.is_empty() {
                out.push(' ');
                out.push_str(value);
            }
            out.push('\n');
        }
        out
    }
}

impl From<&[(&str, &str)]> for ShaderDefines {
    fn from(defines: &[(&str, &str)]) -> Self {
        let mut result = Self::new();
        for (k, v) in defines {
            result.set(k, v);
        }
        result
    }
}
