use std::collections::HashMap;

/// A discriminated value a [`Context`] entry may hold.
///
/// The source framework carries a `string -> any` map; a statically typed
/// port needs a closed value set instead. This covers the variants the
/// built-in middleware and the testable properties actually need.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    StringList(Vec<String>),
    Float(f64),
    Binary(Vec<u8>),
}

impl From<String> for ContextValue {
    fn from(v: String) -> Self {
        ContextValue::String(v)
    }
}

impl From<&str> for ContextValue {
    fn from(v: &str) -> Self {
        ContextValue::String(v.to_string())
    }
}

impl From<bool> for ContextValue {
    fn from(v: bool) -> Self {
        ContextValue::Boolean(v)
    }
}

impl From<i64> for ContextValue {
    fn from(v: i64) -> Self {
        ContextValue::Integer(v)
    }
}

impl From<f64> for ContextValue {
    fn from(v: f64) -> Self {
        ContextValue::Float(v)
    }
}

impl From<Vec<String>> for ContextValue {
    fn from(v: Vec<String>) -> Self {
        ContextValue::StringList(v)
    }
}

/// Per-request key-value map flowing through one pipeline invocation.
///
/// A `Context` is created per request and is not shared across requests, so
/// no internal synchronization is needed here — the pipeline guarantees a
/// single logical owner advances through the middleware chain at a time.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: HashMap<String, ContextValue>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove_key(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }
}

/// Typed accessors over a [`Context`], mirroring the source framework's
/// `ContextHelper`: a missing key or a type mismatch both fall back to the
/// caller-supplied default rather than erroring.
pub struct ContextHelper<'a> {
    context: &'a mut Context,
}

impl<'a> ContextHelper<'a> {
    pub fn new(context: &'a mut Context) -> Self {
        ContextHelper { context }
    }

    pub fn set_string(&mut self, key: &str, value: impl Into<String>) {
        self.context.set(key.to_string(), ContextValue::String(value.into()));
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        match self.context.get(key) {
            Some(ContextValue::String(s)) => s.clone(),
            _ => default.to_string(),
        }
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.context.set(key.to_string(), ContextValue::Boolean(value));
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.context.get(key) {
            Some(ContextValue::Boolean(b)) => *b,
            _ => default,
        }
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.context.has_key(key)
    }

    pub fn remove_key(&mut self, key: &str) -> bool {
        self.context.remove_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_string_round_trips() {
        let mut ctx = Context::new();
        let mut helper = ContextHelper::new(&mut ctx);
        helper.set_string("user_id", "u1");
        assert_eq!(helper.get_string("user_id", ""), "u1");
    }

    #[test]
    fn remove_key_clears_has_key() {
        let mut ctx = Context::new();
        let mut helper = ContextHelper::new(&mut ctx);
        helper.set_string("k", "v");
        assert!(helper.has_key("k"));
        assert!(helper.remove_key("k"));
        assert!(!helper.has_key("k"));
    }

    #[test]
    fn get_string_falls_back_on_type_mismatch() {
        let mut ctx = Context::new();
        ctx.set("flag", ContextValue::Boolean(true));
        let helper = ContextHelper::new(&mut ctx);
        assert_eq!(helper.get_string("flag", "fallback"), "fallback");
    }

    #[test]
    fn get_bool_falls_back_when_missing() {
        let mut ctx = Context::new();
        let helper = ContextHelper::new(&mut ctx);
        assert!(!helper.get_bool("nope", false));
        assert!(helper.get_bool("nope", true));
    }

    #[test]
    fn string_list_value_stores_and_reads_back() {
        let mut ctx = Context::new();
        ctx.set("roles", vec!["admin".to_string(), "user".to_string()]);
        match ctx.get("roles") {
            Some(ContextValue::StringList(roles)) => {
                assert_eq!(roles, &vec!["admin".to_string(), "user".to_string()]);
            }
            other => panic!("expected StringList, got {other:?}"),
        }
    }
}
