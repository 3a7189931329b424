//! Core types for spark-fiber.
//!
//! These types flow through every layer: element descriptions carry them as
//! props, hooks compare them as dependency lists, providers push them as
//! context values, and host adapters receive them as native properties.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

// =============================================================================
// Time
// =============================================================================

/// Milliseconds on the scheduler's clock (fractional, like `performance.now()`).
pub type Millis = f64;

// =============================================================================
// Callback
// =============================================================================

/// A shared, identity-compared callback.
///
/// Two callbacks are the same only if they point at the same allocation, so a
/// closure recreated on every render counts as a change while one returned by
/// `use_callback` stays stable.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn()>);

impl Callback {
    /// Wrap a closure.
    pub fn new(f: impl Fn() + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invoke the callback.
    pub fn call(&self) {
        (self.0)()
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Callback) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

impl<F: Fn() + 'static> From<F> for Callback {
    fn from(f: F) -> Self {
        Callback::new(f)
    }
}

// =============================================================================
// Key
// =============================================================================

/// Stable identity key of an element within its sibling list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Rc<str>);

impl Key {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(Rc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(Rc::from(s))
    }
}

impl From<usize> for Key {
    fn from(n: usize) -> Self {
        Key(Rc::from(n.to_string()))
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key(Rc::from(n.to_string()))
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key(Rc::from(n.to_string()))
    }
}

// =============================================================================
// Value
// =============================================================================

/// Dynamic value used for props, context values and dependency lists.
///
/// Primitives compare by value; `Callback` and `Object` compare by pointer.
/// [`Value::is_same`] is the comparison used everywhere a "did this change"
/// question is asked.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Callback(Callback),
    Object(Rc<dyn Any>),
}

impl Value {
    /// Wrap an arbitrary value; identity is the new allocation.
    pub fn object<T: Any>(value: T) -> Self {
        Value::Object(Rc::new(value))
    }

    /// Strict identity comparison.
    ///
    /// Floats follow IEEE identity rather than equality: `NaN` is the same as
    /// `NaN`, while `0.0` and `-0.0` differ.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Callback(a), Value::Callback(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_callback(&self) -> Option<&Callback> {
        match self {
            Value::Callback(cb) => Some(cb),
            _ => None,
        }
    }

    /// Downcast an `Object` value.
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        match self {
            Value::Object(obj) => obj.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Render a primitive as text content (`None` for callbacks and objects).
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(n) => Some(n.to_string()),
            Value::Float(x) => Some(x.to_string()),
            Value::Str(s) => Some(s.to_string()),
            Value::Callback(_) | Value::Object(_) => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Callback(cb) => write!(f, "{cb:?}"),
            Value::Object(obj) => write!(f, "Object({:p})", Rc::as_ptr(obj) as *const ()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Callback> for Value {
    fn from(cb: Callback) -> Self {
        Value::Callback(cb)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Value::is_same
    // =========================================================================

    #[test]
    fn test_primitives_compare_by_value() {
        assert!(Value::from(3).is_same(&Value::from(3)));
        assert!(Value::from("a").is_same(&Value::from("a".to_string())));
        assert!(!Value::from(3).is_same(&Value::from(4)));
        assert!(!Value::from(3).is_same(&Value::from(3.0)));
        assert!(Value::Null.is_same(&Value::Null));
    }

    #[test]
    fn test_float_identity_rules() {
        assert!(Value::from(f64::NAN).is_same(&Value::from(f64::NAN)));
        assert!(!Value::from(0.0).is_same(&Value::from(-0.0)));
        assert!(Value::from(1.5).is_same(&Value::from(1.5)));
    }

    #[test]
    fn test_callbacks_compare_by_pointer() {
        let a = Callback::new(|| {});
        let b = Callback::new(|| {});
        assert!(Value::from(a.clone()).is_same(&Value::from(a.clone())));
        assert!(!Value::from(a).is_same(&Value::from(b)));
    }

    #[test]
    fn test_objects_compare_by_pointer() {
        let obj = Value::object(vec![1, 2, 3]);
        let same = obj.clone();
        let other = Value::object(vec![1, 2, 3]);
        assert!(obj.is_same(&same));
        assert!(!obj.is_same(&other));
        assert_eq!(obj.downcast::<Vec<i32>>().map(|v| v.len()), Some(3));
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Value::from(42).to_text().as_deref(), Some("42"));
        assert_eq!(Value::from("hi").to_text().as_deref(), Some("hi"));
        assert_eq!(Value::Null.to_text(), None);
        assert_eq!(Value::from(Callback::new(|| {})).to_text(), None);
    }

    #[test]
    fn test_key_conversions() {
        assert_eq!(Key::from(3usize), Key::from("3"));
        assert_eq!(Key::from("li").as_str(), "li");
    }
}
