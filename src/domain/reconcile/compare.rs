use serde::Deserialize;

use crate::domain::entities::value::Value;

/// Equality policy used to decide whether a cell changed.
pub trait Comparator: Send + Sync {
    fn equal(&self, left: &Value, right: &Value) -> bool;
}

/// Compares canonical text: `Int(5)` equals `Text("5")`, while `Float(1.5)`
/// and `Text("1.50")` differ.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextualEquality;

impl Comparator for TextualEquality {
    fn equal(&self, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => left.to_string() == right.to_string(),
        }
    }
}

/// Same variant and same value. NaN equals NaN so an untouched NaN cell is
/// never reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypedEquality;

impl Comparator for TypedEquality {
    fn equal(&self, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => left == right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparePolicy {
    #[default]
    Textual,
    Typed,
}

impl ComparePolicy {
    pub fn comparator(&self) -> Box<dyn Comparator> {
        match self {
            ComparePolicy::Textual => Box::new(TextualEquality),
            ComparePolicy::Typed => Box::new(TypedEquality),
        }
    }
}
