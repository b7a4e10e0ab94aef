//! Declarative request validation.
//!
//! Rules are listed per field next to the type they check, rather than being
//! discovered at runtime:
//!
//! ```rust
//! use switchyard::validate::{Rule, Rules, Validate, ValidationError};
//!
//! struct NewUser {
//!     name: String,
//!     age: Option<u32>,
//! }
//!
//! impl Validate for NewUser {
//!     fn validate(&self) -> Vec<ValidationError> {
//!         Rules::new()
//!             .field("name", &self.name, &[Rule::Required, Rule::MinLength(2)])
//!             .field("age", &self.age, &[Rule::Required])
//!             .finish()
//!     }
//! }
//!
//! let errors = NewUser { name: "J".into(), age: None }.validate();
//! assert_eq!(errors.len(), 2);
//! ```

use serde::Serialize;

/// One failed rule, reported back to the client as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

/// A single check applied to a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Value must not be empty: `""`, `0`, or `None`.
    Required,
    /// Text must have at least this many characters.
    MinLength(usize),
    /// Text must have at most this many characters.
    MaxLength(usize),
}

/// Types that know which of their fields break which rules.
pub trait Validate {
    fn validate(&self) -> Vec<ValidationError>;
}

/// A value a [`Rule`] can be evaluated against.
pub trait FieldValue {
    fn is_empty_value(&self) -> bool;

    /// Character length for text values; `None` when length is meaningless.
    fn char_len(&self) -> Option<usize> {
        None
    }
}

impl FieldValue for str {
    fn is_empty_value(&self) -> bool { self.is_empty() }
    fn char_len(&self) -> Option<usize> { Some(self.chars().count()) }
}

impl FieldValue for String {
    fn is_empty_value(&self) -> bool { self.is_empty() }
    fn char_len(&self) -> Option<usize> { Some(self.chars().count()) }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn is_empty_value(&self) -> bool {
        self.as_ref().is_none_or(FieldValue::is_empty_value)
    }

    fn char_len(&self) -> Option<usize> {
        self.as_ref().and_then(FieldValue::char_len)
    }
}

macro_rules! numeric_field {
    ($($t:ty),*) => {
        $(impl FieldValue for $t {
            fn is_empty_value(&self) -> bool { *self == 0 }
        })*
    };
}

numeric_field!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

/// Accumulates rule failures across fields.
#[derive(Debug, Default)]
pub struct Rules {
    errors: Vec<ValidationError>,
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates `rules` against `value` in order, recording every failure.
    pub fn field<V>(mut self, name: &str, value: &V, rules: &[Rule]) -> Self
    where
        V: FieldValue + ?Sized,
    {
        for rule in rules {
            if let Some(message) = check(*rule, value) {
                self.errors.push(ValidationError {
                    field: name.to_owned(),
                    message: message.to_owned(),
                });
            }
        }
        self
    }

    pub fn finish(self) -> Vec<ValidationError> {
        self.errors
    }
}

fn check<V: FieldValue + ?Sized>(rule: Rule, value: &V) -> Option<&'static str> {
    match rule {
        Rule::Required if value.is_empty_value() => Some("Field is required"),
        Rule::MinLength(min) if value.char_len().is_some_and(|n| n < min) => {
            Some("Field is too short")
        }
        Rule::MaxLength(max) if value.char_len().is_some_and(|n| n > max) => {
            Some("Field is too long")
        }
        _ => None,
    }
}
