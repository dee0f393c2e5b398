use serde::{Deserialize, Serialize};

use crate::Error;

/// Runtime values held by attributes and flowing through links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        if let Value::Int(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Value::Str(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        if let Value::List(v) = self {
            Some(v)
        } else {
            None
        }
    }

    /// Render this value for use on a command line.
    /// String-like values are quoted so paths with spaces survive the shell.
    pub fn to_cmd_str(&self, quoted: bool) -> String {
        match self {
            Value::Bool(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Str(v) => {
                if quoted {
                    format!("\"{v}\"")
                } else {
                    v.clone()
                }
            }
            Value::List(items) => items
                .iter()
                .map(|v| v.to_cmd_str(quoted))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_cmd_str(false))
    }
}

/// Semantic type of an attribute, used to validate values on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Str,
    /// File paths; behaves as Str but flagged so tools can browse for them.
    File,
    /// One value out of a fixed set.
    Choice { options: Vec<String> },
    /// Homogeneous list of `element` values.
    List { element: Box<ValueKind> },
    /// Named children; the element attributes are declared in the descriptor.
    Group,
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "string",
            ValueKind::File => "file",
            ValueKind::Choice { .. } => "choice",
            ValueKind::List { .. } => "list",
            ValueKind::Group => "group",
        }
    }

    /// Check `v` against this kind, applying the conversions we accept
    /// (ints where floats are expected, strings for files).
    /// Returns the possibly-converted value.
    pub fn validate(&self, attr: &str, v: Value) -> Result<Value, Error> {
        let fail = |v: &Value| Error::ValueType {
            attr: attr.to_owned(),
            expected: self.name().to_owned(),
            got: format!("{v:?}"),
        };
        match (self, v) {
            (ValueKind::Bool, v @ Value::Bool(_)) => Ok(v),
            (ValueKind::Int, v @ Value::Int(_)) => Ok(v),
            (ValueKind::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (ValueKind::Float, v @ Value::Float(_)) => Ok(v),
            (ValueKind::Str, v @ Value::Str(_)) => Ok(v),
            (ValueKind::File, v @ Value::Str(_)) => Ok(v),
            (ValueKind::Choice { options }, Value::Str(s)) => {
                if options.iter().any(|o| o == &s) {
                    Ok(Value::Str(s))
                } else {
                    Err(Error::InvalidChoice(s, attr.to_owned()))
                }
            }
            (ValueKind::List { element }, Value::List(items)) => {
                let items = items
                    .into_iter()
                    .map(|v| element.validate(attr, v))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(items))
            }
            (_, v) => Err(fail(&v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_scalars() {
        assert_eq!(
            ValueKind::Int.validate("n", Value::Int(3)).unwrap(),
            Value::Int(3)
        );
        assert!(ValueKind::Int.validate("n", Value::Str("3".into())).is_err());
        // ints are accepted where floats are expected:
        assert_eq!(
            ValueKind::Float.validate("f", Value::Int(2)).unwrap(),
            Value::Float(2.0)
        );
    }

    #[test]
    fn test_validate_choice() {
        let kind = ValueKind::Choice {
            options: vec!["low".into(), "high".into()],
        };
        assert!(kind.validate("q", Value::Str("low".into())).is_ok());
        let err = kind.validate("q", Value::Str("medium".into())).unwrap_err();
        assert!(matches!(err, Error::InvalidChoice(..)));
    }

    #[test]
    fn test_validate_list_elements() {
        let kind = ValueKind::List {
            element: Box::new(ValueKind::Int),
        };
        assert!(kind
            .validate("xs", Value::List(vec![Value::Int(1), Value::Int(2)]))
            .is_ok());
        assert!(kind
            .validate("xs", Value::List(vec![Value::Bool(true)]))
            .is_err());
    }

    #[test]
    fn test_cmd_str_quoting() {
        assert_eq!(Value::Str("a b".into()).to_cmd_str(true), "\"a b\"");
        assert_eq!(Value::Str("a b".into()).to_cmd_str(false), "a b");
        assert_eq!(Value::Int(7).to_cmd_str(true), "7");
    }
}
