use serde::{Deserialize, Serialize};

use crate::{AttributeDesc, Error, Value, ValueKind};

/// Address of an attribute inside a graph: node name plus an attribute
/// path (dotted for group members, e.g. `"pose.rotation"`).
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrAddr {
    pub node: String,
    pub attr: String,
}

impl AttrAddr {
    pub fn new(node: &str, attr: &str) -> Self {
        Self {
            node: node.to_owned(),
            attr: attr.to_owned(),
        }
    }

    /// Link expression form: `{NodeName.attrPath}`.
    pub fn to_link_expr(&self) -> String {
        format!("{{{}.{}}}", self.node, self.attr)
    }

    /// Parse a `{NodeName.attrPath}` link expression.
    pub fn from_link_expr(expr: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidLinkExpr(expr.to_owned());
        let inner = expr
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(invalid)?;
        let (node, attr) = inner.split_once('.').ok_or_else(invalid)?;
        let ident_ok = |s: &str, dots: bool| {
            !s.is_empty()
                && s.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
                && s.chars().all(|c| c.is_alphanumeric() || c == '_' || (dots && c == '.'))
        };
        if !ident_ok(node, false) || !ident_ok(attr, true) {
            return Err(invalid());
        }
        Ok(Self::new(node, attr))
    }

    /// Whether a serialized string value is a link expression.
    pub fn is_link_expr(s: &str) -> bool {
        Self::from_link_expr(s).is_ok()
    }
}

impl std::fmt::Display for AttrAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.node, self.attr)
    }
}

/// What an attribute instance currently holds.
#[derive(Debug, Clone)]
pub enum Store {
    /// A concrete value (scalar or list).
    Value(Value),
    /// A non-owning reference to another node's output attribute.
    /// Only the graph creates and destroys these.
    Link(AttrAddr),
    /// Child attributes of a group, in declaration order.
    Group(Vec<Attribute>),
}

/// A mutable, node-bound attribute instance.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub desc: AttributeDesc,
    pub is_output: bool,
    store: Store,
}

impl Attribute {
    /// Build an instance from its descriptor, with the default value.
    pub fn from_desc(desc: &AttributeDesc, is_output: bool) -> Self {
        let store = match &desc.kind {
            ValueKind::Group => Store::Group(
                desc.members
                    .iter()
                    .map(|m| Attribute::from_desc(m, is_output))
                    .collect(),
            ),
            _ => Store::Value(desc.default_value()),
        };
        Self {
            desc: desc.clone(),
            is_output,
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn is_link(&self) -> bool {
        matches!(self.store, Store::Link(_))
    }

    /// The link target, if this attribute is linked.
    pub fn link(&self) -> Option<&AttrAddr> {
        if let Store::Link(addr) = &self.store {
            Some(addr)
        } else {
            None
        }
    }

    /// The locally held value. `None` for links and groups.
    pub fn local_value(&self) -> Option<&Value> {
        if let Store::Value(v) = &self.store {
            Some(v)
        } else {
            None
        }
    }

    /// Group children, if this is a group attribute.
    pub fn members(&self) -> Option<&[Attribute]> {
        if let Store::Group(members) = &self.store {
            Some(members)
        } else {
            None
        }
    }

    pub(crate) fn members_mut(&mut self) -> Option<&mut Vec<Attribute>> {
        if let Store::Group(members) = &mut self.store {
            Some(members)
        } else {
            None
        }
    }

    /// True iff the current value equals the descriptor default and no
    /// link is set.
    pub fn is_default(&self) -> bool {
        match &self.store {
            Store::Link(_) => false,
            Store::Value(v) => *v == self.desc.default_value(),
            Store::Group(members) => members.iter().all(Attribute::is_default),
        }
    }

    /// Validate and set a concrete value.
    /// Outputs are computed, not user-set; linked inputs must be
    /// disconnected first. Both are rejected here.
    pub(crate) fn set_value(&mut self, v: Value) -> Result<(), Error> {
        if self.is_output {
            return Err(Error::WriteToOutput(self.name().to_owned()));
        }
        if self.is_link() {
            return Err(Error::WriteToLinked(self.name().to_owned()));
        }
        self.write_value(v)
    }

    /// Set a value bypassing the output check; used by the engine to
    /// publish computed output values during graph update.
    pub(crate) fn set_output_value(&mut self, v: Value) -> Result<(), Error> {
        self.write_value(v)
    }

    fn write_value(&mut self, v: Value) -> Result<(), Error> {
        let v = self.desc.kind.validate(self.name(), v)?;
        self.store = Store::Value(v);
        Ok(())
    }

    pub(crate) fn set_link(&mut self, addr: AttrAddr) {
        self.store = Store::Link(addr);
    }

    /// Drop the link and restore the default value.
    pub(crate) fn clear_link(&mut self) {
        if self.is_link() {
            self.store = Store::Value(self.desc.default_value());
        }
    }

    /// Append one element to a list attribute.
    pub(crate) fn list_append(&mut self, v: Value) -> Result<(), Error> {
        self.list_edit(|items| {
            items.push(v);
            Ok(())
        })
    }

    /// Append several elements to a list attribute.
    pub(crate) fn list_extend(&mut self, vs: Vec<Value>) -> Result<(), Error> {
        self.list_edit(|items| {
            items.extend(vs);
            Ok(())
        })
    }

    /// Remove the element at `index` from a list attribute.
    pub(crate) fn list_remove(&mut self, index: usize) -> Result<(), Error> {
        self.list_edit(|items| {
            if index >= items.len() {
                return Err(Error::ListIndex(index, items.len()));
            }
            items.remove(index);
            Ok(())
        })
    }

    fn list_edit(
        &mut self,
        edit: impl FnOnce(&mut Vec<Value>) -> Result<(), Error>,
    ) -> Result<(), Error> {
        if !matches!(self.desc.kind, ValueKind::List { .. }) {
            return Err(Error::NotAList(self.name().to_owned()));
        }
        if self.is_link() {
            return Err(Error::WriteToLinked(self.name().to_owned()));
        }
        let mut items = match std::mem::replace(&mut self.store, Store::Value(Value::List(vec![]))) {
            Store::Value(Value::List(items)) => items,
            other => {
                // a list attribute always stores a list value
                self.store = other;
                return Err(Error::NotAList(self.name().to_owned()));
            }
        };
        let original = items.clone();
        let res = edit(&mut items);
        let validated = match res {
            Ok(()) => self.desc.kind.validate(&self.desc.name, Value::List(items)),
            Err(e) => Err(e),
        };
        match validated {
            Ok(v) => {
                self.store = Store::Value(v);
                Ok(())
            }
            Err(e) => {
                // a failed edit leaves the list as it was
                self.store = Store::Value(Value::List(original));
                Err(e)
            }
        }
    }

    /// Serialized form for graph files: links become link expressions,
    /// groups become JSON objects, values are exported as-is.
    pub fn export_value(&self) -> serde_json::Value {
        match &self.store {
            Store::Link(addr) => serde_json::Value::String(addr.to_link_expr()),
            Store::Value(v) => serde_json::to_value(v).unwrap_or(serde_json::Value::Null),
            Store::Group(members) => {
                let map = members
                    .iter()
                    .map(|m| (m.name().to_owned(), m.export_value()))
                    .collect();
                serde_json::Value::Object(map)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_attr() -> Attribute {
        let desc = AttributeDesc::new(
            "frames",
            ValueKind::List {
                element: Box::new(ValueKind::Int),
            },
        );
        Attribute::from_desc(&desc, false)
    }

    #[test]
    fn test_link_expr_round_trip() {
        let addr = AttrAddr::new("Blur_1", "output");
        let expr = addr.to_link_expr();
        assert_eq!(expr, "{Blur_1.output}");
        assert_eq!(AttrAddr::from_link_expr(&expr).unwrap(), addr);
        assert!(AttrAddr::is_link_expr("{A.b.c}"));
        assert!(!AttrAddr::is_link_expr("{A}"));
        assert!(!AttrAddr::is_link_expr("A.b"));
        assert!(!AttrAddr::is_link_expr("{1A.b}"));
    }

    #[test]
    fn test_set_value_rejections() {
        let desc = AttributeDesc::new("input", ValueKind::File);
        let mut attr = Attribute::from_desc(&desc, false);
        assert!(attr.set_value(Value::Str("/tmp/x".into())).is_ok());
        assert!(matches!(
            attr.set_value(Value::Int(1)).unwrap_err(),
            Error::ValueType { .. }
        ));

        attr.set_link(AttrAddr::new("Src", "out"));
        assert!(matches!(
            attr.set_value(Value::Str("y".into())).unwrap_err(),
            Error::WriteToLinked(_)
        ));

        let mut out = Attribute::from_desc(&desc, true);
        assert!(matches!(
            out.set_value(Value::Str("z".into())).unwrap_err(),
            Error::WriteToOutput(_)
        ));
    }

    #[test]
    fn test_is_default() {
        let desc = AttributeDesc::new("n", ValueKind::Int).with_default(Value::Int(4));
        let mut attr = Attribute::from_desc(&desc, false);
        assert!(attr.is_default());
        attr.set_value(Value::Int(5)).unwrap();
        assert!(!attr.is_default());
        attr.set_value(Value::Int(4)).unwrap();
        assert!(attr.is_default());
        attr.set_link(AttrAddr::new("A", "out"));
        assert!(!attr.is_default());
        attr.clear_link();
        assert!(attr.is_default());
    }

    #[test]
    fn test_list_ops() {
        let mut attr = list_attr();
        attr.list_append(Value::Int(1)).unwrap();
        attr.list_extend(vec![Value::Int(2), Value::Int(3)]).unwrap();
        assert_eq!(
            attr.local_value().unwrap().as_list().unwrap().len(),
            3
        );
        attr.list_remove(1).unwrap();
        assert_eq!(
            attr.local_value().unwrap(),
            &Value::List(vec![Value::Int(1), Value::Int(3)])
        );
        assert!(matches!(
            attr.list_remove(5).unwrap_err(),
            Error::ListIndex(5, 2)
        ));
        // element validation still applies:
        assert!(attr.list_append(Value::Bool(true)).is_err());
    }
}
