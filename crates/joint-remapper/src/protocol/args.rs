use super::Value;
use crate::error::ProtocolError;
use crate::Tag;

type Result<T> = core::result::Result<T, ProtocolError>;

/// Shape-checked positional access to a request.
///
/// Every accessor fails with [`ProtocolError::Shape`] instead of defaulting
/// when an argument is missing or has the wrong type.
#[derive(Clone, Copy, Debug)]
pub struct Args<'a> {
    items: &'a [Value],
}

impl<'a> Args<'a> {
    pub fn new(items: &'a [Value]) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn value(&self, at: usize) -> Result<&'a Value> {
        self.items
            .get(at)
            .ok_or(ProtocolError::shape(at, "an argument"))
    }

    pub fn tag(&self, at: usize) -> Result<Tag> {
        self.value(at)?
            .as_tag()
            .ok_or(ProtocolError::shape(at, "a tag"))
    }

    pub fn int(&self, at: usize) -> Result<i64> {
        self.value(at)?
            .as_int()
            .ok_or(ProtocolError::shape(at, "an integer"))
    }

    /// Logical joint index. Range is checked later by the registry lookup.
    pub fn joint(&self, at: usize) -> Result<i64> {
        self.value(at)?
            .as_int()
            .ok_or(ProtocolError::shape(at, "a joint index"))
    }

    pub fn float(&self, at: usize) -> Result<f64> {
        self.value(at)?
            .as_float()
            .ok_or(ProtocolError::shape(at, "a number"))
    }

    pub fn text(&self, at: usize) -> Result<&'a str> {
        self.value(at)?
            .as_text()
            .ok_or(ProtocolError::shape(at, "a string"))
    }

    pub fn list(&self, at: usize) -> Result<&'a [Value]> {
        self.value(at)?
            .as_list()
            .ok_or(ProtocolError::shape(at, "a list"))
    }

    pub fn floats(&self, at: usize) -> Result<Vec<f64>> {
        self.list(at)?
            .iter()
            .map(|v| v.as_float().ok_or(ProtocolError::shape(at, "a list of numbers")))
            .collect()
    }

    pub fn joints(&self, at: usize) -> Result<Vec<i64>> {
        self.list(at)?
            .iter()
            .map(|v| v.as_int().ok_or(ProtocolError::shape(at, "a list of joint indices")))
            .collect()
    }

    pub fn tags(&self, at: usize) -> Result<Vec<Tag>> {
        self.list(at)?
            .iter()
            .map(|v| v.as_tag().ok_or(ProtocolError::shape(at, "a list of tags")))
            .collect()
    }

    /// Count-prefixed group: `n [j0 .. jn-1]` with the list length checked
    /// against the count.
    pub fn joint_group(&self, count_at: usize) -> Result<Vec<i64>> {
        let count = self.int(count_at)?;
        let joints = self.joints(count_at + 1)?;
        if count < 0 || joints.len() != count as usize {
            return Err(ProtocolError::shape(count_at + 1, "as many joints as the count"));
        }
        Ok(joints)
    }

    pub fn rest(&self, from: usize) -> &'a [Value] {
        self.items.get(from..).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Vec<Value> {
        vec![
            Value::Tag(Tag::new("set")),
            Value::Int(2),
            Value::List(vec![Value::Int(0), Value::Int(4)]),
            Value::List(vec![Value::Float(1.0), Value::Int(2)]),
        ]
    }

    #[test]
    fn test_typed_access() {
        let items = request();
        let args = Args::new(&items);
        assert_eq!(args.tag(0).unwrap(), Tag::new("set"));
        assert_eq!(args.joint_group(1).unwrap(), vec![0, 4]);
        assert_eq!(args.floats(3).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_missing_argument_is_shape_error() {
        let items = request();
        let args = Args::new(&items);
        assert_eq!(args.float(7), Err(ProtocolError::shape(7, "an argument")));
        assert!(matches!(args.list(1), Err(ProtocolError::Shape { position: 1, .. })));
        assert!(matches!(args.tag(1), Err(ProtocolError::Shape { .. })));
    }

    #[test]
    fn test_group_count_must_match() {
        let items = vec![Value::Int(3), Value::List(vec![Value::Int(1)])];
        let args = Args::new(&items);
        assert!(args.joint_group(0).is_err());
    }
}
