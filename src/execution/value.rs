use crate::binary::types::ValueType;

/// Scalar crossing the host/guest boundary or held by a global.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn ty(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::F32(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::I32(if value { 1 } else { 0 })
    }
}

impl TryFrom<Value> for i32 {
    type Error = anyhow::Error;

    fn try_from(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::I32(value) => Ok(value),
            other => anyhow::bail!("type mismatch: expected i32, got {:?}", other.ty()),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = anyhow::Error;

    fn try_from(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::I64(value) => Ok(value),
            other => anyhow::bail!("type mismatch: expected i64, got {:?}", other.ty()),
        }
    }
}

impl TryFrom<Value> for f32 {
    type Error = anyhow::Error;

    fn try_from(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::F32(value) => Ok(value),
            other => anyhow::bail!("type mismatch: expected f32, got {:?}", other.ty()),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = anyhow::Error;

    fn try_from(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::F64(value) => Ok(value),
            other => anyhow::bail!("type mismatch: expected f64, got {:?}", other.ty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Value;
    use crate::binary::types::ValueType;
    use anyhow::Result;

    #[test]
    fn value_kinds() {
        assert_eq!(Value::from(1i32).ty(), ValueType::I32);
        assert_eq!(Value::from(1i64).ty(), ValueType::I64);
        assert_eq!(Value::from(1.5f32).ty(), ValueType::F32);
        assert_eq!(Value::from(1.5f64).ty(), ValueType::F64);
        assert_eq!(Value::from(true), Value::I32(1));
    }

    #[test]
    fn unbox_checks_kind() -> Result<()> {
        let n: i32 = Value::I32(7).try_into()?;
        assert_eq!(n, 7);
        let wrong: Result<i64> = Value::I32(7).try_into();
        assert!(wrong.is_err());
        Ok(())
    }
}
