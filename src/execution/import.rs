use anyhow::Result;
use std::{collections::HashMap, fmt, rc::Rc};

use super::value::Value;

/// Host callable satisfying a function import. Receives the arguments in
/// parameter order and returns the results in result order.
pub type HostFunc = Rc<dyn Fn(&[Value]) -> Result<Vec<Value>>>;

/// Host functions keyed by import module name, then field name.
#[derive(Default)]
pub struct Imports {
    funcs: HashMap<String, HashMap<String, HostFunc>>,
}

impl Imports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_func(
        &mut self,
        module_name: impl Into<String>,
        field_name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Vec<Value>> + 'static,
    ) {
        let import = self.funcs.entry(module_name.into()).or_default();
        import.insert(field_name.into(), Rc::new(func));
    }

    pub fn get(&self, module_name: &str, field_name: &str) -> Option<&HostFunc> {
        self.funcs.get(module_name)?.get(field_name)
    }
}

/// The callable bound to a function import, if any.
#[derive(Clone, Default)]
pub struct HostBinding(Option<HostFunc>);

impl HostBinding {
    pub fn bind(&mut self, func: HostFunc) {
        self.0 = Some(func);
    }

    pub fn get(&self) -> Option<&HostFunc> {
        self.0.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Debug for HostBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_bound() { "Bound" } else { "Unbound" })
    }
}

impl PartialEq for HostBinding {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HostBinding, Imports};
    use crate::execution::value::Value;
    use anyhow::Result;

    #[test]
    fn registry_lookup() -> Result<()> {
        let mut imports = Imports::new();
        imports.add_func("env", "double", |args| {
            let n: i32 = args[0].try_into()?;
            Ok(vec![Value::I32(n * 2)])
        });

        let func = imports.get("env", "double").expect("registered");
        assert_eq!(func(&[Value::I32(21)])?, vec![Value::I32(42)]);
        assert!(imports.get("env", "triple").is_none());
        assert!(imports.get("wasi", "double").is_none());
        Ok(())
    }

    #[test]
    fn binding_equality() {
        let mut imports = Imports::new();
        imports.add_func("env", "f", |_| Ok(vec![]));
        let func = imports.get("env", "f").cloned().expect("registered");

        let mut a = HostBinding::default();
        let mut b = HostBinding::default();
        assert_eq!(a, b);
        a.bind(func.clone());
        assert_ne!(a, b);
        b.bind(func);
        assert_eq!(a, b);
        assert_eq!(format!("{:?}", a), "Bound");
    }
}
