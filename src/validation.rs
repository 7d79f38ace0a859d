use std::collections::HashSet;

use log::warn;
use thiserror::Error;

use crate::binary::{module::Module, types::ExternalKind};

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("start function {0} does not exist")]
    StartFunctionNotFound(u32),
    #[error("start function {0} must take no parameters and return no results")]
    InvalidStartFunctionType(u32),
    #[error("multiple exports found with the same name `{0}`")]
    DuplicateExport(String),
    #[error("export `{name}` refers to missing {kind:?} {index}")]
    ExportNotFound {
        name: String,
        kind: ExternalKind,
        index: u32,
    },
}

/// In strict mode a violation is returned as an error; otherwise it is logged
/// and reported as `Ok(false)`.
fn report(result: Result<(), ValidationError>, strict: bool) -> Result<bool, ValidationError> {
    match result {
        Ok(()) => Ok(true),
        Err(err) if strict => Err(err),
        Err(err) => {
            warn!("module validation failed: {}", err);
            Ok(false)
        }
    }
}

impl Module {
    pub fn validate(&self, strict: bool) -> Result<bool, ValidationError> {
        report(self.check(), strict)
    }

    pub fn validate_start_function(&self, strict: bool) -> Result<bool, ValidationError> {
        report(self.check_start_function(), strict)
    }

    fn check(&self) -> Result<(), ValidationError> {
        self.check_start_function()?;

        let mut names = HashSet::new();
        for export in self.exports.iter() {
            if !names.insert(export.name.as_str()) {
                return Err(ValidationError::DuplicateExport(export.name.clone()));
            }

            let kind = export.desc.kind();
            let index = export.desc.index();
            if index as usize >= self.store_decl.index_len(kind) {
                return Err(ValidationError::ExportNotFound {
                    name: export.name.clone(),
                    kind,
                    index,
                });
            }
        }
        Ok(())
    }

    fn check_start_function(&self) -> Result<(), ValidationError> {
        let Some(idx) = self.start else {
            return Ok(());
        };
        let func_type = self
            .function_type(idx)
            .ok_or(ValidationError::StartFunctionNotFound(idx))?;
        if !func_type.is_nullary() {
            return Err(ValidationError::InvalidStartFunctionType(idx));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ValidationError;
    use crate::binary::module::Module;
    use crate::testing::{leb_u32, module_bytes, name};
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    fn export_section(exports: &[(&str, u32)]) -> Vec<u8> {
        let mut payload = leb_u32(exports.len() as u32);
        for (export_name, idx) in exports {
            payload.extend(name(export_name));
            payload.push(0x00);
            payload.extend(leb_u32(*idx));
        }
        payload
    }

    fn two_funcs_with_exports(exports: &[(&str, u32)]) -> Vec<u8> {
        module_bytes(&[
            (0x01, &[0x01, 0x60, 0x00, 0x00]),
            (0x03, &[0x02, 0x00, 0x00]),
            (0x07, &export_section(exports)),
            (0x0A, &[0x02, 0x02, 0x00, 0x0B, 0x02, 0x00, 0x0B]),
        ])
    }

    #[test]
    fn duplicate_export_names() -> Result<()> {
        let module = Module::load(&two_funcs_with_exports(&[("run", 0), ("run", 1)]))?;
        assert_eq!(module.validate(false)?, false);
        assert_eq!(
            module.validate(true),
            Err(ValidationError::DuplicateExport("run".into()))
        );
        Ok(())
    }

    #[test]
    fn unique_export_names() -> Result<()> {
        let module = Module::load(&two_funcs_with_exports(&[("a", 0), ("b", 1)]))?;
        assert!(module.validate(true)?);
        assert!(module.validate(false)?);
        Ok(())
    }

    #[test]
    fn export_out_of_range() -> Result<()> {
        let module = Module::load(&two_funcs_with_exports(&[("c", 2)]))?;
        assert!(matches!(
            module.validate(true),
            Err(ValidationError::ExportNotFound { index: 2, .. })
        ));
        Ok(())
    }

    #[test]
    fn start_function_type() -> Result<()> {
        let wasm = wat::parse_file("src/fixtures/start.wat")?;
        let mut module = Module::load(&wasm)?;
        assert_eq!(module.start, Some(1));
        assert!(module.validate_start_function(true)?);
        assert!(module.validate(true)?);

        module.start = Some(2);
        assert_eq!(module.validate_start_function(false)?, false);
        assert_eq!(
            module.validate(true),
            Err(ValidationError::InvalidStartFunctionType(2))
        );

        // imported, takes a parameter
        module.start = Some(0);
        assert_eq!(module.validate_start_function(false)?, false);

        module.start = Some(9);
        assert_eq!(
            module.validate_start_function(true),
            Err(ValidationError::StartFunctionNotFound(9))
        );
        Ok(())
    }

    #[test]
    fn start_function_with_result() -> Result<()> {
        let wasm = wat::parse_str(
            r#"(module
                (func $f (result i32) (i32.const 1))
                (start $f))"#,
        )?;
        let module = Module::load(&wasm)?;
        assert_eq!(module.validate(false)?, false);
        assert!(module.validate_start_function(true).is_err());
        Ok(())
    }

    #[test]
    fn module_without_start_is_valid() -> Result<()> {
        let module = Module::load(&wat::parse_str("(module)")?)?;
        assert!(module.validate(true)?);
        Ok(())
    }
}
