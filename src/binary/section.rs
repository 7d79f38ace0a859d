use super::{
    error::DecodeError,
    instruction::ConstInstruction,
    opcode::Opcode,
    types::{ExternalKind, FuncType, Layout, ValueType},
};
use num_derive::FromPrimitive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, FromPrimitive)]
pub enum SectionCode {
    Custom = 0x00,
    Type = 0x01,
    Import = 0x02,
    Function = 0x03,
    Table = 0x04,
    Memory = 0x05,
    Global = 0x06,
    Export = 0x07,
    Start = 0x08,
    Element = 0x09,
    Code = 0x0a,
    Data = 0x0b,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionLocal {
    pub type_count: u32,
    pub value_type: ValueType,
}

/// A locally defined function.
///
/// The Function section only reserves the signature slot; `locals`,
/// `expression` and `layout` are filled in from the matching Code section
/// entry. `expression` is the raw instruction stream, left to the execution
/// engine to interpret.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub type_idx: u32,
    pub locals: Vec<ValueType>,
    pub expression: Vec<u8>,
    /// Parameters followed by locals.
    pub layout: Layout,
}

impl Function {
    pub fn new(type_idx: u32) -> Self {
        Self {
            type_idx,
            ..Default::default()
        }
    }

    pub(crate) fn set_locals(&mut self, groups: &[FunctionLocal]) {
        self.locals.clear();
        for local in groups {
            for _ in 0..local.type_count {
                self.locals.push(local.value_type);
            }
        }
    }

    /// Second pass, run once the type table and every body are known. Lays
    /// out parameters followed by locals and checks the body is terminated.
    pub(crate) fn expand(&mut self, func_idx: usize, types: &[FuncType]) -> Result<(), DecodeError> {
        let func_type = types
            .get(self.type_idx as usize)
            .ok_or(DecodeError::TypeIndexOutOfRange(self.type_idx))?;

        if self.expression.last() != Some(&(Opcode::End as u8)) {
            return Err(DecodeError::MissingEnd(func_idx));
        }

        self.layout = Layout::new(
            func_type
                .params
                .iter()
                .chain(self.locals.iter())
                .copied(),
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportDesc {
    Func(u32),
    Table(u32),
    Memory(u32),
    Global(u32),
}

impl ExportDesc {
    pub fn new(kind: ExternalKind, idx: u32) -> Self {
        match kind {
            ExternalKind::Func => ExportDesc::Func(idx),
            ExternalKind::Table => ExportDesc::Table(idx),
            ExternalKind::Memory => ExportDesc::Memory(idx),
            ExternalKind::Global => ExportDesc::Global(idx),
        }
    }

    pub fn kind(&self) -> ExternalKind {
        match self {
            ExportDesc::Func(_) => ExternalKind::Func,
            ExportDesc::Table(_) => ExternalKind::Table,
            ExportDesc::Memory(_) => ExternalKind::Memory,
            ExportDesc::Global(_) => ExternalKind::Global,
        }
    }

    pub fn index(&self) -> u32 {
        match *self {
            ExportDesc::Func(idx)
            | ExportDesc::Table(idx)
            | ExportDesc::Memory(idx)
            | ExportDesc::Global(idx) => idx,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub desc: ExportDesc,
}

/// Initializer payload for a table or memory, placed at `offset` when the
/// module is instantiated.
#[derive(Debug, Clone, PartialEq)]
pub struct DefSegment {
    pub offset: ConstInstruction,
    pub data: Vec<u8>,
}
