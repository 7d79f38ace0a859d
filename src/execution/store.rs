use anyhow::{Result, bail};
use log::trace;

use super::{
    import::{HostBinding, Imports},
    value::Value,
};
use crate::binary::{
    error::DecodeError,
    section::DefSegment,
    types::{ExternalKind, FuncType, GlobalType, Limits, PAGE_SIZE, ValueType},
};

/// Where an entry of a combined index space lives: the `n`th import of that
/// kind, or the `n`th local definition of that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEntry {
    Import(u32),
    Local(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Imported<T> {
    pub module: String,
    pub field: String,
    pub desc: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportFunction {
    pub type_idx: u32,
    pub func_type: FuncType,
    pub host: HostBinding,
}

impl Imported<ImportFunction> {
    /// Calls the bound host function, checking arguments and results against
    /// the declared signature.
    pub fn invoke(&self, args: &[Value]) -> Result<Vec<Value>> {
        let Some(func) = self.desc.host.get() else {
            bail!("host function {}.{} is not bound", self.module, self.field)
        };

        let func_type = &self.desc.func_type;
        if !args.iter().map(Value::ty).eq(func_type.params.iter().copied()) {
            bail!(
                "arguments to {}.{} do not match {:?}",
                self.module,
                self.field,
                func_type.params
            );
        }

        let results = func(args)?;
        if !results
            .iter()
            .map(Value::ty)
            .eq(func_type.results.iter().copied())
        {
            bail!(
                "results from {}.{} do not match {:?}",
                self.module,
                self.field,
                func_type.results
            );
        }
        Ok(results)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefTable {
    pub elem_type: ValueType,
    pub limits: Limits,
    pub segments: Vec<DefSegment>,
}

impl DefTable {
    pub fn new(elem_type: ValueType, min: u32, max: Option<u32>) -> Self {
        Self {
            elem_type,
            limits: Limits {
                elem_size: elem_type.size(),
                min,
                max,
            },
            segments: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefMem {
    pub limits: Limits,
    pub segments: Vec<DefSegment>,
}

impl DefMem {
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self {
            limits: Limits {
                elem_size: PAGE_SIZE,
                min,
                max,
            },
            segments: vec![],
        }
    }

    pub fn add_default(&mut self, segment: DefSegment) {
        self.segments.push(segment);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub mutable: bool,
    value: Value,
}

impl Global {
    pub fn new(value: Value, mutable: bool) -> Self {
        Self { mutable, value }
    }

    pub fn ty(&self) -> ValueType {
        self.value.ty()
    }

    pub fn get(&self) -> Value {
        self.value
    }

    pub fn set(&mut self, value: Value) -> Result<()> {
        if !self.mutable {
            bail!("global is immutable");
        }
        if value.ty() != self.ty() {
            bail!(
                "type mismatch: global is {:?}, got {:?}",
                self.ty(),
                value.ty()
            );
        }
        self.value = value;
        Ok(())
    }
}

/// The combined function, table, memory and global index spaces of a module.
///
/// Imports always precede local definitions within each index space.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StoreDeclarations {
    pub imported_functions: Vec<Imported<ImportFunction>>,
    pub imported_tables: Vec<Imported<DefTable>>,
    pub imported_memories: Vec<Imported<DefMem>>,
    pub imported_globals: Vec<Imported<GlobalType>>,

    pub tables: Vec<DefTable>,
    pub memories: Vec<DefMem>,
    pub globals: Vec<Global>,
    local_functions: u32,

    pub indexing_function: Vec<IndexEntry>,
    pub indexing_table: Vec<IndexEntry>,
    pub indexing_memory: Vec<IndexEntry>,
    pub indexing_global: Vec<IndexEntry>,
}

fn push_import(
    index: &mut Vec<IndexEntry>,
    kind: ExternalKind,
    imported: usize,
) -> Result<u32, DecodeError> {
    if matches!(index.last(), Some(IndexEntry::Local(_))) {
        return Err(DecodeError::ImportAfterLocal(kind));
    }
    index.push(IndexEntry::Import(imported as u32));
    Ok(index.len() as u32 - 1)
}

fn push_local(index: &mut Vec<IndexEntry>, local: u32) -> u32 {
    index.push(IndexEntry::Local(local));
    index.len() as u32 - 1
}

fn resolve<'a, T>(
    index: &[IndexEntry],
    idx: u32,
    imports: &'a [Imported<T>],
    locals: &'a [T],
) -> Option<&'a T> {
    match *index.get(idx as usize)? {
        IndexEntry::Import(i) => imports.get(i as usize).map(|import| &import.desc),
        IndexEntry::Local(i) => locals.get(i as usize),
    }
}

fn resolve_mut<'a, T>(
    index: &[IndexEntry],
    idx: u32,
    imports: &'a mut [Imported<T>],
    locals: &'a mut [T],
) -> Option<&'a mut T> {
    match *index.get(idx as usize)? {
        IndexEntry::Import(i) => imports.get_mut(i as usize).map(|import| &mut import.desc),
        IndexEntry::Local(i) => locals.get_mut(i as usize),
    }
}

impl StoreDeclarations {
    pub fn add_function_imp(
        &mut self,
        module: impl Into<String>,
        field: impl Into<String>,
        type_idx: u32,
        func_type: FuncType,
    ) -> Result<u32, DecodeError> {
        let idx = push_import(
            &mut self.indexing_function,
            ExternalKind::Func,
            self.imported_functions.len(),
        )?;
        self.imported_functions.push(Imported {
            module: module.into(),
            field: field.into(),
            desc: ImportFunction {
                type_idx,
                func_type,
                host: HostBinding::default(),
            },
        });
        Ok(idx)
    }

    pub fn add_table_imp(
        &mut self,
        module: impl Into<String>,
        field: impl Into<String>,
        elem_type: ValueType,
        min: u32,
        max: Option<u32>,
    ) -> Result<u32, DecodeError> {
        let idx = push_import(
            &mut self.indexing_table,
            ExternalKind::Table,
            self.imported_tables.len(),
        )?;
        self.imported_tables.push(Imported {
            module: module.into(),
            field: field.into(),
            desc: DefTable::new(elem_type, min, max),
        });
        Ok(idx)
    }

    pub fn add_memory_imp(
        &mut self,
        module: impl Into<String>,
        field: impl Into<String>,
        min: u32,
        max: Option<u32>,
    ) -> Result<u32, DecodeError> {
        let idx = push_import(
            &mut self.indexing_memory,
            ExternalKind::Memory,
            self.imported_memories.len(),
        )?;
        self.imported_memories.push(Imported {
            module: module.into(),
            field: field.into(),
            desc: DefMem::new(min, max),
        });
        Ok(idx)
    }

    pub fn add_global_imp(
        &mut self,
        module: impl Into<String>,
        field: impl Into<String>,
        ty: ValueType,
        mutable: bool,
    ) -> Result<u32, DecodeError> {
        let idx = push_import(
            &mut self.indexing_global,
            ExternalKind::Global,
            self.imported_globals.len(),
        )?;
        self.imported_globals.push(Imported {
            module: module.into(),
            field: field.into(),
            desc: GlobalType { ty, mutable },
        });
        Ok(idx)
    }

    /// Reserves the index of the next locally defined function. The function
    /// itself is owned by the module.
    pub fn add_function_loc(&mut self) -> u32 {
        let idx = push_local(&mut self.indexing_function, self.local_functions);
        self.local_functions += 1;
        idx
    }

    pub fn add_table_loc(&mut self, elem_type: ValueType, min: u32, max: Option<u32>) -> u32 {
        let idx = push_local(&mut self.indexing_table, self.tables.len() as u32);
        self.tables.push(DefTable::new(elem_type, min, max));
        idx
    }

    pub fn add_memory_loc(&mut self, min: u32, max: Option<u32>) -> u32 {
        let idx = push_local(&mut self.indexing_memory, self.memories.len() as u32);
        self.memories.push(DefMem::new(min, max));
        idx
    }

    pub fn add_global_loc(&mut self, value: Value, mutable: bool) -> u32 {
        let idx = push_local(&mut self.indexing_global, self.globals.len() as u32);
        self.globals.push(Global::new(value, mutable));
        idx
    }

    pub fn function_entry(&self, idx: u32) -> Option<IndexEntry> {
        self.indexing_function.get(idx as usize).copied()
    }

    pub fn table(&self, idx: u32) -> Option<&DefTable> {
        resolve(&self.indexing_table, idx, &self.imported_tables, &self.tables)
    }

    pub fn table_mut(&mut self, idx: u32) -> Option<&mut DefTable> {
        resolve_mut(
            &self.indexing_table,
            idx,
            &mut self.imported_tables,
            &mut self.tables,
        )
    }

    pub fn memory(&self, idx: u32) -> Option<&DefMem> {
        resolve(
            &self.indexing_memory,
            idx,
            &self.imported_memories,
            &self.memories,
        )
    }

    pub fn memory_mut(&mut self, idx: u32) -> Option<&mut DefMem> {
        resolve_mut(
            &self.indexing_memory,
            idx,
            &mut self.imported_memories,
            &mut self.memories,
        )
    }

    pub fn index_len(&self, kind: ExternalKind) -> usize {
        match kind {
            ExternalKind::Func => self.indexing_function.len(),
            ExternalKind::Table => self.indexing_table.len(),
            ExternalKind::Memory => self.indexing_memory.len(),
            ExternalKind::Global => self.indexing_global.len(),
        }
    }

    /// Binds every function import found in `imports`, returning how many were
    /// bound. Unmatched imports stay unbound and fail when invoked.
    pub fn bind(&mut self, imports: &Imports) -> usize {
        let mut bound = 0;
        for import in self.imported_functions.iter_mut() {
            if let Some(func) = imports.get(&import.module, &import.field) {
                trace!("bound host function {}.{}", import.module, import.field);
                import.desc.host.bind(func.clone());
                bound += 1;
            }
        }
        bound
    }
}
