use super::{
    error::{DecodeError, Decoded, LoadError, fail},
    instruction::{decode_const_expr, decode_const_immediate, expect_byte},
    opcode::Opcode,
    options::LoadOptions,
    section::{DefSegment, Export, ExportDesc, Function, FunctionLocal, SectionCode},
    types::{ExternalKind, FUNC_TYPE_TAG, FuncType, GlobalType, ValueType},
};
use crate::execution::{
    import::Imports,
    store::{IndexEntry, StoreDeclarations},
    value::Value,
};
use anyhow::bail;
use log::{debug, trace};
use nom::{
    bytes::complete::{tag, take},
    number::complete::{le_f32, le_f64, le_u8},
    sequence::pair,
};
use nom_leb128::{leb128_i32, leb128_i64, leb128_u32};
use num_traits::FromPrimitive as _;

const MAGIC: &[u8] = b"\0asm";
const VERSION: &[u8] = &[0x01, 0x00, 0x00, 0x00];

const FLAG_HAS_MAX: u32 = 0x01;
const FLAG_MUTABLE: u32 = 0x01;
const MAX_LOCALS: usize = 50_000;

#[derive(Debug, Default, PartialEq)]
pub struct Module {
    pub types: Vec<FuncType>,
    /// Locally defined functions only; imports live in `store_decl`.
    pub functions: Vec<Function>,
    pub exports: Vec<Export>,
    pub store_decl: StoreDeclarations,
    /// Combined function index of the start function.
    pub start: Option<u32>,
}

impl Module {
    pub fn new(input: &[u8]) -> anyhow::Result<Module> {
        Module::load(input).map_err(|e| anyhow::anyhow!("failed to parse wasm: {}", e))
    }

    pub fn load(input: &[u8]) -> Result<Module, LoadError> {
        Module::load_with(input, &LoadOptions::default())
    }

    /// Like [`Module::load`], but a buffer that is not a module at all yields
    /// `Ok(None)` instead of an error.
    pub fn try_load(input: &[u8]) -> Result<Option<Module>, DecodeError> {
        match Module::load(input) {
            Ok(module) => Ok(Some(module)),
            Err(LoadError::NotAModule(_)) => Ok(None),
            Err(LoadError::Malformed(err)) => Err(err),
        }
    }

    pub fn load_with(input: &[u8], options: &LoadOptions) -> Result<Module, LoadError> {
        let mut remaining = decode_header(input)?;
        let mut builder = ModuleBuilder::new(options);

        while !remaining.is_empty() {
            let (rest, (code, contents)) = decode_section(remaining).map_err(DecodeError::from)?;
            builder.section(code, contents)?;
            remaining = rest;
        }

        Ok(builder.finalize()?)
    }

    pub fn exported_function_id(&self, name: &str) -> Option<u32> {
        self.exports.iter().find_map(|export| match export.desc {
            ExportDesc::Func(idx) if export.name == name => Some(idx),
            _ => None,
        })
    }

    /// The locally defined function exported as `name`. Exports that resolve
    /// to an imported function yield `None`.
    pub fn exported_function(&self, name: &str) -> Option<&Function> {
        let idx = self.exported_function_id(name)?;
        self.local_function(idx)
    }

    pub fn exported_function_id_with_type(&self, name: &str) -> Option<(u32, &FuncType)> {
        let idx = self.exported_function_id(name)?;
        Some((idx, self.function_type(idx)?))
    }

    pub fn local_function(&self, func_idx: u32) -> Option<&Function> {
        match self.store_decl.function_entry(func_idx)? {
            IndexEntry::Local(i) => self.functions.get(i as usize),
            IndexEntry::Import(_) => None,
        }
    }

    pub fn function_type(&self, func_idx: u32) -> Option<&FuncType> {
        match self.store_decl.function_entry(func_idx)? {
            IndexEntry::Import(i) => self
                .store_decl
                .imported_functions
                .get(i as usize)
                .map(|import| &import.desc.func_type),
            IndexEntry::Local(i) => {
                let function = self.functions.get(i as usize)?;
                self.types.get(function.type_idx as usize)
            }
        }
    }

    pub fn bind_imports(&mut self, imports: &Imports) -> usize {
        self.store_decl.bind(imports)
    }

    pub fn invoke_import(&self, func_idx: u32, args: &[Value]) -> anyhow::Result<Vec<Value>> {
        match self.store_decl.function_entry(func_idx) {
            Some(IndexEntry::Import(i)) => {
                let Some(import) = self.store_decl.imported_functions.get(i as usize) else {
                    bail!("not found imported function {}", i)
                };
                import.invoke(args)
            }
            Some(IndexEntry::Local(_)) => bail!("function {} is not an import", func_idx),
            None => bail!("not found function {}", func_idx),
        }
    }
}

/// Accumulates a module section by section. Function bodies are only checked
/// in [`ModuleBuilder::finalize`], once every type and function is known.
struct ModuleBuilder<'a> {
    module: Module,
    options: &'a LoadOptions,
    last_section: Option<SectionCode>,
    bodies: usize,
}

impl<'a> ModuleBuilder<'a> {
    fn new(options: &'a LoadOptions) -> Self {
        Self {
            module: Module::default(),
            options,
            last_section: None,
            bodies: 0,
        }
    }

    fn check_order(&mut self, code: SectionCode) -> Result<(), DecodeError> {
        if code == SectionCode::Custom {
            return Ok(());
        }
        if self.options.enforce_section_order {
            if let Some(previous) = self.last_section {
                if code <= previous {
                    return Err(DecodeError::SectionOutOfOrder {
                        section: code,
                        previous,
                    });
                }
            }
        }
        self.last_section = Some(code);
        Ok(())
    }

    fn section(&mut self, code: SectionCode, contents: &[u8]) -> Result<(), DecodeError> {
        debug!("decoding {:?} section ({} bytes)", code, contents.len());
        self.check_order(code)?;

        let module = &mut self.module;
        let rest: &[u8] = match code {
            SectionCode::Custom => {
                // skip
                &[]
            }
            SectionCode::Type => {
                let (rest, types) = decode_type_section(contents)?;
                module.types.extend(types);
                rest
            }
            SectionCode::Import => {
                let (rest, _) = decode_import_section(contents, module)?;
                rest
            }
            SectionCode::Function => {
                let (rest, type_idxs) = decode_function_section(contents)?;
                for type_idx in type_idxs {
                    if module.types.get(type_idx as usize).is_none() {
                        return Err(DecodeError::TypeIndexOutOfRange(type_idx));
                    }
                    module.store_decl.add_function_loc();
                    module.functions.push(Function::new(type_idx));
                }
                rest
            }
            SectionCode::Table => {
                let (rest, _) = decode_table_section(contents, &mut module.store_decl)?;
                rest
            }
            SectionCode::Memory => {
                let (rest, _) = decode_memory_section(contents, &mut module.store_decl)?;
                rest
            }
            SectionCode::Global => {
                let (rest, _) = decode_global_section(contents, &mut module.store_decl)?;
                rest
            }
            SectionCode::Export => {
                let (rest, exports) = decode_export_section(contents)?;
                module.exports.extend(exports);
                rest
            }
            SectionCode::Start => {
                let (rest, idx) = decode_start_section(contents)?;
                module.start = Some(idx);
                rest
            }
            SectionCode::Element => {
                let (rest, _) = decode_element_section(contents, &mut module.store_decl)?;
                rest
            }
            SectionCode::Code => {
                let (rest, bodies) = decode_code_section(contents, module)?;
                self.bodies = bodies;
                rest
            }
            SectionCode::Data => {
                let (rest, _) = decode_data_section(contents, &mut module.store_decl)?;
                rest
            }
        };

        if !rest.is_empty() {
            return Err(DecodeError::SectionSizeMismatch {
                section: code,
                unread: rest.len(),
            });
        }
        Ok(())
    }

    fn finalize(self) -> Result<Module, DecodeError> {
        let mut module = self.module;
        let declared = module.functions.len();
        if self.bodies != declared {
            return Err(DecodeError::FunctionBodyCountMismatch {
                declared,
                bodies: self.bodies,
            });
        }

        for (idx, function) in module.functions.iter_mut().enumerate() {
            function.expand(idx, &module.types)?;
        }

        Ok(module)
    }
}

fn decode_header(input: &[u8]) -> Result<&[u8], LoadError> {
    let magic: Decoded<&[u8]> = tag(MAGIC)(input);
    let Ok((input, _)) = magic else {
        return Err(LoadError::NotAModule("bad magic"));
    };
    let version: Decoded<&[u8]> = tag(VERSION)(input);
    let Ok((input, _)) = version else {
        return Err(LoadError::NotAModule("unsupported version"));
    };
    Ok(input)
}

fn decode_section(input: &[u8]) -> Decoded<'_, (SectionCode, &[u8])> {
    let (input, (id, size)) = pair(le_u8, leb128_u32)(input)?;
    let Some(code) = SectionCode::from_u8(id) else {
        return fail(DecodeError::UnknownSection(id));
    };
    let (input, contents) = take(size)(input)?;
    Ok((input, (code, contents)))
}

fn decode_value_type(input: &[u8]) -> Decoded<'_, ValueType> {
    let (input, byte) = le_u8(input)?;
    match ValueType::from_u8(byte) {
        Some(value_type) => Ok((input, value_type)),
        None => fail(DecodeError::UnknownValueType(byte)),
    }
}

fn decode_value_types(input: &[u8]) -> Decoded<'_, Vec<ValueType>> {
    let (mut input, count) = leb128_u32(input)?;
    let mut types = vec![];
    for _ in 0..count {
        let (rest, value_type) = decode_value_type(input)?;
        types.push(value_type);
        input = rest;
    }
    Ok((input, types))
}

fn decode_type_section(input: &[u8]) -> Decoded<'_, Vec<FuncType>> {
    let mut func_types: Vec<FuncType> = vec![];

    let (mut input, count) = leb128_u32(input)?;

    for _ in 0..count {
        let (rest, form) = le_u8(input)?;
        if form != FUNC_TYPE_TAG {
            return fail(DecodeError::UnsupportedTypeForm(form));
        }
        let (rest, params) = decode_value_types(rest)?;
        let (rest, results) = decode_value_types(rest)?;
        func_types.push(FuncType::new(params, results));
        input = rest;
    }

    Ok((input, func_types))
}

fn decode_external_kind(input: &[u8]) -> Decoded<'_, ExternalKind> {
    let (input, kind) = le_u8(input)?;
    match ExternalKind::from_u8(kind) {
        Some(kind) => Ok((input, kind)),
        None => fail(DecodeError::UnknownExternalKind(kind)),
    }
}

fn decode_limits<'a>(input: &'a [u8], context: &'static str) -> Decoded<'a, (u32, Option<u32>)> {
    let (input, (flags, min)) = pair(leb128_u32, leb128_u32)(input)?;
    if flags & !FLAG_HAS_MAX != 0 {
        return fail(DecodeError::UnsupportedFlags { context, flags });
    }
    if flags & FLAG_HAS_MAX == 0 {
        return Ok((input, (min, None)));
    }
    let (input, max) = leb128_u32(input)?;
    Ok((input, (min, Some(max))))
}

fn decode_global_type<'a>(input: &'a [u8], context: &'static str) -> Decoded<'a, GlobalType> {
    let (input, ty) = decode_value_type(input)?;
    let (input, flags) = leb128_u32(input)?;
    if flags & !FLAG_MUTABLE != 0 {
        return fail(DecodeError::UnsupportedFlags { context, flags });
    }
    Ok((
        input,
        GlobalType {
            ty,
            mutable: flags & FLAG_MUTABLE != 0,
        },
    ))
}

fn decode_import_section<'a>(input: &'a [u8], module: &mut Module) -> Decoded<'a, ()> {
    let (mut input, count) = leb128_u32(input)?;

    for _ in 0..count {
        let (rest, module_name) = decode_name(input)?;
        let (rest, field) = decode_name(rest)?;
        let (rest, kind) = decode_external_kind(rest)?;
        trace!("import {}.{} ({:?})", module_name, field, kind);

        let store = &mut module.store_decl;
        let (rest, added) = match kind {
            ExternalKind::Func => {
                let (rest, type_idx) = leb128_u32(rest)?;
                let Some(func_type) = module.types.get(type_idx as usize) else {
                    return fail(DecodeError::TypeIndexOutOfRange(type_idx));
                };
                let added =
                    store.add_function_imp(module_name, field, type_idx, func_type.clone());
                (rest, added)
            }
            ExternalKind::Table => {
                let (rest, elem_type) = decode_value_type(rest)?;
                let (rest, (min, max)) = decode_limits(rest, "imported table")?;
                (
                    rest,
                    store.add_table_imp(module_name, field, elem_type, min, max),
                )
            }
            ExternalKind::Memory => {
                let (rest, (min, max)) = decode_limits(rest, "imported memory")?;
                (rest, store.add_memory_imp(module_name, field, min, max))
            }
            ExternalKind::Global => {
                let (rest, global_type) = decode_global_type(rest, "imported global")?;
                (
                    rest,
                    store.add_global_imp(module_name, field, global_type.ty, global_type.mutable),
                )
            }
        };
        added.map_err(nom::Err::Failure)?;

        input = rest;
    }

    Ok((input, ()))
}

fn decode_function_section(input: &[u8]) -> Decoded<'_, Vec<u32>> {
    let mut func_idx_list = vec![];
    let (mut input, count) = leb128_u32(input)?;

    for _ in 0..count {
        let (rest, idx) = leb128_u32(input)?;
        func_idx_list.push(idx);
        input = rest;
    }

    Ok((input, func_idx_list))
}

fn decode_table_section<'a>(input: &'a [u8], store: &mut StoreDeclarations) -> Decoded<'a, ()> {
    let (mut input, count) = leb128_u32(input)?;

    for _ in 0..count {
        let (rest, elem_type) = decode_value_type(input)?;
        let (rest, (min, max)) = decode_limits(rest, "table section")?;
        store.add_table_loc(elem_type, min, max);
        input = rest;
    }

    Ok((input, ()))
}

fn decode_memory_section<'a>(input: &'a [u8], store: &mut StoreDeclarations) -> Decoded<'a, ()> {
    let (mut input, count) = leb128_u32(input)?;

    for _ in 0..count {
        let (rest, (min, max)) = decode_limits(input, "memory section")?;
        store.add_memory_loc(min, max);
        input = rest;
    }

    Ok((input, ()))
}

/// A global initializer: exactly one `*.const` of the global's own type,
/// followed by `end`.
fn decode_global_init(input: &[u8], ty: ValueType) -> Decoded<'_, Value> {
    let op = match ty {
        ValueType::I32 => Opcode::I32Const,
        ValueType::I64 => Opcode::I64Const,
        ValueType::F32 => Opcode::F32Const,
        ValueType::F64 => Opcode::F64Const,
        ValueType::FuncRef => return fail(DecodeError::UnsupportedInitializer(ty)),
    };
    let (input, _) = expect_byte(input, op as u8)?;
    let (input, inst) = decode_const_immediate(input, op)?;
    let (input, _) = expect_byte(input, Opcode::End as u8)?;
    match inst.value() {
        Some(value) => Ok((input, value)),
        None => fail(DecodeError::UnsupportedInitializer(ty)),
    }
}

fn decode_global_section<'a>(input: &'a [u8], store: &mut StoreDeclarations) -> Decoded<'a, ()> {
    let (mut input, count) = leb128_u32(input)?;

    for _ in 0..count {
        let (rest, global_type) = decode_global_type(input, "global section")?;
        let (rest, value) = decode_global_init(rest, global_type.ty)?;
        trace!("global {:?} (mutable: {})", value, global_type.mutable);
        store.add_global_loc(value, global_type.mutable);
        input = rest;
    }

    Ok((input, ()))
}

fn decode_export_section(input: &[u8]) -> Decoded<'_, Vec<Export>> {
    let (mut input, count) = leb128_u32(input)?;
    let mut exports = vec![];

    for _ in 0..count {
        let (rest, name) = decode_name(input)?;
        let (rest, kind) = decode_external_kind(rest)?;
        let (rest, idx) = leb128_u32(rest)?;
        exports.push(Export {
            name,
            desc: ExportDesc::new(kind, idx),
        });
        input = rest;
    }

    Ok((input, exports))
}

fn decode_start_section(input: &[u8]) -> Decoded<'_, u32> {
    leb128_u32(input)
}

fn decode_elements(input: &[u8], elem_type: ValueType, count: u32) -> Decoded<'_, Vec<u8>> {
    let mut data = Vec::with_capacity(count as usize * elem_type.size() as usize);
    let mut input = input;

    for _ in 0..count {
        let rest = match elem_type {
            ValueType::FuncRef => {
                let (rest, idx) = leb128_u32(input)?;
                data.extend_from_slice(&idx.to_le_bytes());
                rest
            }
            ValueType::I32 => {
                let (rest, value) = leb128_i32(input)?;
                data.extend_from_slice(&value.to_le_bytes());
                rest
            }
            ValueType::I64 => {
                let (rest, value) = leb128_i64(input)?;
                data.extend_from_slice(&value.to_le_bytes());
                rest
            }
            ValueType::F32 => {
                let (rest, value) = le_f32(input)?;
                data.extend_from_slice(&value.to_le_bytes());
                rest
            }
            ValueType::F64 => {
                let (rest, value) = le_f64(input)?;
                data.extend_from_slice(&value.to_le_bytes());
                rest
            }
        };
        input = rest;
    }

    Ok((input, data))
}

fn decode_element_section<'a>(input: &'a [u8], store: &mut StoreDeclarations) -> Decoded<'a, ()> {
    let (mut input, count) = leb128_u32(input)?;
    if count == 0 {
        return Ok((input, ()));
    }

    let Some(elem_type) = store.table(0).map(|table| table.elem_type) else {
        return fail(DecodeError::MissingTable);
    };

    for _ in 0..count {
        let (rest, flags) = leb128_u32(input)?;
        if flags != 0 {
            return fail(DecodeError::UnsupportedFlags {
                context: "element segment",
                flags,
            });
        }
        let (rest, offset) = decode_const_expr(rest)?;
        let (rest, elem_count) = leb128_u32(rest)?;
        // every element takes at least one byte
        if elem_count as usize > rest.len() {
            return fail(DecodeError::UnexpectedEof);
        }
        let (rest, data) = decode_elements(rest, elem_type, elem_count)?;
        trace!("element segment of {} entries", elem_count);

        if let Some(table) = store.table_mut(0) {
            table.segments.push(DefSegment { offset, data });
        }
        input = rest;
    }

    Ok((input, ()))
}

fn decode_locals(input: &[u8], func_idx: usize) -> Decoded<'_, Vec<FunctionLocal>> {
    let mut locals = vec![];
    let mut total = 0usize;

    let (mut input, count) = leb128_u32(input)?;

    for _ in 0..count {
        let (rest, type_count) = leb128_u32(input)?;
        let (rest, value_type) = decode_value_type(rest)?;
        total = total.saturating_add(type_count as usize);
        if total > MAX_LOCALS {
            return fail(DecodeError::TooManyLocals(func_idx));
        }
        locals.push(FunctionLocal {
            type_count,
            value_type,
        });
        input = rest;
    }

    Ok((input, locals))
}

/// First pass over function bodies: locals and raw instruction bytes. The
/// i-th body belongs to the i-th Function section entry.
fn decode_code_section<'a>(input: &'a [u8], module: &mut Module) -> Decoded<'a, usize> {
    let (mut input, count) = leb128_u32(input)?;
    let declared = module.functions.len();
    if count as usize != declared {
        return fail(DecodeError::FunctionBodyCountMismatch {
            declared,
            bodies: count as usize,
        });
    }

    for func_idx in 0..declared {
        let (rest, size) = leb128_u32(input)?;
        let (rest, body) = take(size)(rest)?;
        let (expression, locals) = decode_locals(body, func_idx)?;

        let function = &mut module.functions[func_idx];
        function.set_locals(&locals);
        function.expression = expression.to_vec();

        input = rest;
    }

    Ok((input, declared))
}

fn decode_data_section<'a>(input: &'a [u8], store: &mut StoreDeclarations) -> Decoded<'a, ()> {
    let (mut input, count) = leb128_u32(input)?;
    if count == 0 {
        return Ok((input, ()));
    }

    let Some(memory) = store.memory_mut(0) else {
        return fail(DecodeError::MissingMemory);
    };

    for _ in 0..count {
        let (rest, flags) = leb128_u32(input)?;
        if flags != 0 {
            return fail(DecodeError::UnsupportedFlags {
                context: "data segment",
                flags,
            });
        }
        let (rest, offset) = decode_const_expr(rest)?;
        let (rest, size) = leb128_u32(rest)?;
        let (rest, init) = take(size)(rest)?;
        trace!("data segment of {} bytes", size);
        memory.add_default(DefSegment {
            offset,
            data: init.to_vec(),
        });
        input = rest;
    }

    Ok((input, ()))
}

fn decode_name(input: &[u8]) -> Decoded<'_, String> {
    let (input, size) = leb128_u32(input)?;
    let (input, name) = take(size)(input)?;
    match String::from_utf8(name.to_vec()) {
        Ok(name) => Ok((input, name)),
        Err(_) => fail(DecodeError::InvalidUtf8),
    }
}
