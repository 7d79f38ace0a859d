use num_derive::FromPrimitive;

/// Type constructor that introduces a function signature in the Type section.
pub const FUNC_TYPE_TAG: u8 = 0x60;

pub const PAGE_SIZE: u32 = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum ValueType {
    I32 = 0x7F,
    I64 = 0x7E,
    F32 = 0x7D,
    F64 = 0x7C,
    FuncRef = 0x70,
}

impl ValueType {
    /// Width in bytes of one slot of this type.
    pub fn size(self) -> u32 {
        match self {
            ValueType::I32 | ValueType::F32 | ValueType::FuncRef => 4,
            ValueType::I64 | ValueType::F64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub ty: ValueType,
    pub offset: u32,
    pub size: u32,
}

/// Packed placement of a sequence of values, in declaration order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Layout {
    pub slots: Vec<Slot>,
    pub size: u32,
}

impl Layout {
    pub fn new(types: impl IntoIterator<Item = ValueType>) -> Self {
        let mut layout = Layout::default();
        for ty in types {
            layout.push(ty);
        }
        layout
    }

    pub fn push(&mut self, ty: ValueType) {
        let size = ty.size();
        self.slots.push(Slot {
            ty,
            offset: self.size,
            size,
        });
        self.size = self.size.saturating_add(size);
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FuncType {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
    pub param_layout: Layout,
    pub result_layout: Layout,
}

impl FuncType {
    pub fn new(params: Vec<ValueType>, results: Vec<ValueType>) -> Self {
        let param_layout = Layout::new(params.iter().copied());
        let result_layout = Layout::new(results.iter().copied());
        Self {
            params,
            results,
            param_layout,
            result_layout,
        }
    }

    pub fn is_nullary(&self) -> bool {
        self.params.is_empty() && self.results.is_empty()
    }
}

/// Declared bounds of a table or memory. `elem_size` is the byte width of one
/// table element or one memory page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub elem_size: u32,
    pub min: u32,
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub ty: ValueType,
    pub mutable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum ExternalKind {
    Func = 0x00,
    Table = 0x01,
    Memory = 0x02,
    Global = 0x03,
}

#[cfg(test)]
mod tests {
    use super::{FuncType, Layout, Slot, ValueType};
    use num_traits::FromPrimitive as _;
    use pretty_assertions::assert_eq;

    #[test]
    fn value_type_tags() {
        let tests = vec![
            (0x7F, Some(ValueType::I32)),
            (0x7E, Some(ValueType::I64)),
            (0x7D, Some(ValueType::F32)),
            (0x7C, Some(ValueType::F64)),
            (0x70, Some(ValueType::FuncRef)),
            (0x60, None),
            (0x40, None),
        ];
        for (tag, want) in tests {
            assert_eq!(ValueType::from_u8(tag), want);
        }
    }

    #[test]
    fn layout_packs_slots() {
        let layout = Layout::new([ValueType::I32, ValueType::F64, ValueType::F32]);
        assert_eq!(
            layout.slots,
            vec![
                Slot {
                    ty: ValueType::I32,
                    offset: 0,
                    size: 4
                },
                Slot {
                    ty: ValueType::F64,
                    offset: 4,
                    size: 8
                },
                Slot {
                    ty: ValueType::F32,
                    offset: 12,
                    size: 4
                },
            ]
        );
        assert_eq!(layout.size, 16);
    }

    #[test]
    fn layout_size_saturates() {
        let mut layout = Layout {
            slots: vec![],
            size: u32::MAX - 2,
        };
        layout.push(ValueType::I64);
        assert_eq!(layout.slots[0].offset, u32::MAX - 2);
        assert_eq!(layout.size, u32::MAX);
    }

    #[test]
    fn func_type_computes_layouts() {
        let ty = FuncType::new(vec![ValueType::I64, ValueType::I32], vec![ValueType::F32]);
        assert_eq!(ty.param_layout.size, 12);
        assert_eq!(ty.result_layout.size, 4);
        assert!(!ty.is_nullary());
        assert!(FuncType::default().is_nullary());
    }
}
