use super::{
    error::{DecodeError, Decoded, fail},
    opcode::Opcode,
};
use crate::execution::value::Value;
use nom::number::complete::{le_f32, le_f64, le_u8};
use nom_leb128::{leb128_i32, leb128_i64, leb128_u32};
use num_traits::FromPrimitive as _;

/// The single instruction of a constant expression, as found in global
/// initializers and segment offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstInstruction {
    I32Const(i32),
    I64Const(i64),
    F32Const(f32),
    F64Const(f64),
    GlobalGet(u32),
}

impl ConstInstruction {
    /// The constant carried by the instruction. `global.get` has none until
    /// the referenced global is resolved.
    pub fn value(&self) -> Option<Value> {
        match *self {
            ConstInstruction::I32Const(v) => Some(Value::I32(v)),
            ConstInstruction::I64Const(v) => Some(Value::I64(v)),
            ConstInstruction::F32Const(v) => Some(Value::F32(v)),
            ConstInstruction::F64Const(v) => Some(Value::F64(v)),
            ConstInstruction::GlobalGet(_) => None,
        }
    }
}

pub(crate) fn decode_const_expr(input: &[u8]) -> Decoded<'_, ConstInstruction> {
    let (input, byte) = le_u8(input)?;
    let Some(op) = Opcode::from_u8(byte) else {
        return fail(DecodeError::UnsupportedConstExpr(byte));
    };
    let (input, inst) = decode_const_immediate(input, op)?;
    let (input, _) = expect_byte(input, Opcode::End as u8)?;
    Ok((input, inst))
}

pub(crate) fn decode_const_immediate(input: &[u8], op: Opcode) -> Decoded<'_, ConstInstruction> {
    match op {
        Opcode::I32Const => {
            let (rest, value) = leb128_i32(input)?;
            Ok((rest, ConstInstruction::I32Const(value)))
        }
        Opcode::I64Const => {
            let (rest, value) = leb128_i64(input)?;
            Ok((rest, ConstInstruction::I64Const(value)))
        }
        Opcode::F32Const => {
            let (rest, value) = le_f32(input)?;
            Ok((rest, ConstInstruction::F32Const(value)))
        }
        Opcode::F64Const => {
            let (rest, value) = le_f64(input)?;
            Ok((rest, ConstInstruction::F64Const(value)))
        }
        Opcode::GlobalGet => {
            let (rest, idx) = leb128_u32(input)?;
            Ok((rest, ConstInstruction::GlobalGet(idx)))
        }
        Opcode::End => fail(DecodeError::UnsupportedConstExpr(op as u8)),
    }
}

pub(crate) fn expect_byte(input: &[u8], expected: u8) -> Decoded<'_, ()> {
    let (rest, found) = le_u8(input)?;
    if found != expected {
        return fail(DecodeError::UnexpectedByte { expected, found });
    }
    Ok((rest, ()))
}

#[cfg(test)]
mod tests {
    use super::{ConstInstruction, decode_const_expr};
    use crate::binary::error::DecodeError;
    use crate::execution::value::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_const_exprs() {
        let tests: Vec<(&[u8], ConstInstruction)> = vec![
            (&[0x41, 0x2A, 0x0B], ConstInstruction::I32Const(42)),
            (&[0x41, 0x7F, 0x0B], ConstInstruction::I32Const(-1)),
            (&[0x42, 0x80, 0x01, 0x0B], ConstInstruction::I64Const(128)),
            (
                &[0x43, 0x00, 0x00, 0xC0, 0x3F, 0x0B],
                ConstInstruction::F32Const(1.5),
            ),
            (
                &[0x44, 0, 0, 0, 0, 0, 0, 0x04, 0x40, 0x0B],
                ConstInstruction::F64Const(2.5),
            ),
            (&[0x23, 0x03, 0x0B], ConstInstruction::GlobalGet(3)),
        ];
        for (bytes, want) in tests {
            let (rest, inst) = decode_const_expr(bytes).expect("valid const expr");
            assert!(rest.is_empty());
            assert_eq!(inst, want);
        }
    }

    #[test]
    fn const_expr_requires_end() {
        let err = decode_const_expr(&[0x41, 0x01, 0x41]).unwrap_err();
        assert_eq!(
            DecodeError::from(err),
            DecodeError::UnexpectedByte {
                expected: 0x0B,
                found: 0x41
            }
        );
    }

    #[test]
    fn const_expr_rejects_other_opcodes() {
        let err = decode_const_expr(&[0x6A, 0x0B]).unwrap_err();
        assert_eq!(DecodeError::from(err), DecodeError::UnsupportedConstExpr(0x6A));
    }

    #[test]
    fn const_value() {
        assert_eq!(ConstInstruction::I32Const(4).value(), Some(Value::I32(4)));
        assert_eq!(ConstInstruction::GlobalGet(0).value(), None);
    }
}
