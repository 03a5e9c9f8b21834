//! The standard instruction set.
//!
//! The numeric codes are part of the wire format of serialized byte code and
//! must never change. Opcodes below `HAVE_ARGUMENT` take no argument.

use super::error::Result;
use super::operand::FormatValue;
use super::registry::{Registry, RegistryBuilder};
use super::stack_effect::{Branch, EffectContext, StackEffect};
use super::{Oparg, EXTENDED_ARG};
use crate::vm::settings::Settings;
use lazy_static::lazy_static;

pub const READONLY_OPERATION: &str = "READONLY_OPERATION";

lazy_static! {
    /// The standard instruction set for the default machine settings
    pub static ref OPCODES: Registry = standard(Settings::default())
        .unwrap_or_else(|e| panic!("the standard opcode table is inconsistent: {}", e));
}

/// Build the standard instruction set for a machine with the given settings
pub fn standard(settings: Settings) -> Result<Registry> {
    let mut builder = Registry::builder(settings);

    define_opcodes(&mut builder)?;
    define_readonly_operations(&mut builder)?;
    define_constant_effects(&mut builder)?;
    define_computed_effects(&mut builder)?;

    Ok(builder.build())
}

fn define_opcodes(op: &mut RegistryBuilder) -> Result<()> {
    // stack manipulation
    op.define("POP_TOP", 1)?
        .define("ROT_TWO", 2)?
        .define("ROT_THREE", 3)?
        .define("DUP_TOP", 4)?
        .define("DUP_TOP_TWO", 5)?
        .define("ROT_FOUR", 6)?
        .define("NOP", 9)?;

    // unary
    op.define("UNARY_POSITIVE", 10)?
        .define("UNARY_NEGATIVE", 11)?
        .define("UNARY_NOT", 12)?
        .define("UNARY_INVERT", 15)?
        .define("BINARY_MATRIX_MULTIPLY", 16)?
        .define("INPLACE_MATRIX_MULTIPLY", 17)?;

    // binary and in-place
    op.define("BINARY_POWER", 19)?
        .define("BINARY_MULTIPLY", 20)?
        .define("BINARY_MODULO", 22)?
        .define("BINARY_ADD", 23)?
        .define("BINARY_SUBTRACT", 24)?
        .define("BINARY_SUBSCR", 25)?
        .define("BINARY_FLOOR_DIVIDE", 26)?
        .define("BINARY_TRUE_DIVIDE", 27)?
        .define("INPLACE_FLOOR_DIVIDE", 28)?
        .define("INPLACE_TRUE_DIVIDE", 29)?;

    op.define("GET_AITER", 50)?
        .define("GET_ANEXT", 51)?
        .define("BEFORE_ASYNC_WITH", 52)?
        .define("BEGIN_FINALLY", 53)?
        .define("END_ASYNC_FOR", 54)?;

    op.define("INPLACE_ADD", 55)?
        .define("INPLACE_SUBTRACT", 56)?
        .define("INPLACE_MULTIPLY", 57)?
        .define("INPLACE_MODULO", 59)?
        .define("STORE_SUBSCR", 60)?
        .define("DELETE_SUBSCR", 61)?
        .define("BINARY_LSHIFT", 62)?
        .define("BINARY_RSHIFT", 63)?
        .define("BINARY_AND", 64)?
        .define("BINARY_XOR", 65)?
        .define("BINARY_OR", 66)?
        .define("INPLACE_POWER", 67)?
        .define("GET_ITER", 68)?
        .define("GET_YIELD_FROM_ITER", 69)?
        .define("PRINT_EXPR", 70)?
        .define("LOAD_BUILD_CLASS", 71)?
        .define("YIELD_FROM", 72)?
        .define("GET_AWAITABLE", 73)?
        .define("INPLACE_LSHIFT", 75)?
        .define("INPLACE_RSHIFT", 76)?
        .define("INPLACE_AND", 77)?
        .define("INPLACE_XOR", 78)?
        .define("INPLACE_OR", 79)?;

    // blocks, exceptions and generators
    op.define("WITH_CLEANUP_START", 81)?
        .define("WITH_CLEANUP_FINISH", 82)?
        .define("RETURN_VALUE", 83)?
        .define("IMPORT_STAR", 84)?
        .define("SETUP_ANNOTATIONS", 85)?
        .define("YIELD_VALUE", 86)?
        .define("POP_BLOCK", 87)?
        .define("END_FINALLY", 88)?
        .define("POP_EXCEPT", 89)?;

    // everything from here on takes an argument
    op.define_with_name_argument("STORE_NAME", 90)?
        .define_with_name_argument("DELETE_NAME", 91)?
        .define("UNPACK_SEQUENCE", 92)?
        .define_relative_jump("FOR_ITER", 93)?
        .define("UNPACK_EX", 94)?
        .define_with_name_argument("STORE_ATTR", 95)?
        .define_with_name_argument("DELETE_ATTR", 96)?
        .define_with_name_argument("STORE_GLOBAL", 97)?
        .define_with_name_argument("DELETE_GLOBAL", 98)?
        .define_constant("LOAD_CONST", 100)?
        .define_with_name_argument("LOAD_NAME", 101)?
        .define("BUILD_TUPLE", 102)?
        .define("BUILD_LIST", 103)?
        .define("BUILD_SET", 104)?
        .define("BUILD_MAP", 105)?
        .define_with_name_argument("LOAD_ATTR", 106)?
        .define_compare("COMPARE_OP", 107)?
        .define_with_name_argument("IMPORT_NAME", 108)?
        .define_with_name_argument("IMPORT_FROM", 109)?;

    op.define_relative_jump("JUMP_FORWARD", 110)?
        .define_absolute_jump("JUMP_IF_FALSE_OR_POP", 111)?
        .define_absolute_jump("JUMP_IF_TRUE_OR_POP", 112)?
        .define_absolute_jump("JUMP_ABSOLUTE", 113)?
        .define_absolute_jump("POP_JUMP_IF_FALSE", 114)?
        .define_absolute_jump("POP_JUMP_IF_TRUE", 115)?
        .define_with_name_argument("LOAD_GLOBAL", 116)?
        .define_relative_jump("SETUP_FINALLY", 122)?;

    op.define_local("LOAD_FAST", 124)?
        .define_local("STORE_FAST", 125)?
        .define_local("DELETE_FAST", 126)?;

    op.define("RAISE_VARARGS", 130)?
        .define("CALL_FUNCTION", 131)?
        .define("MAKE_FUNCTION", 132)?
        .define("BUILD_SLICE", 133)?;

    op.define_free("LOAD_CLOSURE", 135)?
        .define_free("LOAD_DEREF", 136)?
        .define_free("STORE_DEREF", 137)?
        .define_free("DELETE_DEREF", 138)?;

    // specialization markers, their argument is a constant
    op.define_constant("FUNC_CREDENTIAL", 139)?
        .define_constant(READONLY_OPERATION, 140)?;

    op.define("CALL_FUNCTION_KW", 141)?
        .define("CALL_FUNCTION_EX", 142)?
        .define_relative_jump("SETUP_WITH", 143)?
        .define("EXTENDED_ARG", EXTENDED_ARG as u32)?
        .define("LIST_APPEND", 145)?
        .define("SET_ADD", 146)?
        .define("MAP_ADD", 147)?
        .define_free("LOAD_CLASSDEREF", 148)?;

    op.define("BUILD_LIST_UNPACK", 149)?
        .define("BUILD_MAP_UNPACK", 150)?
        .define("BUILD_MAP_UNPACK_WITH_CALL", 151)?
        .define("BUILD_TUPLE_UNPACK", 152)?
        .define("BUILD_SET_UNPACK", 153)?
        .define_relative_jump("SETUP_ASYNC_WITH", 154)?
        .define("FORMAT_VALUE", 155)?
        .define("BUILD_CONST_KEY_MAP", 156)?
        .define("BUILD_STRING", 157)?
        .define("BUILD_TUPLE_UNPACK_WITH_CALL", 158)?
        .define_with_name_argument("LOAD_METHOD", 160)?
        .define("CALL_METHOD", 161)?
        .define_relative_jump("CALL_FINALLY", 162)?
        .define("POP_FINALLY", 163)?;

    Ok(())
}

fn define_readonly_operations(op: &mut RegistryBuilder) -> Result<()> {
    let sub_operations = [
        "MAKE_FUNCTION",
        "CHECK_FUNCTION",
        "BINARY_ADD",
        "BINARY_SUBTRACT",
        "BINARY_MULTIPLY",
        "BINARY_MATRIX_MULTIPLY",
        "BINARY_TRUE_DIVIDE",
        "BINARY_FLOOR_DIVIDE",
        "BINARY_MODULO",
        "BINARY_POWER",
        "BINARY_LSHIFT",
        "BINARY_RSHIFT",
        "BINARY_OR",
        "BINARY_XOR",
        "BINARY_AND",
        "UNARY_INVERT",
        "UNARY_NEGATIVE",
        "UNARY_POSITIVE",
        "UNARY_NOT",
        "COMPARE_OP",
        "CHECK_LOAD_ATTR",
    ];

    for (selector, name) in sub_operations.iter().enumerate() {
        op.define_extended_op(READONLY_OPERATION, *name, selector as u32)?;
    }

    Ok(())
}

fn define_constant_effects(op: &mut RegistryBuilder) -> Result<()> {
    let effects: &[(&'static str, i32)] = &[
        ("NOP", 0),
        ("POP_TOP", -1),
        ("ROT_TWO", 0),
        ("ROT_THREE", 0),
        ("ROT_FOUR", 0),
        ("DUP_TOP", 1),
        ("DUP_TOP_TWO", 2),
        ("UNARY_POSITIVE", 0),
        ("UNARY_NEGATIVE", 0),
        ("UNARY_NOT", 0),
        ("UNARY_INVERT", 0),
        ("SET_ADD", -1),
        ("LIST_APPEND", -1),
        ("MAP_ADD", -2),
        ("BINARY_POWER", -1),
        ("BINARY_MULTIPLY", -1),
        ("BINARY_MATRIX_MULTIPLY", -1),
        ("BINARY_MODULO", -1),
        ("BINARY_ADD", -1),
        ("BINARY_SUBTRACT", -1),
        ("BINARY_SUBSCR", -1),
        ("BINARY_FLOOR_DIVIDE", -1),
        ("BINARY_TRUE_DIVIDE", -1),
        ("INPLACE_FLOOR_DIVIDE", -1),
        ("INPLACE_TRUE_DIVIDE", -1),
        ("INPLACE_ADD", -1),
        ("INPLACE_SUBTRACT", -1),
        ("INPLACE_MULTIPLY", -1),
        ("INPLACE_MATRIX_MULTIPLY", -1),
        ("INPLACE_MODULO", -1),
        ("STORE_SUBSCR", -3),
        ("DELETE_SUBSCR", -2),
        ("BINARY_LSHIFT", -1),
        ("BINARY_RSHIFT", -1),
        ("BINARY_AND", -1),
        ("BINARY_XOR", -1),
        ("BINARY_OR", -1),
        ("INPLACE_POWER", -1),
        ("GET_ITER", 0),
        ("PRINT_EXPR", -1),
        ("LOAD_BUILD_CLASS", 1),
        ("INPLACE_LSHIFT", -1),
        ("INPLACE_RSHIFT", -1),
        ("INPLACE_AND", -1),
        ("INPLACE_XOR", -1),
        ("INPLACE_OR", -1),
        ("RETURN_VALUE", -1),
        ("IMPORT_STAR", -1),
        ("SETUP_ANNOTATIONS", 0),
        ("YIELD_VALUE", 0),
        ("YIELD_FROM", -1),
        ("POP_BLOCK", 0),
        ("STORE_NAME", -1),
        ("DELETE_NAME", 0),
        ("STORE_ATTR", -2),
        ("DELETE_ATTR", -1),
        ("STORE_GLOBAL", -1),
        ("DELETE_GLOBAL", 0),
        ("LOAD_CONST", 1),
        ("LOAD_NAME", 1),
        ("LOAD_ATTR", 0),
        ("COMPARE_OP", -1),
        ("IMPORT_NAME", -1),
        ("IMPORT_FROM", 1),
        ("JUMP_FORWARD", 0),
        ("JUMP_ABSOLUTE", 0),
        ("POP_JUMP_IF_FALSE", -1),
        ("POP_JUMP_IF_TRUE", -1),
        ("LOAD_GLOBAL", 1),
        ("LOAD_FAST", 1),
        ("STORE_FAST", -1),
        ("DELETE_FAST", 0),
        ("LOAD_CLOSURE", 1),
        ("LOAD_DEREF", 1),
        ("LOAD_CLASSDEREF", 1),
        ("STORE_DEREF", -1),
        ("DELETE_DEREF", 0),
        ("FUNC_CREDENTIAL", 1),
        ("GET_AWAITABLE", 0),
        ("BEFORE_ASYNC_WITH", 1),
        ("GET_AITER", 0),
        ("GET_ANEXT", 1),
        ("GET_YIELD_FROM_ITER", 0),
        // line number marker of the code generator, never encoded
        ("SET_LINENO", 0),
        ("EXTENDED_ARG", 0),
        // 1 if the context manager's exit result is on top, 2 otherwise
        ("WITH_CLEANUP_START", 2),
        ("WITH_CLEANUP_FINISH", -3),
        ("LOAD_METHOD", 1),
    ];

    for (name, effect) in effects {
        op.effect(*name, StackEffect::Constant(*effect))?;
    }

    Ok(())
}

fn define_computed_effects(op: &mut RegistryBuilder) -> Result<()> {
    use StackEffect::Computed;

    // sequences and unpacking
    for name in &[
        "BUILD_TUPLE",
        "BUILD_LIST",
        "BUILD_SET",
        "BUILD_STRING",
        "BUILD_LIST_UNPACK",
        "BUILD_TUPLE_UNPACK",
        "BUILD_TUPLE_UNPACK_WITH_CALL",
        "BUILD_SET_UNPACK",
        "BUILD_MAP_UNPACK",
        "BUILD_MAP_UNPACK_WITH_CALL",
    ] {
        op.effect(*name, Computed(|arg, _, _| Ok(1 - count(arg))))?;
    }

    op.effect("BUILD_MAP", Computed(|arg, _, _| Ok(1 - 2 * count(arg))))?
        .effect("BUILD_CONST_KEY_MAP", Computed(|arg, _, _| Ok(-count(arg))))?
        .effect("UNPACK_SEQUENCE", Computed(|arg, _, _| Ok(count(arg) - 1)))?
        .effect(
            "UNPACK_EX",
            Computed(|arg, _, _| Ok(count(arg & 0xFF) + count(arg >> 8))),
        )?
        .effect(
            "BUILD_SLICE",
            Computed(|arg, _, _| Ok(if arg == 3 { -2 } else { -1 })),
        )?;

    // calls
    op.effect("RAISE_VARARGS", Computed(|arg, _, _| Ok(-count(arg))))?
        .effect("CALL_FUNCTION", Computed(|arg, _, _| Ok(-count(arg))))?
        .effect("CALL_FUNCTION_KW", Computed(|arg, _, _| Ok(-count(arg) - 1)))?
        .effect("CALL_METHOD", Computed(|arg, _, _| Ok(-count(arg) - 1)))?
        .effect(
            "CALL_FUNCTION_EX",
            Computed(|arg, _, _| Ok(-1 - flag(arg, 0x01))),
        )?
        .effect(
            "MAKE_FUNCTION",
            Computed(|arg, _, _| {
                Ok(-1 - flag(arg, 0x01) - flag(arg, 0x02) - flag(arg, 0x04) - flag(arg, 0x08))
            }),
        )?
        .effect(
            "FORMAT_VALUE",
            Computed(|arg, _, _| Ok(if FormatValue::has_spec(arg) { -1 } else { 0 })),
        )?
        .effect(READONLY_OPERATION, Computed(readonly_operation_effect))?;

    // branches
    op.effect(
        "FOR_ITER",
        Computed(|_, branch, _| Ok(if branch.is_taken() { -1 } else { 1 })),
    )?
    .effect(
        "JUMP_IF_TRUE_OR_POP",
        Computed(|_, branch, _| Ok(if branch.is_taken() { 0 } else { -1 })),
    )?
    .effect(
        "JUMP_IF_FALSE_OR_POP",
        Computed(|_, branch, _| Ok(if branch.is_taken() { 0 } else { -1 })),
    )?
    .effect(
        "CALL_FINALLY",
        Computed(|_, branch, _| Ok(if branch.is_taken() { 1 } else { 0 })),
    )?;

    // handler frames
    op.effect(
        "SETUP_WITH",
        Computed(|_, branch, ctx| {
            Ok(if branch.is_taken() {
                frame_size(ctx)
            } else {
                1
            })
        }),
    )?
    .effect(
        "SETUP_FINALLY",
        Computed(|_, branch, ctx| {
            Ok(if branch.is_taken() {
                frame_size(ctx)
            } else {
                0
            })
        }),
    )?
    .effect(
        "SETUP_ASYNC_WITH",
        Computed(|_, branch, ctx| {
            Ok(if branch.is_taken() {
                frame_size(ctx) - 1
            } else {
                0
            })
        }),
    )?
    .effect("BEGIN_FINALLY", Computed(|_, _, ctx| Ok(frame_size(ctx))))?
    .effect("END_FINALLY", Computed(|_, _, ctx| Ok(-frame_size(ctx))))?
    .effect("POP_FINALLY", Computed(|_, _, ctx| Ok(-frame_size(ctx))))?
    .effect("END_ASYNC_FOR", Computed(|_, _, ctx| Ok(-frame_size(ctx) - 1)))?
    .effect(
        "POP_EXCEPT",
        Computed(|_, _, ctx| Ok(-i64::from(ctx.settings.exception_state_size()))),
    )?;

    Ok(())
}

/// Binary and comparison sub-operations consume one operand more than they produce
fn readonly_operation_effect(arg: Oparg, _: Branch, ctx: &EffectContext<'_>) -> Result<i64> {
    let ops = ctx.registry.extended(READONLY_OPERATION)?;
    let first = Oparg::from(ops.selector("BINARY_ADD")?);
    let last = Oparg::from(ops.selector("BINARY_AND")?);
    let compare = Oparg::from(ops.selector("COMPARE_OP")?);

    if (first..=last).contains(&arg) || arg == compare {
        Ok(-1)
    } else {
        Ok(0)
    }
}

#[inline]
fn frame_size(ctx: &EffectContext<'_>) -> i64 {
    i64::from(ctx.settings.handler_frame_size())
}

#[inline]
fn count(arg: Oparg) -> i64 {
    i64::from(arg)
}

#[inline]
fn flag(arg: Oparg, mask: Oparg) -> i64 {
    if arg & mask != 0 {
        1
    } else {
        0
    }
}
