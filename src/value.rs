// C1: Value & Type model.
//
// `Value` and `Variable` derive `Clone, Debug, PartialEq` the way the
// teacher's `vm::Value` does. Arithmetic is factored with the same
// `operator!`-style macro the teacher uses in `vm.rs` to avoid repeating
// the match-or-type-error boilerplate for every operator, adapted to
// return `Result<Value, CbError>` instead of `vm::Result`.
//
// Variable flags are an `enumflags2::BitFlags` set, the same crate and
// pattern the teacher reaches for when a type needs a small set of
// orthogonal booleans (`vm::TypeTag` in `test_unary`/`test_binary`).

use crate::ast::TypeTag;
use crate::diagnostics::CbError;
use enumflags2::BitFlags;
use std::collections::HashMap;

pub type Result<T> = std::result::Result<T, CbError>;

#[derive(BitFlags, Copy, Clone, Debug, PartialEq)]
#[repr(u16)]
pub enum VarFlag {
    Const = 0b0000000001,
    Assigned = 0b0000000010,
    Array = 0b0000000100,
    Multidimensional = 0b0000001000,
    Struct = 0b0000010000,
    Reference = 0b0000100000,
    Pointer = 0b0001000000,
    Unsigned = 0b0010000000,
    PrivateMember = 0b0100000000,
    Static = 0b1000000000,
}

pub type VarFlags = BitFlags<VarFlag>;

/// N-dimensional array storage: a flat, row-major `Vec<Value>` plus the
/// dimension vector (spec §4.4). `dims.len() == 1` is the 1-D case;
/// there is no separate representation for it.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayValue {
    pub base_type: TypeTag,
    pub dims: Vec<usize>,
    pub data: Vec<Value>,
}

impl ArrayValue {
    pub fn flat_len(&self) -> usize {
        self.dims.iter().product()
    }

    /// Row-major flat index: `flat = i_{n-1} + d_{n-1}*(i_{n-2} + d_{n-2}*(... + d_1*i_0))`
    /// (spec §4.4, last dimension varies fastest).
    pub fn flat_index(&self, indices: &[usize]) -> usize {
        let mut flat = 0usize;
        for (dim, idx) in self.dims.iter().zip(indices.iter()) {
            flat = flat * dim + idx;
        }
        flat
    }
}

/// A struct value: an ordered mapping from member name to child
/// `Variable`, preserving declaration order (spec §3.2).
#[derive(Clone, Debug, PartialEq)]
pub struct StructValue {
    pub type_name: String,
    pub members: Vec<(String, Variable)>,
}

impl StructValue {
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.members.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.members.iter_mut().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// A borrow of a struct value through an interface. Mutations made
/// through an interface-typed `self` are flushed back into the original
/// variable's slot by the call-site dispatcher (spec §4.5) — this type
/// carries a snapshot, not a live alias, so the flush is an explicit
/// write rather than shared mutable state.
#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceValue {
    pub interface_name: String,
    pub inner: Box<StructValue>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Array(ArrayValue),
    Struct(StructValue),
    Interface(InterfaceValue),
    Enum(i64, String),
    Null,
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Int(_) => TypeTag::Int,
            Value::Float(_) => TypeTag::Double,
            Value::Bool(_) => TypeTag::Bool,
            Value::Str(_) => TypeTag::String,
            Value::Array(_) => TypeTag::Unknown,
            Value::Struct(_) => TypeTag::Struct,
            Value::Interface(_) => TypeTag::Interface,
            Value::Enum(_, _) => TypeTag::Enum,
            Value::Null => TypeTag::Void,
        }
    }

    pub fn zero_for(tag: TypeTag) -> Value {
        match tag {
            TypeTag::Float | TypeTag::Double | TypeTag::Quad => Value::Float(0.0),
            TypeTag::Bool => Value::Bool(false),
            TypeTag::String => Value::Str(String::new()),
            TypeTag::Char => Value::Int(0),
            _ => Value::Int(0),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Bool(b) => Ok(if *b { 1 } else { 0 }),
            Value::Enum(v, _) => Ok(*v),
            Value::Float(f) => Ok(*f as i64),
            v => Err(CbError::TypeMismatch(format!("expected integer, got {:?}", v))),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            v => Err(CbError::TypeMismatch(format!("expected number, got {:?}", v))),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(v) => Ok(*v != 0),
            Value::Float(v) => Ok(*v != 0.0),
            v => Err(CbError::TypeMismatch(format!("expected bool, got {:?}", v))),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::Enum(_, _))
    }

    fn is_float_value(&self) -> bool {
        matches!(self, Value::Float(_))
    }
}

fn type_mismatch(a: &Value, b: &Value) -> CbError {
    CbError::TypeMismatch(format!("incompatible operands: {:?} and {:?}", a, b))
}

/// Factors out the boilerplate of widen-then-dispatch for every binary
/// arithmetic/relational operator, the same way the teacher's
/// `operator!` macro does for `vm::Value`.
macro_rules! arith_op {
    ($name:ident, $int_op:expr, $float_op:expr) => {
        pub fn $name(&self, other: &Value) -> Result<Value> {
            if !self.is_numeric() || !other.is_numeric() {
                return Err(type_mismatch(self, other));
            }
            if self.is_float_value() || other.is_float_value() {
                let a = self.as_f64()?;
                let b = other.as_f64()?;
                Ok(Value::Float($float_op(a, b)))
            } else {
                let a = self.as_i64()?;
                let b = other.as_i64()?;
                Ok(Value::Int($int_op(a, b)))
            }
        }
    };
}

macro_rules! cmp_op {
    ($name:ident, $int_op:expr, $float_op:expr) => {
        pub fn $name(&self, other: &Value) -> Result<Value> {
            if !self.is_numeric() || !other.is_numeric() {
                return Err(type_mismatch(self, other));
            }
            if self.is_float_value() || other.is_float_value() {
                let a = self.as_f64()?;
                let b = other.as_f64()?;
                Ok(Value::Bool($float_op(&a, &b)))
            } else {
                let a = self.as_i64()?;
                let b = other.as_i64()?;
                Ok(Value::Bool($int_op(&a, &b)))
            }
        }
    };
}

impl Value {
    arith_op!(add, |a: i64, b: i64| a.wrapping_add(b), |a: f64, b: f64| a + b);
    arith_op!(sub, |a: i64, b: i64| a.wrapping_sub(b), |a: f64, b: f64| a - b);
    arith_op!(mul, |a: i64, b: i64| a.wrapping_mul(b), |a: f64, b: f64| a * b);

    pub fn div(&self, other: &Value) -> Result<Value> {
        if self.is_float_value() || other.is_float_value() {
            let a = self.as_f64()?;
            let b = other.as_f64()?;
            if b == 0.0 {
                return Err(CbError::DivisionByZero);
            }
            Ok(Value::Float(a / b))
        } else {
            let a = self.as_i64()?;
            let b = other.as_i64()?;
            if b == 0 {
                return Err(CbError::DivisionByZero);
            }
            Ok(Value::Int(a / b))
        }
    }

    pub fn modulo(&self, other: &Value) -> Result<Value> {
        if self.is_float_value() || other.is_float_value() {
            let a = self.as_f64()?;
            let b = other.as_f64()?;
            if b == 0.0 {
                return Err(CbError::DivisionByZero);
            }
            Ok(Value::Float(a % b))
        } else {
            let a = self.as_i64()?;
            let b = other.as_i64()?;
            if b == 0 {
                return Err(CbError::DivisionByZero);
            }
            Ok(Value::Int(a % b))
        }
    }

    cmp_op!(lt, |a: &i64, b: &i64| a < b, |a: &f64, b: &f64| a < b);
    cmp_op!(gt, |a: &i64, b: &i64| a > b, |a: &f64, b: &f64| a > b);
    cmp_op!(lte, |a: &i64, b: &i64| a <= b, |a: &f64, b: &f64| a <= b);
    cmp_op!(gte, |a: &i64, b: &i64| a >= b, |a: &f64, b: &f64| a >= b);

    pub fn eq_value(&self, other: &Value) -> Result<Value> {
        let result = match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (a, b) if a.is_numeric() && b.is_numeric() => {
                if a.is_float_value() || b.is_float_value() {
                    a.as_f64()? == b.as_f64()?
                } else {
                    a.as_i64()? == b.as_i64()?
                }
            }
            (a, b) => a == b,
        };
        Ok(Value::Bool(result))
    }

    pub fn ne_value(&self, other: &Value) -> Result<Value> {
        match self.eq_value(other)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            _ => unreachable!(),
        }
    }

    pub fn bitand(&self, other: &Value) -> Result<Value> {
        Ok(Value::Int(self.as_i64()? & other.as_i64()?))
    }

    pub fn bitor(&self, other: &Value) -> Result<Value> {
        Ok(Value::Int(self.as_i64()? | other.as_i64()?))
    }

    pub fn bitxor(&self, other: &Value) -> Result<Value> {
        Ok(Value::Int(self.as_i64()? ^ other.as_i64()?))
    }

    pub fn shl(&self, other: &Value) -> Result<Value> {
        Ok(Value::Int(self.as_i64()? << other.as_i64()?))
    }

    pub fn shr(&self, other: &Value) -> Result<Value> {
        Ok(Value::Int(self.as_i64()? >> other.as_i64()?))
    }

    pub fn neg(&self) -> Result<Value> {
        match self {
            Value::Int(v) => Ok(Value::Int(-*v)),
            Value::Float(v) => Ok(Value::Float(-*v)),
            v => Err(CbError::TypeMismatch(format!("cannot negate {:?}", v))),
        }
    }

    pub fn not(&self) -> Result<Value> {
        Ok(Value::Bool(!self.as_bool()?))
    }

    pub fn bitnot(&self) -> Result<Value> {
        Ok(Value::Int(!self.as_i64()?))
    }
}

/// Signed inclusive ranges for the sized integer types (spec §3.1
/// table). `bool` has no range — it's normalized separately.
pub fn signed_range(tag: TypeTag) -> Option<(i64, i64)> {
    match tag {
        TypeTag::Tiny => Some((-128, 127)),
        TypeTag::Short => Some((-32768, 32767)),
        TypeTag::Int => Some((i32::MIN as i64, i32::MAX as i64)),
        TypeTag::Long => Some((i64::MIN, i64::MAX)),
        TypeTag::Char => Some((0, 0x10FFFF)),
        _ => None,
    }
}

pub fn unsigned_range(tag: TypeTag) -> Option<(i64, u64)> {
    match tag {
        TypeTag::Tiny => Some((0, 255)),
        TypeTag::Short => Some((0, 65535)),
        TypeTag::Int => Some((0, u32::MAX as u64)),
        TypeTag::Long => Some((0, u64::MAX)),
        _ => None,
    }
}

/// `range_check(tag, value, unsigned)` from spec §4.1. Returns the
/// (possibly clamped) value plus an optional warning message — a
/// negative value assigned to an unsigned target is clamped to 0 with a
/// warning rather than failing (spec §3.1/§8.1 property 2).
pub fn range_check(tag: TypeTag, value: i64, unsigned: bool) -> Result<(i64, Option<String>)> {
    if tag == TypeTag::Bool {
        return Ok(((value != 0) as i64, None));
    }
    if unsigned {
        if let Some((lo, hi)) = unsigned_range(tag) {
            if value < 0 {
                return Ok((0, Some(format!(
                    "negative value {} clamped to 0 for unsigned {}",
                    value,
                    tag.name()
                ))));
            }
            if (value as u64) > hi || value < lo {
                return Err(CbError::TypeRangeError {
                    type_name: format!("unsigned {}", tag.name()),
                    value: value.to_string(),
                });
            }
            return Ok((value, None));
        }
    }
    if let Some((lo, hi)) = signed_range(tag) {
        if value < lo || value > hi {
            return Err(CbError::TypeRangeError {
                type_name: tag.name().to_string(),
                value: value.to_string(),
            });
        }
    }
    Ok((value, None))
}

/// `coerce_to(tag, value)` from spec §4.1: integer widening is allowed,
/// narrowing requires the value to fit, and string<->numeric never
/// coerces implicitly.
pub fn coerce_to(tag: TypeTag, value: &Value, unsigned: bool) -> Result<Value> {
    match (tag, value) {
        (TypeTag::String, Value::Str(_)) => Ok(value.clone()),
        (TypeTag::String, _) => Err(CbError::TypeMismatch(
            "cannot coerce non-string to string".to_string(),
        )),
        (_, Value::Str(_)) if tag != TypeTag::String => Err(CbError::TypeMismatch(
            "cannot coerce string to numeric type".to_string(),
        )),
        (TypeTag::Float, _) | (TypeTag::Double, _) | (TypeTag::Quad, _) => Ok(Value::Float(value.as_f64()?)),
        (TypeTag::Bool, _) => Ok(Value::Bool(value.as_bool()?)),
        (t, _) if t.is_integer() => {
            let raw = value.as_i64()?;
            let (checked, _) = range_check(t, raw, unsigned)?;
            Ok(Value::Int(checked))
        }
        _ => Ok(value.clone()),
    }
}

/// A typed value: the pairing every branch of the expression evaluator
/// (C6) returns, so assignment sites can range-check/unsigned-clamp
/// without re-inspecting the AST (spec §4.6).
#[derive(Clone, Debug, PartialEq)]
pub struct TypedValue {
    pub value: Value,
    pub type_tag: TypeTag,
    pub is_unsigned: bool,
    pub struct_name: Option<String>,
}

impl TypedValue {
    pub fn new(value: Value, type_tag: TypeTag) -> TypedValue {
        TypedValue {
            value,
            type_tag,
            is_unsigned: false,
            struct_name: None,
        }
    }

    pub fn unsigned(mut self, u: bool) -> TypedValue {
        self.is_unsigned = u;
        self
    }

    pub fn with_struct_name(mut self, name: Option<String>) -> TypedValue {
        self.struct_name = name;
        self
    }
}

/// A single named slot's full state (spec §3.3).
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub type_tag: TypeTag,
    pub value: Value,
    pub flags: VarFlags,
    pub dims: Vec<usize>,
    pub struct_type: Option<String>,
    pub interface_name: Option<String>,
}

impl Variable {
    pub fn new(type_tag: TypeTag, value: Value) -> Variable {
        Variable {
            type_tag,
            value,
            flags: VarFlags::empty(),
            dims: Vec::new(),
            struct_type: None,
            interface_name: None,
        }
    }

    pub fn with_flag(mut self, flag: VarFlag, on: bool) -> Variable {
        if on {
            self.flags.insert(flag);
        } else {
            self.flags.remove(flag);
        }
        self
    }

    pub fn is_const(&self) -> bool {
        self.flags.contains(VarFlag::Const)
    }

    pub fn is_assigned(&self) -> bool {
        self.flags.contains(VarFlag::Assigned)
    }

    pub fn is_array(&self) -> bool {
        self.flags.contains(VarFlag::Array)
    }

    pub fn is_struct(&self) -> bool {
        self.flags.contains(VarFlag::Struct)
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags.contains(VarFlag::Unsigned)
    }

    pub fn is_private(&self) -> bool {
        self.flags.contains(VarFlag::PrivateMember)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_range_rejects_out_of_range_tiny() {
        let err = range_check(TypeTag::Tiny, 128, false).unwrap_err();
        assert_eq!(
            err,
            CbError::TypeRangeError {
                type_name: "tiny".to_string(),
                value: "128".to_string(),
            }
        );
    }

    #[test]
    fn signed_range_accepts_boundary_values() {
        assert_eq!(range_check(TypeTag::Tiny, -128, false).unwrap(), (-128, None));
        assert_eq!(range_check(TypeTag::Tiny, 127, false).unwrap(), (127, None));
    }

    #[test]
    fn unsigned_negative_clamps_with_warning() {
        let (v, warn) = range_check(TypeTag::Int, -5, true).unwrap();
        assert_eq!(v, 0);
        assert!(warn.is_some());
    }

    #[test]
    fn unsigned_out_of_range_is_still_an_error() {
        let err = range_check(TypeTag::Tiny, 1000, true).unwrap_err();
        assert!(matches!(err, CbError::TypeRangeError { .. }));
    }

    #[test]
    fn bool_range_check_normalizes_to_zero_or_one() {
        assert_eq!(range_check(TypeTag::Bool, 42, false).unwrap(), (1, None));
        assert_eq!(range_check(TypeTag::Bool, 0, false).unwrap(), (0, None));
    }

    #[test]
    fn coerce_widens_int_to_float() {
        let v = coerce_to(TypeTag::Double, &Value::Int(7), false).unwrap();
        assert_eq!(v, Value::Float(7.0));
    }

    #[test]
    fn coerce_rejects_string_to_numeric() {
        let err = coerce_to(TypeTag::Int, &Value::Str("x".to_string()), false).unwrap_err();
        assert!(matches!(err, CbError::TypeMismatch(_)));
    }

    #[test]
    fn array_value_flat_index_is_row_major() {
        let av = ArrayValue {
            base_type: TypeTag::Int,
            dims: vec![2, 3],
            data: (0..6).map(Value::Int).collect(),
        };
        assert_eq!(av.flat_index(&[0, 0]), 0);
        assert_eq!(av.flat_index(&[1, 2]), 5);
        assert_eq!(av.flat_len(), 6);
    }
}

pub type VarMap = HashMap<String, Variable>;
