// C4: Array subsystem — 1-D/N-D storage, flat-index math, literal
// parsing, slicing, copy, bounds (spec §4.4).
//
// Storage itself (`ArrayValue`: a flat row-major `Vec<Value>` plus a
// dimension vector) lives in `value.rs` alongside `Value`; this module
// owns the operations performed on it.

use crate::ast::{ArrayLitElem, Expr, Node, TypeTag};
use crate::diagnostics::CbError;
use crate::value::{ArrayValue, Value};

pub type Result<T> = std::result::Result<T, CbError>;

fn check_bounds(dims: &[usize], indices: &[i64]) -> Result<()> {
    for (dim_no, (&i, &d)) in indices.iter().zip(dims.iter()).enumerate() {
        if i < 0 || (i as usize) >= d {
            return Err(CbError::ArrayOutOfBounds {
                index: i,
                dim: dim_no,
                size: d,
            });
        }
    }
    Ok(())
}

pub fn get(arr: &ArrayValue, indices: &[i64]) -> Result<Value> {
    check_bounds(&arr.dims, indices)?;
    let idx: Vec<usize> = indices.iter().map(|&i| i as usize).collect();
    Ok(arr.data[arr.flat_index(&idx)].clone())
}

pub fn set(arr: &mut ArrayValue, indices: &[i64], value: Value) -> Result<()> {
    check_bounds(&arr.dims, indices)?;
    let idx: Vec<usize> = indices.iter().map(|&i| i as usize).collect();
    let flat = arr.flat_index(&idx);
    arr.data[flat] = value;
    Ok(())
}

/// Assigning `T[d_{k+1}]...[d_{n-1}] x = a[i_0]...[i_k]` with `k < n-1`
/// copies the sub-cuboid at the fixed leading indices (spec §4.4
/// Slicing).
pub fn slice(arr: &ArrayValue, leading: &[i64]) -> Result<ArrayValue> {
    if leading.len() >= arr.dims.len() {
        return Err(CbError::ArrayShapeMismatch(
            "slice leaves no free dimension".to_string(),
        ));
    }
    check_bounds(&arr.dims[..leading.len()], leading)?;
    let remaining_dims: Vec<usize> = arr.dims[leading.len()..].to_vec();
    let remaining_len: usize = remaining_dims.iter().product();
    let mut padded: Vec<usize> = leading.iter().map(|&i| i as usize).collect();
    padded.extend(std::iter::repeat(0).take(remaining_dims.len()));
    let start = arr.flat_index(&padded);
    let data = arr.data[start..start + remaining_len].to_vec();
    Ok(ArrayValue {
        base_type: arr.base_type,
        dims: remaining_dims,
        data,
    })
}

/// Depth-first walk of an array literal against declared dimensions
/// (spec §4.4 Literal assignment). `eval_leaf` evaluates a leaf
/// expression to a `Value`; kept generic over the caller's evaluator so
/// this module never depends on `eval`.
pub fn build_from_literal(
    elem: &ArrayLitElem,
    dims: &[usize],
    eval_leaf: &mut dyn FnMut(&Node<Expr>) -> Result<Value>,
) -> Result<Vec<Value>> {
    if dims.is_empty() {
        return match elem {
            ArrayLitElem::Leaf(e) => Ok(vec![eval_leaf(e)?]),
            ArrayLitElem::Nested(_) => Err(CbError::ArrayShapeMismatch(
                "literal is more deeply nested than the declared shape".to_string(),
            )),
        };
    }
    match elem {
        ArrayLitElem::Nested(items) => {
            if items.len() != dims[0] {
                return Err(CbError::ArrayShapeMismatch(format!(
                    "expected {} elements at this nesting level, found {}",
                    dims[0],
                    items.len()
                )));
            }
            let mut out = Vec::with_capacity(items.len() * dims[1..].iter().product::<usize>().max(1));
            for item in items {
                out.extend(build_from_literal(item, &dims[1..], eval_leaf)?);
            }
            Ok(out)
        }
        ArrayLitElem::Leaf(_) => Err(CbError::ArrayShapeMismatch(
            "literal is less deeply nested than the declared shape".to_string(),
        )),
    }
}

/// Packages array storage into the 3-D canonical form used for function
/// returns (spec §4.4 Return from function): depth always 3, folding
/// any dimensions beyond the first two into the outer axis, and padding
/// with size-1 outer axes for lower-rank arrays.
pub fn to_canonical_3d(arr: &ArrayValue) -> Vec<Vec<Vec<Value>>> {
    let dims = &arr.dims;
    let n = dims.len();
    let (d0, d1, d2) = match n {
        0 => (1, 1, 1),
        1 => (1, 1, dims[0]),
        2 => (1, dims[0], dims[1]),
        _ => {
            let d2 = dims[n - 1];
            let d1 = dims[n - 2];
            let d0: usize = dims[..n - 2].iter().product();
            (d0, d1, d2)
        }
    };
    let mut out = Vec::with_capacity(d0);
    let mut idx = 0usize;
    for _ in 0..d0 {
        let mut plane = Vec::with_capacity(d1);
        for _ in 0..d1 {
            let mut row = Vec::with_capacity(d2);
            for _ in 0..d2 {
                row.push(arr.data[idx].clone());
                idx += 1;
            }
            plane.push(row);
        }
        out.push(plane);
    }
    out
}

/// Reshapes a 3-D canonical return value into the receiver's declared
/// shape. A length mismatch is `DynamicArrayNotSupported`, matching
/// spec §4.4's named failure mode for "declared shape doesn't match
/// returned data".
pub fn reshape_from_return(
    canonical: &[Vec<Vec<Value>>],
    declared_dims: &[usize],
    base_type: TypeTag,
) -> Result<ArrayValue> {
    let mut flat = Vec::new();
    for plane in canonical {
        for row in plane {
            for v in row {
                flat.push(v.clone());
            }
        }
    }
    let expected: usize = declared_dims.iter().product();
    if flat.len() != expected {
        return Err(CbError::DynamicArrayNotSupported(format!(
            "returned array has {} element(s), declared shape expects {}",
            flat.len(),
            expected
        )));
    }
    Ok(ArrayValue {
        base_type,
        dims: declared_dims.to_vec(),
        data: flat,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arr2x3() -> ArrayValue {
        ArrayValue {
            base_type: TypeTag::Int,
            dims: vec![2, 3],
            data: (1..=6).map(Value::Int).collect(),
        }
    }

    #[test]
    fn flat_index_is_row_major() {
        let a = arr2x3();
        assert_eq!(get(&a, &[0, 0]).unwrap(), Value::Int(1));
        assert_eq!(get(&a, &[1, 2]).unwrap(), Value::Int(6));
        assert_eq!(get(&a, &[0, 1]).unwrap(), Value::Int(2));
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let a = arr2x3();
        assert!(matches!(get(&a, &[2, 0]), Err(CbError::ArrayOutOfBounds { .. })));
        assert!(matches!(get(&a, &[0, 3]), Err(CbError::ArrayOutOfBounds { .. })));
    }

    #[test]
    fn slice_copies_the_free_row() {
        let a = arr2x3();
        let s = slice(&a, &[1]).unwrap();
        assert_eq!(s.dims, vec![3]);
        assert_eq!(s.data, vec![Value::Int(4), Value::Int(5), Value::Int(6)]);
    }

    #[test]
    fn round_trip_through_canonical_3d() {
        let a = arr2x3();
        let canonical = to_canonical_3d(&a);
        let back = reshape_from_return(&canonical, &[2, 3], TypeTag::Int).unwrap();
        assert_eq!(back, a);
    }
}
