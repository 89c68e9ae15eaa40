//! Byte layout of IR types, as the 32-bit compute target lays them out.
//!
//! This is the oracle behind `ArrayStride` and member `Offset` decorations and
//! the element sizes reported in the descriptor map. The rules mirror the
//! target's data layout: scalars are size-aligned, 3-element vectors occupy
//! and align like 4-element ones, arrays stride by the aligned element size,
//! structs pack fields at their natural alignment.

use super::{Const, ConstKind, Context, Type, TypeKind};
use smallvec::SmallVec;

/// Allocation size in bytes (the stride of an element of this type).
pub fn byte_size(cx: &Context, ty: Type) -> u32 {
    match *cx.type_kind(ty) {
        TypeKind::Void | TypeKind::Opaque { .. } | TypeKind::Function { .. } => 0,
        TypeKind::Bool => 1,
        TypeKind::Int { width } | TypeKind::Float { width } => width / 8,
        TypeKind::Vector { elem, count } => {
            // A 3-vector allocates like a 4-vector.
            let slots = if count == 3 { 4 } else { count };
            byte_size(cx, elem) * slots
        }
        TypeKind::Array { elem, count } => byte_size(cx, elem) * count,
        TypeKind::Struct { ref fields } => {
            let (_, total) = struct_layout_of(cx, fields);
            total
        }
        // The logical addressing model never sizes pointers, but the 32-bit
        // data layout the flow is configured with says 4.
        TypeKind::Pointer { .. } => 4,
    }
}

/// ABI alignment in bytes.
pub fn abi_align(cx: &Context, ty: Type) -> u32 {
    match *cx.type_kind(ty) {
        TypeKind::Void | TypeKind::Opaque { .. } | TypeKind::Function { .. } => 1,
        TypeKind::Bool => 1,
        TypeKind::Int { width } | TypeKind::Float { width } => width / 8,
        TypeKind::Vector { .. } => byte_size(cx, ty),
        TypeKind::Array { elem, .. } => abi_align(cx, elem),
        TypeKind::Struct { ref fields } => {
            fields.iter().map(|&f| abi_align(cx, f)).max().unwrap_or(1)
        }
        TypeKind::Pointer { .. } => 4,
    }
}

/// Field offsets plus the padded total size of a struct with these fields.
pub fn struct_layout_of(cx: &Context, fields: &[Type]) -> (SmallVec<[u32; 8]>, u32) {
    let mut offsets = SmallVec::new();
    let mut offset = 0u32;
    let mut max_align = 1u32;
    for &field in fields {
        let align = abi_align(cx, field).max(1);
        max_align = max_align.max(align);
        offset = offset.next_multiple_of(align);
        offsets.push(offset);
        offset += byte_size(cx, field);
    }
    (offsets, offset.next_multiple_of(max_align))
}

/// Serializes a constant to the bytes the host would see in a buffer laid out
/// by these rules, little-endian. Used for the storage-buffer rendition of
/// module-scope `__constant` data.
pub fn const_bytes(cx: &Context, ct: Const) -> Vec<u8> {
    let mut out = Vec::new();
    write_const_bytes(cx, ct, &mut out);
    out
}

fn write_const_bytes(cx: &Context, ct: Const, out: &mut Vec<u8>) {
    let def = cx.const_def(ct);
    let size = byte_size(cx, def.ty) as usize;
    let start = out.len();
    match &def.kind {
        ConstKind::Bool(v) => out.push(u8::from(*v)),
        ConstKind::Int(v) | ConstKind::Float(v) => {
            out.extend_from_slice(&v.to_le_bytes()[..size]);
        }
        // Undef data is observable by the host; zero it like null.
        ConstKind::Null | ConstKind::Undef => out.resize(start + size, 0),
        ConstKind::Composite(elems) => {
            let offsets: SmallVec<[u32; 8]> = match cx.type_kind(def.ty) {
                TypeKind::Struct { fields } => struct_layout_of(cx, fields).0,
                &TypeKind::Array { elem, count } | &TypeKind::Vector { elem, count } => {
                    let stride = byte_size(cx, elem);
                    (0..count).map(|i| i * stride).collect()
                }
                _ => (0..elems.len() as u32).map(|i| i * 4).collect(),
            };
            for (&elem, &off) in elems.iter().zip(&offsets) {
                out.resize(start + off as usize, 0);
                write_const_bytes(cx, elem, out);
            }
        }
    }
    out.resize(start + size, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_and_vector_sizes() {
        let mut cx = Context::default();
        let i8t = cx.t_i8();
        let i32t = cx.t_i32();
        let f32t = cx.t_f32();
        let v3f = cx.t_vec(f32t, 3);
        let v4f = cx.t_vec(f32t, 4);
        assert_eq!(byte_size(&cx, i8t), 1);
        assert_eq!(byte_size(&cx, i32t), 4);
        assert_eq!(byte_size(&cx, v3f), 16);
        assert_eq!(byte_size(&cx, v4f), 16);
        assert_eq!(abi_align(&cx, v4f), 16);
    }

    #[test]
    fn struct_offsets_respect_alignment() {
        let mut cx = Context::default();
        let i8t = cx.t_i8();
        let i32t = cx.t_i32();
        let s = cx.t_struct([i8t, i32t, i8t]);
        let fields = [i8t, i32t, i8t];
        let (offsets, total) = struct_layout_of(&cx, &fields);
        assert_eq!(offsets.as_slice(), &[0, 4, 8]);
        assert_eq!(total, 12);
        assert_eq!(byte_size(&cx, s), 12);
    }

    #[test]
    fn array_stride_is_element_alloc_size() {
        let mut cx = Context::default();
        let f32t = cx.t_f32();
        let v3f = cx.t_vec(f32t, 3);
        let arr = cx.t_array(v3f, 5);
        assert_eq!(byte_size(&cx, arr), 80);
    }

    #[test]
    fn const_bytes_little_endian() {
        let mut cx = Context::default();
        let i32t = cx.t_i32();
        let a = cx.c_i32(0x01020304);
        let b = cx.c_i32(0xAABBCCDD);
        let arr_ty = cx.t_array(i32t, 2);
        let arr = cx.c_composite(arr_ty, [a, b]);
        assert_eq!(
            const_bytes(&cx, arr),
            vec![0x04, 0x03, 0x02, 0x01, 0xDD, 0xCC, 0xBB, 0xAA]
        );
    }
}
