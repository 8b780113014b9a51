//! std140 layout of the material `NodeTree` uniform block.

use serde::Serialize;

use crate::graph::{DataType, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniformMember {
    /// Identifier in generated source (`u{id}`).
    pub name: String,
    pub ty: DataType,
    /// Byte offset inside the block.
    pub offset: usize,
    #[serde(skip)]
    pub default: Value,
}

/// Members ordered by decreasing alignment, then first use.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UniformLayout {
    pub members: Vec<UniformMember>,
    /// Block size rounded up to 16 bytes.
    pub size: usize,
}

impl UniformLayout {
    /// Lays out `(name, value)` pairs given in first-use order.
    #[must_use]
    pub fn std140(uniforms: impl IntoIterator<Item = (String, Value)>) -> Self {
        let mut members: Vec<UniformMember> = uniforms
            .into_iter()
            .map(|(name, default)| UniformMember {
                name,
                ty: default.data_type(),
                offset: 0,
                default,
            })
            .collect();
        // Stable: equal alignments keep first-use order.
        members.sort_by(|a, b| b.ty.std140_align().cmp(&a.ty.std140_align()));

        let mut offset = 0;
        for member in &mut members {
            offset = align_up(offset, member.ty.std140_align());
            member.offset = offset;
            offset += member.ty.std140_size();
        }

        Self {
            members,
            size: align_up(offset, 16),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// GLSL declaration of the block, or an empty string with no members.
    #[must_use]
    pub fn declaration(&self, binding: u32) -> String {
        if self.members.is_empty() {
            return String::new();
        }
        let mut out = format!("layout(std140, binding = {binding}) uniform NodeTree\n{{\n");
        for member in &self.members {
            out.push_str(&format!("  {} {};\n", member.ty.glsl_name(), member.name));
        }
        out.push_str("};\n");
        out
    }

    /// Default values packed into a buffer of `self.size` bytes.
    #[must_use]
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.size];
        for member in &self.members {
            let components = member.default.components();
            match member.ty {
                // Columns are padded to 16 bytes.
                DataType::Mat3 => {
                    for (col, chunk) in components.chunks(3).enumerate() {
                        write_floats(&mut buf, member.offset + col * 16, chunk);
                    }
                }
                _ => write_floats(&mut buf, member.offset, &components),
            }
        }
        buf
    }
}

fn write_floats(buf: &mut [u8], offset: usize, values: &[f32]) {
    let bytes: &[u8] = bytemuck::cast_slice(values);
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

#[inline]
fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat3, Vec2, Vec3, Vec4};

    #[test]
    fn members_sort_by_alignment_stably() {
        let layout = UniformLayout::std140([
            ("u0".to_owned(), Value::Float(1.0)),
            ("u1".to_owned(), Value::Vec3(Vec3::ONE)),
            ("u2".to_owned(), Value::Vec2(Vec2::ONE)),
            ("u3".to_owned(), Value::Vec4(Vec4::ONE)),
            ("u4".to_owned(), Value::Float(2.0)),
        ]);

        let order: Vec<_> = layout.members.iter().map(|m| (m.name.as_str(), m.offset)).collect();
        assert_eq!(
            order,
            vec![("u1", 0), ("u3", 16), ("u2", 32), ("u0", 40), ("u4", 44)]
        );
        assert_eq!(layout.size, 48);
    }

    #[test]
    fn pack_pads_mat3_columns() {
        let layout = UniformLayout::std140([("u0".to_owned(), Value::Mat3(Mat3::IDENTITY))]);
        let bytes = layout.pack();
        assert_eq!(bytes.len(), 48);

        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(&floats[0..4], &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(&floats[4..8], &[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(&floats[8..12], &[0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn empty_layout_declares_nothing() {
        let layout = UniformLayout::std140(std::iter::empty());
        assert!(layout.declaration(0).is_empty());
        assert!(layout.pack().is_empty());
    }
}
