//! OBJ parser: positions, normals, texture coordinates, object/group/material splits.

use std::{
    collections::HashMap,
    io::{self, BufRead},
};

use anyhow::{Context, Result, anyhow};

use crate::mesh::{MaterialSlot, MeshData, MeshVertex, ParsedGeometry, Surface};

/// Parsed OBJ document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjDocument {
    pub geometry: ParsedGeometry,
    /// Material library filenames named by `mtllib`, in file order.
    pub material_libraries: Vec<String>,
}

/// Load an OBJ from raw bytes (must be UTF-8).
pub fn load_obj_from_bytes(bytes: &[u8]) -> Result<ObjDocument> {
    let text = std::str::from_utf8(bytes).context("OBJ is not valid UTF-8")?;
    load_obj_from_str(text)
}

/// Convenience helper to parse an OBJ string literal.
pub fn load_obj_from_str(contents: &str) -> Result<ObjDocument> {
    parse_obj(io::Cursor::new(contents))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
struct Key(usize, Option<usize>, Option<usize>);

/// Surface under construction. Vertex dedup is per surface.
#[derive(Default)]
struct SurfaceBuilder {
    name: String,
    material: Option<String>,
    unique: HashMap<Key, u32>,
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
    missing_uv: bool,
}

impl SurfaceBuilder {
    fn named(name: String, material: Option<String>) -> Self {
        Self {
            name,
            material,
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    fn finish(self) -> Surface {
        Surface {
            name: self.name,
            mesh: MeshData::new(self.vertices, self.indices),
            material: self.material.map_or(MaterialSlot::None, MaterialSlot::Named),
            has_uv: !self.missing_uv,
        }
    }
}

fn parse_obj<R: BufRead>(reader: R) -> Result<ObjDocument> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();
    let mut texcoords: Vec<[f32; 2]> = Vec::new();

    let mut material_libraries = Vec::new();
    let mut finished: Vec<Surface> = Vec::new();
    let mut current = SurfaceBuilder::named("default".to_owned(), None);

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let tag = parts
            .next()
            .ok_or_else(|| anyhow!("Malformed OBJ line {}: '{}'", line_no + 1, trimmed))?;

        match tag {
            "v" => {
                let x = parse_f32(parts.next(), line_no, "x coordinate")?;
                let y = parse_f32(parts.next(), line_no, "y coordinate")?;
                let z = parse_f32(parts.next(), line_no, "z coordinate")?;
                positions.push([x, y, z]);
            }
            "vt" => {
                let u = parse_f32(parts.next(), line_no, "u coordinate")?;
                let v = parse_f32(parts.next(), line_no, "v coordinate")?;
                texcoords.push([u, v]);
            }
            "vn" => {
                let nx = parse_f32(parts.next(), line_no, "nx coordinate")?;
                let ny = parse_f32(parts.next(), line_no, "ny coordinate")?;
                let nz = parse_f32(parts.next(), line_no, "nz coordinate")?;
                normals.push([nx, ny, nz]);
            }
            "o" | "g" => {
                let name = rest_of_line(trimmed, tag);
                let name = if name.is_empty() { "default" } else { name };
                let material = current.material.clone();
                start_surface(&mut finished, &mut current, name.to_owned(), material);
            }
            "usemtl" => {
                let material = rest_of_line(trimmed, tag).to_owned();
                if current.material.as_deref() != Some(material.as_str()) {
                    let name = current.name.clone();
                    start_surface(&mut finished, &mut current, name, Some(material));
                }
            }
            "mtllib" => {
                let lib = rest_of_line(trimmed, tag);
                if !lib.is_empty() {
                    material_libraries.push(lib.to_owned());
                }
            }
            "f" => {
                let mut face_indices: Vec<u32> = Vec::new();
                for part in parts {
                    let (vi, vti, vni) = parse_face_vertex(
                        part,
                        positions.len(),
                        texcoords.len(),
                        normals.len(),
                        line_no,
                    )?;
                    if vti.is_none() {
                        current.missing_uv = true;
                    }
                    let key = Key(vi, vti, vni);
                    let index = match current.unique.get(&key) {
                        Some(&idx) => idx,
                        None => {
                            let position = positions.get(vi).copied().ok_or_else(|| {
                                anyhow!("Position index out of bounds on line {}", line_no + 1)
                            })?;
                            let uv = vti
                                .and_then(|i| texcoords.get(i).copied())
                                .unwrap_or([0.0, 0.0]);
                            let normal = vni
                                .and_then(|i| normals.get(i).copied())
                                .unwrap_or([0.0, 0.0, 1.0]);

                            let idx = u32::try_from(current.vertices.len())
                                .map_err(|_| anyhow!("Too many vertices in OBJ (>{})", u32::MAX))?;
                            current.vertices.push(MeshVertex::new(position, normal, uv));
                            current.unique.insert(key, idx);
                            idx
                        }
                    };
                    face_indices.push(index);
                }

                if face_indices.len() < 3 {
                    continue;
                }
                // Triangulate fan
                for tri in 1..(face_indices.len() - 1) {
                    current.indices.push(face_indices[0]);
                    current.indices.push(face_indices[tri]);
                    current.indices.push(face_indices[tri + 1]);
                }
            }
            _ => {
                // Ignore other directives (s/l/p/etc.)
            }
        }
    }

    if !current.is_empty() {
        finished.push(current.finish());
    }
    if finished.is_empty() {
        anyhow::bail!("OBJ contained no triangles");
    }

    Ok(ObjDocument {
        geometry: ParsedGeometry::from_surfaces(finished),
        material_libraries,
    })
}

fn start_surface(
    finished: &mut Vec<Surface>,
    current: &mut SurfaceBuilder,
    name: String,
    material: Option<String>,
) {
    let next = SurfaceBuilder::named(name, material);
    let done = std::mem::replace(current, next);
    if !done.is_empty() {
        finished.push(done.finish());
    }
}

/// Everything after the statement keyword; names may contain spaces.
fn rest_of_line<'a>(line: &'a str, tag: &str) -> &'a str {
    line[tag.len()..].trim()
}

fn parse_f32(value: Option<&str>, line_no: usize, what: &str) -> Result<f32> {
    let token = value.ok_or_else(|| anyhow!("Missing {} on line {}", what, line_no + 1))?;
    token
        .parse::<f32>()
        .with_context(|| format!("Failed to parse {} on line {}", what, line_no + 1))
}

fn parse_face_vertex(
    token: &str,
    pos_count: usize,
    tex_count: usize,
    norm_count: usize,
    line_no: usize,
) -> Result<(usize, Option<usize>, Option<usize>)> {
    let mut split = token.split('/');
    let pos = split
        .next()
        .ok_or_else(|| anyhow!("Malformed face element '{}' on line {}", token, line_no + 1))?;
    let pos_idx = resolve_index(pos, pos_count, line_no)?;

    let tex_idx = match split.next() {
        Some(value) if !value.is_empty() => Some(resolve_index(value, tex_count, line_no)?),
        _ => None,
    };

    let norm_idx = match split.next() {
        Some(value) if !value.is_empty() => Some(resolve_index(value, norm_count, line_no)?),
        _ => None,
    };

    Ok((pos_idx, tex_idx, norm_idx))
}

fn resolve_index(token: &str, len: usize, line_no: usize) -> Result<usize> {
    let raw = token
        .parse::<i64>()
        .with_context(|| format!("Invalid index '{}' on line {}", token, line_no + 1))?;
    if raw == 0 {
        anyhow::bail!("OBJ indices are 1-based; found 0 on line {}", line_no + 1);
    }

    let idx = if raw > 0 { raw - 1 } else { len as i64 + raw };

    if idx < 0 || idx as usize >= len {
        anyhow::bail!(
            "OBJ index {} resolved out of bounds (len={}) on line {}",
            raw,
            len,
            line_no + 1
        );
    }

    Ok(idx as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_triangle() {
        let src = r#"
            v 0.0 0.0 0.0
            v 1.0 0.0 0.0
            v 0.0 1.0 0.0
            vn 0.0 0.0 1.0
            vt 0.0 0.0
            vt 1.0 0.0
            vt 0.0 1.0
            f 1/1/1 2/2/1 3/3/1
        "#;
        let doc = load_obj_from_str(src).expect("parse triangle");
        let surfaces = &doc.geometry.surfaces;
        assert_eq!(surfaces.len(), 1);
        assert_eq!(surfaces[0].mesh.vertices.len(), 3);
        assert_eq!(surfaces[0].mesh.indices.len(), 3);
        assert!(surfaces[0].has_uv);
        assert!(surfaces[0].mesh.is_valid());
    }

    #[test]
    fn splits_surfaces_by_object_and_material() {
        let src = r#"
            mtllib scene.mtl
            v 0 0 0
            v 1 0 0
            v 0 1 0
            v 1 1 0
            vt 0 0
            o Body
            usemtl Paint
            f 1/1 2/1 3/1
            usemtl Glass
            f 2 4 3
            o Wheel
            f -1 -2 -3
        "#;
        let doc = load_obj_from_str(src).expect("parse");
        assert_eq!(doc.material_libraries, vec!["scene.mtl".to_owned()]);
        let surfaces = &doc.geometry.surfaces;
        assert_eq!(surfaces.len(), 3);
        assert_eq!(surfaces[0].name, "Body");
        assert_eq!(surfaces[0].material, MaterialSlot::Named("Paint".into()));
        assert!(surfaces[0].has_uv);
        assert_eq!(surfaces[1].material, MaterialSlot::Named("Glass".into()));
        assert!(!surfaces[1].has_uv);
        assert_eq!(surfaces[2].name, "Wheel");
        assert_eq!(surfaces[2].material, MaterialSlot::Named("Glass".into()));
    }

    #[test]
    fn quad_is_fan_triangulated() {
        let src = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let doc = load_obj_from_str(src).expect("parse quad");
        assert_eq!(doc.geometry.surfaces[0].mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn rejects_out_of_range_index() {
        let src = "v 0 0 0\nf 1 2 3\n";
        assert!(load_obj_from_str(src).is_err());
    }

    #[test]
    fn rejects_file_without_faces() {
        assert!(load_obj_from_str("v 0 0 0\n").is_err());
    }
}
