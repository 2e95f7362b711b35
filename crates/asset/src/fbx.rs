//! Binary FBX reader: node tree, mesh geometry, UV/normal layers, model transforms.

use std::{collections::HashMap, io::Read};

use anyhow::{Context, Result, anyhow};
use corelib::{Vec3, transform::Transform};
use flate2::read::ZlibDecoder;

use crate::mesh::{MeshData, MeshVertex, ParsedGeometry, Surface};

const MAGIC: &[u8] = b"Kaydara FBX Binary  \0";
const HEADER_LEN: usize = 27;
/// First version with 64-bit record headers.
const WIDE_HEADER_VERSION: u32 = 7500;

#[derive(Clone, Debug, PartialEq)]
pub enum Property {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Raw(Vec<u8>),
    BoolArray(Vec<bool>),
    I32Array(Vec<i32>),
    I64Array(Vec<i64>),
    F32Array(Vec<f32>),
    F64Array(Vec<f64>),
}

impl Property {
    fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I16(v) => Some(v.into()),
            Self::I32(v) => Some(v.into()),
            Self::I64(v) => Some(v),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::F32(v) => Some(v.into()),
            Self::F64(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    /// FBX strings pack `Name\0\x01Class`; this returns the name part.
    fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.split("\0\u{1}").next().unwrap_or(s)),
            _ => None,
        }
    }

    fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Self::F64Array(v) => Some(v.clone()),
            Self::F32Array(v) => Some(v.iter().map(|&f| f.into()).collect()),
            _ => None,
        }
    }

    fn to_i32_vec(&self) -> Option<Vec<i32>> {
        match self {
            Self::I32Array(v) => Some(v.clone()),
            Self::I64Array(v) => v.iter().map(|&i| i32::try_from(i).ok()).collect(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    pub name: String,
    pub properties: Vec<Property>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn prop(&self, index: usize) -> Option<&Property> {
        self.properties.get(index)
    }

    fn child_str(&self, name: &str) -> Option<&str> {
        self.child(name)?.prop(0)?.as_str()
    }
}

/// Parsed FBX document: the top-level nodes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FbxDocument {
    pub version: u32,
    pub nodes: Vec<Node>,
}

impl FbxDocument {
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

pub fn parse_fbx(data: &[u8]) -> Result<FbxDocument> {
    if !data.starts_with(MAGIC) {
        if data.starts_with(b"; FBX") {
            anyhow::bail!("ASCII FBX is not supported; re-export as binary FBX");
        }
        anyhow::bail!("Not a binary FBX file");
    }
    if data.len() < HEADER_LEN {
        anyhow::bail!("FBX header truncated");
    }
    let version = u32::from_le_bytes([data[23], data[24], data[25], data[26]]);

    let mut reader = Reader {
        data,
        pos: HEADER_LEN,
        wide: version >= WIDE_HEADER_VERSION,
    };
    let mut nodes = Vec::new();
    while reader.pos < data.len() {
        match reader.read_node()? {
            Some(node) => nodes.push(node),
            None => break,
        }
    }

    log::debug!("Parsed FBX {} with {} top-level nodes", version, nodes.len());
    Ok(FbxDocument { version, nodes })
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    wide: bool,
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| anyhow!("Unexpected end of FBX at offset {}", self.pos))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn header_word(&mut self) -> Result<u64> {
        if self.wide {
            Ok(u64::from_le_bytes(self.array()?))
        } else {
            Ok(self.u32()?.into())
        }
    }

    /// Reads one record; `None` for the null record closing a list.
    fn read_node(&mut self) -> Result<Option<Node>> {
        let end = self.header_word()?;
        let num_props = self.header_word()?;
        let _props_len = self.header_word()?;
        let name_len = self.u8()?;
        if end == 0 {
            return Ok(None);
        }
        let end = usize::try_from(end)
            .ok()
            .filter(|&e| e <= self.data.len() && e >= self.pos)
            .ok_or_else(|| anyhow!("FBX record end {} out of range", end))?;

        let name = String::from_utf8_lossy(self.bytes(name_len.into())?).into_owned();
        let mut properties = Vec::new();
        for _ in 0..num_props {
            properties.push(
                self.read_property()
                    .with_context(|| format!("Bad property on FBX node '{name}'"))?,
            );
        }

        let mut children = Vec::new();
        while self.pos < end {
            match self.read_node()? {
                Some(child) => children.push(child),
                None => break,
            }
        }
        self.pos = end;

        Ok(Some(Node {
            name,
            properties,
            children,
        }))
    }

    fn read_property(&mut self) -> Result<Property> {
        let code = self.u8()?;
        let prop = match code {
            b'Y' => Property::I16(i16::from_le_bytes(self.array()?)),
            b'C' => Property::Bool(self.u8()? != 0),
            b'I' => Property::I32(i32::from_le_bytes(self.array()?)),
            b'F' => Property::F32(f32::from_le_bytes(self.array()?)),
            b'D' => Property::F64(f64::from_le_bytes(self.array()?)),
            b'L' => Property::I64(i64::from_le_bytes(self.array()?)),
            b'S' => {
                let len = self.u32()? as usize;
                Property::String(String::from_utf8_lossy(self.bytes(len)?).into_owned())
            }
            b'R' => {
                let len = self.u32()? as usize;
                Property::Raw(self.bytes(len)?.to_vec())
            }
            b'f' => Property::F32Array(self.read_array(4, |c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))?),
            b'd' => Property::F64Array(self.read_array(8, |c| {
                f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
            })?),
            b'i' => Property::I32Array(self.read_array(4, |c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))?),
            b'l' => Property::I64Array(self.read_array(8, |c| {
                i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
            })?),
            b'b' => Property::BoolArray(self.read_array(1, |c| c[0] != 0)?),
            other => anyhow::bail!("Unknown FBX property type '{}'", other as char),
        };
        Ok(prop)
    }

    fn read_array<T>(&mut self, elem_size: usize, decode: impl Fn(&[u8]) -> T) -> Result<Vec<T>> {
        let count = self.u32()? as usize;
        let encoding = self.u32()?;
        let stored_len = self.u32()? as usize;
        let stored = self.bytes(stored_len)?;
        let expected = count
            .checked_mul(elem_size)
            .ok_or_else(|| anyhow!("FBX array of {} elements is too large", count))?;

        let raw: std::borrow::Cow<'_, [u8]> = match encoding {
            0 => stored.into(),
            1 => {
                // The element count is untrusted; grow with the inflated data
                // and stop one byte past the declared size.
                let mut out = Vec::new();
                ZlibDecoder::new(stored)
                    .take(expected as u64 + 1)
                    .read_to_end(&mut out)
                    .context("Failed to inflate FBX array")?;
                out.into()
            }
            other => anyhow::bail!("Unknown FBX array encoding {}", other),
        };

        if raw.len() != expected {
            anyhow::bail!(
                "FBX array length mismatch: {} elements, {} bytes",
                count,
                raw.len()
            );
        }
        Ok(raw.chunks_exact(elem_size).map(decode).collect())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mapping {
    ByPolygonVertex,
    ByVertex,
    AllSame,
}

/// A per-corner attribute layer (`LayerElementUV`, `LayerElementNormal`).
struct Layer<const N: usize> {
    mapping: Mapping,
    direct: Vec<f64>,
    index: Option<Vec<i32>>,
}

impl<const N: usize> Layer<N> {
    fn from_node(node: &Node, data_name: &str, index_name: &str) -> Option<Self> {
        let mapping = match node.child_str("MappingInformationType")? {
            "ByPolygonVertex" => Mapping::ByPolygonVertex,
            "ByVertex" | "ByVertice" => Mapping::ByVertex,
            "AllSame" => Mapping::AllSame,
            other => {
                log::warn!("FBX layer mapping '{}' not supported; ignoring layer", other);
                return None;
            }
        };
        let direct = node.child(data_name)?.prop(0)?.to_f64_vec()?;
        let index = match node.child_str("ReferenceInformationType") {
            Some("IndexToDirect") | Some("Index") => {
                Some(node.child(index_name)?.prop(0)?.to_i32_vec()?)
            }
            _ => None,
        };
        Some(Self {
            mapping,
            direct,
            index,
        })
    }

    fn value(&self, polygon_vertex: usize, vertex: usize) -> Option<[f32; N]> {
        let slot = match self.mapping {
            Mapping::ByPolygonVertex => polygon_vertex,
            Mapping::ByVertex => vertex,
            Mapping::AllSame => 0,
        };
        let idx = match &self.index {
            Some(index) => usize::try_from(*index.get(slot)?).ok()?,
            None => slot,
        };
        let values = self.direct.get(idx * N..idx * N + N)?;
        let mut out = [0.0f32; N];
        for (o, v) in out.iter_mut().zip(values) {
            *o = *v as f32;
        }
        Some(out)
    }
}

/// Load every mesh `Geometry` of a binary FBX as a surface.
pub fn load_fbx_from_bytes(data: &[u8]) -> Result<ParsedGeometry> {
    let doc = parse_fbx(data)?;
    let objects = doc
        .node("Objects")
        .ok_or_else(|| anyhow!("FBX has no Objects section"))?;

    let models: HashMap<i64, &Node> = objects
        .children_named("Model")
        .filter_map(|m| Some((m.prop(0)?.as_i64()?, m)))
        .collect();
    let mut parent_of: HashMap<i64, i64> = HashMap::new();
    if let Some(connections) = doc.node("Connections") {
        for c in connections.children_named("C") {
            if c.prop(0).and_then(Property::as_str) != Some("OO") {
                continue;
            }
            if let (Some(child), Some(parent)) = (
                c.prop(1).and_then(Property::as_i64),
                c.prop(2).and_then(Property::as_i64),
            ) {
                parent_of.entry(child).or_insert(parent);
            }
        }
    }

    let mut surfaces = Vec::new();
    for geometry in objects.children_named("Geometry") {
        if geometry.child("Vertices").is_none() {
            continue;
        }
        let name = geometry
            .prop(1)
            .and_then(Property::as_str)
            .unwrap_or("Geometry")
            .to_owned();
        let transform = geometry
            .prop(0)
            .and_then(Property::as_i64)
            .and_then(|id| parent_of.get(&id))
            .and_then(|model_id| models.get(model_id))
            .map(|model| model_transform(model))
            .unwrap_or_default();
        let surface = build_surface(geometry, name, &transform)
            .with_context(|| format!("Invalid FBX geometry on node {:?}", geometry.prop(1)))?;
        surfaces.push(surface);
    }

    if surfaces.is_empty() {
        anyhow::bail!("FBX contained no mesh geometry");
    }
    Ok(ParsedGeometry::from_surfaces(surfaces))
}

fn build_surface(geometry: &Node, name: String, transform: &Transform) -> Result<Surface> {
    let positions = geometry
        .child("Vertices")
        .and_then(|n| n.prop(0))
        .and_then(Property::to_f64_vec)
        .ok_or_else(|| anyhow!("Vertices array missing"))?;
    let polygon_index = geometry
        .child("PolygonVertexIndex")
        .and_then(|n| n.prop(0))
        .and_then(Property::to_i32_vec)
        .ok_or_else(|| anyhow!("PolygonVertexIndex array missing"))?;
    let vertex_count = positions.len() / 3;

    let uvs = geometry
        .child("LayerElementUV")
        .and_then(|n| Layer::<2>::from_node(n, "UV", "UVIndex"));
    let normals = geometry
        .child("LayerElementNormal")
        .and_then(|n| Layer::<3>::from_node(n, "Normals", "NormalsIndex"));

    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    let mut has_uv = uvs.is_some();
    let mut polygon: Vec<u32> = Vec::new();

    for (pv, &raw) in polygon_index.iter().enumerate() {
        // The last corner of each polygon is stored as `!index`.
        let (vi, closes) = if raw < 0 {
            ((!raw) as usize, true)
        } else {
            (raw as usize, false)
        };
        if vi >= vertex_count {
            anyhow::bail!("Polygon vertex {} out of range ({} vertices)", vi, vertex_count);
        }
        let local = Vec3::new(
            positions[vi * 3] as f32,
            positions[vi * 3 + 1] as f32,
            positions[vi * 3 + 2] as f32,
        );
        let uv = uvs.as_ref().and_then(|l| l.value(pv, vi));
        if uv.is_none() {
            has_uv = false;
        }
        let normal = normals
            .as_ref()
            .and_then(|l| l.value(pv, vi))
            .map(|n| (transform.rotation() * Vec3::from_array(n)).to_array())
            .unwrap_or([0.0, 0.0, 1.0]);

        let idx = u32::try_from(vertices.len())
            .map_err(|_| anyhow!("Too many vertices in FBX (>{})", u32::MAX))?;
        vertices.push(MeshVertex::new(
            transform.transform_point(local).to_array(),
            normal,
            uv.unwrap_or([0.0, 0.0]),
        ));
        polygon.push(idx);

        if closes {
            for tri in 1..polygon.len().saturating_sub(1) {
                indices.extend([polygon[0], polygon[tri], polygon[tri + 1]]);
            }
            polygon.clear();
        }
    }

    Ok(Surface {
        name,
        mesh: MeshData::new(vertices, indices),
        has_uv,
        ..Default::default()
    })
}

fn model_transform(model: &Node) -> Transform {
    let mut transform = Transform::identity();
    let Some(props) = model.child("Properties70") else {
        return transform;
    };
    for p in props.children_named("P") {
        let Some(key) = p.prop(0).and_then(Property::as_str) else {
            continue;
        };
        let vector = || {
            let x = p.prop(4)?.as_f64()? as f32;
            let y = p.prop(5)?.as_f64()? as f32;
            let z = p.prop(6)?.as_f64()? as f32;
            Some(Vec3::new(x, y, z))
        };
        match key {
            "Lcl Translation" => transform.translation = vector().unwrap_or(Vec3::ZERO),
            "Lcl Rotation" => {
                transform.rotation_euler = vector()
                    .map(|v| v * std::f32::consts::PI / 180.0)
                    .unwrap_or(Vec3::ZERO);
            }
            "Lcl Scaling" => transform.scale = vector().unwrap_or(Vec3::ONE),
            _ => {}
        }
    }
    transform
}
