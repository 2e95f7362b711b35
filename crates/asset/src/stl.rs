//! STL parser for binary and ASCII files.

use anyhow::{Result, anyhow};
use nom::{
    IResult,
    bytes::complete::tag,
    character::complete::{multispace0, multispace1, not_line_ending},
    multi::many0,
    number::complete::{float, le_f32, le_u16, le_u32},
    sequence::preceded,
};

use crate::mesh::{MeshData, MeshVertex, ParsedGeometry, Surface};

const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

type Facet = ([f32; 3], [[f32; 3]; 3]);

/// Detect and parse an STL file (binary or ASCII).
pub fn load_stl_from_bytes(data: &[u8]) -> Result<ParsedGeometry> {
    // Binary files may also start with "solid", so ASCII must parse fully.
    if data.starts_with(b"solid") {
        if let Ok(text) = std::str::from_utf8(data) {
            if let Ok(facets) = parse_ascii_stl(text) {
                return into_geometry(facets);
            }
        }
    }
    into_geometry(parse_binary_stl(data)?)
}

fn parse_binary_stl(data: &[u8]) -> Result<Vec<Facet>> {
    if data.len() < HEADER_LEN + 4 {
        anyhow::bail!("File too small to be a valid STL");
    }

    let (mut input, count) = le_u32::<_, nom::error::Error<&[u8]>>(&data[HEADER_LEN..])
        .map_err(|e| anyhow!("Failed to read STL triangle count: {e:?}"))?;
    let count = count as usize;
    if input.len() < count.saturating_mul(FACET_LEN) {
        anyhow::bail!(
            "Unexpected end of STL: {} triangles declared, {} bytes of facets",
            count,
            input.len()
        );
    }

    let mut facets = Vec::with_capacity(count);
    for _ in 0..count {
        let (rest, facet) =
            binary_facet(input).map_err(|e| anyhow!("Malformed binary STL facet: {e:?}"))?;
        facets.push(facet);
        input = rest;
    }
    Ok(facets)
}

fn binary_facet(input: &[u8]) -> IResult<&[u8], Facet> {
    let (input, normal) = le_vec3(input)?;
    let (input, a) = le_vec3(input)?;
    let (input, b) = le_vec3(input)?;
    let (input, c) = le_vec3(input)?;
    // Attribute byte count
    let (input, _) = le_u16(input)?;
    Ok((input, (normal, [a, b, c])))
}

fn le_vec3(input: &[u8]) -> IResult<&[u8], [f32; 3]> {
    let (input, x) = le_f32(input)?;
    let (input, y) = le_f32(input)?;
    let (input, z) = le_f32(input)?;
    Ok((input, [x, y, z]))
}

fn parse_ascii_stl(input: &str) -> Result<Vec<Facet>> {
    match ascii_solid(input) {
        Ok((_, facets)) if !facets.is_empty() => Ok(facets),
        Ok(_) => Err(anyhow!("ASCII STL has no facets")),
        Err(e) => Err(anyhow!("Failed to parse ASCII STL: {e:?}")),
    }
}

fn ascii_solid(input: &str) -> IResult<&str, Vec<Facet>> {
    let (input, _) = preceded(multispace0, tag("solid"))(input)?;
    // Optional name
    let (input, _) = not_line_ending(input)?;
    let (input, facets) = many0(ascii_facet)(input)?;
    let (input, _) = preceded(multispace0, tag("endsolid"))(input)?;
    Ok((input, facets))
}

fn ascii_facet(input: &str) -> IResult<&str, Facet> {
    let (input, _) = preceded(multispace0, tag("facet"))(input)?;
    let (input, _) = preceded(multispace1, tag("normal"))(input)?;
    let (input, normal) = ascii_vec3(input)?;
    let (input, _) = preceded(multispace0, tag("outer"))(input)?;
    let (input, _) = preceded(multispace1, tag("loop"))(input)?;
    let (input, a) = ascii_vertex(input)?;
    let (input, b) = ascii_vertex(input)?;
    let (input, c) = ascii_vertex(input)?;
    let (input, _) = preceded(multispace0, tag("endloop"))(input)?;
    let (input, _) = preceded(multispace0, tag("endfacet"))(input)?;
    Ok((input, (normal, [a, b, c])))
}

fn ascii_vertex(input: &str) -> IResult<&str, [f32; 3]> {
    let (input, _) = preceded(multispace0, tag("vertex"))(input)?;
    ascii_vec3(input)
}

fn ascii_vec3(input: &str) -> IResult<&str, [f32; 3]> {
    let (input, _) = multispace0(input)?;
    let (input, x) = float(input)?;
    let (input, _) = multispace1(input)?;
    let (input, y) = float(input)?;
    let (input, _) = multispace1(input)?;
    let (input, z) = float(input)?;
    Ok((input, [x, y, z]))
}

fn into_geometry(facets: Vec<Facet>) -> Result<ParsedGeometry> {
    if facets.is_empty() {
        anyhow::bail!("STL contained no triangles");
    }
    let mut vertices = Vec::with_capacity(facets.len() * 3);
    for (normal, corners) in &facets {
        for corner in corners {
            vertices.push(MeshVertex::new(*corner, *normal, [0.0, 0.0]));
        }
    }
    let count = u32::try_from(vertices.len())
        .map_err(|_| anyhow!("Too many vertices in STL (>{})", u32::MAX))?;
    let surface = Surface {
        name: "stl".to_owned(),
        mesh: MeshData::new(vertices, (0..count).collect()),
        has_uv: false,
        ..Default::default()
    };
    Ok(ParsedGeometry::from_surfaces(vec![surface]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_stl(triangles: &[[[f32; 3]; 3]]) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN];
        data.extend_from_slice(&(triangles.len() as u32).to_le_bytes());
        for tri in triangles {
            for f in [0.0f32, 0.0, 1.0] {
                data.extend_from_slice(&f.to_le_bytes());
            }
            for corner in tri {
                for f in corner {
                    data.extend_from_slice(&f.to_le_bytes());
                }
            }
            data.extend_from_slice(&0u16.to_le_bytes());
        }
        data
    }

    #[test]
    fn parses_named_ascii_solid() {
        let src = "solid cube part\n\
            facet normal 0 0 1\n\
              outer loop\n\
                vertex 0 0 0\n\
                vertex 1 0 0\n\
                vertex 0 1 0\n\
              endloop\n\
            endfacet\n\
            endsolid cube part\n";
        let geometry = load_stl_from_bytes(src.as_bytes()).expect("ascii stl");
        assert_eq!(geometry.triangle_count(), 1);
        assert!(!geometry.surfaces[0].has_uv);
        assert_eq!(geometry.surfaces[0].mesh.vertices[1].position, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn parses_binary() {
        let data = binary_stl(&[
            [[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]],
            [[0.0, 0.0, 1.0], [2.0, 0.0, 1.0], [0.0, 2.0, 1.0]],
        ]);
        let geometry = load_stl_from_bytes(&data).expect("binary stl");
        assert_eq!(geometry.triangle_count(), 2);
        assert_eq!(geometry.bounds().max.to_array(), [2.0, 2.0, 1.0]);
    }

    #[test]
    fn binary_header_starting_with_solid_is_not_ascii() {
        let mut data = binary_stl(&[[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]]);
        data[..5].copy_from_slice(b"solid");
        let geometry = load_stl_from_bytes(&data).expect("binary stl");
        assert_eq!(geometry.triangle_count(), 1);
    }

    #[test]
    fn truncated_binary_fails() {
        let mut data = binary_stl(&[[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]]);
        data.truncate(data.len() - 10);
        assert!(load_stl_from_bytes(&data).is_err());
    }
}
