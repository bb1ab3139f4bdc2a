use super::*;
use std::fmt::Write as _;

// text trimeshes are laid out as:
// !TXT_TMESH 1.0
// vused x1 y1 z1 x2 y2 z2      -- reference frame, vused 0 when absent
// nnodes nedges ntriangles
// x y z flag                   -- repeats for nodes
// node1 node2 tri1 tri2 flag   -- repeats for edges, -1 for no triangle
// edge1 edge2 edge3 flag       -- repeats for triangles

/// Reference corners written when a mesh has no frame.
const NO_FRAME: [Point3; 2] = [[NULL_VALUE; 3]; 2];

/// Serialize a mesh, with an optional pair of reference corners, to the text format.
///
/// Elements marked deleted are cleaned up first, so the indices written are contiguous.
pub fn to_txt_tmesh(mesh: &TriMesh, frame: Option<[Point3; 2]>) -> String {
    let cleaned;
    let mesh = if has_deleted(mesh) {
        let mut m = mesh.clone();
        m.cleanup();
        cleaned = m;
        &cleaned
    } else {
        mesh
    };

    let mut s = String::new();
    // writing to a String does not fail
    let _ = write_all(&mut s, mesh, frame);
    s
}

fn has_deleted(mesh: &TriMesh) -> bool {
    mesh.nodes().iter().any(Node::is_deleted)
        || mesh.edges().iter().any(Edge::is_deleted)
        || mesh.triangles().iter().any(Triangle::is_deleted)
}

fn write_all(s: &mut String, mesh: &TriMesh, frame: Option<[Point3; 2]>) -> std::fmt::Result {
    writeln!(s, "!TXT_TMESH 1.0")?;
    let [[x1, y1, z1], [x2, y2, z2]] = frame.unwrap_or(NO_FRAME);
    writeln!(
        s,
        "{} {} {} {} {} {} {}",
        frame.is_some() as u8,
        x1,
        y1,
        z1,
        x2,
        y2,
        z2
    )?;
    writeln!(
        s,
        "{} {} {}",
        mesh.node_count(),
        mesh.edge_count(),
        mesh.tri_count()
    )?;

    for n in mesh.nodes() {
        writeln!(s, "{} {} {} {}", n.x, n.y, n.z, n.flag)?;
    }
    let tri = |t: Option<usize>| t.map_or(-1, |t| t as i64);
    for e in mesh.edges() {
        writeln!(
            s,
            "{} {} {} {} {}",
            e.node1(),
            e.node2(),
            tri(e.tri1()),
            tri(e.tri2()),
            e.flag
        )?;
    }
    for t in mesh.triangles() {
        let [a, b, c] = t.edges();
        writeln!(s, "{} {} {} {}", a, b, c, t.flag)?;
    }
    Ok(())
}

/// Write a mesh in the text format.
pub fn write_txt_tmesh<W: Write>(
    wtr: &mut W,
    mesh: &TriMesh,
    frame: Option<[Point3; 2]>,
) -> SurfaceResult<()> {
    let r = wtr
        .write_all(to_txt_tmesh(mesh, frame).as_bytes())
        .map_err(SurfaceError::from);
    record(r)
}

/// A mesh read from the text format, with its reference corners if the file has them.
#[derive(Clone, Debug, PartialEq)]
pub struct TxtTriMesh {
    pub mesh: TriMesh,
    pub frame: Option<[Point3; 2]>,
}

/// Deserialize a text trimesh.
///
/// Fails with [`SurfaceError::MalformedFile`] if the header is missing, there are fewer than
/// 3 nodes, 3 edges, or 1 triangle, or the adjacency does not check out.
pub fn from_txt_tmesh(s: &str) -> SurfaceResult<TxtTriMesh> {
    record(read(s))
}

/// Read a text trimesh.
pub fn read_txt_tmesh<R: Read>(rdr: &mut R) -> SurfaceResult<TxtTriMesh> {
    let mut s = String::new();
    let r = rdr
        .read_to_string(&mut s)
        .map_err(SurfaceError::from)
        .and_then(|_| read(&s));
    record(r)
}

fn malformed(what: &str) -> SurfaceError {
    SurfaceError::MalformedFile(format!("text trimesh: {}", what))
}

type NodeRow = (f64, f64, f64, i64);
type EdgeRow = (i64, i64, i64, i64, i64);
type TriRow = (i64, i64, i64, i64);

mod de {
    use nom::{
        bytes::complete::tag,
        character::complete::{i64 as integer, multispace0, not_line_ending, space1},
        combinator::*,
        multi::count,
        number::complete::double,
        sequence::*,
        IResult, Parser,
    };

    pub type Res<'a, O> = IResult<&'a str, O, ()>;

    fn ws<'a, G, O>(g: G) -> impl FnMut(&'a str) -> Res<'a, O>
    where
        G: Parser<&'a str, O, ()>,
    {
        preceded(multispace0, g)
    }

    fn n(i: &str) -> Res<f64> {
        ws(double)(i)
    }

    fn int(i: &str) -> Res<i64> {
        ws(integer)(i)
    }

    /// The header, frame, and element counts.
    #[allow(clippy::type_complexity)]
    pub fn header(s: &str) -> Res<((i64, [f64; 6]), (i64, i64, i64))> {
        let (s, _) = ws(tag("!TXT_TMESH"))(s)?;
        let (s, _) = opt(preceded(space1, not_line_ending))(s)?;
        let (s, (vused, x1, y1, z1, x2, y2, z2)) = tuple((int, n, n, n, n, n, n))(s)?;
        let (s, counts) = tuple((int, int, int))(s)?;
        Ok((s, ((vused, [x1, y1, z1, x2, y2, z2]), counts)))
    }

    pub fn nodes(s: &str, k: usize) -> Res<Vec<super::NodeRow>> {
        count(tuple((n, n, n, int)), k)(s)
    }

    pub fn edges(s: &str, k: usize) -> Res<Vec<super::EdgeRow>> {
        count(tuple((int, int, int, int, int)), k)(s)
    }

    pub fn tris(s: &str, k: usize) -> Res<Vec<super::TriRow>> {
        count(tuple((int, int, int, int)), k)(s)
    }

    pub fn end(s: &str) -> Res<()> {
        map(all_consuming(multispace0), |_| ())(s)
    }
}

fn read(s: &str) -> SurfaceResult<TxtTriMesh> {
    let (s, ((vused, f), (nn, ne, nt))) = de::header(s).map_err(|_| malformed("bad header"))?;
    let count = |k: i64, min: i64| {
        usize::try_from(k)
            .ok()
            .filter(|_| k >= min)
            .ok_or_else(|| malformed("too few elements"))
    };
    let (nn, ne, nt) = (count(nn, 3)?, count(ne, 3)?, count(nt, 1)?);

    let (s, nodes) = de::nodes(s, nn).map_err(|_| malformed("bad node"))?;
    let (s, edges) = de::edges(s, ne).map_err(|_| malformed("bad edge"))?;
    let (s, tris) = de::tris(s, nt).map_err(|_| malformed("bad triangle"))?;
    de::end(s).map_err(|_| malformed("trailing data"))?;

    let flag = |f: i64| i32::try_from(f).map_err(|_| malformed("flag out of range"));
    let idx = |i: i64| usize::try_from(i).map_err(|_| malformed("negative index"));
    let tri = |t: i64| match t {
        -1 => Ok(None),
        t => idx(t).map(Some),
    };

    let nodes = nodes
        .into_iter()
        .map(|(x, y, z, f)| Ok(Node::new([x, y, z]).with_flag(flag(f)?)))
        .collect::<SurfaceResult<Vec<_>>>()?;
    let edges = edges
        .into_iter()
        .map(|(a, b, t1, t2, f)| {
            Ok(Edge::new(idx(a)?, idx(b)?, tri(t1)?, tri(t2)?).with_flag(flag(f)?))
        })
        .collect::<SurfaceResult<Vec<_>>>()?;
    let tris = tris
        .into_iter()
        .map(|(a, b, c, f)| Ok(Triangle::new([idx(a)?, idx(b)?, idx(c)?]).with_flag(flag(f)?)))
        .collect::<SurfaceResult<Vec<_>>>()?;

    let mesh = TriMesh::from_raw(nodes, edges, tris)
        .map_err(|e| SurfaceError::MalformedFile(format!("text trimesh: {}", e)))?;
    let frame = (vused != 0).then(|| [[f[0], f[1], f[2]], [f[3], f[4], f[5]]]);
    Ok(TxtTriMesh { mesh, frame })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh() -> TriMesh {
        let g = fn_grid(4, 3, 30.5, 20.25, |x, y| x * 0.1 - y / 3.0 + 1e6);
        let mut t = TriMesh::from_grid(&g, TriMeshStyle::Equilateral).unwrap();
        let line = FaultLine::discontinuity([[2.0, 1.0, 0.0], [28.0, 19.0, 0.0]]).unwrap();
        t.add_lines(&[line], false).unwrap();
        t.cleanup();
        t
    }

    #[test]
    fn round_trip() {
        let t = mesh();
        let s = to_txt_tmesh(&t, None);
        assert!(s.starts_with("!TXT_TMESH 1.0\n0 1000000000000000000000000000000 "));
        let r = from_txt_tmesh(&s).unwrap();
        assert_eq!(r.mesh, t);
        assert_eq!(r.frame, None);

        let frame = Some([[0.0, -1.5, 2.0], [10.0, 11.0, 12.125]]);
        let mut buf = Vec::new();
        write_txt_tmesh(&mut buf, &t, frame).unwrap();
        let r = read_txt_tmesh(&mut buf.as_slice()).unwrap();
        assert_eq!(r.mesh, t);
        assert_eq!(r.frame, frame);
    }

    #[test]
    fn too_few_elements() {
        let s = "!TXT_TMESH 1.0\n0 1e30 1e30 1e30 1e30 1e30 1e30\n2 3 1\n";
        assert!(matches!(from_txt_tmesh(s), Err(SurfaceError::MalformedFile(_))));
        assert_eq!(last_error_code(), 41);

        let s = "!TXT_TMESH 1.0\n0 1e30 1e30 1e30 1e30 1e30 1e30\n3 3 0\n";
        assert!(from_txt_tmesh(s).is_err());
    }

    #[test]
    fn single_triangle() {
        let s = "!TXT_TMESH 1.0
0 1e30 1e30 1e30 1e30 1e30 1e30
3 3 1
0 0 1 0
1 0 2 0
0 1 3 5
0 1 0 -1 0
1 2 0 -1 0
2 0 0 -1 0
0 1 2 0
";
        let r = from_txt_tmesh(s).unwrap();
        assert_eq!(r.mesh.tri_count(), 1);
        assert_eq!(r.mesh.nodes()[2].flag, 5);
        assert_eq!(r.mesh.edges()[0].tri2(), None);

        // the triangle references an edge that does not exist
        let bad = s.replace("0 1 2 0\n", "0 1 7 0\n");
        assert!(matches!(from_txt_tmesh(&bad), Err(SurfaceError::MalformedFile(_))));

        let bad = s.replace("!TXT_TMESH", "!TRIMESH");
        assert!(from_txt_tmesh(&bad).is_err());
        let truncated = &s[..s.len() - 8];
        assert!(from_txt_tmesh(truncated).is_err());
    }
}
