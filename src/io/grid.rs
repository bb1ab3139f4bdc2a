use super::*;

// grids are serialized as follows:
// **big endian encoding**
// 4 bytes -- b"GSGD"
// 2 bytes u16 -- version
// 1 byte -- grid type tag
// 4 bytes u32 -- column count
// 4 bytes u32 -- row count
// 8 bytes f64 -- x min, y min, x max, y max
// (8 bytes f64: z) --> repeats for all nodes, row first, undefined as 1e30
// 1 byte -- 1 if a mask follows
// (1 byte: mask) --> repeats for all nodes, 0xff undefined
// 4 bytes u32 -- fault line count
// (1 byte kind, 4 bytes u32 point count, (8 bytes f64: x, y, z) --> repeats for points)
// --> repeats for fault lines
const MAGIC: &[u8; 4] = b"GSGD";
const VERSION: u16 = 1;
const NO_MASK: u8 = 0xff;

/// A grid with the values it is stored with.
#[derive(Clone, Debug, PartialEq)]
pub struct GridFile {
    pub grid: Grid,
    pub grid_type: GridFileType,
    /// Node reliability, with the same geometry as `grid`.
    pub mask: Option<MaskGrid>,
    pub faults: Vec<FaultLine>,
}

impl GridFile {
    /// A normal grid with no mask or faults.
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            grid_type: GridFileType::Normal,
            mask: None,
            faults: Vec::new(),
        }
    }
}

/// Write a grid file.
pub fn write_grid<W: Write>(wtr: &mut W, file: &GridFile) -> SurfaceResult<()> {
    record(ser(wtr, file))
}

fn ser<W: Write>(wtr: &mut W, file: &GridFile) -> SurfaceResult<()> {
    let geom = file.grid.geometry();
    if let Some(m) = &file.mask {
        if m.geometry() != geom {
            return Err(SurfaceError::InvalidOption("mask geometry does not match the grid"));
        }
    }
    let count = |n: usize| {
        u32::try_from(n).map_err(|_| SurfaceError::InvalidOption("too many items for a grid file"))
    };

    wtr.write_all(MAGIC)?;
    wtr.write_u16::<BE>(VERSION)?;
    wtr.write_u8(file.grid_type.tag())?;
    wtr.write_u32::<BE>(count(geom.ncol())?)?;
    wtr.write_u32::<BE>(count(geom.nrow())?)?;
    let ([x0, y0], [x1, y1]) = (geom.min(), geom.max());
    for v in [x0, y0, x1, y1] {
        wtr.write_f64::<BE>(v)?;
    }

    for z in file.grid.to_values() {
        wtr.write_f64::<BE>(z)?;
    }

    match &file.mask {
        Some(m) => {
            wtr.write_u8(1)?;
            let bytes = m
                .zs()
                .iter()
                .map(|k| k.map_or(NO_MASK, |k| k as u8))
                .collect::<Vec<_>>();
            wtr.write_all(&bytes)?;
        }
        None => wtr.write_u8(0)?,
    }

    wtr.write_u32::<BE>(count(file.faults.len())?)?;
    for f in &file.faults {
        wtr.write_u8(f.is_discontinuity() as u8)?;
        wtr.write_u32::<BE>(count(f.len())?)?;
        for &[x, y, z] in f.points() {
            wtr.write_f64::<BE>(x)?;
            wtr.write_f64::<BE>(y)?;
            wtr.write_f64::<BE>(z)?;
        }
    }
    Ok(())
}

/// Read a grid file from a buffer.
pub fn from_grid_bytes(bytes: &[u8]) -> SurfaceResult<GridFile> {
    record(de(&mut Cursor::new(bytes)))
}

/// Read a grid file.
pub fn read_grid<R: Read>(rdr: &mut R) -> SurfaceResult<GridFile> {
    record(de(rdr))
}

fn de<R: Read>(c: &mut R) -> SurfaceResult<GridFile> {
    de_inner(c).map_err(|e| match e {
        SurfaceError::Io(e) => eof_malformed(e),
        e => e,
    })
}

fn de_inner<R: Read>(c: &mut R) -> SurfaceResult<GridFile> {
    let malformed = |s: &str| SurfaceError::MalformedFile(format!("grid: {}", s));

    let mut magic = [0; 4];
    c.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(malformed("not a grid file"));
    }
    let version = c.read_u16::<BE>()?;
    if version != VERSION {
        return Err(malformed("unsupported version"));
    }
    let grid_type = GridFileType::from_tag(c.read_u8()?).ok_or_else(|| malformed("grid type"))?;

    let ncol = c.read_u32::<BE>()? as usize;
    let nrow = c.read_u32::<BE>()? as usize;
    let mut ext = [0.0; 4];
    for v in &mut ext {
        *v = c.read_f64::<BE>()?;
    }
    let [x0, y0, x1, y1] = ext;
    let geom = GridGeometry::new(ncol, nrow, [x0, y0], [x1, y1])
        .map_err(|e| malformed(&e.to_string()))?;

    let mut values = alloc_vec(geom.len(), 0.0)?;
    c.read_f64_into::<BE>(&mut values)?;
    let grid = Grid::from_values(geom, &values)?;

    let mask = match c.read_u8()? {
        0 => None,
        1 => {
            let mut bytes = alloc_vec(geom.len(), 0u8)?;
            c.read_exact(&mut bytes)?;
            let mut m = MaskGrid::try_blank(geom)?;
            for (i, b) in bytes.into_iter().enumerate() {
                let k = match b {
                    NO_MASK => None,
                    b => Some(NodeMask::from_byte(b).ok_or_else(|| malformed("mask value"))?),
                };
                m.set_idx(i, k);
            }
            Some(m)
        }
        _ => return Err(malformed("mask flag")),
    };

    let nfaults = c.read_u32::<BE>()?;
    let mut faults = Vec::new();
    for _ in 0..nfaults {
        let kind = match c.read_u8()? {
            0 => LineKind::Boundary,
            1 => LineKind::Discontinuity,
            _ => return Err(malformed("fault kind")),
        };
        let n = c.read_u32::<BE>()? as usize;
        let mut pts = Vec::new();
        for _ in 0..n {
            let x = c.read_f64::<BE>()?;
            let y = c.read_f64::<BE>()?;
            let z = c.read_f64::<BE>()?;
            pts.push([x, y, z]);
        }
        faults.push(FaultLine::new(pts, kind).map_err(|_| malformed("fault line"))?);
    }

    Ok(GridFile {
        grid,
        grid_type,
        mask,
        faults,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut g = fn_grid(5, 4, 120.0, 75.5, |x, y| (x * 0.37).cos() * 12.5 + y);
        g.set(3, 2, None);
        let pts = (0..10)
            .map(|i| [i as f64 * 12.0, 37.5, 100.0])
            .collect::<Vec<_>>();
        let geom = *g.geometry();
        let (_, mask) = calc_grid_with_mask(
            &[[0.0, 0.0, 1.0], [120.0, 0.0, 2.0], [60.0, 75.5, 3.0]],
            &[],
            geom,
            &GridOptions::default(),
        )
        .unwrap();

        let file = GridFile {
            grid: g,
            grid_type: GridFileType::Thickness,
            mask: Some(mask),
            faults: vec![
                FaultLine::discontinuity(pts).unwrap(),
                FaultLine::boundary([[0.0, 0.0, NULL_VALUE], [5.0, 5.0, NULL_VALUE]]).unwrap(),
            ],
        };

        let mut buf = Vec::new();
        write_grid(&mut buf, &file).unwrap();
        assert_eq!(&buf[..4], b"GSGD");
        let back = from_grid_bytes(&buf).unwrap();
        assert_eq!(back, file);
        assert_eq!(back.grid.z(3, 2), None);

        let back = read_grid(&mut buf.as_slice()).unwrap();
        assert_eq!(back, file);
    }

    #[test]
    fn plain_grid() {
        let file = GridFile::new(dummy_grid());
        let mut buf = Vec::new();
        write_grid(&mut buf, &file).unwrap();
        // header, 6 values, no mask, no faults
        assert_eq!(buf.len(), 4 + 2 + 1 + 8 + 32 + 48 + 1 + 4);
        assert_eq!(from_grid_bytes(&buf).unwrap(), file);
    }

    #[test]
    fn malformed() {
        let file = GridFile::new(dummy_grid());
        let mut buf = Vec::new();
        write_grid(&mut buf, &file).unwrap();

        assert!(from_grid_bytes(&buf[..buf.len() - 3]).is_err());
        assert_eq!(last_error_code(), 41);

        let mut bad = buf.clone();
        bad[0] = b'X';
        assert!(from_grid_bytes(&bad).is_err());
        assert_eq!(last_error_code(), 41);

        // grid type tag
        let mut bad = buf;
        bad[6] = 9;
        assert!(from_grid_bytes(&bad).is_err());

        let mut f = GridFile::new(dummy_grid());
        f.mask = Some(MaskGrid::blank(
            GridGeometry::new(3, 3, [0.0, 0.0], [1.0, 1.0]).unwrap(),
        ));
        assert!(write_grid(&mut Vec::new(), &f).is_err());
        assert_eq!(last_error_code(), 3);
    }
}
