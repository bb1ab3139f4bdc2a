use criterion::*;
use geosurf::*;

fn grid(size: usize) -> Grid {
    let geom = GridGeometry::new(
        size,
        size,
        [300.0, 150.0],
        [300.0 + 30.0 * (size - 1) as f64, 150.0 + 30.0 * (size - 1) as f64],
    )
    .unwrap();
    let values = (0..size * size)
        .map(|i| ((i % size) as f64 * 0.1).sin() * 50.0 + (i / size) as f64)
        .collect::<Vec<_>>();
    Grid::from_values(geom, &values).unwrap()
}

fn scattered(n: usize) -> Vec<Point3> {
    (0..n)
        .map(|i| {
            let x = (i * 7919 % 1000) as f64;
            let y = (i * 104_729 % 1000) as f64;
            [x, y, (x * 0.01).sin() * 20.0 + y * 0.05]
        })
        .collect()
}

fn planes(c: &mut Criterion) {
    fn points(size: usize) -> Vec<Point3> {
        (0..size)
            .flat_map(move |x| (0..size).map(move |y| (x, y)))
            .enumerate()
            .map(|(z, (x, y))| [x as f64, y as f64, z as f64])
            .collect()
    }
    c.bench_function("fit least sqs small", |b| {
        let points = points(5);
        b.iter(|| Plane::fit_least_sqs(&points))
    });
    c.bench_function("fit least sqs large", |b| {
        let points = points(100);
        b.iter(|| Plane::fit_least_sqs(&points))
    });
}

fn gridding(c: &mut Criterion) {
    let opts = GridOptions::default();

    c.bench_function("calc grid 500 points", |b| {
        let pts = scattered(500);
        let geom = recommended_size(&pts, None).unwrap();
        b.iter(|| calc_grid(&pts, &[], geom, &opts))
    });

    c.bench_function("calc grid 500 points faulted", |b| {
        let pts = scattered(500);
        let geom = recommended_size(&pts, None).unwrap();
        let faults = [
            FaultLine::discontinuity([[500.0, -10.0, 0.0], [520.0, 1010.0, 0.0]]).unwrap(),
            FaultLine::discontinuity([[-10.0, 300.0, 0.0], [600.0, 320.0, 0.0]]).unwrap(),
        ];
        b.iter(|| calc_grid(&pts, &faults, geom, &opts))
    });

    c.bench_function("contours to grid 100", |b| {
        let contours = (0..50)
            .map(|i| {
                let y = i as f64 * 20.0 + 3.0;
                ContourLine::new([[-5.0, y], [500.0, y + 40.0], [1005.0, y]], i as f64).unwrap()
            })
            .collect::<Vec<_>>();
        let geom = GridGeometry::new(100, 100, [0.0, 0.0], [1000.0, 1000.0]).unwrap();
        b.iter(|| contours_to_grid(&contours, &[], geom, &opts))
    });
}

fn trimeshs(c: &mut Criterion) {
    c.bench_function("triangulate 100", |b| {
        let g = grid(100);
        b.iter(|| TriMesh::from_grid(&g, TriMeshStyle::Equilateral))
    });

    c.bench_function("outline 100", |b| {
        let mesh = TriMesh::from_grid(&grid(100), TriMeshStyle::CellDiagonals).unwrap();
        b.iter(|| mesh.outline_boundary());
    });

    c.bench_function("add fault 100", |b| {
        let mesh = TriMesh::from_grid(&grid(100), TriMeshStyle::Equilateral).unwrap();
        let fault = FaultLine::discontinuity([
            [310.0, 140.0, 0.0],
            [1500.0, 1700.0, 0.0],
            [3300.0, 2000.0, 0.0],
        ])
        .unwrap();
        b.iter(|| mesh.clone().add_lines(&[fault.clone()], false))
    });

    c.bench_function("add fault 200", |b| {
        let mesh = TriMesh::from_grid(&grid(200), TriMeshStyle::CellDiagonals).unwrap();
        let fault =
            FaultLine::discontinuity([[290.0, 140.0, 0.0], [6300.0, 6140.0, 0.0]]).unwrap();
        b.iter(|| mesh.clone().add_lines(&[fault.clone()], false))
    });

    c.bench_function("grid from trimesh 250", |b| {
        let g = grid(250);
        let mesh = TriMesh::from_grid(&g, TriMeshStyle::Equilateral).unwrap();
        b.iter(|| grid_from_trimesh_nodes(&mesh, *g.geometry()));
    });
}

fn padding(c: &mut Criterion) {
    c.bench_function("pad fault 25", |b| {
        let mesh = TriMesh::from_grid(&grid(25), TriMeshStyle::Equilateral).unwrap();
        let mut sgp = SurfaceGroupPlane::new();
        sgp.add_trimesh_for_fit(&mesh).unwrap();
        sgp.calc_plane_coefs().unwrap();
        let bb = mesh.bounding_box().unwrap();
        let target = Extents3 {
            origin: bb.origin.sub([200.0, 200.0, 0.0]),
            size: bb.size.add([400.0, 400.0, 0.0]),
        };
        b.iter(|| {
            PadSurface::new()
                .set_surface_group_plane(&sgp)
                .pad_fault_surface(&mesh, target, 60.0, None)
        })
    });
}

criterion_group!(benches, planes, gridding, trimeshs, padding);
criterion_main!(benches);
