use std::cell::Cell;

/// Errors returned by the gridding, mesh, and padding operations.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("memory allocation failed")]
    Alloc,
    #[error("input data is empty")]
    Empty,
    #[error("invalid parameter: {0}")]
    InvalidOption(&'static str),
    #[error("grid needs at least 2 columns and 2 rows, got {ncol}x{nrow}")]
    GridTooSmall { ncol: usize, nrow: usize },
    #[error("grid extents are inverted or zero sized")]
    InvalidExtents,
    #[error("need at least {needed} points, found {found}")]
    TooFewPoints { needed: usize, found: usize },
    #[error("points are coincident or colinear")]
    Degenerate,
    #[error("fault lines are inconsistent: {0}")]
    FaultMismatch(&'static str),
    #[error("too many points on fault lines")]
    TooManyFaultPoints,
    #[error("coordinate magnitude is too large for the extent range")]
    WildRange,
    #[error("constraint line needs at least 2 distinct points")]
    InvalidLine,
    #[error("no triangle contains the constraint line")]
    NoTriangle,
    #[error("mesh topology is inconsistent: {0}")]
    Topology(String),
    #[error("plane fit has not been calculated")]
    PlaneNotFitted,
    #[error("malformed file: {0}")]
    MalformedFile(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SurfaceError {
    /// The numeric error code, as reported by [`last_error_code`].
    ///
    /// Gridding codes follow the long standing numbering (99 is a wild range), mesh errors are in
    /// the 20s, plane errors in the 30s, and file errors in the 40s.
    pub fn code(&self) -> i32 {
        use SurfaceError::*;
        match self {
            Alloc => 1,
            Empty => 2,
            InvalidOption(_) => 3,
            GridTooSmall { .. } => 4,
            InvalidExtents => 5,
            TooFewPoints { .. } => 6,
            Degenerate => 8,
            FaultMismatch(_) => 9,
            TooManyFaultPoints => 11,
            WildRange => 99,
            InvalidLine => 21,
            NoTriangle => 22,
            Topology(_) => 23,
            PlaneNotFitted => 31,
            MalformedFile(_) => 41,
            Io(_) => 42,
        }
    }
}

pub type SurfaceResult<T> = Result<T, SurfaceError>;

thread_local! {
    static LAST_ERROR: Cell<i32> = Cell::new(0);
}

/// The code of the last error returned by a public operation on this thread, `0` if the last
/// operation succeeded.
pub fn last_error_code() -> i32 {
    LAST_ERROR.with(Cell::get)
}

/// Store the outcome of a public operation in the last error slot.
pub(crate) fn record<T>(r: SurfaceResult<T>) -> SurfaceResult<T> {
    let code = match &r {
        Ok(_) => 0,
        Err(e) => {
            log::debug!("operation failed with code {}: {}", e.code(), e);
            e.code()
        }
    };
    LAST_ERROR.with(|c| c.set(code));
    r
}

/// Allocate a vector filled with `value`, reporting allocation failure instead of aborting.
pub(crate) fn alloc_vec<T: Clone>(len: usize, value: T) -> SurfaceResult<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| SurfaceError::Alloc)?;
    v.resize(len, value);
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let errs = [
            SurfaceError::Alloc,
            SurfaceError::Empty,
            SurfaceError::InvalidOption("x"),
            SurfaceError::GridTooSmall { ncol: 1, nrow: 1 },
            SurfaceError::InvalidExtents,
            SurfaceError::TooFewPoints {
                needed: 3,
                found: 2,
            },
            SurfaceError::Degenerate,
            SurfaceError::FaultMismatch("x"),
            SurfaceError::TooManyFaultPoints,
            SurfaceError::WildRange,
            SurfaceError::InvalidLine,
            SurfaceError::NoTriangle,
            SurfaceError::Topology("x".into()),
            SurfaceError::PlaneNotFitted,
            SurfaceError::MalformedFile("x".into()),
        ];
        let mut codes = errs.iter().map(|e| e.code()).collect::<Vec<_>>();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errs.len());
        assert_eq!(SurfaceError::WildRange.code(), 99);
    }

    #[test]
    fn record_sets_and_clears() {
        let r: SurfaceResult<()> = record(Err(SurfaceError::WildRange));
        assert!(r.is_err());
        assert_eq!(last_error_code(), 99);

        let r = record(Ok(1));
        assert_eq!(r.unwrap(), 1);
        assert_eq!(last_error_code(), 0);
    }

    #[test]
    fn alloc_vec_fills() {
        let v = alloc_vec(4, 2.5).unwrap();
        assert_eq!(v, vec![2.5; 4]);
    }
}
