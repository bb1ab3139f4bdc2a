use crate::*;

/// Options controlling a gridding calculation.
///
/// Passed by reference into each call. [`GridOptions::default`] is the standard option set.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GridOptions {
    /// Inverse distance weighting power.
    pub distance_power: f64,
    /// Number of nearby points used to evaluate each node.
    pub num_local_points: usize,
    /// Maximum search distance for local points. `None` searches the whole data set.
    pub search_radius: Option<f64>,
    /// Clamp computed values to be at least this value.
    pub min_value: Option<f64>,
    /// Clamp computed values to be at most this value.
    pub max_value: Option<f64>,
    /// Limits the local search to `size_multiplier` times the average data spacing.
    /// Zero is no limit.
    pub size_multiplier: f64,
    /// Extend the local trend when filling nodes far from data, rather than flattening out.
    pub extrapolate_trend: bool,
    /// Scale distances so that the longer data axis does not dominate the local search.
    pub anisotropy: bool,
    /// The interpretation of the grid values.
    pub grid_type: GridFileType,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            distance_power: 2.0,
            num_local_points: 16,
            search_radius: None,
            min_value: None,
            max_value: None,
            size_multiplier: 0.0,
            extrapolate_trend: true,
            anisotropy: false,
            grid_type: GridFileType::Normal,
        }
    }
}

impl GridOptions {
    #[must_use]
    pub fn with_distance_power(mut self, power: f64) -> Self {
        self.distance_power = power;
        self
    }

    #[must_use]
    pub fn with_num_local_points(mut self, n: usize) -> Self {
        self.num_local_points = n;
        self
    }

    #[must_use]
    pub fn with_search_radius(mut self, radius: f64) -> Self {
        self.search_radius = Some(radius);
        self
    }

    #[must_use]
    pub fn with_min_value(mut self, v: f64) -> Self {
        self.min_value = Some(v);
        self
    }

    #[must_use]
    pub fn with_max_value(mut self, v: f64) -> Self {
        self.max_value = Some(v);
        self
    }

    #[must_use]
    pub fn with_size_multiplier(mut self, m: f64) -> Self {
        self.size_multiplier = m;
        self
    }

    #[must_use]
    pub fn with_extrapolate_trend(mut self, on: bool) -> Self {
        self.extrapolate_trend = on;
        self
    }

    #[must_use]
    pub fn with_anisotropy(mut self, on: bool) -> Self {
        self.anisotropy = on;
        self
    }

    #[must_use]
    pub fn with_grid_type(mut self, t: GridFileType) -> Self {
        self.grid_type = t;
        self
    }

    /// Check the options are usable.
    pub fn validate(&self) -> SurfaceResult<()> {
        if !(self.distance_power.is_finite() && self.distance_power >= 0.0) {
            return Err(SurfaceError::InvalidOption("distance power"));
        }
        if self.num_local_points < 3 {
            return Err(SurfaceError::InvalidOption("num local points"));
        }
        if matches!(self.search_radius, Some(r) if !(r > 0.0)) {
            return Err(SurfaceError::InvalidOption("search radius"));
        }
        if !(self.size_multiplier.is_finite() && self.size_multiplier >= 0.0) {
            return Err(SurfaceError::InvalidOption("size multiplier"));
        }
        if let (Some(lo), Some(hi)) = (self.min_value, self.max_value) {
            if lo > hi {
                return Err(SurfaceError::InvalidOption("min value exceeds max value"));
            }
        }
        Ok(())
    }

    /// Apply the min/max clamps. Thickness grids never go negative.
    pub fn clamp(&self, mut z: f64) -> f64 {
        if let Some(lo) = self.min_value {
            z = z.max(lo);
        }
        if let Some(hi) = self.max_value {
            z = z.min(hi);
        }
        if self.grid_type == GridFileType::Thickness {
            z = z.max(0.0);
        }
        z
    }
}

/// How the values of a grid are interpreted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum GridFileType {
    Normal = 1,
    Thickness = 2,
    /// Discrete values, resampled by nearest node.
    Step = 3,
    Blended = 4,
}

impl GridFileType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        use GridFileType::*;
        match tag {
            1 => Some(Normal),
            2 => Some(Thickness),
            3 => Some(Step),
            4 => Some(Blended),
            _ => None,
        }
    }
}

/// Per node reliability of a calculated grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum NodeMask {
    /// Well determined by nearby data.
    Valid = 0,
    /// Outside the data area.
    Outside = 1,
    /// Inside the data area but far from any data point.
    Poor = 2,
}

impl NodeMask {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(NodeMask::Valid),
            1 => Some(NodeMask::Outside),
            2 => Some(NodeMask::Poor),
            _ => None,
        }
    }
}

/// How each grid cell is split into triangles.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TriMeshStyle {
    /// Always split on the lower left to upper right diagonal unless a corner is null.
    CellDiagonals,
    /// Alternate the diagonal in a checkerboard so triangles are closer to equilateral
    /// across the mesh.
    Equilateral,
}

/// Grid resampling method.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ResampleMethod {
    Bilinear,
    Bicubic,
    /// Nearest node.
    Step,
}
