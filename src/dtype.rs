//! Cell data types and the narrowing rules used when a layer is burned.

use std::fmt;

/// Numeric type of a raster layer's cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    UInt64,
    Int64,
    Float32,
    Float64,
}

const SIGNED: [DType; 4] = [DType::Int8, DType::Int16, DType::Int32, DType::Int64];
const UNSIGNED: [DType; 4] = [DType::UInt8, DType::UInt16, DType::UInt32, DType::UInt64];

impl DType {
    pub fn name(&self) -> &'static str {
        match self {
            DType::UInt8 => "uint8",
            DType::Int8 => "int8",
            DType::UInt16 => "uint16",
            DType::Int16 => "int16",
            DType::UInt32 => "uint32",
            DType::Int32 => "int32",
            DType::UInt64 => "uint64",
            DType::Int64 => "int64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }

    pub fn is_integer(&self) -> bool {
        !self.is_float()
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }

    pub fn is_signed(&self) -> bool {
        !UNSIGNED.contains(self)
    }

    /// Size of one cell in bytes.
    pub fn itemsize(&self) -> usize {
        match self {
            DType::UInt8 | DType::Int8 => 1,
            DType::UInt16 | DType::Int16 => 2,
            DType::UInt32 | DType::Int32 | DType::Float32 => 4,
            DType::UInt64 | DType::Int64 | DType::Float64 => 8,
        }
    }

    /// Inclusive value range of an integer type, `None` for floats.
    pub fn integer_range(&self) -> Option<(f64, f64)> {
        let range = match self {
            DType::UInt8 => (0.0, u8::MAX as f64),
            DType::Int8 => (i8::MIN as f64, i8::MAX as f64),
            DType::UInt16 => (0.0, u16::MAX as f64),
            DType::Int16 => (i16::MIN as f64, i16::MAX as f64),
            DType::UInt32 => (0.0, u32::MAX as f64),
            DType::Int32 => (i32::MIN as f64, i32::MAX as f64),
            DType::UInt64 => (0.0, u64::MAX as f64),
            DType::Int64 => (i64::MIN as f64, i64::MAX as f64),
            DType::Float32 | DType::Float64 => return None,
        };
        Some(range)
    }

    /// Whether `value` can be stored in this type without loss of meaning.
    pub fn can_hold(&self, value: f64) -> bool {
        match self.integer_range() {
            Some((lo, hi)) => {
                value.is_finite() && value.fract() == 0.0 && value >= lo && value <= hi
            }
            None => match self {
                DType::Float32 => !value.is_finite() || value.abs() <= f32::MAX as f64,
                _ => true,
            },
        }
    }

    /// Store `value` the way a cell of this type would.
    pub fn cast(&self, value: f64) -> f64 {
        match self.integer_range() {
            Some((lo, hi)) => {
                if value.is_nan() {
                    0.0
                } else {
                    value.trunc().clamp(lo, hi)
                }
            }
            None => match self {
                DType::Float32 => value as f32 as f64,
                _ => value,
            },
        }
    }

    /// Smallest integer type whose range contains `[lo, hi]`.
    pub fn smallest_integer(lo: f64, hi: f64, signed: bool) -> Option<DType> {
        let candidates: &[DType] = if signed || lo < 0.0 { &SIGNED } else { &UNSIGNED };
        candidates.iter().copied().find(|dtype| {
            let (min, max) = dtype.integer_range().unwrap_or((0.0, 0.0));
            lo >= min && hi <= max
        })
    }

    /// Common type able to hold the values of both `self` and `other`.
    pub fn promote(self, other: DType) -> DType {
        if self == other {
            return self;
        }
        match (self.integer_range(), other.integer_range()) {
            (Some((lo_a, hi_a)), Some((lo_b, hi_b))) => DType::smallest_integer(
                lo_a.min(lo_b),
                hi_a.max(hi_b),
                self.is_signed() || other.is_signed(),
            )
            .filter(|dtype| dtype.itemsize() < 8)
            .unwrap_or(DType::Float64),
            (Some(_), None) | (None, Some(_)) => {
                let (integer, float) = if self.is_float() {
                    (other, self)
                } else {
                    (self, other)
                };
                if float == DType::Float32 && integer.itemsize() <= 2 {
                    DType::Float32
                } else {
                    DType::Float64
                }
            }
            (None, None) => DType::Float64,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Integer-width constraints of the raster encoding layers are written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterEncoding {
    /// Older GDAL releases (< 3.7) cannot store signed 8-bit bands.
    pub int8_supported: bool,
}

impl RasterEncoding {
    /// Constraints of a GDAL release given as `GDAL_VERSION_NUM`, e.g.
    /// `3070000` for 3.7.0.
    pub fn for_gdal_version_num(version_num: i64) -> Self {
        Self {
            int8_supported: version_num >= 3_070_000,
        }
    }

    /// Constraints of the GDAL library linked at runtime.
    pub fn from_gdal() -> Self {
        let version = gdal::version::version_info("VERSION_NUM");
        match version.trim().parse::<i64>() {
            Ok(num) => Self::for_gdal_version_num(num),
            Err(_) => {
                tracing::warn!("Unrecognised GDAL version number '{}'", version);
                Self::default()
            }
        }
    }
}

impl Default for RasterEncoding {
    fn default() -> Self {
        Self {
            int8_supported: true,
        }
    }
}

/// Pick the narrowest dtype that stores `values` and `fill` under `encoding`.
///
/// Integer sources are narrowed to the smallest integer type covering the
/// data range and the fill value. 64-bit integers become `float64` because
/// GDAL cannot burn them, int8 becomes int16 when the encoding lacks it and
/// a NaN fill forces a float type. Float sources keep their width unless
/// the fill does not fit in `float32`.
pub fn minimize_dtype(
    source: DType,
    values: impl IntoIterator<Item = f64>,
    fill: f64,
    encoding: RasterEncoding,
) -> DType {
    if source.is_float() {
        return if source.can_hold(fill) {
            source
        } else {
            DType::Float64
        };
    }

    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for value in values.into_iter().filter(|v| v.is_finite()) {
        lo = lo.min(value);
        hi = hi.max(value);
    }
    if !fill.is_nan() {
        lo = lo.min(fill);
        hi = hi.max(fill);
    }
    if lo > hi {
        // no data and a NaN fill
        lo = 0.0;
        hi = 0.0;
    }

    let integral = fill.is_nan() || fill.fract() == 0.0;
    let mut dtype = match DType::smallest_integer(lo, hi, source.is_signed()) {
        Some(dtype) if integral => dtype,
        _ => DType::Float64,
    };
    if matches!(dtype, DType::Int64 | DType::UInt64) {
        dtype = DType::Float64;
    }
    if dtype == DType::Int8 && !encoding.int8_supported {
        dtype = DType::Int16;
    }
    if fill.is_nan() && dtype.is_integer() {
        dtype = if dtype.itemsize() > 2 {
            DType::Float64
        } else {
            DType::Float32
        };
    }
    dtype
}
