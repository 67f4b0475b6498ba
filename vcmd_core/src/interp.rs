//! Pure interpolation primitives for curve following and property lookups.
//!
//! Both entry points re-derive their result from raw bounds on every call;
//! nothing is incremental, so they can run at tick rate without
//! accumulating error.

use crate::error::BuildError;

/// Linear interpolation of a value between `(t0, a)` and `(t1, b)`.
///
/// Edge policy, applied in order:
/// - `t <= t0` returns `a` exactly
/// - `t >= t1` returns `b` exactly
/// - a degenerate segment (`t0 == t1`) therefore returns `a` at the
///   shared time and `b` for anything past it
#[inline]
pub fn lerp(a: f32, b: f32, t0: f32, t1: f32, t: f32) -> f32 {
    if t <= t0 {
        return a;
    }
    if t >= t1 {
        return b;
    }
    if t0 == t1 {
        return b;
    }
    a + (b - a) * ((t - t0) / (t1 - t0))
}

/// A calibration table of `(input, output)` pairs sorted by input.
///
/// Queries outside the domain clamp to the first/last output. This silent
/// clamp is the deliberate policy for every physical-property lookup in
/// the model; out-of-domain inputs are never an error.
#[derive(Debug, Clone)]
pub struct LookupTable {
    points: &'static [(f32, f32)],
}

impl LookupTable {
    /// Wrap a static table, rejecting empty or unsorted data.
    pub const fn new(points: &'static [(f32, f32)]) -> Result<Self, BuildError> {
        if points.is_empty() {
            return Err(BuildError::InvalidTable("table is empty"));
        }
        let mut i = 1;
        while i < points.len() {
            if points[i].0 < points[i - 1].0 {
                return Err(BuildError::InvalidTable("table inputs not sorted ascending"));
            }
            i += 1;
        }
        Ok(Self { points })
    }

    /// Interpolate `v` against the table with clamp-low / clamp-high.
    pub fn interpolate(&self, v: f32) -> f32 {
        let pts = self.points;
        let (first_in, first_out) = pts[0];
        if v < first_in {
            return first_out;
        }
        for w in pts.windows(2) {
            let (x0, y0) = w[0];
            let (x1, y1) = w[1];
            if x0 <= v && v < x1 {
                return lerp(y0, y1, x0, x1, v);
            }
        }
        pts[pts.len() - 1].1
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[(f32, f32)] = &[(0.0, 10.0), (1.0, 20.0), (3.0, 40.0)];

    #[test]
    fn lerp_edges_exact() {
        assert_eq!(lerp(1.0, 5.0, 2.0, 4.0, 1.0), 1.0);
        assert_eq!(lerp(1.0, 5.0, 2.0, 4.0, 2.0), 1.0);
        assert_eq!(lerp(1.0, 5.0, 2.0, 4.0, 4.0), 5.0);
        assert_eq!(lerp(1.0, 5.0, 2.0, 4.0, 9.0), 5.0);
    }

    #[test]
    fn lerp_degenerate_segment() {
        // At the overlap point the start-clamp rule wins; anything past
        // the shared time jumps to the end value.
        assert_eq!(lerp(1.0, 5.0, 2.0, 2.0, 2.0), 1.0);
        assert_eq!(lerp(1.0, 5.0, 2.0, 2.0, 2.0001), 5.0);
    }

    #[test]
    fn lerp_midpoint() {
        assert_eq!(lerp(0.0, 10.0, 0.0, 1.0, 0.5), 5.0);
    }

    #[test]
    fn table_clamps_below_and_above() {
        let t = LookupTable::new(TABLE).unwrap();
        assert_eq!(t.interpolate(-5.0), 10.0);
        assert_eq!(t.interpolate(99.0), 40.0);
    }

    #[test]
    fn table_interpolates_between_brackets() {
        let t = LookupTable::new(TABLE).unwrap();
        assert_eq!(t.interpolate(0.5), 15.0);
        assert_eq!(t.interpolate(2.0), 30.0);
    }

    #[test]
    fn table_rejects_unsorted() {
        const BAD: &[(f32, f32)] = &[(1.0, 0.0), (0.0, 0.0)];
        assert!(LookupTable::new(BAD).is_err());
    }

    #[test]
    fn table_rejects_empty() {
        const EMPTY: &[(f32, f32)] = &[];
        assert!(LookupTable::new(EMPTY).is_err());
    }
}
