//! Loaded, versioned valve/thrust curves and their wire format.
//!
//! Wire layout (little-endian, fixed-size records):
//! header `{ i32 version, [u8; 50] label, u8 is_thrust, i32 num_points }`
//! followed by `num_points` waypoint records: `{ f32 time, f32 lox_angle,
//! f32 ipa_angle }` for angle curves or `{ f32 time, f32 thrust }` for
//! thrust curves. A version mismatch invalidates the whole file; there is
//! no forward/backward compatibility shim.

use crate::error::CoreError;
use crate::interp::lerp;

/// Schema constant a curve file must carry to be loadable by this build.
pub const CURVE_SCHEMA_VERSION: i32 = 4;

const LABEL_BYTES: usize = 50;
const HEADER_BYTES: usize = 4 + LABEL_BYTES + 1 + 4;
const ANGLE_RECORD_BYTES: usize = 12;
const THRUST_RECORD_BYTES: usize = 8;

/// One waypoint of an angle curve. Angles are degrees, 0-90.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnglePoint {
    pub time: f32,
    pub lox_angle: f32,
    pub ipa_angle: f32,
}

/// One waypoint of a thrust curve. Thrust in lbf.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrustPoint {
    pub time: f32,
    pub thrust: f32,
}

/// An ordered waypoint sequence; the form is fixed for the whole curve.
#[derive(Debug, Clone, PartialEq)]
pub enum Curve {
    Angle(Vec<AnglePoint>),
    Thrust(Vec<ThrustPoint>),
}

impl Curve {
    pub fn len(&self) -> usize {
        match self {
            Curve::Angle(p) => p.len(),
            Curve::Thrust(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_thrust(&self) -> bool {
        matches!(self, Curve::Thrust(_))
    }

    fn time_at(&self, i: usize) -> f32 {
        match self {
            Curve::Angle(p) => p[i].time,
            Curve::Thrust(p) => p[i].time,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurveHeader {
    pub version: i32,
    pub label: String,
    pub is_thrust: bool,
    pub num_points: i32,
}

/// Interpolated command for one tick of an angle curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleCommand {
    /// Index of the segment the query time fell in.
    pub segment: usize,
    pub lox_angle: f32,
    pub ipa_angle: f32,
}

/// Interpolated command for one tick of a thrust curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrustCommand {
    pub segment: usize,
    pub thrust: f32,
}

/// Holds the one loaded curve. Loading replaces the previous curve only
/// after the new one fully validates; a bad file leaves the store
/// untouched.
#[derive(Debug, Default)]
pub struct CurveStore {
    loaded: Option<(CurveHeader, Curve)>,
}

impl CurveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn header(&self) -> Option<&CurveHeader> {
        self.loaded.as_ref().map(|(h, _)| h)
    }

    pub fn curve(&self) -> Option<&Curve> {
        self.loaded.as_ref().map(|(_, c)| c)
    }

    pub fn is_thrust(&self) -> Result<bool, CoreError> {
        self.curve().map(Curve::is_thrust).ok_or(CoreError::CurveNotLoaded)
    }

    pub fn count(&self) -> usize {
        self.curve().map_or(0, Curve::len)
    }

    /// Time of the final waypoint; the run completes when it is reached.
    pub fn end_time(&self) -> Result<f32, CoreError> {
        let curve = self.curve().ok_or(CoreError::CurveNotLoaded)?;
        Ok(curve.time_at(curve.len() - 1))
    }

    /// Validate and install a curve. On any failure the previously loaded
    /// curve (if any) stays in place.
    pub fn load(&mut self, header: CurveHeader, curve: Curve) -> Result<(), CoreError> {
        validate(&header, &curve)?;
        tracing::info!(
            label = %header.label,
            points = curve.len(),
            is_thrust = curve.is_thrust(),
            "curve loaded"
        );
        self.loaded = Some((header, curve));
        Ok(())
    }

    /// Decode a wire/file image and install it.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<(), CoreError> {
        let (header, curve) = decode(bytes)?;
        self.load(header, curve)
    }

    /// Interpolated angle command at `t` seconds into the run.
    pub fn angles_at(&self, t: f32) -> Result<AngleCommand, CoreError> {
        match self.curve() {
            Some(Curve::Angle(points)) => {
                let (i, a, b) = segment_at(points, |p| p.time, t);
                Ok(AngleCommand {
                    segment: i,
                    lox_angle: lerp(a.lox_angle, b.lox_angle, a.time, b.time, t),
                    ipa_angle: lerp(a.ipa_angle, b.ipa_angle, a.time, b.time, t),
                })
            }
            Some(Curve::Thrust(_)) => Err(CoreError::InvalidState {
                op: "angles_at",
                state: "thrust curve loaded",
            }),
            None => Err(CoreError::CurveNotLoaded),
        }
    }

    /// Interpolated thrust command at `t` seconds into the run.
    pub fn thrust_at(&self, t: f32) -> Result<ThrustCommand, CoreError> {
        match self.curve() {
            Some(Curve::Thrust(points)) => {
                let (i, a, b) = segment_at(points, |p| p.time, t);
                Ok(ThrustCommand {
                    segment: i,
                    thrust: lerp(a.thrust, b.thrust, a.time, b.time, t),
                })
            }
            Some(Curve::Angle(_)) => Err(CoreError::InvalidState {
                op: "thrust_at",
                state: "angle curve loaded",
            }),
            None => Err(CoreError::CurveNotLoaded),
        }
    }
}

/// Find the segment containing `t`: returns `(index, start, end)`.
/// Before the first waypoint the first segment is used (lerp clamps);
/// past the last waypoint the final segment is used likewise.
fn segment_at<P: Copy>(points: &[P], time: impl Fn(&P) -> f32, t: f32) -> (usize, P, P) {
    debug_assert!(points.len() >= 2, "validated curves have >= 2 points");
    for (i, w) in points.windows(2).enumerate() {
        if t < time(&w[1]) {
            return (i, w[0], w[1]);
        }
    }
    let last = points.len() - 1;
    (last - 1, points[last - 1], points[last])
}

fn validate(header: &CurveHeader, curve: &Curve) -> Result<(), CoreError> {
    if header.version != CURVE_SCHEMA_VERSION {
        return Err(CoreError::IncompatibleVersion {
            found: header.version,
            expected: CURVE_SCHEMA_VERSION,
        });
    }
    if header.label.len() > LABEL_BYTES - 1 {
        return Err(CoreError::MalformedCurve("label longer than 49 bytes"));
    }
    if header.is_thrust != curve.is_thrust() {
        return Err(CoreError::MalformedCurve("header form does not match points"));
    }
    if header.num_points < 2 || header.num_points as usize != curve.len() {
        return Err(CoreError::MalformedCurve(
            "num_points must be >= 2 and match the point count",
        ));
    }
    let mut prev = f32::NEG_INFINITY;
    for i in 0..curve.len() {
        let t = curve.time_at(i);
        if !t.is_finite() || t < 0.0 {
            return Err(CoreError::MalformedCurve("waypoint time must be finite and >= 0"));
        }
        if t < prev {
            return Err(CoreError::MalformedCurve("waypoint times must be non-decreasing"));
        }
        prev = t;
    }
    if let Curve::Angle(points) = curve {
        for p in points {
            if !(0.0..=90.0).contains(&p.lox_angle) || !(0.0..=90.0).contains(&p.ipa_angle) {
                return Err(CoreError::MalformedCurve("angles must be within 0-90 degrees"));
            }
        }
    }
    Ok(())
}

/// Decode a curve image without installing it.
pub fn decode(bytes: &[u8]) -> Result<(CurveHeader, Curve), CoreError> {
    if bytes.len() < HEADER_BYTES {
        return Err(CoreError::Truncated {
            needed: HEADER_BYTES,
            got: bytes.len(),
        });
    }
    let version = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    // Reject the version before touching anything else: no partial load.
    if version != CURVE_SCHEMA_VERSION {
        return Err(CoreError::IncompatibleVersion {
            found: version,
            expected: CURVE_SCHEMA_VERSION,
        });
    }
    let label_raw = &bytes[4..4 + LABEL_BYTES];
    let label_end = label_raw.iter().position(|&b| b == 0).unwrap_or(LABEL_BYTES);
    let label = String::from_utf8_lossy(&label_raw[..label_end]).into_owned();
    let is_thrust = bytes[4 + LABEL_BYTES] != 0;
    let np_off = 4 + LABEL_BYTES + 1;
    let num_points = i32::from_le_bytes([
        bytes[np_off],
        bytes[np_off + 1],
        bytes[np_off + 2],
        bytes[np_off + 3],
    ]);
    if num_points < 2 {
        return Err(CoreError::MalformedCurve("num_points must be >= 2"));
    }
    let n = num_points as usize;
    let record = if is_thrust {
        THRUST_RECORD_BYTES
    } else {
        ANGLE_RECORD_BYTES
    };
    let needed = HEADER_BYTES + n * record;
    if bytes.len() < needed {
        return Err(CoreError::Truncated {
            needed,
            got: bytes.len(),
        });
    }
    let body = &bytes[HEADER_BYTES..needed];
    let curve = if is_thrust {
        let points = body
            .chunks_exact(THRUST_RECORD_BYTES)
            .map(|c| ThrustPoint {
                time: f32_le(c, 0),
                thrust: f32_le(c, 4),
            })
            .collect();
        Curve::Thrust(points)
    } else {
        let points = body
            .chunks_exact(ANGLE_RECORD_BYTES)
            .map(|c| AnglePoint {
                time: f32_le(c, 0),
                lox_angle: f32_le(c, 4),
                ipa_angle: f32_le(c, 8),
            })
            .collect();
        Curve::Angle(points)
    };
    let header = CurveHeader {
        version,
        label,
        is_thrust,
        num_points,
    };
    Ok((header, curve))
}

/// Encode a curve to its wire image (round-trip tooling and tests).
pub fn encode(header: &CurveHeader, curve: &Curve) -> Result<Vec<u8>, CoreError> {
    validate(header, curve)?;
    let record = if curve.is_thrust() {
        THRUST_RECORD_BYTES
    } else {
        ANGLE_RECORD_BYTES
    };
    let mut out = Vec::with_capacity(HEADER_BYTES + curve.len() * record);
    out.extend_from_slice(&header.version.to_le_bytes());
    let mut label = [0u8; LABEL_BYTES];
    let lbytes = header.label.as_bytes();
    label[..lbytes.len()].copy_from_slice(lbytes);
    out.extend_from_slice(&label);
    out.push(u8::from(header.is_thrust));
    out.extend_from_slice(&header.num_points.to_le_bytes());
    match curve {
        Curve::Angle(points) => {
            for p in points {
                out.extend_from_slice(&p.time.to_le_bytes());
                out.extend_from_slice(&p.lox_angle.to_le_bytes());
                out.extend_from_slice(&p.ipa_angle.to_le_bytes());
            }
        }
        Curve::Thrust(points) => {
            for p in points {
                out.extend_from_slice(&p.time.to_le_bytes());
                out.extend_from_slice(&p.thrust.to_le_bytes());
            }
        }
    }
    Ok(out)
}

#[inline]
fn f32_le(c: &[u8], off: usize) -> f32 {
    f32::from_le_bytes([c[off], c[off + 1], c[off + 2], c[off + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thrust_header(n: i32) -> CurveHeader {
        CurveHeader {
            version: CURVE_SCHEMA_VERSION,
            label: "RAMP".into(),
            is_thrust: true,
            num_points: n,
        }
    }

    fn ramp() -> Curve {
        Curve::Thrust(vec![
            ThrustPoint { time: 0.0, thrust: 0.0 },
            ThrustPoint { time: 1.0, thrust: 300.0 },
            ThrustPoint { time: 2.0, thrust: 300.0 },
        ])
    }

    #[test]
    fn load_and_query_thrust() {
        let mut store = CurveStore::new();
        store.load(thrust_header(3), ramp()).unwrap();
        assert!(store.is_loaded());
        assert!(store.is_thrust().unwrap());
        assert_eq!(store.count(), 3);
        assert_eq!(store.end_time().unwrap(), 2.0);
        let cmd = store.thrust_at(0.5).unwrap();
        assert_eq!(cmd.segment, 0);
        assert_eq!(cmd.thrust, 150.0);
        let cmd = store.thrust_at(1.5).unwrap();
        assert_eq!(cmd.segment, 1);
        assert_eq!(cmd.thrust, 300.0);
    }

    #[test]
    fn version_mismatch_keeps_previous_curve() {
        let mut store = CurveStore::new();
        store.load(thrust_header(3), ramp()).unwrap();
        let mut bad = thrust_header(3);
        bad.version = CURVE_SCHEMA_VERSION - 1;
        let err = store.load(bad, ramp()).unwrap_err();
        assert!(matches!(err, CoreError::IncompatibleVersion { .. }));
        // Prior curve untouched.
        assert_eq!(store.count(), 3);
        assert_eq!(store.header().unwrap().label, "RAMP");
    }

    #[test]
    fn rejects_decreasing_time() {
        let mut store = CurveStore::new();
        let curve = Curve::Thrust(vec![
            ThrustPoint { time: 1.0, thrust: 0.0 },
            ThrustPoint { time: 0.5, thrust: 10.0 },
        ]);
        let err = store.load(thrust_header(2), curve).unwrap_err();
        assert!(matches!(err, CoreError::MalformedCurve(_)));
        assert!(!store.is_loaded());
    }

    #[test]
    fn rejects_out_of_range_angle() {
        let mut store = CurveStore::new();
        let header = CurveHeader {
            version: CURVE_SCHEMA_VERSION,
            label: "A".into(),
            is_thrust: false,
            num_points: 2,
        };
        let curve = Curve::Angle(vec![
            AnglePoint { time: 0.0, lox_angle: 0.0, ipa_angle: 0.0 },
            AnglePoint { time: 1.0, lox_angle: 95.0, ipa_angle: 10.0 },
        ]);
        assert!(store.load(header, curve).is_err());
    }

    #[test]
    fn wire_round_trip() {
        let header = thrust_header(3);
        let bytes = encode(&header, &ramp()).unwrap();
        let (h2, c2) = decode(&bytes).unwrap();
        assert_eq!(h2, header);
        assert_eq!(c2, ramp());
    }

    #[test]
    fn decode_rejects_wrong_version_first() {
        let mut bytes = encode(&thrust_header(3), &ramp()).unwrap();
        bytes[0] = 0xFF;
        assert!(matches!(
            decode(&bytes),
            Err(CoreError::IncompatibleVersion { .. })
        ));
    }

    #[test]
    fn decode_rejects_truncation() {
        let bytes = encode(&thrust_header(3), &ramp()).unwrap();
        let cut = &bytes[..bytes.len() - 3];
        assert!(matches!(decode(cut), Err(CoreError::Truncated { .. })));
    }

    #[test]
    fn angle_query_on_thrust_curve_is_invalid_state() {
        let mut store = CurveStore::new();
        store.load(thrust_header(3), ramp()).unwrap();
        assert!(matches!(
            store.angles_at(0.5),
            Err(CoreError::InvalidState { .. })
        ));
    }
}
