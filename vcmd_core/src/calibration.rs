//! Persisted zero-calibration record for the sensor suite.
//!
//! Wire layout (little-endian): `{ i32 version, [f32; 9] offsets }` in
//! `SignalId` order. Restore rejects on version mismatch, same policy as
//! the curve loader: no partial state.

use crate::error::CoreError;
use crate::sensors::{SIGNAL_COUNT, SignalId};

/// Schema constant a calibration blob must carry to be restorable.
pub const ZERO_CAL_VERSION: i32 = 2;

const BLOB_BYTES: usize = 4 + SIGNAL_COUNT * 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZeroCalibration {
    offsets: [f32; SIGNAL_COUNT],
}

impl ZeroCalibration {
    pub fn new(offsets: [f32; SIGNAL_COUNT]) -> Self {
        Self { offsets }
    }

    pub fn offset(&self, id: SignalId) -> f32 {
        self.offsets[id as usize]
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BLOB_BYTES);
        out.extend_from_slice(&ZERO_CAL_VERSION.to_le_bytes());
        for v in self.offsets {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() < 4 {
            return Err(CoreError::Truncated {
                needed: BLOB_BYTES,
                got: bytes.len(),
            });
        }
        let version = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if version != ZERO_CAL_VERSION {
            return Err(CoreError::IncompatibleVersion {
                found: version,
                expected: ZERO_CAL_VERSION,
            });
        }
        if bytes.len() < BLOB_BYTES {
            return Err(CoreError::Truncated {
                needed: BLOB_BYTES,
                got: bytes.len(),
            });
        }
        let mut offsets = [0.0f32; SIGNAL_COUNT];
        for (i, slot) in offsets.iter_mut().enumerate() {
            let off = 4 + i * 4;
            *slot = f32::from_le_bytes([
                bytes[off],
                bytes[off + 1],
                bytes[off + 2],
                bytes[off + 3],
            ]);
        }
        Ok(Self { offsets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut offsets = [0.0f32; SIGNAL_COUNT];
        for (i, o) in offsets.iter_mut().enumerate() {
            *o = i as f32 * 0.5 - 1.0;
        }
        let cal = ZeroCalibration::new(offsets);
        let decoded = ZeroCalibration::decode(&cal.encode()).unwrap();
        assert_eq!(decoded, cal);
        assert_eq!(decoded.offset(SignalId::ChamberPressure), 3.0);
    }

    #[test]
    fn rejects_version_mismatch() {
        let mut bytes = ZeroCalibration::new([0.0; SIGNAL_COUNT]).encode();
        bytes[0] = (ZERO_CAL_VERSION + 1) as u8;
        assert!(matches!(
            ZeroCalibration::decode(&bytes),
            Err(CoreError::IncompatibleVersion { .. })
        ));
    }

    #[test]
    fn rejects_truncation() {
        let bytes = ZeroCalibration::new([0.0; SIGNAL_COUNT]).encode();
        assert!(matches!(
            ZeroCalibration::decode(&bytes[..10]),
            Err(CoreError::Truncated { .. })
        ));
    }
}
