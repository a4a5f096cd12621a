//! Segment building and response dispatch
//!
//! A batched read takes N named points, merges compatible address spans
//! into as few physical read segments as the batch policy allows, and
//! afterwards slices each segment's response buffer back out to the
//! points (byte offsets for registers, single bits for coils/discretes).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ModbusError, Result};
use crate::message::FunctionCode;
use crate::point::{ModbusAddress, ModbusPoint};

/// Merge policy for segment building
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchPolicy {
    /// Maximum points merged into one segment; 0 means unlimited
    pub batch_size: u16,
    /// Tolerated gap between a segment's end and the next point's start
    pub gap: u16,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: 0,
            gap: 0,
        }
    }
}

/// One physical read span covering one or more points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Read function code shared by the covered points
    pub code: FunctionCode,
    /// Start address (register or bit units per the code)
    pub address: u16,
    /// Unit count
    pub count: u16,
    /// Response buffer, filled by the physical read
    pub data: Option<Vec<u8>>,
}

impl Segment {
    /// Exclusive end of the span
    fn end(&self) -> u32 {
        u32::from(self.address) + u32::from(self.count)
    }
}

/// Resolve a point to (code, address, count); unparseable points are
/// logged and skipped so one bad address cannot sink the batch
fn resolve(
    point: &ModbusPoint,
    default_read: FunctionCode,
) -> Option<(FunctionCode, u16, u16)> {
    let address = match ModbusAddress::parse(&point.address) {
        Ok(address) => address,
        Err(e) => {
            warn!("skipping point {}: {e}", point.name);
            return None;
        },
    };
    let code = address.read_code_or(default_read);
    let count = point.unit_count(code);
    if u32::from(address.address) + u32::from(count) > u32::from(u16::MAX) {
        warn!(
            "skipping point {}: span {}+{} runs past the address space",
            point.name, address.address, count
        );
        return None;
    }
    Some((code, address.address, count))
}

/// Merge points into physical read segments
///
/// Points are sorted by (function code, address ascending, count
/// descending) and merged greedily while the gap tolerance and batch cap
/// allow; bit-addressed codes get an extra 8-unit allowance and their
/// final counts round up to a multiple of 8.
pub fn build_segments(
    points: &[ModbusPoint],
    default_read: FunctionCode,
    policy: &BatchPolicy,
) -> Vec<Segment> {
    let mut entries: Vec<(FunctionCode, u16, u16)> = points
        .iter()
        .filter_map(|p| resolve(p, default_read))
        .collect();
    entries.sort_by(|a, b| {
        (a.0 as u8, a.1).cmp(&(b.0 as u8, b.1)).then(b.2.cmp(&a.2))
    });

    let mut segments: Vec<Segment> = Vec::new();
    let mut merged = 0u16;

    for (code, address, count) in entries {
        if let Some(seg) = segments.last_mut() {
            let allowance = u32::from(policy.gap) + if code.is_bit() { 8 } else { 0 };
            let within_cap = policy.batch_size == 0 || merged < policy.batch_size;

            if seg.code == code && within_cap && seg.end() + allowance >= u32::from(address) {
                let end = (u32::from(address) + u32::from(count)).max(seg.end());
                seg.count = (end - u32::from(seg.address)) as u16;
                merged += 1;
                continue;
            }
        }

        segments.push(Segment {
            code,
            address,
            count,
            data: None,
        });
        merged = 1;
    }

    // Coil/discrete reads come back bit-packed; pad to whole bytes,
    // capped at the end of the address space
    for seg in &mut segments {
        if seg.code.is_bit() {
            let padded = u32::from(seg.count).div_ceil(8) * 8;
            let room = u32::from(u16::MAX) - u32::from(seg.address);
            seg.count = padded.min(room) as u16;
        }
    }

    segments
}

/// Slice segment response buffers back out to the points
///
/// A point lands in the map only when a same-code segment fully covers
/// its span and holds enough data; register points get `count * 2` bytes,
/// bit points a single `[0]`/`[1]` byte.
pub fn dispatch(
    points: &[ModbusPoint],
    default_read: FunctionCode,
    segments: &[Segment],
) -> Result<HashMap<String, Vec<u8>>> {
    let mut result = HashMap::with_capacity(points.len());

    for point in points {
        let Some((code, address, count)) = resolve(point, default_read) else {
            continue;
        };
        if !code.is_read() {
            return Err(ModbusError::unsupported(format!(
                "dispatch with {code} for point {}",
                point.name
            )));
        }

        let covering = segments.iter().find(|seg| {
            seg.code == code
                && seg.address <= address
                && u32::from(address) + u32::from(count) <= seg.end()
                && seg.data.is_some()
        });
        let Some(seg) = covering else { continue };
        let Some(data) = seg.data.as_deref() else {
            continue;
        };

        if code.is_bit() {
            let bit_offset = usize::from(address - seg.address);
            let byte = bit_offset >> 3;
            if byte >= data.len() {
                continue;
            }
            let value = (data[byte] >> (bit_offset & 7)) & 1;
            result.insert(point.name.clone(), vec![value]);
        } else {
            let offset = usize::from(address - seg.address) * 2;
            let size = usize::from(count) * 2;
            if offset + size > data.len() {
                continue;
            }
            result.insert(point.name.clone(), data[offset..offset + size].to_vec());
        }
    }

    Ok(result)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn register_points(addresses: &[u16]) -> Vec<ModbusPoint> {
        addresses
            .iter()
            .map(|a| ModbusPoint::new(format!("p{a}"), format!("4x{a}")))
            .collect()
    }

    fn coil_points(addresses: &[u16]) -> Vec<ModbusPoint> {
        addresses
            .iter()
            .map(|a| ModbusPoint::new(format!("c{a}"), format!("DO{a}")))
            .collect()
    }

    // ========== merge tests ==========

    #[test]
    fn test_contiguous_registers_merge_to_one_segment() {
        let points = register_points(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let segments =
            build_segments(&points, FunctionCode::ReadRegister, &BatchPolicy::default());

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].address, 0);
        assert_eq!(segments[0].count, 10);
        assert_eq!(segments[0].code, FunctionCode::ReadRegister);
    }

    #[test]
    fn test_batch_cap_splits_segments() {
        let points = register_points(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let policy = BatchPolicy {
            batch_size: 4,
            gap: 0,
        };
        let segments = build_segments(&points, FunctionCode::ReadRegister, &policy);

        let spans: Vec<(u16, u16)> = segments.iter().map(|s| (s.address, s.count)).collect();
        assert_eq!(spans, vec![(0, 4), (4, 4), (8, 2)]);
    }

    #[test]
    fn test_disjoint_segments_stay_disjoint() {
        let points = register_points(&[0, 100, 200]);
        let segments =
            build_segments(&points, FunctionCode::ReadRegister, &BatchPolicy::default());

        let spans: Vec<(u16, u16)> = segments.iter().map(|s| (s.address, s.count)).collect();
        assert_eq!(spans, vec![(0, 1), (100, 1), (200, 1)]);

        // Idempotence: a second pass over equivalent points changes nothing
        let again =
            build_segments(&points, FunctionCode::ReadRegister, &BatchPolicy::default());
        assert_eq!(segments, again);
    }

    #[test]
    fn test_gap_tolerance_merges_across_holes() {
        let points = register_points(&[0, 3, 6]);

        let strict =
            build_segments(&points, FunctionCode::ReadRegister, &BatchPolicy::default());
        assert_eq!(strict.len(), 3);

        let tolerant = build_segments(
            &points,
            FunctionCode::ReadRegister,
            &BatchPolicy {
                batch_size: 0,
                gap: 2,
            },
        );
        assert_eq!(tolerant.len(), 1);
        assert_eq!(tolerant[0].count, 7);
    }

    #[test]
    fn test_mixed_codes_never_merge() {
        let mut points = register_points(&[0, 1]);
        points.extend(coil_points(&[0, 1]));

        let segments =
            build_segments(&points, FunctionCode::ReadRegister, &BatchPolicy::default());
        assert_eq!(segments.len(), 2);
        let codes: Vec<FunctionCode> = segments.iter().map(|s| s.code).collect();
        assert!(codes.contains(&FunctionCode::ReadCoil));
        assert!(codes.contains(&FunctionCode::ReadRegister));
    }

    #[test]
    fn test_coil_merge_with_alignment() {
        // Bit addresses ride the 8-unit allowance into a single span,
        // then pad to a byte boundary
        let points = coil_points(&[0, 2, 4, 8, 16, 20]);
        let segments = build_segments(&points, FunctionCode::ReadCoil, &BatchPolicy::default());

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].address, 0);
        assert_eq!(segments[0].count, 24); // 21 rounded up to 8
    }

    #[test]
    fn test_coil_merge_with_batch_cap() {
        let points = coil_points(&[0, 2, 4, 8, 16, 20]);
        let policy = BatchPolicy {
            batch_size: 4,
            gap: 0,
        };
        let segments = build_segments(&points, FunctionCode::ReadCoil, &policy);

        let spans: Vec<(u16, u16)> = segments.iter().map(|s| (s.address, s.count)).collect();
        assert_eq!(spans, vec![(0, 16), (16, 8)]);
    }

    #[test]
    fn test_wide_point_counts() {
        // A 4-byte point spans 2 registers
        let mut points = register_points(&[0]);
        points[0].length = Some(4);
        points.push(ModbusPoint::new("p2", "4x2"));

        let segments =
            build_segments(&points, FunctionCode::ReadRegister, &BatchPolicy::default());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].count, 3);
    }

    #[test]
    fn test_huge_bit_length_does_not_overflow() {
        // Byte padding on a maximal coil span must stay inside u16
        let mut points = coil_points(&[0]);
        points[0].length = Some(65535);

        let segments = build_segments(&points, FunctionCode::ReadCoil, &BatchPolicy::default());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].address, 0);
        assert_eq!(segments[0].count, 65535);
    }

    #[test]
    fn test_span_past_address_space_skipped() {
        // 10000 registers starting at 60000 would end past 65535
        let mut points = register_points(&[0]);
        points.push(ModbusPoint::new("wide", "4x60000"));
        points[1].length = Some(20000);

        let segments =
            build_segments(&points, FunctionCode::ReadRegister, &BatchPolicy::default());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].address, 0);
        assert_eq!(segments[0].count, 1);
    }

    #[test]
    fn test_unparseable_point_skipped() {
        let mut points = register_points(&[0, 1]);
        points.push(ModbusPoint::new("bad", "not-an-address"));

        let segments =
            build_segments(&points, FunctionCode::ReadRegister, &BatchPolicy::default());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].count, 2);
    }

    // ========== dispatch tests ==========

    #[test]
    fn test_dispatch_register_offsets() {
        let mut points = register_points(&[0, 1]);
        points[1].length = Some(4);

        let mut segments =
            build_segments(&points, FunctionCode::ReadRegister, &BatchPolicy::default());
        segments[0].data = Some(vec![0x00, 0x01, 0x00, 0x02, 0x00, 0x03]);

        let map = dispatch(&points, FunctionCode::ReadRegister, &segments)
            .expect("dispatch should succeed");
        assert_eq!(map["p0"], vec![0x00, 0x01]);
        assert_eq!(map["p1"], vec![0x00, 0x02, 0x00, 0x03]);
    }

    #[test]
    fn test_dispatch_bit_extraction() {
        let points = coil_points(&[0, 2, 10]);
        let mut segments =
            build_segments(&points, FunctionCode::ReadCoil, &BatchPolicy::default());
        // Bits 0..15: 0b00000101, 0b00000100 -> coils 0 and 2 on, 10 on
        segments[0].data = Some(vec![0x05, 0x04]);

        let map = dispatch(&points, FunctionCode::ReadCoil, &segments)
            .expect("dispatch should succeed");
        assert_eq!(map["c0"], vec![1]);
        assert_eq!(map["c2"], vec![1]);
        assert_eq!(map["c10"], vec![1]);
    }

    #[test]
    fn test_dispatch_undersized_data_omits_point() {
        let points = register_points(&[0, 1]);
        let mut segments =
            build_segments(&points, FunctionCode::ReadRegister, &BatchPolicy::default());
        // Only one register's worth of data for a two-register segment
        segments[0].data = Some(vec![0x00, 0x01]);

        let map = dispatch(&points, FunctionCode::ReadRegister, &segments)
            .expect("dispatch should succeed");
        assert_eq!(map.get("p0"), Some(&vec![0x00, 0x01]));
        assert!(!map.contains_key("p1"));
    }

    #[test]
    fn test_dispatch_unread_segment_omits_points() {
        let points = register_points(&[0]);
        let segments =
            build_segments(&points, FunctionCode::ReadRegister, &BatchPolicy::default());

        let map = dispatch(&points, FunctionCode::ReadRegister, &segments)
            .expect("dispatch should succeed");
        assert!(map.is_empty());
    }

    #[test]
    fn test_dispatch_code_collision_avoided() {
        // Same numeric address in coil and register space; only the
        // register segment has data, so only the register point resolves
        let points = vec![
            ModbusPoint::new("reg", "4x5"),
            ModbusPoint::new("coil", "DO5"),
        ];
        let mut segments =
            build_segments(&points, FunctionCode::ReadRegister, &BatchPolicy::default());
        for seg in &mut segments {
            if seg.code == FunctionCode::ReadRegister {
                seg.data = Some(vec![0xAB, 0xCD]);
            }
        }

        let map = dispatch(&points, FunctionCode::ReadRegister, &segments)
            .expect("dispatch should succeed");
        assert_eq!(map["reg"], vec![0xAB, 0xCD]);
        assert!(!map.contains_key("coil"));
    }

    #[test]
    fn test_dispatch_rejects_write_default() {
        let points = vec![ModbusPoint::new("p", "100")];
        let err = dispatch(&points, FunctionCode::WriteRegister, &[])
            .expect_err("write code must not reach dispatch");
        assert!(matches!(err, ModbusError::Unsupported(_)));
    }
}
