// SPDX-License-Identifier: GPL-3.0-only

//! Per-frame color filters and simulated ISO gain
//!
//! All operations take a frame by reference and return a frame. Transforms
//! that change pixels allocate a fresh buffer; the identity cases (filter
//! `None`, ISO gain 1.0) hand back a clone sharing the input's pixels.
//!
//! Warm, Cold and Monochrome go through lookup tables built once in
//! [`FilterPipeline::new`]. The other filters are a per-channel scale, or in
//! the case of night vision a luma boost, computed inline.

use crate::backends::camera::types::Frame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Selectable color filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    #[default]
    None,
    NightVision,
    Red,
    Green,
    Pink,
    Warm,
    Cold,
    #[serde(alias = "monochrom")]
    Monochrome,
    Orange,
    Yellow,
}

impl FilterKind {
    /// All filters in carousel order
    pub const ALL: [FilterKind; 10] = [
        FilterKind::None,
        FilterKind::NightVision,
        FilterKind::Red,
        FilterKind::Green,
        FilterKind::Pink,
        FilterKind::Warm,
        FilterKind::Cold,
        FilterKind::Monochrome,
        FilterKind::Orange,
        FilterKind::Yellow,
    ];

    /// Config spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::None => "none",
            FilterKind::NightVision => "night_vision",
            FilterKind::Red => "red",
            FilterKind::Green => "green",
            FilterKind::Pink => "pink",
            FilterKind::Warm => "warm",
            FilterKind::Cold => "cold",
            FilterKind::Monochrome => "monochrome",
            FilterKind::Orange => "orange",
            FilterKind::Yellow => "yellow",
        }
    }

    /// Next filter in carousel order, wrapping around
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    /// Per-channel (R, G, B) scale for the arithmetic tint filters
    fn channel_scale(&self) -> Option<[f32; 3]> {
        match self {
            FilterKind::Red => Some([1.5, 0.5, 0.5]),
            FilterKind::Green => Some([0.5, 1.5, 0.5]),
            FilterKind::Pink => Some([1.3, 0.8, 1.2]),
            FilterKind::Orange => Some([1.4, 1.1, 0.6]),
            FilterKind::Yellow => Some([1.3, 1.3, 0.7]),
            _ => None,
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monochrom" => Ok(FilterKind::Monochrome),
            other => FilterKind::ALL
                .iter()
                .copied()
                .find(|f| f.as_str() == other)
                .ok_or_else(|| format!("unknown filter '{}'", s)),
        }
    }
}

/// Gain applied for a simulated ISO value. Unknown values are neutral.
pub fn iso_gain(iso: u32) -> f32 {
    match iso {
        100 => 0.7,
        200 => 0.85,
        400 => 1.0,
        800 => 1.3,
        _ => 1.0,
    }
}

/// ISO values offered by the settings scene
pub const ISO_VALUES: [u32; 4] = [100, 200, 400, 800];

/// Per-channel remap: `lut[value][channel]`
type ChannelLut = [[u8; 3]; 256];

/// Luma contributions in 8.8 fixed point: gray = (r + g + b entries) >> 8
type LumaLut = [[u16; 3]; 256];

/// Luma weights scaled to 256 so a gray pixel maps to itself
const LUMA_WEIGHTS: [u16; 3] = [77, 150, 29];

/// Stateless frame transform stage
///
/// Holds only immutable tables, so one instance can be shared across
/// threads behind an `Arc` without locking.
#[derive(Clone)]
pub struct FilterPipeline {
    warm: ChannelLut,
    cold: ChannelLut,
    mono: LumaLut,
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FilterPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterPipeline").finish_non_exhaustive()
    }
}

impl FilterPipeline {
    pub fn new() -> Self {
        let mut warm = [[0u8; 3]; 256];
        let mut cold = [[0u8; 3]; 256];
        let mut mono = [[0u16; 3]; 256];

        for i in 0..256usize {
            let v = i as f64;
            warm[i] = [
                (v * 1.15).min(255.0) as u8,
                (v * 1.05).min(255.0) as u8,
                (v * 0.9) as u8,
            ];
            cold[i] = [(v * 0.9) as u8, i as u8, (v * 1.2).min(255.0) as u8];
            mono[i] = [
                LUMA_WEIGHTS[0] * i as u16,
                LUMA_WEIGHTS[1] * i as u16,
                LUMA_WEIGHTS[2] * i as u16,
            ];
        }

        Self { warm, cold, mono }
    }

    /// Scale every channel by the gain for `iso`, clamping at 255
    pub fn apply_iso_gain(&self, frame: &Frame, iso: u32) -> Frame {
        debug_assert!(frame.is_well_formed(), "frame must be packed RGB888");

        let gain = iso_gain(iso);
        if gain == 1.0 {
            return frame.clone();
        }

        let mut table = [0u8; 256];
        for (i, out) in table.iter_mut().enumerate() {
            *out = (i as f32 * gain).min(255.0) as u8;
        }
        frame.with_data(frame.data.iter().map(|&v| table[v as usize]).collect())
    }

    /// Apply a color filter
    pub fn apply_filter(&self, frame: &Frame, kind: FilterKind) -> Frame {
        debug_assert!(frame.is_well_formed(), "frame must be packed RGB888");

        match kind {
            FilterKind::None => frame.clone(),
            FilterKind::Warm => self.remap(frame, &self.warm),
            FilterKind::Cold => self.remap(frame, &self.cold),
            FilterKind::Monochrome => self.monochrome(frame),
            FilterKind::NightVision => night_vision(frame),
            other => match other.channel_scale() {
                Some(scale) => scale_channels(frame, scale),
                None => frame.clone(),
            },
        }
    }

    /// ISO gain, then filter
    pub fn process_frame(&self, frame: &Frame, kind: FilterKind, iso: u32) -> Frame {
        let gained = self.apply_iso_gain(frame, iso);
        self.apply_filter(&gained, kind)
    }

    fn remap(&self, frame: &Frame, lut: &ChannelLut) -> Frame {
        let mut out = Vec::with_capacity(frame.data.len());
        for px in frame.data.chunks_exact(3) {
            out.push(lut[px[0] as usize][0]);
            out.push(lut[px[1] as usize][1]);
            out.push(lut[px[2] as usize][2]);
        }
        frame.with_data(out)
    }

    fn monochrome(&self, frame: &Frame) -> Frame {
        let mut out = Vec::with_capacity(frame.data.len());
        for px in frame.data.chunks_exact(3) {
            let sum = self.mono[px[0] as usize][0] as u32
                + self.mono[px[1] as usize][1] as u32
                + self.mono[px[2] as usize][2] as u32;
            let gray = (sum >> 8) as u8;
            out.extend_from_slice(&[gray, gray, gray]);
        }
        frame.with_data(out)
    }
}

fn scale_channels(frame: &Frame, scale: [f32; 3]) -> Frame {
    let mut out = Vec::with_capacity(frame.data.len());
    for px in frame.data.chunks_exact(3) {
        for c in 0..3 {
            out.push((px[c] as f32 * scale[c]).min(255.0) as u8);
        }
    }
    frame.with_data(out)
}

fn night_vision(frame: &Frame) -> Frame {
    let mut out = Vec::with_capacity(frame.data.len());
    for px in frame.data.chunks_exact(3) {
        let gray = (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32) as u8;
        let boosted = (gray as f32 * 1.5).min(255.0) as u8;
        out.extend_from_slice(&[boosted / 4, boosted, boosted / 4]);
    }
    frame.with_data(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed_frame() -> Frame {
        let data: Vec<u8> = (0..=255u8).flat_map(|v| [v, 255 - v, v / 2]).collect();
        Frame::new(256, 1, data)
    }

    #[test]
    fn test_lut_values() {
        let pipeline = FilterPipeline::new();
        assert_eq!(pipeline.warm[100], [114, 105, 90]);
        assert_eq!(pipeline.warm[255], [255, 255, 229]);
        assert_eq!(pipeline.cold[100], [90, 100, 120]);
        assert_eq!(pipeline.cold[255], [229, 255, 255]);
        assert_eq!(LUMA_WEIGHTS.iter().sum::<u16>(), 256);
    }

    #[test]
    fn test_extremes_stay_in_range_for_every_filter_and_iso() {
        let pipeline = FilterPipeline::new();
        for kind in FilterKind::ALL {
            for iso in [100, 200, 400, 800, 1600] {
                for value in [0u8, 255] {
                    let frame = Frame::filled(4, 3, [value; 3]);
                    let out = pipeline.process_frame(&frame, kind, iso);
                    assert!(out.is_well_formed(), "{kind} iso {iso}");
                    if value == 0 {
                        assert!(out.data.iter().all(|&v| v == 0), "{kind} iso {iso}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_red_on_white() {
        let pipeline = FilterPipeline::new();
        let out = pipeline.apply_filter(&Frame::filled(1, 1, [255; 3]), FilterKind::Red);
        assert_eq!(out.pixel(0, 0), Some([255, 127, 127]));
    }

    #[test]
    fn test_none_at_neutral_iso_is_identity() {
        let pipeline = FilterPipeline::new();
        let frame = mixed_frame();
        let out = pipeline.process_frame(&frame, FilterKind::None, 400);
        assert!(out.shares_buffer_with(&frame));
        assert_eq!(out.data, frame.data);
    }

    #[test]
    fn test_unknown_iso_is_neutral() {
        let pipeline = FilterPipeline::new();
        let frame = mixed_frame();
        assert!(pipeline.apply_iso_gain(&frame, 3200).shares_buffer_with(&frame));
    }

    #[test]
    fn test_iso_gain_clamps() {
        let pipeline = FilterPipeline::new();
        let frame = Frame::filled(1, 1, [200, 100, 10]);
        let bright = pipeline.apply_iso_gain(&frame, 800);
        assert_eq!(bright.pixel(0, 0), Some([255, 130, 13]));
        let dark = pipeline.apply_iso_gain(&frame, 100);
        assert_eq!(dark.pixel(0, 0), Some([140, 70, 7]));
        assert_eq!(frame.pixel(0, 0), Some([200, 100, 10]));
    }

    #[test]
    fn test_monochrome_is_idempotent() {
        let pipeline = FilterPipeline::new();
        let once = pipeline.apply_filter(&mixed_frame(), FilterKind::Monochrome);
        let twice = pipeline.apply_filter(&once, FilterKind::Monochrome);
        assert_eq!(once.data, twice.data);
    }

    #[test]
    fn test_warm_and_cold_are_not_idempotent() {
        let pipeline = FilterPipeline::new();
        for kind in [FilterKind::Warm, FilterKind::Cold] {
            let once = pipeline.apply_filter(&mixed_frame(), kind);
            let twice = pipeline.apply_filter(&once, kind);
            assert_ne!(once.data, twice.data, "{kind}");
        }
    }

    #[test]
    fn test_night_vision_is_green_weighted() {
        let pipeline = FilterPipeline::new();
        let out = pipeline.apply_filter(&Frame::filled(1, 1, [100; 3]), FilterKind::NightVision);
        // f32 weights sum to exactly 100.0 here: gray 100, boosted 150
        assert_eq!(out.pixel(0, 0), Some([37, 150, 37]));
    }

    #[test]
    fn test_iso_applies_before_filter() {
        let pipeline = FilterPipeline::new();
        let frame = Frame::filled(1, 1, [200, 200, 200]);
        let out = pipeline.process_frame(&frame, FilterKind::Red, 100);
        // 200 * 0.7 = 140, then red: 210, 70, 70
        assert_eq!(out.pixel(0, 0), Some([210, 70, 70]));
    }

    #[test]
    fn test_filter_names_round_trip() {
        for kind in FilterKind::ALL {
            assert_eq!(kind.as_str().parse::<FilterKind>(), Ok(kind));
        }
        assert_eq!("monochrom".parse::<FilterKind>(), Ok(FilterKind::Monochrome));
        let parsed: FilterKind = serde_json::from_str("\"monochrom\"").unwrap();
        assert_eq!(parsed, FilterKind::Monochrome);
        assert!("sepia".parse::<FilterKind>().is_err());
        assert_eq!(FilterKind::Yellow.next(), FilterKind::None);
    }
}
