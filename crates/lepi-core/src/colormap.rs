//! Continuous colour ramps for the density heatmap and elevation colouring.

use serde::{Deserialize, Serialize};

/// Built-in colormap names.
pub const SUPPORTED: &[&str] = &["viridis", "terrain"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    Viridis,
    /// Land part of the classic terrain ramp: green lowland → tan → brown → snow.
    Terrain,
}

const VIRIDIS: [[u8; 3]; 9] = [
    [68, 1, 84],
    [71, 44, 122],
    [59, 81, 139],
    [44, 113, 142],
    [33, 144, 141],
    [39, 173, 129],
    [92, 200, 99],
    [170, 220, 50],
    [253, 231, 37],
];

const TERRAIN: [[u8; 3]; 4] = [
    [0, 204, 102],
    [255, 255, 153],
    [128, 92, 84],
    [255, 255, 255],
];

impl Colormap {
    fn stops(self) -> &'static [[u8; 3]] {
        match self {
            Colormap::Viridis => &VIRIDIS,
            Colormap::Terrain => &TERRAIN,
        }
    }

    /// Colour at `t` ∈ [0, 1] (clamped), linear between equally spaced stops.
    pub fn rgb(self, t: f64) -> [u8; 3] {
        let stops = self.stops();
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let pos = t * (stops.len() - 1) as f64;
        let i = (pos.floor() as usize).min(stops.len() - 2);
        let f = pos - i as f64;
        let (a, b) = (stops[i], stops[i + 1]);
        let mut out = [0u8; 3];
        for k in 0..3 {
            out[k] = (a[k] as f64 + (b[k] as f64 - a[k] as f64) * f).round() as u8;
        }
        out
    }

    /// `#rrggbb` for SVG fills.
    pub fn hex(self, t: f64) -> String {
        let [r, g, b] = self.rgb(t);
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

impl std::str::FromStr for Colormap {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viridis" => Ok(Colormap::Viridis),
            "terrain" => Ok(Colormap::Terrain),
            _ => Err(format!("Unknown colormap '{}'. Supported: {}", s, SUPPORTED.join(", "))),
        }
    }
}

/// Position of `v` within `[lo, hi]`; a flat range maps to 0.5.
pub fn unit(v: f64, lo: f64, hi: f64) -> f64 {
    let range = hi - lo;
    if range.abs() < f64::EPSILON {
        return 0.5;
    }
    ((v - lo) / range).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_match_stops() {
        assert_eq!(Colormap::Viridis.rgb(0.0), [68, 1, 84]);
        assert_eq!(Colormap::Viridis.rgb(1.0), [253, 231, 37]);
        assert_eq!(Colormap::Terrain.rgb(1.0), [255, 255, 255]);
        assert_eq!(Colormap::Viridis.hex(0.0), "#440154");
    }

    #[test]
    fn out_of_range_is_clamped() {
        assert_eq!(Colormap::Viridis.rgb(-3.0), Colormap::Viridis.rgb(0.0));
        assert_eq!(Colormap::Viridis.rgb(7.0), Colormap::Viridis.rgb(1.0));
        assert_eq!(Colormap::Viridis.rgb(f64::NAN), Colormap::Viridis.rgb(0.0));
    }

    #[test]
    fn interior_stops_and_interpolation() {
        assert_eq!(Colormap::Terrain.rgb(1.0 / 3.0), [255, 255, 153]);
        // Between the first two terrain stops every channel rises.
        let [r, g, b] = Colormap::Terrain.rgb(0.1);
        assert!(r > 0 && r < 255);
        assert!(g > 204 && g < 255);
        assert!(b > 102 && b < 153);
    }

    #[test]
    fn unit_handles_flat_range() {
        assert_eq!(unit(5.0, 5.0, 5.0), 0.5);
        assert_eq!(unit(15.0, 10.0, 20.0), 0.5);
        assert_eq!(unit(30.0, 10.0, 20.0), 1.0);
    }

    #[test]
    fn names_parse() {
        assert_eq!("terrain".parse::<Colormap>().unwrap(), Colormap::Terrain);
        assert!("magma".parse::<Colormap>().is_err());
    }
}
