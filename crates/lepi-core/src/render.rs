//! Report figures: density heatmap, elevation-coloured occurrence map and
//! elevation histogram as standalone SVG, plus a raw PNG of the density grid.

use std::path::Path;

use image::{Rgba, RgbaImage};

use crate::boundary::Boundary;
use crate::colormap::{unit, Colormap};
use crate::error::Result;
use crate::histogram::Histogram;
use crate::join::ElevatedOccurrence;
use crate::kde::DensitySurface;
use crate::pattern::Window;

const FIG_WIDTH: f64 = 820.0;
const MARGIN_LEFT: f64 = 80.0;
/// Leaves room for the colorbar.
const MARGIN_RIGHT: f64 = 140.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_BOTTOM: f64 = 70.0;
const COLORBAR_STEPS: usize = 64;
const INK: &str = "#374151";
const MUTED: &str = "#6b7280";

/// Fixed labelling of one figure.
#[derive(Debug, Clone)]
pub struct FigureLabels {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Colorbar caption; unused by the histogram.
    pub legend: String,
}

impl FigureLabels {
    pub fn density(species: &str) -> Self {
        Self {
            title: format!("Kernel density of {species} occurrences"),
            x_label: "Longitude".into(),
            y_label: "Latitude".into(),
            legend: "Density".into(),
        }
    }

    pub fn elevation_map(species: &str) -> Self {
        Self {
            title: format!("{species} occurrences by elevation"),
            x_label: "Longitude".into(),
            y_label: "Latitude".into(),
            legend: "Elevation (m)".into(),
        }
    }

    pub fn histogram(species: &str) -> Self {
        Self {
            title: format!("Elevation distribution of {species} occurrences"),
            x_label: "Elevation (m)".into(),
            y_label: "Number of occurrences".into(),
            legend: String::new(),
        }
    }
}

// ── Plot frame ────────────────────────────────────────────────────────────────

/// Data → pixel mapping for the plot area.
struct Frame {
    left: f64,
    top: f64,
    w: f64,
    h: f64,
    x_lo: f64,
    x_hi: f64,
    y_lo: f64,
    y_hi: f64,
}

impl Frame {
    fn new(h: f64, x: (f64, f64), y: (f64, f64)) -> Self {
        let widen = |(lo, hi): (f64, f64)| if hi > lo { (lo, hi) } else { (lo - 0.5, lo + 0.5) };
        let (x_lo, x_hi) = widen(x);
        let (y_lo, y_hi) = widen(y);
        Self {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            w: FIG_WIDTH - MARGIN_LEFT - MARGIN_RIGHT,
            h,
            x_lo,
            x_hi,
            y_lo,
            y_hi,
        }
    }

    /// Plot area shaped like the window on the ground: latitude degrees are
    /// stretched by 1/cos(mid-latitude).
    fn geographic(window: &Window) -> Self {
        let plot_w = FIG_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
        let mid_lat = (window.min_lat + window.max_lat) / 2.0;
        let shrink = mid_lat.to_radians().cos().max(0.1);
        let aspect = if window.width() > 0.0 {
            window.height() / (window.width() * shrink)
        } else {
            1.0
        };
        let h = (plot_w * aspect).clamp(240.0, 900.0);
        Self::new(h, (window.min_lon, window.max_lon), (window.min_lat, window.max_lat))
    }

    fn x(&self, v: f64) -> f64 {
        self.left + (v - self.x_lo) / (self.x_hi - self.x_lo) * self.w
    }

    fn y(&self, v: f64) -> f64 {
        self.top + self.h - (v - self.y_lo) / (self.y_hi - self.y_lo) * self.h
    }

    fn fig_height(&self) -> f64 {
        self.top + self.h + MARGIN_BOTTOM
    }
}

// ── SVG helpers ───────────────────────────────────────────────────────────────

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

/// Round tick positions (1, 2, 5 × 10ᵏ steps) covering `[lo, hi]`.
fn nice_ticks(lo: f64, hi: f64, target: usize) -> Vec<f64> {
    let span = hi - lo;
    if !(span > 0.0) || target == 0 {
        return vec![lo];
    }
    let raw = span / target as f64;
    let mag = 10f64.powf(raw.log10().floor());
    let norm = raw / mag;
    let step = mag
        * if norm < 1.5 {
            1.0
        } else if norm < 3.0 {
            2.0
        } else if norm < 7.0 {
            5.0
        } else {
            10.0
        };
    let mut ticks = Vec::new();
    let mut v = (lo / step).ceil() * step;
    while v <= hi + step * 1e-9 {
        ticks.push(if v.abs() < step * 1e-9 { 0.0 } else { v });
        v += step;
    }
    ticks
}

fn fmt_value(v: f64, step: f64) -> String {
    let decimals = if step > 0.0 { (-step.log10().floor()).max(0.0) as usize } else { 0 };
    format!("{v:.decimals$}")
}

fn open_svg(height: f64, title: &str) -> String {
    let mut svg = format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w:.0}" height="{height:.0}" viewBox="0 0 {w:.0} {height:.0}" font-family="sans-serif">
<rect width="100%" height="100%" fill="white"/>
"##,
        w = FIG_WIDTH,
    );
    svg.push_str(&format!(
        r##"<text x="{:.1}" y="32" text-anchor="middle" font-size="17" font-weight="600" fill="{INK}">{}</text>
"##,
        FIG_WIDTH / 2.0,
        escape(title)
    ));
    svg
}

fn axes(svg: &mut String, f: &Frame, labels: &FigureLabels) {
    let bottom = f.top + f.h;
    svg.push_str(&format!(
        r##"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="none" stroke="{MUTED}" stroke-width="1"/>
"##,
        f.left, f.top, f.w, f.h
    ));

    let xt = nice_ticks(f.x_lo, f.x_hi, 6);
    let x_step = if xt.len() > 1 { xt[1] - xt[0] } else { 1.0 };
    for &t in &xt {
        let x = f.x(t);
        svg.push_str(&format!(
            r##"<line x1="{x:.1}" y1="{bottom:.1}" x2="{x:.1}" y2="{:.1}" stroke="{MUTED}"/><text x="{x:.1}" y="{:.1}" text-anchor="middle" font-size="11" fill="{MUTED}">{}</text>
"##,
            bottom + 5.0,
            bottom + 19.0,
            fmt_value(t, x_step)
        ));
    }

    let yt = nice_ticks(f.y_lo, f.y_hi, 6);
    let y_step = if yt.len() > 1 { yt[1] - yt[0] } else { 1.0 };
    for &t in &yt {
        let y = f.y(t);
        svg.push_str(&format!(
            r##"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="{MUTED}"/><text x="{:.1}" y="{:.1}" text-anchor="end" font-size="11" fill="{MUTED}">{}</text>
"##,
            f.left - 5.0,
            f.left,
            f.left - 8.0,
            y + 4.0,
            fmt_value(t, y_step)
        ));
    }

    let y_mid = f.top + f.h / 2.0;
    svg.push_str(&format!(
        r##"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="13" fill="{INK}">{}</text>
<text x="22" y="{y_mid:.1}" text-anchor="middle" font-size="13" fill="{INK}" transform="rotate(-90, 22, {y_mid:.1})">{}</text>
"##,
        f.left + f.w / 2.0,
        bottom + 45.0,
        escape(&labels.x_label),
        escape(&labels.y_label)
    ));
}

fn colorbar(svg: &mut String, f: &Frame, cmap: Colormap, lo: f64, hi: f64, caption: &str) {
    let x = f.left + f.w + 30.0;
    let bar_w = 18.0;
    let bar_h = f.h.min(320.0);
    let top = f.top + (f.h - bar_h) / 2.0;
    let step_h = bar_h / COLORBAR_STEPS as f64;
    for i in 0..COLORBAR_STEPS {
        // Top of the bar is the high end.
        let t = 1.0 - (i as f64 + 0.5) / COLORBAR_STEPS as f64;
        svg.push_str(&format!(
            r##"<rect x="{x:.1}" y="{:.2}" width="{bar_w}" height="{:.2}" fill="{}"/>
"##,
            top + i as f64 * step_h,
            step_h + 0.3,
            cmap.hex(t)
        ));
    }
    svg.push_str(&format!(
        r##"<rect x="{x:.1}" y="{top:.1}" width="{bar_w}" height="{bar_h:.1}" fill="none" stroke="{MUTED}"/>
<text x="{x:.1}" y="{:.1}" font-size="12" fill="{INK}">{}</text>
"##,
        top - 10.0,
        escape(caption)
    ));
    let ticks = nice_ticks(lo, hi, 4);
    let step = if ticks.len() > 1 { ticks[1] - ticks[0] } else { (hi - lo).abs().max(1e-12) };
    let mut marks: Vec<f64> = ticks.into_iter().filter(|t| *t >= lo && *t <= hi).collect();
    if marks.is_empty() {
        marks.push(lo);
    }
    for t in marks {
        let y = top + bar_h - unit(t, lo, hi) * bar_h;
        svg.push_str(&format!(
            r##"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="{INK}"/><text x="{:.1}" y="{:.1}" font-size="11" fill="{INK}">{}</text>
"##,
            x + bar_w,
            x + bar_w + 4.0,
            x + bar_w + 7.0,
            y + 4.0,
            fmt_value(t, step)
        ));
    }
}

fn boundary_path(f: &Frame, boundary: &Boundary, fill: &str) -> String {
    let mut d = String::new();
    for ring in boundary.rings() {
        for (i, (lon, lat)) in ring.iter().enumerate() {
            let cmd = if i == 0 { 'M' } else { 'L' };
            d.push_str(&format!("{cmd}{:.1},{:.1} ", f.x(*lon), f.y(*lat)));
        }
        d.push_str("Z ");
    }
    format!(
        r##"<path class="boundary" d="{}" fill="{fill}" fill-rule="evenodd" stroke="#1f2937" stroke-width="0.8"/>
"##,
        d.trim_end()
    )
}

fn note(svg: &mut String, f: &Frame, text: &str) {
    svg.push_str(&format!(
        r##"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="14" fill="{MUTED}">{}</text>
"##,
        f.left + f.w / 2.0,
        f.top + f.h / 2.0,
        escape(text)
    ));
}

// ── Figures ───────────────────────────────────────────────────────────────────

/// Masked density heatmap with the boundary outline and a colorbar.
pub fn density_map_svg(
    surface: &DensitySurface,
    boundary: &Boundary,
    labels: &FigureLabels,
    cmap: Colormap,
) -> String {
    let f = Frame::geographic(&surface.window);
    let mut svg = open_svg(f.fig_height(), &labels.title);
    let (dx, dy) = surface.cell_size();
    let (lo, hi) = surface.value_range().unwrap_or((0.0, 0.0));

    svg.push_str(r#"<g shape-rendering="crispEdges">"#);
    svg.push('\n');
    for r in 0..surface.height {
        for c in 0..surface.width {
            let Some(v) = surface.get(r, c) else {
                continue;
            };
            let (lon, lat) = surface.cell_center(r, c);
            let x0 = f.x(lon - dx / 2.0);
            let x1 = f.x(lon + dx / 2.0);
            let y0 = f.y(lat + dy / 2.0);
            let y1 = f.y(lat - dy / 2.0);
            svg.push_str(&format!(
                r##"<rect class="cell" x="{x0:.2}" y="{y0:.2}" width="{:.2}" height="{:.2}" fill="{}"/>
"##,
                x1 - x0 + 0.3,
                y1 - y0 + 0.3,
                cmap.hex(unit(v, lo, hi))
            ));
        }
    }
    svg.push_str("</g>\n");
    svg.push_str(&boundary_path(&f, boundary, "none"));
    axes(&mut svg, &f, labels);
    colorbar(&mut svg, &f, cmap, lo, hi, &labels.legend);
    svg.push_str("</svg>\n");
    svg
}

/// Boundary map with every elevated occurrence coloured by elevation.
pub fn elevation_map_svg(
    points: &[ElevatedOccurrence],
    boundary: &Boundary,
    labels: &FigureLabels,
    cmap: Colormap,
) -> String {
    let window = Window::from_boundary(boundary);
    let f = Frame::geographic(&window);
    let mut svg = open_svg(f.fig_height(), &labels.title);
    svg.push_str(&boundary_path(&f, boundary, "#f3f4f6"));

    let lo = points.iter().map(|p| f64::from(p.elevation)).fold(f64::INFINITY, f64::min);
    let hi = points.iter().map(|p| f64::from(p.elevation)).fold(f64::NEG_INFINITY, f64::max);
    for p in points {
        svg.push_str(&format!(
            r##"<circle class="occ" cx="{:.2}" cy="{:.2}" r="3.5" fill="{}" stroke="#1f2937" stroke-width="0.4"/>
"##,
            f.x(p.lon),
            f.y(p.lat),
            cmap.hex(unit(f64::from(p.elevation), lo, hi))
        ));
    }
    axes(&mut svg, &f, labels);
    if points.is_empty() {
        note(&mut svg, &f, "No occurrences with elevation");
    } else {
        colorbar(&mut svg, &f, cmap, lo, hi, &labels.legend);
    }
    svg.push_str("</svg>\n");
    svg
}

/// One bar per bin; empty bins leave a gap.
pub fn histogram_svg(hist: &Histogram, labels: &FigureLabels) -> String {
    let x_hi = hist.origin + hist.counts.len().max(1) as f64 * hist.bin_width;
    let y_ticks = nice_ticks(0.0, hist.max_count().max(1) as f64, 5);
    let y_top = y_ticks
        .last()
        .copied()
        .unwrap_or(1.0)
        .max(hist.max_count() as f64)
        .max(1.0);
    let f = Frame::new(420.0, (hist.origin, x_hi), (0.0, y_top));
    let mut svg = open_svg(f.fig_height(), &labels.title);

    for bin in hist.bins() {
        if bin.count == 0 {
            continue;
        }
        let x0 = f.x(bin.lo);
        let x1 = f.x(bin.hi);
        let y = f.y(bin.count as f64);
        svg.push_str(&format!(
            r##"<rect class="bar" x="{x0:.2}" y="{y:.2}" width="{:.2}" height="{:.2}" fill="#4682b4" stroke="white" stroke-width="0.8"/>
"##,
            x1 - x0,
            f.y(0.0) - y
        ));
    }
    axes(&mut svg, &f, labels);
    if hist.is_empty() {
        note(&mut svg, &f, "No elevation data");
    }
    svg.push_str("</svg>\n");
    svg
}

// ── Raster output ─────────────────────────────────────────────────────────────

/// Density grid as an image, north up; masked cells are fully transparent.
pub fn density_image(surface: &DensitySurface, cmap: Colormap) -> RgbaImage {
    let (lo, hi) = surface.value_range().unwrap_or((0.0, 0.0));
    let mut img = RgbaImage::new(surface.width as u32, surface.height as u32);
    for r in 0..surface.height {
        // Storage row 0 is the south edge; image row 0 is the top.
        let y = (surface.height - 1 - r) as u32;
        for c in 0..surface.width {
            let px = match surface.get(r, c) {
                Some(v) => {
                    let [rv, gv, bv] = cmap.rgb(unit(v, lo, hi));
                    Rgba([rv, gv, bv, 255])
                }
                None => Rgba([0, 0, 0, 0]),
            };
            img.put_pixel(c as u32, y, px);
        }
    }
    img
}

pub fn save_density_png(surface: &DensitySurface, cmap: Colormap, path: &Path) -> Result<()> {
    density_image(surface, cmap).save(path)?;
    Ok(())
}
