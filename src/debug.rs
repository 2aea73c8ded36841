// debug.rs — Optional per-seam diagnostics.
//
// The aligner hands every seam estimate to an `AlignmentObserver` when one
// is installed. `MatchImageWriter` is the stock observer: it draws the two
// gray crops side by side at twice their size, a blue circle at every
// detected point and a red line from each accepted point to its match in
// the second crop, and writes the result as
// `<prefix>_<frame>_OF_stitching_<seam>.jpg`.

use std::path::{Path, PathBuf};

use image::{imageops, Rgb, RgbImage};
use log::{info, warn};

use crate::correspondence::Estimate;
use crate::image::Image;

/// One seam of one frame, as seen by the estimator.
#[derive(Debug)]
pub struct SeamReport<'a> {
    pub seam: usize,
    /// 1-based frame counter of the aligner.
    pub frame: u64,
    /// Crop the points were detected in.
    pub image0: &'a Image<u8>,
    /// Crop they were tracked into.
    pub image1: &'a Image<u8>,
    pub estimate: &'a Estimate,
}

pub trait AlignmentObserver {
    fn on_seam(&mut self, report: &SeamReport<'_>);
}

const DRAW_SCALE: u32 = 2;
const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);

/// Writes match visualizations as JPEG files.
#[derive(Debug, Clone)]
pub struct MatchImageWriter {
    prefix: PathBuf,
    written: usize,
}

impl MatchImageWriter {
    /// `input_name` up to its first '.' becomes the file prefix, so
    /// `out/run.nv12` writes `out/run_<frame>_OF_stitching_<seam>.jpg`.
    pub fn new(input_name: impl AsRef<Path>) -> Self {
        let path = input_name.as_ref();
        let stem = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.split('.').next().unwrap_or(n).to_string())
            .unwrap_or_default();
        let prefix = match path.parent() {
            Some(dir) => dir.join(stem),
            None => PathBuf::from(stem),
        };
        MatchImageWriter { prefix, written: 0 }
    }

    pub fn file_name(&self, frame: u64, seam: usize) -> PathBuf {
        let mut name = self.prefix.clone().into_os_string();
        name.push(format!("_{frame}_OF_stitching_{seam}.jpg"));
        PathBuf::from(name)
    }

    /// Images written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Draw the match image for `report`.
    pub fn render(report: &SeamReport<'_>) -> RgbImage {
        let (w0, h0) = (report.image0.width() as u32, report.image0.height() as u32);
        let (w1, h1) = (report.image1.width() as u32, report.image1.height() as u32);
        let mut canvas = RgbImage::new(w0 + w1, h0.max(h1));
        for (x, y, v) in report.image0.pixels() {
            canvas.put_pixel(x as u32, y as u32, Rgb([v, v, v]));
        }
        for (x, y, v) in report.image1.pixels() {
            canvas.put_pixel(w0 + x as u32, y as u32, Rgb([v, v, v]));
        }
        let (cw, ch) = canvas.dimensions();
        let mut canvas = imageops::resize(&canvas, cw * DRAW_SCALE, ch * DRAW_SCALE, imageops::FilterType::Triangle);

        let s = DRAW_SCALE as i32;
        let est = report.estimate;
        for (c, &accepted) in est.correspondences.iter().zip(&est.offsets.accepted) {
            let start = (c.p0.0 as i32 * s, c.p0.1 as i32 * s);
            draw_circle(&mut canvas, start, 4, BLUE);
            if accepted {
                let end = ((c.p1.0 as i32 + w0 as i32) * s, c.p1.1 as i32 * s);
                draw_line(&mut canvas, start, end, RED);
            }
        }
        canvas
    }
}

impl AlignmentObserver for MatchImageWriter {
    fn on_seam(&mut self, report: &SeamReport<'_>) {
        let path = self.file_name(report.frame, report.seam);
        match Self::render(report).save(&path) {
            Ok(()) => {
                self.written += 1;
                info!("write feature match: {}", path.display());
            }
            Err(e) => warn!("writing {} failed: {e}", path.display()),
        }
    }
}

fn put(canvas: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
        canvas.put_pixel(x as u32, y as u32, color);
    }
}

/// Bresenham, two pixels thick.
fn draw_line(canvas: &mut RgbImage, from: (i32, i32), to: (i32, i32), color: Rgb<u8>) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put(canvas, x, y, color);
        put(canvas, x + 1, y, color);
        put(canvas, x, y + 1, color);
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Midpoint circle outline, two pixels thick.
fn draw_circle(canvas: &mut RgbImage, center: (i32, i32), radius: i32, color: Rgb<u8>) {
    for r in [radius - 1, radius] {
        let (mut x, mut y, mut d) = (r, 0, 1 - r);
        while x >= y {
            for (px, py) in [(x, y), (y, x), (-y, x), (-x, y), (-x, -y), (-y, -x), (y, -x), (x, -y)] {
                put(canvas, center.0 + px, center.1 + py, color);
            }
            y += 1;
            if d < 0 {
                d += 2 * y + 1;
            } else {
                x -= 1;
                d += 2 * (y - x) + 1;
            }
        }
    }
}
