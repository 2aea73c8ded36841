// demos/align_synthetic.rs
//
// Two synthetic cameras looking at a 360° strip, run through the full
// per-frame path: geo map on the host backend, then seam alignment.
//
// Usage:
//   cargo run --example align_synthetic --release -- [frames] [debug_dir]
//
// Camera 0 sees strip columns 0..640, camera 1 sees 552..1192 (wrapping at
// 1104), so each seam has 88 px of overlap. Camera 1 slowly drifts right;
// the aligner should follow it with its crops.
//
// Output:
//   stdout                               — per-frame offsets and crops
//   <debug_dir>/synthetic_<n>_OF_stitching_<seam>.jpg  — match images
//   <debug_dir>/camera0_last.png         — last remapped frame of camera 0
//
// Set RUST_LOG=geoseam=info (or debug) for the library's own log lines.

use geoseam::color::{Nv12Image, Rect};
use geoseam::config::AlignerConfig;
use geoseam::debug::MatchImageWriter;
use geoseam::field::DisplacementField;
use geoseam::host::{HostBackend, HostVideoBuffer};
use geoseam::remap::RemapHandler;
use geoseam::seam::{CropSet, SeamAligner};
use geoseam::video::{VideoBuffer, VideoBufferInfo};

use std::env;
use std::path::PathBuf;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 240;
const STRIP: f32 = 1104.0;
const CAMERA1_ORIGIN: f32 = 552.0;

/// Strip intensity at (strip x, y): soft blobs over a slow gradient.
fn strip_luma(sx: f32, y: f32) -> u8 {
    let sx = sx.rem_euclid(STRIP);
    let mut v = 50.0 + 30.0 * (sx / STRIP * std::f32::consts::TAU).sin();
    let cell = 24.0;
    let (cx, cy) = ((sx / cell).floor(), (y / cell).floor());
    // Hash the cell to place one blob per cell at a pseudo-random spot.
    let h = ((cx as i32).wrapping_mul(73_856_093) ^ (cy as i32).wrapping_mul(19_349_663)) as u32;
    let bx = cx * cell + 6.0 + (h % 12) as f32;
    let by = cy * cell + 6.0 + ((h >> 8) % 12) as f32;
    let d2 = (sx - bx).powi(2) + (y - by).powi(2);
    v += 150.0 * (-d2 / 14.0).exp();
    v.clamp(16.0, 235.0) as u8
}

fn render_camera(origin: f32) -> HostVideoBuffer {
    let frame = HostVideoBuffer::new(VideoBufferInfo::nv12(WIDTH, HEIGHT, 16, 16));
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            frame.set_luma(x, y, strip_luma(origin + x as f32, y as f32));
        }
    }
    for y in 0..HEIGHT / 2 {
        for x in 0..WIDTH / 2 {
            frame.set_chroma(x, y, (128, 128));
        }
    }
    frame
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let frames: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(30);
    let debug_dir = args.get(2).map(PathBuf::from);

    // One remap handler per camera; an identity field stands in for the
    // lens calibration.
    let field = match DisplacementField::identity(16, 16, WIDTH, HEIGHT) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let mut handlers = [RemapHandler::new(HostBackend::new()), RemapHandler::new(HostBackend::new())];
    for h in &mut handlers {
        if let Err(e) = h.set_field(&field) {
            eprintln!("Error loading field: {e}");
            std::process::exit(1);
        }
    }

    let mut aligner = SeamAligner::new(&AlignerConfig::default());
    if let Some(dir) = &debug_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Error creating {}: {e}", dir.display());
            std::process::exit(1);
        }
        aligner.set_observer(Box::new(MatchImageWriter::new(dir.join("synthetic.nv12"))));
    }

    let full = |x: i32| Rect::new(x, 0, 56, HEIGHT as i32);
    let mut crops = CropSet {
        image0_left: full(16),
        image0_right: full(568),
        image1_left: full(16),
        image1_right: full(568),
    };

    println!("Frames: {frames}, {}x{} per camera", WIDTH, HEIGHT);
    println!("frame  drift  seam0(mean,smooth)  seam1(mean,smooth)  crops(i0L, i1R, i0R, i1L)");

    let mut last = None;
    for n in 0..frames {
        let drift = n as f32 * 0.25;
        let mut remapped = Vec::with_capacity(2);
        for (cam, origin) in [(0usize, 0.0f32), (1, CAMERA1_ORIGIN + drift)] {
            let input = render_camera(origin);
            let handler = &mut handlers[cam];
            let out_info = match handler.prepare_output_info(input.info()) {
                Ok(info) => info,
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            };
            let output = HostVideoBuffer::new(out_info);
            if let Err(e) = handler.process(&input, &output) {
                eprintln!("frame {n} camera {cam}: {e}");
                std::process::exit(1);
            }
            match Nv12Image::from_host_buffer(&output) {
                Ok(img) => remapped.push(img),
                Err(e) => {
                    eprintln!("frame {n} camera {cam}: {e}");
                    std::process::exit(1);
                }
            }
        }

        let outcomes = match aligner.align(&remapped[0], &remapped[1], WIDTH as i32, &mut crops) {
            Ok(o) => o,
            Err(e) => {
                eprintln!("frame {n}: {e}");
                std::process::exit(1);
            }
        };
        let fmt = |seam: usize| {
            let mean = outcomes[seam].estimate.as_ref().map(|r| r.mean).unwrap_or(f32::NAN);
            let smooth = aligner.state(seam).map(|s| s.smoothed_offset).unwrap_or(0.0);
            format!("{mean:>7.2},{smooth:>6.2}")
        };
        println!(
            "{n:>5}  {drift:>5.2}  {:>18}  {:>18}  ({}, {}, {}, {})",
            fmt(0),
            fmt(1),
            crops.image0_left.x,
            crops.image1_right.x,
            crops.image0_right.x,
            crops.image1_left.x
        );
        last = remapped.into_iter().next();
    }

    if let (Some(dir), Some(img)) = (&debug_dir, last) {
        let path = dir.join("camera0_last.png");
        match img.to_rgb().save(&path) {
            Ok(()) => println!("Wrote {}", path.display()),
            Err(e) => eprintln!("Writing {} failed: {e}", path.display()),
        }
    }
}
