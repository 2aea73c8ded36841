// benches/benchmarks.rs -- Per-stage and full-frame benchmarks.
//
// Host benchmarks (always run):
//   cargo bench
//
// With a GPU adapter available:
//   GEOSEAM_GPU_BENCH=1 cargo bench
//
// The GPU benchmark remaps a 1280x720 NV12 frame through WgpuBackend,
// including the dispatch wait, so it measures one full kernel round trip.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use geoseam::color::{Nv12Image, Rect};
use geoseam::config::{AlignerConfig, GfttConfig, OrbConfig, TrackerConfig};
use geoseam::correspondence::FeatureCorrespondenceEstimator;
use geoseam::field::{DisplacementField, GeoPos};
use geoseam::gftt::GoodFeaturesDetector;
use geoseam::gpu::device::GpuDevice;
use geoseam::gpu::remap::WgpuBackend;
use geoseam::host::{HostBackend, HostVideoBuffer};
use geoseam::image::Image;
use geoseam::klt::KltTracker;
use geoseam::orb::OrbDetector;
use geoseam::pyramid::Pyramid;
use geoseam::remap::RemapHandler;
use geoseam::seam::{CropSet, SeamAligner};
use geoseam::video::VideoBufferInfo;

use std::env;

// ============================================================
// Helpers
// ============================================================

/// Textured luma: gradients plus bright rectangles, shifted by `dx`.
fn make_scene(w: usize, h: usize, dx: usize) -> Image<u8> {
    let mut img = Image::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let sx = x + w - dx % w;
            img.set(x, y, ((sx % w) * 150 / w + y * 50 / h) as u8);
        }
    }
    for rect in 0..8 {
        let rx = (8 + rect * 37 + dx) % w;
        let ry = (12 + (rect % 4) * 40) % h;
        let bright = 170u8 + rect as u8 * 8;
        for y in ry..(ry + 24).min(h) {
            for x in rx..(rx + 14).min(w) {
                img.set(x, y, bright);
            }
        }
    }
    img
}

fn nv12_from_luma(luma: &Image<u8>) -> Nv12Image {
    let (w, h) = (luma.width(), luma.height());
    Nv12Image { y: luma.clone(), uv: Image::from_vec(w, h / 2, vec![128u8; w * h / 2]) }
}

/// A 16x16 field with a mild barrel distortion.
fn barrel_field(src_w: u32, src_h: u32) -> DisplacementField {
    let n = 16u32;
    let mut cells = Vec::with_capacity((n * n) as usize);
    for y in 0..n {
        for x in 0..n {
            let u = (x as f32 + 0.5) / n as f32 - 0.5;
            let v = (y as f32 + 0.5) / n as f32 - 0.5;
            let k = 1.0 + 0.15 * (u * u + v * v);
            cells.push(GeoPos::new((u * k + 0.5) * src_w as f32, (v * k + 0.5) * src_h as f32));
        }
    }
    DisplacementField::new(n, n, cells).unwrap()
}

fn host_frame(w: u32, h: u32) -> HostVideoBuffer {
    let frame = HostVideoBuffer::new(VideoBufferInfo::nv12(w, h, 16, 16));
    let scene = make_scene(w as usize, h as usize, 0);
    for (x, y, v) in scene.pixels() {
        frame.set_luma(x as u32, y as u32, v);
    }
    frame
}

// ============================================================
// Remap
// ============================================================

fn bench_geo_map_host(c: &mut Criterion) {
    let mut group = c.benchmark_group("geo_map_host");
    group.sample_size(10);
    for &(w, h) in &[(320u32, 240u32), (640, 480)] {
        let input = host_frame(w, h);
        let mut handler = RemapHandler::new(HostBackend::new());
        handler.set_field(&barrel_field(w, h)).unwrap();
        let output = HostVideoBuffer::new(handler.prepare_output_info(&VideoBufferInfo::nv12(w, h, 16, 16)).unwrap());
        group.bench_function(BenchmarkId::from_parameter(format!("{w}x{h}")), |b| {
            b.iter(|| handler.process(&input, &output).unwrap())
        });
    }
    group.finish();
}

fn bench_geo_map_gpu(c: &mut Criterion) {
    if env::var("GEOSEAM_GPU_BENCH").is_err() {
        return;
    }
    let _ = env_logger::builder().is_test(true).try_init();
    let gpu = match GpuDevice::new() {
        Ok(gpu) => gpu,
        Err(e) => {
            eprintln!("skipping GPU benchmark: {e}");
            return;
        }
    };
    let backend = WgpuBackend::new(gpu).unwrap();
    let (w, h) = (1280u32, 720u32);
    let info = VideoBufferInfo::nv12(w, h, 16, 16);
    let input = backend.upload_frame(info.clone(), &host_frame(w, h).to_vec()).unwrap();
    let output = backend.create_frame(info).unwrap();
    let mut handler = RemapHandler::new(backend);
    handler.set_field(&barrel_field(w, h)).unwrap();

    let mut group = c.benchmark_group("geo_map_gpu");
    group.bench_function("1280x720", |b| b.iter(|| handler.process(&input, &output).unwrap()));
    group.finish();
}

// ============================================================
// Alignment stages on a 56-wide seam crop
// ============================================================

fn bench_pyramid(c: &mut Criterion) {
    let crop = make_scene(56, 720, 0);
    c.bench_function("pyramid/3level_56x720", |b| b.iter(|| Pyramid::build(&crop, 3, 5)));
}

fn bench_detectors(c: &mut Criterion) {
    let crop = make_scene(56, 720, 0);
    let gftt = GoodFeaturesDetector::new(GfttConfig::default());
    let orb = OrbDetector::new(OrbConfig::default());

    let mut group = c.benchmark_group("detect_56x720");
    group.bench_function("gftt", |b| b.iter(|| gftt.detect(&crop)));
    group.bench_function("orb", |b| b.iter(|| orb.detect(&crop)));
    group.finish();
}

fn bench_klt(c: &mut Criterion) {
    let crop0 = make_scene(56, 720, 0);
    let crop1 = make_scene(56, 720, 3);
    let points: Vec<(f32, f32)> = GoodFeaturesDetector::new(GfttConfig::default())
        .detect(&crop0)
        .iter()
        .map(|k| (k.x, k.y))
        .collect();
    let tracker = KltTracker::new(TrackerConfig::default());
    c.bench_function(&format!("klt/{}pts_56x720", points.len()), |b| {
        b.iter(|| tracker.track(&crop0, &crop1, &points))
    });
}

fn bench_robust_mean(c: &mut Criterion) {
    let estimator = FeatureCorrespondenceEstimator::new(&AlignerConfig::default());
    let mut offsets: Vec<f32> = (0..400).map(|i| 12.0 + ((i * 7) % 13) as f32 * 0.1).collect();
    offsets.extend((0..100).map(|i| i as f32));
    let sum = offsets.iter().sum();
    c.bench_function("robust_mean/500", |b| b.iter(|| estimator.robust_mean(&offsets, sum, offsets.len())));
}

fn bench_seam_align(c: &mut Criterion) {
    let (w, h) = (640usize, 360usize);
    let image0 = nv12_from_luma(&make_scene(w, h, 0));
    let image1 = nv12_from_luma(&make_scene(w, h, 2));
    let base = CropSet {
        image0_left: Rect::new(16, 0, 56, h as i32),
        image0_right: Rect::new(568, 0, 56, h as i32),
        image1_left: Rect::new(16, 0, 56, h as i32),
        image1_right: Rect::new(568, 0, 56, h as i32),
    };
    let mut aligner = SeamAligner::new(&AlignerConfig::default());
    let mut group = c.benchmark_group("seam_align");
    group.sample_size(20);
    group.bench_function("640x360_two_seams", |b| {
        b.iter(|| {
            let mut crops = base;
            aligner.align(&image0, &image1, w as i32, &mut crops).unwrap()
        })
    });
    group.finish();
}

// ============================================================
// Register
// ============================================================

criterion_group!(
    benches,
    bench_geo_map_host,
    bench_geo_map_gpu,
    bench_pyramid,
    bench_detectors,
    bench_klt,
    bench_robust_mean,
    bench_seam_align,
);
criterion_main!(benches);
