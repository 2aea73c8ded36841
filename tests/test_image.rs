// tests/test_image.rs — Integration tests for Image<T> and the NV12 host
// frame helpers, through the public API only.

use geoseam::color::{rgb_to_gray, yuv_to_rgb, Nv12Image, Rect};
use geoseam::host::HostVideoBuffer;
use geoseam::image::{interpolate_bilinear, resize_bilinear, to_f32, to_u8, Image};
use geoseam::video::VideoBufferInfo;

// ===== Image<T> =====

#[test]
fn image_from_vec_layout() {
    let img = Image::from_vec(3, 2, vec![10u8, 20, 30, 40, 50, 60]);
    assert_eq!(img.get(0, 0), 10);
    assert_eq!(img.get(2, 0), 30);
    assert_eq!(img.get(0, 1), 40);
    assert_eq!(img.get(2, 1), 60);
}

#[test]
fn padded_rows_read_back_unpadded() {
    let mut img: Image<u8> = Image::new_with_stride(3, 2, 8);
    img.set(0, 0, 1);
    img.set(2, 1, 4);
    assert_eq!(img.row(0), &[1, 0, 0]);
    assert_eq!(img.row(1), &[0, 0, 4]);
    assert_eq!(img.pixels().count(), 6);
}

#[test]
fn crop_of_strided_image() {
    let mut img: Image<u8> = Image::new_with_stride(4, 4, 8);
    for y in 0..4 {
        for x in 0..4 {
            img.set(x, y, (y * 4 + x) as u8);
        }
    }
    let c = img.crop(1, 1, 2, 2);
    assert_eq!(c.stride(), 2);
    assert_eq!(c.row(0), &[5, 6]);
    assert_eq!(c.row(1), &[9, 10]);
}

#[test]
fn bilinear_on_ramp_is_exact() {
    let mut img = Image::<f32>::new(8, 4);
    for y in 0..4 {
        for x in 0..8 {
            img.set(x, y, x as f32 * 2.0);
        }
    }
    assert!((interpolate_bilinear(&img, 2.25, 1.5) - 4.5).abs() < 1e-5);
}

#[test]
fn resize_then_round_trip_to_u8() {
    let img = Image::from_vec(4, 4, vec![60u8; 16]);
    let half = to_u8(&resize_bilinear(&img, 2, 2));
    assert_eq!(half.as_slice(), &[60, 60, 60, 60]);
    assert_eq!(to_u8(&to_f32(&img)).as_slice(), img.as_slice());
}

// ===== NV12 frames =====

/// Luma ramp along x, neutral chroma.
fn ramp_frame(w: u32, h: u32) -> HostVideoBuffer {
    let frame = HostVideoBuffer::new(VideoBufferInfo::nv12(w, h, 16, 2));
    for y in 0..h {
        for x in 0..w {
            frame.set_luma(x, y, (16 + x * 2).min(235) as u8);
        }
    }
    for y in 0..h / 2 {
        for x in 0..w / 2 {
            frame.set_chroma(x, y, (128, 128));
        }
    }
    frame
}

#[test]
fn nv12_image_from_host_frame() {
    let frame = ramp_frame(40, 24);
    let img = Nv12Image::from_host_buffer(&frame).unwrap();
    assert_eq!((img.width(), img.height()), (40, 24));
    assert_eq!(img.y.get(10, 5), 36);
    assert_eq!(img.uv.get(0, 0), 128);
}

#[test]
fn gray_region_follows_luma() {
    let frame = ramp_frame(64, 16);
    let img = Nv12Image::from_host_buffer(&frame).unwrap();
    let crop = img.gray_region(Rect::new(8, 0, 16, 16)).unwrap();
    assert_eq!(crop.width(), 16);
    let first = crop.get(0, 3);
    let expected = rgb_to_gray(yuv_to_rgb(16 + 16, 128, 128));
    assert_eq!(first, expected);
    assert!(crop.row(3).windows(2).all(|p| p[0] <= p[1]));
}

#[test]
fn rgb_dump_has_frame_size() {
    let frame = ramp_frame(32, 8);
    let img = Nv12Image::from_host_buffer(&frame).unwrap();
    let rgb = img.to_rgb();
    assert_eq!(rgb.dimensions(), (32, 8));
    assert_eq!(rgb.get_pixel(0, 0).0, [0, 0, 0]);
}
