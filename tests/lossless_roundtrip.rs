//! Lossless VP8L encoder roundtrip tests.
//!
//! Wraps each bitstream in a RIFF container, decodes it with `image-webp`
//! and checks the pixels come back unchanged.

use std::io::Cursor;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use zenvp8l::{EncodeRequest, LosslessConfig, PixelLayout};

fn wrap_vp8l_in_riff(vp8l_data: &[u8]) -> Vec<u8> {
    let mut webp = Vec::new();
    webp.extend_from_slice(b"RIFF");
    let riff_size = 4 + 8 + vp8l_data.len() + (vp8l_data.len() % 2);
    webp.extend_from_slice(&(riff_size as u32).to_le_bytes());
    webp.extend_from_slice(b"WEBP");
    webp.extend_from_slice(b"VP8L");
    webp.extend_from_slice(&(vp8l_data.len() as u32).to_le_bytes());
    webp.extend_from_slice(vp8l_data);
    if vp8l_data.len() % 2 == 1 {
        webp.push(0);
    }
    webp
}

/// Decode to RGBA regardless of whether the decoder reports alpha.
fn decode_rgba(webp: &[u8]) -> (Vec<u8>, u32, u32) {
    let mut decoder = image_webp::WebPDecoder::new(Cursor::new(webp)).expect("invalid container");
    let (w, h) = decoder.dimensions();
    let size = decoder.output_buffer_size().expect("image too large");
    let mut buf = vec![0u8; size];
    decoder.read_image(&mut buf).expect("decode failed");
    let rgba = if decoder.has_alpha() {
        buf
    } else {
        buf.chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect()
    };
    (rgba, w, h)
}

fn assert_lossless_roundtrip(rgba: &[u8], w: u32, h: u32, config: &LosslessConfig, label: &str) {
    let vp8l = EncodeRequest::new(config, rgba, PixelLayout::Rgba8, w, h)
        .encode()
        .unwrap_or_else(|e| panic!("{label}: encode failed: {e}"));
    let (decoded, dw, dh) = decode_rgba(&wrap_vp8l_in_riff(&vp8l));
    assert_eq!((dw, dh), (w, h), "{label}");
    let mismatches = decoded
        .chunks_exact(4)
        .zip(rgba.chunks_exact(4))
        .filter(|(a, b)| a != b)
        .count();
    assert_eq!(mismatches, 0, "{label}: {mismatches}/{} pixel mismatches", w * h);
}

fn photo(rng: &mut StdRng, w: u32, h: u32) -> Vec<u8> {
    let mut rgba = Vec::with_capacity((w * h * 4) as usize);
    for y in 0..h {
        for x in 0..w {
            let n: i32 = rng.gen_range(-4..=4);
            let r = ((x * 255 / w) as i32 + n).clamp(0, 255) as u8;
            let g = ((y * 255 / h) as i32 - n).clamp(0, 255) as u8;
            let b = (((x + y) * 255 / (w + h)) as i32 + n).clamp(0, 255) as u8;
            rgba.extend_from_slice(&[r, g, b, 255]);
        }
    }
    rgba
}

fn palette(rng: &mut StdRng, w: u32, h: u32, colors: usize) -> Vec<u8> {
    let table: Vec<[u8; 4]> = (0..colors).map(|_| [rng.gen(), rng.gen(), rng.gen(), 255]).collect();
    let mut rgba = Vec::with_capacity((w * h * 4) as usize);
    for y in 0..h {
        for x in 0..w {
            let i = if rng.gen_ratio(1, 10) {
                rng.gen_range(0..colors)
            } else {
                ((x / 5) as usize * 3 + (y / 3) as usize) % colors
            };
            rgba.extend_from_slice(&table[i]);
        }
    }
    rgba
}

fn noise(rng: &mut StdRng, w: u32, h: u32) -> Vec<u8> {
    (0..w * h)
        .flat_map(|_| [rng.gen(), rng.gen(), rng.gen(), 255])
        .collect()
}

/// Gradient with a varying alpha ramp and fully transparent holes.
fn with_alpha(rng: &mut StdRng, w: u32, h: u32) -> Vec<u8> {
    let mut rgba = photo(rng, w, h);
    for (i, px) in rgba.chunks_exact_mut(4).enumerate() {
        let x = i as u32 % w;
        px[3] = if rng.gen_ratio(1, 8) { 0 } else { (x * 255 / w) as u8 };
    }
    rgba
}

const SIZES: [(u32, u32); 6] = [(1, 1), (7, 3), (3, 40), (64, 64), (100, 37), (129, 65)];
const PRESETS: [(f32, u8); 5] = [(0.0, 0), (25.0, 2), (75.0, 4), (90.0, 5), (100.0, 6)];

fn roundtrip_all(kind: &str, make: impl Fn(&mut StdRng, u32, u32) -> Vec<u8>) {
    let mut rng = StdRng::seed_from_u64(0x7e57);
    for &(w, h) in &SIZES {
        let rgba = make(&mut rng, w, h);
        for &(quality, method) in &PRESETS {
            let config = LosslessConfig::new().with_quality(quality).with_method(method);
            let label = format!("{kind} {w}x{h} q{quality} m{method}");
            assert_lossless_roundtrip(&rgba, w, h, &config, &label);
        }
    }
}

#[test]
fn roundtrip_photo() {
    roundtrip_all("photo", photo);
}

#[test]
fn roundtrip_palette() {
    roundtrip_all("palette", |rng, w, h| palette(rng, w, h, 40));
}

#[test]
fn roundtrip_two_colors() {
    roundtrip_all("two-color", |rng, w, h| palette(rng, w, h, 2));
}

#[test]
fn roundtrip_noise() {
    roundtrip_all("noise", noise);
}

#[test]
fn roundtrip_alpha() {
    roundtrip_all("alpha", with_alpha);
}

#[test]
fn roundtrip_small_palettes_with_box_matching() {
    let mut rng = StdRng::seed_from_u64(11);
    for colors in [3, 4, 5, 16] {
        let rgba = palette(&mut rng, 96, 48, colors);
        for &(quality, method) in &PRESETS {
            let config = LosslessConfig::new().with_quality(quality).with_method(method);
            assert_lossless_roundtrip(&rgba, 96, 48, &config, &format!("{colors} colors q{quality} m{method}"));
        }
    }
}

#[test]
fn roundtrip_cache_settings_and_seeds() {
    let mut rng = StdRng::seed_from_u64(12);
    let rgba = palette(&mut rng, 80, 80, 200);
    for cache_bits in [0, 1, 4, 10] {
        let config = LosslessConfig::new().with_cache_bits(cache_bits);
        assert_lossless_roundtrip(&rgba, 80, 80, &config, &format!("cache {cache_bits}"));
    }
    for seed in [0, 7, u32::MAX] {
        let config = LosslessConfig::new().with_seed(seed).with_quality(100.0);
        assert_lossless_roundtrip(&rgba, 80, 80, &config, &format!("seed {seed}"));
    }
}
