//! Perceptual hashing
//!
//! Pure functions that compute 64-bit perceptual fingerprints of image
//! content, plus the Hamming-distance helpers used by duplicate grouping.
//! Decoding files into pixels happens at the caller; everything here
//! operates on grayscale buffers and hex strings.
//!
//! Hash types:
//! - dHash (difference hash): adjacent-pixel gradients, good for crops/resizes
//! - aHash (average hash): mean-threshold, simple but effective
//! - wHash (wavelet hash): low-frequency Haar DWT sub-band, most robust

use image::imageops::{self, FilterType};
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::shared::error::AnalysisError;

/// Hash grid size; 8x8 = 64-bit hashes, 16 hex characters
pub const HASH_SIZE: u32 = 8;

/// The three perceptual hashes computed for every image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerceptualHashes {
    pub dhash: String,
    pub ahash: String,
    pub whash: String,
}

/// Computes the Hamming distance between two hex hashes
///
/// # Errors
/// Returns `HashLengthMismatch` if the strings differ in length, or
/// `InvalidHash` on non-hex characters.
pub fn hamming_distance(hash1: &str, hash2: &str) -> Result<u32, AnalysisError> {
    if hash1.len() != hash2.len() {
        return Err(AnalysisError::HashLengthMismatch(hash1.len(), hash2.len()));
    }

    let mut distance = 0u32;
    for (c1, c2) in hash1.chars().zip(hash2.chars()) {
        let n1 = c1
            .to_digit(16)
            .ok_or_else(|| AnalysisError::InvalidHash(hash1.to_string()))?;
        let n2 = c2
            .to_digit(16)
            .ok_or_else(|| AnalysisError::InvalidHash(hash2.to_string()))?;
        distance += (n1 ^ n2).count_ones();
    }
    Ok(distance)
}

/// Computes similarity between two hashes as a percentage
///
/// `100 - floor(100 * distance / bits)`: identical strings score 100,
/// fully flipped strings score 0.
pub fn similarity_score(hash1: &str, hash2: &str) -> Result<u8, AnalysisError> {
    let distance = hamming_distance(hash1, hash2)?;
    let bits = (hash1.len() * 4) as u32;
    if bits == 0 {
        return Err(AnalysisError::InvalidHash("empty hash".into()));
    }
    Ok((100 - (100 * distance / bits).min(100)) as u8)
}

/// Computes the difference hash (gradient-based)
///
/// Each bit is 1 when the left pixel is brighter than its right neighbour
/// on a `(HASH_SIZE+1) x HASH_SIZE` downscale.
pub fn compute_dhash(image: &GrayImage) -> String {
    let resized = imageops::resize(image, HASH_SIZE + 1, HASH_SIZE, FilterType::Lanczos3);

    let mut bits = Vec::with_capacity((HASH_SIZE * HASH_SIZE) as usize);
    for row in 0..HASH_SIZE {
        for col in 0..HASH_SIZE {
            let left = resized.get_pixel(col, row)[0];
            let right = resized.get_pixel(col + 1, row)[0];
            bits.push(left > right);
        }
    }
    bits_to_hex(&bits)
}

/// Computes the average hash (mean-based)
///
/// Each bit is 1 when the pixel is brighter than the mean of the
/// `HASH_SIZE x HASH_SIZE` downscale.
pub fn compute_ahash(image: &GrayImage) -> String {
    let resized = imageops::resize(image, HASH_SIZE, HASH_SIZE, FilterType::Lanczos3);

    let pixels: Vec<f64> = resized.pixels().map(|p| p[0] as f64).collect();
    let avg = pixels.iter().sum::<f64>() / pixels.len() as f64;

    let bits: Vec<bool> = pixels.iter().map(|&p| p > avg).collect();
    bits_to_hex(&bits)
}

/// Computes the wavelet hash (DWT-based)
///
/// Downscales to `4*HASH_SIZE`, takes one level of a 2D Haar DWT, reduces
/// the approximation sub-band to `HASH_SIZE x HASH_SIZE`, and thresholds
/// against the median coefficient.
pub fn compute_whash(image: &GrayImage) -> String {
    let side = HASH_SIZE * 4;
    let resized = imageops::resize(image, side, side, FilterType::Lanczos3);

    let pixels: Vec<f64> = resized.pixels().map(|p| p[0] as f64).collect();
    let approx = haar_approximation(&pixels, side as usize);
    let reduced = box_downsample(&approx, (side / 2) as usize, HASH_SIZE as usize);

    let median = median_of(&reduced);
    let bits: Vec<bool> = reduced.iter().map(|&v| v > median).collect();
    bits_to_hex(&bits)
}

/// Computes all three hash types
pub fn compute_all_hashes(image: &GrayImage) -> PerceptualHashes {
    PerceptualHashes {
        dhash: compute_dhash(image),
        ahash: compute_ahash(image),
        whash: compute_whash(image),
    }
}

/// One level of the 2D Haar DWT, approximation coefficients only.
/// Input is a `size x size` row-major matrix with even `size`; output is
/// `(size/2) x (size/2)` with the standard `(a+b+c+d)/2` normalization.
fn haar_approximation(pixels: &[f64], size: usize) -> Vec<f64> {
    let half = size / 2;
    let mut approx = vec![0.0; half * half];
    for row in 0..half {
        for col in 0..half {
            let r = row * 2;
            let c = col * 2;
            let sum = pixels[r * size + c]
                + pixels[r * size + c + 1]
                + pixels[(r + 1) * size + c]
                + pixels[(r + 1) * size + c + 1];
            approx[row * half + col] = sum / 2.0;
        }
    }
    approx
}

/// Box-filter downsample of a square matrix from `from` to `to` per side.
/// `from` must be a multiple of `to`.
fn box_downsample(values: &[f64], from: usize, to: usize) -> Vec<f64> {
    let factor = from / to;
    let cell = (factor * factor) as f64;
    let mut out = vec![0.0; to * to];
    for row in 0..to {
        for col in 0..to {
            let mut sum = 0.0;
            for dr in 0..factor {
                for dc in 0..factor {
                    sum += values[(row * factor + dr) * from + (col * factor + dc)];
                }
            }
            out[row * to + col] = sum / cell;
        }
    }
    out
}

/// Median of a slice; for even counts, the mean of the middle pair
fn median_of(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("non-finite coefficient"));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Packs a bit vector into a lowercase hex string, 4 bits per character
fn bits_to_hex(bits: &[bool]) -> String {
    bits.chunks(4)
        .map(|chunk| {
            let mut nibble = 0u32;
            for &bit in chunk {
                nibble = (nibble << 1) | bit as u32;
            }
            // Final partial chunk pads on the right, like an integer format
            nibble <<= 4 - chunk.len();
            char::from_digit(nibble, 16).expect("nibble out of range")
        })
        .collect()
}
