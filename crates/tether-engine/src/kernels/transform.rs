//! Spectral kernels: FFT family, shifts and convolution
//!
//! The transforms are planned through `rustfft`, which handles arbitrary
//! lengths with mixed-radix and Bluestein algorithms. No input is ever padded.

use super::{Dense, DenseRef};
use crate::error::{EngineError, Result};
use crate::types::Shape;
use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

fn spectrum(a: DenseRef<'_>, inverse: bool) -> Result<Vec<Complex64>> {
    let n = a.shape.element_count();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut buffer = a.to_complex();
    let mut planner = FftPlanner::<f64>::new();
    let plan = if inverse {
        planner.plan_fft_inverse(n)
    } else {
        planner.plan_fft_forward(n)
    };
    plan.process(&mut buffer);

    if inverse {
        let scale = 1.0 / n as f64;
        for z in &mut buffer {
            *z *= scale;
        }
    }
    Ok(buffer)
}

/// Forward DFT of a real or complex signal, as `Complex(n)`
pub fn fft(a: DenseRef<'_>) -> Result<Dense> {
    spectrum(a, false).map(|out| Dense::complex(&out))
}

/// Inverse DFT scaled by `1/n`, as `Complex(n)`
pub fn ifft(a: DenseRef<'_>) -> Result<Dense> {
    spectrum(a, true).map(|out| Dense::complex(&out))
}

/// Magnitude of each spectral bin
pub fn fft_mag(a: DenseRef<'_>) -> Result<Dense> {
    let out = spectrum(a, false)?;
    Ok(Dense::vector(out.iter().map(|z| z.norm()).collect()))
}

/// Phase (radians) of each spectral bin
pub fn fft_phase(a: DenseRef<'_>) -> Result<Dense> {
    let out = spectrum(a, false)?;
    Ok(Dense::vector(out.iter().map(|z| z.arg()).collect()))
}

/// Rotate a signal so the zero-frequency bin moves to the centre
///
/// `inverse` undoes the rotation; the two differ for odd lengths.
pub fn shift(a: DenseRef<'_>, inverse: bool) -> Result<Dense> {
    let n = a.shape.element_count();
    if n == 0 {
        return Dense::new(a.shape, Vec::new());
    }

    let width = if a.shape.is_complex() { 2 } else { 1 };
    let mut data = a.data.to_vec();
    if inverse {
        data.rotate_left((n / 2) * width);
    } else {
        data.rotate_right((n / 2) * width);
    }
    Dense::new(a.shape, data)
}

/// Full linear convolution, length `len(a) + len(b) - 1`
pub fn conv(a: DenseRef<'_>, b: DenseRef<'_>) -> Result<Dense> {
    let n = a.shape.element_count();
    let m = b.shape.element_count();
    if n == 0 || m == 0 {
        return Err(EngineError::invalid("convolution with an empty operand"));
    }
    let len = n + m - 1;

    if a.shape.is_complex() || b.shape.is_complex() {
        let (x, h) = (a.to_complex(), b.to_complex());
        let mut out = vec![Complex64::new(0.0, 0.0); len];
        for (i, &xi) in x.iter().enumerate() {
            for (j, &hj) in h.iter().enumerate() {
                out[i + j] += xi * hj;
            }
        }
        return Ok(Dense::complex(&out));
    }

    let mut out = vec![0.0; len];
    for (i, &xi) in a.data.iter().enumerate() {
        for (j, &hj) in b.data.iter().enumerate() {
            out[i + j] += xi * hj;
        }
    }
    Dense::new(Shape::Vector(len), out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_fft_of_impulse_is_flat() {
        let impulse = Dense::vector(vec![1.0, 0.0, 0.0]);
        let out = fft(impulse.borrowed()).unwrap();
        assert_eq!(out.shape, Shape::Complex(3));
        for pair in out.data.chunks_exact(2) {
            assert!((pair[0] - 1.0).abs() < EPSILON);
            assert!(pair[1].abs() < EPSILON);
        }
    }

    #[test]
    fn test_fft_arbitrary_lengths() {
        for n in [1usize, 3, 7, 12, 97] {
            let signal = Dense::vector((0..n).map(|i| i as f64).collect());
            let forward = fft(signal.borrowed()).unwrap();
            let back = ifft(forward.borrowed()).unwrap();
            for (i, pair) in back.data.chunks_exact(2).enumerate() {
                assert!((pair[0] - i as f64).abs() < 1e-8, "n={n} i={i}");
            }
        }
    }

    #[test]
    fn test_fft_of_empty_signal_is_empty() {
        let empty = Dense::vector(Vec::new());
        assert_eq!(fft(empty.borrowed()).unwrap().shape, Shape::Complex(0));
        assert_eq!(ifft(empty.borrowed()).unwrap().shape, Shape::Complex(0));
        assert_eq!(fft_mag(empty.borrowed()).unwrap().shape, Shape::Vector(0));
    }

    #[test]
    fn test_fft_mag_of_constant() {
        let dc = Dense::vector(vec![1.0; 4]);
        let mag = fft_mag(dc.borrowed()).unwrap();
        assert_eq!(mag.shape, Shape::Vector(4));
        assert!((mag.data[0] - 4.0).abs() < EPSILON);
        assert!(mag.data[1..].iter().all(|m| m.abs() < EPSILON));
    }

    #[test]
    fn test_shift_odd_length() {
        let a = Dense::vector(vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        let shifted = shift(a.borrowed(), false).unwrap();
        assert_eq!(shifted.data, vec![3.0, 4.0, 0.0, 1.0, 2.0]);
        let restored = shift(shifted.borrowed(), true).unwrap();
        assert_eq!(restored.data, a.data);
    }

    #[test]
    fn test_conv_full_length() {
        let signal = Dense::vector(vec![1.0, 2.0, 3.0]);
        let kernel = Dense::vector(vec![0.5, 0.5]);
        let out = conv(signal.borrowed(), kernel.borrowed()).unwrap();
        assert_eq!(out.data, vec![0.5, 1.5, 2.5, 1.5]);
    }
}
