//! Cubic B-spline interpolation.
//!
//! Voxel values are first converted to B-spline coefficients with the
//! recursive prefilter of Unser et al., so the spline passes through the
//! samples. Boundaries are mirror-symmetric. Evaluation reads the 4x4x4
//! coefficient neighbourhood of each point and runs on the CPU, one rayon
//! task per chunk of points.

use burn::tensor::{Shape, Tensor, TensorData};
use burn::tensor::backend::Backend;
use rayon::prelude::*;
use super::trait_::Interpolator;

const POLE: f64 = -0.267_949_192_431_122_7; // sqrt(3) - 2
const TOLERANCE: f64 = 1e-10;

/// Interpolating cubic B-spline.
#[derive(Debug, Clone, Copy, Default)]
pub struct BSplineInterpolator;

impl BSplineInterpolator {
    /// Create a new B-spline interpolator.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for BSplineInterpolator {
    fn interpolate<const D: usize>(
        &self,
        data: &Tensor<B, D>,
        indices: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        assert_eq!(D, 3, "BSplineInterpolator only supports 3D volumes");

        let device = indices.device();
        let [n_points, rank] = indices.dims();
        assert_eq!(rank, 3, "Indices rank must match data dimensionality");

        let shape = data.shape();
        let dims = [shape.dims[0], shape.dims[1], shape.dims[2]];

        let voxels = data.to_data().convert::<f32>();
        let voxels = voxels.as_slice::<f32>().expect("voxel data converted to f32");
        let coefficients = Coefficients::from_samples(voxels, dims);

        let points = indices.into_data().convert::<f32>();
        let points = points.as_slice::<f32>().expect("indices converted to f32");

        let values: Vec<f32> = points
            .par_chunks(3)
            .map(|p| coefficients.evaluate(p[0] as f64, p[1] as f64, p[2] as f64) as f32)
            .collect();

        Tensor::<B, 1>::from_data(TensorData::new(values, Shape::new([n_points])), &device)
    }
}

/// Cubic B-spline weights for the four neighbours `floor(t) - 1 ..= floor(t) + 2`.
fn weights(t: f64) -> [f64; 4] {
    let u = 1.0 - t;
    [
        u * u * u / 6.0,
        2.0 / 3.0 - t * t + 0.5 * t * t * t,
        2.0 / 3.0 - u * u + 0.5 * u * u * u,
        t * t * t / 6.0,
    ]
}

/// Reflect `k` into `0..n` (whole-sample symmetric).
fn mirror(k: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let k = k.rem_euclid(period);
    if k >= n as isize {
        (period - k) as usize
    } else {
        k as usize
    }
}

/// In-place conversion of one line of samples to spline coefficients.
fn prefilter_line(line: &mut [f64]) {
    let n = line.len();
    if n < 2 {
        return;
    }
    let z = POLE;
    let gain = (1.0 - z) * (1.0 - 1.0 / z);
    for v in line.iter_mut() {
        *v *= gain;
    }

    line[0] = causal_init(line, z);
    for k in 1..n {
        line[k] += z * line[k - 1];
    }

    line[n - 1] = (z / (z * z - 1.0)) * (z * line[n - 2] + line[n - 1]);
    for k in (0..n - 1).rev() {
        line[k] = z * (line[k + 1] - line[k]);
    }
}

fn causal_init(line: &[f64], z: f64) -> f64 {
    let n = line.len();
    let horizon = (TOLERANCE.ln() / z.abs().ln()).ceil() as usize;

    if horizon < n {
        let mut zn = z;
        let mut sum = line[0];
        for value in line.iter().take(horizon).skip(1) {
            sum += zn * value;
            zn *= z;
        }
        sum
    } else {
        let mut zn = z;
        let iz = 1.0 / z;
        let mut z2n = z.powi(n as i32 - 1);
        let mut sum = line[0] + z2n * line[n - 1];
        z2n *= z2n * iz;
        for value in line.iter().take(n - 1).skip(1) {
            sum += (zn + z2n) * value;
            zn *= z;
            z2n *= iz;
        }
        sum / (1.0 - zn * zn)
    }
}

/// Spline coefficients on a `[Z, Y, X]` grid.
struct Coefficients {
    values: Vec<f64>,
    dims: [usize; 3],
}

impl Coefficients {
    fn from_samples(samples: &[f32], dims: [usize; 3]) -> Self {
        let [nz, ny, nx] = dims;
        let mut values: Vec<f64> = samples.iter().map(|&v| v as f64).collect();

        // X lines are contiguous.
        values.par_chunks_mut(nx).for_each(prefilter_line);

        // Y and Z lines are strided; filter them per slab.
        let mut line = vec![0.0; ny.max(nz)];
        for z in 0..nz {
            for x in 0..nx {
                for y in 0..ny {
                    line[y] = values[(z * ny + y) * nx + x];
                }
                prefilter_line(&mut line[..ny]);
                for y in 0..ny {
                    values[(z * ny + y) * nx + x] = line[y];
                }
            }
        }
        for y in 0..ny {
            for x in 0..nx {
                for z in 0..nz {
                    line[z] = values[(z * ny + y) * nx + x];
                }
                prefilter_line(&mut line[..nz]);
                for z in 0..nz {
                    values[(z * ny + y) * nx + x] = line[z];
                }
            }
        }

        Self { values, dims }
    }

    fn evaluate(&self, x: f64, y: f64, z: f64) -> f64 {
        let [nz, ny, nx] = self.dims;

        let (xf, yf, zf) = (x.floor(), y.floor(), z.floor());
        let wx = weights(x - xf);
        let wy = weights(y - yf);
        let wz = weights(z - zf);
        let (x0, y0, z0) = (xf as isize - 1, yf as isize - 1, zf as isize - 1);

        let mut sum = 0.0;
        for (dz, wz) in wz.iter().enumerate() {
            let zi = mirror(z0 + dz as isize, nz);
            for (dy, wy) in wy.iter().enumerate() {
                let yi = mirror(y0 + dy as isize, ny);
                let row = (zi * ny + yi) * nx;
                let mut acc = 0.0;
                for (dx, wx) in wx.iter().enumerate() {
                    acc += wx * self.values[row + mirror(x0 + dx as isize, nx)];
                }
                sum += wz * wy * acc;
            }
        }
        sum
    }
}
