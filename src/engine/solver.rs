use ndarray::Array1;

/// One classical fourth order Runge-Kutta step of size `h` from `(t, y)`.
pub fn rk4_step<F>(f: &mut F, t: f64, y: &Array1<f64>, h: f64) -> Array1<f64>
where
    F: FnMut(f64, &Array1<f64>) -> Array1<f64>,
{
    let k1 = f(t, y);
    let k2 = f(t + 0.5 * h, &(y + &(&k1 * (0.5 * h))));
    let k3 = f(t + 0.5 * h, &(y + &(&k2 * (0.5 * h))));
    let k4 = f(t + h, &(y + &(&k3 * h)));
    y + &((k1 + &(k2 * 2.0) + &(k3 * 2.0) + &k4) * (h / 6.0))
}

/// Splits `[start, stop]` into steps of at most `step`, the last one shortened so the
/// grid ends exactly on `stop`. Returns the number of steps.
pub fn step_count(start: f64, stop: f64, step: f64) -> usize {
    let ratio = (stop - start) / step;
    let nearest = ratio.round();
    // absorb round-off, e.g. 5.0 / 0.1 = 50.000000000000001
    let n = if (ratio - nearest).abs() <= 1e-9 * nearest.max(1.0) {
        nearest
    } else {
        ratio.ceil()
    };
    (n as usize).max(1)
}

pub fn grid_time(start: f64, stop: f64, step: f64, k: usize, n_steps: usize) -> f64 {
    if k >= n_steps {
        stop
    } else {
        start + k as f64 * step
    }
}
