//! Benchmarks the FIR filter inner loop, the single hottest call in the
//! demodulation pipeline (every sample of every demodulator's output runs
//! through at least one `FirFilter::get`).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rtlsdr_radio::dsp::{lowpass_fir_coeffs, FirFilter};

fn bench_fir_get(c: &mut Criterion) {
    let coeffs = lowpass_fir_coeffs(1_024_000.0, 100_000.0, 161);
    let mut filter = FirFilter::new(&coeffs, 1);
    let block: Vec<f32> = (0..4096).map(|k| (k as f32 * 0.01).sin()).collect();
    filter.load(&block);
    let n = filter.input_len();

    c.bench_function("fir_filter_get_4096", |b| {
        b.iter(|| {
            for k in 0..n {
                black_box(filter.get(black_box(k)));
            }
        })
    });
}

fn bench_fir_load(c: &mut Criterion) {
    let coeffs = lowpass_fir_coeffs(1_024_000.0, 100_000.0, 161);
    let mut filter = FirFilter::new(&coeffs, 1);
    let block: Vec<f32> = (0..4096).map(|k| (k as f32 * 0.01).sin()).collect();

    c.bench_function("fir_filter_load_4096", |b| {
        b.iter(|| filter.load(black_box(&block)))
    });
}

criterion_group!(benches, bench_fir_get, bench_fir_load);
criterion_main!(benches);
