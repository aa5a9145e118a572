//! Pure-DSP command-line filter: reads raw u8 IQ samples from stdin and
//! writes demodulated 16-bit signed little-endian interleaved stereo audio
//! to stdout. Needs no USB hardware, so it doubles as an offline test
//! harness for captured IQ files and as a `nc`/pipe-friendly decoder.

use rtlsdr_radio::dsp::{
    lowpass_fir_coeffs, AmDemodulator, Deemphasis, Downsampler, FirFilter, FmDemodulator,
    IqDownsampler, StereoSeparator,
};
use std::env;
use std::io::{self, Read, Write};

const DEFAULT_IN_RATE: u32 = 1_024_000;
const DEFAULT_OUT_RATE: u32 = 48_000;
const DEFAULT_BLOCKSIZE: usize = 16_384;
const DEFAULT_MAX_F: f32 = 5_000.0;
const DEFAULT_BANDWIDTH: f32 = 10_000.0;
const DEEMPH_TAU_US: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeArg {
    Am,
    Wbfm,
    Nbfm,
}

struct Config {
    mode: ModeArg,
    mono: bool,
    blocksize: usize,
    in_rate: u32,
    out_rate: u32,
    max_f: f32,
    bandwidth: f32,
}

fn parse_args() -> Option<Config> {
    let mut config = Config {
        mode: ModeArg::Wbfm,
        mono: false,
        blocksize: DEFAULT_BLOCKSIZE,
        in_rate: DEFAULT_IN_RATE,
        out_rate: DEFAULT_OUT_RATE,
        max_f: DEFAULT_MAX_F,
        bandwidth: DEFAULT_BANDWIDTH,
    };
    let args: Vec<String> = env::args().skip(1).collect();
    let mut idx = 0;
    while idx < args.len() {
        match args[idx].as_str() {
            "-mod" => {
                idx += 1;
                config.mode = match args.get(idx)?.to_ascii_uppercase().as_str() {
                    "AM" => ModeArg::Am,
                    "WBFM" => ModeArg::Wbfm,
                    "NBFM" => ModeArg::Nbfm,
                    _ => return None,
                };
            }
            "-mono" => config.mono = true,
            "-blocksize" => {
                idx += 1;
                config.blocksize = args.get(idx)?.parse().ok()?;
            }
            "-inrate" => {
                idx += 1;
                config.in_rate = args.get(idx)?.parse().ok()?;
            }
            "-outrate" => {
                idx += 1;
                config.out_rate = args.get(idx)?.parse().ok()?;
            }
            "-maxf" => {
                idx += 1;
                config.max_f = args.get(idx)?.parse().ok()?;
            }
            "-bandwidth" => {
                idx += 1;
                config.bandwidth = args.get(idx)?.parse().ok()?;
            }
            _ => return None,
        }
        idx += 1;
    }
    Some(config)
}

/// AM and NBFM chains built directly from the `dsp` primitives rather than
/// `demod::build`, since the command line lets rates vary at runtime where
/// the live-radio path fixes them at `1.024 Msps -> 48 kHz`.
enum Pipeline {
    Am {
        iq_down: IqDownsampler,
        demod: AmDemodulator,
        audio_filter: FirFilter,
    },
    Wbfm {
        iq_down: IqDownsampler,
        fm: FmDemodulator,
        noise_filter: FirFilter,
        stereo: StereoSeparator,
        mono_down: Downsampler,
        side_down: Downsampler,
        deemph_l: Deemphasis,
        deemph_r: Deemphasis,
    },
    Nbfm {
        iq_down: IqDownsampler,
        fm: FmDemodulator,
        bandpass: FirFilter,
        final_down: Downsampler,
    },
}

impl Pipeline {
    fn build(config: &Config) -> Self {
        match config.mode {
            ModeArg::Am => {
                let coeffs = lowpass_fir_coeffs(
                    config.out_rate as f64,
                    (config.bandwidth / 2.0) as f64,
                    351,
                );
                Pipeline::Am {
                    iq_down: IqDownsampler::new(config.in_rate, config.out_rate, 161),
                    demod: AmDemodulator::new(),
                    audio_filter: FirFilter::new(&coeffs, 1),
                }
            }
            ModeArg::Wbfm => {
                let inter_rate = 336_000u32.max(config.out_rate * 2);
                let noise_coeffs =
                    lowpass_fir_coeffs(inter_rate as f64, (0.9 * 75_000.0) as f64, 101);
                Pipeline::Wbfm {
                    iq_down: IqDownsampler::new(config.in_rate, inter_rate, 161),
                    fm: FmDemodulator::new(inter_rate, 75_000.0),
                    noise_filter: FirFilter::new(&noise_coeffs, 1),
                    stereo: StereoSeparator::new(inter_rate),
                    mono_down: Downsampler::new(inter_rate, config.out_rate, 41),
                    side_down: Downsampler::new(inter_rate, config.out_rate, 41),
                    deemph_l: Deemphasis::new(config.out_rate as f32, DEEMPH_TAU_US),
                    deemph_r: Deemphasis::new(config.out_rate as f32, DEEMPH_TAU_US),
                }
            }
            ModeArg::Nbfm => {
                let multiple = 1 + (((config.max_f - 1.0) * 7.0) / 75_000.0).floor() as u32;
                let inter_rate = config.out_rate * multiple.max(1);
                let bandpass_coeffs =
                    lowpass_fir_coeffs(inter_rate as f64, (0.8 * config.max_f) as f64, 101);
                let final_coeffs =
                    lowpass_fir_coeffs(inter_rate as f64, config.out_rate as f64 / 6.0, 41);
                Pipeline::Nbfm {
                    iq_down: IqDownsampler::new(config.in_rate, inter_rate, 161),
                    fm: FmDemodulator::new(inter_rate, config.max_f),
                    bandpass: FirFilter::new(&bandpass_coeffs, 1),
                    final_down: Downsampler::with_coeffs(inter_rate, config.out_rate, &final_coeffs),
                }
            }
        }
    }

    fn process(&mut self, i: &[f32], q: &[f32], stereo_requested: bool) -> (Vec<f32>, Vec<f32>) {
        let interleaved: Vec<f32> = i.iter().zip(q.iter()).flat_map(|(&a, &b)| [a, b]).collect();
        match self {
            Pipeline::Am {
                iq_down,
                demod,
                audio_filter,
            } => {
                let (di, dq) = iq_down.downsample(&interleaved);
                let (envelope, _carrier) = demod.demod(&di, &dq);
                audio_filter.load(&envelope);
                let mono: Vec<f32> = (0..audio_filter.input_len())
                    .map(|k| audio_filter.get(k))
                    .collect();
                let right = mono.clone();
                (mono, right)
            }
            Pipeline::Wbfm {
                iq_down,
                fm,
                noise_filter,
                stereo,
                mono_down,
                side_down,
                deemph_l,
                deemph_r,
            } => {
                let (di, dq) = iq_down.downsample(&interleaved);
                let (composite, _carrier) = fm.demod(&di, &dq);
                noise_filter.load(&composite);
                let filtered: Vec<f32> = (0..noise_filter.input_len())
                    .map(|k| noise_filter.get(k))
                    .collect();
                let side = if stereo_requested {
                    Some(stereo.process(&filtered))
                } else {
                    None
                };
                let mut mono_out = mono_down.downsample(&filtered);
                let found = stereo.locked();
                let (mut left, mut right) = if let (true, Some(side)) = (stereo_requested && found, side)
                {
                    let side_out = side_down.downsample(&side);
                    let len = mono_out.len().min(side_out.len());
                    let left: Vec<f32> = (0..len).map(|k| mono_out[k] + side_out[k]).collect();
                    let right: Vec<f32> = (0..len).map(|k| mono_out[k] - side_out[k]).collect();
                    (left, right)
                } else {
                    let right = mono_out.clone();
                    (std::mem::take(&mut mono_out), right)
                };
                deemph_l.process_block(&mut left);
                deemph_r.process_block(&mut right);
                (left, right)
            }
            Pipeline::Nbfm {
                iq_down,
                fm,
                bandpass,
                final_down,
            } => {
                let (di, dq) = iq_down.downsample(&interleaved);
                let (composite, _carrier) = fm.demod(&di, &dq);
                bandpass.load(&composite);
                let filtered: Vec<f32> = (0..bandpass.input_len()).map(|k| bandpass.get(k)).collect();
                let mono = final_down.downsample(&filtered);
                let right = mono.clone();
                (mono, right)
            }
        }
    }
}

fn byte_to_float(b: u8) -> f32 {
    b as f32 / 128.0 - 0.995
}

fn write_stereo(out: &mut impl Write, left: &[f32], right: &[f32], mono: bool) -> io::Result<()> {
    let len = left.len().min(right.len());
    let mut buf = Vec::with_capacity(len * 4);
    for k in 0..len {
        let l = (left[k].clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        let r = if mono {
            l
        } else {
            (right[k].clamp(-1.0, 1.0) * i16::MAX as f32) as i16
        };
        buf.extend_from_slice(&l.to_le_bytes());
        buf.extend_from_slice(&r.to_le_bytes());
    }
    out.write_all(&buf)
}

fn main() {
    let config = match parse_args() {
        Some(c) => c,
        None => {
            eprintln!(
                "usage: demod-stdin [-mod AM|WBFM|NBFM] [-mono] [-blocksize N] \
                 [-inrate R] [-outrate R] [-maxf F] [-bandwidth B]"
            );
            std::process::exit(1);
        }
    };

    let mut pipeline = Pipeline::build(&config);
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut reader = stdin.lock();
    let mut writer = io::BufWriter::new(stdout.lock());

    let mut buf = vec![0u8; config.blocksize];
    loop {
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => {
                    eprintln!("demod-stdin: read error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        if filled == 0 {
            break;
        }
        let pairs = filled / 2;
        let mut i = Vec::with_capacity(pairs);
        let mut q = Vec::with_capacity(pairs);
        for chunk in buf[..pairs * 2].chunks_exact(2) {
            i.push(byte_to_float(chunk[0]));
            q.push(byte_to_float(chunk[1]));
        }
        let (left, right) = pipeline.process(&i, &q, !config.mono);
        if write_stereo(&mut writer, &left, &right, config.mono).is_err() {
            std::process::exit(1);
        }
        if filled < buf.len() {
            break;
        }
    }
    let _ = writer.flush();
    std::process::exit(0);
}
