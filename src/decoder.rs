//! Decoder worker: the single-producer/single-consumer task that owns the
//! currently installed demodulator and turns raw IQ bytes into audio.
//!
//! Realized as one OS thread draining an `mpsc::Receiver<DecoderMessage>` in
//! submission order and pushing `DecoderResult`s to a bounded
//! `mpsc::SyncSender`, matching the two-thread `simple_fm`/`simple_am`
//! examples rather than introducing an async runtime.

use crate::demod::{self, Demodulator, Mode, IN_RATE};
use log::warn;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};

/// Opaque token the controller attaches to a `Process` request and gets back
/// unchanged on the matching `DecoderResult`, used to correlate completions
/// with in-flight bookkeeping.
pub type Echo = u64;

pub enum DecoderMessage {
    /// Replace the current demodulator with a fresh instance for `mode`.
    SetMode(Mode),
    /// Demodulate one block of raw interleaved IQ bytes.
    Process {
        bytes: Vec<u8>,
        in_stereo: bool,
        freq_offset: f32,
        echo: Echo,
    },
}

pub struct DecoderResult {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub stereo: bool,
    pub signal_level: f32,
    pub echo: Echo,
}

/// Converts a byte-pair into a centered `[-1, 1]` IQ sample.
#[inline]
fn byte_to_float(b: u8) -> f32 {
    b as f32 / 128.0 - 0.995
}

fn bytes_to_iq(bytes: &[u8]) -> (Vec<f32>, Vec<f32>) {
    let pairs = bytes.len() / 2;
    let mut i = Vec::with_capacity(pairs);
    let mut q = Vec::with_capacity(pairs);
    for chunk in bytes.chunks_exact(2) {
        i.push(byte_to_float(chunk[0]));
        q.push(byte_to_float(chunk[1]));
    }
    (i, q)
}

/// A coarse complex heterodyne, carrying the oscillator phase between calls
/// so consecutive blocks stay phase-continuous.
struct Mixer {
    cos: f32,
    sin: f32,
}

impl Mixer {
    fn new() -> Self {
        Mixer { cos: 1.0, sin: 0.0 }
    }

    fn mix(&mut self, i: &mut [f32], q: &mut [f32], freq_offset: f32) {
        if freq_offset == 0.0 {
            return;
        }
        let d_theta = -2.0 * std::f32::consts::PI * freq_offset / IN_RATE as f32;
        let (dc, ds) = (d_theta.cos(), d_theta.sin());
        let (mut cos, mut sin) = (self.cos, self.sin);
        for k in 0..i.len() {
            let (ci, cq) = (i[k], q[k]);
            i[k] = ci * cos - cq * sin;
            q[k] = ci * sin + cq * cos;
            let (next_cos, next_sin) = (cos * dc - sin * ds, cos * ds + sin * dc);
            cos = next_cos;
            sin = next_sin;
        }
        // Renormalize periodically so rounding error doesn't let the
        // oscillator's magnitude drift away from unity.
        let norm = (cos * cos + sin * sin).sqrt();
        self.cos = cos / norm;
        self.sin = sin / norm;
    }
}

/// Runs on the decoder thread, owning the current demodulator instance.
struct Decoder {
    demod: Box<dyn Demodulator>,
    mixer: Mixer,
}

impl Decoder {
    fn new() -> Self {
        Decoder {
            demod: demod::build(Mode::Wbfm),
            mixer: Mixer::new(),
        }
    }

    fn set_mode(&mut self, mode: Mode) {
        self.demod = demod::build(mode);
        self.mixer = Mixer::new();
    }

    fn process(
        &mut self,
        bytes: &[u8],
        in_stereo: bool,
        freq_offset: f32,
        echo: Echo,
    ) -> DecoderResult {
        let (mut i, mut q) = bytes_to_iq(bytes);
        self.mixer.mix(&mut i, &mut q, freq_offset);
        let out = self.demod.demodulate(&i, &q, in_stereo);
        DecoderResult {
            left: out.left,
            right: out.right,
            stereo: out.stereo,
            signal_level: out.signal_level,
            echo,
        }
    }
}

/// Handle to the running decoder thread. Dropping it closes the command
/// channel, which ends the thread's receive loop; the join then happens on
/// drop so no result is lost mid-flight.
pub struct DecoderHandle {
    tx: Sender<DecoderMessage>,
    rx: Receiver<DecoderResult>,
    join: Option<JoinHandle<()>>,
}

impl DecoderHandle {
    pub fn spawn() -> Self {
        let (tx, cmd_rx) = mpsc::channel::<DecoderMessage>();
        let (result_tx, rx) = mpsc::sync_channel::<DecoderResult>(2);
        let join = thread::spawn(move || run(cmd_rx, result_tx));
        DecoderHandle {
            tx,
            rx,
            join: Some(join),
        }
    }

    pub fn send(&self, msg: DecoderMessage) {
        if self.tx.send(msg).is_err() {
            warn!("decoder thread is gone, dropping message");
        }
    }

    pub fn try_recv(&self) -> Option<DecoderResult> {
        self.rx.try_recv().ok()
    }

    pub fn recv(&self) -> Option<DecoderResult> {
        self.rx.recv().ok()
    }
}

impl Drop for DecoderHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn run(cmd_rx: Receiver<DecoderMessage>, result_tx: SyncSender<DecoderResult>) {
    let mut decoder = Decoder::new();
    while let Ok(msg) = cmd_rx.recv() {
        match msg {
            DecoderMessage::SetMode(mode) => decoder.set_mode(mode),
            DecoderMessage::Process {
                bytes,
                in_stereo,
                freq_offset,
                echo,
            } => {
                let result = decoder.process(&bytes, in_stereo, freq_offset, echo);
                if result_tx.send(result).is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_to_float_centers_around_zero() {
        assert!((byte_to_float(128) - 0.005).abs() < 1e-6);
        assert!((byte_to_float(0) - (-0.995)).abs() < 1e-6);
    }

    #[test]
    fn zero_offset_mix_is_identity() {
        let mut mixer = Mixer::new();
        let mut i = vec![0.3, -0.2, 0.1];
        let mut q = vec![0.1, 0.4, -0.3];
        let orig_i = i.clone();
        let orig_q = q.clone();
        mixer.mix(&mut i, &mut q, 0.0);
        assert_eq!(i, orig_i);
        assert_eq!(q, orig_q);
    }

    #[test]
    fn decoder_processes_a_block_end_to_end() {
        let n = (IN_RATE / 5) as usize;
        let bytes: Vec<u8> = (0..n * 2)
            .map(|k| (127.5 + 20.0 * ((k as f32) * 0.001).sin()) as u8)
            .collect();
        let mut decoder = Decoder::new();
        decoder.set_mode(Mode::Wbfm);
        let result = decoder.process(&bytes, false, 0.0, 42);
        assert_eq!(result.echo, 42);
        assert!(!result.left.is_empty());
    }

    #[test]
    fn handle_round_trips_a_process_request() {
        let handle = DecoderHandle::spawn();
        handle.send(DecoderMessage::SetMode(Mode::Nbfm { max_f: 5_000.0 }));
        let n = (IN_RATE / 5) as usize;
        let bytes = vec![127u8; n * 2];
        handle.send(DecoderMessage::Process {
            bytes,
            in_stereo: false,
            freq_offset: 0.0,
            echo: 7,
        });
        let result = handle.recv().expect("decoder should reply");
        assert_eq!(result.echo, 7);
    }
}
