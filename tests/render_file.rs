use std::f32::consts::PI;
use std::path::PathBuf;

use adaptive_limiter::engine::render::render_file;
use adaptive_limiter::Parameters;

const SR: u32 = 48_000;

fn temp_wav(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("adaptive_limiter_{}_{}.wav", std::process::id(), name))
}

/// Half a second of a quiet 1 kHz tone followed by half a second at full scale.
fn write_source(path: &PathBuf) -> Vec<f32> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SR,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let mut left = Vec::new();
    for i in 0..SR as usize {
        let amplitude = if i < SR as usize / 2 { 0.1 } else { 1.0 };
        let s = amplitude * (2.0 * PI * 1000.0 * i as f32 / SR as f32).sin();
        writer.write_sample(s).unwrap();
        writer.write_sample(s).unwrap();
        left.push(s);
    }
    writer.finalize().unwrap();
    left
}

#[test]
fn renders_an_aligned_limited_copy() {
    let source = temp_wav("source");
    let rendered = temp_wav("rendered");
    let input = write_source(&source);

    let summary = render_file(&source, &rendered, Parameters::default(), 256).unwrap();
    assert_eq!(summary.sample_rate, SR);
    assert_eq!(summary.channels, 2);
    assert_eq!(summary.frames, SR as u64);

    let mut reader = hound::WavReader::open(&rendered).unwrap();
    assert_eq!(reader.spec().sample_format, hound::SampleFormat::Float);
    let output: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
    assert_eq!(output.len(), input.len() * 2);

    // quiet half: makeup gain only, no delay after compensation
    let makeup = 10f32.powf(8.0 / 20.0);
    for n in 1000..20_000 {
        assert!((output[2 * n] - input[n] * makeup).abs() < 1e-4, "frame {}", n);
    }

    // loud half stays at the ceiling
    let loud_peak = output[SR as usize..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(loud_peak <= 1.01, "peak {}", loud_peak);
    assert!(loud_peak > 0.9);
    assert!(summary.peak.in_l > -0.1);

    let _ = std::fs::remove_file(source);
    let _ = std::fs::remove_file(rendered);
}

#[test]
fn missing_input_is_an_error() {
    let result = render_file(
        &temp_wav("does_not_exist"),
        &temp_wav("never_written"),
        Parameters::default(),
        512,
    );
    assert!(result.is_err());
}
