use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use voxbridge::defaults;
use voxbridge::speaker::fingerprint::{
    FingerprintExtractor, SpectralFingerprintExtractor, VoiceFingerprint, cosine_similarity,
};
use voxbridge::speaker::roster::SpeakerRoster;

/// Deterministic pseudo-random embedding so runs are comparable.
fn embedding(seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..defaults::EMBEDDING_BANDS)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) as f32 / u32::MAX as f32) + 0.01
        })
        .collect()
}

fn fingerprint(seed: u64) -> VoiceFingerprint {
    VoiceFingerprint::new(80.0 + (seed % 300) as f32, embedding(seed))
}

/// 16kHz mono sine, the same shape the extractor sees in production.
fn tone_samples(freq: f32, ms: u64) -> Vec<i16> {
    (0..(defaults::SAMPLE_RATE as u64 * ms / 1000))
        .map(|i| {
            let t = i as f32 / defaults::SAMPLE_RATE as f32;
            ((2.0 * std::f32::consts::PI * freq * t).sin() * 12000.0) as i16
        })
        .collect()
}

fn roster_with(profiles: u64) -> SpeakerRoster {
    let roster = SpeakerRoster::new();
    for seed in 0..profiles {
        // High threshold so every seed lands as its own profile.
        roster.bind_fast(fingerprint(seed), 0.999);
    }
    roster
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let a = embedding(1);
    let b = embedding(2);

    c.bench_function("cosine_similarity", |bench| {
        bench.iter(|| cosine_similarity(black_box(&a), black_box(&b)))
    });
}

fn bench_fingerprint_extraction(c: &mut Criterion) {
    let extractor = SpectralFingerprintExtractor::new();
    let mut group = c.benchmark_group("fingerprint_extraction");

    for ms in [600u64, 1000, 3000] {
        let samples = tone_samples(180.0, ms);
        group.bench_with_input(BenchmarkId::from_parameter(ms), &samples, |bench, samples| {
            bench.iter(|| {
                extractor
                    .extract(black_box(samples))
                    .expect("extraction failed")
            });
        });
    }

    group.finish();
}

fn bench_roster_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("roster_find_similar");

    for size in [10u64, 100, 500] {
        let roster = roster_with(size);
        let probe = fingerprint(size + 1);
        group.bench_with_input(BenchmarkId::from_parameter(size), &roster, |bench, roster| {
            bench.iter(|| roster.find_similar(black_box(&probe)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cosine_similarity,
    bench_fingerprint_extraction,
    bench_roster_matching
);
criterion_main!(benches);
