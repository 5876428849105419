// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use deckhand::samples::{ManualTime, MemorySoundRepository, Sampler, SamplerSettings};

const SAMPLE_RATE: u32 = 48_000;
const BUFFER_SECONDS: f64 = 512.0 / 48_000.0;

fn generate_test_sound(duration_seconds: f32) -> Vec<f32> {
    let num_samples = (duration_seconds * SAMPLE_RATE as f32) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            0.3 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
        })
        .collect()
}

fn benchmark_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");

    for voices in [1usize, 8, 32] {
        let mut repository = MemorySoundRepository::new();
        repository.insert(1, "tone", SAMPLE_RATE, &generate_test_sound(2.0));
        let time = Arc::new(ManualTime::new(0.0));
        let mut sampler = Sampler::new(
            Arc::new(repository),
            time.clone(),
            SamplerSettings {
                sample_rate: SAMPLE_RATE,
                max_voices: voices,
                ..Default::default()
            },
        );

        group.bench_with_input(BenchmarkId::new("voices", voices), &voices, |b, &voices| {
            b.iter(|| {
                // Keep the allocator full so every render mixes at full polyphony.
                if sampler.allocator().active_count() < voices {
                    for _ in sampler.allocator().active_count()..voices {
                        sampler
                            .schedule(1, sampler.last_render_time())
                            .expect("sound is loaded");
                    }
                }
                time.advance(BUFFER_SECONDS);
                black_box(sampler.render(black_box(BUFFER_SECONDS)))
            })
        });
    }

    group.finish();
}

fn benchmark_stealing(c: &mut Criterion) {
    let mut repository = MemorySoundRepository::new();
    repository.insert(1, "tone", SAMPLE_RATE, &generate_test_sound(0.5));
    let time = Arc::new(ManualTime::new(0.0));
    let mut sampler = Sampler::new(
        Arc::new(repository),
        time.clone(),
        SamplerSettings {
            sample_rate: SAMPLE_RATE,
            max_voices: 8,
            ..Default::default()
        },
    );

    // More triggers than voices on every buffer forces oldest-first stealing.
    c.bench_function("steal", |b| {
        b.iter(|| {
            for _ in 0..16 {
                sampler
                    .schedule(1, sampler.last_render_time())
                    .expect("sound is loaded");
            }
            time.advance(BUFFER_SECONDS);
            black_box(sampler.render(BUFFER_SECONDS))
        })
    });
}

criterion_group!(benches, benchmark_render, benchmark_stealing);
criterion_main!(benches);
