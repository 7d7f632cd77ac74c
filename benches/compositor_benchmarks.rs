//! Benchmarks for lip painting and output compositing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use opencv::{
    core::{Mat, Point2f, Scalar, CV_8UC3, CV_8UC4},
    prelude::*,
};
use virtual_try_on::{
    asset::AccessoryAsset,
    compositor::{multiply_blend, FrameCompositor, LipCanvas},
    config::{Config, LipstickConfig},
    geometry::{AnchorPlacement, LipRegion},
    overlay::{AnchorHandle, OverlayScene},
};

fn ellipse(cx: f32, cy: f32, rx: f32, ry: f32) -> Vec<Point2f> {
    (0..20)
        .map(|i| {
            let t = i as f32 / 20.0 * std::f32::consts::TAU;
            Point2f::new(
                cx + rx * t.cos() + rand::random::<f32>(),
                cy + ry * t.sin() + rand::random::<f32>(),
            )
        })
        .collect()
}

fn mouth(width: i32, height: i32) -> LipRegion {
    let (cx, cy) = (width as f32 / 2.0, height as f32 * 0.6);
    let scale = width as f32 / 640.0;
    LipRegion {
        outer: ellipse(cx, cy, 50.0 * scale, 18.0 * scale),
        inner: ellipse(cx, cy, 34.0 * scale, 5.0 * scale),
    }
}

fn benchmark_lip_paint(c: &mut Criterion) {
    let mut group = c.benchmark_group("lip_canvas_paint");
    let style = LipstickConfig::default();

    for (width, height) in [(640, 480), (1280, 720)] {
        let region = mouth(width, height);
        let mut canvas = LipCanvas::new();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &region,
            |b, region| {
                b.iter(|| canvas.paint(black_box(region), width, height, &style).unwrap());
            },
        );
    }

    group.finish();
}

fn benchmark_multiply_blend(c: &mut Criterion) {
    let (width, height) = (1280, 720);
    let frame = Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(150.0)).unwrap();
    let mut canvas = LipCanvas::new();
    canvas
        .paint(&mouth(width, height), width, height, &LipstickConfig::default())
        .unwrap();

    c.bench_function("multiply_blend_1280x720", |b| {
        b.iter(|| {
            let mut output = frame.try_clone().unwrap();
            multiply_blend(&mut output, black_box(canvas.layer()), 0.9).unwrap();
            black_box(output)
        });
    });
}

fn benchmark_compose(c: &mut Criterion) {
    let (width, height) = (1280, 720);
    let config = Config::default();
    let frame = Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(150.0)).unwrap();
    let sprite = Mat::new_rows_cols_with_default(128, 64, CV_8UC4, Scalar::new(40.0, 180.0, 220.0, 255.0)).unwrap();
    let asset = AccessoryAsset::from_mat("memory://bench", sprite).unwrap();

    let mut scene = OverlayScene::new(&config);
    let placement = |x_pct| AnchorPlacement {
        x_pct,
        y_pct: 45.0,
        translate: (-0.5, 0.01),
        rotation_deg: 6.0,
        scale: 1.1,
    };
    scene.left_ear.apply(&placement(68.0));
    scene.right_ear.apply(&placement(32.0));
    scene
        .lips
        .paint(&mouth(width, height), width, height, &config.lipstick)
        .unwrap();

    let compositor = FrameCompositor::new(true, config.lipstick.layer_opacity, config.earrings.width_fraction);
    let mut group = c.benchmark_group("compose_1280x720");
    group.bench_function("with_earrings", |b| {
        b.iter(|| black_box(compositor.compose(&frame, &scene, Some(&asset)).unwrap()));
    });
    group.bench_function("lips_only", |b| {
        b.iter(|| black_box(compositor.compose(&frame, &scene, None).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, benchmark_lip_paint, benchmark_multiply_blend, benchmark_compose);
criterion_main!(benches);
