//! Benchmarks for forward dynamics and impulse response.
//!
//! Run with: cargo bench -p sim-core

#![allow(missing_docs, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nalgebra::{Point3, Vector3};

use sim_core::dynamics::spatial::spatial;
use sim_core::{
    BodyId, ForwardDynamicsCalculator, ImpulseResponse, JointKind, MassProperties, Pose, Robot,
    RobotBuilder,
};

/// Serial chain of `links` revolute joints alternating between Y and X axes.
fn chain(links: usize) -> Robot {
    let mut builder = RobotBuilder::new("chain");
    let mut parent = BodyId::ROOT;
    for i in 0..links {
        let axis = if i % 2 == 0 { Vector3::y() } else { Vector3::x() };
        let offset = if i == 0 { 0.0 } else { -0.3 };
        parent = builder
            .add_body(
                parent,
                format!("joint{i}"),
                JointKind::revolute(axis),
                Pose::from_position(Point3::new(0.0, 0.0, offset)),
                format!("link{i}"),
                MassProperties::box_shape(1.0, Vector3::new(0.05, 0.05, 0.15))
                    .with_center_of_mass(Vector3::new(0.0, 0.0, -0.15)),
            )
            .unwrap();
    }
    let mut robot = builder.build();
    robot.velocities_mut().fill(0.3);
    robot.update_frames();
    robot
}

fn bench_forward_dynamics(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_dynamics");
    let gravity = Vector3::new(0.0, 0.0, -9.81);

    for links in [1, 6, 24] {
        let robot = chain(links);
        let mut calculator = ForwardDynamicsCalculator::new(&robot);
        group.throughput(Throughput::Elements(links as u64));
        group.bench_with_input(BenchmarkId::new("aba", links), &links, |b, _| {
            b.iter(|| {
                calculator.compute(black_box(&robot), &gravity);
                black_box(calculator.joint_accelerations().norm())
            });
        });
    }
    group.finish();
}

fn bench_impulse_response(c: &mut Criterion) {
    let mut group = c.benchmark_group("impulse_response");
    let gravity = Vector3::new(0.0, 0.0, -9.81);

    for links in [1, 6, 24] {
        let robot = chain(links);
        let mut calculator = ForwardDynamicsCalculator::new(&robot);
        calculator.compute(&robot, &gravity);
        let mut response = ImpulseResponse::new(&robot);
        let tip = BodyId::new(links);
        let impulse = spatial(&Vector3::zeros(), &Vector3::new(0.0, 0.0, 1.0));

        group.bench_with_input(BenchmarkId::new("tip_impulse", links), &links, |b, _| {
            b.iter(|| {
                calculator.impulse_response(&robot, black_box(&[(tip, impulse)]), &[], &mut response);
                black_box(response.joint_velocity_change().norm())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_forward_dynamics, bench_impulse_response);
criterion_main!(benches);
