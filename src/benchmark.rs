use criterion::measurement::WallTime;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use imdp_lump::config::{IterationMethod, Options};
use imdp_lump::lump::lump;
use imdp_lump::model_checking::imdp::{Imdp, ImdpBuilder};
use imdp_lump::model_checking::value_iteration::{solve, Objective};

/// Random IMDP where every choice spreads an interval of at most `width`
/// either side of a uniform split over up to `fanout` random successors.
fn random_imdp(num_states: usize, choices: usize, fanout: usize, width: f64, seed: u64) -> Imdp {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut b = ImdpBuilder::new(num_states);
    for s in 0..num_states {
        for _ in 0..choices {
            b.add_choice(s).unwrap();
            let mut succ: Vec<usize> = (0..fanout).map(|_| rng.gen_range(0, num_states)).collect();
            succ.sort();
            succ.dedup();
            let share = 1.0 / succ.len() as f64;
            for t in succ {
                let w = width * rng.gen::<f64>();
                b.add_transition(t, (share - w).max(0.0), (share + w).min(1.0)).unwrap();
            }
        }
    }
    b.build().unwrap()
}

fn reach_last(num_states: usize) -> Objective {
    let mut target = vec![false; num_states];
    target[num_states - 1] = true;
    Objective::UnboundedReachability { target, zero: Vec::new(), min: false }
}

pub fn value_iteration_benchmark(c: &mut Criterion) -> &mut Criterion<WallTime> {
    let n = 2000;
    let graph = random_imdp(n, 3, 4, 0.1, 17);
    let objective = reach_last(n);
    let jacobi = Options { iteration_method: IterationMethod::Jacobi, tolerance: 1e-8, ..Options::default() };
    let gauss_seidel = Options { iteration_method: IterationMethod::GaussSeidel, tolerance: 1e-8, ..Options::default() };

    c.bench_function("value iteration jacobi", |b| {
        b.iter(|| solve(black_box(&graph), &objective, &jacobi).unwrap())
    });
    c.bench_function("value iteration gauss-seidel", |b| {
        b.iter(|| solve(black_box(&graph), &objective, &gauss_seidel).unwrap())
    })
}

pub fn lump_benchmark(c: &mut Criterion) -> &mut Criterion<WallTime> {
    let n = 60;
    let graph = random_imdp(n, 2, 3, 0.05, 5);
    let objective = reach_last(n);
    let options = Options::default();

    c.bench_function("lump per block signature", |b| {
        b.iter(|| lump(black_box(&graph), &objective, &options).unwrap())
    })
}

criterion_group!(benches, value_iteration_benchmark, lump_benchmark);
criterion_main!(benches);
