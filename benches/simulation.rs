use divan::Bencher;
use simrun::{compile_str, Simulation};

fn main() {
    divan::main();
}

// a chain of n coupled decays, x_i' = x_{i-1} - x_i, with an algebraic total
fn chain_model(n: usize) -> String {
    let declarations = (0..n)
        .map(|i| format!("Real x{}(start = 1);", i))
        .collect::<Vec<_>>()
        .join("\n");
    let equations = (0..n)
        .map(|i| match i {
            0 => "der(x0) = -k * x0;".to_string(),
            _ => format!("der(x{}) = k * (x{} - x{});", i, i - 1, i),
        })
        .collect::<Vec<_>>()
        .join("\n");
    let total = (0..n)
        .map(|i| format!("x{}", i))
        .collect::<Vec<_>>()
        .join(" + ");
    format!(
        "model Chain
        parameter Real k = 0.5;
        {}
        Real total;
        equation
        {}
        total = {};
        end Chain;",
        declarations, equations, total
    )
}

fn setup(n: usize) -> Simulation {
    let model = compile_str(chain_model(n).as_str(), "Chain").unwrap();
    Simulation::from_model(model, 500).unwrap()
}

#[divan::bench(consts = [1, 10, 100])]
fn simulate_chain<const N: usize>(bencher: Bencher) {
    let sim = setup(N);
    let outputs = sim.default_outputs();
    bencher.bench_local(|| sim.simulate(0.0, 5.0, None, outputs.as_slice()).unwrap());
}

#[divan::bench(consts = [1, 10, 100])]
fn compile_chain<const N: usize>(bencher: Bencher) {
    let code = chain_model(N);
    bencher.bench_local(|| compile_str(code.as_str(), "Chain").unwrap());
}
