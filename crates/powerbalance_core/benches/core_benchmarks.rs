//! Criterion benchmarks for powerbalance_core
//!
//! Run with: cargo bench -p powerbalance_core

use std::fmt::Write as _;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use powerbalance_core::models::{Model, extract_models_from_file};
use powerbalance_core::sweep::{SweepMode, SweepSpec, assemble_combinations};
use powerbalance_core::utilities::flatten_dictionary;
use powerbalance_core::{ParamNode, ParamTable, ParamValue, ResultTable, SolutionTable};

fn create_parameter_document(sections: usize, leaves: usize) -> ParamTable {
    let mut document = ParamTable::new();
    for s in 0..sections {
        let mut inner = ParamTable::new();
        for l in 0..leaves {
            inner.insert(format!("value{l}"), ParamNode::Value(ParamValue::Float(l as f64)));
        }
        let mut magnet = ParamTable::new();
        magnet.insert(format!("magnetpf{s}"), ParamNode::Table(inner));
        document.insert(format!("section{s}"), ParamNode::Table(magnet));
    }
    document
}

fn create_sweep(names: usize, values: usize) -> SweepSpec {
    let mut spec = SweepSpec::new();
    for n in 0..names {
        let list = (0..values as i64).map(ParamValue::Int).collect();
        spec.insert(format!("model.param{n}"), list)
            .expect("homogeneous sweep list");
    }
    spec
}

fn create_model_source(models: usize) -> String {
    let mut source = String::from("package Plant\n");
    for m in 0..models {
        writeln!(source, "  model Component{m}\n    parameter Real __power = {m};\n  end Component{m};").unwrap();
    }
    source.push_str("  model System\n");
    for m in 0..models {
        writeln!(source, "    Plant.Component{m} component{m};").unwrap();
    }
    source.push_str("  end System;\nend Plant;\n");
    source
}

fn create_solution(instances: usize, rows: usize) -> (SolutionTable, Model) {
    let mut solution = SolutionTable::new();
    solution.insert_column(SolutionTable::TIME, (0..rows).map(|i| i as f64 * 0.5).collect());
    let mut model = Model {
        name: "Plant.System".to_string(),
        ..Default::default()
    };
    for i in 0..instances {
        solution.insert_column(
            format!("component{i}.ElecPowerConsumed"),
            (0..rows).map(|r| (r * i) as f64).collect(),
        );
        model
            .submodels
            .insert(format!("component{i}"), format!("Plant.Component{i}"));
    }
    solution.insert_column("turbine.ElecPowerGen", vec![100.0; rows]);
    (solution, model)
}

fn bench_flatten_dictionary(c: &mut Criterion) {
    let document = create_parameter_document(50, 20);

    c.bench_function("flatten_1000_parameters", |b| {
        b.iter(|| flatten_dictionary(black_box(&document)))
    });
}

fn bench_assemble_combinations(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble_combinations");

    for names in [2, 3, 4].iter() {
        let spec = create_sweep(*names, 6);
        group.bench_with_input(BenchmarkId::new("combinations", names), names, |b, _| {
            b.iter(|| assemble_combinations(black_box(&spec), SweepMode::Combinations))
        });
        group.bench_with_input(BenchmarkId::new("set", names), names, |b, _| {
            b.iter(|| assemble_combinations(black_box(&spec), SweepMode::Set))
        });
    }

    group.finish();
}

fn bench_model_parsing(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("temporary directory");
    let file = dir.path().join("Plant.mo");
    std::fs::write(&file, create_model_source(200)).expect("write model source");

    c.bench_function("parse_200_models", |b| {
        b.iter(|| extract_models_from_file(black_box(&file), None))
    });
}

fn bench_result_table(c: &mut Criterion) {
    let (solution, model) = create_solution(20, 2000);

    c.bench_function("result_table_20x2000", |b| {
        b.iter(|| ResultTable::from_solution(black_box(&solution), black_box(&model), 1.0))
    });
}

criterion_group!(
    benches,
    bench_flatten_dictionary,
    bench_assemble_combinations,
    bench_model_parsing,
    bench_result_table
);
criterion_main!(benches);
